//! Identifier validation, quoting and warehouse naming.
//!
//! SQL identifiers cannot be bound as statement parameters, so every table,
//! column and schema name that reaches dynamic SQL passes through one of the
//! quoting functions here. The warehouse naming rules (`{source}__{table}`,
//! `idx_{table}_{column}`) also live here so that every operation derives the
//! same names.

use sha2::{Digest, Sha256};

use crate::error::{EtlError, Result};

/// Maximum identifier length accepted for quoting (SQL Server's limit is the
/// largest of the supported engines).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// PostgreSQL truncates identifiers beyond this many bytes.
pub const PG_IDENTIFIER_LIMIT: usize = 63;

/// Separator between the data source name and the source table name.
pub const TABLE_SEPARATOR: &str = "__";

/// Longest accepted data source name.
pub const MAX_SOURCE_NAME_LENGTH: usize = 48;

/// Engine-owned audit column stamped with the chunk load time.
pub const AUDIT_CREATED_AT: &str = "_etl_created_at";

/// Engine-owned audit column stamped with the chunk load time.
pub const AUDIT_UPDATED_AT: &str = "_etl_updated_at";

/// Hex characters of the content hash appended to shortened names.
const HASH_SUFFIX_LEN: usize = 8;

/// Validate an identifier before it is quoted.
///
/// # Errors
///
/// Returns `EtlError::Validation` for empty names, names containing null
/// bytes, or names longer than 128 bytes.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(EtlError::Validation(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(EtlError::Validation(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(EtlError::Validation(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier using backticks.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Quote a SQL Server identifier using brackets.
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Qualify a PostgreSQL table name with schema.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Escape a value for use inside a single-quoted SQL literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Check that a data source name can be embedded as a warehouse table prefix.
///
/// Accepted names are ASCII alphanumeric segments joined by single
/// underscores, e.g. `shop1` or `erp_eu`. Leading, trailing and doubled
/// underscores are rejected because they would make the `__` separator
/// ambiguous between two sources.
pub fn validate_source_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(EtlError::Validation(
            "connection name is required".to_string(),
        ));
    }
    if name.len() > MAX_SOURCE_NAME_LENGTH {
        return Err(EtlError::Validation(format!(
            "connection name '{}' exceeds {} characters",
            name, MAX_SOURCE_NAME_LENGTH
        )));
    }
    let well_formed = name
        .split('_')
        .all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric()));
    if !well_formed {
        return Err(EtlError::Validation(format!(
            "connection name '{}' may only contain letters, digits and single underscores",
            name
        )));
    }
    Ok(())
}

/// Prefix shared by every warehouse table of one data source.
pub fn table_prefix(source_name: &str) -> String {
    format!("{}{}", source_name, TABLE_SEPARATOR)
}

/// Warehouse table name for a source table, shortened when it would exceed
/// the PostgreSQL identifier limit.
pub fn warehouse_table_name(source_name: &str, source_table: &str) -> String {
    shorten_identifier(
        &format!("{}{}", table_prefix(source_name), source_table),
        PG_IDENTIFIER_LIMIT,
    )
}

/// Deterministic index name for one column of a warehouse table.
pub fn index_name(table: &str, column: &str) -> String {
    shorten_identifier(&format!("idx_{}_{}", table, column), PG_IDENTIFIER_LIMIT)
}

/// Shorten `name` to at most `limit` bytes.
///
/// Names within the limit are returned unchanged. Longer names keep their
/// leading characters (cut on a char boundary) followed by `_` and the first
/// eight hex digits of the SHA-256 of the full name, so two long names that
/// share a prefix still map to different identifiers.
pub fn shorten_identifier(name: &str, limit: usize) -> String {
    if name.len() <= limit {
        return name.to_string();
    }

    let digest = hex::encode(Sha256::digest(name.as_bytes()));
    let suffix = &digest[..HASH_SUFFIX_LEN];

    let mut keep = limit.saturating_sub(HASH_SUFFIX_LEN + 1);
    while keep > 0 && !name.is_char_boundary(keep) {
        keep -= 1;
    }

    format!("{}_{}", &name[..keep], suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escapes_embedded_delimiters() {
        assert_eq!(quote_pg("users").unwrap(), "\"users\"");
        assert_eq!(quote_pg("a\"b").unwrap(), "\"a\"\"b\"");
        assert_eq!(quote_mysql("a`b").unwrap(), "`a``b`");
        assert_eq!(quote_mssql("a]b").unwrap(), "[a]]b]");
        assert_eq!(qualify_pg("public", "t").unwrap(), "\"public\".\"t\"");
    }

    #[test]
    fn test_rejects_null_byte_and_empty() {
        assert!(quote_pg("").is_err());
        assert!(quote_pg("bad\0name").is_err());
        assert!(quote_mssql(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_source_name_rules() {
        assert!(validate_source_name("shop1").is_ok());
        assert!(validate_source_name("erp_eu_2").is_ok());
        assert!(validate_source_name("").is_err());
        assert!(validate_source_name("shop-1").is_err());
        assert!(validate_source_name("shop 1").is_err());
        assert!(validate_source_name("_shop").is_err());
        assert!(validate_source_name("shop_").is_err());
        assert!(validate_source_name("shop__1").is_err());
        assert!(validate_source_name("dróp").is_err());
        assert!(validate_source_name(&"a".repeat(49)).is_err());
    }

    #[test]
    fn test_warehouse_table_name() {
        assert_eq!(warehouse_table_name("shop1", "orders"), "shop1__orders");
        assert!(warehouse_table_name("shop1", "orders").starts_with(&table_prefix("shop1")));
    }

    #[test]
    fn test_short_index_name_unchanged() {
        assert_eq!(index_name("shop1__orders", "id"), "idx_shop1__orders_id");
    }

    #[test]
    fn test_long_index_name_is_truncated_with_hash() {
        let table = format!("shop1__{}", "very_long_table_name".repeat(3));
        let a = index_name(&table, "customer_identifier");
        let b = index_name(&table, "customer_identifier_2");

        assert!(a.len() <= PG_IDENTIFIER_LIMIT);
        assert!(b.len() <= PG_IDENTIFIER_LIMIT);
        assert_ne!(a, b);
        assert_eq!(a, index_name(&table, "customer_identifier"));
    }

    #[test]
    fn test_shorten_respects_char_boundaries() {
        let name = "é".repeat(40);
        let short = shorten_identifier(&name, PG_IDENTIFIER_LIMIT);
        assert!(short.len() <= PG_IDENTIFIER_LIMIT);
        assert!(short.is_char_boundary(short.len() - HASH_SUFFIX_LEN - 1));
    }
}
