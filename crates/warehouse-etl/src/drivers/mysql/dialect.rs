//! MySQL/MariaDB source dialect.

use crate::core::identifier::quote_mysql;
use crate::core::schema::ColumnSpec;
use crate::core::traits::Dialect;
use crate::error::Result;

const SPATIAL_TYPES: &[&str] = &[
    "geometry",
    "point",
    "linestring",
    "polygon",
    "multipoint",
    "multilinestring",
    "multipolygon",
    "geometrycollection",
];

/// MySQL dialect implementation (also used for MariaDB).
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mysql(name)
    }

    fn fixed_schema(&self) -> Option<&'static str> {
        None
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn list_tables_query(&self) -> String {
        // CAST to CHAR to handle collation differences in information_schema
        r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#
        .to_string()
    }

    fn list_columns_query(&self) -> String {
        // Unsigned integers are reported as e.g. "int unsigned" so the type
        // mapper can widen them.
        r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(CASE
                    WHEN COLUMN_TYPE LIKE '%unsigned%' THEN CONCAT(DATA_TYPE, ' unsigned')
                    ELSE DATA_TYPE
                END AS CHAR(255)) AS DATA_TYPE,
                CAST(IF(IS_NULLABLE = 'YES', 1, 0) AS SIGNED) AS is_nullable,
                CAST(CHARACTER_MAXIMUM_LENGTH AS SIGNED) AS max_length,
                CAST(NUMERIC_PRECISION AS SIGNED) AS num_precision,
                CAST(NUMERIC_SCALE AS SIGNED) AS num_scale
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#
        .to_string()
    }

    fn list_primary_keys_query(&self) -> String {
        r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#
        .to_string()
    }

    fn select_expr(&self, column: &ColumnSpec) -> Result<String> {
        let quoted = quote_mysql(&column.name)?;
        let data_type = column.normalized_type();
        let base = data_type.trim_end_matches(" unsigned");

        Ok(match base {
            // Zero dates ('0000-00-00') cannot be decoded, read them as text
            "date" | "datetime" | "timestamp" | "time" | "json" => {
                format!("CAST({q} AS CHAR) AS {q}", q = quoted)
            }
            "bit" => format!("CAST({q} AS UNSIGNED) AS {q}", q = quoted),
            "year" => format!("CAST({q} AS SIGNED) AS {q}", q = quoted),
            t if SPATIAL_TYPES.contains(&t) => format!("ST_AsText({q}) AS {q}", q = quoted),
            _ => quoted,
        })
    }

    fn paging_clause(&self, offset: u64, limit: usize) -> String {
        format!(" LIMIT {} OFFSET {}", limit, offset)
    }

    fn constraint_statements(
        &self,
        _schema: &str,
        _table: &str,
        enabled: bool,
    ) -> Result<Vec<String>> {
        // Session-scoped; the source pool holds a single connection.
        Ok(vec![format!(
            "SET FOREIGN_KEY_CHECKS={}",
            if enabled { 1 } else { 0 }
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::ChunkRequest;

    #[test]
    fn test_quote_ident() {
        let d = MysqlDialect::new();
        assert_eq!(d.quote_ident("users").unwrap(), "`users`");
        assert_eq!(d.quote_ident("a`b").unwrap(), "`a``b`");
    }

    #[test]
    fn test_select_expr() {
        let d = MysqlDialect::new();
        assert_eq!(
            d.select_expr(&ColumnSpec::new("created", "datetime", false)).unwrap(),
            "CAST(`created` AS CHAR) AS `created`"
        );
        assert_eq!(
            d.select_expr(&ColumnSpec::new("flag", "bit", false)).unwrap(),
            "CAST(`flag` AS UNSIGNED) AS `flag`"
        );
        assert_eq!(
            d.select_expr(&ColumnSpec::new("loc", "point", true)).unwrap(),
            "ST_AsText(`loc`) AS `loc`"
        );
        assert_eq!(
            d.select_expr(&ColumnSpec::new("qty", "int unsigned", false)).unwrap(),
            "`qty`"
        );
    }

    #[test]
    fn test_chunk_query_paging() {
        let d = MysqlDialect::new();
        let req = ChunkRequest {
            schema: "shop".into(),
            table: "orders".into(),
            columns: vec![ColumnSpec::new("id", "int", false)],
            order_by: vec!["id".into()],
            offset: 5000,
            limit: 5000,
        };
        assert_eq!(
            d.build_chunk_query(&req).unwrap(),
            "SELECT `id` FROM `shop`.`orders` ORDER BY `id` LIMIT 5000 OFFSET 5000"
        );
    }

    #[test]
    fn test_constraint_statements() {
        let d = MysqlDialect::new();
        assert_eq!(
            d.constraint_statements("shop", "orders", false).unwrap(),
            vec!["SET FOREIGN_KEY_CHECKS=0"]
        );
        assert_eq!(
            d.constraint_statements("shop", "orders", true).unwrap(),
            vec!["SET FOREIGN_KEY_CHECKS=1"]
        );
    }

    #[test]
    fn test_schema_comes_from_server() {
        assert!(MysqlDialect::new().fixed_schema().is_none());
        assert_eq!(MysqlDialect::new().param_placeholder(3), "?");
    }
}
