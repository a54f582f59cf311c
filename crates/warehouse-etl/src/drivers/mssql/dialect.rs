//! SQL Server source dialect.

use crate::core::identifier::quote_mssql;
use crate::core::schema::ColumnSpec;
use crate::core::traits::Dialect;
use crate::error::Result;

/// SQL Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mssql(name)
    }

    fn fixed_schema(&self) -> Option<&'static str> {
        Some("dbo")
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("@P{}", index)
    }

    fn list_tables_query(&self) -> String {
        r#"
            SELECT TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = @P1 AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#
        .to_string()
    }

    fn list_columns_query(&self) -> String {
        r#"
            SELECT
                COLUMN_NAME,
                DATA_TYPE,
                CASE WHEN IS_NULLABLE = 'YES' THEN 1 ELSE 0 END AS is_nullable,
                CAST(CHARACTER_MAXIMUM_LENGTH AS BIGINT) AS max_length,
                CAST(NUMERIC_PRECISION AS BIGINT) AS num_precision,
                CAST(NUMERIC_SCALE AS BIGINT) AS num_scale
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
            ORDER BY ORDINAL_POSITION
        "#
        .to_string()
    }

    fn list_primary_keys_query(&self) -> String {
        r#"
            SELECT kcu.COLUMN_NAME
            FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA
                AND tc.TABLE_NAME = kcu.TABLE_NAME
            WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
                AND tc.TABLE_SCHEMA = @P1
                AND tc.TABLE_NAME = @P2
            ORDER BY kcu.ORDINAL_POSITION
        "#
        .to_string()
    }

    fn select_expr(&self, column: &ColumnSpec) -> Result<String> {
        let q = quote_mssql(&column.name)?;
        Ok(match column.normalized_type().as_str() {
            // ISO 8601 with offset
            "datetimeoffset" => format!("CONVERT(NVARCHAR(40), {q}, 127) AS {q}", q = q),
            "money" | "smallmoney" => format!("CAST({q} AS DECIMAL(19,4)) AS {q}", q = q),
            "xml" => format!("CAST({q} AS NVARCHAR(MAX)) AS {q}", q = q),
            "sql_variant" => format!("CAST({q} AS NVARCHAR(4000)) AS {q}", q = q),
            "geography" | "geometry" => format!("{q}.STAsText() AS {q}", q = q),
            "hierarchyid" => format!("{q}.ToString() AS {q}", q = q),
            _ => q,
        })
    }

    fn is_orderable(&self, column: &ColumnSpec) -> bool {
        !matches!(
            column.normalized_type().as_str(),
            "text" | "ntext" | "image" | "xml" | "geography" | "geometry"
        )
    }

    fn paging_clause(&self, offset: u64, limit: usize) -> String {
        format!(" OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", offset, limit)
    }

    fn constraint_statements(
        &self,
        schema: &str,
        table: &str,
        enabled: bool,
    ) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {}.{} {} CONSTRAINT ALL",
            quote_mssql(schema)?,
            quote_mssql(table)?,
            if enabled { "CHECK" } else { "NOCHECK" }
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::ChunkRequest;

    #[test]
    fn test_quote_ident() {
        let d = MssqlDialect::new();
        assert_eq!(d.quote_ident("users").unwrap(), "[users]");
        assert_eq!(d.quote_ident("a]b").unwrap(), "[a]]b]");
    }

    #[test]
    fn test_param_placeholder() {
        assert_eq!(MssqlDialect::new().param_placeholder(2), "@P2");
    }

    #[test]
    fn test_chunk_query_uses_offset_fetch() {
        let d = MssqlDialect::new();
        let req = ChunkRequest {
            schema: "dbo".into(),
            table: "Orders".into(),
            columns: vec![
                ColumnSpec::new("OrderID", "int", false),
                ColumnSpec::new("Placed", "datetimeoffset", true),
            ],
            order_by: vec!["OrderID".into()],
            offset: 0,
            limit: 5000,
        };
        assert_eq!(
            d.build_chunk_query(&req).unwrap(),
            "SELECT [OrderID], CONVERT(NVARCHAR(40), [Placed], 127) AS [Placed] \
             FROM [dbo].[Orders] ORDER BY [OrderID] OFFSET 0 ROWS FETCH NEXT 5000 ROWS ONLY"
        );
    }

    #[test]
    fn test_constraint_statements() {
        let d = MssqlDialect::new();
        assert_eq!(
            d.constraint_statements("dbo", "Orders", false).unwrap(),
            vec!["ALTER TABLE [dbo].[Orders] NOCHECK CONSTRAINT ALL"]
        );
        assert_eq!(
            d.constraint_statements("dbo", "Orders", true).unwrap(),
            vec!["ALTER TABLE [dbo].[Orders] CHECK CONSTRAINT ALL"]
        );
    }

    #[test]
    fn test_ntext_not_orderable() {
        let d = MssqlDialect::new();
        assert!(!d.is_orderable(&ColumnSpec::new("Notes", "ntext", true)));
        assert!(d.is_orderable(&ColumnSpec::new("Name", "nvarchar", true)));
    }
}
