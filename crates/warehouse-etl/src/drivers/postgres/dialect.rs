//! PostgreSQL source dialect.

use crate::core::identifier::quote_pg;
use crate::core::schema::ColumnSpec;
use crate::core::traits::Dialect;
use crate::error::Result;

/// Catalog types the Postgres reader decodes without a text cast.
pub(crate) fn decodes_natively(data_type: &str) -> bool {
    matches!(
        data_type,
        "smallint"
            | "integer"
            | "bigint"
            | "real"
            | "double precision"
            | "boolean"
            | "text"
            | "character varying"
            | "character"
            | "date"
            | "time without time zone"
            | "timestamp without time zone"
            | "timestamp with time zone"
            | "uuid"
            | "json"
            | "jsonb"
            | "bytea"
    )
}

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_pg(name)
    }

    fn fixed_schema(&self) -> Option<&'static str> {
        Some("public")
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn list_tables_query(&self) -> String {
        r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_type = 'BASE TABLE'
            ORDER BY table_name
        "#
        .to_string()
    }

    fn list_columns_query(&self) -> String {
        r#"
            SELECT
                column_name::text,
                data_type::text,
                (is_nullable = 'YES') AS is_nullable,
                character_maximum_length::bigint,
                numeric_precision::bigint,
                numeric_scale::bigint
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#
        .to_string()
    }

    fn list_primary_keys_query(&self) -> String {
        r#"
            SELECT kcu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
                AND tc.table_name = kcu.table_name
            WHERE tc.constraint_type = 'PRIMARY KEY'
                AND tc.table_schema = $1
                AND tc.table_name = $2
            ORDER BY kcu.ordinal_position
        "#
        .to_string()
    }

    fn select_expr(&self, column: &ColumnSpec) -> Result<String> {
        let quoted = quote_pg(&column.name)?;
        let data_type = column.normalized_type();
        Ok(if decodes_natively(&data_type) {
            quoted
        } else if data_type == "money" {
            // money renders with a currency symbol as text
            format!("{q}::numeric::text AS {q}", q = quoted)
        } else {
            format!("{q}::text AS {q}", q = quoted)
        })
    }

    fn is_orderable(&self, column: &ColumnSpec) -> bool {
        !matches!(
            column.normalized_type().as_str(),
            "json" | "xml" | "point" | "line" | "lseg" | "box" | "path" | "polygon" | "circle"
                | "user-defined"
        )
    }

    fn paging_clause(&self, offset: u64, limit: usize) -> String {
        format!(" LIMIT {} OFFSET {}", limit, offset)
    }

    fn constraint_statements(
        &self,
        schema: &str,
        table: &str,
        enabled: bool,
    ) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {}.{} {} TRIGGER ALL",
            quote_pg(schema)?,
            quote_pg(table)?,
            if enabled { "ENABLE" } else { "DISABLE" }
        )])
    }
}
