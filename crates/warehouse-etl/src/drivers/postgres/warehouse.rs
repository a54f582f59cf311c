//! PostgreSQL warehouse writer.
//!
//! Tables live in one configured schema. Every table carries the mapped
//! source columns followed by the two audit columns. Rows are written as
//! multi-row `INSERT ... VALUES` statements with every value bound as text
//! and cast to the column type in SQL.

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tokio_postgres::types::ToSql;
use tracing::{debug, info, warn};

use super::{connect_pool, pg_error_message, PgEndpoint};
use crate::config::WarehouseConfig;
use crate::core::identifier::{qualify_pg, quote_pg, AUDIT_CREATED_AT, AUDIT_UPDATED_AT};
use crate::core::traits::{WarehouseColumn, WarehouseWriter};
use crate::core::value::SqlValue;
use crate::error::{EtlError, Result};
use crate::typemap::TargetColumnSpec;

/// Maximum bind parameters in one PostgreSQL statement.
pub const PG_MAX_PARAMS: usize = 65_535;

/// Type of the audit columns.
const AUDIT_COLUMN_DDL: &str = "timestamp(0) without time zone NOT NULL DEFAULT CURRENT_TIMESTAMP";

/// PostgreSQL warehouse.
pub struct PgWarehouse {
    pool: Pool,
    schema: String,
    session_tuning: bool,
    endpoint: String,
}

impl PgWarehouse {
    /// Connect to the warehouse and verify the connection.
    pub async fn connect(config: &WarehouseConfig, session_tuning: bool) -> Result<Self> {
        let endpoint = PgEndpoint {
            host: &config.host,
            port: config.port,
            database: &config.database,
            user: &config.user,
            password: &config.password,
            ssl_mode: config.ssl_mode,
        };
        let pool = connect_pool(&endpoint, config.pool_size).await?;

        info!(
            "Connected to warehouse: {} (schema {})",
            endpoint.describe(),
            config.schema
        );

        Ok(Self {
            pool,
            schema: config.schema.clone(),
            session_tuning,
            endpoint: endpoint.describe(),
        })
    }

    /// Underlying pool, shared with the DataSource store.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Schema that holds replicated tables.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| EtlError::connection(&self.endpoint, e))
    }

    async fn execute_ddl(&self, table: &str, sql: &str) -> Result<()> {
        debug!("{}", sql);
        let client = self.client().await?;
        client
            .batch_execute(sql)
            .await
            .map_err(|e| EtlError::schema(table, pg_error_message(&e)))
    }

    /// Release pooled connections.
    pub fn close(&self) {
        self.pool.close();
    }
}

/// CREATE TABLE statement for mapped columns plus the audit columns.
pub fn create_table_sql(schema: &str, table: &str, columns: &[TargetColumnSpec]) -> Result<String> {
    let mut defs = Vec::with_capacity(columns.len() + 2);
    for col in columns {
        let null = if col.nullable { "" } else { " NOT NULL" };
        defs.push(format!("{} {}{}", quote_pg(&col.name)?, col.ddl_type(), null));
    }
    for audit in [AUDIT_CREATED_AT, AUDIT_UPDATED_AT] {
        defs.push(format!("{} {}", quote_pg(audit)?, AUDIT_COLUMN_DDL));
    }

    Ok(format!(
        "CREATE TABLE {} (\n    {}\n)",
        qualify_pg(schema, table)?,
        defs.join(",\n    ")
    ))
}

/// Multi-row INSERT with text parameters cast to each column's type.
pub fn insert_sql(
    schema: &str,
    table: &str,
    columns: &[WarehouseColumn],
    row_count: usize,
) -> Result<String> {
    let names = columns
        .iter()
        .map(|c| quote_pg(&c.name))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    let ncols = columns.len();
    let tuples: Vec<String> = (0..row_count)
        .map(|r| {
            let params: Vec<String> = columns
                .iter()
                .enumerate()
                .map(|(c, col)| format!("${}::text::{}", r * ncols + c + 1, col.sql_type))
                .collect();
            format!("({})", params.join(", "))
        })
        .collect();

    Ok(format!(
        "INSERT INTO {} ({}) VALUES {}",
        qualify_pg(schema, table)?,
        names,
        tuples.join(", ")
    ))
}

/// Rows per INSERT statement, bounded by the bind-parameter limit.
pub fn effective_batch_size(batch_size: usize, ncols: usize) -> usize {
    let by_params = PG_MAX_PARAMS / ncols.max(1);
    batch_size.min(by_params).max(1)
}

#[async_trait]
impl WarehouseWriter for PgWarehouse {
    async fn ping(&self) -> Result<()> {
        let client = self.client().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| EtlError::connection(&self.endpoint, pg_error_message(&e)))?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT tablename::text FROM pg_catalog.pg_tables \
                 WHERE schemaname = $1 ORDER BY tablename",
                &[&self.schema],
            )
            .await
            .map_err(|e| EtlError::schema(&self.schema, pg_error_message(&e)))?;

        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_tables \
                 WHERE schemaname = $1 AND tablename = $2)",
                &[&self.schema, &table],
            )
            .await
            .map_err(|e| EtlError::schema(table, pg_error_message(&e)))?;
        Ok(row.get::<_, bool>(0))
    }

    async fn create_table(&self, table: &str, columns: &[TargetColumnSpec]) -> Result<()> {
        let sql = create_table_sql(&self.schema, table, columns)?;
        self.execute_ddl(table, &sql).await?;
        debug!("Created table {}.{}", self.schema, table);
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {} CASCADE", qualify_pg(&self.schema, table)?);
        self.execute_ddl(table, &sql).await?;
        debug!("Dropped table {}.{}", self.schema, table);
        Ok(())
    }

    async fn truncate_table(&self, table: &str) -> Result<()> {
        let sql = format!("TRUNCATE TABLE {}", qualify_pg(&self.schema, table)?);
        self.execute_ddl(table, &sql).await
    }

    async fn add_primary_key(&self, table: &str, columns: &[String]) -> Result<()> {
        let cols = columns
            .iter()
            .map(|c| quote_pg(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let sql = format!(
            "ALTER TABLE {} ADD PRIMARY KEY ({})",
            qualify_pg(&self.schema, table)?,
            cols
        );
        self.execute_ddl(table, &sql).await
    }

    async fn create_index(&self, table: &str, index_name: &str, column: &str) -> Result<()> {
        let client = self.client().await?;

        if self.session_tuning {
            if let Err(e) = client
                .batch_execute("SET maintenance_work_mem = '1GB'")
                .await
            {
                warn!("maintenance_work_mem not applied: {}", pg_error_message(&e));
            }
        }

        // CONCURRENTLY cannot run inside a transaction block
        let sql = format!(
            "CREATE INDEX CONCURRENTLY IF NOT EXISTS {} ON {} ({})",
            quote_pg(index_name)?,
            qualify_pg(&self.schema, table)?,
            quote_pg(column)?
        );
        debug!("{}", sql);
        let result = client.batch_execute(&sql).await;

        if self.session_tuning {
            if let Err(e) = client.batch_execute("RESET maintenance_work_mem").await {
                warn!("maintenance_work_mem not reset: {}", pg_error_message(&e));
            }
        }

        result.map_err(|e| EtlError::schema(table, pg_error_message(&e)))
    }

    async fn set_constraint_enforcement(&self, table: &str, enabled: bool) -> Result<()> {
        let sql = format!(
            "ALTER TABLE {} {} TRIGGER ALL",
            qualify_pg(&self.schema, table)?,
            if enabled { "ENABLE" } else { "DISABLE" }
        );
        self.execute_ddl(table, &sql).await
    }

    async fn column_info(&self, table: &str) -> Result<Vec<WarehouseColumn>> {
        let client = self.client().await?;
        let rows = client
            .query(
                r#"
                SELECT
                    a.attname::text,
                    format_type(a.atttypid, a.atttypmod),
                    NOT a.attnotnull,
                    pg_get_expr(d.adbin, d.adrelid)
                FROM pg_catalog.pg_attribute a
                JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
                JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
                LEFT JOIN pg_catalog.pg_attrdef d
                    ON d.adrelid = a.attrelid AND d.adnum = a.attnum
                WHERE n.nspname = $1 AND c.relname = $2
                  AND a.attnum > 0 AND NOT a.attisdropped
                ORDER BY a.attnum
                "#,
                &[&self.schema, &table],
            )
            .await
            .map_err(|e| EtlError::schema(table, pg_error_message(&e)))?;

        Ok(rows
            .iter()
            .map(|r| {
                WarehouseColumn::from_catalog(
                    r.get::<_, String>(0),
                    r.get::<_, String>(1),
                    r.get::<_, bool>(2),
                    r.get::<_, Option<String>>(3),
                )
            })
            .collect())
    }

    async fn insert_chunk(
        &self,
        table: &str,
        columns: &[WarehouseColumn],
        rows: &[Vec<SqlValue>],
        batch_size: usize,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let per_statement = effective_batch_size(batch_size, columns.len());
        let mut client = self.client().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| EtlError::transfer(table, pg_error_message(&e)))?;

        if self.session_tuning {
            if let Err(e) = tx.batch_execute("SET LOCAL synchronous_commit = off").await {
                warn!("synchronous_commit not relaxed: {}", pg_error_message(&e));
            }
        }

        let mut written = 0u64;
        for batch in rows.chunks(per_statement) {
            let sql = insert_sql(&self.schema, table, columns, batch.len())?;
            let params: Vec<Option<String>> = batch
                .iter()
                .flat_map(|row| row.iter().map(SqlValue::to_pg_text))
                .collect();
            let refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

            match tx.execute(sql.as_str(), &refs).await {
                Ok(n) => written += n,
                Err(e) => {
                    let message = pg_error_message(&e);
                    if let Err(rb) = tx.rollback().await {
                        warn!("{}: rollback failed: {}", table, pg_error_message(&rb));
                    }
                    return Err(EtlError::transfer(table, message));
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| EtlError::transfer(table, pg_error_message(&e)))?;

        debug!("{}: committed {} rows", table, written);
        Ok(written)
    }
}
