//! PostgreSQL source reader.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use deadpool_postgres::{Object, Pool};
use tokio_postgres::Row;
use tracing::{debug, info};
use uuid::Uuid;

use super::dialect::{decodes_natively, PostgresDialect};
use super::{connect_pool, PgEndpoint};
use crate::config::ConnectionDescriptor;
use crate::core::schema::{ColumnSpec, Driver};
use crate::core::traits::{ChunkRequest, Dialect, SourceReader};
use crate::core::value::{Batch, SqlValue};
use crate::error::{EtlError, Result};

/// Reads catalog metadata and rows from a PostgreSQL source.
pub struct PgSourceReader {
    pool: Pool,
    dialect: PostgresDialect,
    endpoint: String,
}

impl PgSourceReader {
    /// Open a single-connection pool to the source.
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let endpoint = PgEndpoint {
            host: &descriptor.host,
            port: descriptor.port(),
            database: &descriptor.database,
            user: &descriptor.username,
            password: &descriptor.password,
            ssl_mode: descriptor.ssl_mode,
        };
        let pool = connect_pool(&endpoint, 1).await?;

        info!("Connected to PostgreSQL source: {}", endpoint.describe());

        Ok(Self {
            pool,
            dialect: PostgresDialect::new(),
            endpoint: endpoint.describe(),
        })
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| EtlError::connection(&self.endpoint, e))
    }

    fn decode(row: &Row, idx: usize, data_type: &str) -> std::result::Result<SqlValue, tokio_postgres::Error> {
        let value = match data_type {
            "smallint" => row.try_get::<_, Option<i16>>(idx)?.map(|v| SqlValue::I64(v.into())),
            "integer" => row.try_get::<_, Option<i32>>(idx)?.map(|v| SqlValue::I64(v.into())),
            "bigint" => row.try_get::<_, Option<i64>>(idx)?.map(SqlValue::I64),
            "real" => row.try_get::<_, Option<f32>>(idx)?.map(|v| SqlValue::F64(v.into())),
            "double precision" => row.try_get::<_, Option<f64>>(idx)?.map(SqlValue::F64),
            "boolean" => row.try_get::<_, Option<bool>>(idx)?.map(SqlValue::Bool),
            "date" => row.try_get::<_, Option<NaiveDate>>(idx)?.map(SqlValue::Date),
            "time without time zone" => row.try_get::<_, Option<NaiveTime>>(idx)?.map(SqlValue::Time),
            "timestamp without time zone" => row
                .try_get::<_, Option<NaiveDateTime>>(idx)?
                .map(SqlValue::DateTime),
            "timestamp with time zone" => row
                .try_get::<_, Option<DateTime<FixedOffset>>>(idx)?
                .map(SqlValue::DateTimeOffset),
            "uuid" => row.try_get::<_, Option<Uuid>>(idx)?.map(SqlValue::Uuid),
            "json" | "jsonb" => row
                .try_get::<_, Option<serde_json::Value>>(idx)?
                .map(SqlValue::Json),
            "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(SqlValue::Bytes),
            // Character types and everything selected with a ::text cast
            _ => row.try_get::<_, Option<String>>(idx)?.map(SqlValue::Text),
        };
        Ok(value.unwrap_or(SqlValue::Null))
    }
}

#[async_trait]
impl SourceReader for PgSourceReader {
    fn driver(&self) -> Driver {
        Driver::Postgres
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn schema_name(&self) -> Result<String> {
        Ok(self.dialect.fixed_schema().unwrap_or("public").to_string())
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let client = self.client().await?;
        let rows = client
            .query(&self.dialect.list_tables_query(), &[&schema])
            .await
            .map_err(|e| EtlError::schema(schema, e))?;

        rows.iter()
            .map(|r| r.try_get::<_, String>(0).map_err(|e| EtlError::schema(schema, e)))
            .collect()
    }

    async fn list_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnSpec>> {
        let client = self.client().await?;
        let rows = client
            .query(&self.dialect.list_columns_query(), &[&schema, &table])
            .await
            .map_err(|e| EtlError::schema(table, e))?;

        rows.iter()
            .map(|r| {
                Ok(ColumnSpec {
                    name: r.try_get(0)?,
                    data_type: r.try_get(1)?,
                    is_nullable: r.try_get(2)?,
                    max_length: r.try_get(3)?,
                    precision: r.try_get(4)?,
                    scale: r.try_get(5)?,
                })
            })
            .collect::<std::result::Result<Vec<_>, tokio_postgres::Error>>()
            .map_err(|e| EtlError::schema(table, e))
    }

    async fn list_primary_keys(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        let client = self.client().await?;
        let rows = client
            .query(&self.dialect.list_primary_keys_query(), &[&schema, &table])
            .await
            .map_err(|e| EtlError::schema(table, e))?;

        rows.iter()
            .map(|r| r.try_get::<_, String>(0).map_err(|e| EtlError::schema(table, e)))
            .collect()
    }

    async fn read_chunk(&self, req: &ChunkRequest) -> Result<Batch> {
        let sql = self.dialect.build_chunk_query(req)?;
        debug!("{}: {}", req.table, sql);

        let client = self.client().await?;
        let rows = client
            .query(&sql, &[])
            .await
            .map_err(|e| EtlError::transfer(&req.table, e))?;

        let types: Vec<String> = req
            .columns
            .iter()
            .map(|c| {
                let t = c.normalized_type();
                if decodes_natively(&t) {
                    t
                } else {
                    "text".to_string()
                }
            })
            .collect();

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let values = types
                .iter()
                .enumerate()
                .map(|(i, t)| Self::decode(row, i, t))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| EtlError::transfer(&req.table, e))?;
            out.push(values);
        }

        Ok(Batch::new(req.column_names(), out))
    }

    async fn set_constraint_enforcement(
        &self,
        schema: &str,
        table: &str,
        enabled: bool,
    ) -> Result<()> {
        let client = self.client().await?;
        for stmt in self.dialect.constraint_statements(schema, table, enabled)? {
            client
                .batch_execute(&stmt)
                .await
                .map_err(|e| EtlError::schema(table, e))?;
        }
        Ok(())
    }

    async fn tune_session(&self) -> Result<()> {
        let client = self.client().await?;
        client
            .batch_execute("SET work_mem = '256MB'")
            .await
            .map_err(|e| EtlError::connection(&self.endpoint, e))
    }

    async fn close(&self) {
        self.pool.close();
        debug!("Closed PostgreSQL source pool: {}", self.endpoint);
    }
}
