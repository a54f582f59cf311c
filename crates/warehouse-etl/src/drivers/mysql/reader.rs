//! MySQL/MariaDB source reader.
//!
//! Uses SQLx with a single-connection pool, so `SET FOREIGN_KEY_CHECKS`
//! applies to the connection that reads.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::Row;
use tracing::{debug, info};

use super::dialect::MysqlDialect;
use crate::config::ConnectionDescriptor;
use crate::core::schema::{ColumnSpec, Driver};
use crate::core::traits::{ChunkRequest, Dialect, SourceReader};
use crate::core::value::{Batch, SqlValue};
use crate::drivers::common::SslMode;
use crate::error::{EtlError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL/MariaDB source reader implementation.
pub struct MysqlReader {
    pool: MySqlPool,
    dialect: MysqlDialect,
    driver: Driver,
    database: String,
    endpoint: String,
}

impl MysqlReader {
    /// Open the pool and verify the connection.
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let endpoint = descriptor.endpoint();
        let ssl_mode = match descriptor.ssl_mode {
            SslMode::Disable => MySqlSslMode::Disabled,
            SslMode::Prefer => MySqlSslMode::Preferred,
            SslMode::Require => MySqlSslMode::Required,
            SslMode::VerifyCa => MySqlSslMode::VerifyCa,
            SslMode::VerifyFull => MySqlSslMode::VerifyIdentity,
        };

        let options = MySqlConnectOptions::new()
            .host(&descriptor.host)
            .port(descriptor.port())
            .database(&descriptor.database)
            .username(&descriptor.username)
            .password(&descriptor.password)
            .ssl_mode(ssl_mode);

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| EtlError::connection(&endpoint, e))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| EtlError::connection(&endpoint, e))?;

        info!("Connected to {} source: {}", descriptor.driver, endpoint);

        Ok(Self {
            pool,
            dialect: MysqlDialect::new(),
            driver: descriptor.driver,
            database: descriptor.database.clone(),
            endpoint,
        })
    }

    fn decode(row: &MySqlRow, idx: usize, data_type: &str) -> std::result::Result<SqlValue, sqlx::Error> {
        let value = match data_type {
            "tinyint" => row.try_get::<Option<i8>, _>(idx)?.map(|v| SqlValue::I64(v.into())),
            "tinyint unsigned" => row.try_get::<Option<u8>, _>(idx)?.map(|v| SqlValue::I64(v.into())),
            "smallint" => row.try_get::<Option<i16>, _>(idx)?.map(|v| SqlValue::I64(v.into())),
            "smallint unsigned" => row.try_get::<Option<u16>, _>(idx)?.map(|v| SqlValue::I64(v.into())),
            "mediumint" | "int" | "integer" => {
                row.try_get::<Option<i32>, _>(idx)?.map(|v| SqlValue::I64(v.into()))
            }
            "mediumint unsigned" | "int unsigned" | "integer unsigned" => {
                row.try_get::<Option<u32>, _>(idx)?.map(|v| SqlValue::I64(v.into()))
            }
            "bigint" | "year" => row.try_get::<Option<i64>, _>(idx)?.map(SqlValue::I64),
            "bigint unsigned" | "bit" => row.try_get::<Option<u64>, _>(idx)?.map(unsigned_value),
            "float" | "float unsigned" => {
                row.try_get::<Option<f32>, _>(idx)?.map(|v| SqlValue::F64(v.into()))
            }
            "double" | "real" | "double unsigned" => {
                row.try_get::<Option<f64>, _>(idx)?.map(SqlValue::F64)
            }
            "decimal" | "numeric" | "dec" | "decimal unsigned" => {
                row.try_get::<Option<Decimal>, _>(idx)?.map(SqlValue::Decimal)
            }
            "date" | "datetime" | "timestamp" | "time" | "json" => row
                .try_get::<Option<String>, _>(idx)?
                .map(|s| parse_text_value(data_type, s)),
            "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" => {
                row.try_get::<Option<Vec<u8>>, _>(idx)?.map(SqlValue::Bytes)
            }
            _ => match row.try_get::<Option<String>, _>(idx) {
                Ok(v) => v.map(SqlValue::Text),
                // Binary collations arrive as bytes
                Err(_) => row
                    .try_get::<Option<Vec<u8>>, _>(idx)?
                    .map(|b| SqlValue::Text(String::from_utf8_lossy(&b).into_owned())),
            },
        };
        Ok(value.unwrap_or(SqlValue::Null))
    }
}

fn unsigned_value(v: u64) -> SqlValue {
    match i64::try_from(v) {
        Ok(i) => SqlValue::I64(i),
        Err(_) => SqlValue::Decimal(Decimal::from(v)),
    }
}

/// Temporal and JSON columns are selected as text; turn them back into typed
/// values. MySQL zero dates become NULL.
fn parse_text_value(data_type: &str, s: String) -> SqlValue {
    if s.starts_with("0000-00-00") {
        return SqlValue::Null;
    }
    let parsed = match data_type {
        "date" => NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok().map(SqlValue::Date),
        "datetime" | "timestamp" => NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(SqlValue::DateTime),
        "time" => NaiveTime::parse_from_str(&s, "%H:%M:%S%.f").ok().map(SqlValue::Time),
        "json" => serde_json::from_str(&s).ok().map(SqlValue::Json),
        _ => None,
    };
    parsed.unwrap_or(SqlValue::Text(s))
}

#[async_trait]
impl SourceReader for MysqlReader {
    fn driver(&self) -> Driver {
        self.driver
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn schema_name(&self) -> Result<String> {
        let current: Option<String> = sqlx::query_scalar("SELECT DATABASE()")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EtlError::connection(&self.endpoint, e))?;
        Ok(current.unwrap_or_else(|| self.database.clone()))
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(&self.dialect.list_tables_query())
            .bind(schema)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EtlError::schema(schema, e))?;

        rows.iter()
            .map(|r| r.try_get::<String, _>(0).map_err(|e| EtlError::schema(schema, e)))
            .collect()
    }

    async fn list_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnSpec>> {
        let rows = sqlx::query(&self.dialect.list_columns_query())
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EtlError::schema(table, e))?;

        rows.iter()
            .map(|r| {
                Ok(ColumnSpec {
                    name: r.try_get("COLUMN_NAME")?,
                    data_type: r.try_get("DATA_TYPE")?,
                    is_nullable: r.try_get::<i64, _>("is_nullable")? == 1,
                    max_length: r.try_get("max_length")?,
                    precision: r.try_get("num_precision")?,
                    scale: r.try_get("num_scale")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| EtlError::schema(table, e))
    }

    async fn list_primary_keys(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(&self.dialect.list_primary_keys_query())
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EtlError::schema(table, e))?;

        rows.iter()
            .map(|r| r.try_get::<String, _>(0).map_err(|e| EtlError::schema(table, e)))
            .collect()
    }

    async fn read_chunk(&self, req: &ChunkRequest) -> Result<Batch> {
        let sql = self.dialect.build_chunk_query(req)?;
        debug!("{}: {}", req.table, sql);

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EtlError::transfer(&req.table, e))?;

        let types: Vec<String> = req.columns.iter().map(|c| c.normalized_type()).collect();
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
        for stmt in self.dialect.constraint_statements(schema, table, enabled)? {
            sqlx::query(&stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| EtlError::schema(table, e))?;
        }
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("Closed MySQL source pool: {}", self.endpoint);
    }
}
