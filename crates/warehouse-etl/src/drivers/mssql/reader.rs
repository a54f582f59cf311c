//! SQL Server source reader.
//!
//! Uses Tiberius pooled through bb8. The pool holds one connection so
//! statements issued by the engine run on the connection that reads.

use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Query, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};
use uuid::Uuid;

use super::dialect::MssqlDialect;
use crate::config::ConnectionDescriptor;
use crate::core::schema::{ColumnSpec, Driver};
use crate::core::traits::{ChunkRequest, Dialect, SourceReader};
use crate::core::value::{Batch, SqlValue};
use crate::drivers::common::SslMode;
use crate::error::{EtlError, Result};

/// Maximum TDS packet size.
const TDS_MAX_PACKET_SIZE: u32 = 32767;

/// Connection acquisition timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection manager for bb8 pool with Tiberius.
#[derive(Clone)]
struct TiberiusConnectionManager {
    descriptor: ConnectionDescriptor,
}

impl TiberiusConnectionManager {
    fn build_config(&self) -> Config {
        let d = &self.descriptor;
        let mut config = Config::new();
        config.host(&d.host);
        config.port(d.port());
        config.database(&d.database);
        config.authentication(AuthMethod::sql_server(&d.username, &d.password));
        config.application_name("warehouse-etl");

        match d.ssl_mode {
            SslMode::Disable => config.encryption(EncryptionLevel::NotSupported),
            SslMode::Prefer => {
                config.trust_cert();
                config.encryption(EncryptionLevel::Off);
            }
            SslMode::Require => {
                config.trust_cert();
                config.encryption(EncryptionLevel::Required);
            }
            SslMode::VerifyCa | SslMode::VerifyFull => {
                config.encryption(EncryptionLevel::Required)
            }
        }

        config.packet_size(TDS_MAX_PACKET_SIZE);
        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            })?;
        tcp.set_nodelay(true).ok();
        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Reads catalog metadata and rows from SQL Server.
pub struct MssqlReader {
    pool: Pool<TiberiusConnectionManager>,
    dialect: MssqlDialect,
    endpoint: String,
}

impl MssqlReader {
    /// Open the pool and verify the connection.
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let endpoint = descriptor.endpoint();
        let manager = TiberiusConnectionManager {
            descriptor: descriptor.clone(),
        };
        let pool = Pool::builder()
            .max_size(1)
            .connection_timeout(POOL_CONNECTION_TIMEOUT)
            .build(manager)
            .await
            .map_err(|e| EtlError::connection(&endpoint, e))?;

        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| EtlError::connection(&endpoint, e))?;
            conn.simple_query("SELECT 1")
                .await
                .map_err(|e| EtlError::connection(&endpoint, e))?
                .into_row()
                .await
                .map_err(|e| EtlError::connection(&endpoint, e))?;
        }

        info!("Connected to SQL Server source: {}", endpoint);

        Ok(Self {
            pool,
            dialect: MssqlDialect::new(),
            endpoint,
        })
    }

    async fn get_client(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| EtlError::connection(&self.endpoint, e))
    }

    /// Run a catalog query bound to schema (and optionally table).
    async fn catalog_query(&self, sql: String, binds: &[&str], context: &str) -> Result<Vec<Row>> {
        let mut conn = self.get_client().await?;
        let mut query = Query::new(sql);
        for b in binds {
            query.bind(b.to_string());
        }
        let stream = query
            .query(&mut *conn)
            .await
            .map_err(|e| EtlError::schema(context, e))?;
        stream
            .into_first_result()
            .await
            .map_err(|e| EtlError::schema(context, e))
    }

    fn decode(row: &Row, idx: usize, data_type: &str) -> tiberius::Result<SqlValue> {
        let value = match data_type {
            "bit" => row.try_get::<bool, _>(idx)?.map(SqlValue::Bool),
            "tinyint" => row.try_get::<u8, _>(idx)?.map(|v| SqlValue::I64(v.into())),
            "smallint" => row.try_get::<i16, _>(idx)?.map(|v| SqlValue::I64(v.into())),
            "int" => row.try_get::<i32, _>(idx)?.map(|v| SqlValue::I64(v.into())),
            "bigint" => row.try_get::<i64, _>(idx)?.map(SqlValue::I64),
            "real" => row.try_get::<f32, _>(idx)?.map(|v| SqlValue::F64(v.into())),
            "float" => row.try_get::<f64, _>(idx)?.map(SqlValue::F64),
            "decimal" | "numeric" | "money" | "smallmoney" => {
                row.try_get::<Decimal, _>(idx)?.map(SqlValue::Decimal)
            }
            "uniqueidentifier" => row.try_get::<Uuid, _>(idx)?.map(SqlValue::Uuid),
            "date" => row.try_get::<NaiveDate, _>(idx)?.map(SqlValue::Date),
            "time" => row.try_get::<NaiveTime, _>(idx)?.map(SqlValue::Time),
            "datetime" | "datetime2" | "smalldatetime" => row
                .try_get::<NaiveDateTime, _>(idx)?
                .map(SqlValue::DateTime),
            "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => row
                .try_get::<&[u8], _>(idx)?
                .map(|b| SqlValue::Bytes(b.to_vec())),
            // Character types and columns converted to text in the SELECT
            _ => row
                .try_get::<&str, _>(idx)?
                .map(|s| SqlValue::Text(s.to_string())),
        };
        Ok(value.unwrap_or(SqlValue::Null))
    }
}

#[async_trait]
impl SourceReader for MssqlReader {
    fn driver(&self) -> Driver {
        Driver::Sqlserver
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn schema_name(&self) -> Result<String> {
        Ok(self.dialect.fixed_schema().unwrap_or("dbo").to_string())
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let rows = self
            .catalog_query(self.dialect.list_tables_query(), &[schema], schema)
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.try_get::<&str, _>(0).ok().flatten().map(str::to_string))
            .collect())
    }

    async fn list_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnSpec>> {
        let rows = self
            .catalog_query(self.dialect.list_columns_query(), &[schema, table], table)
            .await?;

        rows.iter()
            .map(|r| {
                Ok(ColumnSpec {
                    name: r.try_get::<&str, _>(0)?.unwrap_or_default().to_string(),
                    data_type: r.try_get::<&str, _>(1)?.unwrap_or_default().to_string(),
                    is_nullable: r.try_get::<i32, _>(2)?.unwrap_or(0) == 1,
                    max_length: r.try_get::<i64, _>(3)?,
                    precision: r.try_get::<i64, _>(4)?,
                    scale: r.try_get::<i64, _>(5)?,
                })
            })
            .collect::<tiberius::Result<Vec<_>>>()
            .map_err(|e| EtlError::schema(table, e))
    }

    async fn list_primary_keys(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        let rows = self
            .catalog_query(self.dialect.list_primary_keys_query(), &[schema, table], table)
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.try_get::<&str, _>(0).ok().flatten().map(str::to_string))
            .collect())
    }

    async fn read_chunk(&self, req: &ChunkRequest) -> Result<Batch> {
        let sql = self.dialect.build_chunk_query(req)?;
        debug!("{}: {}", req.table, sql);

        let mut conn = self.get_client().await?;
        let rows = conn
            .simple_query(sql)
            .await
            .map_err(|e| EtlError::transfer(&req.table, e))?
            .into_first_result()
            .await
            .map_err(|e| EtlError::transfer(&req.table, e))?;

        let types: Vec<String> = req.columns.iter().map(|c| c.normalized_type()).collect();
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let values = types
                .iter()
                .enumerate()
                .map(|(i, t)| Self::decode(row, i, t))
                .collect::<tiberius::Result<Vec<_>>>()
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
        let mut conn = self.get_client().await?;
        for stmt in self.dialect.constraint_statements(schema, table, enabled)? {
            conn.execute(stmt, &[])
                .await
                .map_err(|e| EtlError::schema(table, e))?;
        }
        Ok(())
    }

    async fn close(&self) {
        // bb8 has no explicit shutdown; the pooled connection closes when the
        // reader, which owns the only pool handle, is dropped.
        debug!("Releasing SQL Server source pool: {}", self.endpoint);
    }
}
