//! PostgreSQL driver: source reader, warehouse writer and shared pool setup.

pub mod dialect;
pub mod reader;
pub mod warehouse;

pub use dialect::PostgresDialect;
pub use reader::PgSourceReader;
pub use warehouse::PgWarehouse;

use std::time::Duration;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::Config as PgConfig;

use crate::drivers::common::{pg_tls_connector, SslMode};
use crate::error::{EtlError, Result};

/// Connection timeout for new connections.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection parameters for a PostgreSQL pool.
pub(crate) struct PgEndpoint<'a> {
    pub host: &'a str,
    pub port: u16,
    pub database: &'a str,
    pub user: &'a str,
    pub password: &'a str,
    pub ssl_mode: SslMode,
}

impl PgEndpoint<'_> {
    pub fn describe(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

/// Build a pool and prove it works with `SELECT 1`.
pub(crate) async fn connect_pool(endpoint: &PgEndpoint<'_>, max_size: usize) -> Result<Pool> {
    let mut pg_config = PgConfig::new();
    pg_config.host(endpoint.host);
    pg_config.port(endpoint.port);
    pg_config.dbname(endpoint.database);
    pg_config.user(endpoint.user);
    pg_config.password(endpoint.password);
    pg_config.ssl_mode(endpoint.ssl_mode.to_pg());
    pg_config.application_name("warehouse-etl");
    pg_config.keepalives(true);
    pg_config.keepalives_idle(Duration::from_secs(30));
    pg_config.connect_timeout(CONNECT_TIMEOUT);

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(pg_config, pg_tls_connector(endpoint.ssl_mode)?, mgr_config);
    let pool = Pool::builder(mgr)
        .max_size(max_size)
        .build()
        .map_err(|e| EtlError::connection(endpoint.describe(), e))?;

    let client = pool
        .get()
        .await
        .map_err(|e| EtlError::connection(endpoint.describe(), e))?;
    client
        .simple_query("SELECT 1")
        .await
        .map_err(|e| EtlError::connection(endpoint.describe(), e))?;

    Ok(pool)
}

/// Render a driver error with the server message when there is one.
pub(crate) fn pg_error_message(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => format!("{}: {}", db.code().code(), db.message()),
        None => err.to_string(),
    }
}
