//! Configuration type definitions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::schema::Driver;
use crate::drivers::common::SslMode;

/// Upper bound on rows read per chunk.
const MAX_CHUNK_SIZE: usize = 500_000;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Warehouse database (PostgreSQL).
    pub warehouse: WarehouseConfig,

    /// Where DataSource records are kept.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Transfer behavior.
    #[serde(default)]
    pub etl: EtlConfig,

    /// Named source descriptors the CLI can connect by name.
    #[serde(default)]
    pub sources: BTreeMap<String, ConnectionDescriptor>,
}

/// Warehouse database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema that receives replicated tables (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// TLS mode (default: prefer).
    #[serde(default)]
    pub ssl_mode: SslMode,

    /// Connection pool size (default: 4).
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

/// DataSource record storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Warehouse schema holding the `datasources` table (default: "etl_meta").
    #[serde(default = "default_metadata_schema")]
    pub schema: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            schema: default_metadata_schema(),
        }
    }
}

/// Transfer behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Rows read from the source per round-trip (default: 5000).
    #[serde(default)]
    pub chunk_size: Option<usize>,

    /// Rows per INSERT statement (default: 1000).
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Also toggle constraint enforcement on the source table (default: true).
    #[serde(default = "default_true")]
    pub toggle_source_constraints: bool,

    /// Apply work_mem / synchronous_commit session settings (default: true).
    #[serde(default = "default_true")]
    pub session_tuning: bool,

    /// Create post-load indexes (default: true).
    #[serde(default = "default_true")]
    pub create_indexes: bool,

    /// Project recorded on new DataSource records (default: 1).
    #[serde(default = "default_project_id")]
    pub default_project_id: i64,

    /// Recorded as created_by/modified_by (default: "system").
    #[serde(default = "default_actor")]
    pub actor: String,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            chunk_size: None,
            batch_size: None,
            toggle_source_constraints: true,
            session_tuning: true,
            create_indexes: true,
            default_project_id: default_project_id(),
            actor: default_actor(),
        }
    }
}

impl EtlConfig {
    /// Get chunk_size with default.
    pub fn get_chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(5000).clamp(1, MAX_CHUNK_SIZE)
    }

    /// Get batch_size with default. Never larger than a chunk.
    pub fn get_batch_size(&self) -> usize {
        self.batch_size
            .unwrap_or(1000)
            .clamp(1, self.get_chunk_size())
    }
}

/// Connection details of one source database.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    /// Database engine.
    pub driver: Driver,

    /// Database host.
    pub host: String,

    /// Database port (default: the driver's conventional port).
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name.
    pub database: String,

    /// Username.
    pub username: String,

    /// Password.
    pub password: String,

    /// TLS mode (default: prefer).
    #[serde(default)]
    pub ssl_mode: SslMode,
}

impl ConnectionDescriptor {
    /// Port, falling back to the driver default.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.driver.default_port())
    }

    /// `host:port/database`, safe for logs.
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port(), self.database)
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port())
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_metadata_schema() -> String {
    "etl_meta".to_string()
}

fn default_pool_size() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_project_id() -> i64 {
    1
}

fn default_actor() -> String {
    "system".to_string()
}
