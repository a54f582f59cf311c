//! DataSource records: which sources are registered and how to reach them.
//!
//! The [`DataSourceStore`] trait decouples persistence from the coordinator.
//! [`PgDataSourceStore`] keeps the records in the warehouse database; tests
//! use an in-memory implementation.

mod db;

pub use db::PgDataSourceStore;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ConnectionDescriptor;
use crate::core::schema::Driver;
use crate::drivers::common::SslMode;
use crate::error::Result;

/// A registered source database.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    /// Store-assigned id, `None` before the first write.
    pub id: Option<i64>,
    pub project_id: i64,
    /// Connection name, also the warehouse table prefix.
    pub name: String,
    pub driver: Driver,
    pub host: String,
    pub port: u16,
    pub database_name: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub ssl_mode: SslMode,
    pub created_by: String,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_by: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}

impl DataSource {
    /// New, unsaved record for a descriptor.
    pub fn new(
        project_id: i64,
        name: impl Into<String>,
        descriptor: &ConnectionDescriptor,
        actor: &str,
    ) -> Self {
        Self {
            id: None,
            project_id,
            name: name.into(),
            driver: descriptor.driver,
            host: descriptor.host.clone(),
            port: descriptor.port(),
            database_name: descriptor.database.clone(),
            username: descriptor.username.clone(),
            password: descriptor.password.clone(),
            ssl_mode: descriptor.ssl_mode,
            created_by: actor.to_string(),
            created_at: None,
            modified_by: actor.to_string(),
            modified_at: None,
            is_deleted: false,
        }
    }

    /// Connection descriptor stored in this record.
    pub fn to_descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor {
            driver: self.driver,
            host: self.host.clone(),
            port: Some(self.port),
            database: self.database_name.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            ssl_mode: self.ssl_mode,
        }
    }
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSource")
            .field("id", &self.id)
            .field("project_id", &self.project_id)
            .field("name", &self.name)
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("modified_by", &self.modified_by)
            .field("is_deleted", &self.is_deleted)
            .finish()
    }
}

/// Persistence for DataSource records.
#[async_trait]
pub trait DataSourceStore: Send + Sync {
    /// Create the metadata schema and table if missing. Idempotent.
    async fn init_schema(&self) -> Result<()>;

    /// The non-deleted record with this name, if any.
    async fn find_active(&self, name: &str) -> Result<Option<DataSource>>;

    /// Insert or update the non-deleted record keyed by (name, project_id).
    ///
    /// `created_*` is only written on insert; `modified_*` on every call.
    /// Returns the stored record.
    async fn upsert(&self, record: &DataSource) -> Result<DataSource>;

    /// Mark the active record with this name deleted. Returns whether a
    /// record was found.
    async fn soft_delete(&self, name: &str, actor: &str) -> Result<bool>;

    /// All non-deleted records, ordered by name.
    async fn list_active(&self) -> Result<Vec<DataSource>>;
}
