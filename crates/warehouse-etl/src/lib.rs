//! # warehouse-etl
//!
//! Replicates operational databases into a central PostgreSQL warehouse.
//!
//! Every table of a registered source lands in the warehouse as
//! `{source}__{table}`, with mapped column types and two audit columns.
//! Supported sources:
//!
//! - **PostgreSQL** via `deadpool-postgres`
//! - **MySQL / MariaDB** via `sqlx`
//! - **SQL Server** via `tiberius`
//!
//! Operations (see [`ReplicationCoordinator`]):
//!
//! - `connect`: register a source and load all of its tables
//! - `refresh`: truncate and reload the existing tables of a source
//! - `full_refresh`: drop and reload every table of a source
//! - `delete`: drop the tables of a source and soft-delete its record
//!
//! ## Example
//!
//! ```rust,no_run
//! use warehouse_etl::{Config, ReplicationCoordinator};
//!
//! #[tokio::main]
//! async fn main() -> warehouse_etl::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let coordinator = ReplicationCoordinator::from_config(&config).await?;
//!     let report = coordinator.refresh("shop1").await?;
//!     println!("Refreshed {} rows", report.total_rows);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod state;
pub mod transfer;
pub mod typemap;
pub mod warehouse;

// Re-exports for convenient access
pub use config::{Config, ConnectionDescriptor, EtlConfig, WarehouseConfig};
pub use crate::core::{
    Batch, ChunkRequest, ColumnSpec, Dialect, Driver, SourceConnector, SourceReader, SourceTable,
    SqlValue, WarehouseColumn, WarehouseWriter,
};
pub use drivers::SslMode;
pub use error::{EtlError, Result};
pub use orchestrator::{Catalog, CatalogGroup, ConnectionRegistry, ReplicationCoordinator};
pub use report::{
    EtlWarning, HealthReport, Operation, OperationFailure, OperationReport, OperationResult,
    OperationStatus, Phase, RefreshedTable, TableReport,
};
pub use state::{DataSource, DataSourceStore, PgDataSourceStore};
pub use transfer::{BulkTransferEngine, TransferJob, TransferSettings};
pub use typemap::{map_column, TargetColumnSpec, TypeFamily, WarehouseType};
