//! Core abstractions shared by drivers and the replication engine.
//!
//! - [`schema`]: driver kinds, source tables and column descriptors
//! - [`value`]: decoded values and row batches
//! - [`traits`]: reader, writer, connector and dialect traits
//! - [`identifier`]: quoting and warehouse naming rules

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{ColumnSpec, Driver, SourceTable};
pub use traits::{
    ChunkRequest, Dialect, SourceConnector, SourceReader, WarehouseColumn, WarehouseWriter,
};
pub use value::{Batch, SqlValue};
