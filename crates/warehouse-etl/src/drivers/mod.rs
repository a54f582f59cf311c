//! Database drivers.
//!
//! Each source engine gets a [`Dialect`](crate::core::Dialect) and a
//! [`SourceReader`](crate::core::SourceReader); the warehouse is always
//! PostgreSQL.

pub mod common;
pub mod mssql;
pub mod mysql;
pub mod postgres;

pub use common::SslMode;
pub use mssql::{MssqlDialect, MssqlReader};
pub use mysql::{MysqlDialect, MysqlReader};
pub use postgres::{PgSourceReader, PgWarehouse, PostgresDialect};
