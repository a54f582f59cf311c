//! Functionality shared across database drivers.

pub mod tls;

pub use tls::{pg_tls_connector, SslMode};
