//! SQL Server driver.

pub mod dialect;
pub mod reader;

pub use dialect::MssqlDialect;
pub use reader::MssqlReader;
