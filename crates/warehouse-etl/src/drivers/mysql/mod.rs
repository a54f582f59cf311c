//! MySQL/MariaDB driver.

pub mod dialect;
pub mod reader;

pub use dialect::MysqlDialect;
pub use reader::MysqlReader;
