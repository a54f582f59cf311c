//! Source catalog metadata: driver kinds, tables and column descriptors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EtlError;

/// Supported source database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    #[serde(alias = "pgsql", alias = "postgresql")]
    Postgres,
    Mysql,
    Mariadb,
    #[serde(alias = "sqlsrv", alias = "mssql")]
    Sqlserver,
}

impl Driver {
    /// Canonical lower-case name, as stored in DataSource records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::Postgres => "postgres",
            Driver::Mysql => "mysql",
            Driver::Mariadb => "mariadb",
            Driver::Sqlserver => "sqlserver",
        }
    }

    /// Conventional server port.
    pub fn default_port(&self) -> u16 {
        match self {
            Driver::Postgres => 5432,
            Driver::Mysql | Driver::Mariadb => 3306,
            Driver::Sqlserver => 1433,
        }
    }

    /// MySQL and MariaDB share a wire protocol and catalog layout.
    pub fn is_mysql_family(&self) -> bool {
        matches!(self, Driver::Mysql | Driver::Mariadb)
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Driver {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pgsql" => Ok(Driver::Postgres),
            "mysql" => Ok(Driver::Mysql),
            "mariadb" => Ok(Driver::Mariadb),
            "sqlserver" | "sqlsrv" | "mssql" => Ok(Driver::Sqlserver),
            other => Err(EtlError::Validation(format!(
                "unsupported driver '{}': expected postgres, mysql, mariadb or sqlserver",
                other
            ))),
        }
    }
}

/// One source column as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,

    /// Native type name as the catalog reports it (e.g. `character varying`)
    pub data_type: String,

    /// Whether the column accepts NULL
    pub is_nullable: bool,

    /// Character length for string types (`-1` for MAX on SQL Server)
    pub max_length: Option<i64>,

    /// Numeric precision
    pub precision: Option<i64>,

    /// Numeric scale
    pub scale: Option<i64>,
}

impl ColumnSpec {
    /// Create a column with no length/precision metadata.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, is_nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable,
            max_length: None,
            precision: None,
            scale: None,
        }
    }

    /// Builder-style length setter.
    pub fn with_length(mut self, length: i64) -> Self {
        self.max_length = Some(length);
        self
    }

    /// Builder-style precision/scale setter.
    pub fn with_precision(mut self, precision: i64, scale: i64) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// Lower-cased, trimmed type name used as the type-mapping key.
    pub fn normalized_type(&self) -> String {
        self.data_type.trim().to_lowercase()
    }
}

/// A source table with the metadata needed to replicate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTable {
    /// Schema (or database, for MySQL) the table lives in
    pub schema: String,

    /// Table name
    pub name: String,

    /// Columns in ordinal order
    pub columns: Vec<ColumnSpec>,

    /// Primary key columns in key order; empty when the table has none
    pub primary_key: Vec<String>,
}

impl SourceTable {
    /// Get the full qualified name (schema.table).
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Check if table has a primary key.
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }
}
