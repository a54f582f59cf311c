//! Type mapping from source column descriptors to warehouse columns.
//!
//! [`map_column`] is total: every native type name resolves to a warehouse
//! type. Unknown names fall back to `text` silently; a recognised type with
//! metadata PostgreSQL cannot express (e.g. `numeric(1200,2)`) falls back to
//! `text` with a warning attached to the column.

mod types;

pub use types::{TypeFamily, WarehouseType};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::schema::{ColumnSpec, Driver};

/// Precision used when the catalog reports none for an exact numeric.
pub const DEFAULT_DECIMAL_PRECISION: u32 = 18;

/// Scale used when the catalog reports none for an exact numeric.
pub const DEFAULT_DECIMAL_SCALE: u32 = 2;

/// Longest variable-length string kept as `varchar(n)`; longer or unbounded
/// strings become `text`.
pub const VARCHAR_THRESHOLD: i64 = 255;

const PG_MAX_NUMERIC_PRECISION: i64 = 1000;
const PG_MAX_CHAR_LENGTH: i64 = 10_485_760;

/// Result of mapping one source column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetColumnSpec {
    /// Column name (unchanged from the source)
    pub name: String,

    /// Source native type, for reporting
    pub source_type: String,

    /// Mapped warehouse type
    pub target_type: WarehouseType,

    /// Nullability, always carried over from the source
    pub nullable: bool,

    /// Set when the column fell back to `text` because mapping failed
    pub warning: Option<String>,
}

impl TargetColumnSpec {
    /// Column definition for CREATE TABLE.
    pub fn ddl_type(&self) -> String {
        self.target_type.to_sql()
    }
}

/// Map a source column to its warehouse column.
pub fn map_column(spec: &ColumnSpec, driver: Driver) -> TargetColumnSpec {
    let (target_type, warning) = match try_map(spec, driver) {
        Ok(ty) => (ty, None),
        Err(reason) => {
            let message = format!(
                "column {} ({}) stored as text: {}",
                spec.name, spec.data_type, reason
            );
            warn!("{}", message);
            (WarehouseType::Text, Some(message))
        }
    };

    TargetColumnSpec {
        name: spec.name.clone(),
        source_type: spec.data_type.clone(),
        target_type,
        nullable: spec.is_nullable,
        warning,
    }
}

/// Map every column of a table, preserving order.
pub fn map_columns(specs: &[ColumnSpec], driver: Driver) -> Vec<TargetColumnSpec> {
    specs.iter().map(|s| map_column(s, driver)).collect()
}

fn try_map(spec: &ColumnSpec, driver: Driver) -> Result<WarehouseType, String> {
    let ty = match spec.normalized_type().as_str() {
        // Integers. MySQL unsigned variants widen one step.
        "tinyint" | "tinyint unsigned" | "smallint" | "int2" | "smallserial" => {
            WarehouseType::SmallInt
        }
        "smallint unsigned" | "mediumint" | "mediumint unsigned" | "int" | "integer" | "int4"
        | "serial" | "year" => WarehouseType::Integer,
        "int unsigned" | "integer unsigned" | "bigint" | "int8" | "bigserial" => {
            WarehouseType::BigInt
        }
        "bigint unsigned" => WarehouseType::Decimal {
            precision: 20,
            scale: 0,
        },

        // Exact numerics
        "numeric" | "decimal" | "dec" | "decimal unsigned" => decimal(spec)?,
        "money" | "smallmoney" => WarehouseType::Decimal {
            precision: 19,
            scale: 4,
        },

        // Floating point
        "real" | "float4" => WarehouseType::Real,
        "float" | "double" | "double precision" | "float8" => WarehouseType::Double,

        // SQL Server `timestamp` is a rowversion counter, not a point in time
        "timestamp" | "rowversion" if driver == Driver::Sqlserver => WarehouseType::Bytea,

        // Date/time
        "date" => WarehouseType::Date,
        "time" | "time without time zone" => WarehouseType::Time,
        "timetz" | "time with time zone" => WarehouseType::TimeTz,
        "timestamp" | "timestamp without time zone" | "datetime" | "datetime2"
        | "smalldatetime" => WarehouseType::Timestamp,
        "timestamptz" | "timestamp with time zone" | "datetimeoffset" => {
            WarehouseType::TimestampTz
        }

        // Boolean. MySQL BIT(n) with n > 1 is a bit field, not a flag.
        "bit" if driver.is_mysql_family() && spec.precision.unwrap_or(1) > 1 => {
            WarehouseType::BigInt
        }
        "bit" if driver == Driver::Postgres && spec.max_length.unwrap_or(1) > 1 => {
            WarehouseType::Text
        }
        "boolean" | "bool" | "bit" => WarehouseType::Boolean,

        // Documents and identifiers
        "json" => WarehouseType::Json,
        "jsonb" => WarehouseType::Jsonb,
        "uuid" | "uniqueidentifier" => WarehouseType::Uuid,
        "inet" => WarehouseType::Inet,
        "macaddr" => WarehouseType::MacAddr,

        // Binary
        "bytea" | "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob"
        | "image" => WarehouseType::Bytea,

        // Strings
        "varchar" | "character varying" | "nvarchar" => match spec.max_length {
            Some(n) if n > 0 && n <= VARCHAR_THRESHOLD => WarehouseType::Varchar(n as u32),
            _ => WarehouseType::Text,
        },
        "char" | "character" | "nchar" | "bpchar" => {
            let n = spec.max_length.unwrap_or(1);
            if n < 1 || n > PG_MAX_CHAR_LENGTH {
                return Err(format!("invalid character length {}", n));
            }
            WarehouseType::Char(n as u32)
        }
        "text" | "tinytext" | "mediumtext" | "longtext" | "ntext" | "clob" | "enum" | "set" => {
            WarehouseType::Text
        }

        _ => WarehouseType::Text,
    };
    Ok(ty)
}

fn decimal(spec: &ColumnSpec) -> Result<WarehouseType, String> {
    let precision = spec
        .precision
        .unwrap_or(DEFAULT_DECIMAL_PRECISION as i64);
    let scale = spec.scale.unwrap_or(DEFAULT_DECIMAL_SCALE as i64);

    if precision < 1 || precision > PG_MAX_NUMERIC_PRECISION {
        return Err(format!("numeric precision {} out of range", precision));
    }
    if scale < 0 || scale > precision {
        return Err(format!(
            "numeric scale {} invalid for precision {}",
            scale, precision
        ));
    }

    Ok(WarehouseType::Decimal {
        precision: precision as u32,
        scale: scale as u32,
    })
}
