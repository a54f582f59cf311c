//! Canonical warehouse column types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A PostgreSQL column type in the warehouse.
///
/// Temporal types are always declared with second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarehouseType {
    SmallInt,
    Integer,
    BigInt,
    Decimal { precision: u32, scale: u32 },
    Real,
    Double,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Boolean,
    Json,
    Jsonb,
    Uuid,
    Inet,
    MacAddr,
    Bytea,
    Varchar(u32),
    Char(u32),
    Text,
}

impl WarehouseType {
    /// DDL rendering of the type.
    pub fn to_sql(&self) -> String {
        match self {
            WarehouseType::SmallInt => "smallint".into(),
            WarehouseType::Integer => "integer".into(),
            WarehouseType::BigInt => "bigint".into(),
            WarehouseType::Decimal { precision, scale } => {
                format!("decimal({},{})", precision, scale)
            }
            WarehouseType::Real => "real".into(),
            WarehouseType::Double => "double precision".into(),
            WarehouseType::Date => "date".into(),
            WarehouseType::Time => "time(0) without time zone".into(),
            WarehouseType::TimeTz => "time(0) with time zone".into(),
            WarehouseType::Timestamp => "timestamp(0) without time zone".into(),
            WarehouseType::TimestampTz => "timestamp(0) with time zone".into(),
            WarehouseType::Boolean => "boolean".into(),
            WarehouseType::Json => "json".into(),
            WarehouseType::Jsonb => "jsonb".into(),
            WarehouseType::Uuid => "uuid".into(),
            WarehouseType::Inet => "inet".into(),
            WarehouseType::MacAddr => "macaddr".into(),
            WarehouseType::Bytea => "bytea".into(),
            WarehouseType::Varchar(n) => format!("varchar({})", n),
            WarehouseType::Char(n) => format!("char({})", n),
            WarehouseType::Text => "text".into(),
        }
    }

    /// Default-substitution family of the type.
    pub fn family(&self) -> TypeFamily {
        match self {
            WarehouseType::SmallInt
            | WarehouseType::Integer
            | WarehouseType::BigInt
            | WarehouseType::Decimal { .. }
            | WarehouseType::Real
            | WarehouseType::Double => TypeFamily::Numeric,
            WarehouseType::Date => TypeFamily::Date,
            WarehouseType::Time | WarehouseType::TimeTz => TypeFamily::Time,
            WarehouseType::Timestamp => TypeFamily::Timestamp,
            WarehouseType::TimestampTz => TypeFamily::TimestampTz,
            WarehouseType::Boolean => TypeFamily::Boolean,
            WarehouseType::Json | WarehouseType::Jsonb => TypeFamily::Json,
            WarehouseType::Uuid => TypeFamily::Uuid,
            WarehouseType::Inet => TypeFamily::Inet,
            WarehouseType::MacAddr => TypeFamily::MacAddr,
            WarehouseType::Bytea => TypeFamily::Binary,
            WarehouseType::Varchar(_) | WarehouseType::Char(_) | WarehouseType::Text => {
                TypeFamily::Text
            }
        }
    }

    /// Numeric or temporal types qualify for a post-load index.
    pub fn is_indexable(&self) -> bool {
        self.family().is_numeric() || self.family().is_temporal()
    }
}

impl fmt::Display for WarehouseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Coarse grouping of warehouse types that drives default substitution
/// for non-nullable columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeFamily {
    Numeric,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Boolean,
    Json,
    Inet,
    MacAddr,
    Binary,
    Text,
}

impl TypeFamily {
    pub fn is_numeric(&self) -> bool {
        matches!(self, TypeFamily::Numeric)
    }

    /// Dates and timestamps (time-of-day is not included).
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            TypeFamily::Date | TypeFamily::Timestamp | TypeFamily::TimestampTz
        )
    }

    /// Classify a type as rendered by PostgreSQL's `format_type()`,
    /// e.g. `character varying(255)` or `timestamp(0) without time zone`.
    pub fn from_pg_type(sql_type: &str) -> Self {
        let t = sql_type.trim().to_lowercase();
        let base = t.split('(').next().unwrap_or("").trim();

        match base {
            "smallint" | "integer" | "bigint" | "numeric" | "decimal" | "real"
            | "double precision" | "money" => TypeFamily::Numeric,
            "uuid" => TypeFamily::Uuid,
            "date" => TypeFamily::Date,
            "boolean" => TypeFamily::Boolean,
            "json" | "jsonb" => TypeFamily::Json,
            "inet" | "cidr" => TypeFamily::Inet,
            "macaddr" => TypeFamily::MacAddr,
            "bytea" => TypeFamily::Binary,
            _ if base.starts_with("timestamp") => {
                if t.contains("with time zone") {
                    TypeFamily::TimestampTz
                } else {
                    TypeFamily::Timestamp
                }
            }
            _ if base.starts_with("time") => TypeFamily::Time,
            _ => TypeFamily::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_sql() {
        assert_eq!(
            WarehouseType::Decimal { precision: 10, scale: 2 }.to_sql(),
            "decimal(10,2)"
        );
        assert_eq!(WarehouseType::Varchar(80).to_sql(), "varchar(80)");
        assert_eq!(WarehouseType::Timestamp.to_sql(), "timestamp(0) without time zone");
    }

    #[test]
    fn test_indexable() {
        assert!(WarehouseType::Integer.is_indexable());
        assert!(WarehouseType::Decimal { precision: 10, scale: 2 }.is_indexable());
        assert!(WarehouseType::Date.is_indexable());
        assert!(WarehouseType::TimestampTz.is_indexable());
        assert!(!WarehouseType::Time.is_indexable());
        assert!(!WarehouseType::Text.is_indexable());
        assert!(!WarehouseType::Uuid.is_indexable());
    }

    #[test]
    fn test_family_from_pg_type() {
        assert_eq!(TypeFamily::from_pg_type("integer"), TypeFamily::Numeric);
        assert_eq!(TypeFamily::from_pg_type("numeric(10,2)"), TypeFamily::Numeric);
        assert_eq!(TypeFamily::from_pg_type("double precision"), TypeFamily::Numeric);
        assert_eq!(
            TypeFamily::from_pg_type("timestamp(0) without time zone"),
            TypeFamily::Timestamp
        );
        assert_eq!(
            TypeFamily::from_pg_type("timestamp(0) with time zone"),
            TypeFamily::TimestampTz
        );
        assert_eq!(TypeFamily::from_pg_type("time(0) without time zone"), TypeFamily::Time);
        assert_eq!(
            TypeFamily::from_pg_type("timestamp with time zone"),
            TypeFamily::TimestampTz
        );
        assert_eq!(TypeFamily::from_pg_type("character varying(255)"), TypeFamily::Text);
        assert_eq!(TypeFamily::from_pg_type("USER-DEFINED"), TypeFamily::Text);
    }

    #[test]
    fn test_family_round_trips_through_ddl() {
        for ty in [
            WarehouseType::SmallInt,
            WarehouseType::Decimal { precision: 19, scale: 4 },
            WarehouseType::Date,
            WarehouseType::Time,
            WarehouseType::Timestamp,
            WarehouseType::TimestampTz,
            WarehouseType::Boolean,
            WarehouseType::Jsonb,
            WarehouseType::Uuid,
            WarehouseType::Bytea,
            WarehouseType::Char(3),
        ] {
            assert_eq!(TypeFamily::from_pg_type(&ty.to_sql()), ty.family(), "{}", ty);
        }
    }
}
