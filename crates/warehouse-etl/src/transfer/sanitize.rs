//! Default substitution for values headed to the warehouse.

use chrono::{DateTime, NaiveTime};
use uuid::Uuid;

use crate::core::traits::WarehouseColumn;
use crate::core::value::SqlValue;
use crate::typemap::TypeFamily;

/// Sentinel stored for missing text in non-nullable columns.
pub const UNKNOWN: &str = "unknown";

/// Value substituted for NULL/blank input in a non-nullable column.
pub fn default_for(family: TypeFamily) -> SqlValue {
    match family {
        TypeFamily::Numeric => SqlValue::I64(0),
        TypeFamily::Uuid => SqlValue::Uuid(Uuid::nil()),
        TypeFamily::Date => SqlValue::Date(DateTime::UNIX_EPOCH.date_naive()),
        TypeFamily::Timestamp => SqlValue::DateTime(DateTime::UNIX_EPOCH.naive_utc()),
        TypeFamily::TimestampTz => SqlValue::DateTimeOffset(DateTime::UNIX_EPOCH.fixed_offset()),
        TypeFamily::Time => SqlValue::Time(NaiveTime::MIN),
        TypeFamily::Boolean => SqlValue::Bool(false),
        TypeFamily::Json => SqlValue::Json(serde_json::Value::String(UNKNOWN.to_string())),
        TypeFamily::Inet => SqlValue::Text("0.0.0.0".to_string()),
        TypeFamily::MacAddr => SqlValue::Text("00:00:00:00:00:00".to_string()),
        TypeFamily::Binary => SqlValue::Bytes(Vec::new()),
        TypeFamily::Text => SqlValue::Text(UNKNOWN.to_string()),
    }
}

/// Blank strings become NULL in nullable columns; NULL or blank input in a
/// non-nullable column becomes the family default.
pub fn sanitize_value(value: SqlValue, column: &WarehouseColumn) -> SqlValue {
    if !value.is_blank() {
        return value;
    }
    if column.nullable {
        SqlValue::Null
    } else {
        default_for(column.family)
    }
}

/// Sanitize a row positionally aligned with `columns`.
pub fn sanitize_row(row: Vec<SqlValue>, columns: &[WarehouseColumn]) -> Vec<SqlValue> {
    row.into_iter()
        .zip(columns)
        .map(|(value, column)| sanitize_value(value, column))
        .collect()
}
