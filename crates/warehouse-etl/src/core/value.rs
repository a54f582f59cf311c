//! SQL value types moved between sources and the warehouse.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A decoded source value.
///
/// Every driver decodes into this enum; the warehouse writer renders it as a
/// text parameter and lets PostgreSQL cast it to the column type.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// Any integer width, widened to 64 bits.
    I64(i64),

    /// Any floating point width, widened to 64 bits.
    F64(f64),

    /// Exact numeric (decimal/numeric/money).
    Decimal(Decimal),

    /// Character data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// UUID / uniqueidentifier.
    Uuid(Uuid),

    /// Date without time.
    Date(NaiveDate),

    /// Time of day without date.
    Time(NaiveTime),

    /// Timestamp without time zone.
    DateTime(NaiveDateTime),

    /// Timestamp with offset (timestamptz, datetimeoffset).
    DateTimeOffset(DateTime<FixedOffset>),

    /// JSON document.
    Json(serde_json::Value),
}

impl SqlValue {
    /// Check if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// NULL, or a string that is empty after trimming whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            SqlValue::Null => true,
            SqlValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text rendering accepted by PostgreSQL's input functions, `None` for NULL.
    pub fn to_pg_text(&self) -> Option<String> {
        let text = match self {
            SqlValue::Null => return None,
            SqlValue::Bool(b) => b.to_string(),
            SqlValue::I64(i) => i.to_string(),
            SqlValue::F64(f) => {
                if f.is_nan() {
                    "NaN".to_string()
                } else if *f == f64::INFINITY {
                    "Infinity".to_string()
                } else if *f == f64::NEG_INFINITY {
                    "-Infinity".to_string()
                } else {
                    f.to_string()
                }
            }
            SqlValue::Decimal(d) => d.to_string(),
            // PostgreSQL text columns reject NUL bytes.
            SqlValue::Text(s) => s.replace('\0', ""),
            SqlValue::Bytes(b) => format!("\\x{}", hex::encode(b)),
            SqlValue::Uuid(u) => u.to_string(),
            SqlValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            SqlValue::Time(t) => t.format("%H:%M:%S%.f").to_string(),
            SqlValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            SqlValue::DateTimeOffset(dt) => dt.to_rfc3339(),
            SqlValue::Json(v) => v.to_string(),
        };
        Some(text)
    }
}

/// One chunk of source rows sharing a column list.
///
/// Each row is positionally aligned with `columns`; [`Batch::named_row`]
/// yields the ordered `(column, value)` pairs of a row.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Column names in select order.
    pub columns: Vec<String>,

    /// Row data.
    pub rows: Vec<Vec<SqlValue>>,
}

impl Batch {
    /// Create a new batch.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Ordered `(column, value)` pairs for row `idx`.
    pub fn named_row(&self, idx: usize) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.rows.get(idx).into_iter().flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_detection() {
        assert!(SqlValue::Null.is_blank());
        assert!(SqlValue::Text("   ".into()).is_blank());
        assert!(SqlValue::Text(String::new()).is_blank());
        assert!(!SqlValue::Text(" x ".into()).is_blank());
        assert!(!SqlValue::I64(0).is_blank());
    }

    #[test]
    fn test_pg_text_rendering() {
        assert_eq!(SqlValue::Null.to_pg_text(), None);
        assert_eq!(SqlValue::Bool(true).to_pg_text().unwrap(), "true");
        assert_eq!(SqlValue::Bytes(vec![0xde, 0xad]).to_pg_text().unwrap(), "\\xdead");
        assert_eq!(SqlValue::F64(f64::NEG_INFINITY).to_pg_text().unwrap(), "-Infinity");
        assert_eq!(SqlValue::Text("a\0b".into()).to_pg_text().unwrap(), "ab");

        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 5)
            .unwrap();
        assert_eq!(
            SqlValue::DateTime(dt).to_pg_text().unwrap(),
            "2024-03-01 12:30:05"
        );
    }

    #[test]
    fn test_named_row_pairs() {
        let batch = Batch::new(
            vec!["id".into(), "name".into()],
            vec![vec![SqlValue::I64(1), SqlValue::Text("a".into())]],
        );
        let pairs: Vec<_> = batch.named_row(0).collect();
        assert_eq!(pairs[0], ("id", &SqlValue::I64(1)));
        assert_eq!(pairs[1].0, "name");
        assert_eq!(batch.named_row(5).count(), 0);
    }
}
