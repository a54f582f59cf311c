//! Operation results returned to callers.
//!
//! Every operation produces an [`OperationReport`] carrying a status flag, a
//! human-readable message and the per-table statistics. Non-fatal failures
//! (index builds, constraint toggles, column fallbacks) are returned as
//! [`EtlWarning`]s rather than errors.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EtlError;

/// Stage of a replication operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Connecting,
    Introspecting,
    Mapping,
    Creating,
    Transferring,
    Indexing,
    Persisting,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Connecting => "connecting",
            Phase::Introspecting => "introspecting",
            Phase::Mapping => "mapping",
            Phase::Creating => "creating",
            Phase::Transferring => "transferring",
            Phase::Indexing => "indexing",
            Phase::Persisting => "persisting",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four replication operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Connect,
    Refresh,
    FullRefresh,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Connect => "connect",
            Operation::Refresh => "refresh",
            Operation::FullRefresh => "full_refresh",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    Failed,
}

/// A failure that did not stop the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtlWarning {
    /// Warehouse (or source) table the warning concerns
    pub table: String,

    /// Phase in which it happened
    pub stage: Phase,

    pub message: String,
}

impl EtlWarning {
    pub fn new(table: impl Into<String>, stage: Phase, message: impl ToString) -> Self {
        Self {
            table: table.into(),
            stage,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for EtlWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.table, self.stage, self.message)
    }
}

/// Statistics for one table loaded by `connect` or a full refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReport {
    pub source_table: String,
    pub warehouse_table: String,
    pub columns_count: usize,
    pub rows_count: u64,
    pub primary_key_columns: Vec<String>,
    /// Indexes built after the load
    pub indexes: Vec<String>,
    pub processing_time_seconds: f64,
    pub rows_per_second: f64,
}

/// Statistics for one table reloaded by `refresh`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshedTable {
    pub source_table: String,
    pub warehouse_table: String,
    pub rows_refreshed: u64,
    pub processing_time_seconds: f64,
}

/// Throughput, zero when no time elapsed.
pub fn rows_per_second(rows: u64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        rows as f64 / seconds
    } else {
        0.0
    }
}

/// Result of one coordinator operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationReport {
    pub operation: Operation,
    pub connection_name: String,
    pub status: OperationStatus,
    pub message: String,
    pub phase: Phase,

    /// Tables created and loaded (connect, full refresh)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<TableReport>,

    /// Tables truncated and reloaded (refresh)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refreshed_tables: Vec<RefreshedTable>,

    /// Source tables that were not processed, with the reason
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_tables: Vec<String>,

    /// Tables dropped (delete, full refresh)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted_tables: Vec<String>,

    pub warnings: Vec<EtlWarning>,
    pub total_tables: usize,
    pub total_rows: u64,
    pub deleted_count: usize,

    /// Error kind when the operation failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    /// Phase that was running when the operation failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_during: Option<Phase>,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl OperationReport {
    /// Empty in-progress report.
    pub fn begin(operation: Operation, connection_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            operation,
            connection_name: connection_name.into(),
            status: OperationStatus::Success,
            message: String::new(),
            phase: Phase::Idle,
            tables: Vec::new(),
            refreshed_tables: Vec::new(),
            skipped_tables: Vec::new(),
            deleted_tables: Vec::new(),
            warnings: Vec::new(),
            total_tables: 0,
            total_rows: 0,
            deleted_count: 0,
            error_kind: None,
            failed_during: None,
            started_at: now,
            completed_at: now,
            duration_seconds: 0.0,
        }
    }

    /// Mark the report failed, keeping the tables completed so far.
    pub fn fail(mut self, err: &EtlError) -> Self {
        self.completed_at = Utc::now();
        self.duration_seconds =
            (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.status = OperationStatus::Failed;
        self.failed_during = Some(self.phase);
        self.message = match self.phase {
            Phase::Idle => format!("{} failed: {}", self.operation, err),
            phase => format!("{} failed during {}: {}", self.operation, phase, err),
        };
        self.phase = Phase::Failed;
        self.error_kind = Some(err.kind().to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }

    pub fn add_warning(&mut self, warning: EtlWarning) {
        self.warnings.push(warning);
    }

    pub fn add_table(&mut self, table: TableReport) {
        self.total_rows += table.rows_count;
        self.tables.push(table);
        self.total_tables = self.tables.len();
    }

    pub fn add_refreshed(&mut self, table: RefreshedTable) {
        self.total_rows += table.rows_refreshed;
        self.refreshed_tables.push(table);
        self.total_tables = self.refreshed_tables.len();
    }

    pub fn add_deleted(&mut self, tables: Vec<String>) {
        self.deleted_count += tables.len();
        self.deleted_tables.extend(tables);
    }

    /// Mark the report done and fill in the summary message.
    pub fn finish(mut self) -> Self {
        self.completed_at = Utc::now();
        self.duration_seconds =
            (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.phase = Phase::Done;
        self.message = self.summary();
        self
    }

    fn summary(&self) -> String {
        let mut msg = match self.operation {
            Operation::Connect | Operation::FullRefresh => format!(
                "{} {}: {} tables, {} rows",
                self.operation, self.connection_name, self.total_tables, self.total_rows
            ),
            Operation::Refresh => format!(
                "refresh {}: {} tables refreshed, {} rows, {} skipped",
                self.connection_name,
                self.refreshed_tables.len(),
                self.total_rows,
                self.skipped_tables.len()
            ),
            Operation::Delete => format!(
                "delete {}: {} tables dropped",
                self.connection_name, self.deleted_count
            ),
        };
        if !self.warnings.is_empty() {
            msg.push_str(&format!(" ({} warnings)", self.warnings.len()));
        }
        msg
    }
}

/// An operation that stopped with an error, with its report up to that
/// point.
#[derive(Debug)]
pub struct OperationFailure {
    pub report: Box<OperationReport>,
    pub error: EtlError,
}

impl OperationFailure {
    pub fn new(report: OperationReport, error: EtlError) -> Self {
        Self {
            report: Box::new(report.fail(&error)),
            error,
        }
    }
}

impl fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.report.message)
    }
}

impl std::error::Error for OperationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<OperationFailure> for EtlError {
    fn from(failure: OperationFailure) -> Self {
        failure.error
    }
}

/// Result of a coordinator operation.
pub type OperationResult = std::result::Result<OperationReport, OperationFailure>;

/// Outcome of `health_check`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub warehouse_connected: bool,
    pub warehouse_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_error: Option<String>,

    /// Endpoint of the checked source, when one was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub source_connected: Option<bool>,
    pub source_latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,

    pub healthy: bool,
}
