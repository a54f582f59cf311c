//! Chunked copy of one source table into one warehouse table.
//!
//! Rows are read with OFFSET pagination in a deterministic order, sanitized,
//! stamped with the audit columns and written one transaction per chunk. A
//! failing chunk rolls back alone; chunks committed before it stay.
//! Constraint enforcement is disabled around the copy (and the truncate of a
//! reload) and re-enabled on every exit path.

pub mod sanitize;

use std::time::{Duration, Instant};

use chrono::{SubsecRound, Utc};
use tracing::{debug, info, warn};

use crate::config::EtlConfig;
use crate::core::identifier::{AUDIT_CREATED_AT, AUDIT_UPDATED_AT};
use crate::core::schema::ColumnSpec;
use crate::core::traits::{ChunkRequest, SourceReader, WarehouseColumn, WarehouseWriter};
use crate::core::value::SqlValue;
use crate::error::Result;
use crate::report::{EtlWarning, Phase};
use crate::warehouse::SchemaManager;

pub use sanitize::{default_for, sanitize_row, sanitize_value};

/// Chunking and constraint settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    /// Rows read per source round-trip.
    pub chunk_size: usize,

    /// Rows per INSERT statement.
    pub batch_size: usize,

    /// Also toggle constraint enforcement on the source table.
    pub toggle_source_constraints: bool,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self::from(&EtlConfig::default())
    }
}

impl From<&EtlConfig> for TransferSettings {
    fn from(config: &EtlConfig) -> Self {
        Self {
            chunk_size: config.get_chunk_size(),
            batch_size: config.get_batch_size(),
            toggle_source_constraints: config.toggle_source_constraints,
        }
    }
}

/// One table to copy.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub source_schema: String,
    pub source_table: String,
    pub warehouse_table: String,

    /// Source columns in ordinal order.
    pub source_columns: Vec<ColumnSpec>,

    /// Chunk ordering; empty means `ORDER BY 1`.
    pub order_by: Vec<String>,

    /// Columns of the existing warehouse table.
    pub warehouse_columns: Vec<WarehouseColumn>,

    /// Empty the warehouse table before copying.
    pub truncate_first: bool,
}

/// Result of a completed copy.
#[derive(Debug, Clone, Default)]
pub struct TransferOutcome {
    pub rows: u64,
    pub chunks: usize,
    pub elapsed: Duration,
    pub warnings: Vec<EtlWarning>,
}

/// Stable chunk order: the primary key when there is one, otherwise every
/// column the source can sort on.
pub fn chunk_order(
    primary_key: &[String],
    columns: &[ColumnSpec],
    is_orderable: impl Fn(&ColumnSpec) -> bool,
) -> Vec<String> {
    if !primary_key.is_empty() {
        return primary_key.to_vec();
    }
    columns
        .iter()
        .filter(|c| is_orderable(c))
        .map(|c| c.name.clone())
        .collect()
}

/// Column alignment between a source table and its warehouse table.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPlan {
    /// Source columns to select, all present in the warehouse.
    pub read: Vec<ColumnSpec>,

    /// Warehouse columns to insert: `read` in order, then the audit columns.
    pub write: Vec<WarehouseColumn>,

    /// Number of audit columns at the end of `write`.
    pub audit_columns: usize,

    /// Source columns with no warehouse counterpart.
    pub missing: Vec<String>,
}

impl ColumnPlan {
    pub fn build(source: &[ColumnSpec], warehouse: &[WarehouseColumn]) -> Self {
        let mut read = Vec::with_capacity(source.len());
        let mut write = Vec::with_capacity(source.len() + 2);
        let mut missing = Vec::new();

        for col in source {
            match warehouse.iter().find(|w| w.name == col.name) {
                Some(w) => {
                    read.push(col.clone());
                    write.push(w.clone());
                }
                None => missing.push(col.name.clone()),
            }
        }

        let mut audit_columns = 0;
        for audit in [AUDIT_CREATED_AT, AUDIT_UPDATED_AT] {
            if let Some(w) = warehouse.iter().find(|w| w.name == audit) {
                write.push(w.clone());
                audit_columns += 1;
            }
        }

        Self {
            read,
            write,
            audit_columns,
            missing,
        }
    }
}

/// Copies tables from a source reader into the warehouse.
pub struct BulkTransferEngine<'a> {
    source: &'a dyn SourceReader,
    warehouse: &'a dyn WarehouseWriter,
    settings: TransferSettings,
}

impl<'a> BulkTransferEngine<'a> {
    pub fn new(
        source: &'a dyn SourceReader,
        warehouse: &'a dyn WarehouseWriter,
        settings: TransferSettings,
    ) -> Self {
        Self {
            source,
            warehouse,
            settings,
        }
    }

    /// Copy every row of `job`. Returns the committed row count.
    pub async fn transfer(&self, job: &TransferJob) -> Result<TransferOutcome> {
        let start = Instant::now();
        let plan = ColumnPlan::build(&job.source_columns, &job.warehouse_columns);
        let mut warnings = Vec::new();

        if !plan.missing.is_empty() {
            let message = format!(
                "source columns not in warehouse table, skipped: {}",
                plan.missing.join(", ")
            );
            warn!("{}: {}", job.warehouse_table, message);
            warnings.push(EtlWarning::new(&job.warehouse_table, Phase::Transferring, message));
        }

        let schema = SchemaManager::new(self.warehouse, false);
        warnings.extend(
            schema
                .set_constraint_enforcement(&job.warehouse_table, false)
                .await,
        );
        if self.settings.toggle_source_constraints {
            warnings.extend(self.toggle_source(job, false).await);
        }

        let copied = self.reload(job, &plan).await;

        // Re-enable regardless of the copy outcome
        warnings.extend(
            schema
                .set_constraint_enforcement(&job.warehouse_table, true)
                .await,
        );
        if self.settings.toggle_source_constraints {
            warnings.extend(self.toggle_source(job, true).await);
        }

        let (rows, chunks) = copied?;
        let elapsed = start.elapsed();
        info!(
            "{} -> {}: {} rows in {} chunks ({:.2}s)",
            job.source_table,
            job.warehouse_table,
            rows,
            chunks,
            elapsed.as_secs_f64()
        );

        Ok(TransferOutcome {
            rows,
            chunks,
            elapsed,
            warnings,
        })
    }

    async fn toggle_source(&self, job: &TransferJob, enabled: bool) -> Option<EtlWarning> {
        match self
            .source
            .set_constraint_enforcement(&job.source_schema, &job.source_table, enabled)
            .await
        {
            Ok(()) => None,
            Err(e) => {
                warn!("{}: source constraint toggle failed: {}", job.source_table, e);
                Some(EtlWarning::new(
                    &job.source_table,
                    Phase::Transferring,
                    format!("source constraint toggle failed: {}", e),
                ))
            }
        }
    }

    async fn reload(&self, job: &TransferJob, plan: &ColumnPlan) -> Result<(u64, usize)> {
        if job.truncate_first {
            self.warehouse.truncate_table(&job.warehouse_table).await?;
            debug!("{}: truncated", job.warehouse_table);
        }
        self.copy_chunks(job, plan).await
    }

    async fn copy_chunks(&self, job: &TransferJob, plan: &ColumnPlan) -> Result<(u64, usize)> {
        let chunk_size = self.settings.chunk_size.max(1);
        let value_columns = &plan.write[..plan.read.len()];
        let mut offset = 0u64;
        let mut total = 0u64;
        let mut chunks = 0usize;

        loop {
            let req = ChunkRequest {
                schema: job.source_schema.clone(),
                table: job.source_table.clone(),
                columns: plan.read.clone(),
                order_by: job.order_by.clone(),
                offset,
                limit: chunk_size,
            };
            let batch = self.source.read_chunk(&req).await?;
            let fetched = batch.len();
            if fetched == 0 {
                break;
            }

            // One stamp per chunk, at second precision
            let stamp = SqlValue::DateTime(Utc::now().trunc_subsecs(0).naive_utc());
            let rows: Vec<Vec<SqlValue>> = batch
                .rows
                .into_iter()
                .map(|row| {
                    let mut row = sanitize_row(row, value_columns);
                    row.extend(std::iter::repeat(stamp.clone()).take(plan.audit_columns));
                    row
                })
                .collect();

            let written = self
                .warehouse
                .insert_chunk(&job.warehouse_table, &plan.write, &rows, self.settings.batch_size)
                .await?;

            total += written;
            chunks += 1;
            offset += fetched as u64;
            debug!(
                "{}: chunk {} committed ({} rows, {} total)",
                job.warehouse_table, chunks, written, total
            );

            if fetched < chunk_size {
                break;
            }
        }

        Ok((total, chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wcol(name: &str, sql_type: &str) -> WarehouseColumn {
        WarehouseColumn::from_catalog(name, sql_type, true, None)
    }

    #[test]
    fn test_plan_aligns_and_appends_audit() {
        let source = vec![
            ColumnSpec::new("id", "int", false),
            ColumnSpec::new("dropped", "text", true),
            ColumnSpec::new("name", "varchar", true),
        ];
        let warehouse = vec![
            wcol("id", "integer"),
            wcol("name", "character varying(20)"),
            wcol(AUDIT_CREATED_AT, "timestamp(0) without time zone"),
            wcol(AUDIT_UPDATED_AT, "timestamp(0) without time zone"),
        ];
        let plan = ColumnPlan::build(&source, &warehouse);

        let read: Vec<&str> = plan.read.iter().map(|c| c.name.as_str()).collect();
        let write: Vec<&str> = plan.write.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(read, vec!["id", "name"]);
        assert_eq!(write, vec!["id", "name", AUDIT_CREATED_AT, AUDIT_UPDATED_AT]);
        assert_eq!(plan.audit_columns, 2);
        assert_eq!(plan.missing, vec!["dropped"]);
    }

    #[test]
    fn test_chunk_order_prefers_primary_key() {
        let cols = vec![
            ColumnSpec::new("doc", "json", true),
            ColumnSpec::new("a", "int", false),
            ColumnSpec::new("b", "int", false),
        ];
        let orderable = |c: &ColumnSpec| c.data_type != "json";

        assert_eq!(chunk_order(&["b".to_string()], &cols, orderable), vec!["b"]);
        assert_eq!(chunk_order(&[], &cols, orderable), vec!["a", "b"]);
        assert!(chunk_order(&[], &cols[..1], orderable).is_empty());
    }

    #[test]
    fn test_settings_from_config() {
        let settings = TransferSettings::default();
        assert_eq!(settings.chunk_size, 5000);
        assert_eq!(settings.batch_size, 1000);
        assert!(settings.toggle_source_constraints);
    }
}
