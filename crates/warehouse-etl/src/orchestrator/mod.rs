//! Replication coordinator: drives connect, refresh, full refresh and delete.
//!
//! Each operation claims the DataSource name, opens its own source reader,
//! walks the source tables in catalog order and releases the reader on every
//! exit path. The warehouse writer and the DataSource store are shared.

pub mod catalog;
pub mod guard;
pub mod registry;

pub use catalog::{group_tables_by_prefix, Catalog, CatalogGroup, DataSourceSummary};
pub use guard::{OperationGuard, OperationLease, SourceLease};
pub use registry::ConnectionRegistry;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::config::{Config, ConnectionDescriptor, EtlConfig};
use crate::core::identifier::{table_prefix, validate_source_name, warehouse_table_name};
use crate::core::schema::SourceTable;
use crate::core::traits::{SourceConnector, SourceReader, WarehouseColumn, WarehouseWriter};
use crate::drivers::PgWarehouse;
use crate::error::{EtlError, Result};
use crate::report::{
    rows_per_second, EtlWarning, HealthReport, Operation, OperationFailure, OperationReport,
    OperationResult, Phase, RefreshedTable, TableReport,
};
use crate::state::{DataSource, DataSourceStore, PgDataSourceStore};
use crate::transfer::{
    chunk_order, BulkTransferEngine, TransferJob, TransferOutcome, TransferSettings,
};
use crate::typemap::map_columns;
use crate::warehouse::SchemaManager;

/// Entry point for the replication operations.
pub struct ReplicationCoordinator {
    warehouse: Arc<dyn WarehouseWriter>,
    store: Arc<dyn DataSourceStore>,
    connector: Arc<dyn SourceConnector>,
    etl: EtlConfig,
    warehouse_schema: String,
    guard: OperationGuard,
}

fn enter(report: &mut OperationReport, phase: Phase) {
    debug!(
        "{} {}: {} -> {}",
        report.operation, report.connection_name, report.phase, phase
    );
    report.phase = phase;
}

impl ReplicationCoordinator {
    pub fn new(
        warehouse: Arc<dyn WarehouseWriter>,
        store: Arc<dyn DataSourceStore>,
        connector: Arc<dyn SourceConnector>,
        etl: EtlConfig,
    ) -> Self {
        Self {
            warehouse,
            store,
            connector,
            etl,
            warehouse_schema: "public".to_string(),
            guard: OperationGuard::new(),
        }
    }

    /// Schema reported by `catalog`.
    pub fn with_warehouse_schema(mut self, schema: impl Into<String>) -> Self {
        self.warehouse_schema = schema.into();
        self
    }

    /// Connect to the warehouse, prepare the metadata store and wire up the
    /// production source drivers.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let warehouse = PgWarehouse::connect(&config.warehouse, config.etl.session_tuning).await?;
        let store = PgDataSourceStore::new(warehouse.pool().clone(), &config.metadata.schema)?;
        store.init_schema().await?;

        Ok(Self::new(
            Arc::new(warehouse),
            Arc::new(store),
            Arc::new(ConnectionRegistry::new(config.etl.session_tuning)),
            config.etl.clone(),
        )
        .with_warehouse_schema(config.warehouse.schema.clone()))
    }

    fn settings(&self) -> TransferSettings {
        TransferSettings::from(&self.etl)
    }

    fn schema_manager(&self) -> SchemaManager<'_> {
        SchemaManager::new(self.warehouse.as_ref(), self.etl.create_indexes)
    }

    /// Finish the report, or fail it at the phase the error surfaced in.
    fn conclude(&self, report: OperationReport, result: Result<()>) -> OperationResult {
        match result {
            Ok(()) => {
                let report = report.finish();
                info!("{}", report.message);
                Ok(report)
            }
            Err(e) => {
                let failure = OperationFailure::new(report, e);
                error!("{}", failure);
                Err(failure)
            }
        }
    }

    /// Register a new source and run the initial load.
    ///
    /// Fails with `Validation` when the name is malformed or already owns
    /// warehouse tables. The failure carries the report as far as it got.
    pub async fn connect(&self, name: &str, descriptor: &ConnectionDescriptor) -> OperationResult {
        let mut report = OperationReport::begin(Operation::Connect, name);
        let result = async {
            validate_source_name(name)?;
            descriptor.validate()?;
            let _lease = self.guard.acquire(name)?;
            self.connect_inner(name, descriptor, &mut report).await
        }
        .await;
        self.conclude(report, result)
    }

    async fn connect_inner(
        &self,
        name: &str,
        descriptor: &ConnectionDescriptor,
        report: &mut OperationReport,
    ) -> Result<()> {
        let existing = self
            .warehouse
            .list_tables_with_prefix(&table_prefix(name))
            .await?;
        if !existing.is_empty() {
            return Err(EtlError::Validation(format!(
                "connection name '{}' is already in use by {} warehouse tables; use full refresh",
                name,
                existing.len()
            )));
        }

        self.load_and_register(name, descriptor, report).await
    }

    /// Reload every existing warehouse table of a registered source.
    /// Tables missing from the warehouse are skipped, never created.
    pub async fn refresh(&self, name: &str) -> OperationResult {
        let mut report = OperationReport::begin(Operation::Refresh, name);
        let result = async {
            validate_source_name(name)?;
            let _lease = self.guard.acquire(name)?;
            self.refresh_inner(name, &mut report).await
        }
        .await;
        self.conclude(report, result)
    }

    async fn refresh_inner(&self, name: &str, report: &mut OperationReport) -> Result<()> {
        let record = self.active_source(name).await?;

        enter(report, Phase::Connecting);
        let source = SourceLease::new(self.connector.open(&record.to_descriptor()).await?);
        let result = self.refresh_tables(name, source.reader(), report).await;
        source.close().await;
        result
    }

    async fn refresh_tables(
        &self,
        name: &str,
        source: &dyn SourceReader,
        report: &mut OperationReport,
    ) -> Result<()> {
        enter(report, Phase::Introspecting);
        let schema = source.schema_name().await?;
        let tables = source.list_tables(&schema).await?;
        info!("refresh {}: {} source tables in {}", name, tables.len(), schema);

        for table in tables {
            let warehouse_table = warehouse_table_name(name, &table);
            if !self.warehouse.table_exists(&warehouse_table).await? {
                debug!("{}: not in warehouse, skipped", warehouse_table);
                report.skipped_tables.push(table);
                continue;
            }

            match self
                .refresh_table(source, &schema, &table, &warehouse_table, report)
                .await
            {
                Ok(refreshed) => report.add_refreshed(refreshed),
                Err(e @ EtlError::Schema { .. }) => {
                    warn!("{}: skipped: {}", warehouse_table, e);
                    report.add_warning(EtlWarning::new(&warehouse_table, report.phase, &e));
                    report.skipped_tables.push(table);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn refresh_table(
        &self,
        source: &dyn SourceReader,
        schema: &str,
        table: &str,
        warehouse_table: &str,
        report: &mut OperationReport,
    ) -> Result<RefreshedTable> {
        enter(report, Phase::Introspecting);
        let described = source.describe_table(schema, table).await?;
        let warehouse_columns = self.warehouse.column_info(warehouse_table).await?;

        enter(report, Phase::Transferring);
        let outcome = self
            .transfer(source, &described, warehouse_table, warehouse_columns, true)
            .await?;
        report.warnings.extend(outcome.warnings);

        Ok(RefreshedTable {
            source_table: table.to_string(),
            warehouse_table: warehouse_table.to_string(),
            rows_refreshed: outcome.rows,
            processing_time_seconds: outcome.elapsed.as_secs_f64(),
        })
    }

    /// Drop every warehouse table of a registered source and load it again.
    pub async fn full_refresh(&self, name: &str) -> OperationResult {
        let mut report = OperationReport::begin(Operation::FullRefresh, name);
        let result = async {
            validate_source_name(name)?;
            let _lease = self.guard.acquire(name)?;
            self.full_refresh_inner(name, &mut report).await
        }
        .await;
        self.conclude(report, result)
    }

    async fn full_refresh_inner(&self, name: &str, report: &mut OperationReport) -> Result<()> {
        let record = self.active_source(name).await?;

        enter(report, Phase::Creating);
        let dropped = self.schema_manager().drop_all_with_prefix(name).await?;
        report.add_deleted(dropped);

        self.load_and_register(name, &record.to_descriptor(), report)
            .await
    }

    /// Drop every warehouse table of a source and soft-delete its record.
    /// The source database is never contacted.
    pub async fn delete(&self, name: &str) -> OperationResult {
        let mut report = OperationReport::begin(Operation::Delete, name);
        let result = async {
            validate_source_name(name)?;
            let _lease = self.guard.acquire(name)?;
            self.delete_inner(name, &mut report).await
        }
        .await;
        self.conclude(report, result)
    }

    async fn delete_inner(&self, name: &str, report: &mut OperationReport) -> Result<()> {
        enter(report, Phase::Creating);
        let dropped = self.schema_manager().drop_all_with_prefix(name).await?;
        report.add_deleted(dropped);

        enter(report, Phase::Persisting);
        if !self.store.soft_delete(name, &self.etl.actor).await? {
            debug!("delete {}: no active DataSource record", name);
        }
        Ok(())
    }

    async fn active_source(&self, name: &str) -> Result<DataSource> {
        self.store
            .find_active(name)
            .await?
            .ok_or_else(|| EtlError::NotFound(name.to_string()))
    }

    /// Initial load of every source table, then upsert the DataSource.
    async fn load_and_register(
        &self,
        name: &str,
        descriptor: &ConnectionDescriptor,
        report: &mut OperationReport,
    ) -> Result<()> {
        enter(report, Phase::Connecting);
        let source = SourceLease::new(self.connector.open(descriptor).await?);
        let result = self.load_tables(name, source.reader(), report).await;
        source.close().await;
        result?;

        enter(report, Phase::Persisting);
        let record = DataSource::new(self.etl.default_project_id, name, descriptor, &self.etl.actor);
        let stored = self.store.upsert(&record).await?;
        debug!("DataSource {} stored with id {:?}", name, stored.id);
        Ok(())
    }

    async fn load_tables(
        &self,
        name: &str,
        source: &dyn SourceReader,
        report: &mut OperationReport,
    ) -> Result<()> {
        enter(report, Phase::Introspecting);
        let schema = source.schema_name().await?;
        let tables = source.list_tables(&schema).await?;
        info!("{} {}: {} source tables in {}", report.operation, name, tables.len(), schema);

        for table in tables {
            enter(report, Phase::Introspecting);
            let described = source.describe_table(&schema, &table).await?;
            if described.columns.is_empty() {
                warn!("{}: no columns reported, skipped", described.full_name());
                report.skipped_tables.push(table);
                continue;
            }

            let loaded = self.load_table(name, source, &described, report).await?;
            report.add_table(loaded);
        }
        Ok(())
    }

    async fn load_table(
        &self,
        name: &str,
        source: &dyn SourceReader,
        described: &SourceTable,
        report: &mut OperationReport,
    ) -> Result<TableReport> {
        let warehouse_table = warehouse_table_name(name, &described.name);

        enter(report, Phase::Mapping);
        let mapped = map_columns(&described.columns, source.driver());
        for col in &mapped {
            if let Some(w) = &col.warning {
                report.add_warning(EtlWarning::new(&warehouse_table, Phase::Mapping, w));
            }
        }

        enter(report, Phase::Creating);
        let manager = self.schema_manager();
        manager.create_table(&warehouse_table, &mapped).await?;

        enter(report, Phase::Transferring);
        let warehouse_columns: Vec<WarehouseColumn> =
            match self.warehouse.column_info(&warehouse_table).await {
                Ok(cols) if !cols.is_empty() => cols,
                Ok(_) => mapped.iter().map(WarehouseColumn::from).collect(),
                Err(e) => {
                    debug!(
                        "{}: column info unavailable, using mapped columns: {}",
                        warehouse_table, e
                    );
                    mapped.iter().map(WarehouseColumn::from).collect()
                }
            };
        let outcome = self
            .transfer(source, described, &warehouse_table, warehouse_columns, false)
            .await?;
        report.warnings.extend(outcome.warnings);

        enter(report, Phase::Indexing);
        if described.has_pk() {
            report.warnings.extend(
                manager
                    .add_primary_key(&warehouse_table, &described.primary_key)
                    .await,
            );
        }
        let (indexes, index_warnings) = manager.create_indexes(&warehouse_table, &mapped).await;
        report.warnings.extend(index_warnings);

        let seconds = outcome.elapsed.as_secs_f64();
        Ok(TableReport {
            source_table: described.name.clone(),
            warehouse_table,
            columns_count: mapped.len(),
            rows_count: outcome.rows,
            primary_key_columns: described.primary_key.clone(),
            indexes,
            processing_time_seconds: seconds,
            rows_per_second: rows_per_second(outcome.rows, seconds),
        })
    }

    async fn transfer(
        &self,
        source: &dyn SourceReader,
        described: &SourceTable,
        warehouse_table: &str,
        warehouse_columns: Vec<WarehouseColumn>,
        truncate_first: bool,
    ) -> Result<TransferOutcome> {
        let dialect = source.dialect();
        let job = TransferJob {
            source_schema: described.schema.clone(),
            source_table: described.name.clone(),
            warehouse_table: warehouse_table.to_string(),
            order_by: chunk_order(&described.primary_key, &described.columns, |c| {
                dialect.is_orderable(c)
            }),
            source_columns: described.columns.clone(),
            warehouse_columns,
            truncate_first,
        };
        BulkTransferEngine::new(source, self.warehouse.as_ref(), self.settings())
            .transfer(&job)
            .await
    }

    /// Warehouse tables grouped by source prefix.
    pub async fn catalog(&self) -> Result<Catalog> {
        let tables = self.warehouse.list_tables().await?;
        let sources = self.store.list_active().await?;
        Ok(Catalog {
            schema: self.warehouse_schema.clone(),
            groups: group_tables_by_prefix(&tables, &sources),
        })
    }

    /// Columns of one warehouse table.
    pub async fn describe_table(&self, table: &str) -> Result<Vec<WarehouseColumn>> {
        let columns = self.warehouse.column_info(table).await?;
        if columns.is_empty() {
            return Err(EtlError::schema(table, "table not found in warehouse"));
        }
        Ok(columns)
    }

    /// Active DataSource record for a name, if any.
    pub async fn data_source(&self, name: &str) -> Result<Option<DataSource>> {
        self.store.find_active(name).await
    }

    /// Check the warehouse and, optionally, one source.
    pub async fn health_check(&self, source: Option<&ConnectionDescriptor>) -> HealthReport {
        let start = Instant::now();
        let warehouse = self.warehouse.ping().await;
        let warehouse_latency_ms = start.elapsed().as_millis() as u64;

        let mut report = HealthReport {
            warehouse_connected: warehouse.is_ok(),
            warehouse_latency_ms,
            warehouse_error: warehouse.err().map(|e| e.to_string()),
            source: None,
            source_connected: None,
            source_latency_ms: None,
            source_error: None,
            healthy: false,
        };

        if let Some(descriptor) = source {
            let start = Instant::now();
            let opened = self.connector.open(descriptor).await;
            report.source = Some(descriptor.endpoint());
            report.source_latency_ms = Some(start.elapsed().as_millis() as u64);
            match opened {
                Ok(reader) => {
                    SourceLease::new(reader).close().await;
                    report.source_connected = Some(true);
                }
                Err(e) => {
                    report.source_connected = Some(false);
                    report.source_error = Some(e.to_string());
                }
            }
        }

        report.healthy = report.warehouse_connected && report.source_connected.unwrap_or(true);
        report
    }
}
