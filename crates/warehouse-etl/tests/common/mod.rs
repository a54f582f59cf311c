//! In-memory source, warehouse and DataSource store for coordinator tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::Notify;

use warehouse_etl::core::identifier::{AUDIT_CREATED_AT, AUDIT_UPDATED_AT};
use warehouse_etl::drivers::PostgresDialect;
use warehouse_etl::{
    Batch, ChunkRequest, ColumnSpec, ConnectionDescriptor, DataSource, DataSourceStore, Dialect,
    Driver, EtlConfig, EtlError, ReplicationCoordinator, Result, SourceConnector, SourceReader,
    SqlValue, SslMode, TargetColumnSpec, WarehouseColumn, WarehouseWriter,
};

// =============================================================================
// Source
// =============================================================================

#[derive(Debug, Clone)]
pub struct SourceTableData {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    pub primary_key: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// Shared state of the fake source database.
#[derive(Default)]
pub struct FakeSource {
    pub tables: Mutex<Vec<SourceTableData>>,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub chunk_reads: AtomicUsize,
    pub constraint_log: Mutex<Vec<(String, bool)>>,
    pub fail_open: AtomicBool,
    /// When set, `open` waits for a notification.
    pub gate: Mutex<Option<Arc<Notify>>>,
    /// When set, `read_chunk` waits for a notification.
    pub read_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeSource {
    pub fn with_tables(tables: Vec<SourceTableData>) -> Arc<Self> {
        let source = Self::default();
        *source.tables.lock().unwrap() = tables;
        Arc::new(source)
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct FakeConnector {
    pub source: Arc<FakeSource>,
}

#[async_trait]
impl SourceConnector for FakeConnector {
    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn SourceReader>> {
        let gate = self.source.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.source.fail_open.load(Ordering::SeqCst) {
            return Err(EtlError::connection(descriptor.endpoint(), "connection refused"));
        }
        self.source.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeReader {
            source: Arc::clone(&self.source),
            dialect: PostgresDialect::new(),
        }))
    }
}

pub struct FakeReader {
    source: Arc<FakeSource>,
    dialect: PostgresDialect,
}

impl FakeReader {
    fn table(&self, name: &str) -> Result<SourceTableData> {
        self.source
            .tables
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| EtlError::schema(name, "no such source table"))
    }
}

#[async_trait]
impl SourceReader for FakeReader {
    fn driver(&self) -> Driver {
        Driver::Postgres
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn schema_name(&self) -> Result<String> {
        Ok("public".to_string())
    }

    async fn list_tables(&self, _schema: &str) -> Result<Vec<String>> {
        Ok(self
            .source
            .tables
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.name.clone())
            .collect())
    }

    async fn list_columns(&self, _schema: &str, table: &str) -> Result<Vec<ColumnSpec>> {
        Ok(self.table(table)?.columns)
    }

    async fn list_primary_keys(&self, _schema: &str, table: &str) -> Result<Vec<String>> {
        Ok(self.table(table)?.primary_key)
    }

    async fn read_chunk(&self, req: &ChunkRequest) -> Result<Batch> {
        self.source.chunk_reads.fetch_add(1, Ordering::SeqCst);
        let gate = self.source.read_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let table = self.table(&req.table)?;
        let positions: Vec<usize> = req
            .columns
            .iter()
            .map(|c| {
                table
                    .columns
                    .iter()
                    .position(|t| t.name == c.name)
                    .ok_or_else(|| EtlError::transfer(&req.table, format!("no column {}", c.name)))
            })
            .collect::<Result<_>>()?;

        let rows = table
            .rows
            .iter()
            .skip(req.offset as usize)
            .take(req.limit)
            .map(|row| positions.iter().map(|&p| row[p].clone()).collect())
            .collect();
        Ok(Batch::new(req.column_names(), rows))
    }

    async fn set_constraint_enforcement(
        &self,
        _schema: &str,
        table: &str,
        enabled: bool,
    ) -> Result<()> {
        self.source
            .constraint_log
            .lock()
            .unwrap()
            .push((table.to_string(), enabled));
        Ok(())
    }

    async fn close(&self) {
        self.source.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Warehouse
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct WarehouseTableData {
    pub columns: Vec<WarehouseColumn>,
    pub rows: Vec<Vec<SqlValue>>,
    pub primary_key: Vec<String>,
    pub indexes: Vec<String>,
    pub triggers_enabled: bool,
}

impl WarehouseTableData {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> &WarehouseColumn {
        self.columns.iter().find(|c| c.name == name).unwrap()
    }

    pub fn value(&self, row: usize, column: &str) -> &SqlValue {
        let idx = self.columns.iter().position(|c| c.name == column).unwrap();
        &self.rows[row][idx]
    }
}

#[derive(Default)]
pub struct FakeWarehouse {
    pub tables: Mutex<BTreeMap<String, WarehouseTableData>>,
    pub insert_calls: AtomicUsize,
    /// 1-based insert call that fails.
    pub fail_insert_call: Mutex<Option<usize>>,
    pub fail_indexes: AtomicBool,
    pub fail_column_info: AtomicBool,
    /// `truncate:`, `disable:`, `enable:` and `insert:` calls in order.
    pub events: Mutex<Vec<String>>,
}

impl FakeWarehouse {
    pub fn table(&self, name: &str) -> Option<WarehouseTableData> {
        self.tables.lock().unwrap().get(name).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.lock().unwrap().keys().cloned().collect()
    }

    pub fn row_count(&self, name: &str) -> usize {
        self.table(name).map(|t| t.rows.len()).unwrap_or(0)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: &str, table: &str) {
        self.events.lock().unwrap().push(format!("{}:{}", event, table));
    }

    fn missing(table: &str) -> EtlError {
        EtlError::schema(table, "relation does not exist")
    }
}

#[async_trait]
impl WarehouseWriter for FakeWarehouse {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.table_names())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.tables.lock().unwrap().contains_key(table))
    }

    async fn create_table(&self, table: &str, columns: &[TargetColumnSpec]) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if tables.contains_key(table) {
            return Err(EtlError::schema(table, "relation already exists"));
        }
        let mut cols: Vec<WarehouseColumn> = columns.iter().map(WarehouseColumn::from).collect();
        for audit in [AUDIT_CREATED_AT, AUDIT_UPDATED_AT] {
            cols.push(WarehouseColumn::from_catalog(
                audit,
                "timestamp(0) without time zone",
                false,
                Some("CURRENT_TIMESTAMP".to_string()),
            ));
        }
        tables.insert(
            table.to_string(),
            WarehouseTableData {
                columns: cols,
                triggers_enabled: true,
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.tables.lock().unwrap().remove(table);
        Ok(())
    }

    async fn truncate_table(&self, table: &str) -> Result<()> {
        self.record("truncate", table);
        let mut tables = self.tables.lock().unwrap();
        let data = tables.get_mut(table).ok_or_else(|| Self::missing(table))?;
        data.rows.clear();
        Ok(())
    }

    async fn add_primary_key(&self, table: &str, columns: &[String]) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        let data = tables.get_mut(table).ok_or_else(|| Self::missing(table))?;
        data.primary_key = columns.to_vec();
        Ok(())
    }

    async fn create_index(&self, table: &str, index_name: &str, _column: &str) -> Result<()> {
        if self.fail_indexes.load(Ordering::SeqCst) {
            return Err(EtlError::schema(table, "could not create index"));
        }
        let mut tables = self.tables.lock().unwrap();
        let data = tables.get_mut(table).ok_or_else(|| Self::missing(table))?;
        data.indexes.push(index_name.to_string());
        Ok(())
    }

    async fn set_constraint_enforcement(&self, table: &str, enabled: bool) -> Result<()> {
        self.record(if enabled { "enable" } else { "disable" }, table);
        let mut tables = self.tables.lock().unwrap();
        let data = tables.get_mut(table).ok_or_else(|| Self::missing(table))?;
        data.triggers_enabled = enabled;
        Ok(())
    }

    async fn column_info(&self, table: &str) -> Result<Vec<WarehouseColumn>> {
        if self.fail_column_info.load(Ordering::SeqCst) {
            return Err(EtlError::schema(table, "catalog query failed"));
        }
        Ok(self.table(table).map(|t| t.columns).unwrap_or_default())
    }

    async fn insert_chunk(
        &self,
        table: &str,
        columns: &[WarehouseColumn],
        rows: &[Vec<SqlValue>],
        _batch_size: usize,
    ) -> Result<u64> {
        self.record("insert", table);
        let call = self.insert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_insert_call.lock().unwrap() == Some(call) {
            return Err(EtlError::transfer(table, "value too long for type"));
        }

        let mut tables = self.tables.lock().unwrap();
        let data = tables.get_mut(table).ok_or_else(|| Self::missing(table))?;

        // Validate the whole chunk before applying it, like a transaction
        let mut staged = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() != columns.len() {
                return Err(EtlError::transfer(table, "row width mismatch"));
            }
            let mut full = vec![SqlValue::Null; data.columns.len()];
            for (value, col) in row.iter().zip(columns) {
                let idx = data
                    .columns
                    .iter()
                    .position(|c| c.name == col.name)
                    .ok_or_else(|| EtlError::transfer(table, format!("no column {}", col.name)))?;
                full[idx] = value.clone();
            }
            for (value, col) in full.iter().zip(&data.columns) {
                if value.is_null() && !col.nullable && col.default.is_none() {
                    return Err(EtlError::transfer(
                        table,
                        format!("null value in column \"{}\" violates not-null constraint", col.name),
                    ));
                }
            }
            staged.push(full);
        }

        data.rows.extend(staged);
        Ok(rows.len() as u64)
    }
}

// =============================================================================
// DataSource store
// =============================================================================

#[derive(Default)]
pub struct MemoryStore {
    pub records: Mutex<Vec<DataSource>>,
}

impl MemoryStore {
    pub fn all(&self) -> Vec<DataSource> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataSourceStore for MemoryStore {
    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn find_active(&self, name: &str) -> Result<Option<DataSource>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.name == name && !r.is_deleted)
            .cloned())
    }

    async fn upsert(&self, record: &DataSource) -> Result<DataSource> {
        let mut records = self.records.lock().unwrap();
        let now = Some(Utc::now());
        if let Some(existing) = records.iter_mut().find(|r| {
            r.name == record.name && r.project_id == record.project_id && !r.is_deleted
        }) {
            let id = existing.id;
            let created_by = existing.created_by.clone();
            let created_at = existing.created_at;
            *existing = record.clone();
            existing.id = id;
            existing.created_by = created_by;
            existing.created_at = created_at;
            existing.modified_at = now;
            return Ok(existing.clone());
        }

        let mut stored = record.clone();
        stored.id = Some(records.len() as i64 + 1);
        stored.created_at = now;
        stored.modified_at = now;
        stored.is_deleted = false;
        records.push(stored.clone());
        Ok(stored)
    }

    async fn soft_delete(&self, name: &str, actor: &str) -> Result<bool> {
        let mut records = self.records.lock().unwrap();
        let mut found = false;
        for r in records.iter_mut().filter(|r| r.name == name && !r.is_deleted) {
            r.is_deleted = true;
            r.modified_by = actor.to_string();
            r.modified_at = Some(Utc::now());
            found = true;
        }
        Ok(found)
    }

    async fn list_active(&self) -> Result<Vec<DataSource>> {
        let mut active: Vec<DataSource> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !r.is_deleted)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(active)
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub struct Harness {
    pub source: Arc<FakeSource>,
    pub warehouse: Arc<FakeWarehouse>,
    pub store: Arc<MemoryStore>,
    pub coordinator: ReplicationCoordinator,
}

impl Harness {
    pub fn new(tables: Vec<SourceTableData>) -> Self {
        Self::with_config(tables, EtlConfig::default())
    }

    pub fn with_config(tables: Vec<SourceTableData>, etl: EtlConfig) -> Self {
        let source = FakeSource::with_tables(tables);
        let warehouse = Arc::new(FakeWarehouse::default());
        let store = Arc::new(MemoryStore::default());
        let coordinator = ReplicationCoordinator::new(
            warehouse.clone(),
            store.clone(),
            Arc::new(FakeConnector {
                source: source.clone(),
            }),
            etl,
        );
        Self {
            source,
            warehouse,
            store,
            coordinator,
        }
    }
}

pub fn descriptor() -> ConnectionDescriptor {
    ConnectionDescriptor {
        driver: Driver::Postgres,
        host: "source.internal".to_string(),
        port: Some(5432),
        database: "shop".to_string(),
        username: "etl".to_string(),
        password: "secret".to_string(),
        ssl_mode: SslMode::Disable,
    }
}

/// `orders (id int not null, total numeric(10,2) null, created date not null)`
/// with `rows` rows and a primary key on `id`.
pub fn orders_table(rows: usize) -> SourceTableData {
    let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    SourceTableData {
        name: "orders".to_string(),
        columns: vec![
            ColumnSpec::new("id", "integer", false),
            ColumnSpec::new("total", "numeric", true).with_precision(10, 2),
            ColumnSpec::new("created", "date", false),
        ],
        primary_key: vec!["id".to_string()],
        rows: (0..rows)
            .map(|i| {
                vec![
                    SqlValue::I64(i as i64 + 1),
                    if i % 10 == 0 {
                        SqlValue::Null
                    } else {
                        SqlValue::Decimal(Decimal::new(i as i64 * 100 + 99, 2))
                    },
                    SqlValue::Date(base + chrono::Duration::days((i % 365) as i64)),
                ]
            })
            .collect(),
    }
}

/// `customers (code varchar(20) not null, nickname text null)` without a key.
pub fn customers_table(rows: Vec<(&str, Option<&str>)>) -> SourceTableData {
    SourceTableData {
        name: "customers".to_string(),
        columns: vec![
            ColumnSpec::new("code", "character varying", false).with_length(20),
            ColumnSpec::new("nickname", "text", true),
        ],
        primary_key: vec![],
        rows: rows
            .into_iter()
            .map(|(code, nick)| {
                vec![
                    SqlValue::Text(code.to_string()),
                    nick.map(|n| SqlValue::Text(n.to_string()))
                        .unwrap_or(SqlValue::Null),
                ]
            })
            .collect(),
    }
}
