//! Core traits at the seams between the engine and the databases.
//!
//! - [`Dialect`]: SQL syntax and catalog queries of one source engine
//! - [`SourceReader`]: catalog introspection and chunked reads from a source
//! - [`SourceConnector`]: opens a [`SourceReader`] for a connection descriptor
//! - [`WarehouseWriter`]: DDL and chunked inserts against the warehouse
//!
//! The coordinator only sees these traits, so the integration tests drive
//! every operation against in-memory implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ConnectionDescriptor;
use crate::error::Result;
use crate::typemap::{TargetColumnSpec, TypeFamily};

use super::schema::{ColumnSpec, Driver, SourceTable};
use super::value::{Batch, SqlValue};

/// One bounded read from a source table.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Columns to read, in output order.
    pub columns: Vec<ColumnSpec>,
    /// Stable ordering; empty means order by the first selected column.
    pub order_by: Vec<String>,
    /// Rows to skip.
    pub offset: u64,
    /// Maximum rows to return.
    pub limit: usize,
}

impl ChunkRequest {
    /// Names of the selected columns.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// SQL syntax and catalog queries for one source engine.
pub trait Dialect: Send + Sync {
    /// Engine name for logging.
    fn name(&self) -> &str;

    /// Quote an identifier.
    fn quote_ident(&self, name: &str) -> Result<String>;

    /// Schema to introspect when it does not depend on the connection.
    /// `None` means the reader asks the server (MySQL's active database).
    fn fixed_schema(&self) -> Option<&'static str>;

    /// Bind placeholder for the 1-based parameter `index`.
    fn param_placeholder(&self, index: usize) -> String;

    /// Base tables of a schema. Binds: schema.
    fn list_tables_query(&self) -> String;

    /// Columns of a table in ordinal order. Binds: schema, table.
    ///
    /// Output columns: name, data_type, is_nullable, max_length, precision,
    /// scale.
    fn list_columns_query(&self) -> String;

    /// Primary key columns in key order. Binds: schema, table.
    fn list_primary_keys_query(&self) -> String;

    /// Select expression for one column; types the driver cannot decode
    /// natively are converted to text here.
    fn select_expr(&self, column: &ColumnSpec) -> Result<String>;

    /// Whether the engine can sort by this column.
    fn is_orderable(&self, _column: &ColumnSpec) -> bool {
        true
    }

    /// Trailing paging clause (`LIMIT .. OFFSET ..` or `OFFSET .. FETCH ..`).
    fn paging_clause(&self, offset: u64, limit: usize) -> String;

    /// Paged SELECT for a chunk.
    fn build_chunk_query(&self, req: &ChunkRequest) -> Result<String> {
        let select = req
            .columns
            .iter()
            .map(|c| self.select_expr(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");

        let order = if req.order_by.is_empty() {
            "1".to_string()
        } else {
            req.order_by
                .iter()
                .map(|c| self.quote_ident(c))
                .collect::<Result<Vec<_>>>()?
                .join(", ")
        };

        Ok(format!(
            "SELECT {} FROM {}.{} ORDER BY {}{}",
            select,
            self.quote_ident(&req.schema)?,
            self.quote_ident(&req.table)?,
            order,
            self.paging_clause(req.offset, req.limit)
        ))
    }

    /// Statements that turn constraint/trigger enforcement off or back on for
    /// a table.
    fn constraint_statements(&self, schema: &str, table: &str, enabled: bool)
        -> Result<Vec<String>>;
}

/// Read side of a source database.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Driver this reader speaks.
    fn driver(&self) -> Driver;

    /// SQL dialect of the source.
    fn dialect(&self) -> &dyn Dialect;

    /// Resolve the schema to introspect.
    async fn schema_name(&self) -> Result<String>;

    /// Base tables of `schema` (views excluded).
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>>;

    /// Columns of a table in ordinal order.
    async fn list_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnSpec>>;

    /// Primary key column names in key order; empty when there is none.
    async fn list_primary_keys(&self, schema: &str, table: &str) -> Result<Vec<String>>;

    /// Load columns and primary key of one table.
    async fn describe_table(&self, schema: &str, table: &str) -> Result<SourceTable> {
        let columns = self.list_columns(schema, table).await?;
        let primary_key = self.list_primary_keys(schema, table).await?;
        Ok(SourceTable {
            schema: schema.to_string(),
            name: table.to_string(),
            columns,
            primary_key,
        })
    }

    /// Read one chunk of rows.
    async fn read_chunk(&self, req: &ChunkRequest) -> Result<Batch>;

    /// Toggle constraint/trigger enforcement for a table.
    async fn set_constraint_enforcement(
        &self,
        schema: &str,
        table: &str,
        enabled: bool,
    ) -> Result<()>;

    /// Session settings that speed up large reads.
    async fn tune_session(&self) -> Result<()> {
        Ok(())
    }

    /// Release the connection pool. Drivers whose pool has no explicit
    /// shutdown release it when the reader is dropped.
    async fn close(&self);
}

/// Opens source connections from descriptors.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Open and validate a connection. Fails with `EtlError::Connection`
    /// when the server cannot be reached.
    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn SourceReader>>;
}

/// A column of an existing warehouse table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseColumn {
    /// Column name
    pub name: String,

    /// Type as rendered by `format_type()`, used for insert casts
    pub sql_type: String,

    /// Whether the column accepts NULL
    pub nullable: bool,

    /// Column default expression, if any
    pub default: Option<String>,

    /// Default-substitution family
    pub family: TypeFamily,
}

impl WarehouseColumn {
    /// Build from a catalog row.
    pub fn from_catalog(
        name: impl Into<String>,
        sql_type: impl Into<String>,
        nullable: bool,
        default: Option<String>,
    ) -> Self {
        let sql_type = sql_type.into();
        Self {
            name: name.into(),
            family: TypeFamily::from_pg_type(&sql_type),
            sql_type,
            nullable,
            default,
        }
    }
}

impl From<&TargetColumnSpec> for WarehouseColumn {
    fn from(spec: &TargetColumnSpec) -> Self {
        Self {
            name: spec.name.clone(),
            sql_type: spec.target_type.to_sql(),
            nullable: spec.nullable,
            default: None,
            family: spec.target_type.family(),
        }
    }
}

/// Write side of the warehouse.
#[async_trait]
pub trait WarehouseWriter: Send + Sync {
    /// Run a trivial query to verify the connection.
    async fn ping(&self) -> Result<()>;

    /// All base tables of the warehouse schema, sorted by name.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Tables whose name starts with `prefix` (literal match).
    async fn list_tables_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .list_tables()
            .await?
            .into_iter()
            .filter(|t| t.starts_with(prefix))
            .collect())
    }

    /// Check whether a table exists.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// CREATE TABLE with the mapped columns followed by the audit columns.
    /// Fails if the table exists.
    async fn create_table(&self, table: &str, columns: &[TargetColumnSpec]) -> Result<()>;

    /// DROP TABLE IF EXISTS.
    async fn drop_table(&self, table: &str) -> Result<()>;

    /// Remove all rows, keeping the table definition.
    async fn truncate_table(&self, table: &str) -> Result<()>;

    /// Add a primary key constraint.
    async fn add_primary_key(&self, table: &str, columns: &[String]) -> Result<()>;

    /// Create a single-column index.
    async fn create_index(&self, table: &str, index_name: &str, column: &str) -> Result<()>;

    /// Toggle trigger (and therefore foreign key) enforcement for a table.
    async fn set_constraint_enforcement(&self, table: &str, enabled: bool) -> Result<()>;

    /// Columns of an existing table in ordinal order.
    async fn column_info(&self, table: &str) -> Result<Vec<WarehouseColumn>>;

    /// Insert `rows` in sub-batches of at most `batch_size` rows inside one
    /// transaction. The whole chunk rolls back on any failure. Returns the
    /// number of rows written.
    async fn insert_chunk(
        &self,
        table: &str,
        columns: &[WarehouseColumn],
        rows: &[Vec<SqlValue>],
        batch_size: usize,
    ) -> Result<u64>;
}
