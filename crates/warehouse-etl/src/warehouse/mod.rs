//! Warehouse DDL policy on top of a [`WarehouseWriter`].
//!
//! Table creation fails loudly. Primary keys, indexes and constraint toggles
//! are secondary: their failures come back as [`EtlWarning`]s and never
//! escalate.

use tracing::{debug, info, warn};

use crate::core::identifier::{index_name, table_prefix};
use crate::core::traits::WarehouseWriter;
use crate::error::{EtlError, Result};
use crate::report::{EtlWarning, Phase};
use crate::typemap::TargetColumnSpec;

/// Columns worth indexing: names containing "id" (any case) and numeric or
/// temporal columns. Returns `(index_name, column)` pairs in column order.
pub fn index_candidates(table: &str, columns: &[TargetColumnSpec]) -> Vec<(String, String)> {
    columns
        .iter()
        .filter(|c| c.name.to_lowercase().contains("id") || c.target_type.is_indexable())
        .map(|c| (index_name(table, &c.name), c.name.clone()))
        .collect()
}

/// Creates, drops and indexes warehouse tables.
pub struct SchemaManager<'a> {
    writer: &'a dyn WarehouseWriter,
    create_indexes: bool,
}

impl<'a> SchemaManager<'a> {
    pub fn new(writer: &'a dyn WarehouseWriter, create_indexes: bool) -> Self {
        Self {
            writer,
            create_indexes,
        }
    }

    /// Create a table with the mapped columns plus audit columns.
    /// An existing table is a schema error; drop it first.
    pub async fn create_table(&self, table: &str, columns: &[TargetColumnSpec]) -> Result<()> {
        if self.writer.table_exists(table).await? {
            return Err(EtlError::schema(table, "table already exists"));
        }
        self.writer.create_table(table, columns).await?;
        info!("Created warehouse table {} ({} columns)", table, columns.len());
        Ok(())
    }

    /// Drop a table if it exists.
    pub async fn drop_table(&self, table: &str) -> Result<()> {
        self.writer.drop_table(table).await
    }

    /// Drop every table named `{source_name}__*`. Returns the dropped names.
    pub async fn drop_all_with_prefix(&self, source_name: &str) -> Result<Vec<String>> {
        let tables = self
            .writer
            .list_tables_with_prefix(&table_prefix(source_name))
            .await?;
        for table in &tables {
            self.writer.drop_table(table).await?;
            info!("Dropped warehouse table {}", table);
        }
        Ok(tables)
    }

    /// Add the primary key after load. Skipped for key-less tables.
    pub async fn add_primary_key(&self, table: &str, columns: &[String]) -> Option<EtlWarning> {
        if columns.is_empty() {
            debug!("{}: no primary key on source", table);
            return None;
        }
        match self.writer.add_primary_key(table, columns).await {
            Ok(()) => None,
            Err(e) => Some(non_fatal(table, Phase::Indexing, "primary key not created", e)),
        }
    }

    /// Build the policy indexes. Returns created index names and warnings.
    pub async fn create_indexes(
        &self,
        table: &str,
        columns: &[TargetColumnSpec],
    ) -> (Vec<String>, Vec<EtlWarning>) {
        let mut created = Vec::new();
        let mut warnings = Vec::new();
        if !self.create_indexes {
            return (created, warnings);
        }

        for (name, column) in index_candidates(table, columns) {
            match self.writer.create_index(table, &name, &column).await {
                Ok(()) => {
                    debug!("Created index {} on {}", name, table);
                    created.push(name);
                }
                Err(e) => warnings.push(non_fatal(
                    table,
                    Phase::Indexing,
                    &format!("index {} not created", name),
                    e,
                )),
            }
        }
        (created, warnings)
    }

    /// Toggle trigger enforcement on a warehouse table.
    pub async fn set_constraint_enforcement(
        &self,
        table: &str,
        enabled: bool,
    ) -> Option<EtlWarning> {
        match self.writer.set_constraint_enforcement(table, enabled).await {
            Ok(()) => None,
            Err(e) => {
                let what = if enabled {
                    "constraints not re-enabled"
                } else {
                    "constraints not disabled"
                };
                Some(non_fatal(table, Phase::Transferring, what, e))
            }
        }
    }
}

fn non_fatal(table: &str, stage: Phase, what: &str, err: EtlError) -> EtlWarning {
    warn!("{}: {}: {}", table, what, err);
    EtlWarning::new(table, stage, format!("{}: {}", what, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typemap::WarehouseType;

    fn col(name: &str, ty: WarehouseType) -> TargetColumnSpec {
        TargetColumnSpec {
            name: name.into(),
            source_type: String::new(),
            target_type: ty,
            nullable: true,
            warning: None,
        }
    }

    #[test]
    fn test_index_policy() {
        let cols = vec![
            col("id", WarehouseType::Integer),
            col("CustomerID", WarehouseType::Varchar(20)),
            col("note", WarehouseType::Text),
            col("created", WarehouseType::Date),
            col("paid", WarehouseType::Boolean),
            col("total", WarehouseType::Decimal { precision: 10, scale: 2 }),
        ];
        let picked: Vec<String> = index_candidates("shop1__orders", &cols)
            .into_iter()
            .map(|(_, c)| c)
            .collect();
        assert_eq!(picked, vec!["id", "CustomerID", "created", "total"]);
    }

    #[test]
    fn test_index_names_fit_identifier_limit() {
        let long = "x".repeat(70);
        let cols = vec![col(&long, WarehouseType::BigInt)];
        let (name, _) = &index_candidates("shop1__orders", &cols)[0];
        assert!(name.len() <= 63);
        assert!(name.starts_with("idx_shop1__orders_"));
    }
}
