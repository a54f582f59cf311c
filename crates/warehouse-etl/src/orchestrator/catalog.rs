//! Read-only view of the warehouse grouped by data source.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::identifier::TABLE_SEPARATOR;
use crate::core::schema::Driver;
use crate::state::DataSource;

/// Group holding tables that do not follow the `{source}__{table}` naming.
pub const UNGROUPED: &str = "ungrouped";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceSummary {
    pub name: String,
    pub driver: Driver,
    pub host: String,
    pub database: String,
}

impl From<&DataSource> for DataSourceSummary {
    fn from(ds: &DataSource) -> Self {
        Self {
            name: ds.name.clone(),
            driver: ds.driver,
            host: ds.host.clone(),
            database: ds.database_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogGroup {
    pub name: String,
    pub tables: Vec<String>,
    pub table_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSourceSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub schema: String,
    pub groups: Vec<CatalogGroup>,
}

impl Catalog {
    pub fn total_tables(&self) -> usize {
        self.groups.iter().map(|g| g.table_count).sum()
    }
}

/// Group warehouse tables by source prefix.
///
/// Prefixed tables are kept only when an active DataSource owns the prefix.
/// Groups come out sorted by name with `ungrouped` last.
pub fn group_tables_by_prefix(tables: &[String], sources: &[DataSource]) -> Vec<CatalogGroup> {
    let mut grouped: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    let mut ungrouped = Vec::new();

    for table in tables {
        match table.split_once(TABLE_SEPARATOR) {
            Some((prefix, rest)) if !prefix.is_empty() && !rest.is_empty() => {
                grouped.entry(prefix).or_default().push(table.clone());
            }
            _ => ungrouped.push(table.clone()),
        }
    }

    let mut groups: Vec<CatalogGroup> = grouped
        .into_iter()
        .filter_map(|(prefix, mut tables)| {
            let source = sources.iter().find(|s| s.name == prefix && !s.is_deleted)?;
            tables.sort();
            Some(CatalogGroup {
                name: prefix.to_string(),
                table_count: tables.len(),
                tables,
                data_source: Some(DataSourceSummary::from(source)),
            })
        })
        .collect();

    if !ungrouped.is_empty() {
        ungrouped.sort();
        groups.push(CatalogGroup {
            name: UNGROUPED.to_string(),
            table_count: ungrouped.len(),
            tables: ungrouped,
            data_source: None,
        });
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionDescriptor;
    use crate::drivers::common::SslMode;

    fn source(name: &str) -> DataSource {
        let descriptor = ConnectionDescriptor {
            driver: Driver::Postgres,
            host: "db".into(),
            port: None,
            database: "app".into(),
            username: "u".into(),
            password: "p".into(),
            ssl_mode: SslMode::Disable,
        };
        DataSource::new(1, name, &descriptor, "system")
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_groups_sorted_with_ungrouped_last() {
        let tables = names(&[
            "shop1__orders",
            "crm__contacts",
            "lookup",
            "shop1__customers",
            "orphan__stuff",
        ]);
        let groups = group_tables_by_prefix(&tables, &[source("shop1"), source("crm")]);

        let group_names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(group_names, vec!["crm", "shop1", UNGROUPED]);

        assert_eq!(groups[1].tables, names(&["shop1__customers", "shop1__orders"]));
        assert_eq!(groups[1].table_count, 2);
        assert_eq!(groups[1].data_source.as_ref().unwrap().database, "app");
        assert_eq!(groups[2].tables, names(&["lookup"]));
        assert!(groups[2].data_source.is_none());
    }

    #[test]
    fn test_deleted_source_hides_group() {
        let mut deleted = source("shop1");
        deleted.is_deleted = true;
        let groups = group_tables_by_prefix(&names(&["shop1__orders"]), &[deleted]);
        assert!(groups.is_empty());
    }

    #[test]
    fn test_leading_separator_is_ungrouped() {
        let groups = group_tables_by_prefix(&names(&["__x", "y__"]), &[]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, UNGROUPED);
        assert_eq!(groups[0].table_count, 2);
    }
}
