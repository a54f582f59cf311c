//! PostgreSQL-backed DataSource store.
//!
//! Records live in `{metadata_schema}.datasources` in the warehouse
//! database. Rows are never removed; `soft_delete` flips `is_deleted`.

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tokio_postgres::Row;
use tracing::debug;

use super::{DataSource, DataSourceStore};
use crate::core::identifier::quote_pg;
use crate::drivers::postgres::pg_error_message;
use crate::error::{EtlError, Result};

const COLUMNS: &str = "id, project_id, name, driver, host, port, database_name, username, \
                       password, ssl_mode, created_by, created_at, modified_by, modified_at, \
                       is_deleted";

/// DataSource store in the warehouse database.
pub struct PgDataSourceStore {
    pool: Pool,
    table: String,
    schema: String,
}

impl PgDataSourceStore {
    /// Store over an existing pool. Fails on an invalid schema name.
    pub fn new(pool: Pool, schema: &str) -> Result<Self> {
        let quoted = quote_pg(schema)?;
        Ok(Self {
            pool,
            table: format!("{}.datasources", quoted),
            schema: quoted,
        })
    }

    async fn client(&self) -> Result<Object> {
        self.pool.get().await.map_err(EtlError::store)
    }
}

fn store_err(e: tokio_postgres::Error) -> EtlError {
    EtlError::store(pg_error_message(&e))
}

fn from_row(row: &Row) -> Result<DataSource> {
    let driver: String = row.get("driver");
    let ssl_mode: String = row.get("ssl_mode");
    let port: i32 = row.get("port");
    Ok(DataSource {
        id: Some(row.get("id")),
        project_id: row.get("project_id"),
        name: row.get("name"),
        driver: driver.parse()?,
        host: row.get("host"),
        port: u16::try_from(port)
            .map_err(|_| EtlError::store(format!("invalid port {} in datasources", port)))?,
        database_name: row.get("database_name"),
        username: row.get("username"),
        password: row.get("password"),
        ssl_mode: ssl_mode.parse()?,
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        modified_by: row.get("modified_by"),
        modified_at: row.get("modified_at"),
        is_deleted: row.get("is_deleted"),
    })
}

#[async_trait]
impl DataSourceStore for PgDataSourceStore {
    async fn init_schema(&self) -> Result<()> {
        let client = self.client().await?;
        client
            .batch_execute(&format!(
                "CREATE SCHEMA IF NOT EXISTS {schema};
                 CREATE TABLE IF NOT EXISTS {table} (
                    id BIGSERIAL PRIMARY KEY,
                    project_id BIGINT NOT NULL,
                    name TEXT NOT NULL,
                    driver TEXT NOT NULL,
                    host TEXT NOT NULL,
                    port INTEGER NOT NULL,
                    database_name TEXT NOT NULL,
                    username TEXT NOT NULL,
                    password TEXT NOT NULL,
                    ssl_mode TEXT NOT NULL DEFAULT 'prefer',
                    created_by TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    modified_by TEXT NOT NULL,
                    modified_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    is_deleted BOOLEAN NOT NULL DEFAULT FALSE
                 );
                 CREATE INDEX IF NOT EXISTS idx_datasources_active_name
                    ON {table} (name) WHERE NOT is_deleted;",
                schema = self.schema,
                table = self.table
            ))
            .await
            .map_err(store_err)?;

        debug!("DataSource store ready: {}", self.table);
        Ok(())
    }

    async fn find_active(&self, name: &str) -> Result<Option<DataSource>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM {} WHERE name = $1 AND NOT is_deleted \
                     ORDER BY id DESC LIMIT 1",
                    COLUMNS, self.table
                ),
                &[&name],
            )
            .await
            .map_err(store_err)?;

        row.as_ref().map(from_row).transpose()
    }

    async fn upsert(&self, record: &DataSource) -> Result<DataSource> {
        let mut client = self.client().await?;
        let tx = client.transaction().await.map_err(store_err)?;

        let existing = tx
            .query_opt(
                &format!(
                    "SELECT id FROM {} WHERE name = $1 AND project_id = $2 AND NOT is_deleted \
                     ORDER BY id DESC LIMIT 1 FOR UPDATE",
                    self.table
                ),
                &[&record.name, &record.project_id],
            )
            .await
            .map_err(store_err)?;

        let port = i32::from(record.port);
        let row = match existing {
            Some(found) => {
                let id: i64 = found.get(0);
                tx.query_one(
                    &format!(
                        "UPDATE {} SET driver = $2, host = $3, port = $4, database_name = $5, \
                         username = $6, password = $7, ssl_mode = $8, modified_by = $9, \
                         modified_at = NOW(), is_deleted = FALSE \
                         WHERE id = $1 RETURNING {}",
                        self.table, COLUMNS
                    ),
                    &[
                        &id,
                        &record.driver.as_str(),
                        &record.host,
                        &port,
                        &record.database_name,
                        &record.username,
                        &record.password,
                        &record.ssl_mode.as_str(),
                        &record.modified_by,
                    ],
                )
                .await
                .map_err(store_err)?
            }
            None => tx
                .query_one(
                    &format!(
                        "INSERT INTO {} (project_id, name, driver, host, port, database_name, \
                         username, password, ssl_mode, created_by, modified_by) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {}",
                        self.table, COLUMNS
                    ),
                    &[
                        &record.project_id,
                        &record.name,
                        &record.driver.as_str(),
                        &record.host,
                        &port,
                        &record.database_name,
                        &record.username,
                        &record.password,
                        &record.ssl_mode.as_str(),
                        &record.created_by,
                        &record.modified_by,
                    ],
                )
                .await
                .map_err(store_err)?,
        };

        tx.commit().await.map_err(store_err)?;
        from_row(&row)
    }

    async fn soft_delete(&self, name: &str, actor: &str) -> Result<bool> {
        let client = self.client().await?;
        let updated = client
            .execute(
                &format!(
                    "UPDATE {} SET is_deleted = TRUE, modified_by = $2, modified_at = NOW() \
                     WHERE name = $1 AND NOT is_deleted",
                    self.table
                ),
                &[&name, &actor],
            )
            .await
            .map_err(store_err)?;
        Ok(updated > 0)
    }

    async fn list_active(&self) -> Result<Vec<DataSource>> {
        let client = self.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM {} WHERE NOT is_deleted ORDER BY name",
                    COLUMNS, self.table
                ),
                &[],
            )
            .await
            .map_err(store_err)?;

        rows.iter().map(from_row).collect()
    }
}
