//! A pooled connection used as a reconciliation session.

use async_trait::async_trait;
use deadpool_postgres::Object;
use schemasync_migrate::introspect::queries;
use schemasync_migrate::{
    DdlExecutor, Introspector, LiveColumn, LiveIndex, MigrateResult, Statement,
};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;
use tracing::{debug, trace};

use crate::error::{PgError, PgResult};

/// A connection that reads the catalog and executes DDL.
///
/// Catalog queries are prepared once per connection. DDL runs through the
/// simple query protocol, one statement per round-trip, outside any explicit
/// transaction.
pub struct PgConnection {
    client: Object,
}

impl PgConnection {
    pub(crate) fn new(client: Object) -> Self {
        Self { client }
    }

    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> PgResult<Vec<Row>> {
        trace!(sql = %sql.trim(), "Running catalog query");
        let statement = self.client.prepare_cached(sql).await?;
        Ok(self.client.query(&statement, params).await?)
    }

    async fn query_one(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> PgResult<Row> {
        let statement = self.client.prepare_cached(sql).await?;
        Ok(self.client.query_one(&statement, params).await?)
    }

    /// Get the underlying client.
    pub fn inner(&self) -> &Object {
        &self.client
    }
}

fn column_from_row(row: &Row) -> PgResult<LiveColumn> {
    Ok(LiveColumn {
        name: row.try_get(0)?,
        data_type: row.try_get(1)?,
        udt_name: row.try_get(2)?,
        default: row.try_get(3)?,
        is_nullable: row.try_get(4)?,
        char_max_length: row.try_get(5)?,
        numeric_precision: row.try_get(6)?,
        numeric_scale: row.try_get(7)?,
        is_generated: row.try_get::<_, Option<bool>>(8)?.unwrap_or(false),
    })
}

fn index_from_row(row: &Row) -> PgResult<LiveIndex> {
    Ok(LiveIndex {
        name: row.try_get(0)?,
        columns: row.try_get(1)?,
        is_unique: row.try_get(2)?,
    })
}

#[async_trait]
impl Introspector for PgConnection {
    async fn namespace_oid(&self, schema: &str) -> MigrateResult<Option<u32>> {
        let rows = self.query(queries::NAMESPACE_OID, &[&schema]).await?;
        match rows.first() {
            Some(row) => Ok(Some(row.try_get::<_, u32>(0).map_err(PgError::from)?)),
            None => Ok(None),
        }
    }

    async fn table_exists(&self, schema: &str, table: &str) -> MigrateResult<bool> {
        let row = self
            .query_one(queries::TABLE_EXISTS, &[&schema, &table])
            .await?;
        Ok(row.try_get(0).map_err(PgError::from)?)
    }

    async fn columns(&self, schema: &str, table: &str) -> MigrateResult<Vec<LiveColumn>> {
        let rows = self.query(queries::COLUMNS, &[&schema, &table]).await?;
        let columns = rows
            .iter()
            .map(column_from_row)
            .collect::<PgResult<Vec<_>>>()?;
        debug!(schema = %schema, table = %table, columns = columns.len(), "Loaded columns");
        Ok(columns)
    }

    async fn indexes(&self, schema: &str, table: &str) -> MigrateResult<Vec<LiveIndex>> {
        let rows = self.query(queries::INDEXES, &[&schema, &table]).await?;
        Ok(rows
            .iter()
            .map(index_from_row)
            .collect::<PgResult<Vec<_>>>()?)
    }

    async fn foreign_keys(&self, namespace: u32, table: &str) -> MigrateResult<Vec<String>> {
        let rows = self
            .query(queries::FOREIGN_KEYS, &[&namespace, &table])
            .await?;
        Ok(rows
            .iter()
            .map(|row| row.try_get(0).map_err(PgError::from))
            .collect::<PgResult<Vec<String>>>()?)
    }
}

#[async_trait]
impl DdlExecutor for PgConnection {
    async fn execute(&self, statement: &Statement) -> MigrateResult<()> {
        self.client
            .batch_execute(&statement.sql)
            .await
            .map_err(|e| PgError::from(e).into_statement_error(&statement.sql))
    }

    async fn database_name(&self) -> MigrateResult<String> {
        let row = self.query_one(queries::DATABASE_NAME, &[]).await?;
        Ok(row.try_get(0).map_err(PgError::from)?)
    }
}
