use async_trait::async_trait;
use std::time::Instant;
use tiberius::Row;

use crate::config::SqlConfig;
use crate::db::{row_to_record, DatabaseConnection};
use crate::error::{DbError, DbResult};
use crate::models::QueryRow;

pub const LIST_TABLES_SQL: &str =
    "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_TYPE = 'BASE TABLE'";

/// The two database operations exposed as tools.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    /// Names of all base tables visible to the configured login.
    async fn list_tables(&self) -> DbResult<Vec<String>>;

    /// Execute `query` verbatim and return the rows of its first result set.
    async fn run_query(&self, query: &str) -> DbResult<Vec<QueryRow>>;

    fn is_configured(&self) -> bool;
}

/// SQL Server backed executor. Opens a fresh connection for every call.
#[derive(Debug, Clone)]
pub struct SqlServerService {
    config: SqlConfig,
}

impl SqlServerService {
    pub fn new(config: SqlConfig) -> Self {
        if config.is_configured() {
            tracing::info!("SQL Server connection string configured");
        } else {
            tracing::warn!("SQL_SERVER_CONNECTION_STRING environment variable is not set");
        }
        Self { config }
    }

    async fn connect(&self) -> DbResult<DatabaseConnection> {
        let connection_string = self
            .config
            .connection_string
            .as_deref()
            .ok_or(DbError::NotConfigured)?;
        DatabaseConnection::open(connection_string).await
    }

    async fn fetch_first_result(&self, sql: &str) -> DbResult<Vec<Row>> {
        let mut conn = self.connect().await?;

        // Run the batch, keeping the outcome so the connection is closed either way
        let result = match conn.client().simple_query(sql).await {
            Ok(stream) => stream.into_first_result().await,
            Err(e) => Err(e),
        };

        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "Error closing SQL Server connection");
        }

        result.map_err(DbError::from)
    }
}

#[async_trait]
impl DatabaseService for SqlServerService {
    async fn list_tables(&self) -> DbResult<Vec<String>> {
        let rows = self.fetch_first_result(LIST_TABLES_SQL).await?;

        // Collect the TABLE_NAME column
        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(name) = row.try_get::<&str, _>(0)? {
                tables.push(name.to_string());
            }
        }

        tracing::info!(count = tables.len(), "Retrieved tables from database");
        Ok(tables)
    }

    async fn run_query(&self, query: &str) -> DbResult<Vec<QueryRow>> {
        let start = Instant::now();
        let rows = self.fetch_first_result(query).await?;

        // Convert rows to ordered column maps
        let records = rows
            .into_iter()
            .map(row_to_record)
            .collect::<DbResult<Vec<_>>>()?;

        tracing::info!(
            rows = records.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query executed successfully"
        );
        Ok(records)
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }
}
