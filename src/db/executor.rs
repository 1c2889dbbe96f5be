//! Query execution.
//!
//! Borrows one connection, streams the statement's rows, and stops reading
//! one row past the ceiling so large results never materialize in full.
//! SQL runs verbatim without bind parameters; validation happens upstream.

use crate::db::pool::DbPool;
use crate::db::types::RowToJson;
use crate::error::{EngineError, EngineResult};
use crate::models::QueryResult;
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Borrow a connection from `$pool` and collect at most `$fetch_limit` rows
/// of `$sql` within `$timeout`.
///
/// A connection that timed out mid-stream is closed instead of being
/// returned to the pool.
macro_rules! fetch_limited {
    ($pool:expr, $sql:expr, $fetch_limit:expr, $timeout:expr) => {{
        let mut conn = $pool.acquire().await?;
        let stream = sqlx::Executor::fetch(&mut *conn, $sql);
        let outcome = timeout($timeout, stream.take($fetch_limit).collect::<Vec<_>>()).await;
        match outcome {
            Ok(results) => collect_rows(results),
            Err(_) => {
                conn.close_on_drop();
                Err(timeout_error($timeout))
            }
        }
    }};
}

/// Runs validated read-only SQL against a pool.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    query_timeout: Duration,
    max_rows: usize,
}

impl QueryExecutor {
    pub fn new(query_timeout: Duration, max_rows: usize) -> Self {
        Self {
            query_timeout,
            max_rows: max_rows.max(1),
        }
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Execute `sql` and return up to `max_rows` rows.
    ///
    /// A failed borrow is a connection error; the database rejecting the
    /// statement is an SQL error; running past the query timeout is a
    /// timeout error.
    pub async fn execute(&self, pool: &DbPool, sql: &str) -> EngineResult<QueryResult> {
        let start = Instant::now();
        let fetch_limit = self.max_rows.saturating_add(1);

        debug!(
            sql = %sql,
            max_rows = self.max_rows,
            timeout_secs = self.query_timeout.as_secs(),
            "Executing query"
        );

        let result = match pool {
            DbPool::MySql(p) => {
                let rows = fetch_limited!(p, sql, fetch_limit, self.query_timeout)?;
                self.process_rows(rows)
            }
            DbPool::Postgres(p) => {
                let rows = fetch_limited!(p, sql, fetch_limit, self.query_timeout)?;
                self.process_rows(rows)
            }
            DbPool::Sqlite(p) => {
                let rows = fetch_limited!(p, sql, fetch_limit, self.query_timeout)?;
                self.process_rows(rows)
            }
        };

        debug!(
            rows = result.rows.len(),
            truncated = result.truncated,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query finished"
        );
        Ok(result)
    }

    fn process_rows<R: RowToJson>(&self, rows: Vec<R>) -> QueryResult {
        let Some(first) = rows.first() else {
            return QueryResult::default();
        };

        let columns = first.column_names();
        let total = rows.len();
        let truncated = total > self.max_rows;
        if truncated {
            warn!(limit = self.max_rows, "Query result truncated");
        }

        let rows = rows
            .iter()
            .take(self.max_rows)
            .map(RowToJson::to_json_map)
            .collect();

        QueryResult {
            columns,
            rows,
            truncated,
        }
    }
}

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> EngineResult<Vec<R>> {
    results
        .into_iter()
        .map(|r| r.map_err(EngineError::from))
        .collect()
}

fn timeout_error(limit: Duration) -> EngineError {
    EngineError::timeout("query execution", limit.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> DbPool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        for i in 1..=5 {
            sqlx::query("INSERT INTO items (id, name) VALUES (?, ?)")
                .bind(i)
                .bind(format!("item-{}", i))
                .execute(&pool)
                .await
                .unwrap();
        }
        DbPool::Sqlite(pool)
    }

    #[tokio::test]
    async fn test_execute_returns_ordered_columns() {
        let pool = memory_pool().await;
        let executor = QueryExecutor::new(Duration::from_secs(5), 100);

        let result = executor
            .execute(&pool, "SELECT name, id FROM items ORDER BY id")
            .await
            .unwrap();
        assert_eq!(result.columns, vec!["name", "id"]);
        assert_eq!(result.rows.len(), 5);
        assert!(!result.truncated);
        assert_eq!(result.rows[0]["name"], "item-1");
        let keys: Vec<_> = result.rows[0].keys().cloned().collect();
        assert_eq!(keys, vec!["name", "id"]);
    }

    #[tokio::test]
    async fn test_execute_truncates_at_ceiling() {
        let pool = memory_pool().await;
        let executor = QueryExecutor::new(Duration::from_secs(5), 3);

        let result = executor.execute(&pool, "SELECT id FROM items").await.unwrap();
        assert_eq!(result.rows.len(), 3);
        assert!(result.truncated);

        let exact = QueryExecutor::new(Duration::from_secs(5), 5);
        let result = exact.execute(&pool, "SELECT id FROM items").await.unwrap();
        assert_eq!(result.rows.len(), 5);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_empty_result_has_no_columns() {
        let pool = memory_pool().await;
        let executor = QueryExecutor::new(Duration::from_secs(5), 10);

        let result = executor
            .execute(&pool, "SELECT id FROM items WHERE id > 100")
            .await
            .unwrap();
        assert!(result.columns.is_empty());
        assert!(result.rows.is_empty());
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_database_error_maps_to_sql_error() {
        let pool = memory_pool().await;
        let executor = QueryExecutor::new(Duration::from_secs(5), 10);

        let err = executor
            .execute(&pool, "SELECT * FROM missing_table")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Sql { .. }));
        assert!(err.to_string().contains("missing_table"));
    }
}
