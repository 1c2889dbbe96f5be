//! Query results and engine telemetry models.

use crate::db::Dialect;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// One result row. Keys keep the column order of the result cursor.
pub type Row = serde_json::Map<String, JsonValue>;

/// Materialized result of an ad hoc query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    /// Column names in cursor order. Empty when the query returned no rows.
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// True when the row ceiling cut the result short.
    pub truncated: bool,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Outcome of a connectivity test.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProbe {
    pub database_product_name: String,
    pub database_product_version: Option<String>,
    pub driver_name: String,
    /// Connection URL without credentials.
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Catalog (database) name the connection landed in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    /// Uploaded file name, embedded dialect only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_count: Option<u64>,
}

/// Snapshot of one registered pool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolDetail {
    /// `dialect:locator:principal`
    pub key: String,
    pub dialect: Dialect,
    pub active_connections: u32,
    pub idle_connections: u32,
    pub total_connections: u32,
    pub age_secs: u64,
}

/// Snapshot of the whole registry.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub pool_count: usize,
    /// Sum of borrowed connections across all pools.
    pub active_connections: u32,
    pub details: Vec<PoolDetail>,
}
