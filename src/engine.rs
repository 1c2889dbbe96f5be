//! Engine facade.
//!
//! [`Engine`] is constructed once per process and shared by reference. It owns
//! the pool registry, the temp file manager and the query guard, and exposes
//! the schema, query and connection-test operations for server databases and
//! uploaded SQLite files.
//!
//! Upload operations run against a pool keyed by the temp file path. That pool
//! is discarded and the temp file deleted before the operation returns,
//! whatever its outcome.

use crate::config::EngineSettings;
use crate::db::pool::{self, PoolSizing};
use crate::db::{Dialect, PoolRegistry, QueryExecutor, SchemaInspector};
use crate::error::{EngineError, EngineResult};
use crate::files::{TempFileManager, TempUpload};
use crate::models::{
    ConnectionKey, ConnectionProbe, ConnectionRequest, PoolStats, QueryResult, SchemaDescriptor,
    Target, Upload,
};
use crate::validator::QueryValidator;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Engine {
    settings: EngineSettings,
    registry: Arc<PoolRegistry>,
    executor: QueryExecutor,
    validator: QueryValidator,
    files: TempFileManager,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Self {
        let registry = PoolRegistry::new(settings.pool.clone());
        let executor = QueryExecutor::new(settings.query_timeout, settings.max_rows);
        let validator = QueryValidator::new(settings.strict_validation);
        let files = TempFileManager::new(settings.temp_dir.clone());

        Self {
            settings,
            registry,
            executor,
            validator,
            files,
        }
    }

    /// Start the periodic idle sweep. Must be called inside a Tokio runtime.
    pub fn start_reaper(&self) {
        self.registry.start_reaper(self.settings.reap_interval);
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    pub fn files(&self) -> &TempFileManager {
        &self.files
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn schema_for(&self, target: &Target) -> EngineResult<SchemaDescriptor> {
        match target {
            Target::Server(request) => self.schema(request).await,
            Target::Upload(upload) => self.schema_from_upload(upload).await,
        }
    }

    pub async fn query_for(&self, target: &Target, sql: &str) -> EngineResult<QueryResult> {
        match target {
            Target::Server(request) => self.query(request, sql).await,
            Target::Upload(upload) => self.query_upload(upload, sql).await,
        }
    }

    pub async fn test_for(&self, target: &Target) -> EngineResult<ConnectionProbe> {
        match target {
            Target::Server(request) => self.test_connection(request).await,
            Target::Upload(upload) => self.test_upload(upload).await,
        }
    }

    // =========================================================================
    // Server databases
    // =========================================================================

    pub async fn schema(&self, request: &ConnectionRequest) -> EngineResult<SchemaDescriptor> {
        info!(
            dialect = %request.dialect,
            locator = %request.locator,
            principal = %request.principal,
            "Introspecting schema"
        );
        self.introspect_key(&request.key()).await
    }

    /// Validate and run `sql`. A rejected query never borrows a connection.
    pub async fn query(&self, request: &ConnectionRequest, sql: &str) -> EngineResult<QueryResult> {
        self.validator.validate(sql, request.dialect)?;
        info!(
            dialect = %request.dialect,
            locator = %request.locator,
            principal = %request.principal,
            "Running query"
        );
        self.execute_key(&request.key(), sql).await
    }

    /// The handle is held for the duration of the call so the sweep cannot
    /// evict the pool underneath it.
    async fn introspect_key(&self, key: &ConnectionKey) -> EngineResult<SchemaDescriptor> {
        let handle = self.registry.acquire_pool(key).await?;
        SchemaInspector::introspect(handle.pool()).await
    }

    async fn execute_key(&self, key: &ConnectionKey, sql: &str) -> EngineResult<QueryResult> {
        let handle = self.registry.acquire_pool(key).await?;
        self.executor.execute(handle.pool(), sql).await
    }

    /// Connect with a throwaway single-connection pool and describe what
    /// answered. Nothing is registered.
    pub async fn test_connection(&self, request: &ConnectionRequest) -> EngineResult<ConnectionProbe> {
        info!(
            dialect = %request.dialect,
            locator = %request.locator,
            principal = %request.principal,
            "Testing connection"
        );
        let key = request.key();
        let target = request.dialect.resolve(&request.locator)?;
        let db_pool = pool::connect(&key, PoolSizing::probe(self.registry.options())).await?;

        let version = db_pool.server_version().await;
        let catalog = SchemaInspector::database_name(&db_pool).await.ok();
        db_pool.close().await;

        Ok(ConnectionProbe {
            database_product_name: request.dialect.display_name().to_string(),
            database_product_version: version,
            driver_name: target.driver.to_string(),
            url: target.url,
            username: Some(request.principal.clone()),
            catalog,
            file_name: None,
            file_size: None,
            table_count: None,
        })
    }

    // =========================================================================
    // Uploaded SQLite files
    // =========================================================================

    pub async fn schema_from_upload(&self, upload: &Upload) -> EngineResult<SchemaDescriptor> {
        let temp = self.files.persist(upload).await?;
        let key = ConnectionKey::embedded(temp.path());
        info!(file_name = %upload.file_name, size = upload.len(), "Introspecting uploaded database");

        let result = self.introspect_key(&key).await;

        self.finish_upload(&key, temp).await;
        result
    }

    pub async fn query_upload(&self, upload: &Upload, sql: &str) -> EngineResult<QueryResult> {
        self.validator.validate(sql, Dialect::Sqlite)?;
        let temp = self.files.persist(upload).await?;
        let key = ConnectionKey::embedded(temp.path());
        info!(file_name = %upload.file_name, size = upload.len(), "Running query on uploaded database");

        let result = self.execute_key(&key, sql).await;

        self.finish_upload(&key, temp).await;
        result
    }

    pub async fn test_upload(&self, upload: &Upload) -> EngineResult<ConnectionProbe> {
        let temp = self.files.persist(upload).await?;
        let key = ConnectionKey::embedded(temp.path());
        info!(file_name = %upload.file_name, size = upload.len(), "Testing uploaded database");

        let result = self.probe_upload(&key, &temp).await;
        self.files.release(temp);
        result
    }

    async fn probe_upload(&self, key: &ConnectionKey, temp: &TempUpload) -> EngineResult<ConnectionProbe> {
        let target = Dialect::Sqlite.resolve(&key.locator)?;
        let db_pool = pool::connect(key, PoolSizing::probe(self.registry.options())).await?;

        let version = db_pool.server_version().await;
        let tables = SchemaInspector::table_count(&db_pool).await;
        let catalog = SchemaInspector::database_name(&db_pool).await.ok();
        db_pool.close().await;

        // A file that opens but has no readable catalog is not a database.
        let tables = tables.map_err(|e| {
            EngineError::connection(
                format!("Failed to read database: {}", e),
                "Check that the uploaded file is a valid SQLite database",
            )
        })?;

        Ok(ConnectionProbe {
            database_product_name: Dialect::Sqlite.display_name().to_string(),
            database_product_version: version,
            driver_name: target.driver.to_string(),
            url: target.url,
            username: None,
            catalog,
            file_name: Some(temp.original_name().to_string()),
            file_size: Some(temp.size()),
            table_count: Some(tables as u64),
        })
    }

    /// Drop the pool for an upload's key, then its file.
    async fn finish_upload(&self, key: &ConnectionKey, temp: TempUpload) {
        self.registry.discard(key).await;
        self.files.release(temp);
        debug!(key = %key, "Upload released");
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub async fn pool_stats(&self) -> PoolStats {
        self.registry.stats().await
    }

    /// Stop the sweep, close every pool and retry failed temp deletions.
    pub async fn shutdown(&self) {
        info!("Shutting down engine");
        self.registry.stop_reaper();
        self.registry.close_all().await;

        let remaining = self.files.purge_leftovers();
        if remaining > 0 {
            warn!(remaining, "Temp files could not be deleted");
        }
        info!("Engine shut down");
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("executor", &self.executor)
            .field("validator", &self.validator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(EngineSettings::default())
    }

    #[tokio::test]
    async fn test_rejected_query_never_connects() {
        let engine = engine();
        // Nothing listens here; a connection attempt would fail differently.
        let request =
            ConnectionRequest::new("postgresql", "127.0.0.1:1/app", "reader", "pw").unwrap();

        let err = engine
            .query(&request, "SELECT * FROM users; DROP TABLE users;")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuery { .. }));
        assert_eq!(engine.registry().pool_count().await, 0);
    }

    #[tokio::test]
    async fn test_rejected_upload_query_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(EngineSettings {
            temp_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        });

        let upload = Upload::new("a.db", vec![1, 2, 3]);
        let err = engine.query_upload(&upload, "SELECT '").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuery { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_empty_upload() {
        let engine = engine();
        let err = engine
            .schema_from_upload(&Upload::new("a.db", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyFile));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let engine = engine();
        engine.start_reaper();
        engine.shutdown().await;
        engine.shutdown().await;
        assert_eq!(engine.pool_stats().await.pool_count, 0);
    }
}
