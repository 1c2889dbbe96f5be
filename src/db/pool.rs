//! Connection pools.
//!
//! Each dialect gets its own concrete sqlx pool (MySqlPool, PgPool,
//! SqlitePool) so that full type decoding stays available. [`connect`] builds
//! one eagerly: a pool that cannot reach its database is never returned.

use crate::config::PoolOptions;
use crate::db::dialect::Dialect;
use crate::error::{EngineError, EngineResult};
use crate::models::ConnectionKey;
use sqlx::{
    MySqlPool, PgPool, SqlitePool,
    mysql::{MySqlConnectOptions, MySqlPoolOptions},
    postgres::{PgConnectOptions, PgPoolOptions},
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl DbPool {
    pub async fn close(&self) {
        impl_db_dispatch!(self, {
            MySql(p) => p.close().await,
            Postgres(p) => p.close().await,
            Sqlite(p) => p.close().await,
        })
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            DbPool::MySql(_) => Dialect::MySql,
            DbPool::Postgres(_) => Dialect::Postgres,
            DbPool::Sqlite(_) => Dialect::Sqlite,
        }
    }

    /// Open connections, idle or borrowed.
    pub fn size(&self) -> u32 {
        impl_db_dispatch!(self, {
            MySql(p) => p.size(),
            Postgres(p) => p.size(),
            Sqlite(p) => p.size(),
        })
    }

    pub fn num_idle(&self) -> u32 {
        let idle = impl_db_dispatch!(self, {
            MySql(p) => p.num_idle(),
            Postgres(p) => p.num_idle(),
            Sqlite(p) => p.num_idle(),
        });
        u32::try_from(idle).unwrap_or(u32::MAX)
    }

    pub fn is_closed(&self) -> bool {
        impl_db_dispatch!(self, {
            MySql(p) => p.is_closed(),
            Postgres(p) => p.is_closed(),
            Sqlite(p) => p.is_closed(),
        })
    }

    /// Server (or library) version string. `None` if the lookup fails.
    pub async fn server_version(&self) -> Option<String> {
        let result = match self {
            DbPool::MySql(p) => {
                sqlx::query_scalar::<_, String>("SELECT version()")
                    .fetch_one(p)
                    .await
            }
            DbPool::Postgres(p) => {
                sqlx::query_scalar::<_, String>("SHOW server_version")
                    .fetch_one(p)
                    .await
            }
            DbPool::Sqlite(p) => {
                sqlx::query_scalar::<_, String>("SELECT sqlite_version()")
                    .fetch_one(p)
                    .await
            }
        };

        match result {
            Ok(version) => {
                debug!(version = %version, "Got server version");
                Some(version)
            }
            Err(e) => {
                warn!(error = %e, "Failed to get server version");
                None
            }
        }
    }
}

/// A registered pool plus the bookkeeping the registry needs.
#[derive(Debug)]
pub struct ConnectionPool {
    pub key: ConnectionKey,
    pub pool: DbPool,
    pub created_at: Instant,
}

impl ConnectionPool {
    pub fn new(key: ConnectionKey, pool: DbPool) -> Self {
        Self {
            key,
            pool,
            created_at: Instant::now(),
        }
    }

    /// Connections currently borrowed by callers.
    pub fn active_connections(&self) -> u32 {
        self.total_connections()
            .saturating_sub(self.idle_connections())
    }

    pub fn idle_connections(&self) -> u32 {
        self.pool.num_idle()
    }

    pub fn total_connections(&self) -> u32 {
        self.pool.size()
    }

    /// True when no connection is borrowed.
    pub fn is_idle(&self) -> bool {
        self.active_connections() == 0
    }
}

/// Resolved sizing for one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSizing {
    pub max_connections: u32,
    pub min_idle: u32,
    /// Bounds both opening a connection and borrowing one.
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl PoolSizing {
    /// Sizing for a registered pool.
    pub fn for_dialect(options: &PoolOptions, dialect: Dialect) -> Self {
        let embedded = dialect.is_embedded();
        Self {
            max_connections: options.max_connections_or_default(embedded),
            min_idle: options.min_idle_or_default(embedded),
            connect_timeout: options.connect_timeout_or_default(),
            idle_timeout: options.idle_timeout_or_default(),
        }
    }

    /// Sizing for a throwaway connectivity probe: one connection, none kept.
    pub fn probe(options: &PoolOptions) -> Self {
        Self {
            max_connections: 1,
            min_idle: 0,
            connect_timeout: options.connect_timeout_or_default(),
            idle_timeout: options.idle_timeout_or_default(),
        }
    }
}

/// Open a pool for `key` and verify it can reach the database.
///
/// Server credentials are applied through driver options, never through the
/// URL, so nothing secret ends up in driver error messages.
pub async fn connect(key: &ConnectionKey, sizing: PoolSizing) -> EngineResult<DbPool> {
    let dialect = key.dialect;
    let probe = dialect.health_check_query();
    let target = dialect.resolve(&key.locator)?;

    debug!(
        key = %key,
        url = %target.url,
        max_connections = sizing.max_connections,
        min_idle = sizing.min_idle,
        "Opening connection pool"
    );

    let failed = |e: sqlx::Error| {
        EngineError::connection(
            format!("Failed to connect: {}", e),
            connection_suggestion(dialect, &e),
        )
    };

    let pool = match dialect {
        Dialect::MySql => {
            let options = MySqlConnectOptions::from_str(&target.url)
                .map_err(failed)?
                .username(&key.principal)
                .password(key.credential.expose())
                .charset("utf8mb4");
            let pool = configure_pool!(MySqlPoolOptions::new(), sizing, probe)
                .connect_with(options)
                .await
                .map_err(failed)?;
            DbPool::MySql(pool)
        }
        Dialect::Postgres => {
            let options = PgConnectOptions::from_str(&target.url)
                .map_err(failed)?
                .username(&key.principal)
                .password(key.credential.expose());
            let pool = configure_pool!(PgPoolOptions::new(), sizing, probe)
                .connect_with(options)
                .await
                .map_err(failed)?;
            DbPool::Postgres(pool)
        }
        Dialect::Sqlite => {
            // Uploaded files already exist; a missing file is an error, not a
            // fresh database.
            let options = SqliteConnectOptions::new()
                .filename(&key.locator)
                .create_if_missing(false);
            let pool = configure_pool!(SqlitePoolOptions::new(), sizing, probe)
                .connect_with(options)
                .await
                .map_err(failed)?;
            DbPool::Sqlite(pool)
        }
    };

    info!(key = %key, "Connection pool opened");
    Ok(pool)
}

/// Generate a helpful suggestion for connection errors.
pub fn connection_suggestion(dialect: Dialect, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if matches!(error, sqlx::Error::PoolTimedOut) {
        return format!(
            "The {} server did not answer within the connect timeout",
            dialect.display_name()
        );
    }

    if error_str.contains("connection refused") {
        return format!(
            "Check that the {} server is running and accessible",
            dialect.display_name()
        );
    }

    if error_str.contains("authentication")
        || error_str.contains("password")
        || error_str.contains("access denied")
    {
        return "Verify the username and password".to_string();
    }

    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    match dialect {
        Dialect::Sqlite => "Check that the uploaded file is a valid SQLite database".to_string(),
        Dialect::MySql | Dialect::Postgres => format!(
            "Verify the locator format host:port/database (default port {})",
            dialect.default_port().unwrap_or_default()
        ),
    }
}
