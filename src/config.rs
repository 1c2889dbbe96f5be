//! Configuration handling.
//!
//! Library callers build [`EngineSettings`] directly. The binary parses a
//! [`Config`] from CLI arguments and environment variables and converts it.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_ROWS: usize = 10_000;

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_IDLE: u32 = 1;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_REAP_INTERVAL_SECS: u64 = 600;

/// Connection pool sizing and timing overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum connections per pool (default: 5 for MySQL/PostgreSQL, 1 for SQLite)
    pub max_connections: Option<u32>,
    /// Connections kept open while the pool is idle (default: 1)
    pub min_idle: Option<u32>,
    /// Connect and borrow timeout in seconds (default: 30)
    pub connect_timeout_secs: Option<u64>,
    /// Idle timeout for individual connections in seconds (default: 300)
    pub idle_timeout_secs: Option<u64>,
}

impl PoolOptions {
    /// Get max_connections with default value based on database type.
    pub fn max_connections_or_default(&self, is_embedded: bool) -> u32 {
        self.max_connections.unwrap_or(if is_embedded {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    /// Minimum idle connections, never above the pool's maximum.
    pub fn min_idle_or_default(&self, is_embedded: bool) -> u32 {
        self.min_idle
            .unwrap_or(DEFAULT_MIN_IDLE)
            .min(self.max_connections_or_default(is_embedded))
    }

    pub fn connect_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    pub fn idle_timeout_or_default(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS))
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err("max_connections must be greater than 0".to_string());
            }
            if let Some(min) = self.min_idle {
                if min > max {
                    return Err(format!(
                        "min_idle ({}) cannot exceed max_connections ({})",
                        min, max
                    ));
                }
            }
        }
        if self.connect_timeout_secs == Some(0) {
            return Err("connect_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Everything the engine needs at construction time.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub pool: PoolOptions,
    pub query_timeout: Duration,
    /// Row ceiling for a single query result.
    pub max_rows: usize,
    pub reap_interval: Duration,
    /// Directory for uploaded database files. `None` uses the system temp dir.
    pub temp_dir: Option<PathBuf>,
    /// Additionally require queries to parse as a single read-only statement.
    pub strict_validation: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            pool: PoolOptions::default(),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            max_rows: DEFAULT_MAX_ROWS,
            reap_interval: Duration::from_secs(DEFAULT_REAP_INTERVAL_SECS),
            temp_dir: None,
            strict_validation: false,
        }
    }
}

/// Command-line configuration for the `slm-embed` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "slm-embed",
    about = "Introspect and query user-supplied MySQL, PostgreSQL and SQLite databases",
    version,
    author
)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,

    /// Maximum connections per pool (default: 5, or 1 for SQLite)
    #[arg(long, global = true, env = "SLM_EMBED_MAX_CONNECTIONS")]
    pub max_connections: Option<u32>,

    /// Connections kept open while a pool is idle
    #[arg(long, global = true, env = "SLM_EMBED_MIN_IDLE")]
    pub min_idle: Option<u32>,

    /// Connect and borrow timeout in seconds
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "SLM_EMBED_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,

    /// Idle timeout for pooled connections in seconds
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_IDLE_TIMEOUT_SECS,
        env = "SLM_EMBED_IDLE_TIMEOUT"
    )]
    pub idle_timeout: u64,

    /// Period of the idle-pool sweep in seconds
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_REAP_INTERVAL_SECS,
        env = "SLM_EMBED_REAP_INTERVAL"
    )]
    pub reap_interval: u64,

    /// Query timeout in seconds
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "SLM_EMBED_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Row ceiling for query results
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_MAX_ROWS,
        env = "SLM_EMBED_MAX_ROWS"
    )]
    pub max_rows: usize,

    /// Directory for uploaded database files
    #[arg(long, global = true, env = "SLM_EMBED_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Also require queries to parse as a single read-only statement
    #[arg(long, global = true, env = "SLM_EMBED_STRICT_VALIDATION")]
    pub strict_validation: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "SLM_EMBED_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, global = true, env = "SLM_EMBED_JSON_LOGS")]
    pub json_logs: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the normalized schema of a database
    Schema(TargetArgs),
    /// Validate and run a read-only query
    Query {
        #[command(flatten)]
        target: TargetArgs,
        /// SQL text to run
        #[arg(long)]
        sql: String,
    },
    /// Check connectivity without registering a pool
    Test(TargetArgs),
    /// Serve JSON-lines requests on stdin/stdout
    Serve,
}

/// Where to connect: a server database or a local SQLite file.
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// Database type (mysql, postgresql); implied sqlite with --file
    #[arg(long, required_unless_present = "file")]
    pub dialect: Option<String>,

    /// Server locator in host:port/database form
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub locator: Option<String>,

    /// Database user
    #[arg(long, short = 'u', conflicts_with = "file")]
    pub user: Option<String>,

    /// Database password
    #[arg(
        long,
        env = "SLM_EMBED_DB_PASSWORD",
        hide_env_values = true,
        conflicts_with = "file"
    )]
    pub password: Option<String>,

    /// SQLite database file, handled like an upload
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,
}

impl Config {
    /// Pool options assembled from the CLI flags.
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_connections: self.max_connections,
            min_idle: self.min_idle,
            connect_timeout_secs: Some(self.connect_timeout),
            idle_timeout_secs: Some(self.idle_timeout),
        }
    }

    /// Convert into engine settings, validating the pool options.
    pub fn engine_settings(&self) -> Result<EngineSettings, String> {
        let pool = self.pool_options();
        pool.validate()?;
        if self.query_timeout == 0 {
            return Err("query_timeout must be greater than 0".to_string());
        }
        if self.max_rows == 0 {
            return Err("max_rows must be greater than 0".to_string());
        }
        if self.reap_interval == 0 {
            return Err("reap_interval must be greater than 0".to_string());
        }
        Ok(EngineSettings {
            pool,
            query_timeout: Duration::from_secs(self.query_timeout),
            max_rows: self.max_rows,
            reap_interval: Duration::from_secs(self.reap_interval),
            temp_dir: self.temp_dir.clone(),
            strict_validation: self.strict_validation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_defaults() {
        let opts = PoolOptions::default();
        assert_eq!(opts.max_connections_or_default(false), 5);
        assert_eq!(opts.max_connections_or_default(true), 1);
        assert_eq!(opts.min_idle_or_default(false), 1);
        assert_eq!(opts.connect_timeout_or_default(), Duration::from_secs(30));
        assert_eq!(opts.idle_timeout_or_default(), Duration::from_secs(300));
    }

    #[test]
    fn test_min_idle_clamped_to_max() {
        let opts = PoolOptions {
            min_idle: Some(4),
            ..Default::default()
        };
        assert_eq!(opts.min_idle_or_default(false), 4);
        assert_eq!(opts.min_idle_or_default(true), 1);
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let zero_max = PoolOptions {
            max_connections: Some(0),
            ..Default::default()
        };
        assert!(zero_max.validate().is_err());

        let inverted = PoolOptions {
            max_connections: Some(2),
            min_idle: Some(3),
            ..Default::default()
        };
        assert!(inverted.validate().unwrap_err().contains("min_idle"));

        assert!(PoolOptions::default().validate().is_ok());
    }

    #[test]
    fn test_engine_settings_rejects_zero_limits() {
        for flag in ["--query-timeout", "--max-rows", "--reap-interval"] {
            let config = Config::try_parse_from(["slm-embed", flag, "0", "serve"]).unwrap();
            let err = config.engine_settings().unwrap_err();
            assert!(err.contains("greater than 0"), "{}: {}", flag, err);
        }
    }

    #[test]
    fn test_parse_schema_command() {
        let config = Config::try_parse_from([
            "slm-embed",
            "schema",
            "--dialect",
            "mysql",
            "--locator",
            "db.internal:3306/sales",
            "--user",
            "reader",
            "--password",
            "secret",
        ])
        .unwrap();

        match config.command {
            Command::Schema(target) => {
                assert_eq!(target.dialect.as_deref(), Some("mysql"));
                assert_eq!(target.locator.as_deref(), Some("db.internal:3306/sales"));
                assert_eq!(target.user.as_deref(), Some("reader"));
                assert!(target.file.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_query_with_file() {
        let config = Config::try_parse_from([
            "slm-embed",
            "query",
            "--file",
            "/tmp/chinook.db",
            "--sql",
            "SELECT 1",
            "--max-rows",
            "50",
        ])
        .unwrap();

        let settings = config.engine_settings().unwrap();
        assert_eq!(settings.max_rows, 50);
        match config.command {
            Command::Query { target, sql } => {
                assert_eq!(sql, "SELECT 1");
                assert_eq!(target.file, Some(PathBuf::from("/tmp/chinook.db")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_file_conflicts_with_locator() {
        let result = Config::try_parse_from([
            "slm-embed",
            "test",
            "--file",
            "a.db",
            "--locator",
            "localhost:5432/app",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_engine_settings_defaults() {
        let config = Config::try_parse_from(["slm-embed", "serve"]).unwrap();
        let settings = config.engine_settings().unwrap();
        assert_eq!(settings.query_timeout, Duration::from_secs(30));
        assert_eq!(settings.reap_interval, Duration::from_secs(600));
        assert_eq!(settings.max_rows, DEFAULT_MAX_ROWS);
        assert!(!settings.strict_validation);
    }
}
