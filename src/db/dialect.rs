//! Dialect adapter.
//!
//! Per-database-kind knowledge lives here: how a raw locator becomes a
//! connection URL, which driver serves it, and which probe statement checks a
//! connection. Everything in this module is pure.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Supported database kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Includes MariaDB
    MySql,
    Postgres,
    /// Embedded file databases, always supplied as uploads.
    Sqlite,
}

/// A locator resolved into something a driver can open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub dialect: Dialect,
    /// Connection URL without userinfo. Safe to log.
    pub url: String,
    pub driver: &'static str,
}

impl Dialect {
    /// Identifier of the sqlx driver that serves this dialect.
    pub fn driver_name(&self) -> &'static str {
        match self {
            Self::MySql => "sqlx-mysql",
            Self::Postgres => "sqlx-postgres",
            Self::Sqlite => "sqlx-sqlite",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MySql => "MySQL",
            Self::Postgres => "PostgreSQL",
            Self::Sqlite => "SQLite",
        }
    }

    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::MySql => Some(3306),
            Self::Postgres => Some(5432),
            Self::Sqlite => None,
        }
    }

    /// True for file-backed dialects that have no server.
    pub fn is_embedded(&self) -> bool {
        matches!(self, Self::Sqlite)
    }

    /// Statement used as the pool's health check.
    pub fn health_check_query(&self) -> &'static str {
        "SELECT 1"
    }

    fn scheme(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Build the connection URL for a raw locator.
    ///
    /// Server locators must have the form `host:port/database`. The embedded
    /// locator is a file path. Credentials are never part of the URL; they are
    /// applied through driver options when the pool is built.
    pub fn resolve(&self, locator: &str) -> EngineResult<ResolvedTarget> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(EngineError::invalid_request("Locator cannot be empty"));
        }

        let url = match self {
            Self::Sqlite => format!("sqlite://{}", locator),
            Self::MySql | Self::Postgres => self.server_url(locator)?.to_string(),
        };

        Ok(ResolvedTarget {
            dialect: *self,
            url,
            driver: self.driver_name(),
        })
    }

    fn server_url(&self, locator: &str) -> EngineResult<Url> {
        let invalid = |reason: &str| {
            EngineError::invalid_request(format!(
                "Invalid locator '{}': {}. Expected host:port/database",
                locator, reason
            ))
        };

        if locator.contains('@') || locator.contains('?') || locator.contains('#') {
            return Err(invalid("credentials and options are not allowed"));
        }

        let (authority, database) = locator
            .split_once('/')
            .ok_or_else(|| invalid("missing database name"))?;
        if database.is_empty() || database.contains('/') {
            return Err(invalid("database name must be a single path segment"));
        }
        if !database
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(invalid("database name contains unsupported characters"));
        }

        let (host, port) = authority
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        if port.parse::<u16>().is_err() {
            return Err(invalid("port must be a number between 0 and 65535"));
        }

        let url = Url::parse(&format!("{}://{}/{}", self.scheme(), authority, database))
            .map_err(|e| invalid(&e.to_string()))?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host"));
        }
        Ok(url)
    }
}

impl FromStr for Dialect {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgresql" | "postgres" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(EngineError::unsupported_dialect(other)),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MySql => write!(f, "mysql"),
            Self::Postgres => write!(f, "postgresql"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dialect() {
        assert_eq!("mysql".parse::<Dialect>().unwrap(), Dialect::MySql);
        assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("postgres".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!(" sqlite ".parse::<Dialect>().unwrap(), Dialect::Sqlite);
    }

    #[test]
    fn test_unsupported_dialect() {
        let err = "oracle".parse::<Dialect>().unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedDialect { ref dialect } if dialect == "oracle"));
        assert_eq!(err.code(), 2001);
    }

    #[test]
    fn test_resolve_server_urls() {
        let target = Dialect::MySql.resolve("db.internal:3306/sales").unwrap();
        assert_eq!(target.url, "mysql://db.internal:3306/sales");
        assert_eq!(target.driver, "sqlx-mysql");

        let target = Dialect::Postgres.resolve("10.0.0.7:5433/analytics").unwrap();
        assert_eq!(target.url, "postgres://10.0.0.7:5433/analytics");
    }

    #[test]
    fn test_resolve_sqlite_path() {
        let target = Dialect::Sqlite.resolve("/tmp/upload_x.db").unwrap();
        assert_eq!(target.url, "sqlite:///tmp/upload_x.db");
        assert!(Dialect::Sqlite.is_embedded());
    }

    #[test]
    fn test_resolve_rejects_malformed_locators() {
        for locator in [
            "",
            "localhost",
            "localhost/app",
            "localhost:abc/app",
            ":5432/app",
            "localhost:5432/",
            "localhost:5432/app/extra",
            "user:pw@localhost:5432/app",
            "localhost:5432/app?sslmode=disable",
            "localhost:5432/app;drop",
        ] {
            let result = Dialect::Postgres.resolve(locator);
            assert!(
                matches!(result, Err(EngineError::InvalidRequest { .. })),
                "locator should be rejected: {:?}",
                locator
            );
        }
    }

    #[test]
    fn test_url_never_contains_userinfo() {
        let target = Dialect::MySql.resolve("localhost:3306/app").unwrap();
        let url = Url::parse(&target.url).unwrap();
        assert_eq!(url.username(), "");
        assert!(url.password().is_none());
    }
}
