//! Connection-related data models.
//!
//! A [`ConnectionRequest`] is what callers hand in; a [`ConnectionKey`] is
//! what the pool registry uses to decide whether two requests may share a pool.

use crate::db::Dialect;
use crate::error::{EngineError, EngineResult};
use std::fmt;
use std::path::Path;

/// A secret that compares and hashes like a string but never prints.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

/// Connection parameters for a server database.
#[derive(Debug, Clone)]
pub struct ConnectionRequest {
    pub dialect: Dialect,
    /// `host:port/database`
    pub locator: String,
    pub principal: String,
    pub credential: Credential,
}

impl ConnectionRequest {
    /// Build and validate a request.
    ///
    /// Embedded databases are not addressed by locator; they arrive as
    /// uploads and are keyed by their temp file path.
    pub fn new(
        dialect: &str,
        locator: impl Into<String>,
        principal: impl Into<String>,
        credential: impl Into<String>,
    ) -> EngineResult<Self> {
        let dialect: Dialect = dialect.parse()?;
        if dialect.is_embedded() {
            return Err(EngineError::invalid_request(
                "SQLite databases must be supplied as an uploaded file",
            ));
        }

        let locator = locator.into().trim().to_string();
        dialect.resolve(&locator)?;

        let principal = principal.into();
        if principal.trim().is_empty() {
            return Err(EngineError::invalid_request("Username is required"));
        }
        let credential = Credential::new(credential);
        if credential.is_empty() {
            return Err(EngineError::invalid_request("Password is required"));
        }

        Ok(Self {
            dialect,
            locator,
            principal,
            credential,
        })
    }

    pub fn key(&self) -> ConnectionKey {
        ConnectionKey {
            dialect: self.dialect,
            locator: self.locator.clone(),
            principal: self.principal.clone(),
            credential: self.credential.clone(),
        }
    }
}

/// Identity of a pool.
///
/// Two requests share a pool exactly when every field is equal. The
/// credential participates so a wrong password can never ride on a pool that
/// was opened with the right one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub dialect: Dialect,
    pub locator: String,
    pub principal: String,
    pub credential: Credential,
}

impl ConnectionKey {
    /// Key for an embedded database file.
    pub fn embedded(path: &Path) -> Self {
        Self {
            dialect: Dialect::Sqlite,
            locator: path.to_string_lossy().into_owned(),
            principal: String::new(),
            credential: Credential::default(),
        }
    }
}

/// Renders as `dialect:locator:principal`. Safe to log.
impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.dialect, self.locator, self.principal)
    }
}

/// An uploaded embedded-database file.
#[derive(Clone)]
pub struct Upload {
    /// Original client-side file name, used only for its extension and for
    /// reporting.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// What an operation runs against.
#[derive(Debug, Clone)]
pub enum Target {
    Server(ConnectionRequest),
    Upload(Upload),
}

impl Target {
    pub fn dialect(&self) -> Dialect {
        match self {
            Self::Server(request) => request.dialect,
            Self::Upload(_) => Dialect::Sqlite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn request(locator: &str, user: &str, password: &str) -> ConnectionRequest {
        ConnectionRequest::new("postgresql", locator, user, password).unwrap()
    }

    #[test]
    fn test_identical_requests_share_a_key() {
        let a = request("localhost:5432/app", "reader", "pw");
        let b = request("localhost:5432/app", "reader", "pw");
        assert_eq!(a.key(), b.key());

        let keys: HashSet<_> = [a.key(), b.key()].into_iter().collect();
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn test_keys_are_strict() {
        let base = request("localhost:5432/app", "reader", "pw").key();
        let other_db = request("localhost:5432/other", "reader", "pw").key();
        let other_user = request("localhost:5432/app", "writer", "pw").key();
        let other_secret = request("localhost:5432/app", "reader", "pw2").key();
        let other_dialect = ConnectionRequest::new("mysql", "localhost:5432/app", "reader", "pw")
            .unwrap()
            .key();

        for key in [other_db, other_user, other_secret, other_dialect] {
            assert_ne!(base, key);
        }
    }

    #[test]
    fn test_debug_and_display_hide_credential() {
        let req = request("localhost:5432/app", "reader", "hunter2");
        assert!(!format!("{:?}", req).contains("hunter2"));
        assert!(!format!("{:?}", req.key()).contains("hunter2"));
        assert_eq!(req.key().to_string(), "postgresql:localhost:5432/app:reader");
    }

    #[test]
    fn test_request_validation() {
        assert!(matches!(
            ConnectionRequest::new("db2", "localhost:50000/app", "u", "p"),
            Err(EngineError::UnsupportedDialect { .. })
        ));
        assert!(matches!(
            ConnectionRequest::new("sqlite", "/tmp/a.db", "u", "p"),
            Err(EngineError::InvalidRequest { .. })
        ));
        assert!(matches!(
            ConnectionRequest::new("mysql", "localhost:3306/app", " ", "p"),
            Err(EngineError::InvalidRequest { .. })
        ));
        assert!(matches!(
            ConnectionRequest::new("mysql", "localhost:3306/app", "u", ""),
            Err(EngineError::InvalidRequest { .. })
        ));
        assert!(matches!(
            ConnectionRequest::new("mysql", "localhost/app", "u", "p"),
            Err(EngineError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_embedded_key() {
        let key = ConnectionKey::embedded(Path::new("/tmp/upload_abc.db"));
        assert_eq!(key.dialect, Dialect::Sqlite);
        assert_eq!(key.locator, "/tmp/upload_abc.db");
        assert!(key.principal.is_empty());
    }

    #[test]
    fn test_target_dialect() {
        let server = Target::Server(request("localhost:5432/app", "reader", "pw"));
        assert_eq!(server.dialect(), Dialect::Postgres);
        let upload = Target::Upload(Upload::new("a.db", vec![1]));
        assert_eq!(upload.dialect(), Dialect::Sqlite);
    }

    #[test]
    fn test_upload_debug_omits_bytes() {
        let upload = Upload::new("shop.db", vec![1, 2, 3]);
        assert_eq!(format!("{:?}", upload), "Upload { file_name: \"shop.db\", len: 3 }");
    }
}
