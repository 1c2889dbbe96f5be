//! Database connection and schema introspection engine.
//!
//! Given connection parameters for a MySQL or PostgreSQL server, or an
//! uploaded SQLite file, the [`Engine`] pools live connections per
//! connection key, describes the database as a dialect-normalized
//! [`SchemaDescriptor`](models::SchemaDescriptor), and runs guarded read-only
//! queries. A background sweep closes pools nobody is using.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod files;
pub mod models;
pub mod transport;
pub mod validator;

pub use config::{Config, EngineSettings};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
