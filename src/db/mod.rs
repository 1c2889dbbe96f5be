//! Database layer.
//!
//! - Dialect resolution and locator parsing
//! - Connection pools and the keyed pool registry
//! - Guarded query execution
//! - Schema introspection
//! - Row-to-JSON type mapping
//! - Dispatch macros shared by the per-dialect code

pub mod dialect;
pub mod executor;
#[macro_use]
pub mod macros;
pub mod pool;
pub mod registry;
pub mod schema;
pub mod types;

pub use dialect::{Dialect, ResolvedTarget};
pub use executor::QueryExecutor;
pub use pool::{ConnectionPool, DbPool, PoolSizing};
pub use registry::{PoolHandle, PoolRegistry};
pub use schema::SchemaInspector;
pub use types::RowToJson;
