//! Data models shared across the engine.

pub mod connection;
pub mod query;
pub mod schema;

pub use connection::{ConnectionKey, ConnectionRequest, Credential, Target, Upload};
pub use query::{ConnectionProbe, PoolDetail, PoolStats, QueryResult, Row};
pub use schema::{
    ColumnDescriptor, OutgoingRelation, RelationKind, SchemaDescriptor, TableDescriptor,
};
