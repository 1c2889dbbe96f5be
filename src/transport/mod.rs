//! Host transports.
//!
//! The engine itself is transport-agnostic. The stdio transport serves
//! JSON-lines requests for operators and process-level integration.

pub mod stdio;

pub use stdio::StdioTransport;

use crate::error::EngineResult;
use std::future::Future;

/// A long-running host loop around an [`Engine`](crate::engine::Engine).
pub trait Transport: Send + Sync {
    /// Serve requests until the input ends or a shutdown signal arrives.
    fn run(&self) -> impl Future<Output = EngineResult<()>> + Send;

    /// Name of this transport for logging.
    fn name(&self) -> &'static str;
}
