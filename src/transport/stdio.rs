//! JSON-lines transport over stdin/stdout.
//!
//! Each input line is one request object:
//!
//! ```json
//! {"id": "1", "op": "query", "dialect": "postgresql", "locator": "db:5432/app",
//!  "user": "reader", "password": "...", "sql": "SELECT 1"}
//! {"op": "schema", "file": {"name": "shop.db", "content": "<base64>"}}
//! {"op": "stats"}
//! ```
//!
//! Requests run concurrently; each response line carries the request's `id`
//! (a fresh UUID when the request had none), so responses may arrive out of
//! order. Logs go to stderr and never interleave with responses.

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::models::{ConnectionRequest, Target, Upload};
use crate::transport::Transport;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Schema,
    Query,
    Test,
    Stats,
}

#[derive(Debug, Deserialize)]
pub struct FilePayload {
    pub name: String,
    /// Base64 (standard alphabet, padded).
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Option<JsonValue>,
    pub op: Operation,
    #[serde(default)]
    pub dialect: Option<String>,
    #[serde(default)]
    pub locator: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub file: Option<FilePayload>,
    #[serde(default)]
    pub sql: Option<String>,
}

impl Request {
    /// Upload when a file is attached, server database otherwise.
    pub fn target(&self) -> EngineResult<Target> {
        if let Some(file) = &self.file {
            let bytes = BASE64.decode(file.content.trim()).map_err(|e| {
                EngineError::invalid_request(format!("file content is not valid base64: {}", e))
            })?;
            return Ok(Target::Upload(Upload::new(&file.name, bytes)));
        }

        let dialect = self
            .dialect
            .as_deref()
            .ok_or_else(|| EngineError::invalid_request("dialect is required"))?;
        let request = ConnectionRequest::new(
            dialect,
            self.locator.clone().unwrap_or_default(),
            self.user.clone().unwrap_or_default(),
            self.password.clone().unwrap_or_default(),
        )?;
        Ok(Target::Server(request))
    }
}

#[derive(Debug, Serialize)]
struct Response {
    id: JsonValue,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonValue>,
}

impl Response {
    fn new<T: Serialize>(id: JsonValue, outcome: EngineResult<T>) -> Self {
        let outcome = outcome.and_then(|value| {
            serde_json::to_value(value)
                .map_err(|e| EngineError::invalid_request(format!("unserializable result: {}", e)))
        });
        match outcome {
            Ok(result) => Self {
                id,
                ok: true,
                result: Some(result),
                error: None,
            },
            Err(e) => Self {
                id,
                ok: false,
                result: None,
                error: Some(e.to_json()),
            },
        }
    }

    fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"id":null,"ok":false,"error":{{"code":5000,"kind":"io_error","message":"{}"}}}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }
}

/// Stdio transport implementation.
pub struct StdioTransport {
    engine: Arc<Engine>,
}

impl StdioTransport {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Serve requests from `reader` until it ends, writing responses to
    /// `writer`. Returns once every in-flight request has answered.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> EngineResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let mut tx = Some(tx);
        let mut lines = reader.lines();

        loop {
            tokio::select! {
                line = lines.next_line(), if tx.is_some() => match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        if let Some(sender) = &tx {
                            let sender = sender.clone();
                            let engine = Arc::clone(&self.engine);
                            tokio::spawn(async move {
                                let response = handle_line(&engine, &line).await;
                                // The receiver only goes away if the writer failed.
                                let _ = sender.send(response);
                            });
                        }
                    }
                    None => {
                        debug!("Input closed, draining in-flight requests");
                        tx = None;
                    }
                },
                Some(response) = rx.recv() => {
                    writer.write_all(response.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await?;
                }
                else => break,
            }
        }
        Ok(())
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> EngineResult<()> {
        info!("Serving JSON-lines requests on stdio");
        self.engine.start_reaper();

        let reader = BufReader::new(tokio::io::stdin());
        let writer = tokio::io::stdout();

        let shutdown_requested = tokio::select! {
            result = self.serve(reader, writer) => {
                if let Err(e) = &result {
                    warn!(error = %e, "Stdio transport error");
                }
                result.map(|_| false)
            }
            _ = wait_for_signal() => {
                info!("Shutdown signal received");
                Ok(true)
            }
        };

        self.engine.shutdown().await;

        if matches!(shutdown_requested, Ok(true)) {
            // A pending stdin read cannot be interrupted; leave without
            // waiting on it.
            info!("Exiting process");
            std::process::exit(0);
        }
        shutdown_requested.map(|_| ())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}

async fn handle_line(engine: &Engine, line: &str) -> String {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            let err = EngineError::invalid_request(format!("malformed request: {}", e));
            return Response::new::<()>(JsonValue::Null, Err(err)).to_line();
        }
    };

    let id = request
        .id
        .clone()
        .unwrap_or_else(|| JsonValue::String(uuid::Uuid::new_v4().to_string()));
    debug!(id = %id, op = ?request.op, "Handling request");

    let response = match request.op {
        Operation::Stats => Response::new(id, Ok(engine.pool_stats().await)),
        Operation::Schema => match request.target() {
            Ok(target) => Response::new(id, engine.schema_for(&target).await),
            Err(e) => Response::new::<()>(id, Err(e)),
        },
        Operation::Test => match request.target() {
            Ok(target) => Response::new(id, engine.test_for(&target).await),
            Err(e) => Response::new::<()>(id, Err(e)),
        },
        Operation::Query => {
            let sql = request.sql.as_deref().unwrap_or_default();
            match request.target() {
                Ok(target) => Response::new(id, engine.query_for(&target, sql).await),
                Err(e) => Response::new::<()>(id, Err(e)),
            }
        }
    };
    response.to_line()
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}
