//! slm-embed - command-line host for the introspection engine.
//!
//! One-shot subcommands print a single JSON document to stdout; `serve` runs
//! the JSON-lines loop. Logs always go to stderr.

use clap::Parser;
use slm_embed::config::{Command, Config, TargetArgs};
use slm_embed::models::{ConnectionRequest, Target, Upload};
use slm_embed::transport::{StdioTransport, Transport};
use slm_embed::{Engine, EngineError, EngineResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn load_target(args: &TargetArgs) -> EngineResult<Target> {
    if let Some(path) = &args.file {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            EngineError::file_upload(format!("cannot read {}: {}", path.display(), e))
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Ok(Target::Upload(Upload::new(name, bytes)));
    }

    let request = ConnectionRequest::new(
        args.dialect.as_deref().unwrap_or_default(),
        args.locator.clone().unwrap_or_default(),
        args.user.clone().unwrap_or_default(),
        args.password.clone().unwrap_or_default(),
    )?;
    Ok(Target::Server(request))
}

fn render<T: Serialize>(value: &T) -> EngineResult<String> {
    Ok(serde_json::to_string_pretty(value).map_err(std::io::Error::from)?)
}

async fn run_once(engine: &Engine, command: &Command) -> EngineResult<String> {
    match command {
        Command::Schema(args) => {
            let target = load_target(args).await?;
            render(&engine.schema_for(&target).await?)
        }
        Command::Query { target, sql } => {
            let target = load_target(target).await?;
            render(&engine.query_for(&target, sql).await?)
        }
        Command::Test(args) => {
            let target = load_target(args).await?;
            render(&engine.test_for(&target).await?)
        }
        Command::Serve => Err(EngineError::invalid_request(
            "serve is a long-running command",
        )),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    let settings = match config.engine_settings() {
        Ok(settings) => settings,
        Err(message) => {
            eprintln!("Error: {}", message);
            std::process::exit(2);
        }
    };

    info!("Starting slm-embed v{}", env!("CARGO_PKG_VERSION"));
    let engine = Arc::new(Engine::new(settings));

    if let Command::Serve = config.command {
        let transport = StdioTransport::new(Arc::clone(&engine));
        info!(transport = transport.name(), "Using transport");
        if let Err(e) = transport.run().await {
            error!(error = %e, "Server error");
            return Err(e.into());
        }
        info!("Server shutdown complete");
        return Ok(());
    }

    let outcome = run_once(&engine, &config.command).await;
    engine.shutdown().await;

    match outcome {
        Ok(rendered) => {
            println!("{}", rendered);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Operation failed");
            println!("{}", serde_json::json!({ "error": e.to_json() }));
            std::process::exit(1);
        }
    }
}
