//! Stdio entry point for the token-cache-core dispatcher.
//!
//! Reads an optional config-file path from `std::env::args()` (falling
//! back to `Config::default()` — CLI parsing proper is out of scope, see
//! `SPEC_FULL.md` §1.3); wires a `Runtime`, starts its background timers,
//! and serves newline-delimited JSON-RPC over stdin/stdout until EOF or a
//! Ctrl-C, whichever comes first.

use std::sync::Arc;

use tokio::signal;
use token_cache_core::{Config, Runtime};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!(path = %path, "loading config from file");
            Config::from_toml_file(&path)?
        }
        None => Config::default(),
    };

    tracing::info!("starting token-cache-core server...");
    let runtime = Arc::new(Runtime::init(config)?);
    runtime.start_background_tasks();
    tracing::info!(tools = runtime.registry.list_tools().len(), "runtime initialized");

    let serve_runtime = runtime.clone();
    let serve_handle = tokio::spawn(async move {
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();
        if let Err(e) = serve_runtime.dispatcher.run(stdin, stdout).await {
            tracing::error!(error = %e, "dispatcher loop terminated with an error");
        }
    });

    tokio::select! {
        result = serve_handle => {
            if let Err(e) = result {
                tracing::error!(error = %e, "dispatcher task panicked");
            }
            tracing::info!("stdin closed, shutting down");
        }
        _ = signal::ctrl_c() => {
            tracing::info!("received shutdown signal, stopping server...");
        }
    }

    runtime.shutdown().await?;
    tracing::info!("shutdown complete");
    Ok(())
}
