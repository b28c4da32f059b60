#![forbid(unsafe_code)]

//! `gemini-acp-bridge`: ACP server binary.
//!
//! Loads configuration, wires the keychain credential provider and the HTTP
//! backend, then serves ACP over stdin/stdout. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use gemini_acp_bridge::acp::server::{serve_stdio, ServerState};
use gemini_acp_bridge::backend::credentials::KeychainCredentials;
use gemini_acp_bridge::backend::gemini::GeminiBackend;
use gemini_acp_bridge::backend::{CredentialProvider, ModelBackend};
use gemini_acp_bridge::config::GlobalConfig;
use gemini_acp_bridge::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "gemini-acp-bridge", about = "ACP bridge to a streaming Gemini backend", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; built-in defaults apply if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the default model for new sessions.
    #[arg(long)]
    model: Option<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("gemini-acp-bridge bootstrap");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;
    let result = runtime.block_on(run(args));

    // A pending stdin read lives on a blocking thread and would otherwise
    // hold the process open after shutdown.
    runtime.shutdown_timeout(Duration::from_millis(250));
    result
}

async fn run(args: Cli) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(model) = args.model {
        config.default_model = model;
        config.validate()?;
    }
    let config = Arc::new(config);
    info!(model = config.default_model.as_str(), "configuration loaded");

    let credentials: Arc<dyn CredentialProvider> =
        Arc::new(KeychainCredentials::new(config.token_ttl()));
    let backend: Arc<dyn ModelBackend> =
        Arc::new(GeminiBackend::new(&config, Arc::clone(&credentials))?);
    let state = ServerState::new(Arc::clone(&config), credentials, backend);

    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_ct.cancel();
    });

    if let Err(err) = serve_stdio(state, ct).await {
        error!(%err, "stdio transport failed");
        return Err(err);
    }

    info!("gemini-acp-bridge shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the protocol.
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
