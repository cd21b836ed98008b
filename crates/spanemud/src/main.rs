//! spanemud: The Spanner emulator daemon.
//!
//! Serves the REST API over an in-memory emulator: instance configs,
//! instances, databases, DDL, reads, and commits.
//!
//! # Usage
//!
//! ```text
//! spanemud serve --port 9010 --config spanemu.toml
//! spanemud print-config
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use spanemu_core::EmulatorConfig;
use spanemu_core::config::{OperationMode, ServerConfig};
use spanemu_service::Emulator;
use tracing::info;

const DEFAULT_FILTER: &str = "info,spanemud=debug,spanemu=debug";

#[derive(Parser)]
#[command(name = "spanemud", about = "Spanner emulator daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the REST API.
    Serve {
        /// TOML config file; flags override its values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Address to bind.
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Where operation work runs.
        #[arg(long, value_enum)]
        mode: Option<Mode>,

        /// Emit logs as JSON lines.
        #[arg(long)]
        json_logs: bool,
    },
    /// Print the effective default config as TOML.
    PrintConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Inline,
    Background,
}

impl From<Mode> for OperationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Inline => OperationMode::Inline,
            Mode::Background => OperationMode::Background,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            host,
            port,
            mode,
            json_logs,
        } => {
            let mut config = match config {
                Some(path) => EmulatorConfig::from_file(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => EmulatorConfig::default(),
            };
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(mode) = mode {
                config.operations.mode = mode.into();
            }
            config.logging.json |= json_logs;
            init_tracing(&config);
            serve(config).await
        }
        Command::PrintConfig => {
            print!("{}", EmulatorConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(config: &EmulatorConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives = config.logging.filter.as_deref().unwrap_or(DEFAULT_FILTER);
        tracing_subscriber::EnvFilter::new(directives)
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Bind the API listener; `host` may be a hostname or an IP literal.
async fn bind(server: &ServerConfig) -> anyhow::Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind((server.host.as_str(), server.port))
        .await
        .with_context(|| format!("failed to listen on {}:{}", server.host, server.port))
}

async fn serve(config: EmulatorConfig) -> anyhow::Result<()> {
    info!(mode = ?config.operations.mode, "Spanner emulator starting");

    let emulator = Emulator::new(config.operations.mode);
    let router = spanemu_api::build_router(emulator);

    let listener = bind(&config.server).await?;
    info!(addr = %listener.local_addr()?, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
            }
        })
        .await?;

    info!("Spanner emulator stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_accepts_hostnames() {
        let server = ServerConfig {
            host: "localhost".to_string(),
            port: 0,
        };
        let listener = bind(&server).await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }
}
