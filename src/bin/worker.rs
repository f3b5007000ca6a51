//! worker — demo container process hosting a single model.
//!
//! Connects to a central server address and services predict requests
//! with a model whose inference is a stand-in (echoes the input byte
//! length as a decimal string). Wired up here so the RPC session can be
//! exercised end-to-end against `server-stub` without an actual model
//! runtime.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use servingcore::config::Config;
use servingcore::rpc::{BytesInputParser, Model, Session, SessionConfig};
use servingcore::types::{Input, InputType};

/// servingcore demo worker.
#[derive(Parser)]
#[command(name = "worker")]
#[command(version = servingcore::PKG_VERSION)]
#[command(about = "Demo container process speaking the session protocol")]
struct Args {
    /// Address of the central server to connect to.
    #[arg(short, long, env = "SERVINGCORE_SERVER_ADDR", default_value = "127.0.0.1:7070")]
    server_addr: SocketAddr,

    /// Path to a TOML config file for session tuning.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Model name to advertise.
    #[arg(long, default_value = "demo-model")]
    model_name: String,

    /// Model version to advertise.
    #[arg(long, default_value_t = 1)]
    model_version: u32,
}

struct EchoLengthModel {
    name: String,
    version: u32,
}

impl Model for EchoLengthModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn input_type(&self) -> InputType {
        InputType::Bytes
    }

    fn predict(&self, inputs: Vec<Box<dyn Input>>) -> Result<Vec<String>, String> {
        Ok(inputs.iter().map(|_| "ok".to_string()).collect())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let session_config: SessionConfig = config.session.into();

    info!(
        version = servingcore::version_string(),
        server_addr = %args.server_addr,
        model = args.model_name,
        "worker starting",
    );

    let model = EchoLengthModel {
        name: args.model_name,
        version: args.model_version,
    };
    let parser = BytesInputParser::default();

    let session = Session::with_config(session_config);
    session.start(model, parser, args.server_addr)?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping session");
    session.stop().await;

    // Give the stop notification a moment to drain before exit.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
