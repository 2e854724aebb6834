//! Promptgate daemon binary.
//!
//! Loads configuration (TOML file, `.env`, environment, CLI flags), runs the
//! optional hosts-file advisory, then serves the gateway on both listeners
//! until the first fatal error.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

use promptgate::{hosts, Config, Gateway, VERSION};

#[derive(Parser)]
#[command(name = "promptgate")]
#[command(version = VERSION)]
#[command(about = "LLM API gateway with system-prompt injection, scriptable routing, and streaming relay", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JavaScript middleware file (must define `preprocess(payload)`)
    #[arg(long)]
    middleware: Option<PathBuf>,

    /// JavaScript router file (must define `route(payload)`)
    #[arg(long)]
    router: Option<PathBuf>,

    /// System prompt text file, re-read on every request
    #[arg(long)]
    system: Option<PathBuf>,

    /// Skip the hosts-file advisory check
    #[arg(long)]
    no_hosts: bool,

    /// Plaintext listener port
    #[arg(long)]
    http_port: Option<u16>,

    /// TLS listener port
    #[arg(long)]
    tls_port: Option<u16>,

    /// TLS certificate PEM file
    #[arg(long)]
    cert: Option<PathBuf>,

    /// TLS private key PEM file
    #[arg(long)]
    key: Option<PathBuf>,

    /// Serve TLS with a generated self-signed certificate (development)
    #[arg(long)]
    self_signed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; everything can come from the real environment
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path).context("loading config file")?,
        None => Config::default(),
    };
    config.apply_env();

    if let Some(path) = cli.middleware {
        config.pipeline.preprocess_script = Some(path);
    }
    if let Some(path) = cli.router {
        config.pipeline.router_script = Some(path);
    }
    if let Some(path) = cli.system {
        config.pipeline.system_prompt = Some(path);
    }
    if cli.no_hosts {
        config.pipeline.skip_hosts_check = true;
    }
    if let Some(port) = cli.http_port {
        config.listen.http_port = port;
    }
    if let Some(port) = cli.tls_port {
        config.listen.tls_port = port;
    }
    if let Some(path) = cli.cert {
        config.listen.cert_path = path;
    }
    if let Some(path) = cli.key {
        config.listen.key_path = path;
    }
    if cli.self_signed {
        config.listen.self_signed = true;
    }

    if !config.pipeline.skip_hosts_check {
        let path = hosts::default_hosts_path();
        match hosts::advisory_check(&path, hosts::stdin_confirm) {
            Ok(true) => tracing::info!("hosts file updated"),
            Ok(false) => {}
            Err(err) => tracing::warn!("hosts file check skipped: {err}"),
        }
    }

    let gateway = Gateway::new(&config).context("starting gateway")?;
    gateway.run().await.context("gateway terminated")?;
    Ok(())
}
