//! Configuration management.
//!
//! Layered, lowest precedence first:
//! - built-in defaults
//! - TOML config file (`--config`)
//! - environment variables (after an optional `.env` load)
//! - CLI flags (applied by the binary)

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::Result;

/// Main configuration struct
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Default upstream target
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Listener configuration
    #[serde(default)]
    pub listen: ListenConfig,

    /// Request pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            crate::GatewayError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;

        Ok(toml::from_str(&content)?)
    }

    /// Overlay environment variables onto this configuration.
    pub fn apply_env(&mut self) {
        if let Ok(model) = std::env::var("PROMPTGATE_MODEL") {
            self.upstream.model = model;
        }
        if let Ok(key) = std::env::var("PROMPTGATE_API_KEY") {
            self.upstream.api_key = key;
        }
        if let Ok(endpoint) = std::env::var("PROMPTGATE_ENDPOINT") {
            self.upstream.endpoint = endpoint;
        }
        if let Ok(port) = std::env::var("PROMPTGATE_HTTP_PORT") {
            if let Ok(port) = port.parse() {
                self.listen.http_port = port;
            }
        }
        if let Ok(port) = std::env::var("PROMPTGATE_TLS_PORT") {
            if let Ok(port) = port.parse() {
                self.listen.tls_port = port;
            }
        }
    }
}

/// Default upstream target used when no routing script overrides it
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Model identifier forced into every outbound body
    pub model: String,

    /// Credential sent upstream as `Authorization: Bearer <key>`
    pub api_key: String,

    /// Full completion endpoint URL
    pub endpoint: String,

    /// Upstream request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            api_key: String::new(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Host to bind both listeners to
    pub host: String,

    /// Plaintext listener port
    pub http_port: u16,

    /// TLS listener port
    pub tls_port: u16,

    /// Path to PEM certificate file
    pub cert_path: PathBuf,

    /// Path to PEM private key file
    pub key_path: PathBuf,

    /// Generate a self-signed certificate instead of loading files (development)
    pub self_signed: bool,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 80,
            tls_port: 443,
            cert_path: PathBuf::from("server.crt"),
            key_path: PathBuf::from("server.key"),
            self_signed: false,
        }
    }
}

impl ListenConfig {
    /// Plaintext listener address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }

    /// TLS listener address
    pub fn tls_addr(&self) -> String {
        format!("{}:{}", self.host, self.tls_port)
    }
}

/// Request pipeline configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// System prompt text file, re-read on every request
    pub system_prompt: Option<PathBuf>,

    /// JavaScript file defining a `preprocess(payload)` entry point
    pub preprocess_script: Option<PathBuf>,

    /// JavaScript file defining a `route(payload)` entry point
    pub router_script: Option<PathBuf>,

    /// Skip the startup hosts-file advisory check
    pub skip_hosts_check: bool,
}
