//! # Promptgate - LLM API Gateway
//!
//! Single-process HTTP gateway between LLM client applications (OpenAI- or
//! Anthropic-shaped) and an upstream provider endpoint. Each inbound
//! completion request is optionally rewritten, then forwarded and relayed
//! back, including token-streamed responses.
//!
//! ## Request pipeline
//!
//! ```text
//! Listener -> Logger -> Handler -> Body Transformer -> Forwarder -> upstream
//!                                      |                   |
//!                                  Script Host          response relay
//!                              (preprocess / route)   (buffered or line-
//!                                                      streamed, flushed
//!                                                      per line)
//! ```
//!
//! Transformation steps, strictly ordered and individually optional:
//!
//! 1. Decode the body as a JSON object
//! 2. Inject the configured system prompt (re-read per request)
//! 3. Run the `preprocess` script entry point
//! 4. Run the `route` script entry point (else use configured defaults)
//! 5. Force the resolved `model` field and re-encode
//!
//! The resolved credential always replaces the caller's `Authorization`
//! header on the upstream call.
//!
//! ## Listeners
//!
//! One plaintext and one TLS listener share a single routing table and run
//! concurrently; either failing tears the whole process down. Combined with
//! loopback hosts-file overrides for the provider hostnames (see [`hosts`]),
//! unmodified client SDKs can be pointed at the gateway transparently.
//!
//! ## Modules
//!
//! - [`config`]: layered configuration (TOML file, env, CLI)
//! - [`transform`]: the body transformation pipeline
//! - [`script`]: embedded QuickJS host for `preprocess`/`route` hooks
//! - [`proxy`]: router, handlers, forwarding, access log
//! - [`transport`]: plaintext and TLS listeners
//! - [`hosts`]: startup hosts-file advisory
//! - [`error`]: error types and result alias

pub mod config;
pub mod error;
pub mod hosts;
pub mod proxy;
pub mod script;
pub mod transform;
pub mod transport;

// Re-exports for convenience
pub use config::Config;
pub use error::{GatewayError, Result};
pub use proxy::{Forwarder, Gateway};
pub use script::ScriptHost;
pub use transform::{BodyTransformer, RequestKind, RouteDecision, TransformedRequest};
pub use transport::{CertConfig, PlainListener, TlsListener, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
