//! LLM completion gateway.
//!
//! Sits between OpenAI/Anthropic-shaped client applications and an upstream
//! provider endpoint. Each inbound completion request is transformed
//! (system-prompt injection, scriptable preprocessing, scriptable routing)
//! and forwarded; the response relays back buffered or line-streamed.
//!
//! # Endpoints
//!
//! | Endpoint | Method | Shape |
//! |----------|--------|-------|
//! | `/v1/chat/completions` | POST | OpenAI chat (`messages` array) |
//! | `/v1/complete` | POST | Anthropic legacy (`prompt` string) |
//!
//! `?stream=true` on either path selects line-streamed relay.
//!
//! # Usage
//!
//! ```rust,ignore
//! use promptgate::{Config, Gateway};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut config = Config::default();
//!     config.upstream.endpoint = "https://openrouter.ai/api/v1/chat/completions".into();
//!     config.upstream.api_key = std::env::var("PROMPTGATE_API_KEY").unwrap();
//!
//!     Gateway::new(&config).unwrap().run().await.unwrap();
//! }
//! ```

mod forward;
mod log;
mod server;

pub use forward::{Forwarder, LineFramer, REFERER_HEADER, REFERER_VALUE};
pub use log::access_log;
pub use server::{Gateway, GatewayState};
