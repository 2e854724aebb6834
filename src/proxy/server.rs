//! Gateway server: routing table, completion handlers, listener orchestration.
//!
//! ```text
//! Client App           Promptgate              LLM Provider
//!     |                    |                        |
//!     |-- POST /v1/... --->|                        |
//!     |                    |-- transform ---------->|
//!     |                    |   (prompt, scripts,    |
//!     |                    |    routing)            |
//!     |<-- relay ----------|<-- response / stream --|
//! ```
//!
//! Both listeners (plaintext and TLS) serve the same router; the process
//! waits on both and the first listener error is fatal.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde::Deserialize;

use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::script::ScriptHost;
use crate::transform::{BodyTransformer, RequestKind, RouteDecision};
use crate::transport::{CertConfig, PlainListener, TlsListener, Transport};

use super::forward::Forwarder;
use super::log::access_log;

/// Shared per-process gateway state.
pub struct GatewayState {
    transformer: BodyTransformer,
    forwarder: Forwarder,
}

/// The gateway: one transformation pipeline behind two listeners.
pub struct Gateway {
    state: Arc<GatewayState>,
    config: Config,
}

impl Gateway {
    /// Build the pipeline from configuration.
    ///
    /// Loads script sources eagerly; a bad script file fails startup rather
    /// than the first request that would have used it.
    pub fn new(config: &Config) -> Result<Self> {
        let scripts = ScriptHost::load(
            config.pipeline.preprocess_script.as_deref(),
            config.pipeline.router_script.as_deref(),
        )?
        .map(Arc::new);

        let defaults = RouteDecision {
            model: config.upstream.model.clone(),
            endpoint: config.upstream.endpoint.clone(),
            credential: config.upstream.api_key.clone(),
        };
        let transformer = BodyTransformer::new(
            defaults,
            config.pipeline.system_prompt.clone(),
            scripts,
        );
        let forwarder = Forwarder::new(Duration::from_secs(config.upstream.timeout_secs))?;

        Ok(Self {
            state: Arc::new(GatewayState {
                transformer,
                forwarder,
            }),
            config: config.clone(),
        })
    }

    /// The routing table shared by both listeners.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/v1/chat/completions", post(completion_handler))
            .route("/v1/complete", post(completion_handler))
            .layer(middleware::from_fn(access_log))
            .with_state(self.state.clone())
    }

    /// Run both listeners until the first fatal error.
    pub async fn run(&self) -> Result<()> {
        let router = self.router();

        let cert = if self.config.listen.self_signed {
            CertConfig::development()
        } else {
            CertConfig::from_files(
                &self.config.listen.cert_path,
                &self.config.listen.key_path,
            )
        };

        let plain = PlainListener::new(self.config.listen.http_addr());
        let tls = TlsListener::new(self.config.listen.tls_addr(), cert);

        tracing::info!("Promptgate starting...");
        tracing::info!("Default upstream: {}", self.config.upstream.endpoint);
        tracing::info!("Plaintext listener on {}", plain.listen_addr());
        tracing::info!("TLS listener on {}", tls.listen_addr());

        // No partial-degradation mode: the first listener error ends the process.
        tokio::try_join!(plain.serve(router.clone()), tls.serve(router))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RelayParams {
    #[serde(default)]
    stream: Option<String>,
}

/// Handler for both completion endpoints.
async fn completion_handler(
    State(state): State<Arc<GatewayState>>,
    method: Method,
    uri: Uri,
    Query(params): Query<RelayParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let kind = RequestKind::from_path(uri.path());
    let stream_requested = params.stream.as_deref() == Some("true");

    match relay(state, kind, method, &headers, body, stream_requested).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn relay(
    state: Arc<GatewayState>,
    kind: RequestKind,
    method: Method,
    headers: &HeaderMap,
    body: Bytes,
    stream_requested: bool,
) -> Result<Response> {
    // The transform step is synchronous: it reads the prompt file and may
    // run scripts serialized behind the engine mutex. Run it on the
    // blocking pool so a slow script never stalls the async workers and
    // the requests they carry.
    let transform_state = state.clone();
    let transformed =
        tokio::task::spawn_blocking(move || transform_state.transformer.transform(&body, kind))
            .await
            .map_err(|e| GatewayError::Server(format!("transform task failed: {e}")))??;

    state
        .forwarder
        .forward(transformed, method, headers, stream_requested)
        .await
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        tracing::warn!(status = status.as_u16(), "request failed: {self}");
        // Plain text, no upstream details beyond what was generated locally.
        (status, format!("{self}\n")).into_response()
    }
}
