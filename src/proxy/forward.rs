//! Upstream forwarding and response relay.
//!
//! Two relay modes:
//!
//! - **Buffered** (default): the upstream body is read to completion and
//!   handed to the caller in one pass.
//! - **Streaming** (`?stream=true`): the upstream body is re-framed on
//!   newlines and each complete line is written to the caller as its own
//!   body frame, so token streams arrive one line at a time.
//!
//! Mid-stream upstream errors truncate the relay: the status line has already
//! been sent, so the failure is logged and the stream closed, nothing more.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::Client;

use crate::error::{GatewayError, Result};
use crate::transform::TransformedRequest;

/// Referer-identification header sent with every upstream call.
pub const REFERER_HEADER: &str = "HTTP-Referer";
/// Fixed referer value identifying this gateway.
pub const REFERER_VALUE: &str = "https://github.com/promptgate/promptgate";

/// Issues upstream calls and relays the response to the caller.
pub struct Forwarder {
    client: Client,
}

impl Forwarder {
    /// Create a forwarder with a bounded upstream timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Forward a transformed request upstream and relay the response.
    ///
    /// The inbound header set is passed through except `Host` and
    /// `Content-Length` (both would corrupt the outbound exchange);
    /// `Authorization` is always overwritten with the resolved credential.
    pub async fn forward(
        &self,
        request: TransformedRequest,
        method: Method,
        inbound: &HeaderMap,
        stream_requested: bool,
    ) -> Result<Response> {
        let TransformedRequest { body, route } = request;

        let mut outbound = inbound.clone();
        outbound.remove(header::HOST);
        outbound.remove(header::CONTENT_LENGTH);

        let bearer = HeaderValue::from_str(&format!("Bearer {}", route.credential))
            .map_err(|_| {
                GatewayError::Routing("credential is not a valid header value".to_string())
            })?;
        outbound.insert(header::AUTHORIZATION, bearer);
        outbound.insert(REFERER_HEADER, HeaderValue::from_static(REFERER_VALUE));

        let upstream = self
            .client
            .request(method, &route.endpoint)
            .headers(outbound)
            .body(body)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();

        if stream_requested {
            // Hyper re-frames the relayed body, so drop upstream framing.
            headers.remove(header::CONTENT_LENGTH);
            headers.remove(header::TRANSFER_ENCODING);
            build_response(status, headers, Body::from_stream(line_stream(upstream)))
        } else {
            let bytes = upstream.bytes().await.map_err(|e| {
                GatewayError::Upstream(format!("failed to read upstream body: {e}"))
            })?;
            build_response(status, headers, Body::from(bytes))
        }
    }
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Result<Response> {
    let mut response = Response::builder()
        .status(status)
        .body(body)
        .map_err(|e| GatewayError::Server(format!("failed to assemble response: {e}")))?;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Re-frame the upstream byte stream into newline-delimited chunks.
///
/// Each yielded item is one complete line (terminator included), so every
/// line reaches the caller as soon as the upstream produced it. A read error
/// truncates the stream; the remainder buffer is flushed at clean EOF.
fn line_stream(
    upstream: reqwest::Response,
) -> impl futures::Stream<Item = std::result::Result<Bytes, std::convert::Infallible>> {
    async_stream::stream! {
        let mut framer = LineFramer::new();
        let mut chunks = upstream.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    for line in framer.push(&bytes) {
                        yield Ok::<_, std::convert::Infallible>(line);
                    }
                }
                Err(err) => {
                    tracing::warn!("upstream stream error, truncating relay: {err}");
                    return;
                }
            }
        }
        if let Some(rest) = framer.finish() {
            yield Ok::<_, std::convert::Infallible>(rest);
        }
    }
}

/// Accumulates arbitrary byte chunks and emits complete newline-terminated
/// lines, preserving exact byte framing.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: BytesMut,
}

impl LineFramer {
    /// Create an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            lines.push(self.buf.split_to(pos + 1).freeze());
        }
        lines
    }

    /// Flush any unterminated remainder at end-of-stream.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf.split().freeze())
        }
    }
}
