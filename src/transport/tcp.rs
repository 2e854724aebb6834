//! Plaintext HTTP listener using Axum's built-in TCP serving.

use std::future::Future;
use std::pin::Pin;

use axum::Router;
use tokio::net::TcpListener;

use super::Transport;
use crate::error::{GatewayError, Result};

/// Plaintext HTTP/1.1 listener.
#[derive(Debug, Clone)]
pub struct PlainListener {
    addr: String,
}

impl PlainListener {
    /// Create a listener for the given `host:port` address.
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl Transport for PlainListener {
    fn serve(&self, router: Router) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let addr = self.addr.clone();

        Box::pin(async move {
            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|e| GatewayError::Server(format!("failed to bind {addr}: {e}")))?;

            axum::serve(listener, router)
                .await
                .map_err(|e| GatewayError::Server(format!("plaintext server error: {e}")))?;

            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "HTTP"
    }

    fn listen_addr(&self) -> String {
        format!("http://{}", self.addr)
    }
}
