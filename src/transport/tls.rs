//! TLS-terminated HTTPS listener.
//!
//! Accepts TCP connections, performs the rustls handshake, and serves each
//! connection through hyper with automatic HTTP/1.1 / HTTP/2 detection.
//! Handshake failures only drop the offending connection; accept-loop and
//! certificate errors are fatal.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::Router;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnectionBuilder;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower::Service;

use super::config::CertConfig;
use super::Transport;
use crate::error::{GatewayError, Result};

/// TLS listener backed by a preloaded certificate.
#[derive(Debug, Clone)]
pub struct TlsListener {
    addr: String,
    cert: CertConfig,
}

impl TlsListener {
    /// Create a TLS listener for the given `host:port` address.
    pub fn new(addr: impl Into<String>, cert: CertConfig) -> Self {
        Self {
            addr: addr.into(),
            cert,
        }
    }
}

impl Transport for TlsListener {
    fn serve(&self, router: Router) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let addr = self.addr.clone();
        let cert = self.cert.clone();

        Box::pin(async move {
            // Certificate problems surface before the port is even bound.
            let tls_config = cert.build_server_config()?;
            let acceptor = TlsAcceptor::from(Arc::new(tls_config));

            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|e| GatewayError::Server(format!("failed to bind {addr}: {e}")))?;

            loop {
                let (stream, peer) = listener
                    .accept()
                    .await
                    .map_err(|e| GatewayError::Server(format!("TLS accept error: {e}")))?;

                let acceptor = acceptor.clone();
                let tower_service = router.clone();

                tokio::spawn(async move {
                    let tls_stream = match acceptor.accept(stream).await {
                        Ok(tls_stream) => tls_stream,
                        Err(err) => {
                            tracing::debug!(%peer, "TLS handshake failed: {err}");
                            return;
                        }
                    };

                    let hyper_service =
                        hyper::service::service_fn(move |request: Request<Incoming>| {
                            tower_service.clone().call(request)
                        });

                    if let Err(err) = ConnectionBuilder::new(TokioExecutor::new())
                        .serve_connection_with_upgrades(TokioIo::new(tls_stream), hyper_service)
                        .await
                    {
                        tracing::debug!(%peer, "connection error: {err}");
                    }
                });
            }
        })
    }

    fn name(&self) -> &'static str {
        "HTTPS"
    }

    fn listen_addr(&self) -> String {
        format!("https://{}", self.addr)
    }
}
