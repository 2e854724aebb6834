//! Listener transports.
//!
//! The gateway binds two independent listeners over one shared router:
//!
//! - [`PlainListener`]: HTTP over TCP
//! - [`TlsListener`]: HTTPS terminated with a preloaded rustls certificate
//!
//! Both implement [`Transport`] and run until a fatal I/O error; the caller
//! (`Gateway::run`) joins them and treats the first error as process-fatal.

mod config;
mod tcp;
mod tls;

pub use config::CertConfig;
pub use tcp::PlainListener;
pub use tls::TlsListener;

use std::future::Future;
use std::pin::Pin;

use axum::Router;

use crate::error::Result;

/// A bound listener serving the gateway router.
pub trait Transport: Send + Sync {
    /// Serve the router on this transport until a fatal error.
    fn serve(&self, router: Router) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Transport name for logging.
    fn name(&self) -> &'static str;

    /// Listen address for logging.
    fn listen_addr(&self) -> String;
}
