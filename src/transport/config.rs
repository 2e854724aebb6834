//! TLS certificate configuration.

use std::fs;
use std::path::PathBuf;

use crate::error::{GatewayError, Result};

/// Certificate source for the TLS listener.
#[derive(Debug, Clone)]
pub enum CertConfig {
    /// Generate a self-signed certificate (development only).
    SelfSigned {
        /// Common name for the certificate.
        common_name: String,
    },
    /// Load certificate chain and key from PEM files.
    Files {
        /// Path to PEM certificate file.
        cert_path: PathBuf,
        /// Path to PEM private key file.
        key_path: PathBuf,
    },
}

impl CertConfig {
    /// Self-signed localhost certificate for development.
    pub fn development() -> Self {
        Self::SelfSigned {
            common_name: "localhost".to_string(),
        }
    }

    /// Production configuration from PEM files.
    pub fn from_files(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self::Files {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    /// Build a rustls server config for HTTP/1.1 and HTTP/2.
    pub fn build_server_config(&self) -> Result<rustls::ServerConfig> {
        let (certs, key) = self.load()?;

        let mut config = rustls::ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| GatewayError::Config(format!("failed to build TLS config: {e}")))?;

        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        Ok(config)
    }

    /// Load the certificate chain and private key.
    fn load(&self) -> Result<(Vec<rustls::Certificate>, rustls::PrivateKey)> {
        match self {
            Self::SelfSigned { common_name } => {
                tracing::warn!(
                    "Using self-signed certificate for '{}' - NOT FOR PRODUCTION",
                    common_name
                );

                let mut params = rcgen::CertificateParams::new(vec![
                    common_name.clone(),
                    "127.0.0.1".to_string(),
                    "::1".to_string(),
                ]);
                params.distinguished_name = rcgen::DistinguishedName::new();
                params
                    .distinguished_name
                    .push(rcgen::DnType::CommonName, common_name.clone());

                let cert = rcgen::Certificate::from_params(params).map_err(|e| {
                    GatewayError::Config(format!("failed to generate self-signed cert: {e}"))
                })?;

                let cert_der = rustls::Certificate(cert.serialize_der().map_err(|e| {
                    GatewayError::Config(format!("failed to serialize cert: {e}"))
                })?);
                let key_der = rustls::PrivateKey(cert.serialize_private_key_der());

                Ok((vec![cert_der], key_der))
            }
            Self::Files {
                cert_path,
                key_path,
            } => {
                let cert_pem = fs::read(cert_path).map_err(|e| {
                    GatewayError::Config(format!(
                        "failed to read cert file {}: {e}",
                        cert_path.display()
                    ))
                })?;
                let key_pem = fs::read(key_path).map_err(|e| {
                    GatewayError::Config(format!(
                        "failed to read key file {}: {e}",
                        key_path.display()
                    ))
                })?;

                let certs: Vec<rustls::Certificate> =
                    rustls_pemfile::certs(&mut cert_pem.as_slice())
                        .map_err(|e| {
                            GatewayError::Config(format!("failed to parse cert PEM: {e}"))
                        })?
                        .into_iter()
                        .map(rustls::Certificate)
                        .collect();

                if certs.is_empty() {
                    return Err(GatewayError::Config(
                        "no certificates found in PEM file".to_string(),
                    ));
                }

                // PKCS8 first, then RSA
                let key = rustls_pemfile::pkcs8_private_keys(&mut key_pem.as_slice())
                    .map_err(|e| GatewayError::Config(format!("failed to parse key PEM: {e}")))?
                    .into_iter()
                    .next()
                    .map(rustls::PrivateKey)
                    .or_else(|| {
                        rustls_pemfile::rsa_private_keys(&mut key_pem.as_slice())
                            .ok()?
                            .into_iter()
                            .next()
                            .map(rustls::PrivateKey)
                    })
                    .ok_or_else(|| {
                        GatewayError::Config("no private key found in PEM file".to_string())
                    })?;

                Ok((certs, key))
            }
        }
    }
}
