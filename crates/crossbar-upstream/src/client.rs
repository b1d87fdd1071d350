//! Outbound HTTP client construction.
//!
//! One pooled client serves every upstream. TLS verification is on by
//! default; operators running self-signed local fleets can point
//! `BACKEND_CA_BUNDLE` at their CA or disable verification outright, and
//! mutual TLS is supported via a PEM identity.

use reqwest::{Certificate, Client, Identity};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Connect timeout applied to every outbound call. Read timeouts are
/// per-call; streams deliberately have none.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound TLS configuration.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    pub verify: bool,
    /// Extra root CA bundle (PEM).
    pub ca_bundle: Option<PathBuf>,
    /// Client identity for mutual TLS (PEM: cert + key).
    pub client_cert: Option<PathBuf>,
}

impl TlsOptions {
    #[must_use]
    pub fn verified() -> Self {
        Self {
            verify: true,
            ca_bundle: None,
            client_cert: None,
        }
    }
}

/// Client construction failure. Fatal at startup.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("cannot read {what} {path}: {source}")]
    ReadPem {
        what: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[error("invalid {what} {path}: {source}")]
    ParsePem {
        what: &'static str,
        path: String,
        source: reqwest::Error,
    },
    #[error("cannot build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

fn read_pem(what: &'static str, path: &Path) -> Result<Vec<u8>, ClientBuildError> {
    std::fs::read(path).map_err(|source| ClientBuildError::ReadPem {
        what,
        path: path.display().to_string(),
        source,
    })
}

/// Build the shared upstream client.
pub fn build_client(tls: &TlsOptions) -> Result<Client, ClientBuildError> {
    let mut builder = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(10);

    if !tls.verify {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(path) = &tls.ca_bundle {
        let pem = read_pem("CA bundle", path)?;
        let cert = Certificate::from_pem(&pem).map_err(|source| ClientBuildError::ParsePem {
            what: "CA bundle",
            path: path.display().to_string(),
            source,
        })?;
        builder = builder.add_root_certificate(cert);
    }
    if let Some(path) = &tls.client_cert {
        let pem = read_pem("client cert", path)?;
        let identity = Identity::from_pem(&pem).map_err(|source| ClientBuildError::ParsePem {
            what: "client cert",
            path: path.display().to_string(),
            source,
        })?;
        builder = builder.identity(identity);
    }

    builder.build().map_err(ClientBuildError::Build)
}
