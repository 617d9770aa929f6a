//! Resolved cluster connection descriptors and per-context HTTP clients.
//!
//! Credential resolution happens in the config layer; by the time a
//! descriptor reaches this module it is opaque and immutable, with all PEM
//! material already parsed. Bad TLS input is therefore a configuration
//! error surfaced before any fetch, not a degraded context. One reqwest
//! client is built per context so TLS material never leaks across contexts.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Certificate, Client, Identity, RequestBuilder};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Authentication material for one cluster context.
#[derive(Debug, Clone)]
pub enum ClusterAuth {
    Basic { username: String, password: String },
    Bearer { token: String },
    ClientCert { identity: Identity },
}

/// Fully resolved connection descriptor for one cluster context.
#[derive(Debug, Clone)]
pub struct ClusterConnection {
    pub server: String,
    pub auth: ClusterAuth,
    pub ca_bundle: Option<Certificate>,
    pub insecure_skip_tls_verify: bool,
}

/// Parse a PEM-encoded CA bundle. Called during credential resolution so a
/// garbage bundle aborts the run instead of emptying one context.
pub fn parse_ca_bundle(pem: &[u8]) -> Result<Certificate> {
    Certificate::from_pem(pem).context("invalid CA certificate PEM")
}

/// Parse concatenated client certificate + key PEM into an identity.
pub fn parse_client_identity(pem: &[u8]) -> Result<Identity> {
    Identity::from_pem(pem).context("invalid client certificate or key PEM")
}

impl ClusterConnection {
    /// Assemble the HTTP client for this context from already-parsed
    /// material. Client-certificate auth is bound at build time;
    /// basic/bearer auth is applied per request via
    /// [`ClusterConnection::authorize`].
    pub fn build_client(&self) -> Result<Client> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .danger_accept_invalid_certs(self.insecure_skip_tls_verify);

        if let Some(ca) = &self.ca_bundle {
            builder = builder.add_root_certificate(ca.clone());
        }
        if let ClusterAuth::ClientCert { identity } = &self.auth {
            builder = builder.identity(identity.clone());
        }

        builder
            .build()
            .with_context(|| format!("failed building HTTP client for {}", self.server))
    }

    /// Attach request-level credentials.
    pub fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            ClusterAuth::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            ClusterAuth::Bearer { token } => request.bearer_auth(token),
            ClusterAuth::ClientCert { .. } => request,
        }
    }
}
