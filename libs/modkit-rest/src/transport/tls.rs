//! HTTPS connector construction per root certificate source.

use std::sync::{Arc, OnceLock};

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::RootCertStore;
use rustls::crypto::CryptoProvider;
use serde::{Deserialize, Serialize};

use crate::error::RestError;

/// Root certificate source for HTTPS connections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsRoots {
    /// Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// OS native root certificate store
    Native,
}

impl TlsRoots {
    /// Connector advertising h2 and http/1.1 via ALPN. Plain HTTP stays
    /// allowed since endpoints are configured by the caller.
    ///
    /// # Errors
    /// Returns [`RestError::Transport`] when the selected roots cannot back
    /// a TLS configuration, e.g. an OS store without usable certificates.
    pub fn https_connector(self) -> Result<HttpsConnector<HttpConnector>, RestError> {
        let provider = crypto_provider();
        let builder = match self {
            Self::WebPki => HttpsConnectorBuilder::new()
                .with_provider_and_webpki_roots(provider)
                .map_err(|e| RestError::Transport(Box::new(e)))?,
            Self::Native => {
                let store = native_store();
                if store.is_empty() {
                    return Err(RestError::Transport(
                        "OS certificate store yielded no usable root certificates".into(),
                    ));
                }
                let config = rustls::ClientConfig::builder_with_provider(provider)
                    .with_safe_default_protocol_versions()
                    .map_err(|e| RestError::Transport(Box::new(e)))?
                    .with_root_certificates(store.clone())
                    .with_no_client_auth();
                HttpsConnectorBuilder::new().with_tls_config(config)
            }
        };
        Ok(builder.https_or_http().enable_all_versions().build())
    }
}

/// Process-wide provider when the application installed one.
fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

static NATIVE_STORE: OnceLock<RootCertStore> = OnceLock::new();

/// OS roots, parsed once per process.
fn native_store() -> &'static RootCertStore {
    NATIVE_STORE.get_or_init(|| {
        let loaded = rustls_native_certs::load_native_certs();
        for err in &loaded.errors {
            tracing::warn!(error = %err, "error loading native root certificate");
        }
        let mut store = RootCertStore::empty();
        let (added, ignored) = store.add_parsable_certificates(loaded.certs);
        if ignored > 0 {
            tracing::warn!(added, ignored, "some native root certificates could not be parsed");
        }
        tracing::debug!(added, "native root store ready");
        store
    })
}
