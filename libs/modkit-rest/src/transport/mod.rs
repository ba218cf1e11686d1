//! Transport collaborator contract.
//!
//! The executor only needs `send(method, uri, options) -> raw reply` and a
//! way to tell connection failures apart from HTTP-level errors. The default
//! implementation is [`HyperTransport`].

mod hyper_transport;
mod tls;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;

use crate::definition::QueryParams;
use crate::error::BoxError;

pub use hyper_transport::{
    DEFAULT_MAX_BODY_SIZE, DEFAULT_USER_AGENT, HyperTransport, HyperTransportBuilder,
};
pub use tls::TlsRoots;

/// Raw reply as received from the wire.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }
}

/// Everything besides method and URI that goes on the wire.
#[derive(Debug, Clone, Default)]
pub struct WireOptions {
    /// Flattened `application/x-www-form-urlencoded` fields; empty means no body.
    pub form_params: BTreeMap<String, String>,
    pub headers: HeaderMap,
    pub query: QueryParams,
}

/// Transport failures, classified for the executor
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// No connection could be established
    #[error("Could not connect to {uri}: {source}")]
    Connect {
        uri: String,
        #[source]
        source: BoxError,
    },

    /// Non-2xx reply; `response` is attached when one was received
    #[error("HTTP {status} from {uri}")]
    Status {
        uri: String,
        status: StatusCode,
        response: Option<Box<RawResponse>>,
    },

    /// Reply body exceeded the configured limit
    #[error("Response body from {uri} exceeds {limit} bytes")]
    BodyTooLarge { uri: String, limit: usize },

    /// Request attempt timed out
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Any other transport failure
    #[error("Transport failure: {0}")]
    Other(#[source] BoxError),
}

/// Sends one HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// # Errors
    /// Returns [`TransportError::Connect`] when the host is unreachable and
    /// [`TransportError::Status`] for HTTP-level failures the transport
    /// reports as errors.
    async fn send(
        &self,
        method: Method,
        uri: &str,
        options: WireOptions,
    ) -> Result<RawResponse, TransportError>;
}
