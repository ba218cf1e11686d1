use std::time::Duration;
use thiserror::Error;

use crate::serializer::SerializerError;

/// Boxed error used to carry foreign failures without losing their source chain.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// REST client error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RestError {
    /// A caller-supplied value is unusable: missing endpoint, a query string
    /// embedded in the request URI, an invalid header and so on.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The transport could not open a connection to the remote host
    #[error("Service unavailable: {uri}")]
    ServiceUnavailable {
        uri: String,
        #[source]
        source: BoxError,
    },

    /// Response body is present but its content type is not JSON
    #[error("Unsupported response content type: {}", content_type.as_deref().unwrap_or("<none>"))]
    UnsupportedContentType { content_type: Option<String> },

    /// Response body claims to be JSON but does not parse
    #[error("Malformed response body: {0}")]
    MalformedBody(#[source] serde_json::Error),

    /// An operation needs a serializer but none was configured
    #[error("No serializer configured for {operation}")]
    SerializerUnavailable { operation: &'static str },

    /// Serializer backend failure
    #[error(transparent)]
    Serialization(#[from] SerializerError),

    /// HTTP non-2xx status surfaced without any response attached
    #[error("HTTP {status} from {uri}")]
    HttpStatus { uri: String, status: http::StatusCode },

    /// Single request attempt timed out
    #[error("Request attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Transport error (TLS, protocol, request building)
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// Response body exceeded the configured `max_body_size`
    #[error("Response body from {uri} exceeds {limit} bytes")]
    BodyTooLarge { uri: String, limit: usize },

    /// Configuration could not be loaded or extracted
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl RestError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }
}
