//! REST client: validated configuration, shared serializer and transport.

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::config::ClientConfig;
use crate::definition::RequestHeaders;
use crate::error::RestError;
use crate::form::FormNormalization;
use crate::metadata::{ClassMetadata, MetadataRegistry};
use crate::request::RequestBuilder;
use crate::serializer::{SerializerBuilder, SharedSerializer};
use crate::transform::{FormObjectTransformer, RequestStep, ResponseStep};
use crate::transport::{HyperTransport, Transport};

/// State shared by every request created from one client.
pub struct ClientCore {
    pub transport: Arc<dyn Transport>,
    pub endpoint: Url,
    pub headers: RequestHeaders,
    pub serializer: Option<SharedSerializer>,
    pub request_steps: Vec<RequestStep>,
    pub response_steps: Vec<ResponseStep>,
    pub form_normalization: FormNormalization,
    pub use_default_response_transformers: bool,
}

/// Entry point for calling one remote API.
///
/// Cheap to clone; clones share the transport connection pool and the
/// serializer.
///
/// ```ignore
/// use modkit_rest::{ClientConfig, RestClient, Response};
///
/// let client = RestClient::new(ClientConfig::new("https://api.example.com/v1"))?;
/// let articles = client.request("/articles").model::<Article>().build();
///
/// let response: Response = articles.get(&articles.append_to_uri("42"), None).await?;
/// let article = response.model::<Article>();
/// ```
#[derive(Clone)]
pub struct RestClient {
    core: Arc<ClientCore>,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("endpoint", &self.core.endpoint.as_str())
            .field("serializer", &self.core.serializer)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    /// Client over the default transport and the configured serializer.
    ///
    /// # Errors
    /// See [`RestClientBuilder::build`].
    pub fn new(config: ClientConfig) -> Result<Self, RestError> {
        RestClientBuilder::new(config).build()
    }

    #[must_use]
    pub fn builder() -> RestClientBuilder {
        RestClientBuilder::default()
    }

    /// Starts configuring requests rooted at `uri_prefix`.
    pub fn request(&self, uri_prefix: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Arc::clone(&self.core), uri_prefix.into())
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.core.endpoint
    }

    /// Shared serializer, absent when disabled in configuration.
    #[must_use]
    pub fn serializer(&self) -> Option<&SharedSerializer> {
        self.core.serializer.as_ref()
    }
}

/// Builder for [`RestClient`]
#[derive(Default)]
pub struct RestClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    serializer: Option<SharedSerializer>,
    metadata: MetadataRegistry,
    request_steps: Vec<RequestStep>,
    response_steps: Vec<ResponseStep>,
    form_normalization: FormNormalization,
}

impl fmt::Debug for RestClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClientBuilder")
            .field("config", &self.config)
            .field("custom_transport", &self.transport.is_some())
            .field("serializer", &self.serializer)
            .field("request_steps", &self.request_steps)
            .field("response_steps", &self.response_steps)
            .field("form_normalization", &self.form_normalization)
            .finish_non_exhaustive()
    }
}

impl RestClientBuilder {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the default [`HyperTransport`].
    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    #[must_use]
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Uses an already-built serializer instead of building one from the
    /// configured backend; several clients can share one handle this way.
    #[must_use]
    pub fn serializer(mut self, serializer: SharedSerializer) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Property metadata for the serializer built from configuration.
    #[must_use]
    pub fn metadata(mut self, metadata: MetadataRegistry) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn register<T: ?Sized>(mut self, class: ClassMetadata) -> Self {
        self.metadata.register::<T>(class);
        self
    }

    /// Appended after the default form object transformer.
    #[must_use]
    pub fn request_step(mut self, step: RequestStep) -> Self {
        self.request_steps.push(step);
        self
    }

    #[must_use]
    pub fn response_step(mut self, step: ResponseStep) -> Self {
        self.response_steps.push(step);
        self
    }

    #[must_use]
    pub fn form_normalization(mut self, normalization: FormNormalization) -> Self {
        self.form_normalization = normalization;
        self
    }

    /// # Errors
    /// Returns [`RestError::InvalidParameter`] when `endpoint` is missing or
    /// not an absolute http(s) URL, or a configured header is invalid. No
    /// network activity happens here.
    pub fn build(self) -> Result<RestClient, RestError> {
        let endpoint = parse_endpoint(self.config.endpoint.as_deref())?;

        let headers = self.config.request_headers();
        headers.to_header_map()?;

        let serializer = match self.serializer {
            Some(serializer) => Some(serializer),
            None => match SerializerBuilder::new(self.config.serializer)
                .metadata(self.metadata)
                .build()
            {
                Ok(serializer) => Some(serializer),
                Err(RestError::SerializerUnavailable { .. }) => {
                    tracing::warn!(
                        endpoint = %endpoint,
                        "serializer disabled; object transformers will not be installed"
                    );
                    None
                }
                Err(e) => return Err(e),
            },
        };

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                HyperTransport::builder()
                    .timeout(self.config.timeout)
                    .user_agent(self.config.user_agent.clone())
                    .http_errors(self.config.http_errors)
                    .tls_roots(self.config.tls_roots)
                    .pool_max_idle_per_host(self.config.pool_max_idle_per_host)
                    .max_body_size(self.config.max_body_size)
                    .build()?,
            ),
        };

        let mut request_steps = Vec::with_capacity(self.request_steps.len() + 1);
        if let Some(serializer) = &serializer {
            request_steps.push(RequestStep::transformer(FormObjectTransformer::new(
                Arc::clone(serializer),
            )));
        }
        request_steps.extend(self.request_steps);

        tracing::debug!(
            endpoint = %endpoint,
            serializer = serializer.as_ref().map(|s| s.backend()),
            "REST client ready"
        );

        Ok(RestClient {
            core: Arc::new(ClientCore {
                transport,
                endpoint,
                headers,
                serializer,
                request_steps,
                response_steps: self.response_steps,
                form_normalization: self.form_normalization,
                use_default_response_transformers: self.config.use_default_response_transformers,
            }),
        })
    }
}

fn parse_endpoint(endpoint: Option<&str>) -> Result<Url, RestError> {
    let raw = endpoint
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| RestError::invalid("missing `endpoint` configuration value"))?;
    let url = Url::parse(raw)
        .map_err(|e| RestError::invalid(format!("invalid endpoint {raw:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(RestError::invalid(format!(
            "endpoint {raw:?} must use http or https"
        )));
    }
    Ok(url)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::serializer::SerializerKind;
    use crate::transport::{RawResponse, TransportError, WireOptions};
    use async_trait::async_trait;
    use http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTransport {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn send(
            &self,
            _method: Method,
            uri: &str,
            _options: WireOptions,
        ) -> Result<RawResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::InvalidRequest(uri.to_owned()))
        }
    }

    #[test]
    fn test_missing_endpoint_fails_before_network() {
        let transport = CountingTransport::default();
        let calls = Arc::clone(&transport.calls);

        let err = RestClient::builder()
            .transport(transport)
            .build()
            .unwrap_err();

        assert!(matches!(err, RestError::InvalidParameter(ref msg) if msg.contains("endpoint")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_blank_or_relative_endpoint_rejected() {
        for endpoint in ["  ", "/api", "ftp://files.example.com"] {
            let err = RestClient::new(ClientConfig::new(endpoint)).unwrap_err();
            assert!(matches!(err, RestError::InvalidParameter(_)), "{endpoint}");
        }
    }

    #[test]
    fn test_invalid_configured_header_rejected() {
        let mut config = ClientConfig::new("https://api.example.com");
        config.api_key = Some("bad\nkey".to_owned());
        let err = RestClient::builder()
            .config(config)
            .transport(CountingTransport::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, RestError::InvalidParameter(_)));
    }

    #[test]
    fn test_default_request_transformer_installed_with_serializer() {
        let client = RestClient::builder()
            .config(ClientConfig::new("https://api.example.com"))
            .transport(CountingTransport::default())
            .build()
            .unwrap();
        assert_eq!(client.core.request_steps.len(), 1);
        assert_eq!(client.serializer().unwrap().backend(), "navigator");
    }

    #[test]
    fn test_disabled_serializer_skips_object_transformers() {
        let mut config = ClientConfig::new("https://api.example.com");
        config.serializer = SerializerKind::Disabled;
        let client = RestClient::builder()
            .config(config)
            .transport(CountingTransport::default())
            .build()
            .unwrap();
        assert!(client.serializer().is_none());
        assert!(client.core.request_steps.is_empty());
    }

    #[test]
    fn test_explicit_serializer_shared_between_clients() {
        let serializer = SerializerBuilder::new(SerializerKind::Normalizer).build().unwrap();
        let build = || {
            RestClient::builder()
                .config(ClientConfig::new("https://api.example.com"))
                .serializer(Arc::clone(&serializer))
                .transport(CountingTransport::default())
                .build()
                .unwrap()
        };
        let (a, b) = (build(), build());
        assert!(Arc::ptr_eq(a.serializer().unwrap(), b.serializer().unwrap()));
        assert_eq!(a.serializer().unwrap().backend(), "normalizer");
    }

    #[tokio::test]
    async fn test_default_transport_builds_from_config() {
        let client = RestClient::new(ClientConfig::new("http://127.0.0.1:1/api")).unwrap();
        assert_eq!(client.endpoint().path(), "/api");
    }
}
