use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue, USER_AGENT};
use http::{Method, Request};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};

use super::{RawResponse, TlsRoots, Transport, TransportError, WireOptions};
use crate::error::RestError;

/// Default User-Agent header value
pub const DEFAULT_USER_AGENT: &str = concat!("modkit-rest/", env!("CARGO_PKG_VERSION"));

/// Default cap on a reply body (10 MiB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// [`Transport`] over a pooled hyper client with rustls.
///
/// Form parameters are sent as `application/x-www-form-urlencoded`. With
/// `http_errors` enabled (the default) 4xx/5xx replies come back as
/// [`TransportError::Status`] carrying the full response. Reply bodies larger
/// than `max_body_size` are rejected while streaming.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
    timeout: Duration,
    user_agent: HeaderValue,
    http_errors: bool,
    max_body_size: usize,
}

impl fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperTransport")
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("http_errors", &self.http_errors)
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Transport with default settings.
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails.
    pub fn new() -> Result<Self, RestError> {
        HyperTransportBuilder::new().build()
    }

    #[must_use]
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::new()
    }
}

fn classify(err: hyper_util::client::legacy::Error, uri: &str) -> TransportError {
    if err.is_connect() {
        TransportError::Connect {
            uri: uri.to_owned(),
            source: Box::new(err),
        }
    } else {
        TransportError::Other(Box::new(err))
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(
        &self,
        method: Method,
        uri: &str,
        options: WireOptions,
    ) -> Result<RawResponse, TransportError> {
        let WireOptions {
            form_params,
            headers,
            query,
        } = options;
        let target = format!("{uri}{}", query.to_query_string());

        let body = if form_params.is_empty() {
            Bytes::new()
        } else {
            serde_urlencoded::to_string(&form_params)
                .map(Bytes::from)
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?
        };

        let mut request = Request::builder()
            .method(method)
            .uri(&target)
            .body(Full::new(body))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let request_headers = request.headers_mut();
        for (name, value) in &headers {
            request_headers.append(name, value.clone());
        }
        if !form_params.is_empty() && !request_headers.contains_key(CONTENT_TYPE) {
            request_headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
        }
        if !request_headers.contains_key(USER_AGENT) {
            request_headers.insert(USER_AGENT, self.user_agent.clone());
        }

        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|err| classify(err, &target))?;
            let (parts, body) = response.into_parts();
            let body = Limited::new(body, self.max_body_size)
                .collect()
                .await
                .map_err(|e| {
                    if e.is::<LengthLimitError>() {
                        TransportError::BodyTooLarge {
                            uri: target.clone(),
                            limit: self.max_body_size,
                        }
                    } else {
                        TransportError::Other(e)
                    }
                })?
                .to_bytes();
            Ok::<_, TransportError>(RawResponse::new(parts.status, parts.headers, body))
        };

        let raw = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;

        tracing::debug!(
            status = raw.status.as_u16(),
            bytes = raw.body.len(),
            "received response"
        );

        if self.http_errors && (raw.status.is_client_error() || raw.status.is_server_error()) {
            return Err(TransportError::Status {
                uri: target,
                status: raw.status,
                response: Some(Box::new(raw)),
            });
        }
        Ok(raw)
    }
}

/// Builder for [`HyperTransport`]
#[derive(Debug, Clone)]
pub struct HyperTransportBuilder {
    timeout: Duration,
    user_agent: String,
    http_errors: bool,
    tls_roots: TlsRoots,
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    max_body_size: usize,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperTransportBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            http_errors: true,
            tls_roots: TlsRoots::default(),
            pool_max_idle_per_host: 32,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Per-exchange timeout, covering connect, headers and body.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Report 4xx/5xx replies as [`TransportError::Status`] (default: true).
    #[must_use]
    pub fn http_errors(mut self, enabled: bool) -> Self {
        self.http_errors = enabled;
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRoots) -> Self {
        self.tls_roots = roots;
        self
    }

    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// `None` keeps idle connections indefinitely.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    /// Largest reply body accepted, in bytes.
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// # Errors
    /// Returns [`RestError::InvalidParameter`] for an unusable User-Agent and
    /// [`RestError::Transport`] if TLS initialization fails.
    pub fn build(self) -> Result<HyperTransport, RestError> {
        let user_agent = HeaderValue::from_str(&self.user_agent)
            .map_err(|e| RestError::invalid(format!("invalid user agent: {e}")))?;

        let https = self.tls_roots.https_connector()?;

        let mut builder = Client::builder(TokioExecutor::new());
        // pool_timer is what makes pool_idle_timeout effective
        builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(self.pool_max_idle_per_host);
        if let Some(idle) = self.pool_idle_timeout {
            builder.pool_idle_timeout(idle);
        }
        let client = builder.build::<_, Full<Bytes>>(https);

        Ok(HyperTransport {
            client,
            timeout: self.timeout,
            user_agent,
            http_errors: self.http_errors,
            max_body_size: self.max_body_size,
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::definition::QueryParams;
    use http::{HeaderMap, StatusCode};
    use httpmock::prelude::*;
    use std::collections::BTreeMap;

    fn transport() -> HyperTransport {
        HyperTransport::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_appends_query_and_user_agent() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/articles")
                .query_param("page", "2")
                .header("user-agent", DEFAULT_USER_AGENT);
            then.status(200)
                .header("content-type", "application/json")
                .body("[]");
        });

        let mut query = QueryParams::new();
        query.set("page", "2");
        let options = WireOptions {
            query,
            ..WireOptions::default()
        };

        let raw = transport()
            .send(Method::GET, &server.url("/articles"), options)
            .await
            .unwrap();

        mock.assert();
        assert_eq!(raw.status, StatusCode::OK);
        assert_eq!(raw.body.as_ref(), b"[]");
    }

    #[tokio::test]
    async fn test_post_sends_form_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/articles")
                .header("content-type", FORM_CONTENT_TYPE)
                .header("x-api-key", "secret")
                .body("body=b&heading=h");
            then.status(201);
        });

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("secret"));
        let options = WireOptions {
            form_params: BTreeMap::from([
                ("heading".to_owned(), "h".to_owned()),
                ("body".to_owned(), "b".to_owned()),
            ]),
            headers,
            query: QueryParams::new(),
        };

        let raw = transport()
            .send(Method::POST, &server.url("/articles"), options)
            .await
            .unwrap();

        mock.assert();
        assert_eq!(raw.status, StatusCode::CREATED);
        assert!(raw.body.is_empty());
    }

    #[tokio::test]
    async fn test_http_error_carries_response() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404)
                .header("content-type", "application/json")
                .body(r#"{"error":"not found"}"#);
        });

        let err = transport()
            .send(Method::GET, &server.url("/missing"), WireOptions::default())
            .await
            .unwrap_err();

        match err {
            TransportError::Status {
                status, response, ..
            } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                let raw = response.unwrap();
                assert_eq!(raw.body.as_ref(), br#"{"error":"not found"}"#);
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_errors_disabled_returns_reply() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(DELETE).path("/articles/1");
            then.status(500);
        });

        let transport = HyperTransport::builder().http_errors(false).build().unwrap();
        let raw = transport
            .send(Method::DELETE, &server.url("/articles/1"), WireOptions::default())
            .await
            .unwrap();
        assert_eq!(raw.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_refused_connection_is_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = transport()
            .send(
                Method::GET,
                &format!("http://127.0.0.1:{port}/articles"),
                WireOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/export");
            then.status(200)
                .header("content-type", "application/json")
                .body("x".repeat(4096));
        });

        let transport = HyperTransport::builder().max_body_size(1024).build().unwrap();
        let err = transport
            .send(Method::GET, &server.url("/export"), WireOptions::default())
            .await
            .unwrap_err();

        assert!(
            matches!(err, TransportError::BodyTooLarge { limit: 1024, ref uri } if uri.ends_with("/export")),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_body_at_limit_accepted() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/export");
            then.status(200).body("x".repeat(1024));
        });

        let transport = HyperTransport::builder().max_body_size(1024).build().unwrap();
        let raw = transport
            .send(Method::GET, &server.url("/export"), WireOptions::default())
            .await
            .unwrap();
        assert_eq!(raw.body.len(), 1024);
    }

    #[test]
    fn test_invalid_user_agent_rejected() {
        let err = HyperTransport::builder()
            .user_agent("bad\nagent")
            .build()
            .unwrap_err();
        assert!(matches!(err, RestError::InvalidParameter(_)));
    }
}
