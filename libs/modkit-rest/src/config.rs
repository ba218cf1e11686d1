//! Client configuration.
//!
//! [`ClientConfig`] is plain `serde` data so it can be embedded in a larger
//! application config or loaded on its own with [`ClientConfig::load`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format as _, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::definition::RequestHeaders;
use crate::error::RestError;
use crate::serializer::SerializerKind;
use crate::transport::{DEFAULT_MAX_BODY_SIZE, DEFAULT_USER_AGENT, TlsRoots};

/// Environment variable prefix recognized by [`ClientConfig::load`].
pub const ENV_PREFIX: &str = "MODKIT_REST_";

/// REST client configuration
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Base URL of the remote API. Required.
    pub endpoint: Option<String>,

    pub api_key: Option<String>,
    pub api_key_header: String,

    pub api_version: Option<String>,
    pub api_version_header: String,

    /// Extra headers sent with every request
    pub headers: BTreeMap<String, String>,

    /// Per-exchange timeout, e.g. `"30s"` or `"1m 30s"`
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,

    pub user_agent: String,

    pub serializer: SerializerKind,

    /// Install the typed object and collection transformers on
    /// `RequestBuilder::model`
    pub use_default_response_transformers: bool,

    pub tls_roots: TlsRoots,

    /// Report 4xx/5xx replies as transport errors carrying the response
    pub http_errors: bool,

    pub pool_max_idle_per_host: usize,

    /// Largest reply body accepted, in bytes
    pub max_body_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_key_header: "x-api-key".to_owned(),
            api_version: None,
            api_version_header: "api-version".to_owned(),
            headers: BTreeMap::new(),
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            serializer: SerializerKind::default(),
            use_default_response_transformers: true,
            tls_roots: TlsRoots::default(),
            http_errors: true,
            pool_max_idle_per_host: 32,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_header", &self.api_key_header)
            .field("api_version", &self.api_version)
            .field("api_version_header", &self.api_version_header)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("serializer", &self.serializer)
            .field(
                "use_default_response_transformers",
                &self.use_default_response_transformers,
            )
            .field("tls_roots", &self.tls_roots)
            .field("http_errors", &self.http_errors)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .field("max_body_size", &self.max_body_size)
            .finish()
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    /// Loads defaults, then the YAML file at `path`, then `MODKIT_REST_*`
    /// environment variables (nested keys separated by `__`).
    ///
    /// # Errors
    /// Returns [`RestError::Config`] when a source cannot be read or a value
    /// has the wrong shape.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RestError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(&figment)
    }

    /// # Errors
    /// Returns [`RestError::Config`] when the figment does not describe a
    /// valid configuration.
    pub fn from_figment(figment: &Figment) -> Result<Self, RestError> {
        figment.extract().map_err(|e| RestError::Config(Box::new(e)))
    }

    /// Headers sent with every request: `Accept: application/json`, the
    /// configured extra headers, then the API version and key headers.
    #[must_use]
    pub fn request_headers(&self) -> RequestHeaders {
        let mut headers = RequestHeaders::new();
        headers.set("accept", "application/json");
        for (name, value) in &self.headers {
            headers.set(name, value.clone());
        }
        if let Some(version) = &self.api_version {
            headers.set(&self.api_version_header, version.clone());
        }
        if let Some(key) = &self.api_key {
            headers.set(&self.api_key_header, key.clone());
        }
        headers
    }
}

mod humantime_duration {
    use std::fmt;
    use std::time::Duration;

    use serde::{Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        struct V;

        impl de::Visitor<'_> for V {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a duration such as \"30s\", or a number of seconds")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
                humantime::parse_duration(v)
                    .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
                Ok(Duration::from_secs(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
                u64::try_from(v)
                    .map(Duration::from_secs)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }
        }

        d.deserialize_any(V)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::io::Write;

    fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert!(config.endpoint.is_none());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.serializer, SerializerKind::Navigator);
        assert!(config.use_default_response_transformers);
        assert!(config.http_errors);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.max_body_size, 10 * 1024 * 1024);
    }

    #[test]
    fn test_load_yaml() {
        let file = yaml_file(
            r#"
endpoint: "https://api.example.com/v2"
api_key: "secret"
timeout: "1m 30s"
serializer: normalizer
tls_roots: native
max_body_size: 65536
headers:
  x-tenant: acme
"#,
        );

        temp_env::with_vars_unset(["MODKIT_REST_TIMEOUT", "MODKIT_REST_ENDPOINT"], || {
            let config = ClientConfig::load(file.path()).unwrap();
            assert_eq!(config.endpoint.as_deref(), Some("https://api.example.com/v2"));
            assert_eq!(config.timeout, Duration::from_secs(90));
            assert_eq!(config.serializer, SerializerKind::Normalizer);
            assert_eq!(config.tls_roots, TlsRoots::Native);
            assert_eq!(config.headers.get("x-tenant").map(String::as_str), Some("acme"));
            assert_eq!(config.api_key_header, "x-api-key");
            assert_eq!(config.max_body_size, 65536);
        });
    }

    #[test]
    fn test_env_overrides_yaml() {
        let file = yaml_file("endpoint: \"https://yaml.example.com\"\ntimeout: \"5s\"\n");

        temp_env::with_vars(
            [
                ("MODKIT_REST_ENDPOINT", Some("https://env.example.com")),
                ("MODKIT_REST_TIMEOUT", Some("250ms")),
            ],
            || {
                let config = ClientConfig::load(file.path()).unwrap();
                assert_eq!(config.endpoint.as_deref(), Some("https://env.example.com"));
                assert_eq!(config.timeout, Duration::from_millis(250));
            },
        );
    }

    #[test]
    fn test_invalid_duration_is_config_error() {
        let file = yaml_file("timeout: \"soon\"\n");
        temp_env::with_vars_unset(["MODKIT_REST_TIMEOUT"], || {
            let err = ClientConfig::load(file.path()).unwrap_err();
            assert!(matches!(err, RestError::Config(_)));
        });
    }

    #[test]
    fn test_unknown_field_rejected() {
        let figment = Figment::new().merge(Serialized::defaults(serde_json::json!({
            "endpoint": "https://api.example.com",
            "retries": 3,
        })));
        let err = ClientConfig::from_figment(&figment).unwrap_err();
        assert!(matches!(err, RestError::Config(_)));
    }

    #[test]
    fn test_numeric_timeout_is_seconds() {
        let figment = Figment::new().merge(Serialized::defaults(serde_json::json!({
            "timeout": 7,
        })));
        let config = ClientConfig::from_figment(&figment).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_request_headers() {
        let mut config = ClientConfig::new("https://api.example.com");
        config.api_key = Some("k".to_owned());
        config.api_version = Some("2024-01".to_owned());
        config.headers.insert("X-Tenant".to_owned(), "acme".to_owned());

        let headers = config.request_headers();
        assert_eq!(headers.get("accept"), Some("application/json"));
        assert_eq!(headers.get("x-api-key"), Some("k"));
        assert_eq!(headers.get("api-version"), Some("2024-01"));
        assert_eq!(headers.get("x-tenant"), Some("acme"));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let mut config = ClientConfig::new("https://api.example.com");
        config.api_key = Some("top-secret".to_owned());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("top-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
