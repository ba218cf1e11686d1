//! Request definition and execution.
//!
//! A [`RequestExecutor`] is created per resource (URI prefix) from a
//! [`RestClient`](crate::RestClient) through [`RequestBuilder`]. Each
//! [`Call`] carries its own serialization context, so one executor can serve
//! concurrent calls.

use std::fmt;
use std::sync::Arc;

use http::Method;
use serde::Serialize;
use tracing::Instrument;
use url::Url;

use crate::client::ClientCore;
use crate::context::SerializationContext;
use crate::definition::{QueryParams, RequestHeaders};
use crate::error::RestError;
use crate::form::{DefaultFormNormalizer, FormData, FormNormalization, FormNormalizer};
use crate::response::{ApiResponse, Model, Response};
use crate::transform::{
    ObjectCollectionTransformer, ObjectTransformer, RequestStep, RequestTransform,
    RequestTransformer, ResponseStep, ResponseTransform, ResponseTransformer,
};
use crate::transport::{RawResponse, Transport, TransportError, WireOptions};

/// One logical API call.
#[derive(Debug, Clone)]
#[must_use]
pub struct Call {
    method: Method,
    uri: String,
    form: FormData,
    query: QueryParams,
    context: Option<SerializationContext>,
}

impl Call {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            form: FormData::new(),
            query: QueryParams::new(),
            context: None,
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn delete(uri: impl Into<String>) -> Self {
        Self::new(Method::DELETE, uri)
    }

    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Method::POST, uri)
    }

    pub fn put(uri: impl Into<String>) -> Self {
        Self::new(Method::PUT, uri)
    }

    pub fn patch(uri: impl Into<String>) -> Self {
        Self::new(Method::PATCH, uri)
    }

    pub fn with_form(mut self, form: impl Into<FormData>) -> Self {
        self.form = form.into();
        self
    }

    /// Sends `object` as the form, mapped by the request pipeline.
    ///
    /// # Errors
    /// Returns an error if `object` cannot be represented as JSON.
    pub fn with_object<T: Serialize + ?Sized>(mut self, object: &T) -> Result<Self, RestError> {
        self.form = FormData::object(object)?;
        Ok(self)
    }

    pub fn with_query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    pub fn query_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.set(key, value);
        self
    }

    /// Context for this call only; passed to both pipelines.
    pub fn with_context(mut self, context: SerializationContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Shorthand for a context restricted to `groups`.
    pub fn with_groups<I, S>(self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_context(SerializationContext::for_groups(groups))
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[must_use]
    pub fn form(&self) -> &FormData {
        &self.form
    }

    #[must_use]
    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    #[must_use]
    pub fn context(&self) -> Option<&SerializationContext> {
        self.context.as_ref()
    }
}

/// Configures a [`RequestExecutor`] on top of the client defaults.
#[must_use = "RequestBuilder does nothing until .build() is called"]
pub struct RequestBuilder {
    core: Arc<ClientCore>,
    uri_prefix: String,
    headers: RequestHeaders,
    request_steps: Vec<RequestStep>,
    model_steps: Vec<ResponseStep>,
    response_steps: Vec<ResponseStep>,
    form_normalization: FormNormalization,
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("uri_prefix", &self.uri_prefix)
            .field("headers", &self.headers)
            .field("request_steps", &self.request_steps)
            .field("model_steps", &self.model_steps)
            .field("response_steps", &self.response_steps)
            .field("form_normalization", &self.form_normalization)
            .finish_non_exhaustive()
    }
}

impl RequestBuilder {
    pub(crate) fn new(core: Arc<ClientCore>, uri_prefix: String) -> Self {
        Self {
            headers: core.headers.clone(),
            request_steps: core.request_steps.clone(),
            model_steps: Vec::new(),
            response_steps: core.response_steps.clone(),
            form_normalization: core.form_normalization.clone(),
            core,
            uri_prefix,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Merges `headers` over the current ones.
    pub fn headers(mut self, headers: &RequestHeaders) -> Self {
        self.headers.merge(headers);
        self
    }

    pub fn request_step(mut self, step: RequestStep) -> Self {
        self.request_steps.push(step);
        self
    }

    pub fn request_transformer(self, transformer: impl RequestTransformer + 'static) -> Self {
        self.request_step(RequestStep::transformer(transformer))
    }

    pub fn request_callback(
        self,
        callback: impl Fn(FormData) -> FormData + Send + Sync + 'static,
    ) -> Self {
        self.request_step(RequestStep::callback(callback))
    }

    pub fn response_step(mut self, step: ResponseStep) -> Self {
        self.response_steps.push(step);
        self
    }

    pub fn response_transformer(self, transformer: impl ResponseTransformer + 'static) -> Self {
        self.response_step(ResponseStep::transformer(transformer))
    }

    pub fn response_callback(
        self,
        callback: impl Fn(&mut dyn ApiResponse) + Send + Sync + 'static,
    ) -> Self {
        self.response_step(ResponseStep::callback(callback))
    }

    /// Replaces the default normalizer, including its dropping of empty values.
    pub fn form_normalizer(mut self, normalizer: impl FormNormalizer + 'static) -> Self {
        self.form_normalization = FormNormalization::Custom(Arc::new(normalizer));
        self
    }

    /// Sends transformed form data without normalization.
    pub fn disable_form_normalizer(mut self) -> Self {
        self.form_normalization = FormNormalization::Disabled;
        self
    }

    /// Decodes successful responses into `T`: single objects through
    /// [`ObjectTransformer`], lists through [`ObjectCollectionTransformer`].
    ///
    /// No-op when default response transformers are disabled in
    /// configuration or the client has no serializer.
    pub fn model<T>(self) -> Self
    where
        T: serde::de::DeserializeOwned + Model,
    {
        self.model_with_keys::<T>(&[])
    }

    /// Like [`model`](Self::model) for envelope responses: only the list
    /// values under `keys` are decoded, other fields stay JSON. With keys
    /// given the single-object transformer is not installed.
    pub fn model_with_keys<T>(mut self, keys: &[&str]) -> Self
    where
        T: serde::de::DeserializeOwned + Model,
    {
        let serializer = match (&self.core.serializer, self.core.use_default_response_transformers)
        {
            (Some(serializer), true) => Arc::clone(serializer),
            _ => {
                tracing::debug!(
                    model = std::any::type_name::<T>(),
                    "default response transformers not installed"
                );
                return self;
            }
        };
        let collection = ResponseStep::transformer(
            ObjectCollectionTransformer::<T>::new(Arc::clone(&serializer))
                .with_mapping_keys(keys.iter().copied()),
        );
        self.model_steps = if keys.is_empty() {
            vec![
                ResponseStep::transformer(ObjectTransformer::<T>::new(serializer)),
                collection,
            ]
        } else {
            vec![collection]
        };
        self
    }

    #[must_use]
    pub fn build(self) -> RequestExecutor {
        let normalizer: Option<Arc<dyn FormNormalizer>> = match self.form_normalization {
            FormNormalization::Default => Some(Arc::new(DefaultFormNormalizer::new(
                self.core.serializer.clone(),
            ))),
            FormNormalization::Custom(normalizer) => Some(normalizer),
            FormNormalization::Disabled => None,
        };

        let mut response_steps = self.model_steps;
        response_steps.extend(self.response_steps);

        RequestExecutor {
            transport: Arc::clone(&self.core.transport),
            endpoint: self.core.endpoint.clone(),
            uri_prefix: self.uri_prefix,
            headers: self.headers,
            request_transform: RequestTransform::new(self.request_steps),
            response_transform: ResponseTransform::new(response_steps),
            normalizer,
        }
    }
}

/// Runs calls against one resource of the remote API.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    endpoint: Url,
    uri_prefix: String,
    headers: RequestHeaders,
    request_transform: RequestTransform,
    response_transform: ResponseTransform,
    normalizer: Option<Arc<dyn FormNormalizer>>,
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("endpoint", &self.endpoint.as_str())
            .field("uri_prefix", &self.uri_prefix)
            .field("headers", &self.headers)
            .field("request_transform", &self.request_transform)
            .field("response_transform", &self.response_transform)
            .field("normalizer", &self.normalizer)
            .finish_non_exhaustive()
    }
}

impl RequestExecutor {
    /// URI prefix of the resource.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri_prefix
    }

    /// `complement` joined onto the URI prefix with exactly one `/`.
    #[must_use]
    pub fn append_to_uri(&self, complement: &str) -> String {
        join_path(&self.uri_prefix, complement)
    }

    #[must_use]
    pub fn headers(&self) -> &RequestHeaders {
        &self.headers
    }

    /// # Errors
    /// See [`execute`](Self::execute).
    pub async fn get(&self, uri: &str, query: Option<QueryParams>) -> Result<Response, RestError> {
        self.execute(Call::get(uri).with_query(query.unwrap_or_default()))
            .await
    }

    /// # Errors
    /// See [`execute`](Self::execute).
    pub async fn delete(
        &self,
        uri: &str,
        query: Option<QueryParams>,
    ) -> Result<Response, RestError> {
        self.execute(Call::delete(uri).with_query(query.unwrap_or_default()))
            .await
    }

    /// # Errors
    /// See [`execute`](Self::execute).
    pub async fn post(
        &self,
        uri: &str,
        form: impl Into<FormData>,
        query: Option<QueryParams>,
    ) -> Result<Response, RestError> {
        self.execute(
            Call::post(uri)
                .with_form(form)
                .with_query(query.unwrap_or_default()),
        )
        .await
    }

    /// # Errors
    /// See [`execute`](Self::execute).
    pub async fn put(
        &self,
        uri: &str,
        form: impl Into<FormData>,
        query: Option<QueryParams>,
    ) -> Result<Response, RestError> {
        self.execute(
            Call::put(uri)
                .with_form(form)
                .with_query(query.unwrap_or_default()),
        )
        .await
    }

    /// # Errors
    /// See [`execute`](Self::execute).
    pub async fn patch(
        &self,
        uri: &str,
        form: impl Into<FormData>,
        query: Option<QueryParams>,
    ) -> Result<Response, RestError> {
        self.execute(
            Call::patch(uri)
                .with_form(form)
                .with_query(query.unwrap_or_default()),
        )
        .await
    }

    /// Runs `call` and returns the transformed response envelope.
    ///
    /// Non-2xx replies that come with a response are returned like any other
    /// (check [`ApiResponse::is_successful`]).
    ///
    /// # Errors
    /// - [`RestError::InvalidParameter`] if the call URI already contains `?`
    /// - [`RestError::ServiceUnavailable`] if the host cannot be reached
    /// - [`RestError::HttpStatus`] for an HTTP error without any response
    /// - envelope construction and transformer errors
    pub async fn execute<R: ApiResponse>(&self, call: Call) -> Result<R, RestError> {
        let url = self.resolve(&call.uri)?;
        let span = tracing::info_span!(
            "rest_request",
            http.method = %call.method,
            http.url = %url,
            http.status_code = tracing::field::Empty,
        );
        self.run(call, url).instrument(span).await
    }

    async fn run<R: ApiResponse>(&self, call: Call, url: String) -> Result<R, RestError> {
        let Call {
            method,
            form,
            query,
            context,
            ..
        } = call;
        let context = context.as_ref();

        let form = self.request_transform.transform(form, context)?;
        let form = match &self.normalizer {
            Some(normalizer) if !form.is_empty() => normalizer.normalize(form, context)?,
            _ => form,
        };
        let options = WireOptions {
            form_params: form.to_form_params(),
            headers: self.headers.to_header_map()?,
            query,
        };
        tracing::debug!(fields = options.form_params.len(), "dispatching");

        let raw = settle(self.transport.send(method, &url, options).await)?;
        tracing::Span::current().record("http.status_code", raw.status.as_u16());

        let mut response = R::from_raw(raw)?;
        self.response_transform.transform(&mut response, context)?;
        Ok(response)
    }

    /// Absolute URL of `uri`: absolute http(s) URIs are used as given,
    /// anything else is appended to the endpoint path.
    fn resolve(&self, uri: &str) -> Result<String, RestError> {
        if uri.contains('?') {
            return Err(RestError::invalid(format!(
                "URI {uri:?} already contains a query string; pass query parameters separately"
            )));
        }
        if let Some(absolute) =
            Url::parse(uri).ok().filter(|u| matches!(u.scheme(), "http" | "https"))
        {
            return Ok(absolute.into());
        }

        let mut url = self.endpoint.clone();
        let path = join_path(self.endpoint.path(), uri);
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url.into())
    }
}

fn join_path(base: &str, complement: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        complement.trim_start_matches('/')
    )
}

/// Maps a transport outcome onto the executor's error taxonomy. HTTP errors
/// that carry a response continue as a normal reply.
fn settle(result: Result<RawResponse, TransportError>) -> Result<RawResponse, RestError> {
    match result {
        Ok(raw) => Ok(raw),
        Err(TransportError::Connect { uri, source }) => {
            tracing::warn!(%uri, error = %source, "service unavailable");
            Err(RestError::ServiceUnavailable { uri, source })
        }
        Err(TransportError::Status {
            uri,
            status,
            response: Some(raw),
        }) => {
            tracing::warn!(%uri, %status, "continuing with HTTP error response");
            Ok(*raw)
        }
        Err(TransportError::Status {
            uri,
            status,
            response: None,
        }) => Err(RestError::HttpStatus { uri, status }),
        Err(TransportError::BodyTooLarge { uri, limit }) => {
            tracing::warn!(%uri, limit, "response body too large");
            Err(RestError::BodyTooLarge { uri, limit })
        }
        Err(TransportError::Timeout(after)) => Err(RestError::Timeout(after)),
        Err(TransportError::InvalidRequest(message)) => Err(RestError::InvalidParameter(message)),
        Err(TransportError::Other(source)) => Err(RestError::Transport(source)),
    }
}
