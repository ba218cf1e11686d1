//! Response envelope.
//!
//! A response keeps the raw body exactly as received next to a separately
//! mutable `data` slot. The slot starts as the decoded JSON body and is later
//! replaced by response transformers with typed models; the two are never
//! reconciled after the first parse.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::error::RestError;
use crate::transport::RawResponse;

/// A typed value produced by a response transformer.
pub trait Model: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + fmt::Debug + Send + Sync> Model for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Contents of the response data slot.
#[derive(Debug)]
pub enum Data {
    /// Decoded body, or any part a transformer left untouched.
    Json(Value),
    Model(Box<dyn Model>),
    List(Vec<Data>),
    Map(BTreeMap<String, Data>),
}

impl Data {
    #[must_use]
    pub fn model<T: Model>(value: T) -> Self {
        Self::Model(Box::new(value))
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Model(model) => (**model).as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Data]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Entry of a [`Data::Map`].
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Data> {
        match self {
            Self::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Every element of a [`Data::List`] as `T`, or `None` if any is not.
    #[must_use]
    pub fn models<T: Any>(&self) -> Option<Vec<&T>> {
        self.as_list()?.iter().map(Data::downcast_ref::<T>).collect()
    }
}

/// Response contract consumed by the executor and the transformers.
///
/// The executor is generic over the implementation, so a custom response
/// type is selected at compile time.
pub trait ApiResponse: Send + Sync + 'static {
    /// Builds the envelope from a raw reply.
    ///
    /// # Errors
    /// Returns an error when the body cannot be accepted.
    fn from_raw(raw: RawResponse) -> Result<Self, RestError>
    where
        Self: Sized;

    fn status(&self) -> StatusCode;

    fn headers(&self) -> &HeaderMap;

    /// Raw body as received.
    fn content(&self) -> &str;

    fn data(&self) -> Option<&Data>;

    fn set_data(&mut self, data: Option<Data>);

    fn take_data(&mut self) -> Option<Data>;

    fn is_successful(&self) -> bool {
        self.status().is_success()
    }
}

/// Default JSON response envelope.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    content: String,
    data: Option<Data>,
}

impl Response {
    /// Parses `content` into the data slot.
    ///
    /// Empty or whitespace-only bodies (and a literal JSON `null`) leave the
    /// slot empty without looking at the content type.
    ///
    /// # Errors
    /// Returns [`RestError::UnsupportedContentType`] when a body is present
    /// but `Content-Type` does not mention JSON, and
    /// [`RestError::MalformedBody`] when it does not parse.
    pub fn new(status: StatusCode, headers: HeaderMap, content: String) -> Result<Self, RestError> {
        let data = if content.trim().is_empty() {
            None
        } else {
            ensure_json(&headers)?;
            match serde_json::from_str::<Value>(&content).map_err(RestError::MalformedBody)? {
                Value::Null => None,
                value => Some(Data::Json(value)),
            }
        };

        Ok(Self {
            status,
            headers,
            content,
            data,
        })
    }

    /// Typed model in the data slot.
    #[must_use]
    pub fn model<T: Any>(&self) -> Option<&T> {
        self.data.as_ref()?.downcast_ref::<T>()
    }

    /// Typed models of a collection in the data slot.
    #[must_use]
    pub fn models<T: Any>(&self) -> Option<Vec<&T>> {
        self.data.as_ref()?.models::<T>()
    }

    /// Data slot as JSON, when no transformer replaced it.
    #[must_use]
    pub fn json(&self) -> Option<&Value> {
        self.data.as_ref()?.as_json()
    }

    #[must_use]
    pub fn into_data(self) -> Option<Data> {
        self.data
    }
}

fn ensure_json(headers: &HeaderMap) -> Result<(), RestError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    if content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("json")) {
        Ok(())
    } else {
        Err(RestError::UnsupportedContentType {
            content_type: content_type.map(str::to_owned),
        })
    }
}

impl ApiResponse for Response {
    /// # Errors
    /// Besides the errors of [`Response::new`], a JSON body that is not
    /// valid UTF-8 is [`RestError::MalformedBody`].
    fn from_raw(raw: RawResponse) -> Result<Self, RestError> {
        let RawResponse {
            status,
            headers,
            body,
        } = raw;
        match String::from_utf8(body.to_vec()) {
            Ok(content) => Self::new(status, headers, content),
            Err(e) => {
                ensure_json(&headers)?;
                Err(RestError::MalformedBody(serde::de::Error::custom(e)))
            }
        }
    }

    fn status(&self) -> StatusCode {
        self.status
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn data(&self) -> Option<&Data> {
        self.data.as_ref()
    }

    fn set_data(&mut self, data: Option<Data>) {
        self.data = data;
    }

    fn take_data(&mut self) -> Option<Data> {
        self.data.take()
    }
}
