//! Serializer contract and backends.
//!
//! Two interchangeable backends implement [`Serializer`]: the graph navigator
//! and the object normalizer. Each translates a [`SerializationContext`] into
//! its own native context, mapping only the fields that are set, in this
//! order: attributes, version, groups, max-depth flag, null policy, exclusion
//! strategies.
//!
//! The handle is built once with [`SerializerBuilder`] and shared as
//! [`SharedSerializer`] by every client and request that needs it.

mod graph;
mod navigator;
mod normalizer;

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::context::SerializationContext;
use crate::error::RestError;
use crate::metadata::{ClassMetadata, MetadataRegistry};

pub(crate) use graph::kind_of;
pub use navigator::{DEFAULT_GROUP, GraphNavigator, NavigatorAdapter, NavigatorContext};
pub use normalizer::{NormalizerAdapter, NormalizerContext, ObjectNormalizer};

/// Normalizer option keys.
pub mod options {
    pub use super::normalizer::{ENABLE_MAX_DEPTH, GROUPS, MAX_DEPTH, SERIALIZE_NULL, VERSION};
}

/// Wire format handled by a serializer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Json,
}

/// Backend selection, usually taken from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializerKind {
    #[default]
    Navigator,
    Normalizer,
    Disabled,
}

/// Serializer backend errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SerializerError {
    /// JSON encoding, decoding or typed conversion failed
    #[error("JSON processing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// A mapping was required but the value has another shape
    #[error("Expected a JSON object, found {found}")]
    NotAMap { found: String },

    /// A list, or an object keyed `"0"..="n-1"`, was required
    #[error("Expected a JSON list, found {found}")]
    NotAList { found: String },
}

/// Serializer capability surface.
///
/// Methods work on `serde_json::Value` so the trait stays object safe; the
/// typed entry points live on `dyn Serializer`.
pub trait Serializer: Send + Sync + fmt::Debug {
    fn backend(&self) -> &'static str;

    /// # Errors
    /// Returns an error if the filtered value cannot be encoded.
    fn serialize_value(
        &self,
        value: Value,
        type_name: &str,
        format: Format,
        context: Option<&SerializationContext>,
    ) -> Result<String, SerializerError>;

    /// # Errors
    /// Returns an error if `payload` cannot be decoded.
    fn deserialize_value(
        &self,
        payload: &str,
        type_name: &str,
        format: Format,
        context: Option<&SerializationContext>,
    ) -> Result<Value, SerializerError>;

    /// # Errors
    /// Returns [`SerializerError::NotAMap`] if `value` is not an object.
    fn normalize(
        &self,
        value: Value,
        type_name: &str,
        context: Option<&SerializationContext>,
    ) -> Result<Map<String, Value>, SerializerError>;

    /// # Errors
    /// Returns an error if the backend rejects the mapping.
    fn denormalize(
        &self,
        map: Map<String, Value>,
        type_name: &str,
        context: Option<&SerializationContext>,
    ) -> Result<Value, SerializerError>;
}

/// Shared, once-built serializer handle.
pub type SharedSerializer = Arc<dyn Serializer>;

impl dyn Serializer {
    /// Serializes `data` into `format`.
    ///
    /// # Errors
    /// Returns an error if `data` cannot be represented as JSON.
    pub fn serialize<T: Serialize + ?Sized>(
        &self,
        data: &T,
        format: Format,
        context: Option<&SerializationContext>,
    ) -> Result<String, SerializerError> {
        let value = serde_json::to_value(data)?;
        self.serialize_value(value, std::any::type_name::<T>(), format, context)
    }

    /// Deserializes `payload` into `T`.
    ///
    /// # Errors
    /// Returns an error if `payload` is not valid or does not fit `T`.
    pub fn deserialize<T: DeserializeOwned>(
        &self,
        payload: &str,
        format: Format,
        context: Option<&SerializationContext>,
    ) -> Result<T, SerializerError> {
        let value = self.deserialize_value(payload, std::any::type_name::<T>(), format, context)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Converts `data` into a plain key/value mapping.
    ///
    /// # Errors
    /// Returns an error if `data` does not serialize to a JSON object.
    pub fn to_map<T: Serialize + ?Sized>(
        &self,
        data: &T,
        context: Option<&SerializationContext>,
    ) -> Result<Map<String, Value>, SerializerError> {
        let value = serde_json::to_value(data)?;
        self.normalize(value, std::any::type_name::<T>(), context)
    }

    /// Builds a `T` from a mapping produced by [`to_map`](Self::to_map).
    ///
    /// # Errors
    /// Returns an error if the mapping does not fit `T`.
    pub fn from_map<T: DeserializeOwned>(
        &self,
        map: Map<String, Value>,
        context: Option<&SerializationContext>,
    ) -> Result<T, SerializerError> {
        let value = self.denormalize(map, std::any::type_name::<T>(), context)?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Builds a [`SharedSerializer`] for the selected backend.
#[derive(Debug, Clone, Default)]
pub struct SerializerBuilder {
    kind: SerializerKind,
    metadata: MetadataRegistry,
}

impl SerializerBuilder {
    #[must_use]
    pub fn new(kind: SerializerKind) -> Self {
        Self {
            kind,
            metadata: MetadataRegistry::new(),
        }
    }

    #[must_use]
    pub fn metadata(mut self, metadata: MetadataRegistry) -> Self {
        self.metadata = metadata;
        self
    }

    /// Registers property metadata for root type `T`.
    #[must_use]
    pub fn register<T: ?Sized>(mut self, class: ClassMetadata) -> Self {
        self.metadata.register::<T>(class);
        self
    }

    /// # Errors
    /// Returns [`RestError::SerializerUnavailable`] for [`SerializerKind::Disabled`].
    pub fn build(self) -> Result<SharedSerializer, RestError> {
        let metadata = Arc::new(self.metadata);
        match self.kind {
            SerializerKind::Navigator => {
                Ok(Arc::new(NavigatorAdapter::new(GraphNavigator::new(metadata))))
            }
            SerializerKind::Normalizer => {
                Ok(Arc::new(NormalizerAdapter::new(ObjectNormalizer::new(metadata))))
            }
            SerializerKind::Disabled => Err(RestError::SerializerUnavailable {
                operation: "serializer construction",
            }),
        }
    }
}
