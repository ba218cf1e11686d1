//! Outgoing form data and its normalization.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::context::SerializationContext;
use crate::error::RestError;
use crate::serializer::{SerializerError, SharedSerializer};

/// A typed object captured for sending, not yet passed through a serializer.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPayload {
    type_name: &'static str,
    value: Value,
}

impl ObjectPayload {
    /// # Errors
    /// Returns an error if `object` cannot be represented as JSON.
    pub fn new<T: Serialize + ?Sized>(object: &T) -> Result<Self, RestError> {
        let value = serde_json::to_value(object).map_err(SerializerError::from)?;
        Ok(Self {
            type_name: std::any::type_name::<T>(),
            value,
        })
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Mapped form of the object, through `serializer`.
    ///
    /// # Errors
    /// Returns an error if the serializer does not produce a mapping.
    pub fn to_map(
        &self,
        serializer: &SharedSerializer,
        context: Option<&SerializationContext>,
    ) -> Result<FormData, RestError> {
        let map = serializer.normalize(self.value.clone(), self.type_name, context)?;
        Ok(FormData::from(map))
    }
}

/// Outgoing form payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FormData {
    /// Already-mapped JSON value
    Value(Value),
    Object(ObjectPayload),
    Map(BTreeMap<String, FormData>),
    List(Vec<FormData>),
}

impl Default for FormData {
    fn default() -> Self {
        Self::Map(BTreeMap::new())
    }
}

impl FormData {
    /// Empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns an error if `object` cannot be represented as JSON.
    pub fn object<T: Serialize + ?Sized>(object: &T) -> Result<Self, RestError> {
        ObjectPayload::new(object).map(Self::Object)
    }

    /// Null, empty string, empty array, empty mapping. Objects never are.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Value(value) => is_empty_value(value),
            Self::Object(_) => false,
            Self::Map(entries) => entries.is_empty(),
            Self::List(items) => items.is_empty(),
        }
    }

    /// Scalar JSON value (string, number, boolean or null).
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Value(value) if !value.is_array() && !value.is_object())
    }

    /// Adds a field. A form that is not a mapping becomes one holding only
    /// the new field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FormData>) -> &mut Self {
        if let Self::Map(entries) = self {
            entries.insert(key.into(), value.into());
        } else {
            *self = Self::Map(BTreeMap::from([(key.into(), value.into())]));
        }
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FormData> {
        match self {
            Self::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Flattens into `application/x-www-form-urlencoded` fields using bracket
    /// notation for nesting (`a[b]=c`, `a[0]=x`). Nulls are omitted, booleans
    /// become `1`/`0`, objects are encoded verbatim. A bare scalar has no
    /// field name and yields nothing.
    #[must_use]
    pub fn to_form_params(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        flatten(self, "", &mut out);
        out
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_owned()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn child_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}[{key}]")
    }
}

fn flatten(data: &FormData, prefix: &str, out: &mut BTreeMap<String, String>) {
    match data {
        FormData::Value(value) => flatten_value(value, prefix, out),
        FormData::Object(payload) => flatten_value(payload.value(), prefix, out),
        FormData::Map(entries) => {
            for (key, child) in entries {
                flatten(child, &child_key(prefix, key), out);
            }
        }
        FormData::List(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten(child, &child_key(prefix, &index.to_string()), out);
            }
        }
    }
}

fn flatten_value(value: &Value, prefix: &str, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_value(child, &child_key(prefix, &index.to_string()), out);
            }
        }
        Value::Object(map) => {
            for (key, child) in map {
                flatten_value(child, &child_key(prefix, key), out);
            }
        }
        scalar => {
            if let (false, Some(text)) = (prefix.is_empty(), scalar_to_string(scalar)) {
                out.insert(prefix.to_owned(), text);
            }
        }
    }
}

impl From<Value> for FormData {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Map<String, Value>> for FormData {
    fn from(map: Map<String, Value>) -> Self {
        Self::Map(map.into_iter().map(|(k, v)| (k, Self::Value(v))).collect())
    }
}

impl From<ObjectPayload> for FormData {
    fn from(payload: ObjectPayload) -> Self {
        Self::Object(payload)
    }
}

impl From<Vec<FormData>> for FormData {
    fn from(items: Vec<FormData>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, FormData>> for FormData {
    fn from(entries: BTreeMap<String, FormData>) -> Self {
        Self::Map(entries)
    }
}

macro_rules! form_scalar {
    ($($ty:ty),*) => {
        $(impl From<$ty> for FormData {
            fn from(value: $ty) -> Self {
                Self::Value(Value::from(value))
            }
        })*
    };
}

form_scalar!(&str, String, bool, i32, i64, u32, u64, f64);

impl<K: Into<String>, V: Into<FormData>> FromIterator<(K, V)> for FormData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::Map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Converts transformed form data into what goes on the wire.
pub trait FormNormalizer: Send + Sync + fmt::Debug {
    /// # Errors
    /// Returns an error when the form cannot be normalized.
    fn normalize(
        &self,
        form: FormData,
        context: Option<&SerializationContext>,
    ) -> Result<FormData, RestError>;
}

/// Default normalizer.
///
/// Objects (top-level or embedded) are mapped through the serializer, empty
/// values are dropped after normalization and lists of scalars are joined
/// with `,`.
#[derive(Debug, Clone, Default)]
pub struct DefaultFormNormalizer {
    serializer: Option<SharedSerializer>,
}

impl DefaultFormNormalizer {
    #[must_use]
    pub fn new(serializer: Option<SharedSerializer>) -> Self {
        Self { serializer }
    }

    fn entry(
        &self,
        data: FormData,
        context: Option<&SerializationContext>,
    ) -> Result<Option<FormData>, RestError> {
        let normalized = match data {
            FormData::Object(payload) => {
                let serializer = self.serializer.as_ref().ok_or(RestError::SerializerUnavailable {
                    operation: "form object normalization",
                })?;
                self.entry(payload.to_map(serializer, context)?, context)?
                    .unwrap_or_default()
            }
            FormData::Map(entries) => FormData::Map(self.entries(entries, context)?),
            FormData::Value(Value::Object(map)) => {
                FormData::Map(self.entries(FormData::from(map).into_entries(), context)?)
            }
            FormData::List(items) => self.list(items, context)?,
            FormData::Value(Value::Array(items)) => {
                self.list(items.into_iter().map(FormData::Value).collect(), context)?
            }
            scalar @ FormData::Value(_) => scalar,
        };
        Ok((!normalized.is_empty()).then_some(normalized))
    }

    fn entries(
        &self,
        entries: BTreeMap<String, FormData>,
        context: Option<&SerializationContext>,
    ) -> Result<BTreeMap<String, FormData>, RestError> {
        let mut out = BTreeMap::new();
        for (key, value) in entries {
            if let Some(value) = self.entry(value, context)? {
                out.insert(key, value);
            }
        }
        Ok(out)
    }

    fn list(
        &self,
        items: Vec<FormData>,
        context: Option<&SerializationContext>,
    ) -> Result<FormData, RestError> {
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            if let Some(item) = self.entry(item, context)? {
                kept.push(item);
            }
        }
        let joined: Option<Vec<String>> = kept
            .iter()
            .map(|item| item.as_value().and_then(scalar_to_string))
            .collect();
        Ok(match joined {
            Some(parts) if !parts.is_empty() => FormData::Value(Value::String(parts.join(","))),
            _ => FormData::List(kept),
        })
    }
}

impl FormData {
    fn into_entries(self) -> BTreeMap<String, FormData> {
        match self {
            Self::Map(entries) => entries,
            _ => BTreeMap::new(),
        }
    }
}

impl FormNormalizer for DefaultFormNormalizer {
    fn normalize(
        &self,
        form: FormData,
        context: Option<&SerializationContext>,
    ) -> Result<FormData, RestError> {
        if form.is_empty() {
            return Ok(FormData::new());
        }
        Ok(self.entry(form, context)?.unwrap_or_default())
    }
}

/// Form normalizer selection for a request.
#[derive(Debug, Clone, Default)]
pub enum FormNormalization {
    /// [`DefaultFormNormalizer`] over the client serializer
    #[default]
    Default,
    /// Caller-supplied normalizer, fully replacing the default
    Custom(Arc<dyn FormNormalizer>),
    /// Form data goes on the wire as transformed
    Disabled,
}
