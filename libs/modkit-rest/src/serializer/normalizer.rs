//! Object-normalizer backend.
//!
//! Native context is a string-keyed options map. Context attributes become
//! top-level options, followed by the well-known keys below. Nulls are kept
//! unless `serialize_null` is `false`; group membership is strict (a property
//! without declared groups never matches a group restriction); `max_depth`
//! acts as a global depth bound once `enable_max_depth` is set.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::graph::{GraphRules, kind_of};
use super::{Format, Serializer, SerializerError};
use crate::context::{Direction, ExclusionStrategy, SerializationContext};
use crate::metadata::MetadataRegistry;

pub const GROUPS: &str = "groups";
pub const VERSION: &str = "version";
pub const MAX_DEPTH: &str = "max_depth";
pub const ENABLE_MAX_DEPTH: &str = "enable_max_depth";
pub const SERIALIZE_NULL: &str = "serialize_null";

/// Native context of the object normalizer.
#[derive(Debug, Clone, Default)]
pub struct NormalizerContext {
    options: Map<String, Value>,
    exclusion_strategies: Vec<Arc<dyn ExclusionStrategy>>,
}

impl NormalizerContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_option(&mut self, key: impl Into<String>, value: Value) {
        self.options.insert(key.into(), value);
    }

    #[must_use]
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    #[must_use]
    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn add_exclusion_strategy(&mut self, strategy: Arc<dyn ExclusionStrategy>) {
        self.exclusion_strategies.push(strategy);
    }

    #[must_use]
    pub fn exclusion_strategies(&self) -> &[Arc<dyn ExclusionStrategy>] {
        &self.exclusion_strategies
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.options.get(key).and_then(Value::as_bool)
    }

    fn groups(&self) -> Option<Vec<String>> {
        let list: Vec<String> = self
            .options
            .get(GROUPS)?
            .as_array()?
            .iter()
            .filter_map(|g| g.as_str().map(str::to_owned))
            .collect();
        // An empty list means no restriction for this backend.
        (!list.is_empty()).then_some(list)
    }

    fn version(&self) -> Option<String> {
        match self.options.get(VERSION)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn max_depth(&self) -> Option<usize> {
        let raw = self.options.get(MAX_DEPTH)?.as_u64()?;
        usize::try_from(raw).ok()
    }
}

/// Metadata-driven normalizer over `serde_json` value graphs.
#[derive(Debug, Clone)]
pub struct ObjectNormalizer {
    metadata: Arc<MetadataRegistry>,
}

impl ObjectNormalizer {
    #[must_use]
    pub fn new(metadata: Arc<MetadataRegistry>) -> Self {
        Self { metadata }
    }

    fn rules<'a>(
        &'a self,
        type_name: &str,
        direction: Direction,
        context: Option<&'a NormalizerContext>,
    ) -> GraphRules<'a> {
        let mut rules = GraphRules {
            direction,
            class: self.metadata.get(type_name),
            groups: None,
            default_group: None,
            version: None,
            depth_checks: false,
            depth_offset: 0,
            max_depth: None,
            keep_nulls: true,
            exclusions: &[],
        };
        if let Some(ctx) = context {
            rules.groups = ctx.groups();
            rules.version = ctx.version();
            rules.depth_checks = ctx.flag(ENABLE_MAX_DEPTH).unwrap_or(false);
            rules.max_depth = ctx.max_depth();
            if direction == Direction::Serialization {
                rules.keep_nulls = ctx.flag(SERIALIZE_NULL).unwrap_or(true);
            }
            rules.exclusions = &ctx.exclusion_strategies;
        }
        rules
    }

    /// # Errors
    /// Returns [`SerializerError::NotAMap`] if `value` does not normalize to an object.
    pub fn normalize(
        &self,
        value: Value,
        type_name: &str,
        context: Option<&NormalizerContext>,
    ) -> Result<Map<String, Value>, SerializerError> {
        match self.rules(type_name, Direction::Serialization, context).apply(value) {
            Value::Object(map) => Ok(map),
            other => Err(SerializerError::NotAMap {
                found: kind_of(&other).to_owned(),
            }),
        }
    }

    #[must_use]
    pub fn denormalize(
        &self,
        map: Map<String, Value>,
        type_name: &str,
        context: Option<&NormalizerContext>,
    ) -> Value {
        self.rules(type_name, Direction::Deserialization, context)
            .apply(Value::Object(map))
    }

    /// # Errors
    /// Returns an error if the filtered value cannot be encoded.
    pub fn serialize(
        &self,
        value: Value,
        type_name: &str,
        context: Option<&NormalizerContext>,
    ) -> Result<String, SerializerError> {
        let value = self.rules(type_name, Direction::Serialization, context).apply(value);
        Ok(serde_json::to_string(&value)?)
    }

    /// # Errors
    /// Returns an error if `payload` is not valid JSON.
    pub fn deserialize(
        &self,
        payload: &str,
        type_name: &str,
        context: Option<&NormalizerContext>,
    ) -> Result<Value, SerializerError> {
        let value: Value = serde_json::from_str(payload)?;
        Ok(self.rules(type_name, Direction::Deserialization, context).apply(value))
    }
}

/// [`Serializer`] adapter over [`ObjectNormalizer`].
#[derive(Debug, Clone)]
pub struct NormalizerAdapter {
    normalizer: ObjectNormalizer,
}

impl NormalizerAdapter {
    #[must_use]
    pub fn new(normalizer: ObjectNormalizer) -> Self {
        Self { normalizer }
    }

    /// Native options for `direction`, or `None` for a `None` context.
    /// `serialize_null` is only forwarded when serializing.
    #[must_use]
    pub fn native_context(
        context: Option<&SerializationContext>,
        direction: Direction,
    ) -> Option<NormalizerContext> {
        let ctx = context?;
        let mut native = NormalizerContext::new();
        for (key, value) in ctx.attributes() {
            native.set_option(key.clone(), value.clone());
        }
        if let Some(version) = ctx.version() {
            native.set_option(VERSION, Value::from(version));
        }
        if let Some(groups) = ctx.groups() {
            native.set_option(GROUPS, Value::from(groups.to_vec()));
        }
        if let Some(enabled) = ctx.max_depth_enabled() {
            native.set_option(ENABLE_MAX_DEPTH, Value::Bool(enabled));
        }
        if let Some(max_depth) = ctx.max_depth() {
            native.set_option(MAX_DEPTH, Value::from(max_depth));
        }
        if direction == Direction::Serialization
            && let Some(serialize_null) = ctx.serialize_null()
        {
            native.set_option(SERIALIZE_NULL, Value::Bool(serialize_null));
        }
        for strategy in ctx.exclusion_strategies() {
            native.add_exclusion_strategy(Arc::clone(strategy));
        }
        Some(native)
    }
}

impl Serializer for NormalizerAdapter {
    fn backend(&self) -> &'static str {
        "normalizer"
    }

    fn serialize_value(
        &self,
        value: Value,
        type_name: &str,
        format: Format,
        context: Option<&SerializationContext>,
    ) -> Result<String, SerializerError> {
        let Format::Json = format;
        let native = Self::native_context(context, Direction::Serialization);
        self.normalizer.serialize(value, type_name, native.as_ref())
    }

    fn deserialize_value(
        &self,
        payload: &str,
        type_name: &str,
        format: Format,
        context: Option<&SerializationContext>,
    ) -> Result<Value, SerializerError> {
        let Format::Json = format;
        let native = Self::native_context(context, Direction::Deserialization);
        self.normalizer.deserialize(payload, type_name, native.as_ref())
    }

    fn normalize(
        &self,
        value: Value,
        type_name: &str,
        context: Option<&SerializationContext>,
    ) -> Result<Map<String, Value>, SerializerError> {
        let native = Self::native_context(context, Direction::Serialization);
        self.normalizer.normalize(value, type_name, native.as_ref())
    }

    fn denormalize(
        &self,
        map: Map<String, Value>,
        type_name: &str,
        context: Option<&SerializationContext>,
    ) -> Result<Value, SerializerError> {
        let native = Self::native_context(context, Direction::Deserialization);
        Ok(self.normalizer.denormalize(map, type_name, native.as_ref()))
    }
}
