//! Graph-navigator backend.
//!
//! Native context is a typed [`NavigatorContext`]. Nulls are skipped unless
//! requested, properties without declared groups belong to the `Default`
//! group and deserialization contexts carry a depth counter advanced once per
//! unit of the requested max depth.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::graph::{GraphRules, kind_of};
use super::{Format, Serializer, SerializerError};
use crate::context::{Direction, ExclusionStrategy, SerializationContext};
use crate::metadata::MetadataRegistry;

pub const DEFAULT_GROUP: &str = "Default";

/// Native context of the graph navigator.
#[derive(Debug, Clone)]
pub struct NavigatorContext {
    direction: Direction,
    attributes: BTreeMap<String, Value>,
    version: Option<String>,
    groups: Option<Vec<String>>,
    max_depth_checks: bool,
    serialize_null: bool,
    exclusion_strategies: Vec<Arc<dyn ExclusionStrategy>>,
    depth: usize,
}

impl NavigatorContext {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            attributes: BTreeMap::new(),
            version: None,
            groups: None,
            max_depth_checks: false,
            serialize_null: false,
            exclusion_strategies: Vec::new(),
            depth: 0,
        }
    }

    #[must_use]
    pub fn serialization() -> Self {
        Self::new(Direction::Serialization)
    }

    #[must_use]
    pub fn deserialization() -> Self {
        Self::new(Direction::Deserialization)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = Some(version.into());
    }

    /// An empty list selects the `Default` group.
    pub fn set_groups(&mut self, groups: &[String]) {
        self.groups = Some(if groups.is_empty() {
            vec![DEFAULT_GROUP.to_owned()]
        } else {
            groups.to_vec()
        });
    }

    pub fn enable_max_depth_checks(&mut self) {
        self.max_depth_checks = true;
    }

    pub fn disable_max_depth_checks(&mut self) {
        self.max_depth_checks = false;
    }

    pub fn set_serialize_null(&mut self, serialize_null: bool) {
        self.serialize_null = serialize_null;
    }

    pub fn add_exclusion_strategy(&mut self, strategy: Arc<dyn ExclusionStrategy>) {
        self.exclusion_strategies.push(strategy);
    }

    pub fn increase_depth(&mut self) {
        self.depth += 1;
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    #[must_use]
    pub fn groups(&self) -> Option<&[String]> {
        self.groups.as_deref()
    }

    #[must_use]
    pub fn max_depth_checks(&self) -> bool {
        self.max_depth_checks
    }

    #[must_use]
    pub fn serialize_null(&self) -> bool {
        self.serialize_null
    }

    #[must_use]
    pub fn exclusion_strategies(&self) -> &[Arc<dyn ExclusionStrategy>] {
        &self.exclusion_strategies
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Metadata-driven serializer walking `serde_json` value graphs.
#[derive(Debug, Clone)]
pub struct GraphNavigator {
    metadata: Arc<MetadataRegistry>,
}

impl GraphNavigator {
    #[must_use]
    pub fn new(metadata: Arc<MetadataRegistry>) -> Self {
        Self { metadata }
    }

    fn rules<'a>(
        &'a self,
        type_name: &str,
        direction: Direction,
        context: Option<&'a NavigatorContext>,
    ) -> GraphRules<'a> {
        let mut rules = GraphRules {
            direction,
            class: self.metadata.get(type_name),
            groups: None,
            default_group: Some(DEFAULT_GROUP),
            version: None,
            depth_checks: false,
            depth_offset: 0,
            max_depth: None,
            // Deserialization always visits nulls.
            keep_nulls: direction == Direction::Deserialization,
            exclusions: &[],
        };
        if let Some(ctx) = context {
            rules.groups.clone_from(&ctx.groups);
            rules.version.clone_from(&ctx.version);
            rules.depth_checks = ctx.max_depth_checks;
            rules.depth_offset = ctx.depth;
            rules.keep_nulls = rules.keep_nulls || ctx.serialize_null;
            rules.exclusions = &ctx.exclusion_strategies;
        }
        rules
    }

    /// # Errors
    /// Returns an error if the filtered value cannot be encoded.
    pub fn serialize(
        &self,
        value: Value,
        type_name: &str,
        context: Option<&NavigatorContext>,
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
        context: Option<&NavigatorContext>,
    ) -> Result<Value, SerializerError> {
        let value: Value = serde_json::from_str(payload)?;
        Ok(self.rules(type_name, Direction::Deserialization, context).apply(value))
    }

    /// # Errors
    /// Returns [`SerializerError::NotAMap`] if `value` is not an object.
    pub fn to_array(
        &self,
        value: Value,
        type_name: &str,
        context: Option<&NavigatorContext>,
    ) -> Result<Map<String, Value>, SerializerError> {
        match self.rules(type_name, Direction::Serialization, context).apply(value) {
            Value::Object(map) => Ok(map),
            other => Err(SerializerError::NotAMap {
                found: kind_of(&other).to_owned(),
            }),
        }
    }

    #[must_use]
    pub fn from_array(
        &self,
        map: Map<String, Value>,
        type_name: &str,
        context: Option<&NavigatorContext>,
    ) -> Value {
        self.rules(type_name, Direction::Deserialization, context)
            .apply(Value::Object(map))
    }
}

/// [`Serializer`] adapter over [`GraphNavigator`].
#[derive(Debug, Clone)]
pub struct NavigatorAdapter {
    navigator: GraphNavigator,
}

impl NavigatorAdapter {
    #[must_use]
    pub fn new(navigator: GraphNavigator) -> Self {
        Self { navigator }
    }

    /// Native serialization context, or `None` for a `None` context.
    #[must_use]
    pub fn serialization_context(context: Option<&SerializationContext>) -> Option<NavigatorContext> {
        context.map(|ctx| Self::map_context(ctx, NavigatorContext::serialization()))
    }

    /// Native deserialization context. The depth counter is advanced once per
    /// unit of `max_depth` before the remaining fields are mapped.
    #[must_use]
    pub fn deserialization_context(
        context: Option<&SerializationContext>,
    ) -> Option<NavigatorContext> {
        context.map(|ctx| {
            let mut native = NavigatorContext::deserialization();
            if let Some(max_depth) = ctx.max_depth() {
                for _ in 0..max_depth {
                    native.increase_depth();
                }
            }
            Self::map_context(ctx, native)
        })
    }

    fn map_context(ctx: &SerializationContext, mut native: NavigatorContext) -> NavigatorContext {
        for (key, value) in ctx.attributes() {
            native.set_attribute(key.clone(), value.clone());
        }
        if let Some(version) = ctx.version() {
            native.set_version(version);
        }
        if let Some(groups) = ctx.groups() {
            native.set_groups(groups);
        }
        match ctx.max_depth_enabled() {
            Some(true) => native.enable_max_depth_checks(),
            Some(false) => native.disable_max_depth_checks(),
            None => {}
        }
        if let Some(serialize_null) = ctx.serialize_null() {
            native.set_serialize_null(serialize_null);
        }
        for strategy in ctx.exclusion_strategies() {
            native.add_exclusion_strategy(Arc::clone(strategy));
        }
        native
    }
}

impl Serializer for NavigatorAdapter {
    fn backend(&self) -> &'static str {
        "navigator"
    }

    fn serialize_value(
        &self,
        value: Value,
        type_name: &str,
        format: Format,
        context: Option<&SerializationContext>,
    ) -> Result<String, SerializerError> {
        let Format::Json = format;
        let native = Self::serialization_context(context);
        self.navigator.serialize(value, type_name, native.as_ref())
    }

    fn deserialize_value(
        &self,
        payload: &str,
        type_name: &str,
        format: Format,
        context: Option<&SerializationContext>,
    ) -> Result<Value, SerializerError> {
        let Format::Json = format;
        let native = Self::deserialization_context(context);
        self.navigator.deserialize(payload, type_name, native.as_ref())
    }

    fn normalize(
        &self,
        value: Value,
        type_name: &str,
        context: Option<&SerializationContext>,
    ) -> Result<Map<String, Value>, SerializerError> {
        let native = Self::serialization_context(context);
        self.navigator.to_array(value, type_name, native.as_ref())
    }

    fn denormalize(
        &self,
        map: Map<String, Value>,
        type_name: &str,
        context: Option<&SerializationContext>,
    ) -> Result<Value, SerializerError> {
        let native = Self::deserialization_context(context);
        Ok(self.navigator.from_array(map, type_name, native.as_ref()))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::context::SkipProperties;
    use crate::metadata::{ClassMetadata, PropertyMetadata};
    use serde_json::json;

    struct Article;

    fn adapter() -> NavigatorAdapter {
        let mut registry = MetadataRegistry::new();
        registry.register::<Article>(
            ClassMetadata::new()
                .property("body", PropertyMetadata::new().groups(["details"]))
                .property("author.email", PropertyMetadata::new().max_depth(2)),
        );
        NavigatorAdapter::new(GraphNavigator::new(Arc::new(registry)))
    }

    fn article() -> &'static str {
        std::any::type_name::<Article>()
    }

    #[test]
    fn test_none_context_maps_to_none() {
        assert!(NavigatorAdapter::serialization_context(None).is_none());
        assert!(NavigatorAdapter::deserialization_context(None).is_none());
    }

    #[test]
    fn test_unset_fields_keep_backend_defaults() {
        let ctx = SerializationContext::new();
        let native = NavigatorAdapter::serialization_context(Some(&ctx)).unwrap();
        assert_eq!(native.version(), None);
        assert_eq!(native.groups(), None);
        assert!(!native.max_depth_checks());
        assert!(!native.serialize_null());
        assert_eq!(native.depth(), 0);
    }

    #[test]
    fn test_all_fields_mapped() {
        let mut ctx = SerializationContext::for_groups(["details"]);
        ctx.set_attribute("locale", "en")
            .set_version("2.0")
            .enable_max_depth()
            .set_serialize_null(true)
            .add_exclusion_strategy(Arc::new(SkipProperties::new(["x"])));

        let native = NavigatorAdapter::serialization_context(Some(&ctx)).unwrap();
        assert_eq!(native.direction(), Direction::Serialization);
        assert_eq!(native.attribute("locale"), Some(&json!("en")));
        assert_eq!(native.version(), Some("2.0"));
        assert_eq!(native.groups().unwrap(), &["details".to_owned()]);
        assert!(native.max_depth_checks());
        assert!(native.serialize_null());
        assert_eq!(native.exclusion_strategies().len(), 1);
    }

    #[test]
    fn test_empty_groups_select_default_group() {
        let ctx = SerializationContext::for_groups(Vec::<String>::new());
        let native = NavigatorAdapter::serialization_context(Some(&ctx)).unwrap();
        assert_eq!(native.groups().unwrap(), &[DEFAULT_GROUP.to_owned()]);
    }

    #[test]
    fn test_max_depth_advances_only_deserialization_depth() {
        let mut ctx = SerializationContext::new();
        ctx.set_max_depth(3);

        let de = NavigatorAdapter::deserialization_context(Some(&ctx)).unwrap();
        assert_eq!(de.direction(), Direction::Deserialization);
        assert_eq!(de.depth(), 3);

        let ser = NavigatorAdapter::serialization_context(Some(&ctx)).unwrap();
        assert_eq!(ser.depth(), 0);
    }

    #[test]
    fn test_serialize_skips_nulls_by_default() {
        let adapter = adapter();
        let out = adapter
            .serialize_value(json!({"heading": "h", "body": null}), article(), Format::Json, None)
            .unwrap();
        assert_eq!(out, r#"{"heading":"h"}"#);

        let mut ctx = SerializationContext::new();
        ctx.set_serialize_null(true);
        let out = adapter
            .serialize_value(json!({"body": null}), article(), Format::Json, Some(&ctx))
            .unwrap();
        assert_eq!(out, r#"{"body":null}"#);
    }

    #[test]
    fn test_deserialize_filters_groups() {
        let adapter = adapter();
        let ctx = SerializationContext::for_groups(["Default"]);
        let value = adapter
            .deserialize_value(r#"{"heading":"h","body":"b"}"#, article(), Format::Json, Some(&ctx))
            .unwrap();
        assert_eq!(value, json!({"heading": "h"}));
    }

    #[test]
    fn test_deserialization_depth_counts_towards_limits() {
        let adapter = adapter();
        let payload = r#"{"author":{"name":"n","email":"e"}}"#;

        let mut ctx = SerializationContext::new();
        ctx.enable_max_depth();
        let value = adapter
            .deserialize_value(payload, article(), Format::Json, Some(&ctx))
            .unwrap();
        assert_eq!(value, json!({"author": {"name": "n", "email": "e"}}));

        ctx.set_max_depth(1);
        let value = adapter
            .deserialize_value(payload, article(), Format::Json, Some(&ctx))
            .unwrap();
        assert_eq!(value, json!({"author": {"name": "n"}}));
    }

    #[test]
    fn test_normalize_requires_object() {
        let adapter = adapter();
        let err = adapter.normalize(json!([1, 2]), article(), None).unwrap_err();
        assert!(matches!(err, SerializerError::NotAMap { found } if found == "array"));
    }
}
