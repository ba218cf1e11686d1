//! Serializer-agnostic serialization hints.
//!
//! A [`SerializationContext`] is built by the code issuing a request, handed
//! to the executor for the duration of one call and read (never mutated) by
//! every transformer and serializer backend it reaches. Each backend adapter
//! maps the fields that are set onto its own native options; unset fields are
//! never forwarded.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Which way a value graph is being walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Serialization,
    Deserialization,
}

/// Property being visited, as seen by an [`ExclusionStrategy`].
#[derive(Debug, Clone, Copy)]
pub struct PropertyView<'a> {
    /// Property name within its parent object.
    pub name: &'a str,
    /// Dotted path from the root object, array indices omitted.
    pub path: &'a str,
    /// Nesting depth; root properties are at depth 1.
    pub depth: usize,
    pub value: &'a Value,
    pub direction: Direction,
}

/// Predicate deciding whether a property is left out of the output.
pub trait ExclusionStrategy: Send + Sync + fmt::Debug {
    fn should_skip_property(&self, property: &PropertyView<'_>) -> bool;
}

/// Skips properties by name or by dotted path.
#[derive(Debug, Clone, Default)]
pub struct SkipProperties {
    names: BTreeSet<String>,
}

impl SkipProperties {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl ExclusionStrategy for SkipProperties {
    fn should_skip_property(&self, property: &PropertyView<'_>) -> bool {
        self.names.contains(property.name) || self.names.contains(property.path)
    }
}

/// Serialization hints carried through one logical request.
///
/// `groups` keeps `None` ("unrestricted") distinct from an empty list
/// ("no groups requested").
#[derive(Clone, Default)]
pub struct SerializationContext {
    attributes: BTreeMap<String, Value>,
    version: Option<String>,
    groups: Option<Vec<String>>,
    max_depth: Option<usize>,
    max_depth_enabled: Option<bool>,
    serialize_null: Option<bool>,
    exclusion_strategies: Vec<Arc<dyn ExclusionStrategy>>,
}

impl SerializationContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context restricted to the given groups.
    #[must_use]
    pub fn for_groups<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut context = Self::new();
        context.set_groups(groups);
        context
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn set_version(&mut self, version: impl Into<String>) -> &mut Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Replaces the group list. Duplicates are dropped, first occurrence wins.
    pub fn set_groups<I, S>(&mut self, groups: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Vec::new();
        for group in groups {
            let group = group.into();
            if !list.contains(&group) {
                list.push(group);
            }
        }
        self.groups = Some(list);
        self
    }

    /// Appends a group, turning an unrestricted context into a restricted one.
    pub fn add_group(&mut self, group: impl Into<String>) -> &mut Self {
        let group = group.into();
        let list = self.groups.get_or_insert_with(Vec::new);
        if !list.contains(&group) {
            list.push(group);
        }
        self
    }

    #[must_use]
    pub fn groups(&self) -> Option<&[String]> {
        self.groups.as_deref()
    }

    pub fn set_max_depth(&mut self, max_depth: usize) -> &mut Self {
        self.max_depth = Some(max_depth);
        self
    }

    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    pub fn enable_max_depth(&mut self) -> &mut Self {
        self.max_depth_enabled = Some(true);
        self
    }

    pub fn disable_max_depth(&mut self) -> &mut Self {
        self.max_depth_enabled = Some(false);
        self
    }

    /// Tri-state: `None` when neither enabled nor disabled explicitly.
    #[must_use]
    pub fn max_depth_enabled(&self) -> Option<bool> {
        self.max_depth_enabled
    }

    pub fn set_serialize_null(&mut self, serialize_null: bool) -> &mut Self {
        self.serialize_null = Some(serialize_null);
        self
    }

    #[must_use]
    pub fn serialize_null(&self) -> Option<bool> {
        self.serialize_null
    }

    pub fn add_exclusion_strategy(&mut self, strategy: Arc<dyn ExclusionStrategy>) -> &mut Self {
        self.exclusion_strategies.push(strategy);
        self
    }

    #[must_use]
    pub fn exclusion_strategies(&self) -> &[Arc<dyn ExclusionStrategy>] {
        &self.exclusion_strategies
    }
}

impl fmt::Debug for SerializationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializationContext")
            .field("attributes", &self.attributes)
            .field("version", &self.version)
            .field("groups", &self.groups)
            .field("max_depth", &self.max_depth)
            .field("max_depth_enabled", &self.max_depth_enabled)
            .field("serialize_null", &self.serialize_null)
            .field("exclusion_strategies", &self.exclusion_strategies.len())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_context_is_unset() {
        let ctx = SerializationContext::new();
        assert!(ctx.attributes().is_empty());
        assert_eq!(ctx.version(), None);
        assert_eq!(ctx.groups(), None);
        assert_eq!(ctx.max_depth(), None);
        assert_eq!(ctx.max_depth_enabled(), None);
        assert_eq!(ctx.serialize_null(), None);
        assert!(ctx.exclusion_strategies().is_empty());
    }

    #[test]
    fn test_attribute_overwrites() {
        let mut ctx = SerializationContext::new();
        ctx.set_attribute("locale", "en").set_attribute("locale", "fr");
        assert_eq!(ctx.attribute("locale"), Some(&json!("fr")));
        assert_eq!(ctx.attributes().len(), 1);
    }

    #[test]
    fn test_empty_groups_distinct_from_unset() {
        let mut ctx = SerializationContext::new();
        assert_eq!(ctx.groups(), None);

        ctx.set_groups(Vec::<String>::new());
        assert_eq!(ctx.groups(), Some(&[][..]));
    }

    #[test]
    fn test_groups_keep_order_and_dedupe() {
        let mut ctx = SerializationContext::for_groups(["list", "details", "list"]);
        ctx.add_group("admin").add_group("details");
        assert_eq!(
            ctx.groups().unwrap(),
            &["list".to_owned(), "details".to_owned(), "admin".to_owned()]
        );
    }

    #[test]
    fn test_max_depth_flag_independent_of_value() {
        let mut ctx = SerializationContext::new();
        ctx.enable_max_depth();
        assert_eq!(ctx.max_depth_enabled(), Some(true));
        assert_eq!(ctx.max_depth(), None);

        ctx.set_max_depth(3).disable_max_depth();
        assert_eq!(ctx.max_depth_enabled(), Some(false));
        assert_eq!(ctx.max_depth(), Some(3));
    }

    #[test]
    fn test_exclusion_strategies_keep_order() {
        let mut ctx = SerializationContext::new();
        ctx.add_exclusion_strategy(Arc::new(SkipProperties::new(["a"])))
            .add_exclusion_strategy(Arc::new(SkipProperties::new(["b"])));

        let value = json!(1);
        let view = PropertyView {
            name: "b",
            path: "b",
            depth: 1,
            value: &value,
            direction: Direction::Serialization,
        };
        let strategies = ctx.exclusion_strategies();
        assert_eq!(strategies.len(), 2);
        assert!(!strategies[0].should_skip_property(&view));
        assert!(strategies[1].should_skip_property(&view));
    }

    #[test]
    fn test_skip_properties_matches_path() {
        let strategy = SkipProperties::new(["author.email"]);
        let value = json!("a@b.c");
        let nested = PropertyView {
            name: "email",
            path: "author.email",
            depth: 2,
            value: &value,
            direction: Direction::Deserialization,
        };
        let top = PropertyView {
            name: "email",
            path: "email",
            depth: 1,
            value: &value,
            direction: Direction::Deserialization,
        };
        assert!(strategy.should_skip_property(&nested));
        assert!(!strategy.should_skip_property(&top));
    }
}
