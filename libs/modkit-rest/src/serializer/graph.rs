//! Value-graph walker shared by both serializer backends.
//!
//! Backends translate their native context into [`GraphRules`]; the walker
//! then drops properties from a `serde_json::Value` tree according to group
//! membership, version ranges, depth limits, null policy and exclusion
//! strategies.

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::context::{Direction, ExclusionStrategy, PropertyView};
use crate::metadata::{ClassMetadata, PropertyMetadata, compare_versions};

pub struct GraphRules<'a> {
    pub direction: Direction,
    pub class: Option<&'a ClassMetadata>,
    pub groups: Option<Vec<String>>,
    /// Group implicitly assigned to properties that declare none.
    pub default_group: Option<&'static str>,
    pub version: Option<String>,
    pub depth_checks: bool,
    pub depth_offset: usize,
    pub max_depth: Option<usize>,
    pub keep_nulls: bool,
    pub exclusions: &'a [Arc<dyn ExclusionStrategy>],
}

impl GraphRules<'_> {
    pub fn apply(&self, value: Value) -> Value {
        self.walk(value, "", 0)
    }

    fn walk(&self, value: Value, parent: &str, depth: usize) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (name, child) in map {
                    let path = if parent.is_empty() {
                        name.clone()
                    } else {
                        format!("{parent}.{name}")
                    };
                    let child_depth = depth + 1;
                    if self.skips(&name, &path, child_depth, &child) {
                        continue;
                    }
                    let child = self.walk(child, &path, child_depth);
                    out.insert(name, child);
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.walk(item, parent, depth))
                    .collect(),
            ),
            other => other,
        }
    }

    fn skips(&self, name: &str, path: &str, depth: usize, value: &Value) -> bool {
        if value.is_null() && !self.keep_nulls {
            return true;
        }

        let effective_depth = depth + self.depth_offset;
        if self.depth_checks && self.max_depth.is_some_and(|max| effective_depth > max) {
            return true;
        }

        if let Some(class) = self.class {
            let property = class.get(path);
            if !self.in_groups(property) || !self.in_version(property) {
                return true;
            }
            let limit = property.and_then(|p| p.max_depth);
            if self.depth_checks && limit.is_some_and(|max| effective_depth > max) {
                return true;
            }
        }

        let view = PropertyView {
            name,
            path,
            depth,
            value,
            direction: self.direction,
        };
        self.exclusions
            .iter()
            .any(|strategy| strategy.should_skip_property(&view))
    }

    fn in_groups(&self, property: Option<&PropertyMetadata>) -> bool {
        let Some(requested) = &self.groups else {
            return true;
        };
        let declared = property.map(|p| p.groups.as_slice()).unwrap_or_default();
        if declared.is_empty() {
            return self
                .default_group
                .is_some_and(|group| requested.iter().any(|r| r == group));
        }
        declared.iter().any(|group| requested.contains(group))
    }

    fn in_version(&self, property: Option<&PropertyMetadata>) -> bool {
        let (Some(version), Some(property)) = (&self.version, property) else {
            return true;
        };
        if let Some(since) = &property.since
            && compare_versions(version, since) == Ordering::Less
        {
            return false;
        }
        if let Some(until) = &property.until
            && compare_versions(version, until) == Ordering::Greater
        {
            return false;
        }
        true
    }
}

/// Name of the JSON kind, for error messages.
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
