//! Property metadata consulted by the serializer backends.
//!
//! Metadata is registered per root type and addresses properties by dotted
//! path (`author.name`), array positions omitted. Types without registered
//! metadata are serialized without group or version filtering.

use std::collections::HashMap;

/// Serialization rules attached to a single property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMetadata {
    pub groups: Vec<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub max_depth: Option<usize>,
}

impl PropertyMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// First version (inclusive) in which the property exists.
    #[must_use]
    pub fn since(mut self, version: impl Into<String>) -> Self {
        self.since = Some(version.into());
        self
    }

    /// Last version (inclusive) in which the property exists.
    #[must_use]
    pub fn until(mut self, version: impl Into<String>) -> Self {
        self.until = Some(version.into());
        self
    }

    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

/// Metadata of one root type, keyed by dotted property path.
#[derive(Debug, Clone, Default)]
pub struct ClassMetadata {
    properties: HashMap<String, PropertyMetadata>,
}

impl ClassMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn property(mut self, path: impl Into<String>, metadata: PropertyMetadata) -> Self {
        self.properties.insert(path.into(), metadata);
        self
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&PropertyMetadata> {
        self.properties.get(path)
    }
}

/// Registry of [`ClassMetadata`] keyed by `std::any::type_name`.
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    classes: HashMap<&'static str, ClassMetadata>,
}

impl MetadataRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: ?Sized>(&mut self, metadata: ClassMetadata) {
        self.classes.insert(std::any::type_name::<T>(), metadata);
    }

    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<&ClassMetadata> {
        self.classes.get(type_name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Compares dotted numeric versions (`1.10 > 1.9`). Non-numeric segments
/// compare lexically.
pub fn compare_versions(left: &str, right: &str) -> std::cmp::Ordering {
    let mut lhs = left.split('.');
    let mut rhs = right.split('.');
    loop {
        match (lhs.next(), rhs.next()) {
            (None, None) => return std::cmp::Ordering::Equal,
            (l, r) => {
                let l = l.unwrap_or("0");
                let r = r.unwrap_or("0");
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(a), Ok(b)) => a.cmp(&b),
                    _ => l.cmp(r),
                };
                if ord.is_ne() {
                    return ord;
                }
            }
        }
    }
}
