//! Canonical addresses into namespaced XML-like trees.
//!
//! A [`Tag`] is one qualified name (optionally an attribute) and a [`Path`] is an
//! immutable sequence of tags. Paths are used as map keys throughout the mapping
//! engine and the statistics, so their ordering is total and deterministic:
//! tags compare prefix first, then local name, and attributes sort after
//! elements of the same name.
//!
//! # Text form
//!
//! ```text
//! /lido:lido/lido:actor/@lido:type
//! ```
//!
//! The empty path is written as `/`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PathError;

const FORBIDDEN_NAME_CHARS: &[char] = &['/', '@', ':', '<', '>', '&', '"', '\'', '=', '$'];

/// A namespace-qualified element or attribute name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    // Field order drives the derived ordering.
    prefix: Option<String>,
    local_name: String,
    attribute: bool,
}

impl Tag {
    /// Create an element tag.
    pub fn element(prefix: Option<&str>, local_name: &str) -> Result<Self, PathError> {
        Self::build(prefix, local_name, false)
    }

    /// Create an attribute tag.
    pub fn attribute(prefix: Option<&str>, local_name: &str) -> Result<Self, PathError> {
        Self::build(prefix, local_name, true)
    }

    /// Parse a tag from its text form (`prefix:local`, `local`, `@prefix:local`).
    pub fn parse(text: &str) -> Result<Self, PathError> {
        let (attribute, qualified) = match text.strip_prefix('@') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        Self::from_qualified_name(qualified, attribute).map_err(|_| PathError::InvalidTag {
            tag: text.to_string(),
        })
    }

    /// Build a tag from an XML qualified name such as `dc:title`.
    pub fn from_qualified_name(name: &str, attribute: bool) -> Result<Self, PathError> {
        match name.split_once(':') {
            Some((prefix, local)) => Self::build(Some(prefix), local, attribute),
            None => Self::build(None, name, attribute),
        }
    }

    fn build(prefix: Option<&str>, local_name: &str, attribute: bool) -> Result<Self, PathError> {
        let valid = |name: &str| {
            !name.is_empty()
                && !name
                    .chars()
                    .any(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_NAME_CHARS.contains(&c))
        };
        if !valid(local_name) || prefix.is_some_and(|p| !valid(p)) {
            let qualified = match prefix {
                Some(p) => format!("{p}:{local_name}"),
                None => local_name.to_string(),
            };
            return Err(PathError::InvalidTag { tag: qualified });
        }
        Ok(Self {
            prefix: prefix.map(str::to_string),
            local_name: local_name.to_string(),
            attribute,
        })
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn is_attribute(&self) -> bool {
        self.attribute
    }

    /// The XML qualified name, without the attribute marker.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.local_name),
            None => self.local_name.clone(),
        }
    }

    /// Return this tag qualified with `prefix` when it has none.
    ///
    /// Unprefixed attributes are not in the default namespace, so they are
    /// returned unchanged.
    pub fn with_default_prefix(&self, prefix: &str) -> Self {
        if self.prefix.is_some() || self.attribute {
            return self.clone();
        }
        Self {
            prefix: Some(prefix.to_string()),
            local_name: self.local_name.clone(),
            attribute: false,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attribute {
            f.write_str("@")?;
        }
        if let Some(prefix) = &self.prefix {
            write!(f, "{prefix}:")?;
        }
        f.write_str(&self.local_name)
    }
}

impl FromStr for Tag {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// An immutable sequence of tags addressing a node in a record or schema tree.
///
/// Clones share the tag storage, so paths are cheap to pass around and to use
/// as map keys. Every operation returns a new path.
#[derive(Clone, Default)]
pub struct Path {
    tags: Arc<[Tag]>,
}

impl Path {
    /// The empty path (`/`).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a path from its text form.
    pub fn parse(text: &str) -> Result<Self, PathError> {
        let text = text.trim();
        let Some(rest) = text.strip_prefix('/') else {
            return Err(PathError::NotAbsolute {
                text: text.to_string(),
            });
        };
        if rest.is_empty() {
            return Ok(Self::empty());
        }
        let mut tags = Vec::new();
        for step in rest.split('/') {
            if step.is_empty() {
                return Err(PathError::EmptyStep {
                    text: text.to_string(),
                });
            }
            tags.push(Tag::parse(step)?);
        }
        Self::from_tags(tags)
    }

    /// Build a path from tags, checking that attributes only appear last.
    pub fn from_tags(tags: Vec<Tag>) -> Result<Self, PathError> {
        if let Some(pos) = tags.iter().position(Tag::is_attribute)
            && pos + 1 != tags.len()
        {
            return Err(PathError::AttributeNotLast {
                tag: tags[pos].to_string(),
                path: render(&tags),
            });
        }
        Ok(Self { tags: tags.into() })
    }

    pub fn size(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn get_tag(&self, index: usize) -> Option<&Tag> {
        self.tags.get(index)
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.tags.iter()
    }

    pub fn first(&self) -> Option<&Tag> {
        self.tags.first()
    }

    pub fn last(&self) -> Option<&Tag> {
        self.tags.last()
    }

    /// True when the last step addresses an attribute.
    pub fn is_attribute(&self) -> bool {
        self.last().is_some_and(Tag::is_attribute)
    }

    /// Strict ancestry: a path is never its own ancestor.
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        self.size() < other.size() && other.tags.starts_with(&self.tags)
    }

    /// True when `self` equals `other` or is one of its ancestors.
    pub fn is_ancestor_or_self_of(&self, other: &Path) -> bool {
        self.size() <= other.size() && other.tags.starts_with(&self.tags)
    }

    /// The first `count` tags of this path.
    pub fn take_first(&self, count: usize) -> Result<Path, PathError> {
        if count > self.size() {
            return Err(PathError::OutOfRange {
                path: self.to_string(),
                count,
                size: self.size(),
            });
        }
        if count == self.size() {
            return Ok(self.clone());
        }
        Ok(Self {
            tags: self.tags[..count].into(),
        })
    }

    /// The part of this path beyond `ancestor`.
    ///
    /// `ancestor` may equal this path, in which case the suffix is empty, so
    /// that `p.take_first(n)` followed by `concat` of the suffix rebuilds `p`.
    pub fn extend_ancestor(&self, ancestor: &Path) -> Result<Path, PathError> {
        if !ancestor.is_ancestor_or_self_of(self) {
            return Err(PathError::NotAnAncestor {
                ancestor: ancestor.to_string(),
                path: self.to_string(),
            });
        }
        Ok(Self {
            tags: self.tags[ancestor.size()..].into(),
        })
    }

    /// Append the tags of `suffix`.
    pub fn concat(&self, suffix: &Path) -> Result<Path, PathError> {
        if suffix.is_empty() {
            return Ok(self.clone());
        }
        let mut tags = self.tags.to_vec();
        tags.extend(suffix.tags.iter().cloned());
        Self::from_tags(tags)
    }

    /// Append one tag.
    pub fn child(&self, tag: Tag) -> Result<Path, PathError> {
        let mut tags = Vec::with_capacity(self.size() + 1);
        tags.extend(self.tags.iter().cloned());
        tags.push(tag);
        Self::from_tags(tags)
    }

    /// The single-step path of the first tag; empty for the empty path.
    pub fn root(&self) -> Path {
        if self.size() <= 1 {
            return self.clone();
        }
        Self {
            tags: self.tags[..1].into(),
        }
    }

    /// The path without its last tag, or `None` for the empty path.
    pub fn parent(&self) -> Option<Path> {
        if self.is_empty() {
            return None;
        }
        Some(Self {
            tags: self.tags[..self.size() - 1].into(),
        })
    }

    /// The longest path that is an ancestor-or-self of both paths.
    pub fn common_prefix(&self, other: &Path) -> Path {
        let shared = self
            .tags
            .iter()
            .zip(other.tags.iter())
            .take_while(|(a, b)| a == b)
            .count();
        if shared == self.size() {
            return self.clone();
        }
        Self {
            tags: self.tags[..shared].into(),
        }
    }

    /// Qualify every unprefixed element tag with `prefix`.
    pub fn with_default_prefix(&self, prefix: &str) -> Path {
        Self {
            tags: self
                .tags
                .iter()
                .map(|tag| tag.with_default_prefix(prefix))
                .collect(),
        }
    }
}

fn render(tags: &[Tag]) -> String {
    if tags.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for tag in tags {
        out.push('/');
        out.push_str(&tag.to_string());
    }
    out
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tags, &other.tags) || self.tags == other.tags
    }
}

impl Eq for Path {}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tags.hash(state);
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.tags.cmp(&other.tags)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(&self.tags))
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
