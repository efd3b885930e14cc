//! One crosswalk rule: how a target-schema node draws its value from input.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::path::Path;

/// How many instances of a repeatable source produce target instances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    /// One target instance per source instance.
    #[default]
    All,
    /// Only the first source instance.
    First,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::All => "ALL",
            Operator::First => "FIRST",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALL" => Ok(Operator::All),
            "FIRST" => Ok(Operator::First),
            other => Err(SchemaError::InvalidValue {
                attribute: "operator".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// A named input path; the name is how expressions refer to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInput {
    pub name: String,
    pub path: Path,
}

impl SourceInput {
    /// An input named after the local name of its last step.
    pub fn new(path: Path) -> Self {
        let name = path
            .last()
            .map_or_else(|| "input".to_string(), |tag| tag.local_name().to_string());
        Self { name, path }
    }

    pub fn named(name: impl Into<String>, path: Path) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

/// What a dictionary does with a value that has no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Unmatched {
    /// Keep the value unchanged.
    #[default]
    Pass,
    /// Drop the value.
    Drop,
    /// Replace the value with fixed text.
    Default(String),
}

impl fmt::Display for Unmatched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unmatched::Pass => f.write_str("pass"),
            Unmatched::Drop => f.write_str("drop"),
            Unmatched::Default(text) => write!(f, "default:{text}"),
        }
    }
}

impl FromStr for Unmatched {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(Unmatched::Pass),
            "drop" => Ok(Unmatched::Drop),
            other => other
                .strip_prefix("default:")
                .map(|text| Unmatched::Default(text.to_string()))
                .ok_or_else(|| SchemaError::InvalidValue {
                    attribute: "unmatched".to_string(),
                    value: other.to_string(),
                }),
        }
    }
}

/// Value rewriting table, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    entries: Vec<(String, String)>,
    unmatched: Unmatched,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    #[must_use]
    pub fn with_unmatched(mut self, unmatched: Unmatched) -> Self {
        self.unmatched = unmatched;
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn unmatched(&self) -> &Unmatched {
        &self.unmatched
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Apply the table to one value; `None` drops the value.
    pub fn rewrite(&self, value: &str) -> Option<String> {
        if let Some(mapped) = self.lookup(value) {
            return Some(mapped.to_string());
        }
        match &self.unmatched {
            Unmatched::Pass => Some(value.to_string()),
            Unmatched::Drop => None,
            Unmatched::Default(text) => Some(text.clone()),
        }
    }

    /// Keys that appear more than once, in first-seen order.
    pub fn duplicate_keys(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        let mut duplicates = Vec::new();
        for (key, _) in &self.entries {
            if seen.contains(&key.as_str()) {
                if !duplicates.contains(&key.as_str()) {
                    duplicates.push(key.as_str());
                }
            } else {
                seen.push(key.as_str());
            }
        }
        duplicates
    }
}

/// Mapping rule attached to one target-schema node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMapping {
    /// The first input is primary: its presence decides whether the target
    /// instance is produced.
    pub inputs: Vec<SourceInput>,
    pub operator: Operator,
    pub dictionary: Option<Dictionary>,
    /// Expression template; `None` copies the inputs through.
    pub expression: Option<String>,
}

impl NodeMapping {
    pub fn new(input: Path) -> Self {
        Self::from_inputs(vec![SourceInput::new(input)])
    }

    pub fn from_inputs(inputs: Vec<SourceInput>) -> Self {
        Self {
            inputs,
            operator: Operator::default(),
            dictionary: None,
            expression: None,
        }
    }

    #[must_use]
    pub fn with_input(mut self, input: SourceInput) -> Self {
        self.inputs.push(input);
        self
    }

    #[must_use]
    pub fn with_operator(mut self, operator: Operator) -> Self {
        self.operator = operator;
        self
    }

    #[must_use]
    pub fn with_dictionary(mut self, dictionary: Dictionary) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    #[must_use]
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    pub fn primary_input(&self) -> Option<&SourceInput> {
        self.inputs.first()
    }

    pub fn input(&self, name: &str) -> Option<&SourceInput> {
        self.inputs.iter().find(|input| input.name == name)
    }
}
