//! Error types for addressing, schema and record parsing.

use thiserror::Error;

use crate::xml::XmlError;

/// Errors from building or combining paths and tags.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Tag text is empty or contains characters that cannot appear in a name.
    #[error("invalid tag '{tag}'")]
    InvalidTag { tag: String },

    /// Path text does not start with '/'.
    #[error("path must start with '/': '{text}'")]
    NotAbsolute { text: String },

    /// Path text contains an empty step such as `//` or a trailing slash.
    #[error("empty step in path '{text}'")]
    EmptyStep { text: String },

    /// Attribute steps can only terminate a path.
    #[error("attribute step '{tag}' must be the last step of '{path}'")]
    AttributeNotLast { tag: String, path: String },

    /// `extend_ancestor` was called with a path that is not a prefix.
    #[error("'{ancestor}' is not an ancestor of '{path}'")]
    NotAnAncestor { ancestor: String, path: String },

    /// `take_first` asked for more tags than the path holds.
    #[error("cannot take {count} tags from '{path}' of size {size}")]
    OutOfRange {
        path: String,
        count: usize,
        size: usize,
    },
}

/// Errors from reading a record definition or a crosswalk document.
///
/// All of these are fatal: they abort before any record is processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The document is not well-formed XML.
    #[error(transparent)]
    Xml(#[from] XmlError),

    /// A path or tag inside the document is malformed.
    #[error(transparent)]
    Path(#[from] PathError),

    /// An element appeared where the document layout does not allow it.
    #[error("unexpected element <{element}> in {context}")]
    UnexpectedElement {
        element: String,
        context: &'static str,
    },

    /// A required attribute is missing.
    #[error("element <{element}> is missing attribute '{attribute}'")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },

    /// An attribute value could not be interpreted.
    #[error("invalid value '{value}' for '{attribute}'")]
    InvalidValue { attribute: String, value: String },

    /// The record definition has no `<root>` element.
    #[error("record definition has no root element")]
    MissingRoot,

    /// Two schema nodes resolve to the same path.
    #[error("duplicate path {path} in record definition")]
    DuplicatePath { path: String },

    /// An attribute node declares children.
    #[error("attribute {path} cannot have children")]
    AttributeWithChildren { path: String },

    /// An attribute node is marked repeatable.
    #[error("attribute {path} cannot be repeatable")]
    RepeatableAttribute { path: String },

    /// A reference points outside the record-definition tree.
    #[error("path {path} is not part of the record definition")]
    UnknownPath { path: String },

    /// The crosswalk was written for another record definition.
    #[error("mapping prefix '{found}' does not match record definition '{expected}'")]
    PrefixMismatch { expected: String, found: String },
}

/// Errors from streaming records out of a metadata dump.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The dump is not well-formed XML. The stream ends after this error.
    #[error(transparent)]
    Xml(#[from] XmlError),

    /// An element or attribute name is not a valid tag.
    #[error(transparent)]
    Path(#[from] PathError),

    /// The configured unique element is absent or empty in a record.
    #[error("record #{record_number} has no value at {unique_element}")]
    MissingIdentifier {
        record_number: usize,
        unique_element: String,
    },
}

/// Result type alias for schema and crosswalk loading.
pub type Result<T> = std::result::Result<T, SchemaError>;
