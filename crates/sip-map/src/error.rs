//! Error types for compiling and running crosswalks.

use std::fmt;

use sip_model::Path;
use thiserror::Error;

/// Structural problems found while compiling a crosswalk.
///
/// Compilation stops at the first one; no record is processed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompileError {
    #[error("node mapping for {output} has no inputs")]
    NoInputs { output: Path },

    #[error("output {output} is not part of the record definition")]
    UnknownTarget { output: Path },

    #[error("input {path} of {output} is not a known source path")]
    UnresolvedSource { output: Path, path: Path },

    #[error("input {found} of {output} does not start at record root {expected}")]
    InconsistentSourceRoot {
        output: Path,
        expected: String,
        found: Path,
    },

    #[error("expression of {output} refers to unknown variable '{name}'")]
    UnknownVariable { output: Path, name: String },

    #[error("expression of {output} uses unknown function '{name}'")]
    UnknownFunction { output: Path, name: String },

    #[error("function '{function}' in expression of {output} needs an argument")]
    MissingArgument { output: Path, function: String },

    #[error("invalid expression for {output}: {reason}")]
    InvalidExpression { output: Path, reason: String },

    #[error("field type '{field_type}' of {output} is not defined")]
    UnknownFieldType { output: Path, field_type: String },

    #[error("dictionary of {output} has duplicate key '{key}'")]
    DuplicateDictionaryKey { output: Path, key: String },
}

impl CompileError {
    /// The output path the problem was found on.
    pub fn output(&self) -> &Path {
        match self {
            Self::NoInputs { output }
            | Self::UnknownTarget { output }
            | Self::UnresolvedSource { output, .. }
            | Self::InconsistentSourceRoot { output, .. }
            | Self::UnknownVariable { output, .. }
            | Self::UnknownFunction { output, .. }
            | Self::MissingArgument { output, .. }
            | Self::InvalidExpression { output, .. }
            | Self::UnknownFieldType { output, .. }
            | Self::DuplicateDictionaryKey { output, .. } => output,
        }
    }
}

/// Non-fatal findings kept on a compiled program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileWarning {
    /// A required target has no mapping anywhere in its subtree.
    RequiredUnmapped { output: Path },
    /// An expression never mentions one of the mapping's inputs.
    UnusedInput { output: Path, name: String },
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequiredUnmapped { output } => {
                write!(f, "required target {output} is not mapped")
            }
            Self::UnusedInput { output, name } => {
                write!(f, "input '{name}' of {output} is not used by its expression")
            }
        }
    }
}

/// One record failed to map. The compiled program stays usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MappingError {
    #[error("record {record_id}: root element <{found}> does not match <{expected}>")]
    UnexpectedRoot {
        record_id: String,
        expected: String,
        found: String,
    },

    #[error("record {record_id}: no value for '{name}' in expression of {output}")]
    MissingValue {
        record_id: String,
        output: Path,
        name: String,
    },

    #[error("record {record_id}: '{value}' for {output} is not a number")]
    InvalidNumber {
        record_id: String,
        output: Path,
        value: String,
    },
}

impl MappingError {
    pub fn record_id(&self) -> &str {
        match self {
            Self::UnexpectedRoot { record_id, .. }
            | Self::MissingValue { record_id, .. }
            | Self::InvalidNumber { record_id, .. } => record_id,
        }
    }
}

/// Required targets absent from a produced document.
///
/// Advisory: the document is still complete and can be written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("record {record_id} is missing required fields: {}", render_paths(.missing))]
pub struct MissingFieldsError {
    pub record_id: String,
    /// Every missing target path, in path order.
    pub missing: Vec<Path>,
}

fn render_paths(paths: &[Path]) -> String {
    paths
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The parallel runner can no longer accept work.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelError {
    #[error("all mapping workers have stopped")]
    WorkersStopped,
    #[error("input has already been closed")]
    Closed,
}

/// Result type alias for compilation.
pub type Result<T> = std::result::Result<T, CompileError>;
