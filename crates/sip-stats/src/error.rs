//! Error and capacity-event types for statistics gathering.

use std::fmt;

use sip_model::{ParseError, Path, PathError, XmlError};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StatsError {
    /// The uniqueness spill file or the aggregator thread failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Path(#[from] PathError),

    /// A statistics document does not have the expected layout.
    #[error("invalid statistics document: {message}")]
    InvalidDocument { message: String },

    /// The aggregator thread is gone; nothing more can be recorded.
    #[error("statistics aggregator has stopped")]
    AggregatorStopped,
}

impl StatsError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StatsError>;

/// A point where gathering gave up fidelity to stay within its memory bounds.
///
/// Not an error: the statistics stay valid, but are no longer exact for the
/// named field. Each event is reported once per field and structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsCapacityEvent {
    /// A histogram dropped its less frequent counters.
    HistogramTrimmed {
        path: Option<Path>,
        histogram: &'static str,
        kept: usize,
    },
    /// A sample reached capacity and started replacing members.
    SampleFull { path: Path, capacity: usize },
    /// A uniqueness set moved its values to disk.
    UniquenessSpilled { path: Path, values: usize },
}

impl fmt::Display for StatsCapacityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HistogramTrimmed {
                path: Some(path),
                histogram,
                kept,
            } => write!(f, "{histogram} histogram of {path} trimmed to {kept} counters"),
            Self::HistogramTrimmed {
                path: None,
                histogram,
                kept,
            } => write!(f, "{histogram} histogram trimmed to {kept} counters"),
            Self::SampleFull { path, capacity } => {
                write!(f, "sample of {path} is full at {capacity} values")
            }
            Self::UniquenessSpilled { path, values } => {
                write!(f, "uniqueness set of {path} spilled {values} values to disk")
            }
        }
    }
}
