//! Crosswalk compiler and mapping runners.
//!
//! A [`RecMapping`](sip_model::RecMapping) is compiled once into a
//! [`Program`], then applied to each input record:
//!
//! - [`MappingRunner`] maps one record at a time
//! - [`BulkMappingRunner`] maps a stream sequentially, collecting failures
//! - [`ParallelMappingRunner`] spreads the stream over a worker pool
//!
//! Each produced document comes back as a [`MappingResult`], which also
//! exposes flattened field views and the required-field check.

pub mod bulk;
pub mod error;
pub mod escape;
pub mod expression;
pub mod generator;
pub mod parallel;
pub mod program;
pub mod result;
pub mod runner;

pub use bulk::{BulkMappingRunner, BulkOutcome};
pub use error::{
    CompileError, CompileWarning, MappingError, MissingFieldsError, ParallelError, Result,
};
pub use escape::{Escaper, Function};
pub use generator::{CompileOptions, RECORD_ID_VARIABLE, compile};
pub use parallel::{
    Envelope, JobSubmitter, ParallelMappingRunner, ParallelOptions, ParallelRun, ResultStream,
    SingleJobResult,
};
pub use program::{ElementOp, Iteration, Program};
pub use result::MappingResult;
pub use runner::MappingRunner;
