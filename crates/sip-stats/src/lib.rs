//! Bounded-memory statistics over metadata dumps.
//!
//! [`Stats`] collects, per source path, a value [`Histogram`], a word-count
//! histogram, a random [`Sample`] and a [`Uniqueness`] check, plus
//! [`RecordStats`] on how often each path occurs per record. Every structure
//! has a fixed memory bound; when one is reached it degrades (trims, evicts,
//! spills to disk) and reports a [`StatsCapacityEvent`].
//!
//! Statistics are fed from one thread. [`StatsAggregator`] runs that thread
//! and accepts events from any number of [`StatsFeeder`]s.

mod aggregator;
mod error;
mod histogram;
mod options;
mod record_stats;
mod sample;
mod stats;
mod uniqueness;
mod value_stats;

pub use aggregator::{StatsAggregator, StatsFeeder};
pub use error::{Result, StatsCapacityEvent, StatsError};
pub use histogram::{Counter, Histogram};
pub use options::StatsOptions;
pub use record_stats::RecordStats;
pub use sample::Sample;
pub use stats::Stats;
pub use uniqueness::{DiskSet, Uniqueness};
pub use value_stats::ValueStats;
