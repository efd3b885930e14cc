//! Single-writer statistics thread.
//!
//! Any number of [`StatsFeeder`]s send record events over one bounded channel
//! to a thread that owns the [`Stats`]. Send whole records through
//! [`StatsFeeder::record`] when several producers run at once, so that their
//! values never interleave inside one record.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, bounded};
use sip_model::{Node, Path};
use tracing::{info_span, warn};

use crate::error::{Result, StatsError};
use crate::options::StatsOptions;
use crate::stats::Stats;

#[derive(Debug)]
enum StatsEvent {
    Value { path: Path, value: String },
    RecordEnd,
    Record(Node),
    Finish,
}

/// Cloneable handle that feeds the aggregator thread.
#[derive(Debug, Clone)]
pub struct StatsFeeder {
    sender: Sender<StatsEvent>,
}

impl StatsFeeder {
    fn send(&self, event: StatsEvent) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|_| StatsError::AggregatorStopped)
    }

    pub fn value(&self, path: Path, value: impl Into<String>) -> Result<()> {
        self.send(StatsEvent::Value {
            path,
            value: value.into(),
        })
    }

    pub fn record_end(&self) -> Result<()> {
        self.send(StatsEvent::RecordEnd)
    }

    /// Send one whole record tree.
    pub fn record(&self, root: Node) -> Result<()> {
        self.send(StatsEvent::Record(root))
    }
}

/// Owner of the aggregator thread.
pub struct StatsAggregator {
    feeder: StatsFeeder,
    handle: JoinHandle<Result<Stats>>,
}

impl StatsAggregator {
    /// Start the aggregator with a channel of `capacity` pending events.
    pub fn spawn(options: StatsOptions, capacity: usize) -> Result<Self> {
        let (sender, receiver) = bounded::<StatsEvent>(capacity);
        let handle = thread::Builder::new()
            .name("sip-stats".to_string())
            .spawn(move || {
                let _span = info_span!("stats_aggregator").entered();
                let mut stats = Stats::new(options);
                // The loop also ends when every feeder is dropped.
                for event in receiver {
                    match event {
                        StatsEvent::Value { path, value } => stats.record_value(&path, &value)?,
                        StatsEvent::RecordEnd => stats.record_record_end(),
                        StatsEvent::Record(root) => stats.record_node(&root)?,
                        StatsEvent::Finish => break,
                    }
                }
                stats.finish();
                Ok(stats)
            })?;
        Ok(Self {
            feeder: StatsFeeder { sender },
            handle,
        })
    }

    pub fn feeder(&self) -> StatsFeeder {
        self.feeder.clone()
    }

    /// Stop taking events, wait for the thread and return finished
    /// statistics. Events sent by other feeders afterwards fail with
    /// [`StatsError::AggregatorStopped`].
    pub fn finish(self) -> Result<Stats> {
        // A failed send means the thread already stopped; join reports why.
        let _ = self.feeder.send(StatsEvent::Finish);
        drop(self.feeder);
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => {
                warn!("statistics aggregator panicked");
                Err(StatsError::AggregatorStopped)
            }
        }
    }
}
