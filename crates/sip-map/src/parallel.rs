//! Worker-pool mapping over bounded queues.
//!
//! The producer feeds records into a bounded input queue; a fixed pool of
//! workers, each holding its own copy of the compiled program, maps them and
//! pushes [`SingleJobResult`]s into a bounded output queue. Full queues block,
//! which gives back-pressure in both directions.
//!
//! Shutdown is a poison pill: closing the input sends one
//! [`Envelope::EndOfStream`] per worker. Each worker forwards its pill
//! downstream and stops, so the consumer knows the run is over once it has
//! seen one pill per worker. Results arrive in completion order and carry
//! their record identifier.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded};
use serde::{Deserialize, Serialize};
use sip_model::MetadataRecord;
use tracing::{debug, error, info, info_span};

use crate::error::{MappingError, ParallelError};
use crate::result::MappingResult;
use crate::runner::MappingRunner;

/// A queue item or the end-of-stream sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope<T> {
    Item(T),
    EndOfStream,
}

/// Outcome of mapping one record on a worker.
#[derive(Debug)]
pub enum SingleJobResult {
    Success(MappingResult),
    Failure(MappingError),
}

impl SingleJobResult {
    pub fn record_id(&self) -> &str {
        match self {
            SingleJobResult::Success(result) => result.record_id(),
            SingleJobResult::Failure(err) => err.record_id(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SingleJobResult::Success(_))
    }
}

impl From<Result<MappingResult, MappingError>> for SingleJobResult {
    fn from(result: Result<MappingResult, MappingError>) -> Self {
        match result {
            Ok(result) => SingleJobResult::Success(result),
            Err(err) => SingleJobResult::Failure(err),
        }
    }
}

/// Pool and queue sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelOptions {
    /// Worker threads; at least one is always started.
    pub workers: usize,
    pub input_capacity: usize,
    pub output_capacity: usize,
}

impl Default for ParallelOptions {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(1, usize::from),
            input_capacity: 64,
            output_capacity: 64,
        }
    }
}

impl ParallelOptions {
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_input_capacity(mut self, capacity: usize) -> Self {
        self.input_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = capacity;
        self
    }
}

pub struct ParallelMappingRunner;

impl ParallelMappingRunner {
    /// Start the worker pool. Each worker gets its own clone of `runner`.
    pub fn start(runner: &MappingRunner, options: &ParallelOptions) -> ParallelRun {
        let workers = options.workers.max(1);
        let (input_tx, input_rx) = bounded::<Envelope<MetadataRecord>>(options.input_capacity);
        let (output_tx, output_rx) = bounded::<Envelope<SingleJobResult>>(options.output_capacity);
        let handles = (0..workers)
            .map(|index| {
                let runner = runner.clone();
                let input = input_rx.clone();
                let output = output_tx.clone();
                thread::Builder::new()
                    .name(format!("sip-map-worker-{index}"))
                    .spawn(move || worker_loop(index, &runner, &input, &output))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(err) => {
                    error!(error = %err, "failed to spawn mapping worker");
                    None
                }
            })
            .collect::<Vec<_>>();
        info!(workers = handles.len(), "mapping workers started");
        ParallelRun {
            submitter: Some(JobSubmitter {
                input: input_tx,
                workers: handles.len(),
            }),
            results: ResultStream {
                output: output_rx,
                remaining: handles.len(),
                handles,
            },
        }
    }

    /// Map every record of `records` and collect all results.
    pub fn run_all<I>(runner: &MappingRunner, records: I, options: &ParallelOptions) -> Vec<SingleJobResult>
    where
        I: IntoIterator<Item = MetadataRecord>,
        I::IntoIter: Send,
    {
        let (submitter, results) = Self::start(runner, options).into_parts();
        let records = records.into_iter();
        thread::scope(|scope| {
            scope.spawn(move || {
                for record in records {
                    if submitter.submit(record).is_err() {
                        break;
                    }
                }
                submitter.finish();
            });
            results.collect()
        })
    }
}

fn worker_loop(
    index: usize,
    runner: &MappingRunner,
    input: &Receiver<Envelope<MetadataRecord>>,
    output: &Sender<Envelope<SingleJobResult>>,
) {
    let _span = info_span!("mapping_worker", worker = index).entered();
    let mut mapped = 0usize;
    loop {
        match input.recv() {
            Ok(Envelope::Item(record)) => {
                let result = SingleJobResult::from(runner.run(&record));
                mapped += 1;
                if output.send(Envelope::Item(result)).is_err() {
                    debug!("result consumer went away");
                    return;
                }
            }
            // A closed input without a pill still ends the worker cleanly.
            Ok(Envelope::EndOfStream) | Err(_) => break,
        }
    }
    debug!(records = mapped, "worker finished");
    let _ = output.send(Envelope::EndOfStream);
}

/// Producer half of a parallel run.
pub struct JobSubmitter {
    input: Sender<Envelope<MetadataRecord>>,
    workers: usize,
}

impl JobSubmitter {
    /// Queue one record, blocking while the input queue is full.
    pub fn submit(&self, record: MetadataRecord) -> Result<(), ParallelError> {
        self.input
            .send(Envelope::Item(record))
            .map_err(|_| ParallelError::WorkersStopped)
    }

    /// Close the input: one end-of-stream pill per worker.
    pub fn finish(self) {
        for _ in 0..self.workers {
            if self.input.send(Envelope::EndOfStream).is_err() {
                break;
            }
        }
    }
}

/// Consumer half of a parallel run: yields results until every worker has
/// forwarded its end-of-stream pill, then joins the workers.
pub struct ResultStream {
    output: Receiver<Envelope<SingleJobResult>>,
    remaining: usize,
    handles: Vec<JoinHandle<()>>,
}

impl ResultStream {
    fn join_workers(&mut self) {
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("mapping worker panicked");
            }
        }
    }
}

impl Iterator for ResultStream {
    type Item = SingleJobResult;

    fn next(&mut self) -> Option<SingleJobResult> {
        while self.remaining > 0 {
            match self.output.recv() {
                Ok(Envelope::Item(result)) => return Some(result),
                Ok(Envelope::EndOfStream) => self.remaining -= 1,
                // Every worker is gone, including any that died without a pill.
                Err(_) => self.remaining = 0,
            }
        }
        self.join_workers();
        None
    }
}

/// A started worker pool.
pub struct ParallelRun {
    submitter: Option<JobSubmitter>,
    results: ResultStream,
}

impl ParallelRun {
    pub fn workers(&self) -> usize {
        self.results.handles.len()
    }

    pub fn submit(&self, record: MetadataRecord) -> Result<(), ParallelError> {
        match &self.submitter {
            Some(submitter) => submitter.submit(record),
            None => Err(ParallelError::Closed),
        }
    }

    /// Send the end-of-stream pills. Later submissions fail.
    pub fn finish(&mut self) {
        if let Some(submitter) = self.submitter.take() {
            submitter.finish();
        }
    }

    /// Next result, or `None` once every worker has sent its pill.
    ///
    /// Only call this after [`finish`](Self::finish), or from a thread other
    /// than the producer, when the queues can fill up.
    pub fn next_result(&mut self) -> Option<SingleJobResult> {
        self.results.next()
    }

    /// Split into producer and consumer halves for use on separate threads.
    pub fn into_parts(mut self) -> (JobSubmitter, ResultStream) {
        let submitter = self.submitter.take().unwrap_or_else(|| JobSubmitter {
            input: bounded(0).0,
            workers: 0,
        });
        (submitter, self.results)
    }
}
