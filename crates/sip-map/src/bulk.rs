//! Sequential mapping of a record stream.

use sip_model::MetadataRecord;
use tracing::info;

use crate::error::MappingError;
use crate::result::MappingResult;
use crate::runner::MappingRunner;

/// Successes and per-record failures of one bulk run.
#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub successes: Vec<MappingResult>,
    pub failures: Vec<MappingError>,
}

impl BulkOutcome {
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }
}

/// Applies one compiled crosswalk to every record in turn. A failing record
/// is collected and the run goes on.
#[derive(Debug, Clone)]
pub struct BulkMappingRunner {
    runner: MappingRunner,
}

impl BulkMappingRunner {
    pub fn new(runner: MappingRunner) -> Self {
        Self { runner }
    }

    pub fn run<I>(&self, records: I) -> BulkOutcome
    where
        I: IntoIterator<Item = MetadataRecord>,
    {
        let mut outcome = BulkOutcome::default();
        for record in records {
            match self.runner.run(&record) {
                Ok(result) => outcome.successes.push(result),
                Err(err) => outcome.failures.push(err),
            }
        }
        info!(
            successes = outcome.successes.len(),
            failures = outcome.failures.len(),
            "bulk mapping finished"
        );
        outcome
    }
}
