//! Statistics for the values found at one source path.

use sip_model::Path;
use tracing::debug;

use crate::error::{Result, StatsCapacityEvent};
use crate::histogram::Histogram;
use crate::options::StatsOptions;
use crate::sample::Sample;
use crate::uniqueness::Uniqueness;

#[derive(Debug)]
pub struct ValueStats {
    pub(crate) total: u64,
    pub(crate) values: Histogram,
    pub(crate) word_counts: Histogram,
    pub(crate) sample: Sample,
    /// Dropped at the first duplicate; the answer can no longer change.
    pub(crate) uniqueness: Option<Uniqueness>,
    pub(crate) unique: bool,
}

impl ValueStats {
    pub fn new(options: &StatsOptions) -> Self {
        Self {
            total: 0,
            values: Histogram::new(options.histogram_max_size, options.histogram_max_storage),
            word_counts: Histogram::new(options.histogram_max_size, options.histogram_max_storage),
            sample: Sample::new(options.sample_size, options.max_value_length, options.sample_seed),
            uniqueness: Some(Uniqueness::new(
                options.uniqueness_memory_budget,
                options.max_value_length,
            )),
            unique: true,
        }
    }

    /// Record one value seen at `path`, reporting any capacity event.
    pub fn record(
        &mut self,
        path: &Path,
        value: &str,
        events: &mut Vec<StatsCapacityEvent>,
    ) -> Result<()> {
        self.total += 1;

        let was_trimmed = self.values.is_trimmed();
        if let Some(kept) = self.values.record(value)
            && !was_trimmed
        {
            events.push(StatsCapacityEvent::HistogramTrimmed {
                path: Some(path.clone()),
                histogram: "values",
                kept,
            });
        }
        let words = value.split_whitespace().count().to_string();
        let was_trimmed = self.word_counts.is_trimmed();
        if let Some(kept) = self.word_counts.record(&words)
            && !was_trimmed
        {
            events.push(StatsCapacityEvent::HistogramTrimmed {
                path: Some(path.clone()),
                histogram: "word-count",
                kept,
            });
        }

        let was_full = self.sample.is_full();
        self.sample.record(value);
        if !was_full && self.sample.is_full() {
            events.push(StatsCapacityEvent::SampleFull {
                path: path.clone(),
                capacity: self.sample.capacity(),
            });
        }

        if let Some(uniqueness) = self.uniqueness.as_mut() {
            let (unseen, spilled) = uniqueness.check(value)?;
            if let Some(values) = spilled {
                events.push(StatsCapacityEvent::UniquenessSpilled {
                    path: path.clone(),
                    values,
                });
            }
            if !unseen {
                debug!(%path, "first duplicate value, uniqueness tracking stopped");
                self.unique = false;
                self.uniqueness = None;
            }
        }
        Ok(())
    }

    pub fn finish(&mut self) {
        self.values.finish(self.total);
        self.word_counts.finish(self.total);
        self.uniqueness = None;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn values(&self) -> &Histogram {
        &self.values
    }

    pub fn word_counts(&self) -> &Histogram {
        &self.word_counts
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    /// True while no value has been seen twice.
    pub fn is_unique(&self) -> bool {
        self.unique
    }
}

impl PartialEq for ValueStats {
    fn eq(&self, other: &Self) -> bool {
        self.total == other.total
            && self.unique == other.unique
            && self.values == other.values
            && self.word_counts == other.word_counts
            && self.sample == other.sample
    }
}
