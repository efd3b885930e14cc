//! Per-record field frequencies.

use std::collections::{BTreeMap, HashMap};

use sip_model::Path;

use crate::error::StatsCapacityEvent;
use crate::histogram::Histogram;
use crate::options::StatsOptions;

/// Counts field occurrences inside the current record and folds them into
/// histograms at every record end.
///
/// `field_count` maps "number of non-empty values in a record" to the number
/// of records with that many; each `frequencies` entry maps "occurrences of
/// this path in a record" to the number of records. Records without the path
/// end up as the histogram's absent count.
#[derive(Debug)]
pub struct RecordStats {
    pub(crate) records: u64,
    pub(crate) field_count: Histogram,
    pub(crate) frequencies: BTreeMap<Path, Histogram>,
    current: HashMap<Path, u64>,
    max_size: usize,
    max_storage: usize,
}

impl RecordStats {
    pub fn new(options: &StatsOptions) -> Self {
        Self::with_parts(
            options.histogram_max_size,
            options.histogram_max_storage,
            0,
            Histogram::new(options.histogram_max_size, options.histogram_max_storage),
            BTreeMap::new(),
        )
    }

    pub(crate) fn with_parts(
        max_size: usize,
        max_storage: usize,
        records: u64,
        field_count: Histogram,
        frequencies: BTreeMap<Path, Histogram>,
    ) -> Self {
        Self {
            records,
            field_count,
            frequencies,
            current: HashMap::new(),
            max_size,
            max_storage,
        }
    }

    pub fn record_field(&mut self, path: &Path) {
        *self.current.entry(path.clone()).or_insert(0) += 1;
    }

    /// Close the current record.
    pub fn record_end(&mut self, events: &mut Vec<StatsCapacityEvent>) {
        self.records += 1;
        let fields: u64 = self.current.values().sum();
        let was_trimmed = self.field_count.is_trimmed();
        if let Some(kept) = self.field_count.record(&fields.to_string())
            && !was_trimmed
        {
            events.push(StatsCapacityEvent::HistogramTrimmed {
                path: None,
                histogram: "field-count",
                kept,
            });
        }
        let (max_size, max_storage) = (self.max_size, self.max_storage);
        for (path, count) in self.current.drain() {
            let histogram = self
                .frequencies
                .entry(path.clone())
                .or_insert_with(|| Histogram::new(max_size, max_storage));
            let was_trimmed = histogram.is_trimmed();
            if let Some(kept) = histogram.record(&count.to_string())
                && !was_trimmed
            {
                events.push(StatsCapacityEvent::HistogramTrimmed {
                    path: Some(path),
                    histogram: "frequency",
                    kept,
                });
            }
        }
    }

    /// Finish every histogram against the record count.
    pub fn finish(&mut self) {
        self.field_count.finish(self.records);
        for histogram in self.frequencies.values_mut() {
            histogram.finish(self.records);
        }
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn field_count(&self) -> &Histogram {
        &self.field_count
    }

    pub fn frequency(&self, path: &Path) -> Option<&Histogram> {
        self.frequencies.get(path)
    }

    pub fn frequencies(&self) -> &BTreeMap<Path, Histogram> {
        &self.frequencies
    }
}

impl PartialEq for RecordStats {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
            && self.field_count == other.field_count
            && self.frequencies == other.frequencies
    }
}
