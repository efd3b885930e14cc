//! Bounded frequency table.
//!
//! A [`Histogram`] counts occurrences per distinct value. When it holds more
//! than `max_size` distinct values, or their text exceeds `max_storage` bytes,
//! it keeps only its most frequent half and stays marked as trimmed for good.
//! Ordering everywhere is (count descending, value ascending), so the kept set
//! does not depend on insertion order among equal counts.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct Counter {
    pub value: String,
    pub count: u64,
    /// Share of the finishing total, 0 before [`Histogram::finish`].
    pub percentage: f64,
}

/// Totals fixed by [`Histogram::finish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Finished {
    total: u64,
    present: u64,
}

#[derive(Debug, Clone)]
pub struct Histogram {
    max_size: usize,
    max_storage: usize,
    storage: usize,
    counts: HashMap<String, u64>,
    trimmed: bool,
    finished: Option<Finished>,
}

fn by_frequency(a: (&String, &u64), b: (&String, &u64)) -> Ordering {
    b.1.cmp(a.1).then_with(|| a.0.cmp(b.0))
}

impl Histogram {
    pub fn new(max_size: usize, max_storage: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            max_storage,
            storage: 0,
            counts: HashMap::new(),
            trimmed: false,
            finished: None,
        }
    }

    /// Count one occurrence of `value`. Returns the number of counters kept
    /// when this call trimmed the histogram.
    pub fn record(&mut self, value: &str) -> Option<usize> {
        if self.finished.is_some() {
            debug!("value recorded on a finished histogram was ignored");
            return None;
        }
        match self.counts.get_mut(value) {
            Some(count) => *count += 1,
            None => {
                self.storage += value.len();
                self.counts.insert(value.to_string(), 1);
            }
        }
        if self.counts.len() > self.max_size || self.storage > self.max_storage {
            Some(self.trim())
        } else {
            None
        }
    }

    fn trim(&mut self) -> usize {
        let keep = (self.max_size / 2).max(1);
        let mut entries: Vec<(&String, &u64)> = self.counts.iter().collect();
        entries.sort_by(|a, b| by_frequency(*a, *b));
        let kept: HashMap<String, u64> = entries
            .into_iter()
            .take(keep)
            .map(|(value, count)| (value.clone(), *count))
            .collect();
        self.storage = kept.keys().map(String::len).sum();
        self.counts = kept;
        self.trimmed = true;
        self.counts.len()
    }

    /// Fix the totals. Later calls to [`record`](Self::record) are ignored,
    /// and finishing again keeps the first total.
    pub fn finish(&mut self, total: u64) {
        if self.finished.is_some() {
            return;
        }
        let present = self.counts.values().sum();
        self.finished = Some(Finished { total, present });
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    pub fn is_trimmed(&self) -> bool {
        self.trimmed
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of distinct values currently counted.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn count(&self, value: &str) -> u64 {
        self.counts.get(value).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.finished.map_or(0, |f| f.total)
    }

    /// Sum of all kept counts.
    pub fn present(&self) -> u64 {
        self.finished
            .map_or_else(|| self.counts.values().sum(), |f| f.present)
    }

    /// Occurrences the total accounts for that no kept counter does.
    pub fn absent(&self) -> u64 {
        self.finished
            .map_or(0, |f| f.total.saturating_sub(f.present))
    }

    pub fn counters(&self) -> Vec<Counter> {
        let total = self.total();
        let mut entries: Vec<(&String, &u64)> = self.counts.iter().collect();
        entries.sort_by(|a, b| by_frequency(*a, *b));
        entries
            .into_iter()
            .map(|(value, count)| Counter {
                value: value.clone(),
                count: *count,
                percentage: if total == 0 {
                    0.0
                } else {
                    *count as f64 * 100.0 / total as f64
                },
            })
            .collect()
    }

    /// Rebuild a finished histogram from written counters.
    pub(crate) fn restore(
        max_size: usize,
        max_storage: usize,
        counters: impl IntoIterator<Item = (String, u64)>,
        total: u64,
        trimmed: bool,
    ) -> Self {
        let counts: HashMap<String, u64> = counters.into_iter().collect();
        let present = counts.values().sum();
        Self {
            max_size: max_size.max(1),
            max_storage,
            storage: counts.keys().map(String::len).sum(),
            counts,
            trimmed,
            finished: Some(Finished { total, present }),
        }
    }
}

/// Equal when the counts, totals and trimmed flag agree; the limits a
/// histogram was built with do not take part.
impl PartialEq for Histogram {
    fn eq(&self, other: &Self) -> bool {
        self.counts == other.counts
            && self.trimmed == other.trimmed
            && self.finished == other.finished
    }
}
