use serde::{Deserialize, Serialize};

/// Memory bounds and sampling settings for statistics gathering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsOptions {
    /// Distinct values a histogram holds before trimming.
    pub histogram_max_size: usize,
    /// Bytes of value text a histogram holds before trimming.
    pub histogram_max_storage: usize,
    pub sample_size: usize,
    /// Values are cut to this many characters for samples and uniqueness.
    pub max_value_length: usize,
    /// Estimated heap bytes a uniqueness set may use before moving to disk.
    pub uniqueness_memory_budget: usize,
    /// Seed for sample admission; random when unset.
    pub sample_seed: Option<u64>,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self {
            histogram_max_size: 1000,
            histogram_max_storage: 256 * 1024,
            sample_size: 100,
            max_value_length: 500,
            uniqueness_memory_budget: 16 * 1024 * 1024,
            sample_seed: None,
        }
    }
}

impl StatsOptions {
    #[must_use]
    pub fn with_histogram_max_size(mut self, max_size: usize) -> Self {
        self.histogram_max_size = max_size;
        self
    }

    #[must_use]
    pub fn with_histogram_max_storage(mut self, max_storage: usize) -> Self {
        self.histogram_max_storage = max_storage;
        self
    }

    #[must_use]
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    #[must_use]
    pub fn with_max_value_length(mut self, max_value_length: usize) -> Self {
        self.max_value_length = max_value_length;
        self
    }

    #[must_use]
    pub fn with_uniqueness_memory_budget(mut self, budget: usize) -> Self {
        self.uniqueness_memory_budget = budget;
        self
    }

    #[must_use]
    pub fn with_sample_seed(mut self, seed: Option<u64>) -> Self {
        self.sample_seed = seed;
        self
    }
}
