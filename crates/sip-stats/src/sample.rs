//! Fixed-capacity random sample of distinct values.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Once full, a new value is admitted with this probability (1 in 16).
const ADMIT_ONE_IN: u32 = 16;

#[derive(Debug, Clone)]
pub struct Sample {
    max_size: usize,
    max_value_length: usize,
    values: Vec<String>,
    evictions: u64,
    rng: StdRng,
}

/// Cut `value` to at most `max_length` characters.
pub(crate) fn truncate(value: &str, max_length: usize) -> &str {
    match value.char_indices().nth(max_length) {
        Some((end, _)) => &value[..end],
        None => value,
    }
}

impl Sample {
    /// A sample seeded from `seed`, or from the operating system when `None`.
    pub fn new(max_size: usize, max_value_length: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            max_size: max_size.max(1),
            max_value_length,
            values: Vec::new(),
            evictions: 0,
            rng,
        }
    }

    /// Offer a value. Returns true when it replaced an earlier member.
    pub fn record(&mut self, value: &str) -> bool {
        let value = truncate(value, self.max_value_length);
        if self.values.iter().any(|v| v == value) {
            return false;
        }
        if self.values.len() < self.max_size {
            self.values.push(value.to_string());
            return false;
        }
        if self.rng.random_range(0..ADMIT_ONE_IN) != 0 {
            return false;
        }
        let slot = self.rng.random_range(0..self.values.len());
        self.values[slot] = value.to_string();
        self.evictions += 1;
        true
    }

    pub fn is_full(&self) -> bool {
        self.values.len() >= self.max_size
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Members in sorted order.
    pub fn values(&self) -> Vec<&str> {
        let mut values: Vec<&str> = self.values.iter().map(String::as_str).collect();
        values.sort_unstable();
        values
    }

    pub(crate) fn restore(
        max_size: usize,
        max_value_length: usize,
        values: Vec<String>,
        evictions: u64,
    ) -> Self {
        let mut sample = Self::new(max_size, max_value_length, Some(0));
        sample.values = values;
        sample.evictions = evictions;
        sample
    }
}

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        self.max_size == other.max_size
            && self.evictions == other.evictions
            && self.values() == other.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_distinct_values_until_full() {
        let mut sample = Sample::new(3, 100, Some(7));
        for value in ["a", "b", "a", "c"] {
            assert!(!sample.record(value));
        }
        assert!(sample.is_full());
        assert_eq!(sample.values(), vec!["a", "b", "c"]);
    }

    #[test]
    fn admits_rarely_once_full() {
        let mut sample = Sample::new(2, 100, Some(42));
        sample.record("first");
        sample.record("second");
        let replaced = (0..1600)
            .filter(|n| sample.record(&format!("v{n}")))
            .count();
        assert_eq!(sample.values().len(), 2);
        assert_eq!(sample.evictions(), replaced as u64);
        assert!(replaced > 40 && replaced < 200, "replaced {replaced}");
    }

    #[test]
    fn truncates_on_characters() {
        let mut sample = Sample::new(5, 3, Some(1));
        sample.record("éèêë");
        assert_eq!(sample.values(), vec!["éèê"]);
        assert_eq!(truncate("ab", 3), "ab");
    }
}
