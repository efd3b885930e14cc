//! Distinctness tracking with a bounded heap.
//!
//! [`Uniqueness`] starts with an in-memory set. Once the estimated heap use
//! passes its budget, every value moves once to a [`DiskSet`]: the values go
//! to an anonymous temporary file and only their hashes and file offsets stay
//! in memory. Membership answers are the same before and after the move.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::hash::{BuildHasher, RandomState};
use std::io::{Read, Seek, SeekFrom, Write};
use std::mem;

use tracing::{debug, info};

use crate::error::Result;
use crate::sample::truncate;

/// Rough per-entry overhead of a `HashSet<String>` slot.
const ENTRY_OVERHEAD: usize = 48;

/// Set of strings whose contents live in a temporary file.
#[derive(Debug)]
pub struct DiskSet {
    file: File,
    end: u64,
    hasher: RandomState,
    /// Value hash to (offset, length) of every value with that hash.
    index: HashMap<u64, Vec<(u64, usize)>>,
    len: usize,
}

impl DiskSet {
    pub fn new() -> Result<Self> {
        Ok(Self {
            file: tempfile::tempfile()?,
            end: 0,
            hasher: RandomState::new(),
            index: HashMap::new(),
            len: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&mut self, value: &str) -> Result<bool> {
        let hash = self.hasher.hash_one(value);
        let Some(slots) = self.index.get(&hash) else {
            return Ok(false);
        };
        let slots = slots.clone();
        for (offset, length) in slots {
            if length == value.len() && self.read_at(offset, length)? == value.as_bytes() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Add `value`; returns false when it was already present.
    pub fn insert(&mut self, value: &str) -> Result<bool> {
        if self.contains(value)? {
            return Ok(false);
        }
        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(value.as_bytes())?;
        let hash = self.hasher.hash_one(value);
        self.index
            .entry(hash)
            .or_default()
            .push((self.end, value.len()));
        self.end += value.len() as u64;
        self.len += 1;
        Ok(true)
    }

    fn read_at(&mut self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; length];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[derive(Debug)]
enum Store {
    Memory { values: HashSet<String>, bytes: usize },
    Disk(DiskSet),
}

#[derive(Debug)]
pub struct Uniqueness {
    memory_budget: usize,
    max_value_length: usize,
    store: Store,
}

impl Uniqueness {
    pub fn new(memory_budget: usize, max_value_length: usize) -> Self {
        Self {
            memory_budget,
            max_value_length,
            store: Store::Memory {
                values: HashSet::new(),
                bytes: 0,
            },
        }
    }

    /// True when `value`, cut to the maximum length, has not been seen yet.
    ///
    /// Returns the number of values moved to disk alongside when this call
    /// crossed the memory budget.
    pub fn check(&mut self, value: &str) -> Result<(bool, Option<usize>)> {
        let value = truncate(value, self.max_value_length);
        let (unseen, over_budget) = match &mut self.store {
            Store::Memory { values, bytes } => {
                if values.contains(value) {
                    (false, false)
                } else {
                    *bytes += value.len() + ENTRY_OVERHEAD;
                    values.insert(value.to_string());
                    (true, *bytes > self.memory_budget)
                }
            }
            Store::Disk(disk) => (disk.insert(value)?, false),
        };
        let spilled = if over_budget { Some(self.spill()?) } else { None };
        Ok((unseen, spilled))
    }

    fn spill(&mut self) -> Result<usize> {
        let mut disk = DiskSet::new()?;
        if let Store::Memory { values, .. } = &mut self.store {
            for value in mem::take(values) {
                disk.insert(&value)?;
            }
        }
        let moved = disk.len();
        info!(values = moved, budget = self.memory_budget, "uniqueness set moved to disk");
        self.store = Store::Disk(disk);
        Ok(moved)
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self.store, Store::Disk(_))
    }

    pub fn len(&self) -> usize {
        match &self.store {
            Store::Memory { values, .. } => values.len(),
            Store::Disk(disk) => disk.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for Uniqueness {
    fn drop(&mut self) {
        if self.is_spilled() {
            debug!(values = self.len(), "released uniqueness spill file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_sighting_is_a_duplicate() {
        let mut uniqueness = Uniqueness::new(1 << 20, 100);
        assert_eq!(uniqueness.check("a").unwrap(), (true, None));
        assert_eq!(uniqueness.check("a").unwrap(), (false, None));
        assert!(!uniqueness.is_spilled());
    }

    #[test]
    fn truncated_values_collide() {
        let mut uniqueness = Uniqueness::new(1 << 20, 4);
        assert!(uniqueness.check("abcdX").unwrap().0);
        assert!(!uniqueness.check("abcdY").unwrap().0);
    }

    #[test]
    fn disk_set_compares_exactly() {
        let mut set = DiskSet::new().unwrap();
        assert!(set.insert("one").unwrap());
        assert!(set.insert("two").unwrap());
        assert!(!set.insert("one").unwrap());
        assert!(set.contains("two").unwrap());
        assert!(!set.contains("three").unwrap());
        assert_eq!(set.len(), 2);
    }
}
