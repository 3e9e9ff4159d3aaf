//! Fixed-capacity, insertion-ordered map.
//!
//! Keys are never evicted. Once `capacity` distinct keys are present, new keys
//! are refused and counted in [`BoundedTable::dropped`]; existing entries stay
//! writable.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::CorrelateError;

#[derive(Debug, Clone)]
pub struct BoundedTable<K, V> {
    capacity: usize,
    index: HashMap<K, usize>,
    entries: Vec<(K, V)>,
    dropped: u64,
}

impl<K: Copy + Eq + Hash, V> BoundedTable<K, V> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            index: HashMap::with_capacity(capacity),
            entries: Vec::with_capacity(capacity),
            dropped: 0,
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        match self.index.get(key) {
            Some(&i) => Some(&mut self.entries[i].1),
            None => None,
        }
    }

    /// Returns the entry for `key`, creating it with `init` if there is room.
    pub fn get_or_insert_with(
        &mut self,
        key: K,
        init: impl FnOnce() -> V,
    ) -> Result<&mut V, CorrelateError> {
        let i = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                if self.entries.len() >= self.capacity {
                    self.dropped += 1;
                    return Err(CorrelateError::TableFull {
                        capacity: self.capacity,
                    });
                }
                self.entries.push((key, init()));
                let i = self.entries.len() - 1;
                self.index.insert(key, i);
                i
            }
        };
        Ok(&mut self.entries[i].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of new keys refused because the table was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}
