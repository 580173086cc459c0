//! The property bag that selects shader permutations.

use crate::id_string::IdString;

/// A single `(key, value)` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Property {
    pub key: IdString,
    pub value: i32,
}

/// Sparse mapping from [`IdString`] keys to `i32` values.
///
/// Entries are kept sorted by key, so lookups are binary searches and two
/// stores holding the same properties always compare equal regardless of
/// the order they were set in. Missing keys read as `0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PropertyStore {
    entries: Vec<Property>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `key` or overwrite its value.
    pub fn set(&mut self, key: IdString, value: i32) {
        match self.entries.binary_search_by(|p| p.key.cmp(&key)) {
            Ok(idx) => self.entries[idx].value = value,
            Err(idx) => self.entries.insert(idx, Property { key, value }),
        }
    }

    /// Convenience for boolean flags.
    pub fn set_bool(&mut self, key: IdString, value: bool) {
        self.set(key, i32::from(value));
    }

    /// Value of `key`, or `0` when absent.
    pub fn get(&self, key: IdString) -> i32 {
        self.get_or(key, 0)
    }

    /// Value of `key`, or `default` when absent.
    pub fn get_or(&self, key: IdString, default: i32) -> i32 {
        self.entries
            .binary_search_by(|p| p.key.cmp(&key))
            .map(|idx| self.entries[idx].value)
            .unwrap_or(default)
    }

    /// True when `key` is present and non-zero.
    pub fn is_set(&self, key: IdString) -> bool {
        self.get(key) != 0
    }

    pub fn contains(&self, key: IdString) -> bool {
        self.entries.binary_search_by(|p| p.key.cmp(&key)).is_ok()
    }

    /// Remove `key`. Returns its previous value.
    pub fn unset(&mut self, key: IdString) -> Option<i32> {
        self.entries
            .binary_search_by(|p| p.key.cmp(&key))
            .ok()
            .map(|idx| self.entries.remove(idx).value)
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(IdString, i32) -> bool) {
        self.entries.retain(|p| keep(p.key, p.value));
    }

    /// Copy every entry of `other` into `self`, overwriting on conflict.
    pub fn merge_from(&mut self, other: &PropertyStore) {
        for p in &other.entries {
            self.set(p.key, p.value);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.entries.iter()
    }

    /// True when every entry of `self` exists in `other` with the same value.
    pub fn is_subset_of(&self, other: &PropertyStore) -> bool {
        self.entries
            .iter()
            .all(|p| other.contains(p.key) && other.get(p.key) == p.value)
    }
}

impl FromIterator<(IdString, i32)> for PropertyStore {
    fn from_iter<T: IntoIterator<Item = (IdString, i32)>>(iter: T) -> Self {
        let mut store = Self::new();
        for (key, value) in iter {
            store.set(key, value);
        }
        store
    }
}
