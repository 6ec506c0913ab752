use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use clap::ValueEnum;

use crate::opcodes::Opcode;
use crate::report::FIELD_DELIMITER;

/// Row ordering applied when a frequency table is reported.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub(crate) enum SortOrder {
    /// Descending count; ties keep first-seen order.
    #[default]
    Count,
    /// Ascending key order.
    Key,
}

/// Occurrence counts that remember the order keys were first seen in.
#[derive(Clone, Debug)]
pub(crate) struct FrequencyTable<K> {
    entries: Vec<(K, u64)>,
    index: HashMap<K, usize>,
}

impl<K> Default for FrequencyTable<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> FrequencyTable<K> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn increment(&mut self, key: K) {
        self.add(key, 1);
    }

    pub(crate) fn add(&mut self, key: K, amount: u64) {
        if let Some(slot) = self.index.get(&key) {
            self.entries[*slot].1 += amount;
            return;
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, amount));
    }

    pub(crate) fn total(&self) -> u64 {
        self.entries.iter().map(|(_, count)| count).sum()
    }

    /// Entries in first-seen order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&K, u64)> {
        self.entries.iter().map(|(key, count)| (key, *count))
    }

    /// Every entry sorted by descending count; ties keep first-seen order.
    pub(crate) fn by_count(&self) -> Vec<(K, u64)> {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        sorted
    }
}

impl<K: Eq + Hash + Clone + Ord> FrequencyTable<K> {
    pub(crate) fn sorted(&self, order: SortOrder) -> Vec<(K, u64)> {
        match order {
            SortOrder::Count => self.by_count(),
            SortOrder::Key => {
                let mut sorted = self.entries.clone();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                sorted
            }
        }
    }
}

/// Composite key for per-opcode site counts, e.g. `NEW` + `java/lang/StringBuilder`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub(crate) struct SiteKey {
    pub(crate) opcode: Opcode,
    pub(crate) target: String,
}

impl SiteKey {
    pub(crate) fn new(opcode: Opcode, target: impl Into<String>) -> Self {
        Self {
            opcode,
            target: target.into(),
        }
    }
}

impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.opcode, FIELD_DELIMITER, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_initialises_then_accumulates() {
        let mut table = FrequencyTable::new();
        table.increment("a");
        table.increment("b");
        table.increment("a");

        assert_eq!(vec![(&"a", 2), (&"b", 1)], table.iter().collect::<Vec<_>>());
        assert_eq!(3, table.total());
    }

    #[test]
    fn count_order_breaks_ties_by_first_seen() {
        let mut table = FrequencyTable::new();
        for key in ["z", "y", "x", "y"] {
            table.increment(key);
        }

        let sorted = table.sorted(SortOrder::Count);

        assert_eq!(vec![("y", 2), ("z", 1), ("x", 1)], sorted);
    }

    #[test]
    fn key_order_is_ascending() {
        let mut table = FrequencyTable::new();
        for key in ["z", "y", "x", "y"] {
            table.increment(key);
        }

        let sorted = table.sorted(SortOrder::Key);

        assert_eq!(vec![("x", 1), ("y", 2), ("z", 1)], sorted);
    }

    #[test]
    fn site_keys_group_by_opcode_and_target() {
        let mut table = FrequencyTable::new();
        table.increment(SiteKey::new(Opcode::NEW, "java/lang/Object"));
        table.increment(SiteKey::new(Opcode::NEW, "java/lang/Object"));
        table.increment(SiteKey::new(Opcode::ANEWARRAY, "java/lang/Object"));

        assert_eq!(
            vec![
                (SiteKey::new(Opcode::NEW, "java/lang/Object"), 2),
                (SiteKey::new(Opcode::ANEWARRAY, "java/lang/Object"), 1),
            ],
            table.by_count()
        );
        assert_eq!(
            "NEW,java/lang/Object",
            SiteKey::new(Opcode::NEW, "java/lang/Object").to_string()
        );
    }
}
