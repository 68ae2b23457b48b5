//! Value equivalence of slots
//!
//! Within one occurrence two slots are equivalent iff their argument trees
//! are structurally identical. Across occurrences identifiers are never
//! compared by name: two slots share a parameter only if they fall in the
//! same class in every occurrence (the meet of the per-occurrence
//! partitions). A slot is constant iff its argument is identical in every
//! occurrence and reads no local or param.

use super::slots::SlotTable;
use crate::model::{Argument, Occurrence};
use std::collections::HashMap;

/// Partition of one occurrence's slots, as the smallest equivalent index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    representative: Vec<usize>,
}

impl Partition {
    pub fn of(table: &SlotTable, occurrence: &Occurrence) -> Self {
        let mut first: HashMap<&Argument, usize> = HashMap::new();
        let representative = (0..table.len())
            .map(|i| *first.entry(table.argument(occurrence, i)).or_insert(i))
            .collect();
        Self { representative }
    }

    pub fn representative(&self, slot: usize) -> usize {
        self.representative[slot]
    }

    pub fn same_class(&self, a: usize, b: usize) -> bool {
        self.representative[a] == self.representative[b]
    }
}

/// Equivalence facts for all slots of a group
#[derive(Debug, Clone)]
pub struct Equivalence {
    partitions: Vec<Partition>,
    /// Meet class per slot, as the smallest slot index of the class
    class: Vec<usize>,
    constant: Vec<bool>,
}

impl Equivalence {
    pub fn analyze(table: &SlotTable, occurrences: &[&Occurrence]) -> Self {
        let partitions: Vec<Partition> = occurrences
            .iter()
            .map(|occ| Partition::of(table, occ))
            .collect();

        let mut by_key: HashMap<Vec<usize>, usize> = HashMap::new();
        let class = (0..table.len())
            .map(|i| {
                let key: Vec<usize> = partitions.iter().map(|p| p.representative(i)).collect();
                *by_key.entry(key).or_insert(i)
            })
            .collect();

        let constant = (0..table.len())
            .map(|i| match occurrences.split_first() {
                Some((first, rest)) => {
                    let arg = table.argument(first, i);
                    !arg.references_frame_variable()
                        && rest.iter().all(|occ| table.argument(occ, i) == arg)
                }
                None => false,
            })
            .collect();

        Self {
            partitions,
            class,
            constant,
        }
    }

    pub fn is_constant(&self, slot: usize) -> bool {
        self.constant[slot]
    }

    /// Meet class of a slot
    pub fn class_of(&self, slot: usize) -> usize {
        self.class[slot]
    }

    /// Slots of the meet class `class`, in slot order
    pub fn members(&self, class: usize) -> Vec<usize> {
        self.class
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == class)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn partition(&self, occurrence: usize) -> &Partition {
        &self.partitions[occurrence]
    }

    pub fn constant_count(&self) -> usize {
        self.constant.iter().filter(|c| **c).count()
    }
}
