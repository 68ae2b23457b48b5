//! Argument positions of a group's statement signature

use crate::grouper::Group;
use crate::model::{Argument, Occurrence};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// `(statement index, argument index)` within a group's signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot {
    pub statement: usize,
    pub argument: usize,
}

impl Slot {
    pub fn new(statement: usize, argument: usize) -> Self {
        Self {
            statement,
            argument,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.statement, self.argument)
    }
}

/// Flattened slot numbering, statement-major
///
/// Analyses index slots by their flat position so per-occurrence data can
/// live in plain vectors.
#[derive(Debug, Clone)]
pub struct SlotTable {
    slots: Vec<Slot>,
    /// First flat index of each statement, plus the total at the end
    offsets: Vec<usize>,
    callees: Vec<String>,
}

impl SlotTable {
    pub fn for_group(group: &Group<'_>) -> Self {
        let mut slots = Vec::new();
        let mut offsets = Vec::with_capacity(group.signature.len() + 1);
        for (statement, sig) in group.signature.iter().enumerate() {
            offsets.push(slots.len());
            slots.extend((0..sig.arity).map(|argument| Slot::new(statement, argument)));
        }
        offsets.push(slots.len());
        Self {
            slots,
            offsets,
            callees: group.signature.iter().map(|s| s.name.clone()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> Slot {
        self.slots[index]
    }

    pub fn index_of(&self, slot: Slot) -> usize {
        self.offsets[slot.statement] + slot.argument
    }

    /// Flat indices of the arguments of one statement
    pub fn statement_range(&self, statement: usize) -> Range<usize> {
        self.offsets[statement]..self.offsets[statement + 1]
    }

    pub fn statement_count(&self) -> usize {
        self.callees.len()
    }

    pub fn callee(&self, statement: usize) -> &str {
        &self.callees[statement]
    }

    /// Argument of an occurrence at a flat slot index
    pub fn argument<'o>(&self, occurrence: &'o Occurrence, index: usize) -> &'o Argument {
        let slot = self.slots[index];
        &occurrence.statements[slot.statement].args[slot.argument]
    }
}
