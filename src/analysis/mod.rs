//! Slot analyses over a group of occurrences
//!
//! - [`slots`]: flat numbering of argument positions
//! - [`equivalence`]: constant detection and cross-occurrence partitions
//! - [`alias`]: producer/consumer storage tracking and its resolutions

pub mod alias;
pub mod equivalence;
pub mod slots;

pub use alias::{
    AccessPath, AliasAnalysis, AliasEdge, AliasGraph, FusedPair, Resolution, StorageKind,
};
pub use equivalence::{Equivalence, Partition};
pub use slots::{Slot, SlotTable};

#[cfg(test)]
mod tests;
