//! Block grouper
//!
//! Buckets occurrences whose statement sequences have the same callee names
//! and arities. Matching is exact: no fuzzy or partial matching and no
//! merging of overlapping groups.

use crate::model::{InsertionPoint, Occurrence};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Index of a group in first-appearance order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub usize);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group {}", self.0)
    }
}

/// Callee name and arity of one statement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSignature {
    pub name: String,
    pub arity: usize,
}

/// Occurrences sharing one statement signature sequence
#[derive(Debug, Clone)]
pub struct Group<'a> {
    pub id: GroupId,
    pub signature: Vec<CallSignature>,

    /// Positions of the occurrences in the input
    pub indices: Vec<usize>,
    pub occurrences: Vec<&'a Occurrence>,
}

impl<'a> Group<'a> {
    pub fn len(&self) -> usize {
        self.occurrences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }

    pub fn points(&self) -> Vec<InsertionPoint> {
        self.occurrences.iter().map(|o| o.point.clone()).collect()
    }

    /// Number of statements in each occurrence
    pub fn statement_count(&self) -> usize {
        self.signature.len()
    }
}

/// Result of grouping: groups plus the occurrences that formed none
#[derive(Debug, Clone)]
pub struct Grouping<'a> {
    pub groups: Vec<Group<'a>>,
    pub skipped: Vec<InsertionPoint>,
}

fn signature_of(occurrence: &Occurrence) -> Vec<CallSignature> {
    occurrence
        .statements
        .iter()
        .map(|s| CallSignature {
            name: s.name.clone(),
            arity: s.arity(),
        })
        .collect()
}

/// Group occurrences by exact call signature sequence
///
/// Group order is order of first appearance; occurrence order within a
/// group is input order. Empty occurrences are skipped.
pub fn group_occurrences(occurrences: &[Occurrence]) -> Grouping<'_> {
    let mut groups: Vec<Group<'_>> = Vec::new();
    let mut by_signature: HashMap<Vec<CallSignature>, usize> = HashMap::new();
    let mut skipped = Vec::new();

    for (index, occurrence) in occurrences.iter().enumerate() {
        if occurrence.is_empty() {
            debug!(point = %occurrence.point, "skipping empty occurrence");
            skipped.push(occurrence.point.clone());
            continue;
        }

        let signature = signature_of(occurrence);
        match by_signature.get(&signature) {
            Some(&slot) => {
                groups[slot].indices.push(index);
                groups[slot].occurrences.push(occurrence);
            }
            None => {
                let id = GroupId(groups.len());
                by_signature.insert(signature.clone(), groups.len());
                groups.push(Group {
                    id,
                    signature,
                    indices: vec![index],
                    occurrences: vec![occurrence],
                });
            }
        }
    }

    debug!(
        groups = groups.len(),
        occurrences = occurrences.len(),
        skipped = skipped.len(),
        "grouped occurrences"
    );
    Grouping { groups, skipped }
}
