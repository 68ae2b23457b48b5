//! Alias resolver
//!
//! Calls inside a block talk to each other through storage: `openAsset(m,
//! n, &p)` writes `p`, and a later `getAssetBuffer(p)` reads what was
//! written. Naively turning both slots into parameters passes the *old*
//! value of `p` to the second call, so these pairs are tracked explicitly.
//!
//! Per occurrence, slots are scanned in order and linked in a
//! `petgraph::DiGraph`:
//!
//! - `&v` produces the storage of `v` ([`StorageKind::Variable`]);
//! - a bare `p` produces the pointee storage of `p`
//!   ([`StorageKind::Pointee`]) when a later slot reads through it and no
//!   earlier `&p` exists;
//! - a later slot rooted at the same variable consumes the storage of its
//!   nearest preceding producer.
//!
//! Every occurrence of a group must exhibit exactly the same edges. Mixed
//! aliased and non-aliased usage has no safe rewrite and is rejected with
//! [`DeinlineError::UnsupportedAliasing`].

use super::equivalence::Equivalence;
use super::slots::SlotTable;
use crate::config::FusionRule;
use crate::error::{DeinlineError, Result};
use crate::grouper::Group;
use crate::model::{Argument, Occurrence, Scope};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// Placeholder for the producer inside an access template
pub const ROOT: &str = "__root";

fn root_placeholder() -> Argument {
    // Global scope so templates only report frame variables of their indices
    Argument::Variable {
        name: ROOT.to_string(),
        scope: Scope::Global,
    }
}

/// What a producer writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StorageKind {
    /// The variable itself, written through `&v`
    Variable,
    /// What a pointer variable points to, written through a bare `p`
    Pointee,
}

/// How a consumer reads the produced storage
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessPath {
    Direct,
    Deref,
    Index(String),
    /// Casts and nested pointer expressions
    Compound(String),
}

impl AccessPath {
    pub fn of(template: &Argument) -> Self {
        match template {
            Argument::Variable { name, .. } if name == ROOT => AccessPath::Direct,
            Argument::Deref(inner) if is_root(inner) => AccessPath::Deref,
            Argument::Index { base, index } if is_root(base) => {
                AccessPath::Index(index.to_string())
            }
            other => AccessPath::Compound(other.to_string()),
        }
    }
}

fn is_root(arg: &Argument) -> bool {
    matches!(arg, Argument::Variable { name, .. } if name == ROOT)
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessPath::Direct => write!(f, "direct"),
            AccessPath::Deref => write!(f, "deref"),
            AccessPath::Index(k) => write!(f, "index {k}"),
            AccessPath::Compound(text) => write!(f, "{text}"),
        }
    }
}

/// Producer slot to consumer slot, by flat slot index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AliasEdge {
    pub producer: usize,
    pub consumer: usize,
    pub storage: StorageKind,

    /// Consumer argument with its root replaced by [`ROOT`]
    pub access: Argument,
}

impl AliasEdge {
    pub fn path(&self) -> AccessPath {
        AccessPath::of(&self.access)
    }
}

#[derive(Debug, Clone)]
struct EdgeInfo {
    storage: StorageKind,
    access: Argument,
}

/// Producer/consumer graph of one occurrence
#[derive(Debug, Clone)]
pub struct AliasGraph {
    graph: DiGraph<usize, EdgeInfo>,
    nodes: HashMap<usize, NodeIndex>,
}

impl AliasGraph {
    pub fn build(table: &SlotTable, occurrence: &Occurrence) -> Self {
        let mut graph = Self {
            graph: DiGraph::new(),
            nodes: HashMap::new(),
        };
        let mut variable_producer: HashMap<&str, usize> = HashMap::new();
        let mut pointee_producer: HashMap<&str, usize> = HashMap::new();
        let mut address_taken: HashSet<&str> = HashSet::new();

        for statement in 0..table.statement_count() {
            let range = table.statement_range(statement);

            // Consumers only see producers of earlier statements
            for slot in range.clone() {
                let arg = table.argument(occurrence, slot);
                let Some(root) = arg.root_variable() else {
                    continue;
                };
                if let Some(&producer) = variable_producer.get(root) {
                    graph.link(producer, slot, StorageKind::Variable, arg, root);
                } else if arg.reads_through_root() && !address_taken.contains(root) {
                    if let Some(&producer) = pointee_producer.get(root) {
                        graph.link(producer, slot, StorageKind::Pointee, arg, root);
                    }
                }
            }

            for slot in range {
                let arg = table.argument(occurrence, slot);
                if let Some((name, _)) = arg.address_of_variable() {
                    variable_producer.insert(name, slot);
                    address_taken.insert(name);
                    pointee_producer.remove(name);
                } else if let Argument::Variable { name, .. } = arg {
                    if !address_taken.contains(name.as_str()) {
                        pointee_producer.insert(name.as_str(), slot);
                    }
                }
            }
        }
        graph
    }

    fn node(&mut self, slot: usize) -> NodeIndex {
        *self
            .nodes
            .entry(slot)
            .or_insert_with(|| self.graph.add_node(slot))
    }

    fn link(
        &mut self,
        producer: usize,
        consumer: usize,
        storage: StorageKind,
        arg: &Argument,
        root: &str,
    ) {
        let from = self.node(producer);
        let to = self.node(consumer);
        let access = arg.substitute(root, &root_placeholder());
        self.graph.add_edge(from, to, EdgeInfo { storage, access });
    }

    pub fn edges(&self) -> BTreeSet<AliasEdge> {
        self.graph
            .edge_references()
            .map(|e| AliasEdge {
                producer: self.graph[e.source()],
                consumer: self.graph[e.target()],
                storage: e.weight().storage,
                access: e.weight().access.clone(),
            })
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// How a produced storage is carried into the synthesized function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    /// Same global in every occurrence: referenced directly
    Global,
    /// Non-escaping local: becomes a temporary of the function
    Localize,
    /// Producer becomes a parameter, consumers read through it
    Pointer,
}

/// A producer/consumer call pair replaced by one helper call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusedPair {
    /// Index of the producer statement; the consumer is the next one
    pub statement: usize,
    pub helper: String,
    /// Producer slots whose storage moves into the helper
    pub producers: Vec<usize>,
}

/// Alias facts shared by all occurrences of a group
#[derive(Debug, Clone, Default)]
pub struct AliasAnalysis {
    edges: Vec<AliasEdge>,
    by_consumer: HashMap<usize, usize>,
    consumers: BTreeMap<usize, Vec<usize>>,
    /// Resolution per producer meet class
    resolutions: BTreeMap<usize, Resolution>,
}

impl AliasAnalysis {
    /// Build and cross-check the alias graphs of a group
    pub fn resolve(group: &Group<'_>, table: &SlotTable, equivalence: &Equivalence) -> Result<Self> {
        let edge_sets: Vec<BTreeSet<AliasEdge>> = group
            .occurrences
            .iter()
            .map(|occ| AliasGraph::build(table, occ).edges())
            .collect();
        let Some(reference) = edge_sets.first() else {
            return Ok(Self::default());
        };

        check_consistency(group, table, &edge_sets)?;

        for edge in reference {
            if edge.access.references_frame_variable() {
                return Err(DeinlineError::UnsupportedAliasing {
                    group: group.id,
                    producer: table.slot(edge.producer),
                    consumer: table.slot(edge.consumer),
                    occurrences: group.points(),
                    reason: format!(
                        "consumer reads produced storage through a frame variable index ({})",
                        edge.path()
                    ),
                });
            }
        }

        let edges: Vec<AliasEdge> = reference.iter().cloned().collect();
        let mut by_consumer = HashMap::new();
        let mut consumers: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, edge) in edges.iter().enumerate() {
            by_consumer.insert(edge.consumer, i);
            consumers.entry(edge.producer).or_default().push(edge.consumer);
        }

        let mut analysis = Self {
            edges,
            by_consumer,
            consumers,
            resolutions: BTreeMap::new(),
        };
        let producer_classes: BTreeSet<usize> = analysis
            .consumers
            .keys()
            .map(|p| equivalence.class_of(*p))
            .collect();
        for class in producer_classes {
            let resolution = analysis.resolution_for(group, table, equivalence, class);
            debug!(
                group = group.id.0,
                producer = %table.slot(class),
                ?resolution,
                "resolved aliased storage"
            );
            analysis.resolutions.insert(class, resolution);
        }
        Ok(analysis)
    }

    fn resolution_for(
        &self,
        group: &Group<'_>,
        table: &SlotTable,
        equivalence: &Equivalence,
        class: usize,
    ) -> Resolution {
        if equivalence.is_constant(class) {
            return Resolution::Global;
        }
        let localizable = group.occurrences.iter().all(|occ| {
            matches!(
                table.argument(occ, class).address_of_variable(),
                Some((name, Scope::Local)) if !occ.is_live_out(name)
            )
        });
        if localizable {
            Resolution::Localize
        } else {
            Resolution::Pointer
        }
    }

    pub fn edges(&self) -> &[AliasEdge] {
        &self.edges
    }

    /// Edge binding a consumer slot, if it is one
    pub fn edge_for_consumer(&self, consumer: usize) -> Option<&AliasEdge> {
        self.by_consumer.get(&consumer).map(|&i| &self.edges[i])
    }

    pub fn consumers_of(&self, producer: usize) -> &[usize] {
        self.consumers
            .get(&producer)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_producer(&self, slot: usize) -> bool {
        self.consumers.contains_key(&slot)
    }

    /// Resolution of an aliased producer meet class
    pub fn resolution(&self, class: usize) -> Option<Resolution> {
        self.resolutions.get(&class).copied()
    }

    pub fn resolutions(&self) -> impl Iterator<Item = (usize, Resolution)> + '_ {
        self.resolutions.iter().map(|(c, r)| (*c, *r))
    }

    /// Adjacent producer/consumer calls matching a fusion rule whose storage
    /// can stay inside a helper in every occurrence
    ///
    /// Pairs are taken greedily left to right and never overlap.
    pub fn plan_fusions(
        &self,
        table: &SlotTable,
        equivalence: &Equivalence,
        rules: &[FusionRule],
    ) -> Vec<FusedPair> {
        let mut pairs = Vec::new();
        let mut statement = 0;
        while statement + 1 < table.statement_count() {
            let rule = rules.iter().find(|r| {
                r.matches(table.callee(statement), table.callee(statement + 1))
            });
            match rule.and_then(|r| self.fusable(table, equivalence, statement, r)) {
                Some(pair) => {
                    debug!(
                        statement,
                        helper = %pair.helper,
                        "fusing producer/consumer calls"
                    );
                    pairs.push(pair);
                    statement += 2;
                }
                None => statement += 1,
            }
        }
        pairs
    }

    fn fusable(
        &self,
        table: &SlotTable,
        equivalence: &Equivalence,
        statement: usize,
        rule: &FusionRule,
    ) -> Option<FusedPair> {
        let producer_range = table.statement_range(statement);
        let consumer_range = table.statement_range(statement + 1);
        let producers: Vec<usize> = producer_range
            .clone()
            .filter(|s| self.is_producer(*s))
            .collect();
        if producers.is_empty() {
            debug!(statement, rule = %rule.producer, "fusion rule matched without aliased storage");
            return None;
        }

        for &producer in &producers {
            let class = equivalence.class_of(producer);
            if self.resolution(class) != Some(Resolution::Localize) {
                return None;
            }
            for member in equivalence.members(class) {
                if !producer_range.contains(&member) {
                    return None;
                }
                if !self
                    .consumers_of(member)
                    .iter()
                    .all(|c| consumer_range.contains(c))
                {
                    return None;
                }
            }
        }

        Some(FusedPair {
            statement,
            helper: rule.helper_name(),
            producers,
        })
    }
}

fn check_consistency(
    group: &Group<'_>,
    table: &SlotTable,
    edge_sets: &[BTreeSet<AliasEdge>],
) -> Result<()> {
    let Some((reference, rest)) = edge_sets.split_first() else {
        return Ok(());
    };

    let mut conflicting = Vec::new();
    let mut first_difference: Option<(AliasEdge, String)> = None;
    for (i, edges) in rest.iter().enumerate() {
        if edges == reference {
            continue;
        }
        conflicting.push(group.occurrences[i + 1].point.clone());
        if first_difference.is_none() {
            first_difference = reference
                .symmetric_difference(edges)
                .next()
                .map(|edge| (edge.clone(), describe_difference(edge, reference, edges)));
        }
    }

    match first_difference {
        None => Ok(()),
        Some((edge, reason)) => {
            let mut occurrences = vec![group.occurrences[0].point.clone()];
            occurrences.extend(conflicting);
            Err(DeinlineError::UnsupportedAliasing {
                group: group.id,
                producer: table.slot(edge.producer),
                consumer: table.slot(edge.consumer),
                occurrences,
                reason,
            })
        }
    }
}

fn describe_difference(
    edge: &AliasEdge,
    reference: &BTreeSet<AliasEdge>,
    other: &BTreeSet<AliasEdge>,
) -> String {
    let binds = |set: &BTreeSet<AliasEdge>| set.iter().any(|e| e.consumer == edge.consumer);
    if binds(reference) && binds(other) {
        "consumer reads the storage through a different producer or access path".to_string()
    } else {
        "consumer reads produced storage in some occurrences only".to_string()
    }
}
