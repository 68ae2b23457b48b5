//! Pipeline driver
//!
//! ```text
//! Occurrences ─► group ─► per group (rayon):
//!                           slots ─► equivalence ─► alias ─► coalesce ─► synth
//!             ─► assemble in group order ─► Deinlined
//! ```
//!
//! Groups are shared-nothing. Parallel processing collects results in group
//! order, so the output is identical with or without `parallel`.

use crate::analysis::{AliasAnalysis, Equivalence, SlotTable};
use crate::coalesce::{coalesce, TypeContext};
use crate::config::{DeinlineConfig, Prototypes};
use crate::ctype::CType;
use crate::error::{DeinlineError, Result};
use crate::grouper::{group_occurrences, Group, GroupId};
use crate::model::{InsertionPoint, Occurrence, SymbolTable};
use crate::synth::{synthesize, CallSite, GroupSynthesis, Replacement, SynthesizedFunction};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Result of deinlining a set of occurrences
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Deinlined {
    /// One function per replaced group, in group order
    pub functions: Vec<SynthesizedFunction>,

    /// Fused-call helpers, each distinct definition once
    pub helpers: Vec<SynthesizedFunction>,

    /// One entry per grouped occurrence, in input order
    pub call_sites: Vec<CallSite>,

    /// Occurrences without statements
    pub skipped: Vec<InsertionPoint>,
}

impl Deinlined {
    /// Statements of all grouped occurrences before rewriting
    pub fn original_statement_count(&self) -> usize {
        self.call_sites
            .iter()
            .map(|site| match &site.replacement {
                Replacement::Inline(statements) => statements.len(),
                Replacement::Call(_) => self
                    .function_for(site.group)
                    .map_or(0, |f| f.body.len() + self.fused_statements(f)),
            })
            .sum()
    }

    /// Statements after rewriting, counting each definition once
    pub fn rewritten_statement_count(&self) -> usize {
        let sites: usize = self
            .call_sites
            .iter()
            .map(|s| s.replacement.statement_count())
            .sum();
        let bodies: usize = self
            .functions
            .iter()
            .chain(self.helpers.iter())
            .map(|f| f.body.len())
            .sum();
        sites + bodies
    }

    /// Original over rewritten statement count, 1.0 for empty input
    pub fn compression_ratio(&self) -> f64 {
        let rewritten = self.rewritten_statement_count();
        if rewritten == 0 {
            return 1.0;
        }
        self.original_statement_count() as f64 / rewritten as f64
    }

    pub fn function_for(&self, group: GroupId) -> Option<&SynthesizedFunction> {
        self.functions.iter().find(|f| f.group == Some(group))
    }

    /// Extra statements hidden in helper calls of a function body
    fn fused_statements(&self, function: &SynthesizedFunction) -> usize {
        function
            .body
            .iter()
            .filter(|s| self.helpers.iter().any(|h| h.name == s.name))
            .count()
    }
}

/// Best-effort result: what could be deinlined plus what could not
#[derive(Debug, Clone, Default)]
pub struct DeinlineReport {
    pub output: Deinlined,

    /// Parse failures and failed groups, in input and group order
    pub errors: Vec<DeinlineError>,
}

impl DeinlineReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let errors: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        serde_json::to_string_pretty(&serde_json::json!({
            "output": self.output,
            "errors": errors,
            "compression_ratio": self.output.compression_ratio(),
        }))
    }
}

enum GroupOutcome {
    Replaced(GroupSynthesis),
    /// Below the occurrence threshold
    Inline,
}

/// Factors groups of isomorphic occurrences into shared functions
///
/// # Example
/// ```
/// use deinliner::{DeinlineConfig, Deinliner, Occurrence};
///
/// let occurrences = vec![
///     Occurrence::parse("f1", &["a(0);", "b(1);"]).unwrap(),
///     Occurrence::parse("f2", &["a(0);", "b(2);"]).unwrap(),
/// ];
/// let deinliner = Deinliner::new(DeinlineConfig::default()).unwrap();
/// let out = deinliner.run(&occurrences).unwrap();
/// assert_eq!(out.functions[0].prototype(), "void subframe0(int param_int_0)");
/// assert_eq!(out.call_sites[1].to_string(), "subframe0(2);");
/// ```
#[derive(Debug, Clone)]
pub struct Deinliner {
    config: DeinlineConfig,
    prototypes: Prototypes,
    fallback: CType,
    symbols: SymbolTable,
}

impl Deinliner {
    pub fn new(config: DeinlineConfig) -> Result<Self> {
        config.validate()?;
        let prototypes = Prototypes::from_config(&config.prototypes)?;
        let fallback = config.fallback()?;
        Ok(Self {
            config,
            prototypes,
            fallback,
            symbols: SymbolTable::new(),
        })
    }

    /// Declarations visible to every occurrence, searched after the
    /// occurrence's own
    pub fn with_symbols(mut self, symbols: SymbolTable) -> Self {
        self.symbols = symbols;
        self
    }

    /// Deinline every group, failing on the first error in group order
    pub fn run(&self, occurrences: &[Occurrence]) -> Result<Deinlined> {
        let grouping = group_occurrences(occurrences);
        let outcomes = self.process_groups(&grouping.groups);

        let mut resolved = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            resolved.push(outcome?);
        }
        Ok(self.assemble(occurrences.len(), &grouping.groups, resolved, grouping.skipped))
    }

    /// Deinline what can be; failed groups stay inline and are reported
    pub fn run_report(&self, occurrences: &[Occurrence]) -> DeinlineReport {
        let grouping = group_occurrences(occurrences);
        let outcomes = self.process_groups(&grouping.groups);

        let mut errors = Vec::new();
        let resolved = outcomes
            .into_iter()
            .zip(&grouping.groups)
            .map(|(outcome, group)| match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(group = group.id.0, error = %e, "leaving group inline");
                    errors.push(e);
                    GroupOutcome::Inline
                }
            })
            .collect();

        DeinlineReport {
            output: self.assemble(occurrences.len(), &grouping.groups, resolved, grouping.skipped),
            errors,
        }
    }

    /// Parse raw statement lines, then deinline in report mode
    ///
    /// Occurrences that fail to parse are reported and excluded.
    pub fn run_source<S: AsRef<str>>(&self, sources: &[(InsertionPoint, Vec<S>)]) -> DeinlineReport {
        let mut occurrences = Vec::with_capacity(sources.len());
        let mut parse_errors = Vec::new();
        for (point, lines) in sources {
            match Occurrence::parse(point.clone(), lines) {
                Ok(occurrence) => occurrences.push(occurrence),
                Err(e) => {
                    warn!(point = %point, error = %e, "excluding unparsable occurrence");
                    parse_errors.push(e);
                }
            }
        }

        let mut report = self.run_report(&occurrences);
        parse_errors.append(&mut report.errors);
        report.errors = parse_errors;
        report
    }

    fn process_groups(&self, groups: &[Group<'_>]) -> Vec<Result<GroupOutcome>> {
        if self.config.parallel {
            groups.par_iter().map(|g| self.process_group(g)).collect()
        } else {
            groups.iter().map(|g| self.process_group(g)).collect()
        }
    }

    fn process_group(&self, group: &Group<'_>) -> Result<GroupOutcome> {
        if group.len() < self.config.min_occurrences {
            debug!(
                group = group.id.0,
                occurrences = group.len(),
                min = self.config.min_occurrences,
                "group below occurrence threshold"
            );
            return Ok(GroupOutcome::Inline);
        }

        let ctx = TypeContext {
            prototypes: &self.prototypes,
            symbols: &self.symbols,
            fallback: &self.fallback,
        };
        let table = SlotTable::for_group(group);
        let equivalence = Equivalence::analyze(&table, &group.occurrences);
        let aliases = AliasAnalysis::resolve(group, &table, &equivalence)?;
        let coalesced = coalesce(
            group,
            &table,
            &equivalence,
            &aliases,
            &self.config.fusions,
            ctx,
        )?;
        let name = format!("{}{}", self.config.function_prefix, group.id.0);
        Ok(GroupOutcome::Replaced(synthesize(
            name, group, &table, &coalesced, ctx,
        )))
    }

    fn assemble(
        &self,
        input_len: usize,
        groups: &[Group<'_>],
        outcomes: Vec<GroupOutcome>,
        skipped: Vec<InsertionPoint>,
    ) -> Deinlined {
        let mut sites: Vec<Option<CallSite>> = vec![None; input_len];
        let mut functions = Vec::new();
        let mut helpers: Vec<SynthesizedFunction> = Vec::new();

        for (group, outcome) in groups.iter().zip(outcomes) {
            match outcome {
                GroupOutcome::Inline => {
                    for (&index, occurrence) in group.indices.iter().zip(&group.occurrences) {
                        sites[index] = Some(CallSite::inline(
                            occurrence.point.clone(),
                            group.id,
                            occurrence,
                        ));
                    }
                }
                GroupOutcome::Replaced(synthesis) => {
                    let mut function = synthesis.function;
                    let fused = synthesis.helpers.into_iter().zip(synthesis.helper_sites);
                    for (helper, site) in fused {
                        let original = helper.name.clone();
                        let name = merge_helper(&mut helpers, helper);
                        if name != original {
                            function.rename_call(site, &name);
                        }
                    }
                    for ((&index, occurrence), call) in group
                        .indices
                        .iter()
                        .zip(&group.occurrences)
                        .zip(synthesis.calls)
                    {
                        sites[index] = Some(CallSite {
                            point: occurrence.point.clone(),
                            group: group.id,
                            replacement: Replacement::Call(call),
                        });
                    }
                    functions.push(function);
                }
            }
        }

        let out = Deinlined {
            functions,
            helpers,
            call_sites: sites.into_iter().flatten().collect(),
            skipped,
        };
        info!(
            groups = groups.len(),
            functions = out.functions.len(),
            helpers = out.helpers.len(),
            call_sites = out.call_sites.len(),
            compression_ratio = out.compression_ratio(),
            "deinlined occurrences"
        );
        out
    }
}

/// Add a helper unless an identical definition exists; returns its final
/// name, suffixed `_<n>` on a clash with a different definition
fn merge_helper(helpers: &mut Vec<SynthesizedFunction>, helper: SynthesizedFunction) -> String {
    let mut n = 0usize;
    loop {
        let name = if n == 0 {
            helper.name.clone()
        } else {
            format!("{}_{}", helper.name, n)
        };
        match helpers.iter().find(|h| h.name == name) {
            Some(existing)
                if existing.params == helper.params
                    && existing.locals == helper.locals
                    && existing.body == helper.body =>
            {
                return name;
            }
            Some(_) => n += 1,
            None => {
                helpers.push(SynthesizedFunction {
                    name: name.clone(),
                    ..helper
                });
                return name;
            }
        }
    }
}
