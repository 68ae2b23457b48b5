//! Parameter coalescer
//!
//! Decides what every slot of a group becomes in the synthesized function:
//!
//! | Role         | Source                                         | In the body            |
//! |--------------|------------------------------------------------|------------------------|
//! | `Constant`   | identical non-frame argument everywhere        | the literal            |
//! | `Param`      | meet class of variable slots                   | `param_<type>_<n>`     |
//! | `Bound`      | consumer of an aliased storage                 | rewritten via producer |
//! | `Localized`  | `&v` of a non-escaping local with consumers    | `&local_<type>_<n>`    |
//!
//! Parameter types are widened across occurrences (see [`crate::ctype::widen`]);
//! actuals whose natural type differs from the declared type get a cast.

use crate::analysis::{AliasAnalysis, Equivalence, FusedPair, Resolution, Slot, SlotTable, StorageKind};
use crate::config::{FusionRule, Prototypes};
use crate::ctype::{widen, CType, TypeResolver};
use crate::error::{DeinlineError, Result};
use crate::grouper::Group;
use crate::model::{Argument, InsertionPoint, Occurrence, SymbolTable};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Type information shared by all groups of a run
#[derive(Debug, Clone, Copy)]
pub struct TypeContext<'a> {
    pub prototypes: &'a Prototypes,
    pub symbols: &'a SymbolTable,
    pub fallback: &'a CType,
}

impl<'a> TypeContext<'a> {
    /// Resolver for one occurrence: its declarations, then the run-wide symbols
    pub fn resolver(&self, occurrence: &'a Occurrence) -> TypeResolver<'a> {
        TypeResolver::new(self.prototypes)
            .with_scope(&occurrence.declarations)
            .with_scope(self.symbols)
    }
}

/// What a slot becomes in the synthesized function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotRole {
    Constant,
    Param(usize),
    Bound {
        producer: usize,
        storage: StorageKind,
        access: Argument,
    },
    Localized { temp: usize },
}

/// One formal parameter of a synthesized function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub ty: CType,
    pub slots: Vec<Slot>,

    /// Actual argument per occurrence, cast where needed
    pub actuals: Vec<Argument>,
}

/// Temporary holding a localized storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTemp {
    pub ty: CType,
    /// Producer meet class it replaces
    pub class: usize,
    /// Index into [`Coalesced::fusions`] when the temp lives in a helper
    pub fused: Option<usize>,
}

/// Slot roles and parameters of one group
#[derive(Debug, Clone)]
pub struct Coalesced {
    pub roles: Vec<SlotRole>,
    pub params: Vec<Parameter>,
    pub temps: Vec<LocalTemp>,
    pub fusions: Vec<FusedPair>,
}

impl Coalesced {
    pub fn constant_count(&self) -> usize {
        self.roles
            .iter()
            .filter(|r| matches!(r, SlotRole::Constant))
            .count()
    }

    pub fn bound_count(&self) -> usize {
        self.roles
            .iter()
            .filter(|r| matches!(r, SlotRole::Bound { .. }))
            .count()
    }
}

/// Assign a role to every slot and build the parameter list
pub fn coalesce(
    group: &Group<'_>,
    table: &SlotTable,
    equivalence: &Equivalence,
    aliases: &AliasAnalysis,
    rules: &[FusionRule],
    ctx: TypeContext<'_>,
) -> Result<Coalesced> {
    let fusions = aliases.plan_fusions(table, equivalence, rules);
    let mut fused_class: HashMap<usize, usize> = HashMap::new();
    for (f, pair) in fusions.iter().enumerate() {
        for &producer in &pair.producers {
            fused_class.insert(equivalence.class_of(producer), f);
        }
    }

    let mut roles = Vec::with_capacity(table.len());
    let mut temps: Vec<LocalTemp> = Vec::new();
    let mut temp_of_class: HashMap<usize, usize> = HashMap::new();
    let mut param_classes: Vec<usize> = Vec::new();
    let mut param_of_class: HashMap<usize, usize> = HashMap::new();

    for slot in 0..table.len() {
        let class = equivalence.class_of(slot);
        let role = if let Some(edge) = aliases.edge_for_consumer(slot) {
            SlotRole::Bound {
                producer: edge.producer,
                storage: edge.storage,
                access: edge.access.clone(),
            }
        } else if equivalence.is_constant(slot) {
            SlotRole::Constant
        } else if aliases.resolution(class) == Some(Resolution::Localize) {
            let temp = match temp_of_class.get(&class) {
                Some(&temp) => temp,
                None => {
                    temps.push(LocalTemp {
                        ty: temp_type(group, table, ctx, class)?,
                        class,
                        fused: fused_class.get(&class).copied(),
                    });
                    temp_of_class.insert(class, temps.len() - 1);
                    temps.len() - 1
                }
            };
            SlotRole::Localized { temp }
        } else {
            let param = *param_of_class.entry(class).or_insert_with(|| {
                param_classes.push(class);
                param_classes.len() - 1
            });
            SlotRole::Param(param)
        };
        roles.push(role);
    }

    let mut params = Vec::with_capacity(param_classes.len());
    for (index, _) in param_classes.iter().enumerate() {
        let slots: Vec<usize> = roles
            .iter()
            .enumerate()
            .filter(|(_, r)| **r == SlotRole::Param(index))
            .map(|(s, _)| s)
            .collect();
        params.push(build_parameter(group, table, ctx, index, &slots)?);
    }

    let coalesced = Coalesced {
        roles,
        params,
        temps,
        fusions,
    };
    debug!(
        group = group.id.0,
        slots = table.len(),
        constants = coalesced.constant_count(),
        params = coalesced.params.len(),
        bound = coalesced.bound_count(),
        temps = coalesced.temps.len(),
        fusions = coalesced.fusions.len(),
        "coalesced parameters"
    );
    Ok(coalesced)
}

/// Natural type of a parameter's value in one occurrence
fn natural_type(
    table: &SlotTable,
    resolver: &TypeResolver<'_>,
    occurrence: &Occurrence,
    slots: &[usize],
) -> Option<CType> {
    slots.iter().find_map(|&s| {
        let slot = table.slot(s);
        resolver.argument_type(
            table.argument(occurrence, s),
            table.callee(slot.statement),
            slot.argument,
        )
    })
}

fn build_parameter(
    group: &Group<'_>,
    table: &SlotTable,
    ctx: TypeContext<'_>,
    index: usize,
    slots: &[usize],
) -> Result<Parameter> {
    let first = slots[0];
    let mut observed: Vec<(usize, Argument, Option<CType>)> = Vec::with_capacity(group.len());
    for (o, occurrence) in group.occurrences.iter().enumerate() {
        let resolver = ctx.resolver(occurrence);
        let ty = natural_type(table, &resolver, occurrence, slots);
        observed.push((o, table.argument(occurrence, first).clone(), ty));
    }

    let ty = declared_type(group, table.slot(first), &observed, ctx.fallback)?;
    let actuals = observed
        .into_iter()
        .map(|(_, actual, natural)| match natural {
            Some(natural) if natural != ty => Argument::cast(ty.clone(), actual.uncast().clone()),
            _ => actual,
        })
        .collect();

    Ok(Parameter {
        name: format!("param_{}_{}", ty.mangled(), index),
        ty,
        slots: slots.iter().map(|&s| table.slot(s)).collect(),
        actuals,
    })
}

/// Widen the known actual types; null-pointer constants only count when
/// nothing else is known
fn declared_type(
    group: &Group<'_>,
    parameter: Slot,
    observed: &[(usize, Argument, Option<CType>)],
    fallback: &CType,
) -> Result<CType> {
    let mut candidates = known_types(observed, false);
    if candidates.is_empty() {
        candidates = known_types(observed, true);
    }
    let Some((_, first)) = candidates.first() else {
        return Ok(fallback.clone());
    };

    let mut declared = (*first).clone();
    for (_, ty) in &candidates[1..] {
        match widen(&declared, ty) {
            Some(wider) => declared = wider,
            None => return Err(widening_conflict(group, parameter, &candidates)),
        }
    }
    Ok(declared)
}

fn known_types(
    observed: &[(usize, Argument, Option<CType>)],
    nulls: bool,
) -> Vec<(usize, &CType)> {
    observed
        .iter()
        .filter(|(_, actual, _)| actual.is_null_constant() == nulls)
        .filter_map(|(o, _, ty)| ty.as_ref().map(|t| (*o, t)))
        .collect()
}

fn widening_conflict(
    group: &Group<'_>,
    parameter: Slot,
    candidates: &[(usize, &CType)],
) -> DeinlineError {
    let mut types: Vec<CType> = Vec::new();
    let mut occurrences: Vec<InsertionPoint> = Vec::new();
    for (o, ty) in candidates {
        if !types.contains(ty) {
            types.push((*ty).clone());
        }
        let point = &group.occurrences[*o].point;
        if !occurrences.contains(point) {
            occurrences.push(point.clone());
        }
    }
    DeinlineError::TypeWideningConflict {
        group: group.id,
        parameter,
        types,
        occurrences,
    }
}

/// Type of the variable behind a localized `&v`
///
/// Its address reaches the callees, so every occurrence must agree on the
/// exact pointee type; no widening applies.
fn temp_type(
    group: &Group<'_>,
    table: &SlotTable,
    ctx: TypeContext<'_>,
    class: usize,
) -> Result<CType> {
    let slot = table.slot(class);
    let known: Vec<(usize, CType)> = group
        .occurrences
        .iter()
        .enumerate()
        .filter_map(|(o, occ)| {
            ctx.resolver(occ)
                .argument_type(
                    table.argument(occ, class),
                    table.callee(slot.statement),
                    slot.argument,
                )
                .and_then(|ty| ty.pointee())
                .map(|ty| (o, ty))
        })
        .collect();

    let Some((_, first)) = known.first() else {
        return Ok(ctx.fallback.clone());
    };
    if known.iter().any(|(_, ty)| ty != first) {
        let candidates: Vec<(usize, &CType)> = known.iter().map(|(o, ty)| (*o, ty)).collect();
        return Err(widening_conflict(group, slot, &candidates));
    }
    Ok(first.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouper::group_occurrences;

    fn coalesce_blocks(blocks: &[&[&str]]) -> Result<Coalesced> {
        let input: Vec<Occurrence> = blocks
            .iter()
            .enumerate()
            .map(|(i, lines)| Occurrence::parse(format!("f{}", i + 1), lines).unwrap())
            .collect();
        let grouping = group_occurrences(&input);
        let group = &grouping.groups[0];
        let table = SlotTable::for_group(group);
        let eq = Equivalence::analyze(&table, &group.occurrences);
        let aliases = AliasAnalysis::resolve(group, &table, &eq)?;
        let prototypes = Prototypes::default();
        let symbols = SymbolTable::new();
        let fallback = CType::new("void", 1);
        let ctx = TypeContext {
            prototypes: &prototypes,
            symbols: &symbols,
            fallback: &fallback,
        };
        coalesce(group, &table, &eq, &aliases, &[], ctx)
    }

    #[test]
    fn test_common_params_are_constants() {
        let out = coalesce_blocks(&[
            &["a(0);", "b(1);", "c(2);", "d(3);", "e(4);", "f(5);"],
            &["a(0);", "b(0);", "c(2);", "d(2);", "e(4);", "f(4);"],
        ])
        .unwrap();
        assert_eq!(out.constant_count(), 3);
        assert_eq!(out.params.len(), 3);
        assert!(out.params.iter().all(|p| p.ty == CType::scalar("int")));
        let names: Vec<&str> = out.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["param_int_0", "param_int_1", "param_int_2"]);
        assert_eq!(out.params[0].actuals[1].to_string(), "0");
    }

    #[test]
    fn test_null_adopts_pointer_type() {
        let out = coalesce_blocks(&[
            &["a(0x0);", "a(local_GLubyte_ptr_0);"],
            &["a(local_GLubyte_ptr_0);", "a(0x500);"],
        ])
        .unwrap();
        assert_eq!(out.params.len(), 2);
        assert_eq!(out.params[0].ty, CType::new("GLubyte", 1));
        assert_eq!(out.params[0].name, "param_GLubyte_ptr_0");
        assert_eq!(out.params[0].actuals[0].to_string(), "(GLubyte*) 0x0");
        assert_eq!(out.params[0].actuals[1].to_string(), "local_GLubyte_ptr_0");
        assert_eq!(out.params[1].actuals[1].to_string(), "(GLubyte*) 0x500");
    }

    #[test]
    fn test_widening_conflict() {
        let err = coalesce_blocks(&[&["a(2.0);"], &["a(local_GLubyte_ptr_0);"]]).unwrap_err();
        match err {
            DeinlineError::TypeWideningConflict {
                parameter,
                types,
                occurrences,
                ..
            } => {
                assert_eq!(parameter, Slot::new(0, 0));
                assert_eq!(types, vec![CType::scalar("float"), CType::new("GLubyte", 1)]);
                assert_eq!(occurrences.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_types_use_fallback() {
        let out = coalesce_blocks(&[&["a(x);"], &["a(y);"]]).unwrap();
        assert_eq!(out.params[0].ty, CType::new("void", 1));
        assert_eq!(out.params[0].name, "param_void_ptr_0");
        assert_eq!(out.params[0].actuals[0], Argument::variable("x"));
    }

    #[test]
    fn test_localized_storage_gets_temp() {
        let out = coalesce_blocks(&[
            &["openAsset(mgr, name, &local_AAsset_ptr_0);", "getAssetBuffer(local_AAsset_ptr_0);"],
            &["openAsset(mgr, name, &local_AAsset_ptr_3);", "getAssetBuffer(local_AAsset_ptr_3);"],
        ])
        .unwrap();
        assert_eq!(out.params.len(), 2);
        assert_eq!(out.temps.len(), 1);
        assert_eq!(out.temps[0].ty, CType::new("AAsset", 1));
        assert_eq!(out.roles[2], SlotRole::Localized { temp: 0 });
        assert!(matches!(out.roles[3], SlotRole::Bound { producer: 2, .. }));
    }

    #[test]
    fn test_localized_storage_types_must_agree() {
        let err = coalesce_blocks(&[
            &["openAsset(mgr, name, &local_AAsset_ptr_0);", "getAssetBuffer(local_AAsset_ptr_0);"],
            &["openAsset(mgr, name, &local_int_3);", "getAssetBuffer(local_int_3);"],
        ])
        .unwrap_err();
        match err {
            DeinlineError::TypeWideningConflict {
                parameter,
                types,
                occurrences,
                ..
            } => {
                assert_eq!(parameter, Slot::new(0, 2));
                assert_eq!(types, vec![CType::new("AAsset", 1), CType::scalar("int")]);
                let points: Vec<&str> = occurrences.iter().map(|p| p.as_str()).collect();
                assert_eq!(points, vec!["f1", "f2"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
