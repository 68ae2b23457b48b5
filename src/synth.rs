//! Function synthesizer and call-site rewriter
//!
//! Turns a coalesced group into one function definition, the helpers its
//! fused call pairs need, and one replacement call per occurrence. Statement
//! order inside the body is the order of the occurrences.

use crate::analysis::alias::ROOT;
use crate::analysis::{FusedPair, SlotTable, StorageKind};
use crate::coalesce::{Coalesced, SlotRole, TypeContext};
use crate::ctype::CType;
use crate::grouper::{Group, GroupId};
use crate::model::{Argument, InsertionPoint, Occurrence, Statement};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// Typed name: a formal parameter or a local declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Formal {
    pub name: String,
    pub ty: CType,
}

impl Formal {
    pub fn new(name: impl Into<String>, ty: CType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// `param_<mangled type>_<index>`
    pub fn parameter(ty: CType, index: usize) -> Self {
        Self::new(format!("param_{}_{}", ty.mangled(), index), ty)
    }

    /// `local_<mangled type>_<index>`
    pub fn local(ty: CType, index: usize) -> Self {
        Self::new(format!("local_{}_{}", ty.mangled(), index), ty)
    }
}

impl fmt::Display for Formal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ty, self.name)
    }
}

/// A `void` function made of flat call statements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizedFunction {
    pub name: String,

    /// Group the function replaces; `None` for fused-call helpers
    pub group: Option<GroupId>,
    pub params: Vec<Formal>,
    pub locals: Vec<Formal>,
    pub body: Vec<Statement>,
}

impl SynthesizedFunction {
    /// Point the body statement at `index` to another callee
    pub fn rename_call(&mut self, index: usize, to: &str) {
        if let Some(statement) = self.body.get_mut(index) {
            statement.name = to.to_string();
        }
    }
}

/// What an occurrence is replaced with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Replacement {
    /// Single call to the synthesized function
    Call(Statement),
    /// Occurrence left untouched
    Inline(Vec<Statement>),
}

impl Replacement {
    pub fn is_call(&self) -> bool {
        matches!(self, Replacement::Call(_))
    }

    pub fn statement_count(&self) -> usize {
        match self {
            Replacement::Call(_) => 1,
            Replacement::Inline(statements) => statements.len(),
        }
    }
}

/// Replacement for the occurrence at one insertion point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub point: InsertionPoint,
    pub group: GroupId,
    pub replacement: Replacement,
}

impl CallSite {
    pub fn inline(point: InsertionPoint, group: GroupId, occurrence: &Occurrence) -> Self {
        Self {
            point,
            group,
            replacement: Replacement::Inline(occurrence.statements.clone()),
        }
    }
}

/// Everything produced for one group
#[derive(Debug, Clone)]
pub struct GroupSynthesis {
    pub function: SynthesizedFunction,
    pub helpers: Vec<SynthesizedFunction>,
    /// Body index of the call to each helper, parallel to `helpers`
    pub helper_sites: Vec<usize>,
    /// Replacement call per occurrence, in group order
    pub calls: Vec<Statement>,
}

/// Build the function, helpers and calls for a coalesced group
pub fn synthesize(
    name: String,
    group: &Group<'_>,
    table: &SlotTable,
    coalesced: &Coalesced,
    ctx: TypeContext<'_>,
) -> GroupSynthesis {
    let params: Vec<Formal> = coalesced
        .params
        .iter()
        .map(|p| Formal::new(p.name.clone(), p.ty.clone()))
        .collect();

    let mut locals = Vec::new();
    let mut temp_names: Vec<String> = vec![String::new(); coalesced.temps.len()];
    for (t, temp) in coalesced.temps.iter().enumerate() {
        if temp.fused.is_none() {
            let local = Formal::local(temp.ty.clone(), locals.len());
            temp_names[t] = local.name.clone();
            locals.push(local);
        }
    }

    let mut helpers = Vec::new();
    let mut helper_calls: HashMap<usize, (usize, Statement)> = HashMap::new();
    for (f, pair) in coalesced.fusions.iter().enumerate() {
        let (helper, args) = fused_helper(group, table, coalesced, ctx, f, pair, &temp_names);
        helper_calls.insert(pair.statement, (f, Statement::new(helper.name.clone(), args)));
        helpers.push(helper);
    }
    let mut helper_sites = vec![0; helpers.len()];

    let builder = BodyBuilder {
        table,
        coalesced,
        occurrence: group.occurrences[0],
        temp_names: &temp_names,
        overrides: HashMap::new(),
    };
    let mut body = Vec::with_capacity(table.statement_count());
    let mut statement = 0;
    while statement < table.statement_count() {
        if let Some((f, call)) = helper_calls.remove(&statement) {
            helper_sites[f] = body.len();
            body.push(call);
            statement += 2;
            continue;
        }
        let args = table
            .statement_range(statement)
            .map(|slot| builder.cast_for_callee(slot, builder.expr(slot), ctx))
            .collect();
        body.push(Statement::new(table.callee(statement), args));
        statement += 1;
    }

    let calls = (0..group.len())
        .map(|o| {
            Statement::new(
                name.clone(),
                coalesced.params.iter().map(|p| p.actuals[o].clone()).collect(),
            )
        })
        .collect();

    debug!(
        group = group.id.0,
        function = %name,
        params = params.len(),
        locals = locals.len(),
        helpers = helpers.len(),
        "synthesized function"
    );

    GroupSynthesis {
        function: SynthesizedFunction {
            name,
            group: Some(group.id),
            params,
            locals,
            body,
        },
        helpers,
        helper_sites,
        calls,
    }
}

/// Helper for one fused pair, plus the arguments the caller passes to it
fn fused_helper(
    group: &Group<'_>,
    table: &SlotTable,
    coalesced: &Coalesced,
    ctx: TypeContext<'_>,
    fusion: usize,
    pair: &FusedPair,
    function_temps: &[String],
) -> (SynthesizedFunction, Vec<Argument>) {
    let occurrence = group.occurrences[0];
    let fused_temps: HashSet<usize> = coalesced
        .temps
        .iter()
        .enumerate()
        .filter(|(_, t)| t.fused == Some(fusion))
        .map(|(i, _)| i)
        .collect();

    let is_fused = |slot: usize| match &coalesced.roles[slot] {
        SlotRole::Localized { temp } => fused_temps.contains(temp),
        SlotRole::Bound { producer, .. } => matches!(
            coalesced.roles[*producer],
            SlotRole::Localized { temp } if fused_temps.contains(&temp)
        ),
        _ => false,
    };

    let slots = table.statement_range(pair.statement).start
        ..table.statement_range(pair.statement + 1).end;
    let remaining: Vec<usize> = slots.clone().filter(|s| !is_fused(*s)).collect();

    let caller = BodyBuilder {
        table,
        coalesced,
        occurrence,
        temp_names: function_temps,
        overrides: HashMap::new(),
    };

    let mut params = Vec::with_capacity(remaining.len());
    let mut args = Vec::with_capacity(remaining.len());
    let mut overrides = HashMap::new();
    for (n, &slot) in remaining.iter().enumerate() {
        let ty = helper_formal_type(table, coalesced, ctx, occurrence, slot);
        let formal = Formal::parameter(ty, n);
        let mut arg = caller.expr(slot);
        if let SlotRole::Param(p) = coalesced.roles[slot] {
            if coalesced.params[p].ty != formal.ty {
                arg = Argument::cast(formal.ty.clone(), arg);
            }
        }
        args.push(arg);
        overrides.insert(slot, Argument::variable(formal.name.clone()));
        params.push(formal);
    }

    let mut locals = Vec::new();
    let mut temp_names = vec![String::new(); coalesced.temps.len()];
    for (t, temp) in coalesced.temps.iter().enumerate() {
        if fused_temps.contains(&t) {
            let local = Formal::local(temp.ty.clone(), locals.len());
            temp_names[t] = local.name.clone();
            locals.push(local);
        }
    }

    let inner = BodyBuilder {
        table,
        coalesced,
        occurrence,
        temp_names: &temp_names,
        overrides,
    };
    let body = [pair.statement, pair.statement + 1]
        .into_iter()
        .map(|statement| {
            let args = table
                .statement_range(statement)
                .map(|slot| inner.expr(slot))
                .collect();
            Statement::new(table.callee(statement), args)
        })
        .collect();

    let helper = SynthesizedFunction {
        name: pair.helper.clone(),
        group: None,
        params,
        locals,
        body,
    };
    (helper, args)
}

/// Declared type of a helper formal: callee prototype, else what the
/// caller passes
fn helper_formal_type(
    table: &SlotTable,
    coalesced: &Coalesced,
    ctx: TypeContext<'_>,
    occurrence: &Occurrence,
    slot: usize,
) -> CType {
    let position = table.slot(slot);
    let callee = table.callee(position.statement);
    if let Some(formal) = ctx.prototypes.formal(callee, position.argument) {
        return formal.clone();
    }
    if let SlotRole::Param(p) = coalesced.roles[slot] {
        return coalesced.params[p].ty.clone();
    }
    ctx.resolver(occurrence)
        .argument_type(table.argument(occurrence, slot), callee, position.argument)
        .unwrap_or_else(|| ctx.fallback.clone())
}

/// Builds body expressions for slots
struct BodyBuilder<'a> {
    table: &'a SlotTable,
    coalesced: &'a Coalesced,
    /// Constants are taken from the first occurrence
    occurrence: &'a Occurrence,
    temp_names: &'a [String],
    /// Slots replaced wholesale, e.g. by helper formals
    overrides: HashMap<usize, Argument>,
}

impl BodyBuilder<'_> {
    fn expr(&self, slot: usize) -> Argument {
        if let Some(arg) = self.overrides.get(&slot) {
            return arg.clone();
        }
        match &self.coalesced.roles[slot] {
            SlotRole::Constant => self.table.argument(self.occurrence, slot).clone(),
            SlotRole::Param(p) => Argument::variable(self.coalesced.params[*p].name.clone()),
            SlotRole::Localized { temp } => {
                Argument::address_of(Argument::variable(self.temp_names[*temp].clone()))
            }
            SlotRole::Bound {
                producer,
                storage,
                access,
            } => {
                let produced = self.expr(*producer);
                let root = match storage {
                    StorageKind::Variable => produced.deref_simplified(),
                    StorageKind::Pointee => produced,
                };
                access.substitute(ROOT, &root)
            }
        }
    }

    /// Cast a parameter to the callee's formal type when they differ
    fn cast_for_callee(&self, slot: usize, arg: Argument, ctx: TypeContext<'_>) -> Argument {
        let SlotRole::Param(p) = self.coalesced.roles[slot] else {
            return arg;
        };
        let position = self.table.slot(slot);
        match ctx
            .prototypes
            .formal(self.table.callee(position.statement), position.argument)
        {
            Some(formal) if *formal != self.coalesced.params[p].ty => {
                Argument::cast(formal.clone(), arg)
            }
            _ => arg,
        }
    }
}
