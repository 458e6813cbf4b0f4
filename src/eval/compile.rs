//! Plan compilation: names to ids, terms to buffer offsets.
//!
//! Compiling is also validation. Anything a rule could trip over at run time
//! (unknown relation, unserved pattern, bad slot reference, wrong widths, a
//! rule reading its own target) is rejected here as a plan inconsistency.

use crate::catalog::{Catalog, RelationId};
use crate::error::{EngineError, EngineResult};
use crate::pattern::BoundPattern;
use crate::plan::{inconsistency, Access, Filter, Plan, RuleEval, Statement, Term};
use crate::tuple::Word;
use std::collections::HashMap;

/// Resolved value source. `Env` is an offset into the rule's slot buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Source {
    Const(Word),
    Env(usize),
}

impl Source {
    #[inline]
    pub(crate) fn resolve(self, env: &[Word]) -> Word {
        match self {
            Source::Const(w) => w,
            Source::Env(pos) => env[pos],
        }
    }
}

#[derive(Debug)]
pub(crate) struct CompiledAccess {
    pub relation: RelationId,
    pub index: usize,
    pub pattern: BoundPattern,
    pub keys: Vec<(usize, Source)>,
}

#[derive(Debug)]
pub(crate) enum CompiledFilter {
    Eq(Source, Source),
    NotEq(Source, Source),
    Contains {
        relation: RelationId,
        tuple: Vec<Source>,
        site: usize,
    },
    NotContains {
        relation: RelationId,
        tuple: Vec<Source>,
        site: usize,
    },
}

#[derive(Debug)]
pub(crate) struct CompiledRule {
    pub label: String,
    pub scan: CompiledAccess,
    pub probes: Vec<CompiledAccess>,
    /// Start of each slot in the slot buffer, plus the total width at the end
    pub offsets: Vec<usize>,
    /// `filters_at[k]` runs right after slot `k` is bound
    pub filters_at: Vec<Vec<CompiledFilter>>,
    pub filter_sites: Vec<RelationId>,
    pub projection: Vec<Source>,
    pub target: RelationId,
    /// Relations that empty the result when empty themselves
    pub reads: Vec<RelationId>,
}

#[derive(Debug)]
pub(crate) enum Op {
    Query(Box<CompiledRule>),
    Loop(Vec<Op>),
    Exit(Vec<RelationId>),
    Merge {
        source: RelationId,
        target: RelationId,
    },
    Swap(RelationId, RelationId),
    Purge(RelationId),
    Output(RelationId),
}

#[derive(Debug)]
pub(crate) struct CompiledStratum {
    pub name: String,
    pub body: Vec<Op>,
    pub prune: Vec<RelationId>,
}

#[derive(Debug, Default)]
pub(crate) struct CompiledPlan {
    pub strata: Vec<CompiledStratum>,
    pub by_name: HashMap<String, usize>,
}

/// Compile `plan` against `catalog`.
pub(crate) fn compile(plan: &Plan, catalog: &Catalog) -> EngineResult<CompiledPlan> {
    let mut compiled = CompiledPlan::default();
    for stratum in &plan.strata {
        if compiled.by_name.contains_key(&stratum.name) {
            return Err(EngineError::DuplicateStratum(stratum.name.clone()));
        }
        let cx = Context {
            catalog,
            stratum: &stratum.name,
        };
        let body = cx.statements(&stratum.statements, false)?;
        let prune = stratum
            .prune
            .iter()
            .map(|name| cx.relation(name, "prune"))
            .collect::<EngineResult<Vec<_>>>()?;
        compiled
            .by_name
            .insert(stratum.name.clone(), compiled.strata.len());
        compiled.strata.push(CompiledStratum {
            name: stratum.name.clone(),
            body,
            prune,
        });
    }
    Ok(compiled)
}

struct Context<'a> {
    catalog: &'a Catalog,
    stratum: &'a str,
}

impl Context<'_> {
    fn fail(&self, rule: &str, reason: impl Into<String>) -> EngineError {
        inconsistency(self.stratum, rule, reason)
    }

    fn relation(&self, name: &str, rule: &str) -> EngineResult<RelationId> {
        self.catalog
            .id(name)
            .ok_or_else(|| self.fail(rule, format!("unknown relation '{name}'")))
    }

    fn statements(&self, statements: &[Statement], in_loop: bool) -> EngineResult<Vec<Op>> {
        statements
            .iter()
            .map(|statement| self.statement(statement, in_loop))
            .collect()
    }

    fn statement(&self, statement: &Statement, in_loop: bool) -> EngineResult<Op> {
        match statement {
            Statement::Query(rule) => Ok(Op::Query(Box::new(self.rule(rule)?))),
            Statement::Loop(body) => {
                if !body.iter().any(|s| matches!(s, Statement::Exit(_))) {
                    return Err(self.fail("loop", "loop body has no exit"));
                }
                Ok(Op::Loop(self.statements(body, true)?))
            }
            Statement::Exit(names) => {
                if !in_loop {
                    return Err(self.fail("exit", "exit outside of a loop"));
                }
                if names.is_empty() {
                    return Err(self.fail("exit", "exit names no relations"));
                }
                let ids = names
                    .iter()
                    .map(|name| self.relation(name, "exit"))
                    .collect::<EngineResult<Vec<_>>>()?;
                Ok(Op::Exit(ids))
            }
            Statement::Merge { source, target } => {
                let label = format!("merge {source} into {target}");
                let s = self.relation(source, &label)?;
                let t = self.relation(target, &label)?;
                if s == t {
                    return Err(self.fail(&label, "merge of a relation into itself"));
                }
                let (sa, ta) = (self.catalog.get(s).arity(), self.catalog.get(t).arity());
                if sa != ta {
                    return Err(self.fail(&label, format!("arity {sa} does not match {ta}")));
                }
                Ok(Op::Merge {
                    source: s,
                    target: t,
                })
            }
            Statement::Swap(a, b) => {
                let label = format!("swap {a} {b}");
                let x = self.relation(a, &label)?;
                let y = self.relation(b, &label)?;
                if !self.catalog.get(x).same_shape(self.catalog.get(y)) {
                    return Err(self.fail(&label, "relations differ in shape"));
                }
                Ok(Op::Swap(x, y))
            }
            Statement::Purge(name) => Ok(Op::Purge(self.relation(name, "purge")?)),
            Statement::Output(name) => Ok(Op::Output(self.relation(name, "output")?)),
        }
    }

    fn rule(&self, rule: &RuleEval) -> EngineResult<CompiledRule> {
        let label = rule.label.as_str();

        let mut accesses = Vec::with_capacity(rule.probes.len() + 1);
        accesses.push(self.relation(&rule.scan.relation, label)?);
        for probe in &rule.probes {
            accesses.push(self.relation(&probe.relation, label)?);
        }
        let mut offsets = Vec::with_capacity(accesses.len() + 1);
        let mut width = 0;
        for &id in &accesses {
            offsets.push(width);
            width += self.catalog.get(id).arity();
        }
        offsets.push(width);

        let slots = Slots {
            cx: self,
            label,
            accesses: &accesses,
            offsets: &offsets,
        };

        if rule.scan.bindings.iter().any(|(_, t)| !matches!(t, Term::Const(_))) {
            return Err(self.fail(label, "scan bindings must be constants"));
        }
        let scan = slots.access(&rule.scan, accesses[0], 0)?;
        let probes = rule
            .probes
            .iter()
            .enumerate()
            .map(|(i, probe)| slots.access(probe, accesses[i + 1], i + 1))
            .collect::<EngineResult<Vec<_>>>()?;

        let target = self.relation(&rule.target, label)?;
        let target_arity = self.catalog.get(target).arity();
        if rule.projection.len() != target_arity {
            return Err(self.fail(
                label,
                format!(
                    "projection has {} terms, '{}' has arity {target_arity}",
                    rule.projection.len(),
                    rule.target
                ),
            ));
        }
        let projection = rule
            .projection
            .iter()
            .map(|&term| slots.source(term, accesses.len()))
            .collect::<EngineResult<Vec<_>>>()?;

        let mut filters_at: Vec<Vec<CompiledFilter>> =
            (0..accesses.len()).map(|_| Vec::new()).collect();
        let mut filter_sites = Vec::new();
        let mut reads = accesses.clone();
        for filter in &rule.filters {
            let (level, compiled) = slots.filter(filter, &mut filter_sites)?;
            if let CompiledFilter::Contains { relation, .. } = compiled {
                reads.push(relation);
            }
            filters_at[level].push(compiled);
        }

        if accesses.contains(&target) || filter_sites.contains(&target) {
            return Err(self.fail(label, format!("rule reads its target '{}'", rule.target)));
        }

        Ok(CompiledRule {
            label: label.to_string(),
            scan,
            probes,
            offsets,
            filters_at,
            filter_sites,
            projection,
            target,
            reads,
        })
    }
}

/// Slot layout of one rule under compilation.
struct Slots<'a> {
    cx: &'a Context<'a>,
    label: &'a str,
    accesses: &'a [RelationId],
    offsets: &'a [usize],
}

impl Slots<'_> {
    /// Resolve `term` where only slots below `bound` are available.
    fn source(&self, term: Term, bound: usize) -> EngineResult<Source> {
        match term {
            Term::Const(w) => Ok(Source::Const(w)),
            Term::Column { slot, column } => {
                if slot >= bound {
                    return Err(self
                        .cx
                        .fail(self.label, format!("term {term} reads slot {slot} before it is bound")));
                }
                let arity = self.offsets[slot + 1] - self.offsets[slot];
                if column >= arity {
                    return Err(self.cx.fail(
                        self.label,
                        format!("term {term} is out of range for arity {arity}"),
                    ));
                }
                Ok(Source::Env(self.offsets[slot] + column))
            }
        }
    }

    fn access(&self, access: &Access, id: RelationId, slot: usize) -> EngineResult<CompiledAccess> {
        let relation = self.cx.catalog.get(id);
        let columns: Vec<usize> = access.bindings.iter().map(|&(c, _)| c).collect();
        let mut seen = columns.clone();
        seen.sort_unstable();
        seen.dedup();
        let pattern = BoundPattern::from_columns(relation.arity(), &columns)
            .filter(|_| seen.len() == columns.len())
            .ok_or_else(|| {
                self.cx.fail(
                    self.label,
                    format!("bad bound columns {columns:?} for '{}'", access.relation),
                )
            })?;
        let index = relation.index_for(pattern).ok_or_else(|| {
            self.cx.fail(
                self.label,
                format!("pattern {pattern} is not served by '{}'", access.relation),
            )
        })?;
        let keys = access
            .bindings
            .iter()
            .map(|&(column, term)| Ok((column, self.source(term, slot)?)))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(CompiledAccess {
            relation: id,
            index,
            pattern,
            keys,
        })
    }

    /// Compile `filter` and pick the earliest slot after which it can run.
    fn filter(
        &self,
        filter: &Filter,
        sites: &mut Vec<RelationId>,
    ) -> EngineResult<(usize, CompiledFilter)> {
        let all = self.accesses.len();
        let level_of = |terms: &[Term]| {
            terms
                .iter()
                .filter_map(|t| match t {
                    Term::Column { slot, .. } => Some(*slot),
                    Term::Const(_) => None,
                })
                .max()
                .unwrap_or(0)
        };
        match filter {
            Filter::Eq(a, b) | Filter::NotEq(a, b) => {
                let (x, y) = (self.source(*a, all)?, self.source(*b, all)?);
                let level = level_of(&[*a, *b]);
                let compiled = if matches!(filter, Filter::Eq(..)) {
                    CompiledFilter::Eq(x, y)
                } else {
                    CompiledFilter::NotEq(x, y)
                };
                Ok((level, compiled))
            }
            Filter::Contains { relation, tuple } | Filter::NotContains { relation, tuple } => {
                let id = self.cx.relation(relation, self.label)?;
                let arity = self.cx.catalog.get(id).arity();
                if tuple.len() != arity {
                    return Err(self.cx.fail(
                        self.label,
                        format!("{} terms checked against '{relation}' of arity {arity}", tuple.len()),
                    ));
                }
                let sources = tuple
                    .iter()
                    .map(|&t| self.source(t, all))
                    .collect::<EngineResult<Vec<_>>>()?;
                let site = sites.len();
                sites.push(id);
                let compiled = if matches!(filter, Filter::Contains { .. }) {
                    CompiledFilter::Contains {
                        relation: id,
                        tuple: sources,
                        site,
                    }
                } else {
                    CompiledFilter::NotContains {
                        relation: id,
                        tuple: sources,
                        site,
                    }
                };
                Ok((level_of(tuple), compiled))
            }
        }
    }
}
