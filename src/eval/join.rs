//! Nested loop join over index ranges.
//!
//! ```text
//! for t0 in scan chunk                 slot 0, filters_at[0]
//!   for t1 in probe1.range(keys(t0))   slot 1, filters_at[1]
//!     ...
//!       insert projection into target
//! ```
//!
//! Each worker owns a [`JoinScratch`]: the slot buffer, bound buffers and
//! operation contexts for every relation it touches.

use super::compile::{CompiledAccess, CompiledFilter, CompiledRule};
use crate::catalog::Catalog;
use crate::index::IndexRange;
use crate::relation::OperationContext;
use crate::tuple::{Word, MAX_WORD, MIN_WORD};

pub(crate) struct JoinScratch {
    env: Vec<Word>,
    lower: Vec<Vec<Word>>,
    upper: Vec<Vec<Word>>,
    probe_ctx: Vec<OperationContext>,
    filter_ctx: Vec<OperationContext>,
    target_ctx: OperationContext,
    key: Vec<Word>,
    out: Vec<Word>,
}

impl JoinScratch {
    pub(crate) fn new(rule: &CompiledRule, catalog: &Catalog) -> Self {
        let width = rule.offsets.last().copied().unwrap_or(0);
        let arity = |access: &CompiledAccess| catalog.get(access.relation).arity();
        JoinScratch {
            env: vec![0; width],
            lower: rule.probes.iter().map(|p| vec![MIN_WORD; arity(p)]).collect(),
            upper: rule.probes.iter().map(|p| vec![MAX_WORD; arity(p)]).collect(),
            probe_ctx: rule
                .probes
                .iter()
                .map(|p| catalog.get(p.relation).create_context())
                .collect(),
            filter_ctx: rule
                .filter_sites
                .iter()
                .map(|&id| catalog.get(id).create_context())
                .collect(),
            target_ctx: catalog.get(rule.target).create_context(),
            key: Vec::new(),
            out: Vec::with_capacity(rule.projection.len()),
        }
    }
}

impl CompiledRule {
    /// True when some relation the rule reads is empty.
    pub(crate) fn is_blocked(&self, catalog: &Catalog) -> bool {
        self.reads.iter().any(|&id| catalog.get(id).is_empty())
    }

    /// Range of the driving relation selected by the scan's constants.
    pub(crate) fn scan_range<'c>(&self, catalog: &'c Catalog) -> IndexRange<'c> {
        let relation = catalog.get(self.scan.relation);
        if self.scan.pattern.is_free() {
            return relation.iter();
        }
        let mut lower = vec![MIN_WORD; relation.arity()];
        let mut upper = vec![MAX_WORD; relation.arity()];
        for &(column, source) in &self.scan.keys {
            let value = source.resolve(&[]);
            lower[column] = value;
            upper[column] = value;
        }
        relation.range_on(self.scan.index, &lower, &upper)
    }

    /// Join every tuple of `chunk`. Returns the number of new target tuples.
    pub(crate) fn join_chunk(
        &self,
        catalog: &Catalog,
        chunk: &IndexRange<'_>,
        scratch: &mut JoinScratch,
    ) -> usize {
        let width = self.offsets[1];
        let mut derived = 0;
        for tuple in chunk {
            scratch.env[..width].copy_from_slice(tuple);
            if self.passes(0, catalog, scratch) {
                derived += self.descend(1, catalog, scratch);
            }
        }
        derived
    }

    fn descend(&self, slot: usize, catalog: &Catalog, scratch: &mut JoinScratch) -> usize {
        if slot > self.probes.len() {
            return self.emit(catalog, scratch);
        }
        let probe = &self.probes[slot - 1];
        let relation = catalog.get(probe.relation);
        let JoinScratch {
            env,
            lower,
            upper,
            probe_ctx,
            ..
        } = scratch;
        let (lower, upper) = (&mut lower[slot - 1], &mut upper[slot - 1]);
        for &(column, source) in &probe.keys {
            let value = source.resolve(env);
            lower[column] = value;
            upper[column] = value;
        }
        let range = relation.range_on_with(probe.index, lower, upper, &mut probe_ctx[slot - 1]);

        let (start, end) = (self.offsets[slot], self.offsets[slot + 1]);
        let mut derived = 0;
        for tuple in &range {
            scratch.env[start..end].copy_from_slice(tuple);
            if self.passes(slot, catalog, scratch) {
                derived += self.descend(slot + 1, catalog, scratch);
            }
        }
        derived
    }

    fn passes(&self, slot: usize, catalog: &Catalog, scratch: &mut JoinScratch) -> bool {
        let JoinScratch {
            env,
            filter_ctx,
            key,
            ..
        } = scratch;
        let env: &[Word] = env;
        self.filters_at[slot].iter().all(|filter| match filter {
            CompiledFilter::Eq(a, b) => a.resolve(env) == b.resolve(env),
            CompiledFilter::NotEq(a, b) => a.resolve(env) != b.resolve(env),
            CompiledFilter::Contains {
                relation,
                tuple,
                site,
            } => {
                key.clear();
                key.extend(tuple.iter().map(|s| s.resolve(env)));
                catalog.get(*relation).contains_with(key, &mut filter_ctx[*site])
            }
            CompiledFilter::NotContains {
                relation,
                tuple,
                site,
            } => {
                key.clear();
                key.extend(tuple.iter().map(|s| s.resolve(env)));
                !catalog.get(*relation).contains_with(key, &mut filter_ctx[*site])
            }
        })
    }

    fn emit(&self, catalog: &Catalog, scratch: &mut JoinScratch) -> usize {
        let JoinScratch {
            env,
            out,
            target_ctx,
            ..
        } = scratch;
        let env: &[Word] = env;
        out.clear();
        out.extend(self.projection.iter().map(|s| s.resolve(env)));
        usize::from(catalog.get(self.target).insert_with(out, target_ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::compile::{compile, Op};
    use crate::plan::{Filter, Plan, RuleEval, Stratum, Term};
    use crate::relation::{IndexSpec, RelationSpec};

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.register(RelationSpec::new("edge", 2)).unwrap();
        catalog.register(RelationSpec::new("out", 2)).unwrap();
        catalog
            .register(
                RelationSpec::new("label", 2)
                    .index(IndexSpec::new(vec![0, 1]).serving("10").serving("11"))
                    .indirect(),
            )
            .unwrap();
        catalog
            .insert_facts("edge", [[1, 2], [2, 3], [3, 4], [2, 5]])
            .unwrap();
        catalog.insert_facts("label", [[2, 9], [3, 9]]).unwrap();
        catalog
    }

    fn run(rule: RuleEval, catalog: &Catalog) -> usize {
        let plan = Plan::new().stratum(Stratum::new("s").rule(rule));
        let compiled = compile(&plan, catalog).unwrap();
        let Op::Query(rule) = &compiled.strata[0].body[0] else {
            panic!("expected query");
        };
        let range = rule.scan_range(catalog);
        let mut scratch = JoinScratch::new(rule, catalog);
        rule.join_chunk(catalog, &range, &mut scratch)
    }

    #[test]
    fn test_two_way_join() {
        let catalog = catalog();
        let rule = RuleEval::scan("out(x,z) :- edge(x,y), edge(y,z).", "edge")
            .probe("edge", [(0, Term::col(0, 1))])
            .project([Term::col(0, 0), Term::col(1, 1)])
            .insert_into("out");
        assert_eq!(run(rule, &catalog), 3);
        let out = catalog.relation("out").unwrap().to_vec();
        assert_eq!(out, vec![vec![1, 3], vec![1, 5], vec![2, 4]]);
    }

    #[test]
    fn test_filters_and_negation() {
        let catalog = catalog();
        let rule = RuleEval::scan("out(x,y) :- edge(x,y), !label(y, 9), x != 3.", "edge")
            .not_contains("label", [Term::col(0, 1), Term::Const(9)])
            .filter(Filter::NotEq(Term::col(0, 0), Term::Const(3)))
            .project([Term::col(0, 0), Term::col(0, 1)])
            .insert_into("out");
        assert_eq!(run(rule, &catalog), 1);
        assert_eq!(catalog.relation("out").unwrap().to_vec(), vec![vec![2, 5]]);
    }

    #[test]
    fn test_exact_probe_and_constant_scan() {
        let catalog = catalog();
        let rule = RuleEval::scan("out(2,y) :- edge(2,y), label(y,9).", "edge")
            .scan_bound(0, 2)
            .probe("label", [(0, Term::col(0, 1)), (1, Term::Const(9))])
            .project([Term::col(0, 0), Term::col(1, 0)])
            .insert_into("out");
        assert_eq!(run(rule, &catalog), 1);
        assert_eq!(catalog.relation("out").unwrap().to_vec(), vec![vec![2, 3]]);
    }

    #[test]
    fn test_eq_filter_and_duplicates_not_counted() {
        let catalog = catalog();
        let rule = RuleEval::scan("out(y,y) :- edge(x,y), label(y,l), l = 9.", "edge")
            .probe("label", [(0, Term::col(0, 1))])
            .filter(Filter::Eq(Term::col(1, 1), Term::Const(9)))
            .project([Term::col(0, 1), Term::col(0, 1)])
            .insert_into("out");
        assert_eq!(run(rule, &catalog), 2);
        assert_eq!(
            catalog.relation("out").unwrap().to_vec(),
            vec![vec![2, 2], vec![3, 3]]
        );
    }

    #[test]
    fn test_blocked_on_empty_read() {
        let catalog = catalog();
        catalog.relation("label").unwrap().purge();
        let plan = Plan::new().stratum(
            Stratum::new("s").rule(
                RuleEval::scan("r", "edge")
                    .probe("label", [(0, Term::col(0, 1))])
                    .project([Term::col(0, 0), Term::col(1, 1)])
                    .insert_into("out"),
            ),
        );
        let compiled = compile(&plan, &catalog).unwrap();
        let Op::Query(rule) = &compiled.strata[0].body[0] else {
            panic!("expected query");
        };
        assert!(rule.is_blocked(&catalog));
    }
}
