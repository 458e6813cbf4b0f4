//! # Evaluation Plans
//!
//! A [`Plan`] is the ordered list of strata produced by a Datalog compiler.
//! Every stratum is a list of [`Statement`]s; rule bodies are [`RuleEval`]s,
//! nested loop joins over relations in the catalog.
//!
//! ## Tuple slots
//!
//! While a rule runs, every relation access binds one tuple to a slot:
//!
//! ```text
//! path(x, z) :- delta_path(x, y), edge(y, z), !path(x, z).
//!
//!   slot 0   scan   delta_path        (x, y)
//!   slot 1   probe  edge  col0 <- slot0.col1
//!   filter   not contains path (slot0.col0, slot1.col1)
//!   project  (slot0.col0, slot1.col1) into new_path
//! ```
//!
//! [`Term::Column`] reads a column of an earlier slot; probes bind their key
//! columns from constants or such columns.
//!
//! ## Recursive strata
//!
//! Fixpoints are spelled out by the plan with [`Statement::Loop`],
//! [`Statement::Exit`], [`Statement::Merge`], [`Statement::Swap`] and
//! [`Statement::Purge`] over `delta_`/`new_` relations. The driver runs the
//! list it is given.

use crate::catalog::Catalog;
use crate::error::{EngineError, EngineResult};
use crate::tuple::Word;
use std::fmt;

/// Value source inside a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    Const(Word),
    Column { slot: usize, column: usize },
}

impl Term {
    pub fn col(slot: usize, column: usize) -> Self {
        Term::Column { slot, column }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Const(w) => write!(f, "{w}"),
            Term::Column { slot, column } => write!(f, "t{slot}.{column}"),
        }
    }
}

/// Scan or probe of one relation with some columns bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access {
    pub relation: String,
    /// `(column, value)` pairs; unlisted columns are free
    pub bindings: Vec<(usize, Term)>,
}

impl Access {
    pub fn new(relation: &str) -> Self {
        Access {
            relation: relation.to_string(),
            bindings: Vec::new(),
        }
    }
}

/// Residual condition checked once every slot it reads is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(Term, Term),
    NotEq(Term, Term),
    /// Tuple must be present in the relation
    Contains { relation: String, tuple: Vec<Term> },
    /// Tuple must be absent from the relation (negation, novelty check)
    NotContains { relation: String, tuple: Vec<Term> },
}

/// One rule evaluation: join, filter, project, insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEval {
    /// Human readable rule text, used in logs and errors
    pub label: String,
    pub scan: Access,
    pub probes: Vec<Access>,
    pub filters: Vec<Filter>,
    pub projection: Vec<Term>,
    pub target: String,
}

impl RuleEval {
    /// Rule driven by a full or constant-bound scan of `relation`.
    pub fn scan(label: &str, relation: &str) -> Self {
        RuleEval {
            label: label.to_string(),
            scan: Access::new(relation),
            probes: Vec::new(),
            filters: Vec::new(),
            projection: Vec::new(),
            target: String::new(),
        }
    }

    /// Restrict the scan to tuples with `column == value`.
    pub fn scan_bound(mut self, column: usize, value: Word) -> Self {
        self.scan.bindings.push((column, Term::Const(value)));
        self
    }

    /// Join with `relation`, binding the given columns.
    pub fn probe(mut self, relation: &str, bindings: impl IntoIterator<Item = (usize, Term)>) -> Self {
        self.probes.push(Access {
            relation: relation.to_string(),
            bindings: bindings.into_iter().collect(),
        });
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn not_contains(self, relation: &str, tuple: impl IntoIterator<Item = Term>) -> Self {
        self.filter(Filter::NotContains {
            relation: relation.to_string(),
            tuple: tuple.into_iter().collect(),
        })
    }

    pub fn project(mut self, terms: impl IntoIterator<Item = Term>) -> Self {
        self.projection = terms.into_iter().collect();
        self
    }

    pub fn insert_into(mut self, target: &str) -> Self {
        self.target = target.to_string();
        self
    }

    /// Relations whose emptiness makes the rule produce nothing.
    pub fn gating_relations(&self) -> impl Iterator<Item = &str> {
        let contains = self.filters.iter().filter_map(|f| match f {
            Filter::Contains { relation, .. } => Some(relation.as_str()),
            _ => None,
        });
        std::iter::once(self.scan.relation.as_str())
            .chain(self.probes.iter().map(|p| p.relation.as_str()))
            .chain(contains)
    }
}

/// Step of a stratum body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Query(RuleEval),
    /// Repeat the body until an [`Statement::Exit`] fires
    Loop(Vec<Statement>),
    /// Leave the innermost loop when every named relation is empty
    Exit(Vec<String>),
    /// Insert every tuple of `source` into `target`
    Merge { source: String, target: String },
    /// Exchange the contents of two relations of the same shape
    Swap(String, String),
    /// Clear a relation now
    Purge(String),
    /// Hand a relation to the output writer
    Output(String),
}

/// Named batch of statements run as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stratum {
    pub name: String,
    pub statements: Vec<Statement>,
    /// Relations released after the body when pruning is enabled
    pub prune: Vec<String>,
}

impl Stratum {
    pub fn new(name: &str) -> Self {
        Stratum {
            name: name.to_string(),
            statements: Vec::new(),
            prune: Vec::new(),
        }
    }

    pub fn statement(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }

    pub fn rule(self, rule: RuleEval) -> Self {
        self.statement(Statement::Query(rule))
    }

    pub fn output(self, relation: &str) -> Self {
        self.statement(Statement::Output(relation.to_string()))
    }

    pub fn prune(mut self, relation: &str) -> Self {
        self.prune.push(relation.to_string());
        self
    }
}

/// Ordered list of strata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub strata: Vec<Stratum>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stratum(mut self, stratum: Stratum) -> Self {
        self.strata.push(stratum);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Stratum> {
        self.strata.iter().find(|s| s.name == name)
    }

    /// Check the plan against `catalog` without running it.
    pub fn validate(&self, catalog: &Catalog) -> EngineResult<()> {
        crate::eval::compile(self, catalog).map(drop)
    }
}

/// Error for a statement of `stratum` that does not fit the catalog.
pub(crate) fn inconsistency(stratum: &str, rule: &str, reason: impl Into<String>) -> EngineError {
    EngineError::PlanInconsistency {
        stratum: stratum.to_string(),
        rule: rule.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_builder() {
        let rule = RuleEval::scan("path(x,z) :- path(x,y), edge(y,z).", "delta_path")
            .probe("edge", [(0, Term::col(0, 1))])
            .not_contains("path", [Term::col(0, 0), Term::col(1, 1)])
            .project([Term::col(0, 0), Term::col(1, 1)])
            .insert_into("new_path");
        assert_eq!(rule.probes.len(), 1);
        assert_eq!(rule.target, "new_path");
        let gating: Vec<&str> = rule.gating_relations().collect();
        assert_eq!(gating, vec!["delta_path", "edge"]);
    }

    #[test]
    fn test_contains_gates() {
        let rule = RuleEval::scan("r", "a")
            .filter(Filter::Contains {
                relation: "b".to_string(),
                tuple: vec![Term::col(0, 0)],
            })
            .project([Term::col(0, 0)])
            .insert_into("c");
        let gating: Vec<&str> = rule.gating_relations().collect();
        assert_eq!(gating, vec!["a", "b"]);
    }

    #[test]
    fn test_term_display() {
        assert_eq!(Term::col(1, 3).to_string(), "t1.3");
        assert_eq!(Term::Const(-4).to_string(), "-4");
    }

    #[test]
    fn test_stratum_builder() {
        let plan = Plan::new().stratum(
            Stratum::new("stratum_0")
                .rule(RuleEval::scan("r", "a").project([Term::col(0, 0)]).insert_into("b"))
                .output("b")
                .prune("a"),
        );
        let s = plan.get("stratum_0").unwrap();
        assert_eq!(s.statements.len(), 2);
        assert_eq!(s.prune, vec!["a".to_string()]);
        assert!(plan.get("stratum_1").is_none());
    }
}
