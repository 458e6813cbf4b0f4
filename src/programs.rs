//! Ready-made programs.
//!
//! [`transitive_closure`] is the classic two-stratum reachability program,
//! laid out the way a compiler emits it for semi-naive evaluation:
//!
//! ```text
//! stratum_edge   path(x, y) :- edge(x, y).
//! stratum_path   delta_path := path
//!                loop
//!                  new_path(x, z) :- delta_path(x, y), edge(y, z), !path(x, z).
//!                  exit when new_path is empty
//!                  path += new_path
//!                  swap delta_path, new_path
//!                  purge new_path
//!                output path
//!                prune delta_path, edge
//! ```

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::EngineResult;
use crate::eval::Engine;
use crate::plan::{Plan, RuleEval, Statement, Stratum, Term};
use crate::relation::{IndexSpec, RelationSpec, StorageMode};
use crate::tuple::Word;

/// A catalog with its plan, ready to be handed to an [`Engine`].
#[derive(Debug)]
pub struct Program {
    pub catalog: Catalog,
    pub plan: Plan,
}

impl Program {
    /// Load `facts` into the input relation `name`.
    pub fn with_facts<I, T>(self, name: &str, facts: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[Word]>,
    {
        self.catalog.insert_facts(name, facts)?;
        Ok(self)
    }

    pub fn into_engine(self, config: &Config) -> EngineResult<Engine> {
        Engine::new(self.catalog, &self.plan, config)
    }
}

/// `path` as the transitive closure of `edge`. `storage` applies to the
/// `path` family of relations.
pub fn transitive_closure(storage: StorageMode) -> EngineResult<Program> {
    let mut catalog = Catalog::new();
    catalog.register(RelationSpec::new("edge", 2).index(IndexSpec::new(vec![0, 1]).serving("10")))?;
    catalog.register(
        RelationSpec::new("path", 2)
            .index(IndexSpec::new(vec![0, 1]).serving("11"))
            .index(IndexSpec::new(vec![1, 0]).serving("01"))
            .storage(storage),
    )?;
    for name in ["delta_path", "new_path"] {
        catalog.register(RelationSpec::new(name, 2).storage(storage))?;
    }

    let x = Term::col(0, 0);
    let plan = Plan::new()
        .stratum(
            Stratum::new("stratum_edge").rule(
                RuleEval::scan("path(x,y) :- edge(x,y).", "edge")
                    .project([x, Term::col(0, 1)])
                    .insert_into("path"),
            ),
        )
        .stratum(
            Stratum::new("stratum_path")
                .statement(Statement::Merge {
                    source: "path".to_string(),
                    target: "delta_path".to_string(),
                })
                .statement(Statement::Loop(vec![
                    Statement::Query(
                        RuleEval::scan("path(x,z) :- path(x,y), edge(y,z).", "delta_path")
                            .probe("edge", [(0, Term::col(0, 1))])
                            .not_contains("path", [x, Term::col(1, 1)])
                            .project([x, Term::col(1, 1)])
                            .insert_into("new_path"),
                    ),
                    Statement::Exit(vec!["new_path".to_string()]),
                    Statement::Merge {
                        source: "new_path".to_string(),
                        target: "path".to_string(),
                    },
                    Statement::Swap("delta_path".to_string(), "new_path".to_string()),
                    Statement::Purge("new_path".to_string()),
                ]))
                .output("path")
                .prune("delta_path")
                .prune("edge"),
        );

    Ok(Program { catalog, plan })
}

/// Edges `(i, i + 1)` for `i` in `1..nodes`.
pub fn chain(nodes: Word) -> Vec<[Word; 2]> {
    (1..nodes).map(|i| [i, i + 1]).collect()
}
