//! # Evaluation Driver
//!
//! Runs a compiled [`Plan`] over a [`Catalog`]. Strata run strictly in plan
//! order, each exactly once per [`Engine::run`]:
//!
//! ```text
//! Pending -> Running -> Done
//!
//! stratum body
//!   Query    skip if a read relation is empty, else join
//!            (partitioned across the worker pool when the scan is large)
//!   Loop     repeat until an Exit finds its relations empty
//!   Merge / Swap / Purge / Output
//! prune list (when evaluation.prune_intermediate is set)
//! ```
//!
//! The engine owns the program state: the catalog, the worker pool, the
//! output writer and the run counters.

mod compile;
mod join;

pub(crate) use compile::compile;

use crate::catalog::{Catalog, RelationId};
use crate::config::{Config, EvaluationConfig};
use crate::error::{EngineError, EngineResult};
use crate::output::{CsvWriter, NullWriter, RelationWriter};
use crate::plan::Plan;
use crate::relation::Relation;
use crate::statistics::EngineStatistics;
use compile::{CompiledPlan, CompiledRule, Op};
use join::JoinScratch;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Lifecycle of one stratum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StratumState {
    Pending,
    Running,
    Done,
    /// Stopped on an error; its relations may hold partial results
    Failed,
}

/// Work counters, cumulative since the engine was built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub strata_run: usize,
    pub rules_evaluated: usize,
    pub rules_skipped: usize,
    pub tuples_derived: usize,
    pub loop_iterations: usize,
    pub relations_purged: usize,
}

/// Result of [`Engine::run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    #[serde(flatten)]
    pub counters: RunCounters,
    pub threads: usize,
    pub elapsed: Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counters;
        write!(
            f,
            "{} strata, {} rules evaluated, {} skipped, {} tuples derived, {} loop iterations, {} purges on {} threads in {:.3?}",
            c.strata_run,
            c.rules_evaluated,
            c.rules_skipped,
            c.tuples_derived,
            c.loop_iterations,
            c.relations_purged,
            self.threads,
            self.elapsed
        )
    }
}

/// Control flow out of a statement list.
enum Flow {
    Continue,
    Exit,
}

/// Everything the statements of a stratum act on.
struct ProgramState {
    catalog: Catalog,
    settings: EvaluationConfig,
    output_enabled: bool,
    threads: usize,
    pool: rayon::ThreadPool,
    writer: Box<dyn RelationWriter>,
    counters: RunCounters,
}

/// Stratified evaluation engine.
pub struct Engine {
    plan: CompiledPlan,
    states: Vec<StratumState>,
    state: ProgramState,
}

impl Engine {
    /// Compile `plan` against `catalog` and start the worker pool.
    ///
    /// Output goes to a [`CsvWriter`] on `config.output.directory` unless
    /// output is disabled.
    pub fn new(catalog: Catalog, plan: &Plan, config: &Config) -> EngineResult<Self> {
        let compiled = compile(plan, &catalog)?;
        let threads = config.evaluation.worker_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("strata-worker-{i}"))
            .build()?;
        let writer: Box<dyn RelationWriter> = if config.output.enabled {
            Box::new(CsvWriter::new(&config.output.directory))
        } else {
            Box::new(NullWriter)
        };
        debug!(
            strata = compiled.strata.len(),
            relations = catalog.len(),
            threads,
            "engine_created"
        );
        Ok(Engine {
            states: vec![StratumState::Pending; compiled.strata.len()],
            plan: compiled,
            state: ProgramState {
                catalog,
                settings: config.evaluation.clone(),
                output_enabled: config.output.enabled,
                threads,
                pool,
                writer,
                counters: RunCounters::default(),
            },
        })
    }

    /// Replace the output writer.
    pub fn with_writer(mut self, writer: impl RelationWriter + 'static) -> Self {
        self.state.writer = Box::new(writer);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.state.catalog
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.state.catalog.relation(name)
    }

    pub fn threads(&self) -> usize {
        self.state.threads
    }

    pub fn counters(&self) -> &RunCounters {
        &self.state.counters
    }

    pub fn stratum_state(&self, name: &str) -> Option<StratumState> {
        self.plan.by_name.get(name).map(|&n| self.states[n])
    }

    pub fn statistics(&self) -> EngineStatistics {
        self.state.catalog.statistics()
    }

    /// Run every stratum in order.
    pub fn run(&mut self) -> EngineResult<RunSummary> {
        let start = Instant::now();
        let before = self.state.counters.clone();
        info!(
            strata = self.plan.strata.len(),
            threads = self.state.threads,
            "evaluation_start"
        );
        for number in 0..self.plan.strata.len() {
            self.execute(number)?;
        }
        let summary = RunSummary {
            counters: self.state.counters.since(&before),
            threads: self.state.threads,
            elapsed: start.elapsed(),
        };
        info!(
            tuples_derived = summary.counters.tuples_derived,
            rules_evaluated = summary.counters.rules_evaluated,
            rules_skipped = summary.counters.rules_skipped,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "evaluation_done"
        );
        Ok(summary)
    }

    /// Run one stratum by name.
    pub fn run_stratum(&mut self, name: &str) -> EngineResult<()> {
        let number = *self
            .plan
            .by_name
            .get(name)
            .ok_or_else(|| EngineError::UnknownStratum(name.to_string()))?;
        self.execute(number)
    }

    /// Write every relation named by an output statement of the plan.
    pub fn print_all(&self, writer: &mut dyn RelationWriter) -> EngineResult<()> {
        let mut seen = Vec::new();
        for stratum in &self.plan.strata {
            collect_outputs(&stratum.body, &mut seen);
        }
        for id in seen {
            write_relation(self.state.catalog.get(id), writer)?;
        }
        Ok(())
    }

    fn execute(&mut self, number: usize) -> EngineResult<()> {
        let stratum = &self.plan.strata[number];
        let start = Instant::now();
        self.states[number] = StratumState::Running;
        debug!(stratum = %stratum.name, "stratum_start");

        if let Err(err) = self.state.ops(&stratum.body, &stratum.name) {
            self.states[number] = StratumState::Failed;
            warn!(stratum = %stratum.name, error = %err, "stratum_failed");
            return Err(err);
        }

        if self.state.settings.prune_intermediate {
            for &id in &stratum.prune {
                self.state.purge(id);
            }
        }
        self.state.counters.strata_run += 1;
        self.states[number] = StratumState::Done;
        debug!(
            stratum = %stratum.name,
            elapsed_us = start.elapsed().as_micros() as u64,
            "stratum_done"
        );
        Ok(())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("strata", &self.plan.strata.len())
            .field("relations", &self.state.catalog.len())
            .field("threads", &self.state.threads)
            .finish()
    }
}

impl RunCounters {
    fn since(&self, earlier: &RunCounters) -> RunCounters {
        RunCounters {
            strata_run: self.strata_run - earlier.strata_run,
            rules_evaluated: self.rules_evaluated - earlier.rules_evaluated,
            rules_skipped: self.rules_skipped - earlier.rules_skipped,
            tuples_derived: self.tuples_derived - earlier.tuples_derived,
            loop_iterations: self.loop_iterations - earlier.loop_iterations,
            relations_purged: self.relations_purged - earlier.relations_purged,
        }
    }
}

fn collect_outputs(ops: &[Op], seen: &mut Vec<RelationId>) {
    for op in ops {
        match op {
            Op::Output(id) if !seen.contains(id) => seen.push(*id),
            Op::Loop(body) => collect_outputs(body, seen),
            _ => {}
        }
    }
}

fn write_relation(relation: &Relation, writer: &mut dyn RelationWriter) -> EngineResult<()> {
    let range = relation.iter();
    let mut tuples = range.iter();
    writer
        .write_relation(relation.name(), relation.arity(), &mut tuples)
        .map_err(|source| EngineError::Output {
            relation: relation.name().to_string(),
            source,
        })
}

impl ProgramState {
    fn ops(&mut self, ops: &[Op], stratum: &str) -> EngineResult<Flow> {
        for op in ops {
            match op {
                Op::Query(rule) => self.query(rule, stratum),
                Op::Loop(body) => self.fixpoint(body, stratum)?,
                Op::Exit(ids) => {
                    if ids.iter().all(|&id| self.catalog.get(id).is_empty()) {
                        return Ok(Flow::Exit);
                    }
                }
                Op::Merge { source, target } => {
                    let (source, target) = (self.catalog.get(*source), self.catalog.get(*target));
                    let mut ctx = target.create_context();
                    let range = source.iter();
                    let merged = range
                        .iter()
                        .filter(|tuple| target.insert_with(tuple, &mut ctx))
                        .count();
                    trace!(source = source.name(), target = target.name(), merged, "merge");
                }
                Op::Swap(a, b) => self.catalog.swap(*a, *b)?,
                Op::Purge(id) => self.purge(*id),
                Op::Output(id) => {
                    if self.output_enabled {
                        let relation = self.catalog.get(*id);
                        debug!(relation = relation.name(), tuples = relation.len(), "output");
                        write_relation(relation, self.writer.as_mut())?;
                    }
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn fixpoint(&mut self, body: &[Op], stratum: &str) -> EngineResult<()> {
        let limit = self.settings.max_loop_iterations;
        let mut iteration = 0;
        loop {
            if limit > 0 && iteration == limit {
                warn!(stratum, limit, "loop_iteration_limit");
                return Err(EngineError::IterationLimit {
                    stratum: stratum.to_string(),
                    limit,
                });
            }
            iteration += 1;
            self.counters.loop_iterations += 1;
            trace!(stratum, iteration, "loop_iteration");
            if let Flow::Exit = self.ops(body, stratum)? {
                debug!(stratum, iterations = iteration, "loop_fixpoint");
                return Ok(());
            }
        }
    }

    fn query(&mut self, rule: &CompiledRule, stratum: &str) {
        let catalog = &self.catalog;
        if rule.is_blocked(catalog) {
            self.counters.rules_skipped += 1;
            debug!(stratum, rule = %rule.label, "rule_skipped_empty_input");
            return;
        }

        let scan = catalog.get(rule.scan.relation);
        let parallel = self.threads > 1
            && rule.scan.pattern.is_free()
            && scan.len() >= self.settings.parallel_threshold;
        let derived = if parallel {
            let chunks = scan.partition(self.settings.partition_chunk_size);
            self.pool.install(|| {
                chunks
                    .par_iter()
                    .map_init(
                        || JoinScratch::new(rule, catalog),
                        |scratch, chunk| rule.join_chunk(catalog, chunk, scratch),
                    )
                    .sum::<usize>()
            })
        } else {
            let range = rule.scan_range(catalog);
            let mut scratch = JoinScratch::new(rule, catalog);
            rule.join_chunk(catalog, &range, &mut scratch)
        };

        self.counters.rules_evaluated += 1;
        self.counters.tuples_derived += derived;
        debug!(stratum, rule = %rule.label, derived, parallel, "rule_evaluated");
    }

    fn purge(&mut self, id: RelationId) {
        let relation = self.catalog.get(id);
        debug!(relation = relation.name(), tuples = relation.len(), "purge");
        relation.purge();
        self.counters.relations_purged += 1;
    }
}
