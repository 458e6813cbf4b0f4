//! # Strata
//!
//! Runs the transitive closure program over a chain graph and reports what
//! the engine did.
//!
//! ## Usage
//!
//! ```bash
//! strata --nodes 500 --jobs 8 --output-dir ./out
//! strata --config ./strata.toml --indirect --stats
//! ```

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::OnceLock;
use strata::config::LoggingConfig;
use strata::{programs, Config, StorageMode, Word};

static TRACE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "strata", about = "Stratified Datalog evaluation demo")]
struct Cli {
    /// Configuration file (default: strata.toml and strata.local.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker threads (0 = all cores). Overrides the configuration.
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Directory for output relations. Overrides the configuration.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Do not write output relations.
    #[arg(long)]
    no_output: bool,

    /// Number of nodes in the input chain.
    #[arg(long, default_value = "100")]
    nodes: Word,

    /// Store the path relations in a shared arena.
    #[arg(long)]
    indirect: bool,

    /// Print relation statistics after the run.
    #[arg(long)]
    stats: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::load().unwrap_or_else(|_| Config::default()),
    };
    if let Some(jobs) = cli.jobs {
        config.evaluation.num_threads = jobs;
    }
    if let Some(dir) = cli.output_dir {
        config.output.directory = dir;
    }
    if cli.no_output {
        config.output.enabled = false;
    }

    init_tracing(&config.logging);

    let storage = if cli.indirect {
        StorageMode::Indirect
    } else {
        StorageMode::Direct
    };
    let mut engine = programs::transitive_closure(storage)?
        .with_facts("edge", programs::chain(cli.nodes))?
        .into_engine(&config)?;

    let summary = engine.run()?;

    println!("{summary}");
    for relation in engine.catalog().iter() {
        println!("  {:<12} {:>10} tuples", relation.name(), relation.len());
    }
    if cli.stats {
        print!("{}", engine.statistics());
    }
    Ok(())
}

fn init_tracing(logging_config: &LoggingConfig) {
    // RUST_LOG takes precedence over the configured level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&logging_config.level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = TRACE_GUARD.set(guard);

    let base = || {
        tracing_subscriber::fmt()
            .with_env_filter(filter.clone())
            .with_thread_names(true)
            .with_writer(non_blocking.clone())
    };

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if logging_config.format == "json" {
        Box::new(base().json().finish())
    } else {
        Box::new(base().compact().finish())
    };

    let _ = tracing::subscriber::set_global_default(subscriber);
}
