//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - strata.toml (default configuration)
//! - strata.local.toml (git-ignored local overrides)
//! - Environment variables (STRATA_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # strata.toml
//! [evaluation]
//! num_threads = 8
//! prune_intermediate = true
//!
//! [output]
//! directory = "./out"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! STRATA_EVALUATION__NUM_THREADS=1
//! STRATA_OUTPUT__ENABLED=false
//! ```

use crate::index::DEFAULT_CHUNK_SIZE;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Evaluation driver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Number of worker threads for parallel rule evaluation
    /// 0 = use all available CPU cores
    #[serde(default)]
    pub num_threads: usize,

    /// Release intermediate relations once their last reader has run
    #[serde(default = "default_true")]
    pub prune_intermediate: bool,

    /// Maximum tuples per partition handed to one worker
    #[serde(default = "default_partition_chunk_size")]
    pub partition_chunk_size: usize,

    /// Driving relations smaller than this are scanned on the calling thread
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,

    /// Upper bound on fixpoint iterations per loop. 0 = unbounded.
    #[serde(default)]
    pub max_loop_iterations: usize,
}

/// Relation output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Write output relations when their stratum finishes
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory receiving one file per output relation
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_partition_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_parallel_threshold() -> usize {
    1000
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. strata.toml (base configuration)
    /// 2. strata.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (STRATA_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("strata.toml"))
            .merge(Toml::file("strata.local.toml"))
            .merge(Env::prefixed("STRATA_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("STRATA_").split("__"))
            .extract()
    }
}

impl EvaluationConfig {
    /// Worker count with 0 resolved to the number of cores.
    pub fn worker_threads(&self) -> usize {
        if self.num_threads == 0 {
            num_cpus::get()
        } else {
            self.num_threads
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        EvaluationConfig {
            num_threads: 0, // 0 = use all available CPU cores
            prune_intermediate: true,
            partition_chunk_size: default_partition_chunk_size(),
            parallel_threshold: default_parallel_threshold(),
            max_loop_iterations: 0,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            enabled: true,
            directory: default_output_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
