//! Evolutionary tuner for categorical simulation-suite configurations.
//!
//! A small, fixed set of scheme choices is searched with a tournament
//! genetic algorithm against an expensive, failure-prone, caller-supplied
//! fitness function. Previously-scored configurations are memoized in a
//! durable cache, infeasible combinations are repaired against declared
//! compatibility rules, and evaluations run on a bounded worker pool with
//! per-evaluation timeouts.

pub mod config;
pub mod engines;
pub mod error;
pub mod types;

pub use config::{AppConfig, CacheConfig, ConfigManager, TuningConfig};
pub use engines::evaluation::{EvalFailure, Evaluator, FitnessCache, INFEASIBLE_FITNESS};
pub use engines::generation::{
    ConsoleProgressCallback, EvolutionEngine, GeneSchema, ProgressCallback,
};
pub use error::{Result, SimtuneError};
pub use types::{EvaluationContext, GeneVector, GenerationRecord, Individual};
