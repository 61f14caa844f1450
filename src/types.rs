use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Gene vector representation for the suite search
///
/// A gene vector is a fixed-length sequence of small integers, one per
/// configuration slot declared by the `GeneSchema` (e.g. slot 0 = which
/// microphysics scheme, slot 1 = which longwave radiation scheme).
///
/// # Why a plain integer vector?
///
/// Genetic operators work best on simple, linear structures:
/// - **Crossover**: swapping a slot between two parents is trivial
/// - **Mutation**: redrawing a single slot is straightforward
/// - **Repair**: compatibility rules rewrite slots in place
///
/// Slot meaning and legal values live in `GeneSchema`, never in the vector
/// itself, so no function can disagree about what position N means.
pub type GeneVector = Vec<u32>;

/// The scenario under which a fitness value is meaningful (e.g. a
/// simulated time window). Two individuals with equal genes but different
/// contexts are distinct cache entries and are evaluated independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationContext(String);

impl EvaluationContext {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EvaluationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A candidate configuration: genes plus the context they will be scored
/// under. Fitness is an error magnitude (lower is better) and stays `None`
/// until the evaluation coordinator assigns it, either from the cache or
/// from a fresh external evaluation. Mutation clears it again because the
/// genes changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Individual {
    pub genes: GeneVector,
    pub context: EvaluationContext,
    pub fitness: Option<f64>,
}

impl Individual {
    pub fn new(genes: GeneVector, context: EvaluationContext) -> Self {
        Self {
            genes,
            context,
            fitness: None,
        }
    }

    /// Sort/compare key: unevaluated individuals rank after everything.
    pub fn fitness_or_inf(&self) -> f64 {
        self.fitness.unwrap_or(f64::INFINITY)
    }
}

/// Per-generation summary kept by the engine for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation: usize,
    pub best_fitness: f64,
    pub mean_fitness: f64,
    pub fresh_evaluations: usize,
    pub cache_hits: usize,
    pub failures: usize,
    pub elapsed_secs: f64,
    pub completed_at: DateTime<Utc>,
}
