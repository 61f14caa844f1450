use crate::types::{EvaluationContext, GeneVector};
use std::time::Duration;
use thiserror::Error;

/// Fitness assigned when an evaluation fails or times out. Large enough to
/// lose every tournament and elite comparison against any real error
/// magnitude, so broken configurations drain out of the population without
/// special-casing.
pub const INFEASIBLE_FITNESS: f64 = 1.0e12;

/// Why a single evaluation produced no usable fitness. Converted to
/// [`INFEASIBLE_FITNESS`] only at the point where the individual must be
/// compared against the rest of the population; never written to the
/// cache, so the same genes can be retried on a later encounter.
#[derive(Error, Debug, Clone)]
pub enum EvalFailure {
    #[error("evaluator failed: {0}")]
    Failed(String),

    #[error("evaluator panicked")]
    Panicked,

    #[error("evaluation exceeded {0:?}")]
    TimedOut(Duration),
}

/// The externally supplied fitness function. The reference workflow runs
/// one external simulation process per call, so implementations must be
/// callable concurrently from multiple workers with no shared mutable
/// state between calls. Returns the scalar error magnitude for `genes`
/// under `context` (lower is better).
pub trait Evaluator: Send + Sync {
    fn evaluate(
        &self,
        genes: &GeneVector,
        context: &EvaluationContext,
    ) -> std::result::Result<f64, EvalFailure>;
}

/// Closures double as evaluators, which keeps tests and demos short.
impl<F> Evaluator for F
where
    F: Fn(&GeneVector, &EvaluationContext) -> std::result::Result<f64, EvalFailure> + Send + Sync,
{
    fn evaluate(
        &self,
        genes: &GeneVector,
        context: &EvaluationContext,
    ) -> std::result::Result<f64, EvalFailure> {
        self(genes, context)
    }
}
