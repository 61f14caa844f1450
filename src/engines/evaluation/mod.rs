pub mod evaluator;
pub mod cache;
pub mod coordinator;

pub use evaluator::{EvalFailure, Evaluator, INFEASIBLE_FITNESS};
pub use cache::FitnessCache;
pub use coordinator::{EvalCoordinator, EvalStats};
