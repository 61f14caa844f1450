pub mod schema;
pub mod operators;
pub mod evolution_engine;
pub mod progress;

pub use schema::{GeneSchema, RepairRule, SlotSpec};
pub use evolution_engine::{EvolutionEngine, ProgressCallback};
pub use progress::{ConsoleProgressCallback, SilentProgressCallback};
