use super::evolution_engine::ProgressCallback;

pub struct ConsoleProgressCallback;

impl ProgressCallback for ConsoleProgressCallback {
    fn on_generation_start(&mut self, generation: usize) {
        println!("Generation {} starting...", generation + 1);
    }

    fn on_generation_complete(&mut self, generation: usize, best_fitness: f64, cache_size: usize) {
        println!(
            "Generation {} complete. Best fitness: {:.4}, cache entries: {}",
            generation + 1,
            best_fitness,
            cache_size
        );
    }

    fn on_individual_evaluated(&mut self, evaluated: usize, total: usize) {
        if total > 0 && (evaluated % 10 == 0 || evaluated == total) {
            println!("  Evaluated {}/{} configurations", evaluated, total);
        }
    }
}

/// Callback for callers that do not care about progress.
pub struct SilentProgressCallback;

impl ProgressCallback for SilentProgressCallback {
    fn on_generation_start(&mut self, _generation: usize) {}
    fn on_generation_complete(&mut self, _generation: usize, _best_fitness: f64, _cache_size: usize) {}
    fn on_individual_evaluated(&mut self, _evaluated: usize, _total: usize) {}
}
