use simtune::engines::evaluation::{EvalFailure, FitnessCache};
use simtune::engines::generation::{EvolutionEngine, GeneSchema, ProgressCallback};
use simtune::{EvaluationContext, GeneVector, TuningConfig};
use std::env;
use std::sync::Arc;

/// CLI progress callback with elapsed-time output
struct CliProgressCallback {
    start_time: std::time::Instant,
}

impl ProgressCallback for CliProgressCallback {
    fn on_generation_start(&mut self, generation: usize) {
        println!("Generation {} starting...", generation + 1);
    }

    fn on_generation_complete(&mut self, generation: usize, best_fitness: f64, cache_size: usize) {
        let elapsed = self.start_time.elapsed();
        println!(
            "Generation {}: Best = {:.4}, Cache = {}, Time = {:.2}s",
            generation + 1,
            best_fitness,
            cache_size,
            elapsed.as_secs_f64()
        );
    }

    fn on_individual_evaluated(&mut self, evaluated: usize, total: usize) {
        if evaluated == total {
            println!("  Evaluated {}/{} configurations", evaluated, total);
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("=== Simtune Suite-Search Demo ===\n");

    let args: Vec<String> = env::args().collect();
    let population_size = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(20);
    let generations = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(15);
    let seed = args.get(3).and_then(|s| s.parse().ok());

    println!("Configuration:");
    println!("  Population size: {}", population_size);
    println!("  Generations: {}", generations);
    println!("  Seed: {:?}", seed);
    println!();

    let config = TuningConfig {
        population_size,
        generations,
        seed,
        ..Default::default()
    };

    let schema = GeneSchema::suite_default();
    let optimum = schema.min_feasible_sum();
    let cache = FitnessCache::open_in_memory(&schema)?;

    // Stand-in for the external simulation: the summed scheme ids, so the
    // known optimum is the smallest feasible per-slot sum.
    let evaluator = Arc::new(
        |genes: &GeneVector, _ctx: &EvaluationContext| -> Result<f64, EvalFailure> {
            Ok(genes.iter().sum::<u32>() as f64)
        },
    );

    let mut engine = EvolutionEngine::new(config, schema, evaluator, cache)?;
    let context = EvaluationContext::new("2011-07-15..2011-07-18");

    let callback = CliProgressCallback {
        start_time: std::time::Instant::now(),
    };
    let best = engine.run(&[context], callback)?;

    println!("\nBest individual (known optimum {}):", optimum);
    println!("{}", serde_json::to_string_pretty(&best)?);

    println!("\nFitness cache:");
    engine.export_cache(std::io::stdout().lock())?;

    Ok(())
}
