use simtune::engines::evaluation::{EvalFailure, Evaluator, FitnessCache};
use simtune::engines::generation::{EvolutionEngine, GeneSchema, ProgressCallback};
use simtune::{EvaluationContext, GeneVector, TuningConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Stub fitness: the sum of all scheme ids. The known optimum is the
/// smallest feasible per-slot sum, which the schema can enumerate.
struct SumEvaluator {
    calls: AtomicUsize,
}

impl SumEvaluator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Evaluator for SumEvaluator {
    fn evaluate(
        &self,
        genes: &GeneVector,
        _context: &EvaluationContext,
    ) -> Result<f64, EvalFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(genes.iter().sum::<u32>() as f64)
    }
}

/// Progress callback that records the best fitness of every generation.
#[derive(Default)]
struct RecordingCallback {
    best_per_generation: Vec<f64>,
}

impl ProgressCallback for RecordingCallback {
    fn on_generation_start(&mut self, _generation: usize) {}

    fn on_generation_complete(&mut self, _generation: usize, best_fitness: f64, _cache_size: usize) {
        self.best_per_generation.push(best_fitness);
    }

    fn on_individual_evaluated(&mut self, _evaluated: usize, _total: usize) {}
}

fn test_config(population_size: usize, generations: usize, seed: u64) -> TuningConfig {
    TuningConfig {
        population_size,
        generations,
        mutation_rate: None,
        elite_fraction: 0.34,
        tournament_size: 3,
        workers: 4,
        eval_timeout_secs: 30,
        seed: Some(seed),
    }
}

fn ctx() -> EvaluationContext {
    EvaluationContext::new("2011-07-15..2011-07-18")
}

#[test]
fn test_single_generation_returns_evaluated_best() {
    let schema = GeneSchema::suite_default();
    let cache = FitnessCache::open_in_memory(&schema).unwrap();
    let evaluator = SumEvaluator::new();

    let mut config = test_config(6, 1, 42);
    config.mutation_rate = Some(0.0);

    let mut engine =
        EvolutionEngine::new(config, schema.clone(), evaluator.clone(), cache).unwrap();
    let best = engine.run(&[ctx()], RecordingCallback::default()).unwrap();

    let fitness = best.fitness.expect("best individual is evaluated");
    assert!(schema.is_feasible(&best.genes));
    assert_eq!(fitness, best.genes.iter().sum::<u32>() as f64);
    assert!(fitness >= schema.min_feasible_sum());
}

#[test]
fn test_best_fitness_never_worsens_across_generations() {
    let schema = GeneSchema::suite_default();
    let cache = FitnessCache::open_in_memory(&schema).unwrap();
    let evaluator = SumEvaluator::new();

    let mut engine = EvolutionEngine::new(
        test_config(12, 15, 7),
        schema,
        evaluator.clone(),
        cache,
    )
    .unwrap();

    let mut callback = RecordingCallback::default();
    engine.run(&[ctx()], &mut callback).unwrap();

    assert_eq!(callback.best_per_generation.len(), 15);
    for pair in callback.best_per_generation.windows(2) {
        assert!(
            pair[1] <= pair[0],
            "best fitness worsened: {:?}",
            callback.best_per_generation
        );
    }
}

#[test]
fn test_converges_toward_minimum_feasible_sum() {
    let schema = GeneSchema::suite_default();
    let cache = FitnessCache::open_in_memory(&schema).unwrap();
    let evaluator = SumEvaluator::new();
    let optimum = schema.min_feasible_sum();

    let mut config = test_config(30, 50, 1234);
    config.mutation_rate = Some(0.2);

    let mut engine = EvolutionEngine::new(config, schema, evaluator.clone(), cache).unwrap();
    let mut callback = RecordingCallback::default();
    let best = engine.run(&[ctx()], &mut callback).unwrap();

    for pair in callback.best_per_generation.windows(2) {
        assert!(pair[1] <= pair[0]);
    }
    // The sum objective is separable per slot, so fifty generations of
    // selection pressure land within a couple of single-slot steps of
    // the optimum.
    let fitness = best.fitness.unwrap();
    assert!(fitness >= optimum);
    assert!(
        fitness <= optimum + 5.0,
        "best {} too far from optimum {}",
        fitness,
        optimum
    );
}

#[test]
fn test_cache_prepopulation_suppresses_evaluator_calls() {
    let schema = GeneSchema::suite_default();
    let cache = FitnessCache::open_in_memory(&schema).unwrap();
    let evaluator = SumEvaluator::new();

    // Score the whole feasible neighborhood the seeded run will visit by
    // running once, then rerun with the same seed against the warm cache.
    let mut first = EvolutionEngine::new(
        test_config(10, 5, 99),
        schema.clone(),
        evaluator.clone(),
        cache,
    )
    .unwrap();
    first.run(&[ctx()], RecordingCallback::default()).unwrap();
    let calls_after_first = evaluator.calls();
    assert!(calls_after_first > 0);

    let mut export = Vec::new();
    let exported = first.export_cache(&mut export).unwrap();
    assert_eq!(exported, first.cache().len().unwrap());

    // Rebuild a warm cache from the first engine's entries.
    let warm = FitnessCache::open_in_memory(&schema).unwrap();
    let text = String::from_utf8(export).unwrap();
    let mut lines = text.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("context,"));
    for line in lines {
        let fields: Vec<&str> = line.split(',').collect();
        let genes: GeneVector = fields[1..fields.len() - 1]
            .iter()
            .map(|f| f.parse().unwrap())
            .collect();
        let fitness: f64 = fields[fields.len() - 1].parse().unwrap();
        warm.record(&EvaluationContext::new(fields[0]), &genes, fitness)
            .unwrap();
    }

    let mut second = EvolutionEngine::new(
        test_config(10, 5, 99),
        schema,
        evaluator.clone(),
        warm,
    )
    .unwrap();
    second.run(&[ctx()], RecordingCallback::default()).unwrap();

    // Same seed, same trajectory: every configuration is already cached.
    assert_eq!(evaluator.calls(), calls_after_first);
}

#[test]
fn test_multiple_contexts_assigned_round_robin() {
    let schema = GeneSchema::suite_default();
    let cache = FitnessCache::open_in_memory(&schema).unwrap();
    let evaluator = SumEvaluator::new();

    let contexts = [
        EvaluationContext::new("2011-07"),
        EvaluationContext::new("2011-12"),
    ];

    let mut engine = EvolutionEngine::new(
        test_config(8, 3, 5),
        schema,
        evaluator.clone(),
        cache,
    )
    .unwrap();
    let best = engine.run(&contexts, RecordingCallback::default()).unwrap();

    assert!(contexts.contains(&best.context));
    assert!(best.fitness.is_some());
}

#[test]
fn test_history_records_every_generation() {
    let schema = GeneSchema::suite_default();
    let cache = FitnessCache::open_in_memory(&schema).unwrap();
    let evaluator = SumEvaluator::new();

    let mut engine = EvolutionEngine::new(
        test_config(6, 4, 11),
        schema,
        evaluator.clone(),
        cache,
    )
    .unwrap();
    engine.run(&[ctx()], RecordingCallback::default()).unwrap();

    let history = engine.history();
    assert_eq!(history.len(), 4);
    for (i, record) in history.iter().enumerate() {
        assert_eq!(record.generation, i);
        assert!(record.best_fitness <= record.mean_fitness);
        assert!(record.best_fitness.is_finite());
    }
    // Generation zero starts with an empty cache: no hits possible.
    assert_eq!(history[0].cache_hits, 0);
    assert!(history[0].fresh_evaluations > 0);
}

#[test]
fn test_failing_evaluator_never_aborts_the_run() {
    struct FlakyEvaluator {
        calls: AtomicUsize,
    }

    impl Evaluator for FlakyEvaluator {
        fn evaluate(
            &self,
            genes: &GeneVector,
            _context: &EvaluationContext,
        ) -> Result<f64, EvalFailure> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n % 3 == 0 {
                Err(EvalFailure::Failed("solver diverged".to_string()))
            } else {
                Ok(genes.iter().sum::<u32>() as f64)
            }
        }
    }

    let schema = GeneSchema::suite_default();
    let cache = FitnessCache::open_in_memory(&schema).unwrap();
    let evaluator = Arc::new(FlakyEvaluator {
        calls: AtomicUsize::new(0),
    });

    let mut engine = EvolutionEngine::new(
        test_config(10, 6, 21),
        schema,
        evaluator,
        cache,
    )
    .unwrap();

    let best = engine.run(&[ctx()], RecordingCallback::default()).unwrap();
    // Enough evaluations succeed for the winner to be a real one.
    assert!(best.fitness.unwrap() < simtune::INFEASIBLE_FITNESS);
    assert!(engine.history().iter().any(|r| r.failures > 0));
}
