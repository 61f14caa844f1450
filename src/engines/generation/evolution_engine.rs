use crate::config::traits::ConfigSection;
use crate::config::tuning::TuningConfig;
use crate::engines::evaluation::cache::FitnessCache;
use crate::engines::evaluation::coordinator::{EvalCoordinator, EvalStats};
use crate::engines::evaluation::evaluator::Evaluator;
use crate::engines::generation::operators::{
    crossover, find_elites, mutate, tournament_selection,
};
use crate::engines::generation::schema::GeneSchema;
use crate::error::{Result, SimtuneError};
use crate::types::{EvaluationContext, GenerationRecord, Individual};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait ProgressCallback: Send {
    fn on_generation_start(&mut self, generation: usize);
    fn on_generation_complete(&mut self, generation: usize, best_fitness: f64, cache_size: usize);
    fn on_individual_evaluated(&mut self, evaluated: usize, total: usize);
}

impl<T: ProgressCallback> ProgressCallback for &mut T {
    fn on_generation_start(&mut self, generation: usize) {
        (**self).on_generation_start(generation);
    }

    fn on_generation_complete(&mut self, generation: usize, best_fitness: f64, cache_size: usize) {
        (**self).on_generation_complete(generation, best_fitness, cache_size);
    }

    fn on_individual_evaluated(&mut self, evaluated: usize, total: usize) {
        (**self).on_individual_evaluated(evaluated, total);
    }
}

/// Generational driver: owns the population for the duration of each
/// generation and walks initialization, evaluation, selection, breeding,
/// mutation, and elite preservation until the generation budget runs out.
/// Only evaluation is concurrent; everything else runs on the driver
/// thread.
pub struct EvolutionEngine {
    config: TuningConfig,
    schema: GeneSchema,
    evaluator: Arc<dyn Evaluator>,
    cache: FitnessCache,
    coordinator: EvalCoordinator,
    history: Vec<GenerationRecord>,
    rng: StdRng,
}

impl EvolutionEngine {
    pub fn new(
        config: TuningConfig,
        schema: GeneSchema,
        evaluator: Arc<dyn Evaluator>,
        cache: FitnessCache,
    ) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let coordinator = EvalCoordinator::new(
            config.workers,
            Duration::from_secs(config.eval_timeout_secs),
        );
        Ok(Self {
            config,
            schema,
            evaluator,
            cache,
            coordinator,
            history: Vec::new(),
            rng,
        })
    }

    /// Run the full generation budget and return the best individual of
    /// the final population. `contexts` must be non-empty; with more than
    /// one, individuals are assigned contexts round-robin so every
    /// scenario stays represented, each individual carrying exactly one.
    pub fn run<C: ProgressCallback>(
        &mut self,
        contexts: &[EvaluationContext],
        mut callback: C,
    ) -> Result<Individual> {
        if contexts.is_empty() {
            return Err(SimtuneError::Configuration(
                "at least one evaluation context is required".to_string(),
            ));
        }

        let mut population = self.initialize_population(contexts);

        for generation in 0..self.config.generations {
            callback.on_generation_start(generation);
            let started = Instant::now();

            let stats = self.coordinator.evaluate_population(
                &mut population,
                &self.evaluator,
                &self.cache,
                |evaluated, total| callback.on_individual_evaluated(evaluated, total),
            )?;

            self.record_generation(generation, &population, stats, started.elapsed());
            let best_fitness = self
                .history
                .last()
                .map(|r| r.best_fitness)
                .unwrap_or(f64::INFINITY);
            callback.on_generation_complete(generation, best_fitness, self.cache.len()?);
            log::info!(
                "generation {}: best {:.6}, {} fresh, {} cached, {} failed",
                generation + 1,
                best_fitness,
                stats.fresh_evaluations,
                stats.cache_hits,
                stats.failures
            );

            if generation == self.config.generations - 1 {
                break;
            }

            population = self.next_generation(&population)?;
        }

        let best = find_elites(&population, 1)
            .into_iter()
            .next()
            .ok_or_else(|| SimtuneError::Evaluation("empty final population".to_string()))?;
        Ok(best)
    }

    fn initialize_population(&mut self, contexts: &[EvaluationContext]) -> Vec<Individual> {
        (0..self.config.population_size)
            .map(|i| {
                let genes = self.schema.random_gene_vector(&mut self.rng);
                Individual::new(genes, contexts[i % contexts.len()].clone())
            })
            .collect()
    }

    fn next_generation(&mut self, evaluated: &[Individual]) -> Result<Vec<Individual>> {
        let n_elites = self.n_elites();
        let elites = find_elites(evaluated, n_elites);

        let mating_pool = tournament_selection(
            evaluated,
            self.config.population_size,
            self.config.tournament_size,
            &mut self.rng,
        );

        let mut offspring = self.breed(&mating_pool, self.config.population_size - n_elites)?;
        mutate(
            &mut offspring,
            self.config.effective_mutation_rate(),
            &self.schema,
            &mut self.rng,
        )?;

        // Elites ride along unchanged, fitness included.
        offspring.extend(elites);
        Ok(offspring)
    }

    fn breed(&mut self, mating_pool: &[Individual], count: usize) -> Result<Vec<Individual>> {
        let mut offspring = Vec::with_capacity(count);

        // A mating pool of one cannot produce crossover offspring; carry
        // the lone parent forward as unevaluated copies.
        if mating_pool.len() < 2 {
            while offspring.len() < count {
                let mut clone = mating_pool[0].clone();
                clone.fitness = None;
                offspring.push(clone);
            }
            return Ok(offspring);
        }

        while offspring.len() < count {
            if let Some((child1, child2)) = crossover(mating_pool, &self.schema, &mut self.rng)? {
                offspring.push(child1);
                if offspring.len() < count {
                    offspring.push(child2);
                }
            }
        }
        Ok(offspring)
    }

    fn n_elites(&self) -> usize {
        let share = self.config.elite_fraction * self.config.population_size as f64;
        (share.round() as usize)
            .max(1)
            .min(self.config.population_size)
    }

    fn record_generation(
        &mut self,
        generation: usize,
        population: &[Individual],
        stats: EvalStats,
        elapsed: Duration,
    ) {
        let fitnesses: Vec<f64> = population.iter().map(|i| i.fitness_or_inf()).collect();
        let best_fitness = fitnesses.iter().cloned().fold(f64::INFINITY, f64::min);
        let mean_fitness = fitnesses.iter().sum::<f64>() / fitnesses.len().max(1) as f64;

        self.history.push(GenerationRecord {
            generation,
            best_fitness,
            mean_fitness,
            fresh_evaluations: stats.fresh_evaluations,
            cache_hits: stats.cache_hits,
            failures: stats.failures,
            elapsed_secs: elapsed.as_secs_f64(),
            completed_at: Utc::now(),
        });
    }

    /// Per-generation summaries, oldest first.
    pub fn history(&self) -> &[GenerationRecord] {
        &self.history
    }

    /// Dump the full fitness cache for audit.
    pub fn export_cache<W: std::io::Write>(&self, sink: W) -> Result<usize> {
        self.cache.export(sink)
    }

    pub fn cache(&self) -> &FitnessCache {
        &self.cache
    }
}
