use crate::engines::evaluation::cache::FitnessCache;
use crate::engines::evaluation::evaluator::{EvalFailure, Evaluator, INFEASIBLE_FITNESS};
use crate::error::Result;
use crate::types::{EvaluationContext, GeneVector, Individual};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// What one generation's evaluation barrier cost.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalStats {
    pub cache_hits: usize,
    pub fresh_evaluations: usize,
    pub failures: usize,
}

/// One unit of work handed to the pool: a unique (context, genes) pair and
/// the population indices that share it.
struct Job {
    key_indices: Vec<usize>,
    genes: GeneVector,
    context: EvaluationContext,
}

struct InFlight {
    job: Job,
    deadline: Instant,
}

/// Dispatches fitness computation for a population across a bounded pool
/// of worker threads, consulting the cache first and writing fresh results
/// back. Each generation is a full join barrier: the coordinator returns
/// only once every individual carries a fitness.
pub struct EvalCoordinator {
    workers: usize,
    timeout: Duration,
}

impl EvalCoordinator {
    pub fn new(workers: usize, timeout: Duration) -> Self {
        Self {
            workers: workers.max(1),
            timeout,
        }
    }

    /// Assign a fitness to every individual that lacks one.
    ///
    /// Cache lookups run synchronously up front; identical (context,
    /// genes) pairs collapse to a single dispatched job whose result fans
    /// out to every holder, so an expensive evaluation is never paid twice
    /// in one generation. Evaluator failures, panics, and deadline misses
    /// become [`INFEASIBLE_FITNESS`] without touching the cache.
    pub fn evaluate_population(
        &self,
        population: &mut [Individual],
        evaluator: &Arc<dyn Evaluator>,
        cache: &FitnessCache,
        mut on_evaluated: impl FnMut(usize, usize),
    ) -> Result<EvalStats> {
        let mut stats = EvalStats::default();

        // Step 1+2: cache pass over everything not carrying a fitness
        // (carried-over elites keep theirs).
        let mut pending: HashMap<(EvaluationContext, GeneVector), Vec<usize>> = HashMap::new();
        for (i, individual) in population.iter_mut().enumerate() {
            if individual.fitness.is_some() {
                continue;
            }
            if let Some(fitness) = cache.lookup(&individual.context, &individual.genes)? {
                log::debug!(
                    "cache hit for {:?} under '{}'",
                    individual.genes,
                    individual.context
                );
                individual.fitness = Some(fitness);
                stats.cache_hits += 1;
                continue;
            }
            pending
                .entry((individual.context.clone(), individual.genes.clone()))
                .or_default()
                .push(i);
        }

        // Step 3: one job per unique uncached pair.
        let mut queue: Vec<Job> = pending
            .into_iter()
            .map(|((context, genes), key_indices)| Job {
                key_indices,
                genes,
                context,
            })
            .collect();
        // HashMap iteration order is arbitrary; dispatch in population
        // order so seeded runs stay reproducible in their logs.
        queue.sort_by_key(|job| job.key_indices[0]);
        queue.reverse();

        let total_jobs = queue.len();
        let mut completed_jobs = 0usize;
        let (tx, rx) = channel::<(usize, std::result::Result<f64, EvalFailure>)>();
        let mut in_flight: HashMap<usize, InFlight> = HashMap::new();
        let mut next_id = 0usize;

        let dispatch = |job: Job,
                        id: usize,
                        in_flight: &mut HashMap<usize, InFlight>| {
            let genes = job.genes.clone();
            let context = job.context.clone();
            let evaluator = Arc::clone(evaluator);
            let tx: Sender<(usize, std::result::Result<f64, EvalFailure>)> = tx.clone();
            thread::spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    evaluator.evaluate(&genes, &context)
                }))
                .unwrap_or(Err(EvalFailure::Panicked));
                // The receiver may have given up on this job; a failed
                // send just means the result arrived after its deadline.
                let _ = tx.send((id, outcome));
            });
            in_flight.insert(
                id,
                InFlight {
                    job,
                    deadline: Instant::now() + self.timeout,
                },
            );
        };

        while in_flight.len() < self.workers {
            match queue.pop() {
                Some(job) => {
                    dispatch(job, next_id, &mut in_flight);
                    next_id += 1;
                }
                None => break,
            }
        }

        // Steps 4-6: collect until the barrier drains, replacing each
        // finished job with the next queued one.
        while !in_flight.is_empty() {
            let earliest = in_flight
                .values()
                .map(|f| f.deadline)
                .min()
                .expect("in-flight set is non-empty");
            let wait = earliest.saturating_duration_since(Instant::now());

            match rx.recv_timeout(wait) {
                Ok((id, outcome)) => {
                    // Stragglers past their deadline were already settled.
                    let Some(finished) = in_flight.remove(&id) else {
                        continue;
                    };
                    match outcome {
                        Ok(fitness) => {
                            cache.record_or_drop(&finished.job.context, &finished.job.genes, fitness);
                            for &i in &finished.job.key_indices {
                                population[i].fitness = Some(fitness);
                            }
                            stats.fresh_evaluations += 1;
                        }
                        Err(failure) => {
                            log::warn!(
                                "evaluation of {:?} under '{}' failed: {}",
                                finished.job.genes,
                                finished.job.context,
                                failure
                            );
                            for &i in &finished.job.key_indices {
                                population[i].fitness = Some(INFEASIBLE_FITNESS);
                            }
                            stats.failures += 1;
                        }
                    }
                    completed_jobs += 1;
                    on_evaluated(completed_jobs, total_jobs);
                }
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    let expired: Vec<usize> = in_flight
                        .iter()
                        .filter(|(_, f)| f.deadline <= now)
                        .map(|(&id, _)| id)
                        .collect();
                    for id in expired {
                        let finished = in_flight.remove(&id).expect("expired id is in flight");
                        log::warn!(
                            "evaluation of {:?} under '{}' failed: {}",
                            finished.job.genes,
                            finished.job.context,
                            EvalFailure::TimedOut(self.timeout)
                        );
                        for &i in &finished.job.key_indices {
                            population[i].fitness = Some(INFEASIBLE_FITNESS);
                        }
                        stats.failures += 1;
                        completed_jobs += 1;
                        on_evaluated(completed_jobs, total_jobs);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // Unreachable while we hold `tx`, but settle anyway.
                    for (_, finished) in in_flight.drain() {
                        for &i in &finished.job.key_indices {
                            population[i].fitness = Some(INFEASIBLE_FITNESS);
                        }
                        stats.failures += 1;
                    }
                }
            }

            while in_flight.len() < self.workers {
                match queue.pop() {
                    Some(job) => {
                        dispatch(job, next_id, &mut in_flight);
                        next_id += 1;
                    }
                    None => break,
                }
            }
        }

        Ok(stats)
    }
}
