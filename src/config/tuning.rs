use super::traits::ConfigSection;
use crate::error::{Result, SimtuneError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    pub population_size: usize,
    pub generations: usize,
    /// Probability of mutating each offspring. `None` uses the reference
    /// default of one expected mutation per generation (1 / population).
    pub mutation_rate: Option<f64>,
    pub elite_fraction: f64,
    pub tournament_size: usize,
    /// Concurrent evaluation workers. Kept small: each unit of work runs
    /// an external simulation for minutes to hours.
    pub workers: usize,
    pub eval_timeout_secs: u64,
    pub seed: Option<u64>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            population_size: 24,
            generations: 10,
            mutation_rate: None,
            elite_fraction: 0.34,
            tournament_size: 3,
            workers: 4,
            eval_timeout_secs: 3600,
            seed: None,
        }
    }
}

impl TuningConfig {
    pub fn effective_mutation_rate(&self) -> f64 {
        self.mutation_rate
            .unwrap_or(1.0 / self.population_size as f64)
    }
}

impl ConfigSection for TuningConfig {
    fn section_name() -> &'static str {
        "tuning"
    }

    fn validate(&self) -> Result<()> {
        if self.population_size == 0 {
            return Err(SimtuneError::Configuration(
                "Population size must be positive".to_string(),
            ));
        }
        if self.generations == 0 {
            return Err(SimtuneError::Configuration(
                "Generation count must be positive".to_string(),
            ));
        }
        if let Some(rate) = self.mutation_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(SimtuneError::Configuration(
                    "Mutation rate must be between 0 and 1".to_string(),
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.elite_fraction) {
            return Err(SimtuneError::Configuration(
                "Elite fraction must be between 0 and 1".to_string(),
            ));
        }
        if self.tournament_size == 0 || self.tournament_size > self.population_size {
            return Err(SimtuneError::Configuration(
                "Tournament size must be positive and no larger than the population".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(SimtuneError::Configuration(
                "Worker count must be positive".to_string(),
            ));
        }
        if self.eval_timeout_secs == 0 {
            return Err(SimtuneError::Configuration(
                "Evaluation timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
