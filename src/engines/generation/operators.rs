use crate::engines::generation::schema::GeneSchema;
use crate::error::Result;
use crate::types::Individual;
use rand::seq::index::sample;
use rand::Rng;

/// Tournament selection: each tournament samples `tournament_size`
/// distinct individuals from the population and keeps the one with the
/// smallest fitness (fitness is an error magnitude). Tournaments repeat,
/// with replacement across tournaments, until `mating_size` winners are
/// collected.
pub fn tournament_selection<R: Rng>(
    population: &[Individual],
    mating_size: usize,
    tournament_size: usize,
    rng: &mut R,
) -> Vec<Individual> {
    let tournament_size = tournament_size.clamp(1, population.len());
    let mut mating_pool = Vec::with_capacity(mating_size);

    while mating_pool.len() < mating_size {
        let entrants = sample(rng, population.len(), tournament_size);
        let winner = entrants
            .iter()
            .min_by(|&a, &b| {
                population[a]
                    .fitness_or_inf()
                    .partial_cmp(&population[b].fitness_or_inf())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("tournament has at least one entrant");
        mating_pool.push(population[winner].clone());
    }

    mating_pool
}

/// Single-slot crossover: two distinct parents drawn uniformly from the
/// mating pool; with probability 0.5 no offspring are produced and the
/// caller retries. Otherwise one uniformly-chosen slot is swapped between
/// the parents' gene vectors, both children are repaired, and both start
/// with no fitness. Each child keeps the context of the parent whose
/// vector it started from.
pub fn crossover<R: Rng>(
    mating_pool: &[Individual],
    schema: &GeneSchema,
    rng: &mut R,
) -> Result<Option<(Individual, Individual)>> {
    if mating_pool.len() < 2 || rng.gen_bool(0.5) {
        return Ok(None);
    }

    let parents = sample(rng, mating_pool.len(), 2);
    let p1 = &mating_pool[parents.index(0)];
    let p2 = &mating_pool[parents.index(1)];

    let slot = rng.gen_range(0..schema.len());
    let mut genes1 = p1.genes.clone();
    let mut genes2 = p2.genes.clone();
    genes1[slot] = p2.genes[slot];
    genes2[slot] = p1.genes[slot];

    let child1 = Individual::new(schema.repair(&genes1)?, p1.context.clone());
    let child2 = Individual::new(schema.repair(&genes2)?, p2.context.clone());
    Ok(Some((child1, child2)))
}

/// Full-gene mutation: with probability `mutation_rate` per individual,
/// redraw one uniformly-chosen slot from its domain and repair the whole
/// vector. Any previously assigned fitness is cleared because the genes
/// changed.
pub fn mutate<R: Rng>(
    offspring: &mut [Individual],
    mutation_rate: f64,
    schema: &GeneSchema,
    rng: &mut R,
) -> Result<()> {
    for individual in offspring.iter_mut() {
        if !rng.gen_bool(mutation_rate.clamp(0.0, 1.0)) {
            continue;
        }
        let slot = rng.gen_range(0..schema.len());
        let domain = &schema.slots()[slot].domain;
        let mut genes = individual.genes.clone();
        genes[slot] = domain[rng.gen_range(0..domain.len())];
        individual.genes = schema.repair(&genes)?;
        individual.fitness = None;
    }
    Ok(())
}

/// The `n_elites` individuals with the smallest fitness, ties broken by
/// original population order (stable sort). Every individual in the input
/// must already carry a fitness.
pub fn find_elites(population: &[Individual], n_elites: usize) -> Vec<Individual> {
    let mut ranked: Vec<&Individual> = population.iter().collect();
    ranked.sort_by(|a, b| {
        a.fitness_or_inf()
            .partial_cmp(&b.fitness_or_inf())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
        .into_iter()
        .take(n_elites)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EvaluationContext;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ctx() -> EvaluationContext {
        EvaluationContext::new("2011-07")
    }

    fn evaluated(genes: Vec<u32>, fitness: f64) -> Individual {
        let mut ind = Individual::new(genes, ctx());
        ind.fitness = Some(fitness);
        ind
    }

    fn population_with_fitness(values: &[f64]) -> Vec<Individual> {
        let schema = GeneSchema::suite_default();
        let mut rng = StdRng::seed_from_u64(1);
        values
            .iter()
            .map(|&f| evaluated(schema.random_gene_vector(&mut rng), f))
            .collect()
    }

    #[test]
    fn test_tournament_never_selects_worst() {
        // With tournament size 3 out of 6, the fitness-9 individual can
        // only win a tournament it shares with nothing better, which a
        // without-replacement sample of 3 cannot produce.
        let population = population_with_fitness(&[5.0, 1.0, 8.0, 2.0, 9.0, 3.0]);
        let mut rng = StdRng::seed_from_u64(99);

        let pool = tournament_selection(&population, 100, 3, &mut rng);
        assert_eq!(pool.len(), 100);
        for winner in &pool {
            assert!(winner.fitness.unwrap() < 9.0);
        }
    }

    #[test]
    fn test_tournament_degenerate_population_of_one() {
        let population = population_with_fitness(&[4.2]);
        let mut rng = StdRng::seed_from_u64(3);

        let pool = tournament_selection(&population, 1, 1, &mut rng);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].fitness, Some(4.2));
    }

    #[test]
    fn test_crossover_children_feasible_and_unevaluated() {
        let schema = GeneSchema::suite_default();
        let population = population_with_fitness(&[1.0, 2.0, 3.0, 4.0]);
        let mut rng = StdRng::seed_from_u64(11);

        let mut produced = 0;
        for _ in 0..100 {
            if let Some((c1, c2)) = crossover(&population, &schema, &mut rng).unwrap() {
                produced += 1;
                for child in [&c1, &c2] {
                    assert!(schema.is_feasible(&child.genes));
                    assert!(child.fitness.is_none());
                }
            }
        }
        // Half the attempts produce offspring; a run of 100 all-misses
        // would mean the coin flip is broken.
        assert!(produced > 20);
    }

    #[test]
    fn test_crossover_needs_two_parents() {
        let schema = GeneSchema::suite_default();
        let population = population_with_fitness(&[1.0]);
        let mut rng = StdRng::seed_from_u64(5);
        assert!(crossover(&population, &schema, &mut rng).unwrap().is_none());
    }

    #[test]
    fn test_mutate_clears_fitness_and_stays_feasible() {
        let schema = GeneSchema::suite_default();
        let mut offspring = population_with_fitness(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut rng = StdRng::seed_from_u64(23);

        mutate(&mut offspring, 1.0, &schema, &mut rng).unwrap();
        for individual in &offspring {
            assert!(individual.fitness.is_none());
            assert!(schema.is_feasible(&individual.genes));
        }
    }

    #[test]
    fn test_mutate_rate_zero_is_identity() {
        let schema = GeneSchema::suite_default();
        let mut offspring = population_with_fitness(&[1.0, 2.0]);
        let before: Vec<_> = offspring.iter().map(|i| i.genes.clone()).collect();
        let mut rng = StdRng::seed_from_u64(23);

        mutate(&mut offspring, 0.0, &schema, &mut rng).unwrap();
        for (individual, genes) in offspring.iter().zip(&before) {
            assert_eq!(&individual.genes, genes);
            assert!(individual.fitness.is_some());
        }
    }

    #[test]
    fn test_find_elites_stable_ties() {
        let mut population = population_with_fitness(&[3.0, 1.0, 1.0, 2.0]);
        // Tag genes so ties are distinguishable.
        population[1].genes[0] = 1;
        population[2].genes[0] = 2;

        let elites = find_elites(&population, 2);
        assert_eq!(elites.len(), 2);
        assert_eq!(elites[0].fitness, Some(1.0));
        assert_eq!(elites[1].fitness, Some(1.0));
        // Stable: the earlier of the two tied individuals comes first.
        assert_eq!(elites[0].genes[0], 1);
        assert_eq!(elites[1].genes[0], 2);
    }
}
