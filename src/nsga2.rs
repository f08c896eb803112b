//! NSGA-II search loop with an epsilon-dominance archive of everything
//! evaluated.
//!
//! References:
//! - Deb, K., et al. "A Fast and Elitist Multiobjective Genetic Algorithm: NSGA-II" (2002)

use crate::archive::EpsilonArchive;
use crate::dominance::{rank_population, tournament, truncate};
use crate::error::{CalibrationError, Result};
use crate::evaluator::{Evaluator, Simulator};
use crate::individual::Individual;
use crate::problem::ProblemSpec;
use crate::variation::Variation;
use log::{debug, info};
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Algorithm {
    Nsga2,
}

impl FromStr for Algorithm {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace(&['-', '_'][..], "").as_str() {
            "nsgaii" | "nsga2" => Ok(Algorithm::Nsga2),
            _ => Err(CalibrationError::config(format!(
                "unknown algorithm `{}` (supported: NSGAII)",
                s
            ))),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Nsga2 => write!(f, "NSGAII"),
        }
    }
}

/// Search configuration
#[derive(Clone, Debug, Serialize)]
pub struct SearchConfig {
    pub algorithm: Algorithm,
    /// Population size N
    pub population_size: usize,
    /// Evaluation budget, at least N
    pub max_evaluations: usize,
    /// Archive resolution, one per objective
    pub epsilons: Vec<f64>,
    pub variation: Variation,
}

impl SearchConfig {
    pub fn new(problem: &ProblemSpec, population_size: usize, max_evaluations: usize, epsilon: f64) -> Self {
        Self {
            algorithm: Algorithm::Nsga2,
            population_size,
            max_evaluations,
            epsilons: vec![epsilon; problem.num_objectives()],
            variation: Variation::for_problem(problem),
        }
    }

    pub fn validate(&self, problem: &ProblemSpec) -> Result<()> {
        if self.population_size < 2 {
            return Err(CalibrationError::config(format!(
                "population size must be at least 2, got {}",
                self.population_size
            )));
        }
        if self.max_evaluations < self.population_size {
            return Err(CalibrationError::config(format!(
                "evaluation budget {} is smaller than the population size {}",
                self.max_evaluations, self.population_size
            )));
        }
        if self.epsilons.len() != problem.num_objectives() {
            return Err(CalibrationError::config(format!(
                "{} epsilon values given for {} objectives",
                self.epsilons.len(),
                problem.num_objectives()
            )));
        }
        let v = &self.variation;
        for (name, p) in [("crossover probability", v.crossover_prob), ("mutation probability", v.mutation_prob)] {
            if !(0.0..=1.0).contains(&p) {
                return Err(CalibrationError::config(format!("{} must be in [0, 1], got {}", name, p)));
            }
        }
        for (name, eta) in [("eta_c", v.eta_c), ("eta_m", v.eta_m)] {
            if !(eta.is_finite() && eta >= 0.0) {
                return Err(CalibrationError::config(format!("{} must be non-negative, got {}", name, eta)));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchState {
    Initializing,
    Evaluating,
    Ranking,
    ArchiveUpdate,
    Variating,
    Terminated,
    Failed,
}

/// What a finished run hands back
#[derive(Debug)]
pub struct SearchOutcome {
    pub archive: EpsilonArchive,
    /// Final parent population, ranked
    pub population: Vec<Individual>,
    pub evaluations: usize,
    pub generations: usize,
}

/// NSGA-II optimizer
pub struct Nsga2<R> {
    config: SearchConfig,
    rng: R,
    state: SearchState,
}

impl<R: Rng> Nsga2<R> {
    pub fn new(config: SearchConfig, rng: R) -> Self {
        Self {
            config,
            rng,
            state: SearchState::Initializing,
        }
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    fn transition(&mut self, next: SearchState) {
        debug!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run until the evaluation budget is spent.
    ///
    /// Any error moves the loop to `Failed` and the partial archive is
    /// dropped with it.
    pub fn run<S: Simulator>(&mut self, evaluator: &mut Evaluator<S>) -> Result<SearchOutcome> {
        match self.search(evaluator) {
            Ok(outcome) => {
                self.transition(SearchState::Terminated);
                Ok(outcome)
            }
            Err(e) => {
                self.transition(SearchState::Failed);
                Err(e)
            }
        }
    }

    fn search<S: Simulator>(&mut self, evaluator: &mut Evaluator<S>) -> Result<SearchOutcome> {
        self.config.validate(evaluator.problem())?;
        let mut archive = EpsilonArchive::new(self.config.epsilons.clone())?;
        let n = self.config.population_size;
        let budget = self.config.max_evaluations;

        info!(
            "starting {} on `{}`: population {}, budget {} evaluations",
            self.config.algorithm,
            evaluator.problem().name(),
            n,
            budget
        );

        self.state = SearchState::Initializing;
        let mut population: Vec<Individual> = (0..n)
            .map(|_| Individual::new(evaluator.problem().random_solution(&mut self.rng)))
            .collect();

        self.transition(SearchState::Evaluating);
        evaluate_all(evaluator, &mut population)?;

        self.transition(SearchState::Ranking);
        rank_population(&mut population);

        self.transition(SearchState::ArchiveUpdate);
        for ind in &population {
            archive.add(ind.clone());
        }

        let mut generations = 0;
        while evaluator.evaluations() < budget {
            self.transition(SearchState::Variating);
            let count = n.min(budget - evaluator.evaluations());
            let mut offspring = self.make_offspring(evaluator.problem(), &population, count);

            self.transition(SearchState::Evaluating);
            evaluate_all(evaluator, &mut offspring)?;

            self.transition(SearchState::Ranking);
            let mut merged = population;
            merged.extend(offspring.iter().cloned());
            population = truncate(merged, n);

            self.transition(SearchState::ArchiveUpdate);
            for ind in offspring {
                archive.add(ind);
            }

            generations += 1;
            info!(
                "generation {}: {} evaluations, archive size {} ({} improvements)",
                generations,
                evaluator.evaluations(),
                archive.len(),
                archive.improvements()
            );
        }

        info!(
            "search finished after {} generations and {} evaluations, archive size {}",
            generations,
            evaluator.evaluations(),
            archive.len()
        );

        Ok(SearchOutcome {
            archive,
            population,
            evaluations: evaluator.evaluations(),
            generations,
        })
    }

    /// Tournament selection, SBX and polynomial mutation; `count` children.
    fn make_offspring(
        &mut self,
        problem: &ProblemSpec,
        population: &[Individual],
        count: usize,
    ) -> Vec<Individual> {
        let bounds = problem.bounds();
        let variation = &self.config.variation;
        let mut offspring = Vec::with_capacity(count);

        while offspring.len() < count {
            let p1 = &population[tournament(&mut self.rng, population)].x;
            let p2 = &population[tournament(&mut self.rng, population)].x;

            let (mut c1, mut c2) = variation.sbx(&mut self.rng, bounds, p1, p2);
            variation.mutate(&mut self.rng, bounds, &mut c1);
            variation.mutate(&mut self.rng, bounds, &mut c2);

            offspring.push(Individual::new(c1));
            if offspring.len() < count {
                offspring.push(Individual::new(c2));
            }
        }

        offspring
    }
}

fn evaluate_all<S: Simulator>(evaluator: &mut Evaluator<S>, batch: &mut [Individual]) -> Result<()> {
    for ind in batch.iter_mut().filter(|i| !i.is_evaluated()) {
        evaluator.score(ind)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn zdt1(x: &[f64]) -> Result<Vec<f64>> {
        let f1 = x[0];
        let g = 1.0 + 9.0 * x[1..].iter().sum::<f64>() / (x.len() - 1) as f64;
        let f2 = g * (1.0 - (f1 / g).sqrt());
        Ok(vec![f1, f2])
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!("NSGAII".parse::<Algorithm>().unwrap(), Algorithm::Nsga2);
        assert_eq!("nsga-ii".parse::<Algorithm>().unwrap(), Algorithm::Nsga2);
        assert_eq!("NSGA2".parse::<Algorithm>().unwrap(), Algorithm::Nsga2);
        assert!("MOEAD".parse::<Algorithm>().is_err());
    }

    #[test]
    fn test_nsga2_simple() {
        let problem = ProblemSpec::unit_cube(5, 2, 0).unwrap();
        let config = SearchConfig::new(&problem, 20, 400, 0.01);
        let mut optimizer = Nsga2::new(config, StdRng::seed_from_u64(42));
        let mut evaluator = Evaluator::new(problem, zdt1);

        let outcome = optimizer.run(&mut evaluator).unwrap();
        assert_eq!(optimizer.state(), SearchState::Terminated);
        assert_eq!(outcome.evaluations, 400);
        assert_eq!(outcome.generations, 19);
        assert_eq!(outcome.population.len(), 20);
        assert!(!outcome.archive.is_empty());
    }

    #[test]
    fn test_partial_last_generation_respects_budget() {
        let problem = ProblemSpec::unit_cube(3, 2, 0).unwrap();
        let config = SearchConfig::new(&problem, 10, 35, 0.05);
        let mut optimizer = Nsga2::new(config, StdRng::seed_from_u64(1));
        let mut evaluator = Evaluator::new(problem, zdt1);

        let outcome = optimizer.run(&mut evaluator).unwrap();
        assert_eq!(outcome.evaluations, 35);
        assert_eq!(outcome.generations, 3);
        assert_eq!(outcome.population.len(), 10);
    }

    #[test]
    fn test_same_seed_same_archive() {
        let run = || {
            let problem = ProblemSpec::unit_cube(4, 2, 0).unwrap();
            let config = SearchConfig::new(&problem, 8, 80, 0.02);
            let mut optimizer = Nsga2::new(config, StdRng::seed_from_u64(2024));
            let mut evaluator = Evaluator::new(problem, zdt1);
            optimizer
                .run(&mut evaluator)
                .unwrap()
                .archive
                .iter()
                .map(|i| i.x.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_budget_below_population_is_rejected() {
        let problem = ProblemSpec::unit_cube(2, 2, 0).unwrap();
        let config = SearchConfig::new(&problem, 10, 5, 0.1);
        let mut optimizer = Nsga2::new(config, StdRng::seed_from_u64(0));
        let mut evaluator = Evaluator::new(problem, zdt1);
        assert!(matches!(
            optimizer.run(&mut evaluator),
            Err(CalibrationError::Configuration(_))
        ));
        assert_eq!(optimizer.state(), SearchState::Failed);
        assert_eq!(evaluator.evaluations(), 0);
    }
}
