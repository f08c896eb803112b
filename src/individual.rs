use crate::problem::Evaluation;

/// Candidate solution in the population
#[derive(Clone, Debug)]
pub struct Individual {
    /// Decision variables, one per problem variable
    pub x: Vec<f64>,
    /// Objective values (minimized), empty until evaluated
    pub f: Vec<f64>,
    /// Raw constraint values, 0 means satisfied
    pub c: Vec<f64>,
    /// Pareto rank (0 = non-dominated front)
    pub rank: usize,
    /// Crowding distance within its front
    pub crowding_distance: f64,
    evaluated: bool,
}

impl Individual {
    pub fn new(x: Vec<f64>) -> Self {
        Self {
            x,
            f: Vec::new(),
            c: Vec::new(),
            rank: usize::MAX,
            crowding_distance: 0.0,
            evaluated: false,
        }
    }

    /// Build an already evaluated individual.
    pub fn evaluated(x: Vec<f64>, f: Vec<f64>, c: Vec<f64>) -> Self {
        let mut ind = Self::new(x);
        ind.set_evaluation(Evaluation {
            objectives: f,
            constraints: c,
        });
        ind
    }

    pub fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    pub(crate) fn set_evaluation(&mut self, ev: Evaluation) {
        self.f = ev.objectives;
        self.c = ev.constraints;
        self.evaluated = true;
    }

    /// Aggregate constraint violation: sum of absolute constraint values.
    pub fn constraint_violation(&self) -> f64 {
        self.c.iter().map(|v| v.abs()).sum()
    }

    pub fn is_feasible(&self) -> bool {
        self.c.iter().all(|&v| v == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_unevaluated() {
        let ind = Individual::new(vec![0.1, 0.2]);
        assert!(!ind.is_evaluated());
        assert!(ind.f.is_empty());
        assert_eq!(ind.rank, usize::MAX);
    }

    #[test]
    fn test_constraint_violation_sums_magnitudes() {
        let ind = Individual::evaluated(vec![0.0], vec![1.0], vec![-0.5, 0.0, 2.0]);
        assert!(ind.is_evaluated());
        assert!((ind.constraint_violation() - 2.5).abs() < 1e-12);
        assert!(!ind.is_feasible());

        let ok = Individual::evaluated(vec![0.0], vec![1.0], vec![0.0]);
        assert!(ok.is_feasible());
        assert_eq!(ok.constraint_violation(), 0.0);
    }
}
