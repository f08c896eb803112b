use crate::error::Result;
use crate::individual::Individual;
use crate::problem::ProblemSpec;

/// Anything that maps a decision vector to one answer: objective values
/// followed by constraint values.
pub trait Simulator {
    fn evaluate(&mut self, x: &[f64]) -> Result<Vec<f64>>;
}

impl<F> Simulator for F
where
    F: FnMut(&[f64]) -> Result<Vec<f64>>,
{
    fn evaluate(&mut self, x: &[f64]) -> Result<Vec<f64>> {
        self(x)
    }
}

/// Scores individuals against a problem and counts successful evaluations.
pub struct Evaluator<S> {
    problem: ProblemSpec,
    simulator: S,
    evaluations: usize,
}

impl<S: Simulator> Evaluator<S> {
    pub fn new(problem: ProblemSpec, simulator: S) -> Self {
        Self {
            problem,
            simulator,
            evaluations: 0,
        }
    }

    pub fn problem(&self) -> &ProblemSpec {
        &self.problem
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Evaluate `ind` exactly once. The counter only moves on success.
    pub fn score(&mut self, ind: &mut Individual) -> Result<()> {
        debug_assert!(!ind.is_evaluated(), "individual scored twice");

        let request = self.problem.encode(&ind.x)?;
        let answer = self.simulator.evaluate(&request)?;
        let ev = self.problem.decode(&answer)?;

        ind.set_evaluation(ev);
        self.evaluations += 1;
        Ok(())
    }

    pub fn simulator(&self) -> &S {
        &self.simulator
    }

    pub fn into_simulator(self) -> S {
        self.simulator
    }
}
