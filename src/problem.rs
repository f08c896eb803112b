//! Calibration problem definition: variable bounds and objective/constraint
//! counts shared with the external simulator.

use crate::error::{CalibrationError, Result};
use rand::Rng;
use serde::Serialize;

/// Closed interval a decision variable must stay within.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Bound {
    pub lower: f64,
    pub upper: f64,
}

impl Bound {
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        if !lower.is_finite() || !upper.is_finite() {
            return Err(CalibrationError::config(format!(
                "bound [{}, {}] must be finite",
                lower, upper
            )));
        }
        if lower >= upper {
            return Err(CalibrationError::config(format!(
                "bound lower {} must be below upper {}",
                lower, upper
            )));
        }
        Ok(Self { lower, upper })
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.lower && v <= self.upper
    }

    pub fn clip(&self, v: f64) -> f64 {
        v.max(self.lower).min(self.upper)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Variable {
    pub name: String,
    pub bound: Bound,
}

impl Variable {
    pub fn new(name: impl Into<String>, lower: f64, upper: f64) -> Result<Self> {
        let name = name.into();
        let bound = Bound::new(lower, upper).map_err(|e| match e {
            CalibrationError::Configuration(msg) => {
                CalibrationError::config(format!("variable `{}`: {}", name, msg))
            }
            other => other,
        })?;
        Ok(Self { name, bound })
    }
}

/// Objective and constraint values returned for one decision vector.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub objectives: Vec<f64>,
    pub constraints: Vec<f64>,
}

/// Variable bounds plus the objective and constraint counts the simulator
/// answers with. Fixed for the lifetime of a run.
#[derive(Clone, Debug, Serialize)]
pub struct ProblemSpec {
    name: String,
    variables: Vec<Variable>,
    objectives: usize,
    constraints: usize,
    #[serde(skip)]
    bounds: Vec<Bound>,
}

impl ProblemSpec {
    pub fn new(
        name: impl Into<String>,
        variables: Vec<Variable>,
        objectives: usize,
        constraints: usize,
    ) -> Result<Self> {
        if variables.is_empty() {
            return Err(CalibrationError::config("problem needs at least one variable"));
        }
        if objectives == 0 {
            return Err(CalibrationError::config("problem needs at least one objective"));
        }
        let bounds = variables.iter().map(|v| v.bound).collect();
        Ok(Self {
            name: name.into(),
            variables,
            objectives,
            constraints,
            bounds,
        })
    }

    /// Unit-cube problem with anonymous variables, handy for test targets.
    pub fn unit_cube(num_variables: usize, objectives: usize, constraints: usize) -> Result<Self> {
        let variables = (0..num_variables)
            .map(|i| Variable::new(format!("x{}", i), 0.0, 1.0))
            .collect::<Result<Vec<_>>>()?;
        Self::new("unit-cube", variables, objectives, constraints)
    }

    /// The 12-parameter HBV rainfall-runoff calibration.
    ///
    /// Objectives are relative variability, relative bias and negated
    /// correlation of simulated against observed flow.
    pub fn hbv() -> Self {
        const PARAMS: [(&str, f64, f64); 12] = [
            ("k2", 10.0, 20000.0),
            ("k1", 1.0, 100.0),
            ("k0", 0.5, 20.0),
            ("maxbas", 24.0, 120.0),
            ("degd", 0.0, 20.0),
            ("degw", -3.0, 3.0),
            ("ttlim", -3.0, 3.0),
            ("perc", 0.0, 100.0),
            ("beta", 0.0, 7.0),
            ("lp", 0.3, 1.0),
            ("fcap", 10.0, 2000.0),
            ("hl1", 0.0, 100.0),
        ];
        let variables = PARAMS
            .iter()
            .map(|&(name, lower, upper)| Variable {
                name: name.to_string(),
                bound: Bound { lower, upper },
            })
            .collect::<Vec<_>>();
        let bounds = variables.iter().map(|v| v.bound).collect();
        Self {
            name: "hbv".to_string(),
            variables,
            objectives: 3,
            constraints: 0,
            bounds,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_objectives(&self) -> usize {
        self.objectives
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn bounds(&self) -> &[Bound] {
        &self.bounds
    }

    /// Draw each variable independently and uniformly within its bound.
    pub fn random_solution<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.bounds
            .iter()
            .map(|b| b.lower + rng.gen::<f64>() * b.width())
            .collect()
    }

    pub fn check_bounds(&self, x: &[f64]) -> Result<()> {
        for (index, (&value, b)) in x.iter().zip(&self.bounds).enumerate() {
            if !value.is_finite() || !b.contains(value) {
                return Err(CalibrationError::BoundViolation {
                    index,
                    value,
                    lower: b.lower,
                    upper: b.upper,
                });
            }
        }
        Ok(())
    }

    /// Vector sent to the simulator. Identity on values; enforces arity and
    /// bounds.
    pub fn encode(&self, x: &[f64]) -> Result<Vec<f64>> {
        if x.len() != self.num_variables() {
            return Err(CalibrationError::config(format!(
                "decision vector has {} components, problem `{}` declares {}",
                x.len(),
                self.name,
                self.num_variables()
            )));
        }
        self.check_bounds(x)?;
        Ok(x.to_vec())
    }

    /// Split a raw simulator answer into objectives and constraints.
    pub fn decode(&self, values: &[f64]) -> Result<Evaluation> {
        let expected = self.objectives + self.constraints;
        if values.len() != expected {
            return Err(CalibrationError::config(format!(
                "simulator returned {} values, problem `{}` declares {} objectives and {} constraints",
                values.len(),
                self.name,
                self.objectives,
                self.constraints
            )));
        }
        let (objectives, constraints) = values.split_at(self.objectives);
        Ok(Evaluation {
            objectives: objectives.to_vec(),
            constraints: constraints.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_bound_rejects_inverted_and_degenerate() {
        assert!(Bound::new(1.0, 0.0).is_err());
        assert!(Bound::new(1.0, 1.0).is_err());
        assert!(Bound::new(f64::NAN, 1.0).is_err());
        assert!(Bound::new(-1.0, 1.0).is_ok());
    }

    #[test]
    fn test_random_solution_within_bounds() {
        let problem = ProblemSpec::hbv();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let x = problem.random_solution(&mut rng);
            assert_eq!(x.len(), 12);
            problem.check_bounds(&x).unwrap();
        }
    }

    #[test]
    fn test_check_bounds_reports_first_offender() {
        let problem = ProblemSpec::unit_cube(3, 1, 0).unwrap();
        match problem.check_bounds(&[0.5, 1.5, -1.0]) {
            Err(CalibrationError::BoundViolation { index, value, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(value, 1.5);
            }
            other => panic!("expected bound violation, got {:?}", other),
        }
        assert!(problem.check_bounds(&[0.5, f64::NAN, 0.0]).is_err());
    }

    #[test]
    fn test_decode_splits_objectives_first() {
        let problem = ProblemSpec::unit_cube(2, 2, 1).unwrap();
        let ev = problem.decode(&[1.0, 2.0, 0.5]).unwrap();
        assert_eq!(ev.objectives, vec![1.0, 2.0]);
        assert_eq!(ev.constraints, vec![0.5]);
        assert!(problem.decode(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_encode_is_identity_inside_bounds() {
        let problem = ProblemSpec::unit_cube(2, 1, 0).unwrap();
        assert_eq!(problem.encode(&[0.25, 1.0]).unwrap(), vec![0.25, 1.0]);
        assert!(problem.encode(&[0.25]).is_err());
    }

    #[test]
    fn test_hbv_preset_shape() {
        let problem = ProblemSpec::hbv();
        assert_eq!(problem.num_variables(), 12);
        assert_eq!(problem.num_objectives(), 3);
        assert_eq!(problem.num_constraints(), 0);
        assert_eq!(problem.variables()[3].name, "maxbas");
        assert!(problem.bounds().iter().all(|b| b.lower < b.upper));
    }
}
