use crate::nsga2::{Algorithm, SearchConfig};
use crate::problem::{ProblemSpec, Variable};
use crate::variation::Variation;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Root {
    pub simulator: Simulator,
    pub problem: Problem,
    #[serde(default)]
    pub search: Search,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Simulator {
    /// Executable speaking the line protocol
    pub command: String,
    /// Fixed arguments, e.g. the forcing data file
    #[serde(default)]
    pub args: Vec<String>,
    /// Optional per-evaluation response timeout
    pub timeout_secs: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Problem {
    /// Built-in problem definition: "hbv"
    pub preset: Option<String>,
    pub name: Option<String>,
    pub objectives: Option<usize>,
    pub constraints: Option<usize>,
    #[serde(default)]
    pub variables: Vec<VariableCfg>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VariableCfg {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Search {
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Absent means a fresh entropy seed, reported in the log
    pub seed: Option<u64>,
    #[serde(default = "default_max_evaluations")]
    pub max_evaluations: usize,
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    #[serde(default = "default_epsilon")]
    pub epsilon: Epsilon,
    #[serde(default)]
    pub operators: Operators,
}

fn default_algorithm() -> String {
    "NSGAII".to_string()
}
fn default_max_evaluations() -> usize { 10_000 }
fn default_population_size() -> usize { 100 }
fn default_epsilon() -> Epsilon { Epsilon::Scalar(1.0) }

impl Default for Search {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            seed: None,
            max_evaluations: default_max_evaluations(),
            population_size: default_population_size(),
            epsilon: default_epsilon(),
            operators: Operators::default(),
        }
    }
}

/// One epsilon broadcast to every objective, or one per objective.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Epsilon {
    Scalar(f64),
    PerObjective(Vec<f64>),
}

impl Epsilon {
    pub fn broadcast(&self, objectives: usize) -> Result<Vec<f64>> {
        let values = match self {
            Epsilon::Scalar(e) => vec![*e; objectives],
            Epsilon::PerObjective(v) if v.len() == 1 => vec![v[0]; objectives],
            Epsilon::PerObjective(v) if v.len() == objectives => v.clone(),
            Epsilon::PerObjective(v) => bail!(
                "search.epsilon has {} values, expected 1 or {}",
                v.len(),
                objectives
            ),
        };
        if values.iter().any(|e| !(e.is_finite() && *e > 0.0)) {
            bail!("search.epsilon values must be positive");
        }
        Ok(values)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Operators {
    #[serde(default = "default_crossover_prob")]
    pub crossover_prob: f64,
    #[serde(default = "default_eta")]
    pub eta_c: f64,
    /// Defaults to 1 / number of variables
    pub mutation_prob: Option<f64>,
    #[serde(default = "default_eta")]
    pub eta_m: f64,
}

fn default_crossover_prob() -> f64 { 0.9 }
fn default_eta() -> f64 { 20.0 }

impl Default for Operators {
    fn default() -> Self {
        Self {
            crossover_prob: default_crossover_prob(),
            eta_c: default_eta(),
            mutation_prob: None,
            eta_m: default_eta(),
        }
    }
}

impl Root {
    /// Read and parse a TOML file; returns the parsed config and its text.
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, String)> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg: Root = toml::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok((cfg, text))
    }

    pub fn validate(&self) -> Result<()> {
        if self.simulator.command.trim().is_empty() {
            bail!("simulator.command must not be empty");
        }
        if let Some(t) = self.simulator.timeout_secs {
            if !(t.is_finite() && t > 0.0) {
                bail!("simulator.timeout_secs must be positive");
            }
        }

        let problem = self.problem_spec()?;
        let search = self.search_config(&problem)?;
        search.validate(&problem)?;
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.simulator
            .timeout_secs
            .filter(|t| t.is_finite() && *t > 0.0)
            .map(Duration::from_secs_f64)
    }

    pub fn problem_spec(&self) -> Result<ProblemSpec> {
        let p = &self.problem;
        if let Some(ref preset) = p.preset {
            if !p.variables.is_empty() || p.objectives.is_some() || p.constraints.is_some() {
                bail!("problem.preset cannot be combined with explicit variables or counts");
            }
            return match preset.to_ascii_lowercase().as_str() {
                "hbv" => Ok(ProblemSpec::hbv()),
                other => bail!("unknown problem.preset `{}` (supported: hbv)", other),
            };
        }

        if p.variables.is_empty() {
            bail!("problem needs either a preset or at least one [[problem.variables]] entry");
        }
        let objectives = match p.objectives {
            Some(n) if n > 0 => n,
            Some(_) => bail!("problem.objectives must be >= 1"),
            None => bail!("problem.objectives is required without a preset"),
        };
        let variables = p
            .variables
            .iter()
            .map(|v| Variable::new(v.name.clone(), v.lower, v.upper))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let name = p.name.clone().unwrap_or_else(|| "calibration".to_string());
        Ok(ProblemSpec::new(name, variables, objectives, p.constraints.unwrap_or(0))?)
    }

    pub fn search_config(&self, problem: &ProblemSpec) -> Result<SearchConfig> {
        let s = &self.search;
        let algorithm: Algorithm = s.algorithm.parse()?;
        let defaults = Variation::for_problem(problem);
        let variation = Variation {
            crossover_prob: s.operators.crossover_prob,
            eta_c: s.operators.eta_c,
            mutation_prob: s.operators.mutation_prob.unwrap_or(defaults.mutation_prob),
            eta_m: s.operators.eta_m,
        };
        Ok(SearchConfig {
            algorithm,
            population_size: s.population_size,
            max_evaluations: s.max_evaluations,
            epsilons: s.epsilon.broadcast(problem.num_objectives())?,
            variation,
        })
    }
}
