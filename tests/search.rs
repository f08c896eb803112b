//! Whole runs against the `testsim` stand-in simulator.

use hbvcal::dominance::dominates;
use hbvcal::{
    CalibrationError, EpsilonArchive, Evaluator, Nsga2, ProblemSpec, ProcessChannel,
    ProtocolError, SearchConfig, SearchState,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::process::Command;

const TESTSIM: &str = env!("CARGO_BIN_EXE_testsim");
const HBVCAL: &str = env!("CARGO_BIN_EXE_hbvcal");

fn assert_mutually_nondominated(archive: &EpsilonArchive) {
    let members: Vec<_> = archive.iter().collect();
    for (i, a) in members.iter().enumerate() {
        for (j, b) in members.iter().enumerate() {
            assert!(i == j || !dominates(a, b), "entry {} dominates {}", i, j);
        }
    }
}

// =============================================================================
// Library
// =============================================================================

#[test]
fn test_sumsq_pop4_budget20() {
    let problem = ProblemSpec::unit_cube(2, 2, 0).unwrap();
    let channel = ProcessChannel::spawn(TESTSIM, ["--problem", "sumsq"], 2).unwrap();
    let config = SearchConfig::new(&problem, 4, 20, 0.01);
    let mut evaluator = Evaluator::new(problem, channel);
    let mut optimizer = Nsga2::new(config, StdRng::seed_from_u64(2024));

    let outcome = optimizer.run(&mut evaluator).unwrap();
    assert_eq!(optimizer.state(), SearchState::Terminated);
    assert_eq!(outcome.evaluations, 20);
    assert_eq!(evaluator.simulator().exchanges(), 20);
    assert!(!outcome.archive.is_empty());
    assert_mutually_nondominated(&outcome.archive);
    for ind in outcome.archive.iter() {
        let s: f64 = ind.x.iter().sum();
        assert_eq!(ind.f, vec![s, s * s]);
    }

    let status = evaluator.into_simulator().close().unwrap();
    assert!(status.success());
}

#[test]
fn test_zdt1_budgets_are_spent_exactly() {
    for (n, budget) in [(4, 4), (6, 13), (10, 60)] {
        let problem = ProblemSpec::unit_cube(5, 2, 0).unwrap();
        let channel = ProcessChannel::spawn(TESTSIM, ["--problem", "zdt1"], 2).unwrap();
        let config = SearchConfig::new(&problem, n, budget, 0.05);
        let mut evaluator = Evaluator::new(problem, channel);
        let mut optimizer = Nsga2::new(config, StdRng::seed_from_u64(budget as u64));

        let outcome = optimizer.run(&mut evaluator).unwrap();
        assert_eq!(outcome.evaluations, budget, "n={} budget={}", n, budget);
        assert_eq!(evaluator.simulator().exchanges(), budget as u64);
        assert_mutually_nondominated(&outcome.archive);
    }
}

#[test]
fn test_simulator_death_fails_the_run() {
    let problem = ProblemSpec::unit_cube(2, 2, 0).unwrap();
    let args = ["--problem", "schaffer", "--fault", "exit", "--fault-after", "9"];
    let channel = ProcessChannel::spawn(TESTSIM, args, 2).unwrap();
    let config = SearchConfig::new(&problem, 4, 40, 0.01);
    let mut evaluator = Evaluator::new(problem, channel);
    let mut optimizer = Nsga2::new(config, StdRng::seed_from_u64(1));

    let err = optimizer.run(&mut evaluator).unwrap_err();
    assert!(matches!(
        err,
        CalibrationError::Protocol(ProtocolError::Exited | ProtocolError::Write(_))
    ));
    assert_eq!(optimizer.state(), SearchState::Failed);
    assert_eq!(evaluator.evaluations(), 9);
}

// =============================================================================
// Command line
// =============================================================================

fn write_config(dir: &std::path::Path, budget: usize) -> std::path::PathBuf {
    let path = dir.join("run.toml");
    let text = format!(
        r#"
[simulator]
command = '{}'
args = ["--problem", "sumsq"]
timeout_secs = 10.0

[problem]
name = "sumsq"
objectives = 2
constraints = 0
variables = [
    {{ name = "a", lower = 0.0, upper = 1.0 }},
    {{ name = "b", lower = 0.0, upper = 1.0 }},
]

[search]
seed = 7
population_size = 4
max_evaluations = {}
epsilon = 0.01
"#,
        TESTSIM, budget
    );
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_cli_validate_accepts_config() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write_config(dir.path(), 20);
    let out = Command::new(HBVCAL)
        .args(["--config", cfg.to_str().unwrap(), "validate"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
}

#[test]
fn test_cli_run_prints_archive_and_writes_csv() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write_config(dir.path(), 20);
    let csv = dir.path().join("archive.csv");
    let out = Command::new(HBVCAL)
        .args(["--config", cfg.to_str().unwrap(), "run", "--json", "--out"])
        .arg(&csv)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let listing = String::from_utf8(out.stdout).unwrap();
    let rows: Vec<Vec<f64>> = listing
        .lines()
        .map(|l| l.split(' ').map(|t| t.parse().unwrap()).collect())
        .collect();
    assert!(!rows.is_empty());
    for row in &rows {
        assert_eq!(row.len(), 4);
        let s = row[0] + row[1];
        assert_eq!(row[2], s);
        assert_eq!(row[3], s * s);
    }

    let table = fs::read_to_string(&csv).unwrap();
    assert!(table.starts_with("a,b,f0,f1\n"));
    assert_eq!(table.lines().count(), rows.len() + 1);

    let bundle: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(csv.with_extension("json")).unwrap()).unwrap();
    assert_eq!(bundle["seed"], 7);
    assert_eq!(bundle["evaluations"], 20);
    assert_eq!(bundle["archive"].as_array().unwrap().len(), rows.len());
}

#[test]
fn test_cli_run_same_seed_same_archive() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write_config(dir.path(), 40);
    let run = || {
        let out = Command::new(HBVCAL)
            .args(["--config", cfg.to_str().unwrap(), "run"])
            .output()
            .unwrap();
        assert!(out.status.success());
        out.stdout
    };
    assert_eq!(run(), run());
}

#[test]
fn test_cli_rejects_unknown_algorithm() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write_config(dir.path(), 20);
    let out = Command::new(HBVCAL)
        .args(["--config", cfg.to_str().unwrap(), "run", "--algorithm", "MOEAD"])
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
}
