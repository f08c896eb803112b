use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hbvcal::config::{self, Epsilon};
use hbvcal::io::{write_listing, CsvWriter};
use hbvcal::{Evaluator, Nsga2, ProblemSpec, ProcessChannel, SearchConfig};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

const SCHEMA_VERSION: &str = "1.0.0";

#[derive(Parser, Debug)]
#[command(name = "hbvcal")]
#[command(version)]
#[command(about = "Multi-objective calibration of an external rainfall-runoff simulator")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Increase log verbosity (-v debug, -vv protocol trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Calibrate: run the search and print the final archive
    Run {
        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,
        /// Search algorithm
        #[arg(long)]
        algorithm: Option<String>,
        /// Evaluation budget
        #[arg(long)]
        max_evaluations: Option<usize>,
        /// Archive epsilon, broadcast to every objective
        #[arg(long)]
        epsilon: Option<f64>,
        /// Write the archive as CSV
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Also write a JSON result bundle
        #[arg(long)]
        json: bool,
    },
    /// Validate a configuration file
    Validate,
    /// Print version information
    Version,
}

// ============================================================================
// JSON Output Structures
// ============================================================================

#[derive(Serialize)]
struct Manifest {
    schema_version: String,
    program_version: String,
    timestamp_unix: u64,
    platform: String,
    config_hash: String,
    config_snapshot: config::Root,
}

#[derive(Serialize)]
struct ArchiveSolution {
    variables: Vec<f64>,
    objectives: Vec<f64>,
    constraints: Vec<f64>,
}

#[derive(Serialize)]
struct RunOutput {
    manifest: Manifest,
    problem: ProblemSpec,
    search: SearchConfig,
    seed: u64,
    evaluations: usize,
    generations: usize,
    wall_time_ms: f64,
    archive: Vec<ArchiveSolution>,
}

// ============================================================================
// Helper Functions
// ============================================================================

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[hbvcal] {}: {}",
                record.level().as_str().to_ascii_lowercase(),
                record.args()
            )
        })
        .init();
}

fn compute_hash(data: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn create_manifest(cfg: &config::Root, cfg_text: &str) -> Manifest {
    Manifest {
        schema_version: SCHEMA_VERSION.to_string(),
        program_version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp_unix: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        config_hash: compute_hash(cfg_text),
        config_snapshot: cfg.clone(),
    }
}

struct Overrides {
    seed: Option<u64>,
    algorithm: Option<String>,
    max_evaluations: Option<usize>,
    epsilon: Option<f64>,
}

impl Overrides {
    fn apply(self, cfg: &mut config::Root) {
        if let Some(seed) = self.seed {
            cfg.search.seed = Some(seed);
        }
        if let Some(algorithm) = self.algorithm {
            cfg.search.algorithm = algorithm;
        }
        if let Some(n) = self.max_evaluations {
            cfg.search.max_evaluations = n;
        }
        if let Some(e) = self.epsilon {
            cfg.search.epsilon = Epsilon::Scalar(e);
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn run_calibration(
    cfg_path: &str,
    overrides: Overrides,
    out_path: Option<&Path>,
    json_output: bool,
) -> Result<()> {
    let (mut cfg, cfg_text) = config::Root::load(cfg_path)?;
    overrides.apply(&mut cfg);
    cfg.validate()
        .with_context(|| format!("invalid configuration {}", cfg_path))?;

    let problem = cfg.problem_spec()?;
    let search = cfg.search_config(&problem)?;
    let seed = cfg.search.seed.unwrap_or_else(rand::random);

    info!(
        "problem `{}`: {} variables, {} objectives, {} constraints",
        problem.name(),
        problem.num_variables(),
        problem.num_objectives(),
        problem.num_constraints()
    );
    info!(
        "{} seed={} max_evaluations={} epsilon={:?}",
        search.algorithm, seed, search.max_evaluations, search.epsilons
    );

    let mut channel = ProcessChannel::spawn(
        &cfg.simulator.command,
        &cfg.simulator.args,
        problem.num_objectives() + problem.num_constraints(),
    )?;
    if let Some(limit) = cfg.timeout() {
        channel = channel.with_timeout(limit);
    }

    let start = Instant::now();
    let mut evaluator = Evaluator::new(problem.clone(), channel);
    let mut optimizer = Nsga2::new(search.clone(), StdRng::seed_from_u64(seed));
    let result = optimizer.run(&mut evaluator);

    // Release the simulator on both paths before reporting.
    if let Some(status) = evaluator.into_simulator().close() {
        if !status.success() && result.is_ok() {
            warn!("simulator exited with {}", status);
        }
    }
    let outcome = result.context("calibration aborted")?;
    let wall_time_ms = start.elapsed().as_secs_f64() * 1000.0;

    info!("calibration complete");
    info!("  archive size: {}", outcome.archive.len());
    info!("  evaluations: {} in {} generations", outcome.evaluations, outcome.generations);
    info!("  wall time: {:.1} ms", wall_time_ms);

    let stdout = std::io::stdout();
    write_listing(&mut stdout.lock(), &outcome.archive)?;

    if let Some(path) = out_path {
        let mut csv = CsvWriter::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        csv.write_header(&problem)?;
        csv.write_archive(&outcome.archive)?;
        csv.flush()?;
        info!("archive written to: {}", path.display());
    }

    if json_output {
        let json_path = out_path
            .map(|p| p.with_extension("json"))
            .unwrap_or_else(|| PathBuf::from("archive.json"));

        let archive = outcome
            .archive
            .iter()
            .map(|ind| ArchiveSolution {
                variables: ind.x.clone(),
                objectives: ind.f.clone(),
                constraints: ind.c.clone(),
            })
            .collect();

        let output = RunOutput {
            manifest: create_manifest(&cfg, &cfg_text),
            problem,
            search,
            seed,
            evaluations: outcome.evaluations,
            generations: outcome.generations,
            wall_time_ms,
            archive,
        };

        fs::write(&json_path, serde_json::to_string_pretty(&output)?)
            .with_context(|| format!("failed to write {}", json_path.display()))?;
        info!("JSON results: {}", json_path.display());
    }

    Ok(())
}

fn validate_config(cfg_path: &str) -> Result<()> {
    let (cfg, _) = config::Root::load(cfg_path)?;
    cfg.validate()
        .with_context(|| format!("invalid configuration {}", cfg_path))?;
    let problem = cfg.problem_spec()?;
    let search = cfg.search_config(&problem)?;

    info!("config valid: {}", cfg_path);
    info!("  simulator: {} {}", cfg.simulator.command, cfg.simulator.args.join(" "));
    info!(
        "  problem: {} ({} variables, {} objectives, {} constraints)",
        problem.name(),
        problem.num_variables(),
        problem.num_objectives(),
        problem.num_constraints()
    );
    for v in problem.variables() {
        info!("    {:<10} [{}, {}]", v.name, v.bound.lower, v.bound.upper);
    }
    info!(
        "  search: {} population={} max_evaluations={} epsilon={:?}",
        search.algorithm, search.population_size, search.max_evaluations, search.epsilons
    );
    info!(
        "  operators: sbx p={} eta={}, pm p={:.4} eta={}",
        search.variation.crossover_prob,
        search.variation.eta_c,
        search.variation.mutation_prob,
        search.variation.eta_m
    );
    Ok(())
}

fn print_version() {
    println!("hbvcal {}", env!("CARGO_PKG_VERSION"));
    println!("  schema version: {}", SCHEMA_VERSION);
    println!("  platform:       {}/{}", std::env::consts::OS, std::env::consts::ARCH);
    println!("  algorithms:     NSGAII (epsilon-box archive)");
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Commands::Version => {
            print_version();
            Ok(())
        }
        Commands::Validate => {
            let cfg_path = args.config.context("--config required for validate")?;
            validate_config(&cfg_path)
        }
        Commands::Run {
            seed,
            algorithm,
            max_evaluations,
            epsilon,
            out,
            json,
        } => {
            let cfg_path = args.config.context("--config required")?;
            let overrides = Overrides {
                seed,
                algorithm,
                max_evaluations,
                epsilon,
            };
            run_calibration(&cfg_path, overrides, out.as_deref(), json)
        }
    }
}
