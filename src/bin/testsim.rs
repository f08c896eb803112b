//! Stand-in simulator speaking the calibration line protocol.
//!
//! Reads one decision vector per line on stdin and answers each with one
//! line of objectives (no constraints) until end of input. Faults can be
//! injected after a number of good answers to exercise the driver's
//! failure paths.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Problem {
    /// f0 = sum(v), f1 = sum(v)^2
    Sumsq,
    /// ZDT1 on the unit cube
    Zdt1,
    /// Schaffer N.1 on the first variable
    Schaffer,
    /// 2 * v_i for every component
    Double,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Fault {
    /// Answer with one token too few
    Short,
    /// Answer with a non-numeric token
    Garbage,
    /// Exit without answering
    Exit,
    /// Never answer
    Hang,
    /// Answer, then write one more line nobody asked for
    Chatter,
}

#[derive(Parser, Debug)]
#[command(name = "testsim")]
#[command(about = "Analytic test problems behind the simulator line protocol")]
struct Args {
    #[arg(long, value_enum, default_value = "sumsq")]
    problem: Problem,

    /// Misbehave once this many answers have been sent
    #[arg(long, value_enum)]
    fault: Option<Fault>,

    #[arg(long, default_value = "0")]
    fault_after: usize,

    /// Auxiliary data file, accepted like the real simulator's and ignored
    data: Option<String>,
}

fn evaluate(problem: Problem, x: &[f64]) -> Vec<f64> {
    match problem {
        Problem::Sumsq => {
            let s: f64 = x.iter().sum();
            vec![s, s * s]
        }
        Problem::Zdt1 => {
            let f1 = x[0];
            let g = if x.len() > 1 {
                1.0 + 9.0 * x[1..].iter().sum::<f64>() / (x.len() - 1) as f64
            } else {
                1.0
            };
            vec![f1, g * (1.0 - (f1 / g).sqrt())]
        }
        Problem::Schaffer => {
            let v = x[0];
            vec![v * v, (v - 2.0) * (v - 2.0)]
        }
        Problem::Double => x.iter().map(|v| 2.0 * v).collect(),
    }
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn main() -> Result<()> {
    let args = Args::parse();
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for (answered, line) in stdin.lock().lines().enumerate() {
        let line = line.context("failed to read request")?;
        let x = line
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("malformed request {:?}", line))?;
        if x.is_empty() {
            anyhow::bail!("empty request");
        }
        let values = evaluate(args.problem, &x);

        let reply = match args.fault {
            Some(fault) if answered >= args.fault_after => match fault {
                Fault::Short => join(&values[..values.len() - 1]),
                Fault::Garbage => format!("{} not-a-number", join(&values[1..])),
                Fault::Exit => return Ok(()),
                Fault::Hang => loop {
                    thread::sleep(Duration::from_secs(3600));
                },
                Fault::Chatter => {
                    let stray = vec![999.0; values.len()];
                    format!("{}\n{}", join(&values), join(&stray))
                }
            },
            _ => join(&values),
        };

        writeln!(out, "{}", reply)?;
        out.flush()?;
    }

    Ok(())
}
