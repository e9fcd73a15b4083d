//! WCSP solver CLI
//!
//! Loads a problem in DIMACS or UAI format, reduces it to a minimum
//! weighted vertex cover on the constraint composite graph, and prints the
//! best assignment found. Exit codes: 0 on success, 1 on usage or solver
//! errors, 2 when the input file cannot be read.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use ccgsolve::{
    direct, kernelize_to_fixpoint, polynomial, Ccg, Deadline, Format, HighsSolver, LpKernelizer,
    LpMwvcSolver, MessagePassingSolver, MwvcSolver, Polynomial, VarId, WcspInstance,
};

/// Convergence threshold of the message-passing solver.
const MESSAGE_PASSING_DELTA: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SolverChoice {
    LinearProgramming,
    MessagePassing,
}

fn parse_format(s: &str) -> Result<Format, String> {
    match s {
        "d" => Ok(Format::Dimacs),
        "u" => Ok(Format::Uai),
        other => Err(format!("unknown file format {other:?} (expected `d` or `u`)")),
    }
}

fn parse_solver(s: &str) -> Result<SolverChoice, String> {
    match s {
        "l" => Ok(SolverChoice::LinearProgramming),
        "m" => Ok(SolverChoice::MessagePassing),
        other => Err(format!("unknown MWVC solver {other:?} (expected `l` or `m`)")),
    }
}

#[derive(Debug, Parser)]
#[command(name = "ccgsolve", version, about = "Solve WCSPs through MWVC on the constraint composite graph")]
struct Cli {
    /// Input problem file.
    input: PathBuf,

    /// Input file format: `d` (DIMACS) or `u` (UAI).
    #[arg(short = 'f', long, default_value = "d", value_parser = parse_format)]
    file_format: Format,

    /// MWVC solver: `l` (linear programming) or `m` (message passing).
    #[arg(short = 'm', long, default_value = "l", value_parser = parse_solver)]
    mwvc_solver: SolverChoice,

    /// Skip kernelization.
    #[arg(short = 'k', long)]
    no_kernelization: bool,

    /// Stop after kernelization.
    #[arg(short = 'K', long)]
    kernelization_only: bool,

    /// Print the CCG without solving the MWVC problem on it.
    #[arg(short = 'g', long)]
    ccg_only: bool,

    /// Solve the problem directly as a linear program, without the CCG.
    #[arg(short = 'L', long)]
    linear_programming: bool,

    /// Time limit in seconds.
    #[arg(short = 't', long)]
    time_limit: Option<f64>,

    /// Write the CCG in DIMACS edges format to this file.
    #[arg(short = 'c', long)]
    ccg: Option<PathBuf>,

    /// Write the final result as JSON to this file.
    #[arg(long)]
    json: Option<PathBuf>,

    /// Seed the message-passing perturbation (entropy when absent).
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, serde::Serialize)]
struct ResultDump<'a> {
    assignment: &'a BTreeMap<VarId, usize>,
    total_weight: f64,
    timed_out: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let file = match File::open(&cli.input) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Unable to read file \"{}\": {err}", cli.input.display());
            return Ok(ExitCode::from(2));
        }
    };
    let instance = WcspInstance::from_reader(BufReader::new(file), cli.file_format)
        .with_context(|| format!("failed to parse {}", cli.input.display()))?;

    let deadline = match cli.time_limit {
        Some(limit) => Deadline::with_limit(limit),
        None => Deadline::unlimited(),
    };

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    instance.write_boolean_mapping(&mut stdout)?;

    if cli.linear_programming {
        let mut lp = HighsSolver::new();
        let solution = direct::solve_linear_programming(&instance, &mut lp, deadline)?;
        print_results(&mut stdout, &instance, &solution, deadline)?;
        write_json(&cli, &instance, &solution, deadline)?;
        return Ok(ExitCode::SUCCESS);
    }

    // Build the CCG from the accumulated constraint polynomial.
    let mut poly = Polynomial::new();
    for c in instance.constraints() {
        polynomial::accumulate_constraint(c, &mut poly)?;
    }
    let mut ccg = Ccg::new();
    let residual = ccg.add_polynomial(&mut poly);
    ccg.add_cliques(instance.boolean_blocks());

    // A map rather than a set, so each stage can see which variables have
    // been fixed already.
    let mut assignments: BTreeMap<VarId, bool> = BTreeMap::new();
    ccg.simplify(&mut assignments);

    let stats = ccg.statistics();
    info!(simplified_out = assignments.len(), "simplification finished");
    info!(
        variables = stats.variables,
        flower_roots = stats.flower_roots,
        thorns = stats.thorns,
        residual,
        "CCG constructed"
    );
    eprintln!("s = {residual}");

    if let Some(path) = &cli.ccg {
        let mut file = File::create(path)
            .with_context(|| format!("failed to open file \"{}\"", path.display()))?;
        ccg.write_dimacs(&mut file, true)?;
    }
    if cli.ccg_only {
        if cli.ccg.is_none() {
            ccg.write_dimacs(&mut stdout, true)?;
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut g = ccg.clone();
    if cli.no_kernelization {
        info!("kernelization disabled");
    } else {
        kernelize_to_fixpoint(&mut g, &mut assignments, ccg.num_total_variables(), || {
            LpKernelizer::new(HighsSolver::new())
        })?;
    }
    if cli.kernelization_only {
        info!(resolved = assignments.len(), "stopping after kernelization");
        return Ok(ExitCode::SUCCESS);
    }

    if assignments.len() < ccg.num_total_variables() {
        let outcome = match cli.mwvc_solver {
            SolverChoice::LinearProgramming => {
                LpMwvcSolver::new(HighsSolver::new(), deadline).solve(&g, &mut assignments, &instance)
            }
            SolverChoice::MessagePassing => {
                let rng = match cli.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                MessagePassingSolver::new(MESSAGE_PASSING_DELTA, rng, deadline)
                    .solve(&g, &mut assignments, &instance)
            }
        };
        match outcome {
            Ok(objective) => debug!(objective, "MWVC solver finished"),
            Err(err) if err.is_timeout() => {
                warn!("MWVC solver timed out; reporting the best prior assignment")
            }
            Err(err) => return Err(err.into()),
        }
    }

    let solution = instance.decode_cover(&assignments);
    print_results(&mut stdout, &instance, &solution, deadline)?;
    write_json(&cli, &instance, &solution, deadline)?;
    Ok(ExitCode::SUCCESS)
}

fn print_results(
    w: &mut impl Write,
    instance: &WcspInstance,
    solution: &BTreeMap<VarId, usize>,
    deadline: Deadline,
) -> io::Result<()> {
    let total = instance.compute_total_weight(solution);
    if deadline.reached() {
        writeln!(w, "Timeout solution")?;
    }
    writeln!(w, "Best assignments:")?;
    writeln!(w, "ID\tassignment")?;
    for (v, value) in solution {
        writeln!(w, "{v}\t{value}")?;
    }
    writeln!(w, "Optimal value: {total}")
}

fn write_json(
    cli: &Cli,
    instance: &WcspInstance,
    solution: &BTreeMap<VarId, usize>,
    deadline: Deadline,
) -> anyhow::Result<()> {
    let path = match &cli.json {
        Some(path) => path,
        None => return Ok(()),
    };
    let dump = ResultDump {
        assignment: solution,
        total_weight: instance.compute_total_weight(solution),
        timed_out: deadline.reached(),
    };
    let file = File::create(path)
        .with_context(|| format!("failed to open file \"{}\"", path.display()))?;
    serde_json::to_writer_pretty(file, &dump)?;
    Ok(())
}
