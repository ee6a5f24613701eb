use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Builder;
use log::{info, warn, LevelFilter};

use phgs_cvrp::config::Config;
use phgs_cvrp::problem::Problem;
use phgs_cvrp::sync::CancellationToken;
use phgs_cvrp::utils::{format_duration, progress_path, stats_path};
use phgs_cvrp::HgsAlgorithm;

/// Parallel hybrid genetic search for the CVRP.
#[derive(Debug, Parser)]
#[command(name = "phgs", version, about)]
struct Args {
    /// Instance file in the CVRPLIB format
    instance: PathBuf,
    /// Where to write the best solution
    solution: PathBuf,
    /// Configuration file (JSON); command-line options override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Time limit in seconds, 0 for none
    #[arg(short = 't', long)]
    time_limit: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,
    /// Number of worker threads
    #[arg(long)]
    threads: Option<usize>,
    /// Non-improving iterations before a reset, or before stopping without a time limit
    #[arg(long)]
    iterations: Option<u64>,
    #[arg(long)]
    penalty_interval: Option<u64>,
    #[arg(long)]
    trace_interval: Option<u64>,
    /// Fleet size
    #[arg(long)]
    vehicles: Option<usize>,
    /// Round distances to the nearest integer
    #[arg(long)]
    round: bool,
    /// Also write the solution as JSON to this path
    #[arg(long)]
    json: Option<PathBuf>,
    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)
                .with_context(|| format!("cannot load configuration {}", path.display()))?,
            None => Config::new(),
        };

        match self.time_limit {
            Some(seconds) if seconds > 0.0 => config.time_limit = Some(Duration::from_secs_f64(seconds)),
            Some(_) => config.time_limit = None,
            None => {}
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(threads) = self.threads {
            config.num_threads = threads;
        }
        if let Some(iterations) = self.iterations {
            config.max_iterations_without_improvement = iterations;
        }
        if let Some(interval) = self.penalty_interval {
            config.nb_iter_penalty_management = interval;
        }
        if let Some(interval) = self.trace_interval {
            config.nb_iter_traces = interval;
        }
        if self.vehicles.is_some() {
            config.nb_vehicles = self.vehicles;
        }
        if self.quiet {
            config.verbose = false;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logger(verbose: bool) {
    let level = if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| writeln!(buf, "{} {}", record.level(), record.args()))
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.config()?;
    init_logger(config.verbose);
    info!("----- PARAMETERS: {:?}", config);

    info!("----- READING INSTANCE: {}", args.instance.display());
    let problem = Problem::from_cvrplib_file(&args.instance, args.round)
        .with_context(|| format!("cannot read instance {}", args.instance.display()))?;
    let instance_name = args.instance.display().to_string();

    let token = CancellationToken::new();
    ctrlc::set_handler({
        let token = token.clone();
        move || token.cancel()
    })
    .context("cannot set interruption handler")?;

    let mut hgs = HgsAlgorithm::new(problem, config);
    hgs.run(&token);
    info!("----- RUN TIME: {}", format_duration(hgs.run_time));

    for failure in &hgs.failures {
        warn!("{}", failure);
    }

    match hgs.solution() {
        Some(solution) => {
            info!("----- WRITING BEST SOLUTION IN : {}", args.solution.display());
            solution.export_cvrplib(&args.solution)?;
            hgs.population
                .export_search_progress(progress_path(&args.solution), &instance_name)?;
            if let Some(path) = &args.json {
                solution.export_json(path)?;
            }
        }
        None => warn!("no feasible solution found"),
    }

    if !hgs.population.feasible_stats().is_empty() {
        let path = stats_path(&args.solution);
        info!("----- WRITING STATS IN : {}", path.display());
        hgs.population.export_feasible_stats(&path)?;
    }

    Ok(())
}
