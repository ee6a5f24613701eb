//! Basic example of using the PHGS-CVRP library.

use phgs_cvrp::config::Config;
use phgs_cvrp::problem::Problem;
use phgs_cvrp::sync::CancellationToken;
use phgs_cvrp::utils::format_duration;
use phgs_cvrp::HgsAlgorithm;
use std::env;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Get instance path from command line or use default
    let args: Vec<String> = env::args().collect();
    let instance_path = if args.len() > 1 {
        &args[1]
    } else {
        "instances/X-n101-k25.vrp"
    };

    println!("Loading problem from: {}", instance_path);
    let problem = Problem::from_cvrplib_file(instance_path, true)?;
    println!(
        "Loaded problem: {} with {} customers",
        problem.name,
        problem.get_customer_count()
    );

    let config = Config::new()
        .with_min_pop_size(25)
        .with_generation_size(40)
        .with_n_elite(4)
        .with_n_closest(5)
        .with_granularity(20)
        .with_num_threads(4)
        .with_time_limit(Duration::from_secs(60));
    config.validate()?;

    let mut algorithm = HgsAlgorithm::new(problem.clone(), config);

    println!("Starting search with 4 workers (time limit: 60s)");
    let token = CancellationToken::new();
    let found = algorithm.run(&token).is_some();

    println!("Search completed in {}", format_duration(algorithm.run_time));
    println!("Iterations: {}", algorithm.iterations);
    for failure in &algorithm.failures {
        println!("Worker failure: {}", failure);
    }

    if !found {
        println!("No feasible solution found");
        return Ok(());
    }

    if let Some(solution) = algorithm.solution() {
        println!("{:?}", solution);
        let output_path = format!("{}.sol", problem.name);
        println!("Saving solution to: {}", output_path);
        solution.export_cvrplib(&output_path)?;
    }

    Ok(())
}
