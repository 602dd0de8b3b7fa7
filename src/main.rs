use std::env;
use std::process;

use log::info;

use railway_sim::global_variables::{
    DEFAULT_EVENT_LOG_FILE, DEFAULT_INTERSECTIONS_FILE, DEFAULT_TRAINS_FILE,
    DEFAULT_TRAVERSAL_MILLIS,
};
use railway_sim::monitoring::event_log::CsvEventLogger;
use railway_sim::simulation_engine::config::SimulationConfig;
use railway_sim::simulation_engine::simulation::run_simulation;

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let intersections_file = args
        .get(1)
        .map(String::as_str)
        .unwrap_or(DEFAULT_INTERSECTIONS_FILE);
    let trains_file = args.get(2).map(String::as_str).unwrap_or(DEFAULT_TRAINS_FILE);

    let config = match SimulationConfig::load(intersections_file, trains_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    info!(
        "Parsed {} intersections and {} trains",
        config.intersections.len(),
        config.trains.len()
    );
    for intersection in &config.intersections {
        println!(
            "Intersection {}: capacity {}",
            intersection.id, intersection.capacity
        );
    }
    for train in &config.trains {
        println!("Train {}: route {:?}", train.id, train.route);
    }

    let event_log = match CsvEventLogger::create(DEFAULT_EVENT_LOG_FILE) {
        Ok(event_log) => event_log,
        Err(e) => {
            eprintln!("Failed to open event log {}: {}", DEFAULT_EVENT_LOG_FILE, e);
            process::exit(1);
        }
    };

    if let Err(e) = run_simulation(config, Some(event_log), DEFAULT_TRAVERSAL_MILLIS).await {
        eprintln!("Simulation failed: {}", e);
        process::exit(1);
    }
    println!("All trains have completed their routes. Exiting.");
}
