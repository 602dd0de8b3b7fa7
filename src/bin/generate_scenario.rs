use std::env;
use std::path::Path;
use std::process;

use railway_sim::simulation_engine::config::{random_config, write_files};

/// Writes a randomized scenario to config/intersections.txt and
/// config/trains.txt, ready for the main simulation binary.
fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let intersection_count = args
        .get(1)
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(6);
    let train_count = args
        .get(2)
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(4);

    if intersection_count == 0 || train_count == 0 {
        eprintln!("Intersection and train counts must both be at least 1");
        process::exit(1);
    }

    let config = random_config(intersection_count, train_count);
    if let Err(e) = write_files(&config, Path::new("config")) {
        eprintln!("Failed to write scenario files: {}", e);
        process::exit(1);
    }

    println!(
        "Wrote {} intersections and {} trains under config/",
        config.intersections.len(),
        config.trains.len()
    );
    for train in &config.trains {
        println!("Train {}: route {:?}", train.id, train.route);
    }
}
