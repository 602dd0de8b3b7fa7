// Default configuration file locations
pub const DEFAULT_INTERSECTIONS_FILE: &str = "config/intersections.txt";
pub const DEFAULT_TRAINS_FILE: &str = "config/trains.txt";

// Audit log output
pub const DEFAULT_EVENT_LOG_FILE: &str = "simulation_events.csv";

// Channel sizing for the coordinator's inbound request stream
pub const REQUEST_QUEUE_CAPACITY: usize = 64;

// How long a train spends inside an intersection, in milliseconds
pub const DEFAULT_TRAVERSAL_MILLIS: u64 = 1000;

// Simulated seconds added to the clock per coordinator decision
pub const SIM_SECONDS_PER_DECISION: u64 = 1;
