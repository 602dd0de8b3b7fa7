pub mod communication;
pub mod coordination;
pub mod global_variables;
pub mod monitoring;
pub mod simulation_engine;
