use log::{error, info};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::communication::messages::Request;
use crate::coordination::coordinator::Coordinator;
use crate::global_variables::REQUEST_QUEUE_CAPACITY;
use crate::monitoring::event_log::CsvEventLogger;
use crate::simulation_engine::config::SimulationConfig;
use crate::simulation_engine::trains::{run_train, Train};

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("coordinator task ended before shutdown completed")]
    CoordinatorUnavailable,
}

/// Wires up the whole simulation: one coordinator task consuming the
/// shared request stream, one task per train with its private reply
/// channel. Trains are joined first, then the coordinator is stopped with
/// the terminal STOP message and torn down.
pub async fn run_simulation(
    config: SimulationConfig,
    event_log: Option<CsvEventLogger>,
    traversal_millis: u64,
) -> Result<(), SimulationError> {
    let (request_tx, request_rx) = mpsc::channel::<Request>(REQUEST_QUEUE_CAPACITY);

    let mut coordinator = Coordinator::new(&config.intersections);
    if let Some(event_log) = event_log {
        coordinator.attach_event_log(event_log);
    }

    let mut train_tasks = Vec::new();
    for train_config in &config.trains {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        coordinator.register_train(train_config.id, reply_tx);

        let train = Train::new(train_config.id, train_config.route.clone());
        let requests = request_tx.clone();
        train_tasks.push(tokio::spawn(run_train(
            train,
            requests,
            reply_rx,
            traversal_millis,
        )));
    }

    let coordinator_task = tokio::spawn(coordinator.run(request_rx));

    for task in train_tasks {
        match task.await {
            Ok(Ok(train)) => info!("Train {} finished its route", train.id),
            // A failed train is fatal to that train only; the rest of the
            // simulation keeps running.
            Ok(Err(e)) => error!("{}", e),
            Err(e) => error!("Train task panicked: {}", e),
        }
    }

    request_tx
        .send(Request::stop())
        .await
        .map_err(|_| SimulationError::CoordinatorUnavailable)?;
    coordinator_task
        .await
        .map_err(|_| SimulationError::CoordinatorUnavailable)?;

    info!("Simulation complete");
    Ok(())
}
