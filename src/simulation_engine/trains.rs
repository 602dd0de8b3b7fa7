use log::{info, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use crate::communication::messages::{Outcome, Request, Response};

/// Protocol states a train moves through while walking its route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainState {
    Idle,
    Requesting,
    Waiting,
    Holding,
    Traversing,
    Releasing,
    Done,
}

/// A train walking a fixed route of intersections. Holds exactly one
/// intersection at a time: acquire, traverse, release, advance.
#[derive(Debug, Clone)]
pub struct Train {
    pub id: u32,
    pub route: Vec<String>,
    pub position: usize,
    pub state: TrainState,
}

impl Train {
    pub fn new(id: u32, route: Vec<String>) -> Self {
        Self {
            id,
            route,
            position: 0,
            state: TrainState::Idle,
        }
    }

    pub fn current_leg(&self) -> Option<&str> {
        self.route.get(self.position).map(String::as_str)
    }
}

/// Failures that end a train's run. Transport failures are fatal to the
/// train only; the rest of the simulation keeps going.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("train {train_id}: request channel closed")]
    RequestChannelClosed { train_id: u32 },
    #[error("train {train_id}: reply channel closed")]
    ReplyChannelClosed { train_id: u32 },
    #[error("train {train_id}: coordinator rejected ACQUIRE of {intersection}")]
    AcquireRejected { train_id: u32, intersection: String },
}

/// Drives one train through its route, blocking only on the train's own
/// reply channel. A WAIT outcome keeps the train parked on that channel
/// until the asynchronous GRANT arrives; there is no timeout.
pub async fn run_train(
    mut train: Train,
    requests: mpsc::Sender<Request>,
    mut replies: mpsc::UnboundedReceiver<Response>,
    traversal_millis: u64,
) -> Result<Train, TrainError> {
    info!("Train {} starting, route {:?}", train.id, train.route);

    while let Some(leg) = train.current_leg().map(str::to_string) {
        acquire_leg(&mut train, &leg, &requests, &mut replies).await?;

        train.state = TrainState::Holding;
        println!("Train {} is moving through {}", train.id, leg);
        train.state = TrainState::Traversing;
        sleep(Duration::from_millis(traversal_millis)).await;

        if release_leg(&mut train, &leg, &requests, &mut replies).await? {
            train.position += 1;
        } else {
            // The hold was preempted mid-traversal. Backtrack: re-request
            // the same intersection before advancing.
            println!(
                "Train {} lost {} to preemption, backtracking",
                train.id, leg
            );
        }
    }

    train.state = TrainState::Done;
    println!("Train {} has reached the end of its route", train.id);
    Ok(train)
}

/// Sends ACQUIRE and blocks until the terminal GRANT, riding out any WAIT.
async fn acquire_leg(
    train: &mut Train,
    leg: &str,
    requests: &mpsc::Sender<Request>,
    replies: &mut mpsc::UnboundedReceiver<Response>,
) -> Result<(), TrainError> {
    train.state = TrainState::Requesting;
    println!("Train {} requesting {}", train.id, leg);
    requests
        .send(Request::acquire(train.id, leg))
        .await
        .map_err(|_| TrainError::RequestChannelClosed { train_id: train.id })?;

    loop {
        let response = replies
            .recv()
            .await
            .ok_or(TrainError::ReplyChannelClosed { train_id: train.id })?;
        if response.intersection_id != leg {
            warn!(
                "Train {} ignoring stale reply for {}",
                train.id, response.intersection_id
            );
            continue;
        }
        match response.outcome {
            Outcome::Grant => return Ok(()),
            Outcome::Wait => {
                train.state = TrainState::Waiting;
                println!("Train {} waiting for {}", train.id, leg);
            }
            Outcome::Fail => {
                return Err(TrainError::AcquireRejected {
                    train_id: train.id,
                    intersection: leg.to_string(),
                });
            }
            Outcome::Ok => {
                warn!("Train {} got OK while acquiring {}", train.id, leg);
            }
        }
    }
}

/// Sends RELEASE and blocks for the verdict. Returns false when the
/// coordinator answers FAIL, meaning the hold was already revoked by a
/// preemption and the leg must be re-acquired.
async fn release_leg(
    train: &mut Train,
    leg: &str,
    requests: &mpsc::Sender<Request>,
    replies: &mut mpsc::UnboundedReceiver<Response>,
) -> Result<bool, TrainError> {
    train.state = TrainState::Releasing;
    println!("Train {} releasing {}", train.id, leg);
    requests
        .send(Request::release(train.id, leg))
        .await
        .map_err(|_| TrainError::RequestChannelClosed { train_id: train.id })?;

    loop {
        let response = replies
            .recv()
            .await
            .ok_or(TrainError::ReplyChannelClosed { train_id: train.id })?;
        if response.intersection_id != leg {
            warn!(
                "Train {} ignoring stale reply for {}",
                train.id, response.intersection_id
            );
            continue;
        }
        match response.outcome {
            Outcome::Ok => return Ok(true),
            Outcome::Fail => return Ok(false),
            other => {
                warn!(
                    "Train {} got {} while releasing {}",
                    train.id, other, leg
                );
            }
        }
    }
}
