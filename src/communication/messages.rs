use serde::{Deserialize, Serialize};
use std::fmt;

/// What a train asks the coordinator to do. `Stop` is the terminal
/// shutdown signal for the coordinator loop, not a per-intersection action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainAction {
    Acquire,
    Release,
    Stop,
}

impl fmt::Display for TrainAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrainAction::Acquire => "ACQUIRE",
            TrainAction::Release => "RELEASE",
            TrainAction::Stop => "STOP",
        };
        write!(f, "{}", s)
    }
}

/// Coordinator decision delivered back to a train. `Grant` and `Ok` may
/// arrive either as the direct reply or as a later asynchronous
/// notification to a train that was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Grant,
    Wait,
    Ok,
    Fail,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Grant => "GRANT",
            Outcome::Wait => "WAIT",
            Outcome::Ok => "OK",
            Outcome::Fail => "FAIL",
        };
        write!(f, "{}", s)
    }
}

/// A request on the coordinator's shared inbound stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub train_id: u32,
    pub intersection_id: String,
    pub action: TrainAction,
}

impl Request {
    pub fn acquire(train_id: u32, intersection_id: &str) -> Self {
        Self {
            train_id,
            intersection_id: intersection_id.to_string(),
            action: TrainAction::Acquire,
        }
    }

    pub fn release(train_id: u32, intersection_id: &str) -> Self {
        Self {
            train_id,
            intersection_id: intersection_id.to_string(),
            action: TrainAction::Release,
        }
    }

    /// Shutdown signal; the intersection field is unused and left empty.
    pub fn stop() -> Self {
        Self {
            train_id: 0,
            intersection_id: String::new(),
            action: TrainAction::Stop,
        }
    }
}

/// A reply routed to a single train's private channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub train_id: u32,
    pub intersection_id: String,
    pub outcome: Outcome,
}

impl Response {
    pub fn new(train_id: u32, intersection_id: &str, outcome: Outcome) -> Self {
        Self {
            train_id,
            intersection_id: intersection_id.to_string(),
            outcome,
        }
    }
}
