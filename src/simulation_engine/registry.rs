use std::collections::{HashMap, VecDeque};

use crate::simulation_engine::intersections::Intersection;

/// Per-intersection occupancy record: who is inside, who is queued.
#[derive(Debug, Clone)]
struct IntersectionState {
    capacity: u32,
    holders: Vec<u32>,
    wait_queue: VecDeque<u32>,
}

/// Authoritative record of holders and FIFO waiters for every intersection,
/// kept separately from the raw gate counters so idempotency and fairness
/// can be enforced. Owned and mutated only by the coordinator.
#[derive(Debug, Default)]
pub struct IntersectionRegistry {
    states: HashMap<String, IntersectionState>,
}

impl IntersectionRegistry {
    pub fn new(intersections: &[Intersection]) -> Self {
        let mut states = HashMap::new();
        for intersection in intersections {
            states.insert(
                intersection.id.clone(),
                IntersectionState {
                    capacity: intersection.capacity,
                    holders: Vec::new(),
                    wait_queue: VecDeque::new(),
                },
            );
        }
        Self { states }
    }

    /// Whether the intersection id was declared in the configuration.
    pub fn contains(&self, intersection: &str) -> bool {
        self.states.contains_key(intersection)
    }

    pub fn is_holder(&self, intersection: &str, train_id: u32) -> bool {
        self.states
            .get(intersection)
            .map(|s| s.holders.contains(&train_id))
            .unwrap_or(false)
    }

    /// Adds the train as a holder. Re-adding a current holder is a no-op that
    /// still reports success, so a duplicate ACQUIRE never double-counts.
    /// Fails when the intersection is unknown or already at capacity. A
    /// newly admitted train is dropped from the wait queue, keeping each
    /// train in at most one of holders and wait_queue.
    pub fn add_holder(&mut self, intersection: &str, train_id: u32) -> bool {
        let Some(state) = self.states.get_mut(intersection) else {
            return false;
        };
        if state.holders.contains(&train_id) {
            return true;
        }
        if state.holders.len() as u32 >= state.capacity {
            return false;
        }
        state.holders.push(train_id);
        state.wait_queue.retain(|&id| id != train_id);
        true
    }

    /// Fails if the train is not currently a holder.
    pub fn remove_holder(&mut self, intersection: &str, train_id: u32) -> bool {
        let Some(state) = self.states.get_mut(intersection) else {
            return false;
        };
        match state.holders.iter().position(|&id| id == train_id) {
            Some(pos) => {
                state.holders.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Appends the train to the wait queue unless it is already queued or
    /// already inside the intersection.
    pub fn enqueue_waiter(&mut self, intersection: &str, train_id: u32) {
        if let Some(state) = self.states.get_mut(intersection) {
            if !state.wait_queue.contains(&train_id) && !state.holders.contains(&train_id) {
                state.wait_queue.push_back(train_id);
            }
        }
    }

    /// Pops the oldest waiter, preserving FIFO fairness among queued trains.
    pub fn dequeue_waiter(&mut self, intersection: &str) -> Option<u32> {
        self.states
            .get_mut(intersection)
            .and_then(|s| s.wait_queue.pop_front())
    }

    /// Puts a train back at the head of the queue after a failed hand-off,
    /// so its turn is not lost.
    pub fn requeue_front(&mut self, intersection: &str, train_id: u32) {
        if let Some(state) = self.states.get_mut(intersection) {
            state.wait_queue.push_front(train_id);
        }
    }

    pub fn holders(&self, intersection: &str) -> &[u32] {
        self.states
            .get(intersection)
            .map(|s| s.holders.as_slice())
            .unwrap_or(&[])
    }

    pub fn waiter_count(&self, intersection: &str) -> usize {
        self.states
            .get(intersection)
            .map(|s| s.wait_queue.len())
            .unwrap_or(0)
    }
}
