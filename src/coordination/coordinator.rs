use std::collections::HashMap;

use log::{info, warn};
use tokio::sync::mpsc;

use crate::communication::messages::{Outcome, Request, Response, TrainAction};
use crate::coordination::resource_graph::{format_cycle, NodeKey, ResourceGraph};
use crate::global_variables::SIM_SECONDS_PER_DECISION;
use crate::monitoring::event_log::{
    deadlock_detail, holders_detail, preemption_detail, CsvEventLogger, EventRecord,
};
use crate::simulation_engine::clock::{current_timestamp, SimClock};
use crate::simulation_engine::intersections::{CapacityGate, Intersection};
use crate::simulation_engine::registry::IntersectionRegistry;

/// Central arbiter for all intersection access. A single task owns the
/// gates, the holder/wait registry and the wait-for graph, and processes
/// one request at a time; that total ordering is what makes graph mutation
/// and cycle detection correct without any further locking.
pub struct Coordinator {
    gates: HashMap<String, CapacityGate>,
    registry: IntersectionRegistry,
    graph: ResourceGraph,
    reply_channels: HashMap<u32, mpsc::UnboundedSender<Response>>,
    event_log: Option<CsvEventLogger>,
    clock: SimClock,
}

impl Coordinator {
    pub fn new(intersections: &[Intersection]) -> Self {
        let mut gates = HashMap::new();
        for intersection in intersections {
            gates.insert(
                intersection.id.clone(),
                CapacityGate::new(intersection.capacity),
            );
        }
        Self {
            gates,
            registry: IntersectionRegistry::new(intersections),
            graph: ResourceGraph::new(),
            reply_channels: HashMap::new(),
            event_log: None,
            clock: SimClock::new(),
        }
    }

    /// Attaches the CSV audit sink. Without one, decisions are still logged
    /// through the `log` facade but leave no CSV trail (used by tests).
    pub fn attach_event_log(&mut self, event_log: CsvEventLogger) {
        self.event_log = Some(event_log);
    }

    /// Registers the private reply channel for a train. Replies and
    /// asynchronous grant notifications are routed through this sender.
    pub fn register_train(&mut self, train_id: u32, sender: mpsc::UnboundedSender<Response>) {
        self.reply_channels.insert(train_id, sender);
    }

    pub fn registry(&self) -> &IntersectionRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    /// Drains the shared inbound stream until a STOP message arrives, then
    /// tears down. Every ACQUIRE/RELEASE gets exactly one synchronous reply;
    /// queued trains additionally receive an asynchronous GRANT later.
    pub async fn run(mut self, mut requests: mpsc::Receiver<Request>) -> Self {
        self.log_event(0, "SYSTEM", "STARTUP", "OK", String::new());
        info!("Coordinator ready, waiting for requests");

        while let Some(request) = requests.recv().await {
            if request.action == TrainAction::Stop {
                info!("Received STOP signal, exiting coordinator loop");
                break;
            }
            let outcome = self.process(&request);
            self.send_response(Response::new(
                request.train_id,
                &request.intersection_id,
                outcome,
            ));
        }

        self.log_event(0, "SYSTEM", "STOP", "OK", String::new());
        self.shutdown();
        self
    }

    /// Handles a single request and returns the synchronous outcome.
    /// Asynchronous grant notifications to previously queued trains are
    /// sent from inside the release path.
    pub fn process(&mut self, request: &Request) -> Outcome {
        self.clock.advance(SIM_SECONDS_PER_DECISION);
        match request.action {
            TrainAction::Acquire => {
                self.handle_acquire(request.train_id, &request.intersection_id)
            }
            TrainAction::Release => {
                self.handle_release(request.train_id, &request.intersection_id)
            }
            TrainAction::Stop => {
                // STOP is consumed by the run loop; seeing it here means a
                // caller bypassed the loop.
                warn!("STOP passed to process(), ignoring");
                Outcome::Fail
            }
        }
    }

    fn handle_acquire(&mut self, train_id: u32, intersection: &str) -> Outcome {
        if !self.registry.contains(intersection) {
            warn!(
                "Train {} requested unknown intersection {}",
                train_id, intersection
            );
            self.log_event(train_id, intersection, "ACQUIRE", "FAIL", String::new());
            return Outcome::Fail;
        }

        // A re-ACQUIRE by a current holder re-issues GRANT without touching
        // any count.
        if self.registry.is_holder(intersection, train_id) {
            info!(
                "Train {} already holds {}, re-issuing GRANT",
                train_id, intersection
            );
            self.log_event(
                train_id,
                intersection,
                "ACQUIRE",
                "GRANT",
                self.snapshot(intersection),
            );
            return Outcome::Grant;
        }

        // Direct grant while capacity remains.
        if self.registry.add_holder(intersection, train_id) {
            if self.gate_try_acquire(intersection) {
                self.graph.promote_to_allocation(train_id, intersection);
                info!("GRANTED {} to Train {}", intersection, train_id);
                self.log_event(
                    train_id,
                    intersection,
                    "ACQUIRE",
                    "GRANT",
                    self.snapshot(intersection),
                );
                return Outcome::Grant;
            }
            // The gate refused even though the registry accepted; undo so
            // the two stay in step and fall through to the wait path.
            self.registry.remove_holder(intersection, train_id);
            warn!(
                "Gate refused Train {} on {} after registry accepted",
                train_id, intersection
            );
        }

        // At capacity: record the request edge, then look for a circular
        // wait before queueing. Detection runs in the same step, so no
        // cycle can survive past this decision.
        self.graph.add_request_edge(train_id, intersection);
        if let Some(cycle) = self.graph.detect_cycle() {
            return self.resolve_deadlock(train_id, intersection, &cycle);
        }

        self.registry.enqueue_waiter(intersection, train_id);
        info!("{} full, Train {} queued", intersection, train_id);
        self.log_event(
            train_id,
            intersection,
            "ACQUIRE",
            "WAIT",
            self.snapshot(intersection),
        );
        Outcome::Wait
    }

    fn handle_release(&mut self, train_id: u32, intersection: &str) -> Outcome {
        if !self.registry.contains(intersection) {
            warn!(
                "Train {} released unknown intersection {}",
                train_id, intersection
            );
            self.log_event(train_id, intersection, "RELEASE", "FAIL", String::new());
            return Outcome::Fail;
        }

        if !self.registry.is_holder(intersection, train_id) {
            warn!(
                "Train {} released {} without holding it",
                train_id, intersection
            );
            self.log_event(train_id, intersection, "RELEASE", "FAIL", String::new());
            return Outcome::Fail;
        }

        self.registry.remove_holder(intersection, train_id);
        if !self.gate_release(intersection) {
            warn!("Gate underflow on {} while releasing", intersection);
        }
        self.graph.remove_edges(train_id, intersection);
        info!("Released {} from Train {}", intersection, train_id);
        self.log_event(
            train_id,
            intersection,
            "RELEASE",
            "OK",
            self.snapshot(intersection),
        );

        self.grant_next_waiter(intersection);
        Outcome::Ok
    }

    /// Hands the freed slot to the oldest waiter, notifying it through its
    /// private channel. A waiter that cannot actually be admitted goes back
    /// to the head of the queue so its turn is not lost.
    fn grant_next_waiter(&mut self, intersection: &str) {
        let Some(next_train) = self.registry.dequeue_waiter(intersection) else {
            return;
        };

        if !self.registry.add_holder(intersection, next_train) {
            self.registry.requeue_front(intersection, next_train);
            return;
        }
        if !self.gate_try_acquire(intersection) {
            self.registry.remove_holder(intersection, next_train);
            self.registry.requeue_front(intersection, next_train);
            return;
        }

        self.graph.promote_to_allocation(next_train, intersection);
        info!("Granted waiting Train {} access to {}", next_train, intersection);
        self.log_event(
            next_train,
            intersection,
            "ACQUIRE",
            "GRANT",
            self.snapshot(intersection),
        );
        self.send_response(Response::new(next_train, intersection, Outcome::Grant));
    }

    /// Breaks a detected circular wait by revoking one holder of the
    /// contested intersection and granting it to the requester. The victim
    /// is the holder with the lowest train id, a deterministic tie-break;
    /// it is not re-queued and must re-request the intersection itself.
    fn resolve_deadlock(
        &mut self,
        requester: u32,
        intersection: &str,
        cycle: &[NodeKey],
    ) -> Outcome {
        let cycle_path = format_cycle(cycle);
        warn!("Deadlock detected: {}", cycle_path);
        self.log_event(
            requester,
            intersection,
            "DEADLOCK",
            "DETECTED",
            deadlock_detail(&cycle_path, self.graph.node_count()),
        );

        let victim = self.registry.holders(intersection).iter().copied().min();
        let Some(victim) = victim else {
            // Nothing to preempt here; leave the requester queued.
            self.registry.enqueue_waiter(intersection, requester);
            self.log_event(
                requester,
                intersection,
                "ACQUIRE",
                "WAIT",
                self.snapshot(intersection),
            );
            return Outcome::Wait;
        };

        self.registry.remove_holder(intersection, victim);
        if !self.gate_release(intersection) {
            warn!("Gate underflow on {} while preempting", intersection);
        }
        self.graph.remove_edges(victim, intersection);
        warn!(
            "Preempted Train {} from {} to break the cycle",
            victim, intersection
        );
        self.log_event(
            victim,
            intersection,
            "PREEMPT",
            "OK",
            preemption_detail(requester, true),
        );

        self.registry.add_holder(intersection, requester);
        self.gate_try_acquire(intersection);
        self.graph.promote_to_allocation(requester, intersection);
        info!(
            "GRANTED {} to Train {} after preemption",
            intersection, requester
        );
        self.log_event(
            requester,
            intersection,
            "ACQUIRE",
            "GRANT",
            self.snapshot(intersection),
        );
        Outcome::Grant
    }

    fn gate_try_acquire(&mut self, intersection: &str) -> bool {
        self.gates
            .get_mut(intersection)
            .map(|gate| gate.try_acquire())
            .unwrap_or(false)
    }

    fn gate_release(&mut self, intersection: &str) -> bool {
        self.gates
            .get_mut(intersection)
            .map(|gate| gate.release())
            .unwrap_or(false)
    }

    fn snapshot(&self, intersection: &str) -> String {
        holders_detail(
            self.registry.holders(intersection),
            self.registry.waiter_count(intersection),
        )
    }

    fn send_response(&mut self, response: Response) {
        let train_id = response.train_id;
        let mut stale = false;
        if let Some(sender) = self.reply_channels.get(&train_id) {
            if sender.send(response).is_err() {
                warn!("Reply channel for Train {} is closed", train_id);
                stale = true;
            }
        } else {
            warn!("No reply channel registered for Train {}", train_id);
        }
        if stale {
            self.reply_channels.remove(&train_id);
        }
    }

    fn log_event(
        &mut self,
        train_id: u32,
        intersection: &str,
        action: &str,
        status: &str,
        detail: String,
    ) {
        let sim_time = self.clock.stamp();
        if let Some(event_log) = self.event_log.as_mut() {
            event_log.log(&EventRecord {
                sim_time,
                timestamp: current_timestamp(),
                train_id,
                intersection_id: intersection.to_string(),
                action: action.to_string(),
                status: status.to_string(),
                detail,
            });
        }
    }

    fn shutdown(&mut self) {
        self.reply_channels.clear();
        self.event_log = None;
        info!("Coordinator state torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    fn test_intersections() -> Vec<Intersection> {
        vec![
            Intersection::new("IntersectionA", 1),
            Intersection::new("IntersectionB", 1),
            Intersection::new("IntersectionC", 2),
        ]
    }

    fn coordinator_with_trains(
        train_ids: &[u32],
    ) -> (
        Coordinator,
        HashMap<u32, mpsc::UnboundedReceiver<Response>>,
    ) {
        let mut coordinator = Coordinator::new(&test_intersections());
        let mut receivers = HashMap::new();
        for &id in train_ids {
            let (tx, rx) = mpsc::unbounded_channel();
            coordinator.register_train(id, tx);
            receivers.insert(id, rx);
        }
        (coordinator, receivers)
    }

    #[test]
    fn mutual_exclusion_scenario() {
        // Intersection A has capacity 1: first train in, second queued,
        // async grant on release.
        let (mut coordinator, mut rx) = coordinator_with_trains(&[1, 2]);

        assert_eq!(
            coordinator.process(&Request::acquire(1, "IntersectionA")),
            Outcome::Grant
        );
        assert_eq!(
            coordinator.process(&Request::acquire(2, "IntersectionA")),
            Outcome::Wait
        );
        assert_eq!(
            coordinator.process(&Request::release(1, "IntersectionA")),
            Outcome::Ok
        );

        let notification = rx.get_mut(&2).unwrap().try_recv().unwrap();
        assert_eq!(notification.outcome, Outcome::Grant);
        assert_eq!(notification.intersection_id, "IntersectionA");
        assert_eq!(coordinator.registry().holders("IntersectionA"), &[2]);
    }

    #[test]
    fn shared_capacity_scenario() {
        // Intersection C admits two concurrent holders, the third waits.
        let (mut coordinator, _rx) = coordinator_with_trains(&[1, 2, 3]);

        assert_eq!(
            coordinator.process(&Request::acquire(1, "IntersectionC")),
            Outcome::Grant
        );
        assert_eq!(
            coordinator.process(&Request::acquire(2, "IntersectionC")),
            Outcome::Grant
        );
        assert_eq!(
            coordinator.process(&Request::acquire(3, "IntersectionC")),
            Outcome::Wait
        );
        assert_eq!(coordinator.registry().holders("IntersectionC").len(), 2);
        assert_eq!(coordinator.registry().waiter_count("IntersectionC"), 1);
    }

    #[test]
    fn deadlock_is_preempted_within_the_same_decision() {
        // Train 1 holds B and wants A; Train 2 holds A and wants B.
        let (mut coordinator, mut rx) = coordinator_with_trains(&[1, 2]);

        assert_eq!(
            coordinator.process(&Request::acquire(1, "IntersectionB")),
            Outcome::Grant
        );
        assert_eq!(
            coordinator.process(&Request::acquire(2, "IntersectionA")),
            Outcome::Grant
        );
        assert_eq!(
            coordinator.process(&Request::acquire(2, "IntersectionB")),
            Outcome::Wait
        );

        // Train 1's request closes the cycle; Train 2 (the only holder of
        // A) is preempted and Train 1 gets a forced grant.
        assert_eq!(
            coordinator.process(&Request::acquire(1, "IntersectionA")),
            Outcome::Grant
        );
        assert!(coordinator.graph().detect_cycle().is_none());
        assert_eq!(coordinator.registry().holders("IntersectionA"), &[1]);
        assert!(!coordinator.registry().is_holder("IntersectionA", 2));

        // The victim gets no notification; it finds out when its RELEASE
        // comes back FAIL and backtracks.
        assert!(matches!(
            rx.get_mut(&2).unwrap().try_recv(),
            Err(TryRecvError::Empty)
        ));
        assert_eq!(
            coordinator.process(&Request::release(2, "IntersectionA")),
            Outcome::Fail
        );
    }

    #[test]
    fn preemption_victim_is_lowest_train_id() {
        let (mut coordinator, _rx) = coordinator_with_trains(&[1, 2, 5]);

        // Trains 2 and 5 share C (capacity 2); Train 1 holds A; Train 5
        // waits on A; Train 1's request for C closes the cycle through C.
        assert_eq!(
            coordinator.process(&Request::acquire(2, "IntersectionC")),
            Outcome::Grant
        );
        assert_eq!(
            coordinator.process(&Request::acquire(5, "IntersectionC")),
            Outcome::Grant
        );
        assert_eq!(
            coordinator.process(&Request::acquire(1, "IntersectionA")),
            Outcome::Grant
        );
        assert_eq!(
            coordinator.process(&Request::acquire(5, "IntersectionA")),
            Outcome::Wait
        );
        assert_eq!(
            coordinator.process(&Request::acquire(1, "IntersectionC")),
            Outcome::Grant
        );

        // Of C's holders {2, 5}, the lowest id is evicted.
        assert!(!coordinator.registry().is_holder("IntersectionC", 2));
        assert!(coordinator.registry().is_holder("IntersectionC", 5));
        assert!(coordinator.registry().is_holder("IntersectionC", 1));
        assert!(coordinator.graph().detect_cycle().is_none());
    }

    #[test]
    fn reacquire_by_holder_is_idempotent() {
        let (mut coordinator, _rx) = coordinator_with_trains(&[1]);

        assert_eq!(
            coordinator.process(&Request::acquire(1, "IntersectionA")),
            Outcome::Grant
        );
        assert_eq!(
            coordinator.process(&Request::acquire(1, "IntersectionA")),
            Outcome::Grant
        );
        assert_eq!(coordinator.registry().holders("IntersectionA"), &[1]);
        assert_eq!(
            coordinator.process(&Request::release(1, "IntersectionA")),
            Outcome::Ok
        );
        // A single release fully vacates the intersection: no double count.
        assert!(coordinator.registry().holders("IntersectionA").is_empty());
    }

    #[test]
    fn release_round_trip_restores_prior_state() {
        let (mut coordinator, _rx) = coordinator_with_trains(&[1]);

        assert_eq!(
            coordinator.process(&Request::acquire(1, "IntersectionC")),
            Outcome::Grant
        );
        assert_eq!(
            coordinator.process(&Request::release(1, "IntersectionC")),
            Outcome::Ok
        );
        assert!(coordinator.registry().holders("IntersectionC").is_empty());
        assert_eq!(coordinator.registry().waiter_count("IntersectionC"), 0);
        assert!(!coordinator.graph().has_allocation_edge(1, "IntersectionC"));
        assert!(!coordinator.graph().has_request_edge(1, "IntersectionC"));
    }

    #[test]
    fn release_by_non_holder_fails_without_mutation() {
        let (mut coordinator, _rx) = coordinator_with_trains(&[1, 2]);

        assert_eq!(
            coordinator.process(&Request::acquire(1, "IntersectionA")),
            Outcome::Grant
        );
        assert_eq!(
            coordinator.process(&Request::release(2, "IntersectionA")),
            Outcome::Fail
        );
        assert_eq!(coordinator.registry().holders("IntersectionA"), &[1]);
    }

    #[test]
    fn unknown_intersection_fails_without_mutation() {
        let (mut coordinator, _rx) = coordinator_with_trains(&[1]);

        assert_eq!(
            coordinator.process(&Request::acquire(1, "Nonexistent")),
            Outcome::Fail
        );
        assert_eq!(
            coordinator.process(&Request::release(1, "Nonexistent")),
            Outcome::Fail
        );
        assert_eq!(coordinator.graph().node_count(), 0);
    }

    #[test]
    fn waiters_are_granted_in_fifo_order() {
        let (mut coordinator, mut rx) = coordinator_with_trains(&[1, 2, 3]);

        assert_eq!(
            coordinator.process(&Request::acquire(1, "IntersectionA")),
            Outcome::Grant
        );
        assert_eq!(
            coordinator.process(&Request::acquire(2, "IntersectionA")),
            Outcome::Wait
        );
        assert_eq!(
            coordinator.process(&Request::acquire(3, "IntersectionA")),
            Outcome::Wait
        );

        assert_eq!(
            coordinator.process(&Request::release(1, "IntersectionA")),
            Outcome::Ok
        );
        let first = rx.get_mut(&2).unwrap().try_recv().unwrap();
        assert_eq!(first.outcome, Outcome::Grant);
        assert!(matches!(
            rx.get_mut(&3).unwrap().try_recv(),
            Err(TryRecvError::Empty)
        ));

        assert_eq!(
            coordinator.process(&Request::release(2, "IntersectionA")),
            Outcome::Ok
        );
        let second = rx.get_mut(&3).unwrap().try_recv().unwrap();
        assert_eq!(second.outcome, Outcome::Grant);
    }

    #[test]
    fn capacity_invariant_holds_throughout() {
        let (mut coordinator, _rx) = coordinator_with_trains(&[1, 2, 3, 4]);

        for train in 1..=4 {
            coordinator.process(&Request::acquire(train, "IntersectionC"));
        }
        assert!(coordinator.registry().holders("IntersectionC").len() <= 2);

        coordinator.process(&Request::release(1, "IntersectionC"));
        assert!(coordinator.registry().holders("IntersectionC").len() <= 2);
        coordinator.process(&Request::release(2, "IntersectionC"));
        assert!(coordinator.registry().holders("IntersectionC").len() <= 2);
    }
}
