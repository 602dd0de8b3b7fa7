use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// A node in the wait-for graph: either a train or an intersection. The full
/// intersection id string is the key, so distinct intersections can never
/// collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKey {
    Train(u32),
    Intersection(String),
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Train(id) => write!(f, "Train {}", id),
            NodeKey::Intersection(id) => write!(f, "{}", id),
        }
    }
}

/// Wait-for (resource allocation) graph over trains and intersections.
///
/// Edge direction encodes the relationship:
/// - request edge, train -> intersection: the train wants a resource it
///   does not hold;
/// - allocation edge, intersection -> train: the resource is held by the
///   train.
///
/// For a given (train, intersection) pair at most one of the two exists at
/// any time; `promote_to_allocation` swaps them inside a single call. A
/// directed cycle therefore means every party in the cycle is waiting on
/// the next: a deadlock.
///
/// Nodes live in a growable arena indexed by a hash lookup; adjacency is a
/// set per node. Sized for tens of nodes and rebuilt each run, so nodes are
/// never garbage-collected.
#[derive(Debug, Default)]
pub struct ResourceGraph {
    indices: HashMap<NodeKey, usize>,
    nodes: Vec<NodeKey>,
    edges: Vec<BTreeSet<usize>>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_create(&mut self, key: NodeKey) -> usize {
        if let Some(&idx) = self.indices.get(&key) {
            return idx;
        }
        let idx = self.nodes.len();
        self.indices.insert(key.clone(), idx);
        self.nodes.push(key);
        self.edges.push(BTreeSet::new());
        idx
    }

    fn lookup(&self, key: &NodeKey) -> Option<usize> {
        self.indices.get(key).copied()
    }

    /// Records that the train is waiting on the intersection.
    pub fn add_request_edge(&mut self, train_id: u32, intersection: &str) {
        let t = self.get_or_create(NodeKey::Train(train_id));
        let i = self.get_or_create(NodeKey::Intersection(intersection.to_string()));
        self.edges[t].insert(i);
    }

    /// Atomically replaces the request edge with an allocation edge. Both
    /// mutations happen under the same `&mut self` call, so no observer can
    /// ever see the pair with both or neither edge mid-conversion.
    pub fn promote_to_allocation(&mut self, train_id: u32, intersection: &str) {
        let t = self.get_or_create(NodeKey::Train(train_id));
        let i = self.get_or_create(NodeKey::Intersection(intersection.to_string()));
        self.edges[t].remove(&i);
        self.edges[i].insert(t);
    }

    /// Removes both edge types for the pair. Called on release and on
    /// preemption.
    pub fn remove_edges(&mut self, train_id: u32, intersection: &str) {
        let t = self.lookup(&NodeKey::Train(train_id));
        let i = self.lookup(&NodeKey::Intersection(intersection.to_string()));
        if let (Some(t), Some(i)) = (t, i) {
            self.edges[t].remove(&i);
            self.edges[i].remove(&t);
        }
    }

    pub fn has_request_edge(&self, train_id: u32, intersection: &str) -> bool {
        let t = self.lookup(&NodeKey::Train(train_id));
        let i = self.lookup(&NodeKey::Intersection(intersection.to_string()));
        match (t, i) {
            (Some(t), Some(i)) => self.edges[t].contains(&i),
            _ => false,
        }
    }

    pub fn has_allocation_edge(&self, train_id: u32, intersection: &str) -> bool {
        let t = self.lookup(&NodeKey::Train(train_id));
        let i = self.lookup(&NodeKey::Intersection(intersection.to_string()));
        match (t, i) {
            (Some(t), Some(i)) => self.edges[i].contains(&t),
            _ => false,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Depth-first search from every unvisited node, tracking the recursion
    /// stack. A back-edge into the stack is a cycle; the offending path is
    /// returned for the audit log.
    pub fn detect_cycle(&self) -> Option<Vec<NodeKey>> {
        let n = self.nodes.len();
        let mut visited = vec![false; n];
        let mut on_stack = vec![false; n];
        for start in 0..n {
            if !visited[start] {
                let mut path = Vec::new();
                if let Some(cycle) = self.dfs(start, &mut visited, &mut on_stack, &mut path) {
                    return Some(cycle.into_iter().map(|i| self.nodes[i].clone()).collect());
                }
            }
        }
        None
    }

    fn dfs(
        &self,
        v: usize,
        visited: &mut [bool],
        on_stack: &mut [bool],
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        visited[v] = true;
        on_stack[v] = true;
        path.push(v);

        for &u in &self.edges[v] {
            if !visited[u] {
                if let Some(cycle) = self.dfs(u, visited, on_stack, path) {
                    return Some(cycle);
                }
            } else if on_stack[u] {
                // Back-edge: everything from u to the top of the path is the cycle.
                if let Some(start) = path.iter().position(|&n| n == u) {
                    return Some(path[start..].to_vec());
                }
            }
        }

        path.pop();
        on_stack[v] = false;
        None
    }
}

/// Renders a cycle as "Train 1 -> IntersectionA -> Train 2 -> ... -> Train 1".
pub fn format_cycle(cycle: &[NodeKey]) -> String {
    let mut parts: Vec<String> = cycle.iter().map(|n| n.to_string()).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_then_promote_keeps_one_edge_per_pair() {
        let mut graph = ResourceGraph::new();
        graph.add_request_edge(1, "IntersectionA");
        assert!(graph.has_request_edge(1, "IntersectionA"));
        assert!(!graph.has_allocation_edge(1, "IntersectionA"));

        graph.promote_to_allocation(1, "IntersectionA");
        assert!(!graph.has_request_edge(1, "IntersectionA"));
        assert!(graph.has_allocation_edge(1, "IntersectionA"));
    }

    #[test]
    fn remove_edges_clears_both_directions() {
        let mut graph = ResourceGraph::new();
        graph.add_request_edge(1, "IntersectionA");
        graph.promote_to_allocation(1, "IntersectionA");
        graph.remove_edges(1, "IntersectionA");
        assert!(!graph.has_request_edge(1, "IntersectionA"));
        assert!(!graph.has_allocation_edge(1, "IntersectionA"));
    }

    #[test]
    fn chain_without_circular_wait_has_no_cycle() {
        let mut graph = ResourceGraph::new();
        graph.promote_to_allocation(1, "IntersectionA");
        graph.add_request_edge(2, "IntersectionA");
        graph.promote_to_allocation(2, "IntersectionB");
        assert!(graph.detect_cycle().is_none());
    }

    #[test]
    fn two_train_circular_wait_is_detected_with_path() {
        let mut graph = ResourceGraph::new();
        // Train 1 holds B and wants A; Train 2 holds A and wants B.
        graph.promote_to_allocation(1, "IntersectionB");
        graph.promote_to_allocation(2, "IntersectionA");
        graph.add_request_edge(1, "IntersectionA");
        graph.add_request_edge(2, "IntersectionB");

        let cycle = graph.detect_cycle().expect("deadlock should be detected");
        assert_eq!(cycle.len(), 4);
        assert!(cycle.contains(&NodeKey::Train(1)));
        assert!(cycle.contains(&NodeKey::Train(2)));
        assert!(cycle.contains(&NodeKey::Intersection("IntersectionA".to_string())));
        assert!(cycle.contains(&NodeKey::Intersection("IntersectionB".to_string())));

        let rendered = format_cycle(&cycle);
        assert!(rendered.contains("Train 1"));
        assert!(rendered.contains("IntersectionA"));
        // The path closes back on its first node.
        assert_eq!(
            rendered.split(" -> ").next(),
            rendered.split(" -> ").last()
        );
    }

    #[test]
    fn preemption_style_edge_removal_breaks_the_cycle() {
        let mut graph = ResourceGraph::new();
        graph.promote_to_allocation(1, "IntersectionB");
        graph.promote_to_allocation(2, "IntersectionA");
        graph.add_request_edge(1, "IntersectionA");
        graph.add_request_edge(2, "IntersectionB");
        assert!(graph.detect_cycle().is_some());

        // Preempt Train 2's hold on A and hand A to Train 1.
        graph.remove_edges(2, "IntersectionA");
        graph.promote_to_allocation(1, "IntersectionA");
        assert!(graph.detect_cycle().is_none());

        // Train 2 backtracks and re-requests without deadlocking again.
        graph.add_request_edge(2, "IntersectionA");
        assert!(graph.detect_cycle().is_none());
    }

    #[test]
    fn three_party_cycle_is_detected() {
        let mut graph = ResourceGraph::new();
        graph.promote_to_allocation(1, "IntersectionA");
        graph.promote_to_allocation(2, "IntersectionB");
        graph.promote_to_allocation(3, "IntersectionC");
        graph.add_request_edge(1, "IntersectionB");
        graph.add_request_edge(2, "IntersectionC");
        graph.add_request_edge(3, "IntersectionA");

        let cycle = graph.detect_cycle().expect("three-party deadlock");
        assert_eq!(cycle.len(), 6);
    }

    #[test]
    fn empty_graph_has_no_cycle() {
        assert!(ResourceGraph::new().detect_cycle().is_none());
        assert_eq!(ResourceGraph::new().node_count(), 0);
    }
}
