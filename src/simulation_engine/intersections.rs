/// Represents a track intersection (shared resource) in the rail network.
#[derive(Debug, Clone)]
pub struct Intersection {
    /// Unique identifier for the intersection, e.g. "IntersectionA".
    pub id: String,
    /// Maximum number of trains allowed inside at the same time.
    pub capacity: u32,
}

impl Intersection {
    pub fn new(id: &str, capacity: u32) -> Self {
        Self {
            id: id.to_string(),
            capacity,
        }
    }
}

/// Admission counter for one intersection. Capacity 1 behaves as a mutex,
/// larger capacities as a counting semaphore. The gate itself never blocks;
/// the coordinator answers WAIT and the train parks on its reply channel.
#[derive(Debug, Clone)]
pub struct CapacityGate {
    capacity: u32,
    in_use: u32,
}

impl CapacityGate {
    pub fn new(capacity: u32) -> Self {
        Self { capacity, in_use: 0 }
    }

    /// Non-blocking acquire. Succeeds only while there is spare capacity.
    pub fn try_acquire(&mut self) -> bool {
        if self.in_use < self.capacity {
            self.in_use += 1;
            true
        } else {
            false
        }
    }

    /// Returns false on underflow. The coordinator checks holder membership
    /// before calling this, so a false return is a usage error worth logging.
    pub fn release(&mut self) -> bool {
        if self.in_use == 0 {
            return false;
        }
        self.in_use -= 1;
        true
    }

    pub fn in_use(&self) -> u32 {
        self.in_use
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_with_capacity_one_is_mutual_exclusion() {
        let mut gate = CapacityGate::new(1);
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
        assert!(gate.release());
        assert!(gate.try_acquire());
    }

    #[test]
    fn gate_admits_up_to_capacity() {
        let mut gate = CapacityGate::new(2);
        assert!(gate.try_acquire());
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
        assert_eq!(gate.in_use(), 2);
    }

    #[test]
    fn release_on_empty_gate_is_an_error() {
        let mut gate = CapacityGate::new(3);
        assert!(!gate.release());
        assert!(gate.try_acquire());
        assert!(gate.release());
        assert!(!gate.release());
    }
}
