use std::time::{SystemTime, UNIX_EPOCH};

/// Simulated wall clock. Real time is irrelevant to the coordinator's
/// decisions, so audit records carry a deterministic counter advanced per
/// processed request instead.
#[derive(Debug, Default)]
pub struct SimClock {
    elapsed_secs: u64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, seconds: u64) {
        self.elapsed_secs += seconds;
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    /// Renders the current simulated time as "[HH:MM:SS]".
    pub fn stamp(&self) -> String {
        let hours = self.elapsed_secs / 3600;
        let minutes = (self.elapsed_secs % 3600) / 60;
        let seconds = self.elapsed_secs % 60;
        format!("[{:02}:{:02}:{:02}]", hours, minutes, seconds)
    }
}

/// Unix timestamp in seconds, for the real-time column of audit records.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_starts_at_zero() {
        let clock = SimClock::new();
        assert_eq!(clock.stamp(), "[00:00:00]");
    }

    #[test]
    fn advance_rolls_over_minutes_and_hours() {
        let mut clock = SimClock::new();
        clock.advance(59);
        assert_eq!(clock.stamp(), "[00:00:59]");
        clock.advance(1);
        assert_eq!(clock.stamp(), "[00:01:00]");
        clock.advance(3600);
        assert_eq!(clock.stamp(), "[01:01:00]");
        assert_eq!(clock.elapsed_secs(), 3660);
    }
}
