use std::time::{Duration, Instant};

// Overrun buffer on top of the expected runtime before a stream counts as frozen
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(120);

// Dead man's switch for one publish run.
//
// Trips once the runtime exceeds `expected + grace`. Until an expected
// duration is known it never trips.
#[derive(Debug, Clone)]
pub struct DeadMansSwitch {
    started_at: Instant,
    expected: Option<Duration>,
    grace: Duration,
}

impl DeadMansSwitch {
    pub fn new(started_at: Instant, grace: Duration) -> Self {
        Self {
            started_at,
            expected: None,
            grace,
        }
    }

    pub fn arm(&mut self, expected: Duration) {
        self.expected = Some(expected);
    }

    pub fn runtime(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn max_allowed(&self) -> Option<Duration> {
        self.expected.map(|expected| expected + self.grace)
    }

    pub fn is_tripped(&self, now: Instant) -> bool {
        match self.max_allowed() {
            Some(max) => self.runtime(now) > max,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unarmed_switch_never_trips() {
        let start = Instant::now();
        let switch = DeadMansSwitch::new(start, DEFAULT_GRACE_PERIOD);
        assert!(!switch.is_tripped(start + Duration::from_secs(86_400)));
    }

    #[test]
    fn trips_only_past_expected_plus_grace() {
        let start = Instant::now();
        let mut switch = DeadMansSwitch::new(start, DEFAULT_GRACE_PERIOD);
        switch.arm(Duration::from_secs(300));

        assert_eq!(switch.max_allowed(), Some(Duration::from_secs(420)));
        assert!(!switch.is_tripped(start + Duration::from_secs(310)));
        assert!(!switch.is_tripped(start + Duration::from_secs(420)));
        assert!(switch.is_tripped(start + Duration::from_secs(421)));
    }

    #[test]
    fn runtime_never_goes_negative() {
        let start = Instant::now() + Duration::from_secs(5);
        let switch = DeadMansSwitch::new(start, Duration::ZERO);
        assert_eq!(switch.runtime(Instant::now()), Duration::ZERO);
    }
}
