//! Repeated-failure loop detection

/// Consecutive all-error observations before the agent is interrupted
pub const DEFAULT_LOOP_THRESHOLD: u32 = 20;

/// Counts consecutive all-error tool outcomes for one session
#[derive(Debug, Clone)]
pub struct LoopDetector {
    threshold: u32,
    consecutive: u32,
}

impl LoopDetector {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    /// Record one outcome. Returns `Some(count)` when the threshold is
    /// reached; the counter is reset at that point.
    pub fn record(&mut self, all_errors: bool) -> Option<u32> {
        if !all_errors {
            self.consecutive = 0;
            return None;
        }
        self.consecutive += 1;
        if self.consecutive >= self.threshold {
            let count = self.consecutive;
            self.consecutive = 0;
            Some(count)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

impl Default for LoopDetector {
    fn default() -> Self {
        Self::new(DEFAULT_LOOP_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trips_once_at_threshold() {
        let mut detector = LoopDetector::default();
        let trips: Vec<u32> = (0..20).filter_map(|_| detector.record(true)).collect();
        assert_eq!(trips, vec![20]);
        assert_eq!(detector.consecutive(), 0);

        // The 21st failure starts a fresh count
        assert_eq!(detector.record(true), None);
        let trips = (0..18).filter_map(|_| detector.record(true)).count();
        assert_eq!(trips, 0);
        assert_eq!(detector.record(true), Some(20));
    }

    #[test]
    fn test_success_resets() {
        let mut detector = LoopDetector::new(3);
        detector.record(true);
        detector.record(true);
        assert_eq!(detector.record(false), None);
        assert_eq!(detector.consecutive(), 0);
        detector.record(true);
        detector.record(true);
        assert_eq!(detector.record(true), Some(3));
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let mut detector = LoopDetector::new(0);
        assert_eq!(detector.threshold(), 1);
        assert_eq!(detector.record(true), Some(1));
    }
}
