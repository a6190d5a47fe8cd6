use std::time::{Duration, Instant};

use tracing::warn;

/// Delay ladder for consecutive session failures. The last rung repeats
/// forever; the attempt count itself is unbounded.
const DELAYS: [Duration; 5] = [
    Duration::from_millis(1_000),
    Duration::from_millis(2_000),
    Duration::from_millis(5_000),
    Duration::from_millis(10_000),
    Duration::from_millis(30_000),
];

/// Failures older than this no longer count against the ladder.
const DECAY: Duration = Duration::from_secs(60);

/// Consecutive failures before the tracker flags degraded operation.
const RECOVERY_THRESHOLD: u32 = 5;

/// Tracks consecutive session-start failures and recommends how long to
/// wait before the next attempt.
///
/// Decay is evaluated lazily, at the moment a failure is recorded: a quiet
/// minute forgives the whole streak, so an occasional glitch never climbs
/// the ladder.
#[derive(Debug, Default)]
pub struct ErrorTracker {
    consecutive_errors: u32,
    last_error: Option<Instant>,
    recovery_mode: bool,
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure and returns the wait before the next attempt.
    pub fn on_failure(&mut self) -> Duration {
        self.on_failure_at(Instant::now())
    }

    fn on_failure_at(&mut self, now: Instant) -> Duration {
        // Decay forgives the streak but not recovery mode; only a
        // successful start clears that.
        if let Some(last) = self.last_error {
            if now.duration_since(last) > DECAY {
                self.consecutive_errors = 0;
            }
        }
        self.consecutive_errors += 1;
        self.last_error = Some(now);

        if self.consecutive_errors >= RECOVERY_THRESHOLD && !self.recovery_mode {
            self.recovery_mode = true;
            warn!(
                errors = self.consecutive_errors,
                "entering recovery mode after repeated failures"
            );
        }

        let rung = (self.consecutive_errors as usize - 1).min(DELAYS.len() - 1);
        DELAYS[rung]
    }

    /// A successful start clears the streak entirely.
    pub fn on_success(&mut self) {
        self.consecutive_errors = 0;
        self.last_error = None;
        self.recovery_mode = false;
    }

    pub fn in_recovery(&self) -> bool {
        self.recovery_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_climb_the_ladder_and_cap() {
        let mut tracker = ErrorTracker::new();
        let t0 = Instant::now();
        assert_eq!(tracker.on_failure_at(t0), Duration::from_millis(1_000));
        assert_eq!(tracker.on_failure_at(t0), Duration::from_millis(2_000));
        assert_eq!(tracker.on_failure_at(t0), Duration::from_millis(5_000));
        assert_eq!(tracker.on_failure_at(t0), Duration::from_millis(10_000));
        assert_eq!(tracker.on_failure_at(t0), Duration::from_millis(30_000));
        // past the last rung the delay stays put
        assert_eq!(tracker.on_failure_at(t0), Duration::from_millis(30_000));
        assert_eq!(tracker.on_failure_at(t0), Duration::from_millis(30_000));
    }

    #[test]
    fn quiet_minute_resets_the_streak() {
        let mut tracker = ErrorTracker::new();
        let t0 = Instant::now();
        tracker.on_failure_at(t0);
        tracker.on_failure_at(t0);
        tracker.on_failure_at(t0);

        let later = t0 + Duration::from_secs(61);
        assert_eq!(tracker.on_failure_at(later), Duration::from_millis(1_000));
    }

    #[test]
    fn recovery_mode_survives_decay_until_a_success() {
        let mut tracker = ErrorTracker::new();
        let t0 = Instant::now();
        for _ in 0..5 {
            tracker.on_failure_at(t0);
        }
        assert!(tracker.in_recovery());

        // A quiet minute restarts the delay ladder but recovery mode holds.
        let later = t0 + Duration::from_secs(61);
        assert_eq!(tracker.on_failure_at(later), Duration::from_millis(1_000));
        assert!(tracker.in_recovery());

        tracker.on_success();
        assert!(!tracker.in_recovery());
    }

    #[test]
    fn decay_at_exactly_the_boundary_does_not_reset() {
        let mut tracker = ErrorTracker::new();
        let t0 = Instant::now();
        tracker.on_failure_at(t0);
        let boundary = t0 + Duration::from_secs(60);
        assert_eq!(
            tracker.on_failure_at(boundary),
            Duration::from_millis(2_000)
        );
    }

    #[test]
    fn recovery_mode_at_fifth_failure() {
        let mut tracker = ErrorTracker::new();
        let t0 = Instant::now();
        for _ in 0..4 {
            tracker.on_failure_at(t0);
            assert!(!tracker.in_recovery());
        }
        tracker.on_failure_at(t0);
        assert!(tracker.in_recovery());
    }

    #[test]
    fn success_clears_everything() {
        let mut tracker = ErrorTracker::new();
        let t0 = Instant::now();
        for _ in 0..6 {
            tracker.on_failure_at(t0);
        }
        assert!(tracker.in_recovery());

        tracker.on_success();
        assert!(!tracker.in_recovery());
        assert_eq!(tracker.on_failure_at(t0), Duration::from_millis(1_000));
    }
}
