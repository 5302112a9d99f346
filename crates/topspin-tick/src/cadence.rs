//! Rate gate for periodic sends.

use std::time::Duration;

/// Lets an action through at most once per `interval` of loop time.
///
/// The first call to [`ready`](Self::ready) always passes. After that the
/// gate re-arms relative to the moment it passed, so a hitching loop sends
/// late rather than in a burst.
#[derive(Debug, Clone)]
pub struct Cadence {
    interval: Duration,
    next_due: Option<Duration>,
}

impl Cadence {
    /// A gate passing once per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    /// A gate passing `rate_hz` times per second. `0` means every call.
    pub fn from_rate_hz(rate_hz: u32) -> Self {
        if rate_hz == 0 {
            Self::new(Duration::ZERO)
        } else {
            Self::new(Duration::from_secs_f64(1.0 / f64::from(rate_hz)))
        }
    }

    /// Returns `true` and re-arms if the gate is open at `now`.
    pub fn ready(&mut self, now: Duration) -> bool {
        match self.next_due {
            Some(due) if now < due => false,
            _ => {
                self.next_due = Some(now + self.interval);
                true
            }
        }
    }

    /// Opens the gate for the next call regardless of timing.
    pub fn reset(&mut self) {
        self.next_due = None;
    }

    /// The configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_first_call_passes() {
        let mut c = Cadence::from_rate_hz(10);
        assert!(c.ready(Duration::ZERO));
    }

    #[test]
    fn test_ready_blocks_until_interval_elapsed() {
        let mut c = Cadence::from_rate_hz(10);
        assert!(c.ready(Duration::from_millis(0)));
        assert!(!c.ready(Duration::from_millis(50)));
        assert!(c.ready(Duration::from_millis(100)));
        assert!(!c.ready(Duration::from_millis(150)));
    }

    #[test]
    fn test_reset_reopens_gate() {
        let mut c = Cadence::new(Duration::from_secs(1));
        assert!(c.ready(Duration::ZERO));
        c.reset();
        assert!(c.ready(Duration::from_millis(1)));
    }
}
