//! Sleep source for retry loops

use std::sync::Mutex;
use std::time::Duration;

pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeping
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested sleeps without blocking
#[derive(Debug, Default)]
pub struct ManualClock {
    slept: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn total(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Clock for ManualClock {
    fn sleep(&self, duration: Duration) {
        self.slept
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_records() {
        let clock = ManualClock::new();
        clock.sleep(Duration::from_millis(5));
        clock.sleep(Duration::from_millis(7));
        assert_eq!(clock.sleeps().len(), 2);
        assert_eq!(clock.total(), Duration::from_millis(12));
    }
}
