use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of "now" for status and countdown calculations.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    epoch_ms: AtomicI64,
}

impl ManualClock {
    pub fn at_secs(epoch_secs: i64) -> Self {
        Self {
            epoch_ms: AtomicI64::new(epoch_secs * 1000),
        }
    }

    pub fn set_secs(&self, epoch_secs: i64) {
        self.epoch_ms.store(epoch_secs * 1000, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.epoch_ms
            .fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let ms = self.epoch_ms.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
    }
}

/// Fractional epoch seconds, millisecond precision.
pub fn epoch_secs(at: &DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at_secs(1_000);
        assert_eq!(clock.now().timestamp(), 1_000);
        clock.advance(Duration::milliseconds(1_500));
        assert_eq!(epoch_secs(&clock.now()), 1_001.5);
        clock.set_secs(5);
        assert_eq!(clock.now().timestamp(), 5);
    }
}
