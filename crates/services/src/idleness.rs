//! Single-shot detection of user inactivity.

use chrono::{DateTime, Duration, Utc};

/// Default inactivity window before the idle prompt opens.
pub const DEFAULT_IDLE_TIMEOUT_SECONDS: i64 = 300;

/// User-input signals that reset the idle countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    PointerMove,
    KeyPress,
    TouchStart,
    Scroll,
}

/// Detects absence of user input for a timeout window.
///
/// The deadline is single-shot: `poll` reports the elapse exactly once and
/// then disarms until fresh activity re-arms it. Guarding against double side
/// effects while the idle prompt is already open is the coordinator's job,
/// not this monitor's.
#[derive(Debug, Clone, Copy)]
pub struct IdlenessMonitor {
    timeout: Duration,
    deadline: Option<DateTime<Utc>>,
}

impl IdlenessMonitor {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_default_timeout() -> Self {
        Self::new(Duration::seconds(DEFAULT_IDLE_TIMEOUT_SECONDS))
    }

    /// Arm (or re-arm) the countdown as of `now`.
    pub fn arm(&mut self, now: DateTime<Utc>) {
        self.deadline = Some(now + self.timeout);
    }

    /// Any activity signal resets the pending countdown.
    pub fn record_activity(&mut self, _kind: ActivityKind, now: DateTime<Utc>) {
        self.arm(now);
    }

    /// True exactly once when the armed deadline has elapsed.
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Teardown: drop the pending deadline.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_core::time::fixed_now;

    #[test]
    fn fires_once_after_timeout_then_disarms() {
        let mut monitor = IdlenessMonitor::new(Duration::seconds(300));
        let start = fixed_now();

        monitor.arm(start);
        assert!(!monitor.poll(start + Duration::seconds(299)));
        assert!(monitor.poll(start + Duration::seconds(300)));
        // No auto-repeat without fresh activity.
        assert!(!monitor.poll(start + Duration::seconds(900)));
        assert!(!monitor.is_armed());
    }

    #[test]
    fn activity_resets_the_countdown() {
        let mut monitor = IdlenessMonitor::new(Duration::seconds(300));
        let start = fixed_now();

        monitor.arm(start);
        monitor.record_activity(ActivityKind::Scroll, start + Duration::seconds(250));
        assert!(!monitor.poll(start + Duration::seconds(400)));
        assert!(monitor.poll(start + Duration::seconds(550)));
    }

    #[test]
    fn cancel_drops_the_pending_deadline() {
        let mut monitor = IdlenessMonitor::new(Duration::seconds(300));
        monitor.arm(fixed_now());
        monitor.cancel();
        assert!(!monitor.poll(fixed_now() + Duration::seconds(1000)));
    }
}
