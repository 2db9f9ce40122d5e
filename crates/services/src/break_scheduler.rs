//! Mandatory-break enforcement over session-wide instructional time.

/// Instructional seconds between mandatory breaks.
pub const BREAK_THRESHOLD_SECONDS: u64 = 7_200;
/// Length of one mandatory break.
pub const BREAK_DURATION_SECONDS: u64 = 600;

/// Emitted by [`BreakScheduler::tick`] when the break state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakEvent {
    /// Instructional time crossed the next threshold; the break UI opens.
    Started,
    /// The break ran its course (or was ended manually); the break UI closes.
    Ended,
}

/// Accumulates instructional time and forces a pause at every threshold.
///
/// Instructional time is a running total for the whole active session,
/// independent of per-lesson watch time. It is credited second by second so a
/// batched tick can never step over a threshold crossing: crediting stops the
/// instant a crossing is reached and the remainder of the tick drains into
/// the break countdown instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreakScheduler {
    instructional_time: u64,
    breaks_taken: u32,
    on_break: bool,
    break_remaining: u64,
    running: bool,
}

impl BreakScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin accumulating. Starting an already-started scheduler is a no-op.
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stop the scheduler at session teardown.
    pub fn stop(&mut self) {
        self.running = false;
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn is_on_break(&self) -> bool {
        self.on_break
    }

    /// Session-wide instructional seconds accumulated so far.
    #[must_use]
    pub fn instructional_time(&self) -> u64 {
        self.instructional_time
    }

    #[must_use]
    pub fn breaks_taken(&self) -> u32 {
        self.breaks_taken
    }

    /// Seconds left in the current break, zero when accumulating.
    #[must_use]
    pub fn break_remaining(&self) -> u64 {
        self.break_remaining
    }

    fn next_threshold(&self) -> u64 {
        u64::from(self.breaks_taken + 1) * BREAK_THRESHOLD_SECONDS
    }

    /// Advance the scheduler by `seconds` of wall-clock time.
    pub fn tick(&mut self, seconds: u64) -> Vec<BreakEvent> {
        let mut events = Vec::new();
        if !self.running {
            return events;
        }

        let mut remaining = seconds;
        while remaining > 0 {
            if self.on_break {
                let step = remaining.min(self.break_remaining);
                self.break_remaining -= step;
                remaining -= step;
                if self.break_remaining == 0 {
                    self.finish_break(&mut events);
                }
            } else {
                self.instructional_time += 1;
                remaining -= 1;
                if self.instructional_time >= self.next_threshold() {
                    self.on_break = true;
                    self.break_remaining = BREAK_DURATION_SECONDS;
                    events.push(BreakEvent::Started);
                }
            }
        }
        events
    }

    /// End the current break early. Returns the event when a break was open.
    pub fn end_break(&mut self) -> Option<BreakEvent> {
        if !self.on_break {
            return None;
        }
        self.break_remaining = 0;
        let mut events = Vec::with_capacity(1);
        self.finish_break(&mut events);
        events.pop()
    }

    fn finish_break(&mut self, events: &mut Vec<BreakEvent>) {
        self.on_break = false;
        self.breaks_taken += 1;
        events.push(BreakEvent::Ended);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_to_threshold(scheduler: &mut BreakScheduler) -> Vec<BreakEvent> {
        let mut events = Vec::new();
        for _ in 0..BREAK_THRESHOLD_SECONDS {
            events.extend(scheduler.tick(1));
        }
        events
    }

    #[test]
    fn break_starts_exactly_at_threshold() {
        let mut scheduler = BreakScheduler::new();
        scheduler.start();

        let events = run_to_threshold(&mut scheduler);
        assert_eq!(events, vec![BreakEvent::Started]);
        assert!(scheduler.is_on_break());
        assert_eq!(scheduler.instructional_time(), BREAK_THRESHOLD_SECONDS);
    }

    #[test]
    fn batched_ticks_never_skip_a_crossing() {
        let mut scheduler = BreakScheduler::new();
        scheduler.start();

        // One second short of the threshold, then a batched 5-second tick.
        scheduler.tick(BREAK_THRESHOLD_SECONDS - 1);
        let events = scheduler.tick(5);
        assert_eq!(events, vec![BreakEvent::Started]);
        // The crossing second was credited; the remainder drained into the break.
        assert_eq!(scheduler.instructional_time(), BREAK_THRESHOLD_SECONDS);
        assert_eq!(scheduler.break_remaining(), BREAK_DURATION_SECONDS - 4);
    }

    #[test]
    fn instructional_time_frozen_during_break() {
        let mut scheduler = BreakScheduler::new();
        scheduler.start();
        run_to_threshold(&mut scheduler);

        let before = scheduler.instructional_time();
        scheduler.tick(60);
        assert_eq!(scheduler.instructional_time(), before);
    }

    #[test]
    fn break_ends_after_duration_and_counts() {
        let mut scheduler = BreakScheduler::new();
        scheduler.start();
        run_to_threshold(&mut scheduler);

        let events = scheduler.tick(BREAK_DURATION_SECONDS);
        assert_eq!(events, vec![BreakEvent::Ended]);
        assert!(!scheduler.is_on_break());
        assert_eq!(scheduler.breaks_taken(), 1);
    }

    #[test]
    fn manual_end_break_counts_too() {
        let mut scheduler = BreakScheduler::new();
        scheduler.start();
        run_to_threshold(&mut scheduler);

        assert_eq!(scheduler.end_break(), Some(BreakEvent::Ended));
        assert_eq!(scheduler.end_break(), None);
        assert_eq!(scheduler.breaks_taken(), 1);
    }

    #[test]
    fn second_cycle_fires_at_double_threshold() {
        let mut scheduler = BreakScheduler::new();
        scheduler.start();
        run_to_threshold(&mut scheduler);
        scheduler.tick(BREAK_DURATION_SECONDS);

        let events = run_to_threshold(&mut scheduler);
        assert_eq!(events, vec![BreakEvent::Started]);
        assert_eq!(scheduler.instructional_time(), 2 * BREAK_THRESHOLD_SECONDS);
    }

    #[test]
    fn ticks_ignored_when_not_running() {
        let mut scheduler = BreakScheduler::new();
        assert!(scheduler.tick(100).is_empty());
        assert_eq!(scheduler.instructional_time(), 0);

        scheduler.start();
        scheduler.start();
        scheduler.tick(10);
        assert_eq!(scheduler.instructional_time(), 10);
    }
}
