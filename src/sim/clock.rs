//! Variable-rate simulation clock
//!
//! Exactly one tick is ever scheduled. Changing the rate cancels the pending
//! tick and schedules a new one; there is no second timer to race with.
//! Time is passed in by the caller (milliseconds on any monotonic base), so
//! the clock runs the same under a browser frame loop, a tokio timer or a
//! test.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimClock {
    interval_ms: u32,
    next_due_ms: Option<u64>,
    /// Bumped on every (re)schedule and cancel
    generation: u64,
    fired: u64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule the first tick one interval from `now_ms`, replacing any pending one
    pub fn start(&mut self, now_ms: u64, interval_ms: u32) {
        self.reschedule(now_ms, interval_ms);
    }

    /// Cancel the pending tick and schedule the next one with a new period
    pub fn reschedule(&mut self, now_ms: u64, interval_ms: u32) {
        self.cancel();
        self.interval_ms = interval_ms.max(1);
        self.next_due_ms = Some(now_ms + self.interval_ms as u64);
    }

    pub fn cancel(&mut self) {
        if self.next_due_ms.take().is_some() {
            self.generation += 1;
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_due_ms.is_some()
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    /// Deadline of the pending tick, if any
    pub fn next_due(&self) -> Option<u64> {
        self.next_due_ms
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of ticks fired since creation
    pub fn fired(&self) -> u64 {
        self.fired
    }

    /// Fire the pending tick if it is due.
    ///
    /// At most one tick fires per call. When the caller fell more than a
    /// whole period behind, the missed ticks are skipped rather than
    /// replayed in a burst.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        let Some(due) = self.next_due_ms else {
            return false;
        };
        if now_ms < due {
            return false;
        }
        let interval = self.interval_ms as u64;
        let mut next = due + interval;
        if next <= now_ms {
            next = now_ms + interval;
        }
        self.next_due_ms = Some(next);
        self.fired += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_on_schedule() {
        let mut clock = SimClock::new();
        assert!(!clock.poll(1_000));
        clock.start(0, 250);
        assert!(!clock.poll(249));
        assert!(clock.poll(250));
        assert!(!clock.poll(251));
        assert!(clock.poll(500));
        assert_eq!(clock.fired(), 2);
    }

    #[test]
    fn test_reschedule_replaces_pending_tick() {
        let mut clock = SimClock::new();
        clock.start(0, 250);
        let generation = clock.generation();
        clock.reschedule(100, 212);
        assert!(clock.generation() > generation);
        assert_eq!(clock.next_due(), Some(312));
        // The old deadline no longer fires
        assert!(!clock.poll(250));
        assert!(clock.poll(312));
    }

    #[test]
    fn test_cancel_stops_ticks() {
        let mut clock = SimClock::new();
        clock.start(0, 100);
        clock.cancel();
        assert!(!clock.is_running());
        assert!(!clock.poll(10_000));
    }

    #[test]
    fn test_skips_missed_ticks() {
        let mut clock = SimClock::new();
        clock.start(0, 100);
        assert!(clock.poll(1_050));
        assert_eq!(clock.next_due(), Some(1_150));
        assert!(!clock.poll(1_100));
    }
}
