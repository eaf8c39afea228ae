//! Native session drivers
//!
//! `run_virtual` jumps straight from deadline to deadline (tests, replays,
//! the headless demo). `run_realtime` sleeps on a tokio timer until the
//! clock's single pending deadline.

use std::time::Duration;

use tokio::time::Instant;

use super::auto_continue;
use crate::session::{GameSession, SessionResult};
use crate::sim::{Direction, GameState};

/// Milliseconds since a fixed origin
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    pub fn instant_at(&self, ms: u64) -> Instant {
        self.origin + Duration::from_millis(ms)
    }
}

/// Play `session` to the end in virtual time.
///
/// `steer` is asked for a direction before every tick. The session is quit
/// after `max_ticks` ticks.
pub fn run_virtual(
    session: &mut GameSession,
    mut steer: impl FnMut(&GameState) -> Option<Direction>,
    max_ticks: u64,
) -> Option<SessionResult> {
    let mut now = 0;
    session.start(now);
    loop {
        if let Some(result) = session.result() {
            return Some(result);
        }
        auto_continue(session, now, &mut steer);
        if session.state().time_ticks >= max_ticks {
            session.quit();
            continue;
        }
        if let Some(dir) = steer(session.state()) {
            session.queue_direction(dir, now);
        }
        let Some(deadline) = session.next_deadline() else {
            log::warn!("Session has no pending tick, quitting");
            session.quit();
            continue;
        };
        now = deadline;
        for event in session.advance(now) {
            log::debug!("t={now}ms {event:?}");
        }
    }
}

/// Play `session` to the end against the wall clock
pub async fn run_realtime(
    session: &mut GameSession,
    mut steer: impl FnMut(&GameState) -> Option<Direction>,
    max_ticks: u64,
) -> Option<SessionResult> {
    let clock = MonotonicClock::new();
    session.start(clock.now_ms());
    loop {
        if let Some(result) = session.result() {
            return Some(result);
        }
        auto_continue(session, clock.now_ms(), &mut steer);
        if session.state().time_ticks >= max_ticks {
            session.quit();
            continue;
        }
        if let Some(dir) = steer(session.state()) {
            session.queue_direction(dir, clock.now_ms());
        }
        let Some(deadline) = session.next_deadline() else {
            session.quit();
            continue;
        };
        tokio::time::sleep_until(clock.instant_at(deadline)).await;
        for event in session.advance(clock.now_ms()) {
            log::debug!("{event:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::GameConfig;
    use crate::sim::EndReason;

    #[test]
    fn test_virtual_run_without_steering_ends() {
        let mut session = GameSession::new(GameConfig::default(), 5);
        let result = run_virtual(&mut session, |_| None, 200).unwrap();
        assert!(result.ticks <= 200);
        assert!(!session.clock().is_running());
    }

    #[test]
    fn test_virtual_run_is_deterministic() {
        let play = || {
            let mut session = GameSession::new(GameConfig::default(), 99);
            let mut turn = 0u32;
            run_virtual(
                &mut session,
                |state| {
                    turn += 1;
                    (turn % 7 == 0).then(|| match state.heading {
                        Direction::Up | Direction::Down => Direction::Left,
                        Direction::Left | Direction::Right => Direction::Up,
                    })
                },
                500,
            )
        };
        assert_eq!(play(), play());
    }

    #[tokio::test]
    async fn test_realtime_run_quits_at_limit() {
        let config = GameConfig {
            base_tick_ms: 5,
            min_tick_ms: 1,
            ..GameConfig::default()
        };
        let mut session = GameSession::new(config, 1);
        let result = run_realtime(&mut session, |_| None, 3).await.unwrap();
        assert_eq!(result.ticks, 3);
        assert_eq!(result.end_reason, EndReason::Quit);
    }
}
