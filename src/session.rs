//! Playable game session
//!
//! Owns one `GameState` and its `SimClock`, and turns wall-clock time into
//! ticks. The caller supplies `now_ms` from any monotonic source (browser
//! frame time, tokio `Instant`, or a virtual clock in tests).
//!
//! Lifecycle:
//! Idle -> Playing -> (PausedTransition -> AwaitingInput ->) Playing -> GameOver

use serde::Serialize;

use crate::renderer::{Palette, RenderSurface, draw_frame};
use crate::settings::GameConfig;
use crate::sim::{
    Direction, EndReason, GameEvent, GameState, Phase, SimClock, difficulty, queue_direction, tick,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    /// Created, clock not started
    Idle,
    Playing,
    /// Hard-mode prompt is showing; clock stopped
    PausedTransition,
    /// Hard mode acknowledged; waiting for the player to steer
    AwaitingInput,
    GameOver,
}

/// UI-facing view of the session, published at a bounded rate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub status: SessionStatus,
    pub score: u32,
    pub phase: Phase,
    pub length: usize,
    pub interval_ms: u32,
    pub ticks: u64,
}

/// Final result handed to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionResult {
    pub score: u32,
    /// Phase the session ended in
    pub mode: Phase,
    pub ticks: u64,
    pub foods_eaten: u32,
    pub end_reason: EndReason,
}

pub struct GameSession {
    config: GameConfig,
    state: GameState,
    clock: SimClock,
    status: SessionStatus,
    last_published_ms: Option<u64>,
    palette: Palette,
}

impl GameSession {
    pub fn new(config: GameConfig, seed: u64) -> Self {
        let state = GameState::new(&config, seed);
        Self {
            config,
            state,
            clock: SimClock::new(),
            status: SessionStatus::Idle,
            last_published_ms: None,
            palette: Palette::default(),
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Start ticking one interval from `now_ms`
    pub fn start(&mut self, now_ms: u64) {
        if self.status != SessionStatus::Idle {
            return;
        }
        log::info!("Session started (seed {})", self.state.seed);
        self.status = SessionStatus::Playing;
        self.clock.start(now_ms, self.state.interval_ms);
    }

    /// Request a turn. While waiting after the hard-mode prompt, an accepted
    /// request also restarts the clock.
    pub fn queue_direction(&mut self, dir: Direction, now_ms: u64) -> bool {
        match self.status {
            SessionStatus::Playing | SessionStatus::Idle => queue_direction(&mut self.state, dir),
            SessionStatus::AwaitingInput => {
                if !queue_direction(&mut self.state, dir) {
                    return false;
                }
                log::info!("Resuming in hard mode at {}ms per tick", self.state.interval_ms);
                self.status = SessionStatus::Playing;
                self.clock.start(now_ms, self.state.interval_ms);
                true
            }
            SessionStatus::PausedTransition | SessionStatus::GameOver => false,
        }
    }

    /// Run the tick that is due at `now_ms`, if any, and return its events.
    ///
    /// At most one tick runs per call.
    pub fn advance(&mut self, now_ms: u64) -> Vec<GameEvent> {
        if self.status != SessionStatus::Playing || !self.clock.poll(now_ms) {
            return Vec::new();
        }

        let outcome = tick(&mut self.state, &self.config);

        if outcome.ended().is_some() {
            // Stop the clock before anyone can read the result
            self.clock.cancel();
            self.status = SessionStatus::GameOver;
        } else if outcome.transition_requested() {
            self.clock.cancel();
            self.status = SessionStatus::PausedTransition;
        } else if let Some(interval) = outcome.new_interval() {
            self.clock.reschedule(now_ms, interval);
        }
        outcome.events
    }

    /// Player dismissed the hard-mode prompt
    pub fn acknowledge_transition(&mut self, now_ms: u64) -> Option<GameEvent> {
        if self.status != SessionStatus::PausedTransition {
            return None;
        }
        let event = difficulty::enter_hard(&mut self.state, &self.config)?;
        if self.config.require_input_after_transition {
            self.status = SessionStatus::AwaitingInput;
        } else {
            self.status = SessionStatus::Playing;
            self.clock.start(now_ms, self.state.interval_ms);
        }
        Some(event)
    }

    /// Abandon the session; the score so far still counts
    pub fn quit(&mut self) {
        if self.status == SessionStatus::GameOver {
            return;
        }
        self.clock.cancel();
        if self.state.ended.is_none() {
            self.state.ended = Some(EndReason::Quit);
        }
        self.status = SessionStatus::GameOver;
        log::info!("Session quit with score {}", self.state.score);
    }

    /// Final result; `None` until the session is over and its clock stopped
    pub fn result(&self) -> Option<SessionResult> {
        if self.status != SessionStatus::GameOver || self.clock.is_running() {
            return None;
        }
        // Hard mode never began if the prompt was still up
        let mode = match self.state.phase {
            Phase::Transitioning => Phase::Normal,
            phase => phase,
        };
        Some(SessionResult {
            score: self.state.score,
            mode,
            ticks: self.state.time_ticks,
            foods_eaten: self.state.foods_eaten,
            end_reason: self.state.ended?,
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status,
            score: self.state.score,
            phase: self.state.phase,
            length: self.state.len(),
            interval_ms: self.state.interval_ms,
            ticks: self.state.time_ticks,
        }
    }

    /// Snapshot for the UI, at most once per publish interval.
    ///
    /// Status changes are always published.
    pub fn snapshot_if_due(&mut self, now_ms: u64, last: Option<&Snapshot>) -> Option<Snapshot> {
        let snapshot = self.snapshot();
        let status_changed = last.is_some_and(|s| s.status != snapshot.status);
        let due = self
            .last_published_ms
            .is_none_or(|t| now_ms.saturating_sub(t) >= self.config.publish_interval_ms);
        if !(due || status_changed) || last == Some(&snapshot) {
            return None;
        }
        self.last_published_ms = Some(now_ms);
        Some(snapshot)
    }

    /// Deadline of the next tick
    pub fn next_deadline(&self) -> Option<u64> {
        self.clock.next_due()
    }

    pub fn render<R: RenderSurface>(&self, surface: &mut R, cell_size: f32) {
        draw_frame(surface, &self.state, &self.palette, cell_size);
    }

    #[cfg(test)]
    pub(crate) fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::CommandBuffer;
    use crate::sim::Point;

    fn session() -> GameSession {
        GameSession::new(GameConfig::default(), 11)
    }

    /// Put food directly ahead of the head, with nothing else in the way
    fn food_ahead(session: &mut GameSession) {
        let state = session.state_mut();
        let next = state.grid.step(state.head(), state.heading);
        state.obstacles.retain(|p| *p != next);
        state.food = Some(next);
    }

    #[test]
    fn test_ticks_follow_clock() {
        let mut s = session();
        assert!(s.advance(1_000).is_empty());
        s.start(0);
        assert_eq!(s.next_deadline(), Some(250));
        s.advance(249);
        assert_eq!(s.state().time_ticks, 0);
        s.advance(250);
        assert_eq!(s.state().time_ticks, 1);
        s.advance(500);
        assert_eq!(s.state().time_ticks, 2);
    }

    #[test]
    fn test_speed_change_reschedules() {
        let mut s = session();
        s.start(0);
        s.state_mut().score = 40;
        food_ahead(&mut s);
        let events = s.advance(250);
        assert!(events.contains(&GameEvent::SpeedChanged { interval_ms: 212 }));
        assert_eq!(s.clock().interval_ms(), 212);
        assert_eq!(s.next_deadline(), Some(250 + 212));
    }

    #[test]
    fn test_hard_mode_handover() {
        let mut s = session();
        s.start(0);
        s.state_mut().score = 190;
        food_ahead(&mut s);
        let events = s.advance(250);
        assert!(events.contains(&GameEvent::PhaseTransitionRequested { score: 200 }));
        assert_eq!(s.status(), SessionStatus::PausedTransition);
        assert!(!s.clock().is_running());

        // Nothing moves while the prompt is up
        assert!(s.advance(10_000).is_empty());
        assert!(!s.queue_direction(Direction::Up, 10_000));

        let entered = s.acknowledge_transition(10_000);
        assert!(matches!(entered, Some(GameEvent::HardModeEntered { obstacles: 5, .. })));
        assert_eq!(s.status(), SessionStatus::AwaitingInput);
        assert!(!s.clock().is_running());
        assert!(s.acknowledge_transition(10_000).is_none());

        // Reversal does not resume; a real turn does
        let heading = s.state().heading;
        assert!(!s.queue_direction(heading.opposite(), 11_000));
        assert_eq!(s.status(), SessionStatus::AwaitingInput);
        assert!(s.queue_direction(Direction::Up, 11_000));
        assert_eq!(s.status(), SessionStatus::Playing);
        assert_eq!(s.next_deadline(), Some(11_000 + s.state().interval_ms as u64));
        assert_eq!(s.state().phase, Phase::Hard);
    }

    #[test]
    fn test_quit_at_hard_mode_prompt_reports_normal() {
        let mut s = session();
        s.start(0);
        s.state_mut().score = 190;
        food_ahead(&mut s);
        s.advance(250);
        assert_eq!(s.status(), SessionStatus::PausedTransition);
        assert_eq!(s.state().phase, Phase::Transitioning);

        s.quit();
        let result = s.result().unwrap();
        assert_eq!(result.mode, Phase::Normal);
        assert_eq!(result.score, 200);
        assert_eq!(result.end_reason, EndReason::Quit);
    }

    #[test]
    fn test_handover_without_input_gate() {
        let config = GameConfig {
            require_input_after_transition: false,
            ..GameConfig::default()
        };
        let mut s = GameSession::new(config, 11);
        s.start(0);
        s.state_mut().score = 190;
        food_ahead(&mut s);
        s.advance(250);
        s.acknowledge_transition(300);
        assert_eq!(s.status(), SessionStatus::Playing);
        assert!(s.clock().is_running());
    }

    #[test]
    fn test_game_over_stops_clock_before_result() {
        let mut s = session();
        s.start(0);
        {
            let state = s.state_mut();
            // Head about to run into its own body
            state.snake = [Point::new(5, 5), Point::new(6, 5), Point::new(6, 4), Point::new(5, 4)]
                .into();
            state.heading = Direction::Up;
            state.food = Some(Point::new(0, 0));
            state.score = 30;
        }
        assert!(s.result().is_none());
        let events = s.advance(250);
        assert!(matches!(events.last(), Some(GameEvent::GameOver { .. })));
        assert_eq!(s.status(), SessionStatus::GameOver);
        assert!(!s.clock().is_running());

        let result = s.result().unwrap();
        assert_eq!(result.score, 30);
        assert_eq!(result.end_reason, EndReason::SelfCollision);
        assert_eq!(result.mode, Phase::Normal);
    }

    #[test]
    fn test_quit() {
        let mut s = session();
        s.start(0);
        s.quit();
        assert!(!s.clock().is_running());
        assert_eq!(s.result().map(|r| r.end_reason), Some(EndReason::Quit));
        assert!(!s.queue_direction(Direction::Up, 10));
    }

    #[test]
    fn test_snapshot_throttle() {
        let mut s = session();
        let first = s.snapshot_if_due(0, None).unwrap();
        assert_eq!(first.status, SessionStatus::Idle);
        // Unchanged and not due
        assert!(s.snapshot_if_due(10, Some(&first)).is_none());

        s.start(20);
        // Status change is published right away
        let started = s.snapshot_if_due(30, Some(&first)).unwrap();
        assert_eq!(started.status, SessionStatus::Playing);

        s.advance(270);
        assert!(s.snapshot_if_due(80, Some(&started)).is_none());
        let later = s.snapshot_if_due(130, Some(&started)).unwrap();
        assert_eq!(later.ticks, 1);
    }

    #[test]
    fn test_render_draws_state() {
        let s = session();
        let mut buffer = CommandBuffer::new();
        s.render(&mut buffer, 20.0);
        // Food plus a one-cell snake
        assert_eq!(buffer.cells().count(), 2);
    }
}
