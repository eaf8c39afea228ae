//! Discrete simulation tick
//!
//! One tick: consume the queued direction, advance the head, check
//! collisions, then eat or shrink.

use super::difficulty::{self, SpeedPolicy};
use super::grid::Direction;
use super::state::{EndReason, GameEvent, GameState};
use crate::settings::GameConfig;

/// What a single tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Whether the snake moved at all
    pub advanced: bool,
    pub ate: bool,
    pub score_delta: u32,
    pub events: Vec<GameEvent>,
}

impl TickOutcome {
    pub fn ended(&self) -> Option<EndReason> {
        self.events.iter().find_map(|e| match e {
            GameEvent::GameOver { reason, .. } => Some(*reason),
            _ => None,
        })
    }

    pub fn new_interval(&self) -> Option<u32> {
        self.events.iter().rev().find_map(|e| match e {
            GameEvent::SpeedChanged { interval_ms } => Some(*interval_ms),
            _ => None,
        })
    }

    pub fn transition_requested(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, GameEvent::PhaseTransitionRequested { .. }))
    }
}

/// Queue a direction request for the next tick.
///
/// A 180° reversal of the current heading is ignored. Later valid requests
/// replace earlier ones. Returns whether the request was accepted.
pub fn queue_direction(state: &mut GameState, dir: Direction) -> bool {
    if state.is_over() || dir == state.heading.opposite() {
        return false;
    }
    state.queued = Some(dir);
    true
}

/// Advance the game state by one step
pub fn tick(state: &mut GameState, config: &GameConfig) -> TickOutcome {
    let mut outcome = TickOutcome::default();

    // Paused for the hard-mode handover, or already over
    if state.is_over() || state.phase == difficulty::Phase::Transitioning {
        return outcome;
    }

    if let Some(dir) = state.queued.take() {
        state.heading = dir;
    }
    state.time_ticks += 1;

    let new_head = state.grid.step(state.head(), state.heading);

    // Self collision is checked against the body as it was before the move
    if state.snake.iter().skip(1).any(|p| *p == new_head) {
        return end(state, EndReason::SelfCollision, outcome);
    }
    if state.phase.is_hard() && state.obstacles.contains(&new_head) {
        return end(state, EndReason::ObstacleCollision, outcome);
    }

    state.snake.push_front(new_head);
    outcome.advanced = true;

    if state.food == Some(new_head) {
        let before = state.score;
        state.score += config.food_score;
        state.foods_eaten += 1;
        outcome.ate = true;
        outcome.score_delta = config.food_score;
        outcome.events.push(GameEvent::FoodEaten {
            at: new_head,
            score: state.score,
        });

        let policy = SpeedPolicy::from_config(config);
        let interval = policy.after_score(state.interval_ms, before, state.score);
        if interval != state.interval_ms {
            log::debug!("Tick interval {}ms -> {}ms", state.interval_ms, interval);
            state.interval_ms = interval;
            outcome.events.push(GameEvent::SpeedChanged { interval_ms: interval });
        }

        if difficulty::check_transition(state, config) {
            outcome.events.push(GameEvent::PhaseTransitionRequested { score: state.score });
        }

        if !state.respawn_food() {
            return end(state, EndReason::BoardFilled, outcome);
        }
    } else {
        state.snake.pop_back();
    }

    outcome
}

fn end(state: &mut GameState, reason: EndReason, mut outcome: TickOutcome) -> TickOutcome {
    log::info!("Game over ({}) with score {}", reason.as_str(), state.score);
    state.ended = Some(reason);
    outcome.events.push(GameEvent::GameOver {
        reason,
        score: state.score,
    });
    outcome
}
