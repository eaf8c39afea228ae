//! Difficulty phases and tick-rate scaling
//!
//! A session starts in NORMAL, pauses in TRANSITIONING once the score
//! reaches the hard-mode threshold, and continues in HARD after the player
//! acknowledges. The phase never goes back.

use serde::{Deserialize, Serialize};

use super::grid::Point;
use super::state::{GameEvent, GameState};
use crate::settings::GameConfig;

/// Difficulty phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Normal,
    /// Threshold reached, waiting for the player to acknowledge hard mode
    Transitioning,
    Hard,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Normal => "NORMAL",
            Phase::Transitioning => "TRANSITIONING",
            Phase::Hard => "HARD",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NORMAL" => Some(Phase::Normal),
            "TRANSITIONING" => Some(Phase::Transitioning),
            "HARD" => Some(Phase::Hard),
            _ => None,
        }
    }

    /// Obstacles only kill in this phase
    pub fn is_hard(&self) -> bool {
        matches!(self, Phase::Hard)
    }
}

/// Tick-interval policy
///
/// Every crossing of a multiple of `milestone` multiplies the interval by
/// `factor` (floored, clamped at `min_ms`). Entering HARD raises the interval
/// once to at least `grace_ms`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedPolicy {
    pub base_ms: u32,
    pub min_ms: u32,
    pub milestone: u32,
    pub factor: f32,
    pub grace_ms: u32,
}

impl SpeedPolicy {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            base_ms: config.base_tick_ms,
            min_ms: config.min_tick_ms,
            milestone: config.speed_milestone,
            factor: config.speed_factor,
            grace_ms: config.hard_grace_tick_ms,
        }
    }

    pub fn initial_interval(&self) -> u32 {
        self.base_ms.max(self.min_ms)
    }

    /// One speed-up step
    pub fn accelerate(&self, interval_ms: u32) -> u32 {
        let scaled = (interval_ms as f64 * self.factor as f64).floor() as u32;
        scaled.max(self.min_ms)
    }

    /// Interval after the score moved from `before` to `after`
    pub fn after_score(&self, interval_ms: u32, before: u32, after: u32) -> u32 {
        if self.milestone == 0 || after <= before {
            return interval_ms;
        }
        let crossed = after / self.milestone - before / self.milestone;
        (0..crossed).fold(interval_ms, |ms, _| self.accelerate(ms))
    }

    /// Brief slow-down granted when HARD begins
    pub fn enter_hard(&self, interval_ms: u32) -> u32 {
        interval_ms.max(self.grace_ms)
    }
}

/// Flag the NORMAL -> TRANSITIONING handover if the threshold was reached.
///
/// Returns true only on the call that performs the transition.
pub fn check_transition(state: &mut GameState, config: &GameConfig) -> bool {
    if state.phase == Phase::Normal && state.score >= config.hard_mode_threshold {
        state.phase = Phase::Transitioning;
        log::info!("Hard mode unlocked at score {}", state.score);
        return true;
    }
    false
}

/// Complete the handover into HARD.
///
/// Generates obstacles the first time only and applies the grace interval.
/// Returns `None` if the state was not waiting for acknowledgement.
pub fn enter_hard(state: &mut GameState, config: &GameConfig) -> Option<GameEvent> {
    if state.phase != Phase::Transitioning {
        return None;
    }
    state.phase = Phase::Hard;
    if state.obstacles.is_empty() {
        generate_obstacles(state, config.hard_mode_obstacles);
    }
    let policy = SpeedPolicy::from_config(config);
    state.interval_ms = policy.enter_hard(state.interval_ms);
    log::info!(
        "Entered hard mode: {} obstacles, tick {}ms",
        state.obstacles.len(),
        state.interval_ms
    );
    Some(GameEvent::HardModeEntered {
        obstacles: state.obstacles.len(),
        interval_ms: state.interval_ms,
    })
}

/// Scatter up to `count` obstacles on cells free of snake, food and each other.
///
/// Only the positions at generation time are checked.
fn generate_obstacles(state: &mut GameState, count: usize) {
    let mut placed: Vec<Point> = Vec::with_capacity(count);
    for _ in 0..count {
        let cell = {
            let snake = &state.snake;
            let food = state.food;
            let taken = &placed;
            state.grid.random_free_cell(&mut state.rng, |p| {
                snake.contains(&p) || food == Some(p) || taken.contains(&p)
            })
        };
        match cell {
            Some(p) => placed.push(p),
            None => break,
        }
    }
    state.obstacles = placed;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SpeedPolicy {
        SpeedPolicy::from_config(&GameConfig::default())
    }

    #[test]
    fn test_speed_scenario() {
        let p = policy();
        let start = p.initial_interval();
        assert_eq!(start, 250);
        let after_50 = p.after_score(start, 40, 50);
        assert_eq!(after_50, 212);
        let after_100 = p.after_score(after_50, 90, 100);
        assert_eq!(after_100, 180);
        // No milestone crossed
        assert_eq!(p.after_score(after_100, 100, 110), 180);
    }

    #[test]
    fn test_speed_floor() {
        let p = policy();
        let mut ms = p.initial_interval();
        for step in 0..100 {
            ms = p.after_score(ms, step * 50, step * 50 + 50);
        }
        assert_eq!(ms, 50);
    }

    #[test]
    fn test_grace_only_slows_down() {
        let p = policy();
        assert_eq!(p.enter_hard(130), 180);
        assert_eq!(p.enter_hard(220), 220);
    }

    #[test]
    fn test_transition_fires_once() {
        let config = GameConfig::default();
        let mut state = GameState::new(&config, 7);
        state.score = 190;
        assert!(!check_transition(&mut state, &config));
        state.score = 200;
        assert!(check_transition(&mut state, &config));
        assert_eq!(state.phase, Phase::Transitioning);
        state.score = 210;
        assert!(!check_transition(&mut state, &config));
    }

    #[test]
    fn test_enter_hard_generates_obstacles_once() {
        let config = GameConfig::default();
        let mut state = GameState::new(&config, 11);
        state.phase = Phase::Transitioning;
        let event = enter_hard(&mut state, &config);
        assert!(matches!(event, Some(GameEvent::HardModeEntered { obstacles: 5, .. })));
        assert_eq!(state.phase, Phase::Hard);
        let first = state.obstacles.clone();
        for p in &first {
            assert!(!state.snake.contains(p));
            assert_ne!(state.food, Some(*p));
        }

        // A second acknowledgement is a no-op
        assert!(enter_hard(&mut state, &config).is_none());
        assert_eq!(state.obstacles, first);
    }
}
