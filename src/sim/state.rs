//! Game state and core simulation types
//!
//! Everything a tick reads or writes lives in `GameState`, owned by exactly
//! one session.

use std::collections::VecDeque;

use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::difficulty::{Phase, SpeedPolicy};
use super::grid::{Direction, Grid, Point};
use crate::settings::GameConfig;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// Head ran into the snake's own body
    SelfCollision,
    /// Head ran into an obstacle (HARD only)
    ObstacleCollision,
    /// No free cell left for food
    BoardFilled,
    /// Player left the session
    Quit,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::SelfCollision => "self_collision",
            EndReason::ObstacleCollision => "obstacle_collision",
            EndReason::BoardFilled => "board_filled",
            EndReason::Quit => "quit",
        }
    }
}

/// Something the caller of the simulation may want to react to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    FoodEaten { at: Point, score: u32 },
    SpeedChanged { interval_ms: u32 },
    /// Score reached the hard-mode threshold; the clock must pause
    PhaseTransitionRequested { score: u32 },
    HardModeEntered { obstacles: usize, interval_ms: u32 },
    GameOver { reason: EndReason, score: u32 },
}

/// Complete simulation state (deterministic for a seed and input sequence)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    /// Run seed for reproducibility
    pub seed: u64,
    pub rng: Pcg32,
    pub grid: Grid,
    /// Snake cells, head first
    pub snake: VecDeque<Point>,
    /// Heading applied on the last tick
    pub heading: Direction,
    /// Latest accepted direction request, consumed by the next tick
    pub queued: Option<Direction>,
    /// `None` only once the board is full
    pub food: Option<Point>,
    pub obstacles: Vec<Point>,
    pub score: u32,
    pub foods_eaten: u32,
    pub phase: Phase,
    /// Current tick period (milliseconds)
    pub interval_ms: u32,
    /// Simulation tick counter
    pub time_ticks: u64,
    /// Set once the session can no longer tick
    pub ended: Option<EndReason>,
}

impl GameState {
    /// Create a fresh session state with the given seed
    pub fn new(config: &GameConfig, seed: u64) -> Self {
        let grid = Grid::new(config.grid_width, config.grid_height);
        let mut snake = VecDeque::with_capacity(grid.cell_count());
        snake.push_back(grid.center());

        let mut state = Self {
            seed,
            rng: Pcg32::seed_from_u64(seed),
            grid,
            snake,
            heading: Direction::Right,
            queued: None,
            food: None,
            obstacles: Vec::new(),
            score: 0,
            foods_eaten: 0,
            phase: Phase::Normal,
            interval_ms: SpeedPolicy::from_config(config).initial_interval(),
            time_ticks: 0,
            ended: None,
        };
        state.respawn_food();
        state
    }

    pub fn head(&self) -> Point {
        self.snake[0]
    }

    pub fn len(&self) -> usize {
        self.snake.len()
    }

    pub fn is_over(&self) -> bool {
        self.ended.is_some()
    }

    /// Place food on a uniformly random cell not covered by snake or obstacles.
    ///
    /// Returns false when no such cell exists.
    pub fn respawn_food(&mut self) -> bool {
        let snake = &self.snake;
        let obstacles = &self.obstacles;
        self.food = self
            .grid
            .random_free_cell(&mut self.rng, |p| snake.contains(&p) || obstacles.contains(&p));
        if let Some(food) = self.food {
            log::debug!("Food spawned at ({}, {})", food.x, food.y);
        }
        self.food.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state() {
        let config = GameConfig::default();
        let state = GameState::new(&config, 42);
        assert_eq!(state.len(), 1);
        assert_eq!(state.head(), state.grid.center());
        assert_eq!(state.score, 0);
        assert_eq!(state.phase, Phase::Normal);
        assert_eq!(state.interval_ms, 250);
        let food = state.food.expect("food on empty board");
        assert_ne!(food, state.head());
        assert!(state.grid.contains(food));
    }

    #[test]
    fn test_same_seed_same_food() {
        let config = GameConfig::default();
        let a = GameState::new(&config, 99);
        let b = GameState::new(&config, 99);
        assert_eq!(a.food, b.food);
    }
}
