//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Time arrives from outside (the clock never reads a system timer)
//! - Seeded RNG only
//! - No rendering, storage or platform dependencies

pub mod clock;
pub mod difficulty;
pub mod grid;
pub mod state;
pub mod tick;

pub use clock::SimClock;
pub use difficulty::{Phase, SpeedPolicy};
pub use grid::{Direction, Grid, Point};
pub use state::{EndReason, GameEvent, GameState};
pub use tick::{TickOutcome, queue_direction, tick};
