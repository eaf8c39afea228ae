//! Snake Rush - a grid snake game wrapped in a weekly score competition
//!
//! Core modules:
//! - `sim`: Deterministic simulation (movement, collisions, phases, clock)
//! - `session`: One playable session driving the simulation in time
//! - `renderer`: Draw-command sink contract and canvas backend
//! - `ledger`: Daily bests, weekly aggregates, lives and pools
//! - `ranking`: Weekly standings and reward distribution
//! - `payout`: Reward claims against a payment collaborator (native only)
//! - `persistence`: Transactional store for ledger documents
//! - `settings`: Data-driven game balance and economy configuration

pub mod calendar;
pub mod error;
pub mod input;
pub mod ledger;
#[cfg(not(target_arch = "wasm32"))]
pub mod payout;
pub mod persistence;
pub mod platform;
pub mod ranking;
pub mod renderer;
pub mod session;
pub mod settings;
pub mod sim;

pub use error::{ConfigError, LedgerError, StoreError};
pub use ledger::{Amount, Ledger, PlayerId, PlayerIdentity};
pub use session::GameSession;
pub use settings::{EconomyConfig, GameConfig, Settings};

/// Game configuration constants
pub mod consts {
    /// Canvas dimensions in pixels
    pub const CANVAS_WIDTH: u32 = 360;
    pub const CANVAS_HEIGHT: u32 = 360;
    /// Size of one grid cell in pixels
    pub const CELL_SIZE: u32 = 20;

    /// Board dimensions in cells
    pub const GRID_WIDTH: i32 = (CANVAS_WIDTH / CELL_SIZE) as i32;
    pub const GRID_HEIGHT: i32 = (CANVAS_HEIGHT / CELL_SIZE) as i32;

    /// Points per food item
    pub const FOOD_SCORE: u32 = 10;

    /// Score at which NORMAL hands over to HARD
    pub const HARD_MODE_THRESHOLD: u32 = 200;
    /// Obstacles injected on entering HARD
    pub const HARD_MODE_OBSTACLES: usize = 5;

    /// Tick interval defaults (milliseconds)
    pub const BASE_TICK_MS: u32 = 250;
    pub const MIN_TICK_MS: u32 = 50;
    pub const HARD_GRACE_TICK_MS: u32 = 180;
    /// Score step between speed-ups
    pub const SPEED_MILESTONE: u32 = 50;
    /// Interval multiplier applied at each milestone
    pub const SPEED_FACTOR: f32 = 0.85;

    /// Minimum time between UI snapshots (milliseconds)
    pub const PUBLISH_INTERVAL_MS: u64 = 100;
}
