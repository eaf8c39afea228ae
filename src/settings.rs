//! Game balance and economy settings
//!
//! Persisted as JSON: a file on native builds, LocalStorage on the web.
//! Every field has a default, so partial files are fine.

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::ConfigError;
use crate::ledger::Amount;

/// Simulation balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub grid_width: i32,
    pub grid_height: i32,
    /// Points per food item
    pub food_score: u32,

    // === Speed ===
    pub base_tick_ms: u32,
    pub min_tick_ms: u32,
    /// Score step between speed-ups
    pub speed_milestone: u32,
    /// Interval multiplier per milestone (0 < f <= 1)
    pub speed_factor: f32,

    // === Hard mode ===
    pub hard_mode_threshold: u32,
    pub hard_mode_obstacles: usize,
    /// Interval floor applied once when hard mode starts
    pub hard_grace_tick_ms: u32,
    /// Keep the clock stopped after the hard-mode prompt until the player steers
    pub require_input_after_transition: bool,

    // === UI ===
    /// Minimum time between published snapshots
    pub publish_interval_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            grid_width: GRID_WIDTH,
            grid_height: GRID_HEIGHT,
            food_score: FOOD_SCORE,

            base_tick_ms: BASE_TICK_MS,
            min_tick_ms: MIN_TICK_MS,
            speed_milestone: SPEED_MILESTONE,
            speed_factor: SPEED_FACTOR,

            hard_mode_threshold: HARD_MODE_THRESHOLD,
            hard_mode_obstacles: HARD_MODE_OBSTACLES,
            hard_grace_tick_ms: HARD_GRACE_TICK_MS,
            require_input_after_transition: true,

            publish_interval_ms: PUBLISH_INTERVAL_MS,
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_width < 4 || self.grid_height < 4 {
            return Err(ConfigError::Invalid(format!(
                "grid must be at least 4x4, got {}x{}",
                self.grid_width, self.grid_height
            )));
        }
        if self.food_score == 0 {
            return Err(ConfigError::Invalid("food_score must be non-zero".into()));
        }
        if self.min_tick_ms == 0 || self.base_tick_ms < self.min_tick_ms {
            return Err(ConfigError::Invalid(format!(
                "tick interval must satisfy 0 < min ({}) <= base ({})",
                self.min_tick_ms, self.base_tick_ms
            )));
        }
        if !(self.speed_factor > 0.0 && self.speed_factor <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "speed_factor must be in (0, 1], got {}",
                self.speed_factor
            )));
        }
        if self.speed_milestone == 0 {
            return Err(ConfigError::Invalid("speed_milestone must be non-zero".into()));
        }
        let cells = (self.grid_width * self.grid_height) as usize;
        if self.hard_mode_obstacles >= cells / 2 {
            return Err(ConfigError::Invalid(format!(
                "{} obstacles do not fit a {}-cell board",
                self.hard_mode_obstacles, cells
            )));
        }
        Ok(())
    }
}

/// Where a week's reward pool comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoolPolicy {
    /// Every started session adds a fixed contribution
    Dynamic { per_session: Amount },
    /// Same pool every week regardless of activity
    Fixed { amount: Amount },
}

/// How a pool is split among the eligible players
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewardPolicy {
    /// Rank `i` receives `tiers_bps[i]` basis points of the pool
    FixedTier { tiers_bps: Vec<u32> },
    /// Share proportional to score among the eligible cohort
    Proportional,
}

/// How the live weekly score is maintained on a new daily best
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeeklyAggregation {
    /// Re-sum the week's daily bests (robust to missed writes)
    #[default]
    Summation,
    /// Add the improvement to the stored total
    Incremental,
}

/// Lives, pools and payouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Lives granted to a profile the first time it is seen
    pub starting_lives: u32,
    pub pool: PoolPolicy,
    pub reward: RewardPolicy,
    /// Only this many top ranks are paid
    pub payout_top_n: usize,
    pub aggregation: WeeklyAggregation,
    /// Attempts for a conflicting ledger transaction before giving up
    pub max_txn_attempts: u32,
    /// Upper bound on one payment transfer
    pub transfer_timeout_ms: u64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            starting_lives: 0,
            pool: PoolPolicy::Dynamic {
                per_session: Amount::from_minor(10),
            },
            reward: RewardPolicy::FixedTier {
                tiers_bps: vec![3500, 2500, 2000, 1200, 800],
            },
            payout_top_n: 5,
            aggregation: WeeklyAggregation::Summation,
            max_txn_attempts: 5,
            transfer_timeout_ms: 10_000,
        }
    }
}

impl EconomyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.payout_top_n == 0 {
            return Err(ConfigError::Invalid("payout_top_n must be non-zero".into()));
        }
        if self.max_txn_attempts == 0 {
            return Err(ConfigError::Invalid("max_txn_attempts must be non-zero".into()));
        }
        if let RewardPolicy::FixedTier { tiers_bps } = &self.reward {
            let total: u32 = tiers_bps.iter().sum();
            if total > 10_000 {
                return Err(ConfigError::Invalid(format!(
                    "reward tiers sum to {total} bps, more than the whole pool"
                )));
            }
            if tiers_bps.windows(2).any(|w| w[1] > w[0]) {
                return Err(ConfigError::Invalid("reward tiers must be descending".into()));
            }
        }
        Ok(())
    }

    /// Number of ranks that can receive a reward
    pub fn eligible_ranks(&self) -> usize {
        match &self.reward {
            RewardPolicy::FixedTier { tiers_bps } => self.payout_top_n.min(tiers_bps.len()),
            RewardPolicy::Proportional => self.payout_top_n,
        }
    }
}

/// All settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub game: GameConfig,
    pub economy: EconomyConfig,
}

impl Settings {
    /// LocalStorage key
    #[allow(dead_code)]
    const STORAGE_KEY: &'static str = "snake_rush_settings";

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.game.validate()?;
        self.economy.validate()
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Override selected values from `SNAKE_RUSH_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = read_env("SNAKE_RUSH_BASE_TICK_MS") {
            self.game.base_tick_ms = v;
        }
        if let Some(v) = read_env("SNAKE_RUSH_TOP_N") {
            self.economy.payout_top_n = v;
        }
        if let Some(v) = read_env("SNAKE_RUSH_TRANSFER_TIMEOUT_MS") {
            self.economy.transfer_timeout_ms = v;
        }
        if let Some(v) = read_env("SNAKE_RUSH_STARTING_LIVES") {
            self.economy.starting_lives = v;
        }
    }

    /// Read settings from a JSON file, falling back to defaults
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => match Self::from_json(&json) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    return settings;
                }
                Err(e) => log::warn!("Ignoring settings at {}: {e}", path.display()),
            },
            Err(_) => log::info!("No settings at {}, using defaults", path.display()),
        }
        Self::default()
    }

    /// Write settings as pretty JSON via a temp file and rename
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, path)?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Load settings from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                if let Ok(settings) = Self::from_json(&json) {
                    log::info!("Loaded settings from LocalStorage");
                    return settings;
                }
            }
        }

        log::info!("Using default settings");
        Self::default()
    }

    /// Save settings to LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn save(&self) {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(json) = serde_json::to_string(self) {
                let _ = storage.set_item(Self::STORAGE_KEY, &json);
                log::info!("Settings saved");
            }
        }
    }
}

fn read_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("Ignoring unparsable {key}={raw}");
            None
        }
    }
}
