//! Ledger documents
//!
//! These are the records the store persists. Money is kept in integer
//! hundredths so every reward computation floors exactly.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::WeekId;
use crate::error::LedgerError;
use crate::sim::Phase;

/// Money in minor units (hundredths)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    /// `bps` basis points of this amount, floored
    pub fn basis_points(self, bps: u32) -> Amount {
        self.fraction(bps as u64, 10_000)
    }

    /// `part / whole` of this amount, floored. Zero when `whole` is zero.
    pub fn fraction(self, part: u64, whole: u64) -> Amount {
        if whole == 0 {
            return Amount::ZERO;
        }
        let minor = self.0 as u128 * part as u128 / whole as u128;
        Amount(minor.min(u64::MAX as u128) as u64)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, Amount::saturating_add)
    }
}

/// Stable player key from the identity provider
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who is playing, as handed over by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub id: PlayerId,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl PlayerIdentity {
    pub fn new(id: u64) -> Self {
        Self {
            id: PlayerId(id),
            display_name: None,
            avatar_url: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.id.0 == 0 {
            return Err(LedgerError::InputRejected("missing player id".into()));
        }
        if self.display_name.as_deref().is_some_and(|n| n.len() > 64) {
            return Err(LedgerError::InputRejected("display name too long".into()));
        }
        Ok(())
    }
}

/// Best result of one player on one UTC day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyScore {
    pub best_score: u32,
    /// Phase the best session ended in
    pub mode: Phase,
    pub recorded_at: DateTime<Utc>,
}

/// Reward pool of one week
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WeekPool {
    pub pool_total: Amount,
    /// Sessions that contributed
    pub sessions: u32,
}

/// One paid rank of a closed week, fixed when the week's payouts are frozen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRow {
    /// 1-based
    pub rank: usize,
    pub player: PlayerId,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ClaimState {
    /// Transfer in flight
    Reserved,
    /// Transfer timed out; the rail may or may not have moved the money.
    /// Blocks further claims until reconciled out of band.
    Unconfirmed,
    Paid { tx_ref: String },
}

/// One (player, week) payout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub amount: Amount,
    #[serde(flatten)]
    pub state: ClaimState,
}

impl ClaimRecord {
    pub fn is_paid(&self) -> bool {
        matches!(self.state, ClaimState::Paid { .. })
    }
}

/// Everything the ledger keeps per player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub id: PlayerId,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub wallet_address: Option<String>,
    pub lives_balance: u32,

    // === Weekly aggregate ===
    pub weekly_score: u64,
    pub last_active_week: Option<WeekId>,
    pub previous_weekly_score: u64,
    pub previous_active_week: Option<WeekId>,

    pub claims: BTreeMap<WeekId, ClaimRecord>,
    pub lifetime_earnings: Amount,
    /// External references of life purchases already credited
    pub credited_purchases: BTreeSet<String>,
}

impl PlayerProfile {
    pub fn new(identity: &PlayerIdentity, starting_lives: u32) -> Self {
        Self {
            id: identity.id,
            display_name: identity.display_name.clone(),
            avatar_url: identity.avatar_url.clone(),
            wallet_address: None,
            lives_balance: starting_lives,
            weekly_score: 0,
            last_active_week: None,
            previous_weekly_score: 0,
            previous_active_week: None,
            claims: BTreeMap::new(),
            lifetime_earnings: Amount::ZERO,
            credited_purchases: BTreeSet::new(),
        }
    }

    /// Whether `identity` carries a name or avatar this profile lacks
    pub fn identity_stale(&self, identity: &PlayerIdentity) -> bool {
        (identity.display_name.is_some() && identity.display_name != self.display_name)
            || (identity.avatar_url.is_some() && identity.avatar_url != self.avatar_url)
    }

    /// Copy provided identity fields; returns whether anything changed
    pub fn refresh_identity(&mut self, identity: &PlayerIdentity) -> bool {
        if !self.identity_stale(identity) {
            return false;
        }
        if identity.display_name.is_some() {
            self.display_name = identity.display_name.clone();
        }
        if identity.avatar_url.is_some() {
            self.avatar_url = identity.avatar_url.clone();
        }
        true
    }

    /// Aggregate score valid for `week`, live or archived
    pub fn score_for_week(&self, week: WeekId) -> Option<u64> {
        if self.last_active_week == Some(week) {
            Some(self.weekly_score)
        } else if self.previous_active_week == Some(week) {
            Some(self.previous_weekly_score)
        } else {
            None
        }
    }
}

/// A player's entry in a week, as scanned by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveEntry {
    pub player: PlayerId,
    pub score: u64,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl ActiveEntry {
    pub fn from_profile(profile: &PlayerProfile, week: WeekId) -> Option<Self> {
        let score = profile.score_for_week(week).filter(|s| *s > 0)?;
        Some(Self {
            player: profile.id,
            score,
            display_name: profile.display_name.clone(),
            avatar_url: profile.avatar_url.clone(),
        })
    }
}

/// Order entries by score descending, then player id ascending
pub fn sort_entries(entries: &mut [ActiveEntry]) {
    entries.sort_by(|a, b| b.score.cmp(&a.score).then(a.player.cmp(&b.player)));
}

/// One day of the weekly streak view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayStat {
    pub date: NaiveDate,
    /// "Mon" .. "Sun"
    pub day_name: &'static str,
    pub score: u32,
    pub played: bool,
    pub is_today: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSummary {
    pub player: PlayerId,
    pub display_name: Option<String>,
    pub today_score: u32,
    pub week_total: u64,
    pub lives_balance: u32,
    pub lifetime_earnings: Amount,
    pub wallet_linked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_display_and_math() {
        assert_eq!(Amount::from_minor(12_345).to_string(), "123.45");
        assert_eq!(Amount::from_minor(7).to_string(), "0.07");
        // 35% of 10.01 = 3.5035 -> 3.50
        assert_eq!(Amount::from_minor(1_001).basis_points(3_500), Amount::from_minor(350));
        assert_eq!(Amount::from_minor(100).fraction(1, 3), Amount::from_minor(33));
        assert_eq!(Amount::from_minor(100).fraction(1, 0), Amount::ZERO);
        let total: Amount = [1, 2, 3].into_iter().map(Amount::from_minor).sum();
        assert_eq!(total, Amount::from_minor(6));
    }

    #[test]
    fn test_identity_validation() {
        assert!(PlayerIdentity::new(0).validate().is_err());
        assert!(PlayerIdentity::new(3).with_name("ana").validate().is_ok());
        let long = "x".repeat(65);
        assert!(PlayerIdentity::new(3).with_name(long).validate().is_err());
    }

    #[test]
    fn test_score_for_week() {
        let mut profile = PlayerProfile::new(&PlayerIdentity::new(1), 0);
        let w1 = WeekId::new(2025, 10);
        let w2 = WeekId::new(2025, 11);
        assert_eq!(profile.score_for_week(w1), None);
        profile.previous_active_week = Some(w1);
        profile.previous_weekly_score = 40;
        profile.last_active_week = Some(w2);
        profile.weekly_score = 90;
        assert_eq!(profile.score_for_week(w1), Some(40));
        assert_eq!(profile.score_for_week(w2), Some(90));
        assert_eq!(profile.score_for_week(WeekId::new(2025, 12)), None);
    }

    #[test]
    fn test_refresh_identity_keeps_missing_fields() {
        let mut profile =
            PlayerProfile::new(&PlayerIdentity::new(1).with_name("ana").with_avatar("a.png"), 0);
        assert!(!profile.refresh_identity(&PlayerIdentity::new(1)));
        assert_eq!(profile.display_name.as_deref(), Some("ana"));
        assert!(profile.refresh_identity(&PlayerIdentity::new(1).with_name("bo")));
        assert_eq!(profile.display_name.as_deref(), Some("bo"));
        assert_eq!(profile.avatar_url.as_deref(), Some("a.png"));
    }

    #[test]
    fn test_profile_json_keys_weeks_as_strings() {
        let mut profile = PlayerProfile::new(&PlayerIdentity::new(1), 0);
        profile.claims.insert(
            WeekId::new(2025, 2),
            ClaimRecord {
                amount: Amount::from_minor(350),
                state: ClaimState::Paid {
                    tx_ref: "tx1".into(),
                },
            },
        );
        let json = serde_json::to_string(&profile).unwrap();
        assert!(json.contains("\"2025-W02\""));
        assert!(json.contains("\"state\":\"paid\""));
        let back: PlayerProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, profile);
    }
}
