//! Transactional storage for ledger documents
//!
//! The ledger only ever needs one player's documents at a time, plus a
//! commutative increment of one week's pool. `LedgerStore::transact` hands
//! the caller a `PlayerTxn` holding a consistent snapshot of those
//! documents; whatever the closure writes into it is committed atomically,
//! or not at all when the closure returns an error.
//!
//! Backends:
//! - `MemoryStore`: optimistic, per-player versions, reports conflicts
//! - `SqliteStore` (native): one `BEGIN IMMEDIATE` transaction per call

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::calendar::WeekId;
use crate::error::{LedgerError, StoreError};
use crate::ledger::{
    ActiveEntry, Amount, DailyScore, PayoutRow, PlayerId, PlayerProfile, WeekPool,
};

pub mod memory;
#[cfg(not(target_arch = "wasm32"))]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(not(target_arch = "wasm32"))]
pub use sqlite::SqliteStore;

/// Narrow persistence contract used by the ledger
pub trait LedgerStore: Send + Sync {
    /// Run `f` atomically against `player`'s documents.
    ///
    /// With `week` set, the snapshot also holds that week's daily scores and
    /// pool, and pool contributions may be added. A contended commit fails
    /// with `LedgerError::TransactionConflict`; the caller decides whether
    /// to retry.
    fn transact<T, F>(&self, player: PlayerId, week: Option<WeekId>, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut PlayerTxn) -> Result<T, LedgerError>;

    fn profile(&self, player: PlayerId) -> Result<Option<PlayerProfile>, StoreError>;

    /// Daily scores of `player` between `from` and `to`, inclusive
    fn daily_scores(
        &self,
        player: PlayerId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, DailyScore>, StoreError>;

    /// Players with a non-zero aggregate for `week` (live or archived),
    /// highest score first, ties by ascending player id
    fn players_active_in(&self, week: WeekId) -> Result<Vec<ActiveEntry>, StoreError>;

    fn week_pool(&self, week: WeekId) -> Result<WeekPool, StoreError>;

    /// Frozen payout table of `week`, if one was stored
    fn payout_table(&self, week: WeekId) -> Result<Option<Vec<PayoutRow>>, StoreError>;

    /// Store `rows` as the payout table of `week` unless it already has one.
    ///
    /// Returns the table in effect afterwards; the first writer wins.
    fn freeze_payouts(&self, week: WeekId, rows: &[PayoutRow]) -> Result<Vec<PayoutRow>, StoreError>;
}

/// Snapshot of one player's documents plus buffered writes
#[derive(Debug)]
pub struct PlayerTxn {
    player: PlayerId,
    week: Option<WeekId>,
    profile: Option<PlayerProfile>,
    dailies: BTreeMap<NaiveDate, DailyScore>,
    pool: WeekPool,

    profile_dirty: bool,
    written_dailies: BTreeSet<NaiveDate>,
    pool_increment: Amount,
    pool_sessions: u32,
}

/// What a finished transaction wants committed
#[derive(Debug, Default)]
pub struct TxnWrites {
    pub profile: Option<PlayerProfile>,
    pub dailies: Vec<(NaiveDate, DailyScore)>,
    /// Week, amount added, sessions added
    pub pool: Option<(WeekId, Amount, u32)>,
}

impl TxnWrites {
    pub fn is_empty(&self) -> bool {
        self.profile.is_none() && self.dailies.is_empty() && self.pool.is_none()
    }
}

impl PlayerTxn {
    /// Start a transaction from a snapshot read by a backend
    pub fn begin(
        player: PlayerId,
        week: Option<WeekId>,
        profile: Option<PlayerProfile>,
        dailies: BTreeMap<NaiveDate, DailyScore>,
        pool: WeekPool,
    ) -> Self {
        Self {
            player,
            week,
            profile,
            dailies,
            pool,
            profile_dirty: false,
            written_dailies: BTreeSet::new(),
            pool_increment: Amount::ZERO,
            pool_sessions: 0,
        }
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn week(&self) -> Option<WeekId> {
        self.week
    }

    pub fn profile(&self) -> Option<&PlayerProfile> {
        self.profile.as_ref()
    }

    /// Mutable profile access; the profile is written back on commit
    pub fn profile_mut(&mut self) -> Option<&mut PlayerProfile> {
        if self.profile.is_some() {
            self.profile_dirty = true;
        }
        self.profile.as_mut()
    }

    /// Existing profile, or a new one built by `create`
    pub fn profile_or_insert_with(
        &mut self,
        create: impl FnOnce() -> PlayerProfile,
    ) -> &mut PlayerProfile {
        self.profile_dirty = true;
        self.profile.get_or_insert_with(create)
    }

    pub fn daily(&self, date: NaiveDate) -> Option<&DailyScore> {
        self.dailies.get(&date)
    }

    /// Daily scores of the transaction's week
    pub fn week_dailies(&self) -> impl Iterator<Item = (&NaiveDate, &DailyScore)> {
        self.dailies.iter()
    }

    pub fn put_daily(&mut self, date: NaiveDate, score: DailyScore) -> Result<(), LedgerError> {
        if !self.week.is_some_and(|w| w.contains(date)) {
            return Err(LedgerError::InputRejected(format!(
                "{date} is outside the transaction's week"
            )));
        }
        self.dailies.insert(date, score);
        self.written_dailies.insert(date);
        Ok(())
    }

    /// Pool of the transaction's week as of the snapshot plus pending increments
    pub fn pool(&self) -> WeekPool {
        WeekPool {
            pool_total: self.pool.pool_total.saturating_add(self.pool_increment),
            sessions: self.pool.sessions + self.pool_sessions,
        }
    }

    /// Add one session's contribution to the week's pool
    pub fn contribute_to_pool(&mut self, amount: Amount) -> Result<(), LedgerError> {
        if self.week.is_none() {
            return Err(LedgerError::InputRejected(
                "pool contribution needs a week".into(),
            ));
        }
        self.pool_increment = self.pool_increment.saturating_add(amount);
        self.pool_sessions += 1;
        Ok(())
    }

    pub fn into_writes(mut self) -> TxnWrites {
        let profile = if self.profile_dirty {
            self.profile.take()
        } else {
            None
        };
        let dailies = self
            .written_dailies
            .iter()
            .filter_map(|d| self.dailies.remove(d).map(|s| (*d, s)))
            .collect();
        let pool = match self.week {
            Some(week) if self.pool_sessions > 0 => {
                Some((week, self.pool_increment, self.pool_sessions))
            }
            _ => None,
        };
        TxnWrites {
            profile,
            dailies,
            pool,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::PlayerIdentity;
    use crate::sim::Phase;
    use chrono::Utc;

    fn score(best: u32) -> DailyScore {
        DailyScore {
            best_score: best,
            mode: Phase::Normal,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_read_only_txn_has_no_writes() {
        let week = WeekId::new(2025, 10);
        let mut txn = PlayerTxn::begin(PlayerId(1), Some(week), None, BTreeMap::new(), WeekPool::default());
        assert!(txn.profile_mut().is_none());
        assert!(txn.into_writes().is_empty());
    }

    #[test]
    fn test_writes_are_collected() {
        let week = WeekId::new(2025, 10);
        let monday = week.monday();
        let mut txn = PlayerTxn::begin(PlayerId(1), Some(week), None, BTreeMap::new(), WeekPool::default());
        txn.profile_or_insert_with(|| PlayerProfile::new(&PlayerIdentity::new(1), 3));
        txn.put_daily(monday, score(40)).unwrap();
        txn.contribute_to_pool(Amount::from_minor(10)).unwrap();
        txn.contribute_to_pool(Amount::from_minor(10)).unwrap();
        assert_eq!(txn.pool().pool_total, Amount::from_minor(20));

        let writes = txn.into_writes();
        assert_eq!(writes.profile.map(|p| p.lives_balance), Some(3));
        assert_eq!(writes.dailies.len(), 1);
        assert_eq!(writes.pool, Some((week, Amount::from_minor(20), 2)));
    }

    #[test]
    fn test_daily_outside_week_rejected() {
        let week = WeekId::new(2025, 10);
        let mut txn = PlayerTxn::begin(PlayerId(1), Some(week), None, BTreeMap::new(), WeekPool::default());
        let next_monday = week.next().monday();
        assert!(txn.put_daily(next_monday, score(10)).is_err());

        let mut txn = PlayerTxn::begin(PlayerId(1), None, None, BTreeMap::new(), WeekPool::default());
        assert!(txn.contribute_to_pool(Amount::from_minor(1)).is_err());
    }
}
