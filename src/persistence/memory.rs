//! In-memory ledger store with optimistic concurrency
//!
//! A transaction snapshots the player's documents under the lock, runs the
//! closure without holding it, then commits only if the player's version
//! is unchanged. A stale commit is reported as a conflict and nothing is
//! written. Pool increments are commutative and applied with the commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
#[cfg(test)]
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::NaiveDate;

use super::{LedgerStore, PlayerTxn, TxnWrites};
use crate::calendar::WeekId;
use crate::error::{LedgerError, StoreError};
use crate::ledger::{
    ActiveEntry, DailyScore, PayoutRow, PlayerId, PlayerProfile, WeekPool, sort_entries,
};

#[derive(Debug, Default)]
struct Inner {
    profiles: HashMap<PlayerId, PlayerProfile>,
    versions: HashMap<PlayerId, u64>,
    dailies: BTreeMap<(PlayerId, NaiveDate), DailyScore>,
    pools: HashMap<WeekId, WeekPool>,
    payouts: HashMap<WeekId, Vec<PayoutRow>>,
}

impl Inner {
    fn version(&self, player: PlayerId) -> u64 {
        self.versions.get(&player).copied().unwrap_or(0)
    }

    fn dailies_between(
        &self,
        player: PlayerId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BTreeMap<NaiveDate, DailyScore> {
        if from > to {
            return BTreeMap::new();
        }
        self.dailies
            .range((player, from)..=(player, to))
            .map(|((_, date), score)| (*date, score.clone()))
            .collect()
    }

    fn apply(&mut self, player: PlayerId, writes: TxnWrites) {
        if let Some(profile) = writes.profile {
            self.profiles.insert(player, profile);
        }
        for (date, score) in writes.dailies {
            self.dailies.insert((player, date), score);
        }
        if let Some((week, amount, sessions)) = writes.pool {
            let pool = self.pools.entry(week).or_default();
            pool.pool_total = pool.pool_total.saturating_add(amount);
            pool.sessions += sessions;
        }
        *self.versions.entry(player).or_insert(0) += 1;
    }
}

/// Ledger store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// Commits to fail with a conflict before behaving normally
    #[cfg(test)]
    forced_conflicts: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    /// Number of players with a profile
    pub fn player_count(&self) -> usize {
        self.lock().map(|inner| inner.profiles.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn force_conflicts(&self, commits: u32) {
        self.forced_conflicts.store(commits, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    #[cfg(not(test))]
    fn take_forced_conflict(&self) -> bool {
        false
    }
}

impl LedgerStore for MemoryStore {
    fn transact<T, F>(&self, player: PlayerId, week: Option<WeekId>, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut PlayerTxn) -> Result<T, LedgerError>,
    {
        let (version, mut txn) = {
            let inner = self.lock()?;
            let dailies = match week {
                Some(week) => {
                    let dates = week.dates();
                    inner.dailies_between(player, dates[0], dates[6])
                }
                None => BTreeMap::new(),
            };
            let pool = week
                .and_then(|w| inner.pools.get(&w).copied())
                .unwrap_or_default();
            let txn = PlayerTxn::begin(
                player,
                week,
                inner.profiles.get(&player).cloned(),
                dailies,
                pool,
            );
            (inner.version(player), txn)
        };

        let out = f(&mut txn)?;
        let writes = txn.into_writes();
        if writes.is_empty() {
            return Ok(out);
        }

        let mut inner = self.lock()?;
        if inner.version(player) != version || self.take_forced_conflict() {
            log::debug!("Stale commit for player {player} (snapshot v{version})");
            return Err(StoreError::Conflict(player).into());
        }
        inner.apply(player, writes);
        Ok(out)
    }

    fn profile(&self, player: PlayerId) -> Result<Option<PlayerProfile>, StoreError> {
        Ok(self.lock()?.profiles.get(&player).cloned())
    }

    fn daily_scores(
        &self,
        player: PlayerId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, DailyScore>, StoreError> {
        Ok(self.lock()?.dailies_between(player, from, to))
    }

    fn players_active_in(&self, week: WeekId) -> Result<Vec<ActiveEntry>, StoreError> {
        let inner = self.lock()?;
        let mut entries: Vec<ActiveEntry> = inner
            .profiles
            .values()
            .filter_map(|p| ActiveEntry::from_profile(p, week))
            .collect();
        drop(inner);
        sort_entries(&mut entries);
        Ok(entries)
    }

    fn week_pool(&self, week: WeekId) -> Result<WeekPool, StoreError> {
        Ok(self.lock()?.pools.get(&week).copied().unwrap_or_default())
    }

    fn payout_table(&self, week: WeekId) -> Result<Option<Vec<PayoutRow>>, StoreError> {
        Ok(self.lock()?.payouts.get(&week).cloned())
    }

    fn freeze_payouts(&self, week: WeekId, rows: &[PayoutRow]) -> Result<Vec<PayoutRow>, StoreError> {
        let mut inner = self.lock()?;
        Ok(inner
            .payouts
            .entry(week)
            .or_insert_with(|| rows.to_vec())
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Amount, PlayerIdentity};
    use crate::sim::Phase;
    use chrono::Utc;

    fn new_profile(id: u64) -> PlayerProfile {
        PlayerProfile::new(&PlayerIdentity::new(id), 2)
    }

    #[test]
    fn test_commit_and_read_back() {
        let store = MemoryStore::new();
        let week = WeekId::new(2025, 20);
        let monday = week.monday();
        store
            .transact(PlayerId(1), Some(week), |txn| {
                txn.profile_or_insert_with(|| new_profile(1));
                txn.put_daily(
                    monday,
                    DailyScore {
                        best_score: 30,
                        mode: Phase::Normal,
                        recorded_at: Utc::now(),
                    },
                )?;
                txn.contribute_to_pool(Amount::from_minor(10))
            })
            .unwrap();

        assert_eq!(store.profile(PlayerId(1)).unwrap().unwrap().lives_balance, 2);
        let dailies = store.daily_scores(PlayerId(1), monday, week.dates()[6]).unwrap();
        assert_eq!(dailies[&monday].best_score, 30);
        assert_eq!(store.week_pool(week).unwrap().pool_total, Amount::from_minor(10));
        // Other players' dailies are not visible
        assert!(store.daily_scores(PlayerId(2), monday, monday).unwrap().is_empty());
    }

    #[test]
    fn test_closure_error_writes_nothing() {
        let store = MemoryStore::new();
        let result: Result<(), _> = store.transact(PlayerId(1), None, |txn| {
            txn.profile_or_insert_with(|| new_profile(1));
            Err(LedgerError::InputRejected("nope".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.player_count(), 0);
    }

    #[test]
    fn test_stale_commit_conflicts() {
        let store = MemoryStore::new();
        let result = store.transact(PlayerId(1), None, |txn| {
            txn.profile_or_insert_with(|| new_profile(1));
            // Someone else commits for the same player meanwhile
            store.transact(PlayerId(1), None, |inner| {
                inner.profile_or_insert_with(|| new_profile(1)).lives_balance = 9;
                Ok(())
            })
        });
        assert!(matches!(
            result,
            Err(LedgerError::TransactionConflict { .. })
        ));
        assert_eq!(store.profile(PlayerId(1)).unwrap().unwrap().lives_balance, 9);
    }

    #[test]
    fn test_active_players_sorted() {
        let store = MemoryStore::new();
        let week = WeekId::new(2025, 20);
        for (id, score) in [(3u64, 50u64), (1, 50), (2, 90), (4, 0)] {
            store
                .transact(PlayerId(id), None, |txn| {
                    let p = txn.profile_or_insert_with(|| new_profile(id));
                    p.weekly_score = score;
                    p.last_active_week = Some(week);
                    Ok(())
                })
                .unwrap();
        }
        let ids: Vec<u64> = store
            .players_active_in(week)
            .unwrap()
            .iter()
            .map(|e| e.player.0)
            .collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_first_payout_table_wins() {
        let store = MemoryStore::new();
        let week = WeekId::new(2025, 20);
        assert_eq!(store.payout_table(week).unwrap(), None);

        let first = [PayoutRow {
            rank: 1,
            player: PlayerId(1),
            amount: Amount::from_minor(700),
        }];
        let second = [PayoutRow {
            rank: 1,
            player: PlayerId(2),
            amount: Amount::from_minor(900),
        }];
        assert_eq!(store.freeze_payouts(week, &first).unwrap(), first.to_vec());
        assert_eq!(store.freeze_payouts(week, &second).unwrap(), first.to_vec());
        assert_eq!(store.payout_table(week).unwrap(), Some(first.to_vec()));
        // An empty table still counts as frozen
        assert_eq!(store.freeze_payouts(week.next(), &[]).unwrap(), vec![]);
        assert_eq!(store.payout_table(week.next()).unwrap(), Some(vec![]));
    }
}
