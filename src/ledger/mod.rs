//! Score ledger
//!
//! Settles finished sessions into daily bests and weekly aggregates, gates
//! new sessions on lives, and feeds the weekly reward pool. Every operation
//! is one per-player transaction against a `LedgerStore`, retried a bounded
//! number of times when a concurrent writer wins the race.

mod types;
mod views;

pub use types::{
    ActiveEntry, Amount, ClaimRecord, ClaimState, DailyScore, DayStat, PayoutRow, PlayerId,
    PlayerIdentity, PlayerProfile, ProfileSummary, WeekPool, sort_entries,
};

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::calendar::{Calendar, SystemCalendar, WeekId};
use crate::error::LedgerError;
use crate::persistence::{LedgerStore, PlayerTxn};
use crate::settings::{EconomyConfig, PoolPolicy, WeeklyAggregation};
use crate::sim::Phase;

/// Outcome of settling one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    /// A new daily best was written
    pub daily_best_updated: bool,
    /// Change applied to the weekly aggregate of the session's week
    pub weekly_delta: u64,
}

/// Receipt for a started session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionTicket {
    pub week: WeekId,
    pub lives_remaining: u32,
    /// Pool of the week after this session's contribution
    pub pool_total: Amount,
}

/// Ledger over a store
pub struct Ledger<S> {
    store: S,
    config: EconomyConfig,
    calendar: Box<dyn Calendar>,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: S, config: EconomyConfig) -> Self {
        Self::with_calendar(store, config, SystemCalendar)
    }

    /// Ledger whose notion of "today" comes from `calendar`
    pub fn with_calendar(store: S, config: EconomyConfig, calendar: impl Calendar + 'static) -> Self {
        Self {
            store,
            config,
            calendar: Box::new(calendar),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.calendar.today()
    }

    pub fn current_week(&self) -> WeekId {
        self.calendar.current_week()
    }

    /// Only the current week takes new results and sessions. Earlier weeks
    /// are closed so their standings stay put while rewards are claimed.
    fn check_week_open(&self, week: WeekId) -> Result<(), LedgerError> {
        let current = self.current_week();
        if week < current {
            return Err(LedgerError::InputRejected(format!(
                "{week} is closed (current week {current})"
            )));
        }
        if week > current {
            return Err(LedgerError::InputRejected(format!(
                "{week} has not started (current week {current})"
            )));
        }
        Ok(())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    /// Run a store transaction, retrying on conflict
    pub(crate) fn transact<T>(
        &self,
        player: PlayerId,
        week: Option<WeekId>,
        mut f: impl FnMut(&mut PlayerTxn) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let max_attempts = self.config.max_txn_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.store.transact(player, week, &mut f) {
                Err(LedgerError::TransactionConflict { .. }) if attempt < max_attempts => {
                    log::warn!(
                        "Ledger conflict for player {player}, retrying ({attempt}/{max_attempts})"
                    );
                    attempt += 1;
                }
                Err(LedgerError::TransactionConflict { .. }) => {
                    log::warn!("Ledger conflict for player {player}, giving up after {attempt} attempts");
                    return Err(LedgerError::TransactionConflict { attempts: attempt });
                }
                other => return other,
            }
        }
    }

    /// Settle a finished session into the ledger.
    ///
    /// Nothing changes when `score` does not beat the player's best for
    /// `date`. Otherwise the daily best is raised and the aggregate of the
    /// date's week is updated, archiving the previous live week first when
    /// the week moved on. `date` must fall in the current week.
    pub fn record_session_result(
        &self,
        identity: &PlayerIdentity,
        score: u32,
        mode: Phase,
        date: NaiveDate,
    ) -> Result<SessionRecord, LedgerError> {
        identity.validate()?;
        let week = WeekId::from_date(date);
        self.check_week_open(week)?;
        let starting_lives = self.config.starting_lives;
        let aggregation = self.config.aggregation;

        let record = self.transact(identity.id, Some(week), |txn| {
            let previous_best = txn.daily(date).map(|d| d.best_score);
            if previous_best.is_some_and(|best| score <= best) {
                // Identity refresh only; no score mutation
                if txn.profile().is_some_and(|p| p.identity_stale(identity))
                    && let Some(profile) = txn.profile_mut()
                {
                    profile.refresh_identity(identity);
                }
                return Ok(SessionRecord {
                    daily_best_updated: false,
                    weekly_delta: 0,
                });
            }

            txn.put_daily(
                date,
                DailyScore {
                    best_score: score,
                    mode,
                    recorded_at: Utc::now(),
                },
            )?;
            let week_total: u64 = txn.week_dailies().map(|(_, d)| d.best_score as u64).sum();
            let improvement = (score - previous_best.unwrap_or(0)) as u64;

            let profile = txn.profile_or_insert_with(|| PlayerProfile::new(identity, starting_lives));
            profile.refresh_identity(identity);
            let weekly_delta =
                apply_to_aggregate(profile, week, improvement, week_total, aggregation);

            Ok(SessionRecord {
                daily_best_updated: true,
                weekly_delta,
            })
        })?;

        if record.daily_best_updated {
            log::info!(
                "Player {} scored {score} on {date} ({week} +{})",
                identity.id,
                record.weekly_delta
            );
        } else {
            log::debug!("Player {} score {score} on {date} is not a new best", identity.id);
        }
        Ok(record)
    }

    /// Consume one life and credit the week's pool (dynamic policy).
    ///
    /// Fails closed: without a life nothing is written.
    pub fn start_session(
        &self,
        identity: &PlayerIdentity,
        date: NaiveDate,
    ) -> Result<SessionTicket, LedgerError> {
        identity.validate()?;
        let week = WeekId::from_date(date);
        self.check_week_open(week)?;
        let starting_lives = self.config.starting_lives;
        let contribution = match &self.config.pool {
            PoolPolicy::Dynamic { per_session } => Some(*per_session),
            PoolPolicy::Fixed { .. } => None,
        };

        let ticket = self.transact(identity.id, Some(week), |txn| {
            let profile = txn.profile_or_insert_with(|| PlayerProfile::new(identity, starting_lives));
            if profile.lives_balance == 0 {
                return Err(LedgerError::InsufficientBalance { player: identity.id });
            }
            profile.lives_balance -= 1;
            let lives_remaining = profile.lives_balance;
            if let Some(amount) = contribution {
                txn.contribute_to_pool(amount)?;
            }
            Ok(SessionTicket {
                week,
                lives_remaining,
                pool_total: txn.pool().pool_total,
            })
        })?;

        log::info!(
            "Session started for player {} ({} lives left)",
            identity.id,
            ticket.lives_remaining
        );
        Ok(ticket)
    }

    /// Credit purchased lives; a purchase reference is only credited once
    pub fn credit_lives(
        &self,
        identity: &PlayerIdentity,
        lives: u32,
        purchase_ref: &str,
    ) -> Result<u32, LedgerError> {
        identity.validate()?;
        let purchase_ref = purchase_ref.trim();
        if lives == 0 || purchase_ref.is_empty() {
            return Err(LedgerError::InputRejected(
                "a purchase needs lives and a reference".into(),
            ));
        }
        let starting_lives = self.config.starting_lives;

        self.transact(identity.id, None, |txn| {
            let profile = txn.profile_or_insert_with(|| PlayerProfile::new(identity, starting_lives));
            if profile.credited_purchases.insert(purchase_ref.to_string()) {
                profile.lives_balance = profile.lives_balance.saturating_add(lives);
                log::info!(
                    "Credited {lives} lives to player {} ({purchase_ref})",
                    identity.id
                );
            } else {
                log::debug!("Purchase {purchase_ref} already credited");
            }
            Ok(profile.lives_balance)
        })
    }

    /// Set the payout destination of a player
    pub fn link_wallet(&self, identity: &PlayerIdentity, address: &str) -> Result<(), LedgerError> {
        identity.validate()?;
        let address = address.trim();
        if address.is_empty() || address.chars().any(char::is_whitespace) {
            return Err(LedgerError::InputRejected(format!(
                "invalid wallet address {address:?}"
            )));
        }
        let starting_lives = self.config.starting_lives;
        self.transact(identity.id, None, |txn| {
            let profile = txn.profile_or_insert_with(|| PlayerProfile::new(identity, starting_lives));
            profile.wallet_address = Some(address.to_string());
            Ok(())
        })
    }

    /// Rebuild the aggregate of `week` from the stored daily bests.
    ///
    /// Only touches the live or archived aggregate that belongs to `week`.
    /// Returns the resulting score, or `None` when `week` is neither.
    pub fn recompute_weekly(
        &self,
        player: PlayerId,
        week: WeekId,
    ) -> Result<Option<u64>, LedgerError> {
        self.transact(player, Some(week), |txn| {
            let total: u64 = txn.week_dailies().map(|(_, d)| d.best_score as u64).sum();
            let Some(profile) = txn.profile() else {
                return Ok(None);
            };
            if profile.score_for_week(week) == Some(total) {
                return Ok(Some(total));
            }
            let Some(profile) = txn.profile_mut() else {
                return Ok(None);
            };
            if profile.last_active_week == Some(week) {
                profile.weekly_score = total;
            } else if profile.previous_active_week == Some(week) {
                profile.previous_weekly_score = total;
            } else {
                return Ok(None);
            }
            log::warn!("Repaired {week} aggregate of player {player} to {total}");
            Ok(Some(total))
        })
    }
}

/// Fold one daily improvement into the weekly aggregate.
///
/// `improvement` is the raise of one daily best, `week_total` the sum of the
/// week's daily bests after the raise. Returns the change of the aggregate.
fn apply_to_aggregate(
    profile: &mut PlayerProfile,
    week: WeekId,
    improvement: u64,
    week_total: u64,
    aggregation: WeeklyAggregation,
) -> u64 {
    let next = |current: u64| match aggregation {
        WeeklyAggregation::Summation => week_total,
        WeeklyAggregation::Incremental => current + improvement,
    };

    match profile.last_active_week {
        Some(live) if live == week => {
            let before = profile.weekly_score;
            profile.weekly_score = next(before);
            profile.weekly_score.saturating_sub(before)
        }
        Some(live) if week < live => {
            // Only reachable when the calendar went backwards; closed weeks stay frozen
            log::warn!(
                "Player {} result for {week} is older than live week {live}, aggregate unchanged",
                profile.id
            );
            0
        }
        _ => {
            if let Some(live) = profile.last_active_week {
                log::debug!(
                    "Archiving {live} ({}) for player {}",
                    profile.weekly_score,
                    profile.id
                );
                profile.previous_weekly_score = profile.weekly_score;
                profile.previous_active_week = Some(live);
            }
            profile.last_active_week = Some(week);
            profile.weekly_score = next(0);
            profile.weekly_score
        }
    }
}
