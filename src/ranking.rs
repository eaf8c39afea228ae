//! Weekly standings and reward distribution
//!
//! Standings are a read-only scan of the week's aggregates. Rewards are
//! integer shares of the week's pool, floored to the minor unit, so the
//! paid total never exceeds the pool.
//!
//! Once a week has closed its rewards are frozen into a payout table the
//! first time anyone asks for them. Claims and the leaderboard read that
//! table, never the live standings.

use serde::Serialize;

use crate::calendar::WeekId;
use crate::error::LedgerError;
use crate::ledger::{
    ActiveEntry, Amount, Ledger, PayoutRow, PlayerId, WeekPool, sort_entries,
};
use crate::persistence::LedgerStore;
use crate::settings::{PoolPolicy, RewardPolicy};

/// A ranked player in one week
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    /// 1-based
    pub rank: usize,
    pub player: PlayerId,
    pub score: u64,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Row of the public leaderboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    #[serde(flatten)]
    pub standing: Standing,
    /// Reward the rank earns; only set once the week is closed
    pub projected_reward: Option<Amount>,
}

/// Assign ranks in score order (ties by ascending player id)
pub fn rank_entries(mut entries: Vec<ActiveEntry>) -> Vec<Standing> {
    entries.retain(|e| e.score > 0);
    sort_entries(&mut entries);
    entries
        .into_iter()
        .enumerate()
        .map(|(i, e)| Standing {
            rank: i + 1,
            player: e.player,
            score: e.score,
            display_name: e.display_name,
            avatar_url: e.avatar_url,
        })
        .collect()
}

/// Pool a week pays out under `policy`
pub fn pool_total(policy: &PoolPolicy, pool: WeekPool) -> Amount {
    match policy {
        PoolPolicy::Dynamic { .. } => pool.pool_total,
        PoolPolicy::Fixed { amount } => *amount,
    }
}

/// Rewards of the leading standings, in rank order.
///
/// The result covers only the first `ranks` standings, and for fixed tiers
/// at most one per tier.
pub fn distribute(
    pool: Amount,
    policy: &RewardPolicy,
    ranks: usize,
    standings: &[Standing],
) -> Vec<Amount> {
    let cohort = &standings[..standings.len().min(ranks)];
    match policy {
        RewardPolicy::FixedTier { tiers_bps } => cohort
            .iter()
            .zip(tiers_bps)
            .map(|(_, bps)| pool.basis_points(*bps))
            .collect(),
        RewardPolicy::Proportional => {
            let total: u64 = cohort.iter().map(|s| s.score).sum();
            cohort
                .iter()
                .map(|s| pool.fraction(s.score, total))
                .collect()
        }
    }
}

impl<S: LedgerStore> Ledger<S> {
    /// Players with a non-zero score for `week`, best first
    pub fn compute_standings(&self, week: WeekId) -> Result<Vec<Standing>, LedgerError> {
        let entries = self.store().players_active_in(week)?;
        Ok(rank_entries(entries))
    }

    pub fn reward_pool(&self, week: WeekId) -> Result<Amount, LedgerError> {
        Ok(pool_total(&self.config().pool, self.store().week_pool(week)?))
    }

    /// Standings of `week` paired with the reward each paid rank earns
    pub fn payouts(&self, week: WeekId) -> Result<Vec<(Standing, Amount)>, LedgerError> {
        let standings = self.compute_standings(week)?;
        let rewards = distribute(
            self.reward_pool(week)?,
            &self.config().reward,
            self.config().eligible_ranks(),
            &standings,
        );
        Ok(standings.into_iter().zip(rewards).collect())
    }

    /// Payout table of a closed week.
    ///
    /// The first call after the week closes computes it from the standings
    /// and stores it; later calls return the stored rows unchanged.
    pub fn payout_table(&self, week: WeekId) -> Result<Vec<PayoutRow>, LedgerError> {
        if week >= self.current_week() {
            return Err(LedgerError::NotEligible(format!("{week} has not closed yet")));
        }
        if let Some(rows) = self.store().payout_table(week)? {
            return Ok(rows);
        }
        let rows: Vec<PayoutRow> = self
            .payouts(week)?
            .into_iter()
            .map(|(standing, amount)| PayoutRow {
                rank: standing.rank,
                player: standing.player,
                amount,
            })
            .collect();
        let frozen = self.store().freeze_payouts(week, &rows)?;
        log::info!("Froze {} payout rows for {week}", frozen.len());
        Ok(frozen)
    }

    /// Reward `player` earned in `week`.
    ///
    /// Closed weeks answer from the frozen payout table. The current week
    /// gets a projection from the live standings.
    pub fn compute_reward(&self, week: WeekId, player: PlayerId) -> Result<Amount, LedgerError> {
        if week < self.current_week() {
            let table = self.payout_table(week)?;
            return match table.iter().find(|row| row.player == player) {
                Some(row) if !row.amount.is_zero() => Ok(row.amount),
                Some(row) => Err(LedgerError::NotEligible(format!(
                    "rank {} in {week} earns nothing from this pool",
                    row.rank
                ))),
                None => Err(LedgerError::NotEligible(format!(
                    "player {player} holds no paid rank in {week}"
                ))),
            };
        }

        let standings = self.compute_standings(week)?;
        let Some(standing) = standings.iter().find(|s| s.player == player) else {
            return Err(LedgerError::NotEligible(format!(
                "player {player} has no score in {week}"
            )));
        };
        let rank = standing.rank;
        let rewards = distribute(
            self.reward_pool(week)?,
            &self.config().reward,
            self.config().eligible_ranks(),
            &standings,
        );
        match rewards.get(rank - 1) {
            Some(amount) if !amount.is_zero() => Ok(*amount),
            Some(_) => Err(LedgerError::NotEligible(format!(
                "rank {rank} in {week} earns nothing from this pool"
            ))),
            None => Err(LedgerError::NotEligible(format!(
                "rank {rank} in {week} is outside the paid top {}",
                rewards.len()
            ))),
        }
    }

    /// Top `limit` standings of `week`, with rewards once the week is over
    pub fn leaderboard(
        &self,
        week: WeekId,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, LedgerError> {
        let table = if week < self.current_week() {
            self.payout_table(week)?
        } else {
            Vec::new()
        };
        Ok(self
            .compute_standings(week)?
            .into_iter()
            .take(limit)
            .map(|standing| LeaderboardEntry {
                projected_reward: table
                    .iter()
                    .find(|row| row.player == standing.player)
                    .map(|row| row.amount),
                standing,
            })
            .collect())
    }
}
