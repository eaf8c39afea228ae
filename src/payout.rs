//! Reward claims
//!
//! A claim is settled in three steps so that the external transfer never
//! runs inside a ledger transaction:
//! 1. reserve: eligibility and idempotency are checked and a `Reserved`
//!    claim is written in one transaction
//! 2. transfer: the payment collaborator is called under a timeout
//! 3. settle: the claim becomes `Paid` and lifetime earnings grow. A
//!    rejected transfer removes the reservation again. A timed-out one
//!    leaves the claim `Unconfirmed`, since the money may have moved.
//!
//! A second claim for the same week sees the existing record and is
//! rejected with `AlreadyClaimed`, whatever state the first one is in.
//!
//! The amount comes from the week's frozen payout table. That table never
//! changes once written, so reading it ahead of the reservation gives the
//! same answer the reservation itself would.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::calendar::WeekId;
use crate::error::LedgerError;
use crate::ledger::{Amount, ClaimRecord, ClaimState, Ledger, PlayerId};
use crate::persistence::LedgerStore;

/// Proof of a completed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    pub tx_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("transfer rejected: {0}")]
    Rejected(String),

    #[error("payment service unavailable: {0}")]
    Unavailable(String),

    #[error("transfer timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
}

impl From<TransferError> for LedgerError {
    fn from(e: TransferError) -> Self {
        LedgerError::TransferFailure(e.to_string())
    }
}

/// Payment collaborator
pub trait PaymentGateway: Send + Sync {
    /// Move `amount` to `destination`
    fn transfer(
        &self,
        destination: &str,
        amount: Amount,
    ) -> impl Future<Output = Result<TransferReceipt, TransferError>> + Send;
}

/// A paid claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimReceipt {
    pub player: PlayerId,
    pub week: WeekId,
    pub amount: Amount,
    pub tx_ref: String,
}

/// Pay `player` the reward earned in `week`.
///
/// Only closed weeks can be claimed, and only once. Requires a linked
/// wallet.
pub async fn claim_reward<S, G>(
    ledger: &Ledger<S>,
    gateway: &G,
    player: PlayerId,
    week: WeekId,
) -> Result<ClaimReceipt, LedgerError>
where
    S: LedgerStore,
    G: PaymentGateway,
{
    if week >= ledger.current_week() {
        return Err(LedgerError::NotEligible(format!("{week} is still open")));
    }

    // Cheap rejections before scanning standings
    let Some(profile) = ledger.store().profile(player)? else {
        return Err(LedgerError::NotEligible(format!("player {player} is unknown")));
    };
    check_claimable(&profile.claims, profile.wallet_address.as_deref(), week)?;

    let amount = ledger.compute_reward(week, player)?;

    // 1. reserve
    let destination = ledger.transact(player, None, |txn| {
        let Some(profile) = txn.profile_mut() else {
            return Err(LedgerError::NotEligible(format!("player {player} is unknown")));
        };
        let wallet = check_claimable(&profile.claims, profile.wallet_address.as_deref(), week)?;
        profile.claims.insert(
            week,
            ClaimRecord {
                amount,
                state: ClaimState::Reserved,
            },
        );
        Ok(wallet)
    });
    let destination = match destination {
        Ok(d) => d,
        Err(e) => {
            log::warn!("Claim of {week} by player {player} rejected: {e}");
            return Err(e);
        }
    };

    // 2. transfer
    let timeout_ms = ledger.config().transfer_timeout_ms;
    let transfer = tokio::time::timeout(
        Duration::from_millis(timeout_ms),
        gateway.transfer(&destination, amount),
    )
    .await
    .unwrap_or(Err(TransferError::Timeout {
        after_ms: timeout_ms,
    }));

    // 3. settle
    match transfer {
        Ok(receipt) => {
            let settled = ledger.transact(player, None, |txn| {
                let Some(profile) = txn.profile_mut() else {
                    return Err(LedgerError::Storage(format!("player {player} vanished")));
                };
                profile.claims.insert(
                    week,
                    ClaimRecord {
                        amount,
                        state: ClaimState::Paid {
                            tx_ref: receipt.tx_ref.clone(),
                        },
                    },
                );
                profile.lifetime_earnings = profile.lifetime_earnings.saturating_add(amount);
                Ok(())
            });
            if let Err(e) = settled {
                // Money moved; the reservation stays and blocks a second payout
                log::error!(
                    "Paid {amount} to player {player} for {week} ({}) but could not record it: {e}",
                    receipt.tx_ref
                );
            } else {
                log::info!(
                    "Paid {amount} to player {player} for {week} ({})",
                    receipt.tx_ref
                );
            }
            Ok(ClaimReceipt {
                player,
                week,
                amount,
                tx_ref: receipt.tx_ref,
            })
        }
        Err(transfer_err @ TransferError::Timeout { .. }) => {
            log::error!(
                "Transfer of {amount} to player {player} for {week} timed out; claim left unconfirmed"
            );
            let marked = ledger.transact(player, None, |txn| {
                if let Some(profile) = txn.profile_mut()
                    && let Some(claim) = profile.claims.get_mut(&week)
                    && claim.state == ClaimState::Reserved
                {
                    claim.state = ClaimState::Unconfirmed;
                }
                Ok(())
            });
            if let Err(e) = marked {
                // Still reserved, which blocks a second payout just the same
                log::error!("Could not mark claim of {week} for player {player} unconfirmed: {e}");
            }
            Err(transfer_err.into())
        }
        Err(transfer_err) => {
            log::warn!("Transfer for player {player}, {week} failed: {transfer_err}; releasing claim");
            let released = ledger.transact(player, None, |txn| {
                if let Some(profile) = txn.profile_mut()
                    && matches!(
                        profile.claims.get(&week).map(|c| &c.state),
                        Some(ClaimState::Reserved)
                    )
                {
                    profile.claims.remove(&week);
                }
                Ok(())
            });
            if let Err(e) = released {
                log::error!("Could not release claim of {week} for player {player}: {e}");
            }
            Err(transfer_err.into())
        }
    }
}

/// Idempotency and destination checks shared by the pre-check and the
/// reservation. Returns the payout destination.
fn check_claimable(
    claims: &std::collections::BTreeMap<WeekId, ClaimRecord>,
    wallet: Option<&str>,
    week: WeekId,
) -> Result<String, LedgerError> {
    if claims.contains_key(&week) {
        return Err(LedgerError::AlreadyClaimed { week });
    }
    wallet
        .map(str::to_string)
        .ok_or_else(|| LedgerError::InputRejected("no wallet linked".into()))
}
