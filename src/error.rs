//! Error types
//!
//! `LedgerError` is what callers of the ledger, ranking and payout layers
//! see. Storage backends speak `StoreError`; the ledger turns those into
//! `LedgerError` after its retry loop.

use thiserror::Error;

use crate::calendar::WeekId;
use crate::ledger::PlayerId;

/// User-facing failures of the economy layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Missing or malformed player input
    #[error("input rejected: {0}")]
    InputRejected(String),

    /// No lives left to start a session
    #[error("player {player} has no lives left")]
    InsufficientBalance { player: PlayerId },

    /// Concurrent writes kept invalidating the transaction
    #[error("ledger busy after {attempts} attempts, try again")]
    TransactionConflict { attempts: u32 },

    /// Outside the payout cutoff, no score, or week still open
    #[error("not eligible: {0}")]
    NotEligible(String),

    /// Reward for this week was already claimed (or is being claimed)
    #[error("reward for {week} already claimed")]
    AlreadyClaimed { week: WeekId },

    /// Payment collaborator failed; no claim was recorded
    #[error("transfer failed: {0}")]
    TransferFailure(String),

    /// Storage failed for a reason other than contention
    #[error("storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Whether repeating the same request could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::TransactionConflict { .. }
                | LedgerError::TransferFailure(_)
                | LedgerError::Storage(_)
        )
    }

    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InputRejected(_) => "input_rejected",
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::TransactionConflict { .. } => "transaction_conflict",
            LedgerError::NotEligible(_) => "not_eligible",
            LedgerError::AlreadyClaimed { .. } => "already_claimed",
            LedgerError::TransferFailure(_) => "transfer_failure",
            LedgerError::Storage(_) => "storage_error",
        }
    }
}

/// Storage backend failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The records changed between read and commit
    #[error("concurrent modification of player {0}")]
    Conflict(PlayerId),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("backend: {0}")]
    Backend(String),
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => LedgerError::TransactionConflict { attempts: 1 },
            other => LedgerError::Storage(other.to_string()),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Settings that cannot be used
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid setting: {0}")]
    Invalid(String),

    #[error("settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("settings file: {0}")]
    Io(#[from] std::io::Error),
}
