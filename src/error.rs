//! Failure taxonomy for the unlock protocol.
//!
//! Every failure a turn can hit is one of these variants. The conversation
//! layer converts them into user-facing narration; none of them escape a turn.

use thiserror::Error;

/// Category of an on-chain unlock revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertKind {
    WrongPassword,
    TooEarly,
    AlreadyUnlocked,
    Unknown,
}

impl RevertKind {
    /// Only a wrong password leaves the capsule claimable in the same turn state.
    pub fn is_retryable(self) -> bool {
        matches!(self, RevertKind::WrongPassword)
    }
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("no wallet connected")]
    WalletNotConnected,

    #[error("no capsule id found in input")]
    InvalidInput,

    #[error("capsule {id} does not exist ({total} capsules on chain)")]
    CapsuleNotFound { id: u64, total: u64 },

    #[error("capsule {id} has already been unlocked")]
    AlreadyUnlocked { id: u64 },

    #[error("capsule {id} is still time-locked for {remaining}")]
    TimeLocked { id: u64, remaining: String },

    #[error("unlock reverted ({kind:?}): {reason}")]
    ContractRevert { kind: RevertKind, reason: String },

    #[error("failed to fetch {content_id} from storage: {reason}")]
    StorageFetchFailure { content_id: String, reason: String },

    /// The unlock transaction succeeded but the payload did not open.
    /// The capsule is now permanently flagged unlocked on chain.
    #[error("capsule {id} was unlocked on chain but its payload could not be decrypted")]
    DecryptionFailure { id: u64 },

    #[error("{0}")]
    Unknown(String),
}

/// Errors surfaced by a ledger handle.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The contract rejected the call. `kind` is set when the revert decoded
    /// to a known custom error rather than a bare reason string.
    #[error("execution reverted: {reason}")]
    Revert {
        reason: String,
        kind: Option<RevertKind>,
    },

    #[error("ledger transport error: {0}")]
    Transport(String),
}

impl From<LedgerError> for VaultError {
    fn from(err: LedgerError) -> Self {
        VaultError::Unknown(err.to_string())
    }
}

pub type VaultResult<T> = std::result::Result<T, VaultError>;
