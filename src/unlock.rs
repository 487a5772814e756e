//! Unlock execution and revert classification.
//!
//! A successful unlock flips the capsule's `unlocked` flag on chain before the
//! payload is ever decrypted. There is no way back from that.

use tracing::{info, warn};

use crate::error::{LedgerError, RevertKind, VaultError, VaultResult};
use crate::ledger::{LedgerWriter, UnlockReceipt};

/// Classify a free-text revert reason.
///
/// This is a substring heuristic and nothing more. A reason that happens to
/// contain "revert" for some unrelated cause is classified as a wrong
/// password. Decoded custom errors from the contract ABI bypass this function.
///
/// Checks run most-specific first so "execution reverted: already unlocked"
/// is not taken for a generic revert.
pub fn classify_revert(reason: &str) -> RevertKind {
    let reason = reason.to_lowercase();

    if reason.contains("already") {
        return RevertKind::AlreadyUnlocked;
    }

    let too_early = ["too early", "not yet", "still locked", "stilllocked", "time lock", "timelock"];
    if too_early.iter().any(|needle| reason.contains(needle)) {
        return RevertKind::TooEarly;
    }

    let wrong_password = ["password", "incorrect", "invalid", "revert"];
    if wrong_password.iter().any(|needle| reason.contains(needle)) {
        return RevertKind::WrongPassword;
    }

    RevertKind::Unknown
}

/// Submit the unlock transaction and wait for it to land.
pub async fn execute_unlock<L>(ledger: Option<&L>, id: u64, password: &str) -> VaultResult<UnlockReceipt>
where
    L: LedgerWriter + ?Sized,
{
    let ledger = ledger.ok_or(VaultError::WalletNotConnected)?;

    match ledger.unlock(id, password).await {
        Ok(receipt) => {
            info!(capsule = id, tx = %receipt.tx_hash, "Capsule unlocked on chain");
            Ok(receipt)
        }
        Err(LedgerError::Revert { reason, kind }) => {
            let kind = kind.unwrap_or_else(|| classify_revert(&reason));
            warn!(capsule = id, ?kind, "Unlock reverted: {}", reason);
            Err(VaultError::ContractRevert { kind, reason })
        }
        Err(LedgerError::Transport(reason)) => {
            warn!(capsule = id, "Unlock failed before reaching the contract: {}", reason);
            Err(VaultError::Unknown(reason))
        }
    }
}
