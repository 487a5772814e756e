//! Capsule lookup: a bounds-checked, read-only projection of ledger state.

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{VaultError, VaultResult};
use crate::ledger::LedgerReader;
use crate::timelock::{format_remaining, TimeLock};

/// A capsule as the conversation sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capsule {
    pub id: u64,
    pub creator: Address,
    pub content_id: String,
    pub unlock_timestamp: u64,
    pub created_at_timestamp: u64,
    pub unlocked: bool,
}

impl Capsule {
    /// Creator address shortened for display: `0xAbCd...1234`.
    pub fn short_creator(&self) -> String {
        shorten_address(&self.creator.to_string())
    }

    pub fn created_date(&self) -> String {
        format_timestamp(self.created_at_timestamp)
    }

    pub fn unlock_date(&self) -> String {
        format_timestamp(self.unlock_timestamp)
    }
}

/// First 6 and last 4 characters joined by an ellipsis.
pub fn shorten_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Human date for a unix timestamp, e.g. `Nov 14, 2023 22:13 UTC`.
pub fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .map(|dt| dt.format("%b %-d, %Y %H:%M UTC").to_string())
        .unwrap_or_else(|| format!("timestamp {}", secs))
}

/// Read one capsule, checking the id against the on-chain count first.
///
/// Never writes to the ledger. A missing handle means no wallet is connected.
pub async fn lookup_capsule<L>(ledger: Option<&L>, id: u64) -> VaultResult<Capsule>
where
    L: LedgerReader + ?Sized,
{
    let ledger = ledger.ok_or(VaultError::WalletNotConnected)?;

    let total = ledger.capsule_count().await?;
    if id >= total {
        debug!(capsule = id, total, "Capsule id out of range");
        return Err(VaultError::CapsuleNotFound { id, total });
    }

    let record = ledger.capsule(id).await?;
    Ok(Capsule {
        id,
        creator: record.creator,
        content_id: record.content_id,
        unlock_timestamp: record.unlock_timestamp,
        created_at_timestamp: record.created_at_timestamp,
        unlocked: record.unlocked,
    })
}

/// Check that a looked-up capsule can be claimed right now.
///
/// An unlocked capsule is refused without consulting the clock. Otherwise the
/// time-lock is evaluated against the latest block timestamp.
pub async fn ensure_claimable<L>(ledger: &L, capsule: &Capsule) -> VaultResult<()>
where
    L: LedgerReader + ?Sized,
{
    if capsule.unlocked {
        return Err(VaultError::AlreadyUnlocked { id: capsule.id });
    }

    let chain_time = ledger.chain_time().await?;
    match TimeLock::evaluate(capsule.unlock_timestamp, chain_time) {
        TimeLock::Dissolved => Ok(()),
        TimeLock::Remaining(secs) => Err(VaultError::TimeLocked {
            id: capsule.id,
            remaining: format_remaining(secs),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::MockLedger;
    use crate::ledger::LedgerWriter;

    #[test]
    fn test_shorten_address() {
        assert_eq!(
            shorten_address("0xAbCdEf0123456789aBcDeF0123456789AbCd1234"),
            "0xAbCd...1234"
        );
        assert_eq!(shorten_address("0x1234"), "0x1234");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(1_700_000_000), "Nov 14, 2023 22:13 UTC");
        assert_eq!(format_timestamp(u64::MAX), format!("timestamp {}", u64::MAX));
    }

    #[tokio::test]
    async fn test_lookup_without_wallet() {
        let result = lookup_capsule::<MockLedger>(None, 0).await;
        assert!(matches!(result, Err(VaultError::WalletNotConnected)));
    }

    #[tokio::test]
    async fn test_lookup_bounds() {
        let ledger = MockLedger::new(0);
        for i in 0..3 {
            ledger.add_capsule(&format!("bafy-{}", i), 10, "pw");
        }
        let reader: &dyn LedgerReader = &ledger;

        let last = lookup_capsule(Some(reader), 2).await.unwrap();
        assert_eq!(last.id, 2);
        assert_eq!(last.content_id, "bafy-2");
        assert!(!last.unlocked);

        for id in [3, 4, 100, u64::MAX] {
            let result = lookup_capsule(Some(reader), id).await;
            assert!(
                matches!(result, Err(VaultError::CapsuleNotFound { total: 3, .. })),
                "id {} should be out of range",
                id
            );
        }
    }

    #[tokio::test]
    async fn test_unlocked_flag_is_sticky() {
        let ledger = MockLedger::new(100);
        let id = ledger.add_capsule("bafy-x", 10, "right");
        ledger.unlock(id, "right").await.unwrap();
        let reader: &dyn LedgerReader = &ledger;

        for _ in 0..3 {
            let _ = ledger.unlock(id, "anything").await;
            let capsule = lookup_capsule(Some(reader), id).await.unwrap();
            assert!(capsule.unlocked);
        }
    }

    #[tokio::test]
    async fn test_projection_display_fields() {
        let ledger = MockLedger::new(0);
        let id = ledger.add_capsule("bafy-y", 10, "pw");
        let reader: &dyn LedgerReader = &ledger;
        let capsule = lookup_capsule(Some(reader), id).await.unwrap();
        assert!(capsule.short_creator().contains("..."));
        assert_eq!(capsule.short_creator().len(), 13);
        assert_eq!(capsule.created_date(), "Nov 14, 2023 22:13 UTC");
    }

    #[tokio::test]
    async fn test_ensure_claimable() {
        let ledger = MockLedger::new(10_000);
        let ready = ledger.add_capsule("bafy-ready", 9_000, "pw");
        let locked = ledger.add_capsule("bafy-locked", 10_000 + 90_000, "pw");
        let reader: &dyn LedgerReader = &ledger;

        let capsule = lookup_capsule(Some(reader), ready).await.unwrap();
        assert!(ensure_claimable(reader, &capsule).await.is_ok());

        let capsule = lookup_capsule(Some(reader), locked).await.unwrap();
        match ensure_claimable(reader, &capsule).await {
            Err(VaultError::TimeLocked { id, remaining }) => {
                assert_eq!(id, locked);
                assert_eq!(remaining, "1 day, 1 hour");
            }
            other => panic!("expected time lock, got {:?}", other),
        }

        ledger.unlock(ready, "pw").await.unwrap();
        let capsule = lookup_capsule(Some(reader), ready).await.unwrap();
        assert!(matches!(
            ensure_claimable(reader, &capsule).await,
            Err(VaultError::AlreadyUnlocked { .. })
        ));
    }
}
