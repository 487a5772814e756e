//! Ledger access for time capsules.
//!
//! The contract is reached through alloy. Reads and the unlock write sit
//! behind the `LedgerReader` / `LedgerWriter` traits so the conversation can
//! run against any chain handle (or none, when no wallet is connected).

use alloy::eips::BlockNumberOrTag;
use alloy::network::EthereumWallet;
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{LedgerError, RevertKind};

/// Environment variable that overrides the wallet key file
pub const PRIVATE_KEY_ENV: &str = "CHRONOVAULT_PRIVATE_KEY";

sol! {
    #[sol(rpc)]
    interface ITimeCapsule {
        struct Capsule {
            address creator;
            string cid;
            uint64 unlockTime;
            uint64 createdAt;
            bool unlocked;
        }

        error IncorrectPassword();
        error StillLocked(uint64 unlockTime);
        error AlreadyUnlocked();

        function getCapsuleCount() external view returns (uint256);
        function getCapsule(uint256 id) external view returns (Capsule memory);
        function unlockCapsule(uint256 id, string calldata password) external;
    }
}

/// Raw capsule state as stored on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapsuleRecord {
    pub creator: Address,
    pub content_id: String,
    pub unlock_timestamp: u64,
    pub created_at_timestamp: u64,
    pub unlocked: bool,
}

/// Proof that an unlock transaction landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockReceipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn capsule_count(&self) -> Result<u64, LedgerError>;

    async fn capsule(&self, id: u64) -> Result<CapsuleRecord, LedgerError>;

    /// Timestamp of the latest block. This is the only clock time-locks are checked against.
    async fn chain_time(&self) -> Result<u64, LedgerError>;
}

#[async_trait]
pub trait LedgerWriter: Send + Sync {
    /// Submit `unlockCapsule(id, password)` and wait for the receipt.
    async fn unlock(&self, id: u64, password: &str) -> Result<UnlockReceipt, LedgerError>;
}

/// A connected chain handle that can both read and submit unlocks.
pub trait Ledger: LedgerReader + LedgerWriter {}

impl<T: LedgerReader + LedgerWriter> Ledger for T {}

/// Time capsule contract on an EVM chain, signed by a local key.
pub struct EvmLedger {
    provider: DynProvider,
    contract: Address,
    account: Address,
}

impl std::fmt::Debug for EvmLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmLedger")
            .field("contract", &self.contract)
            .field("account", &self.account)
            .finish()
    }
}

impl EvmLedger {
    pub fn connect(rpc_url: &str, contract_address: &str, signer: PrivateKeySigner) -> Result<Self> {
        let url = rpc_url
            .parse()
            .map_err(|e| anyhow!("Invalid RPC URL {}: {}", rpc_url, e))?;
        let contract = Address::from_str(contract_address)
            .with_context(|| format!("Invalid contract address: {}", contract_address))?;
        let account = signer.address();

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();

        info!(%contract, %account, "Connected to time capsule contract");

        Ok(Self {
            provider,
            contract,
            account,
        })
    }

    pub fn account(&self) -> Address {
        self.account
    }

    fn instance(&self) -> ITimeCapsule::ITimeCapsuleInstance<&DynProvider> {
        ITimeCapsule::new(self.contract, &self.provider)
    }
}

/// Map a decoded custom error onto a revert category.
fn decoded_revert_kind(err: &alloy::contract::Error) -> Option<RevertKind> {
    use ITimeCapsule::ITimeCapsuleErrors as E;

    err.as_decoded_interface_error::<E>().map(|decoded| match decoded {
        E::IncorrectPassword(_) => RevertKind::WrongPassword,
        E::StillLocked(_) => RevertKind::TooEarly,
        E::AlreadyUnlocked(_) => RevertKind::AlreadyUnlocked,
    })
}

fn contract_error(err: alloy::contract::Error) -> LedgerError {
    if let Some(kind) = decoded_revert_kind(&err) {
        return LedgerError::Revert {
            reason: err.to_string(),
            kind: Some(kind),
        };
    }

    let reason = err.to_string();
    if reason.to_lowercase().contains("revert") {
        LedgerError::Revert { reason, kind: None }
    } else {
        LedgerError::Transport(reason)
    }
}

#[async_trait]
impl LedgerReader for EvmLedger {
    async fn capsule_count(&self) -> Result<u64, LedgerError> {
        let count = self
            .instance()
            .getCapsuleCount()
            .call()
            .await
            .map_err(contract_error)?;
        Ok(count.saturating_to::<u64>())
    }

    async fn capsule(&self, id: u64) -> Result<CapsuleRecord, LedgerError> {
        let capsule = self
            .instance()
            .getCapsule(U256::from(id))
            .call()
            .await
            .map_err(contract_error)?;

        Ok(CapsuleRecord {
            creator: capsule.creator,
            content_id: capsule.cid,
            unlock_timestamp: capsule.unlockTime,
            created_at_timestamp: capsule.createdAt,
            unlocked: capsule.unlocked,
        })
    }

    async fn chain_time(&self) -> Result<u64, LedgerError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?
            .ok_or_else(|| LedgerError::Transport("latest block unavailable".to_string()))?;

        Ok(block.header.timestamp)
    }
}

#[async_trait]
impl LedgerWriter for EvmLedger {
    async fn unlock(&self, id: u64, password: &str) -> Result<UnlockReceipt, LedgerError> {
        let pending = self
            .instance()
            .unlockCapsule(U256::from(id), password.to_string())
            .send()
            .await
            .map_err(contract_error)?;

        debug!(tx = ?pending.tx_hash(), capsule = id, "Unlock transaction submitted");

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        if !receipt.status() {
            return Err(LedgerError::Revert {
                reason: format!("transaction {:?} reverted", receipt.transaction_hash),
                kind: None,
            });
        }

        Ok(UnlockReceipt {
            tx_hash: format!("{:?}", receipt.transaction_hash),
            block_number: receipt.block_number,
        })
    }
}

/// Load the wallet signer from the environment or a key file.
///
/// Returns `Ok(None)` when no key is configured anywhere; the session then
/// runs without a ledger handle.
pub fn load_signer(key_path: Option<&Path>) -> Result<Option<PrivateKeySigner>> {
    let raw = match std::env::var(PRIVATE_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => match key_path {
            Some(path) if path.exists() => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read private key file {}", path.display()))?,
            _ => return Ok(None),
        },
    };

    let signer: PrivateKeySigner = raw.trim().parse().context("Invalid private key format")?;
    Ok(Some(signer))
}
