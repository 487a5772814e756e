//! Payload retrieval and decryption.
//!
//! Runs only after the unlock transaction succeeded. The contract checks its
//! own password proof, not whether the password opens this ciphertext, so a
//! decryption failure here is still possible and is final for the capsule.

use tracing::{info, warn};

use crate::cipher;
use crate::delivery::{Artifact, ArtifactSink};
use crate::error::{VaultError, VaultResult};
use crate::lookup::Capsule;
use crate::storage::ContentStore;

/// A payload that was fetched, opened and handed to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub file_name: String,
    pub media_type: String,
    pub size: usize,
    pub location: String,
}

/// Fetch and decrypt a capsule's payload, returning it as an artifact.
pub async fn retrieve_payload(
    store: &dyn ContentStore,
    capsule: &Capsule,
    password: &str,
    file_prefix: &str,
) -> VaultResult<Artifact> {
    let ciphertext = store
        .fetch(&capsule.content_id)
        .await
        .map_err(|e| VaultError::StorageFetchFailure {
            content_id: capsule.content_id.clone(),
            reason: format!("{:#}", e),
        })?;

    let password = password.to_string();
    let plaintext = tokio::task::spawn_blocking(move || cipher::open(&ciphertext, &password))
        .await
        .map_err(|e| VaultError::Unknown(format!("Decryption task failed: {}", e)))?;

    Artifact::from_plaintext(file_prefix, capsule.id, plaintext).ok_or_else(|| {
        warn!(capsule = capsule.id, "Payload did not decrypt to usable content");
        VaultError::DecryptionFailure { id: capsule.id }
    })
}

/// Retrieve, decrypt and deliver in one step.
pub async fn retrieve_and_deliver(
    store: &dyn ContentStore,
    sink: &dyn ArtifactSink,
    capsule: &Capsule,
    password: &str,
    file_prefix: &str,
) -> VaultResult<Delivered> {
    let artifact = retrieve_payload(store, capsule, password, file_prefix).await?;

    let location = sink
        .deliver(&artifact)
        .await
        .map_err(|e| VaultError::Unknown(format!("{:#}", e)))?;

    info!(capsule = capsule.id, file = %artifact.file_name, "Capsule payload retrieved");

    Ok(Delivered {
        file_name: artifact.file_name,
        media_type: artifact.media_type,
        size: artifact.bytes.len(),
        location,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::recording::RecordingSink;
    use crate::delivery::DEFAULT_FILE_PREFIX;
    use crate::storage::memory::MemoryStore;
    use alloy::primitives::Address;

    fn capsule(id: u64, content_id: &str) -> Capsule {
        Capsule {
            id,
            creator: Address::ZERO,
            content_id: content_id.to_string(),
            unlock_timestamp: 0,
            created_at_timestamp: 0,
            unlocked: true,
        }
    }

    #[tokio::test]
    async fn test_retrieve_and_deliver() {
        let store = MemoryStore::default();
        store.insert("bafy-1", cipher::seal(b"dear future me", "pw").unwrap());
        let sink = RecordingSink::default();

        let delivered = retrieve_and_deliver(&store, &sink, &capsule(1, "bafy-1"), "pw", DEFAULT_FILE_PREFIX)
            .await
            .unwrap();

        assert_eq!(delivered.file_name, "time-capsule-1.txt");
        assert_eq!(delivered.size, 14);
        let artifacts = sink.delivered.lock().unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].bytes, b"dear future me");
    }

    #[tokio::test]
    async fn test_missing_content_is_storage_failure() {
        let store = MemoryStore::default();
        let result = retrieve_payload(&store, &capsule(2, "bafy-missing"), "pw", DEFAULT_FILE_PREFIX).await;
        assert!(matches!(
            result,
            Err(VaultError::StorageFetchFailure { ref content_id, .. }) if content_id == "bafy-missing"
        ));
    }

    #[tokio::test]
    async fn test_wrong_password_is_decryption_failure() {
        let store = MemoryStore::default();
        store.insert("bafy-3", cipher::seal(b"secret", "right").unwrap());

        let result = retrieve_payload(&store, &capsule(3, "bafy-3"), "wrong", DEFAULT_FILE_PREFIX).await;
        assert!(matches!(result, Err(VaultError::DecryptionFailure { id: 3 })));
    }

    #[tokio::test]
    async fn test_empty_plaintext_is_decryption_failure() {
        let store = MemoryStore::default();
        store.insert("bafy-4", cipher::seal(b"", "pw").unwrap());

        let result = retrieve_payload(&store, &capsule(4, "bafy-4"), "pw", DEFAULT_FILE_PREFIX).await;
        assert!(matches!(result, Err(VaultError::DecryptionFailure { id: 4 })));
    }
}
