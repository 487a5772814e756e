pub mod cipher;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod delivery;
pub mod error;
pub mod intent;
pub mod ledger;
pub mod llm;
pub mod lookup;
pub mod narration;
pub mod retrieval;
pub mod storage;
pub mod timelock;
pub mod unlock;

pub use config::Config;
pub use conversation::{Conversation, ConversationState, Message, Role, Services, TurnHandle, TurnOutcome, TurnQueue};
pub use delivery::{Artifact, ArtifactSink, DirectorySink};
pub use error::{LedgerError, RevertKind, VaultError, VaultResult};
pub use intent::{extract_id, is_relookup_request};
pub use ledger::{CapsuleRecord, EvmLedger, Ledger, LedgerReader, LedgerWriter, UnlockReceipt};
pub use llm::{ClaudeClient, FallbackLlmClient, LlmClient, OllamaClient};
pub use lookup::{ensure_claimable, lookup_capsule, Capsule};
pub use narration::{Facts, LlmNarrator, NarrationContext, Narrator, Scenario, TemplateNarrator};
pub use retrieval::{retrieve_and_deliver, retrieve_payload, Delivered};
pub use storage::{ContentStore, IpfsGateway};
pub use timelock::{format_remaining, TimeLock};
pub use unlock::{classify_revert, execute_unlock};
