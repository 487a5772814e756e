//! Conversation state machine.
//!
//! One `Conversation` per session owns the dialogue state and the transcript.
//! Each user turn is processed to completion before the next is accepted;
//! `TurnQueue` feeds turns in one at a time and rejects submissions while a
//! turn is in flight.
//!
//! ```text
//! GREETING ──► AWAITING_ID ──(ready capsule)──► AWAITING_PASSWORD
//!                 ▲   │                            │   │
//!                 │   └─(no id / missing / locked / │   └─(wrong password: stay)
//!                 │      already unlocked: stay)    │
//!                 └─────────(anything else)─────────┘
//! ```

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::delivery::ArtifactSink;
use crate::error::{RevertKind, VaultError};
use crate::intent::{extract_id, is_relookup_request};
use crate::ledger::Ledger;
use crate::lookup::{ensure_claimable, lookup_capsule, Capsule};
use crate::narration::{Facts, NarrationContext, Narrator, Scenario};
use crate::retrieval::retrieve_and_deliver;
use crate::storage::ContentStore;
use crate::unlock::execute_unlock;

const PENDING_TEXT: &str = "...";

/// Dialogue state. The active capsule exists only while awaiting a password,
/// and only after it was confirmed locked-but-ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationState {
    Greeting,
    AwaitingId,
    AwaitingPassword { capsule: Capsule },
}

impl ConversationState {
    pub fn active_capsule_id(&self) -> Option<u64> {
        match self {
            ConversationState::AwaitingPassword { capsule } => Some(capsule.id),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConversationState::Greeting => "GREETING",
            ConversationState::AwaitingId => "AWAITING_ID",
            ConversationState::AwaitingPassword { .. } => "AWAITING_PASSWORD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Transient "working on it" marker; the only kind of entry ever removed.
    pub pending: bool,
}

/// Append-only message log.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    fn push(&mut self, role: Role, text: String, pending: bool) {
        self.messages.push(Message {
            role,
            text,
            timestamp: Utc::now(),
            pending,
        });
    }

    pub fn push_user(&mut self, text: &str) {
        self.push(Role::User, text.to_string(), false);
    }

    pub fn push_assistant(&mut self, text: String) {
        self.push(Role::Assistant, text, false);
    }

    pub fn push_pending(&mut self) {
        self.push(Role::Assistant, PENDING_TEXT.to_string(), true);
    }

    pub fn clear_pending(&mut self) {
        self.messages.retain(|m| !m.pending);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Collaborators a session talks to.
#[derive(Clone)]
pub struct Services {
    /// `None` when no wallet is connected.
    pub ledger: Option<Arc<dyn Ledger>>,
    pub store: Arc<dyn ContentStore>,
    pub sink: Arc<dyn ArtifactSink>,
    pub narrator: Arc<dyn Narrator>,
    pub file_prefix: String,
    pub pacing: Duration,
}

/// Turn a failure into the scenario and facts the user is told about.
pub fn failure_context(err: &VaultError, facts: Facts) -> NarrationContext {
    match err {
        VaultError::WalletNotConnected => NarrationContext::new(Scenario::WalletNeeded, facts),
        VaultError::InvalidInput => NarrationContext::bare(Scenario::NoCapsuleId),
        VaultError::CapsuleNotFound { .. } => NarrationContext::new(Scenario::CapsuleNotFound, facts),
        VaultError::AlreadyUnlocked { .. }
        | VaultError::ContractRevert {
            kind: RevertKind::AlreadyUnlocked,
            ..
        } => NarrationContext::new(Scenario::CapsuleAlreadyUnlocked, facts),
        VaultError::TimeLocked { remaining, .. } => NarrationContext::new(
            Scenario::CapsuleFoundTimeLocked,
            facts.with_remaining(remaining.clone()),
        ),
        VaultError::ContractRevert {
            kind: RevertKind::WrongPassword,
            ..
        } => NarrationContext::new(Scenario::WrongPassword, facts),
        VaultError::ContractRevert {
            kind: RevertKind::TooEarly,
            ..
        } => NarrationContext::new(
            Scenario::UnlockError,
            facts.with_error("the ledger says this capsule's time-lock has not dissolved yet".to_string()),
        ),
        VaultError::ContractRevert {
            kind: RevertKind::Unknown,
            reason,
        } => NarrationContext::new(
            Scenario::UnlockError,
            facts.with_error(format!("the unlock transaction failed: {}", reason)),
        ),
        VaultError::StorageFetchFailure { reason, .. } => NarrationContext::new(
            Scenario::UnlockError,
            facts.with_error(format!(
                "the capsule was unlocked on chain, but its payload could not be fetched from storage ({})",
                reason
            )),
        ),
        VaultError::DecryptionFailure { .. } => NarrationContext::new(
            Scenario::UnlockError,
            facts.with_error(
                "the capsule is now permanently unlocked on chain, but its payload did not decrypt \
                 with that password. Trying another password cannot help, because the unlock has \
                 already been spent."
                    .to_string(),
            ),
        ),
        VaultError::Unknown(detail) => {
            NarrationContext::new(Scenario::UnlockError, facts.with_error(detail.clone()))
        }
    }
}

pub struct Conversation {
    services: Services,
    state: ConversationState,
    transcript: Transcript,
}

impl Conversation {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            state: ConversationState::Greeting,
            transcript: Transcript::default(),
        }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Emit the welcome and move on to waiting for a capsule id.
    pub async fn start(&mut self) -> Vec<Message> {
        let mark = self.transcript.len();
        if self.state == ConversationState::Greeting {
            self.say(NarrationContext::bare(Scenario::Greeting)).await;
            self.state = ConversationState::AwaitingId;
        }
        self.replies_since(mark)
    }

    /// Process one user turn and return the replies it produced.
    pub async fn handle_turn(&mut self, input: &str) -> Vec<Message> {
        if self.state == ConversationState::Greeting {
            self.start().await;
        }

        self.transcript.push_user(input);
        let mark = self.transcript.len();

        match self.state.clone() {
            ConversationState::Greeting | ConversationState::AwaitingId => {
                self.lookup_turn(input).await;
            }
            ConversationState::AwaitingPassword { capsule } => {
                self.password_turn(capsule, input).await;
            }
        }

        debug!(state = self.state.name(), "Turn complete");
        self.replies_since(mark)
    }

    fn replies_since(&self, mark: usize) -> Vec<Message> {
        self.transcript.messages()[mark.min(self.transcript.len())..]
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .cloned()
            .collect()
    }

    async fn say(&mut self, context: NarrationContext) {
        let text = self.services.narrator.narrate(&context).await;
        self.transcript.push_assistant(text);
    }

    async fn pause(&self) {
        if !self.services.pacing.is_zero() {
            tokio::time::sleep(self.services.pacing).await;
        }
    }

    fn reset(&mut self) {
        self.state = ConversationState::AwaitingId;
    }

    async fn lookup_turn(&mut self, input: &str) {
        let id = match extract_id(input).ok_or(VaultError::InvalidInput) {
            Ok(id) => id,
            Err(err) => return self.say(failure_context(&err, Facts::default())).await,
        };

        self.transcript.push_pending();
        self.pause().await;
        let outcome = self.find_ready_capsule(id).await;
        self.transcript.clear_pending();

        match outcome {
            Ok(capsule) => {
                info!(capsule = capsule.id, "Capsule ready for password");
                self.say(NarrationContext::new(
                    Scenario::CapsuleFoundReady,
                    Facts::for_capsule(&capsule),
                ))
                .await;
                self.state = ConversationState::AwaitingPassword { capsule };
            }
            Err((err, facts)) => {
                debug!(capsule = id, "Lookup refused: {}", err);
                self.say(failure_context(&err, facts)).await;
            }
        }
    }

    /// Look up and check a capsule. Failures carry whatever facts were verified.
    async fn find_ready_capsule(&self, id: u64) -> Result<Capsule, (VaultError, Facts)> {
        let ledger = self.services.ledger.as_deref();

        let capsule = lookup_capsule(ledger, id)
            .await
            .map_err(|e| (e, Facts::for_id(id)))?;

        let facts = Facts::for_capsule(&capsule);
        let Some(ledger) = ledger else {
            return Err((VaultError::WalletNotConnected, facts));
        };

        match ensure_claimable(ledger, &capsule).await {
            Ok(()) => Ok(capsule),
            Err(err) => Err((err, facts)),
        }
    }

    async fn password_turn(&mut self, capsule: Capsule, input: &str) {
        let facts = Facts::for_capsule(&capsule);

        if input.trim().is_empty() {
            return self
                .say(NarrationContext::new(Scenario::CapsuleFoundReady, facts))
                .await;
        }

        if is_relookup_request(input) {
            info!(abandoned = capsule.id, "Switching to another capsule");
            self.reset();
            return self.lookup_turn(input).await;
        }

        // Passwords are taken verbatim; surrounding whitespace is significant.
        let password = input;
        self.say(NarrationContext::new(Scenario::PasswordTesting, facts.clone()))
            .await;
        self.transcript.push_pending();
        self.pause().await;
        let unlocked = execute_unlock(self.services.ledger.as_deref(), capsule.id, password).await;
        self.transcript.clear_pending();

        if let Err(err) = unlocked {
            self.say(failure_context(&err, facts)).await;
            let retryable = matches!(err, VaultError::ContractRevert { kind, .. } if kind.is_retryable());
            if !retryable {
                self.reset();
            }
            return;
        }

        self.say(NarrationContext::new(Scenario::UnlockSuccess, facts.clone()))
            .await;
        self.transcript.push_pending();
        self.pause().await;
        let delivered = retrieve_and_deliver(
            self.services.store.as_ref(),
            self.services.sink.as_ref(),
            &capsule,
            password,
            &self.services.file_prefix,
        )
        .await;
        self.transcript.clear_pending();

        match delivered {
            Ok(delivered) => {
                let mut facts = facts;
                facts.file_name = Some(delivered.file_name);
                facts.location = Some(delivered.location);
                self.say(NarrationContext::new(Scenario::DownloadComplete, facts))
                    .await;
            }
            Err(err) => self.say(failure_context(&err, facts)).await,
        }

        // The unlock is spent either way.
        self.reset();
    }
}

/// Result of submitting a turn to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed(Vec<Message>),
    /// Another turn is still in flight.
    Rejected,
    /// The session has ended.
    Closed,
}

struct Command {
    text: String,
    reply: oneshot::Sender<Vec<Message>>,
}

/// Submits turns to a running session.
#[derive(Clone)]
pub struct TurnHandle {
    tx: mpsc::Sender<Command>,
    processing: Arc<AtomicBool>,
}

impl TurnHandle {
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    pub async fn submit(&self, text: &str) -> TurnOutcome {
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return TurnOutcome::Rejected;
        }

        let (reply, rx) = oneshot::channel();
        let command = Command {
            text: text.to_string(),
            reply,
        };
        if self.tx.send(command).await.is_err() {
            self.processing.store(false, Ordering::SeqCst);
            return TurnOutcome::Closed;
        }

        match rx.await {
            Ok(messages) => TurnOutcome::Completed(messages),
            Err(_) => {
                // The worker died mid-turn.
                self.processing.store(false, Ordering::SeqCst);
                TurnOutcome::Closed
            }
        }
    }
}

/// Runs a conversation on its own task, one turn at a time.
pub struct TurnQueue;

impl TurnQueue {
    /// Greet, then start serving turns. The task ends, handing back the
    /// conversation, once every handle is dropped.
    pub async fn spawn(
        mut conversation: Conversation,
    ) -> (TurnHandle, Vec<Message>, JoinHandle<Conversation>) {
        let greeting = conversation.start().await;

        let (tx, mut rx) = mpsc::channel::<Command>(1);
        let processing = Arc::new(AtomicBool::new(false));
        let flag = processing.clone();

        let task = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let replies = conversation.handle_turn(&command.text).await;
                flag.store(false, Ordering::SeqCst);
                let _ = command.reply.send(replies);
            }
            conversation
        });

        (TurnHandle { tx, processing }, greeting, task)
    }
}
