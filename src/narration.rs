//! Narration boundary.
//!
//! The conversation never writes prose itself. For each terminal sub-step it
//! produces a `Scenario` tag plus the facts it has verified, and a `Narrator`
//! turns that into text. Narrators may phrase things however they like but
//! must not add capsule data beyond the facts given.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::fmt;
use tracing::warn;

use crate::llm::LlmClient;
use crate::lookup::Capsule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scenario {
    CapsuleFoundTimeLocked,
    CapsuleFoundReady,
    CapsuleAlreadyUnlocked,
    CapsuleNotFound,
    NoCapsuleId,
    WalletNeeded,
    PasswordTesting,
    WrongPassword,
    UnlockSuccess,
    DownloadComplete,
    UnlockError,
    Greeting,
}

impl Scenario {
    pub fn tag(&self) -> &'static str {
        match self {
            Scenario::CapsuleFoundTimeLocked => "CAPSULE_FOUND_TIME_LOCKED",
            Scenario::CapsuleFoundReady => "CAPSULE_FOUND_READY",
            Scenario::CapsuleAlreadyUnlocked => "CAPSULE_ALREADY_UNLOCKED",
            Scenario::CapsuleNotFound => "CAPSULE_NOT_FOUND",
            Scenario::NoCapsuleId => "NO_CAPSULE_ID",
            Scenario::WalletNeeded => "WALLET_NEEDED",
            Scenario::PasswordTesting => "PASSWORD_TESTING",
            Scenario::WrongPassword => "WRONG_PASSWORD",
            Scenario::UnlockSuccess => "UNLOCK_SUCCESS",
            Scenario::DownloadComplete => "DOWNLOAD_COMPLETE",
            Scenario::UnlockError => "UNLOCK_ERROR",
            Scenario::Greeting => "GREETING",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Verified facts a narrator may draw on. Absent facts must not be invented.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Facts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capsule_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Facts {
    /// Facts drawn from a capsule this session has looked up.
    pub fn for_capsule(capsule: &Capsule) -> Self {
        Self {
            capsule_id: Some(capsule.id),
            creator: Some(capsule.short_creator()),
            created_at: Some(capsule.created_date()),
            unlock_at: Some(capsule.unlock_date()),
            ..Self::default()
        }
    }

    pub fn for_id(id: u64) -> Self {
        Self {
            capsule_id: Some(id),
            ..Self::default()
        }
    }

    pub fn with_remaining(mut self, remaining: String) -> Self {
        self.remaining = Some(remaining);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NarrationContext {
    pub scenario: Scenario,
    pub facts: Facts,
}

impl NarrationContext {
    pub fn new(scenario: Scenario, facts: Facts) -> Self {
        Self { scenario, facts }
    }

    pub fn bare(scenario: Scenario) -> Self {
        Self::new(scenario, Facts::default())
    }
}

#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, context: &NarrationContext) -> String;
}

const GREETINGS: &[&str] = &[
    "Welcome, traveler. The vault keeps what the past entrusted to it. Name a capsule and I will see whether its hour has come.",
    "The ledger remembers every sealed capsule. Tell me which one you seek, by number.",
    "Greetings. Somewhere in this chain a message waits for you. Which capsule shall we open?",
    "You stand before the time vault. Give me a capsule id and I will consult the chain.",
];

/// Fixed wording, filled in from the facts.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateNarrator;

impl TemplateNarrator {
    pub fn render(&self, context: &NarrationContext) -> String {
        let facts = &context.facts;
        let id = facts
            .capsule_id
            .map(|id| format!("#{}", id))
            .unwrap_or_else(|| "this capsule".to_string());
        let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "unknown".to_string());

        match context.scenario {
            Scenario::Greeting => GREETINGS
                .choose(&mut rand::thread_rng())
                .copied()
                .unwrap_or(GREETINGS[0])
                .to_string(),
            Scenario::NoCapsuleId => {
                "I could not find a capsule number in that. Try something like \"capsule 7\" or \"#12\".".to_string()
            }
            Scenario::WalletNeeded => {
                "No wallet is connected, so the ledger is out of reach. Configure a wallet key and try again.".to_string()
            }
            Scenario::CapsuleNotFound => format!("Capsule {} does not exist on this ledger.", id),
            Scenario::CapsuleAlreadyUnlocked => format!(
                "Capsule {} was sealed by {} and has already been opened. Its seal cannot be broken twice.",
                id,
                field(&facts.creator)
            ),
            Scenario::CapsuleFoundTimeLocked => format!(
                "Capsule {} from {}, sealed {}, is still time-locked. It opens {} (in {}).",
                id,
                field(&facts.creator),
                field(&facts.created_at),
                field(&facts.unlock_at),
                field(&facts.remaining)
            ),
            Scenario::CapsuleFoundReady => format!(
                "Capsule {} from {}, sealed {}, is ready. Speak the password to open it.",
                id,
                field(&facts.creator),
                field(&facts.created_at)
            ),
            Scenario::PasswordTesting => format!("Testing the password against capsule {} on chain...", id),
            Scenario::WrongPassword => format!(
                "The ledger rejected that password for capsule {}. You may try again.",
                id
            ),
            Scenario::UnlockSuccess => format!(
                "The seal on capsule {} is broken. Retrieving its contents...",
                id
            ),
            Scenario::DownloadComplete => format!(
                "Capsule {} is open. Its contents were saved as {} ({}).",
                id,
                field(&facts.file_name),
                field(&facts.location)
            ),
            Scenario::UnlockError => format!(
                "Something went wrong with capsule {}: {}",
                id,
                field(&facts.error)
            ),
        }
    }
}

#[async_trait]
impl Narrator for TemplateNarrator {
    async fn narrate(&self, context: &NarrationContext) -> String {
        self.render(context)
    }
}

/// Narration from a language model, falling back to templates on failure.
pub struct LlmNarrator {
    client: Box<dyn LlmClient>,
    fallback: TemplateNarrator,
}

impl LlmNarrator {
    pub fn new(client: Box<dyn LlmClient>) -> Self {
        Self {
            client,
            fallback: TemplateNarrator,
        }
    }
}

fn build_narration_prompt(context: &NarrationContext) -> String {
    let facts = serde_json::to_string_pretty(&context.facts).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"You are the keeper of a time vault on a public ledger, speaking to someone who wants to open a sealed capsule.

[Scenario]
{}

[Facts]
{}

[Rules]
1. Write two or three sentences in the voice of the vault keeper.
2. Use ONLY the facts above. Never invent capsule ids, creators, dates, durations or contents.
3. If the scenario asks the user for something (a capsule id, a password), end by asking for it.

Return only the text to show the user."#,
        context.scenario.tag(),
        facts
    )
}

#[async_trait]
impl Narrator for LlmNarrator {
    async fn narrate(&self, context: &NarrationContext) -> String {
        match self.client.complete(&build_narration_prompt(context)).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => self.fallback.render(context),
            Err(e) => {
                warn!(scenario = %context.scenario, "Narration failed, using template: {}", e);
                self.fallback.render(context)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_scenario_tags() {
        assert_eq!(Scenario::CapsuleFoundTimeLocked.tag(), "CAPSULE_FOUND_TIME_LOCKED");
        assert_eq!(Scenario::NoCapsuleId.to_string(), "NO_CAPSULE_ID");
        assert_eq!(
            serde_json::to_string(&Scenario::DownloadComplete).unwrap(),
            "\"DOWNLOAD_COMPLETE\""
        );
    }

    #[test]
    fn test_template_uses_facts() {
        let context = NarrationContext::new(
            Scenario::CapsuleFoundTimeLocked,
            Facts::for_id(5).with_remaining("1 day, 1 hour".to_string()),
        );
        let text = TemplateNarrator.render(&context);
        assert!(text.contains("#5"));
        assert!(text.contains("1 day, 1 hour"));
    }

    #[test]
    fn test_greeting_is_one_of_the_welcomes() {
        let text = TemplateNarrator.render(&NarrationContext::bare(Scenario::Greeting));
        assert!(GREETINGS.contains(&text.as_str()));
    }

    #[test]
    fn test_facts_skip_absent_fields() {
        let json = serde_json::to_string(&Facts::for_id(9)).unwrap();
        assert_eq!(json, r#"{"capsule_id":9}"#);
    }

    #[tokio::test]
    async fn test_llm_narrator_trims_response() {
        let mock = MockLlmClient::new(vec!["  The vault stirs.  ".to_string()]);
        let narrator = LlmNarrator::new(Box::new(mock));
        let context = NarrationContext::new(Scenario::CapsuleNotFound, Facts::for_id(42));

        assert_eq!(narrator.narrate(&context).await, "The vault stirs.");
    }

    #[tokio::test]
    async fn test_llm_narrator_falls_back_to_template() {
        let narrator = LlmNarrator::new(Box::new(MockLlmClient::new(vec![])));
        let context = NarrationContext::new(Scenario::CapsuleNotFound, Facts::for_id(42));

        let text = narrator.narrate(&context).await;
        assert_eq!(text, "Capsule #42 does not exist on this ledger.");
    }

    #[tokio::test]
    async fn test_prompt_contains_tag_and_facts() {
        let context = NarrationContext::new(Scenario::WrongPassword, Facts::for_id(3));
        let prompt = build_narration_prompt(&context);
        assert!(prompt.contains("WRONG_PASSWORD"));
        assert!(prompt.contains("\"capsule_id\": 3"));

        let mock = MockLlmClient::new(vec!["Try again.".to_string()]);
        let sent = mock.prompt_log();
        let narrator = LlmNarrator::new(Box::new(mock));
        narrator.narrate(&context).await;

        assert_eq!(*sent.lock().unwrap(), vec![prompt]);
    }
}
