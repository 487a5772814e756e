use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// LLM client abstraction supporting multiple backends
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion from a prompt
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Claude API client
#[derive(Debug)]
pub struct ClaudeClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ClaudeMessage>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContent {
    text: String,
}

impl ClaudeClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            model,
            client,
        })
    }

    /// Create a client from environment variable
    pub fn from_env(model: String) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set")?;
        Self::new(api_key, model)
    }
}

#[async_trait]
impl LlmClient for ClaudeClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ClaudeRequest {
            model: self.model.clone(),
            max_tokens: 512,
            messages: vec![ClaudeMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Claude API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Claude API request failed with status {}: {}",
                status,
                error_text
            );
        }

        let claude_response: ClaudeResponse = response
            .json()
            .await
            .context("Failed to parse Claude API response")?;

        claude_response
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| anyhow::anyhow!("No content in Claude response"))
    }
}

/// Ollama client for local inference
#[derive(Debug)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120)) // Local inference can be slow
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Ollama request failed with status {}: {}",
                status,
                error_text
            );
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(ollama_response.response)
    }
}

/// Tries the primary backend, then the fallback if one is configured.
pub struct FallbackLlmClient {
    primary: Box<dyn LlmClient>,
    fallback: Option<Box<dyn LlmClient>>,
    primary_name: String,
    fallback_name: String,
}

impl std::fmt::Debug for FallbackLlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackLlmClient")
            .field("primary", &self.primary_name)
            .field("fallback", &self.fallback_name)
            .finish()
    }
}

impl FallbackLlmClient {
    pub fn new(
        primary: Box<dyn LlmClient>,
        primary_name: &str,
        fallback: Option<Box<dyn LlmClient>>,
        fallback_name: &str,
    ) -> Self {
        Self {
            primary,
            fallback,
            primary_name: primary_name.to_string(),
            fallback_name: fallback_name.to_string(),
        }
    }
}

#[async_trait]
impl LlmClient for FallbackLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let primary_error = match self.primary.complete(prompt).await {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        let Some(fallback) = self.fallback.as_ref() else {
            return Err(primary_error);
        };

        warn!(
            "Primary LLM ({}) failed: {}. Trying fallback ({})",
            self.primary_name, primary_error, self.fallback_name
        );

        fallback.complete(prompt).await.map_err(|fallback_error| {
            anyhow::anyhow!(
                "Both LLMs failed. Primary ({}): {}. Fallback ({}): {}",
                self.primary_name,
                primary_error,
                self.fallback_name,
                fallback_error
            )
        })
    }
}

/// Mock LLM client for testing
#[cfg(test)]
pub struct MockLlmClient {
    responses: std::sync::Mutex<std::collections::VecDeque<String>>,
    prompts: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

#[cfg(test)]
impl MockLlmClient {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            prompts: Default::default(),
        }
    }

    /// Shared log of every prompt sent, readable after the client is boxed away.
    pub fn prompt_log(&self) -> std::sync::Arc<std::sync::Mutex<Vec<String>>> {
        self.prompts.clone()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("No mock responses available"))
    }
}
