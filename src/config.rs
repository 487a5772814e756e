use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub narration: NarrationConfig,
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub contract_address: String,
    /// Wallet key file. Without a key there is no ledger handle at all.
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    pub gateway_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NarrationConfig {
    pub backend: NarrationBackend,
    pub model: String,
    #[serde(default)]
    pub ollama_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum NarrationBackend {
    Template,
    ClaudeApi,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryConfig {
    pub output_directory: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Pause between sub-steps of a turn, for pacing only
    pub pacing_ms: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_file_prefix() -> String {
    crate::delivery::DEFAULT_FILE_PREFIX.to_string()
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            backend: NarrationBackend::Template,
            model: "claude-sonnet-4-20250514".to_string(),
            ollama_url: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { pacing_ms: 600 }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .context("Failed to read config file")?;
        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config TOML")
    }

    pub fn default_config() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let vault_dir = home.join(".chronovault");

        Config {
            ledger: LedgerConfig {
                rpc_url: "https://sepolia.base.org".to_string(),
                contract_address: "0x0000000000000000000000000000000000000000".to_string(),
                private_key_path: Some(vault_dir.join("private_key.txt")),
            },
            storage: StorageConfig {
                gateway_url: "https://ipfs.io".to_string(),
                timeout_secs: default_timeout_secs(),
            },
            narration: NarrationConfig::default(),
            delivery: DeliveryConfig {
                output_directory: home.join("chronovault-downloads"),
                file_prefix: default_file_prefix(),
            },
            session: SessionConfig::default(),
        }
    }

    /// Write configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config to TOML")?;
        std::fs::write(path.as_ref(), contents)
            .context("Failed to write config file")?;
        Ok(())
    }

    /// Expand tilde in paths to home directory
    pub fn expand_paths(&mut self) {
        if let Some(home) = dirs::home_dir() {
            if let Some(key_path) = self.ledger.private_key_path.as_mut() {
                *key_path = expand_tilde(key_path, &home);
            }
            self.delivery.output_directory = expand_tilde(&self.delivery.output_directory, &home);
        }
    }
}

fn expand_tilde(path: &Path, home: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        home.join(stripped)
    } else {
        path.to_path_buf()
    }
}
