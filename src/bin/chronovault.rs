use anyhow::{Context, Result};
use chronovault::cli::{Cli, Commands};
use chronovault::config::{Config, NarrationBackend};
use chronovault::conversation::failure_context;
use chronovault::ledger::{load_signer, EvmLedger, Ledger};
use chronovault::narration::{Facts, LlmNarrator, NarrationContext, Narrator, Scenario, TemplateNarrator};
use chronovault::{
    cipher, ensure_claimable, lookup_capsule, ClaudeClient, Conversation, DirectorySink,
    FallbackLlmClient, IpfsGateway, LlmClient, OllamaClient, Services, TurnOutcome, TurnQueue,
    VaultError,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chronovault=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;
    config.expand_paths();

    match cli.command {
        Commands::Chat => chat_command(&config).await?,
        Commands::Lookup { id } => lookup_command(&config, id).await?,
        Commands::Seal { file, password, out } => seal_command(&file, &password, out)?,
        Commands::Init { path } => {
            let target_path = path.unwrap_or_else(|| PathBuf::from("."));
            init_command(&target_path)?;
        }
    }

    Ok(())
}

fn load_config(config_path: Option<&PathBuf>) -> Result<Config> {
    if let Some(path) = config_path {
        return Config::from_file(path);
    }

    let default_paths = [PathBuf::from("chronovault.toml"), PathBuf::from(".chronovault.toml")];
    for path in default_paths {
        if path.exists() {
            return Config::from_file(&path);
        }
    }

    Ok(Config::default_config())
}

fn build_narrator(config: &Config) -> Arc<dyn Narrator> {
    let narration = &config.narration;
    let client: Option<Box<dyn LlmClient>> = match narration.backend {
        NarrationBackend::Template => None,
        NarrationBackend::ClaudeApi => match ClaudeClient::from_env(narration.model.clone()) {
            Ok(claude) => {
                let ollama = narration.ollama_url.as_ref().and_then(|url| {
                    OllamaClient::new(url.clone(), "qwen2.5:3b".to_string())
                        .ok()
                        .map(|c| Box::new(c) as Box<dyn LlmClient>)
                });
                Some(Box::new(FallbackLlmClient::new(
                    Box::new(claude),
                    &narration.model,
                    ollama,
                    "ollama",
                )))
            }
            Err(e) => {
                warn!("Claude narration unavailable, using templates: {}", e);
                None
            }
        },
        NarrationBackend::Ollama => {
            let url = narration
                .ollama_url
                .clone()
                .unwrap_or_else(|| "http://127.0.0.1:11434".to_string());
            match OllamaClient::new(url, narration.model.clone()) {
                Ok(ollama) => Some(Box::new(ollama)),
                Err(e) => {
                    warn!("Ollama narration unavailable, using templates: {}", e);
                    None
                }
            }
        }
    };

    match client {
        Some(client) => Arc::new(LlmNarrator::new(client)),
        None => Arc::new(TemplateNarrator),
    }
}

fn connect_ledger(config: &Config) -> Result<Option<Arc<dyn Ledger>>> {
    let Some(signer) = load_signer(config.ledger.private_key_path.as_deref())? else {
        warn!("No wallet key configured; capsule lookups will ask for a wallet");
        return Ok(None);
    };

    let ledger = EvmLedger::connect(&config.ledger.rpc_url, &config.ledger.contract_address, signer)?;
    Ok(Some(Arc::new(ledger)))
}

fn build_services(config: &Config) -> Result<Services> {
    let store = IpfsGateway::new(
        &config.storage.gateway_url,
        Duration::from_secs(config.storage.timeout_secs),
    )?;

    Ok(Services {
        ledger: connect_ledger(config)?,
        store: Arc::new(store),
        sink: Arc::new(DirectorySink::new(config.delivery.output_directory.clone())),
        narrator: build_narrator(config),
        file_prefix: config.delivery.file_prefix.clone(),
        pacing: Duration::from_millis(config.session.pacing_ms),
    })
}

async fn chat_command(config: &Config) -> Result<()> {
    let services = build_services(config)?;
    let (handle, greeting, task) = TurnQueue::spawn(Conversation::new(services)).await;

    for message in greeting {
        println!("{}\n", message.text);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        let command = line.trim();
        if command.eq_ignore_ascii_case("exit") || command.eq_ignore_ascii_case("quit") {
            break;
        }

        // Sent untrimmed so a password keeps its surrounding whitespace.
        match handle.submit(&line).await {
            TurnOutcome::Completed(replies) => {
                for message in replies {
                    println!("{}\n", message.text);
                }
            }
            TurnOutcome::Rejected => println!("Still working on your last message...\n"),
            TurnOutcome::Closed => break,
        }
    }

    drop(handle);
    let conversation = task.await.context("Session task panicked")?;
    info!(
        messages = conversation.transcript().len(),
        "Session ended"
    );
    Ok(())
}

async fn lookup_command(config: &Config, id: u64) -> Result<()> {
    let ledger = connect_ledger(config)?;
    let narrator = build_narrator(config);
    let ledger = ledger.as_deref();

    let context = match lookup_capsule(ledger, id).await {
        Err(err) => failure_context(&err, Facts::for_id(id)),
        Ok(capsule) => {
            let facts = Facts::for_capsule(&capsule);
            let claimable = match ledger {
                Some(ledger) => ensure_claimable(ledger, &capsule).await,
                None => Err(VaultError::WalletNotConnected),
            };
            match claimable {
                Ok(()) => NarrationContext::new(Scenario::CapsuleFoundReady, facts),
                Err(err) => failure_context(&err, facts),
            }
        }
    };

    println!("{}", narrator.narrate(&context).await);
    Ok(())
}

fn seal_command(file: &Path, password: &str, out: Option<PathBuf>) -> Result<()> {
    let plaintext = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let sealed = cipher::seal(&plaintext, password)?;

    let out = out.unwrap_or_else(|| {
        let mut name = file.as_os_str().to_owned();
        name.push(".sealed");
        PathBuf::from(name)
    });
    std::fs::write(&out, &sealed).with_context(|| format!("Failed to write {}", out.display()))?;

    println!("Sealed {} bytes into {:?}", plaintext.len(), out);
    println!("Pin this file to IPFS and use its CID when creating the capsule.");
    Ok(())
}

fn init_command(path: &Path) -> Result<()> {
    println!("Initializing Chronovault in {:?}", path);

    let mut config = Config::default_config();
    config.expand_paths();

    let config_path = path.join("chronovault.toml");
    config.to_file(&config_path)?;
    println!("Created configuration: {:?}", config_path);

    std::fs::create_dir_all(&config.delivery.output_directory)?;
    println!("Created download directory: {:?}", config.delivery.output_directory);

    println!("\nNext steps:");
    println!("1. Edit chronovault.toml with your RPC endpoint and capsule contract address");
    println!("2. Put your wallet key in {:?}", config.ledger.private_key_path);
    println!("3. Run 'chronovault chat'");

    Ok(())
}
