use chronovault::config::{Config, NarrationBackend};
use chronovault::{
    cipher, classify_revert, extract_id, format_remaining, is_relookup_request, Artifact,
    ArtifactSink, DirectorySink, RevertKind,
};
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_config_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("chronovault.toml");

    let config = Config::default_config();
    config.to_file(&config_path).unwrap();

    let loaded_config = Config::from_file(&config_path).unwrap();

    assert_eq!(config, loaded_config);
}

#[test]
fn test_config_with_custom_values() {
    let toml_str = r#"
[ledger]
rpc_url = "http://127.0.0.1:8545"
contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"

[storage]
gateway_url = "http://127.0.0.1:8080"
timeout_secs = 5

[narration]
backend = "ollama"
model = "llama3"
ollama_url = "http://127.0.0.1:11434"

[delivery]
output_directory = "/custom/downloads"
file_prefix = "capsule-"

[session]
pacing_ms = 0
"#;

    let config = Config::from_str(toml_str).unwrap();

    assert_eq!(config.ledger.rpc_url, "http://127.0.0.1:8545");
    assert!(config.ledger.private_key_path.is_none());
    assert_eq!(config.storage.timeout_secs, 5);
    assert_eq!(config.narration.backend, NarrationBackend::Ollama);
    assert_eq!(config.narration.model, "llama3");
    assert_eq!(config.delivery.output_directory, PathBuf::from("/custom/downloads"));
    assert_eq!(config.delivery.file_prefix, "capsule-");
    assert_eq!(config.session.pacing_ms, 0);
}

#[test]
fn test_sealed_payload_opens_with_its_password_only() {
    let cases: Vec<(Vec<u8>, &str)> = vec![
        (b"see you in ten years".to_vec(), "pw"),
        (vec![0x00, 0xff, 0x10, 0x00, 0xfe], "binary key"),
        (vec![b'x'; 4096], "long payload"),
        ("für dich".as_bytes().to_vec(), "schlüssel ✓"),
    ];

    for (plaintext, password) in cases {
        let sealed = cipher::seal(&plaintext, password).unwrap();
        assert_eq!(cipher::open(&sealed, password), plaintext);
        assert!(cipher::open(&sealed, &password.to_uppercase()).is_empty());
    }
}

#[test]
fn test_empty_payload_round_trips_but_is_not_deliverable() {
    let sealed = cipher::seal(b"", "pw").unwrap();
    let plaintext = cipher::open(&sealed, "pw");

    assert!(plaintext.is_empty());
    assert!(Artifact::from_plaintext("time-capsule-", 1, plaintext).is_none());
}

#[test]
fn test_intent_parsing() {
    assert_eq!(extract_id("Can you open capsule #12?"), Some(12));
    assert_eq!(extract_id("  7 "), Some(7));
    assert_eq!(extract_id("hello there"), None);

    assert!(is_relookup_request("actually check capsule 4"));
    assert!(!is_relookup_request("vault"));
    assert!(!is_relookup_request("hunter2"));
}

#[test]
fn test_wait_formatting() {
    assert_eq!(format_remaining(90_000), "1 day, 1 hour");
    assert_eq!(format_remaining(3_540), "59 minutes");
    assert_eq!(format_remaining(45), "moments");
}

#[test]
fn test_revert_classification() {
    assert_eq!(classify_revert("Capsule already unlocked"), RevertKind::AlreadyUnlocked);
    assert_eq!(classify_revert("Capsule is not yet unlockable"), RevertKind::TooEarly);
    assert_eq!(classify_revert("Incorrect password"), RevertKind::WrongPassword);
    assert_eq!(classify_revert("out of gas"), RevertKind::Unknown);
}

#[tokio::test]
async fn test_decrypted_payload_lands_in_download_directory() {
    let temp_dir = TempDir::new().unwrap();
    let downloads = temp_dir.path().join("downloads");

    let sealed = cipher::seal(b"data:text/plain;base64,aGVsbG8=", "pw").unwrap();
    let plaintext = cipher::open(&sealed, "pw");
    let artifact = Artifact::from_plaintext("time-capsule-", 5, plaintext).unwrap();
    assert_eq!(artifact.file_name, "time-capsule-5.txt");

    let sink = DirectorySink::new(downloads.clone());
    let location = sink.deliver(&artifact).await.unwrap();

    let written = downloads.join("time-capsule-5.txt");
    assert_eq!(location, written.display().to_string());
    assert_eq!(std::fs::read(written).unwrap(), b"hello");
}
