//! Delivery of decrypted payloads as downloadable artifacts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use std::path::PathBuf;
use tracing::info;

/// File name prefix for delivered payloads
pub const DEFAULT_FILE_PREFIX: &str = "time-capsule-";

/// A decrypted payload ready to hand to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Build an artifact from decrypted plaintext, named from the capsule id.
    ///
    /// A `data:` URL is unpacked to its bytes and media type. Other UTF-8 is
    /// plain text; anything else is opaque binary. Returns `None` when the
    /// plaintext is empty or claims to be a data URL but does not decode.
    pub fn from_plaintext(prefix: &str, capsule_id: u64, plaintext: Vec<u8>) -> Option<Self> {
        if plaintext.is_empty() {
            return None;
        }

        let (media_type, bytes) = if plaintext.starts_with(b"data:") {
            let text = std::str::from_utf8(&plaintext).ok()?;
            decode_data_url(text)?
        } else if std::str::from_utf8(&plaintext).is_ok() {
            ("text/plain".to_string(), plaintext)
        } else {
            ("application/octet-stream".to_string(), plaintext)
        };

        if bytes.is_empty() {
            return None;
        }

        Some(Self {
            file_name: format!("{}{}.{}", prefix, capsule_id, extension_for(&media_type)),
            media_type,
            bytes,
        })
    }
}

fn decode_data_url(text: &str) -> Option<(String, Vec<u8>)> {
    let (header, data) = text.strip_prefix("data:")?.split_once(',')?;
    let (media_type, is_base64) = match header.strip_suffix(";base64") {
        Some(mime) => (mime, true),
        None => (header, false),
    };
    let media_type = match media_type.split(';').next() {
        Some(mime) if !mime.is_empty() => mime.to_string(),
        _ => "text/plain".to_string(),
    };

    let bytes = if is_base64 {
        base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .ok()?
    } else {
        data.as_bytes().to_vec()
    };
    Some((media_type, bytes))
}

fn extension_for(media_type: &str) -> &'static str {
    match media_type {
        "text/plain" => "txt",
        "text/markdown" => "md",
        "text/html" => "html",
        "application/json" => "json",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "audio/mpeg" => "mp3",
        "video/mp4" => "mp4",
        _ => "bin",
    }
}

/// Where delivered artifacts end up.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Deliver the artifact and return a human-readable location.
    async fn deliver(&self, artifact: &Artifact) -> Result<String>;
}

/// Writes artifacts into a local directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    directory: PathBuf,
}

impl DirectorySink {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl ArtifactSink for DirectorySink {
    async fn deliver(&self, artifact: &Artifact) -> Result<String> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .with_context(|| format!("Failed to create {}", self.directory.display()))?;

        let path = self.directory.join(&artifact.file_name);
        tokio::fs::write(&path, &artifact.bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!(path = %path.display(), bytes = artifact.bytes.len(), "Payload delivered");
        Ok(path.display().to_string())
    }
}
