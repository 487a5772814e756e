//! Intent extraction: pull a capsule id out of free-form chat input.
//!
//! Patterns are tried in priority order:
//! 1. keyword-prefixed (`capsule 7`, `vault #3`, `id: 12`, `epoch 4`, `#12`)
//! 2. bare integer filling the whole trimmed input (`42`)
//!
//! The first match wins.

use regex::Regex;
use std::sync::OnceLock;

fn keyword_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:\b(?:capsule|vault|id|epoch)\b\s*[:#]?\s*|#\s*)(\d+)")
            .expect("keyword pattern is valid")
    })
}

fn bare_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+$").expect("bare pattern is valid"))
}

fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\b(?:capsule|vault)s?\b").expect("mention pattern is valid"))
}

/// Extract a capsule id from free text, or `None` if nothing matches.
pub fn extract_id(text: &str) -> Option<u64> {
    let trimmed = text.trim();

    if let Some(id) = keyword_pattern()
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
    {
        return Some(id);
    }

    if bare_pattern().is_match(trimmed) {
        return trimmed.parse().ok();
    }

    None
}

/// Whether the text names a capsule by word ("capsule", "vault").
pub fn mentions_capsule(text: &str) -> bool {
    mention_pattern().is_match(text)
}

/// A password-turn input that should abandon the active capsule and look up
/// another one instead. Requires both a capsule word and an extractable id.
pub fn is_relookup_request(text: &str) -> bool {
    mentions_capsule(text) && extract_id(text).is_some()
}
