use crate::components::destination::DestinationEvent;
use crate::components::sync::matcher::normalize_text;
use crate::utils::time::floor_to_hour;
use sha2::{Digest, Sha256};

/// Truncated length of a fuzzy hash, in hex characters
const FUZZY_HASH_LEN: usize = 16;

/// Filler words ignored when fuzzy-hashing titles
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "at", "for", "in", "of", "on", "or", "the", "to", "with",
];

fn hex_digest(hasher: Sha256) -> String {
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Hash identifying byte-identical meetings: normalized title, exact start
/// instant, normalized description and location
pub fn exact_hash(event: &DestinationEvent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(&event.title));
    hasher.update("|");
    hasher.update(event.start.to_rfc3339());
    hasher.update("|");
    hasher.update(normalize_text(event.description.as_deref().unwrap_or("")));
    hasher.update("|");
    hasher.update(normalize_text(event.location.as_deref().unwrap_or("")));
    hex_digest(hasher)
}

/// Strip stopwords out of an already-normalized title
pub fn strip_stopwords(normalized_title: &str) -> String {
    normalized_title
        .split_whitespace()
        .filter(|word| !STOPWORDS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Looser hash catching retitled or slightly-moved copies: stopword-stripped
/// title plus the start rounded down to its hour. Groups sharing this hash
/// still need validation before they are trusted.
pub fn fuzzy_hash(event: &DestinationEvent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(strip_stopwords(&normalize_text(&event.title)));
    hasher.update("|");
    hasher.update(floor_to_hour(event.start).to_rfc3339());

    let mut digest = hex_digest(hasher);
    digest.truncate(FUZZY_HASH_LEN);
    digest
}
