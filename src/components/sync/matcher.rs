use super::key::{base_uid, extract_backlink};
use crate::components::destination::DestinationEvent;
use chrono::{DateTime, Duration, Utc};
use strsim::normalized_levenshtein;

/// Stop scanning further candidates once a match scores this high
pub const EARLY_STOP_CONFIDENCE: f64 = 0.95;

const UID_WEIGHT: f64 = 0.4;
const TIME_WEIGHT: f64 = 0.3;
const TITLE_WEIGHT: f64 = 0.2;
const LOCATION_WEIGHT: f64 = 0.1;
const EMPTY_LOCATION_WEIGHT: f64 = 0.05;

/// Tunables for confidence scoring
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Start and end must both land within this tolerance
    pub time_tolerance: Duration,
    /// Minimum edit-distance similarity for a fuzzy title match
    pub title_similarity: f64,
    /// Score at or above which two records count as the same meeting
    pub confidence_threshold: f64,
    /// Allow near-miss titles through edit distance
    pub fuzzy_titles: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            time_tolerance: Duration::minutes(5),
            title_similarity: 0.85,
            confidence_threshold: 0.8,
            fuzzy_titles: true,
        }
    }
}

/// The fields confidence scoring looks at, viewed uniformly over source
/// occurrences and destination events
#[derive(Debug, Clone)]
pub struct EventFacts<'a> {
    pub uid: Option<String>,
    pub title: &'a str,
    pub location: Option<&'a str>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl<'a> EventFacts<'a> {
    /// View over a destination event; the uid comes from its backlink
    pub fn from_destination(event: &'a DestinationEvent) -> Self {
        Self {
            uid: event.description.as_deref().and_then(extract_backlink),
            title: &event.title,
            location: event.location.as_deref(),
            start: event.start,
            end: event.end,
        }
    }
}

/// Lowercase, trim and collapse internal whitespace
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Score how likely two records describe the same meeting, in [0, 1].
///
/// Four independent weighted signals; each contributes its full weight only
/// when its own criterion is met.
pub fn score(a: &EventFacts, b: &EventFacts, config: &MatcherConfig) -> f64 {
    let mut confidence = 0.0;

    // UID signal: exact backlink match, or the same series linking two
    // occurrences through their base uid
    if let (Some(uid_a), Some(uid_b)) = (&a.uid, &b.uid) {
        if uid_a == uid_b || base_uid(uid_a) == base_uid(uid_b) {
            confidence += UID_WEIGHT;
        }
    }

    // Time signal: start and end both within tolerance
    let start_delta = (a.start - b.start).abs();
    let end_delta = (a.end - b.end).abs();
    if start_delta <= config.time_tolerance && end_delta <= config.time_tolerance {
        confidence += TIME_WEIGHT;
    }

    // Title signal
    let title_a = normalize_text(a.title);
    let title_b = normalize_text(b.title);
    if !title_a.is_empty() && title_a == title_b {
        confidence += TITLE_WEIGHT;
    } else if config.fuzzy_titles
        && !title_a.is_empty()
        && !title_b.is_empty()
        && normalized_levenshtein(&title_a, &title_b) >= config.title_similarity
    {
        confidence += TITLE_WEIGHT;
    }

    // Location signal: exact normalized match, both-empty is a weak match
    let location_a = a.location.map(normalize_text).unwrap_or_default();
    let location_b = b.location.map(normalize_text).unwrap_or_default();
    if location_a.is_empty() && location_b.is_empty() {
        confidence += EMPTY_LOCATION_WEIGHT;
    } else if location_a == location_b {
        confidence += LOCATION_WEIGHT;
    }

    confidence.clamp(0.0, 1.0)
}

/// Whether a score clears the duplicate threshold
pub fn is_duplicate(confidence: f64, config: &MatcherConfig) -> bool {
    confidence >= config.confidence_threshold
}

/// Scan candidates for the highest-confidence match, stopping early once a
/// candidate clears [`EARLY_STOP_CONFIDENCE`]
pub fn best_match<'a>(
    target: &EventFacts,
    candidates: &'a [DestinationEvent],
    config: &MatcherConfig,
) -> Option<(&'a DestinationEvent, f64)> {
    let mut best: Option<(&DestinationEvent, f64)> = None;

    for candidate in candidates {
        let facts = EventFacts::from_destination(candidate);
        let confidence = score(target, &facts, config);

        if best.map(|(_, c)| confidence > c).unwrap_or(true) {
            best = Some((candidate, confidence));
        }

        if confidence >= EARLY_STOP_CONFIDENCE {
            break;
        }
    }

    best
}
