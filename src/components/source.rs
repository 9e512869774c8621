use crate::error::BridgeResult;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// One expanded calendar instance read from the external feed.
///
/// Recurring series are pre-expanded upstream, so every occurrence arrives
/// individually uid-suffixed. Start and end are the feed's floating local
/// times; resolving them to a canonical instant is the key builder's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceOccurrence {
    pub uid: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub status: Option<String>,
    /// TZID the feed attached to the occurrence, if any
    pub source_timezone: Option<String>,
}

impl SourceOccurrence {
    /// Records without a uid or title cannot be matched and are filtered
    /// out before reconciliation rather than raised as errors.
    pub fn is_matchable(&self) -> bool {
        !self.uid.trim().is_empty() && !self.title.trim().is_empty()
    }
}

/// Bounded time window one reconciliation pass operates over
#[derive(Debug, Clone, Copy)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// Window from now until `days` days ahead
    pub fn next_days(days: i64) -> Self {
        let now = Utc::now();
        Self {
            start: now,
            end: now + chrono::Duration::days(days),
        }
    }
}

/// Collaborator that fetches the ICS feed and expands recurrences into a
/// flat occurrence list. Parsing lives outside this crate.
#[async_trait]
pub trait IcsFeed: Send + Sync {
    async fn expand(&self, window: SyncWindow) -> BridgeResult<Vec<SourceOccurrence>>;
}
