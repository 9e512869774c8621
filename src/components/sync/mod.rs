use crate::components::destination::{
    list_with_retry, CalendarApi, DestinationEvent, EventPayload, RetryPolicy,
};
use crate::components::source::{IcsFeed, SourceOccurrence, SyncWindow};
use crate::components::store::{StoreActorHandle, UidMapping};
use crate::error::BridgeResult;
use chrono_tz::Tz;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub mod key;
pub mod matcher;

use key::{build_key, canonical_span, embed_backlink, extract_backlink};
use matcher::{best_match, is_duplicate, EventFacts, MatcherConfig};

/// Occurrence operations dispatched concurrently per batch
pub const BATCH_SIZE: usize = 5;

/// Pause between batches, bounding load on the destination API
pub const INTER_BATCH_PAUSE: Duration = Duration::from_millis(500);

/// What to do with one source occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncDecision {
    Create,
    Update(String),
    Skip(String),
}

/// Result of one reconciliation pass
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub events_processed: usize,
    pub events_created: usize,
    pub events_updated: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

enum Outcome {
    Created(UidMapping),
    Updated,
    Skipped(String),
}

/// Decides Create/Update per incoming occurrence and dispatches batched
/// concurrent writes against the destination calendar
pub struct SyncEngine {
    api: Arc<dyn CalendarApi>,
    store: StoreActorHandle,
    matcher: MatcherConfig,
    retry: RetryPolicy,
    calendar_id: String,
    default_tz: Tz,
}

impl SyncEngine {
    pub fn new(
        api: Arc<dyn CalendarApi>,
        store: StoreActorHandle,
        calendar_id: impl Into<String>,
        default_tz: Tz,
    ) -> Self {
        Self {
            api,
            store,
            matcher: MatcherConfig::default(),
            retry: RetryPolicy::default(),
            calendar_id: calendar_id.into(),
            default_tz,
        }
    }

    pub fn with_matcher(mut self, matcher: MatcherConfig) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Expand the feed for a window and reconcile the result
    pub async fn run_pass(&self, feed: &dyn IcsFeed, window: SyncWindow) -> BridgeResult<SyncReport> {
        let occurrences = feed.expand(window).await?;
        self.reconcile(&occurrences, window).await
    }

    /// Reconcile a window of source occurrences against the destination.
    ///
    /// The destination index is read once at the start of the pass and is
    /// not updated as events are created within it; two occurrences that
    /// would resolve to the same new key in one pass can both Create.
    pub async fn reconcile(
        &self,
        occurrences: &[SourceOccurrence],
        window: SyncWindow,
    ) -> BridgeResult<SyncReport> {
        let started = Instant::now();
        let mut report = SyncReport {
            success: true,
            events_processed: occurrences.len(),
            ..Default::default()
        };

        if occurrences.is_empty() {
            report.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(report);
        }

        let destination = list_with_retry(
            self.api.as_ref(),
            &self.retry,
            &self.calendar_id,
            window.start,
            window.end,
        )
        .await?;

        let index = self.build_index(&destination).await;

        let mut new_mappings: Vec<UidMapping> = Vec::new();
        let batches: Vec<&[SourceOccurrence]> = occurrences.chunks(BATCH_SIZE).collect();
        let total_batches = batches.len();

        for (batch_no, batch) in batches.into_iter().enumerate() {
            let results = join_all(
                batch
                    .iter()
                    .map(|occurrence| self.process_occurrence(occurrence, &index, &destination)),
            )
            .await;

            for result in results {
                match result {
                    Ok(Outcome::Created(mapping)) => {
                        report.events_created += 1;
                        new_mappings.push(mapping);
                    }
                    Ok(Outcome::Updated) => report.events_updated += 1,
                    Ok(Outcome::Skipped(reason)) => {
                        warn!("Occurrence skipped: {}", reason);
                    }
                    // A dead credential fails every remaining call; abort
                    // instead of recording it per event
                    Err(e) if e.is_auth_expired() => return Err(e),
                    Err(e) => report.errors.push(e.to_string()),
                }
            }

            if batch_no + 1 < total_batches {
                tokio::time::sleep(INTER_BATCH_PAUSE).await;
            }
        }

        if !new_mappings.is_empty() {
            if let Err(e) = self
                .store
                .save_mappings(&self.calendar_id, new_mappings)
                .await
            {
                warn!("Failed to persist uid mappings: {}", e);
            }
        }

        report.success = report.errors.is_empty();
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            "Pass over {} occurrences: {} created, {} updated, {} errors",
            report.events_processed,
            report.events_created,
            report.events_updated,
            report.errors.len()
        );

        Ok(report)
    }

    /// Build the key index for this pass: backlinks first, then persisted
    /// mappings on top (the mapping is the source of truth, the text marker
    /// the fallback)
    async fn build_index(&self, destination: &[DestinationEvent]) -> HashMap<String, String> {
        let mut index = HashMap::new();

        for event in destination {
            if let Some(uid) = event.description.as_deref().and_then(extract_backlink) {
                index.insert(build_key(&uid, event.start), event.id.clone());
            }
        }

        match self.store.get_mappings(&self.calendar_id).await {
            Ok(mappings) => {
                for mapping in mappings {
                    index.insert(
                        build_key(&mapping.source_uid, mapping.start),
                        mapping.destination_id,
                    );
                }
            }
            Err(e) => warn!("Mapping store unavailable, relying on backlinks: {}", e),
        }

        index
    }

    /// Decide what to do with one occurrence against this pass's snapshot
    fn decide(
        &self,
        occurrence: &SourceOccurrence,
        index: &HashMap<String, String>,
        destination: &[DestinationEvent],
    ) -> SyncDecision {
        if !occurrence.is_matchable() {
            return SyncDecision::Skip(format!(
                "Occurrence '{}' is missing a uid or title",
                occurrence.uid
            ));
        }

        let (start, end) = match canonical_span(occurrence, self.default_tz) {
            Ok(span) => span,
            Err(e) => return SyncDecision::Skip(e.to_string()),
        };

        let duplicate_key = build_key(&occurrence.uid, start);
        if let Some(destination_id) = index.get(&duplicate_key) {
            return SyncDecision::Update(destination_id.clone());
        }

        // Key miss: confidence fallback, catching events that predate
        // backlink embedding. A miss here fails open into Create.
        let facts = EventFacts {
            uid: Some(occurrence.uid.clone()),
            title: &occurrence.title,
            location: occurrence.location.as_deref(),
            start,
            end,
        };
        if let Some((candidate, confidence)) = best_match(&facts, destination, &self.matcher) {
            if is_duplicate(confidence, &self.matcher) {
                return SyncDecision::Update(candidate.id.clone());
            }
        }

        SyncDecision::Create
    }

    fn payload_for(&self, occurrence: &SourceOccurrence) -> BridgeResult<EventPayload> {
        let (start, end) = canonical_span(occurrence, self.default_tz)?;
        Ok(EventPayload {
            title: occurrence.title.clone(),
            description: embed_backlink(occurrence.description.as_deref(), &occurrence.uid),
            location: occurrence.location.clone(),
            start,
            end,
        })
    }

    async fn process_occurrence(
        &self,
        occurrence: &SourceOccurrence,
        index: &HashMap<String, String>,
        destination: &[DestinationEvent],
    ) -> BridgeResult<Outcome> {
        match self.decide(occurrence, index, destination) {
            SyncDecision::Skip(reason) => Ok(Outcome::Skipped(reason)),
            SyncDecision::Update(destination_id) => {
                let payload = self.payload_for(occurrence)?;
                self.api
                    .update_event(&self.calendar_id, &destination_id, &payload)
                    .await?;
                Ok(Outcome::Updated)
            }
            SyncDecision::Create => {
                let payload = self.payload_for(occurrence)?;
                let destination_id = self
                    .api
                    .insert_event(&self.calendar_id, &payload)
                    .await?;
                Ok(Outcome::Created(UidMapping {
                    source_uid: occurrence.uid.clone(),
                    destination_id,
                    start: payload.start,
                }))
            }
        }
    }
}
