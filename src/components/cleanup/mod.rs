use crate::components::destination::{CalendarApi, DestinationEvent};
use crate::components::source::SyncWindow;
use crate::components::store::StoreActorHandle;
use crate::components::sync::key::extract_backlink;
use crate::error::{config_error, BridgeResult};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod backup;
pub mod filters;
pub mod hashing;

use backup::{Backup, BackupEntry};
use filters::{CleanupFilters, CompiledFilters};
use hashing::{exact_hash, fuzzy_hash};

/// How far apart two starts may be for a fuzzy group to be trusted
fn fuzzy_validation_window() -> Duration {
    Duration::hours(2)
}

/// Which grouping pass produced a duplicate group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Pattern,
}

/// Execution mode of one cleanup operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupMode {
    DryRun,
    Interactive,
    Batch,
}

impl CleanupMode {
    pub fn parse(value: &str) -> BridgeResult<Self> {
        match value {
            "dry-run" => Ok(CleanupMode::DryRun),
            "interactive" => Ok(CleanupMode::Interactive),
            "batch" => Ok(CleanupMode::Batch),
            other => Err(config_error(&format!("Unknown cleanup mode: {}", other))),
        }
    }
}

/// A set of redundant destination events: one to keep, the rest candidates
/// for deletion. Computed fresh per analysis, never persisted.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub primary: DestinationEvent,
    pub duplicates: Vec<DestinationEvent>,
    pub match_type: MatchType,
    /// 0..100
    pub confidence: u8,
}

/// Parameters of one cleanup operation
#[derive(Debug, Clone)]
pub struct CleanupOptions {
    pub mode: CleanupMode,
    pub filters: CleanupFilters,
    /// Hard cap on candidate deletions across the whole operation
    pub max_deletions: Option<usize>,
    /// Substrings that fully protect a matching group from deletion
    pub skip_patterns: Vec<String>,
    /// Keep the newest copy instead of the oldest
    pub preserve_newest: bool,
    /// Snapshot candidates before deleting them
    pub create_backup: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            mode: CleanupMode::DryRun,
            filters: CleanupFilters::default(),
            max_deletions: None,
            skip_patterns: Vec::new(),
            preserve_newest: false,
            create_backup: false,
        }
    }
}

/// Result counters of one cleanup operation
#[derive(Debug, Default, Serialize)]
pub struct CleanupReport {
    pub groups_analyzed: usize,
    pub duplicates_found: usize,
    pub duplicates_deleted: usize,
    pub deleted_event_ids: Vec<String>,
    pub preserved_event_ids: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub backup_id: Option<String>,
}

/// Per-deletion confirmation collaborator for interactive mode; the
/// terminal or UI driving it lives outside this crate
#[async_trait]
pub trait DeletionConfirmer: Send + Sync {
    async fn confirm(&self, group: &DuplicateGroup, candidate: &DestinationEvent) -> bool;
}

/// Finds and, outside dry-run, removes redundant destination events.
/// Operates purely on the destination; no source feed involved.
pub struct CleanupEngine {
    api: Arc<dyn CalendarApi>,
    store: StoreActorHandle,
    confirmer: Option<Arc<dyn DeletionConfirmer>>,
}

impl CleanupEngine {
    pub fn new(api: Arc<dyn CalendarApi>, store: StoreActorHandle) -> Self {
        Self {
            api,
            store,
            confirmer: None,
        }
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn DeletionConfirmer>) -> Self {
        self.confirmer = Some(confirmer);
        self
    }

    /// Run one cleanup operation over the given calendars
    pub async fn run(
        &self,
        calendar_ids: &[String],
        options: &CleanupOptions,
    ) -> BridgeResult<CleanupReport> {
        // Configuration problems surface before the destination is contacted
        if options.mode == CleanupMode::Interactive && self.confirmer.is_none() {
            return Err(config_error(
                "Interactive cleanup requires a deletion confirmer",
            ));
        }
        let compiled = CompiledFilters::compile(&options.filters)?;
        let window = listing_window();

        let mut report = CleanupReport::default();

        let mut events = Vec::new();
        for calendar_id in calendar_ids {
            match self
                .api
                .list_events(calendar_id, window.start, window.end)
                .await
            {
                Ok(listed) => events.extend(listed),
                Err(e) if e.is_auth_expired() => return Err(e),
                Err(e) => report
                    .errors
                    .push(format!("Listing {} failed: {}", calendar_id, e)),
            }
        }

        let groups = analyze(&events, options.preserve_newest);
        report.groups_analyzed = groups.len();

        let surviving: Vec<DuplicateGroup> = groups
            .into_iter()
            .filter(|group| compiled.group_survives(group))
            .collect();
        report.duplicates_found = surviving.iter().map(|g| g.duplicates.len()).sum();

        // Skip-pattern exclusion: protected groups stay visible in the
        // analysis counts but never reach deletion
        let mut eligible = Vec::new();
        for group in surviving {
            match matching_skip_pattern(&group, &options.skip_patterns) {
                Some(pattern) => report.warnings.push(format!(
                    "Group '{}' excluded by skip pattern '{}'",
                    group.primary.title, pattern
                )),
                None => eligible.push(group),
            }
        }

        let admitted = admit_within_budget(eligible, options.max_deletions, &mut report.warnings);

        info!(
            "Cleanup analyzed {} groups, {} duplicate candidates, {} admitted for deletion",
            report.groups_analyzed,
            report.duplicates_found,
            admitted.iter().map(|g| g.duplicates.len()).sum::<usize>()
        );

        if options.mode == CleanupMode::DryRun {
            for group in &admitted {
                report.preserved_event_ids.push(group.primary.id.clone());
            }
            return Ok(report);
        }

        self.execute(&admitted, options, &mut report).await?;
        Ok(report)
    }

    /// Delete admitted candidates, optionally snapshotting them first
    async fn execute(
        &self,
        groups: &[DuplicateGroup],
        options: &CleanupOptions,
        report: &mut CleanupReport,
    ) -> BridgeResult<()> {
        if options.create_backup && !groups.is_empty() {
            let mut backup = Backup::new();
            report.backup_id = Some(backup.id.clone());

            for group in groups {
                for candidate in &group.duplicates {
                    match self
                        .api
                        .get_event(&candidate.calendar_id, &candidate.id)
                        .await
                    {
                        Ok(event) => backup.entries.push(BackupEntry { event }),
                        Err(e) if e.is_auth_expired() => return Err(e),
                        Err(e) => {
                            warn!("Backup fetch for {} failed, skipping: {}", candidate.id, e)
                        }
                    }
                }
            }

            if let Err(e) = self.store.save_backup(backup).await {
                report
                    .warnings
                    .push(format!("Backup snapshot not persisted: {}", e));
            }
        }

        for group in groups {
            for candidate in &group.duplicates {
                if options.mode == CleanupMode::Interactive {
                    // No confirmation means no deletion
                    let confirmed = match &self.confirmer {
                        Some(confirmer) => confirmer.confirm(group, candidate).await,
                        None => false,
                    };
                    if !confirmed {
                        report.preserved_event_ids.push(candidate.id.clone());
                        continue;
                    }
                }

                // One failing delete never aborts the remaining candidates
                match self
                    .api
                    .delete_event(&candidate.calendar_id, &candidate.id)
                    .await
                {
                    Ok(()) => {
                        report.duplicates_deleted += 1;
                        report.deleted_event_ids.push(candidate.id.clone());
                    }
                    Err(e) if e.is_auth_expired() => return Err(e),
                    Err(e) => report
                        .errors
                        .push(format!("Failed to delete {}: {}", candidate.id, e)),
                }
            }
            report.preserved_event_ids.push(group.primary.id.clone());
        }

        Ok(())
    }
}

/// Listing window for a cleanup operation: always the full year around now.
/// Date filters are applied post-grouping, never at the listing call, so a
/// group keeps its out-of-range duplicates as deletion candidates.
fn listing_window() -> SyncWindow {
    let now = Utc::now();
    SyncWindow {
        start: now - Duration::days(365),
        end: now + Duration::days(365),
    }
}

/// Three sequential grouping passes, each consuming only events not already
/// claimed by an earlier pass
pub fn analyze(events: &[DestinationEvent], preserve_newest: bool) -> Vec<DuplicateGroup> {
    let mut claimed: HashSet<String> = HashSet::new();
    let mut groups: Vec<DuplicateGroup> = Vec::new();

    // Exact pass: byte-identical normalized content
    collect_groups(
        events,
        &mut claimed,
        &mut groups,
        |event| Some(exact_hash(event)),
        MatchType::Exact,
        100,
        preserve_newest,
    );

    // Fuzzy pass: hour-rounded hashes, validated against rounding artifacts
    collect_groups(
        events,
        &mut claimed,
        &mut groups,
        |event| Some(fuzzy_hash(event)),
        MatchType::Fuzzy,
        85,
        preserve_newest,
    );

    // Pattern pass: events carrying the same embedded original UID
    collect_groups(
        events,
        &mut claimed,
        &mut groups,
        |event| event.description.as_deref().and_then(extract_backlink),
        MatchType::Pattern,
        95,
        preserve_newest,
    );

    groups.sort_by(|a, b| {
        b.confidence
            .cmp(&a.confidence)
            .then(a.primary.start.cmp(&b.primary.start))
    });
    groups
}

fn collect_groups<F>(
    events: &[DestinationEvent],
    claimed: &mut HashSet<String>,
    groups: &mut Vec<DuplicateGroup>,
    key_fn: F,
    match_type: MatchType,
    confidence: u8,
    preserve_newest: bool,
) where
    F: Fn(&DestinationEvent) -> Option<String>,
{
    let mut buckets: HashMap<String, Vec<&DestinationEvent>> = HashMap::new();
    for event in events {
        if claimed.contains(&event.id) {
            continue;
        }
        if let Some(key) = key_fn(event) {
            buckets.entry(key).or_default().push(event);
        }
    }

    // Deterministic group order regardless of map iteration
    let mut keyed: Vec<_> = buckets.into_iter().collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    for (_, members) in keyed {
        if members.len() < 2 {
            continue;
        }

        if match_type == MatchType::Fuzzy && !fuzzy_group_holds(&members) {
            debug!(
                "Discarding fuzzy group '{}': no pair of starts within validation window",
                members[0].title
            );
            continue;
        }

        let group = make_group(members, match_type, confidence, preserve_newest);
        claimed.insert(group.primary.id.clone());
        for duplicate in &group.duplicates {
            claimed.insert(duplicate.id.clone());
        }
        groups.push(group);
    }
}

/// A shared fuzzy hash is only trusted when at least one pairwise start
/// difference stays within the validation window
fn fuzzy_group_holds(members: &[&DestinationEvent]) -> bool {
    for (i, a) in members.iter().enumerate() {
        for b in &members[i + 1..] {
            if (a.start - b.start).abs() <= fuzzy_validation_window() {
                return true;
            }
        }
    }
    false
}

fn make_group(
    mut members: Vec<&DestinationEvent>,
    match_type: MatchType,
    confidence: u8,
    preserve_newest: bool,
) -> DuplicateGroup {
    members.sort_by_key(|event| event.created_at);
    let primary_index = if preserve_newest { members.len() - 1 } else { 0 };
    let primary = members.remove(primary_index).clone();

    DuplicateGroup {
        primary,
        duplicates: members.into_iter().cloned().collect(),
        match_type,
        confidence,
    }
}

/// First skip pattern any deletion candidate in the group matches
fn matching_skip_pattern<'a>(group: &DuplicateGroup, patterns: &'a [String]) -> Option<&'a str> {
    patterns.iter().map(String::as_str).find(|pattern| {
        let needle = pattern.to_lowercase();
        group.duplicates.iter().any(|event| {
            event.title.to_lowercase().contains(&needle)
                || event
                    .description
                    .as_deref()
                    .unwrap_or("")
                    .to_lowercase()
                    .contains(&needle)
        })
    })
}

/// Admit whole groups by descending confidence until the deletion budget is
/// exhausted; a partially-admitted group is never allowed
fn admit_within_budget(
    mut groups: Vec<DuplicateGroup>,
    max_deletions: Option<usize>,
    warnings: &mut Vec<String>,
) -> Vec<DuplicateGroup> {
    groups.sort_by(|a, b| b.confidence.cmp(&a.confidence));

    let Some(budget) = max_deletions else {
        return groups;
    };

    let total: usize = groups.iter().map(|g| g.duplicates.len()).sum();
    if total <= budget {
        return groups;
    }

    let mut admitted = Vec::new();
    let mut used = 0;
    for group in groups {
        let size = group.duplicates.len();
        if used + size <= budget {
            used += size;
            admitted.push(group);
        } else {
            debug!(
                "Deletion cap: group '{}' with {} candidates not admitted",
                group.primary.title, size
            );
        }
    }

    warnings.push(format!(
        "Deletion cap {} reached: admitted {} of {} candidate deletions",
        budget, used, total
    ));

    admitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::parse_rfc3339;
    use chrono::DateTime;

    fn event(
        id: &str,
        title: &str,
        start: &str,
        created: &str,
        description: Option<&str>,
    ) -> DestinationEvent {
        let start: DateTime<Utc> = parse_rfc3339(start).unwrap();
        DestinationEvent {
            id: id.to_string(),
            calendar_id: "primary".to_string(),
            title: title.to_string(),
            description: description.map(String::from),
            location: None,
            start,
            end: start + Duration::hours(1),
            created_at: parse_rfc3339(created).unwrap(),
        }
    }

    #[test]
    fn exact_duplicates_form_one_group_with_earliest_primary() {
        let events = vec![
            event(
                "newer",
                "Standup",
                "2024-08-15T10:00:00Z",
                "2024-08-10T00:00:00Z",
                None,
            ),
            event(
                "older",
                "Standup",
                "2024-08-15T10:00:00Z",
                "2024-08-01T00:00:00Z",
                None,
            ),
        ];

        let groups = analyze(&events, false);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].match_type, MatchType::Exact);
        assert_eq!(groups[0].confidence, 100);
        assert_eq!(groups[0].primary.id, "older");
        assert_eq!(groups[0].duplicates.len(), 1);
        assert_eq!(groups[0].duplicates[0].id, "newer");
    }

    #[test]
    fn preserve_newest_flips_the_primary() {
        let events = vec![
            event(
                "newer",
                "Standup",
                "2024-08-15T10:00:00Z",
                "2024-08-10T00:00:00Z",
                None,
            ),
            event(
                "older",
                "Standup",
                "2024-08-15T10:00:00Z",
                "2024-08-01T00:00:00Z",
                None,
            ),
        ];

        let groups = analyze(&events, true);
        assert_eq!(groups[0].primary.id, "newer");
    }

    #[test]
    fn fuzzy_group_within_two_hours_is_accepted() {
        // Different descriptions keep these out of the exact pass
        let events = vec![
            event(
                "a",
                "Standup for the team",
                "2024-08-15T10:00:00Z",
                "2024-08-01T00:00:00Z",
                Some("first copy"),
            ),
            event(
                "b",
                "Standup team",
                "2024-08-15T10:30:00Z",
                "2024-08-02T00:00:00Z",
                Some("second copy"),
            ),
        ];

        let groups = analyze(&events, false);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].match_type, MatchType::Fuzzy);
        assert_eq!(groups[0].confidence, 85);
    }

    #[test]
    fn fuzzy_group_beyond_two_hours_is_discarded() {
        let events = vec![
            event(
                "a",
                "Standup",
                "2024-08-15T10:00:00Z",
                "2024-08-01T00:00:00Z",
                Some("first copy"),
            ),
            event(
                "b",
                "Standup",
                "2024-08-15T13:30:00Z",
                "2024-08-02T00:00:00Z",
                Some("second copy"),
            ),
        ];

        // Different hours give different fuzzy hashes anyway; force the
        // collision through an identical floored start by checking the
        // guard directly
        let refs: Vec<&DestinationEvent> = events.iter().collect();
        assert!(!fuzzy_group_holds(&refs));
        assert!(analyze(&events, false).is_empty());
    }

    #[test]
    fn pattern_pass_groups_by_backlink() {
        let events = vec![
            event(
                "a",
                "Planning",
                "2024-08-15T10:00:00Z",
                "2024-08-01T00:00:00Z",
                Some("notes\nOriginal UID: m1"),
            ),
            event(
                "b",
                "Planning (moved)",
                "2024-08-16T09:00:00Z",
                "2024-08-02T00:00:00Z",
                Some("other notes\nOriginal UID: m1"),
            ),
        ];

        let groups = analyze(&events, false);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].match_type, MatchType::Pattern);
        assert_eq!(groups[0].confidence, 95);
        assert_eq!(groups[0].primary.id, "a");
    }

    #[test]
    fn earlier_passes_claim_events_first() {
        // Identical content and a shared backlink: the exact pass wins
        let events = vec![
            event(
                "a",
                "Standup",
                "2024-08-15T10:00:00Z",
                "2024-08-01T00:00:00Z",
                Some("Original UID: m1"),
            ),
            event(
                "b",
                "Standup",
                "2024-08-15T10:00:00Z",
                "2024-08-02T00:00:00Z",
                Some("Original UID: m1"),
            ),
        ];

        let groups = analyze(&events, false);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].match_type, MatchType::Exact);
    }

    #[test]
    fn budget_admits_whole_groups_by_confidence() {
        let mut groups = Vec::new();
        for i in 0..5 {
            let a = event(
                &format!("p{}", i),
                "Standup",
                "2024-08-15T10:00:00Z",
                "2024-08-01T00:00:00Z",
                None,
            );
            let b = event(
                &format!("d{}", i),
                "Standup",
                "2024-08-15T10:00:00Z",
                "2024-08-02T00:00:00Z",
                None,
            );
            let c = b.clone();
            groups.push(DuplicateGroup {
                primary: a,
                duplicates: vec![b, c],
                match_type: MatchType::Exact,
                confidence: 100,
            });
        }

        let mut warnings = Vec::new();
        let admitted = admit_within_budget(groups, Some(5), &mut warnings);

        let total: usize = admitted.iter().map(|g| g.duplicates.len()).sum();
        assert_eq!(total, 4);
        assert_eq!(warnings.len(), 1);
    }
}
