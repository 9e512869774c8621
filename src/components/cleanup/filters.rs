use super::DuplicateGroup;
use crate::components::destination::DestinationEvent;
use crate::error::{config_error, BridgeResult};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Post-grouping cleanup filters. A group survives only if at least one
/// member satisfies every active filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupFilters {
    /// Earliest event start to consider
    pub date_from: Option<DateTime<Utc>>,
    /// Latest event start to consider
    pub date_to: Option<DateTime<Utc>>,
    /// Allow-list of calendar ids
    pub calendar_ids: Option<Vec<String>>,
    /// Case-insensitive title substring
    pub title_contains: Option<String>,
    /// Case-insensitive description substring
    pub description_contains: Option<String>,
    /// Regex a title must match
    pub include_pattern: Option<String>,
    /// Regex a title must not match
    pub exclude_pattern: Option<String>,
    /// Creation-date lower bound
    pub created_after: Option<DateTime<Utc>>,
    /// Creation-date upper bound
    pub created_before: Option<DateTime<Utc>>,
}

/// Filters with their regexes compiled once, before any collaborator call
pub struct CompiledFilters {
    filters: CleanupFilters,
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl CompiledFilters {
    /// Compile the filter set. A malformed regex is a configuration error
    /// raised before the destination is ever contacted.
    pub fn compile(filters: &CleanupFilters) -> BridgeResult<Self> {
        let include = filters
            .include_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| config_error(&format!("Invalid include pattern: {}", e)))?;

        let exclude = filters
            .exclude_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| config_error(&format!("Invalid exclude pattern: {}", e)))?;

        Ok(Self {
            filters: filters.clone(),
            include,
            exclude,
        })
    }

    /// Whether one event satisfies every active filter
    fn event_passes(&self, event: &DestinationEvent) -> bool {
        let f = &self.filters;

        if let Some(from) = f.date_from {
            if event.start < from {
                return false;
            }
        }
        if let Some(to) = f.date_to {
            if event.start > to {
                return false;
            }
        }

        if let Some(calendar_ids) = &f.calendar_ids {
            if !calendar_ids.contains(&event.calendar_id) {
                return false;
            }
        }

        if let Some(needle) = &f.title_contains {
            if !event.title.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }

        if let Some(needle) = &f.description_contains {
            let haystack = event.description.as_deref().unwrap_or("").to_lowercase();
            if !haystack.contains(&needle.to_lowercase()) {
                return false;
            }
        }

        if let Some(include) = &self.include {
            if !include.is_match(&event.title) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(&event.title) {
                return false;
            }
        }

        if let Some(after) = f.created_after {
            if event.created_at < after {
                return false;
            }
        }
        if let Some(before) = f.created_before {
            if event.created_at > before {
                return false;
            }
        }

        true
    }

    /// Group survival rule: at least one member passes all active filters
    pub fn group_survives(&self, group: &DuplicateGroup) -> bool {
        if self.event_passes(&group.primary) {
            return true;
        }
        group.duplicates.iter().any(|event| self.event_passes(event))
    }
}
