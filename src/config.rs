use crate::components::cleanup::filters::CleanupFilters;
use crate::error::{config_error, env_error, BridgeResult};
use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;

/// Default path for the optional cleanup filter file
pub const CLEANUP_FILTERS_FILE: &str = "config/cleanup.toml";

/// Main configuration structure for the bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Access token for the destination calendar
    pub google_access_token: String,
    /// Destination calendar to mirror into
    pub google_calendar_id: String,
    /// URL of the external ICS feed
    pub ics_feed_url: String,
    /// Fallback timezone for occurrences without a TZID
    pub timezone: String,
    /// How far ahead a reconciliation window reaches, in days
    pub sync_window_days: i64,
    /// Seconds between scheduled reconciliation passes
    pub sync_interval_secs: u64,
    /// Redis connection URL
    pub redis_url: String,
    /// Cleanup mode: "dry-run", "batch" or "interactive"
    pub cleanup_mode: String,
    /// Hard cap on deletions per cleanup operation
    pub cleanup_max_deletions: Option<usize>,
    /// Snapshot each duplicate before deleting it
    pub cleanup_create_backup: bool,
    /// Keep the newest copy in a group instead of the oldest
    pub cleanup_preserve_newest: bool,
    /// Substrings that protect a group from deletion
    pub cleanup_skip_patterns: Vec<String>,
}

impl Config {
    /// Load configuration from environment and config file
    pub fn load() -> BridgeResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        // Required environment variables
        let google_access_token =
            env::var("GOOGLE_ACCESS_TOKEN").map_err(|_| env_error("GOOGLE_ACCESS_TOKEN"))?;

        // The sync target is required before any collaborator call is made
        let google_calendar_id = env::var("GOOGLE_CALENDAR_ID")
            .map_err(|_| config_error("Missing required sync target GOOGLE_CALENDAR_ID"))?;

        let ics_feed_url = env::var("ICS_FEED_URL").unwrap_or_default();

        // Default timezone
        let timezone = env::var("TIMEZONE").unwrap_or_else(|_| String::from("UTC"));

        let sync_window_days = env::var("SYNC_WINDOW_DAYS")
            .unwrap_or_else(|_| String::from("28"))
            .parse::<i64>()
            .map_err(|_| config_error("Invalid SYNC_WINDOW_DAYS format"))?;

        let sync_interval_secs = env::var("SYNC_INTERVAL_SECS")
            .unwrap_or_else(|_| String::from("900"))
            .parse::<u64>()
            .map_err(|_| config_error("Invalid SYNC_INTERVAL_SECS format"))?;

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| String::from("redis://127.0.0.1:6379"));

        let cleanup_mode = env::var("CLEANUP_MODE").unwrap_or_else(|_| String::from("dry-run"));

        let cleanup_max_deletions = match env::var("CLEANUP_MAX_DELETIONS") {
            Ok(value) => Some(
                value
                    .parse::<usize>()
                    .map_err(|_| config_error("Invalid CLEANUP_MAX_DELETIONS format"))?,
            ),
            Err(_) => None,
        };

        let cleanup_create_backup = env::var("CLEANUP_CREATE_BACKUP")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let cleanup_preserve_newest = env::var("CLEANUP_PRESERVE_NEWEST")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let cleanup_skip_patterns = env::var("CLEANUP_SKIP_PATTERNS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Config {
            google_access_token,
            google_calendar_id,
            ics_feed_url,
            timezone,
            sync_window_days,
            sync_interval_secs,
            redis_url,
            cleanup_mode,
            cleanup_max_deletions,
            cleanup_create_backup,
            cleanup_preserve_newest,
            cleanup_skip_patterns,
        })
    }

    /// Resolve the configured fallback timezone
    pub fn default_tz(&self) -> BridgeResult<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| config_error(&format!("Unknown timezone: {}", self.timezone)))
    }

    /// Load cleanup filters from the config file if it exists
    pub fn load_cleanup_filters(&self) -> BridgeResult<CleanupFilters> {
        match fs::read_to_string(CLEANUP_FILTERS_FILE) {
            Ok(content) => Ok(toml::from_str::<CleanupFilters>(&content)?),
            Err(_) => Ok(CleanupFilters::default()),
        }
    }
}
