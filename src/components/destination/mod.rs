use crate::error::BridgeResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::warn;

pub mod google;
pub mod models;

pub use models::{DestinationEvent, EventPayload, Validated};

/// Destination calendar collaborator.
///
/// Every operation may fail with the distinguished auth-expired condition,
/// which is fatal to the whole pass that hits it.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    /// List validated events in a time window
    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> BridgeResult<Vec<DestinationEvent>>;

    /// Fetch a single event by id
    async fn get_event(&self, calendar_id: &str, event_id: &str) -> BridgeResult<DestinationEvent>;

    /// Insert an event and return the destination-assigned id
    async fn insert_event(&self, calendar_id: &str, payload: &EventPayload)
        -> BridgeResult<String>;

    /// Overwrite an existing event
    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
    ) -> BridgeResult<()>;

    /// Delete an event
    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> BridgeResult<()>;
}

/// Bounded retry schedule for the destination listing call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
        }
    }
}

/// List destination events, retrying transient failures under `policy`.
///
/// Auth-expired failures are never retried; a dead credential cannot
/// recover within a pass.
pub async fn list_with_retry(
    api: &dyn CalendarApi,
    policy: &RetryPolicy,
    calendar_id: &str,
    time_min: DateTime<Utc>,
    time_max: DateTime<Utc>,
) -> BridgeResult<Vec<DestinationEvent>> {
    let mut delay = policy.initial_delay;
    let mut attempt = 1;

    loop {
        match api.list_events(calendar_id, time_min, time_max).await {
            Ok(events) => return Ok(events),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                warn!(
                    "Listing {} failed on attempt {}/{}: {}",
                    calendar_id, attempt, policy.max_attempts, e
                );
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(policy.backoff_factor);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
