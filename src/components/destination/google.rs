use super::models::{DestinationEvent, EventPayload, Validated};
use super::CalendarApi;
use crate::error::{auth_expired_error, calendar_api_error, BridgeResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use tracing::warn;
use url::Url;

const API_BASE: &str = "https://www.googleapis.com/calendar/v3/calendars";

/// Supplies a valid access token for destination calls. Token refresh and
/// OAuth lifecycle live outside this crate.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> BridgeResult<String>;
}

/// Token provider backed by a pre-issued token from configuration
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> BridgeResult<String> {
        Ok(self.token.clone())
    }
}

/// Google Calendar REST implementation of the destination collaborator
pub struct GoogleCalendarApi {
    client: Client,
    token_provider: Arc<dyn AccessTokenProvider>,
}

impl GoogleCalendarApi {
    pub fn new(token_provider: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            client: Client::new(),
            token_provider,
        }
    }

    fn events_url(&self, calendar_id: &str) -> BridgeResult<Url> {
        Url::parse(&format!("{}/{}/events", API_BASE, calendar_id))
            .map_err(|e| calendar_api_error(&format!("Failed to build URL: {}", e)))
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> BridgeResult<Url> {
        Url::parse(&format!("{}/{}/events/{}", API_BASE, calendar_id, event_id))
            .map_err(|e| calendar_api_error(&format!("Failed to build URL: {}", e)))
    }

    /// Map a non-success response into the error taxonomy
    async fn check_status(&self, response: Response, context: &str) -> BridgeResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Could not read error response".to_string());

        if status == StatusCode::UNAUTHORIZED {
            return Err(auth_expired_error(&format!(
                "{}: HTTP 401 - {}",
                context, body
            )));
        }

        Err(calendar_api_error(&format!(
            "{}: HTTP {} - {}",
            context, status, body
        )))
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendarApi {
    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> BridgeResult<Vec<DestinationEvent>> {
        let access_token = self.token_provider.access_token().await?;

        let mut url = self.events_url(calendar_id)?;
        url.query_pairs_mut()
            .append_pair("timeMin", &time_min.to_rfc3339())
            .append_pair("timeMax", &time_max.to_rfc3339())
            .append_pair("singleEvents", "true")
            .append_pair("orderBy", "startTime");

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(|e| calendar_api_error(&format!("Failed to list events: {}", e)))?;

        let response = self.check_status(response, "Failed to list events").await?;

        let response_data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| calendar_api_error(&format!("Failed to parse listing: {}", e)))?;

        let items = response_data
            .get("items")
            .and_then(|i| i.as_array())
            .ok_or_else(|| calendar_api_error("No items in listing response"))?;

        // Malformed records are dropped here so matching only ever sees
        // validated events
        let mut events = Vec::with_capacity(items.len());
        for raw in items {
            match DestinationEvent::from_raw(raw, calendar_id) {
                Validated::Valid(event) => events.push(*event),
                Validated::Invalid { id, reason } => {
                    warn!(
                        "Dropping malformed destination event {:?}: {}",
                        id.as_deref().unwrap_or("<no id>"),
                        reason
                    );
                }
            }
        }

        Ok(events)
    }

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> BridgeResult<DestinationEvent> {
        let access_token = self.token_provider.access_token().await?;
        let url = self.event_url(calendar_id, event_id)?;

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(|e| calendar_api_error(&format!("Failed to fetch event: {}", e)))?;

        let response = self.check_status(response, "Failed to fetch event").await?;

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| calendar_api_error(&format!("Failed to parse event: {}", e)))?;

        match DestinationEvent::from_raw(&raw, calendar_id) {
            Validated::Valid(event) => Ok(*event),
            Validated::Invalid { reason, .. } => Err(crate::error::data_error(&format!(
                "Event {} failed validation: {}",
                event_id, reason
            ))),
        }
    }

    async fn insert_event(
        &self,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> BridgeResult<String> {
        let access_token = self.token_provider.access_token().await?;
        let url = self.events_url(calendar_id)?;

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", access_token))
            .json(&payload.to_json())
            .send()
            .await
            .map_err(|e| calendar_api_error(&format!("Failed to insert event: {}", e)))?;

        let response = self.check_status(response, "Failed to insert event").await?;

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| calendar_api_error(&format!("Failed to parse insert response: {}", e)))?;

        raw.get("id")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| calendar_api_error("Insert response carried no event id"))
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
    ) -> BridgeResult<()> {
        let access_token = self.token_provider.access_token().await?;
        let url = self.event_url(calendar_id, event_id)?;

        let response = self
            .client
            .put(url)
            .header("Authorization", format!("Bearer {}", access_token))
            .json(&payload.to_json())
            .send()
            .await
            .map_err(|e| calendar_api_error(&format!("Failed to update event: {}", e)))?;

        self.check_status(response, "Failed to update event").await?;
        Ok(())
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> BridgeResult<()> {
        let access_token = self.token_provider.access_token().await?;
        let url = self.event_url(calendar_id, event_id)?;

        let response = self
            .client
            .delete(url)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(|e| calendar_api_error(&format!("Failed to delete event: {}", e)))?;

        self.check_status(response, "Failed to delete event").await?;
        Ok(())
    }
}
