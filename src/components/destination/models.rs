use crate::utils::time::{parse_all_day, parse_rfc3339};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A calendar entry that exists at the destination.
///
/// Only validated records reach matching and grouping; anything the API
/// returns without an id, title or start is dropped at the parse step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationEvent {
    pub id: String,
    pub calendar_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of validating one raw destination record
#[derive(Debug)]
pub enum Validated {
    Valid(Box<DestinationEvent>),
    Invalid { id: Option<String>, reason: String },
}

impl DestinationEvent {
    /// Validate a raw Google Calendar event object
    pub fn from_raw(raw: &Value, calendar_id: &str) -> Validated {
        let id = raw.get("id").and_then(|v| v.as_str()).map(String::from);

        let Some(id) = id else {
            return Validated::Invalid {
                id: None,
                reason: "missing id".to_string(),
            };
        };

        let Some(title) = raw.get("summary").and_then(|v| v.as_str()) else {
            return Validated::Invalid {
                id: Some(id),
                reason: "missing summary".to_string(),
            };
        };

        let start = match parse_event_time(raw.get("start")) {
            Some(Ok(start)) => start,
            Some(Err(e)) => {
                return Validated::Invalid {
                    id: Some(id),
                    reason: e.to_string(),
                }
            }
            None => {
                return Validated::Invalid {
                    id: Some(id),
                    reason: "missing start".to_string(),
                }
            }
        };

        // A missing or malformed end collapses to the start instant
        let end = match parse_event_time(raw.get("end")) {
            Some(Ok(end)) => end,
            _ => start,
        };

        let created_at = raw
            .get("created")
            .and_then(|v| v.as_str())
            .and_then(|s| parse_rfc3339(s).ok())
            .unwrap_or(start);

        Validated::Valid(Box::new(DestinationEvent {
            id,
            calendar_id: calendar_id.to_string(),
            title: title.to_string(),
            description: raw
                .get("description")
                .and_then(|v| v.as_str())
                .map(String::from),
            location: raw
                .get("location")
                .and_then(|v| v.as_str())
                .map(String::from),
            start,
            end,
            created_at,
        }))
    }
}

/// Parse a Google event time object, either `dateTime` or all-day `date`
fn parse_event_time(value: Option<&Value>) -> Option<crate::error::BridgeResult<DateTime<Utc>>> {
    let obj = value?.as_object()?;

    if let Some(date_time) = obj.get("dateTime").and_then(|v| v.as_str()) {
        return Some(parse_rfc3339(date_time));
    }

    obj.get("date")
        .and_then(|v| v.as_str())
        .map(parse_all_day)
}

/// Write-side event body sent to the destination on insert and update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub title: String,
    /// Description with the backlink marker already embedded
    pub description: String,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl EventPayload {
    /// Render the Google Calendar request body
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "summary": self.title,
            "description": self.description,
            "start": { "dateTime": self.start.to_rfc3339() },
            "end": { "dateTime": self.end.to_rfc3339() },
        });

        if let Some(location) = &self.location {
            body["location"] = json!(location);
        }

        body
    }
}
