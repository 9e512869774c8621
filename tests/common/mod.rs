use async_trait::async_trait;
use calbridge::components::destination::{CalendarApi, DestinationEvent, EventPayload};
use calbridge::components::source::{IcsFeed, SourceOccurrence, SyncWindow};
use calbridge::error::{auth_expired_error, calendar_api_error, BridgeResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Mock destination calendar with call recording and failure injection
#[derive(Default)]
pub struct MockCalendarApi {
    pub events: Mutex<Vec<DestinationEvent>>,
    /// Every operation in order, e.g. "list", "insert:Standup", "delete:d1"
    pub calls: Mutex<Vec<String>>,
    /// Titles whose insert fails transiently
    pub fail_insert_titles: Mutex<Vec<String>>,
    /// Event ids whose delete fails transiently
    pub fail_delete_ids: Mutex<Vec<String>>,
    /// Titles whose insert fails with the auth-expired condition
    pub auth_expired_titles: Mutex<Vec<String>>,
    /// Fail every operation with the auth-expired condition
    pub auth_expired: AtomicBool,
    next_id: AtomicUsize,
}

impl MockCalendarApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<DestinationEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            ..Default::default()
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_auth(&self, context: &str) -> BridgeResult<()> {
        if self.auth_expired.load(Ordering::SeqCst) {
            return Err(auth_expired_error(context));
        }
        Ok(())
    }

    /// Number of recorded calls starting with `prefix`
    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl CalendarApi for MockCalendarApi {
    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> BridgeResult<Vec<DestinationEvent>> {
        self.record("list".to_string());
        self.check_auth("list")?;

        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| {
                event.calendar_id == calendar_id
                    && event.start >= time_min
                    && event.start <= time_max
            })
            .cloned()
            .collect())
    }

    async fn get_event(&self, _calendar_id: &str, event_id: &str) -> BridgeResult<DestinationEvent> {
        self.record(format!("get:{}", event_id));
        self.check_auth("get")?;

        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|event| event.id == event_id)
            .cloned()
            .ok_or_else(|| calendar_api_error(&format!("No event {}", event_id)))
    }

    async fn insert_event(
        &self,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> BridgeResult<String> {
        self.record(format!("insert:{}", payload.title));
        self.check_auth("insert")?;

        if self
            .auth_expired_titles
            .lock()
            .unwrap()
            .contains(&payload.title)
        {
            return Err(auth_expired_error(&format!("insert {}", payload.title)));
        }
        if self
            .fail_insert_titles
            .lock()
            .unwrap()
            .contains(&payload.title)
        {
            return Err(calendar_api_error(&format!(
                "Forced insert failure for {}",
                payload.title
            )));
        }

        let id = format!("dest-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.events.lock().unwrap().push(DestinationEvent {
            id: id.clone(),
            calendar_id: calendar_id.to_string(),
            title: payload.title.clone(),
            description: Some(payload.description.clone()),
            location: payload.location.clone(),
            start: payload.start,
            end: payload.end,
            created_at: Utc::now(),
        });

        Ok(id)
    }

    async fn update_event(
        &self,
        _calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
    ) -> BridgeResult<()> {
        self.record(format!("update:{}", event_id));
        self.check_auth("update")?;

        let mut events = self.events.lock().unwrap();
        let event = events
            .iter_mut()
            .find(|event| event.id == event_id)
            .ok_or_else(|| calendar_api_error(&format!("No event {}", event_id)))?;

        event.title = payload.title.clone();
        event.description = Some(payload.description.clone());
        event.location = payload.location.clone();
        event.start = payload.start;
        event.end = payload.end;

        Ok(())
    }

    async fn delete_event(&self, _calendar_id: &str, event_id: &str) -> BridgeResult<()> {
        self.record(format!("delete:{}", event_id));
        self.check_auth("delete")?;

        if self.fail_delete_ids.lock().unwrap().iter().any(|id| id == event_id) {
            return Err(calendar_api_error(&format!(
                "Forced delete failure for {}",
                event_id
            )));
        }

        self.events.lock().unwrap().retain(|event| event.id != event_id);
        Ok(())
    }
}

/// Mock recurrence-expansion collaborator serving a fixed occurrence list
pub struct MockIcsFeed {
    pub occurrences: Vec<SourceOccurrence>,
}

#[async_trait]
impl IcsFeed for MockIcsFeed {
    async fn expand(&self, _window: SyncWindow) -> BridgeResult<Vec<SourceOccurrence>> {
        Ok(self.occurrences.clone())
    }
}

fn naive(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").unwrap()
}

fn instant(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .unwrap()
        .with_timezone(&Utc)
}

/// Source occurrence with UTC-naive times and no TZID
#[allow(dead_code)]
pub fn occurrence(uid: &str, title: &str, start: &str, end: &str) -> SourceOccurrence {
    SourceOccurrence {
        uid: uid.to_string(),
        title: title.to_string(),
        description: Some(format!("{} agenda", title)),
        location: None,
        start: naive(start),
        end: naive(end),
        status: None,
        source_timezone: None,
    }
}

/// Destination event on the "primary" calendar
#[allow(dead_code)]
pub fn destination_event(
    id: &str,
    title: &str,
    start: &str,
    created: &str,
    description: Option<&str>,
) -> DestinationEvent {
    destination_event_at(id, title, instant(start), instant(created), description)
}

/// Destination event on the "primary" calendar at an arbitrary instant
#[allow(dead_code)]
pub fn destination_event_at(
    id: &str,
    title: &str,
    start: DateTime<Utc>,
    created: DateTime<Utc>,
    description: Option<&str>,
) -> DestinationEvent {
    DestinationEvent {
        id: id.to_string(),
        calendar_id: "primary".to_string(),
        title: title.to_string(),
        description: description.map(String::from),
        location: None,
        start,
        end: start + chrono::Duration::hours(1),
        created_at: created,
    }
}
