use crate::components::destination::{CalendarApi, DestinationEvent, EventPayload};
use crate::components::store::StoreActorHandle;
use crate::error::{store_error, BridgeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// One snapshotted duplicate, enough to re-insert the event verbatim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEntry {
    pub event: DestinationEvent,
}

/// Snapshot of every candidate duplicate taken immediately before a
/// cleanup operation deletes them. Persists until explicitly expired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backup {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<BackupEntry>,
}

impl Backup {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            entries: Vec::new(),
        }
    }
}

impl Default for Backup {
    fn default() -> Self {
        Self::new()
    }
}

/// Re-insert every event in a backup. Returns the number restored.
pub async fn restore_backup(
    api: &dyn CalendarApi,
    store: &StoreActorHandle,
    backup_id: &str,
) -> BridgeResult<usize> {
    let backup = store
        .get_backup(backup_id)
        .await?
        .ok_or_else(|| store_error(&format!("No backup with id {}", backup_id)))?;

    let restored = reinsert_entries(api, &backup).await?;
    info!("Restored {} events from backup {}", restored, backup_id);
    Ok(restored)
}

/// Re-insert the snapshotted events onto their original calendars
pub async fn reinsert_entries(api: &dyn CalendarApi, backup: &Backup) -> BridgeResult<usize> {
    let mut restored = 0;
    for entry in &backup.entries {
        let event = &entry.event;
        let payload = EventPayload {
            title: event.title.clone(),
            description: event.description.clone().unwrap_or_default(),
            location: event.location.clone(),
            start: event.start,
            end: event.end,
        };

        api.insert_event(&event.calendar_id, &payload).await?;
        restored += 1;
    }

    Ok(restored)
}

/// Expire a backup snapshot once it is no longer needed
pub async fn expire_backup(store: &StoreActorHandle, backup_id: &str) -> BridgeResult<()> {
    store.delete_backup(backup_id).await
}
