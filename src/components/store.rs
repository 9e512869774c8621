use crate::components::cleanup::backup::Backup;
use crate::config::Config;
use crate::error::{store_error, BridgeResult};
use chrono::{DateTime, Utc};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::info;

// Redis key prefixes
pub mod keys {
    pub const UID_MAPPINGS: &str = "calbridge:mappings";
    pub const BACKUP: &str = "calbridge:backup";
}

/// Durable link from a source occurrence to its destination twin.
///
/// The text marker embedded in the event description is only a best-effort,
/// human-visible fallback; this mapping is the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UidMapping {
    pub source_uid: String,
    pub destination_id: String,
    /// Canonical start instant the matching key was built from
    pub start: DateTime<Utc>,
}

/// The store actor that processes persistence commands
pub struct StoreActor {
    config: Arc<RwLock<Config>>,
    client: RedisClient,
    command_rx: mpsc::Receiver<StoreCommand>,
}

/// Commands that can be sent to the store actor
pub enum StoreCommand {
    SaveMappings(String, Vec<UidMapping>, mpsc::Sender<BridgeResult<()>>),
    GetMappings(String, mpsc::Sender<BridgeResult<Vec<UidMapping>>>),
    SaveBackup(Box<Backup>, mpsc::Sender<BridgeResult<()>>),
    GetBackup(String, mpsc::Sender<BridgeResult<Option<Backup>>>),
    DeleteBackup(String, mpsc::Sender<BridgeResult<()>>),
    Shutdown,
}

/// Handle for communicating with the store actor
#[derive(Clone)]
pub struct StoreActorHandle {
    command_tx: mpsc::Sender<StoreCommand>,
}

impl StoreActorHandle {
    /// Create a new empty handle for initialization and tests; every
    /// operation on it fails with a store error
    pub fn empty() -> Self {
        let (command_tx, _) = mpsc::channel(32);
        Self { command_tx }
    }

    /// Persist uid mappings for a calendar
    pub async fn save_mappings(
        &self,
        calendar_id: &str,
        mappings: Vec<UidMapping>,
    ) -> BridgeResult<()> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(StoreCommand::SaveMappings(
                calendar_id.to_string(),
                mappings,
                response_tx,
            ))
            .await
            .map_err(|e| store_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| store_error("Response channel closed"))?
    }

    /// Load all uid mappings for a calendar
    pub async fn get_mappings(&self, calendar_id: &str) -> BridgeResult<Vec<UidMapping>> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(StoreCommand::GetMappings(
                calendar_id.to_string(),
                response_tx,
            ))
            .await
            .map_err(|e| store_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| store_error("Response channel closed"))?
    }

    /// Persist a cleanup backup snapshot
    pub async fn save_backup(&self, backup: Backup) -> BridgeResult<()> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(StoreCommand::SaveBackup(Box::new(backup), response_tx))
            .await
            .map_err(|e| store_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| store_error("Response channel closed"))?
    }

    /// Fetch a backup snapshot by operation id
    pub async fn get_backup(&self, backup_id: &str) -> BridgeResult<Option<Backup>> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(StoreCommand::GetBackup(backup_id.to_string(), response_tx))
            .await
            .map_err(|e| store_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| store_error("Response channel closed"))?
    }

    /// Expire a backup snapshot
    pub async fn delete_backup(&self, backup_id: &str) -> BridgeResult<()> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(StoreCommand::DeleteBackup(
                backup_id.to_string(),
                response_tx,
            ))
            .await
            .map_err(|e| store_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| store_error("Response channel closed"))?
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> BridgeResult<()> {
        let _ = self.command_tx.send(StoreCommand::Shutdown).await;
        Ok(())
    }
}

impl StoreActor {
    /// Create a new actor and return its handle
    pub fn new(config: Arc<RwLock<Config>>) -> (Self, StoreActorHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);

        // Default client; the configured URL is applied on connection
        let redis_url = "redis://127.0.0.1:6379".to_string();
        let client = RedisClient::open(redis_url).expect("Failed to create Redis client");

        let actor = Self {
            config,
            client,
            command_rx,
        };

        let handle = StoreActorHandle { command_tx };

        (actor, handle)
    }

    /// Start the actor's processing loop
    pub async fn run(&mut self) {
        info!("Store actor started");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                StoreCommand::SaveMappings(calendar_id, mappings, response_tx) => {
                    let result = self.save_mappings_to_redis(&calendar_id, mappings).await;
                    let _ = response_tx.send(result).await;
                }
                StoreCommand::GetMappings(calendar_id, response_tx) => {
                    let result = self.get_mappings_from_redis(&calendar_id).await;
                    let _ = response_tx.send(result).await;
                }
                StoreCommand::SaveBackup(backup, response_tx) => {
                    let result = self.save_backup_to_redis(*backup).await;
                    let _ = response_tx.send(result).await;
                }
                StoreCommand::GetBackup(backup_id, response_tx) => {
                    let result = self.get_backup_from_redis(&backup_id).await;
                    let _ = response_tx.send(result).await;
                }
                StoreCommand::DeleteBackup(backup_id, response_tx) => {
                    let result = self.delete_backup_from_redis(&backup_id).await;
                    let _ = response_tx.send(result).await;
                }
                StoreCommand::Shutdown => {
                    info!("Store actor shutting down");
                    break;
                }
            }
        }

        info!("Store actor shut down");
    }

    /// Get a redis connection
    async fn get_redis_connection(&self) -> BridgeResult<MultiplexedConnection> {
        let redis_url = {
            let config_guard = self.config.read().await;
            config_guard.redis_url.clone()
        };

        // Reconnect with the proper URL if needed
        let client = if redis_url != "redis://127.0.0.1:6379" {
            RedisClient::open(redis_url)
                .map_err(|e| store_error(&format!("Failed to create Redis client: {}", e)))?
        } else {
            self.client.clone()
        };

        client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| store_error(&format!("Failed to connect to Redis: {}", e)))
    }

    fn mappings_key(calendar_id: &str) -> String {
        format!("{}:{}", keys::UID_MAPPINGS, calendar_id)
    }

    fn backup_key(backup_id: &str) -> String {
        format!("{}:{}", keys::BACKUP, backup_id)
    }

    /// Merge new mappings into the stored per-calendar map
    async fn save_mappings_to_redis(
        &self,
        calendar_id: &str,
        mappings: Vec<UidMapping>,
    ) -> BridgeResult<()> {
        let mut existing = self.get_mappings_from_redis(calendar_id).await?;
        let mut by_uid: HashMap<String, UidMapping> = existing
            .drain(..)
            .map(|m| (m.source_uid.clone(), m))
            .collect();

        for mapping in mappings {
            by_uid.insert(mapping.source_uid.clone(), mapping);
        }

        let mut redis_conn = self.get_redis_connection().await?;
        let payload = serde_json::to_string(&by_uid.into_values().collect::<Vec<_>>())
            .map_err(|e| store_error(&format!("Failed to serialize mappings: {}", e)))?;

        let _: () = redis_conn
            .set(Self::mappings_key(calendar_id), payload)
            .await
            .map_err(|e| store_error(&format!("Failed to save mappings to Redis: {}", e)))?;

        Ok(())
    }

    async fn get_mappings_from_redis(&self, calendar_id: &str) -> BridgeResult<Vec<UidMapping>> {
        let mut redis_conn = self.get_redis_connection().await?;
        let key = Self::mappings_key(calendar_id);

        let exists: bool = redis_conn
            .exists(&key)
            .await
            .map_err(|e| store_error(&format!("Redis error: {}", e)))?;

        if !exists {
            return Ok(Vec::new());
        }

        let payload: String = redis_conn
            .get(&key)
            .await
            .map_err(|e| store_error(&format!("Failed to read mappings from Redis: {}", e)))?;

        serde_json::from_str(&payload)
            .map_err(|e| store_error(&format!("Failed to deserialize mappings: {}", e)))
    }

    async fn save_backup_to_redis(&self, backup: Backup) -> BridgeResult<()> {
        let mut redis_conn = self.get_redis_connection().await?;
        let payload = serde_json::to_string(&backup)
            .map_err(|e| store_error(&format!("Failed to serialize backup: {}", e)))?;

        let _: () = redis_conn
            .set(Self::backup_key(&backup.id), payload)
            .await
            .map_err(|e| store_error(&format!("Failed to save backup to Redis: {}", e)))?;

        Ok(())
    }

    async fn get_backup_from_redis(&self, backup_id: &str) -> BridgeResult<Option<Backup>> {
        let mut redis_conn = self.get_redis_connection().await?;
        let key = Self::backup_key(backup_id);

        let exists: bool = redis_conn
            .exists(&key)
            .await
            .map_err(|e| store_error(&format!("Redis error: {}", e)))?;

        if !exists {
            return Ok(None);
        }

        let payload: String = redis_conn
            .get(&key)
            .await
            .map_err(|e| store_error(&format!("Failed to read backup from Redis: {}", e)))?;

        serde_json::from_str(&payload)
            .map(Some)
            .map_err(|e| store_error(&format!("Failed to deserialize backup: {}", e)))
    }

    async fn delete_backup_from_redis(&self, backup_id: &str) -> BridgeResult<()> {
        let mut redis_conn = self.get_redis_connection().await?;

        let _: () = redis_conn
            .del(Self::backup_key(backup_id))
            .await
            .map_err(|e| store_error(&format!("Failed to delete backup from Redis: {}", e)))?;

        Ok(())
    }
}
