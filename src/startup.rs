use crate::components::cleanup::{CleanupEngine, CleanupMode, CleanupOptions, CleanupReport};
use crate::components::destination::google::{GoogleCalendarApi, StaticTokenProvider};
use crate::components::destination::CalendarApi;
use crate::components::source::{IcsFeed, SyncWindow};
use crate::components::store::{StoreActor, StoreActorHandle};
use crate::components::sync::SyncEngine;
use crate::config::Config;
use crate::error::Error;
use crate::utils::scheduler::RefreshScheduler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration
pub fn init_logging() -> miette::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load and initialize the application config
pub async fn load_config() -> miette::Result<Arc<RwLock<Config>>> {
    match Config::load() {
        Ok(config) => Ok(Arc::new(RwLock::new(config))),
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Spawn the store actor and return its handle
pub fn start_store(config: Arc<RwLock<Config>>) -> StoreActorHandle {
    let (mut store_actor, store_handle) = StoreActor::new(config);

    tokio::spawn(async move {
        store_actor.run().await;
    });

    store_handle
}

fn build_calendar_api(config: &Config) -> Arc<dyn CalendarApi> {
    let token_provider = Arc::new(StaticTokenProvider::new(config.google_access_token.clone()));
    Arc::new(GoogleCalendarApi::new(token_provider))
}

/// Run one cleanup operation against the configured calendar
pub async fn run_cleanup(config: Arc<RwLock<Config>>) -> miette::Result<CleanupReport> {
    let store_handle = start_store(Arc::clone(&config));

    let (api, calendar_id, options) = {
        let config_read = config.read().await;

        let options = CleanupOptions {
            mode: CleanupMode::parse(&config_read.cleanup_mode)?,
            filters: config_read.load_cleanup_filters()?,
            max_deletions: config_read.cleanup_max_deletions,
            skip_patterns: config_read.cleanup_skip_patterns.clone(),
            preserve_newest: config_read.cleanup_preserve_newest,
            create_backup: config_read.cleanup_create_backup,
        };

        (
            build_calendar_api(&config_read),
            config_read.google_calendar_id.clone(),
            options,
        )
    };

    let engine = CleanupEngine::new(api, store_handle.clone());
    let report = engine.run(&[calendar_id], &options).await?;

    let _ = store_handle.shutdown().await;

    Ok(report)
}

/// Start the bridge: schedule periodic reconciliation passes of the feed
/// into the configured calendar. The returned scheduler owns the task;
/// dropping it stops the bridge.
pub async fn start_bridge(
    config: Arc<RwLock<Config>>,
    feed: Arc<dyn IcsFeed>,
) -> miette::Result<RefreshScheduler> {
    let store_handle = start_store(Arc::clone(&config));

    let (engine, window_days, interval_secs) = {
        let config_read = config.read().await;
        let default_tz = config_read.default_tz()?;

        let engine = SyncEngine::new(
            build_calendar_api(&config_read),
            store_handle,
            config_read.google_calendar_id.clone(),
            default_tz,
        );

        (
            Arc::new(engine),
            config_read.sync_window_days,
            config_read.sync_interval_secs,
        )
    };

    let mut scheduler = RefreshScheduler::new();
    scheduler.schedule(
        "reconcile",
        Duration::from_secs(interval_secs),
        move || {
            let engine = Arc::clone(&engine);
            let feed = Arc::clone(&feed);
            async move {
                let window = SyncWindow::next_days(window_days);
                match engine.run_pass(feed.as_ref(), window).await {
                    Ok(report) if report.success => info!(
                        "Reconciliation pass finished: {} created, {} updated",
                        report.events_created, report.events_updated
                    ),
                    Ok(report) => error!(
                        "Reconciliation pass finished with {} errors ({} created, {} updated)",
                        report.errors.len(),
                        report.events_created,
                        report.events_updated
                    ),
                    Err(e) => error!("Reconciliation pass failed: {:?}", e),
                }
            }
        },
    );

    Ok(scheduler)
}
