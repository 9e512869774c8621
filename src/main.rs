use calbridge::startup;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize logging
    startup::init_logging()?;

    info!("Starting calbridge cleanup");

    // Load configuration
    let config = startup::load_config().await?;

    // Run the cleanup operation
    let report = startup::run_cleanup(config).await?;

    info!(
        "Cleanup finished: {} groups analyzed, {} duplicates found, {} deleted",
        report.groups_analyzed, report.duplicates_found, report.duplicates_deleted
    );
    for warning in &report.warnings {
        warn!("{}", warning);
    }
    if let Some(backup_id) = &report.backup_id {
        info!("Backup id: {}", backup_id);
    }

    Ok(())
}
