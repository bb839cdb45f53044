use std::sync::Arc;
use tracing::{error, info, warn};
use crestron_shades::{Cover, CrestronError, HubConfig, Result, ShadeCoordinator};

fn config_from_env() -> Result<HubConfig> {
    let host = std::env::var("CRESTRON_HOST")
        .map_err(|_| CrestronError::InvalidConfig("CRESTRON_HOST is not set".to_string()))?;
    let token = std::env::var("CRESTRON_TOKEN")
        .map_err(|_| CrestronError::InvalidConfig("CRESTRON_TOKEN is not set".to_string()))?;

    let mut config = HubConfig::new(host, token);
    if let Some(secs) = std::env::var("CRESTRON_SCAN_INTERVAL")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        config.scan_interval_secs = secs;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("🪟 Crestron Shade Monitor Example");

    let config = config_from_env()?;
    info!("Connecting to hub at {}...", config.host);

    let coordinator = match ShadeCoordinator::connect(config).await {
        Ok(coordinator) => Arc::new(coordinator),
        Err(e) => {
            error!("❌ Failed to connect to hub: {}", e);
            return Err(e);
        }
    };
    info!("✅ Connected, {} shades found", coordinator.snapshot().len());

    coordinator.start().await;
    let mut updates = coordinator.subscribe();

    info!("🔍 Watching for shade updates, press Ctrl+C to stop");

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Stopping monitor");
                break;
            }
        }

        println!("\n📊 Shades ({})", coordinator.state().await);
        println!("┌──────┬──────────────────────────┬──────────┬───────────┐");
        for entity in coordinator.entities() {
            let position = entity
                .current_position()
                .map_or_else(|| "?".to_string(), |p| format!("{p}%"));
            let available = if entity.is_available().await { "yes" } else { "no" };
            println!(
                "│ {:>4} │ {:24} │ {:>8} │ {:>9} │",
                entity.shade_id(),
                entity.name(),
                position,
                available
            );
        }
        println!("└──────┴──────────────────────────┴──────────┴───────────┘");

        for issue in coordinator.issues().await {
            warn!("⚠️ Open issue: {}", issue);
        }
    }

    coordinator.shutdown().await;

    let diagnostics = coordinator.diagnostics().await;
    match serde_json::to_string_pretty(&diagnostics) {
        Ok(json) => info!("📋 Diagnostics:\n{}", json),
        Err(e) => error!("Failed to serialize diagnostics: {}", e),
    }

    Ok(())
}
