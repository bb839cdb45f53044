use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};
use crestron_shades::{CrestronError, HubClient, HubConfig, Result, ShadeCommand};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("🪟 Crestron Shade Control Example");

    let host = std::env::var("CRESTRON_HOST")
        .map_err(|_| CrestronError::InvalidConfig("CRESTRON_HOST is not set".to_string()))?;
    let token = std::env::var("CRESTRON_TOKEN")
        .map_err(|_| CrestronError::InvalidConfig("CRESTRON_TOKEN is not set".to_string()))?;
    let client = HubClient::new(&HubConfig::new(host, token))?;

    match client.ping().await {
        Ok(version) => info!(
            "✅ Hub reachable, API version {}",
            version.as_deref().unwrap_or("unknown")
        ),
        Err(e) => {
            error!("❌ Hub check failed: {}", e);
            return Err(e);
        }
    }

    let rooms = client.list_rooms().await?;
    info!("🏠 {} rooms", rooms.len());
    for room in &rooms {
        info!("  {} - {}", room.id, room.name);
    }

    let shades = client.list_shades().await?;
    let Some(shade) = shades.first() else {
        info!("No shades configured on this hub");
        return Ok(());
    };
    info!(
        "🎯 Using '{}' (id {}), currently {}% open",
        shade.name, shade.id, shade.position
    );

    // Move to half open
    info!("⬇️ Moving to 50%...");
    client
        .set_shade_state(&[ShadeCommand::position(
            shade.id,
            crestron_shades::protocol::percent_to_position(50),
        )])
        .await?;

    sleep(Duration::from_secs(3)).await;

    info!("⏸️ Stopping...");
    if let Err(e) = client.stop_shade(shade.id).await {
        error!("❌ Failed to stop shade: {}", e);
    }

    let shade = client.get_shade(shade.id).await?;
    info!("📊 '{}' is now {}% open ({})", shade.name, shade.position, shade.connection_status);

    info!("🎉 Shade control example completed!");
    Ok(())
}
