use std::sync::{Arc, RwLock};

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use winecord_core::scanner::ScannerEvent;
use winecord_core::{
    AppConfig, DiscordIpcClient, IgdbClient, PresenceScanner, PsProcessLister, SettingsReloader,
};

/// Run the presence daemon until Ctrl+C
pub async fn run(config: AppConfig) -> Result<()> {
    if !config.presence.enabled {
        println!("Presence is disabled in {}", AppConfig::config_path().display());
        return Ok(());
    }

    let presence = config.presence_settings();
    let client = Arc::new(DiscordIpcClient::new(presence.client_id()));
    let settings = Arc::new(RwLock::new(presence));
    let lister = Arc::new(PsProcessLister::new());
    let covers = Arc::new(IgdbClient::new(&config)?.with_cache_file(config.cover_cache_path()));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let interval = config.presence.scan_interval();
    let scanner = Arc::new(
        PresenceScanner::new(client, lister, covers, settings.clone())
            .with_interval(interval)
            .with_cover_timeout(config.igdb.lookup_timeout())
            .with_event_sender(event_tx),
    );

    // edits to the config file reach the scanner on its next tick
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reloader = tokio::spawn(
        SettingsReloader::new(AppConfig::config_path(), settings).run(shutdown_rx),
    );

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if let ScannerEvent::Error { task, message } = event {
                warn!(task = %task, "{}", message);
            }
        }
    });

    let mut status = scanner.subscribe();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            match current.current_game {
                Some(game) => println!(
                    "Playing: {} (Discord {})",
                    game,
                    if current.discord_connected { "connected" } else { "not connected" }
                ),
                None if current.enabled => println!("No game running"),
                None => {}
            }
        }
    });

    scanner.enable();
    println!(
        "Watching for games every {} seconds (platform: {}). Press Ctrl+C to stop.",
        interval.as_secs(),
        config.presence.platform
    );

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);
    let _ = reloader.await;
    scanner.disable().await;
    println!("Stopped.");

    Ok(())
}
