use anyhow::Result;

use winecord_core::scanner::{detect_game, ProcessLister};
use winecord_core::{AppConfig, PsProcessLister};

pub async fn run(config: &AppConfig) -> Result<()> {
    let processes = PsProcessLister::new().list().await?;
    let game = detect_game(&processes, &config.presence_settings());

    if game.is_empty() {
        println!("No game detected ({} processes scanned).", processes.len());
    } else {
        println!("{}", game);
    }

    Ok(())
}
