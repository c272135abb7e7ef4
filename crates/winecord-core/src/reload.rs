//! Keeps a running scanner's settings in step with the config file

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, SharedSettings};
use crate::Result;

pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(2);

/// Re-reads the config file on an interval and writes the presence settings
/// into the shared handle the scanner reads at the start of every scan
pub struct SettingsReloader {
    path: PathBuf,
    settings: SharedSettings,
    interval: Duration,
    last_error: Option<String>,
}

impl SettingsReloader {
    pub fn new(path: PathBuf, settings: SharedSettings) -> Self {
        Self {
            path,
            settings,
            interval: DEFAULT_RELOAD_INTERVAL,
            last_error: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Read the file once. Returns whether the settings changed.
    ///
    /// On error the shared settings are left untouched.
    pub fn reload(&self) -> Result<bool> {
        let fresh = AppConfig::load_from(&self.path)?.presence_settings();

        let mut current = self.settings.write().unwrap_or_else(|e| e.into_inner());
        if *current == fresh {
            return Ok(false);
        }
        *current = fresh;
        Ok(true)
    }

    /// Poll until `shutdown_rx` flips to true
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // settings were loaded at startup, skip the immediate tick
        ticker.tick().await;

        info!(path = %self.path.display(), "Watching config for changes");

        loop {
            tokio::select! {
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                _ = ticker.tick() => self.poll(),
            }
        }

        debug!("Config reloader exited");
    }

    fn poll(&mut self) {
        match self.reload() {
            Ok(changed) => {
                if changed {
                    info!(path = %self.path.display(), "Config reloaded");
                }
                self.last_error = None;
            }
            Err(e) => {
                let message = e.to_string();
                // only log a broken file once, not on every poll
                if self.last_error.as_deref() != Some(message.as_str()) {
                    warn!(
                        path = %self.path.display(),
                        error = %message,
                        "Config reload failed, keeping previous settings"
                    );
                }
                self.last_error = Some(message);
            }
        }
    }
}
