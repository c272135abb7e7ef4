use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{CoverArtLookup, PresenceClient, ProcessLister};
use crate::config::{PresenceSettings, SharedSettings};
use crate::resolver::{exe_candidate, resolve};

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(5);

/// How long a scan waits for cover art before sending presence without it
pub const DEFAULT_COVER_TIMEOUT: Duration = Duration::from_secs(5);

/// What is currently shown on Discord. Replaced wholesale, never patched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub game_name: String,
    pub start_epoch_secs: i64,
    pub cover_url: Option<String>,
}

/// Read-only view for anything presenting scanner state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceStatus {
    pub enabled: bool,
    pub current_game: Option<String>,
    pub discord_connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Scanning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Another scan was in flight
    Skipped,
    /// Scanner is disabled
    Disabled,
    /// Same game as last time, no presence traffic
    Unchanged,
    /// Game went away and presence was cleared
    Cleared,
    /// A new game is being shown
    Detected(String),
    /// The scanner was toggled while this scan ran; its result was dropped
    Discarded,
}

/// Events emitted by the scanner after each scan attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannerEvent {
    ScanFinished(ScanOutcome),
    /// A collaborator failed; the scan carried on as if nothing was found
    Error { task: String, message: String },
}

struct ScannerState {
    enabled: bool,
    /// Bumped on every enable and disable. A scan only applies its result if
    /// the generation it started under is still current.
    generation: u64,
    last_detected_game: String,
    snapshot: PresenceSnapshot,
    connected: bool,
    stop_tx: Option<watch::Sender<bool>>,
}

/// Resets the in-flight flag when a scan ends, however it ends
struct ScanGuard<'a>(&'a AtomicBool);

impl<'a> ScanGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodically finds the running game and keeps Discord presence in sync
pub struct PresenceScanner {
    client: Arc<dyn PresenceClient>,
    lister: Arc<dyn ProcessLister>,
    covers: Arc<dyn CoverArtLookup>,
    settings: SharedSettings,
    interval: Duration,
    cover_timeout: Duration,
    scanning: AtomicBool,
    state: Mutex<ScannerState>,
    status_tx: watch::Sender<PresenceStatus>,
    event_tx: Option<mpsc::UnboundedSender<ScannerEvent>>,
}

impl PresenceScanner {
    /// Create a disabled scanner
    pub fn new(
        client: Arc<dyn PresenceClient>,
        lister: Arc<dyn ProcessLister>,
        covers: Arc<dyn CoverArtLookup>,
        settings: SharedSettings,
    ) -> Self {
        let (status_tx, _) = watch::channel(PresenceStatus::default());
        Self {
            client,
            lister,
            covers,
            settings,
            interval: DEFAULT_SCAN_INTERVAL,
            cover_timeout: DEFAULT_COVER_TIMEOUT,
            scanning: AtomicBool::new(false),
            state: Mutex::new(ScannerState {
                enabled: false,
                generation: 0,
                last_detected_game: String::new(),
                snapshot: PresenceSnapshot::default(),
                connected: false,
                stop_tx: None,
            }),
            status_tx,
            event_tx: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_cover_timeout(mut self, timeout: Duration) -> Self {
        self.cover_timeout = timeout;
        self
    }

    /// Set the event sender for scan notifications
    pub fn with_event_sender(mut self, tx: mpsc::UnboundedSender<ScannerEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send_event(&self, event: ScannerEvent) {
        if let Some(ref tx) = self.event_tx {
            if tx.send(event).is_err() {
                debug!("Failed to send scanner event: receiver dropped");
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ScannerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_settings(&self) -> PresenceSettings {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn publish(&self, state: &ScannerState) {
        let status = PresenceStatus {
            enabled: state.enabled,
            current_game: (!state.last_detected_game.is_empty())
                .then(|| state.last_detected_game.clone()),
            discord_connected: state.connected,
        };
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    pub fn status(&self) -> PresenceStatus {
        self.status_tx.borrow().clone()
    }

    /// Receive every status change
    pub fn subscribe(&self) -> watch::Receiver<PresenceStatus> {
        self.status_tx.subscribe()
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        self.lock_state().snapshot.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.lock_state().enabled
    }

    pub fn phase(&self) -> ScanPhase {
        if self.scanning.load(Ordering::Acquire) {
            ScanPhase::Scanning
        } else {
            ScanPhase::Idle
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.phase() == ScanPhase::Scanning
    }

    /// Start the interval timer. The first scan runs right away.
    pub fn enable(self: &Arc<Self>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        {
            let mut state = self.lock_state();
            if state.enabled {
                return;
            }
            state.enabled = true;
            state.generation += 1;
            state.stop_tx = Some(stop_tx);
            self.publish(&state);
        }

        info!(interval_secs = self.interval.as_secs(), "Presence scanner started");
        tokio::spawn(Arc::clone(self).run_timer(stop_rx));
    }

    /// Stop the timer, clear Discord presence and reset all derived state.
    ///
    /// A scan already in flight is not interrupted; its result is discarded.
    pub async fn disable(&self) {
        let stop_tx = {
            let mut state = self.lock_state();
            if !state.enabled {
                return;
            }
            state.enabled = false;
            state.generation += 1;
            state.last_detected_game.clear();
            state.snapshot = PresenceSnapshot::default();
            state.connected = false;
            self.publish(&state);
            state.stop_tx.take()
        };

        if let Some(tx) = stop_tx {
            let _ = tx.send(true);
        }
        info!("Presence scanner stopped");

        self.client.clear_activity().await;
        self.client.disconnect();
    }

    async fn run_timer(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                result = stop.changed() => {
                    if result.is_err() || *stop.borrow() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    // scans run on their own task so a slow one never stalls the timer
                    let scanner = Arc::clone(&self);
                    tokio::spawn(async move {
                        scanner.rescan().await;
                    });
                }
            }
        }

        debug!("Scanner timer exited");
    }

    /// Scan once now, through the same single-flight guard as the timer
    pub async fn rescan(&self) -> ScanOutcome {
        let outcome = self.scan().await;
        self.send_event(ScannerEvent::ScanFinished(outcome.clone()));
        outcome
    }

    async fn scan(&self) -> ScanOutcome {
        let Some(_guard) = ScanGuard::acquire(&self.scanning) else {
            debug!("Scan skipped (already running)");
            return ScanOutcome::Skipped;
        };

        let (generation, mut last_game) = {
            let state = self.lock_state();
            if !state.enabled {
                return ScanOutcome::Disabled;
            }
            (state.generation, state.last_detected_game.clone())
        };

        let settings = self.read_settings();
        let client_id = settings.client_id();
        if client_id != self.client.client_id() {
            if !self.is_current(generation) {
                return ScanOutcome::Discarded;
            }
            info!(platform = %settings.platform, "Discord client id changed, reconnecting");
            self.client.reconnect_with_client_id(&client_id).await;
            // the new session shows nothing yet, so announce the game again
            last_game.clear();
        }

        let processes = match self.lister.list().await {
            Ok(processes) => processes,
            Err(e) => {
                warn!(error = %e, "Process listing failed");
                self.send_event(ScannerEvent::Error {
                    task: "list_processes".to_string(),
                    message: e.to_string(),
                });
                Vec::new()
            }
        };
        let game = detect_game(&processes, &settings);

        let (outcome, snapshot) = if game == last_game {
            (ScanOutcome::Unchanged, None)
        } else if !self.is_current(generation) {
            return ScanOutcome::Discarded;
        } else if game.is_empty() {
            info!("No game detected, clearing presence");
            self.client.clear_activity().await;
            (ScanOutcome::Cleared, Some(PresenceSnapshot::default()))
        } else {
            info!(game = %game, "New game detected");
            let start = chrono::Utc::now().timestamp();
            let cover = self.lookup_cover(&game).await;
            if !self.is_current(generation) {
                return ScanOutcome::Discarded;
            }
            self.client
                .set_activity(&game, start, cover.as_deref(), Some(&game))
                .await;
            let snapshot = PresenceSnapshot {
                game_name: game.clone(),
                start_epoch_secs: start,
                cover_url: cover,
            };
            (ScanOutcome::Detected(game.clone()), Some(snapshot))
        };

        let connected = self.client.is_connected();

        let stale = {
            let mut state = self.lock_state();
            if state.generation != generation {
                Some(state.enabled)
            } else {
                state.last_detected_game = game;
                if let Some(snapshot) = snapshot {
                    state.snapshot = snapshot;
                }
                state.connected = connected;
                self.publish(&state);
                None
            }
        };

        if let Some(enabled) = stale {
            debug!("Discarding scan result, scanner was toggled mid-scan");
            if !enabled && matches!(outcome, ScanOutcome::Detected(_)) {
                // our activity may have landed after the disable teardown
                self.client.clear_activity().await;
                self.client.disconnect();
            }
            return ScanOutcome::Discarded;
        }
        outcome
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.lock_state();
        state.enabled && state.generation == generation
    }

    /// Ask for cover art without letting a slow lookup hold up presence.
    /// A lookup that misses the deadline keeps running and fills the cache.
    async fn lookup_cover(&self, game: &str) -> Option<String> {
        let covers = Arc::clone(&self.covers);
        let name = game.to_string();
        let lookup = tokio::spawn(async move { covers.cover_url(&name).await });

        match tokio::time::timeout(self.cover_timeout, lookup).await {
            Ok(Ok(url)) => {
                debug!(game, cover = ?url, "Cover lookup finished");
                url
            }
            Ok(Err(e)) => {
                warn!(game, error = %e, "Cover lookup task failed");
                None
            }
            Err(_) => {
                debug!(game, "Cover lookup still pending, sending presence without it");
                None
            }
        }
    }
}

/// The first process, in listing order, that resolves to a game title
pub fn detect_game(processes: &[String], settings: &PresenceSettings) -> String {
    processes
        .iter()
        .filter_map(|line| exe_candidate(line))
        .map(|exe| resolve(exe, &settings.blacklist, &settings.overrides))
        .find(|name| !name.is_empty())
        .unwrap_or_default()
}
