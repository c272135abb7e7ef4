mod process;
mod service;

pub use process::PsProcessLister;
pub use service::{
    detect_game, PresenceScanner, PresenceSnapshot, PresenceStatus, ScanOutcome, ScanPhase,
    ScannerEvent, DEFAULT_COVER_TIMEOUT, DEFAULT_SCAN_INTERVAL,
};

use crate::Result;

/// Source of raw process command lines, one per live process
#[async_trait::async_trait]
pub trait ProcessLister: Send + Sync {
    async fn list(&self) -> Result<Vec<String>>;
}

/// Cover art for a display title. Implementations cache, including misses.
#[async_trait::async_trait]
pub trait CoverArtLookup: Send + Sync {
    async fn cover_url(&self, name: &str) -> Option<String>;
}

/// The presence sink the scanner drives. Every call is best effort.
#[async_trait::async_trait]
pub trait PresenceClient: Send + Sync {
    async fn set_activity(
        &self,
        details: &str,
        start_epoch_secs: i64,
        image_url: Option<&str>,
        image_text: Option<&str>,
    );

    async fn clear_activity(&self);

    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Application id the next connection will handshake with
    fn client_id(&self) -> String;

    async fn reconnect_with_client_id(&self, client_id: &str) -> bool;
}
