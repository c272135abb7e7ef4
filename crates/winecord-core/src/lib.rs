pub mod config;
pub mod error;
pub mod ipc;
pub mod metadata;
pub mod platform;
pub mod reload;
pub mod resolver;
pub mod scanner;

pub use config::{AppConfig, PresenceSettings, SharedSettings};
pub use error::{Error, Result};
pub use ipc::DiscordIpcClient;
pub use metadata::IgdbClient;
pub use platform::Platform;
pub use reload::SettingsReloader;
pub use scanner::{PresenceScanner, PresenceStatus, PsProcessLister};
