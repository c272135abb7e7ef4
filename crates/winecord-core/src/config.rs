use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::platform::Platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub igdb: IgdbConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Data directory path (cover cache lives here)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Start scanning as soon as the daemon runs
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between process scans
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Compatibility layer, selects the Discord application id
    #[serde(default)]
    pub platform: Platform,
    /// Use this Discord application id instead of the platform default
    #[serde(default)]
    pub custom_client_id: Option<String>,
    /// Executable names (lowercase, no extension) never reported as games
    #[serde(default = "default_blacklist")]
    pub blacklist: BTreeSet<String>,
    /// Executable name (lowercase, no extension) to display title
    #[serde(default = "default_overrides")]
    pub overrides: BTreeMap<String, String>,
}

impl PresenceConfig {
    /// Scan period, never shorter than one second
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs.max(1))
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            scan_interval_secs: default_scan_interval(),
            platform: Platform::default(),
            custom_client_id: None,
            blacklist: default_blacklist(),
            overrides: default_overrides(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgdbConfig {
    /// Twitch application client id (cover art disabled when unset)
    #[serde(default)]
    pub client_id: Option<String>,
    /// Twitch application client secret
    #[serde(default)]
    pub client_secret: Option<String>,
    /// How long a scan waits for cover art before sending presence without it
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,
    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl IgdbConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }
}

impl Default for IgdbConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            lookup_timeout_secs: default_lookup_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// What a scan reads from configuration. Re-read at the start of every scan
/// so edits apply on the next tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSettings {
    pub blacklist: HashSet<String>,
    pub overrides: HashMap<String, String>,
    pub platform: Platform,
    pub custom_client_id: Option<String>,
}

impl PresenceSettings {
    /// Discord application id to connect with
    pub fn client_id(&self) -> String {
        self.platform.client_id(self.custom_client_id.as_deref())
    }
}

pub type SharedSettings = Arc<RwLock<PresenceSettings>>;

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("winecord")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_scan_interval() -> u64 {
    5
}

fn default_lookup_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    10
}

/// Launchers, helpers and Wine plumbing that show up as `.exe` processes
fn default_blacklist() -> BTreeSet<String> {
    [
        "ac4bfsp", "andale32", "bridge", "cmd", "conhost", "crashpad_handler", "cxcplinfo",
        "cxmanip", "dxsetup", "explorer", "gameoverlaygui64", "gameoverlayui", "gldriverquery64",
        "ndp452-kb2901907-x86-x64-allos-enu", "plugplay", "rpcss", "services", "start", "steam",
        "steamerrorreporter", "steamerrorreporter64", "steamservice", "steamsysinfo",
        "steamwebhelper", "svchost", "ubisoftgamelauncher", "unitycrashhandler64", "upc",
        "uplayservice", "uplaywebcore", "vcredist_x64", "vcredist_x86", "vulkandriverquery",
        "vulkandriverquery64", "wine", "wineboot", "winecfg", "winedbg", "winedevice",
        "winewrapper",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_overrides() -> BTreeMap<String, String> {
    [
        ("bbq", "The First Berserker Khazan"),
        ("d2", "Diablo II"),
        ("etg", "Enter the Gungeon"),
        ("hl2", "Half Life 2"),
        ("kz", "The First Berserker Khazan"),
        ("precinct", "The Precinct"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &std::path::Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

impl AppConfig {
    /// Load configuration from file or return defaults
    pub fn load() -> crate::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, defaults when the file is missing
    pub fn load_from(path: &std::path::Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse a TOML document, lowercasing blacklist and override keys
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let mut config: Self =
            toml::from_str(content).map_err(|e| crate::Error::Config(e.to_string()))?;
        config.normalize();
        Ok(config)
    }

    fn normalize(&mut self) {
        let presence = &mut self.presence;
        presence.blacklist = std::mem::take(&mut presence.blacklist)
            .into_iter()
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        presence.overrides = std::mem::take(&mut presence.overrides)
            .into_iter()
            .map(|(name, title)| (name.trim().to_lowercase(), title))
            .collect();
    }

    /// Save configuration to file
    pub fn save(&self) -> crate::Result<()> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    /// Get the configuration file path
    /// Always uses ~/.config/winecord/config.toml on all platforms
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("winecord")
            .join("config.toml")
    }

    /// Get the persisted cover art cache path
    pub fn cover_cache_path(&self) -> PathBuf {
        self.data_dir().join("covers.json")
    }

    /// Get the data directory (with tilde expansion)
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.general.data_dir)
    }

    /// Snapshot of the settings a scan needs
    pub fn presence_settings(&self) -> PresenceSettings {
        PresenceSettings {
            blacklist: self.presence.blacklist.iter().cloned().collect(),
            overrides: self
                .presence
                .overrides
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            platform: self.presence.platform,
            custom_client_id: self.presence.custom_client_id.clone(),
        }
    }
}
