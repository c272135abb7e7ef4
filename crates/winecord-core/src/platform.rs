//! Compatibility layers and the Discord application id used for each
//!
//! Each layer has its own registered Discord application so the presence
//! reads "Playing on CrossOver", "Playing on Whisky" and so on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    CrossOver,
    Whisky,
    Wine,
}

/// Default application id per platform. Placeholder ids; replace them with
/// the applications registered on the Discord developer portal.
const CLIENT_IDS: [(Platform, &str); 3] = [
    (Platform::CrossOver, "1356010294475145216"),
    (Platform::Whisky, "1356010524125872228"),
    (Platform::Wine, "1356010690283225179"),
];

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::CrossOver, Platform::Whisky, Platform::Wine];

    pub fn default_client_id(self) -> &'static str {
        CLIENT_IDS
            .iter()
            .find(|(platform, _)| *platform == self)
            .map(|(_, id)| *id)
            .unwrap_or(CLIENT_IDS[0].1)
    }

    /// `custom` when it is non-blank, otherwise this platform's default
    pub fn client_id(self, custom: Option<&str>) -> String {
        match custom.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.default_client_id().to_string(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::CrossOver => "crossover",
            Platform::Whisky => "whisky",
            Platform::Wine => "wine",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Config(format!("Unknown platform: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_platform_has_distinct_id() {
        let ids: std::collections::HashSet<_> =
            Platform::ALL.iter().map(|p| p.default_client_id()).collect();
        assert_eq!(ids.len(), Platform::ALL.len());
    }

    #[test]
    fn test_custom_id_overrides_default() {
        assert_eq!(Platform::Wine.client_id(Some("42")), "42");
    }

    #[test]
    fn test_blank_custom_id_falls_back() {
        let expected = Platform::Whisky.default_client_id();
        assert_eq!(Platform::Whisky.client_id(Some("   ")), expected);
        assert_eq!(Platform::Whisky.client_id(None), expected);
    }

    #[test]
    fn test_parse_platform() {
        assert_eq!("CrossOver".parse::<Platform>().unwrap(), Platform::CrossOver);
        assert_eq!(" wine ".parse::<Platform>().unwrap(), Platform::Wine);
        assert!("proton".parse::<Platform>().is_err());
    }
}
