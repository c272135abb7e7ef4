//! Cover art lookup through IGDB
//!
//! IGDB sits behind Twitch client-credential auth. Results, including "no
//! cover", are cached per lowercased title and never expire; the cache is
//! written to disk so a restart doesn't repeat lookups.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::AppConfig;
use crate::scanner::CoverArtLookup;
use crate::{Error, Result};

const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const GAMES_URL: &str = "https://api.igdb.com/v4/games";
const COVER_URL_PREFIX: &str = "https://images.igdb.com/igdb/image/upload/t_cover_big/";

/// Refresh tokens this long before Twitch says they expire
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct IgdbGame {
    #[serde(default)]
    cover: Option<IgdbCover>,
}

#[derive(Deserialize)]
struct IgdbCover {
    image_id: String,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn new(value: String, expires_in_secs: u64) -> Self {
        let lifetime = expires_in_secs.saturating_sub(TOKEN_EXPIRY_MARGIN_SECS);
        Self {
            value,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        }
    }

    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

struct Credentials {
    client_id: String,
    client_secret: String,
}

/// IGDB cover art client
pub struct IgdbClient {
    http: Client,
    credentials: Option<Credentials>,
    token: tokio::sync::Mutex<Option<AccessToken>>,
    /// lowercased title -> cover url, `None` meaning IGDB has no cover
    cache: Mutex<HashMap<String, Option<String>>>,
    cache_path: Option<PathBuf>,
    /// Lookups that outlive a scan can finish together; saves go one at a time
    save_lock: tokio::sync::Mutex<()>,
}

impl IgdbClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.igdb.request_timeout_secs))
            .build()?;

        let credentials = match (&config.igdb.client_id, &config.igdb.client_secret) {
            (Some(id), Some(secret)) if !id.trim().is_empty() && !secret.trim().is_empty() => {
                Some(Credentials {
                    client_id: id.trim().to_string(),
                    client_secret: secret.trim().to_string(),
                })
            }
            _ => {
                info!("IGDB credentials not configured, cover art disabled");
                None
            }
        };

        Ok(Self {
            http,
            credentials,
            token: tokio::sync::Mutex::new(None),
            cache: Mutex::new(HashMap::new()),
            cache_path: None,
            save_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Persist the cache at `path`, loading whatever is already there
    pub fn with_cache_file(mut self, path: PathBuf) -> Self {
        match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, Option<String>>>(&bytes) {
                Ok(entries) => {
                    debug!(entries = entries.len(), "Loaded cover cache");
                    self.lock_cache().extend(entries);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Ignoring unreadable cover cache"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to read cover cache"),
        }
        self.cache_path = Some(path);
        self
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<String, Option<String>>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached answer for `name`: `Some(None)` is a cached miss
    pub fn cached(&self, name: &str) -> Option<Option<String>> {
        self.lock_cache().get(&name.to_lowercase()).cloned()
    }

    /// Look up the cover for `name`, going to IGDB on a cache miss.
    ///
    /// Transport and auth failures return `None` without being cached.
    pub async fn fetch_cover_url(&self, name: &str) -> Option<String> {
        let key = name.to_lowercase();
        let cached = self.lock_cache().get(&key).cloned();
        if let Some(cached) = cached {
            return cached;
        }

        let credentials = self.credentials.as_ref()?;
        match self.search_cover(credentials, name).await {
            Ok(url) => {
                debug!(name, cover = ?url, "IGDB lookup finished");
                self.remember(key, url.clone()).await;
                url
            }
            Err(e) => {
                warn!(name, error = %e, "IGDB lookup failed");
                None
            }
        }
    }

    async fn search_cover(&self, credentials: &Credentials, name: &str) -> Result<Option<String>> {
        let token = self.access_token(credentials).await?;

        let response = self
            .http
            .post(GAMES_URL)
            .header("Client-ID", &credentials.client_id)
            .bearer_auth(&token)
            .body(search_query(name))
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            *self.token.lock().await = None;
            return Err(Error::Other("IGDB rejected the access token".to_string()));
        }

        let body = response.error_for_status()?.bytes().await?;
        Ok(parse_cover(&body))
    }

    async fn access_token(&self, credentials: &Credentials) -> Result<String> {
        let mut token = self.token.lock().await;
        if let Some(current) = token.as_ref().filter(|t| t.is_valid()) {
            return Ok(current.value.clone());
        }

        let url = Url::parse_with_params(
            TOKEN_URL,
            &[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ],
        )?;

        let response: TokenResponse = self
            .http
            .post(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        info!("Obtained IGDB access token");
        let fresh = AccessToken::new(response.access_token, response.expires_in);
        let value = fresh.value.clone();
        *token = Some(fresh);
        Ok(value)
    }

    async fn remember(&self, key: String, url: Option<String>) {
        self.lock_cache().insert(key, url);

        let Some(path) = &self.cache_path else { return };
        let _saving = self.save_lock.lock().await;
        // snapshot under the save lock so the last save carries every entry
        let entries = self.lock_cache().clone();
        if let Err(e) = save_cache(path, &entries).await {
            warn!(path = %path.display(), error = %e, "Failed to save cover cache");
        }
    }
}

#[async_trait::async_trait]
impl CoverArtLookup for IgdbClient {
    async fn cover_url(&self, name: &str) -> Option<String> {
        self.fetch_cover_url(name).await
    }
}

async fn save_cache(path: &std::path::Path, entries: &HashMap<String, Option<String>>) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(entries)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Cover url of the best match. A body that isn't a game list counts as a
/// miss, same as a game without a cover.
fn parse_cover(body: &[u8]) -> Option<String> {
    match serde_json::from_slice::<Vec<IgdbGame>>(body) {
        Ok(games) => games
            .into_iter()
            .next()
            .and_then(|game| game.cover)
            .map(|cover| cover_url(&cover.image_id)),
        Err(e) => {
            warn!(error = %e, "Unexpected IGDB response");
            None
        }
    }
}

/// IGDB query language search for the best match
fn search_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
    format!("search \"{}\"; fields name,cover.image_id; limit 1;", escaped)
}

fn cover_url(image_id: &str) -> String {
    format!("{}{}.jpg", COVER_URL_PREFIX, image_id)
}
