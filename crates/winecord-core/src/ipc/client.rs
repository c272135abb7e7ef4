//! Discord IPC client
//!
//! Holds at most one connection to the local Discord client. The connection
//! state and stream handle live behind one mutex; socket I/O runs outside it
//! on a captured handle so `disconnect()` can be called from anywhere. A
//! disconnect racing an in-flight send shuts the socket down underneath it and
//! the send surfaces as an ordinary I/O error.

use std::future::Future;
use std::net::Shutdown;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::net::UnixStream;
use tracing::{debug, info, warn};

use super::protocol::*;
use crate::scanner::PresenceClient;
use crate::{Error, Result};

/// Per-operation socket timeout
pub const IO_TIMEOUT: Duration = Duration::from_secs(3);

/// Socket names are `discord-ipc-0` through `discord-ipc-9`
pub const SOCKET_PREFIX: &str = "discord-ipc-";
pub const SOCKET_SLOTS: u32 = 10;

/// Environment variables consulted for the socket directory, in order
const TEMP_DIR_VARS: [&str; 3] = ["TMPDIR", "TMP", "TEMP"];
const FALLBACK_TEMP_DIR: &str = "/tmp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

type SharedStream = Arc<tokio::sync::Mutex<UnixStream>>;

/// An established, handshaken socket
struct Connection {
    stream: SharedStream,
    /// Second handle on the same fd, used to shut the socket down while
    /// another task holds `stream`
    shutdown: std::os::unix::net::UnixStream,
}

impl Connection {
    fn open(stream: UnixStream) -> std::io::Result<Self> {
        let std_stream = stream.into_std()?;
        let shutdown = std_stream.try_clone()?;
        let stream = UnixStream::from_std(std_stream)?;
        Ok(Self {
            stream: Arc::new(tokio::sync::Mutex::new(stream)),
            shutdown,
        })
    }

    fn close(&self) {
        let _ = self.shutdown.shutdown(Shutdown::Both);
    }
}

struct Inner {
    state: ConnectionState,
    client_id: String,
    /// Bumped on every connect attempt and every disconnect so stale
    /// attempts and stale stream handles can be recognized
    generation: u64,
    connection: Option<Connection>,
}

/// Client for the Discord rich presence IPC socket
pub struct DiscordIpcClient {
    inner: Mutex<Inner>,
    search_dirs: Option<Vec<PathBuf>>,
    io_timeout: Duration,
}

impl DiscordIpcClient {
    /// Create a disconnected client for the given application id
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                client_id: client_id.into(),
                generation: 0,
                connection: None,
            }),
            search_dirs: None,
            io_timeout: IO_TIMEOUT,
        }
    }

    /// Look for sockets in these directories instead of the temp directories
    /// named by the environment
    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = Some(dirs);
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Inner holds no invariants a panicking holder could break halfway
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn client_id(&self) -> String {
        self.lock().client_id.clone()
    }

    /// Every socket path to try, in order
    pub fn candidate_paths(&self) -> Vec<PathBuf> {
        let dirs = match &self.search_dirs {
            Some(dirs) => dirs.clone(),
            None => socket_dirs_from_env(|key| std::env::var(key).ok()),
        };
        socket_candidates(&dirs)
    }

    /// Connect and handshake, trying every candidate socket in order.
    ///
    /// Returns true immediately when already connected. Returns false when
    /// another connect is still in progress.
    pub async fn connect(&self) -> bool {
        let (attempt, client_id) = {
            let mut inner = self.lock();
            match inner.state {
                ConnectionState::Connected => return true,
                ConnectionState::Connecting => {
                    debug!("Discord connection attempt already in progress");
                    return false;
                }
                ConnectionState::Disconnected => {}
            }
            inner.state = ConnectionState::Connecting;
            inner.generation += 1;
            (inner.generation, inner.client_id.clone())
        };

        for path in self.candidate_paths() {
            let mut stream = match self.with_timeout(connect_socket(&path)).await {
                Ok(stream) => stream,
                Err(_) => continue,
            };

            if let Err(e) = self.handshake(&mut stream, &client_id).await {
                debug!(path = %path.display(), error = %e, "Discord handshake failed");
                continue;
            }

            let connection = match Connection::open(stream) {
                Ok(connection) => connection,
                Err(e) => {
                    warn!(error = %e, "Failed to set up Discord socket");
                    continue;
                }
            };

            let mut inner = self.lock();
            if inner.generation != attempt || inner.state != ConnectionState::Connecting {
                debug!("Discord connect abandoned by a concurrent disconnect");
                connection.close();
                return false;
            }
            inner.state = ConnectionState::Connected;
            inner.connection = Some(connection);
            info!(path = %path.display(), "Connected to Discord");
            return true;
        }

        let mut inner = self.lock();
        if inner.generation == attempt {
            inner.state = ConnectionState::Disconnected;
        }
        warn!("Failed to connect to Discord - is it running?");
        false
    }

    /// Close the connection. No-op when already disconnected.
    pub fn disconnect(&self) {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Disconnected {
            return;
        }
        Self::teardown(&mut inner);
        info!("Disconnected from Discord");
    }

    /// Switch to another application id and connect with it right away
    pub async fn reconnect_with_client_id(&self, client_id: impl Into<String>) -> bool {
        {
            let mut inner = self.lock();
            inner.client_id = client_id.into();
            if inner.state != ConnectionState::Disconnected {
                Self::teardown(&mut inner);
                info!("Disconnected from Discord to switch client id");
            }
        }
        self.connect().await
    }

    /// Show `details` as the current activity.
    ///
    /// Best effort: failures are logged, never returned. A failed send gets
    /// one reconnect and one retry.
    pub async fn set_activity(
        &self,
        details: &str,
        start_epoch_secs: i64,
        image_url: Option<&str>,
        image_text: Option<&str>,
    ) {
        if !self.is_connected() && !self.connect().await {
            return;
        }

        let activity = Activity::new(details, start_epoch_secs)
            .with_image(image_url.map(str::to_owned), image_text.map(str::to_owned));
        let frame = match Frame::json(
            Opcode::Frame,
            &Command::set_activity(std::process::id(), activity),
        ) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to encode SET_ACTIVITY");
                return;
            }
        };

        if let Err(e) = self.exchange(&frame).await {
            warn!(error = %e, "SET_ACTIVITY send failed, reconnecting");
            if !self.connect().await {
                return;
            }
            if let Err(e) = self.exchange(&frame).await {
                warn!(error = %e, "SET_ACTIVITY retry failed, dropping update");
                return;
            }
        }
        debug!(details, "Activity set");
    }

    /// Remove the displayed activity. No-op when not connected.
    pub async fn clear_activity(&self) {
        if !self.is_connected() {
            return;
        }

        let frame = match Frame::json(Opcode::Frame, &Command::clear_activity(std::process::id())) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to encode SET_ACTIVITY");
                return;
            }
        };

        match self.exchange(&frame).await {
            Ok(()) => info!("Activity cleared"),
            Err(e) => warn!(error = %e, "Failed to clear activity"),
        }
    }

    async fn handshake(&self, stream: &mut UnixStream, client_id: &str) -> Result<()> {
        let frame = Frame::json(Opcode::Handshake, &Handshake::new(client_id))?;
        self.with_timeout(write_frame(stream, &frame)).await?;

        let reply = self.with_timeout(read_frame(stream)).await?;
        if reply.kind() != Some(Opcode::Frame) {
            return Err(Error::Handshake(format!("unexpected opcode {}", reply.opcode)));
        }
        if let Some(evt) = reply.event() {
            debug!(evt = %evt, "Discord handshake reply");
        }
        Ok(())
    }

    /// Write one frame and consume one reply.
    ///
    /// Only a failed write is returned as an error. A missing or closing reply
    /// drops the connection but the command is considered delivered.
    async fn exchange(&self, frame: &Frame) -> Result<()> {
        let (generation, link) = self.link().ok_or(Error::NotConnected)?;
        let mut stream = link.lock().await;

        if let Err(e) = self.with_timeout(write_frame(&mut *stream, frame)).await {
            self.drop_link(generation);
            return Err(e);
        }

        match self.with_timeout(read_frame(&mut *stream)).await {
            Ok(reply) if reply.kind() == Some(Opcode::Close) => {
                warn!("Discord closed the connection");
                self.drop_link(generation);
            }
            Ok(reply) => {
                if let Some(evt) = reply.event() {
                    debug!(evt = %evt, "Discord reply");
                }
            }
            Err(e) => {
                debug!(error = %e, "No reply from Discord");
                self.drop_link(generation);
            }
        }
        Ok(())
    }

    /// Capture the current stream handle under the lock
    fn link(&self) -> Option<(u64, SharedStream)> {
        let inner = self.lock();
        if inner.state != ConnectionState::Connected {
            return None;
        }
        inner
            .connection
            .as_ref()
            .map(|c| (inner.generation, c.stream.clone()))
    }

    /// Mark the connection dead if it is still the one that failed
    fn drop_link(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation && inner.state == ConnectionState::Connected {
            Self::teardown(&mut inner);
        }
    }

    fn teardown(inner: &mut Inner) {
        inner.generation += 1;
        inner.state = ConnectionState::Disconnected;
        if let Some(connection) = inner.connection.take() {
            connection.close();
        }
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.io_timeout, fut)
            .await
            .map_err(|_| Error::Timeout)?
    }
}

async fn connect_socket(path: &Path) -> Result<UnixStream> {
    Ok(UnixStream::connect(path).await?)
}

#[async_trait::async_trait]
impl PresenceClient for DiscordIpcClient {
    async fn set_activity(
        &self,
        details: &str,
        start_epoch_secs: i64,
        image_url: Option<&str>,
        image_text: Option<&str>,
    ) {
        DiscordIpcClient::set_activity(self, details, start_epoch_secs, image_url, image_text).await
    }

    async fn clear_activity(&self) {
        DiscordIpcClient::clear_activity(self).await
    }

    fn disconnect(&self) {
        DiscordIpcClient::disconnect(self)
    }

    fn is_connected(&self) -> bool {
        DiscordIpcClient::is_connected(self)
    }

    fn client_id(&self) -> String {
        DiscordIpcClient::client_id(self)
    }

    async fn reconnect_with_client_id(&self, client_id: &str) -> bool {
        DiscordIpcClient::reconnect_with_client_id(self, client_id).await
    }
}

/// `TMPDIR`, `TMP`, `TEMP` (whichever are set) followed by `/tmp`
pub fn socket_dirs_from_env<F>(lookup: F) -> Vec<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    TEMP_DIR_VARS
        .iter()
        .filter_map(|key| lookup(key))
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .chain(std::iter::once(PathBuf::from(FALLBACK_TEMP_DIR)))
        .collect()
}

/// `<dir>/discord-ipc-<0..9>` for every directory, directory-major
pub fn socket_candidates(dirs: &[PathBuf]) -> Vec<PathBuf> {
    dirs.iter()
        .flat_map(|dir| (0..SOCKET_SLOTS).map(move |i| dir.join(format!("{SOCKET_PREFIX}{i}"))))
        .collect()
}
