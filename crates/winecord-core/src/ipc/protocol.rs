//! Discord IPC wire protocol
//!
//! Every message is a frame `[opcode: u32 LE][length: u32 LE][payload]`, the
//! payload being UTF-8 JSON.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use crate::{Error, Result};

/// Size of the opcode + length header
pub const HEADER_LEN: usize = 8;

/// Frames claiming this many payload bytes or more are treated as malformed
pub const MAX_PAYLOAD_LEN: usize = 1_000_000;

const READ_CHUNK_LEN: usize = 4096;

/// Handshake protocol version
pub const RPC_VERSION: u32 = 1;

// Command names
pub mod commands {
    pub const SET_ACTIVITY: &str = "SET_ACTIVITY";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Opcode {
    Handshake = 0,
    Frame = 1,
    Close = 2,
}

impl Opcode {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Handshake),
            1 => Some(Self::Frame),
            2 => Some(Self::Close),
            _ => None,
        }
    }
}

/// A single length-prefixed message.
///
/// The raw opcode is kept because peers are free to send values we don't know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self {
            opcode: opcode as u32,
            payload,
        }
    }

    /// Serialize `body` as JSON into a frame
    pub fn json<T: Serialize>(opcode: Opcode, body: &T) -> Result<Self> {
        Ok(Self::new(opcode, serde_json::to_vec(body)?))
    }

    pub fn kind(&self) -> Option<Opcode> {
        Opcode::from_u32(self.opcode)
    }

    /// The `evt` field of a JSON payload, if there is one
    pub fn event(&self) -> Option<String> {
        serde_json::from_slice::<Event>(&self.payload)
            .ok()
            .and_then(|e| e.evt)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let len = self.payload.len();
        if len >= MAX_PAYLOAD_LEN {
            return Err(Error::FrameTooLarge(len));
        }

        let mut buf = Vec::with_capacity(HEADER_LEN + len);
        buf.extend_from_slice(&self.opcode.to_le_bytes());
        buf.extend_from_slice(&(len as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }
}

/// Write one frame and flush
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let buf = frame.encode()?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// A header announcing `MAX_PAYLOAD_LEN` bytes or more yields an empty payload
/// and the body is never read.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::ShortRead
        } else {
            Error::Io(e)
        }
    })?;

    let opcode = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

    if length == 0 {
        return Ok(Frame {
            opcode,
            payload: Vec::new(),
        });
    }

    if length >= MAX_PAYLOAD_LEN {
        tracing::warn!(opcode, length, "Ignoring oversized IPC frame");
        return Ok(Frame {
            opcode,
            payload: Vec::new(),
        });
    }

    let mut payload = Vec::with_capacity(length);
    let mut chunk = [0u8; READ_CHUNK_LEN];
    while payload.len() < length {
        let want = (length - payload.len()).min(READ_CHUNK_LEN);
        let n = reader.read(&mut chunk[..want]).await?;
        if n == 0 {
            return Err(Error::ShortRead);
        }
        payload.extend_from_slice(&chunk[..n]);
    }

    Ok(Frame { opcode, payload })
}

/// Opcode 0 body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub v: u32,
    pub client_id: String,
}

impl Handshake {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            v: RPC_VERSION,
            client_id: client_id.into(),
        }
    }
}

/// Opcode 1 command body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub cmd: String,
    pub args: CommandArgs,
    pub nonce: Uuid,
}

impl Command {
    /// `SET_ACTIVITY` showing `activity`
    pub fn set_activity(pid: u32, activity: Activity) -> Self {
        Self {
            cmd: commands::SET_ACTIVITY.to_string(),
            args: CommandArgs {
                pid,
                activity: Some(activity),
            },
            nonce: Uuid::new_v4(),
        }
    }

    /// `SET_ACTIVITY` without an activity, which removes the presence
    pub fn clear_activity(pid: u32) -> Self {
        Self {
            cmd: commands::SET_ACTIVITY.to_string(),
            args: CommandArgs {
                pid,
                activity: None,
            },
            nonce: Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandArgs {
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<Activity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub details: String,
    pub timestamps: Timestamps,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<Assets>,
}

impl Activity {
    pub fn new(details: impl Into<String>, start: i64) -> Self {
        Self {
            details: details.into(),
            timestamps: Timestamps { start },
            assets: None,
        }
    }

    /// Attach a large image. Hover text is only sent alongside an image.
    pub fn with_image(mut self, url: Option<String>, text: Option<String>) -> Self {
        self.assets = url.map(|large_image| Assets {
            large_image,
            large_text: text,
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub start: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assets {
    pub large_image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_text: Option<String>,
}

/// The parts of a Discord reply we look at
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub evt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn round_trip(len: usize) -> Frame {
        let frame = Frame::new(Opcode::Frame, vec![b'x'; len]);
        let mut buf = Vec::new();
        write_frame(&mut buf, &frame).await.unwrap();
        assert_eq!(buf.len(), HEADER_LEN + len);

        let mut reader = buf.as_slice();
        read_frame(&mut reader).await.unwrap()
    }

    #[tokio::test]
    async fn test_empty_frame_round_trip() {
        let frame = round_trip(0).await;
        assert_eq!(frame.kind(), Some(Opcode::Frame));
        assert!(frame.payload.is_empty());
    }

    #[tokio::test]
    async fn test_largest_frame_round_trip() {
        let frame = round_trip(MAX_PAYLOAD_LEN - 1).await;
        assert_eq!(frame.opcode, 1);
        assert_eq!(frame.payload.len(), 999_999);
        assert!(frame.payload.iter().all(|b| *b == b'x'));
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let frame = Frame::new(Opcode::Frame, vec![0; MAX_PAYLOAD_LEN]);
        assert!(matches!(frame.encode(), Err(Error::FrameTooLarge(1_000_000))));
    }

    #[test]
    fn test_header_is_little_endian() {
        let frame = Frame::new(Opcode::Close, b"{}".to_vec());
        let buf = frame.encode().unwrap();
        assert_eq!(&buf[..8], &[2, 0, 0, 0, 2, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_oversized_header_skips_body() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&(MAX_PAYLOAD_LEN as u32).to_le_bytes());
        buf.extend_from_slice(b"trailing");

        let mut reader = buf.as_slice();
        let frame = read_frame(&mut reader).await.unwrap();
        assert!(frame.payload.is_empty());
        // body left untouched
        assert_eq!(reader, b"trailing");
    }

    #[tokio::test]
    async fn test_short_header_fails() {
        let mut reader: &[u8] = &[1, 0, 0, 0, 5];
        assert!(matches!(read_frame(&mut reader).await, Err(Error::ShortRead)));
    }

    #[tokio::test]
    async fn test_truncated_body_fails() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&10u32.to_le_bytes());
        buf.extend_from_slice(b"abc");

        let mut reader = buf.as_slice();
        assert!(matches!(read_frame(&mut reader).await, Err(Error::ShortRead)));
    }

    #[test]
    fn test_handshake_serialization() {
        let json = serde_json::to_value(Handshake::new("1234")).unwrap();
        assert_eq!(json, serde_json::json!({"v": 1, "client_id": "1234"}));
    }

    #[test]
    fn test_set_activity_serialization() {
        let activity = Activity::new("The Messenger", 1_700_000_000)
            .with_image(Some("https://img/cover.jpg".into()), Some("The Messenger".into()));
        let json = serde_json::to_value(Command::set_activity(42, activity)).unwrap();

        assert_eq!(json["cmd"], "SET_ACTIVITY");
        assert_eq!(json["args"]["pid"], 42);
        assert_eq!(json["args"]["activity"]["details"], "The Messenger");
        assert_eq!(json["args"]["activity"]["timestamps"]["start"], 1_700_000_000);
        assert_eq!(json["args"]["activity"]["assets"]["large_image"], "https://img/cover.jpg");
        assert_eq!(json["args"]["activity"]["assets"]["large_text"], "The Messenger");
        assert!(Uuid::parse_str(json["nonce"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_activity_without_image_omits_assets() {
        let activity = Activity::new("Game", 1).with_image(None, Some("Game".into()));
        let json = serde_json::to_value(Command::set_activity(1, activity)).unwrap();
        assert!(json["args"]["activity"].get("assets").is_none());
    }

    #[test]
    fn test_clear_activity_omits_activity() {
        let json = serde_json::to_value(Command::clear_activity(7)).unwrap();
        assert_eq!(json["args"], serde_json::json!({"pid": 7}));
    }

    #[test]
    fn test_nonce_is_fresh() {
        let a = Command::clear_activity(1);
        let b = Command::clear_activity(1);
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn test_event_extraction() {
        let frame = Frame::new(Opcode::Frame, br#"{"cmd":"DISPATCH","evt":"READY"}"#.to_vec());
        assert_eq!(frame.event().as_deref(), Some("READY"));

        let garbage = Frame::new(Opcode::Frame, b"not json".to_vec());
        assert_eq!(garbage.event(), None);
    }
}
