use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame payload too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Connection closed before a full frame was read")]
    ShortRead,

    #[error("Socket operation timed out")]
    Timeout,

    #[error("Not connected to Discord")]
    NotConnected,

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Process listing failed: {0}")]
    ProcessList(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
