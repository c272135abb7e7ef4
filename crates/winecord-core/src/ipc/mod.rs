//! IPC module for talking to the local Discord client
//!
//! Discord listens on a Unix socket named `discord-ipc-<n>` in the user's
//! temp directory and speaks a small length-prefixed JSON protocol.

mod client;
mod protocol;

pub use client::{
    socket_candidates, socket_dirs_from_env, ConnectionState, DiscordIpcClient, IO_TIMEOUT,
    SOCKET_PREFIX, SOCKET_SLOTS,
};
pub use protocol::*;
