//! Typed error boundaries. Call sites elsewhere use `anyhow::Result` and `?`;
//! these enums exist where a caller needs to match on a specific failure kind.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaneError {
    #[error("no pty attached to pane {0}")]
    NoPty(u64),
    #[error("pty write would block past retry budget")]
    WriteBackpressure,
}

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard payload exceeds max_response_size ({0} > {1})")]
    TooLarge(usize, usize),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("messagepack encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("messagepack decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("snappy compression failed: {0}")]
    Compress(#[from] snap::Error),
    #[error("empty frame")]
    EmptyFrame,
    #[error("unknown compression flag {0}")]
    UnknownCompressionFlag(u8),
}

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing argument for {0}")]
    MissingArgument(&'static str),
    #[error("pane not found: {0}")]
    PaneNotFound(u64),
}
