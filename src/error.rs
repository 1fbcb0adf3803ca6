use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed bencode at byte {offset}: {reason}")]
    MalformedEncoding { offset: usize, reason: String },

    #[error("invalid torrent: {0}")]
    Schema(String),

    #[error("connection error: {0}")]
    Connection(io::Error),

    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] Violation),

    #[error("piece index {index} out of range, torrent has {count} pieces")]
    PieceIndex { index: usize, count: usize },

    #[error("piece {piece} has zero length")]
    EmptyPiece { piece: u32 },

    #[error("piece {piece} failed hash verification")]
    Verification { piece: u32 },

    #[error("tracker error: {0}")]
    Tracker(String),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ways a remote peer can break the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("invalid handshake response")]
    InvalidHandshake,

    #[error("info hash mismatch: expected {expected}, peer sent {received}")]
    InfoHashMismatch { expected: String, received: String },

    #[error("expected piece {expected}, got piece {received}")]
    WrongPieceIndex { expected: u32, received: u32 },

    #[error("block at offset {begin} with {length} bytes overflows piece {piece} ({piece_length} bytes)")]
    BlockOutOfRange {
        piece: u32,
        begin: u32,
        length: usize,
        piece_length: usize,
    },

    #[error("block at offset {begin} of piece {piece} carries {length} bytes, more than one block")]
    BlockTooLarge { piece: u32, begin: u32, length: usize },

    #[error("piece message payload too short ({0} bytes)")]
    ShortPiecePayload(usize),

    #[error("message length {0} exceeds the frame limit")]
    FrameTooLarge(u32),

    #[error("channel is {0:?}, operation not allowed")]
    InvalidState(crate::peer::client::ChannelState),
}

impl Error {
    pub(crate) fn timed_out(what: &str) -> Self {
        Error::Connection(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("timed out {what}"),
        ))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Connection(e) if e.kind() == io::ErrorKind::TimedOut)
    }
}
