pub mod bencode_parser;
pub mod download;
pub mod error;
pub mod peer;
pub mod torrent;
pub mod tracker;

// Re-export commonly used types and functions for easier access
pub use bencode_parser::{Value, decode, encode, parse};
pub use download::{download_all, download_piece, download_torrent_piece};
pub use error::{Error, Result, Violation};
pub use peer::Peer;
pub use peer::client::{ChannelState, ClientConfig, PeerChannel};
pub use torrent::{Torrent, parse_torrent_bytes, parse_torrent_file};
