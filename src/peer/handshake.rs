use crate::peer::{PSTR, PSTR_LEN};
use crate::torrent::HASH_LEN;

pub const HANDSHAKE_LEN: usize = 1 + PSTR.len() + 8 + HASH_LEN + HASH_LEN; // 68

const RESERVED: std::ops::Range<usize> = 20..28;
const INFO_HASH: std::ops::Range<usize> = 28..48;
const PEER_ID: std::ops::Range<usize> = 48..68;

/// The fixed-size greeting both ends exchange before any framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub reserved: [u8; 8],
    pub infohash: [u8; HASH_LEN],
    pub peer_id: [u8; HASH_LEN],
}

impl Handshake {
    pub fn new(infohash: [u8; HASH_LEN], peer_id: [u8; HASH_LEN]) -> Self {
        Self {
            reserved: [0; 8],
            infohash,
            peer_id,
        }
    }

    pub fn serialize(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = [0u8; HANDSHAKE_LEN];
        buf[0] = PSTR_LEN;
        buf[1..20].copy_from_slice(PSTR.as_bytes());
        buf[RESERVED].copy_from_slice(&self.reserved);
        buf[INFO_HASH].copy_from_slice(&self.infohash);
        buf[PEER_ID].copy_from_slice(&self.peer_id);

        buf
    }

    /// Returns `None` unless `buf` names the BitTorrent protocol.
    pub fn deserialize(buf: &[u8; HANDSHAKE_LEN]) -> Option<Self> {
        if buf[0] != PSTR_LEN || &buf[1..20] != PSTR.as_bytes() {
            return None;
        }

        let mut handshake = Handshake::new([0; HASH_LEN], [0; HASH_LEN]);
        handshake.reserved.copy_from_slice(&buf[RESERVED]);
        handshake.infohash.copy_from_slice(&buf[INFO_HASH]);
        handshake.peer_id.copy_from_slice(&buf[PEER_ID]);

        Some(handshake)
    }
}
