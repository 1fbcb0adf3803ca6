use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

pub mod client;
pub mod handshake;
pub mod message;
pub mod state;

#[cfg(test)]
pub(crate) mod mock;

pub(crate) const PSTR: &str = "BitTorrent protocol";
pub(crate) const PSTR_LEN: u8 = PSTR.len() as u8; // always 19

/// Size of one peer record in a compact tracker response.
pub const COMPACT_PEER_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peer {
    pub ip_addr: Ipv4Addr,
    pub port: u16,
}

impl Peer {
    /// Reads a 4-byte address followed by a big-endian port.
    pub fn from_compact(record: [u8; COMPACT_PEER_LEN]) -> Self {
        Peer {
            ip_addr: Ipv4Addr::new(record[0], record[1], record[2], record[3]),
            port: u16::from_be_bytes([record[4], record[5]]),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip_addr, self.port))
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip_addr, self.port)
    }
}

impl FromStr for Peer {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: SocketAddrV4 = s.parse()?;
        Ok(Peer {
            ip_addr: *addr.ip(),
            port: addr.port(),
        })
    }
}
