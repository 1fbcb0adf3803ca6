use crate::error::Violation;
use crate::peer::state::BlockInfo;

/// Length of the big-endian frame prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Choke),
            1 => Ok(Self::Unchoke),
            2 => Ok(Self::Interested),
            3 => Ok(Self::NotInterested),
            4 => Ok(Self::Have),
            5 => Ok(Self::Bitfield),
            6 => Ok(Self::Request),
            7 => Ok(Self::Piece),
            8 => Ok(Self::Cancel),
            other => Err(other),
        }
    }
}

/// A framed peer message. The id is kept raw so that extension messages
/// this client does not know about can still be read and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u8,
    pub payload: Vec<u8>,
}

/// The payload of a PIECE message, borrowed from the message.
#[derive(Debug, PartialEq, Eq)]
pub struct PieceBlock<'a> {
    pub index: u32,
    pub begin: u32,
    pub data: &'a [u8],
}

impl<'a> PieceBlock<'a> {
    /// Splits a PIECE payload into `index`, `begin` and the block bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self, Violation> {
        if payload.len() < 8 {
            return Err(Violation::ShortPiecePayload(payload.len()));
        }
        Ok(PieceBlock {
            index: be_u32(&payload[0..4]),
            begin: be_u32(&payload[4..8]),
            data: &payload[8..],
        })
    }
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

impl Message {
    pub fn new(kind: MessageId, payload: Vec<u8>) -> Self {
        Self {
            id: kind as u8,
            payload,
        }
    }

    pub fn kind(&self) -> Option<MessageId> {
        MessageId::try_from(self.id).ok()
    }

    /// REQUEST for one block: `index || begin || length`, all big-endian.
    pub fn request(block: &BlockInfo) -> Self {
        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(&block.piece_index.to_be_bytes());
        payload.extend_from_slice(&block.offset.to_be_bytes());
        payload.extend_from_slice(&block.length.to_be_bytes());
        Self::new(MessageId::Request, payload)
    }

    pub fn piece_block(&self) -> Result<PieceBlock<'_>, Violation> {
        PieceBlock::parse(&self.payload)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let total_len = 1 + self.payload.len(); // 1 byte for ID
        let mut buf = Vec::with_capacity(LENGTH_PREFIX_LEN + total_len);

        buf.extend_from_slice(&(total_len as u32).to_be_bytes()); // 4-byte length
        buf.push(self.id); // 1-byte message ID
        buf.extend_from_slice(&self.payload); // payload

        buf
    }
}
