use sha1::{Digest, Sha1};

use crate::error::{Error, Violation};
use crate::peer::message::PieceBlock;
use crate::torrent::HASH_LEN;

pub const PIECE_BLOCK_SIZE: u32 = 16384; // 16KB blocks

/// Represents a block within a piece
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockInfo {
    pub piece_index: u32,
    pub offset: u32,
    pub length: u32,
}

/// Number of blocks needed to cover `piece_length` bytes.
pub fn block_count(piece_length: u32) -> u32 {
    piece_length.div_ceil(PIECE_BLOCK_SIZE)
}

/// Partitions `[0, piece_length)` into consecutive blocks of
/// `PIECE_BLOCK_SIZE`, the last one holding whatever remains.
pub fn blocks_for_piece(piece_index: u32, piece_length: u32) -> Vec<BlockInfo> {
    (0..block_count(piece_length))
        .map(|i| {
            let offset = i * PIECE_BLOCK_SIZE;
            BlockInfo {
                piece_index,
                offset,
                length: PIECE_BLOCK_SIZE.min(piece_length - offset),
            }
        })
        .collect()
}

/// Reassembly buffer for a single piece. Blocks are copied in at their
/// offset so they may arrive in any order.
#[derive(Debug)]
pub struct PieceBuffer {
    piece_index: u32,
    data: Vec<u8>,
    blocks_received: u32,
}

impl PieceBuffer {
    pub fn new(piece_index: u32, piece_length: u32) -> Self {
        Self {
            piece_index,
            data: vec![0; piece_length as usize],
            blocks_received: 0,
        }
    }

    pub fn blocks_received(&self) -> u32 {
        self.blocks_received
    }

    /// Fraction of the expected blocks that have been placed.
    pub fn progress(&self) -> f64 {
        let expected = block_count(self.data.len() as u32);
        if expected == 0 {
            return 1.0;
        }
        f64::from(self.blocks_received.min(expected)) / f64::from(expected)
    }

    /// Copies `block` into the buffer. Nothing is written unless the block
    /// belongs to this piece, is no longer than `PIECE_BLOCK_SIZE` and lies
    /// entirely inside the piece.
    pub fn place(&mut self, block: &PieceBlock<'_>) -> Result<(), Violation> {
        if block.index != self.piece_index {
            return Err(Violation::WrongPieceIndex {
                expected: self.piece_index,
                received: block.index,
            });
        }

        if block.data.len() > PIECE_BLOCK_SIZE as usize {
            return Err(Violation::BlockTooLarge {
                piece: self.piece_index,
                begin: block.begin,
                length: block.data.len(),
            });
        }

        let begin = block.begin as usize;
        let end = begin
            .checked_add(block.data.len())
            .filter(|end| *end <= self.data.len())
            .ok_or(Violation::BlockOutOfRange {
                piece: self.piece_index,
                begin: block.begin,
                length: block.data.len(),
                piece_length: self.data.len(),
            })?;

        self.data[begin..end].copy_from_slice(block.data);
        self.blocks_received += 1;
        Ok(())
    }

    /// Checks the assembled bytes against `expected` and hands them back.
    pub fn verify(self, expected: &[u8; HASH_LEN]) -> Result<Vec<u8>, Error> {
        let digest: [u8; HASH_LEN] = Sha1::digest(&self.data).into();
        if &digest != expected {
            return Err(Error::Verification {
                piece: self.piece_index,
            });
        }
        Ok(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sha1(data: &[u8]) -> [u8; HASH_LEN] {
        Sha1::digest(data).into()
    }

    #[test]
    fn test_full_piece_partition() {
        let blocks = blocks_for_piece(0, 262144);

        assert_eq!(block_count(262144), 16);
        assert_eq!(blocks.len(), 16);
        assert!(blocks.iter().all(|b| b.length == PIECE_BLOCK_SIZE));
        let offsets: Vec<u32> = blocks.iter().map(|b| b.offset).collect();
        let expected: Vec<u32> = (0..16).map(|i| i * 16384).collect();
        assert_eq!(offsets, expected);
        assert_eq!(offsets.last(), Some(&245760));
    }

    #[test]
    fn test_short_last_block() {
        let blocks = blocks_for_piece(3, 34460);

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2], BlockInfo {
            piece_index: 3,
            offset: 32768,
            length: 1692,
        });
        assert_eq!(blocks.iter().map(|b| b.length).sum::<u32>(), 34460);
    }

    #[test]
    fn test_blocks_cover_piece_exactly_once() {
        for piece_length in [1, 16383, 16384, 16385, 100_000] {
            let blocks = blocks_for_piece(0, piece_length);
            let mut next = 0;
            for block in &blocks {
                assert_eq!(block.offset, next);
                assert!(block.length > 0 && block.length <= PIECE_BLOCK_SIZE);
                next += block.length;
            }
            assert_eq!(next, piece_length);
        }
    }

    #[test]
    fn test_place_out_of_order_and_verify() {
        let content: Vec<u8> = (0..32768u32).map(|i| (i % 251) as u8).collect();
        let mut buffer = PieceBuffer::new(1, 32768);

        buffer
            .place(&PieceBlock {
                index: 1,
                begin: 16384,
                data: &content[16384..],
            })
            .unwrap();
        assert_eq!(buffer.progress(), 0.5);
        buffer
            .place(&PieceBlock {
                index: 1,
                begin: 0,
                data: &content[..16384],
            })
            .unwrap();

        assert_eq!(buffer.blocks_received(), 2);
        assert_eq!(buffer.verify(&sha1(&content)).unwrap(), content);
    }

    #[test]
    fn test_place_wrong_index_writes_nothing() {
        let mut buffer = PieceBuffer::new(0, 16);
        let result = buffer.place(&PieceBlock {
            index: 7,
            begin: 0,
            data: &[0xFF; 16],
        });

        assert_eq!(
            result,
            Err(Violation::WrongPieceIndex {
                expected: 0,
                received: 7
            })
        );
        assert_eq!(buffer.blocks_received(), 0);
        assert_eq!(buffer.data, vec![0; 16]);
    }

    #[test]
    fn test_place_out_of_range() {
        let mut buffer = PieceBuffer::new(0, 16);

        assert_matches!(
            buffer.place(&PieceBlock {
                index: 0,
                begin: 10,
                data: &[1; 7],
            }),
            Err(Violation::BlockOutOfRange { begin: 10, length: 7, .. })
        );
        assert_matches!(
            buffer.place(&PieceBlock {
                index: 0,
                begin: u32::MAX,
                data: &[1],
            }),
            Err(Violation::BlockOutOfRange { .. })
        );
        assert_eq!(buffer.data, vec![0; 16]);
    }

    #[test]
    fn test_place_oversized_block() {
        let mut buffer = PieceBuffer::new(0, 32768);
        let result = buffer.place(&PieceBlock {
            index: 0,
            begin: 0,
            data: &[0xAB; 32768],
        });

        assert_eq!(
            result,
            Err(Violation::BlockTooLarge {
                piece: 0,
                begin: 0,
                length: 32768
            })
        );
        assert_eq!(buffer.blocks_received(), 0);
        assert!(buffer.data.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_verify_mismatch() {
        let mut buffer = PieceBuffer::new(2, 4);
        buffer
            .place(&PieceBlock {
                index: 2,
                begin: 0,
                data: b"data",
            })
            .unwrap();

        assert_matches!(
            buffer.verify(&sha1(b"other")),
            Err(Error::Verification { piece: 2 })
        );
    }
}
