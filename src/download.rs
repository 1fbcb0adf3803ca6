use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::error::{Error, Result, Violation};
use crate::peer::client::PeerChannel;
use crate::peer::message::{Message, MessageId, PieceBlock};
use crate::peer::state::{PieceBuffer, blocks_for_piece};
use crate::torrent::{HASH_LEN, Torrent};

/// Downloads one piece over a ready channel and checks it against
/// `expected_hash`.
///
/// Every block is requested up front; responses are placed by offset, so
/// the peer may answer in any order. A block for another piece or outside
/// the piece aborts with a protocol violation, and a hash mismatch is
/// reported as `Error::Verification`. A zero `length` is refused before
/// anything is sent. Nothing is retried.
pub async fn download_piece<S>(
    channel: &mut PeerChannel<S>,
    index: u32,
    length: u32,
    expected_hash: &[u8; HASH_LEN],
) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if length == 0 {
        return Err(Error::EmptyPiece { piece: index });
    }
    if !channel.is_ready() {
        return Err(Violation::InvalidState(channel.state()).into());
    }

    let blocks = blocks_for_piece(index, length);
    for block in &blocks {
        channel.send(&Message::request(block)).await?;
    }
    debug!(piece = index, blocks = blocks.len(), "requested all blocks");

    let mut buffer = PieceBuffer::new(index, length);
    for _ in 0..blocks.len() {
        let payload = channel.wait_for(MessageId::Piece).await?;
        let block = PieceBlock::parse(&payload)?;
        buffer.place(&block)?;
        debug!(
            piece = index,
            begin = block.begin,
            progress = buffer.progress(),
            "placed block"
        );
    }

    let data = buffer.verify(expected_hash)?;
    info!(piece = index, bytes = length, "piece verified");
    Ok(data)
}

/// Downloads piece `index` of `torrent`, using its piece layout and hash.
pub async fn download_torrent_piece<S>(
    torrent: &Torrent,
    index: usize,
    channel: &mut PeerChannel<S>,
) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let count = torrent.piece_count();
    let (Some(length), Some(hash)) = (torrent.piece_len(index), torrent.piece_hash(index)) else {
        return Err(Error::PieceIndex { index, count });
    };

    // piece lengths are bounded by u32 when the torrent is parsed
    download_piece(channel, index as u32, length as u32, hash).await
}

/// Downloads every piece in order over a single channel and returns the
/// whole file.
pub async fn download_all<S>(torrent: &Torrent, channel: &mut PeerChannel<S>) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let total = usize::try_from(torrent.length)
        .map_err(|_| Error::Schema(format!("{} bytes do not fit in memory", torrent.length)))?;
    let mut output = vec![0u8; total];
    let mut offset = 0;

    for index in 0..torrent.piece_count() {
        let piece = download_torrent_piece(torrent, index, channel).await?;
        output[offset..offset + piece.len()].copy_from_slice(&piece);
        offset += piece.len();
        info!(
            piece = index,
            done = index + 1,
            total = torrent.piece_count(),
            "downloaded piece"
        );
    }

    Ok(output)
}
