//! Scripted remote peer for exercising channels over `tokio::io::duplex`.

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

use crate::peer::client::{ClientConfig, PeerChannel};
use crate::peer::handshake::{HANDSHAKE_LEN, Handshake};
use crate::peer::message::{Message, MessageId};

pub const MOCK_INFOHASH: [u8; 20] = [7u8; 20];
pub const MOCK_PEER_ID: [u8; 20] = *b"-MK0001-mockmockmock";

/// Reads the local handshake and answers with `infohash` / `peer_id`.
pub async fn accept_handshake(
    remote: &mut DuplexStream,
    infohash: [u8; 20],
    peer_id: [u8; 20],
) -> Handshake {
    let mut buf = [0u8; HANDSHAKE_LEN];
    remote.read_exact(&mut buf).await.unwrap();
    remote
        .write_all(&Handshake::new(infohash, peer_id).serialize())
        .await
        .unwrap();
    Handshake::deserialize(&buf).unwrap()
}

pub async fn send(remote: &mut DuplexStream, kind: MessageId, payload: &[u8]) {
    remote
        .write_all(&Message::new(kind, payload.to_vec()).serialize())
        .await
        .unwrap();
}

pub async fn recv(remote: &mut DuplexStream) -> Message {
    let len = remote.read_u32().await.unwrap();
    let mut frame = vec![0u8; len as usize];
    remote.read_exact(&mut frame).await.unwrap();
    Message {
        id: frame[0],
        payload: frame[1..].to_vec(),
    }
}

/// A PIECE message carrying `data` at `begin` of piece `index`.
pub async fn send_block(remote: &mut DuplexStream, index: u32, begin: u32, data: &[u8]) {
    let mut payload = Vec::with_capacity(8 + data.len());
    payload.extend_from_slice(&index.to_be_bytes());
    payload.extend_from_slice(&begin.to_be_bytes());
    payload.extend_from_slice(data);
    send(remote, MessageId::Piece, &payload).await;
}

/// A channel that has completed its handshake with a scripted peer.
pub async fn handshaken_channel(
    config: ClientConfig,
) -> (PeerChannel<DuplexStream>, DuplexStream) {
    let (local, mut remote) = duplex(1 << 20);
    remote
        .write_all(&Handshake::new(MOCK_INFOHASH, MOCK_PEER_ID).serialize())
        .await
        .unwrap();

    let mut channel = PeerChannel::new(local, config);
    channel.handshake(MOCK_INFOHASH).await.unwrap();

    let mut ours = [0u8; HANDSHAKE_LEN];
    remote.read_exact(&mut ours).await.unwrap();
    (channel, remote)
}

/// A channel that has been unchoked by a scripted peer.
pub async fn ready_channel(config: ClientConfig) -> (PeerChannel<DuplexStream>, DuplexStream) {
    let (local, mut remote) = duplex(1 << 20);
    remote
        .write_all(&Handshake::new(MOCK_INFOHASH, MOCK_PEER_ID).serialize())
        .await
        .unwrap();
    send(&mut remote, MessageId::Bitfield, &[0xFF]).await;
    send(&mut remote, MessageId::Unchoke, &[]).await;

    let mut channel = PeerChannel::new(local, config);
    channel.prepare(MOCK_INFOHASH).await.unwrap();

    let mut ours = [0u8; HANDSHAKE_LEN];
    remote.read_exact(&mut ours).await.unwrap();
    assert_eq!(recv(&mut remote).await.kind(), Some(MessageId::Interested));
    (channel, remote)
}

/// Answers `count` REQUEST messages from `content`, split into pieces of
/// `piece_length`, then hands the stream back.
pub async fn serve_requests(
    mut remote: DuplexStream,
    content: Vec<u8>,
    piece_length: usize,
    count: usize,
) -> DuplexStream {
    for _ in 0..count {
        let request = recv(&mut remote).await;
        assert_eq!(request.kind(), Some(MessageId::Request));
        let field = |i: usize| {
            u32::from_be_bytes(request.payload[i..i + 4].try_into().unwrap()) as usize
        };
        let (index, begin, length) = (field(0), field(4), field(8));
        let start = index * piece_length + begin;
        send_block(
            &mut remote,
            index as u32,
            begin as u32,
            &content[start..start + length],
        )
        .await;
    }
    remote
}
