use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result, Violation};
use crate::peer::Peer;
use crate::peer::handshake::{HANDSHAKE_LEN, Handshake};
use crate::peer::message::{Message, MessageId};
use crate::peer::state::PIECE_BLOCK_SIZE;
use crate::torrent::HASH_LEN;

pub const DEFAULT_PEER_ID: [u8; HASH_LEN] = *b"00112233445566778899";
pub const DEFAULT_PORT: u16 = 6881;
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest length prefix accepted from a peer. Leaves room for the
/// bitfields of large torrents, well above one PIECE frame.
pub const MAX_FRAME_LEN: u32 = 64 * PIECE_BLOCK_SIZE + 9;

/// Settings injected into every tracker query and peer channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub peer_id: [u8; HASH_LEN],
    pub port: u16,
    pub connect_timeout: Duration,
    /// Deadline for each handshake read and each `wait_for`. `None` blocks
    /// until the peer answers or hangs up.
    pub read_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            peer_id: DEFAULT_PEER_ID,
            port: DEFAULT_PORT,
            connect_timeout: CONNECTION_TIMEOUT,
            read_timeout: Some(READ_TIMEOUT),
        }
    }
}

/// Lifecycle of a peer channel. A channel only exists once its socket has
/// been dialed, so it starts in `Dialed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Dialed,
    HandshakeSent,
    HandshakeAcked,
    AwaitingBitfield,
    Interested,
    Unchoked,
    Broken,
}

/// One connection to one peer: the handshake, then length-prefixed
/// messages in both directions.
///
/// Any error leaves the channel `Broken`; the socket is released when the
/// channel is dropped or [`PeerChannel::shutdown`] is called.
#[derive(Debug)]
pub struct PeerChannel<S = TcpStream> {
    stream: S,
    state: ChannelState,
    config: ClientConfig,
    remote_peer_id: Option<[u8; HASH_LEN]>,
    label: String,
}

async fn with_deadline<T>(
    deadline: Option<Duration>,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match deadline {
        Some(d) => timeout(d, fut)
            .await
            .map_err(|_| Error::timed_out(what))?,
        None => fut.await,
    }
}

impl PeerChannel<TcpStream> {
    /// Dials `peer` over TCP, giving up after `connect_timeout`.
    pub async fn connect(peer: &Peer, config: ClientConfig) -> Result<Self> {
        let stream = timeout(config.connect_timeout, TcpStream::connect(peer.socket_addr()))
            .await
            .map_err(|_| Error::timed_out("connecting to peer"))?
            .map_err(Error::Connection)?;

        info!(%peer, "connected to peer");
        Ok(Self::with_label(stream, config, peer.to_string()))
    }
}

impl<S> PeerChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already connected stream.
    pub fn new(stream: S, config: ClientConfig) -> Self {
        Self::with_label(stream, config, "peer".to_string())
    }

    fn with_label(stream: S, config: ClientConfig, label: String) -> Self {
        Self {
            stream,
            state: ChannelState::Dialed,
            config,
            remote_peer_id: None,
            label,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ChannelState::Unchoked
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Peer id the remote side announced in its handshake.
    pub fn remote_peer_id(&self) -> Option<&[u8; HASH_LEN]> {
        self.remote_peer_id.as_ref()
    }

    fn require(&self, allowed: &[ChannelState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Violation::InvalidState(self.state).into())
        }
    }

    fn require_open(&self) -> Result<()> {
        if self.state == ChannelState::Broken || self.state == ChannelState::Dialed {
            return Err(Violation::InvalidState(self.state).into());
        }
        Ok(())
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!(peer = %self.label, error = %e, "peer channel broken");
            self.state = ChannelState::Broken;
        }
        result
    }

    async fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await.map_err(Error::Connection)?;
        self.stream.flush().await.map_err(Error::Connection)
    }

    /// Sends our handshake and validates the one the peer answers with. A
    /// peer that answers for a different torrent is rejected.
    pub async fn handshake(&mut self, infohash: [u8; HASH_LEN]) -> Result<Handshake> {
        self.require(&[ChannelState::Dialed])?;
        let result = self.exchange_handshake(infohash).await;
        self.track(result)
    }

    async fn exchange_handshake(&mut self, infohash: [u8; HASH_LEN]) -> Result<Handshake> {
        let ours = Handshake::new(infohash, self.config.peer_id);
        self.write_frame(&ours.serialize()).await?;
        self.state = ChannelState::HandshakeSent;

        let mut response = [0u8; HANDSHAKE_LEN];
        let deadline = self.config.read_timeout;
        let stream = &mut self.stream;
        let read = async {
            stream
                .read_exact(&mut response)
                .await
                .map_err(Error::Connection)
        };
        with_deadline(deadline, "reading handshake", read).await?;

        let theirs = Handshake::deserialize(&response).ok_or(Violation::InvalidHandshake)?;
        if theirs.infohash != infohash {
            return Err(Violation::InfoHashMismatch {
                expected: hex::encode(infohash),
                received: hex::encode(theirs.infohash),
            }
            .into());
        }

        info!(
            peer = %self.label,
            remote_id = %hex::encode(theirs.peer_id),
            "handshake complete"
        );
        self.remote_peer_id = Some(theirs.peer_id);
        self.state = ChannelState::HandshakeAcked;
        Ok(theirs)
    }

    /// Reads one frame. Keep-alives come back as `None`.
    pub async fn read_message(&mut self) -> Result<Option<Message>> {
        self.require_open()?;
        let result = self.read_frame().await;
        self.track(result)
    }

    async fn read_frame(&mut self) -> Result<Option<Message>> {
        let len = self.stream.read_u32().await.map_err(Error::Connection)?;
        if len == 0 {
            debug!(peer = %self.label, "received keep-alive");
            return Ok(None);
        }
        if len > MAX_FRAME_LEN {
            return Err(Violation::FrameTooLarge(len).into());
        }

        let id = self.stream.read_u8().await.map_err(Error::Connection)?;
        let mut payload = vec![0u8; len as usize - 1];
        self.stream
            .read_exact(&mut payload)
            .await
            .map_err(Error::Connection)?;

        debug!(peer = %self.label, id, len = payload.len(), "received message");
        Ok(Some(Message { id, payload }))
    }

    /// Reads messages until one of kind `kind` arrives and returns its
    /// payload; everything else is discarded. Bounded by `read_timeout`
    /// when one is configured.
    pub async fn wait_for(&mut self, kind: MessageId) -> Result<Vec<u8>> {
        self.require_open()?;
        let deadline = self.config.read_timeout;
        let what = format!("waiting for {kind:?}");
        let result = with_deadline(deadline, &what, self.skip_until(kind)).await;
        self.track(result)
    }

    async fn skip_until(&mut self, kind: MessageId) -> Result<Vec<u8>> {
        loop {
            match self.read_frame().await? {
                Some(msg) if msg.id == kind as u8 => return Ok(msg.payload),
                Some(msg) => match msg.kind() {
                    Some(other) => debug!(peer = %self.label, ?other, ?kind, "skipping message"),
                    None => warn!(peer = %self.label, id = msg.id, "skipping unknown message"),
                },
                None => {}
            }
        }
    }

    pub async fn send(&mut self, message: &Message) -> Result<()> {
        self.require_open()?;
        let result = self.write_frame(&message.serialize()).await;
        if result.is_ok() {
            debug!(peer = %self.label, id = message.id, len = message.payload.len(), "sent message");
        }
        self.track(result)
    }

    pub async fn send_message(&mut self, kind: MessageId, payload: Vec<u8>) -> Result<()> {
        self.send(&Message::new(kind, payload)).await
    }

    /// Handshake, wait for the bitfield, declare interest and wait to be
    /// unchoked. On success the channel accepts block requests.
    pub async fn prepare(&mut self, infohash: [u8; HASH_LEN]) -> Result<()> {
        self.handshake(infohash).await?;

        self.state = ChannelState::AwaitingBitfield;
        let bitfield = self.wait_for(MessageId::Bitfield).await?;
        debug!(peer = %self.label, len = bitfield.len(), "received bitfield");

        self.send_message(MessageId::Interested, Vec::new()).await?;
        self.state = ChannelState::Interested;

        self.wait_for(MessageId::Unchoke).await?;
        self.state = ChannelState::Unchoked;
        info!(peer = %self.label, "unchoked, ready for requests");
        Ok(())
    }

    /// Closes the write half and drops the socket.
    pub async fn shutdown(mut self) -> Result<()> {
        self.stream.shutdown().await.map_err(Error::Connection)
    }
}
