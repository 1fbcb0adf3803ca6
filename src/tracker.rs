use crate::bencode_parser::{Value, decode};
use crate::error::{Error, Result};
use crate::peer::client::ClientConfig;
use crate::peer::{COMPACT_PEER_LEN, Peer};
use crate::torrent::Torrent;
use once_cell::sync::OnceCell;
use percent_encoding::{NON_ALPHANUMERIC, percent_encode};
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

static HTTP_CLIENT: OnceCell<Client> = OnceCell::new();

/// Shared HTTP client, built on first use. A build failure is returned
/// and retried on the next call.
fn http_client() -> Result<&'static Client> {
    let client = HTTP_CLIENT.get_or_try_init(|| {
        Client::builder().user_agent("rs_torrent/0.1").build()
    })?;
    Ok(client)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerResponse {
    pub interval: i64,
    pub peers: Vec<Peer>,
}

fn encode_bytes(bytes: &[u8]) -> String {
    percent_encode(bytes, NON_ALPHANUMERIC).to_string()
}

/// Announce URL carrying the info hash, our peer id and transfer counters.
/// Query parameters already present on the announce URL are kept.
pub fn build_tracker_url(torrent: &Torrent, config: &ClientConfig) -> Result<Url> {
    let mut base = Url::parse(&torrent.announce)?;

    let info_hash = encode_bytes(&torrent.infohash);
    let peer_id = encode_bytes(&config.peer_id);

    let query = format!(
        "info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&left={}&compact=1",
        info_hash, peer_id, config.port, torrent.length
    );
    let query = match base.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
        _ => query,
    };

    base.set_query(Some(&query));
    Ok(base)
}

async fn contact_tracker(tracker_url: Url) -> Result<Vec<u8>> {
    let response = http_client()?.get(tracker_url).send().await?;

    if !response.status().is_success() {
        return Err(Error::Tracker(format!("HTTP status {}", response.status())));
    }

    let bytes = response.bytes().await?;
    Ok(bytes.to_vec())
}

/// Splits a compact peer list into 6-byte address records, in order.
pub fn extract_peers(bytes: &[u8]) -> Result<Vec<Peer>> {
    if bytes.len() % COMPACT_PEER_LEN != 0 {
        return Err(Error::Tracker(format!(
            "compact peer list of {} bytes is not a multiple of {COMPACT_PEER_LEN}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(COMPACT_PEER_LEN)
        .map(|chunk| {
            let mut record = [0u8; COMPACT_PEER_LEN];
            record.copy_from_slice(chunk);
            Peer::from_compact(record)
        })
        .collect())
}

pub fn parse_tracker_response(bytes: &[u8]) -> Result<TrackerResponse> {
    let (value, _) = decode(bytes)?;
    if value.as_dict().is_none() {
        return Err(Error::Tracker("response is not a dictionary".to_string()));
    }

    if let Some(reason) = value.get(b"failure reason") {
        let reason = reason
            .as_bytes()
            .map(|r| String::from_utf8_lossy(r).into_owned())
            .unwrap_or_default();
        return Err(Error::Tracker(reason));
    }

    let interval = value
        .get(b"interval")
        .and_then(Value::as_integer)
        .ok_or_else(|| Error::Tracker("missing 'interval'".to_string()))?;

    let peers = value
        .get(b"peers")
        .and_then(Value::as_bytes)
        .ok_or_else(|| Error::Tracker("missing compact 'peers'".to_string()))?;

    Ok(TrackerResponse {
        interval,
        peers: extract_peers(peers)?,
    })
}

/// Queries the torrent's tracker for peers.
pub async fn announce_to_tracker(
    torrent: &Torrent,
    config: &ClientConfig,
) -> Result<TrackerResponse> {
    let url = build_tracker_url(torrent, config)?;
    debug!(%url, "announcing to tracker");

    let response_bytes = contact_tracker(url).await?;
    let response = parse_tracker_response(&response_bytes)?;
    info!(
        interval = response.interval,
        peers = response.peers.len(),
        "tracker answered"
    );
    Ok(response)
}
