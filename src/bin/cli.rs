use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rs_torrent::peer::client::{DEFAULT_PEER_ID, DEFAULT_PORT};
use rs_torrent::tracker::announce_to_tracker;
use rs_torrent::{
    ClientConfig, Error, Peer, PeerChannel, Result, Torrent, decode, download_all,
    download_torrent_piece, parse_torrent_file,
};
use tracing_subscriber::EnvFilter;

/// Single-peer BitTorrent client
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// 20-byte peer id sent to the tracker and in handshakes.
    #[arg(long, global = true, value_parser = parse_peer_id)]
    peer_id: Option<[u8; 20]>,

    /// Port announced to the tracker.
    #[arg(long, global = true, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Seconds to wait for a peer before giving up; 0 waits forever.
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a bencoded value and print it as JSON.
    Decode { value: String },
    /// Print the contents of a torrent file.
    Info { file: PathBuf },
    /// List the peers the tracker returns.
    Peers { file: PathBuf },
    /// Handshake with a peer and print its peer id.
    Handshake { file: PathBuf, peer: Peer },
    /// Download one piece to a file.
    #[command(name = "download_piece")]
    DownloadPiece {
        #[arg(short, long)]
        output: PathBuf,
        file: PathBuf,
        index: usize,
    },
    /// Download the whole file.
    Download {
        #[arg(short, long)]
        output: PathBuf,
        file: PathBuf,
    },
}

fn parse_peer_id(s: &str) -> std::result::Result<[u8; 20], String> {
    s.as_bytes()
        .try_into()
        .map_err(|_| format!("peer id must be exactly 20 bytes, got {}", s.len()))
}

impl Args {
    fn config(&self) -> ClientConfig {
        ClientConfig {
            peer_id: self.peer_id.unwrap_or(DEFAULT_PEER_ID),
            port: self.port,
            read_timeout: (self.timeout > 0).then(|| Duration::from_secs(self.timeout)),
            ..ClientConfig::default()
        }
    }
}

/// Asks the tracker for peers and readies a channel to the first one.
async fn ready_first_peer(torrent: &Torrent, config: &ClientConfig) -> Result<PeerChannel> {
    let response = announce_to_tracker(torrent, config).await?;
    let peer = response
        .peers
        .first()
        .ok_or_else(|| Error::Tracker("tracker returned no peers".to_string()))?;

    let mut channel = PeerChannel::connect(peer, config.clone()).await?;
    channel.prepare(torrent.infohash).await?;
    Ok(channel)
}

async fn run(args: Args) -> Result<()> {
    let config = args.config();

    match args.command {
        Command::Decode { value } => {
            let (decoded, _) = decode(value.as_bytes())?;
            println!("{}", decoded.to_json());
        }
        Command::Info { file } => {
            let torrent = parse_torrent_file(&file)?;
            println!("Tracker URL: {}", torrent.announce);
            println!("Length: {}", torrent.length);
            println!("Info Hash: {}", torrent.info_hash_hex());
            println!("Piece Length: {}", torrent.piece_length);
            println!("Piece Hashes:");
            for hash in &torrent.pieces {
                println!("{}", hex::encode(hash));
            }
        }
        Command::Peers { file } => {
            let torrent = parse_torrent_file(&file)?;
            let response = announce_to_tracker(&torrent, &config).await?;
            for peer in response.peers {
                println!("{peer}");
            }
        }
        Command::Handshake { file, peer } => {
            let torrent = parse_torrent_file(&file)?;
            let mut channel = PeerChannel::connect(&peer, config).await?;
            let theirs = channel.handshake(torrent.infohash).await?;
            println!("Peer ID: {}", hex::encode(theirs.peer_id));
            channel.shutdown().await?;
        }
        Command::DownloadPiece {
            output,
            file,
            index,
        } => {
            let torrent = parse_torrent_file(&file)?;
            let mut channel = ready_first_peer(&torrent, &config).await?;
            let piece = download_torrent_piece(&torrent, index, &mut channel).await?;
            tokio::fs::write(&output, &piece).await?;
            println!("Piece {index} downloaded to {}.", output.display());
        }
        Command::Download { output, file } => {
            let torrent = parse_torrent_file(&file)?;
            let mut channel = ready_first_peer(&torrent, &config).await?;
            let data = download_all(&torrent, &mut channel).await?;
            tokio::fs::write(&output, &data).await?;
            println!("Downloaded {} to {}.", file.display(), output.display());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
