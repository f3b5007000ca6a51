//! server-stub — minimal central-server stand-in for manual testing of
//! `worker` against the session wire protocol.
//!
//! Accepts connections and logs each frame's length and leading type
//! byte. It does not implement the session's response logic (no
//! PredictRequest is ever sent back) — this is a protocol sniffer for
//! manual verification, not a reference server.

use std::net::SocketAddr;

use clap::Parser;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// servingcore demo server stub.
#[derive(Parser)]
#[command(name = "server-stub")]
#[command(version = servingcore::PKG_VERSION)]
#[command(about = "Accepts worker connections and logs the frames they send")]
struct Args {
    /// Address to listen on.
    #[arg(short, long, env = "SERVINGCORE_LISTEN_ADDR", default_value = "127.0.0.1:7070")]
    listen_addr: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let listener = TcpListener::bind(args.listen_addr).await?;
    info!(addr = %args.listen_addr, "server-stub listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "worker connected");
        tokio::spawn(async move {
            if let Err(err) = sniff_frames(stream, peer).await {
                warn!(%peer, error = %err, "connection closed");
            }
        });
    }
}

async fn sniff_frames(mut stream: impl AsyncRead + Unpin, peer: SocketAddr) -> std::io::Result<()> {
    loop {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let len = u32::from_le_bytes(len_buf) as usize;

        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await?;

        let as_i32 = (len == 4).then(|| i32::from_le_bytes(payload[..4].try_into().unwrap()));
        info!(%peer, frame_len = len, as_i32 = ?as_i32, "frame received");
    }
}
