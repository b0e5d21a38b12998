use clap::{Parser, Subcommand};
use p9mux::{Message, StreamChannel, Transport, TransportConfig, Version};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Diagnostic client for 9P-style transports
#[derive(Parser)]
#[command(name = "p9mux")]
#[command(version)]
#[command(about = "Diagnostic client for 9P-style tag-multiplexed transports")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a server, negotiate the protocol version and print the reply
    Probe {
        /// Server address (e.g., 127.0.0.1:564)
        addr: String,

        /// Transport configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Maximum message size to offer (overrides the config file)
        #[arg(long)]
        msize: Option<u32>,

        /// Give up on the server's answer after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Probe {
            addr,
            config,
            msize,
            timeout_ms,
        } => {
            let mut config = match config {
                Some(path) => TransportConfig::load(&path).unwrap_or_else(|e| {
                    eprintln!("Error: {}: {}", path.display(), e);
                    std::process::exit(2);
                }),
                None => TransportConfig::default(),
            };
            if let Some(msize) = msize {
                config.msize = msize;
            }
            if let Some(timeout_ms) = timeout_ms {
                config.request_timeout_ms = timeout_ms;
            }
            if let Err(e) = config.validate() {
                eprintln!("Error: {}", e);
                std::process::exit(2);
            }

            if let Err(e) = probe(&addr, config).await {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

async fn probe(addr: &str, config: TransportConfig) -> Result<(), Box<dyn std::error::Error>> {
    let connect_timeout = config
        .request_timeout()
        .unwrap_or(Duration::from_secs(10));
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| format!("connecting to {} timed out", addr))??;
    log::info!(target: "p9mux::cli", "Connected to {}", addr);

    let channel = StreamChannel::new(stream, &config);
    let transport = Transport::spawn(channel, CancellationToken::new(), config);
    let offer = Version {
        msize: transport.config().msize,
        version: transport.config().version.clone(),
    };

    let result = transport
        .send(&CancellationToken::new(), Message::Tversion(offer))
        .await;
    let _ = transport.close();
    transport.closed().await;

    match result? {
        Message::Rversion(version) => {
            println!("version={} msize={}", version.version, version.msize);
            Ok(())
        }
        other => Err(format!("unexpected reply to Tversion: {}", other.frame_type()).into()),
    }
}
