use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use h2nc::adapters::{serve, ConnectionTracker, HyperTunnelAdapter, StreamClient, TcpDialer};
use h2nc::config::Config;
use h2nc::domain::TunnelBridge;

#[derive(Parser, Debug)]
#[command(version = env!("H2NC_VERSION"), author = env!("CARGO_PKG_AUTHORS"))]
pub struct Opts {
    /// Configuration file, defaults to the per-user h2nc configuration
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Log more; repeat for trace output. RUST_LOG takes precedence
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept CONNECT requests and tunnel them to their destination
    Serve {
        /// listen on this network address
        #[arg(long, short = 'b')]
        bind: Option<String>,

        /// tunnel every request to this host:port instead of the requested one
        #[arg(long, short = 'd')]
        destination: Option<String>,
    },
    /// Tunnel stdin and stdout to a host:port
    Connect { destination: String },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries tunnel data in connect mode
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(unix)]
fn raise_fd_limit() {
    match rlimit::increase_nofile_limit(u64::MAX) {
        Ok(limit) => info!("open file limit set to {}", limit),
        Err(e) => warn!("could not raise open file limit: {}", e),
    }
}

#[cfg(not(unix))]
fn raise_fd_limit() {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = Opts::parse();
    init_logging(opts.verbose);

    let config = Config::load(opts.config.as_deref())?;

    let tracker = Arc::new(ConnectionTracker::new());
    tracker.start_cleanup();

    let dialer = TcpDialer::new()
        .with_nodelay(config.nodelay)
        .with_connect_timeout(config.connect_timeout());
    let bridge = Arc::new(TunnelBridge::new(Arc::new(dialer), tracker));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, shutting down");
                shutdown.cancel();
            }
        });
    }

    match opts.command {
        Command::Serve { bind, destination } => {
            raise_fd_limit();

            let bind = bind.unwrap_or(config.bind);
            let destination = destination.or(config.destination);
            if let Some(destination) = &destination {
                info!("tunneling every request to {}", destination);
            }

            let listener = TcpListener::bind(&bind).await?;
            let adapter = Arc::new(HyperTunnelAdapter::new(bridge, shutdown.clone()).with_destination(destination));
            serve(listener, adapter, shutdown).await?;
        }
        Command::Connect { destination } => {
            let mut client =
                StreamClient::new(tokio::io::stdin(), tokio::io::stdout()).with_cancellation(shutdown.clone());

            tokio::select! {
                result = bridge.bridge(&mut client, &destination) => {
                    result?;
                }
                _ = shutdown.cancelled() => {}
            }
        }
    }
    Ok(())
}
