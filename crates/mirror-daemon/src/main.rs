//! mirror-daemon: Keeps a directory tree identical to the same tree on one peer.
//!
//! Runs two units joined only by the echo channel: the listener (REQSYNC
//! notifications in, file downloads out) and the watcher (local changes
//! pushed to the peer).

use anyhow::{Context, Result};
use clap::Parser;
use mirror_core::{DebounceFilter, now_secs};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mirror_daemon::config::Config;
use mirror_daemon::dispatcher::SyncDispatcher;
use mirror_daemon::echo::echo_channel;
use mirror_daemon::fetch::FetchEngine;
use mirror_daemon::local_apply::LocalFs;
use mirror_daemon::notifier::{HttpPeer, PushNotifier};
use mirror_daemon::outbound::Outbound;
use mirror_daemon::server::{self, ListenerState};
use mirror_daemon::watcher::FileWatcher;

#[derive(Parser, Debug)]
#[command(name = "mirror-daemon")]
#[command(about = "Two-peer directory mirroring daemon")]
struct Args {
    /// JSON config file
    #[arg(short, long, env = "MIRROR_CONFIG")]
    config: Option<PathBuf>,

    /// Directory to mirror
    #[arg(short, long, env = "MIRROR_SYNC_DIR")]
    sync_dir: Option<PathBuf>,

    /// Port to listen on
    #[arg(long, env = "MIRROR_LISTEN_PORT")]
    listen_port: Option<u16>,

    /// Peer address
    #[arg(long, env = "MIRROR_PEER_IP")]
    peer_ip: Option<String>,

    /// Peer listener port
    #[arg(long, env = "MIRROR_PEER_PORT")]
    peer_port: Option<u16>,

    /// Echo the notification back instead of acknowledging it
    #[arg(long)]
    no_ack: bool,

    /// Only watch the top level of the sync directory
    #[arg(long)]
    no_recursive: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(sync_dir) = &self.sync_dir {
            config.sync_dir = sync_dir.clone();
        }
        if let Some(port) = self.listen_port {
            config.listen_port = port;
        }
        if let Some(peer_ip) = &self.peer_ip {
            config.peer_ip = peer_ip.clone();
        }
        if let Some(port) = self.peer_port {
            config.peer_port = port;
        }
        if self.no_ack {
            config.send_ack = false;
        }
        if self.no_recursive {
            config.watch_recursive = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,mirror_daemon=debug"
    } else {
        "info,mirror_daemon=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.prepare()?;

    info!("Starting mirror-daemon");
    info!("Sync directory: {:?}", config.sync_dir);
    info!("Peer: {}", config.peer_url());

    let headers = config.header_map()?;
    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let local = LocalFs::new(config.sync_dir.clone());

    // Listener side
    let fetcher = FetchEngine::new(client.clone(), &config.peer_url(), headers.clone(), local.clone())?;
    let (echo_tx, echo_rx) = echo_channel(config.echo_channel_capacity, config.echo_window_secs);
    let state = Arc::new(ListenerState {
        dispatcher: SyncDispatcher::new(local, Arc::new(fetcher), echo_tx),
        send_ack: config.send_ack,
        serve_dir: config.sync_dir.clone(),
    });

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let listener = server::bind(&config.listen_socket()).await?;
    let mut listener_shutdown = shutdown_rx.clone();
    let listener_task = tokio::spawn(server::serve(listener, state, async move {
        let _ = listener_shutdown.changed().await;
    }));

    // Watcher side
    let mut watcher = FileWatcher::new(config.sync_dir.clone(), config.watch_recursive)?;
    info!("Watching {:?}", watcher.root());
    let notifier = PushNotifier::new(HttpPeer::new(client, &config.peer_url(), headers));
    let mut outbound = Outbound::new(
        DebounceFilter::new(config.debounce_window_secs),
        echo_rx,
        notifier,
    );

    let watcher_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(event) = watcher.next_event() => {
                    outbound.handle(&event, now_secs()).await;
                }
                _ = shutdown_rx.changed() => break,
            }
        }
    });

    info!("Daemon running. Press Ctrl+C to stop.");
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    if let Err(e) = watcher_task.await {
        error!("Watcher task failed: {}", e);
    }
    match listener_task.await {
        Ok(Err(e)) => error!("Listener failed: {}", e),
        Err(e) => error!("Listener task failed: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
