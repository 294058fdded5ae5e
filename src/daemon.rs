//! smartmark host daemon (smartmarkd)
//!
//! Speaks the host protocol on stdin/stdout: one JSON message per line in,
//! replies and outbound requests out. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smartmark::ipc::{self, Dispatcher, Outbound, Reply, Response};
use smartmark::settings::{self, SettingsStore};
use smartmark::tabs::TabId;
use smartmark::watcher::{FileWatcher, WatchTarget};
use smartmark::{BookmarkTree, Config, FolderCache, JsonStore, MemoryTabs, RuleEngine};

#[derive(Parser, Debug)]
#[command(name = "smartmarkd")]
#[command(author, version, about = "smartmark browser host daemon")]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Do not watch the settings and bookmark files for outside edits
    #[arg(long)]
    no_watch: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    // stdout carries protocol frames, so logs go to stderr
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        config.general.log_level.clone()
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("SMARTMARK_LOG").unwrap_or(log_level),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let result = runtime.block_on(run_daemon(config, !cli.no_watch));
    // a pending stdin read holds a blocking thread; do not wait for it
    runtime.shutdown_timeout(Duration::from_millis(500));
    result
}

async fn run_daemon(config: Config, watch: bool) -> Result<()> {
    use tokio::signal;

    smartmark::notifications::init(config.general.notifications_enabled);

    let storage_path = config.storage_path()?;
    let bookmarks_path = config.bookmarks_path()?;
    let store = Arc::new(
        JsonStore::open(&storage_path)
            .with_context(|| format!("Failed to open settings at {}", storage_path.display()))?,
    );
    let tree = Arc::new(
        BookmarkTree::open(&bookmarks_path)
            .with_context(|| format!("Failed to open bookmarks at {}", bookmarks_path.display()))?,
    );
    match settings::load_rules(store.as_ref()).await {
        Ok(rules) => info!("Loaded {} rules from {}", rules.len(), storage_path.display()),
        Err(e) => warn!("Stored rules are unreadable: {}", e),
    }

    let (close_tx, close_rx) = mpsc::unbounded_channel::<TabId>();
    let tabs = Arc::new(MemoryTabs::with_relay(close_tx));
    let engine = Arc::new(
        RuleEngine::new(store.clone(), tree.clone(), tabs.clone(), config.policy)
            .with_retry_delay(config.close_retry_delay()),
    );

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Outbound>();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel::<Reply>();
    let dispatcher = Arc::new(Dispatcher::new(
        engine,
        tabs,
        Arc::new(FolderCache::new()),
        outbound_tx,
    ));

    let writer = tokio::spawn(write_frames(reply_rx, outbound_rx, close_rx));

    tokio::spawn(forward_settings_changes(
        store.subscribe(),
        Arc::clone(&dispatcher),
    ));

    if watch {
        let mut watcher = FileWatcher::new(config.debounce())?;
        watcher.watch_file(&storage_path, WatchTarget::Settings)?;
        watcher.watch_file(&bookmarks_path, WatchTarget::Bookmarks)?;
        tokio::spawn(reload_on_change(
            watcher,
            config.debounce(),
            store.clone(),
            tree.clone(),
            Arc::clone(&dispatcher),
        ));
    }

    info!("Daemon running. Reading messages from stdin.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match ipc::decode(&line) {
                        Ok(envelope) => {
                            debug!("Received {:?}", envelope.message);
                            let dispatcher = Arc::clone(&dispatcher);
                            let reply_tx = reply_tx.clone();
                            in_flight.spawn(async move {
                                let response = dispatcher.dispatch(envelope.message).await;
                                let _ = reply_tx.send(Reply { id: envelope.id, response });
                            });
                        }
                        Err(e) => {
                            warn!("Invalid message: {}", e);
                            let _ = reply_tx.send(Reply {
                                id: None,
                                response: Response::Error {
                                    message: format!("Invalid message: {}", e),
                                },
                            });
                        }
                    }
                }
                Ok(None) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            },
            Some(result) = in_flight.join_next() => {
                if let Err(e) = result {
                    error!("Message handler failed: {}", e);
                }
            }
            _ = signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    info!("Shutting down...");
    while let Some(result) = in_flight.join_next().await {
        if let Err(e) = result {
            error!("Message handler failed: {}", e);
        }
    }
    drop(reply_tx);
    if let Err(e) = writer.await? {
        error!("Output failed: {:#}", e);
    }

    Ok(())
}

/// Serialize replies and outbound requests to stdout until the reply
/// channel closes
async fn write_frames(
    mut replies: mpsc::UnboundedReceiver<Reply>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    mut closes: mpsc::UnboundedReceiver<TabId>,
) -> Result<()> {
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            reply = replies.recv() => match reply {
                Some(reply) => write_frame(&mut stdout, &reply).await?,
                None => break,
            },
            Some(message) = outbound.recv() => write_frame(&mut stdout, &message).await?,
            Some(tab_id) = closes.recv() => {
                write_frame(&mut stdout, &Outbound::CloseTab { tab_id }).await?
            }
        }
    }

    Ok(())
}

async fn write_frame<T: Serialize>(stdout: &mut tokio::io::Stdout, frame: &T) -> Result<()> {
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');
    stdout
        .write_all(line.as_bytes())
        .await
        .context("Failed to write to stdout")?;
    stdout.flush().await?;
    Ok(())
}

async fn forward_settings_changes(
    mut changes: broadcast::Receiver<settings::StorageChange>,
    dispatcher: Arc<Dispatcher>,
) {
    loop {
        match changes.recv().await {
            Ok(change) => dispatcher.settings_changed(change),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Missed {} settings changes", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn reload_on_change(
    mut watcher: FileWatcher,
    interval: Duration,
    store: Arc<JsonStore>,
    tree: Arc<BookmarkTree>,
    dispatcher: Arc<Dispatcher>,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        for target in watcher.poll() {
            match target {
                WatchTarget::Settings => match store.reload() {
                    Ok(0) => {}
                    Ok(changed) => info!("Reloaded settings ({} keys changed)", changed),
                    Err(e) => error!("Failed to reload settings: {}", e),
                },
                WatchTarget::Bookmarks => match tree.reload() {
                    Ok(false) => {}
                    Ok(true) => {
                        dispatcher.folders().invalidate();
                        info!("Reloaded bookmarks");
                    }
                    Err(e) => error!("Failed to reload bookmarks: {}", e),
                },
            }
        }
    }
}
