use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use standup_bot::{IrcTransport, Notifier, ReminderScheduler, SystemClock};
use standup_core::archive::StatusArchive;
use standup_core::config::{Config, WarnLevel};
use standup_core::membership::MembershipStore;
use standup_server::AppState;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    for w in config.validate() {
        if w.level == WarnLevel::Warning {
            warn!("config: {}", w.message);
        }
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(serve(Arc::new(config)))
}

async fn serve(config: Arc<Config>) -> anyhow::Result<()> {
    let store = Arc::new(
        MembershipStore::open(&config.members_dir)
            .context("failed to open membership directory")?,
    );
    let archive = StatusArchive::open(&config.database)
        .with_context(|| format!("failed to open {}", config.database.display()))?;

    let irc = Arc::new(IrcTransport::connect(&config.irc));
    let notifier = Arc::new(Notifier::new(
        irc.clone(),
        &config.irc.channels,
        &config.reminders,
    ));

    let (shutdown_tx, scheduler_rx) = broadcast::channel(1);
    let scheduler = ReminderScheduler::new(
        &config,
        Arc::clone(&store),
        Arc::clone(&notifier),
        Arc::new(SystemClock),
    )?;
    let scheduler_task = tokio::spawn(scheduler.run(scheduler_rx));

    let addr = (config.server.bind.as_str(), config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}:{}", addr.0, addr.1))?;

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; shutting down");
            let _ = signal_tx.send(());
        }
    });

    let mut server_rx = shutdown_tx.subscribe();
    let state = AppState::new(Arc::clone(&config), store, notifier, archive);
    let served = standup_server::serve_on(state, listener, async move {
        let _ = server_rx.recv().await;
    })
    .await;

    // the server may also stop on its own error; make sure the rest follows
    let _ = shutdown_tx.send(());
    if let Err(e) = scheduler_task.await {
        warn!(error = %e, "scheduler task ended abnormally");
    }
    irc.disconnect().await;
    info!("stopped");
    served
}
