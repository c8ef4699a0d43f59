use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use irc::client::prelude::{Client, Command, Config as ClientConfig, Sender};
use standup_core::config::IrcConfig;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::BotError;
use crate::notify::{DeliveryKind, Transport};

/// Length of the flood-protection window, in seconds.
const BURST_WINDOW_SECS: u32 = 8;
/// How long `disconnect` waits for the server to acknowledge QUIT.
const QUIT_GRACE: Duration = Duration::from_secs(5);

// ─── IrcTransport ─────────────────────────────────────────────────────────

/// A supervised IRC connection.
///
/// A background task connects, identifies, joins the configured channels and
/// keeps polling the client stream (outgoing messages are only flushed while
/// it is polled). When the connection drops it logs the error and reconnects
/// after `reconnect_delay_secs`. Until a session is up, every delivery fails
/// with "not connected".
pub struct IrcTransport {
    sender: Arc<RwLock<Option<Sender>>>,
    stop: watch::Sender<bool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

enum SessionEnd {
    Quit,
    Closed,
}

impl IrcTransport {
    /// Start the connection supervisor. Returns immediately.
    pub fn connect(config: &IrcConfig) -> Self {
        let sender = Arc::new(RwLock::new(None));
        let (stop, stop_rx) = watch::channel(false);
        let client_config = client_config(config);
        let delay = Duration::from_secs(config.reconnect_delay_secs);

        let driver = tokio::spawn(supervise(
            client_config,
            delay,
            Arc::clone(&sender),
            stop_rx,
        ));

        Self {
            sender,
            stop,
            driver: Mutex::new(Some(driver)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.current_sender().is_some()
    }

    /// Send QUIT and wait (bounded) for the connection task to finish.
    pub async fn disconnect(&self) {
        let _ = self.stop.send(true);
        if let Some(sender) = self.current_sender() {
            let quit = Command::QUIT(Some("standup bot shutting down".to_string()));
            if let Err(e) = sender.send(quit) {
                debug!(error = %e, "QUIT not sent");
            }
        }

        let Some(mut driver) = self.driver.lock().await.take() else {
            return;
        };
        if tokio::time::timeout(QUIT_GRACE, &mut driver).await.is_err() {
            warn!("IRC connection did not close in time; aborting");
            driver.abort();
        }
        set_sender(&self.sender, None);
    }

    fn current_sender(&self) -> Option<Sender> {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for IrcTransport {
    async fn deliver(
        &self,
        kind: DeliveryKind,
        target: &str,
        message: &str,
    ) -> Result<(), BotError> {
        let sender = self
            .current_sender()
            .ok_or_else(|| BotError::send_failure(target, "not connected"))?;

        for line in message.lines().filter(|l| !l.trim().is_empty()) {
            let command = match kind {
                DeliveryKind::Remind => Command::NOTICE(target.to_string(), line.to_string()),
                DeliveryKind::Publish | DeliveryKind::Direct => {
                    Command::PRIVMSG(target.to_string(), line.to_string())
                }
            };
            sender
                .send(command)
                .map_err(|e| BotError::send_failure(target, e.to_string()))?;
        }
        Ok(())
    }
}

// ─── Connection supervisor ────────────────────────────────────────────────

async fn supervise(
    config: ClientConfig,
    delay: Duration,
    slot: Arc<RwLock<Option<Sender>>>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow() {
            break;
        }
        let server = config.server.clone().unwrap_or_default();
        match session(config.clone(), &slot, &mut stop).await {
            Ok(SessionEnd::Quit) => {
                info!(%server, "disconnected from IRC");
                break;
            }
            Ok(SessionEnd::Closed) => warn!(%server, "IRC connection closed"),
            Err(e) => error!(%server, error = %e, "IRC connection failed"),
        }
        set_sender(&slot, None);

        if *stop.borrow() {
            break;
        }
        info!(delay_secs = delay.as_secs(), "reconnecting to IRC");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop.changed() => break,
        }
    }
    set_sender(&slot, None);
}

async fn session(
    config: ClientConfig,
    slot: &RwLock<Option<Sender>>,
    stop: &mut watch::Receiver<bool>,
) -> Result<SessionEnd, BotError> {
    let mut client = Client::from_config(config).await.map_err(connection)?;
    client.identify().map_err(connection)?;
    let mut stream = client.stream().map_err(connection)?;
    set_sender(slot, Some(client.sender()));
    info!(nick = %client.current_nickname(), "connected to IRC");

    let mut quitting = false;
    loop {
        tokio::select! {
            next = stream.next() => match next {
                Some(Ok(message)) => debug!(message = %message.to_string().trim_end(), "irc <-"),
                Some(Err(e)) if quitting => {
                    debug!(error = %e, "error while quitting");
                    return Ok(SessionEnd::Quit);
                }
                Some(Err(e)) => return Err(connection(e)),
                None if quitting => return Ok(SessionEnd::Quit),
                None => return Ok(SessionEnd::Closed),
            },
            _ = stop.changed(), if !quitting => {
                // keep polling so the QUIT is flushed and the server closes us
                quitting = true;
            }
        }
    }
}

fn set_sender(slot: &RwLock<Option<Sender>>, sender: Option<Sender>) {
    *slot.write().unwrap_or_else(PoisonError::into_inner) = sender;
}

fn connection(e: irc::error::Error) -> BotError {
    BotError::Connection(e.to_string())
}

/// Map our connection settings onto the IRC client's.
pub fn client_config(config: &IrcConfig) -> ClientConfig {
    let channel_keys: HashMap<String, String> = config
        .channels
        .definitions
        .iter()
        .filter_map(|d| d.password.clone().map(|key| (d.name.clone(), key)))
        .collect();

    ClientConfig {
        nickname: Some(config.nick.clone()),
        username: Some(config.user_name().to_string()),
        realname: Some(config.real_name().to_string()),
        server: Some(config.server.clone()),
        port: Some(config.port),
        use_tls: Some(config.ssl),
        dangerously_accept_invalid_certs: Some(config.accept_invalid_certs),
        channels: config
            .channels
            .definitions
            .iter()
            .map(|d| d.name.clone())
            .collect(),
        channel_keys,
        max_messages_in_burst: Some(config.flood_burst),
        burst_window_length: Some(BURST_WINDOW_SECS),
        ..ClientConfig::default()
    }
}
