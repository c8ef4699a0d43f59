use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use standup_core::config::{ChannelsConfig, ReminderPolicy};
use tracing::{debug, warn};

use crate::error::BotError;

// ─── Transport ────────────────────────────────────────────────────────────

/// How a message reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    /// Channel message (PRIVMSG).
    Publish,
    /// Channel notice (NOTICE).
    Remind,
    /// Private message to a single nick.
    Direct,
}

/// Something that can put one message in front of one target.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, kind: DeliveryKind, target: &str, message: &str)
        -> Result<(), BotError>;
}

// ─── DeliveryReport ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryFailure {
    pub target: String,
    pub reason: String,
}

/// Outcome of one fan-out. Targets appear in the order they were given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub kind: DeliveryKind,
    pub delivered: Vec<String>,
    pub failed: Vec<DeliveryFailure>,
}

impl DeliveryReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

// ─── Notifier ─────────────────────────────────────────────────────────────

/// Sends a message to every configured target of a kind.
///
/// Each target is attempted independently: sends run concurrently up to
/// `max_concurrent`, each under its own timeout, and a failure on one target
/// never stops the others. Failures are logged and returned in the report,
/// never raised.
pub struct Notifier {
    transport: Arc<dyn Transport>,
    publish: Vec<String>,
    remind: Vec<String>,
    send_timeout: Duration,
    max_concurrent: usize,
}

impl Notifier {
    pub fn new(
        transport: Arc<dyn Transport>,
        channels: &ChannelsConfig,
        policy: &ReminderPolicy,
    ) -> Self {
        Self {
            transport,
            publish: channels.publish.clone(),
            remind: channels.remind.clone(),
            send_timeout: Duration::from_secs(policy.send_timeout_secs),
            max_concurrent: policy.max_concurrent_sends,
        }
    }

    pub fn publish_channels(&self) -> &[String] {
        &self.publish
    }

    pub fn remind_channels(&self) -> &[String] {
        &self.remind
    }

    pub async fn publish(&self, message: &str) -> DeliveryReport {
        self.fan_out(DeliveryKind::Publish, &self.publish, message)
            .await
    }

    pub async fn remind(&self, message: &str) -> DeliveryReport {
        self.fan_out(DeliveryKind::Remind, &self.remind, message)
            .await
    }

    pub async fn direct_message(&self, members: &[String], message: &str) -> DeliveryReport {
        self.fan_out(DeliveryKind::Direct, members, message).await
    }

    pub async fn fan_out(
        &self,
        kind: DeliveryKind,
        targets: &[String],
        message: &str,
    ) -> DeliveryReport {
        let timeout = self.send_timeout;
        let mut outcomes: Vec<(usize, String, Result<(), BotError>)> =
            stream::iter(targets.iter().cloned().enumerate())
                .map(|(position, target)| {
                    let transport = Arc::clone(&self.transport);
                    async move {
                        let sent = tokio::time::timeout(
                            timeout,
                            transport.deliver(kind, &target, message),
                        )
                        .await;
                        let outcome = match sent {
                            Ok(result) => result,
                            Err(_) => Err(BotError::send_failure(
                                &target,
                                format!("timed out after {}s", timeout.as_secs()),
                            )),
                        };
                        (position, target, outcome)
                    }
                })
                .buffer_unordered(self.max_concurrent.max(1))
                .collect()
                .await;
        outcomes.sort_by_key(|(position, _, _)| *position);

        let mut report = DeliveryReport {
            kind,
            delivered: Vec::new(),
            failed: Vec::new(),
        };
        for (_, target, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    debug!(channel = %target, ?kind, "delivered");
                    report.delivered.push(target);
                }
                Err(e) => {
                    warn!(channel = %target, ?kind, error = %e, "delivery failed");
                    report.failed.push(DeliveryFailure {
                        target,
                        reason: e.to_string(),
                    });
                }
            }
        }
        report
    }
}

// ─── Test support ─────────────────────────────────────────────────────────


// ─── Tests ────────────────────────────────────────────────────────────────
