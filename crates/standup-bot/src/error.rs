use standup_core::StandupError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("send to {target} failed: {reason}")]
    ChannelSendFailure { target: String, reason: String },

    #[error("IRC connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Core(#[from] StandupError),
}

impl BotError {
    pub fn send_failure(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ChannelSendFailure {
            target: target.into(),
            reason: reason.into(),
        }
    }
}
