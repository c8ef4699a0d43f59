use std::sync::Arc;

use serde::Serialize;
use standup_core::membership::MembershipStore;
use tracing::{error, info};

use crate::error::BotError;

/// Result of a cycle reset as reported by a deadline firing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResetOutcome {
    Cleared { removed: usize },
    Failed { reason: String },
}

/// Clears every presence marker at the end of a cycle.
#[derive(Debug, Clone)]
pub struct CycleResetter {
    store: Arc<MembershipStore>,
}

impl CycleResetter {
    pub fn new(store: Arc<MembershipStore>) -> Self {
        Self { store }
    }

    pub fn reset_cycle(&self) -> Result<usize, BotError> {
        match self.store.reset_all() {
            Ok(removed) => {
                info!(removed, dir = %self.store.dir().display(), "cycle reset");
                Ok(removed)
            }
            Err(e) => {
                error!(error = %e, "cycle reset failed");
                Err(e.into())
            }
        }
    }

    pub(crate) fn outcome(&self) -> ResetOutcome {
        match self.reset_cycle() {
            Ok(removed) => ResetOutcome::Cleared { removed },
            Err(e) => ResetOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }
}
