use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use standup_bot::Notifier;
use standup_core::archive::StatusArchive;
use standup_core::config::Config;
use standup_core::membership::MembershipStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<MembershipStore>,
    pub notifier: Arc<Notifier>,
    pub archive: Arc<Mutex<StatusArchive>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<MembershipStore>,
        notifier: Arc<Notifier>,
        archive: StatusArchive,
    ) -> Self {
        Self {
            config,
            store,
            notifier,
            archive: Arc::new(Mutex::new(archive)),
        }
    }
}

/// Lock the archive for a blocking section.
pub(crate) fn lock_archive(archive: &Mutex<StatusArchive>) -> MutexGuard<'_, StatusArchive> {
    archive.lock().unwrap_or_else(PoisonError::into_inner)
}
