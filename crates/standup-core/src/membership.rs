//! Presence markers for the current cycle.
//!
//! A member has submitted iff a file named after them exists in the store
//! directory. The file holds the rendered standup so it can be read back, but
//! only its existence drives missing-member detection.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::error::{Result, StandupError};
use crate::paths;

/// Directory-backed set of presence markers.
///
/// All access goes through one coarse lock: submissions and resets are
/// exclusive, so a reader never observes a half-cleared directory and a read
/// issued after a write always sees it.
#[derive(Debug)]
pub struct MembershipStore {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl MembershipStore {
    /// Open the store at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        crate::io::ensure_dir(&dir)?;
        Ok(Self::at(dir))
    }

    /// Wrap `dir` without touching the filesystem.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn has_submitted(&self, member: &str) -> Result<bool> {
        let path = paths::marker_path(&self.dir, member)?;
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        self.check_available()?;
        Ok(path.is_file())
    }

    /// Create or overwrite `member`'s marker with `content`.
    pub fn record_submission(&self, member: &str, content: &str) -> Result<()> {
        let path = paths::marker_path(&self.dir, member)?;
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        self.check_available()?;
        crate::io::atomic_write(&path, content.as_bytes())
    }

    /// Content recorded for `member` this cycle, if any.
    pub fn submission(&self, member: &str) -> Result<Option<String>> {
        let path = paths::marker_path(&self.dir, member)?;
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        self.check_available()?;
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.unavailable(e)),
        }
    }

    /// Every member holding a marker. Stray files (editor swap files, half
    /// written temp files) are not nicknames and are ignored.
    pub fn submitted(&self) -> Result<BTreeSet<String>> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        self.list_markers()
    }

    /// Configured members without a marker, in configured order.
    pub fn missing_members(&self, all: &[String]) -> Result<Vec<String>> {
        let submitted = self.submitted()?;
        Ok(all
            .iter()
            .filter(|m| !submitted.contains(m.as_str()))
            .cloned()
            .collect())
    }

    /// Remove every marker. Returns how many were removed.
    pub fn reset_all(&self) -> Result<usize> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let entries = std::fs::read_dir(&self.dir).map_err(|source| StandupError::ResetFailure {
            path: self.dir.clone(),
            removed: 0,
            source,
        })?;

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|source| StandupError::ResetFailure {
                path: self.dir.clone(),
                removed,
                source,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            std::fs::remove_file(&path).map_err(|source| StandupError::ResetFailure {
                path: path.clone(),
                removed,
                source,
            })?;
            removed += 1;
        }
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Internal (callers hold the lock)
    // -----------------------------------------------------------------------

    fn list_markers(&self) -> Result<BTreeSet<String>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| self.unavailable(e))?;
        let mut names = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.unavailable(e))?;
            if !entry.path().is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if paths::is_valid_member(name) {
                    names.insert(name.to_string());
                }
            }
        }
        Ok(names)
    }

    fn check_available(&self) -> Result<()> {
        if self.dir.is_dir() {
            return Ok(());
        }
        Err(self.unavailable(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "membership directory is missing or not a directory",
        )))
    }

    fn unavailable(&self, source: std::io::Error) -> StandupError {
        StandupError::StoreUnavailable {
            path: self.dir.clone(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
