use crate::error::{Result, StandupError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_CONFIG_FILE: &str = "conf/custom-config.yaml";
pub const DEFAULT_MEMBERS_DIR: &str = "./members";
pub const DEFAULT_DATABASE_FILE: &str = "stats.db";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Location of the presence marker for `member` inside the store directory.
///
/// The name is validated first so a nickname can never escape `members_dir`.
pub fn marker_path(members_dir: &Path, member: &str) -> Result<PathBuf> {
    validate_member(member)?;
    Ok(members_dir.join(member))
}

// ---------------------------------------------------------------------------
// Member validation
// ---------------------------------------------------------------------------

static NICK_RE: OnceLock<Regex> = OnceLock::new();

fn nick_re() -> &'static Regex {
    NICK_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z\[\]\\`_^{|}][A-Za-z0-9\[\]\\`_^{|}\-]{0,31}$")
            .expect("nick pattern is valid")
    })
}

pub fn is_valid_member(name: &str) -> bool {
    nick_re().is_match(name)
}

pub fn validate_member(name: &str) -> Result<()> {
    if !is_valid_member(name) {
        return Err(StandupError::InvalidMember(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_nicks() {
        for nick in ["alice", "Bob", "dev-ops", "x", "[away]", "a_b", "nick|afk", "r2d2"] {
            validate_member(nick).unwrap_or_else(|_| panic!("expected valid: {nick}"));
        }
    }

    #[test]
    fn invalid_nicks() {
        for nick in [
            "",
            "1abc",
            "-dash",
            "has space",
            "../etc",
            "a/b",
            ".hidden",
            "thisnicknameiswaytoolongforanyircserver",
        ] {
            assert!(validate_member(nick).is_err(), "expected invalid: {nick}");
        }
    }

    #[test]
    fn marker_path_joins_member() {
        let dir = Path::new("/var/lib/standup/members");
        assert_eq!(
            marker_path(dir, "alice").unwrap(),
            PathBuf::from("/var/lib/standup/members/alice")
        );
        assert!(marker_path(dir, "../alice").is_err());
    }
}
