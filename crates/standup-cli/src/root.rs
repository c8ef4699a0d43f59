use std::path::{Path, PathBuf};

use standup_core::paths::DEFAULT_CONFIG_FILE;

/// Resolve the config file.
///
/// Priority:
/// 1. an explicit path (`--config`, `STANDUP_CONFIG`, or the `run` argument)
/// 2. `conf/custom-config.yaml` in `cwd` or the nearest ancestor that has one
/// 3. `conf/custom-config.yaml` under `cwd`, so the error names the expected location
pub fn resolve_config(explicit: Option<&Path>) -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    resolve_from(explicit, &cwd)
}

fn resolve_from(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let mut dir = cwd.to_path_buf();
    loop {
        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            return candidate;
        }
        match dir.parent() {
            Some(p) => dir = p.to_path_buf(),
            None => break,
        }
    }

    cwd.join(DEFAULT_CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_path_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.yaml");
        assert_eq!(resolve_from(Some(&path), dir.path()), path);
    }

    #[test]
    fn finds_config_in_ancestor() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("conf")).unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "config: {}").unwrap();
        let subdir = dir.path().join("src/deep");
        std::fs::create_dir_all(&subdir).unwrap();

        assert_eq!(
            resolve_from(None, &subdir),
            dir.path().join(DEFAULT_CONFIG_FILE)
        );
    }

    #[test]
    fn falls_back_to_cwd_default() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            resolve_from(None, dir.path()),
            dir.path().join(DEFAULT_CONFIG_FILE)
        );
    }
}
