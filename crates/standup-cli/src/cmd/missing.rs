use std::path::Path;

use anyhow::Context;
use standup_core::config::Config;
use standup_core::membership::MembershipStore;

use crate::output::print_json;

pub fn run(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("failed to load config")?;
    let store = MembershipStore::at(&config.members_dir);
    let submitted = store.submitted()?;
    let missing = store.missing_members(&config.members)?;

    if json {
        return print_json(&serde_json::json!({
            "members": config.members,
            "submitted": submitted,
            "missing": missing,
        }));
    }

    if missing.is_empty() {
        println!("Everyone has submitted.");
    } else {
        println!("Missing: {}", missing.join(", "));
    }
    Ok(())
}
