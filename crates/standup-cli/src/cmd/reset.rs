use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use standup_bot::CycleResetter;
use standup_core::config::Config;
use standup_core::membership::MembershipStore;

use crate::output::print_json;

/// Clear every presence marker by hand, as the deadline would.
pub fn run(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("failed to load config")?;
    let store = Arc::new(MembershipStore::at(&config.members_dir));
    let removed = CycleResetter::new(store).reset_cycle()?;

    if json {
        print_json(&serde_json::json!({ "removed": removed }))
    } else {
        println!("Cycle reset: removed {removed} marker(s).");
        Ok(())
    }
}
