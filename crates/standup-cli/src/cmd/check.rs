use std::path::Path;

use anyhow::Context;
use chrono::{Local, Utc};
use standup_core::config::{Config, WarnLevel};

use crate::output::{print_json, print_table};

pub fn run(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::read(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let warnings = config.validate();
    let next = match config.phase_timers() {
        Ok(timers) => timers.registry(Utc::now()).pending(),
        Err(_) => Vec::new(),
    };

    if json {
        print_json(&serde_json::json!({
            "warnings": warnings,
            "next": next,
        }))?;
    } else {
        if warnings.is_empty() {
            println!("Config is valid. No warnings.");
        }
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
        if !next.is_empty() {
            println!();
            let rows: Vec<Vec<String>> = next
                .iter()
                .map(|f| {
                    vec![
                        f.phase.to_string(),
                        f.at.to_rfc3339(),
                        f.at.with_timezone(&Local).format("%a %Y-%m-%d %H:%M").to_string(),
                    ]
                })
                .collect();
            print_table(&["PHASE", "NEXT FIRING (UTC)", "LOCAL"], &rows);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
