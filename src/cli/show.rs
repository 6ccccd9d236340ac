//! Config command - print the resolved merge queue configuration

use crate::cli::style::Stylize;
use anstream::println;
use refinery::config::MergeQueueConfig;
use refinery::error::Result;
use std::path::Path;

/// Print the configuration the engine would run with
pub fn show_config(path: &Path) -> Result<()> {
    let config = MergeQueueConfig::load(path)?;
    let source = MergeQueueConfig::path(path);

    let origin = if source.exists() {
        format!("from {}", source.display())
    } else {
        "defaults (no config.json)".to_string()
    };

    println!("{}", "Merge queue".emphasis());
    println!("  {}", origin.muted());
    println!();

    let rows = [
        ("enabled", config.enabled.to_string()),
        ("target_branch", config.target_branch.clone()),
        ("integration_branches", config.integration_branches.to_string()),
        ("on_conflict", config.conflict_strategy().to_string()),
        ("run_tests", config.run_tests.to_string()),
        ("test_command", config.test_command.clone()),
        ("delete_merged_branches", config.delete_merged_branches.to_string()),
        ("retry_flaky_tests", config.retry_flaky_tests.to_string()),
        ("poll_interval", format!("{:?}", config.poll_interval)),
        ("max_concurrent", config.worker_slots().to_string()),
    ];
    for (key, value) in rows {
        println!("  {:<24}{}", key, value.accent());
    }
    Ok(())
}
