//! Engine commands - `run`, `once` and `recover`

use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, check, cross};
use anstream::println;
use refinery::engine::ItemOutcome;
use refinery::error::{Error, Result};
use refinery::types::ProcessResult;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run the merge queue until interrupted
pub async fn run_engine(path: &Path) -> Result<()> {
    let ctx = CommandContext::new(path)?;
    let engine = ctx.engine()?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing current cycle");
            on_signal.cancel();
        }
    });

    engine.run(cancel).await
}

/// Run a single cycle and report what happened
pub async fn run_once(path: &Path) -> Result<()> {
    let ctx = CommandContext::new(path)?;
    if !ctx.config.enabled {
        return Err(Error::Disabled);
    }
    let engine = ctx.engine()?;

    let outcomes = engine.process_once().await?;
    if outcomes.is_empty() {
        println!("{}", "No ready merge requests.".muted());
        return Ok(());
    }
    for outcome in &outcomes {
        print_outcome(outcome);
    }
    Ok(())
}

/// Reopen items stranded `in_progress` by an interrupted run
pub async fn run_recover(path: &Path) -> Result<()> {
    let ctx = CommandContext::new(path)?;
    let engine = ctx.engine()?;

    let reopened = engine.recover().await?;
    if reopened.is_empty() {
        println!("{}", "No stranded claims.".muted());
    } else {
        for id in &reopened {
            println!("{} reopened {}", check(), id.accent());
        }
    }
    Ok(())
}

fn print_outcome(outcome: &ItemOutcome) {
    match &outcome.result {
        ProcessResult::Merged { merge_commit } => println!(
            "{} {} merged {}",
            check(),
            outcome.id.accent(),
            merge_commit.muted()
        ),
        ProcessResult::Conflict { files, .. } => {
            println!("{} {} {}", cross(), outcome.id.accent(), "conflict".warn());
            for file in files {
                println!("    {}", file.muted());
            }
        }
        ProcessResult::TestsFailed { attempts, .. } => println!(
            "{} {} {}",
            cross(),
            outcome.id.accent(),
            format!("tests failed ({attempts} attempt(s))").warn()
        ),
        ProcessResult::Failed { stage, error } => println!(
            "{} {} {} {}",
            cross(),
            outcome.id.accent(),
            format!("{stage} failed:").warn(),
            error.muted()
        ),
    }
}
