//! Manual command - submit trays to fixtures from the terminal.
//!
//! Each submission queues a single-shot job on the fixture's worker. Jobs
//! on the same fixture run one after another; logs go to the log file so
//! the prompts stay readable.

use std::path::Path;

use console::style;
use dialoguer::{theme::ColorfulTheme, Input};

use formation_tower::service::TowerService;

use super::common::RunningTower;
use crate::error::CliError;

/// Run the manual command.
pub async fn run(config_path: &Path, mock: bool, simulate: bool) -> Result<(), CliError> {
    let tower = RunningTower::start(config_path, simulate, false).await?;

    println!();
    println!("{}", style("Formation Tower - manual jobs").cyan().bold());
    println!("Logging to {}", style(tower.log_path().display()).cyan());
    if mock {
        println!("{}", style("Cell API mocked, results will not be reported").yellow());
    }
    println!("Enter a tray barcode, then a fixture barcode or CC-LL id.");
    println!(
        "Type {} for fixture status, {} to quit.",
        style("s").bold(),
        style("q").bold()
    );
    println!();

    let result = prompt_loop(&tower.service, mock).await;

    println!("Stopping, unfinished jobs are cancelled");
    tower.shutdown().await;
    result
}

async fn prompt_loop(service: &TowerService, mock: bool) -> Result<(), CliError> {
    loop {
        let tray = prompt("Tray").await?;
        match tray.as_str() {
            "q" | "quit" => return Ok(()),
            "s" | "status" => {
                print_status(service);
                continue;
            }
            _ => {}
        }

        let fixture = prompt("Fixture").await?;
        match service.submit_manual(&tray, &fixture, mock).await {
            Ok(id) => println!("  {} {} queued on fixture {}", style("✓").green(), tray, id),
            Err(e) => println!("  {} {}", style("✗").red(), e),
        }
    }
}

/// Prompt on a blocking thread so running jobs keep their workers.
async fn prompt(label: &'static str) -> Result<String, CliError> {
    let answer = tokio::task::spawn_blocking(move || {
        Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(label)
            .interact_text()
    })
    .await
    .map_err(|e| CliError::Prompt(e.to_string()))?
    .map_err(|e| CliError::Prompt(e.to_string()))?;
    Ok(answer.trim().to_string())
}

fn print_status(service: &TowerService) {
    let registry = service.registry();
    println!();
    for (id, status) in registry.availability() {
        let last = registry
            .get(&id)
            .and_then(|entry| entry.last_report())
            .map(|r| {
                let outcome = if r.fixture_fault {
                    style("fixture fault").red()
                } else {
                    style("ok").green()
                };
                format!(
                    "last {} {} passed/{} failed ({})",
                    r.tray, r.passed, r.failed, outcome
                )
            })
            .unwrap_or_default();
        println!("  {:<6} {:<24} {}", id.to_string(), status.as_str(), last);
    }
    println!();
}
