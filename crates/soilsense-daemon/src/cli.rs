//! Interactive sensor selection

use anyhow::Result;
use soilsense_hub::DeviceSessionManager;
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    #[error("No sensor selected")]
    Empty,
    #[error("'{0}' is not a number")]
    NotANumber(String),
    #[error("{index} is out of range (1-{max})")]
    OutOfRange { index: usize, max: usize },
}

/// Parse `"2"` or `"1, 3,5"` into zero-based indices
///
/// Duplicates are dropped, keeping first-seen order, so one run never
/// processes the same sensor twice.
pub fn parse_selection(input: &str, count: usize) -> Result<Vec<usize>, SelectionError> {
    let mut selected = Vec::new();

    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let index: usize = part
            .parse()
            .map_err(|_| SelectionError::NotANumber(part.to_string()))?;
        if index == 0 || index > count {
            return Err(SelectionError::OutOfRange { index, max: count });
        }
        if !selected.contains(&(index - 1)) {
            selected.push(index - 1);
        }
    }

    if selected.is_empty() {
        return Err(SelectionError::Empty);
    }
    Ok(selected)
}

async fn prompt(count: usize) -> Result<String> {
    print!(
        "Select the moisture sensor(s) you want to connect (1-{}, comma-separated): ",
        count
    );
    std::io::stdout().flush()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    Ok(lines.next_line().await?.unwrap_or_default())
}

/// Let the operator pick sensors, then process them concurrently
///
/// `preset` skips the prompt (e.g. `--sensors 1,3`).
pub async fn run(manager: Arc<DeviceSessionManager>, preset: Option<String>) -> Result<()> {
    let sensors = manager.sensors();
    for (n, sensor) in sensors.iter().enumerate() {
        println!("{}. {}", n + 1, sensor);
    }

    let input = match preset {
        Some(preset) => preset,
        None => prompt(sensors.len()).await?,
    };

    let indices = parse_selection(&input, sensors.len())
        .map_err(|e| anyhow::anyhow!("Invalid selection: {}", e))?;

    let selected: Vec<String> = indices.iter().map(|&i| sensors[i].to_string()).collect();
    println!("Selected: {}", selected.join(", "));
    info!(count = selected.len(), "Processing selected sensors");

    let outcomes = manager.process_many(&selected).await;
    for outcome in &outcomes {
        let mark = if outcome.success { "OK " } else { "ERR" };
        println!("[{}] {}", mark, outcome.message);
    }

    let failed = outcomes.iter().filter(|o| !o.success).count();
    if failed > 0 {
        anyhow::bail!("{} of {} sensors failed", failed, outcomes.len());
    }
    Ok(())
}
