use anyhow::Result;
use chrono::{DateTime, Utc};
use comfy_table::{Cell, Table};
use serde_json::json;

use taskloom_storage::{ExecutionClaim, ProcessedExecutionTracker};

use crate::output::OutputFormat;

pub fn stats(
    tracker: &ProcessedExecutionTracker,
    store: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let count = tracker.count_for(store)?;
    let value = json!({ "store_id": store, "processed_executions": count });

    format.emit(&value, || {
        match store {
            Some(store) => println!("Processed executions for {}: {}", store, count),
            None => println!("Processed executions: {}", count),
        }
        Ok(())
    })
}

pub fn claims(
    tracker: &ProcessedExecutionTracker,
    store: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let claims = tracker.list(store)?;

    format.emit(&claims, || {
        if claims.is_empty() {
            println!("No processed executions found.");
        } else {
            println!("{}", claims_table(&claims));
        }
        Ok(())
    })
}

pub fn cleanup(
    tracker: &ProcessedExecutionTracker,
    max_age_days: u32,
    format: OutputFormat,
) -> Result<()> {
    let removed = tracker.cleanup(max_age_days)?;
    let value = json!({ "max_age_days": max_age_days, "removed": removed });

    format.emit(&value, || {
        println!(
            "Removed {} claim(s) older than {} day(s)",
            removed, max_age_days
        );
        Ok(())
    })
}

fn claims_table(claims: &[ExecutionClaim]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Store", "Task", "Due", "Processed"]);
    for claim in claims {
        table.add_row(vec![
            Cell::new(&claim.store_id),
            Cell::new(&claim.task_id),
            Cell::new(format_ms(claim.due_at_ms)),
            Cell::new(format_ms(claim.processed_at_ms)),
        ]);
    }
    table
}

fn format_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}
