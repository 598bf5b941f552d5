use anyhow::Result;
use comfy_table::{Cell, Table};

use taskloom_ai::resource::{ResourceLimits, ResourceMonitor, ResourceReport};

use crate::output::OutputFormat;

pub fn show(limits: &ResourceLimits, format: OutputFormat) -> Result<()> {
    let report = ResourceMonitor::new(limits.clone()).resource_report();

    format.emit(&report, || {
        println!("{}", report_table(&report));
        if report.under_stress {
            println!("System is under stress");
        }
        Ok(())
    })
}

fn report_table(report: &ResourceReport) -> Table {
    let metrics = &report.metrics;
    let limits = &report.limits;

    let mut table = Table::new();
    table.set_header(vec!["Resource", "Current", "Limit"]);
    table.add_row(vec![
        Cell::new("LLM calls"),
        Cell::new(metrics.active_llm_calls),
        Cell::new(limits.max_concurrent_llm_calls),
    ]);
    table.add_row(vec![
        Cell::new("Queued messages"),
        Cell::new(metrics.queued_messages),
        Cell::new(limits.max_queued_messages),
    ]);
    table.add_row(vec![
        Cell::new("Messages/min"),
        Cell::new(metrics.messages_per_minute),
        Cell::new(limits.max_messages_per_minute),
    ]);
    table.add_row(vec![
        Cell::new("Memory (MB)"),
        Cell::new(format!("{:.1}", metrics.memory_usage_mb)),
        Cell::new(limits.max_memory_mb),
    ]);
    table.add_row(vec![
        Cell::new("CPU (%)"),
        Cell::new(format!("{:.1}", metrics.cpu_usage_percent)),
        Cell::new(format!("{:.1}", limits.max_cpu_percent)),
    ]);
    table.add_row(vec![
        Cell::new("LLM call timeout (ms)"),
        Cell::new("-"),
        Cell::new(limits.llm_call_timeout_ms),
    ]);
    table
}
