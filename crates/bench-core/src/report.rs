//! Human-readable rendering of a run summary.

use comfy_table::{presets::ASCII_FULL, CellAlignment, Table};

use crate::metrics::{Distribution, Summary};

const RULE_WIDTH: usize = 90;

/// Render the summary printed at the end of a run.
pub fn format_summary(summary: &Summary) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut output = String::new();

    output.push_str(&rule);
    output.push_str("\nPERFORMANCE METRICS SUMMARY\n");
    output.push_str(&rule);
    output.push('\n');
    output.push_str(&format!(
        "Total Duration:           {:.2} seconds\n",
        summary.total_duration_secs
    ));
    output.push_str(&format!(
        "Total Transactions:       {}\n",
        summary.total_transactions
    ));
    output.push_str(&format!(
        "Successful Transactions:  {}\n",
        summary.successful_transactions
    ));
    output.push_str(&format!(
        "Failed Transactions:      {}\n",
        summary.failed_transactions
    ));
    output.push_str(&format!(
        "Transactions per Second:  {:.2} TPS\n",
        summary.tps
    ));
    output.push_str(&rule);
    output.push('\n');

    output.push_str(&stats_table(summary).to_string());
    output.push('\n');

    if !summary.unhandled_errors.is_empty() {
        output.push_str(&format!(
            "\nUnhandled errors ({}):\n",
            summary.unhandled_errors.len()
        ));
        for error in &summary.unhandled_errors {
            output.push_str(&format!("  {error}\n"));
        }
    }

    output.push_str(&rule);
    output.push('\n');
    output
}

fn stats_table(summary: &Summary) -> Table {
    let mut table = Table::new();
    table.load_preset(ASCII_FULL);
    table.set_header(vec![
        "Metric",
        "Client duration (ms)",
        "Server Duration (ms)",
        "CPU Time (ms)",
    ]);

    type Stat = fn(&Distribution) -> f64;
    let rows: [(&str, Stat); 6] = [
        ("Average", |d| d.avg),
        ("Minimum", |d| d.min),
        ("Maximum", |d| d.max),
        ("P50 (Median)", |d| d.p50),
        ("P95", |d| d.p95),
        ("P99", |d| d.p99),
    ];
    for (label, stat) in rows {
        table.add_row(vec![
            label.to_string(),
            format!("{:.2}", stat(&summary.latency)),
            format!("{:.2}", stat(&summary.server_duration)),
            format!("{:.2}", stat(&summary.server_cpu)),
        ]);
    }

    for index in 1..=3 {
        if let Some(column) = table.column_mut(index) {
            column.set_cell_alignment(CellAlignment::Right);
        }
    }
    table
}
