//! Rendering of finished runs for the terminal and for JSON export.

use serde::Serialize;
use std::fmt::Write;

use crate::core::{Outcome, ReportEntry, RunSummary};

#[derive(Serialize)]
struct JsonReport<'a> {
    run_id: String,
    container: Option<&'a str>,
    total: usize,
    succeeded: usize,
    failed: usize,
    timed_out: usize,
    skipped: usize,
    entries: &'a [ReportEntry],
}

/// Plain-text table, one line per item in completion order, then totals.
pub fn render_text(summary: &RunSummary) -> String {
    let report = &summary.report;
    let mut out = String::new();

    let Some(container) = &summary.container else {
        out.push_str("No matching source objects found.\n");
        return out;
    };

    let _ = writeln!(out, "Destination folder: {}", container.path());
    for entry in &report.entries {
        let _ = writeln!(
            out,
            "  {:<10} {} (polls: {})",
            status_label(entry),
            entry.source_key,
            entry.polls
        );
        if let Outcome::Failure { reason } = &entry.outcome {
            let _ = writeln!(out, "             {}", reason);
        }
    }
    let _ = writeln!(
        out,
        "{} total, {} succeeded, {} failed, {} timed out, {} skipped",
        report.len(),
        report.succeeded(),
        report.failed(),
        report.timed_out(),
        report.skipped()
    );
    out
}

pub fn render_json(summary: &RunSummary) -> serde_json::Result<String> {
    let report = &summary.report;
    serde_json::to_string_pretty(&JsonReport {
        run_id: summary.run_id.to_string(),
        container: summary.container.as_ref().map(|c| c.path()),
        total: report.len(),
        succeeded: report.succeeded(),
        failed: report.failed(),
        timed_out: report.timed_out(),
        skipped: report.skipped(),
        entries: &report.entries,
    })
}

fn status_label(entry: &ReportEntry) -> &'static str {
    match entry.outcome {
        Outcome::Success => "OK",
        Outcome::Failure { .. } => "FAILED",
        Outcome::Timeout => "TIMEOUT",
        Outcome::Skipped => "SKIPPED",
    }
}
