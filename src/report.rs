//! Summary rendering for `crm-import run`.
//!
//! Renders an [`ImportSummary`] as a fixed-width table or as JSON. Both go
//! to stdout; progress and logs stay on stderr.

use anyhow::Result;
use std::fmt::Write as _;

use crate::models::{BatchResult, ImportSummary};
use crate::validate::ValidationReport;

/// Render the run summary as a human-readable table.
pub fn render_summary(summary: &ImportSummary) -> String {
    let mut out = String::new();
    let title = if summary.dry_run {
        "CRM Import Summary (dry run)"
    } else {
        "CRM Import Summary"
    };
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", "=".repeat(title.len()));
    let _ = writeln!(out);
    let _ = writeln!(out, "  Run:       {}", summary.run_id);
    let _ = writeln!(
        out,
        "  Started:   {}",
        summary.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "  Duration:  {}", format_duration(summary.duration_seconds));
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "  {:<22} {:>8} {:>8} {:>9} {:>8}",
        "STEP", "CREATED", "FAILED", "EXCLUDED", "SKIPPED"
    );
    let _ = writeln!(out, "  {}", "-".repeat(59));
    for (kind, result) in &summary.objects {
        let excluded = summary.excluded.get(kind).copied().unwrap_or(0);
        let _ = writeln!(
            out,
            "  {:<22} {:>8} {:>8} {:>9} {:>8}",
            kind.plural(),
            result.success_count,
            result.error_count,
            excluded,
            "-"
        );
    }
    for (relationship, result) in &summary.associations {
        let skipped = summary.skipped.get(relationship).copied().unwrap_or(0);
        let _ = writeln!(
            out,
            "  {:<22} {:>8} {:>8} {:>9} {:>8}",
            relationship.key(),
            result.success_count,
            result.error_count,
            "-",
            skipped
        );
    }

    let totals = &summary.totals;
    let _ = writeln!(out);
    let _ = writeln!(out, "  Processed:     {}", totals.processed);
    let _ = writeln!(out, "  Succeeded:     {}", totals.succeeded);
    let _ = writeln!(out, "  Failed:        {}", totals.failed);
    let _ = writeln!(out, "  Success rate:  {:.2}%", totals.success_rate);

    let failures: Vec<(String, &BatchResult)> = summary
        .objects
        .iter()
        .map(|(k, r)| (k.plural().to_string(), r))
        .chain(summary.associations.iter().map(|(k, r)| (k.key(), r)))
        .filter(|(_, r)| !r.errors.is_empty())
        .collect();

    if !failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "  Failed batches:");
        for (label, result) in failures {
            for err in &result.errors {
                let _ = writeln!(
                    out,
                    "    {} batch {} ({} records): {}",
                    label,
                    err.batch_index + 1,
                    err.record_count,
                    err.message
                );
            }
        }
    }

    out
}

/// Pretty-printed JSON form of the summary.
pub fn summary_json(summary: &ImportSummary) -> Result<String> {
    Ok(serde_json::to_string_pretty(summary)?)
}

/// Render a validation report, one block per entity kind.
pub fn render_validation(report: &ValidationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Validation");
    let _ = writeln!(out, "==========");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "  {:<10} {:>6} {:>8} {:>13} {:>11} {:>9}",
        "KIND", "ROWS", "COLUMNS", "COMPLETENESS", "EMPTY ROWS", "EXCLUDED"
    );
    let _ = writeln!(out, "  {}", "-".repeat(62));
    for kind in &report.kinds {
        let q = &kind.quality;
        let _ = writeln!(
            out,
            "  {:<10} {:>6} {:>8} {:>12.1}% {:>11} {:>9}",
            kind.kind.plural(),
            q.rows,
            q.columns,
            q.completeness,
            q.empty_rows,
            kind.excluded_rows
        );
    }

    for kind in &report.kinds {
        if !kind.missing_columns.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "  ERROR {}: missing required columns: {}",
                kind.kind.plural(),
                kind.missing_columns.join(", ")
            );
        }
        for dup in &kind.duplicates {
            let rows: Vec<String> = dup.rows.iter().map(|r| (r + 1).to_string()).collect();
            let _ = writeln!(
                out,
                "  WARN  {} '{}' appears on rows {}",
                kind.kind.plural(),
                dup.key,
                rows.join(", ")
            );
        }
        for bad in &kind.invalid_emails {
            let _ = writeln!(
                out,
                "  WARN  {} row {}: invalid email '{}'",
                kind.kind.plural(),
                bad.row + 1,
                bad.email
            );
        }
        for bad in &kind.invalid_phones {
            let _ = writeln!(
                out,
                "  WARN  {} row {}: invalid phone '{}'",
                kind.kind.plural(),
                bad.row + 1,
                bad.phone
            );
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "  Result: {}",
        if report.is_valid() { "OK" } else { "FAILED" }
    );
    out
}

fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let mins = (secs / 60.0).floor();
        format!("{}m {:.0}s", mins, secs - mins * 60.0)
    }
}
