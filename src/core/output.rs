//! Terminal rendering for validation results.
//!
//! Output stays one line per diagnostic; long messages are collapsed and
//! bounded so a noisy file cannot flood the terminal.

use crate::core::audit::{AuditReport, OverrideState};
use crate::core::constraint::Severity;
use crate::core::engine::RunSummary;
use crate::core::violation::{FileResult, FileStatus, Suggestion, Violation};
use colored::Colorize;

pub const MESSAGE_WIDTH: usize = 160;

/// Collapse newlines/extra whitespace and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Joins up to `max_items` entries, noting how many were left out.
pub fn preview_list(items: &[String], max_items: usize) -> String {
    let shown = items.iter().take(max_items).cloned().collect::<Vec<_>>().join(", ");
    if items.len() > max_items {
        format!("{} (+{} more)", shown, items.len() - max_items)
    } else {
        shown
    }
}

fn status_badge(status: FileStatus) -> String {
    match status {
        FileStatus::Pass => "PASS".bright_green().bold().to_string(),
        FileStatus::Warn => "WARN".bright_yellow().bold().to_string(),
        FileStatus::Fail => "FAIL".bright_red().bold().to_string(),
    }
}

pub fn render_violation(v: &Violation) -> String {
    let code = match v.severity {
        Severity::Error => v.code.bright_red().bold(),
        Severity::Warning => v.code.bright_yellow().bold(),
    };
    let location = match (v.line, v.column) {
        (Some(l), Some(c)) => format!("{}:{} ", l, c),
        (Some(l), None) => format!("{} ", l),
        _ => String::new(),
    };
    let mut out = format!(
        "    {} {}{}",
        code,
        location.dimmed(),
        compact_line(&v.message, MESSAGE_WIDTH)
    );
    if !v.fix_hint.is_empty() {
        out.push_str(&format!(
            "\n      {} {}",
            "fix:".bright_cyan(),
            compact_line(&v.fix_hint, MESSAGE_WIDTH)
        ));
    }
    if let Some(candidate) = &v.did_you_mean {
        out.push_str(&format!("\n      {} {}", "did you mean:".bright_cyan(), candidate.bold()));
    }
    if let Some(suggestion) = &v.suggestion {
        out.push_str(&format!("\n      {} {}", "suggest:".bright_cyan(), describe_suggestion(suggestion)));
    }
    out
}

fn describe_suggestion(suggestion: &Suggestion) -> String {
    match suggestion {
        Suggestion::ReplaceImport { from, to } => format!("replace import '{}' with '{}'", from, to),
        Suggestion::RemoveImport { module } => format!("remove import '{}'", module),
        Suggestion::AddImport { module } => format!("add import '{}'", module),
        Suggestion::AddDecorator { name } => format!("add {}", name),
        Suggestion::RenameFile { pattern } => format!("rename to match /{}/", pattern),
        Suggestion::CreateFile { path } => format!("create {}", path),
    }
}

/// Header line plus one block per violation and warning.
pub fn render_file(result: &FileResult, verbose: bool) -> String {
    let arch = result.arch_id.as_deref().unwrap_or("-");
    let mut header = format!(
        "{} {} {}",
        status_badge(result.status),
        result.path.bright_white(),
        format!("[{}]", arch).dimmed()
    );
    if result.overrides_count > 0 {
        header.push_str(&format!(" ({} overridden)", result.overrides_count).dimmed().to_string());
    }
    if result.from_cache && verbose {
        header.push_str(&" (cached)".dimmed().to_string());
    }
    let mut lines = vec![header];
    lines.extend(result.violations.iter().map(render_violation));
    lines.extend(result.warnings.iter().map(render_violation));
    lines.join("\n")
}

pub fn render_summary(summary: &RunSummary) -> String {
    let outcome = if summary.failed > 0 {
        "✗".bright_red().bold()
    } else {
        "✓".bright_green().bold()
    };
    format!(
        "{} {} files: {} passed, {} warned, {} failed ({} errors, {} warnings, {} overridden, {} cached) in {}ms",
        outcome,
        summary.files,
        summary.passed.to_string().bright_green(),
        summary.warned.to_string().bright_yellow(),
        summary.failed.to_string().bright_red(),
        summary.errors,
        summary.warnings,
        summary.overridden,
        summary.cached,
        summary.duration_ms
    )
}

fn state_label(state: OverrideState) -> &'static str {
    match state {
        OverrideState::Active => "active",
        OverrideState::ExpiringSoon => "expiring soon",
        OverrideState::Expired => "expired",
        OverrideState::NoExpiry => "no expiry",
        OverrideState::Invalid => "invalid",
    }
}

pub fn render_audit(report: &AuditReport) -> String {
    let t = &report.totals;
    let mut lines = vec![format!(
        "{} {} overrides: {} active, {} expiring soon, {} expired, {} without expiry, {} invalid",
        "▸".bright_cyan(),
        t.total,
        t.active.to_string().bright_green(),
        t.expiring_soon.to_string().bright_yellow(),
        t.expired.to_string().bright_red(),
        t.missing_expiry,
        t.invalid
    )];
    for entry in &report.entries {
        lines.push(format!(
            "    {}:{} {} {}",
            entry.path,
            entry.line,
            entry.key.bold(),
            format!("[{}]", state_label(entry.state)).dimmed()
        ));
    }
    for cluster in &report.clusters {
        lines.push(format!(
            "  {} {} in {} files ({}), consider @intent:{}",
            "cluster".bright_magenta(),
            cluster.key.bold(),
            cluster.files.len(),
            preview_list(&cluster.files, 3),
            cluster.suggested_intent.bright_cyan()
        ));
    }
    lines.join("\n")
}
