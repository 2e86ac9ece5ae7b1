//! Text summary builder for CLI output.
//!
//! Formats the final results board of a session as human-readable lines.

use crate::model::{ArtifactKind, JobResult, ResultOutcome, SessionSummary};

/// Pre-formatted lines for text output.
pub struct TextSummary {
    pub lines: Vec<String>,
}

/// Absolute download URL for an artifact served by `base_url`.
pub fn download_url(base_url: &str, kind: ArtifactKind, filename: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), kind.link_path(filename))
}

/// Lines for one result block. Shared with the TUI results pane.
pub fn result_lines(base_url: &str, r: &JobResult) -> Vec<String> {
    let mut lines = Vec::new();
    match r.outcome() {
        ResultOutcome::Success {
            strategy,
            backtest,
            strategy_file,
            backtest_file,
        } => {
            lines.push(format!("Strategy {}: success", r.strategy_number));
            if let Some(link) = r.link.as_deref() {
                lines.push(format!("  Source: {link}"));
            }
            lines.push("  Strategy:".into());
            lines.extend(strategy.lines().map(|l| format!("    {l}")));
            lines.push("  Backtest:".into());
            lines.extend(backtest.lines().map(|l| format!("    {l}")));
            if let Some(f) = strategy_file {
                lines.push(format!(
                    "  Download strategy: {}",
                    download_url(base_url, ArtifactKind::Strategy, f)
                ));
            }
            if let Some(f) = backtest_file {
                lines.push(format!(
                    "  Download backtest: {}",
                    download_url(base_url, ArtifactKind::Backtest, f)
                ));
            }
        }
        ResultOutcome::Error { message } => {
            lines.push(format!("Strategy {}: error", r.strategy_number));
            if let Some(link) = r.link.as_deref() {
                lines.push(format!("  Source: {link}"));
            }
            lines.push(format!("  Error: {message}"));
        }
    }
    lines
}

pub fn build_text_summary(summary: &SessionSummary) -> TextSummary {
    let mut lines = Vec::new();

    lines.push(format!(
        "Session {} ({}): {} link(s), {}",
        summary.session_id,
        summary.base_url,
        summary.link_count,
        summary.state.label()
    ));

    for r in &summary.results {
        lines.extend(result_lines(&summary.base_url, r));
    }
    if summary.results.is_empty() && summary.error.is_none() {
        lines.push("No results.".into());
    }

    if let Some(err) = summary.error.as_deref() {
        lines.push(format!("Error: {err}"));
    }

    lines.push(format!(
        "Results: {} succeeded, {} failed; polls {} issued / {} applied / {} discarded, {} retries, {:.1}s",
        summary.succeeded(),
        summary.failed(),
        summary.polls_issued,
        summary.polls_applied,
        summary.polls_discarded,
        summary.retries,
        summary.elapsed_ms as f64 / 1000.0
    ));

    TextSummary { lines }
}
