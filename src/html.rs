//! Standalone HTML report for a finished session.

use crate::model::{ArtifactKind, JobResult, ResultOutcome, SessionSummary};
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::Path;

/// Escape text for use in element content and quoted attributes.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn download_href(base_url: &str, kind: ArtifactKind, filename: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), kind.link_path(filename))
}

fn render_result(out: &mut String, base_url: &str, r: &JobResult) {
    match r.outcome() {
        ResultOutcome::Success {
            strategy,
            backtest,
            strategy_file,
            backtest_file,
        } => {
            let _ = writeln!(out, r#"<div class="result success">"#);
            let _ = writeln!(out, "<h3>Strategy {}</h3>", r.strategy_number);
            if let Some(link) = r.link.as_deref() {
                let _ = writeln!(out, r#"<p class="source">{}</p>"#, escape(link));
            }
            let _ = writeln!(out, "<h4>Strategy</h4>\n<pre>{}</pre>", escape(strategy));
            let _ = writeln!(out, "<h4>Backtest</h4>\n<pre>{}</pre>", escape(backtest));
            let _ = writeln!(out, r#"<p class="downloads">"#);
            for (kind, file, label) in [
                (ArtifactKind::Strategy, strategy_file, "Download strategy"),
                (ArtifactKind::Backtest, backtest_file, "Download backtest"),
            ] {
                if let Some(file) = file {
                    let _ = writeln!(
                        out,
                        r#"<a href="{}" download>{label}</a>"#,
                        escape(&download_href(base_url, kind, file))
                    );
                }
            }
            let _ = writeln!(out, "</p>\n</div>");
        }
        ResultOutcome::Error { message } => {
            let _ = writeln!(out, r#"<div class="result error">"#);
            let _ = writeln!(out, "<h3>Strategy {}</h3>", r.strategy_number);
            let _ = writeln!(out, "<p>Error: {}</p>", escape(message));
            let _ = writeln!(out, "</div>");
        }
    }
}

pub fn render_report(summary: &SessionSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "<!DOCTYPE html>\n<html lang=\"en\">\n<head>");
    let _ = writeln!(out, "<meta charset=\"utf-8\">");
    let _ = writeln!(
        out,
        "<title>RBI session {}</title>",
        escape(&summary.session_id)
    );
    let _ = writeln!(out, "<style>{REPORT_CSS}</style>\n</head>\n<body>");
    let _ = writeln!(out, "<h1>RBI results</h1>");
    let _ = writeln!(
        out,
        r#"<p class="meta">{} &middot; {} &middot; {}</p>"#,
        escape(&summary.timestamp_utc),
        escape(&summary.base_url),
        summary.state.label()
    );

    if let Some(err) = summary.error.as_deref() {
        let _ = writeln!(out, r#"<div class="result error"><p>{}</p></div>"#, escape(err));
    }
    for r in &summary.results {
        render_result(&mut out, &summary.base_url, r);
    }

    let _ = writeln!(out, "</body>\n</html>");
    out
}

pub fn export_html(path: &Path, summary: &SessionSummary) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::write(path, render_report(summary))
        .with_context(|| format!("write {}", path.display()))
}

const REPORT_CSS: &str = "body{font-family:sans-serif;max-width:60rem;margin:2rem auto}\
.result{border:1px solid #ccc;border-radius:4px;padding:0 1rem;margin:1rem 0}\
.success{border-left:4px solid #2a2}.error{border-left:4px solid #c22}\
pre{background:#f6f6f6;padding:.5rem;overflow-x:auto}.meta{color:#666}";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResultStatus, SessionState};

    fn summary(results: Vec<JobResult>, error: Option<&str>) -> SessionSummary {
        SessionSummary {
            timestamp_utc: "2026-01-01T00:00:00Z".into(),
            base_url: "http://localhost:8000/".into(),
            session_id: "abc".into(),
            links: "http://a.com".into(),
            link_count: 1,
            state: SessionState::Done,
            results,
            error: error.map(str::to_string),
            polls_issued: 1,
            polls_applied: 1,
            polls_discarded: 0,
            retries: 0,
            elapsed_ms: 10,
        }
    }

    #[test]
    fn escapes_all_five_characters() {
        assert_eq!(
            escape(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn report_escapes_server_text_and_links_downloads() {
        let r = JobResult {
            strategy_number: 1,
            status: ResultStatus::Success,
            link: Some("http://a.com".into()),
            strategy: Some("if x < 1 && y > 2: pass".into()),
            backtest: Some("print('ok')".into()),
            strategy_file: Some("s1.py".into()),
            backtest_file: Some("b1.py".into()),
            error: None,
            message: None,
        };
        let html = render_report(&summary(vec![r], None));
        assert!(html.contains("if x &lt; 1 &amp;&amp; y &gt; 2: pass"));
        assert!(html.contains("print(&#39;ok&#39;)"));
        assert!(html.contains(r#"href="http://localhost:8000/download/strategy/s1.py""#));
        assert!(html.contains(r#"href="http://localhost:8000/download/backtest/b1.py""#));
        assert!(!html.contains("<script"));
    }

    #[test]
    fn session_error_renders_one_block() {
        let html = render_report(&summary(Vec::new(), Some("<b>down</b>")));
        assert_eq!(html.matches(r#"class="result error""#).count(), 1);
        assert!(html.contains("&lt;b&gt;down&lt;/b&gt;"));
    }
}
