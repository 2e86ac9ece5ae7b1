//! Session history on disk.
//!
//! Each finished session is one pretty-printed JSON file under
//! `<data dir>/rbi-cli/runs/`. File names start with the RFC 3339 timestamp so a
//! reverse lexical sort lists the newest first.

use crate::model::SessionSummary;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub fn base_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("no data directory available")?;
    Ok(base.join("rbi-cli"))
}

pub fn runs_dir() -> Result<PathBuf> {
    Ok(base_dir()?.join("runs"))
}

fn file_name(summary: &SessionSummary) -> String {
    let ts = summary.timestamp_utc.replace(':', "-");
    let id: String = summary
        .session_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(16)
        .collect();
    format!("run-{ts}-{id}.json")
}

pub fn run_path_in(dir: &Path, summary: &SessionSummary) -> PathBuf {
    dir.join(file_name(summary))
}

pub fn save_run_in(dir: &Path, summary: &SessionSummary) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = run_path_in(dir, summary);
    export_json(&path, summary)?;
    Ok(path)
}

/// Persist a finished session to the history directory.
pub fn save_run(summary: &SessionSummary) -> Result<PathBuf> {
    save_run_in(&runs_dir()?, summary)
}

pub fn load_recent_in(dir: &Path, limit: usize) -> Result<Vec<SessionSummary>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();
    paths.reverse();

    let mut out = Vec::new();
    for path in paths {
        if out.len() >= limit {
            break;
        }
        // Skip files that do not parse rather than failing the whole history view.
        let Ok(text) = std::fs::read_to_string(&path) else {
            continue;
        };
        match serde_json::from_str::<SessionSummary>(&text) {
            Ok(summary) => out.push(summary),
            Err(e) => tracing::debug!(path = %path.display(), error = %e, "skipping history file"),
        }
    }
    Ok(out)
}

/// Newest-first list of saved sessions, at most `limit` long.
pub fn load_recent(limit: usize) -> Result<Vec<SessionSummary>> {
    load_recent_in(&runs_dir()?, limit)
}

pub fn delete_run_in(dir: &Path, summary: &SessionSummary) -> Result<()> {
    let path = run_path_in(dir, summary);
    std::fs::remove_file(&path).with_context(|| format!("delete {}", path.display()))
}

pub fn delete_run(summary: &SessionSummary) -> Result<()> {
    delete_run_in(&runs_dir()?, summary)
}

pub fn export_json(path: &Path, summary: &SessionSummary) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))
}
