use crate::model::SessionSummary;
use anyhow::{Context, Result};
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

use super::state::UiState;

// Global clipboard manager channel - initialized once on first use
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Save the session and report the path on the status line.
pub fn save_and_show_path(summary: &SessionSummary, state: &mut UiState) {
    match crate::storage::save_run(summary) {
        Ok(path) => {
            state.info = format!("Saved: {}", path.display());
        }
        Err(e) => {
            state.info = format!("Save failed: {e:#}");
        }
    }
}

fn default_export_path(summary: &SessionSummary, ext: &str) -> Result<std::path::PathBuf> {
    let id: String = summary.session_id.chars().take(8).collect();
    let default_name = format!(
        "rbi-session-{}-{id}.{ext}",
        summary.timestamp_utc.replace(':', "-").replace('T', "_"),
    );
    let current_dir = std::env::current_dir().context("get current directory")?;
    Ok(current_dir.join(default_name))
}

/// Export JSON into the current directory.
/// Returns the absolute path of the exported file.
pub fn export_summary_json(summary: &SessionSummary) -> Result<std::path::PathBuf> {
    let path = default_export_path(summary, "json")?;
    crate::storage::export_json(&path, summary)?;
    Ok(path)
}

/// Export an HTML report into the current directory.
pub fn export_summary_html(summary: &SessionSummary) -> Result<std::path::PathBuf> {
    let path = default_export_path(summary, "html")?;
    crate::html::export_html(&path, summary)?;
    Ok(path)
}

/// Initialize the clipboard manager thread if not already initialized.
/// This creates a background thread that processes clipboard operations sequentially,
/// keeping each clipboard instance alive for a sufficient duration.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                if let Ok(mut clipboard) = Clipboard::new() {
                    // Clipboard managers on Linux read lazily from the owning instance.
                    if clipboard.set_text(&text).is_ok() {
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Copy text to clipboard without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}
