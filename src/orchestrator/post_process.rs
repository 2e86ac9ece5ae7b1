//! Post-session processing utilities.
//!
//! Handles auto-save, exports, and history refresh after a session finishes.

use crate::cli::Cli;
use crate::model::SessionSummary;
use crate::storage;

/// Result of post-session processing, ready for presentation layers.
pub(crate) struct ProcessedSession {
    pub export_messages: Vec<String>,
    pub history: Vec<SessionSummary>,
    pub auto_saved_path: Option<std::path::PathBuf>,
}

/// Process a finished session: auto-save, export, and reload history.
pub(crate) fn process_session_completion(
    args: &Cli,
    history_load: usize,
    auto_save: bool,
    summary: &SessionSummary,
) -> ProcessedSession {
    let auto_saved_path = if auto_save {
        match storage::save_run(summary) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(error = %e, "auto-save failed");
                None
            }
        }
    } else {
        None
    };

    let mut export_messages = Vec::new();
    if let Some(export_path) = args.export_json.as_deref() {
        match storage::export_json(export_path, summary) {
            Ok(_) => export_messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }
    if let Some(export_path) = args.export_html.as_deref() {
        match crate::html::export_html(export_path, summary) {
            Ok(_) => export_messages.push(format!("Exported HTML: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export HTML failed: {e:#}")),
        }
    }

    let history = storage::load_recent(history_load).unwrap_or_default();

    ProcessedSession {
        export_messages,
        history,
        auto_saved_path,
    }
}
