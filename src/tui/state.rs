use crate::board::SessionView;
use crate::model::{JobResult, RenderMode, SessionSummary, FUN_MESSAGES};
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};
use std::time::{Duration, Instant};

/// Flavour messages rotate at this pace while a session is busy.
pub const FUN_MESSAGE_PERIOD: Duration = Duration::from_secs(4);

pub struct UiState {
    pub tab: usize,
    pub view: SessionView,
    pub info: String,

    // Links input on the Session tab
    pub links_input: String,
    pub editing: bool,
    pub last_submitted: Option<String>,

    // Results pane
    pub result_selected: usize,
    pub detail_scroll: u16,

    // Busy indicator
    pub busy_since: Option<Instant>,
    pub fun_index: usize,
    pub fun_changed_at: Instant,

    pub base_url: String,
    pub last_summary: Option<SessionSummary>,
    pub history: Vec<SessionSummary>,
    pub history_selected: usize, // Index of selected history item (0 = most recent)
    pub history_scroll_offset: usize,
    pub history_loaded_count: usize,
    pub initial_history_load_size: usize, // Initial load size based on terminal height
    pub auto_save: bool,
    pub last_exported_path: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tab: 0,
            view: SessionView::new(RenderMode::Replace),
            info: String::new(),
            links_input: String::new(),
            editing: false,
            last_submitted: None,
            result_selected: 0,
            detail_scroll: 0,
            busy_since: None,
            fun_index: 0,
            fun_changed_at: Instant::now(),
            base_url: String::new(),
            last_summary: None,
            history: Vec::new(),
            history_selected: 0,
            history_scroll_offset: 0,
            history_loaded_count: 0,
            initial_history_load_size: 66, // Default initial load size
            auto_save: true,
            last_exported_path: None,
        }
    }
}

pub fn push_wrapped_status_kv(
    out: &mut Vec<Line<'static>>,
    label: &str,
    value: &str,
    status_area_width: u16,
) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    // Account for borders (2 chars on each side)
    let usable_width = status_area_width.saturating_sub(4).max(1);
    let label_text = format!("{label}:");
    let label_width = label_text.chars().count() as u16;

    let value_chars: Vec<char> = value.chars().collect();
    let mut remaining = value_chars.as_slice();
    let mut first = true;

    while !remaining.is_empty() {
        let line_width = if first {
            usable_width.saturating_sub(label_width + 1).max(1)
        } else {
            usable_width.saturating_sub(2).max(1)
        };

        let chars_to_take = (remaining.len() as u16).min(line_width) as usize;
        let (line_chars, rest) = remaining.split_at(chars_to_take);
        let line_text: String = line_chars.iter().collect();

        if first {
            out.push(Line::from(vec![
                Span::styled(label_text.clone(), Style::default().fg(Color::Gray)),
                Span::raw(" "),
                Span::raw(line_text),
            ]));
            first = false;
        } else {
            out.push(Line::from(vec![Span::raw("  "), Span::raw(line_text)]));
        }

        remaining = rest;
    }
}

impl UiState {
    pub fn selected_result(&self) -> Option<&JobResult> {
        self.view.board.results().get(self.result_selected)
    }

    /// Keep the result cursor on the board after a snapshot shrinks it.
    pub fn clamp_selection(&mut self) {
        let len = self.view.board.len();
        if self.result_selected >= len {
            self.result_selected = len.saturating_sub(1);
            self.detail_scroll = 0;
        }
    }

    pub fn select_result(&mut self, delta: isize) {
        if self.view.board.is_empty() {
            return;
        }
        let len = self.view.board.len();
        let next = (self.result_selected as isize + delta).clamp(0, len as isize - 1) as usize;
        if next != self.result_selected {
            self.result_selected = next;
            self.detail_scroll = 0;
        }
    }

    /// Track the busy indicator from the session state.
    pub fn sync_busy(&mut self, now: Instant) {
        match (self.view.state.is_busy(), self.busy_since) {
            (true, None) => {
                self.busy_since = Some(now);
                self.fun_changed_at = now;
            }
            (false, Some(_)) => self.busy_since = None,
            _ => {}
        }
    }

    /// Rotate the flavour message; returns true when it changed.
    pub fn advance_fun_message(&mut self, now: Instant) -> bool {
        if self.busy_since.is_none() {
            return false;
        }
        if now.duration_since(self.fun_changed_at) < FUN_MESSAGE_PERIOD {
            return false;
        }
        self.fun_index = (self.fun_index + 1) % FUN_MESSAGES.len();
        self.fun_changed_at = now;
        true
    }

    pub fn fun_message(&self) -> &'static str {
        FUN_MESSAGES[self.fun_index % FUN_MESSAGES.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobEvent, ResultStatus, SessionState};

    fn result(n: u32) -> JobResult {
        JobResult {
            strategy_number: n,
            status: ResultStatus::Success,
            link: None,
            strategy: Some("s".into()),
            backtest: Some("b".into()),
            strategy_file: None,
            backtest_file: None,
            error: None,
            message: None,
        }
    }

    #[test]
    fn selection_follows_shrinking_board() {
        let mut s = UiState::default();
        s.view.apply(&JobEvent::ResultsUpdated {
            seq: 1,
            results: vec![result(1), result(2), result(3)],
            complete: false,
        });
        s.select_result(5);
        assert_eq!(s.result_selected, 2);
        s.view.apply(&JobEvent::ResultsUpdated {
            seq: 2,
            results: vec![result(1)],
            complete: false,
        });
        s.clamp_selection();
        assert_eq!(s.selected_result().map(|r| r.strategy_number), Some(1));
    }

    #[test]
    fn fun_messages_rotate_only_while_busy() {
        let mut s = UiState::default();
        let t0 = Instant::now();
        assert!(!s.advance_fun_message(t0 + Duration::from_secs(10)));

        s.view.state = SessionState::Polling;
        s.sync_busy(t0);
        assert!(!s.advance_fun_message(t0 + Duration::from_secs(3)));
        assert!(s.advance_fun_message(t0 + Duration::from_secs(4)));
        assert_eq!(s.fun_index, 1);

        s.view.state = SessionState::Done;
        s.sync_busy(t0 + Duration::from_secs(5));
        assert!(s.busy_since.is_none());
    }
}
