mod export;
mod help;
mod state;

use crate::cli::Cli;
use crate::model::{
    ArtifactKind, JobEvent, Phase, PhaseStatus, ResultOutcome, SessionState, SessionSummary,
    SubmissionRequest,
};
use crate::orchestrator::{self, SessionLauncher, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use export::{copy_to_clipboard, export_summary_html, export_summary_json, save_and_show_path};
use help::draw_help;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{push_wrapped_status_kv, UiState};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

const SPINNER: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

pub async fn run(args: Cli) -> Result<()> {
    // Unbounded channels avoid backpressure between the engine and the render loop.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<JobEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let links = crate::cli::collect_links(&args)?;
    let initial = SubmissionRequest::new(links.clone())
        .validate()
        .is_ok()
        .then(|| links.clone());
    let launcher = SessionLauncher::from_cli(&args)?;

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_args = args.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(ui_args, links, event_rx, cmd_tx));

    let res = orchestrator::run_controller(
        launcher,
        args.download_dir.clone(),
        initial,
        event_tx,
        cmd_rx,
    )
    .await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    args: Cli,
    initial_links: String,
    mut event_rx: UnboundedReceiver<JobEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let initial_load = terminal
        .size()
        .map(|size| ((size.height as usize).saturating_sub(2) * 3).max(20))
        .unwrap_or(66);

    let has_initial = SubmissionRequest::new(initial_links.clone())
        .validate()
        .is_ok();
    let mut state = UiState {
        view: crate::board::SessionView::new(args.render_mode),
        auto_save: args.auto_save,
        base_url: args.base_url.clone(),
        editing: !has_initial,
        last_submitted: has_initial.then(|| initial_links.clone()),
        links_input: initial_links,
        ..Default::default()
    };
    // UiState is owned by the UI thread only; no cross-thread mutation.
    state.initial_history_load_size = initial_load;
    state.history = crate::storage::load_recent(initial_load).unwrap_or_default();
    state.history_loaded_count = state.history.len();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            match ev {
                JobEvent::SessionFinished { summary } => {
                    handle_session_finished(&args, &mut state, *summary);
                }
                other => apply_event(&mut state, other),
            }
        }
        let now = Instant::now();
        state.sync_busy(now);
        state.advance_fun_message(now);

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if !event::poll(Duration::from_millis(10)).unwrap_or(false) {
            continue;
        }
        let k = match event::read() {
            Ok(Event::Key(k)) => k,
            Ok(Event::Paste(text)) => {
                if state.editing {
                    state.links_input.push_str(&text);
                }
                continue;
            }
            _ => continue,
        };
        if k.kind != KeyEventKind::Press {
            continue;
        }

        if state.editing {
            match (k.modifiers, k.code) {
                (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                    let _ = cmd_tx.send(UiCommand::Quit);
                    break Ok(());
                }
                (m, KeyCode::Enter) if m.contains(KeyModifiers::ALT) => {
                    state.links_input.push('\n');
                }
                (_, KeyCode::Enter) => {
                    let links = state.links_input.clone();
                    submit_links(&mut state, &cmd_tx, links);
                }
                (_, KeyCode::Esc) => state.editing = false,
                (_, KeyCode::Backspace) => {
                    state.links_input.pop();
                }
                (KeyModifiers::CONTROL, KeyCode::Char('u')) => state.links_input.clear(),
                (_, KeyCode::Char(c)) => state.links_input.push(c),
                _ => {}
            }
            continue;
        }

        match (k.modifiers, k.code) {
            (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                let _ = cmd_tx.send(UiCommand::Quit);
                break Ok(());
            }
            (_, KeyCode::Char('i')) if state.tab == 0 => {
                state.editing = true;
            }
            (_, KeyCode::Enter) if state.tab == 0 => {
                let links = state.links_input.clone();
                submit_links(&mut state, &cmd_tx, links);
            }
            (_, KeyCode::Char('x')) if state.tab == 0 => {
                if state.view.state.is_busy() {
                    let _ = cmd_tx.send(UiCommand::Cancel);
                } else {
                    state.info = "No session running".into();
                }
            }
            (_, KeyCode::Char('r')) => {
                if state.tab == 1 {
                    refresh_history(&mut state);
                } else if let Some(links) = state.last_submitted.clone() {
                    submit_links(&mut state, &cmd_tx, links);
                } else {
                    state.info = "Nothing submitted yet".into();
                }
            }
            (_, KeyCode::Char('s')) if state.tab == 0 => {
                if let Some(summary) = state.last_summary.clone() {
                    save_and_show_path(&summary, &mut state);
                } else {
                    state.info = "No finished session to save yet.".into();
                }
            }
            (_, KeyCode::Char('y')) => {
                if state.tab == 0 {
                    copy_code(&mut state, ArtifactKind::Strategy);
                } else if state.tab == 1 {
                    copy_exported_path(&mut state);
                }
            }
            (_, KeyCode::Char('Y')) if state.tab == 0 => {
                copy_code(&mut state, ArtifactKind::Backtest);
            }
            (_, KeyCode::Char('d')) => {
                if state.tab == 0 {
                    match state.selected_result().cloned() {
                        Some(r) if r.is_success() => {
                            state.info = format!("Downloading strategy {}…", r.strategy_number);
                            let _ = cmd_tx.send(UiCommand::Download(vec![r]));
                        }
                        Some(_) => state.info = "Selected result has no files".into(),
                        None => state.info = "No result selected".into(),
                    }
                } else if state.tab == 1 {
                    delete_selected_history(&mut state);
                }
            }
            (_, KeyCode::Char('D')) if state.tab == 0 => {
                let results = state.view.board.results().to_vec();
                if results.iter().any(|r| r.is_success()) {
                    state.info = "Downloading all artifacts…".into();
                    let _ = cmd_tx.send(UiCommand::Download(results));
                } else {
                    state.info = "No successful results to download".into();
                }
            }
            (_, KeyCode::Char('e')) if state.tab == 1 => {
                export_selected_history(&mut state, "JSON", export_summary_json);
            }
            (_, KeyCode::Char('h')) if state.tab == 1 => {
                export_selected_history(&mut state, "HTML", export_summary_html);
            }
            (_, KeyCode::Char('l')) if state.tab == 1 => {
                if let Some(s) = state.history.get(state.history_selected) {
                    state.links_input = s.links.clone();
                    state.tab = 0;
                    state.editing = true;
                    state.info = "Links loaded from history".into();
                }
            }
            (_, KeyCode::Char('a')) => {
                state.auto_save = !state.auto_save;
                state.info = if state.auto_save {
                    "Auto-save enabled".into()
                } else {
                    "Auto-save disabled".into()
                };
            }
            (_, KeyCode::Tab) => {
                let new_tab = (state.tab + 1) % 3;
                state.tab = new_tab;
                if new_tab == 1 {
                    state.history_selected = 0;
                    state.history_scroll_offset = 0;
                }
            }
            (_, KeyCode::Char('?')) => {
                state.tab = 2;
            }
            (_, KeyCode::Up) | (_, KeyCode::Char('k')) => {
                if state.tab == 0 {
                    state.select_result(-1);
                } else if state.tab == 1 && state.history_selected > 0 {
                    state.history_selected -= 1;
                    if state.history_selected < state.history_scroll_offset {
                        state.history_scroll_offset = state.history_selected;
                    }
                }
            }
            (_, KeyCode::Down) | (_, KeyCode::Char('j')) => {
                if state.tab == 0 {
                    state.select_result(1);
                } else if state.tab == 1 {
                    history_down(&mut state);
                }
            }
            (_, KeyCode::PageUp) if state.tab == 0 => {
                state.detail_scroll = state.detail_scroll.saturating_sub(10);
            }
            (_, KeyCode::PageDown) if state.tab == 0 => {
                state.detail_scroll = state.detail_scroll.saturating_add(10);
            }
            _ => {}
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, DisableBracketedPaste, LeaveAlternateScreen).ok();
    res
}

fn submit_links(state: &mut UiState, cmd_tx: &UnboundedSender<UiCommand>, links: String) {
    if let Err(e) = SubmissionRequest::new(links.clone()).validate() {
        state.info = e.to_string();
        state.editing = true;
        return;
    }
    state.editing = false;
    state.last_submitted = Some(links.clone());
    state.info = "Submitting…".into();
    let _ = cmd_tx.send(UiCommand::Submit(links));
}

fn copy_code(state: &mut UiState, kind: ArtifactKind) {
    let picked = state.selected_result().map(|r| match r.outcome() {
        ResultOutcome::Success {
            strategy, backtest, ..
        } => Some((
            r.strategy_number,
            match kind {
                ArtifactKind::Strategy => strategy.to_string(),
                ArtifactKind::Backtest => backtest.to_string(),
            },
        )),
        ResultOutcome::Error { .. } => None,
    });
    state.info = match picked {
        None => "No result selected".into(),
        Some(None) => "Selected result has no code".into(),
        Some(Some((n, text))) => match copy_to_clipboard(&text) {
            Ok(()) => format!("✓ Copied {} code of strategy {n}", kind.path_segment()),
            Err(e) => format!("Clipboard copy failed: {e:#}"),
        },
    };
}

fn copy_exported_path(state: &mut UiState) {
    if let Some(path) = state.last_exported_path.clone() {
        state.info = match copy_to_clipboard(&path) {
            Ok(_) => format!("✓ Copied to clipboard: {path}"),
            Err(e) => format!("Clipboard copy failed: {e:#}"),
        };
    } else {
        state.info = "No exported file path to copy. Export a file first (e/h)".into();
    }
}

fn export_selected_history(
    state: &mut UiState,
    label: &str,
    export: fn(&SessionSummary) -> Result<std::path::PathBuf>,
) {
    let Some(summary) = state.history.get(state.history_selected) else {
        return;
    };
    match export(summary) {
        Ok(p) => {
            state.last_exported_path = Some(p.to_string_lossy().to_string());
            state.info = format!("Exported {label}: {} (press 'y' to copy path)", p.display());
        }
        Err(e) => {
            state.info = format!("{label} export failed: {e:#}");
        }
    }
}

fn clamp_history_cursor(state: &mut UiState) {
    if state.history.is_empty() {
        state.history_selected = 0;
        state.history_scroll_offset = 0;
        return;
    }
    if state.history_selected >= state.history.len() {
        state.history_selected = state.history.len() - 1;
    }
    if state.history_scroll_offset > state.history_selected {
        state.history_scroll_offset = state.history_selected;
    }
}

fn refresh_history(state: &mut UiState) {
    let reload_size = state
        .initial_history_load_size
        .max(state.history_loaded_count);
    match crate::storage::load_recent(reload_size) {
        Ok(new_history) => {
            let old_count = state.history.len();
            state.history = new_history;
            state.history_loaded_count = state.history.len();
            clamp_history_cursor(state);

            let new_count = state.history.len();
            state.info = if new_count > old_count {
                format!("Refreshed: {} new session(s)", new_count - old_count)
            } else if new_count < old_count {
                format!("Refreshed: {} session(s) removed", old_count - new_count)
            } else {
                "Refreshed".into()
            };
        }
        Err(e) => {
            state.info = format!("Refresh failed: {e:#}");
        }
    }
}

fn history_down(state: &mut UiState) {
    if state.history_selected + 1 >= state.history.len() {
        return;
    }
    state.history_selected += 1;

    // Load another page once the cursor nears the end of what is loaded.
    let load_threshold = state.history_loaded_count.saturating_sub(10);
    if state.history_selected >= load_threshold && state.history_loaded_count == state.history.len()
    {
        let load_more = state.history.len() + state.history.len().max(20);
        if let Ok(more) = crate::storage::load_recent(load_more) {
            if more.len() > state.history.len() {
                state.history = more;
                state.history_loaded_count = state.history.len();
            }
        }
    }
}

fn delete_selected_history(state: &mut UiState) {
    let Some(to_delete) = state.history.get(state.history_selected).cloned() else {
        return;
    };
    if let Err(e) = crate::storage::delete_run(&to_delete) {
        state.info = format!("Delete failed: {e:#}");
    } else {
        state.history.remove(state.history_selected);
        state.history_loaded_count = state.history.len();
        clamp_history_cursor(state);
        state.info = "Deleted".into();
    }
}

fn apply_event(state: &mut UiState, ev: JobEvent) {
    state.view.apply(&ev);
    match ev {
        JobEvent::StateChanged {
            state: SessionState::Submitting,
        } => {
            state.result_selected = 0;
            state.detail_scroll = 0;
            state.info = "Submitting…".into();
        }
        JobEvent::ResultsUpdated { .. } => state.clamp_selection(),
        JobEvent::Info(msg) => state.info = msg,
        _ => {}
    }
}

fn handle_session_finished(args: &Cli, state: &mut UiState, summary: SessionSummary) {
    let reload_size = (state.history_loaded_count + 1).max(state.initial_history_load_size);
    let processed =
        orchestrator::process_session_completion(args, reload_size, state.auto_save, &summary);

    state.info = match summary.state {
        SessionState::Done => format!(
            "Done: {} succeeded, {} failed",
            summary.succeeded(),
            summary.failed()
        ),
        SessionState::Cancelled => "Cancelled".into(),
        _ => summary
            .error
            .clone()
            .unwrap_or_else(|| summary.state.label().to_string()),
    };
    if let Some(path) = processed.auto_saved_path.as_ref() {
        state.info = format!("{} | Saved: {}", state.info, path.display());
    }
    if !processed.export_messages.is_empty() {
        state.info = processed.export_messages.join("; ");
    }

    state.view.apply(&JobEvent::SessionFinished {
        summary: Box::new(summary.clone()),
    });
    state.last_summary = Some(summary);
    state.history = processed.history;
    state.history_loaded_count = state.history.len();
    if state.tab == 1 {
        state.history_selected = 0;
        state.history_scroll_offset = 0;
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![
        Line::from("Session"),
        Line::from("History"),
        Line::from("Help"),
    ])
    .select(state.tab)
    .block(Block::default().borders(Borders::ALL).title("rbi-cli"))
    .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        0 => draw_session(chunks[1], f, state),
        1 => draw_history(chunks[1], f, state),
        _ => draw_help(chunks[1], f),
    }
}

fn draw_session(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let input_lines = state.links_input.lines().count().max(1) as u16;
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length((input_lines + 2).clamp(3, 8)), // Links input
                Constraint::Length(8),                             // Phase panes
                Constraint::Min(6),                                // Results board
                Constraint::Length(4),                             // Status
            ]
            .as_ref(),
        )
        .split(area);

    draw_links_input(rows[0], f, state);
    draw_phases(rows[1], f, state);
    draw_results(rows[2], f, state);
    draw_status(rows[3], f, state);
}

fn draw_links_input(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let (title, border) = if state.editing {
        (
            "Links (enter: submit, alt-enter: new line, esc: done)",
            Style::default().fg(Color::Yellow),
        )
    } else {
        ("Links (i: edit, enter: submit)", Style::default())
    };
    let mut text = state.links_input.clone();
    if state.editing {
        text.push('▏');
    }
    let visible = area.height.saturating_sub(2) as usize;
    let total = text.lines().count();
    let p = Paragraph::new(text)
        .scroll((total.saturating_sub(visible) as u16, 0))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border)
                .title(title),
        );
    f.render_widget(p, area);
}

fn phase_style(status: PhaseStatus) -> (Style, &'static str) {
    match status {
        PhaseStatus::Pending => (Style::default().fg(Color::DarkGray), "·"),
        PhaseStatus::Active => (Style::default().fg(Color::Yellow), "▶"),
        PhaseStatus::Complete => (Style::default().fg(Color::Green), "✓"),
        PhaseStatus::Error => (Style::default().fg(Color::Red), "✗"),
    }
}

fn draw_phases(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Ratio(1, 3),
                Constraint::Ratio(1, 3),
                Constraint::Ratio(1, 3),
            ]
            .as_ref(),
        )
        .split(area);

    let phases = &state.view.phases;
    for (i, phase) in Phase::ALL.into_iter().enumerate() {
        let status = phases.status(phase);
        let (style, marker) = phase_style(status);
        let messages = phases.messages(phase);
        let visible = cols[i].height.saturating_sub(2) as usize;
        let skip = messages.len().saturating_sub(visible);
        let lines: Vec<Line> = messages
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(idx, m)| {
                if idx + 1 == messages.len() && status == PhaseStatus::Active {
                    Line::from(Span::styled(m.clone(), Style::default().fg(Color::White)))
                } else {
                    Line::from(Span::styled(m.clone(), Style::default().fg(Color::Gray)))
                }
            })
            .collect();
        let p = Paragraph::new(lines).wrap(Wrap { trim: true }).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(style)
                .title(Span::styled(format!("{marker} {}", phase.label()), style)),
        );
        f.render_widget(p, cols[i]);
    }
}

fn draw_results(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let board = &state.view.board;
    let area = if let Some(err) = board.error() {
        let split = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
            .split(area);
        let p = Paragraph::new(Span::styled(err.to_string(), Style::default().fg(Color::Red)))
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Red))
                    .title("Error"),
            );
        f.render_widget(p, split[0]);
        split[1]
    } else {
        area
    };

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(28), Constraint::Min(0)].as_ref())
        .split(area);

    let title = if board.is_complete() {
        format!("Results ({}, complete)", board.len())
    } else {
        format!("Results ({})", board.len())
    };
    let items: Vec<Line> = board
        .results()
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let (mark, color) = if r.is_success() {
                ("✓", Color::Green)
            } else {
                ("✗", Color::Red)
            };
            let mut style = Style::default().fg(color);
            if i == state.result_selected {
                style = style.add_modifier(Modifier::REVERSED);
            }
            Line::from(Span::styled(
                format!("{mark} Strategy {}", r.strategy_number),
                style,
            ))
        })
        .collect();
    let visible = cols[0].height.saturating_sub(2) as usize;
    let list_scroll = state.result_selected.saturating_sub(visible.saturating_sub(1));
    let list = Paragraph::new(items)
        .scroll((list_scroll as u16, 0))
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(list, cols[0]);

    let detail_lines: Vec<Line> = match state.selected_result() {
        Some(r) => crate::text_summary::result_lines(&state.base_url, r)
            .into_iter()
            .map(Line::from)
            .collect(),
        None if state.view.state.is_busy() => vec![Line::from("Waiting for results…")],
        None => vec![Line::from("No results yet.")],
    };
    let detail = Paragraph::new(detail_lines)
        .scroll((state.detail_scroll, 0))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Detail (y/Y: copy code, d: download)"),
        );
    f.render_widget(detail, cols[1]);
}

fn state_color(s: SessionState) -> Color {
    match s {
        SessionState::Idle => Color::Gray,
        SessionState::Submitting | SessionState::Polling => Color::Yellow,
        SessionState::Done => Color::Green,
        SessionState::Failed => Color::Red,
        SessionState::Cancelled => Color::Magenta,
    }
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut first = vec![Span::styled(
        state.view.state.label(),
        Style::default()
            .fg(state_color(state.view.state))
            .add_modifier(Modifier::BOLD),
    )];
    if let Some(since) = state.busy_since {
        let frame = (since.elapsed().as_millis() / 100) as usize % SPINNER.len();
        first.push(Span::raw(format!(" {} ", SPINNER[frame])));
        first.push(Span::styled(
            state.fun_message(),
            Style::default().fg(Color::Cyan),
        ));
    }
    if state.view.last_seq > 0 {
        first.push(Span::raw(format!("  poll #{}", state.view.last_seq)));
    }
    first.push(Span::raw(format!(
        "  auto-save: {}",
        if state.auto_save { "on" } else { "off" }
    )));

    let mut lines = vec![Line::from(first)];
    push_wrapped_status_kv(&mut lines, "Info", &state.info, area.width);
    lines.truncate(area.height.saturating_sub(2) as usize);

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(p, area);
}

fn draw_history(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut lines: Vec<Line> = Vec::new();

    // Header, optional info line, blank line and the links preview take five rows.
    let max_items = (area.height as usize).saturating_sub(7).max(1);

    let total_count = state.history.len();
    let current_pos = if total_count > 0 {
        state.history_selected + 1
    } else {
        0
    };

    lines.push(Line::from(vec![
        Span::raw(format!("History ({current_pos}/{total_count}) - ")),
        Span::styled("↑/↓/j/k", Style::default().fg(Color::Magenta)),
        Span::raw(": navigate, "),
        Span::styled("r", Style::default().fg(Color::Magenta)),
        Span::raw(": refresh, "),
        Span::styled("d", Style::default().fg(Color::Magenta)),
        Span::raw(": delete, "),
        Span::styled("e", Style::default().fg(Color::Magenta)),
        Span::raw(": export JSON, "),
        Span::styled("h", Style::default().fg(Color::Magenta)),
        Span::raw(": export HTML, "),
        Span::styled("l", Style::default().fg(Color::Magenta)),
        Span::raw(": load links"),
    ]));
    if !state.info.is_empty() {
        let mut info_lines = Vec::new();
        push_wrapped_status_kv(&mut info_lines, "Info", &state.info, area.width);
        lines.extend(info_lines);
    }
    lines.push(Line::from(""));

    // Keep the selected item visible.
    let scroll_offset = {
        let mut offset = state
            .history_scroll_offset
            .min(state.history.len().saturating_sub(1));
        if state.history_selected < offset {
            offset = state.history_selected;
        } else if state.history_selected >= offset + max_items {
            offset = state.history_selected.saturating_sub(max_items - 1);
        }
        offset
    };

    for (idx, s) in state
        .history
        .iter()
        .enumerate()
        .skip(scroll_offset)
        .take(max_items)
    {
        let is_selected = idx == state.history_selected;
        let timestamp: String = s.timestamp_utc.chars().take(19).collect();
        let mut style = Style::default().fg(state_color(s.state));
        if is_selected {
            style = style.add_modifier(Modifier::REVERSED);
        }
        lines.push(Line::from(vec![
            Span::styled(
                format!(
                    "{} {:<10} {:>3} link(s) {:>3} ok {:>3} err",
                    timestamp.replace('T', " "),
                    s.state.label(),
                    s.link_count,
                    s.succeeded(),
                    s.failed()
                ),
                style,
            ),
            Span::styled(
                format!("  {}", s.base_url),
                Style::default().fg(Color::DarkGray),
            ),
        ]));
    }

    if let Some(s) = state.history.get(state.history_selected) {
        lines.push(Line::from(""));
        let links = SubmissionRequest::new(s.links.clone()).parsed_links().join(", ");
        push_wrapped_status_kv(&mut lines, "Links", &links, area.width);
    }

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("History"));
    f.render_widget(p, area);
}
