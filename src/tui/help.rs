use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key_line(key: &'static str, width: usize, what: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(" ".repeat(width.saturating_sub(key.chars().count()) + 2)),
        Span::raw(what),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Quit"),
        ]),
        key_line("tab", 10, "Switch tabs"),
        key_line("?", 10, "Show this help"),
        key_line("a", 10, "Toggle auto-save"),
        Line::from(""),
        Line::from("Session tab:"),
        key_line("i", 10, "Edit links (one per line or comma separated)"),
        key_line("enter", 10, "Submit links (while editing too)"),
        key_line("alt-enter", 10, "New line while editing"),
        key_line("esc", 10, "Stop editing"),
        key_line("r", 10, "Resubmit the last links"),
        key_line("x", 10, "Cancel the running session"),
        key_line("↑/↓ j/k", 10, "Select result"),
        key_line("pgup/pgdn", 10, "Scroll result detail"),
        key_line("y / Y", 10, "Copy strategy / backtest code"),
        key_line("d / D", 10, "Download selected / all artifacts"),
        key_line("s", 10, "Save session JSON"),
        Line::from(""),
        Line::from("History tab:"),
        key_line("↑/↓ j/k", 10, "Navigate"),
        key_line("e", 10, "Export selected as JSON"),
        key_line("h", 10, "Export selected as HTML"),
        key_line("y", 10, "Copy exported path to clipboard"),
        key_line("l", 10, "Load selected links into the input"),
        key_line("d", 10, "Delete selected"),
        key_line("r", 10, "Refresh history"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
