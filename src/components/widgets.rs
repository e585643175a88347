//! Shared look and building blocks for all screens.

use crate::forms::{BannerKind, StatusBanner};
use crate::tui::Frame;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{prelude::*, widgets::*};

pub const BG: Color = Color::Rgb(16, 16, 28);
pub const PANEL_BG: Color = Color::Rgb(22, 22, 35);
pub const INPUT_BG: Color = Color::Rgb(26, 26, 36);
pub const BORDER: Color = Color::Rgb(75, 75, 120);
pub const TITLE: Color = Color::Rgb(230, 230, 250);
pub const TEXT: Color = Color::Rgb(220, 220, 240);
pub const MUTED: Color = Color::Rgb(140, 140, 170);
pub const LABEL: Color = Color::Rgb(140, 140, 200);
pub const FOCUS: Color = Color::Rgb(250, 250, 110);
pub const SUCCESS: Color = Color::Rgb(140, 219, 140);
pub const ERROR: Color = Color::Rgb(255, 100, 100);
pub const ACCENT: Color = Color::Rgb(129, 199, 245);
pub const TABLE_HEADER: Color = Color::Rgb(80, 60, 130);

/// Paints the background and returns the usable area.
pub fn background(frame: &mut Frame) -> Rect {
    let area = frame.area();
    frame.render_widget(Block::default().style(Style::default().bg(BG)), area);
    area
}

pub fn header(frame: &mut Frame, area: Rect, title: &str) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER))
        .style(Style::default().bg(BG));
    frame.render_widget(block, area);

    let title = Paragraph::new(title.to_string())
        .style(
            Style::default()
                .fg(TITLE)
                .add_modifier(Modifier::BOLD)
                .bg(BG),
        )
        .alignment(Alignment::Center);
    frame.render_widget(title, area);
}

pub fn panel(title: &str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER))
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(TITLE).add_modifier(Modifier::BOLD),
        ))
        .style(Style::default().bg(PANEL_BG))
}

/// A bordered single-line input. Locked fields are dimmed.
pub fn input_field(label: &str, value: &str, focused: bool, locked: bool) -> Paragraph<'static> {
    let accent = if focused {
        FOCUS
    } else if locked {
        MUTED
    } else {
        LABEL
    };
    Paragraph::new(value.to_string())
        .style(
            Style::default()
                .fg(if locked { MUTED } else { TEXT })
                .bg(INPUT_BG),
        )
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .title(Span::styled(format!(" {label} "), Style::default().fg(accent)))
                .border_style(Style::default().fg(accent))
                .style(Style::default().bg(INPUT_BG)),
        )
}

/// `label: value` line for read-only detail views.
pub fn detail_line(label: &str, value: &str) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label:<22}"), Style::default().fg(LABEL)),
        Span::styled(value.to_string(), Style::default().fg(TEXT)),
    ])
}

pub fn checkbox(label: &str, checked: bool, focused: bool) -> Paragraph<'static> {
    let mark = if checked { "[x]" } else { "[ ]" };
    Paragraph::new(format!("{mark} {label}")).style(
        Style::default()
            .fg(if focused { FOCUS } else { TEXT })
            .bg(PANEL_BG),
    )
}

pub fn button(label: &str, focused: bool) -> Paragraph<'static> {
    let (text, style) = if focused {
        (
            format!("► {label} ◄"),
            Style::default().fg(SUCCESS).add_modifier(Modifier::BOLD),
        )
    } else {
        (format!("  {label}  "), Style::default().fg(Color::Rgb(180, 180, 200)))
    };
    Paragraph::new(text)
        .style(style)
        .alignment(Alignment::Center)
}

pub fn status_line(banner: &StatusBanner) -> Paragraph<'static> {
    match banner.current() {
        Some((BannerKind::Success, message)) => Paragraph::new(format!("✓ {message}"))
            .style(
                Style::default()
                    .fg(SUCCESS)
                    .add_modifier(Modifier::BOLD)
                    .bg(BG),
            )
            .alignment(Alignment::Center),
        Some((BannerKind::Error, message)) => Paragraph::new(format!("⚠ {message}"))
            .style(
                Style::default()
                    .fg(ERROR)
                    .add_modifier(Modifier::BOLD)
                    .bg(BG),
            )
            .alignment(Alignment::Center),
        None => Paragraph::new("").style(Style::default().bg(BG)),
    }
}

pub fn help(text: &str) -> Paragraph<'static> {
    Paragraph::new(text.to_string())
        .style(Style::default().fg(MUTED).bg(BG))
        .alignment(Alignment::Center)
}

pub fn table_header(cells: &[&str]) -> Row<'static> {
    Row::new(
        cells
            .iter()
            .map(|cell| Cell::from(cell.to_string()).style(Style::default().fg(TITLE)))
            .collect::<Vec<_>>(),
    )
    .style(Style::default().bg(TABLE_HEADER))
    .height(1)
}

pub fn selected_row_style() -> Style {
    Style::default()
        .fg(FOCUS)
        .bg(Color::Rgb(40, 40, 60))
        .add_modifier(Modifier::BOLD)
}

/// Helper function to create a centered rectangle.
pub fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Moves a table selection one row, wrapping at both ends.
pub fn wrap_selection(state: &mut TableState, len: usize, forward: bool) {
    if len == 0 {
        state.select(None);
        return;
    }
    let next = match state.selected() {
        Some(i) if forward => (i + 1) % len,
        Some(0) => len - 1,
        Some(i) => (i - 1).min(len - 1),
        None => 0,
    };
    state.select(Some(next));
}

/// Keeps a selection valid after the list it points into changed length.
pub fn clamp_selection(state: &mut TableState, len: usize) {
    if len == 0 {
        state.select(None);
    } else {
        let selected = state.selected().unwrap_or(0).min(len - 1);
        state.select(Some(selected));
    }
}

/// Yes/No confirmation popup.
#[derive(Debug, Clone)]
pub struct ConfirmDialog {
    pub title: String,
    pub message: String,
    /// 0 = Yes, 1 = No
    selected: usize,
}

impl ConfirmDialog {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            selected: 1,
        }
    }

    /// `Some(true)` confirmed, `Some(false)` dismissed, `None` still open.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<bool> {
        match key.code {
            KeyCode::Left | KeyCode::Right | KeyCode::Tab => {
                self.selected = 1 - self.selected;
                None
            }
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(true),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => Some(false),
            KeyCode::Enter => Some(self.selected == 0),
            _ => None,
        }
    }

    pub fn render(&self, frame: &mut Frame) {
        let area = centered_rect(60, 20, frame.area());
        let block = Block::default()
            .title(format!(" {} ", self.title))
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(FOCUS))
            .style(Style::default().bg(PANEL_BG));

        let text = vec![
            Line::from(self.message.clone()),
            Line::from(""),
            Line::from(vec![
                Span::styled(
                    " Yes ",
                    Style::default().fg(if self.selected == 0 {
                        Color::Green
                    } else {
                        Color::DarkGray
                    }),
                ),
                Span::raw("  "),
                Span::styled(
                    " No ",
                    Style::default().fg(if self.selected == 1 {
                        Color::Red
                    } else {
                        Color::DarkGray
                    }),
                ),
            ]),
        ];

        let paragraph = Paragraph::new(text)
            .block(block)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(Clear, area);
        frame.render_widget(paragraph, area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn confirm_dialog_defaults_to_no() {
        let mut dialog = ConfirmDialog::new("Delete", "Delete staff member?");
        assert_eq!(dialog.handle_key(key(KeyCode::Enter)), Some(false));
        assert_eq!(dialog.handle_key(key(KeyCode::Left)), None);
        assert_eq!(dialog.handle_key(key(KeyCode::Enter)), Some(true));
        assert_eq!(dialog.handle_key(key(KeyCode::Char('n'))), Some(false));
    }

    #[test]
    fn selection_wraps() {
        let mut state = TableState::default();
        wrap_selection(&mut state, 3, true);
        assert_eq!(state.selected(), Some(0));
        wrap_selection(&mut state, 3, false);
        assert_eq!(state.selected(), Some(2));
        wrap_selection(&mut state, 3, true);
        assert_eq!(state.selected(), Some(0));
        clamp_selection(&mut state, 0);
        assert_eq!(state.selected(), None);
    }
}
