use crate::app::SelectedApp;
use crate::components::hospital::HospitalTab;
use crate::components::widgets::{self, ConfirmDialog};
use crate::components::Component;
use crate::context::AppContext;
use crate::rbac::PermissionState;
use crate::tui::Frame;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    prelude::*,
    widgets::{List, ListItem, Padding, Paragraph, Wrap},
};

struct MenuEntry {
    title: &'static str,
    target: SelectedApp,
    /// `None` for entries every signed-in user may open.
    resource: Option<&'static str>,
}

const MENU: &[MenuEntry] = &[
    MenuEntry {
        title: "Hospital details",
        target: SelectedApp::Hospital(HospitalTab::Details),
        resource: Some(HospitalTab::Details.resource()),
    },
    MenuEntry {
        title: "Staff",
        target: SelectedApp::Hospital(HospitalTab::Staff),
        resource: Some(HospitalTab::Staff.resource()),
    },
    MenuEntry {
        title: "Doctors & invites",
        target: SelectedApp::Hospital(HospitalTab::Doctors),
        resource: Some(HospitalTab::Doctors.resource()),
    },
    MenuEntry {
        title: "Patients",
        target: SelectedApp::Hospital(HospitalTab::Patients),
        resource: Some(HospitalTab::Patients.resource()),
    },
    MenuEntry {
        title: "Billing & licenses",
        target: SelectedApp::Hospital(HospitalTab::Billing),
        resource: Some(HospitalTab::Billing.resource()),
    },
    MenuEntry {
        title: "Settings",
        target: SelectedApp::Settings,
        resource: None,
    },
];

pub struct Home {
    selected: usize,
    logout_dialog: Option<ConfirmDialog>,
}

impl Default for Home {
    fn default() -> Self {
        Self::new()
    }
}

impl Home {
    pub fn new() -> Self {
        Self {
            selected: 0,
            logout_dialog: None,
        }
    }

    fn is_enabled(entry: &MenuEntry, ctx: &AppContext) -> bool {
        entry
            .resource
            .map_or(true, |resource| ctx.rbac.has_any_permission(resource))
    }
}

impl Component for Home {
    fn handle_input(&mut self, event: KeyEvent, ctx: &mut AppContext) -> Result<Option<SelectedApp>> {
        if let Some(dialog) = &mut self.logout_dialog {
            match dialog.handle_key(event) {
                Some(true) => {
                    self.logout_dialog = None;
                    return Ok(Some(SelectedApp::Logout));
                }
                Some(false) => self.logout_dialog = None,
                None => {}
            }
            return Ok(None);
        }

        match event.code {
            KeyCode::Up => {
                self.selected = (self.selected + MENU.len() - 1) % MENU.len();
            }
            KeyCode::Down | KeyCode::Tab => {
                self.selected = (self.selected + 1) % MENU.len();
            }
            KeyCode::Enter => {
                let entry = &MENU[self.selected];
                if Self::is_enabled(entry, ctx) {
                    return Ok(Some(entry.target));
                }
            }
            KeyCode::Char('r') => ctx.refresh_permissions(),
            KeyCode::Esc => {
                self.logout_dialog = Some(ConfirmDialog::new(
                    "Confirm Logout",
                    "Are you sure you want to log out?",
                ));
            }
            _ => {}
        }
        Ok(None)
    }

    fn render(&self, frame: &mut Frame, ctx: &AppContext) {
        let area = widgets::background(frame);

        let main_layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(5),
                Constraint::Length(1),
                Constraint::Min(10),
                Constraint::Length(1),
            ])
            .split(area);

        let (name, hospital) = match &ctx.session {
            Some(session) => (
                session.profile.display_name(),
                session
                    .hospital_name()
                    .or(session.hospital_id.as_deref())
                    .unwrap_or("no hospital")
                    .to_string(),
            ),
            None => ("User".to_string(), "no hospital".to_string()),
        };

        let welcome_block = widgets::panel("Hospital Administration");
        let welcome_inner = welcome_block.inner(main_layout[0]);
        frame.render_widget(welcome_block, main_layout[0]);
        let welcome = Paragraph::new(Line::from(vec![
            Span::styled(
                "Welcome, ",
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                name,
                Style::default().fg(widgets::ACCENT).add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("  ·  {hospital}"), Style::default().fg(widgets::MUTED)),
        ]))
        .alignment(Alignment::Center)
        .block(ratatui::widgets::Block::default().padding(Padding::new(0, 0, 1, 0)));
        frame.render_widget(welcome, welcome_inner);

        let instruction = Paragraph::new("Please select a page:")
            .style(Style::default().fg(Color::Rgb(180, 190, 254)))
            .alignment(Alignment::Center);
        frame.render_widget(instruction, main_layout[1]);

        let content = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .spacing(2)
            .margin(1)
            .split(main_layout[2]);

        let items: Vec<ListItem> = MENU
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                let enabled = Self::is_enabled(entry, ctx);
                let style = if !enabled {
                    Style::default().fg(widgets::MUTED)
                } else if idx == self.selected {
                    Style::default()
                        .fg(widgets::FOCUS)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::Rgb(200, 200, 220))
                };
                let prefix = if idx == self.selected { " ► " } else { "   " };
                let suffix = if enabled { "" } else { "  (no access)" };
                ListItem::new(format!("{prefix}{}{suffix}", entry.title)).style(style)
            })
            .collect();
        frame.render_widget(List::new(items).block(widgets::panel("Pages")), content[0]);

        let status = match ctx.rbac.state() {
            PermissionState::Loading => Line::from(Span::styled(
                "Loading permissions…",
                Style::default().fg(widgets::MUTED),
            )),
            PermissionState::Ready(_) if ctx.rbac.is_super_admin() => Line::from(Span::styled(
                "Super admin: full access",
                Style::default().fg(widgets::SUCCESS),
            )),
            PermissionState::Ready(_) => Line::from(Span::styled(
                "Permissions loaded",
                Style::default().fg(widgets::SUCCESS),
            )),
            PermissionState::Failed(message) => Line::from(Span::styled(
                format!("Permissions unavailable: {message} (press r to retry)"),
                Style::default().fg(widgets::ERROR),
            )),
        };

        let mut lines = vec![status, Line::from("")];
        if let Some(session) = &ctx.session {
            lines.push(widgets::detail_line("Signed in as", &session.profile.email));
            lines.push(widgets::detail_line(
                "Hospital id",
                session.hospital_id.as_deref().unwrap_or("-"),
            ));
            lines.push(widgets::detail_line(
                "Memberships",
                &session.profile.hospitals.len().to_string(),
            ));
        }
        let summary = Paragraph::new(lines)
            .block(widgets::panel("Session"))
            .wrap(Wrap { trim: true });
        frame.render_widget(summary, content[1]);

        frame.render_widget(
            widgets::help("↑↓: Navigate | Enter: Open | r: Reload permissions | Esc: Logout | Ctrl+Q: Quit"),
            main_layout[3],
        );

        if let Some(dialog) = &self.logout_dialog {
            dialog.render(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockTransport;
    use crate::context::testing::{signed_in, super_admin};
    use crossterm::event::KeyModifiers;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use serde_json::json;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn entries_without_permission_cannot_be_opened() {
        let mock = MockTransport::new();
        let mut ctx = signed_in(
            &mock,
            json!({ "permissions": [{ "resource": "staff", "actions": ["view"] }] }),
        );
        let mut home = Home::new();

        // Hospital details: no grant.
        assert_eq!(home.handle_input(key(KeyCode::Enter), &mut ctx).unwrap(), None);

        home.handle_input(key(KeyCode::Down), &mut ctx).unwrap();
        assert_eq!(
            home.handle_input(key(KeyCode::Enter), &mut ctx).unwrap(),
            Some(SelectedApp::Hospital(HospitalTab::Staff))
        );
    }

    #[test]
    fn settings_is_always_available() {
        let mock = MockTransport::new();
        let mut ctx = signed_in(&mock, json!({ "permissions": [] }));
        let mut home = Home::new();
        home.handle_input(key(KeyCode::Up), &mut ctx).unwrap();
        assert_eq!(
            home.handle_input(key(KeyCode::Enter), &mut ctx).unwrap(),
            Some(SelectedApp::Settings)
        );
    }

    #[test]
    fn logout_requires_confirmation() {
        let mock = MockTransport::new();
        let mut ctx = super_admin(&mock);
        let mut home = Home::new();
        assert_eq!(home.handle_input(key(KeyCode::Esc), &mut ctx).unwrap(), None);
        assert_eq!(home.handle_input(key(KeyCode::Esc), &mut ctx).unwrap(), None);
        home.handle_input(key(KeyCode::Esc), &mut ctx).unwrap();
        assert_eq!(
            home.handle_input(key(KeyCode::Char('y')), &mut ctx).unwrap(),
            Some(SelectedApp::Logout)
        );
    }

    #[test]
    fn renders_user_and_hospital() {
        let mock = MockTransport::new();
        let ctx = super_admin(&mock);
        let home = Home::new();
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| home.render(frame, &ctx)).unwrap();

        let text: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(text.contains("Amara Diallo"));
        assert!(text.contains("St. Mary"));
    }
}
