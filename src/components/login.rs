//! Sign-in screen.
//!
//! The API issues bearer tokens out of band, so signing in means pasting a
//! token. It is verified against `GET /v1/me` before the session starts.

use crate::app::SelectedApp;
use crate::components::widgets::{self, ConfirmDialog};
use crate::components::Component;
use crate::context::AppContext;
use crate::forms::{edit_text, optional, StatusBanner};
use crate::tui::Frame;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{prelude::*, widgets::Paragraph};
use tracing::{info, warn};

const FIELD_TOKEN: usize = 0;
const FIELD_HOSPITAL: usize = 1;
const FIELD_SIGN_IN: usize = 2;
const FIELD_EXIT: usize = 3;
const FIELD_COUNT: usize = 4;

#[derive(Debug, Default)]
pub struct Login {
    pub token: String,
    /// Optional tenant to open instead of the account default.
    pub hospital_id: String,
    selected_index: usize,
    banner: StatusBanner,
    exit_dialog: Option<ConfirmDialog>,
}

impl Login {
    pub fn new() -> Self {
        Self::default()
    }

    fn submit(&mut self, ctx: &mut AppContext) -> Option<SelectedApp> {
        let token = self.token.trim().to_string();
        if token.is_empty() {
            self.banner.error("Token cannot be empty.");
            return None;
        }

        let hospital_id = optional(&self.hospital_id);
        match ctx.login(&token, hospital_id.as_deref()) {
            Ok(()) => {
                info!("signed in");
                self.token.clear();
                self.banner.clear();
                Some(SelectedApp::None)
            }
            Err(err) => {
                warn!(error = %err, "sign in failed");
                if err.is_unauthorized() {
                    self.banner.error("Token was rejected by the server.");
                } else {
                    self.banner.error(err.user_message());
                }
                None
            }
        }
    }
}

impl Component for Login {
    fn handle_input(&mut self, event: KeyEvent, ctx: &mut AppContext) -> Result<Option<SelectedApp>> {
        if let Some(dialog) = &mut self.exit_dialog {
            match dialog.handle_key(event) {
                Some(true) => return Ok(Some(SelectedApp::Quit)),
                Some(false) => self.exit_dialog = None,
                None => {}
            }
            return Ok(None);
        }

        match event.code {
            KeyCode::Tab | KeyCode::Down => {
                self.selected_index = (self.selected_index + 1) % FIELD_COUNT;
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.selected_index = (self.selected_index + FIELD_COUNT - 1) % FIELD_COUNT;
            }
            KeyCode::Enter => match self.selected_index {
                FIELD_EXIT => {
                    self.exit_dialog = Some(ConfirmDialog::new(
                        "Confirm Exit",
                        "Are you sure you want to quit?",
                    ))
                }
                _ => return Ok(self.submit(ctx)),
            },
            KeyCode::Esc => {
                self.exit_dialog = Some(ConfirmDialog::new(
                    "Confirm Exit",
                    "Are you sure you want to quit?",
                ));
            }
            code => {
                let changed = match self.selected_index {
                    FIELD_TOKEN => edit_text(&mut self.token, code),
                    FIELD_HOSPITAL => edit_text(&mut self.hospital_id, code),
                    _ => false,
                };
                if changed {
                    self.banner.clear();
                }
            }
        }
        Ok(None)
    }

    fn render(&self, frame: &mut Frame, ctx: &AppContext) {
        let area = widgets::background(frame);
        let form = widgets::centered_rect(60, 80, area);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Title
                Constraint::Length(1), // Server
                Constraint::Length(1), // Spacing
                Constraint::Length(3), // Token
                Constraint::Length(3), // Hospital
                Constraint::Length(1), // Spacing
                Constraint::Length(1), // Sign in
                Constraint::Length(1), // Exit
                Constraint::Length(2), // Status
                Constraint::Min(0),
                Constraint::Length(1), // Help
            ])
            .split(form);

        widgets::header(frame, layout[0], "Hospital Administration");

        let server = Paragraph::new(format!("Server: {}", ctx.api.base_url()))
            .style(Style::default().fg(widgets::MUTED))
            .alignment(Alignment::Center);
        frame.render_widget(server, layout[1]);

        frame.render_widget(
            widgets::input_field(
                "Access token",
                &"•".repeat(self.token.chars().count()),
                self.selected_index == FIELD_TOKEN,
                false,
            ),
            layout[3],
        );
        frame.render_widget(
            widgets::input_field(
                "Hospital id (optional)",
                &self.hospital_id,
                self.selected_index == FIELD_HOSPITAL,
                false,
            ),
            layout[4],
        );
        frame.render_widget(
            widgets::button("Sign in", self.selected_index == FIELD_SIGN_IN),
            layout[6],
        );
        frame.render_widget(
            widgets::button("Exit", self.selected_index == FIELD_EXIT),
            layout[7],
        );
        frame.render_widget(widgets::status_line(&self.banner), layout[8]);
        frame.render_widget(
            widgets::help("Tab/↑↓: Move | Enter: Sign in | Esc: Exit"),
            layout[10],
        );

        if let Some(dialog) = &self.exit_dialog {
            dialog.render(frame);
        }
    }

    fn tick(&mut self) {
        self.banner.check_timeout();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockTransport;
    use crate::api::{ApiClient, Method};
    use crossterm::event::KeyModifiers;
    use serde_json::json;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(login: &mut Login, ctx: &mut AppContext, text: &str) {
        for c in text.chars() {
            login.handle_input(key(KeyCode::Char(c)), ctx).unwrap();
        }
    }

    fn signed_out(mock: &MockTransport) -> AppContext {
        AppContext::new(ApiClient::new("http://api.test", Box::new(mock.clone())), None)
    }

    #[test]
    fn empty_token_is_rejected_locally() {
        let mock = MockTransport::new();
        let mut ctx = signed_out(&mock);
        let mut login = Login::new();
        assert_eq!(login.handle_input(key(KeyCode::Enter), &mut ctx).unwrap(), None);
        assert!(login.banner.is_error());
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn valid_token_signs_in_with_requested_hospital() {
        let mock = MockTransport::new();
        mock.respond(
            Method::Get,
            "/v1/me",
            200,
            json!({
                "id": "u1",
                "email": "a@x.org",
                "hospitalId": "h1",
                "hospitals": [{ "id": "h1", "name": "St. Mary" }, { "id": "h2", "name": "Lakeside" }]
            }),
        );
        mock.respond(Method::Get, "/v1/rbac/my-permissions", 200, json!({ "permissions": [] }));
        let mut ctx = signed_out(&mock);
        let mut login = Login::new();

        type_text(&mut login, &mut ctx, "tok");
        login.handle_input(key(KeyCode::Tab), &mut ctx).unwrap();
        type_text(&mut login, &mut ctx, "h2");

        let next = login.handle_input(key(KeyCode::Enter), &mut ctx).unwrap();
        assert_eq!(next, Some(SelectedApp::None));
        assert_eq!(ctx.hospital_id(), Some("h2"));
        assert!(login.token.is_empty());
    }

    #[test]
    fn rejected_token_shows_error() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v1/me", 401, json!({ "message": "Unauthorized" }));
        let mut ctx = signed_out(&mock);
        let mut login = Login::new();
        type_text(&mut login, &mut ctx, "bad");

        assert_eq!(login.handle_input(key(KeyCode::Enter), &mut ctx).unwrap(), None);
        assert_eq!(
            login.banner.current().map(|(_, m)| m),
            Some("Token was rejected by the server.")
        );
        assert!(ctx.session.is_none());
    }

    #[test]
    fn escape_asks_before_quitting() {
        let mock = MockTransport::new();
        let mut ctx = signed_out(&mock);
        let mut login = Login::new();
        assert_eq!(login.handle_input(key(KeyCode::Esc), &mut ctx).unwrap(), None);
        assert_eq!(
            login.handle_input(key(KeyCode::Char('y')), &mut ctx).unwrap(),
            Some(SelectedApp::Quit)
        );
    }
}
