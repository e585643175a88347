//! Account settings: the signed-in user's profile, the hospitals they can
//! switch between and the permissions they hold in the active one.

use crate::api::ApiError;
use crate::app::SelectedApp;
use crate::components::widgets;
use crate::components::Component;
use crate::context::AppContext;
use crate::forms::{edit_text, optional, FormState, Snapshot, StatusBanner};
use crate::models::{ProfileUpdate, UserProfile};
use crate::rbac::PermissionState;
use crate::tui::Frame;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    prelude::*,
    widgets::{List, ListItem, ListState, Paragraph},
};
use tracing::{info, warn};

const PROFILE_FIELDS: [&str; 4] = ["First name", "Last name", "Phone", "Job title"];
const SAVE: usize = PROFILE_FIELDS.len();
const CANCEL: usize = SAVE + 1;
const PROFILE_ITEMS: usize = CANCEL + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Profile,
    Hospitals,
    Permissions,
}

impl Section {
    fn next(self) -> Self {
        match self {
            Section::Profile => Section::Hospitals,
            Section::Hospitals => Section::Permissions,
            Section::Permissions => Section::Profile,
        }
    }
}

fn profile_values(profile: &UserProfile) -> [String; 4] {
    [
        profile.first_name.clone(),
        profile.last_name.clone(),
        profile.phone.clone().unwrap_or_default(),
        profile.title.clone().unwrap_or_default(),
    ]
}

pub struct Settings {
    section: Section,
    profile: Snapshot<[String; 4]>,
    editing: bool,
    focus: usize,
    hospitals: ListState,
    submit: FormState,
    banner: StatusBanner,
}

impl Settings {
    pub fn new(ctx: &AppContext) -> Self {
        let values = ctx
            .session
            .as_ref()
            .map(|session| profile_values(&session.profile))
            .unwrap_or_default();
        let current = ctx.session.as_ref().and_then(|session| {
            let active = session.hospital_id.as_deref()?;
            session
                .profile
                .hospitals
                .iter()
                .position(|membership| membership.id == active)
        });
        let mut hospitals = ListState::default();
        hospitals.select(current.or(Some(0)));

        Self {
            section: Section::Profile,
            profile: Snapshot::new(values),
            editing: false,
            focus: 0,
            hospitals,
            submit: FormState::default(),
            banner: StatusBanner::new(),
        }
    }

    fn cancel_edit(&mut self) {
        self.profile.revert();
        self.editing = false;
        self.focus = 0;
    }

    fn save_profile(&mut self, ctx: &mut AppContext) {
        if !self.profile.is_dirty() {
            self.editing = false;
            self.banner.success("No changes to save");
            return;
        }
        let values = &self.profile.current;
        if values[0].trim().is_empty() || values[1].trim().is_empty() {
            self.banner.error("First and last name are required");
            return;
        }
        if !self.submit.begin() {
            return;
        }

        let update = ProfileUpdate {
            first_name: values[0].trim().to_string(),
            last_name: values[1].trim().to_string(),
            phone: optional(&values[2]),
            title: optional(&values[3]),
        };
        let result = ctx.api.update_me(&update);
        self.submit.finish(&result, ApiError::user_message);

        match result {
            Ok(mut profile) => {
                info!(user = %profile.id, "profile updated");
                if let Some(session) = ctx.session.as_mut() {
                    // The update response may omit memberships.
                    if profile.hospitals.is_empty() {
                        profile.hospitals = std::mem::take(&mut session.profile.hospitals);
                    }
                    session.profile = profile.clone();
                }
                self.profile.commit(profile_values(&profile));
                self.editing = false;
                self.focus = 0;
                self.banner.success("Profile saved");
            }
            Err(err) => {
                warn!(error = %err, "profile update failed");
                self.banner.error(err.user_message());
            }
        }
    }

    fn switch_hospital(&mut self, ctx: &mut AppContext) {
        let Some(membership) = ctx
            .session
            .as_ref()
            .zip(self.hospitals.selected())
            .and_then(|(session, i)| session.profile.hospitals.get(i))
            .cloned()
        else {
            return;
        };
        if ctx.hospital_id() == Some(membership.id.as_str()) {
            return;
        }

        ctx.switch_hospital(&membership.id);
        match ctx.rbac.error() {
            Some(message) => {
                let message = format!("Switched to {}, but permissions failed: {message}", membership.name);
                self.banner.error(message);
            }
            None => self.banner.success(format!("Now working in {}", membership.name)),
        }
    }

    fn handle_edit_key(&mut self, key: KeyEvent, ctx: &mut AppContext) {
        let save_shortcut =
            key.code == KeyCode::Char('s') && key.modifiers.contains(KeyModifiers::CONTROL);
        match (key.code, self.focus) {
            _ if save_shortcut => self.save_profile(ctx),
            (KeyCode::Esc, _) | (KeyCode::Enter, CANCEL) => self.cancel_edit(),
            (KeyCode::Enter, SAVE) => self.save_profile(ctx),
            (KeyCode::Tab | KeyCode::Down | KeyCode::Enter, _) => {
                self.focus = (self.focus + 1) % PROFILE_ITEMS;
            }
            (KeyCode::BackTab | KeyCode::Up, _) => {
                self.focus = (self.focus + PROFILE_ITEMS - 1) % PROFILE_ITEMS;
            }
            (code, field) if field < PROFILE_FIELDS.len() => {
                if edit_text(&mut self.profile.current[field], code) {
                    self.banner.clear();
                }
            }
            _ => {}
        }
    }

    fn render_profile(&self, frame: &mut Frame, area: Rect) {
        let mut block = widgets::panel("Profile");
        if self.section == Section::Profile {
            block = block.border_style(Style::default().fg(widgets::FOCUS));
        }
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let mut constraints = vec![Constraint::Length(3); PROFILE_FIELDS.len()];
        constraints.extend([Constraint::Length(1), Constraint::Length(1), Constraint::Min(0)]);
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(inner);

        for (i, label) in PROFILE_FIELDS.iter().enumerate() {
            frame.render_widget(
                widgets::input_field(
                    label,
                    &self.profile.current[i],
                    self.editing && self.focus == i,
                    !self.editing,
                ),
                layout[i],
            );
        }
        if self.editing {
            let save_label = if self.submit.is_submitting() { "Saving…" } else { "Save" };
            frame.render_widget(widgets::button(save_label, self.focus == SAVE), layout[SAVE]);
            frame.render_widget(widgets::button("Cancel", self.focus == CANCEL), layout[CANCEL]);
        }
    }

    fn render_hospitals(&self, frame: &mut Frame, area: Rect, ctx: &AppContext) {
        let active = ctx.hospital_id();
        let items: Vec<ListItem> = ctx
            .session
            .iter()
            .flat_map(|session| session.profile.hospitals.iter())
            .map(|membership| {
                let is_active = active == Some(membership.id.as_str());
                let marker = if is_active { "● " } else { "  " };
                let color = if is_active { widgets::SUCCESS } else { widgets::TEXT };
                ListItem::new(format!("{marker}{}", membership.name))
                    .style(Style::default().fg(color))
            })
            .collect();

        let mut block = widgets::panel("Hospitals");
        if self.section == Section::Hospitals {
            block = block.border_style(Style::default().fg(widgets::FOCUS));
        }
        if items.is_empty() {
            frame.render_widget(
                Paragraph::new("No hospital memberships.")
                    .style(Style::default().fg(widgets::MUTED))
                    .block(block),
                area,
            );
            return;
        }
        let list = List::new(items)
            .block(block)
            .highlight_style(widgets::selected_row_style())
            .highlight_symbol("► ");
        frame.render_stateful_widget(list, area, &mut self.hospitals.clone());
    }

    fn render_permissions(&self, frame: &mut Frame, area: Rect, ctx: &AppContext) {
        let lines: Vec<Line> = match ctx.rbac.state() {
            PermissionState::Loading => vec![Line::from(Span::styled(
                "Loading permissions…",
                Style::default().fg(widgets::MUTED),
            ))],
            PermissionState::Failed(message) => vec![Line::from(Span::styled(
                format!("Could not load permissions: {message}"),
                Style::default().fg(widgets::ERROR),
            ))],
            PermissionState::Ready(_) => {
                let summary = ctx.rbac.permission_summary();
                if summary.is_empty() {
                    vec![Line::from(Span::styled(
                        "No permissions in this hospital.",
                        Style::default().fg(widgets::MUTED),
                    ))]
                } else {
                    summary
                        .iter()
                        .map(|(resource, actions)| widgets::detail_line(resource, actions))
                        .collect()
                }
            }
        };

        let mut block = widgets::panel("Permissions");
        if self.section == Section::Permissions {
            block = block.border_style(Style::default().fg(widgets::FOCUS));
        }
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }
}

impl Component for Settings {
    fn handle_input(&mut self, event: KeyEvent, ctx: &mut AppContext) -> Result<Option<SelectedApp>> {
        if self.editing {
            self.handle_edit_key(event, ctx);
            return Ok(None);
        }

        match (event.code, self.section) {
            (KeyCode::Tab, _) => self.section = self.section.next(),
            (KeyCode::Char('e') | KeyCode::Enter, Section::Profile) if ctx.session.is_some() => {
                self.submit.reset();
                self.banner.clear();
                self.editing = true;
                self.focus = 0;
            }
            (KeyCode::Down, Section::Hospitals) => {
                let count = ctx
                    .session
                    .as_ref()
                    .map_or(0, |session| session.profile.hospitals.len());
                if count > 0 {
                    let next = self.hospitals.selected().map_or(0, |i| (i + 1) % count);
                    self.hospitals.select(Some(next));
                }
            }
            (KeyCode::Up, Section::Hospitals) => {
                let count = ctx
                    .session
                    .as_ref()
                    .map_or(0, |session| session.profile.hospitals.len());
                if count > 0 {
                    let prev = self
                        .hospitals
                        .selected()
                        .map_or(0, |i| (i + count - 1) % count);
                    self.hospitals.select(Some(prev));
                }
            }
            (KeyCode::Enter, Section::Hospitals) => self.switch_hospital(ctx),
            (KeyCode::Char('r'), _) => {
                ctx.refresh_permissions();
                match ctx.rbac.error() {
                    Some(message) => self.banner.error(message.to_string()),
                    None => self.banner.success("Permissions refreshed"),
                }
            }
            (KeyCode::Esc, _) => return Ok(Some(SelectedApp::None)),
            _ => {}
        }
        Ok(None)
    }

    fn render(&self, frame: &mut Frame, ctx: &AppContext) {
        let area = widgets::background(frame);
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),
                Constraint::Min(10),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(area);
        widgets::header(frame, layout[0], "Settings");

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .spacing(2)
            .split(layout[1]);
        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(columns[1]);

        self.render_profile(frame, columns[0]);
        self.render_hospitals(frame, right[0], ctx);
        self.render_permissions(frame, right[1], ctx);

        frame.render_widget(widgets::status_line(&self.banner), layout[2]);
        let help = if self.editing {
            "Tab/↑↓: Move | Enter: Activate | Ctrl+S: Save | Esc: Cancel"
        } else {
            match self.section {
                Section::Profile => "Tab: Section | e: Edit profile | r: Refresh permissions | Esc: Back",
                Section::Hospitals => "Tab: Section | ↑↓: Select | Enter: Switch hospital | Esc: Back",
                Section::Permissions => "Tab: Section | r: Refresh permissions | Esc: Back",
            }
        };
        frame.render_widget(widgets::help(help), layout[3]);
    }

    fn tick(&mut self) {
        self.banner.check_timeout();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockTransport;
    use crate::api::Method;
    use crate::context::testing::{signed_in, super_admin};
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use serde_json::json;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn press(settings: &mut Settings, ctx: &mut AppContext, code: KeyCode) -> Option<SelectedApp> {
        settings.handle_input(key(code), ctx).unwrap()
    }

    #[test]
    fn profile_save_patches_me_and_updates_session() {
        let mock = MockTransport::new();
        let mut ctx = super_admin(&mock);
        mock.respond(
            Method::Patch,
            "/v1/me",
            200,
            json!({ "id": "u1", "email": "admin@example.org", "firstName": "Amara", "lastName": "Diallo", "title": "COO" }),
        );
        let mut settings = Settings::new(&ctx);

        press(&mut settings, &mut ctx, KeyCode::Char('e'));
        for _ in 0..3 {
            press(&mut settings, &mut ctx, KeyCode::Tab);
        }
        for c in "COO".chars() {
            press(&mut settings, &mut ctx, KeyCode::Char(c));
        }
        settings
            .handle_input(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL), &mut ctx)
            .unwrap();

        let patches = mock.requests_to(Method::Patch, "/v1/me");
        assert_eq!(
            patches[0].body,
            Some(json!({ "firstName": "Amara", "lastName": "Diallo", "phone": null, "title": "COO" }))
        );
        let session = ctx.session.as_ref().unwrap();
        assert_eq!(session.profile.title.as_deref(), Some("COO"));
        assert_eq!(session.profile.hospitals.len(), 2, "memberships survive the update");
        assert!(!settings.editing);
        assert!(!settings.profile.is_dirty());
    }

    #[test]
    fn unchanged_profile_is_not_sent_and_cancel_reverts() {
        let mock = MockTransport::new();
        let mut ctx = super_admin(&mock);
        let mut settings = Settings::new(&ctx);

        press(&mut settings, &mut ctx, KeyCode::Enter);
        settings.focus = SAVE;
        press(&mut settings, &mut ctx, KeyCode::Enter);
        assert!(mock.requests_to(Method::Patch, "/v1/me").is_empty());

        press(&mut settings, &mut ctx, KeyCode::Char('e'));
        press(&mut settings, &mut ctx, KeyCode::Backspace);
        assert_eq!(settings.profile.current[0], "Amar");
        press(&mut settings, &mut ctx, KeyCode::Esc);
        assert_eq!(settings.profile.current[0], "Amara");
        assert!(!settings.editing);
    }

    #[test]
    fn switching_hospital_reloads_permissions() {
        let mock = MockTransport::new();
        let mut ctx = signed_in(&mock, json!({ "permissions": [] }));
        let mut settings = Settings::new(&ctx);

        press(&mut settings, &mut ctx, KeyCode::Tab);
        press(&mut settings, &mut ctx, KeyCode::Enter);
        assert_eq!(
            mock.requests_to(Method::Get, "/v1/rbac/my-permissions").len(),
            1,
            "the active hospital is not switched to again"
        );

        press(&mut settings, &mut ctx, KeyCode::Down);
        press(&mut settings, &mut ctx, KeyCode::Enter);
        assert_eq!(ctx.hospital_id(), Some("h2"));
        assert_eq!(
            mock.requests_to(Method::Get, "/v1/rbac/my-permissions").len(),
            2
        );
        assert!(settings.banner.is_success());
    }

    #[test]
    fn refresh_reports_the_outcome() {
        let mock = MockTransport::new();
        let mut ctx = signed_in(&mock, json!({ "permissions": [] }));
        let mut settings = Settings::new(&ctx);
        // Queued behind the response the sign-in already used.
        mock.respond(Method::Get, "/v1/rbac/my-permissions", 500, json!({ "message": "down" }));

        press(&mut settings, &mut ctx, KeyCode::Char('r'));
        assert!(settings.banner.is_success());

        press(&mut settings, &mut ctx, KeyCode::Char('r'));
        assert!(ctx.rbac.error().is_some());
        assert!(settings.banner.is_error());
        assert_eq!(press(&mut settings, &mut ctx, KeyCode::Esc), Some(SelectedApp::None));
    }

    #[test]
    fn renders_profile_memberships_and_permissions() {
        let mock = MockTransport::new();
        let ctx = signed_in(
            &mock,
            json!({ "permissions": [{ "resource": "staff", "actions": ["view", "edit"] }] }),
        );
        let settings = Settings::new(&ctx);

        let mut terminal = Terminal::new(TestBackend::new(120, 36)).unwrap();
        terminal.draw(|frame| settings.render(frame, &ctx)).unwrap();
        let screen: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(screen.contains("Amara"));
        assert!(screen.contains("Lakeside"));
        assert!(screen.contains("view, edit"));
    }
}
