//! Staff tab: list, search, add/edit with doctor assignment, activation,
//! deletion and password resets.

use crate::api::batch::join2;
use crate::api::ApiError;
use crate::app::SelectedApp;
use crate::components::hospital::TabPage;
use crate::components::widgets::{self, ConfirmDialog};
use crate::context::AppContext;
use crate::forms::{edit_text, optional, FormState, StatusBanner};
use crate::models::{DoctorCompliance, StaffMember, StaffPayload};
use crate::rbac::resources::STAFF;
use crate::tui::Frame;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{prelude::*, widgets::*};
use tracing::{info, warn};

const TEXT_FIELDS: [&str; 5] = ["First name", "Last name", "Title", "Email", "Phone"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormItem {
    Text(usize),
    AssignAll,
    Doctor(usize),
    Save,
    Cancel,
}

/// Add/edit form for a staff member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffForm {
    /// `None` when creating.
    editing_id: Option<String>,
    values: [String; 5],
    /// Works with every doctor, current and future.
    assign_all: bool,
    selected_doctors: Vec<String>,
    focus: usize,
}

impl Default for StaffForm {
    fn default() -> Self {
        Self::new()
    }
}

impl StaffForm {
    pub fn new() -> Self {
        Self {
            editing_id: None,
            values: Default::default(),
            assign_all: true,
            selected_doctors: Vec::new(),
            focus: 0,
        }
    }

    pub fn from_member(member: &StaffMember) -> Self {
        Self {
            editing_id: Some(member.id.clone()),
            values: [
                member.first_name.clone(),
                member.last_name.clone(),
                member.title.clone().unwrap_or_default(),
                member.email.clone(),
                member.phone.clone().unwrap_or_default(),
            ],
            assign_all: member.assigned_doctor_ids.is_none(),
            selected_doctors: member.assigned_doctor_ids.clone().unwrap_or_default(),
            focus: 0,
        }
    }

    pub fn set_assign_all(&mut self, assign_all: bool) {
        self.assign_all = assign_all;
    }

    pub fn toggle_doctor(&mut self, user_id: &str) {
        if let Some(pos) = self.selected_doctors.iter().position(|id| id == user_id) {
            self.selected_doctors.remove(pos);
        } else {
            self.selected_doctors.push(user_id.to_string());
        }
    }

    pub fn is_selected(&self, user_id: &str) -> bool {
        self.selected_doctors.iter().any(|id| id == user_id)
    }

    pub fn validate(&self) -> Option<&'static str> {
        if self.values[0].trim().is_empty() || self.values[1].trim().is_empty() {
            return Some("First and last name are required");
        }
        let email = self.values[3].trim();
        if email.is_empty() || !email.contains('@') {
            return Some("A valid email is required");
        }
        None
    }

    /// Request body. Selected doctors are sent in the order of `doctors`,
    /// followed by any selected ids missing from it; "assign all" is sent
    /// as `null`.
    pub fn to_payload(&self, doctors: &[DoctorCompliance]) -> StaffPayload {
        let assigned_doctor_ids = if self.assign_all {
            None
        } else {
            let listed = |id: &str| doctors.iter().any(|doctor| doctor.user_id == id);
            let mut ids: Vec<String> = doctors
                .iter()
                .filter(|doctor| self.is_selected(&doctor.user_id))
                .map(|doctor| doctor.user_id.clone())
                .collect();
            // Unlisted ids (doctor list failed to load, or a doctor left the
            // roster) must survive an edit.
            ids.extend(
                self.selected_doctors
                    .iter()
                    .filter(|id| !listed(id.as_str()))
                    .cloned(),
            );
            Some(ids)
        };
        StaffPayload {
            first_name: self.values[0].trim().to_string(),
            last_name: self.values[1].trim().to_string(),
            title: optional(&self.values[2]),
            email: self.values[3].trim().to_string(),
            phone: optional(&self.values[4]),
            assigned_doctor_ids,
        }
    }

    fn items(&self, doctor_count: usize) -> Vec<FormItem> {
        let mut items: Vec<FormItem> = (0..TEXT_FIELDS.len()).map(FormItem::Text).collect();
        items.push(FormItem::AssignAll);
        if !self.assign_all {
            items.extend((0..doctor_count).map(FormItem::Doctor));
        }
        items.push(FormItem::Save);
        items.push(FormItem::Cancel);
        items
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingAction {
    Delete { id: String, name: String },
    ResetPassword { id: String, name: String },
}

enum StaffView {
    List,
    Form(StaffForm),
}

pub struct StaffPage {
    staff: Vec<StaffMember>,
    doctors: Vec<DoctorCompliance>,
    /// Indices into `staff` matching the search.
    filtered: Vec<usize>,
    search: String,
    is_searching: bool,
    table: TableState,
    view: StaffView,
    dialog: Option<(ConfirmDialog, PendingAction)>,
    submit: FormState,
    banner: StatusBanner,
    form_banner: StatusBanner,
}

impl StaffPage {
    pub fn mount(ctx: &AppContext) -> Self {
        let mut page = Self {
            staff: Vec::new(),
            doctors: Vec::new(),
            filtered: Vec::new(),
            search: String::new(),
            is_searching: false,
            table: TableState::default(),
            view: StaffView::List,
            dialog: None,
            submit: FormState::default(),
            banner: StatusBanner::new(),
            form_banner: StatusBanner::new(),
        };
        page.reload(ctx);
        page
    }

    fn reload(&mut self, ctx: &AppContext) {
        let api = &ctx.api;
        let (staff, doctors) = join2(|| api.staff(), || api.doctor_compliance());
        match staff {
            Ok(staff) => self.staff = staff,
            Err(err) => {
                warn!(error = %err, "could not load staff");
                self.banner.error(err.user_message());
            }
        }
        match doctors {
            Ok(doctors) => self.doctors = doctors,
            Err(err) => {
                // Without the doctor list only "assign all" is offered.
                warn!(error = %err, "could not load doctors for assignment");
                self.doctors.clear();
            }
        }
        self.apply_filter();
    }

    fn apply_filter(&mut self) {
        let query = self.search.to_lowercase();
        self.filtered = self
            .staff
            .iter()
            .enumerate()
            .filter(|(_, member)| {
                query.is_empty()
                    || member.full_name().to_lowercase().contains(&query)
                    || member.email.to_lowercase().contains(&query)
                    || member
                        .title
                        .as_deref()
                        .is_some_and(|title| title.to_lowercase().contains(&query))
            })
            .map(|(idx, _)| idx)
            .collect();
        widgets::clamp_selection(&mut self.table, self.filtered.len());
    }

    fn selected(&self) -> Option<&StaffMember> {
        let idx = *self.filtered.get(self.table.selected()?)?;
        self.staff.get(idx)
    }

    fn assigned_label(&self, member: &StaffMember) -> String {
        match &member.assigned_doctor_ids {
            None => "All".to_string(),
            Some(ids) => ids.len().to_string(),
        }
    }

    fn toggle_active(&mut self, ctx: &AppContext) {
        let Some(member) = self.selected() else {
            return;
        };
        let (id, activate) = (member.id.clone(), !member.is_active);
        match ctx.api.set_staff_active(&id, activate) {
            Ok(updated) => {
                info!(staff = %id, active = activate, "staff status changed");
                let verb = if updated.is_active { "activated" } else { "deactivated" };
                self.banner.success(format!("{} {verb}", updated.full_name()));
                if let Some(slot) = self.staff.iter_mut().find(|m| m.id == id) {
                    *slot = updated;
                }
                self.apply_filter();
            }
            Err(err) => {
                warn!(staff = %id, error = %err, "staff status change failed");
                self.banner.error(err.user_message());
            }
        }
    }

    fn run_pending(&mut self, action: PendingAction, ctx: &AppContext) {
        match action {
            PendingAction::Delete { id, name } => match ctx.api.delete_staff(&id) {
                Ok(()) => {
                    info!(staff = %id, "staff member deleted");
                    self.staff.retain(|member| member.id != id);
                    self.apply_filter();
                    self.banner.success(format!("{name} deleted"));
                }
                Err(err) => {
                    warn!(staff = %id, error = %err, "staff delete failed");
                    self.banner.error(err.user_message());
                }
            },
            PendingAction::ResetPassword { id, name } => {
                match ctx.api.reset_staff_password(&id) {
                    Ok(result) => {
                        info!(staff = %id, "staff password reset");
                        self.banner.success(
                            result
                                .message
                                .unwrap_or_else(|| format!("Password reset sent to {name}")),
                        );
                    }
                    Err(err) => {
                        warn!(staff = %id, error = %err, "password reset failed");
                        self.banner.error(err.user_message());
                    }
                }
            }
        }
    }

    fn save(&mut self, ctx: &AppContext) {
        let StaffView::Form(form) = &self.view else {
            return;
        };
        if let Some(problem) = form.validate() {
            self.form_banner.error(problem);
            return;
        }
        if !self.submit.begin() {
            return;
        }

        let payload = form.to_payload(&self.doctors);
        let result = match &form.editing_id {
            Some(id) => ctx.api.update_staff(id, &payload),
            None => ctx.api.create_staff(&payload),
        };
        let created = form.editing_id.is_none();
        self.submit.finish(&result, ApiError::user_message);

        match result {
            Ok(member) => {
                info!(staff = %member.id, created, "staff member saved");
                let verb = if created { "added" } else { "updated" };
                self.view = StaffView::List;
                self.form_banner.clear();
                self.reload(ctx);
                self.banner.success(format!("{} {verb}", member.full_name()));
            }
            Err(err) => {
                warn!(error = %err, "staff save failed");
                self.form_banner.error(err.user_message());
            }
        }
    }

    fn handle_list_key(&mut self, key: KeyEvent, ctx: &AppContext) -> Option<SelectedApp> {
        if self.is_searching {
            match key.code {
                KeyCode::Enter | KeyCode::Esc | KeyCode::Down | KeyCode::Tab => {
                    self.is_searching = false
                }
                code => {
                    if edit_text(&mut self.search, code) {
                        self.apply_filter();
                    }
                }
            }
            return None;
        }

        match key.code {
            KeyCode::Char('/') => self.is_searching = true,
            KeyCode::Down => widgets::wrap_selection(&mut self.table, self.filtered.len(), true),
            KeyCode::Up => widgets::wrap_selection(&mut self.table, self.filtered.len(), false),
            KeyCode::Char('a') if ctx.rbac.can_add(STAFF) => {
                self.form_banner.clear();
                self.submit.reset();
                self.view = StaffView::Form(StaffForm::new());
            }
            KeyCode::Enter | KeyCode::Char('e') if ctx.rbac.can_edit(STAFF) => {
                if let Some(member) = self.selected() {
                    let form = StaffForm::from_member(member);
                    self.form_banner.clear();
                    self.submit.reset();
                    self.view = StaffView::Form(form);
                }
            }
            KeyCode::Char('t') if ctx.rbac.can_edit(STAFF) => self.toggle_active(ctx),
            KeyCode::Char('x') | KeyCode::Delete if ctx.rbac.can_delete(STAFF) => {
                if let Some(member) = self.selected() {
                    let name = member.full_name();
                    self.dialog = Some((
                        ConfirmDialog::new("Delete staff", format!("Delete {name}? This cannot be undone.")),
                        PendingAction::Delete {
                            id: member.id.clone(),
                            name,
                        },
                    ));
                }
            }
            KeyCode::Char('p') if ctx.rbac.can_edit(STAFF) => {
                if let Some(member) = self.selected() {
                    let name = member.full_name();
                    self.dialog = Some((
                        ConfirmDialog::new("Reset password", format!("Send a password reset to {name}?")),
                        PendingAction::ResetPassword {
                            id: member.id.clone(),
                            name,
                        },
                    ));
                }
            }
            KeyCode::Char('r') => self.reload(ctx),
            KeyCode::Esc => return Some(SelectedApp::None),
            _ => {}
        }
        None
    }

    fn handle_form_key(&mut self, key: KeyEvent, ctx: &AppContext) {
        let doctor_count = self.doctors.len();
        let StaffView::Form(form) = &mut self.view else {
            return;
        };
        let items = form.items(doctor_count);
        let focused = items[form.focus.min(items.len() - 1)];

        match (key.code, focused) {
            (KeyCode::Esc, _) | (KeyCode::Enter, FormItem::Cancel) => {
                self.view = StaffView::List;
                self.form_banner.clear();
            }
            (KeyCode::Enter, FormItem::Save) => self.save(ctx),
            (KeyCode::Tab | KeyCode::Down, _) | (KeyCode::Enter, FormItem::Text(_)) => {
                form.focus = (form.focus + 1) % items.len();
            }
            (KeyCode::BackTab | KeyCode::Up, _) => {
                form.focus = (form.focus + items.len() - 1) % items.len();
            }
            (KeyCode::Char(' ') | KeyCode::Enter, FormItem::AssignAll) => {
                form.set_assign_all(!form.assign_all);
            }
            (KeyCode::Char(' ') | KeyCode::Enter, FormItem::Doctor(i)) => {
                if let Some(doctor) = self.doctors.get(i) {
                    form.toggle_doctor(&doctor.user_id);
                }
            }
            (code, FormItem::Text(i)) => {
                if edit_text(&mut form.values[i], code) {
                    self.form_banner.clear();
                }
            }
            _ => {}
        }
    }

    fn render_list(&self, frame: &mut Frame, area: Rect, ctx: &AppContext) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(5),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(area);

        let search_label = if self.is_searching {
            "Search (typing, Enter to finish)"
        } else {
            "Search (/)"
        };
        frame.render_widget(
            widgets::input_field(search_label, &self.search, self.is_searching, false),
            layout[0],
        );

        if self.filtered.is_empty() {
            let message = if self.staff.is_empty() {
                "No staff members yet."
            } else {
                "No staff members match the search."
            };
            frame.render_widget(
                Paragraph::new(message)
                    .style(Style::default().fg(widgets::MUTED))
                    .alignment(Alignment::Center)
                    .block(widgets::panel("Staff")),
                layout[1],
            );
        } else {
            let rows: Vec<Row> = self
                .filtered
                .iter()
                .filter_map(|idx| self.staff.get(*idx))
                .map(|member| {
                    let (status, color) = if member.is_active {
                        ("Active", widgets::SUCCESS)
                    } else {
                        ("Inactive", widgets::MUTED)
                    };
                    Row::new(vec![
                        Cell::from(member.full_name()),
                        Cell::from(member.title.clone().unwrap_or_default()),
                        Cell::from(member.email.clone()),
                        Cell::from(member.phone.clone().unwrap_or_default()),
                        Cell::from(status).style(Style::default().fg(color)),
                        Cell::from(self.assigned_label(member)),
                    ])
                    .style(Style::default().fg(widgets::TEXT))
                })
                .collect();
            let table = Table::new(
                rows,
                [
                    Constraint::Percentage(22),
                    Constraint::Percentage(15),
                    Constraint::Percentage(28),
                    Constraint::Percentage(15),
                    Constraint::Percentage(10),
                    Constraint::Percentage(10),
                ],
            )
            .header(widgets::table_header(&[
                "Name", "Title", "Email", "Phone", "Status", "Doctors",
            ]))
            .block(widgets::panel("Staff"))
            .row_highlight_style(widgets::selected_row_style())
            .highlight_symbol("► ");
            frame.render_stateful_widget(table, layout[1], &mut self.table.clone());
        }

        frame.render_widget(widgets::status_line(&self.banner), layout[2]);

        let mut help = vec!["↑↓: Select", "/: Search"];
        if ctx.rbac.can_add(STAFF) {
            help.push("a: Add");
        }
        if ctx.rbac.can_edit(STAFF) {
            help.extend(["e: Edit", "t: (De)activate", "p: Reset password"]);
        }
        if ctx.rbac.can_delete(STAFF) {
            help.push("x: Delete");
        }
        help.extend(["r: Reload", "Esc: Back"]);
        frame.render_widget(widgets::help(&help.join(" | ")), layout[3]);
    }

    fn render_form(&self, frame: &mut Frame, area: Rect, form: &StaffForm) {
        let title = if form.editing_id.is_some() {
            "Edit staff member"
        } else {
            "Add staff member"
        };
        let block = widgets::panel(title);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(5), Constraint::Length(1), Constraint::Length(1)])
            .split(inner);
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .spacing(2)
            .split(layout[0]);

        let items = form.items(self.doctors.len());
        let focused = items.get(form.focus).copied();

        let mut left = vec![Constraint::Length(3); TEXT_FIELDS.len()];
        left.push(Constraint::Length(1));
        left.push(Constraint::Length(1));
        left.push(Constraint::Min(0));
        let left = Layout::default()
            .direction(Direction::Vertical)
            .constraints(left)
            .split(columns[0]);
        for (i, label) in TEXT_FIELDS.iter().enumerate() {
            frame.render_widget(
                widgets::input_field(label, &form.values[i], focused == Some(FormItem::Text(i)), false),
                left[i],
            );
        }
        let buttons = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(left[TEXT_FIELDS.len() + 1]);
        let save_label = if self.submit.is_submitting() { "Saving…" } else { "Save" };
        frame.render_widget(widgets::button(save_label, focused == Some(FormItem::Save)), buttons[0]);
        frame.render_widget(widgets::button("Cancel", focused == Some(FormItem::Cancel)), buttons[1]);

        let all_mark = if form.assign_all { "[x]" } else { "[ ]" };
        let all_color = if focused == Some(FormItem::AssignAll) {
            widgets::FOCUS
        } else {
            widgets::TEXT
        };
        let mut lines = vec![Line::from(Span::styled(
            format!("{all_mark} Assign all doctors"),
            Style::default().fg(all_color),
        ))];
        if !form.assign_all {
            if self.doctors.is_empty() {
                lines.push(Line::from(Span::styled(
                    "No doctors available",
                    Style::default().fg(widgets::MUTED),
                )));
            }
            for (i, doctor) in self.doctors.iter().enumerate() {
                let mark = if form.is_selected(&doctor.user_id) { "[x]" } else { "[ ]" };
                let color = if focused == Some(FormItem::Doctor(i)) {
                    widgets::FOCUS
                } else {
                    widgets::TEXT
                };
                lines.push(Line::from(Span::styled(
                    format!("  {mark} {}", doctor.full_name()),
                    Style::default().fg(color),
                )));
            }
        }
        frame.render_widget(
            Paragraph::new(lines).block(widgets::panel("Doctor assignment")),
            columns[1],
        );

        frame.render_widget(widgets::status_line(&self.form_banner), layout[1]);
        frame.render_widget(
            widgets::help("Tab/↑↓: Move | Space: Toggle | Enter: Activate | Esc: Cancel"),
            layout[2],
        );
    }
}

impl TabPage for StaffPage {
    fn handle_input(&mut self, key: KeyEvent, ctx: &mut AppContext) -> Result<Option<SelectedApp>> {
        if let Some((dialog, _)) = &mut self.dialog {
            match dialog.handle_key(key) {
                Some(true) => {
                    if let Some((_, action)) = self.dialog.take() {
                        self.run_pending(action, ctx);
                    }
                }
                Some(false) => self.dialog = None,
                None => {}
            }
            return Ok(None);
        }

        match self.view {
            StaffView::List => Ok(self.handle_list_key(key, ctx)),
            StaffView::Form(_) => {
                self.handle_form_key(key, ctx);
                Ok(None)
            }
        }
    }

    fn render(&self, frame: &mut Frame, area: Rect, ctx: &AppContext) {
        match &self.view {
            StaffView::List => self.render_list(frame, area, ctx),
            StaffView::Form(form) => self.render_form(frame, area, form),
        }
        if let Some((dialog, _)) = &self.dialog {
            dialog.render(frame);
        }
    }

    fn tick(&mut self) {
        self.banner.check_timeout();
        self.form_banner.check_timeout();
    }

    fn is_capturing(&self) -> bool {
        self.is_searching || self.dialog.is_some() || matches!(self.view, StaffView::Form(_))
    }
}
