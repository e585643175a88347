//! Patients tab: searchable list, add/edit form and activation toggle.

use crate::api::ApiError;
use crate::app::SelectedApp;
use crate::components::hospital::TabPage;
use crate::components::widgets;
use crate::context::AppContext;
use crate::forms::{edit_text, optional, FormState, StatusBanner};
use crate::models::{parse_date, Gender, Patient, PatientPayload};
use crate::rbac::resources::PATIENTS;
use crate::tui::Frame;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{prelude::*, widgets::*};
use time::OffsetDateTime;
use tracing::{info, warn};

const TEXT_FIELDS: [&str; 6] = [
    "First name",
    "Last name",
    "Date of birth (YYYY-MM-DD)",
    "Email",
    "Phone",
    "Address",
];

const FIRST: usize = 0;
const LAST: usize = 1;
const DOB: usize = 2;
const EMAIL: usize = 3;
const PHONE: usize = 4;
const ADDRESS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormItem {
    Text(usize),
    Gender,
    Save,
    Cancel,
}

const FORM_ITEMS: [FormItem; 9] = [
    FormItem::Text(FIRST),
    FormItem::Text(LAST),
    FormItem::Text(DOB),
    FormItem::Gender,
    FormItem::Text(EMAIL),
    FormItem::Text(PHONE),
    FormItem::Text(ADDRESS),
    FormItem::Save,
    FormItem::Cancel,
];

fn next_gender(gender: Gender) -> Gender {
    match gender {
        Gender::Male => Gender::Female,
        Gender::Female => Gender::Other,
        Gender::Other => Gender::Male,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientForm {
    /// `None` when registering a new patient.
    editing_id: Option<String>,
    values: [String; 6],
    gender: Gender,
    focus: usize,
}

impl Default for PatientForm {
    fn default() -> Self {
        Self::new()
    }
}

impl PatientForm {
    pub fn new() -> Self {
        Self {
            editing_id: None,
            values: Default::default(),
            gender: Gender::Female,
            focus: 0,
        }
    }

    pub fn from_patient(patient: &Patient) -> Self {
        Self {
            editing_id: Some(patient.id.clone()),
            values: [
                patient.first_name.clone(),
                patient.last_name.clone(),
                patient.date_of_birth.clone(),
                patient.email.clone().unwrap_or_default(),
                patient.phone.clone().unwrap_or_default(),
                patient.address.clone().unwrap_or_default(),
            ],
            gender: patient.gender,
            focus: 0,
        }
    }

    pub fn validate(&self, today: time::Date) -> Option<&'static str> {
        if self.values[FIRST].trim().is_empty() || self.values[LAST].trim().is_empty() {
            return Some("First and last name are required");
        }
        match parse_date(&self.values[DOB]) {
            None => return Some("Date of birth must be YYYY-MM-DD"),
            Some(date) if date > today => return Some("Date of birth is in the future"),
            Some(_) => {}
        }
        let email = self.values[EMAIL].trim();
        if !email.is_empty() && !email.contains('@') {
            return Some("Email address is not valid");
        }
        None
    }

    pub fn to_payload(&self) -> PatientPayload {
        PatientPayload {
            first_name: self.values[FIRST].trim().to_string(),
            last_name: self.values[LAST].trim().to_string(),
            date_of_birth: self.values[DOB].trim().to_string(),
            gender: self.gender,
            email: optional(&self.values[EMAIL]),
            phone: optional(&self.values[PHONE]),
            address: optional(&self.values[ADDRESS]),
        }
    }
}

enum PatientView {
    List,
    Form(PatientForm),
}

pub struct PatientsPage {
    patients: Vec<Patient>,
    /// Indices into `patients` matching the search.
    filtered: Vec<usize>,
    search: String,
    is_searching: bool,
    table: TableState,
    view: PatientView,
    submit: FormState,
    banner: StatusBanner,
    form_banner: StatusBanner,
}

impl PatientsPage {
    pub fn mount(ctx: &AppContext) -> Self {
        let mut page = Self {
            patients: Vec::new(),
            filtered: Vec::new(),
            search: String::new(),
            is_searching: false,
            table: TableState::default(),
            view: PatientView::List,
            submit: FormState::default(),
            banner: StatusBanner::new(),
            form_banner: StatusBanner::new(),
        };
        page.reload(ctx);
        page
    }

    fn reload(&mut self, ctx: &AppContext) {
        match ctx.api.patients() {
            Ok(patients) => self.patients = patients,
            Err(err) => {
                warn!(error = %err, "could not load patients");
                self.banner.error(err.user_message());
            }
        }
        self.apply_filter();
    }

    fn apply_filter(&mut self) {
        let query = self.search.to_lowercase();
        let hit = |value: Option<&str>| value.is_some_and(|v| v.to_lowercase().contains(&query));
        self.filtered = self
            .patients
            .iter()
            .enumerate()
            .filter(|(_, patient)| {
                query.is_empty()
                    || patient.full_name().to_lowercase().contains(&query)
                    || hit(patient.email.as_deref())
                    || hit(patient.phone.as_deref())
            })
            .map(|(idx, _)| idx)
            .collect();
        widgets::clamp_selection(&mut self.table, self.filtered.len());
    }

    fn selected(&self) -> Option<&Patient> {
        let idx = *self.filtered.get(self.table.selected()?)?;
        self.patients.get(idx)
    }

    fn replace(&mut self, updated: Patient) {
        match self.patients.iter_mut().find(|p| p.id == updated.id) {
            Some(slot) => *slot = updated,
            None => self.patients.push(updated),
        }
        self.apply_filter();
    }

    /// Opens the edit form on the latest server copy of the selected patient.
    fn begin_edit(&mut self, ctx: &AppContext) {
        let Some(listed) = self.selected() else {
            return;
        };
        let patient = match ctx.api.patient(&listed.id) {
            Ok(patient) => patient,
            Err(err) => {
                warn!(patient = %listed.id, error = %err, "could not refresh patient, editing listed copy");
                listed.clone()
            }
        };
        self.form_banner.clear();
        self.submit.reset();
        self.view = PatientView::Form(PatientForm::from_patient(&patient));
        self.replace(patient);
    }

    fn toggle_active(&mut self, ctx: &AppContext) {
        let Some(patient) = self.selected() else {
            return;
        };
        let (id, activate) = (patient.id.clone(), !patient.is_active);
        match ctx.api.set_patient_active(&id, activate) {
            Ok(updated) => {
                info!(patient = %id, active = activate, "patient status changed");
                let verb = if updated.is_active { "activated" } else { "deactivated" };
                self.banner.success(format!("{} {verb}", updated.full_name()));
                self.replace(updated);
            }
            Err(err) => {
                warn!(patient = %id, error = %err, "patient status change failed");
                self.banner.error(err.user_message());
            }
        }
    }

    fn save(&mut self, ctx: &AppContext) {
        let PatientView::Form(form) = &self.view else {
            return;
        };
        if let Some(problem) = form.validate(OffsetDateTime::now_utc().date()) {
            self.form_banner.error(problem);
            return;
        }
        if !self.submit.begin() {
            return;
        }

        let payload = form.to_payload();
        let result = match &form.editing_id {
            Some(id) => ctx.api.update_patient(id, &payload),
            None => ctx.api.create_patient(&payload),
        };
        let created = form.editing_id.is_none();
        self.submit.finish(&result, ApiError::user_message);

        match result {
            Ok(patient) => {
                info!(patient = %patient.id, created, "patient saved");
                let verb = if created { "registered" } else { "updated" };
                self.banner.success(format!("{} {verb}", patient.full_name()));
                self.view = PatientView::List;
                self.form_banner.clear();
                self.replace(patient);
            }
            Err(err) => {
                warn!(error = %err, "patient save failed");
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
            KeyCode::Char('a') if ctx.rbac.can_add(PATIENTS) => {
                self.form_banner.clear();
                self.submit.reset();
                self.view = PatientView::Form(PatientForm::new());
            }
            KeyCode::Enter | KeyCode::Char('e') if ctx.rbac.can_edit(PATIENTS) => {
                self.begin_edit(ctx)
            }
            KeyCode::Char('t') if ctx.rbac.can_edit(PATIENTS) => self.toggle_active(ctx),
            KeyCode::Char('r') => self.reload(ctx),
            KeyCode::Esc => return Some(SelectedApp::None),
            _ => {}
        }
        None
    }

    fn handle_form_key(&mut self, key: KeyEvent, ctx: &AppContext) {
        let PatientView::Form(form) = &mut self.view else {
            return;
        };
        let count = FORM_ITEMS.len();
        match (key.code, FORM_ITEMS[form.focus % count]) {
            (KeyCode::Esc, _) | (KeyCode::Enter, FormItem::Cancel) => {
                self.view = PatientView::List;
                self.form_banner.clear();
            }
            (KeyCode::Enter, FormItem::Save) => self.save(ctx),
            (KeyCode::Tab | KeyCode::Down, _) | (KeyCode::Enter, FormItem::Text(_) | FormItem::Gender) => {
                form.focus = (form.focus + 1) % count;
            }
            (KeyCode::BackTab | KeyCode::Up, _) => form.focus = (form.focus + count - 1) % count,
            (KeyCode::Char(' ') | KeyCode::Left | KeyCode::Right, FormItem::Gender) => {
                form.gender = next_gender(form.gender);
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
            let message = if self.patients.is_empty() {
                "No patients registered."
            } else {
                "No patients match the search."
            };
            frame.render_widget(
                Paragraph::new(message)
                    .style(Style::default().fg(widgets::MUTED))
                    .alignment(Alignment::Center)
                    .block(widgets::panel("Patients")),
                layout[1],
            );
        } else {
            let rows: Vec<Row> = self
                .filtered
                .iter()
                .filter_map(|idx| self.patients.get(*idx))
                .map(|patient| {
                    let (status, color) = if patient.is_active {
                        ("Active", widgets::SUCCESS)
                    } else {
                        ("Inactive", widgets::MUTED)
                    };
                    Row::new(vec![
                        Cell::from(patient.full_name()),
                        Cell::from(patient.date_of_birth.clone()),
                        Cell::from(patient.gender.label()),
                        Cell::from(patient.email.clone().unwrap_or_default()),
                        Cell::from(patient.phone.clone().unwrap_or_default()),
                        Cell::from(status).style(Style::default().fg(color)),
                    ])
                    .style(Style::default().fg(widgets::TEXT))
                })
                .collect();
            let table = Table::new(
                rows,
                [
                    Constraint::Percentage(24),
                    Constraint::Percentage(14),
                    Constraint::Percentage(10),
                    Constraint::Percentage(26),
                    Constraint::Percentage(16),
                    Constraint::Percentage(10),
                ],
            )
            .header(widgets::table_header(&[
                "Name", "Born", "Gender", "Email", "Phone", "Status",
            ]))
            .block(widgets::panel("Patients"))
            .row_highlight_style(widgets::selected_row_style())
            .highlight_symbol("► ");
            frame.render_stateful_widget(table, layout[1], &mut self.table.clone());
        }

        frame.render_widget(widgets::status_line(&self.banner), layout[2]);

        let mut help = vec!["↑↓: Select", "/: Search"];
        if ctx.rbac.can_add(PATIENTS) {
            help.push("a: Register");
        }
        if ctx.rbac.can_edit(PATIENTS) {
            help.extend(["e: Edit", "t: (De)activate"]);
        }
        help.extend(["r: Reload", "Esc: Back"]);
        frame.render_widget(widgets::help(&help.join(" | ")), layout[3]);
    }

    fn render_form(&self, frame: &mut Frame, area: Rect, form: &PatientForm) {
        let title = if form.editing_id.is_some() {
            "Edit patient"
        } else {
            "Register patient"
        };
        let block = widgets::panel(title);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let mut constraints = vec![Constraint::Length(3); FORM_ITEMS.len() - 2];
        constraints.extend([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ]);
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(inner);

        let focused = FORM_ITEMS.get(form.focus).copied();
        for (row, item) in FORM_ITEMS.iter().enumerate() {
            let is_focused = focused == Some(*item);
            match *item {
                FormItem::Text(i) => frame.render_widget(
                    widgets::input_field(TEXT_FIELDS[i], &form.values[i], is_focused, false),
                    layout[row],
                ),
                FormItem::Gender => frame.render_widget(
                    widgets::input_field("Gender (Space to change)", form.gender.label(), is_focused, false),
                    layout[row],
                ),
                FormItem::Save => {
                    let label = if self.submit.is_submitting() { "Saving…" } else { "Save" };
                    frame.render_widget(widgets::button(label, is_focused), layout[row]);
                }
                FormItem::Cancel => {
                    frame.render_widget(widgets::button("Cancel", is_focused), layout[row])
                }
            }
        }

        frame.render_widget(widgets::status_line(&self.form_banner), layout[FORM_ITEMS.len()]);
        frame.render_widget(
            widgets::help("Tab/↑↓: Move | Space: Change gender | Enter: Activate | Esc: Cancel"),
            layout[FORM_ITEMS.len() + 2],
        );
    }
}

impl TabPage for PatientsPage {
    fn handle_input(&mut self, key: KeyEvent, ctx: &mut AppContext) -> Result<Option<SelectedApp>> {
        match self.view {
            PatientView::List => Ok(self.handle_list_key(key, ctx)),
            PatientView::Form(_) => {
                self.handle_form_key(key, ctx);
                Ok(None)
            }
        }
    }

    fn render(&self, frame: &mut Frame, area: Rect, ctx: &AppContext) {
        match &self.view {
            PatientView::List => self.render_list(frame, area, ctx),
            PatientView::Form(form) => self.render_form(frame, area, form),
        }
    }

    fn tick(&mut self) {
        self.banner.check_timeout();
        self.form_banner.check_timeout();
    }

    fn is_capturing(&self) -> bool {
        self.is_searching || matches!(self.view, PatientView::Form(_))
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

    fn patients_json() -> serde_json::Value {
        json!([
            { "id": "p1", "firstName": "Noor", "lastName": "Haddad", "dateOfBirth": "1990-04-12", "gender": "female", "email": "noor@x.org" },
            { "id": "p2", "firstName": "Tomás", "lastName": "Ruiz", "dateOfBirth": "1975-11-02", "gender": "male", "phone": "555-0102", "isActive": false }
        ])
    }

    fn press(page: &mut PatientsPage, ctx: &mut AppContext, code: KeyCode) {
        page.handle_input(KeyEvent::from(code), ctx).unwrap();
    }

    fn type_text(page: &mut PatientsPage, ctx: &mut AppContext, text: &str) {
        for c in text.chars() {
            press(page, ctx, KeyCode::Char(c));
        }
    }

    fn today() -> time::Date {
        time::macros::date!(2026 - 01 - 15)
    }

    #[test]
    fn form_rejects_bad_dates() {
        let mut form = PatientForm::new();
        form.values[FIRST] = "Ana".into();
        form.values[LAST] = "Silva".into();
        form.values[DOB] = "12/04/1990".into();
        assert!(form.validate(today()).is_some());
        form.values[DOB] = "2027-01-01".into();
        assert_eq!(form.validate(today()), Some("Date of birth is in the future"));
        form.values[DOB] = "1990-04-12".into();
        assert_eq!(form.validate(today()), None);
    }

    #[test]
    fn blank_optional_fields_are_sent_as_null() {
        let mut form = PatientForm::new();
        form.values = [
            " Ana ".into(),
            "Silva".into(),
            "1990-04-12".into(),
            String::new(),
            "  ".into(),
            "1 Main St".into(),
        ];
        let payload = serde_json::to_value(form.to_payload()).unwrap();
        assert_eq!(
            payload,
            json!({
                "firstName": "Ana",
                "lastName": "Silva",
                "dateOfBirth": "1990-04-12",
                "gender": "female",
                "email": null,
                "phone": null,
                "address": "1 Main St"
            })
        );
    }

    #[test]
    fn registering_a_patient_posts_the_form() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v1/patients", 200, patients_json());
        mock.respond(
            Method::Post,
            "/v1/patients",
            201,
            json!({ "id": "p3", "firstName": "Ana", "lastName": "Silva", "dateOfBirth": "1990-04-12", "gender": "other" }),
        );
        let mut ctx = super_admin(&mock);
        let mut page = PatientsPage::mount(&ctx);

        press(&mut page, &mut ctx, KeyCode::Char('a'));
        type_text(&mut page, &mut ctx, "Ana");
        press(&mut page, &mut ctx, KeyCode::Tab);
        type_text(&mut page, &mut ctx, "Silva");
        press(&mut page, &mut ctx, KeyCode::Tab);
        type_text(&mut page, &mut ctx, "1990-04-12");
        press(&mut page, &mut ctx, KeyCode::Tab);
        press(&mut page, &mut ctx, KeyCode::Char(' '));
        // Jump to Save.
        for _ in 0..4 {
            press(&mut page, &mut ctx, KeyCode::Tab);
        }
        press(&mut page, &mut ctx, KeyCode::Enter);

        let posts = mock.requests_to(Method::Post, "/v1/patients");
        assert_eq!(posts.len(), 1);
        let body = posts[0].body.clone().unwrap();
        assert_eq!(body["gender"], "other");
        assert_eq!(body["dateOfBirth"], "1990-04-12");
        assert!(matches!(page.view, PatientView::List));
        assert_eq!(page.patients.len(), 3);
        assert!(page.banner.is_success());
    }

    #[test]
    fn invalid_form_is_not_sent() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v1/patients", 200, json!([]));
        let mut ctx = super_admin(&mock);
        let mut page = PatientsPage::mount(&ctx);

        press(&mut page, &mut ctx, KeyCode::Char('a'));
        if let PatientView::Form(form) = &mut page.view {
            form.focus = FORM_ITEMS.len() - 2;
        }
        press(&mut page, &mut ctx, KeyCode::Enter);
        assert!(page.form_banner.is_error());
        assert!(mock.requests_to(Method::Post, "/v1/patients").is_empty());
    }

    #[test]
    fn edit_refetches_and_patches() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v1/patients", 200, patients_json());
        mock.respond(
            Method::Get,
            "/v1/patients/p1",
            200,
            json!({ "id": "p1", "firstName": "Noor", "lastName": "Haddad-Said", "dateOfBirth": "1990-04-12", "gender": "female" }),
        );
        mock.respond(
            Method::Patch,
            "/v1/patients/p1",
            200,
            json!({ "id": "p1", "firstName": "Noor", "lastName": "Haddad-Said", "dateOfBirth": "1990-04-12", "gender": "female", "phone": "555" }),
        );
        let mut ctx = super_admin(&mock);
        let mut page = PatientsPage::mount(&ctx);

        press(&mut page, &mut ctx, KeyCode::Char('e'));
        let PatientView::Form(form) = &page.view else {
            panic!("edit form should be open");
        };
        assert_eq!(form.values[LAST], "Haddad-Said");

        if let PatientView::Form(form) = &mut page.view {
            form.values[PHONE] = "555".into();
            form.focus = FORM_ITEMS.len() - 2;
        }
        press(&mut page, &mut ctx, KeyCode::Enter);

        let patches = mock.requests_to(Method::Patch, "/v1/patients/p1");
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].body.as_ref().unwrap()["phone"], "555");
        assert_eq!(page.patients[0].phone.as_deref(), Some("555"));
    }

    #[test]
    fn toggle_merges_response() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v1/patients", 200, patients_json());
        mock.respond(
            Method::Patch,
            "/v1/patients/p2",
            200,
            json!({ "id": "p2", "firstName": "Tomás", "lastName": "Ruiz", "dateOfBirth": "1975-11-02", "gender": "male", "isActive": true }),
        );
        let mut ctx = super_admin(&mock);
        let mut page = PatientsPage::mount(&ctx);

        press(&mut page, &mut ctx, KeyCode::Down);
        press(&mut page, &mut ctx, KeyCode::Char('t'));
        let patches = mock.requests_to(Method::Patch, "/v1/patients/p2");
        assert_eq!(patches[0].body, Some(json!({ "isActive": true })));
        assert!(page.patients[1].is_active);
    }

    #[test]
    fn search_matches_name_and_phone() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v1/patients", 200, patients_json());
        let mut ctx = super_admin(&mock);
        let mut page = PatientsPage::mount(&ctx);

        press(&mut page, &mut ctx, KeyCode::Char('/'));
        type_text(&mut page, &mut ctx, "0102");
        assert_eq!(page.filtered, vec![1]);
        press(&mut page, &mut ctx, KeyCode::Enter);
        assert!(!page.is_capturing());
    }

    #[test]
    fn view_only_users_cannot_register_or_edit() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v1/patients", 200, patients_json());
        let mut ctx = signed_in(
            &mock,
            json!({ "permissions": [{ "resource": "patients", "actions": ["view"] }] }),
        );
        let mut page = PatientsPage::mount(&ctx);

        press(&mut page, &mut ctx, KeyCode::Char('a'));
        press(&mut page, &mut ctx, KeyCode::Char('e'));
        press(&mut page, &mut ctx, KeyCode::Char('t'));
        assert!(matches!(page.view, PatientView::List));
        assert!(mock.requests_to(Method::Patch, "/v1/patients/p2").is_empty());

        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal
            .draw(|frame| {
                let area = frame.area();
                page.render(frame, area, &ctx);
            })
            .unwrap();
        let screen: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(screen.contains("Noor Haddad"));
        assert!(!screen.contains("a: Register"));
    }
}
