//! Doctors tab: compliance overview, pending invitations and per-product
//! license assignment.

use crate::api::batch::join3;
use crate::api::ApiError;
use crate::app::SelectedApp;
use crate::components::hospital::TabPage;
use crate::components::widgets::{self, ConfirmDialog};
use crate::context::AppContext;
use crate::forms::{edit_text, FormState, StatusBanner};
use crate::models::{
    format_date, ComplianceStatus, DoctorCompliance, DoctorInvitePayload, Invite,
    LicenseAssignment, ProductLicenseStats,
};
use crate::rbac::resources::{INVITES, LICENSES};
use crate::tui::Frame;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{prelude::*, widgets::*};
use time::OffsetDateTime;
use tracing::{info, warn};

const INVITE_FIELDS: [&str; 3] = ["Email", "First name", "Last name"];
const INVITE_SEND: usize = 3;
const INVITE_CANCEL: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Panel {
    Doctors,
    Invites,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InviteForm {
    values: [String; 3],
    focus: usize,
}

impl InviteForm {
    pub fn validate(&self) -> Option<&'static str> {
        let email = self.values[0].trim();
        if email.is_empty() || !email.contains('@') {
            return Some("A valid email is required");
        }
        if self.values[1].trim().is_empty() || self.values[2].trim().is_empty() {
            return Some("First and last name are required");
        }
        None
    }

    pub fn to_payload(&self) -> DoctorInvitePayload {
        DoctorInvitePayload {
            email: self.values[0].trim().to_string(),
            first_name: self.values[1].trim().to_string(),
            last_name: self.values[2].trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingAction {
    RevokeInvite { id: String, email: String },
    RevokeLicense { license_id: String, doctor: String },
}

pub struct DoctorsPage {
    doctors: Vec<DoctorCompliance>,
    invites: Vec<Invite>,
    licenses: Vec<ProductLicenseStats>,
    panel: Panel,
    doctor_table: TableState,
    invite_table: TableState,
    /// Product used by license actions.
    product: usize,
    invite_form: Option<InviteForm>,
    dialog: Option<(ConfirmDialog, PendingAction)>,
    submit: FormState,
    banner: StatusBanner,
    form_banner: StatusBanner,
}

impl DoctorsPage {
    pub fn mount(ctx: &AppContext) -> Self {
        let mut page = Self {
            doctors: Vec::new(),
            invites: Vec::new(),
            licenses: Vec::new(),
            panel: Panel::Doctors,
            doctor_table: TableState::default(),
            invite_table: TableState::default(),
            product: 0,
            invite_form: None,
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
        let (doctors, invites, licenses) = join3(
            || api.doctor_compliance(),
            || api.pending_doctor_invites(),
            || api.license_stats(),
        );
        match doctors {
            Ok(doctors) => self.doctors = doctors,
            Err(err) => {
                warn!(error = %err, "could not load doctors");
                self.banner.error(err.user_message());
            }
        }
        match invites {
            Ok(invites) => self.invites = invites,
            Err(err) => {
                warn!(error = %err, "could not load invites");
                self.banner.error(err.user_message());
            }
        }
        self.apply_licenses(licenses);
        widgets::clamp_selection(&mut self.doctor_table, self.doctors.len());
        widgets::clamp_selection(&mut self.invite_table, self.invites.len());
    }

    fn apply_licenses(&mut self, licenses: Result<Vec<ProductLicenseStats>, ApiError>) {
        match licenses {
            Ok(licenses) => self.licenses = licenses,
            Err(err) => {
                // A hospital without a subscription has no licenses to hand out.
                warn!(error = %err, "could not load license stats");
                self.licenses.clear();
            }
        }
        self.product = self.product.min(self.licenses.len().saturating_sub(1));
    }

    fn reload_licenses(&mut self, ctx: &AppContext) {
        let licenses = ctx.api.license_stats();
        self.apply_licenses(licenses);
    }

    fn selected_doctor(&self) -> Option<&DoctorCompliance> {
        self.doctors.get(self.doctor_table.selected()?)
    }

    fn selected_invite(&self) -> Option<&Invite> {
        self.invites.get(self.invite_table.selected()?)
    }

    fn current_product(&self) -> Option<&ProductLicenseStats> {
        self.licenses.get(self.product)
    }

    /// Assigns the current product to the selected doctor, or asks to revoke
    /// it if the doctor already holds one.
    fn toggle_license(&mut self, ctx: &AppContext) {
        let (Some(doctor), Some(product)) = (self.selected_doctor(), self.current_product())
        else {
            return;
        };

        if let Some(license) = product.license_for(&doctor.user_id) {
            let doctor_name = doctor.full_name();
            self.dialog = Some((
                ConfirmDialog::new(
                    "Revoke license",
                    format!("Revoke the {} license of {doctor_name}?", product.product_name),
                ),
                PendingAction::RevokeLicense {
                    license_id: license.id.clone(),
                    doctor: doctor_name,
                },
            ));
            return;
        }

        if product.available() == 0 {
            let message = format!("No {} licenses available", product.product_name);
            self.banner.error(message);
            return;
        }

        let assignment = LicenseAssignment {
            user_id: doctor.user_id.clone(),
            product_code: product.product_code.clone(),
        };
        let doctor_name = doctor.full_name();
        match ctx.api.assign_license(&assignment) {
            Ok(_) => {
                info!(doctor = %assignment.user_id, product = %assignment.product_code, "license assigned");
                self.banner.success(format!("License assigned to {doctor_name}"));
                self.reload_licenses(ctx);
            }
            Err(err) => {
                warn!(error = %err, "license assignment failed");
                self.banner.error(err.user_message());
            }
        }
    }

    fn run_pending(&mut self, action: PendingAction, ctx: &AppContext) {
        match action {
            PendingAction::RevokeInvite { id, email } => match ctx.api.revoke_invite(&id) {
                Ok(()) => {
                    info!(invite = %id, "invite revoked");
                    self.invites.retain(|invite| invite.id != id);
                    widgets::clamp_selection(&mut self.invite_table, self.invites.len());
                    self.banner.success(format!("Invite to {email} revoked"));
                }
                Err(err) => {
                    warn!(invite = %id, error = %err, "invite revoke failed");
                    self.banner.error(err.user_message());
                }
            },
            PendingAction::RevokeLicense { license_id, doctor } => {
                match ctx.api.revoke_license(&license_id) {
                    Ok(()) => {
                        info!(license = %license_id, "license revoked");
                        self.banner.success(format!("License revoked from {doctor}"));
                        self.reload_licenses(ctx);
                    }
                    Err(err) => {
                        warn!(license = %license_id, error = %err, "license revoke failed");
                        self.banner.error(err.user_message());
                    }
                }
            }
        }
    }

    fn send_invite(&mut self, ctx: &AppContext) {
        let Some(form) = &self.invite_form else {
            return;
        };
        if let Some(problem) = form.validate() {
            self.form_banner.error(problem);
            return;
        }
        if !self.submit.begin() {
            return;
        }
        let payload = form.to_payload();
        let result = ctx.api.invite_doctor(&payload);
        self.submit.finish(&result, ApiError::user_message);

        match result {
            Ok(_) => {
                info!(email = %payload.email, "doctor invited");
                self.invite_form = None;
                self.form_banner.clear();
                self.banner.success(format!("Invite sent to {}", payload.email));
                match ctx.api.pending_doctor_invites() {
                    Ok(invites) => self.invites = invites,
                    Err(err) => warn!(error = %err, "could not refresh invites"),
                }
                widgets::clamp_selection(&mut self.invite_table, self.invites.len());
            }
            Err(err) => {
                warn!(error = %err, "doctor invite failed");
                self.form_banner.error(err.user_message());
            }
        }
    }

    fn handle_form_key(&mut self, key: KeyEvent, ctx: &AppContext) {
        let Some(form) = &mut self.invite_form else {
            return;
        };
        let count = INVITE_FIELDS.len() + 2;
        match (key.code, form.focus) {
            (KeyCode::Esc, _) | (KeyCode::Enter, INVITE_CANCEL) => {
                self.invite_form = None;
                self.form_banner.clear();
            }
            (KeyCode::Enter, INVITE_SEND) => self.send_invite(ctx),
            (KeyCode::Tab | KeyCode::Down | KeyCode::Enter, _) => {
                form.focus = (form.focus + 1) % count;
            }
            (KeyCode::BackTab | KeyCode::Up, _) => form.focus = (form.focus + count - 1) % count,
            (code, focus) if focus < INVITE_FIELDS.len() => {
                if edit_text(&mut form.values[focus], code) {
                    self.form_banner.clear();
                }
            }
            _ => {}
        }
    }

    fn handle_list_key(&mut self, key: KeyEvent, ctx: &AppContext) -> Option<SelectedApp> {
        match key.code {
            KeyCode::Tab => {
                self.panel = match self.panel {
                    Panel::Doctors => Panel::Invites,
                    Panel::Invites => Panel::Doctors,
                }
            }
            KeyCode::Down | KeyCode::Up => {
                let forward = key.code == KeyCode::Down;
                match self.panel {
                    Panel::Doctors => {
                        widgets::wrap_selection(&mut self.doctor_table, self.doctors.len(), forward)
                    }
                    Panel::Invites => {
                        widgets::wrap_selection(&mut self.invite_table, self.invites.len(), forward)
                    }
                }
            }
            KeyCode::Char(']') if !self.licenses.is_empty() => {
                self.product = (self.product + 1) % self.licenses.len();
            }
            KeyCode::Char('[') if !self.licenses.is_empty() => {
                self.product = (self.product + self.licenses.len() - 1) % self.licenses.len();
            }
            KeyCode::Char('i') if ctx.rbac.can_add(INVITES) => {
                self.submit.reset();
                self.form_banner.clear();
                self.invite_form = Some(InviteForm::default());
            }
            KeyCode::Char('x') | KeyCode::Delete
                if self.panel == Panel::Invites && ctx.rbac.can_delete(INVITES) =>
            {
                if let Some(invite) = self.selected_invite() {
                    let email = invite.email.clone();
                    self.dialog = Some((
                        ConfirmDialog::new("Revoke invite", format!("Revoke the invite to {email}?")),
                        PendingAction::RevokeInvite {
                            id: invite.id.clone(),
                            email,
                        },
                    ));
                }
            }
            KeyCode::Char('l') if self.panel == Panel::Doctors && ctx.rbac.can_edit(LICENSES) => {
                self.toggle_license(ctx)
            }
            KeyCode::Char('r') => self.reload(ctx),
            KeyCode::Esc => return Some(SelectedApp::None),
            _ => {}
        }
        None
    }

    fn compliance_color(status: ComplianceStatus) -> Color {
        match status {
            ComplianceStatus::Compliant => widgets::SUCCESS,
            ComplianceStatus::PendingSignatures => widgets::FOCUS,
            ComplianceStatus::NotLoggedIn => widgets::ERROR,
        }
    }

    fn render_lists(&self, frame: &mut Frame, area: Rect, ctx: &AppContext) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Percentage(60),
                Constraint::Min(4),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(area);

        let product_line = match self.current_product() {
            Some(product) => format!(
                "License product: {} ({} of {} available)  [ / ]: change",
                product.product_name,
                product.available(),
                product.purchased
            ),
            None => "No licensed products".to_string(),
        };
        frame.render_widget(
            Paragraph::new(product_line).style(Style::default().fg(widgets::ACCENT)),
            layout[0],
        );

        let product = self
            .current_product()
            .filter(|_| ctx.rbac.can_view(LICENSES));
        let rows: Vec<Row> = self
            .doctors
            .iter()
            .map(|doctor| {
                let licensed = match product {
                    Some(product) if product.license_for(&doctor.user_id).is_some() => "Yes",
                    Some(_) => "No",
                    None => "-",
                };
                Row::new(vec![
                    Cell::from(doctor.full_name()),
                    Cell::from(doctor.email.clone()),
                    Cell::from(doctor.specialty.clone().unwrap_or_default()),
                    Cell::from(doctor.license_number.clone().unwrap_or_default()),
                    Cell::from(doctor.compliance_status.label())
                        .style(Style::default().fg(Self::compliance_color(doctor.compliance_status))),
                    Cell::from(licensed),
                ])
                .style(Style::default().fg(widgets::TEXT))
            })
            .collect();
        let mut doctors_panel = widgets::panel("Doctors");
        if self.panel == Panel::Doctors {
            doctors_panel = doctors_panel.border_style(Style::default().fg(widgets::FOCUS));
        }
        let table = Table::new(
            rows,
            [
                Constraint::Percentage(20),
                Constraint::Percentage(24),
                Constraint::Percentage(16),
                Constraint::Percentage(14),
                Constraint::Percentage(16),
                Constraint::Percentage(10),
            ],
        )
        .header(widgets::table_header(&[
            "Name", "Email", "Specialty", "License no.", "Compliance", "Licensed",
        ]))
        .block(doctors_panel)
        .row_highlight_style(widgets::selected_row_style());
        frame.render_stateful_widget(table, layout[1], &mut self.doctor_table.clone());

        let now = OffsetDateTime::now_utc();
        let rows: Vec<Row> = self
            .invites
            .iter()
            .map(|invite| {
                let (status, color) = if invite.is_expired(now) {
                    ("Expired", widgets::ERROR)
                } else {
                    ("Pending", widgets::FOCUS)
                };
                Row::new(vec![
                    Cell::from(invite.email.clone()),
                    Cell::from(format_date(invite.expires_at)),
                    Cell::from(status).style(Style::default().fg(color)),
                ])
                .style(Style::default().fg(widgets::TEXT))
            })
            .collect();
        let mut invites_panel = widgets::panel("Pending invites");
        if self.panel == Panel::Invites {
            invites_panel = invites_panel.border_style(Style::default().fg(widgets::FOCUS));
        }
        let table = Table::new(
            rows,
            [
                Constraint::Percentage(50),
                Constraint::Percentage(25),
                Constraint::Percentage(25),
            ],
        )
        .header(widgets::table_header(&["Email", "Expires", "Status"]))
        .block(invites_panel)
        .row_highlight_style(widgets::selected_row_style());
        frame.render_stateful_widget(table, layout[2], &mut self.invite_table.clone());

        frame.render_widget(widgets::status_line(&self.banner), layout[3]);

        let mut help = vec!["Tab: Panel", "↑↓: Select"];
        if ctx.rbac.can_add(INVITES) {
            help.push("i: Invite");
        }
        if ctx.rbac.can_delete(INVITES) {
            help.push("x: Revoke invite");
        }
        if ctx.rbac.can_edit(LICENSES) {
            help.push("l: Assign/revoke license");
        }
        help.extend(["r: Reload", "Esc: Back"]);
        frame.render_widget(widgets::help(&help.join(" | ")), layout[4]);
    }

    fn render_form(&self, frame: &mut Frame, area: Rect, form: &InviteForm) {
        let popup = widgets::centered_rect(60, 70, area);
        frame.render_widget(Clear, popup);
        let block = widgets::panel("Invite doctor");
        let inner = block.inner(popup);
        frame.render_widget(block, popup);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(0),
            ])
            .split(inner);
        for (i, label) in INVITE_FIELDS.iter().enumerate() {
            frame.render_widget(
                widgets::input_field(label, &form.values[i], form.focus == i, false),
                layout[i],
            );
        }
        let send_label = if self.submit.is_submitting() { "Sending…" } else { "Send invite" };
        frame.render_widget(widgets::button(send_label, form.focus == INVITE_SEND), layout[3]);
        frame.render_widget(widgets::button("Cancel", form.focus == INVITE_CANCEL), layout[4]);
        frame.render_widget(widgets::status_line(&self.form_banner), layout[5]);
    }
}

impl TabPage for DoctorsPage {
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
        if self.invite_form.is_some() {
            self.handle_form_key(key, ctx);
            return Ok(None);
        }
        Ok(self.handle_list_key(key, ctx))
    }

    fn render(&self, frame: &mut Frame, area: Rect, ctx: &AppContext) {
        self.render_lists(frame, area, ctx);
        if let Some(form) = &self.invite_form {
            self.render_form(frame, area, form);
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
        self.invite_form.is_some() || self.dialog.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockTransport;
    use crate::api::Method;
    use crate::context::testing::super_admin;
    use serde_json::json;

    fn license_stats(assigned_to: &[&str], purchased: u32) -> serde_json::Value {
        let licenses: Vec<_> = assigned_to
            .iter()
            .enumerate()
            .map(|(i, user)| json!({ "id": format!("l{i}"), "userId": user, "productCode": "ehr" }))
            .collect();
        json!([{
            "productCode": "ehr",
            "productName": "EHR",
            "purchased": purchased,
            "assigned": assigned_to.len(),
            "licenses": licenses
        }])
    }

    fn mounted(mock: &MockTransport, licensed: &[&str], purchased: u32) -> (AppContext, DoctorsPage) {
        mock.respond(
            Method::Get,
            "/v1/hospitals/members/compliance",
            200,
            json!([
                { "userId": "d1", "firstName": "Ada", "lastName": "Okafor", "email": "ada@x.org", "complianceStatus": "compliant" },
                { "userId": "d2", "firstName": "Ben", "lastName": "Ito", "email": "ben@x.org", "complianceStatus": "not_logged_in" }
            ]),
        );
        mock.respond(
            Method::Get,
            "/v1/invites/pending",
            200,
            json!([
                { "id": "i1", "email": "new@x.org", "role": "doctor", "status": "pending", "expiresAt": "2030-01-01T00:00:00Z" },
                { "id": "i2", "email": "nurse@x.org", "role": "staff", "status": "pending" }
            ]),
        );
        mock.respond(
            Method::Get,
            "/v1/products/subscription/license-stats",
            200,
            license_stats(licensed, purchased),
        );
        let ctx = super_admin(mock);
        let page = DoctorsPage::mount(&ctx);
        (ctx, page)
    }

    fn press(page: &mut DoctorsPage, ctx: &mut AppContext, code: KeyCode) {
        page.handle_input(KeyEvent::from(code), ctx).unwrap();
    }

    #[test]
    fn mount_loads_doctors_invites_and_licenses() {
        let mock = MockTransport::new();
        let (_, page) = mounted(&mock, &["d1"], 5);
        assert_eq!(page.doctors.len(), 2);
        assert_eq!(page.invites.len(), 1);
        assert_eq!(page.current_product().map(|p| p.available()), Some(4));
    }

    #[test]
    fn assigning_a_license_posts_doctor_and_product() {
        let mock = MockTransport::new();
        let (mut ctx, mut page) = mounted(&mock, &[], 2);
        mock.respond(
            Method::Post,
            "/v1/products/licenses/assign",
            201,
            json!({ "id": "l9", "userId": "d1", "productCode": "ehr" }),
        );

        press(&mut page, &mut ctx, KeyCode::Char('l'));
        let posts = mock.requests_to(Method::Post, "/v1/products/licenses/assign");
        assert_eq!(posts.len(), 1);
        assert_eq!(
            posts[0].body,
            Some(json!({ "userId": "d1", "productCode": "ehr" }))
        );
        assert!(page.banner.is_success());
    }

    #[test]
    fn no_free_license_means_no_request() {
        let mock = MockTransport::new();
        let (mut ctx, mut page) = mounted(&mock, &["d2"], 1);
        press(&mut page, &mut ctx, KeyCode::Char('l'));
        assert!(page.banner.is_error());
        assert!(mock
            .requests_to(Method::Post, "/v1/products/licenses/assign")
            .is_empty());
    }

    #[test]
    fn revoking_a_held_license_asks_first() {
        let mock = MockTransport::new();
        let (mut ctx, mut page) = mounted(&mock, &["d1"], 1);
        mock.respond_raw(Method::Delete, "/v1/products/licenses/l0", 204, "");

        press(&mut page, &mut ctx, KeyCode::Char('l'));
        assert!(page.dialog.is_some());
        press(&mut page, &mut ctx, KeyCode::Char('y'));
        assert_eq!(
            mock.requests_to(Method::Delete, "/v1/products/licenses/l0").len(),
            1
        );
    }

    #[test]
    fn invite_is_sent_and_list_refreshed() {
        let mock = MockTransport::new();
        let (mut ctx, mut page) = mounted(&mock, &[], 1);
        mock.respond(
            Method::Post,
            "/v1/invites/create-doctor",
            201,
            json!({ "id": "i3", "email": "zoe@x.org", "role": "doctor", "status": "pending" }),
        );

        press(&mut page, &mut ctx, KeyCode::Char('i'));
        for c in "zoe@x.org".chars() {
            press(&mut page, &mut ctx, KeyCode::Char(c));
        }
        press(&mut page, &mut ctx, KeyCode::Tab);
        for c in "Zoe".chars() {
            press(&mut page, &mut ctx, KeyCode::Char(c));
        }
        press(&mut page, &mut ctx, KeyCode::Tab);
        for c in "Ng".chars() {
            press(&mut page, &mut ctx, KeyCode::Char(c));
        }
        press(&mut page, &mut ctx, KeyCode::Tab);
        press(&mut page, &mut ctx, KeyCode::Enter);

        assert!(page.invite_form.is_none());
        let posts = mock.requests_to(Method::Post, "/v1/invites/create-doctor");
        assert_eq!(
            posts[0].body,
            Some(json!({ "email": "zoe@x.org", "firstName": "Zoe", "lastName": "Ng" }))
        );
        assert_eq!(mock.requests_to(Method::Get, "/v1/invites/pending").len(), 2);
    }

    #[test]
    fn revoke_invite_removes_row_after_confirmation() {
        let mock = MockTransport::new();
        let (mut ctx, mut page) = mounted(&mock, &[], 1);
        mock.respond_raw(Method::Delete, "/v1/invites/i1", 204, "");

        press(&mut page, &mut ctx, KeyCode::Tab);
        press(&mut page, &mut ctx, KeyCode::Char('x'));
        press(&mut page, &mut ctx, KeyCode::Enter);
        assert_eq!(page.invites.len(), 1, "dialog defaults to No");

        press(&mut page, &mut ctx, KeyCode::Char('x'));
        press(&mut page, &mut ctx, KeyCode::Char('y'));
        assert!(page.invites.is_empty());
    }
}
