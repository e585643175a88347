//! Hospital profile tab.
//!
//! The profile is split into sections that are edited one at a time. A
//! section save sends only that section's fields, so concurrent edits of other
//! sections by someone else are not overwritten. A failed save leaves the
//! section open with its edits intact.

use crate::api::batch::join3;
use crate::api::ApiError;
use crate::app::SelectedApp;
use crate::components::hospital::TabPage;
use crate::components::widgets;
use crate::context::AppContext;
use crate::forms::{edit_text, FormState, Snapshot, StatusBanner};
use crate::models::{
    format_date, HospitalAcceptance, HospitalProfile, HospitalUpdate, Specialization,
};
use crate::rbac::resources::HOSPITAL;
use crate::tui::Frame;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    prelude::*,
    widgets::{List, ListItem, Paragraph, Wrap},
};
use tracing::{info, warn};

/// Text fields of the hospital profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HospitalField {
    Name,
    Email,
    Phone,
    Website,
    AddressLine,
    City,
    State,
    PostalCode,
    Country,
    BillingAddressLine,
    BillingCity,
    BillingState,
    BillingPostalCode,
    BillingCountry,
    LegalName,
    TaxId,
    NpiNumber,
    LicenseNumber,
    Accreditation,
    ManagerName,
    ManagerEmail,
    ManagerPhone,
    HospitalType,
}

/// Primary address fields and the billing fields that mirror them.
const ADDRESS_PAIRS: [(HospitalField, HospitalField); 5] = [
    (HospitalField::AddressLine, HospitalField::BillingAddressLine),
    (HospitalField::City, HospitalField::BillingCity),
    (HospitalField::State, HospitalField::BillingState),
    (HospitalField::PostalCode, HospitalField::BillingPostalCode),
    (HospitalField::Country, HospitalField::BillingCountry),
];

const SPECIALTIES_FIELD: &str = "specialties";

impl HospitalField {
    pub const ALL: [HospitalField; 23] = [
        HospitalField::Name,
        HospitalField::Email,
        HospitalField::Phone,
        HospitalField::Website,
        HospitalField::AddressLine,
        HospitalField::City,
        HospitalField::State,
        HospitalField::PostalCode,
        HospitalField::Country,
        HospitalField::BillingAddressLine,
        HospitalField::BillingCity,
        HospitalField::BillingState,
        HospitalField::BillingPostalCode,
        HospitalField::BillingCountry,
        HospitalField::LegalName,
        HospitalField::TaxId,
        HospitalField::NpiNumber,
        HospitalField::LicenseNumber,
        HospitalField::Accreditation,
        HospitalField::ManagerName,
        HospitalField::ManagerEmail,
        HospitalField::ManagerPhone,
        HospitalField::HospitalType,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            HospitalField::Name => "Name",
            HospitalField::Email => "Email",
            HospitalField::Phone => "Phone",
            HospitalField::Website => "Website",
            HospitalField::AddressLine | HospitalField::BillingAddressLine => "Address",
            HospitalField::City | HospitalField::BillingCity => "City",
            HospitalField::State | HospitalField::BillingState => "State",
            HospitalField::PostalCode | HospitalField::BillingPostalCode => "Postal code",
            HospitalField::Country | HospitalField::BillingCountry => "Country",
            HospitalField::LegalName => "Legal name",
            HospitalField::TaxId => "Tax id",
            HospitalField::NpiNumber => "NPI number",
            HospitalField::LicenseNumber => "State license number",
            HospitalField::Accreditation => "Accreditation",
            HospitalField::ManagerName => "Manager name",
            HospitalField::ManagerEmail => "Manager email",
            HospitalField::ManagerPhone => "Manager phone",
            HospitalField::HospitalType => "Hospital type",
        }
    }

    /// Field name as the API and the permission lists spell it.
    pub fn api_name(&self) -> &'static str {
        match self {
            HospitalField::Name => "name",
            HospitalField::Email => "email",
            HospitalField::Phone => "phone",
            HospitalField::Website => "website",
            HospitalField::AddressLine => "addressLine",
            HospitalField::City => "city",
            HospitalField::State => "state",
            HospitalField::PostalCode => "postalCode",
            HospitalField::Country => "country",
            HospitalField::BillingAddressLine => "billingAddressLine",
            HospitalField::BillingCity => "billingCity",
            HospitalField::BillingState => "billingState",
            HospitalField::BillingPostalCode => "billingPostalCode",
            HospitalField::BillingCountry => "billingCountry",
            HospitalField::LegalName => "legalName",
            HospitalField::TaxId => "taxId",
            HospitalField::NpiNumber => "npiNumber",
            HospitalField::LicenseNumber => "licenseNumber",
            HospitalField::Accreditation => "accreditation",
            HospitalField::ManagerName => "managerName",
            HospitalField::ManagerEmail => "managerEmail",
            HospitalField::ManagerPhone => "managerPhone",
            HospitalField::HospitalType => "hospitalType",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn billing_counterpart(self) -> Option<HospitalField> {
        ADDRESS_PAIRS
            .iter()
            .find(|(primary, _)| *primary == self)
            .map(|(_, billing)| *billing)
    }

    fn is_billing(self) -> bool {
        ADDRESS_PAIRS.iter().any(|(_, billing)| *billing == self)
    }

    fn read(self, profile: &HospitalProfile) -> Option<String> {
        match self {
            HospitalField::Name => Some(profile.name.clone()),
            HospitalField::Email => profile.email.clone(),
            HospitalField::Phone => profile.phone.clone(),
            HospitalField::Website => profile.website.clone(),
            HospitalField::AddressLine => profile.address_line.clone(),
            HospitalField::City => profile.city.clone(),
            HospitalField::State => profile.state.clone(),
            HospitalField::PostalCode => profile.postal_code.clone(),
            HospitalField::Country => profile.country.clone(),
            HospitalField::BillingAddressLine => profile.billing_address_line.clone(),
            HospitalField::BillingCity => profile.billing_city.clone(),
            HospitalField::BillingState => profile.billing_state.clone(),
            HospitalField::BillingPostalCode => profile.billing_postal_code.clone(),
            HospitalField::BillingCountry => profile.billing_country.clone(),
            HospitalField::LegalName => profile.legal_name.clone(),
            HospitalField::TaxId => profile.tax_id.clone(),
            HospitalField::NpiNumber => profile.npi_number.clone(),
            HospitalField::LicenseNumber => profile.license_number.clone(),
            HospitalField::Accreditation => profile.accreditation.clone(),
            HospitalField::ManagerName => profile.manager_name.clone(),
            HospitalField::ManagerEmail => profile.manager_email.clone(),
            HospitalField::ManagerPhone => profile.manager_phone.clone(),
            HospitalField::HospitalType => profile.hospital_type.clone(),
        }
    }

    fn write(self, update: &mut HospitalUpdate, value: String) {
        let slot = match self {
            HospitalField::Name => &mut update.name,
            HospitalField::Email => &mut update.email,
            HospitalField::Phone => &mut update.phone,
            HospitalField::Website => &mut update.website,
            HospitalField::AddressLine => &mut update.address_line,
            HospitalField::City => &mut update.city,
            HospitalField::State => &mut update.state,
            HospitalField::PostalCode => &mut update.postal_code,
            HospitalField::Country => &mut update.country,
            HospitalField::BillingAddressLine => &mut update.billing_address_line,
            HospitalField::BillingCity => &mut update.billing_city,
            HospitalField::BillingState => &mut update.billing_state,
            HospitalField::BillingPostalCode => &mut update.billing_postal_code,
            HospitalField::BillingCountry => &mut update.billing_country,
            HospitalField::LegalName => &mut update.legal_name,
            HospitalField::TaxId => &mut update.tax_id,
            HospitalField::NpiNumber => &mut update.npi_number,
            HospitalField::LicenseNumber => &mut update.license_number,
            HospitalField::Accreditation => &mut update.accreditation,
            HospitalField::ManagerName => &mut update.manager_name,
            HospitalField::ManagerEmail => &mut update.manager_email,
            HospitalField::ManagerPhone => &mut update.manager_phone,
            HospitalField::HospitalType => &mut update.hospital_type,
        };
        *slot = Some(value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    General,
    Address,
    BillingAddress,
    Legal,
    Manager,
    Classification,
    Branding,
}

impl Section {
    pub const ALL: [Section; 7] = [
        Section::General,
        Section::Address,
        Section::BillingAddress,
        Section::Legal,
        Section::Manager,
        Section::Classification,
        Section::Branding,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Section::General => "General",
            Section::Address => "Address",
            Section::BillingAddress => "Billing address",
            Section::Legal => "Legal & compliance",
            Section::Manager => "Manager",
            Section::Classification => "Classification",
            Section::Branding => "Branding & documents",
        }
    }

    pub fn fields(&self) -> &'static [HospitalField] {
        use HospitalField::*;
        match self {
            Section::General => &[Name, Email, Phone, Website],
            Section::Address => &[AddressLine, City, State, PostalCode, Country],
            Section::BillingAddress => &[
                BillingAddressLine,
                BillingCity,
                BillingState,
                BillingPostalCode,
                BillingCountry,
            ],
            Section::Legal => &[LegalName, TaxId, NpiNumber, LicenseNumber, Accreditation],
            Section::Manager => &[ManagerName, ManagerEmail, ManagerPhone],
            Section::Classification => &[HospitalType],
            Section::Branding => &[],
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Editable copy of the hospital profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HospitalForm {
    values: Vec<String>,
    specialties: Vec<String>,
    billing_same_as_address: bool,
}

impl HospitalForm {
    pub fn from_profile(profile: &HospitalProfile) -> Self {
        let values = HospitalField::ALL
            .iter()
            .map(|field| field.read(profile).unwrap_or_default())
            .collect();
        let mut form = Self {
            values,
            specialties: profile.specialties.clone(),
            billing_same_as_address: false,
        };
        form.billing_same_as_address = ADDRESS_PAIRS
            .iter()
            .any(|(primary, _)| !form.value(*primary).is_empty())
            && ADDRESS_PAIRS
                .iter()
                .all(|(primary, billing)| form.value(*primary) == form.value(*billing));
        form
    }

    pub fn value(&self, field: HospitalField) -> &str {
        &self.values[field.index()]
    }

    pub fn specialties(&self) -> &[String] {
        &self.specialties
    }

    pub fn billing_same_as_address(&self) -> bool {
        self.billing_same_as_address
    }

    /// Billing fields follow the primary address while the checkbox is set.
    pub fn is_locked(&self, field: HospitalField) -> bool {
        self.billing_same_as_address && field.is_billing()
    }

    /// Applies a text-editing key to `field`. Returns `true` if it changed.
    pub fn edit(&mut self, field: HospitalField, key: KeyCode) -> bool {
        if self.is_locked(field) {
            return false;
        }
        let changed = edit_text(&mut self.values[field.index()], key);
        if changed {
            self.mirror(field);
        }
        changed
    }

    pub fn set(&mut self, field: HospitalField, value: impl Into<String>) {
        if self.is_locked(field) {
            return;
        }
        self.values[field.index()] = value.into();
        self.mirror(field);
    }

    fn mirror(&mut self, field: HospitalField) {
        if !self.billing_same_as_address {
            return;
        }
        if let Some(billing) = field.billing_counterpart() {
            self.values[billing.index()] = self.values[field.index()].clone();
        }
    }

    /// Checking copies the primary address once; unchecking keeps the copy.
    pub fn set_billing_same_as_address(&mut self, checked: bool) {
        if checked && !self.billing_same_as_address {
            for (primary, billing) in ADDRESS_PAIRS {
                self.values[billing.index()] = self.values[primary.index()].clone();
            }
        }
        self.billing_same_as_address = checked;
    }

    pub fn toggle_specialty(&mut self, name: &str) {
        if let Some(pos) = self.specialties.iter().position(|s| s == name) {
            self.specialties.remove(pos);
        } else {
            self.specialties.push(name.to_string());
        }
    }

    /// Local checks run before a section is sent.
    pub fn validate(&self, section: Section) -> Option<&'static str> {
        let email_ok = |field| {
            let value = self.value(field).trim();
            value.is_empty() || value.contains('@')
        };
        match section {
            Section::General if self.value(HospitalField::Name).trim().is_empty() => {
                Some("Hospital name is required")
            }
            Section::General if !email_ok(HospitalField::Email) => Some("Email looks invalid"),
            Section::Manager if !email_ok(HospitalField::ManagerEmail) => {
                Some("Manager email looks invalid")
            }
            _ => None,
        }
    }

    /// The partial update for `section`: only fields that differ from
    /// `original` and that `editable` accepts by API name.
    pub fn update_for(
        &self,
        section: Section,
        original: &HospitalForm,
        editable: impl Fn(&str) -> bool,
    ) -> HospitalUpdate {
        let mut update = HospitalUpdate::default();
        let mut fields = section.fields().to_vec();
        if section == Section::Address && self.billing_same_as_address {
            fields.extend(ADDRESS_PAIRS.iter().map(|(_, billing)| *billing));
        }
        for field in fields {
            let value = self.value(field).trim();
            if value != original.value(field).trim() && editable(field.api_name()) {
                field.write(&mut update, value.to_string());
            }
        }
        if section == Section::Classification
            && self.specialties != original.specialties
            && editable(SPECIALTIES_FIELD)
        {
            update.specialties = Some(self.specialties.clone());
        }
        update
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FocusItem {
    Field(HospitalField),
    SameAsAddress,
    Specialty(usize),
}

pub struct HospitalDetails {
    form: Option<Snapshot<HospitalForm>>,
    profile: Option<HospitalProfile>,
    specializations: Vec<Specialization>,
    acceptances: Vec<HospitalAcceptance>,
    selected: usize,
    editing: Option<Section>,
    focus: usize,
    submit: FormState,
    /// One banner per section.
    banners: Vec<StatusBanner>,
    page_banner: StatusBanner,
}

impl HospitalDetails {
    pub fn mount(ctx: &AppContext) -> Self {
        let mut page = Self {
            form: None,
            profile: None,
            specializations: Vec::new(),
            acceptances: Vec::new(),
            selected: 0,
            editing: None,
            focus: 0,
            submit: FormState::default(),
            banners: vec![StatusBanner::new(); Section::ALL.len()],
            page_banner: StatusBanner::new(),
        };
        page.load(ctx);
        page
    }

    fn load(&mut self, ctx: &AppContext) {
        let api = &ctx.api;
        let (hospital, specializations, acceptances) = join3(
            || api.hospital(),
            || api.specializations(),
            || api.hospital_acceptances(),
        );

        match hospital {
            Ok(profile) => {
                self.form = Some(Snapshot::new(HospitalForm::from_profile(&profile)));
                self.profile = Some(profile);
            }
            Err(err) => {
                warn!(error = %err, "could not load hospital");
                self.page_banner.error(err.user_message());
            }
        }
        match specializations {
            Ok(list) => self.specializations = list,
            Err(err) => {
                warn!(error = %err, "could not load specializations");
                self.specializations.clear();
            }
        }
        // Signed documents are informational only.
        match acceptances {
            Ok(list) => self.acceptances = list,
            Err(err) => {
                warn!(error = %err, "could not load signed documents");
                self.acceptances.clear();
            }
        }
    }

    fn section(&self) -> Section {
        Section::ALL[self.selected]
    }

    fn can_edit_section(section: Section, ctx: &AppContext) -> bool {
        if section == Section::Branding || !ctx.rbac.can_edit(HOSPITAL) {
            return false;
        }
        section
            .fields()
            .iter()
            .any(|field| ctx.rbac.can_edit_field(HOSPITAL, field.api_name()))
            || (section == Section::Classification
                && ctx.rbac.can_edit_field(HOSPITAL, SPECIALTIES_FIELD))
    }

    fn focus_items(&self, section: Section) -> Vec<FocusItem> {
        let mut items = Vec::new();
        if section == Section::BillingAddress {
            items.push(FocusItem::SameAsAddress);
        }
        items.extend(section.fields().iter().map(|field| FocusItem::Field(*field)));
        if section == Section::Classification {
            items.extend((0..self.specializations.len()).map(FocusItem::Specialty));
        }
        items
    }

    fn begin_edit(&mut self, ctx: &AppContext) {
        let section = self.section();
        if self.form.is_none() || !Self::can_edit_section(section, ctx) {
            return;
        }
        self.editing = Some(section);
        self.focus = 0;
        self.banners[section.index()].clear();
    }

    fn cancel_edit(&mut self) {
        if let Some(form) = &mut self.form {
            form.revert();
        }
        if let Some(section) = self.editing.take() {
            self.banners[section.index()].clear();
        }
        self.submit.reset();
    }

    /// Sends the open section. On failure the section stays in edit mode.
    pub fn save(&mut self, ctx: &AppContext) {
        let (Some(section), Some(form)) = (self.editing, self.form.as_mut()) else {
            return;
        };
        let banner = &mut self.banners[section.index()];

        if let Some(problem) = form.current.validate(section) {
            banner.error(problem);
            return;
        }
        let update = form.current.update_for(section, form.original(), |field| {
            ctx.rbac.can_edit_field(HOSPITAL, field)
        });
        if update == HospitalUpdate::default() {
            form.revert();
            self.editing = None;
            return;
        }
        if !self.submit.begin() {
            return;
        }

        let result = ctx.api.update_hospital(&update);
        self.submit.finish(&result, ApiError::user_message);

        match result {
            Ok(profile) => {
                info!(section = section.title(), "hospital section saved");
                let mut saved = HospitalForm::from_profile(&profile);
                saved.billing_same_as_address = form.current.billing_same_as_address;
                form.commit(saved);
                self.profile = Some(profile);
                self.editing = None;
                banner.success(format!("{} saved", section.title()));
            }
            Err(err) => {
                warn!(section = section.title(), error = %err, "hospital section save failed");
                banner.error(err.user_message());
            }
        }
    }

    fn handle_edit_key(&mut self, key: KeyEvent, ctx: &AppContext) {
        let Some(section) = self.editing else {
            return;
        };
        let items = self.focus_items(section);
        if items.is_empty() {
            return;
        }
        let focused = items[self.focus.min(items.len() - 1)];

        if key.code == KeyCode::Char('s') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.save(ctx);
            return;
        }

        match key.code {
            KeyCode::Esc => self.cancel_edit(),
            KeyCode::Enter => self.save(ctx),
            KeyCode::Tab | KeyCode::Down => self.focus = (self.focus + 1) % items.len(),
            KeyCode::BackTab | KeyCode::Up => {
                self.focus = (self.focus + items.len() - 1) % items.len()
            }
            code => {
                let Some(form) = &mut self.form else {
                    return;
                };
                match focused {
                    FocusItem::SameAsAddress if code == KeyCode::Char(' ') => {
                        let checked = !form.current.billing_same_as_address();
                        form.current.set_billing_same_as_address(checked);
                    }
                    FocusItem::Specialty(i) if code == KeyCode::Char(' ') => {
                        if ctx.rbac.can_edit_field(HOSPITAL, SPECIALTIES_FIELD) {
                            if let Some(specialization) = self.specializations.get(i) {
                                form.current.toggle_specialty(&specialization.name);
                            }
                        }
                    }
                    FocusItem::Field(field) => {
                        if ctx.rbac.can_edit_field(HOSPITAL, field.api_name()) {
                            form.current.edit(field, code);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn field_value(&self, field: HospitalField, ctx: &AppContext) -> String {
        if !ctx.rbac.can_view_field(HOSPITAL, field.api_name()) {
            return "(hidden)".to_string();
        }
        match &self.form {
            Some(form) => form.current.value(field).to_string(),
            None => String::new(),
        }
    }

    fn render_view(&self, frame: &mut Frame, area: Rect, section: Section, ctx: &AppContext) {
        let Some(form) = &self.form else {
            return;
        };
        let mut lines: Vec<Line> = Vec::new();
        if section == Section::BillingAddress {
            let same = if form.current.billing_same_as_address() {
                "yes"
            } else {
                "no"
            };
            lines.push(widgets::detail_line("Same as address", same));
        }
        for field in section.fields() {
            let value = self.field_value(*field, ctx);
            let value = if value.is_empty() { "-".to_string() } else { value };
            lines.push(widgets::detail_line(field.label(), &value));
        }
        match section {
            Section::Classification => {
                let specialties = if !ctx.rbac.can_view_field(HOSPITAL, SPECIALTIES_FIELD) {
                    "(hidden)".to_string()
                } else if form.current.specialties().is_empty() {
                    "-".to_string()
                } else {
                    form.current.specialties().join(", ")
                };
                lines.push(widgets::detail_line("Specialties", &specialties));
            }
            Section::Branding => {
                let profile = self.profile.as_ref();
                let logo = profile.and_then(|p| p.logo_url.as_deref()).unwrap_or("-");
                let picture = profile.and_then(|p| p.picture_url.as_deref()).unwrap_or("-");
                lines.push(widgets::detail_line("Logo", logo));
                lines.push(widgets::detail_line("Picture", picture));
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    "Signed documents",
                    Style::default()
                        .fg(widgets::TITLE)
                        .add_modifier(Modifier::BOLD),
                )));
                if self.acceptances.is_empty() {
                    lines.push(Line::from(Span::styled(
                        "None on record",
                        Style::default().fg(widgets::MUTED),
                    )));
                }
                for acceptance in &self.acceptances {
                    let title = match &acceptance.version {
                        Some(version) => format!("{} (v{version})", acceptance.document_title),
                        None => acceptance.document_title.clone(),
                    };
                    let signed = format!(
                        "{} by {}",
                        format_date(acceptance.accepted_at),
                        acceptance.accepted_by.as_deref().unwrap_or("-")
                    );
                    lines.push(widgets::detail_line(&title, &signed));
                }
            }
            _ => {}
        }
        frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), area);
    }

    fn render_edit(&self, frame: &mut Frame, area: Rect, section: Section, ctx: &AppContext) {
        let Some(form) = &self.form else {
            return;
        };
        let items = self.focus_items(section);
        let mut constraints: Vec<Constraint> = items
            .iter()
            .map(|item| match item {
                FocusItem::Field(_) => Constraint::Length(3),
                _ => Constraint::Length(1),
            })
            .collect();
        constraints.push(Constraint::Min(0));
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);

        for (idx, item) in items.iter().enumerate() {
            let focused = idx == self.focus;
            match item {
                FocusItem::Field(field) => {
                    let locked = form.current.is_locked(*field)
                        || !ctx.rbac.can_edit_field(HOSPITAL, field.api_name());
                    frame.render_widget(
                        widgets::input_field(
                            field.label(),
                            &self.field_value(*field, ctx),
                            focused,
                            locked,
                        ),
                        rows[idx],
                    );
                }
                FocusItem::SameAsAddress => frame.render_widget(
                    widgets::checkbox(
                        "Same as hospital address",
                        form.current.billing_same_as_address(),
                        focused,
                    ),
                    rows[idx],
                ),
                FocusItem::Specialty(i) => {
                    if let Some(specialization) = self.specializations.get(*i) {
                        let checked = form
                            .current
                            .specialties()
                            .iter()
                            .any(|s| *s == specialization.name);
                        frame.render_widget(
                            widgets::checkbox(&specialization.name, checked, focused),
                            rows[idx],
                        );
                    }
                }
            }
        }
    }
}

impl TabPage for HospitalDetails {
    fn handle_input(&mut self, key: KeyEvent, ctx: &mut AppContext) -> Result<Option<SelectedApp>> {
        if self.editing.is_some() {
            self.handle_edit_key(key, ctx);
            return Ok(None);
        }

        match key.code {
            KeyCode::Up => {
                self.selected = (self.selected + Section::ALL.len() - 1) % Section::ALL.len();
            }
            KeyCode::Down | KeyCode::Tab => {
                self.selected = (self.selected + 1) % Section::ALL.len();
            }
            KeyCode::Enter | KeyCode::Char('e') => self.begin_edit(ctx),
            KeyCode::Char('r') => {
                self.page_banner.clear();
                self.load(ctx);
            }
            KeyCode::Esc => return Ok(Some(SelectedApp::None)),
            _ => {}
        }
        Ok(None)
    }

    fn render(&self, frame: &mut Frame, area: Rect, ctx: &AppContext) {
        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(5),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(area);
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(28), Constraint::Min(20)])
            .split(outer[0]);

        let items: Vec<ListItem> = Section::ALL
            .iter()
            .enumerate()
            .map(|(idx, section)| {
                let style = if idx == self.selected {
                    Style::default()
                        .fg(widgets::FOCUS)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(widgets::TEXT)
                };
                let prefix = if idx == self.selected { "► " } else { "  " };
                ListItem::new(format!("{prefix}{}", section.title())).style(style)
            })
            .collect();
        frame.render_widget(List::new(items).block(widgets::panel("Sections")), columns[0]);

        let section = self.section();
        let title = match self.editing {
            Some(editing) => format!("{} (editing)", editing.title()),
            None => section.title().to_string(),
        };
        let block = widgets::panel(&title);
        let inner = block.inner(columns[1]);
        frame.render_widget(block, columns[1]);

        if self.form.is_none() {
            let message = Paragraph::new("Hospital details could not be loaded. Press r to retry.")
                .style(Style::default().fg(widgets::MUTED))
                .wrap(Wrap { trim: true });
            frame.render_widget(message, inner);
            frame.render_widget(widgets::status_line(&self.page_banner), outer[1]);
        } else {
            match self.editing {
                Some(editing) => self.render_edit(frame, inner, editing, ctx),
                None => self.render_view(frame, inner, section, ctx),
            }
            let banner_section = self.editing.unwrap_or(section);
            frame.render_widget(
                widgets::status_line(&self.banners[banner_section.index()]),
                outer[1],
            );
        }

        let help = if self.editing.is_some() {
            "Tab/↑↓: Field | Space: Toggle | Enter/Ctrl+S: Save | Esc: Cancel"
        } else {
            "↑↓: Section | Enter/e: Edit | r: Reload | PgUp/PgDn: Tab | Esc: Back"
        };
        frame.render_widget(widgets::help(help), outer[2]);
    }

    fn tick(&mut self) {
        self.page_banner.check_timeout();
        for banner in &mut self.banners {
            banner.check_timeout();
        }
    }

    fn is_capturing(&self) -> bool {
        self.editing.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockTransport;
    use crate::api::Method;
    use crate::context::testing::{signed_in, super_admin};
    use serde_json::json;

    fn hospital_json(name: &str) -> serde_json::Value {
        json!({
            "id": "h1",
            "name": name,
            "email": "info@stmary.org",
            "addressLine": "1 Main St",
            "city": "Springfield",
            "state": "IL",
            "postalCode": "62701",
            "country": "US",
            "billingAddressLine": "PO Box 9",
            "billingCity": "Springfield",
            "specialties": ["Cardiology"]
        })
    }

    fn profile() -> HospitalProfile {
        serde_json::from_value(hospital_json("St. Mary")).unwrap()
    }

    fn mounted(mock: &MockTransport) -> (AppContext, HospitalDetails) {
        mock.respond(Method::Get, "/v1/hospitals/h1", 200, hospital_json("St. Mary"));
        mock.respond(
            Method::Get,
            "/v1/specializations",
            200,
            json!([{ "id": "s1", "name": "Cardiology" }, { "id": "s2", "name": "Oncology" }]),
        );
        mock.respond(Method::Get, "/v1/legal/hospital-acceptances", 200, json!([]));
        let ctx = super_admin(mock);
        let page = HospitalDetails::mount(&ctx);
        (ctx, page)
    }

    fn rename(page: &mut HospitalDetails, name: &str) {
        let form = page.form.as_mut().unwrap();
        form.current.set(HospitalField::Name, name);
    }

    #[test]
    fn same_as_address_copies_once_and_keeps_values_when_unchecked() {
        let mut form = HospitalForm::from_profile(&profile());
        assert!(!form.billing_same_as_address());

        form.set_billing_same_as_address(true);
        for (primary, billing) in ADDRESS_PAIRS {
            assert_eq!(form.value(billing), form.value(primary));
        }

        form.set(HospitalField::City, "Chicago");
        assert_eq!(form.value(HospitalField::BillingCity), "Chicago");
        assert!(!form.edit(HospitalField::BillingCity, KeyCode::Char('x')));

        form.set_billing_same_as_address(false);
        assert_eq!(form.value(HospitalField::BillingAddressLine), "1 Main St");
        assert_eq!(form.value(HospitalField::BillingCity), "Chicago");

        form.set(HospitalField::City, "Peoria");
        assert_eq!(form.value(HospitalField::BillingCity), "Chicago");
    }

    #[test]
    fn section_update_only_carries_changed_fields_of_that_section() {
        let original = HospitalForm::from_profile(&profile());
        let mut form = original.clone();
        let any = |_: &str| true;
        assert_eq!(form.update_for(Section::Manager, &original, any), HospitalUpdate::default());

        form.set(HospitalField::ManagerName, "Dr. Osei");
        form.set(HospitalField::Name, "Mercy");
        let update = form.update_for(Section::Manager, &original, any);
        assert_eq!(update.manager_name.as_deref(), Some("Dr. Osei"));
        assert_eq!(update.manager_email, None);
        assert_eq!(update.name, None);

        form.set_billing_same_as_address(true);
        form.set(HospitalField::City, "Chicago");
        let update = form.update_for(Section::Address, &original, any);
        assert_eq!(update.city.as_deref(), Some("Chicago"));
        assert_eq!(update.billing_city.as_deref(), Some("Chicago"));
        assert_eq!(update.billing_address_line.as_deref(), Some("1 Main St"));
        assert_eq!(update.state, None);

        assert_eq!(form.update_for(Section::Classification, &original, any).specialties, None);
        form.toggle_specialty("Oncology");
        let update = form.update_for(Section::Classification, &original, any);
        assert_eq!(
            update.specialties,
            Some(vec!["Cardiology".to_string(), "Oncology".to_string()])
        );
        let update = form.update_for(Section::Classification, &original, |f| f != SPECIALTIES_FIELD);
        assert_eq!(update.specialties, None);
    }

    #[test]
    fn field_grants_limit_what_a_section_sends() {
        let mock = MockTransport::new();
        let mut hospital = hospital_json("St. Mary");
        hospital["taxId"] = json!("123");
        mock.respond(Method::Get, "/v1/hospitals/h1", 200, hospital.clone());
        hospital["legalName"] = json!("SMH");
        mock.respond(Method::Patch, "/v1/hospitals/h1", 200, hospital);
        let ctx = signed_in(
            &mock,
            json!({ "permissions": [{
                "resource": "hospital",
                "actions": ["view", "edit"],
                "viewable": ["legalName"],
                "editable": ["legalName"]
            }] }),
        );
        let mut page = HospitalDetails::mount(&ctx);
        page.selected = Section::Legal.index();
        page.begin_edit(&ctx);
        assert_eq!(page.editing, Some(Section::Legal));

        let form = page.form.as_mut().unwrap();
        form.current.set(HospitalField::LegalName, "SMH");
        form.current.set(HospitalField::TaxId, "999");
        page.save(&ctx);

        let body = mock.last_request().unwrap().body.unwrap();
        assert_eq!(body, json!({ "legalName": "SMH" }));
        assert_eq!(page.editing, None);
    }

    #[test]
    fn unchanged_section_sends_nothing() {
        let mock = MockTransport::new();
        let (ctx, mut page) = mounted(&mock);
        page.begin_edit(&ctx);
        page.save(&ctx);
        assert!(mock.requests_to(Method::Patch, "/v1/hospitals/h1").is_empty());
        assert_eq!(page.editing, None);
    }

    #[test]
    fn failed_save_keeps_section_open_with_error() {
        let mock = MockTransport::new();
        let (ctx, mut page) = mounted(&mock);
        mock.respond(
            Method::Patch,
            "/v1/hospitals/h1",
            422,
            json!({ "message": "name already taken" }),
        );

        page.begin_edit(&ctx);
        assert_eq!(page.editing, Some(Section::General));
        rename(&mut page, "Mercy");
        page.save(&ctx);

        assert_eq!(page.editing, Some(Section::General));
        let banner = &page.banners[Section::General.index()];
        assert!(banner.is_error());
        assert_eq!(banner.current().map(|(_, m)| m), Some("name already taken"));
        let form = page.form.as_ref().unwrap();
        assert_eq!(form.current.value(HospitalField::Name), "Mercy");
        assert_eq!(form.original().value(HospitalField::Name), "St. Mary");
    }

    #[test]
    fn successful_save_closes_section_and_updates_original() {
        let mock = MockTransport::new();
        let (ctx, mut page) = mounted(&mock);
        mock.respond(Method::Patch, "/v1/hospitals/h1", 200, hospital_json("Mercy"));

        page.begin_edit(&ctx);
        rename(&mut page, "Mercy");
        page.save(&ctx);

        assert_eq!(page.editing, None);
        assert!(page.banners[Section::General.index()].is_success());
        let form = page.form.as_ref().unwrap();
        assert_eq!(form.original().value(HospitalField::Name), "Mercy");
        assert!(!form.is_dirty());

        let body = mock.last_request().unwrap().body.unwrap();
        assert_eq!(body["name"], "Mercy");
        assert!(body.get("city").is_none());
    }

    #[test]
    fn cancel_reverts_edits() {
        let mock = MockTransport::new();
        let (ctx, mut page) = mounted(&mock);
        page.begin_edit(&ctx);
        rename(&mut page, "Mercy");
        page.cancel_edit();
        assert_eq!(page.editing, None);
        assert_eq!(
            page.form.as_ref().unwrap().current.value(HospitalField::Name),
            "St. Mary"
        );
    }

    #[test]
    fn blank_name_is_rejected_without_a_request() {
        let mock = MockTransport::new();
        let (ctx, mut page) = mounted(&mock);
        let before = mock.requests().len();
        page.begin_edit(&ctx);
        rename(&mut page, "  ");
        page.save(&ctx);
        assert_eq!(mock.requests().len(), before);
        assert!(page.banners[Section::General.index()].is_error());
    }

    #[test]
    fn read_only_users_cannot_enter_edit_mode() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v1/hospitals/h1", 200, hospital_json("St. Mary"));
        let ctx = signed_in(
            &mock,
            json!({ "permissions": [{ "resource": "hospital", "actions": ["view"], "viewable": ["*"] }] }),
        );
        let mut page = HospitalDetails::mount(&ctx);
        page.begin_edit(&ctx);
        assert_eq!(page.editing, None);
    }

    #[test]
    fn failed_document_fetch_leaves_list_empty() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v1/hospitals/h1", 200, hospital_json("St. Mary"));
        mock.respond(Method::Get, "/v1/legal/hospital-acceptances", 500, json!({}));
        let ctx = super_admin(&mock);
        let page = HospitalDetails::mount(&ctx);
        assert!(page.form.is_some());
        assert!(page.acceptances.is_empty());
        assert!(page.page_banner.current().is_none());
    }

    #[test]
    fn toggling_specialty_in_classification() {
        let mock = MockTransport::new();
        let (mut ctx, mut page) = mounted(&mock);
        page.selected = Section::Classification.index();
        page.begin_edit(&ctx);
        // Focus order: hospital type, Cardiology, Oncology.
        page.handle_input(KeyEvent::from(KeyCode::Down), &mut ctx).unwrap();
        page.handle_input(KeyEvent::from(KeyCode::Down), &mut ctx).unwrap();
        page.handle_input(KeyEvent::from(KeyCode::Char(' ')), &mut ctx).unwrap();
        assert_eq!(
            page.form.as_ref().unwrap().current.specialties(),
            ["Cardiology".to_string(), "Oncology".to_string()]
        );
    }
}
