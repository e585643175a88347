//! Hospital workspace.
//!
//! One tab per administrative area of the active hospital. Each tab is a
//! [`TabPage`] that loads its data when it is opened and renders below the
//! shared tab bar.

use crate::app::SelectedApp;
use crate::components::widgets;
use crate::components::Component;
use crate::context::AppContext;
use crate::rbac::resources;
use crate::tui::Frame;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{prelude::*, widgets::Tabs};

pub mod billing;
pub mod details;
pub mod doctors;
pub mod patients;
pub mod staff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HospitalTab {
    Details,
    Staff,
    Doctors,
    Patients,
    Billing,
}

impl HospitalTab {
    pub const ALL: [HospitalTab; 5] = [
        HospitalTab::Details,
        HospitalTab::Staff,
        HospitalTab::Doctors,
        HospitalTab::Patients,
        HospitalTab::Billing,
    ];

    pub const fn title(&self) -> &'static str {
        match self {
            HospitalTab::Details => "Details",
            HospitalTab::Staff => "Staff",
            HospitalTab::Doctors => "Doctors",
            HospitalTab::Patients => "Patients",
            HospitalTab::Billing => "Billing",
        }
    }

    /// The RBAC resource that gates the tab.
    pub const fn resource(&self) -> &'static str {
        match self {
            HospitalTab::Details => resources::HOSPITAL,
            HospitalTab::Staff => resources::STAFF,
            HospitalTab::Doctors => resources::DOCTORS,
            HospitalTab::Patients => resources::PATIENTS,
            HospitalTab::Billing => resources::BILLING,
        }
    }

    fn mount(self, ctx: &AppContext) -> Box<dyn TabPage> {
        match self {
            HospitalTab::Details => Box::new(details::HospitalDetails::mount(ctx)),
            HospitalTab::Staff => Box::new(staff::StaffPage::mount(ctx)),
            HospitalTab::Doctors => Box::new(doctors::DoctorsPage::mount(ctx)),
            HospitalTab::Patients => Box::new(patients::PatientsPage::mount(ctx)),
            HospitalTab::Billing => Box::new(billing::BillingPage::mount(ctx)),
        }
    }
}

/// A tab inside the hospital workspace.
pub trait TabPage {
    fn handle_input(&mut self, key: KeyEvent, ctx: &mut AppContext) -> Result<Option<SelectedApp>>;
    fn render(&self, frame: &mut Frame, area: Rect, ctx: &AppContext);
    fn tick(&mut self) {}
    /// True while a form or dialog owns the keyboard.
    fn is_capturing(&self) -> bool {
        false
    }
}

pub struct HospitalApp {
    pub tab: HospitalTab,
    page: Box<dyn TabPage>,
}

impl HospitalApp {
    pub fn new(tab: HospitalTab, ctx: &AppContext) -> Self {
        Self {
            tab,
            page: tab.mount(ctx),
        }
    }

    fn visible_tabs(ctx: &AppContext) -> Vec<HospitalTab> {
        HospitalTab::ALL
            .into_iter()
            .filter(|tab| ctx.rbac.has_any_permission(tab.resource()))
            .collect()
    }

    fn switch_to(&mut self, tab: HospitalTab, ctx: &AppContext) {
        if tab != self.tab {
            self.tab = tab;
            self.page = tab.mount(ctx);
        }
    }

    fn cycle(&mut self, ctx: &AppContext, forward: bool) {
        let tabs = Self::visible_tabs(ctx);
        if tabs.is_empty() {
            return;
        }
        let current = tabs.iter().position(|tab| *tab == self.tab);
        let next = match current {
            Some(i) if forward => (i + 1) % tabs.len(),
            Some(i) => (i + tabs.len() - 1) % tabs.len(),
            None => 0,
        };
        self.switch_to(tabs[next], ctx);
    }
}

impl Component for HospitalApp {
    fn handle_input(&mut self, event: KeyEvent, ctx: &mut AppContext) -> Result<Option<SelectedApp>> {
        if !self.page.is_capturing() {
            match event.code {
                KeyCode::PageDown => {
                    self.cycle(ctx, true);
                    return Ok(None);
                }
                KeyCode::PageUp => {
                    self.cycle(ctx, false);
                    return Ok(None);
                }
                _ => {}
            }
        }

        match self.page.handle_input(event, ctx)? {
            Some(SelectedApp::Hospital(tab)) => {
                self.switch_to(tab, ctx);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn render(&self, frame: &mut Frame, ctx: &AppContext) {
        let area = widgets::background(frame);
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),
                Constraint::Length(1),
                Constraint::Min(5),
            ])
            .split(area);

        let hospital = ctx
            .session
            .as_ref()
            .and_then(|session| session.hospital_name())
            .unwrap_or("Hospital");
        widgets::header(frame, layout[0], hospital);

        let tabs = Self::visible_tabs(ctx);
        let selected = tabs.iter().position(|tab| *tab == self.tab);
        let titles: Vec<Line> = tabs.iter().map(|tab| Line::from(tab.title())).collect();
        let bar = Tabs::new(titles)
            .select(selected.unwrap_or(0))
            .style(Style::default().fg(widgets::MUTED).bg(widgets::BG))
            .highlight_style(
                Style::default()
                    .fg(widgets::FOCUS)
                    .add_modifier(Modifier::BOLD),
            )
            .divider(" | ");
        frame.render_widget(bar, layout[1]);

        self.page.render(frame, layout[2], ctx);
    }

    fn tick(&mut self) {
        self.page.tick();
    }
}
