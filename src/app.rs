//! The main application state and logic.
//!
//! `App` owns the [`AppContext`] and the screen components, routes key
//! events to the active screen and switches screens based on what the
//! screen asks for.

use crate::components::hospital::{HospitalApp, HospitalTab};
use crate::components::settings::Settings;
use crate::components::{home::Home, login::Login, Component};
use crate::context::AppContext;
use crate::tui::{self, Tui};
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::info;

/// What a screen asks the application to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectedApp {
    /// Open the hospital workspace on the given tab.
    Hospital(HospitalTab),
    /// Open the settings screen.
    Settings,
    /// Leave the current screen.
    None,
    /// End the session and return to the login screen.
    Logout,
    /// Exit the program.
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Login,
    Home,
    Hospital,
    Settings,
}

pub struct App {
    pub state: AppState,
    pub should_quit: bool,
    pub ctx: AppContext,
    pub login: Login,
    pub home: Home,
    /// Only exists while the hospital workspace is open.
    pub hospital: Option<HospitalApp>,
    /// Only exists while the settings screen is open.
    pub settings: Option<Settings>,
}

impl App {
    pub fn new(ctx: AppContext) -> Self {
        let state = if ctx.session.is_some() {
            AppState::Home
        } else {
            AppState::Login
        };
        Self {
            state,
            should_quit: false,
            ctx,
            login: Login::new(),
            home: Home::new(),
            hospital: None,
            settings: None,
        }
    }

    /// Runs the main loop until the user quits.
    pub fn run(&mut self, tui: &mut Tui) -> Result<()> {
        while !self.should_quit {
            tui.draw(|frame| self.render_ui(frame))?;
            match tui.next_event()? {
                tui::Event::Input(crossterm::event::Event::Key(key))
                    if key.kind == KeyEventKind::Press =>
                {
                    self.handle_key(key)?;
                }
                tui::Event::Input(_) => {}
                tui::Event::Tick => self.tick(),
            }
        }
        Ok(())
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        // Global keybinding: Ctrl+Q to quit
        if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return Ok(());
        }

        let selected = match self.state {
            AppState::Login => self.login.handle_input(key, &mut self.ctx)?,
            AppState::Home => self.home.handle_input(key, &mut self.ctx)?,
            AppState::Hospital => match &mut self.hospital {
                Some(hospital) => hospital.handle_input(key, &mut self.ctx)?,
                None => Some(SelectedApp::None),
            },
            AppState::Settings => match &mut self.settings {
                Some(settings) => settings.handle_input(key, &mut self.ctx)?,
                None => Some(SelectedApp::None),
            },
        };

        if let Some(selected) = selected {
            self.navigate(selected);
        }
        Ok(())
    }

    fn navigate(&mut self, selected: SelectedApp) {
        match (self.state, selected) {
            (_, SelectedApp::Quit) => self.should_quit = true,
            (_, SelectedApp::Logout) => {
                self.ctx.logout();
                self.hospital = None;
                self.settings = None;
                self.login = Login::new();
                self.home = Home::new();
                self.state = AppState::Login;
            }
            (AppState::Login, _) => {
                if self.ctx.session.is_some() {
                    self.state = AppState::Home;
                }
            }
            (_, SelectedApp::Hospital(tab)) => {
                info!(tab = tab.title(), "opening hospital workspace");
                self.hospital = Some(HospitalApp::new(tab, &self.ctx));
                self.settings = None;
                self.state = AppState::Hospital;
            }
            (_, SelectedApp::Settings) => {
                self.settings = Some(Settings::new(&self.ctx));
                self.hospital = None;
                self.state = AppState::Settings;
            }
            (_, SelectedApp::None) => {
                self.hospital = None;
                self.settings = None;
                self.state = AppState::Home;
            }
        }
    }

    fn tick(&mut self) {
        match self.state {
            AppState::Login => self.login.tick(),
            AppState::Home => self.home.tick(),
            AppState::Hospital => {
                if let Some(hospital) = &mut self.hospital {
                    hospital.tick();
                }
            }
            AppState::Settings => {
                if let Some(settings) = &mut self.settings {
                    settings.tick();
                }
            }
        }
    }

    fn render_ui(&self, frame: &mut crate::tui::Frame<'_>) {
        match self.state {
            AppState::Login => self.login.render(frame, &self.ctx),
            AppState::Home => self.home.render(frame, &self.ctx),
            AppState::Hospital => {
                if let Some(hospital) = &self.hospital {
                    hospital.render(frame, &self.ctx);
                }
            }
            AppState::Settings => {
                if let Some(settings) = &self.settings {
                    settings.render(frame, &self.ctx);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockTransport;
    use crate::context::testing::super_admin;
    use crossterm::event::KeyModifiers;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn starts_on_home_when_signed_in() {
        let mock = MockTransport::new();
        let app = App::new(super_admin(&mock));
        assert_eq!(app.state, AppState::Home);
    }

    #[test]
    fn logout_returns_to_login_and_clears_session() {
        let mock = MockTransport::new();
        let mut app = App::new(super_admin(&mock));
        app.navigate(SelectedApp::Settings);
        assert_eq!(app.state, AppState::Settings);

        app.navigate(SelectedApp::Logout);
        assert_eq!(app.state, AppState::Login);
        assert!(app.ctx.session.is_none());
        assert!(app.settings.is_none());
    }

    #[test]
    fn ctrl_q_quits_from_anywhere() {
        let mock = MockTransport::new();
        let mut app = App::new(super_admin(&mock));
        app.handle_key(key(KeyCode::Char('x'))).unwrap();
        assert!(!app.should_quit);
        app.handle_key(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::CONTROL))
            .unwrap();
        assert!(app.should_quit);
    }

    #[test]
    fn leaving_a_workspace_goes_home() {
        let mock = MockTransport::new();
        let mut app = App::new(super_admin(&mock));
        app.navigate(SelectedApp::Hospital(HospitalTab::Billing));
        assert_eq!(app.state, AppState::Hospital);
        app.handle_key(key(KeyCode::Esc)).unwrap();
        assert_eq!(app.state, AppState::Home);
        assert!(app.hospital.is_none());
    }
}
