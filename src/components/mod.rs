use crate::app::SelectedApp;
use crate::context::AppContext;
use crate::tui::Frame;
use anyhow::Result;
use crossterm::event::KeyEvent;

pub mod home;
pub mod hospital;
pub mod login;
pub mod settings;
pub mod widgets;

pub trait Component {
    fn handle_input(&mut self, event: KeyEvent, ctx: &mut AppContext) -> Result<Option<SelectedApp>>;
    fn render(&self, frame: &mut Frame, ctx: &AppContext);
    /// Called on every idle tick, e.g. to expire banners.
    fn tick(&mut self) {}
}
