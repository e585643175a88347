mod api;
mod app;
mod components;
mod config;
mod context;
mod forms;
mod logging;
mod models;
mod rbac;
mod session;
mod tui;

use anyhow::Result;
use api::{ApiClient, UreqTransport};
use app::App;
use clap::Parser;
use config::Config;
use context::AppContext;
use crossterm::{
    event::DisableMouseCapture,
    terminal::{self, LeaveAlternateScreen},
};
use ratatui::prelude::{CrosstermBackend, Terminal};
use session::SessionStore;
use std::io;
use tracing::{error, info, warn};
use tui::Tui;

fn main() -> Result<()> {
    let config = Config::parse();
    logging::init(&config)?;
    info!(api_url = config.api_url(), "starting hospital-admin");

    let transport = UreqTransport::new(config.timeout());
    let api = ApiClient::new(config.api_url(), Box::new(transport));

    // A broken session file only costs the remembered login.
    let store = match SessionStore::open(&config.session_db) {
        Ok(store) => Some(store),
        Err(err) => {
            warn!(error = %err, "session store unavailable");
            None
        }
    };
    if config.forget_session {
        if let Some(Err(err)) = store.as_ref().map(SessionStore::clear) {
            warn!(error = %err, "could not forget stored session");
        }
    }

    let mut ctx = AppContext::new(api, store);
    match &config.token {
        Some(token) => {
            if let Err(err) = ctx.login(token, config.hospital_id.as_deref()) {
                warn!(error = %err, "token from configuration rejected");
            }
        }
        None => {
            if !ctx.resume() {
                info!("no usable stored session");
            }
        }
    }

    let _guard = CleanupGuard;

    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    terminal.clear()?;

    let mut tui = Tui::new(terminal, config.framerate);
    tui.init()?;

    let mut app = App::new(ctx);
    let res = app.run(&mut tui);

    tui.exit()?;

    if let Err(e) = res {
        error!(error = %e, "application error");
        eprintln!("Application Error: {e}");
    }
    info!("bye");
    Ok(())
}

struct CleanupGuard;

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        // Ignore errors during cleanup
        let _ = terminal::disable_raw_mode();
        let _ = crossterm::execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
    }
}
