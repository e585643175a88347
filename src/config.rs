//! Command-line and environment configuration.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Terminal console for administering a hospital tenant.
#[derive(Parser, Debug, Clone)]
#[command(name = "hospital-admin", version, about)]
pub struct Config {
    /// Base URL of the hospital REST API
    #[arg(long, env = "HOSPITAL_ADMIN_API_URL", default_value = "http://localhost:3000")]
    pub api_url: String,

    /// Bearer token; skips the login screen when set
    #[arg(long, env = "HOSPITAL_ADMIN_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Hospital to open instead of the account's default
    #[arg(long, env = "HOSPITAL_ADMIN_HOSPITAL_ID")]
    pub hospital_id: Option<String>,

    /// SQLite file remembering the last session
    #[arg(long, env = "HOSPITAL_ADMIN_SESSION_DB", default_value = "hospital-admin.db")]
    pub session_db: PathBuf,

    /// Log file (the terminal is owned by the UI)
    #[arg(long, env = "HOSPITAL_ADMIN_LOG_FILE", default_value = "hospital-admin.log")]
    pub log_file: PathBuf,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, env = "HOSPITAL_ADMIN_LOG", default_value = "info")]
    pub log_level: String,

    /// HTTP timeout in seconds
    #[arg(long, env = "HOSPITAL_ADMIN_TIMEOUT", default_value_t = 30)]
    pub timeout_secs: u64,

    /// UI refresh rate in frames per second
    #[arg(long, default_value_t = 30.0)]
    pub framerate: f64,

    /// Forget the stored session before starting
    #[arg(long)]
    pub forget_session: bool,
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn api_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }
}
