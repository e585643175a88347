//! Session lifecycle and the local session store.
//!
//! A [`Session`] is established on login (token verified against
//! `GET /v1/me`) and torn down on logout. The token and the active hospital
//! are persisted in a small SQLite database so the console can resume where
//! it left off.

use crate::api::{ApiClient, ApiError};
use crate::models::UserProfile;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::info;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS session (
    id          INTEGER PRIMARY KEY CHECK (id = 1),
    api_url     TEXT NOT NULL,
    token       TEXT NOT NULL,
    hospital_id TEXT
);
";

/// The signed-in user and the hospital they are working in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub profile: UserProfile,
    pub hospital_id: Option<String>,
}

impl Session {
    /// Verifies `token` and binds the client to the resulting session.
    ///
    /// The hospital is, in order of preference: `preferred_hospital` if the
    /// user is a member of it (super admins may pick any), the profile's
    /// default hospital, or the first membership.
    pub fn establish(
        api: &mut ApiClient,
        token: &str,
        preferred_hospital: Option<&str>,
    ) -> Result<Self, ApiError> {
        api.clear_credentials();
        api.set_token(token);

        let profile = match api.me() {
            Ok(profile) => profile,
            Err(err) => {
                api.clear_credentials();
                return Err(err);
            }
        };

        let hospital_id = resolve_hospital(&profile, preferred_hospital);
        api.set_hospital(hospital_id.clone());
        info!(user = %profile.id, hospital = ?hospital_id, "session established");

        Ok(Self {
            token: token.to_string(),
            profile,
            hospital_id,
        })
    }

    /// Makes `hospital_id` the active tenant.
    pub fn switch_hospital(&mut self, api: &mut ApiClient, hospital_id: &str) {
        self.hospital_id = Some(hospital_id.to_string());
        api.set_hospital(self.hospital_id.clone());
        info!(hospital = hospital_id, "active hospital changed");
    }

    pub fn hospital_name(&self) -> Option<&str> {
        let id = self.hospital_id.as_deref()?;
        self.profile
            .hospitals
            .iter()
            .find(|membership| membership.id == id)
            .map(|membership| membership.name.as_str())
    }

    pub fn teardown(self, api: &mut ApiClient) {
        api.clear_credentials();
        info!(user = %self.profile.id, "session closed");
    }
}

fn resolve_hospital(profile: &UserProfile, preferred: Option<&str>) -> Option<String> {
    let is_member = |id: &str| profile.hospitals.iter().any(|membership| membership.id == id);
    if let Some(preferred) = preferred.filter(|id| !id.is_empty()) {
        if profile.is_super_admin || is_member(preferred) {
            return Some(preferred.to_string());
        }
    }
    profile
        .hospital_id
        .clone()
        .or_else(|| profile.hospitals.first().map(|membership| membership.id.clone()))
}

/// What the store remembers between launches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub api_url: String,
    pub token: String,
    pub hospital_id: Option<String>,
}

pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Opens (and creates if needed) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        store
            .connect()?
            .execute_batch(SCHEMA)
            .context("Failed to create session schema")?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.path)
            .with_context(|| format!("Failed to open session store {}", self.path.display()))
    }

    pub fn save(&self, session: &StoredSession) -> Result<()> {
        self.connect()?.execute(
            "INSERT INTO session (id, api_url, token, hospital_id) VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET api_url = ?1, token = ?2, hospital_id = ?3",
            params![session.api_url, session.token, session.hospital_id],
        )?;
        Ok(())
    }

    /// The stored session, if it was created against `api_url`.
    pub fn load(&self, api_url: &str) -> Result<Option<StoredSession>> {
        let conn = self.connect()?;
        let stored = conn
            .query_row(
                "SELECT api_url, token, hospital_id FROM session WHERE id = 1",
                [],
                |row| {
                    Ok(StoredSession {
                        api_url: row.get(0)?,
                        token: row.get(1)?,
                        hospital_id: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(stored.filter(|session| session.api_url == api_url))
    }

    pub fn clear(&self) -> Result<()> {
        self.connect()?.execute("DELETE FROM session", [])?;
        Ok(())
    }
}
