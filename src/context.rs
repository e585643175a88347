//! Everything a screen needs from the outside world, passed down explicitly.

use crate::api::{ApiClient, ApiError};
use crate::rbac::RbacContext;
use crate::session::{Session, SessionStore, StoredSession};
use anyhow::Result;
use tracing::{info, warn};

pub struct AppContext {
    pub api: ApiClient,
    pub session: Option<Session>,
    pub rbac: RbacContext,
    store: Option<SessionStore>,
}

impl AppContext {
    pub fn new(api: ApiClient, store: Option<SessionStore>) -> Self {
        Self {
            api,
            session: None,
            rbac: RbacContext::default(),
            store,
        }
    }

    /// Signs in with `token`, remembers the session and loads permissions.
    pub fn login(&mut self, token: &str, hospital_id: Option<&str>) -> Result<(), ApiError> {
        let session = Session::establish(&mut self.api, token, hospital_id)?;
        self.rbac = RbacContext::new(session.profile.is_super_admin);
        self.rbac.sync_scope(&self.api, &session);
        self.session = Some(session);
        self.persist();
        Ok(())
    }

    /// Resumes the stored session, if any. A rejected token is forgotten.
    /// Signs in with the remembered session, if any. An unreadable store
    /// only loses the remembered login.
    pub fn resume(&mut self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        let stored = match store.load(self.api.base_url()) {
            Ok(Some(stored)) => stored,
            Ok(None) => return false,
            Err(err) => {
                warn!(error = %err, "could not read stored session");
                return false;
            }
        };

        match self.login(&stored.token, stored.hospital_id.as_deref()) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "stored session rejected");
                if err.is_unauthorized() {
                    self.forget();
                }
                false
            }
        }
    }

    pub fn logout(&mut self) {
        if let Some(session) = self.session.take() {
            session.teardown(&mut self.api);
        }
        self.rbac.clear();
        self.forget();
    }

    /// Makes `hospital_id` active and reloads the permission cache for it.
    pub fn switch_hospital(&mut self, hospital_id: &str) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.switch_hospital(&mut self.api, hospital_id);
        self.rbac.sync_scope(&self.api, session);
        self.persist();
    }

    pub fn refresh_permissions(&mut self) {
        if let Some(session) = &self.session {
            self.rbac.refresh_permissions(&self.api, session);
        }
    }

    pub fn hospital_id(&self) -> Option<&str> {
        self.session.as_ref()?.hospital_id.as_deref()
    }

    fn persist(&self) {
        let (Some(store), Some(session)) = (&self.store, &self.session) else {
            return;
        };
        let stored = StoredSession {
            api_url: self.api.base_url().to_string(),
            token: session.token.clone(),
            hospital_id: session.hospital_id.clone(),
        };
        if let Err(err) = store.save(&stored) {
            warn!(error = %err, "could not persist session");
        }
    }

    fn forget(&self) {
        if let Some(store) = &self.store {
            match store.clear() {
                Ok(()) => info!("stored session cleared"),
                Err(err) => warn!(error = %err, "could not clear stored session"),
            }
        }
    }
}
