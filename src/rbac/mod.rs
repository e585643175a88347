//! Client-side permission cache.
//!
//! The API resolves the user's roles into a flat list of per-resource
//! grants. `RbacContext` fetches that list once per (user, hospital) pair and
//! answers permission questions synchronously so screens can decide which
//! actions and fields to offer.
//!
//! Predicates fail closed: while the list is loading only a super admin (per
//! the profile) is allowed anything, and after a failed fetch nobody is,
//! unless the profile says super admin, in which case a full grant is
//! synthesized so an administrator is never locked out.

use crate::api::{ApiClient, ApiError};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};


/// Grants every field.
pub const WILDCARD: &str = "*";

/// Resource names used by the screens.
pub mod resources {
    pub const HOSPITAL: &str = "hospital";
    pub const STAFF: &str = "staff";
    pub const DOCTORS: &str = "doctors";
    pub const PATIENTS: &str = "patients";
    pub const BILLING: &str = "billing";
    pub const LICENSES: &str = "licenses";
    pub const INVITES: &str = "invites";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Add,
    Edit,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Add => "add",
            Action::Edit => "edit",
            Action::Delete => "delete",
        }
    }
}

/// Grants on a single resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePermission {
    pub resource: String,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub viewable: Vec<String>,
    #[serde(default)]
    pub editable: Vec<String>,
}

impl ResourcePermission {
    fn allows(&self, action: &str) -> bool {
        self.actions.iter().any(|allowed| allowed == action)
    }
}

fn field_listed(fields: &[String], field: &str) -> bool {
    fields
        .iter()
        .any(|listed| listed == WILDCARD || listed == field)
}

/// Response of `GET /v1/rbac/my-permissions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSet {
    #[serde(default)]
    pub is_super_admin: bool,
    #[serde(default)]
    pub permissions: Vec<ResourcePermission>,
}

impl PermissionSet {
    /// What a super admin gets when the permission service is unreachable.
    pub fn super_admin_fallback() -> Self {
        Self {
            is_super_admin: true,
            permissions: Vec::new(),
        }
    }

    pub fn resource(&self, resource: &str) -> Option<&ResourcePermission> {
        self.permissions
            .iter()
            .find(|permission| permission.resource == resource)
    }

    pub fn can(&self, resource: &str, action: &str) -> bool {
        self.is_super_admin
            || self
                .resource(resource)
                .is_some_and(|permission| permission.allows(action))
    }

    pub fn can_view_field(&self, resource: &str, field: &str) -> bool {
        self.is_super_admin
            || self
                .resource(resource)
                .is_some_and(|permission| field_listed(&permission.viewable, field))
    }

    pub fn can_edit_field(&self, resource: &str, field: &str) -> bool {
        self.is_super_admin
            || self
                .resource(resource)
                .is_some_and(|permission| field_listed(&permission.editable, field))
    }

    pub fn has_any_permission(&self, resource: &str) -> bool {
        self.is_super_admin
            || self
                .resource(resource)
                .is_some_and(|permission| !permission.actions.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionState {
    /// No permission list yet.
    Loading,
    Ready(PermissionSet),
    /// The fetch failed and the user is not a super admin.
    Failed(String),
}

/// The (user, hospital) pair a permission list was loaded for.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Scope {
    user_id: String,
    hospital_id: Option<String>,
}

impl Scope {
    fn of(session: &Session) -> Self {
        Self {
            user_id: session.profile.id.clone(),
            hospital_id: session.hospital_id.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RbacContext {
    /// Super-admin flag from the user profile, used until the list arrives.
    profile_super_admin: bool,
    state: PermissionState,
    scope: Option<Scope>,
}

impl Default for RbacContext {
    fn default() -> Self {
        Self::new(false)
    }
}

impl RbacContext {
    pub fn new(profile_super_admin: bool) -> Self {
        Self {
            profile_super_admin,
            state: PermissionState::Loading,
            scope: None,
        }
    }

    pub fn state(&self) -> &PermissionState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, PermissionState::Loading)
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            PermissionState::Failed(message) => Some(message.as_str()),
            _ => None,
        }
    }

    /// Loads permissions unless they are already cached for this session's
    /// user and hospital.
    pub fn sync_scope(&mut self, api: &ApiClient, session: &Session) {
        let scope = Scope::of(session);
        if self.scope.as_ref() == Some(&scope) && !self.is_loading() {
            return;
        }
        self.load(api, session);
    }

    /// Re-fetches the permission list, e.g. after a role change.
    pub fn refresh_permissions(&mut self, api: &ApiClient, session: &Session) {
        self.load(api, session);
    }

    fn load(&mut self, api: &ApiClient, session: &Session) {
        self.profile_super_admin = session.profile.is_super_admin;
        self.scope = Some(Scope::of(session));
        self.state = PermissionState::Loading;
        self.resolve(api.my_permissions());
    }

    /// Applies the outcome of a permission fetch.
    pub fn resolve(&mut self, result: Result<PermissionSet, ApiError>) {
        self.state = match result {
            Ok(set) => {
                info!(
                    resources = set.permissions.len(),
                    super_admin = set.is_super_admin,
                    "permissions loaded"
                );
                PermissionState::Ready(set)
            }
            Err(err) if self.profile_super_admin => {
                warn!(error = %err, "permission fetch failed; granting super admin access");
                PermissionState::Ready(PermissionSet::super_admin_fallback())
            }
            Err(err) => {
                warn!(error = %err, "permission fetch failed");
                PermissionState::Failed(err.user_message())
            }
        };
    }

    /// Forgets everything, used on logout.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_super_admin(&self) -> bool {
        match &self.state {
            PermissionState::Ready(set) => set.is_super_admin,
            PermissionState::Loading => self.profile_super_admin,
            PermissionState::Failed(_) => false,
        }
    }

    fn permissions(&self) -> Option<&PermissionSet> {
        match &self.state {
            PermissionState::Ready(set) => Some(set),
            _ => None,
        }
    }

    pub fn can(&self, resource: &str, action: &str) -> bool {
        self.is_super_admin()
            || self
                .permissions()
                .is_some_and(|set| set.can(resource, action))
    }

    pub fn can_view(&self, resource: &str) -> bool {
        self.can(resource, Action::View.as_str())
    }

    pub fn can_add(&self, resource: &str) -> bool {
        self.can(resource, Action::Add.as_str())
    }

    pub fn can_edit(&self, resource: &str) -> bool {
        self.can(resource, Action::Edit.as_str())
    }

    pub fn can_delete(&self, resource: &str) -> bool {
        self.can(resource, Action::Delete.as_str())
    }

    pub fn can_view_field(&self, resource: &str, field: &str) -> bool {
        self.is_super_admin()
            || self
                .permissions()
                .is_some_and(|set| set.can_view_field(resource, field))
    }

    pub fn can_edit_field(&self, resource: &str, field: &str) -> bool {
        self.is_super_admin()
            || self
                .permissions()
                .is_some_and(|set| set.can_edit_field(resource, field))
    }

    pub fn has_any_permission(&self, resource: &str) -> bool {
        self.is_super_admin()
            || self
                .permissions()
                .is_some_and(|set| set.has_any_permission(resource))
    }

    /// `(resource, actions)` pairs for display.
    pub fn permission_summary(&self) -> Vec<(String, String)> {
        match self.permissions() {
            Some(set) if set.is_super_admin => {
                vec![("all resources".to_string(), "full access".to_string())]
            }
            Some(set) => set
                .permissions
                .iter()
                .map(|permission| {
                    let actions = if permission.actions.is_empty() {
                        "none".to_string()
                    } else {
                        permission.actions.join(", ")
                    };
                    (permission.resource.clone(), actions)
                })
                .collect(),
            None => Vec::new(),
        }
    }
}
