//! Typed client for the hospital REST API.
//!
//! `ApiClient` owns the transport and the credentials of the current session.
//! Each endpoint is a method returning `Result<T, ApiError>`: a successful
//! status with a body that matches `T` is the only way to get `Ok`.

pub mod batch;
pub mod error;
#[cfg(test)]
pub mod mock;
pub mod transport;

pub use self::error::ApiError;
pub use self::transport::{ApiRequest, ApiResponse, Method, Transport, UreqTransport};

use crate::models::{
    DoctorCompliance, DoctorInvitePayload, HospitalAcceptance, HospitalProfile, HospitalUpdate,
    Invite, License, LicenseAssignment, PasswordResetResult, Patient, PatientPayload,
    ProductLicenseStats, ProfileUpdate, Specialization, StaffMember, StaffPayload, StatusUpdate,
    Subscription, UserProfile,
};
use crate::rbac::PermissionSet;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Header carrying the active tenant.
pub const HOSPITAL_HEADER: &str = "x-hospital-id";

pub struct ApiClient {
    base_url: String,
    transport: Box<dyn Transport>,
    token: Option<String>,
    hospital_id: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            transport,
            token: None,
            hospital_id: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn set_hospital(&mut self, hospital_id: Option<String>) {
        self.hospital_id = hospital_id;
    }

    pub fn hospital_id(&self) -> Option<&str> {
        self.hospital_id.as_deref()
    }

    pub fn clear_credentials(&mut self) {
        self.token = None;
        self.hospital_id = None;
    }

    fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<ApiResponse, ApiError> {
        let token = self.token.as_deref().ok_or(ApiError::NotAuthenticated)?;

        let mut headers = vec![
            ("Authorization".to_string(), format!("Bearer {token}")),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        if let Some(hospital_id) = &self.hospital_id {
            headers.push((HOSPITAL_HEADER.to_string(), hospital_id.clone()));
        }

        let request = ApiRequest {
            method,
            url: format!("{}{}", self.base_url, path),
            path: path.to_string(),
            headers,
            body,
        };

        debug!(method = method.as_str(), path, "api request");
        let response = self.transport.execute(&request)?;
        debug!(method = method.as_str(), path, status = response.status, "api response");

        if response.is_success() {
            Ok(response)
        } else {
            Err(ApiError::Status {
                status: response.status,
                message: error::extract_message(&response.body),
            })
        }
    }

    fn decode<T: DeserializeOwned>(path: &str, body: &str) -> Result<T, ApiError> {
        // An empty 2xx body is treated as JSON `null`.
        let body = if body.trim().is_empty() { "null" } else { body };
        serde_json::from_str(body).map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
        })
    }

    fn encode<B: Serialize>(body: &B) -> Result<serde_json::Value, ApiError> {
        serde_json::to_value(body).map_err(ApiError::Encode)
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.execute(Method::Get, path, None)?;
        Self::decode(path, &response.body)
    }

    fn send<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self.execute(method, path, Some(Self::encode(body)?))?;
        Self::decode(path, &response.body)
    }

    /// Sends a request whose response body is irrelevant.
    fn send_empty(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(), ApiError> {
        self.execute(method, path, body).map(|_| ())
    }

    fn require_hospital(&self) -> Result<&str, ApiError> {
        self.hospital_id().ok_or(ApiError::NotAuthenticated)
    }

    // Profile

    pub fn me(&self) -> Result<UserProfile, ApiError> {
        self.get("/v1/me")
    }

    pub fn update_me(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        self.send(Method::Patch, "/v1/me", update)
    }

    pub fn my_permissions(&self) -> Result<PermissionSet, ApiError> {
        self.get("/v1/rbac/my-permissions")
    }

    // Hospital

    pub fn hospital(&self) -> Result<HospitalProfile, ApiError> {
        let id = self.require_hospital()?;
        self.get(&format!("/v1/hospitals/{id}"))
    }

    pub fn update_hospital(&self, update: &HospitalUpdate) -> Result<HospitalProfile, ApiError> {
        let id = self.require_hospital()?;
        self.send(Method::Patch, &format!("/v1/hospitals/{id}"), update)
    }

    pub fn specializations(&self) -> Result<Vec<Specialization>, ApiError> {
        self.get("/v1/specializations")
    }

    pub fn hospital_acceptances(&self) -> Result<Vec<HospitalAcceptance>, ApiError> {
        self.get("/v1/legal/hospital-acceptances")
    }

    // Staff

    pub fn staff(&self) -> Result<Vec<StaffMember>, ApiError> {
        self.get("/v1/staff")
    }

    pub fn create_staff(&self, payload: &StaffPayload) -> Result<StaffMember, ApiError> {
        self.send(Method::Post, "/v1/staff", payload)
    }

    pub fn update_staff(&self, id: &str, payload: &StaffPayload) -> Result<StaffMember, ApiError> {
        self.send(Method::Patch, &format!("/v1/staff/{id}"), payload)
    }

    pub fn set_staff_active(&self, id: &str, is_active: bool) -> Result<StaffMember, ApiError> {
        self.send(
            Method::Patch,
            &format!("/v1/staff/{id}"),
            &StatusUpdate { is_active },
        )
    }

    pub fn delete_staff(&self, id: &str) -> Result<(), ApiError> {
        self.send_empty(Method::Delete, &format!("/v1/staff/{id}"), None)
    }

    pub fn reset_staff_password(&self, id: &str) -> Result<PasswordResetResult, ApiError> {
        let path = format!("/v1/staff/{id}/reset-password");
        let response = self.execute(Method::Post, &path, None)?;
        let result: Option<PasswordResetResult> = Self::decode(&path, &response.body)?;
        Ok(result.unwrap_or_default())
    }

    // Doctors and invites

    pub fn doctor_compliance(&self) -> Result<Vec<DoctorCompliance>, ApiError> {
        self.get("/v1/hospitals/members/compliance")
    }

    /// Pending invites, narrowed to doctor invitations.
    pub fn pending_doctor_invites(&self) -> Result<Vec<Invite>, ApiError> {
        let invites: Vec<Invite> = self.get("/v1/invites/pending")?;
        Ok(invites
            .into_iter()
            .filter(Invite::is_pending_doctor_invite)
            .collect())
    }

    pub fn invite_doctor(&self, payload: &DoctorInvitePayload) -> Result<Invite, ApiError> {
        self.send(Method::Post, "/v1/invites/create-doctor", payload)
    }

    pub fn revoke_invite(&self, id: &str) -> Result<(), ApiError> {
        self.send_empty(Method::Delete, &format!("/v1/invites/{id}"), None)
    }

    // Products

    /// `None` when the hospital has no subscription (404).
    pub fn subscription(&self) -> Result<Option<Subscription>, ApiError> {
        match self.get("/v1/products/subscription") {
            Ok(subscription) => Ok(subscription),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn license_stats(&self) -> Result<Vec<ProductLicenseStats>, ApiError> {
        self.get("/v1/products/subscription/license-stats")
    }

    pub fn assign_license(&self, assignment: &LicenseAssignment) -> Result<License, ApiError> {
        self.send(Method::Post, "/v1/products/licenses/assign", assignment)
    }

    pub fn revoke_license(&self, license_id: &str) -> Result<(), ApiError> {
        self.send_empty(
            Method::Delete,
            &format!("/v1/products/licenses/{license_id}"),
            None,
        )
    }

    pub fn cancel_subscription(&self) -> Result<(), ApiError> {
        self.send_empty(Method::Post, "/v1/products/subscription/cancel", None)
    }

    // Patients

    pub fn patients(&self) -> Result<Vec<Patient>, ApiError> {
        self.get("/v1/patients")
    }

    pub fn patient(&self, id: &str) -> Result<Patient, ApiError> {
        self.get(&format!("/v1/patients/{id}"))
    }

    pub fn create_patient(&self, payload: &PatientPayload) -> Result<Patient, ApiError> {
        self.send(Method::Post, "/v1/patients", payload)
    }

    pub fn update_patient(&self, id: &str, payload: &PatientPayload) -> Result<Patient, ApiError> {
        self.send(Method::Patch, &format!("/v1/patients/{id}"), payload)
    }

    pub fn set_patient_active(&self, id: &str, is_active: bool) -> Result<Patient, ApiError> {
        self.send(
            Method::Patch,
            &format!("/v1/patients/{id}"),
            &StatusUpdate { is_active },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;
    use serde_json::json;

    fn client(mock: &MockTransport) -> ApiClient {
        let mut client = ApiClient::new("http://api.test/", Box::new(mock.clone()));
        client.set_token("tok");
        client.set_hospital(Some("h1".into()));
        client
    }

    #[test]
    fn attaches_bearer_and_tenant_headers() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v1/staff", 200, json!([]));

        let staff = client(&mock).staff().unwrap();
        assert!(staff.is_empty());

        let request = mock.last_request().unwrap();
        assert_eq!(request.url, "http://api.test/v1/staff");
        assert_eq!(request.header("authorization"), Some("Bearer tok"));
        assert_eq!(request.header(HOSPITAL_HEADER), Some("h1"));
    }

    #[test]
    fn refuses_to_call_without_token() {
        let mock = MockTransport::new();
        let client = ApiClient::new("http://api.test", Box::new(mock.clone()));
        assert!(matches!(client.me(), Err(ApiError::NotAuthenticated)));
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn non_success_status_carries_server_message() {
        let mock = MockTransport::new();
        mock.respond(
            Method::Patch,
            "/v1/hospitals/h1",
            400,
            json!({ "message": ["taxId must be 9 digits"] }),
        );

        let err = client(&mock)
            .update_hospital(&HospitalUpdate::default())
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.user_message(), "taxId must be 9 digits");
    }

    #[test]
    fn schema_mismatch_is_a_decode_error() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v1/staff", 200, json!({ "items": [] }));
        let err = client(&mock).staff().unwrap_err();
        assert!(matches!(err, ApiError::Decode { ref path, .. } if path == "/v1/staff"));
    }

    #[test]
    fn transport_failures_surface_as_transport_errors() {
        let mock = MockTransport::new();
        mock.fail(Method::Get, "/v1/patients", "connection refused");
        let err = client(&mock).patients().unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
        assert_eq!(err.user_message(), "Could not reach the server");
    }

    #[test]
    fn pending_invites_keep_only_doctor_invites() {
        let mock = MockTransport::new();
        mock.respond(
            Method::Get,
            "/v1/invites/pending",
            200,
            json!([
                { "id": "1", "email": "a@x.org", "role": "doctor", "status": "pending" },
                { "id": "2", "email": "b@x.org", "role": "staff", "status": "pending" },
                { "id": "3", "email": "c@x.org", "role": "doctor", "status": "accepted" }
            ]),
        );
        let invites = client(&mock).pending_doctor_invites().unwrap();
        assert_eq!(invites.len(), 1);
        assert_eq!(invites[0].id, "1");
    }

    #[test]
    fn missing_subscription_is_none() {
        let mock = MockTransport::new();
        mock.respond(
            Method::Get,
            "/v1/products/subscription",
            404,
            json!({ "message": "No subscription" }),
        );
        assert_eq!(client(&mock).subscription().unwrap(), None);
    }

    #[test]
    fn reset_password_accepts_empty_body() {
        let mock = MockTransport::new();
        mock.respond_raw(Method::Post, "/v1/staff/s1/reset-password", 204, "");
        let result = client(&mock).reset_staff_password("s1").unwrap();
        assert_eq!(result.message, None);
    }

    #[test]
    fn hospital_calls_need_a_tenant() {
        let mock = MockTransport::new();
        let mut client = client(&mock);
        client.set_hospital(None);
        assert!(matches!(client.hospital(), Err(ApiError::NotAuthenticated)));
    }
}
