use std::error::Error;
use std::fmt;

/// Errors produced while talking to the hospital REST API.
#[derive(Debug)]
pub enum ApiError {
    /// A tenant-scoped call was made before a session was established.
    NotAuthenticated,

    /// The request never produced an HTTP response (DNS, TLS, timeout...).
    Transport(String),

    /// The API answered with a non-2xx status.
    Status {
        /// HTTP status code.
        status: u16,
        /// The `message` field of the JSON error body, if any.
        message: Option<String>,
    },

    /// A 2xx body did not match the expected schema.
    Decode {
        /// The request path whose response failed to decode.
        path: String,
        /// The underlying serde error.
        source: serde_json::Error,
    },

    /// A request body could not be serialized.
    Encode(serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.status(), Some(404))
    }

    /// Text suitable for a status banner.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status {
                message: Some(message),
                ..
            } => message.clone(),
            ApiError::Status { status, .. } => format!("Request failed ({status})"),
            ApiError::Transport(_) => "Could not reach the server".to_string(),
            ApiError::NotAuthenticated => "Please sign in again".to_string(),
            ApiError::Decode { .. } | ApiError::Encode(_) => {
                "Unexpected response from the server".to_string()
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotAuthenticated => write!(f, "no active session"),
            ApiError::Transport(reason) => write!(f, "transport error: {reason}"),
            ApiError::Status {
                status,
                message: Some(message),
            } => write!(f, "API returned {status}: {message}"),
            ApiError::Status {
                status,
                message: None,
            } => write!(f, "API returned {status}"),
            ApiError::Decode { path, source } => {
                write!(f, "unexpected response body from {path}: {source}")
            }
            ApiError::Encode(source) => write!(f, "failed to encode request body: {source}"),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ApiError::Decode { source, .. } => Some(source),
            ApiError::Encode(source) => Some(source),
            _ => None,
        }
    }
}

/// Pulls the `message` out of a JSON error body.
///
/// Validation errors arrive as an array of strings; those are joined.
pub(crate) fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("message")? {
        serde_json::Value::String(message) => Some(message.clone()),
        serde_json::Value::Array(items) => {
            let parts: Vec<&str> = items.iter().filter_map(|item| item.as_str()).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_from_string_or_array() {
        assert_eq!(
            extract_message(r#"{"message":"Hospital not found"}"#).as_deref(),
            Some("Hospital not found")
        );
        assert_eq!(
            extract_message(r#"{"message":["email must be an email","name is required"]}"#)
                .as_deref(),
            Some("email must be an email, name is required")
        );
        assert_eq!(extract_message("<html>bad gateway</html>"), None);
        assert_eq!(extract_message(r#"{"error":"x"}"#), None);
    }

    #[test]
    fn user_message_prefers_server_text() {
        let err = ApiError::Status {
            status: 422,
            message: Some("Tax id is invalid".into()),
        };
        assert_eq!(err.user_message(), "Tax id is invalid");
        let err = ApiError::Status {
            status: 500,
            message: None,
        };
        assert_eq!(err.user_message(), "Request failed (500)");
        assert!(!err.is_unauthorized());
    }
}
