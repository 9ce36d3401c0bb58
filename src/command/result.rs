//! Structured outcome of a command.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Non-success statuses a command may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    NotFound,
    InternalServerError,
}

impl ErrorStatus {
    pub fn code(&self) -> u16 {
        match self {
            ErrorStatus::NotFound => 404,
            ErrorStatus::InternalServerError => 500,
        }
    }
}

/// What the response should carry. Redirect and content are exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// 303 See Other.
    Redirect { location: String },
    /// 200 OK. An empty content type means host default.
    Content { body: String, content_type: String },
    Status(ErrorStatus),
}

/// Verified identity produced by a successful ACS exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub name_id: String,
    pub name_id_format: Option<String>,
    pub idp_entity_id: String,
    pub assertion_id: String,
    pub session_index: Option<String>,
    pub attributes: HashMap<String, Vec<String>>,
}

/// Correlator persisted across the IdP round trip, keyed by relay state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRequestState {
    pub relay_state: String,
    /// ID of the AuthnRequest; the response must echo it in InResponseTo.
    pub request_id: String,
    pub return_url: Option<String>,
    pub idp_entity_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StoredRequestState {
    pub fn new(
        request_id: String,
        return_url: Option<String>,
        idp_entity_id: String,
        ttl_secs: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            relay_state: hex::encode(rand::random::<[u8; 16]>()),
            request_id,
            return_url,
            idp_entity_id,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(ttl_secs as i64),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Result of running one command. Consumed once by the projector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub outcome: CommandOutcome,
    /// Set only when the flow concluded in a verified authentication.
    pub principal: Option<Principal>,
    pub stored_request_state: Option<StoredRequestState>,
    /// Drop the local session (logout).
    pub terminate_session: bool,
}

impl CommandResult {
    fn from_outcome(outcome: CommandOutcome) -> Self {
        Self {
            outcome,
            principal: None,
            stored_request_state: None,
            terminate_session: false,
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self::from_outcome(CommandOutcome::Redirect {
            location: location.into(),
        })
    }

    pub fn content(body: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::from_outcome(CommandOutcome::Content {
            body: body.into(),
            content_type: content_type.into(),
        })
    }

    pub fn not_found() -> Self {
        Self::from_outcome(CommandOutcome::Status(ErrorStatus::NotFound))
    }

    pub fn internal_server_error() -> Self {
        Self::from_outcome(CommandOutcome::Status(ErrorStatus::InternalServerError))
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_stored_request_state(mut self, state: StoredRequestState) -> Self {
        self.stored_request_state = Some(state);
        self
    }

    pub fn terminating_session(mut self) -> Self {
        self.terminate_session = true;
        self
    }

    /// HTTP status code the outcome maps to.
    pub fn status(&self) -> u16 {
        match &self.outcome {
            CommandOutcome::Redirect { .. } => 303,
            CommandOutcome::Content { .. } => 200,
            CommandOutcome::Status(status) => status.code(),
        }
    }

    pub fn location(&self) -> Option<&str> {
        match &self.outcome {
            CommandOutcome::Redirect { location } => Some(location),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match &self.outcome {
            CommandOutcome::Content { body, .. } => Some(body),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_has_no_content() {
        let result = CommandResult::redirect("https://idp.example.com/sso");
        assert_eq!(result.status(), 303);
        assert_eq!(result.location(), Some("https://idp.example.com/sso"));
        assert_eq!(result.body(), None);
        assert!(result.principal.is_none());
    }

    #[test]
    fn test_content_has_no_location() {
        let result = CommandResult::content("<p>ok</p>", "text/html");
        assert_eq!(result.status(), 200);
        assert_eq!(result.body(), Some("<p>ok</p>"));
        assert_eq!(result.location(), None);
    }

    #[test]
    fn test_error_statuses() {
        let not_found = CommandResult::not_found();
        assert_eq!(not_found.status(), 404);
        assert_eq!(not_found.body(), None);
        assert_eq!(not_found.location(), None);

        assert_eq!(CommandResult::internal_server_error().status(), 500);
    }

    #[test]
    fn test_stored_request_state_relay_state_is_random() {
        let a = StoredRequestState::new("_id1".to_string(), None, "idp".to_string(), 60);
        let b = StoredRequestState::new("_id1".to_string(), None, "idp".to_string(), 60);
        assert_eq!(a.relay_state.len(), 32);
        assert_ne!(a.relay_state, b.relay_state);
        assert!(!a.is_expired());
    }
}
