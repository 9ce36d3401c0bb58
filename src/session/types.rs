//! Session types for authenticated SAML2 sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::command::Principal;

/// Unique session identifier (16-byte random value, hex-encoded for storage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId([u8; 16]);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(rand::random())
    }

    /// Convert to hex string for storage/cookies.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 16] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// An authenticated session established from a verified principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    /// User identifier (from SAML NameID).
    pub user_id: String,

    pub name_id_format: Option<String>,

    pub created_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,

    /// Last access time (updated on each lookup).
    pub last_accessed: DateTime<Utc>,

    /// SAML assertion attributes as key → values.
    pub attributes: HashMap<String, Vec<String>>,

    /// Original SAML assertion ID (for replay prevention).
    pub assertion_id: String,

    /// IdP entity ID that issued this session.
    pub idp_entity_id: String,

    /// Session index from SAML assertion (for Single Logout).
    pub session_index: Option<String>,

    /// Client IP at session creation.
    pub client_ip: Option<String>,
}

impl Session {
    pub fn new(
        user_id: String,
        assertion_id: String,
        idp_entity_id: String,
        ttl_secs: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            user_id,
            name_id_format: None,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(ttl_secs as i64),
            last_accessed: now,
            attributes: HashMap::new(),
            assertion_id,
            idp_entity_id,
            session_index: None,
            client_ip: None,
        }
    }

    /// Build a session for a principal verified by the ACS command.
    pub fn from_principal(principal: &Principal, ttl_secs: u64, client_ip: Option<String>) -> Self {
        let mut session = Self::new(
            principal.name_id.clone(),
            principal.assertion_id.clone(),
            principal.idp_entity_id.clone(),
            ttl_secs,
        );
        session.name_id_format = principal.name_id_format.clone();
        session.session_index = principal.session_index.clone();
        session.attributes = principal.attributes.clone();
        session.client_ip = client_ip;
        session
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn touch(&mut self) {
        self.last_accessed = Utc::now();
    }

    /// Get a single-valued attribute.
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(|values| values.first())
            .map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_from_hex() {
        let id = SessionId::new();
        assert_eq!(SessionId::from_hex(&id.to_hex()), Some(id));
        assert!(SessionId::from_hex("not-valid-hex").is_none());
        assert!(SessionId::from_hex("abcd").is_none()); // too short
        assert!(SessionId::from_hex("").is_none());
    }

    #[test]
    fn test_session_expiry() {
        let mut session = Session::new(
            "user@example.com".to_string(),
            "assertion-123".to_string(),
            "https://idp.example.com".to_string(),
            3600,
        );
        assert!(!session.is_expired());

        session.expires_at = Utc::now() - chrono::Duration::seconds(10);
        assert!(session.is_expired());
    }

    #[test]
    fn test_session_from_principal() {
        let mut attributes = HashMap::new();
        attributes.insert(
            "groups".to_string(),
            vec!["admin".to_string(), "users".to_string()],
        );
        let principal = Principal {
            name_id: "user@example.com".to_string(),
            name_id_format: Some("urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress".to_string()),
            idp_entity_id: "https://idp.example.com".to_string(),
            assertion_id: "_assertion-1".to_string(),
            session_index: Some("_session-1".to_string()),
            attributes,
        };

        let session = Session::from_principal(&principal, 3600, Some("10.0.0.1".to_string()));
        assert_eq!(session.user_id, "user@example.com");
        assert_eq!(session.assertion_id, "_assertion-1");
        assert_eq!(session.session_index.as_deref(), Some("_session-1"));
        assert_eq!(session.get_attribute("groups"), Some("admin")); // first value
        assert_eq!(session.get_attribute("missing"), None);
        assert_eq!(session.client_ip.as_deref(), Some("10.0.0.1"));
    }
}
