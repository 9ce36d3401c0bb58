//! SAML2 module configuration.
//!
//! Loaded once at startup and shared read-only behind an `Arc` for the
//! lifetime of the process.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Service provider options, IdP trust settings and cookie policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Saml2Config {
    /// Path prefix claimed by the module (e.g., "/Saml2AuthenticationModule/").
    /// Compared case-insensitively.
    #[serde(default = "default_module_path")]
    pub module_path: String,

    /// SP Entity ID (unique identifier for this service provider).
    #[serde(default)]
    pub entity_id: String,

    /// Assertion Consumer Service URL (where IdP posts SAML response).
    #[serde(default)]
    pub acs_url: String,

    /// Where to send the user after ACS when no return URL was stored.
    #[serde(default)]
    pub return_url: Option<String>,

    /// IdP Entity ID. The issuer of every response must match it.
    #[serde(default)]
    pub idp_entity_id: Option<String>,

    /// IdP SSO URL (HTTP-Redirect binding).
    #[serde(default)]
    pub idp_sso_url: Option<String>,

    /// NameID format to request (optional).
    /// e.g., "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress"
    #[serde(default)]
    pub name_id_format: Option<String>,

    /// SP certificate (PEM format, included in SP metadata).
    #[serde(default)]
    pub certificate_pem: Option<String>,

    /// Clock skew tolerance in seconds.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: i64,

    /// Accept IdP-initiated responses that carry no InResponseTo.
    #[serde(default)]
    pub allow_unsolicited_responses: bool,

    /// RelayState parameter name.
    #[serde(default = "default_relay_state_param")]
    pub relay_state_param: String,

    /// Query parameter carrying the post-login/logout return URL.
    #[serde(default = "default_return_url_param")]
    pub return_url_param: String,

    /// Lifetime of a stored AuthnRequest correlator in seconds.
    #[serde(default = "default_request_state_ttl")]
    pub request_state_ttl_secs: u64,

    /// Session TTL in seconds (default: 8 hours).
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Cookie name for session ID.
    #[serde(default = "default_cookie_name")]
    pub session_cookie_name: String,

    /// Cookie domain (optional, defaults to request host).
    #[serde(default)]
    pub cookie_domain: Option<String>,

    /// Cookie path.
    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,

    /// Require HTTPS for cookies (Secure flag).
    #[serde(default = "default_true")]
    pub cookie_secure: bool,

    /// Set HttpOnly flag on cookies.
    #[serde(default = "default_true")]
    pub cookie_http_only: bool,

    /// SameSite policy (default: Lax).
    #[serde(default = "default_same_site")]
    pub cookie_same_site: String,

    /// Session store path (redb database file).
    #[serde(default = "default_session_store_path")]
    pub session_store_path: String,
}

fn default_module_path() -> String {
    "/Saml2AuthenticationModule/".to_string()
}

fn default_clock_skew() -> i64 {
    300 // 5 minutes
}

fn default_relay_state_param() -> String {
    "RelayState".to_string()
}

fn default_return_url_param() -> String {
    "ReturnUrl".to_string()
}

fn default_request_state_ttl() -> u64 {
    600 // 10 minutes
}

fn default_session_ttl() -> u64 {
    8 * 60 * 60 // 8 hours
}

fn default_cookie_name() -> String {
    "zentinel_saml2_session".to_string()
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_same_site() -> String {
    "Lax".to_string()
}

fn default_session_store_path() -> String {
    "/var/lib/zentinel-saml2/sessions.redb".to_string()
}

impl Default for Saml2Config {
    fn default() -> Self {
        Self {
            module_path: default_module_path(),
            entity_id: String::new(),
            acs_url: String::new(),
            return_url: None,
            idp_entity_id: None,
            idp_sso_url: None,
            name_id_format: None,
            certificate_pem: None,
            clock_skew_secs: default_clock_skew(),
            allow_unsolicited_responses: false,
            relay_state_param: default_relay_state_param(),
            return_url_param: default_return_url_param(),
            request_state_ttl_secs: default_request_state_ttl(),
            session_ttl_secs: default_session_ttl(),
            session_cookie_name: default_cookie_name(),
            cookie_domain: None,
            cookie_path: default_cookie_path(),
            cookie_secure: true,
            cookie_http_only: true,
            cookie_same_site: default_same_site(),
            session_store_path: default_session_store_path(),
        }
    }
}

impl Saml2Config {
    /// Read, parse and validate a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Saml2Config = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config.validate().map_err(|e| anyhow!(e))?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !self.module_path.starts_with('/') {
            return Err("SAML2 module_path must start with '/'".to_string());
        }

        if self.entity_id.is_empty() {
            return Err("SAML2 entity_id is required".to_string());
        }

        if self.acs_url.is_empty() {
            return Err("SAML2 acs_url is required".to_string());
        }

        if self.idp_sso_url.is_none() || self.idp_entity_id.is_none() {
            return Err("SAML2 requires idp_sso_url and idp_entity_id".to_string());
        }

        Ok(())
    }

    /// Build the session cookie value.
    pub fn build_cookie(&self, session_id: &str) -> String {
        self.cookie_with_max_age(session_id, self.session_ttl_secs)
    }

    /// Build a cookie that clears the session on the client.
    pub fn build_expired_cookie(&self) -> String {
        self.cookie_with_max_age("", 0)
    }

    fn cookie_with_max_age(&self, value: &str, max_age: u64) -> String {
        let mut cookie = format!("{}={}", self.session_cookie_name, value);

        if let Some(ref domain) = self.cookie_domain {
            cookie.push_str(&format!("; Domain={}", domain));
        }

        cookie.push_str(&format!("; Path={}", self.cookie_path));

        if self.cookie_secure {
            cookie.push_str("; Secure");
        }

        if self.cookie_http_only {
            cookie.push_str("; HttpOnly");
        }

        cookie.push_str(&format!("; SameSite={}", self.cookie_same_site));
        cookie.push_str(&format!("; Max-Age={}", max_age));

        cookie
    }

    /// Parse session ID from cookie header.
    pub fn parse_session_cookie(&self, cookie_header: &str) -> Option<String> {
        for part in cookie_header.split(';') {
            let part = part.trim();
            if let Some(value) = part.strip_prefix(&format!("{}=", self.session_cookie_name)) {
                return Some(value.to_string());
            }
        }
        None
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Saml2Config {
    Saml2Config {
        module_path: "/sso/".to_string(),
        entity_id: "https://sp.example.com".to_string(),
        acs_url: "https://sp.example.com/sso/acs".to_string(),
        idp_sso_url: Some("https://idp.example.com/sso".to_string()),
        idp_entity_id: Some("https://idp.example.com".to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Saml2Config::default();
        assert_eq!(config.module_path, "/Saml2AuthenticationModule/");
        assert_eq!(config.session_ttl_secs, 8 * 60 * 60);
        assert_eq!(config.relay_state_param, "RelayState");
        assert!(!config.allow_unsolicited_responses);
        assert!(config.cookie_secure);
        assert!(config.cookie_http_only);
    }

    #[test]
    fn test_validation() {
        let mut config = Saml2Config::default();
        assert!(config.validate().is_err()); // missing entity_id

        config.entity_id = "https://sp.example.com".to_string();
        assert!(config.validate().is_err()); // missing acs_url

        config.acs_url = "https://sp.example.com/sso/acs".to_string();
        assert!(config.validate().is_err()); // missing IdP config

        config.idp_sso_url = Some("https://idp.example.com/sso".to_string());
        config.idp_entity_id = Some("https://idp.example.com".to_string());
        assert!(config.validate().is_ok());

        config.module_path = "sso/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "module_path": "/sso/",
                "entity_id": "https://sp.example.com",
                "acs_url": "https://sp.example.com/sso/acs",
                "idp_entity_id": "https://idp.example.com",
                "idp_sso_url": "https://idp.example.com/sso"
            }}"#
        )
        .unwrap();

        let config = Saml2Config::from_file(file.path()).unwrap();
        assert_eq!(config.module_path, "/sso/");
        assert_eq!(config.clock_skew_secs, 300);
    }

    #[test]
    fn test_from_file_rejects_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"entity_id": "x", "bogus": true}}"#).unwrap();
        assert!(Saml2Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_cookie_parsing() {
        let config = Saml2Config::default();
        let cookie = "other=value; zentinel_saml2_session=abc123def456; another=test";
        assert_eq!(
            config.parse_session_cookie(cookie),
            Some("abc123def456".to_string())
        );

        assert_eq!(config.parse_session_cookie("no_session=here"), None);
    }

    #[test]
    fn test_cookie_building() {
        let mut config = Saml2Config::default();
        config.cookie_domain = Some("example.com".to_string());

        let cookie = config.build_cookie("session123");
        assert!(cookie.contains("zentinel_saml2_session=session123"));
        assert!(cookie.contains("Domain=example.com"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));

        let expired = config.build_expired_cookie();
        assert!(expired.starts_with("zentinel_saml2_session=;"));
        assert!(expired.ends_with("Max-Age=0"));
    }
}
