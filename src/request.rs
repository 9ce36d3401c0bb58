//! Abstract view of an inbound HTTP request.

use std::collections::HashMap;

use crate::command::StoredRequestState;

/// Host-independent request data handed to every command.
#[derive(Debug, Clone, Default)]
pub struct HttpRequestData {
    pub method: String,
    /// App-relative path, always starting with `/`.
    pub path: String,
    pub query: HashMap<String, String>,
    pub form: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub client_ip: Option<String>,
    /// Correlator loaded by the host for a follow-up request (e.g. ACS).
    pub stored_request_state: Option<StoredRequestState>,
}

impl HttpRequestData {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            path: app_relative_path(path),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query = parse_urlencoded(query);
        self
    }

    pub fn with_form(mut self, body: &str) -> Self {
        self.form = parse_urlencoded(body);
        self
    }

    pub fn with_cookies(mut self, cookie_header: &str) -> Self {
        self.cookies = parse_cookie_header(cookie_header);
        self
    }

    pub fn with_client_ip(mut self, ip: Option<String>) -> Self {
        self.client_ip = ip;
        self
    }

    pub fn with_stored_request_state(mut self, state: Option<StoredRequestState>) -> Self {
        self.stored_request_state = state;
        self
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(|s| s.as_str())
    }

    pub fn form_param(&self, name: &str) -> Option<&str> {
        self.form.get(name).map(|s| s.as_str())
    }

    /// Look a parameter up in the form first, then the query string.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.form_param(name).or_else(|| self.query_param(name))
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|s| s.as_str())
    }
}

/// Normalize a host path into the app-relative form used for dispatch.
pub fn app_relative_path(path: &str) -> String {
    let path = path.split('?').next().unwrap_or(path);
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Parse `application/x-www-form-urlencoded` data. Later keys win.
pub fn parse_urlencoded(data: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for pair in data.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.insert(decode_component(key), decode_component(value));
    }

    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Split a `Cookie` header into name/value pairs.
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_relative_path() {
        assert_eq!(app_relative_path(""), "/");
        assert_eq!(app_relative_path("sso/login"), "/sso/login");
        assert_eq!(app_relative_path("/sso/login?x=1"), "/sso/login");
    }

    #[test]
    fn test_parse_urlencoded() {
        let params = parse_urlencoded("SAMLResponse=PD94b%2Bw%3D&RelayState=a+b&flag");
        assert_eq!(params.get("SAMLResponse").unwrap(), "PD94b+w=");
        assert_eq!(params.get("RelayState").unwrap(), "a b");
        assert_eq!(params.get("flag").unwrap(), "");
    }

    #[test]
    fn test_param_prefers_form() {
        let request = HttpRequestData::new("post", "/sso/acs")
            .with_query("RelayState=from-query")
            .with_form("RelayState=from-form");
        assert_eq!(request.method, "POST");
        assert_eq!(request.param("RelayState"), Some("from-form"));
        assert_eq!(request.query_param("RelayState"), Some("from-query"));
        assert_eq!(request.param("missing"), None);
    }

    #[test]
    fn test_parse_cookie_header() {
        let request = HttpRequestData::new("GET", "/").with_cookies("a=1; b = 2;junk");
        assert_eq!(request.cookie("a"), Some("1"));
        assert_eq!(request.cookie("b"), Some("2"));
        assert_eq!(request.cookie("junk"), None);
    }
}
