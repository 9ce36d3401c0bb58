//! Projector sinks backed by axum types and the redb session store.

use anyhow::{anyhow, Context, Result};
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use tracing::{info, warn};

use crate::command::{Principal, StoredRequestState};
use crate::config::Saml2Config;
use crate::projector::{RequestStateStore, ResponseSink, SessionSink};
use crate::session::{Session, SessionId, SessionStore};

/// Accumulates the response action and turns it into an axum `Response`.
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
    error: Option<anyhow::Error>,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: String::new(),
            error: None,
        }
    }
}

impl ResponseBuilder {
    fn set_header(&mut self, name: header::HeaderName, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(e) => {
                self.error = Some(anyhow!(e).context(format!("Invalid {} header value", name)));
            }
        }
    }

    /// Finish the response, appending `Set-Cookie` headers.
    pub fn finish(mut self, cookies: &[String]) -> Result<Response> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        for cookie in cookies {
            let value = HeaderValue::from_str(cookie).context("Invalid Set-Cookie header value")?;
            self.headers.append(header::SET_COOKIE, value);
        }

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        Ok(response)
    }
}

impl ResponseSink for ResponseBuilder {
    fn redirect(&mut self, location: &str) {
        self.status = StatusCode::SEE_OTHER;
        self.set_header(header::LOCATION, location);
    }

    fn content(&mut self, body: &str, content_type: Option<&str>) {
        self.status = StatusCode::OK;
        self.body = body.to_string();
        if let Some(content_type) = content_type {
            self.set_header(header::CONTENT_TYPE, content_type);
        }
    }

    fn status(&mut self, status: u16) {
        match StatusCode::from_u16(status) {
            Ok(status) => self.status = status,
            Err(e) => self.error = Some(anyhow!(e).context(format!("Invalid status {}", status))),
        }
    }
}

/// Establishes sessions in the redb store and emits the session cookie.
pub struct CookieSessionSink<'a> {
    store: &'a SessionStore,
    config: &'a Saml2Config,
    /// Session carried by the inbound request, if any.
    current: Option<SessionId>,
    client_ip: Option<String>,
    /// Session established by this sink, if any.
    created: Option<SessionId>,
    cookies: Vec<String>,
}

impl<'a> CookieSessionSink<'a> {
    pub fn new(
        store: &'a SessionStore,
        config: &'a Saml2Config,
        current: Option<SessionId>,
        client_ip: Option<String>,
    ) -> Self {
        Self {
            store,
            config,
            current,
            client_ip,
            created: None,
            cookies: Vec::new(),
        }
    }

    pub fn cookies(&self) -> &[String] {
        &self.cookies
    }

    /// Delete the session established by `sign_in` when its cookie could not
    /// be delivered.
    pub fn discard_created(&mut self) -> Result<()> {
        if let Some(id) = self.created.take() {
            self.store.delete(id)?;
            self.cookies.clear();
            warn!(session_id = %id, "Discarded session whose response could not be built");
        }
        Ok(())
    }
}

impl SessionSink for CookieSessionSink<'_> {
    fn sign_in(&mut self, principal: &Principal) -> Result<()> {
        let session =
            Session::from_principal(principal, self.config.session_ttl_secs, self.client_ip.clone());
        let id = self.store.create(session)?;
        self.created = Some(id);

        // Fixation: drop whatever session the browser arrived with
        if let Some(previous) = self.current.replace(id) {
            self.store.delete(previous)?;
        }

        info!(
            user_id = %principal.name_id,
            session_id = %id,
            "SAML2 authentication successful, session created"
        );

        self.cookies.push(self.config.build_cookie(&id.to_hex()));
        Ok(())
    }

    fn sign_out(&mut self) -> Result<()> {
        if let Some(id) = self.current.take() {
            self.store.delete(id)?;
            info!(session_id = %id, "SAML2 session terminated");
        }
        self.cookies.push(self.config.build_expired_cookie());
        Ok(())
    }
}

/// Request-state store over the redb session store.
pub struct RedbRequestStates<'a> {
    store: Option<&'a SessionStore>,
}

impl<'a> RedbRequestStates<'a> {
    pub fn new(store: Option<&'a SessionStore>) -> Self {
        Self { store }
    }
}

impl RequestStateStore for RedbRequestStates<'_> {
    fn save(&mut self, state: &StoredRequestState) -> Result<()> {
        let Some(store) = self.store else {
            warn!(relay_state = %state.relay_state, "No session store, cannot persist request state");
            return Err(anyhow!("Request state store not initialized"));
        };
        store.save_request_state(state)
    }
}
