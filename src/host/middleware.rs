//! axum middleware claiming the module path.

use anyhow::{Context, Result};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::sinks::{CookieSessionSink, RedbRequestStates, ResponseBuilder};
use crate::command::{Command, CommandFactory};
use crate::config::Saml2Config;
use crate::error::Saml2Error;
use crate::executor::run_command;
use crate::projector::{apply, project};
use crate::request::{app_relative_path, HttpRequestData};
use crate::session::{Session, SessionId, SessionStore};

/// Largest request body the module will buffer (ACS form posts).
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Process-lifetime state shared by every request.
pub struct ModuleState {
    pub config: Arc<Saml2Config>,
    pub commands: CommandFactory,
    /// `None` when no session store could be opened; sign-in is unavailable.
    pub sessions: Option<Arc<SessionStore>>,
}

impl ModuleState {
    pub fn new(config: Arc<Saml2Config>, sessions: Option<Arc<SessionStore>>) -> Self {
        Self {
            config,
            commands: CommandFactory::new(),
            sessions,
        }
    }
}

/// Infrastructure failure surfaced to the client as a generic 500.
#[derive(Debug)]
pub struct HostError(pub anyhow::Error);

impl IntoResponse for HostError {
    fn into_response(self) -> Response {
        error!(error = %format!("{:#}", self.0), "SAML2 module request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

/// Route requests under the module path into the command pipeline; pass
/// everything else through untouched.
pub async fn saml2_middleware(
    State(state): State<Arc<ModuleState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = app_relative_path(request.uri().path());

    let Some(command) = state.commands.resolve(&path, &state.config.module_path) else {
        return next.run(request).await;
    };

    debug!(command = %command, path = %path, "SAML2 module claimed request");

    match handle(&state, command, &path, request).await {
        Ok(response) => response,
        Err(e) => HostError(e).into_response(),
    }
}

async fn handle(
    state: &ModuleState,
    command: Command,
    path: &str,
    request: Request,
) -> Result<Response> {
    let config = state.config.as_ref();
    let (parts, body) = request.into_parts();

    let client_ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string());
    let cookie_header = header_str(&parts.headers, header::COOKIE).unwrap_or_default();

    let mut data = HttpRequestData::new(parts.method.as_str(), path)
        .with_query(parts.uri.query().unwrap_or_default())
        .with_cookies(cookie_header)
        .with_client_ip(client_ip.clone());

    let is_form = header_str(&parts.headers, header::CONTENT_TYPE)
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);
    if is_form {
        let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .context("Failed to read request body")?;
        data = data.with_form(&String::from_utf8_lossy(&bytes));
    }

    let sessions = state.sessions.as_deref();

    if command == Command::Acs {
        if let (Some(store), Some(relay_state)) = (sessions, data.param(&config.relay_state_param)) {
            let stored = store.take_request_state(relay_state)?;
            data = data.with_stored_request_state(stored);
        }
    }

    let result = run_command(command, &data, config)?;
    let projection = project(result);

    let current = data
        .cookie(&config.session_cookie_name)
        .and_then(SessionId::from_hex);

    let mut response = ResponseBuilder::default();
    let mut states = RedbRequestStates::new(sessions);
    let mut session_sink = sessions.map(|store| CookieSessionSink::new(store, config, current, client_ip));

    if let Err(e) = apply(projection, &mut response, session_sink.as_mut(), &mut states) {
        // Replay is detected when the session is established
        if let Some(fault) = e.downcast_ref::<Saml2Error>() {
            warn!(command = %command, path = %path, error = %fault, "SAML2 session rejected");
            return Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
        return Err(e);
    }

    let cookies = session_sink
        .as_ref()
        .map(|sink| sink.cookies().to_vec())
        .unwrap_or_default();

    match response.finish(&cookies) {
        Ok(response) => Ok(response),
        Err(e) => {
            if let Some(sink) = session_sink.as_mut() {
                sink.discard_created()?;
            }
            Err(e)
        }
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Look up the authenticated session carried by a request's cookie.
pub fn session_from_headers(
    store: &SessionStore,
    config: &Saml2Config,
    headers: &HeaderMap,
) -> Result<Option<Session>> {
    let Some(session_id) = header_str(headers, header::COOKIE)
        .and_then(|cookie| config.parse_session_cookie(cookie))
        .and_then(|value| SessionId::from_hex(&value))
    else {
        return Ok(None);
    };

    store.get(session_id)
}
