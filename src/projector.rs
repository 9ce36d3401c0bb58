//! Projection of a [`CommandResult`] onto the host response and session.

use anyhow::Result;
use tracing::debug;

use crate::command::{CommandOutcome, CommandResult, Principal, StoredRequestState};

/// Concrete HTTP action the host must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseAction {
    Redirect(String),
    /// 200 body; `content_type` is `None` when the host default applies.
    Content {
        body: String,
        content_type: Option<String>,
    },
    /// Bare status with an empty body.
    Status(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    None,
    SignIn(Principal),
    SignOut,
}

/// Everything the host needs to do for one result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub action: ResponseAction,
    pub session: SessionEffect,
    pub stored_request_state: Option<StoredRequestState>,
}

/// Host response writer.
pub trait ResponseSink {
    fn redirect(&mut self, location: &str);
    fn content(&mut self, body: &str, content_type: Option<&str>);
    fn status(&mut self, status: u16);
}

/// Host authenticated-session store.
pub trait SessionSink {
    fn sign_in(&mut self, principal: &Principal) -> Result<()>;
    fn sign_out(&mut self) -> Result<()>;
}

/// Host storage for relay-state correlators.
pub trait RequestStateStore {
    fn save(&mut self, state: &StoredRequestState) -> Result<()>;
}

/// Map a result onto a response action and session effect.
pub fn project(result: CommandResult) -> Projection {
    let action = match result.outcome {
        CommandOutcome::Redirect { location } => ResponseAction::Redirect(location),
        CommandOutcome::Content { body, content_type } => ResponseAction::Content {
            body,
            content_type: Some(content_type).filter(|ct| !ct.is_empty()),
        },
        CommandOutcome::Status(status) => ResponseAction::Status(status.code()),
    };

    let session = match (result.principal, result.terminate_session) {
        (Some(principal), _) => SessionEffect::SignIn(principal),
        (None, true) => SessionEffect::SignOut,
        (None, false) => SessionEffect::None,
    };

    Projection {
        action,
        session,
        stored_request_state: result.stored_request_state,
    }
}

/// Perform a projection against the host.
///
/// Order: request state, then session, then the response. A missing
/// session sink (no live host session context) makes the session step a
/// no-op.
pub fn apply<R, S, T>(
    projection: Projection,
    response: &mut R,
    session: Option<&mut S>,
    states: &mut T,
) -> Result<()>
where
    R: ResponseSink + ?Sized,
    S: SessionSink + ?Sized,
    T: RequestStateStore + ?Sized,
{
    if let Some(ref state) = projection.stored_request_state {
        states.save(state)?;
    }

    match (&projection.session, session) {
        (SessionEffect::SignIn(principal), Some(sink)) => sink.sign_in(principal)?,
        (SessionEffect::SignOut, Some(sink)) => sink.sign_out()?,
        (SessionEffect::None, _) => {}
        (_, None) => debug!("No host session context, skipping session effect"),
    }

    match &projection.action {
        ResponseAction::Redirect(location) => response.redirect(location),
        ResponseAction::Content { body, content_type } => {
            response.content(body, content_type.as_deref())
        }
        ResponseAction::Status(status) => response.status(*status),
    }

    Ok(())
}
