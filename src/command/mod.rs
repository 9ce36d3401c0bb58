//! SAML2 protocol commands.
//!
//! Each command is a function of the request and the configuration snapshot
//! producing a [`CommandResult`]. Path suffixes are mapped to commands by
//! [`CommandFactory`].

pub mod acs;
pub mod factory;
pub mod logout;
pub mod metadata;
pub mod result;
pub mod sign_in;

pub use factory::CommandFactory;
pub use result::{CommandOutcome, CommandResult, ErrorStatus, Principal, StoredRequestState};

use crate::config::Saml2Config;
use crate::error::{CommandError, Saml2Error};
use crate::request::HttpRequestData;

/// Closed set of operations reachable under the module path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    SignIn,
    Acs,
    Logout,
    Metadata,
    NotFound,
}

impl Command {
    pub fn run(
        &self,
        request: &HttpRequestData,
        config: &Saml2Config,
    ) -> Result<CommandResult, CommandError> {
        match self {
            Command::SignIn => sign_in::run(request, config),
            Command::Acs => acs::run(request, config),
            Command::Logout => logout::run(request, config),
            Command::Metadata => metadata::run(config),
            Command::NotFound => Ok(CommandResult::not_found()),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::SignIn => write!(f, "sign_in"),
            Command::Acs => write!(f, "acs"),
            Command::Logout => write!(f, "logout"),
            Command::Metadata => write!(f, "metadata"),
            Command::NotFound => write!(f, "not_found"),
        }
    }
}

/// Accept only app-relative return URLs (no scheme, no authority).
pub(crate) fn validate_return_url(url: &str) -> Result<String, Saml2Error> {
    let relative = url.starts_with('/')
        && !url.starts_with("//")
        && !url.contains('\\')
        && !url.chars().any(|c| c.is_control());

    if relative {
        Ok(url.to_string())
    } else {
        Err(Saml2Error::InvalidReturnUrl(url.to_string()))
    }
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn html_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
