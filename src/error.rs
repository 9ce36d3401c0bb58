//! Error taxonomy for SAML2 commands.
//!
//! `Saml2Error` is the recognized protocol/authentication fault. The executor
//! turns it into a bare 500. Anything wrapped in `CommandError::Internal` is
//! an infrastructure fault and is handed back to the host untouched.

use thiserror::Error;

/// Recognized protocol or authentication fault raised by a command.
#[derive(Debug, Error)]
pub enum Saml2Error {
    #[error("missing {0} parameter")]
    MissingParameter(&'static str),

    #[error("malformed SAML message: {0}")]
    MalformedMessage(String),

    #[error("IdP returned status {status}: {message}")]
    UnsuccessfulStatus { status: String, message: String },

    #[error("SAML response contains no assertion")]
    MissingAssertion,

    #[error("SAML assertion missing {0}")]
    MissingSubject(&'static str),

    #[error("unexpected issuer {actual:?}, expected {expected}")]
    UnexpectedIssuer {
        expected: String,
        actual: Option<String>,
    },

    #[error("InResponseTo {actual:?} does not match stored request {expected}")]
    InResponseToMismatch {
        expected: String,
        actual: Option<String>,
    },

    #[error("unsolicited SAML response rejected")]
    UnsolicitedResponse,

    #[error("SAML assertion not yet valid")]
    NotYetValid,

    #[error("SAML assertion has expired")]
    Expired,

    #[error("SAML assertion replay detected: {0}")]
    Replay(String),

    #[error("return URL must be app-relative: {0}")]
    InvalidReturnUrl(String),
}

/// Failure of a single command invocation.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Protocol(#[from] Saml2Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_converts_into_command_error() {
        let err: CommandError = Saml2Error::MissingParameter("SAMLResponse").into();
        assert!(matches!(err, CommandError::Protocol(_)));
        assert_eq!(err.to_string(), "missing SAMLResponse parameter");
    }

    #[test]
    fn test_anyhow_converts_into_internal() {
        let err: CommandError = anyhow::anyhow!("disk full").into();
        assert!(matches!(err, CommandError::Internal(_)));
    }
}
