//! Local sign-out.

use tracing::debug;

use super::{validate_return_url, CommandResult};
use crate::config::Saml2Config;
use crate::error::CommandError;
use crate::request::HttpRequestData;

pub(crate) fn run(
    request: &HttpRequestData,
    config: &Saml2Config,
) -> Result<CommandResult, CommandError> {
    let return_url = match request.query_param(&config.return_url_param) {
        Some(url) => validate_return_url(url)?,
        None => "/".to_string(),
    };

    debug!(return_url = %return_url, "Terminating local SAML2 session");

    Ok(CommandResult::redirect(return_url).terminating_session())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Saml2Error;
    use crate::config::test_config;

    #[test]
    fn test_logout_redirects_and_terminates_session() {
        let config = test_config();
        let request = HttpRequestData::new("GET", "/sso/logout").with_query("ReturnUrl=%2Fbye");

        let result = run(&request, &config).unwrap();
        assert_eq!(result.location(), Some("/bye"));
        assert!(result.terminate_session);
        assert!(result.principal.is_none());
    }

    #[test]
    fn test_logout_defaults_to_root() {
        let config = test_config();
        let result = run(&HttpRequestData::new("GET", "/sso/logout"), &config).unwrap();
        assert_eq!(result.location(), Some("/"));
    }

    #[test]
    fn test_logout_rejects_open_redirect() {
        let config = test_config();
        let request = HttpRequestData::new("GET", "/sso/logout")
            .with_query("ReturnUrl=%2F%2Fevil.example.com");
        let err = run(&request, &config).unwrap_err();
        assert!(matches!(err, CommandError::Protocol(Saml2Error::InvalidReturnUrl(_))));
    }
}
