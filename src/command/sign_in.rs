//! SP-initiated sign-in: redirect the browser to the IdP with an AuthnRequest.

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use std::io::Write;
use tracing::debug;

use super::{validate_return_url, CommandResult, StoredRequestState};
use crate::config::Saml2Config;
use crate::error::CommandError;
use crate::request::HttpRequestData;

pub(crate) fn run(
    request: &HttpRequestData,
    config: &Saml2Config,
) -> Result<CommandResult, CommandError> {
    let return_url = request
        .query_param(&config.return_url_param)
        .map(validate_return_url)
        .transpose()?;

    let idp_sso_url = config
        .idp_sso_url
        .as_deref()
        .context("IdP SSO URL not configured")?;
    let idp_entity_id = config
        .idp_entity_id
        .clone()
        .context("IdP entity ID not configured")?;

    let request_id = format!("_id{}", uuid::Uuid::new_v4());
    let authn_request = build_authn_request(&request_id, idp_sso_url, config);
    let encoded = deflate_and_encode(&authn_request)?;

    let state = StoredRequestState::new(
        request_id,
        return_url,
        idp_entity_id,
        config.request_state_ttl_secs,
    );

    let separator = if idp_sso_url.contains('?') { '&' } else { '?' };
    let url = format!(
        "{}{}SAMLRequest={}&{}={}",
        idp_sso_url,
        separator,
        urlencoding::encode(&encoded),
        config.relay_state_param,
        urlencoding::encode(&state.relay_state)
    );

    debug!(
        request_id = %state.request_id,
        idp = %state.idp_entity_id,
        "Created SAML AuthnRequest redirect"
    );

    Ok(CommandResult::redirect(url).with_stored_request_state(state))
}

fn build_authn_request(request_id: &str, destination: &str, config: &Saml2Config) -> String {
    let issue_instant = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

    let name_id_policy = config
        .name_id_format
        .as_ref()
        .map(|format| format!(r#"<samlp:NameIDPolicy Format="{}" AllowCreate="true"/>"#, format))
        .unwrap_or_default();

    format!(
        r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"
            xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"
            ID="{}"
            Version="2.0"
            IssueInstant="{}"
            Destination="{}"
            ProtocolBinding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST"
            AssertionConsumerServiceURL="{}">
            <saml:Issuer>{}</saml:Issuer>{}
        </samlp:AuthnRequest>"#,
        request_id, issue_instant, destination, config.acs_url, config.entity_id, name_id_policy
    )
}

/// Deflate and base64 encode for SAML redirect binding.
fn deflate_and_encode(xml: &str) -> anyhow::Result<String> {
    let mut encoder =
        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(xml.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(BASE64.encode(compressed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::error::Saml2Error;
    use std::io::Read;

    fn inflate(encoded: &str) -> String {
        let compressed = BASE64.decode(encoded).unwrap();
        let mut decoder = flate2::read::DeflateDecoder::new(compressed.as_slice());
        let mut xml = String::new();
        decoder.read_to_string(&mut xml).unwrap();
        xml
    }

    #[test]
    fn test_sign_in_redirects_to_idp() {
        let config = test_config();
        let request = HttpRequestData::new("GET", "/sso/login").with_query("ReturnUrl=%2Fdashboard");

        let result = run(&request, &config).unwrap();
        assert_eq!(result.status(), 303);
        assert!(result.principal.is_none());

        let url = result.location().unwrap();
        assert!(url.starts_with("https://idp.example.com/sso?SAMLRequest="));

        let state = result.stored_request_state.as_ref().unwrap();
        assert_eq!(state.return_url.as_deref(), Some("/dashboard"));
        assert_eq!(state.idp_entity_id, "https://idp.example.com");
        assert!(url.ends_with(&format!("&RelayState={}", state.relay_state)));
    }

    #[test]
    fn test_authn_request_carries_request_id() {
        let config = test_config();
        let request = HttpRequestData::new("GET", "/sso/login");

        let result = run(&request, &config).unwrap();
        let state = result.stored_request_state.as_ref().unwrap();
        assert!(state.return_url.is_none());

        let url = result.location().unwrap();
        let encoded = url
            .split("SAMLRequest=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .unwrap();
        let xml = inflate(&urlencoding::decode(encoded).unwrap());
        assert!(xml.contains(&format!(r#"ID="{}""#, state.request_id)));
        assert!(xml.contains("<saml:Issuer>https://sp.example.com</saml:Issuer>"));
        assert!(xml.contains(r#"AssertionConsumerServiceURL="https://sp.example.com/sso/acs""#));
    }

    #[test]
    fn test_name_id_policy() {
        let mut config = test_config();
        config.name_id_format =
            Some("urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress".to_string());
        let xml = build_authn_request("_id1", "https://idp.example.com/sso", &config);
        assert!(xml.contains("NameIDPolicy"));
        assert!(xml.contains("emailAddress"));
    }

    #[test]
    fn test_absolute_return_url_is_protocol_error() {
        let config = test_config();
        let request = HttpRequestData::new("GET", "/sso/login")
            .with_query("ReturnUrl=https%3A%2F%2Fevil.example.com");

        let err = run(&request, &config).unwrap_err();
        assert!(matches!(
            err,
            CommandError::Protocol(Saml2Error::InvalidReturnUrl(_))
        ));
    }
}
