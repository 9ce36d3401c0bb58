//! Assertion Consumer Service: validate the IdP's POSTed SAML Response.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

use super::{html_escape, CommandResult, Principal, StoredRequestState};
use crate::config::Saml2Config;
use crate::error::{CommandError, Saml2Error};
use crate::request::HttpRequestData;

const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";

/// Fields of a SAML Response this SP makes decisions on.
#[derive(Debug, Clone, Default)]
pub struct ResponseData {
    pub in_response_to: Option<String>,
    pub issuer: Option<String>,
    pub status_code: Option<String>,
    pub status_message: Option<String>,
    pub assertion: Option<AssertionData>,
}

#[derive(Debug, Clone, Default)]
pub struct AssertionData {
    pub id: String,
    pub issuer: Option<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_on_or_after: Option<DateTime<Utc>>,
    pub name_id: Option<String>,
    pub name_id_format: Option<String>,
    pub session_index: Option<String>,
    pub attributes: HashMap<String, Vec<String>>,
}

pub(crate) fn run(
    request: &HttpRequestData,
    config: &Saml2Config,
) -> Result<CommandResult, CommandError> {
    let encoded = request
        .form_param("SAMLResponse")
        .ok_or(Saml2Error::MissingParameter("SAMLResponse"))?;

    let response = parse_response(encoded)?;
    let stored = request.stored_request_state.as_ref();
    let principal = validate_response(&response, config, stored, Utc::now())?;

    info!(
        user_id = %principal.name_id,
        idp = %principal.idp_entity_id,
        attributes = principal.attributes.len(),
        "SAML assertion validated"
    );

    Ok(build_result(principal, config, stored))
}

/// Decode a base64 SAMLResponse and extract the fields we validate.
pub fn parse_response(encoded: &str) -> Result<ResponseData, Saml2Error> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let response_xml = BASE64
        .decode(compact)
        .map_err(|e| Saml2Error::MalformedMessage(format!("invalid base64: {}", e)))?;
    let response_str = String::from_utf8(response_xml)
        .map_err(|_| Saml2Error::MalformedMessage("response is not valid UTF-8".to_string()))?;

    debug!("Processing SAML response");

    let response: samael::schema::Response = response_str
        .parse()
        .map_err(|e| Saml2Error::MalformedMessage(format!("{:?}", e)))?;

    let (status_code, status_message) = match response.status {
        Some(ref status) => (
            status.status_code.value.clone(),
            status.status_message.as_ref().and_then(|m| m.value.clone()),
        ),
        None => (None, None),
    };

    let assertion = response.assertion.as_ref().map(|assertion| {
        let (not_before, not_on_or_after) = assertion
            .conditions
            .as_ref()
            .map(|c| (c.not_before, c.not_on_or_after))
            .unwrap_or((None, None));

        let name_id = assertion.subject.as_ref().and_then(|s| s.name_id.as_ref());

        let session_index = assertion
            .authn_statements
            .as_ref()
            .and_then(|stmts| stmts.first())
            .and_then(|s| s.session_index.clone());

        let mut attributes: HashMap<String, Vec<String>> = HashMap::new();
        if let Some(ref attr_statements) = assertion.attribute_statements {
            for attr_statement in attr_statements {
                for attr in &attr_statement.attributes {
                    if let Some(ref name) = attr.name {
                        let values: Vec<String> =
                            attr.values.iter().filter_map(|v| v.value.clone()).collect();
                        if !values.is_empty() {
                            attributes.insert(name.clone(), values);
                        }
                    }
                }
            }
        }

        AssertionData {
            id: assertion.id.clone(),
            issuer: assertion.issuer.value.clone(),
            not_before,
            not_on_or_after,
            name_id: name_id.map(|n| n.value.clone()),
            name_id_format: name_id.and_then(|n| n.format.clone()),
            session_index,
            attributes,
        }
    });

    Ok(ResponseData {
        in_response_to: response.in_response_to.clone(),
        issuer: response.issuer.as_ref().and_then(|i| i.value.clone()),
        status_code,
        status_message,
        assertion,
    })
}

/// Check status, issuer, correlation and validity window; yield the principal.
pub fn validate_response(
    response: &ResponseData,
    config: &Saml2Config,
    stored: Option<&StoredRequestState>,
    now: DateTime<Utc>,
) -> Result<Principal, Saml2Error> {
    if let Some(ref status) = response.status_code {
        if status != STATUS_SUCCESS {
            return Err(Saml2Error::UnsuccessfulStatus {
                status: status.clone(),
                message: response
                    .status_message
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string()),
            });
        }
    }

    let expected_issuer = stored
        .map(|s| s.idp_entity_id.as_str())
        .or(config.idp_entity_id.as_deref())
        .unwrap_or_default();

    if let Some(ref issuer) = response.issuer {
        if issuer != expected_issuer {
            return Err(Saml2Error::UnexpectedIssuer {
                expected: expected_issuer.to_string(),
                actual: Some(issuer.clone()),
            });
        }
    }

    match (stored, &response.in_response_to) {
        (Some(state), actual) if actual.as_deref() != Some(state.request_id.as_str()) => {
            return Err(Saml2Error::InResponseToMismatch {
                expected: state.request_id.clone(),
                actual: actual.clone(),
            });
        }
        (None, Some(_)) => return Err(Saml2Error::UnsolicitedResponse),
        (None, None) if !config.allow_unsolicited_responses => {
            return Err(Saml2Error::UnsolicitedResponse)
        }
        _ => {}
    }

    let assertion = response
        .assertion
        .as_ref()
        .ok_or(Saml2Error::MissingAssertion)?;

    if assertion.issuer.as_deref() != Some(expected_issuer) {
        return Err(Saml2Error::UnexpectedIssuer {
            expected: expected_issuer.to_string(),
            actual: assertion.issuer.clone(),
        });
    }

    let skew = Duration::seconds(config.clock_skew_secs);
    if let Some(not_before) = assertion.not_before {
        if now < not_before - skew {
            return Err(Saml2Error::NotYetValid);
        }
    }
    if let Some(not_on_or_after) = assertion.not_on_or_after {
        if now >= not_on_or_after + skew {
            return Err(Saml2Error::Expired);
        }
    }

    let name_id = assertion
        .name_id
        .clone()
        .filter(|n| !n.is_empty())
        .ok_or(Saml2Error::MissingSubject("NameID"))?;

    Ok(Principal {
        name_id,
        name_id_format: assertion.name_id_format.clone(),
        idp_entity_id: expected_issuer.to_string(),
        assertion_id: assertion.id.clone(),
        session_index: assertion.session_index.clone(),
        attributes: assertion.attributes.clone(),
    })
}

/// Redirect to the stored or configured return URL, or render a
/// confirmation page when neither is known.
pub fn build_result(
    principal: Principal,
    config: &Saml2Config,
    stored: Option<&StoredRequestState>,
) -> CommandResult {
    let return_url = stored
        .and_then(|s| s.return_url.clone())
        .or_else(|| config.return_url.clone());

    let result = match return_url {
        Some(url) => CommandResult::redirect(url),
        None => CommandResult::content(confirmation_page(&principal.name_id), "text/html"),
    };

    result.with_principal(principal)
}

fn confirmation_page(name_id: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>Signed in</title></head>\
         <body><p>Signed in as {}.</p></body></html>",
        html_escape(name_id)
    )
}
