//! SP metadata document.

use super::CommandResult;
use crate::config::Saml2Config;
use crate::error::CommandError;

pub const METADATA_CONTENT_TYPE: &str = "application/samlmetadata+xml";

pub(crate) fn run(config: &Saml2Config) -> Result<CommandResult, CommandError> {
    Ok(CommandResult::content(
        build_metadata(config),
        METADATA_CONTENT_TYPE,
    ))
}

fn build_metadata(config: &Saml2Config) -> String {
    let key_descriptor = config
        .certificate_pem
        .as_deref()
        .map(|pem| {
            format!(
                r#"
        <md:KeyDescriptor use="signing">
            <ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
                <ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data>
            </ds:KeyInfo>
        </md:KeyDescriptor>"#,
                pem_body(pem)
            )
        })
        .unwrap_or_default();

    let name_id_format = config
        .name_id_format
        .as_ref()
        .map(|format| format!("\n        <md:NameIDFormat>{}</md:NameIDFormat>", format))
        .unwrap_or_default();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{}">
    <md:SPSSODescriptor AuthnRequestsSigned="false" WantAssertionsSigned="true"
        protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">{}{}
        <md:AssertionConsumerService index="0" isDefault="true"
            Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST"
            Location="{}"/>
    </md:SPSSODescriptor>
</md:EntityDescriptor>"#,
        config.entity_id, key_descriptor, name_id_format, config.acs_url
    )
}

/// Strip PEM armour and line breaks, leaving the base64 DER body.
fn pem_body(pem: &str) -> String {
    pem.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("-----"))
        .collect()
}
