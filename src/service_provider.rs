//! The SP identity handed to the SAML protocol engine.
//!
//! Holds the key material, derived endpoints and trusted IdPs. Assertion
//! handling lives in the protocol engine; this type only carries what it
//! needs.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use openssl::{
    pkey::{PKey, Private},
    x509::X509,
};
use quick_xml::escape::escape;
use samael::metadata::EntityDescriptor;
use url::Url;

use crate::{logger::SharedLogger, registry::IdpRegistry};

/// Whether AuthnRequests ask the IdP to re-authenticate the user.
///
/// `Unset` leaves the attribute off the request so the IdP default applies;
/// `Disabled` sends `ForceAuthn="false"` explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForceAuthn {
    #[default]
    Unset,
    Enabled,
    Disabled,
}

impl ForceAuthn {
    /// The value to put on the wire, if any.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Unset => None,
            Self::Enabled => Some(true),
            Self::Disabled => Some(false),
        }
    }
}

impl From<bool> for ForceAuthn {
    fn from(value: bool) -> Self {
        if value { Self::Enabled } else { Self::Disabled }
    }
}

/// SP identity and trusted IdPs.
pub struct ServiceProvider {
    key: PKey<Private>,
    certificate: X509,
    logger: SharedLogger,
    metadata_url: Url,
    acs_url: Url,
    idps: IdpRegistry,
    force_authn: ForceAuthn,
}

impl ServiceProvider {
    pub(crate) fn new(
        key: PKey<Private>,
        certificate: X509,
        logger: SharedLogger,
        metadata_url: Url,
        acs_url: Url,
        idps: IdpRegistry,
        force_authn: ForceAuthn,
    ) -> Self {
        Self {
            key,
            certificate,
            logger,
            metadata_url,
            acs_url,
            idps,
            force_authn,
        }
    }

    /// SP private key.
    pub fn key(&self) -> &PKey<Private> {
        &self.key
    }

    /// SP certificate.
    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }

    pub fn logger(&self) -> &SharedLogger {
        &self.logger
    }

    /// `<base URL>/saml/metadata`; also the SP entity ID.
    pub fn metadata_url(&self) -> &Url {
        &self.metadata_url
    }

    /// `<base URL>/saml/acs`
    pub fn acs_url(&self) -> &Url {
        &self.acs_url
    }

    pub fn force_authn(&self) -> ForceAuthn {
        self.force_authn
    }

    /// The IdP for single-IdP callers: the most recently added one.
    pub fn idp_metadata(&self) -> Option<&EntityDescriptor> {
        self.idps.primary().map(AsRef::as_ref)
    }

    /// All trusted IdPs keyed by entity ID.
    pub fn idp_metadatas(&self) -> &IdpRegistry {
        &self.idps
    }

    pub(crate) fn idps_mut(&mut self) -> &mut IdpRegistry {
        &mut self.idps
    }

    /// Generate the SP metadata document for IdP configuration.
    ///
    /// The entity ID is the metadata URL. The certificate is published for
    /// both signing and encryption, and the ACS endpoint uses the HTTP-POST
    /// binding.
    pub fn metadata_xml(&self) -> Result<String, openssl::error::ErrorStack> {
        let cert_data = STANDARD.encode(self.certificate.to_der()?);
        let entity_id = escape(self.metadata_url.as_str());
        let acs_url = escape(self.acs_url.as_str());

        let mut xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{entity_id}">
  <md:SPSSODescriptor AuthnRequestsSigned="false" WantAssertionsSigned="true" protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">"#
        );

        for key_use in ["signing", "encryption"] {
            xml.push_str(&format!(
                r#"
    <md:KeyDescriptor use="{key_use}">
      <ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
        <ds:X509Data>
          <ds:X509Certificate>{cert_data}</ds:X509Certificate>
        </ds:X509Data>
      </ds:KeyInfo>
    </md:KeyDescriptor>"#
            ));
        }

        xml.push_str(&format!(
            r#"
    <md:NameIDFormat>urn:oasis:names:tc:SAML:2.0:nameid-format:transient</md:NameIDFormat>
    <md:AssertionConsumerService
        Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST"
        Location="{acs_url}"
        index="1"/>
  </md:SPSSODescriptor>
</md:EntityDescriptor>"#
        ));

        Ok(xml)
    }
}

impl fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("key", &"****")
            .field("certificate", &self.certificate.subject_name())
            .field("metadata_url", &self.metadata_url.as_str())
            .field("acs_url", &self.acs_url.as_str())
            .field("idps", &self.idps.entity_ids())
            .field("force_authn", &self.force_authn)
            .finish()
    }
}
