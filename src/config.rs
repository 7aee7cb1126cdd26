// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration types for the CMP client.
//!
//! [`CmpClientConfig`] holds HTTP and TLS settings shared by every request.
//! [`CaEndpoint`] describes one Certification Authority: where it lives, who
//! it is, and the shared secrets used to authenticate to it.

use std::str::FromStr;
use std::time::Duration;
use url::Url;
use x509_cert::name::Name;

/// Maximum length of a CA name.
pub const MAX_CA_NAME_LEN: usize = 128;

/// HTTP and TLS configuration for a CMP client.
#[derive(Clone)]
pub struct CmpClientConfig {
    /// Client identity for TLS client certificate authentication.
    pub client_identity: Option<ClientIdentity>,

    /// Trust anchor configuration for server certificate verification.
    pub trust_anchors: TrustAnchors,

    /// Request timeout duration.
    pub timeout: Duration,

    /// User-Agent header value.
    pub user_agent: String,

    /// Additional HTTP headers to include in requests.
    pub additional_headers: Vec<(String, String)>,
}

impl std::fmt::Debug for CmpClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmpClientConfig")
            .field("client_identity", &self.client_identity.is_some())
            .field("trust_anchors", &self.trust_anchors)
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("additional_headers", &self.additional_headers.len())
            .finish()
    }
}

impl Default for CmpClientConfig {
    fn default() -> Self {
        Self {
            client_identity: None,
            trust_anchors: TrustAnchors::WebPki,
            timeout: Duration::from_secs(30),
            user_agent: default_user_agent(),
            additional_headers: Vec::new(),
        }
    }
}

fn default_user_agent() -> String {
    crate::USER_AGENT.to_string()
}

impl CmpClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> CmpClientConfigBuilder {
        CmpClientConfigBuilder::new()
    }
}

/// Builder for [`CmpClientConfig`].
#[derive(Default)]
pub struct CmpClientConfigBuilder {
    client_identity: Option<ClientIdentity>,
    trust_anchors: Option<TrustAnchors>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    additional_headers: Vec<(String, String)>,
}

impl CmpClientConfigBuilder {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the client identity for TLS client authentication.
    pub fn client_identity(mut self, identity: ClientIdentity) -> Self {
        self.client_identity = Some(identity);
        self
    }

    /// Use Mozilla's root CA store (webpki-roots) for server verification.
    pub fn trust_webpki_roots(mut self) -> Self {
        self.trust_anchors = Some(TrustAnchors::WebPki);
        self
    }

    /// Use explicit PEM-encoded CA certificates for server verification.
    pub fn trust_explicit(mut self, ca_certs: Vec<Vec<u8>>) -> Self {
        self.trust_anchors = Some(TrustAnchors::Explicit(ca_certs));
        self
    }

    /// Accept any server certificate (insecure, for testing only).
    pub fn trust_any_insecure(mut self) -> Self {
        self.trust_anchors = Some(TrustAnchors::InsecureAcceptAny);
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Add an additional HTTP header to all requests.
    pub fn add_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_headers.push((name.into(), value.into()));
        self
    }

    /// Build the configuration.
    pub fn build(self) -> CmpClientConfig {
        CmpClientConfig {
            client_identity: self.client_identity,
            trust_anchors: self.trust_anchors.unwrap_or(TrustAnchors::WebPki),
            timeout: self.timeout.unwrap_or(Duration::from_secs(30)),
            user_agent: self.user_agent.unwrap_or_else(default_user_agent),
            additional_headers: self.additional_headers,
        }
    }
}

/// Client identity for TLS client certificate authentication.
#[derive(Clone)]
pub struct ClientIdentity {
    /// PEM-encoded certificate chain, client certificate first.
    pub cert_pem: Vec<u8>,

    /// PEM-encoded private key.
    pub key_pem: Vec<u8>,
}

impl ClientIdentity {
    /// Create a new client identity from PEM-encoded data.
    pub fn new(cert_pem: impl Into<Vec<u8>>, key_pem: impl Into<Vec<u8>>) -> Self {
        Self {
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
        }
    }

    /// Create a client identity from file paths.
    pub fn from_files(
        cert_path: impl AsRef<std::path::Path>,
        key_path: impl AsRef<std::path::Path>,
    ) -> std::io::Result<Self> {
        let cert_pem = std::fs::read(cert_path)?;
        let key_pem = std::fs::read(key_path)?;
        Ok(Self { cert_pem, key_pem })
    }
}

/// Trust anchor configuration for server certificate verification.
#[derive(Clone)]
pub enum TrustAnchors {
    /// Use Mozilla's root CA store (webpki-roots).
    WebPki,

    /// Use explicit CA certificates (PEM-encoded).
    Explicit(Vec<Vec<u8>>),

    /// Accept any server certificate.
    ///
    /// **WARNING**: This disables all server certificate verification.
    /// Only use for testing purposes.
    InsecureAcceptAny,
}

impl std::fmt::Debug for TrustAnchors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WebPki => write!(f, "WebPki"),
            Self::Explicit(certs) => write!(f, "Explicit({} certs)", certs.len()),
            Self::InsecureAcceptAny => write!(f, "InsecureAcceptAny"),
        }
    }
}

/// How the client presents itself to the CA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaMode {
    /// Requests are relayed by a Registration Authority.
    #[default]
    Ra,
    /// Requests come directly from the end entity.
    Client,
}

impl CaMode {
    /// Upper-case name as used in CA configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ra => "RA",
            Self::Client => "CLIENT",
        }
    }

    /// Profile the CA applies to requests in this mode.
    pub fn profile(&self) -> &'static str {
        self.as_str()
    }
}

impl std::fmt::Display for CaMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.profile())
    }
}

impl FromStr for CaMode {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RA" => Ok(Self::Ra),
            "CLIENT" => Ok(Self::Client),
            _ => Err("ca_mode must be RA or CLIENT"),
        }
    }
}

/// Shared secrets agreed out of band with the CA.
#[derive(Clone)]
pub struct CaAuthentication {
    /// Initial authentication key, the password-based MAC secret.
    pub iak: String,

    /// Reference value, sent as the sender key identifier.
    pub rv: String,
}

impl CaAuthentication {
    /// Create new CA authentication values.
    pub fn new(iak: impl Into<String>, rv: impl Into<String>) -> Self {
        Self {
            iak: iak.into(),
            rv: rv.into(),
        }
    }
}

impl std::fmt::Debug for CaAuthentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaAuthentication")
            .field("iak", &"<redacted>")
            .field("rv", &self.rv)
            .finish()
    }
}

/// A Certification Authority the client can request certificates from.
#[derive(Debug, Clone)]
pub struct CaEndpoint {
    /// Name identifying the CA in logs and errors.
    pub ca_name: String,

    /// URL the PKIMessages are POSTed to.
    pub url: Url,

    /// Distinguished name of the CA, used as the message recipient and
    /// certificate template issuer.
    pub issuer_dn: Name,

    /// Operating mode of the CA.
    pub ca_mode: CaMode,

    /// Shared secrets for password-based protection.
    pub authentication: CaAuthentication,
}

impl CaEndpoint {
    /// Create a new endpoint builder.
    pub fn builder() -> CaEndpointBuilder {
        CaEndpointBuilder::default()
    }
}

/// Builder for [`CaEndpoint`].
#[derive(Default)]
pub struct CaEndpointBuilder {
    ca_name: Option<String>,
    url: Option<Url>,
    issuer_dn: Option<Name>,
    ca_mode: CaMode,
    authentication: Option<CaAuthentication>,
}

impl CaEndpointBuilder {
    /// Set the CA name.
    pub fn ca_name(mut self, name: impl Into<String>) -> Self {
        self.ca_name = Some(name.into());
        self
    }

    /// Set the CA URL.
    pub fn url(mut self, url: impl AsRef<str>) -> Result<Self, url::ParseError> {
        self.url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Set the issuer DN from its RFC 4514 string form.
    pub fn issuer_dn(mut self, dn: &str) -> Result<Self, der::Error> {
        self.issuer_dn = Some(Name::from_str(dn)?);
        Ok(self)
    }

    /// Set the issuer DN from a parsed name.
    pub fn issuer_name(mut self, dn: Name) -> Self {
        self.issuer_dn = Some(dn);
        self
    }

    /// Set the CA mode.
    pub fn ca_mode(mut self, mode: CaMode) -> Self {
        self.ca_mode = mode;
        self
    }

    /// Set the initial authentication key and reference value.
    pub fn authentication(mut self, iak: impl Into<String>, rv: impl Into<String>) -> Self {
        self.authentication = Some(CaAuthentication::new(iak, rv));
        self
    }

    /// Build the endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing or the CA name is
    /// empty or longer than [`MAX_CA_NAME_LEN`] characters.
    pub fn build(self) -> Result<CaEndpoint, &'static str> {
        let ca_name = self.ca_name.ok_or("ca_name is required")?;
        if ca_name.trim().is_empty() || ca_name.chars().count() > MAX_CA_NAME_LEN {
            return Err("ca_name must be 1 to 128 characters");
        }

        Ok(CaEndpoint {
            ca_name,
            url: self.url.ok_or("url is required")?,
            issuer_dn: self.issuer_dn.ok_or("issuer_dn is required")?,
            ca_mode: self.ca_mode,
            authentication: self.authentication.ok_or("authentication is required")?,
        })
    }
}
