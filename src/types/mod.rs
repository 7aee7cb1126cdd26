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

//! CMP message types and caller-facing models.
//!
//! This module provides the DER structures exchanged with the CA
//! ([`cmp`], [`crmf`]) and the plain models callers hand to and receive
//! from [`CmpClient`](crate::CmpClient).

pub mod cmp;
pub mod crmf;

use std::time::SystemTime;

use der::{Decode, EncodePem};
use rsa::pkcs8::EncodePublicKey;
use rsa::RsaPrivateKey;
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::name::Name;
use x509_cert::Certificate;

use crate::error::{CmpError, Result};

/// Data describing the certificate a caller wants issued.
///
/// Usually produced from a decoded CSR. Immutable for the duration of a call.
#[derive(Clone)]
pub struct CsrRequestData {
    /// Subject distinguished name.
    pub subject: Name,

    /// Subject public key to certify.
    pub public_key: SubjectPublicKeyInfoOwned,

    /// Private key matching `public_key`, used for proof-of-possession.
    pub private_key: RsaPrivateKey,

    /// Subject alternative names.
    pub sans: Vec<GeneralName>,
}

impl CsrRequestData {
    /// Create request data, deriving the public key from the private key.
    pub fn new(subject: Name, private_key: RsaPrivateKey, sans: Vec<GeneralName>) -> Result<Self> {
        let spki_der = private_key
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| CmpError::request_construction(format!("Invalid public key: {}", e)))?;
        let public_key = SubjectPublicKeyInfoOwned::from_der(spki_der.as_bytes())?;

        Ok(Self {
            subject,
            public_key,
            private_key,
            sans,
        })
    }

    /// Create request data with an explicitly supplied public key.
    pub fn with_public_key(
        subject: Name,
        public_key: SubjectPublicKeyInfoOwned,
        private_key: RsaPrivateKey,
        sans: Vec<GeneralName>,
    ) -> Self {
        Self {
            subject,
            public_key,
            private_key,
            sans,
        }
    }
}

impl std::fmt::Debug for CsrRequestData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrRequestData")
            .field("subject", &self.subject.to_string())
            .field("sans", &self.sans.len())
            .finish()
    }
}

/// The certificate being renewed together with its private key.
///
/// Key update requests are signed with this key, and the certificate travels
/// in the request's `extraCerts`.
#[derive(Clone)]
pub struct OldCertificate {
    /// Certificate being renewed.
    pub certificate: Certificate,

    /// Private key of the certificate being renewed.
    pub private_key: RsaPrivateKey,
}

impl OldCertificate {
    /// Create a new old-certificate bundle.
    pub fn new(certificate: Certificate, private_key: RsaPrivateKey) -> Self {
        Self {
            certificate,
            private_key,
        }
    }
}

impl std::fmt::Debug for OldCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OldCertificate")
            .field("subject", &self.certificate.tbs_certificate.subject.to_string())
            .finish()
    }
}

/// The CMP operation a request is sent as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    /// Initialization request (`ir`), answered with `ip`.
    Initialization,
    /// Certification request (`cr`), answered with `cp`.
    Certification,
    /// Key update request (`kur`), answered with `kup`.
    KeyUpdate,
}

impl RequestType {
    /// Short RFC 4210 name of the request body.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialization => "ir",
            Self::Certification => "cr",
            Self::KeyUpdate => "kur",
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested validity period of the certificate.
///
/// Either bound may be left unset, in which case the CA picks it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestValidity {
    /// Earliest time the certificate should be valid.
    pub not_before: Option<SystemTime>,

    /// Latest time the certificate should be valid.
    pub not_after: Option<SystemTime>,
}

impl RequestValidity {
    /// Create a validity period from optional bounds.
    pub fn new(not_before: Option<SystemTime>, not_after: Option<SystemTime>) -> Self {
        Self {
            not_before,
            not_after,
        }
    }

    /// Returns true if neither bound is set.
    pub fn is_empty(&self) -> bool {
        self.not_before.is_none() && self.not_after.is_none()
    }

    /// Check that `notBefore` does not come after `notAfter`.
    pub fn validate(&self) -> Result<()> {
        if let (Some(not_before), Some(not_after)) = (self.not_before, self.not_after) {
            if not_before > not_after {
                return Err(CmpError::client_validation(
                    "notBefore must not be later than notAfter",
                ));
            }
        }
        Ok(())
    }
}

/// Outcome of a successful issuance or renewal.
#[derive(Debug, Clone)]
pub struct CertificationResult {
    /// Issued certificate followed by its issuers, root excluded.
    pub certificate_chain: Vec<Certificate>,

    /// The chain's self-signed root plus any unrelated anchors the CA sent.
    pub trusted_certificates: Vec<Certificate>,
}

impl CertificationResult {
    /// Create a new result.
    pub fn new(certificate_chain: Vec<Certificate>, trusted_certificates: Vec<Certificate>) -> Self {
        Self {
            certificate_chain,
            trusted_certificates,
        }
    }

    /// The newly issued certificate.
    pub fn leaf(&self) -> Option<&Certificate> {
        self.certificate_chain.first()
    }

    /// PEM encoding of every certificate in the chain, leaf first.
    pub fn certificate_chain_pem(&self) -> Result<Vec<String>> {
        to_pem_list(&self.certificate_chain)
    }

    /// PEM encoding of every trusted certificate.
    pub fn trusted_certificates_pem(&self) -> Result<Vec<String>> {
        to_pem_list(&self.trusted_certificates)
    }
}

fn to_pem_list(certs: &[Certificate]) -> Result<Vec<String>> {
    certs
        .iter()
        .map(|cert| {
            cert.to_pem(der::pem::LineEnding::LF)
                .map_err(|e| CmpError::malformed_response(format!("PEM encoding failed: {}", e)))
        })
        .collect()
}

/// Content types used in the CMP HTTP transfer (RFC 6712).
pub mod content_types {
    /// DER-encoded PKIMessage.
    pub const PKIXCMP: &str = "application/pkixcmp";
}

/// CMP-specific object identifiers.
///
/// Algorithm identifiers with a registered name live in
/// [`const_oid::db::rfc5912`] and are used from there.
pub mod oids {
    use der::asn1::ObjectIdentifier;

    /// Password-based MAC (`id-PasswordBasedMac`).
    pub const PASSWORD_BASED_MAC: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.113533.7.66.13");

    /// HMAC-SHA1 (`hMAC-SHA1`, RFC 2404).
    pub const HMAC_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.8.1.2");

    /// HMAC-SHA1 (`id-hmacWithSHA1`, RSADSI arc).
    pub const HMAC_WITH_SHA1: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.113549.2.7");

    /// HMAC-SHA256 (`id-hmacWithSHA256`).
    pub const HMAC_WITH_SHA256: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.113549.2.9");

    /// `id-it-implicitConfirm`.
    pub const IMPLICIT_CONFIRM: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.4.13");
}
