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

//! Renewal request selection.
//!
//! A renewal is sent as a key update request (`kur`) when the new request
//! asks for exactly the same identity as the certificate being renewed, and
//! as a fresh certification request (`cr`) otherwise. "Same identity" means
//! equal subject DN attributes and equal subject alternative names, both
//! compared as multisets so that ordering does not matter.
//!
//! # Example
//!
//! ```no_run
//! use usg_cmp_client::renewal::{decide_request_type, PriorCertificateData};
//! use usg_cmp_client::{CsrRequestData, RequestType};
//! # use usg_cmp_client::Certificate;
//!
//! # fn example(csr: CsrRequestData, old: Certificate) -> Result<(), Box<dyn std::error::Error>> {
//! let prior = PriorCertificateData::from_certificate(&old)?;
//! match decide_request_type(&csr, &prior) {
//!     RequestType::KeyUpdate => println!("identity unchanged, updating key"),
//!     _ => println!("identity changed, requesting a new certificate"),
//! }
//! # Ok(())
//! # }
//! ```

use const_oid::db::rfc5280::ID_CE_SUBJECT_ALT_NAME;
use der::{Decode, Encode, Tag, Tagged};
use tracing::debug;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::name::Name;
use x509_cert::Certificate;

use crate::error::{CmpError, Result};
use crate::types::{CsrRequestData, RequestType};

/// Anything that names a subject and its alternative names.
pub trait CertificateIdentity {
    /// Subject distinguished name.
    fn subject(&self) -> &Name;

    /// Subject alternative names.
    fn subject_alt_names(&self) -> &[GeneralName];
}

impl CertificateIdentity for CsrRequestData {
    fn subject(&self) -> &Name {
        &self.subject
    }

    fn subject_alt_names(&self) -> &[GeneralName] {
        &self.sans
    }
}

/// Identity data of the certificate being renewed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorCertificateData {
    /// Subject distinguished name.
    pub subject: Name,

    /// Subject alternative names.
    pub sans: Vec<GeneralName>,
}

impl PriorCertificateData {
    /// Create prior certificate data from its parts.
    pub fn new(subject: Name, sans: Vec<GeneralName>) -> Self {
        Self { subject, sans }
    }

    /// Extract the subject and SAN extension of an existing certificate.
    pub fn from_certificate(cert: &Certificate) -> Result<Self> {
        let mut sans = Vec::new();
        for ext in cert.tbs_certificate.extensions.iter().flatten() {
            if ext.extn_id == ID_CE_SUBJECT_ALT_NAME {
                let san = SubjectAltName::from_der(ext.extn_value.as_bytes()).map_err(|e| {
                    CmpError::client_validation(format!(
                        "Invalid subject alternative names in old certificate: {}",
                        e
                    ))
                })?;
                sans.extend(san.0);
            }
        }

        Ok(Self {
            subject: cert.tbs_certificate.subject.clone(),
            sans,
        })
    }
}

impl CertificateIdentity for PriorCertificateData {
    fn subject(&self) -> &Name {
        &self.subject
    }

    fn subject_alt_names(&self) -> &[GeneralName] {
        &self.sans
    }
}

/// Returns true if both identities carry the same DN attributes and SANs.
///
/// DN attributes are compared regardless of RDN order; string values are
/// compared after trimming, whitespace collapsing and case folding, so a
/// `PrintableString` and a `UTF8String` with the same text are equal. SANs
/// are compared by their DER encoding, with duplicates counted.
pub fn is_same_identity(a: &impl CertificateIdentity, b: &impl CertificateIdentity) -> bool {
    let same_subject = name_attributes(a.subject()) == name_attributes(b.subject());
    let same_sans = encoded_sans(a.subject_alt_names()) == encoded_sans(b.subject_alt_names());
    debug!(same_subject, same_sans, "Compared certificate identities");
    same_subject && same_sans
}

/// Choose between a key update and a certification request for a renewal.
pub fn decide_request_type(
    csr: &impl CertificateIdentity,
    prior: &impl CertificateIdentity,
) -> RequestType {
    if is_same_identity(csr, prior) {
        RequestType::KeyUpdate
    } else {
        RequestType::Certification
    }
}

/// Returns true if both names carry the same attributes after normalization.
pub(crate) fn names_match(a: &Name, b: &Name) -> bool {
    a == b || name_attributes(a) == name_attributes(b)
}

/// Sorted (OID, normalized value) pairs of every attribute in the name.
pub(crate) fn name_attributes(name: &Name) -> Vec<(String, String)> {
    let mut attrs: Vec<(String, String)> = name
        .0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .map(|atv| (atv.oid.to_string(), normalize_value(&atv.value)))
        .collect();
    attrs.sort();
    attrs
}

fn normalize_value(value: &der::Any) -> String {
    let text = match value.tag() {
        Tag::Utf8String
        | Tag::PrintableString
        | Tag::Ia5String
        | Tag::TeletexString
        | Tag::VisibleString => std::str::from_utf8(value.value()).ok().map(str::to_owned),
        Tag::BmpString => decode_bmp(value.value()),
        _ => None,
    };

    match text {
        Some(text) => text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase(),
        None => format!("#{}", hex::encode(value.value())),
    }
}

fn decode_bmp(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

/// Sorted DER encodings of the SANs. Unencodable entries compare by debug form.
fn encoded_sans(sans: &[GeneralName]) -> Vec<Vec<u8>> {
    let mut encoded: Vec<Vec<u8>> = sans
        .iter()
        .map(|san| {
            san.to_der()
                .unwrap_or_else(|_| format!("{:?}", san).into_bytes())
        })
        .collect();
    encoded.sort();
    encoded
}
