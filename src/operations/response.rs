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

//! Response validation (`ip`, `cp`, `kup`, `error`).
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. an `error` body surfaces the CA's status text
//! 2. protection must be present
//! 3. signature protection must verify under the configured key, or under a
//!    sender certificate issued by it
//! 4. password-based MAC must recompute
//! 5. transactionID and recipNonce must echo the request
//! 6. the certificate response must be accepted and carry a certificate

use der::asn1::Any;
use der::{Decode, Encode};
use spki::SubjectPublicKeyInfoOwned;
use tracing::{debug, info, warn};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::Certificate;

use crate::error::{CmpError, Result};
use crate::operations::request::PreparedRequest;
use crate::protection::{PasswordBasedMac, PbmParameters};
use crate::renewal;
use crate::types::cmp::{CertOrEncCert, CertRepMessage, PkiBody, PkiMessage, PkiStatus};
use crate::types::{oids, RequestType};
use crate::validation::{self, ChainAssembler};

/// A response that passed every check.
#[derive(Debug, Clone)]
pub struct ValidatedResponse {
    /// The newly issued certificate.
    pub certificate: Certificate,

    /// Untrusted certificates from `extraCerts`.
    pub extra_certs: Vec<Any>,

    /// CA certificates from the response's `caPubs`.
    pub ca_pubs: Vec<Any>,

    /// Whether the CA granted implicit confirmation.
    pub implicit_confirm: bool,
}

/// Validator for the CA's answer to one request.
pub struct ResponseValidator {
    request_type: RequestType,
    shared_secret: Vec<u8>,
    transaction_id: Option<Vec<u8>>,
    sender_nonce: Option<Vec<u8>>,
    verification_key: Option<SubjectPublicKeyInfoOwned>,
}

impl std::fmt::Debug for ResponseValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseValidator")
            .field("request_type", &self.request_type)
            .field("transaction_id", &self.transaction_id.as_ref().map(hex::encode))
            .field("verification_key", &self.verification_key.is_some())
            .finish()
    }
}

impl ResponseValidator {
    /// Validator for a response to `request_type`, MAC-keyed by `shared_secret`.
    pub fn new(request_type: RequestType, shared_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            request_type,
            shared_secret: shared_secret.into(),
            transaction_id: None,
            sender_nonce: None,
            verification_key: None,
        }
    }

    /// Validator expecting the transaction ID and nonce of `request`.
    pub fn for_request(request: &PreparedRequest, shared_secret: impl Into<Vec<u8>>) -> Self {
        Self::new(request.request_type, shared_secret)
            .expect_transaction(request.transaction_id.clone(), request.sender_nonce.clone())
    }

    /// Require the response to echo this transaction ID and nonce.
    pub fn expect_transaction(mut self, transaction_id: Vec<u8>, sender_nonce: Vec<u8>) -> Self {
        self.transaction_id = Some(transaction_id);
        self.sender_nonce = Some(sender_nonce);
        self
    }

    /// Trusted key for signature-protected responses.
    ///
    /// Either the CA's own signing key, or a key that issued the signer
    /// certificate the CA sends in `extraCerts`. Without it, signed
    /// responses are rejected.
    pub fn with_verification_key(mut self, key: SubjectPublicKeyInfoOwned) -> Self {
        self.verification_key = Some(key);
        self
    }

    /// Decode and validate a DER-encoded response.
    pub fn validate(&self, response: &[u8]) -> Result<ValidatedResponse> {
        let message = PkiMessage::from_der(response).map_err(|e| {
            CmpError::malformed_response(format!("Response is not a PKIMessage: {}", e))
        })?;
        debug!("Received '{}' response", message.body.name());

        if let PkiBody::Error(content) = &message.body {
            let text = content.pki_status_info.text();
            warn!("CA returned an error response: {}", text);
            return Err(CmpError::server_protocol(text));
        }

        self.verify_protection(&message)?;
        self.verify_transaction(&message)?;

        let implicit_confirm = message.header.has_general_info(&oids::IMPLICIT_CONFIRM);
        if implicit_confirm {
            debug!("CA granted implicit confirmation");
        }

        let rep = self.expected_body(&message.body)?;
        let certificate = certificate_from(rep)?;

        Ok(ValidatedResponse {
            certificate,
            extra_certs: message.extra_certs.clone().unwrap_or_default(),
            ca_pubs: rep.ca_pubs.clone().unwrap_or_default(),
            implicit_confirm,
        })
    }

    fn verify_protection(&self, message: &PkiMessage) -> Result<()> {
        let (Some(alg), Some(protection)) = (&message.header.protection_alg, &message.protection)
        else {
            return Err(CmpError::response_integrity("Response is not protected"));
        };
        let protected_part = message.protected_part().to_der().map_err(|e| {
            CmpError::malformed_response(format!("Cannot encode protected part: {}", e))
        })?;

        if alg.oid == oids::PASSWORD_BASED_MAC {
            let params = PbmParameters::from_algorithm_identifier(alg)?;
            info!(
                "Verifying PBM protection: {} iterations, owf {}, mac {}",
                params.iteration_count, params.owf, params.mac
            );
            return PasswordBasedMac::new(self.shared_secret.clone(), params)
                .verify(&protected_part, protection.raw_bytes());
        }

        let key = self.signer_key(message)?;
        validation::verify_signature(alg, &key, &protected_part, protection.raw_bytes())
            .map_err(|e| {
                CmpError::response_integrity(format!("Response signature invalid: {}", e))
            })?;
        debug!("Response signature verified");
        Ok(())
    }

    /// Key that must have signed the response.
    ///
    /// The configured verification key is the only trust root. A certificate
    /// in `extraCerts` naming the header sender is used in its place only when
    /// it carries that key or was issued under it.
    fn signer_key(&self, message: &PkiMessage) -> Result<SubjectPublicKeyInfoOwned> {
        let trusted = self.verification_key.as_ref().ok_or_else(|| {
            CmpError::response_integrity(
                "No trusted key available to verify the response signature",
            )
        })?;

        let assembler = ChainAssembler::new();
        for cert in sender_certificates(message) {
            let key = &cert.tbs_certificate.subject_public_key_info;
            if key == trusted {
                return Ok(key.clone());
            }
            match assembler.verify_issued_by(&cert, trusted) {
                Ok(()) => {
                    debug!(
                        "Signer certificate '{}' verified against the trusted key",
                        cert.tbs_certificate.subject
                    );
                    return Ok(cert.tbs_certificate.subject_public_key_info);
                }
                Err(e) => warn!(
                    "Ignoring signer certificate '{}' from extraCerts: {}",
                    cert.tbs_certificate.subject, e
                ),
            }
        }

        Ok(trusted.clone())
    }

    fn verify_transaction(&self, message: &PkiMessage) -> Result<()> {
        let header = &message.header;
        check_echo(
            "transactionID",
            header.transaction_id.as_ref().map(|o| o.as_bytes()),
            self.transaction_id.as_deref(),
        )?;
        check_echo(
            "recipNonce",
            header.recip_nonce.as_ref().map(|o| o.as_bytes()),
            self.sender_nonce.as_deref(),
        )
    }

    fn expected_body<'m>(&self, body: &'m PkiBody) -> Result<&'m CertRepMessage> {
        match (self.request_type, body) {
            (RequestType::Initialization, PkiBody::Ip(rep))
            | (RequestType::Certification, PkiBody::Cp(rep))
            | (RequestType::KeyUpdate, PkiBody::Kup(rep)) => Ok(rep),
            (expected, other) => Err(CmpError::malformed_response(format!(
                "Unexpected '{}' response to '{}' request",
                other.name(),
                expected
            ))),
        }
    }
}

/// Certificates in `extraCerts` whose subject names the header sender.
fn sender_certificates(message: &PkiMessage) -> Vec<Certificate> {
    let GeneralName::DirectoryName(sender) = &message.header.sender else {
        return Vec::new();
    };
    message
        .extra_certs
        .iter()
        .flatten()
        .filter_map(|any| any.to_der().ok().and_then(|d| Certificate::from_der(&d).ok()))
        .filter(|cert| renewal::names_match(&cert.tbs_certificate.subject, sender))
        .collect()
}

fn check_echo(field: &str, received: Option<&[u8]>, expected: Option<&[u8]>) -> Result<()> {
    match (received, expected) {
        (Some(received), Some(expected)) if received != expected => {
            Err(CmpError::response_integrity(format!(
                "Response {} does not match the request",
                field
            )))
        }
        (None, Some(_)) => {
            warn!("Response has no {}", field);
            Ok(())
        }
        _ => Ok(()),
    }
}

fn certificate_from(rep: &CertRepMessage) -> Result<Certificate> {
    let response = rep
        .response
        .first()
        .ok_or_else(|| CmpError::server_protocol("Certificate response is empty"))?;

    let text = response.status.text();
    info!(
        "Certificate response status {} for request {}: {}",
        response.status.status, response.cert_req_id, text
    );
    if response.status.pki_status() == Some(PkiStatus::Rejection) {
        return Err(CmpError::server_protocol(text));
    }

    match response.certified_key_pair.as_ref().map(|p| &p.cert_or_enc_cert) {
        Some(CertOrEncCert::Certificate(cert)) => Ok(cert.clone()),
        Some(CertOrEncCert::EncryptedCert(_)) => Err(CmpError::server_protocol(
            "CA returned an encrypted certificate",
        )),
        None => Err(CmpError::server_protocol(format!(
            "No certificate in response: {}",
            text
        ))),
    }
}
