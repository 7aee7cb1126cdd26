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

//! Certificate chain assembly and link verification.
//!
//! A CA answers with the issued certificate plus two untrusted bags of
//! certificates (`extraCerts` on the message, `caPubs` on the certificate
//! response). [`ChainAssembler`] walks from the issued certificate up to a
//! self-signed root, verifying every link against its issuer as the sole
//! trust anchor, and splits the result into the chain and the trusted set.
//!
//! Revocation is not checked.
//!
//! # Example
//!
//! ```no_run
//! use usg_cmp_client::validation::ChainAssembler;
//! # use usg_cmp_client::Certificate;
//!
//! # fn example(leaf: Certificate, extra: Vec<der::Any>) -> Result<(), Box<dyn std::error::Error>> {
//! let result = ChainAssembler::new().assemble(&leaf, &extra, &[])?;
//! println!("chain has {} certificates", result.certificate_chain.len());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::time::SystemTime;

use const_oid::db::rfc5280::{
    ID_CE_AUTHORITY_KEY_IDENTIFIER, ID_CE_BASIC_CONSTRAINTS, ID_CE_CERTIFICATE_POLICIES,
    ID_CE_EXT_KEY_USAGE, ID_CE_INHIBIT_ANY_POLICY, ID_CE_ISSUER_ALT_NAME, ID_CE_KEY_USAGE,
    ID_CE_NAME_CONSTRAINTS, ID_CE_POLICY_CONSTRAINTS, ID_CE_SUBJECT_ALT_NAME,
    ID_CE_SUBJECT_KEY_IDENTIFIER,
};
use const_oid::db::rfc5912::{
    ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, ID_EC_PUBLIC_KEY, RSA_ENCRYPTION, SECP_256_R_1,
    SECP_384_R_1, SHA_256_WITH_RSA_ENCRYPTION, SHA_384_WITH_RSA_ENCRYPTION,
    SHA_512_WITH_RSA_ENCRYPTION,
};
use der::{Any, Decode, Encode};
use rsa::pkcs1v15;
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::{Sha256, Sha384, Sha512};
use spki::{AlgorithmIdentifierOwned, ObjectIdentifier, SubjectPublicKeyInfoOwned};
use tracing::{debug, warn};
use x509_cert::ext::pkix::{BasicConstraints, KeyUsage, KeyUsages};
use x509_cert::name::Name;
use x509_cert::Certificate;

use crate::error::{CmpError, Result};
use crate::renewal;
use crate::types::CertificationResult;

/// Extensions this verifier understands when they are marked critical.
const RECOGNIZED_CRITICAL_EXTENSIONS: &[ObjectIdentifier] = &[
    ID_CE_BASIC_CONSTRAINTS,
    ID_CE_KEY_USAGE,
    ID_CE_EXT_KEY_USAGE,
    ID_CE_SUBJECT_ALT_NAME,
    ID_CE_ISSUER_ALT_NAME,
    ID_CE_SUBJECT_KEY_IDENTIFIER,
    ID_CE_AUTHORITY_KEY_IDENTIFIER,
    ID_CE_CERTIFICATE_POLICIES,
    ID_CE_NAME_CONSTRAINTS,
    ID_CE_POLICY_CONSTRAINTS,
    ID_CE_INHIBIT_ANY_POLICY,
];

/// Builds and verifies the issuer chain of a newly issued certificate.
#[derive(Debug, Clone)]
pub struct ChainAssembler {
    validation_time: SystemTime,
}

impl Default for ChainAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainAssembler {
    /// Create an assembler that validates at the current time.
    pub fn new() -> Self {
        Self {
            validation_time: SystemTime::now(),
        }
    }

    /// Create an assembler that validates at a fixed time.
    pub fn at(validation_time: SystemTime) -> Self {
        Self { validation_time }
    }

    /// Assemble the chain of `leaf` from the untrusted certificate bags.
    ///
    /// `extra_certs` are processed before `ca_pubs`; when both carry a
    /// certificate with the same subject, the `ca_pubs` entry wins.
    /// Entries that do not decode as X.509 certificates are skipped.
    pub fn assemble(
        &self,
        leaf: &Certificate,
        extra_certs: &[Any],
        ca_pubs: &[Any],
    ) -> Result<CertificationResult> {
        let mut candidates = CertificateBag::default();
        candidates.extend(extra_certs, "extraCerts");
        candidates.extend(ca_pubs, "caPubs");

        candidates.remove(&leaf.tbs_certificate.subject);

        let mut chain = vec![leaf.clone()];
        loop {
            let current = &chain[chain.len() - 1];
            let issuer_name = &current.tbs_certificate.issuer;

            let issuer = candidates.remove(issuer_name).ok_or_else(|| {
                CmpError::certificate_chain(format!(
                    "No issuing certificate found for '{}'",
                    current.tbs_certificate.subject
                ))
            })?;

            debug!(
                "Verifying '{}' against issuer '{}'",
                current.tbs_certificate.subject, issuer.tbs_certificate.subject
            );
            self.verify_link(current, &issuer)?;

            if is_self_signed(&issuer) {
                let mut trusted = vec![issuer];
                trusted.extend(candidates.into_certificates());
                debug!(
                    "Assembled chain of {} certificates with {} trusted certificates",
                    chain.len(),
                    trusted.len()
                );
                return Ok(CertificationResult::new(chain, trusted));
            }

            chain.push(issuer);
        }
    }

    /// Validate `cert` against `issuer` as its sole trust anchor.
    ///
    /// Checks name chaining, the signature, the validity periods of both
    /// certificates, CA capability of the issuer, and critical extensions.
    /// A self-signed issuer is the trust anchor and its validity period is
    /// not checked.
    pub fn verify_link(&self, cert: &Certificate, issuer: &Certificate) -> Result<()> {
        if !renewal::names_match(&cert.tbs_certificate.issuer, &issuer.tbs_certificate.subject) {
            return Err(CmpError::certificate_chain(format!(
                "Issuer name of '{}' does not match '{}'",
                cert.tbs_certificate.subject, issuer.tbs_certificate.subject
            )));
        }

        if !is_self_signed(issuer) {
            self.check_validity_period(issuer)?;
        }
        check_critical_extensions(issuer)?;
        check_issuer_constraints(issuer)?;

        self.verify_issued_by(cert, &issuer.tbs_certificate.subject_public_key_info)
    }

    /// Validate `cert` on its own and its signature under `issuer_key`.
    ///
    /// Checks the validity period, critical extensions and signature of
    /// `cert`. Names are not compared.
    pub fn verify_issued_by(
        &self,
        cert: &Certificate,
        issuer_key: &SubjectPublicKeyInfoOwned,
    ) -> Result<()> {
        self.check_validity_period(cert)?;
        check_critical_extensions(cert)?;

        let tbs = cert.tbs_certificate.to_der().map_err(|e| {
            CmpError::certificate_chain(format!("Cannot encode certificate body: {}", e))
        })?;
        let signature = cert.signature.as_bytes().ok_or_else(|| {
            CmpError::certificate_chain("Certificate signature has unused bits")
        })?;

        verify_signature(&cert.signature_algorithm, issuer_key, &tbs, signature).map_err(|e| {
            CmpError::certificate_chain(format!(
                "Signature of '{}' does not verify: {}",
                cert.tbs_certificate.subject, e
            ))
        })
    }

    fn check_validity_period(&self, cert: &Certificate) -> Result<()> {
        let validity = &cert.tbs_certificate.validity;
        let not_before = validity.not_before.to_system_time();
        let not_after = validity.not_after.to_system_time();

        if self.validation_time < not_before {
            return Err(CmpError::certificate_chain(format!(
                "Certificate '{}' is not yet valid",
                cert.tbs_certificate.subject
            )));
        }
        if self.validation_time > not_after {
            return Err(CmpError::certificate_chain(format!(
                "Certificate '{}' has expired",
                cert.tbs_certificate.subject
            )));
        }
        Ok(())
    }
}

/// Normalized subject attributes, as compared by [`renewal::names_match`].
type NameKey = Vec<(String, String)>;

/// Scratch map of candidate issuers keyed by normalized subject DN.
#[derive(Default)]
struct CertificateBag {
    by_subject: HashMap<NameKey, Certificate>,
}

impl CertificateBag {
    fn extend(&mut self, entries: &[Any], bag: &str) {
        for entry in entries {
            let cert = match entry.to_der().and_then(|der| Certificate::from_der(&der)) {
                Ok(cert) => cert,
                Err(e) => {
                    warn!("Skipping undecodable certificate in {}: {}", bag, e);
                    continue;
                }
            };
            let key = renewal::name_attributes(&cert.tbs_certificate.subject);
            if let Some(previous) = self.by_subject.insert(key, cert) {
                warn!(
                    "Certificate for '{}' replaced by entry from {}",
                    previous.tbs_certificate.subject, bag
                );
            }
        }
    }

    fn remove(&mut self, name: &Name) -> Option<Certificate> {
        self.by_subject.remove(&renewal::name_attributes(name))
    }

    fn into_certificates(self) -> Vec<Certificate> {
        self.by_subject.into_values().collect()
    }
}

/// Returns true if the certificate's issuer DN equals its subject DN.
///
/// Names are compared attribute by attribute, ignoring RDN order, string
/// type, case and repeated whitespace.
pub fn is_self_signed(cert: &Certificate) -> bool {
    renewal::names_match(&cert.tbs_certificate.subject, &cert.tbs_certificate.issuer)
}

fn check_critical_extensions(cert: &Certificate) -> Result<()> {
    for ext in cert.tbs_certificate.extensions.iter().flatten() {
        if ext.critical && !RECOGNIZED_CRITICAL_EXTENSIONS.contains(&ext.extn_id) {
            return Err(CmpError::certificate_chain(format!(
                "Certificate '{}' has unrecognized critical extension {}",
                cert.tbs_certificate.subject, ext.extn_id
            )));
        }
    }
    Ok(())
}

fn check_issuer_constraints(issuer: &Certificate) -> Result<()> {
    let subject = &issuer.tbs_certificate.subject;
    let mut has_basic_constraints = false;

    for ext in issuer.tbs_certificate.extensions.iter().flatten() {
        if ext.extn_id == ID_CE_BASIC_CONSTRAINTS {
            has_basic_constraints = true;
            let bc = BasicConstraints::from_der(ext.extn_value.as_bytes()).map_err(|e| {
                CmpError::certificate_chain(format!("Invalid basic constraints: {}", e))
            })?;
            if !bc.ca {
                return Err(CmpError::certificate_chain(format!(
                    "Issuer '{}' is not a CA",
                    subject
                )));
            }
        } else if ext.extn_id == ID_CE_KEY_USAGE {
            let ku = KeyUsage::from_der(ext.extn_value.as_bytes())
                .map_err(|e| CmpError::certificate_chain(format!("Invalid key usage: {}", e)))?;
            if !ku.0.contains(KeyUsages::KeyCertSign) {
                return Err(CmpError::certificate_chain(format!(
                    "Issuer '{}' key usage does not permit certificate signing",
                    subject
                )));
            }
        }
    }

    if !has_basic_constraints {
        warn!("Issuer '{}' has no basic constraints extension", subject);
    }
    Ok(())
}

/// Verify `signature` over `message` with the key in `spki`.
///
/// Supports RSA PKCS#1 v1.5 with SHA-256/384/512 and ECDSA on P-256/P-384.
pub fn verify_signature(
    algorithm: &AlgorithmIdentifierOwned,
    spki: &SubjectPublicKeyInfoOwned,
    message: &[u8],
    signature: &[u8],
) -> std::result::Result<(), String> {
    match algorithm.oid {
        SHA_256_WITH_RSA_ENCRYPTION => {
            let key = rsa_key(spki)?;
            verify_rsa(pkcs1v15::VerifyingKey::<Sha256>::new(key), message, signature)
        }
        SHA_384_WITH_RSA_ENCRYPTION => {
            let key = rsa_key(spki)?;
            verify_rsa(pkcs1v15::VerifyingKey::<Sha384>::new(key), message, signature)
        }
        SHA_512_WITH_RSA_ENCRYPTION => {
            let key = rsa_key(spki)?;
            verify_rsa(pkcs1v15::VerifyingKey::<Sha512>::new(key), message, signature)
        }
        ECDSA_WITH_SHA_256 => {
            expect_curve(spki, SECP_256_R_1)?;
            let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(ec_point(spki)?)
                .map_err(|e| format!("invalid P-256 key: {}", e))?;
            let sig = p256::ecdsa::Signature::from_der(signature)
                .map_err(|e| format!("invalid ECDSA signature: {}", e))?;
            key.verify(message, &sig)
                .map_err(|_| "ECDSA signature mismatch".to_string())
        }
        ECDSA_WITH_SHA_384 => {
            expect_curve(spki, SECP_384_R_1)?;
            let key = p384::ecdsa::VerifyingKey::from_sec1_bytes(ec_point(spki)?)
                .map_err(|e| format!("invalid P-384 key: {}", e))?;
            let sig = p384::ecdsa::Signature::from_der(signature)
                .map_err(|e| format!("invalid ECDSA signature: {}", e))?;
            key.verify(message, &sig)
                .map_err(|_| "ECDSA signature mismatch".to_string())
        }
        other => Err(format!("unsupported signature algorithm {}", other)),
    }
}

fn rsa_key(spki: &SubjectPublicKeyInfoOwned) -> std::result::Result<RsaPublicKey, String> {
    if spki.algorithm.oid != RSA_ENCRYPTION {
        return Err(format!("expected an RSA key, found {}", spki.algorithm.oid));
    }
    let der = spki.to_der().map_err(|e| e.to_string())?;
    RsaPublicKey::from_public_key_der(&der).map_err(|e| format!("invalid RSA key: {}", e))
}

fn verify_rsa<V>(key: V, message: &[u8], signature: &[u8]) -> std::result::Result<(), String>
where
    V: Verifier<pkcs1v15::Signature>,
{
    let sig = pkcs1v15::Signature::try_from(signature)
        .map_err(|e| format!("invalid RSA signature: {}", e))?;
    key.verify(message, &sig)
        .map_err(|_| "RSA signature mismatch".to_string())
}

fn expect_curve(
    spki: &SubjectPublicKeyInfoOwned,
    curve: ObjectIdentifier,
) -> std::result::Result<(), String> {
    if spki.algorithm.oid != ID_EC_PUBLIC_KEY {
        return Err(format!("expected an EC key, found {}", spki.algorithm.oid));
    }
    let params = spki
        .algorithm
        .parameters
        .as_ref()
        .ok_or("EC key has no curve parameters")?;
    let named = params
        .to_der()
        .and_then(|der| ObjectIdentifier::from_der(&der))
        .map_err(|e| format!("invalid EC parameters: {}", e))?;
    if named != curve {
        return Err(format!("EC key on curve {} but expected {}", named, curve));
    }
    Ok(())
}

fn ec_point(spki: &SubjectPublicKeyInfoOwned) -> std::result::Result<&[u8], String> {
    spki.subject_public_key
        .as_bytes()
        .ok_or_else(|| "EC public key has unused bits".to_string())
}
