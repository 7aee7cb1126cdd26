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

//! Certificate request construction (`ir`, `cr`, `kur`).
//!
//! Builds a complete, protected `PKIMessage` from caller data. Nothing here
//! touches the network; every failure is reported as
//! [`CmpError::RequestConstruction`].

use std::time::SystemTime;

use const_oid::db::rfc5280::{
    ID_CE_EXT_KEY_USAGE, ID_CE_KEY_USAGE, ID_CE_SUBJECT_ALT_NAME, ID_KP_CLIENT_AUTH,
    ID_KP_SERVER_AUTH,
};
use der::asn1::{Any, BitString, GeneralizedTime, OctetString, UtcTime};
use der::{Decode, Encode};
use rand::{Rng, RngCore};
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use sha2::Sha256;
use tracing::debug;
use x509_cert::certificate::Version;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{ExtendedKeyUsage, KeyUsage, KeyUsages, SubjectAltName};
use x509_cert::ext::Extension;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Time;

use crate::config::CaEndpoint;
use crate::error::{CmpError, Result};
use crate::protection::{self, Protection};
use crate::types::cmp::{InfoTypeAndValue, PkiBody, PkiHeader, PkiMessage, PVNO_CMP2000};
use crate::types::crmf::{
    CertReqMsg, CertRequest, CertTemplate, OptionalValidity, PopoSigningKey, ProofOfPossession,
};
use crate::types::{oids, CsrRequestData, OldCertificate, RequestType, RequestValidity};

/// Length of the random transaction ID and sender nonce.
pub const NONCE_LEN: usize = 16;

/// A protected request ready to send, with the values the response must echo.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// The complete message.
    pub message: PkiMessage,

    /// Transaction ID placed in the header.
    pub transaction_id: Vec<u8>,

    /// Sender nonce placed in the header.
    pub sender_nonce: Vec<u8>,

    /// Request type of the body.
    pub request_type: RequestType,
}

impl PreparedRequest {
    /// DER encoding of the message.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.message.to_der()?)
    }
}

/// Builder for certificate request messages.
///
/// Protection defaults to password-based MAC keyed by the endpoint's `iak`.
/// Key update requests must be given the certificate being renewed; it is
/// added to `extraCerts`.
pub struct CertRequestBuilder<'a> {
    csr: &'a CsrRequestData,
    endpoint: &'a CaEndpoint,
    request_type: RequestType,
    validity: RequestValidity,
    old_certificate: Option<&'a OldCertificate>,
    protection: Option<Protection>,
}

impl<'a> CertRequestBuilder<'a> {
    /// Start a request of the given type for `csr`, addressed to `endpoint`.
    pub fn new(
        csr: &'a CsrRequestData,
        endpoint: &'a CaEndpoint,
        request_type: RequestType,
    ) -> Self {
        Self {
            csr,
            endpoint,
            request_type,
            validity: RequestValidity::default(),
            old_certificate: None,
            protection: None,
        }
    }

    /// Request a validity period.
    pub fn validity(mut self, validity: RequestValidity) -> Self {
        self.validity = validity;
        self
    }

    /// Attach the certificate being renewed.
    pub fn old_certificate(mut self, old: &'a OldCertificate) -> Self {
        self.old_certificate = Some(old);
        self
    }

    /// Override the message protection.
    pub fn protection(mut self, protection: Protection) -> Self {
        self.protection = Some(protection);
        self
    }

    /// Build and protect the message.
    pub fn build(self) -> Result<PreparedRequest> {
        if self.request_type == RequestType::KeyUpdate && self.old_certificate.is_none() {
            return Err(CmpError::request_construction(
                "Key update request requires the certificate being renewed",
            ));
        }

        let protection = self.protection.clone().unwrap_or_else(|| {
            Protection::password_based(self.endpoint.authentication.iak.as_bytes().to_vec())
        });

        let cert_req_msg = self.cert_req_msg()?;
        let body = match self.request_type {
            RequestType::Initialization => PkiBody::Ir(vec![cert_req_msg]),
            RequestType::Certification => PkiBody::Cr(vec![cert_req_msg]),
            RequestType::KeyUpdate => PkiBody::Kur(vec![cert_req_msg]),
        };

        let transaction_id = random_bytes(NONCE_LEN);
        let sender_nonce = random_bytes(NONCE_LEN);
        let header = self.header(&protection, &transaction_id, &sender_nonce)?;

        let mut message = PkiMessage {
            header,
            body,
            protection: None,
            extra_certs: None,
        };

        let protected_part = message.protected_part().to_der()?;
        let protection_value = protection.protect(&protected_part)?;
        message.protection = Some(BitString::from_bytes(&protection_value)?);

        let old_certificate = self
            .old_certificate
            .filter(|_| self.request_type == RequestType::KeyUpdate);
        if let Some(old) = old_certificate {
            let encoded = old.certificate.to_der()?;
            message.extra_certs = Some(vec![Any::from_der(&encoded)?]);
        }

        debug!(
            "Built {} request for '{}' (transaction {})",
            self.request_type,
            self.csr.subject,
            hex::encode(&transaction_id)
        );

        Ok(PreparedRequest {
            message,
            transaction_id,
            sender_nonce,
            request_type: self.request_type,
        })
    }

    fn header(
        &self,
        protection: &Protection,
        transaction_id: &[u8],
        sender_nonce: &[u8],
    ) -> Result<PkiHeader> {
        let message_time = GeneralizedTime::from_system_time(SystemTime::now())?;

        // senderKID names the shared secret for MAC-protected requests.
        let sender_kid = if protection.is_password_based() {
            Some(OctetString::new(
                self.endpoint.authentication.rv.as_bytes().to_vec(),
            )?)
        } else {
            None
        };

        Ok(PkiHeader {
            pvno: PVNO_CMP2000,
            sender: GeneralName::DirectoryName(self.csr.subject.clone()),
            recipient: GeneralName::DirectoryName(self.endpoint.issuer_dn.clone()),
            message_time: Some(message_time),
            protection_alg: Some(protection.algorithm_identifier()?),
            sender_kid,
            recip_kid: None,
            transaction_id: Some(OctetString::new(transaction_id.to_vec())?),
            sender_nonce: Some(OctetString::new(sender_nonce.to_vec())?),
            recip_nonce: None,
            free_text: None,
            general_info: Some(vec![InfoTypeAndValue {
                info_type: oids::IMPLICIT_CONFIRM,
                info_value: protection::null_parameters(),
            }]),
        })
    }

    fn cert_req_msg(&self) -> Result<CertReqMsg> {
        let cert_request = CertRequest {
            cert_req_id: rand::thread_rng().gen_range(0..i32::MAX) as i64,
            cert_template: self.template()?,
            controls: None,
        };

        let signed = cert_request.to_der()?;
        let signing_key = SigningKey::<Sha256>::new(self.csr.private_key.clone());
        let signature = signing_key.try_sign(&signed).map_err(|e| {
            CmpError::request_construction(format!("Proof-of-possession signing failed: {}", e))
        })?;

        Ok(CertReqMsg {
            cert_req: cert_request,
            popo: Some(ProofOfPossession::Signature(PopoSigningKey {
                algorithm_identifier: protection::sha256_with_rsa(),
                signature: BitString::from_bytes(&signature.to_vec())?,
            })),
            reg_info: None,
        })
    }

    fn template(&self) -> Result<CertTemplate> {
        let validity = if self.validity.is_empty() {
            None
        } else {
            Some(OptionalValidity {
                not_before: self.validity.not_before.map(to_time).transpose()?,
                not_after: self.validity.not_after.map(to_time).transpose()?,
            })
        };

        Ok(CertTemplate {
            version: Some(Version::V3),
            serial_number: Some(SerialNumber::new(&[0])?),
            signing_alg: Some(protection::sha256_with_rsa()),
            issuer: Some(self.endpoint.issuer_dn.clone()),
            validity,
            subject: Some(self.csr.subject.clone()),
            public_key: Some(self.csr.public_key.clone()),
            issuer_uid: None,
            subject_uid: None,
            extensions: Some(self.extensions()?),
        })
    }

    fn extensions(&self) -> Result<Vec<Extension>> {
        let key_usage = KeyUsage(
            KeyUsages::DigitalSignature | KeyUsages::NonRepudiation | KeyUsages::KeyEncipherment,
        );
        let ext_key_usage = ExtendedKeyUsage(vec![ID_KP_CLIENT_AUTH, ID_KP_SERVER_AUTH]);

        let mut extensions = vec![
            extension(ID_CE_KEY_USAGE, key_usage.to_der()?)?,
            extension(ID_CE_EXT_KEY_USAGE, ext_key_usage.to_der()?)?,
        ];

        if !self.csr.sans.is_empty() {
            let san = SubjectAltName(self.csr.sans.clone());
            extensions.push(extension(ID_CE_SUBJECT_ALT_NAME, san.to_der()?)?);
        }

        Ok(extensions)
    }
}

fn extension(extn_id: der::asn1::ObjectIdentifier, value: Vec<u8>) -> Result<Extension> {
    Ok(Extension {
        extn_id,
        critical: false,
        extn_value: OctetString::new(value)?,
    })
}

/// UTCTime through 2049, GeneralizedTime after.
fn to_time(time: SystemTime) -> Result<Time> {
    match UtcTime::from_system_time(time) {
        Ok(utc) => Ok(Time::UtcTime(utc)),
        Err(_) => Ok(Time::GeneralTime(GeneralizedTime::from_system_time(time)?)),
    }
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}
