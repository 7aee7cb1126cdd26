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

//! PKIMessage protection (RFC 4210 Section 5.1.3).
//!
//! Two mechanisms are supported:
//!
//! - **Password-based MAC**: the shared initialization secret (`iak`) is
//!   salted and hashed `iterationCount` times to derive an HMAC key.
//! - **Signature**: SHA-256 with RSA using a caller-held private key, used
//!   for key update requests signed with the key of the certificate being
//!   renewed.
//!
//! The same parameter handling is used on the response side, where the CA
//! chooses its own salt, iteration count and algorithms.

use const_oid::db::rfc5912::{ID_SHA_1, ID_SHA_256, SHA_256_WITH_RSA_ENCRYPTION};
use der::asn1::OctetString;
use der::{Any, Decode, Encode, Tag};
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use rand::{Rng, RngCore};
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use spki::{AlgorithmIdentifierOwned, ObjectIdentifier};
use tracing::debug;

use crate::error::{CmpError, Result};
use crate::types::cmp::PbmParameter;
use crate::types::oids;

/// Salt length used for outgoing password-based protection.
pub const PBM_SALT_LEN: usize = 16;

/// Lower bound (inclusive) of the randomly chosen iteration count.
pub const PBM_MIN_ITERATIONS: u32 = 1000;

/// Upper bound (exclusive) of the randomly chosen iteration count.
pub const PBM_MAX_ITERATIONS: u32 = 2000;

/// Largest iteration count accepted from a CA before the work is refused.
const PBM_ITERATION_LIMIT: u32 = 100_000;

/// Message protection mechanism applied to an outgoing request.
#[derive(Clone)]
pub enum Protection {
    /// HMAC keyed by an iterated hash of a shared secret.
    PasswordBased(PasswordBasedMac),
    /// RSA signature with SHA-256.
    Signature(SignatureProtection),
}

impl Protection {
    /// Password-based protection with fresh random salt and iteration count.
    pub fn password_based(secret: impl Into<Vec<u8>>) -> Self {
        Self::PasswordBased(PasswordBasedMac::new(secret, PbmParameters::generate()))
    }

    /// Signature protection using the given RSA private key.
    pub fn signature(private_key: RsaPrivateKey) -> Self {
        Self::Signature(SignatureProtection::new(private_key))
    }

    /// Algorithm identifier to place in the header's `protectionAlg`.
    pub fn algorithm_identifier(&self) -> Result<AlgorithmIdentifierOwned> {
        match self {
            Self::PasswordBased(pbm) => pbm.algorithm_identifier(),
            Self::Signature(sig) => Ok(sig.algorithm_identifier()),
        }
    }

    /// Compute the protection value over DER-encoded `ProtectedPart` bytes.
    pub fn protect(&self, protected_part: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::PasswordBased(pbm) => pbm.protect(protected_part),
            Self::Signature(sig) => sig.protect(protected_part),
        }
    }

    /// Returns true for password-based protection.
    pub fn is_password_based(&self) -> bool {
        matches!(self, Self::PasswordBased(_))
    }
}

impl std::fmt::Debug for Protection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PasswordBased(pbm) => f
                .debug_tuple("PasswordBased")
                .field(&pbm.parameters)
                .finish(),
            Self::Signature(_) => write!(f, "Signature(sha256WithRSAEncryption)"),
        }
    }
}

/// Parameters of a password-based MAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbmParameters {
    /// Salt appended to the secret before hashing.
    pub salt: Vec<u8>,
    /// Number of one-way function applications.
    pub iteration_count: u32,
    /// One-way function algorithm.
    pub owf: ObjectIdentifier,
    /// MAC algorithm.
    pub mac: ObjectIdentifier,
}

impl PbmParameters {
    /// Random 16-byte salt and iteration count in `[1000, 2000)`, SHA-1 and HMAC-SHA1.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut salt = vec![0u8; PBM_SALT_LEN];
        rng.fill_bytes(&mut salt);
        let iteration_count = rng.gen_range(PBM_MIN_ITERATIONS..PBM_MAX_ITERATIONS);

        Self {
            salt,
            iteration_count,
            owf: ID_SHA_1,
            mac: oids::HMAC_SHA1,
        }
    }

    /// Parameters with a fixed salt and iteration count, SHA-1 and HMAC-SHA1.
    pub fn with_values(salt: impl Into<Vec<u8>>, iteration_count: u32) -> Self {
        Self {
            salt: salt.into(),
            iteration_count,
            owf: ID_SHA_1,
            mac: oids::HMAC_SHA1,
        }
    }

    /// Decode parameters from a `protectionAlg` identifier.
    ///
    /// Fails unless the identifier is `id-PasswordBasedMac` with a well-formed
    /// `PBMParameter`.
    pub fn from_algorithm_identifier(alg: &AlgorithmIdentifierOwned) -> Result<Self> {
        if alg.oid != oids::PASSWORD_BASED_MAC {
            return Err(CmpError::response_integrity(format!(
                "Protection algorithm {} is not password-based MAC",
                alg.oid
            )));
        }
        let params = alg.parameters.as_ref().ok_or_else(|| {
            CmpError::response_integrity("Password-based MAC parameters are missing")
        })?;
        let encoded = params
            .to_der()
            .map_err(|e| CmpError::response_integrity(format!("Invalid PBM parameters: {}", e)))?;
        let pbm = PbmParameter::from_der(&encoded)
            .map_err(|e| CmpError::response_integrity(format!("Invalid PBM parameters: {}", e)))?;

        Ok(Self {
            salt: pbm.salt.as_bytes().to_vec(),
            iteration_count: pbm.iteration_count,
            owf: pbm.owf.oid,
            mac: pbm.mac.oid,
        })
    }

    fn to_pbm_parameter(&self) -> Result<PbmParameter> {
        Ok(PbmParameter {
            salt: OctetString::new(self.salt.clone())?,
            owf: AlgorithmIdentifierOwned {
                oid: self.owf,
                parameters: null_parameters(),
            },
            iteration_count: self.iteration_count,
            mac: AlgorithmIdentifierOwned {
                oid: self.mac,
                parameters: null_parameters(),
            },
        })
    }
}

/// Password-based MAC protection.
#[derive(Clone)]
pub struct PasswordBasedMac {
    secret: Vec<u8>,
    parameters: PbmParameters,
}

impl PasswordBasedMac {
    /// Create a MAC for the given shared secret and parameters.
    pub fn new(secret: impl Into<Vec<u8>>, parameters: PbmParameters) -> Self {
        Self {
            secret: secret.into(),
            parameters,
        }
    }

    /// The MAC parameters.
    pub fn parameters(&self) -> &PbmParameters {
        &self.parameters
    }

    /// `id-PasswordBasedMac` with the encoded `PBMParameter`.
    pub fn algorithm_identifier(&self) -> Result<AlgorithmIdentifierOwned> {
        let pbm = self.parameters.to_pbm_parameter()?;
        Ok(AlgorithmIdentifierOwned {
            oid: oids::PASSWORD_BASED_MAC,
            parameters: Some(Any::from_der(&pbm.to_der()?)?),
        })
    }

    /// HMAC over `data` keyed by the derived base key.
    pub fn protect(&self, data: &[u8]) -> Result<Vec<u8>> {
        let key = self.base_key()?;
        debug!(
            iterations = self.parameters.iteration_count,
            owf = %self.parameters.owf,
            mac = %self.parameters.mac,
            "Computing password-based MAC"
        );
        hmac(&self.parameters.mac, &key, data)
    }

    /// Recompute the MAC over `data` and compare it against `expected` in
    /// constant time.
    pub fn verify(&self, data: &[u8], expected: &[u8]) -> Result<()> {
        let key = self.base_key()?;
        let verified = match self.parameters.mac {
            oids::HMAC_SHA1 | oids::HMAC_WITH_SHA1 => {
                keyed::<Hmac<Sha1>>(&key)?.chain_update(data).verify_slice(expected)
            }
            oids::HMAC_WITH_SHA256 => {
                keyed::<Hmac<Sha256>>(&key)?.chain_update(data).verify_slice(expected)
            }
            other => return Err(unsupported_mac(other)),
        };
        verified.map_err(|_| CmpError::response_integrity("Password-based MAC verification failed"))
    }

    fn base_key(&self) -> Result<Vec<u8>> {
        if self.parameters.iteration_count == 0
            || self.parameters.iteration_count > PBM_ITERATION_LIMIT
        {
            return Err(CmpError::response_integrity(format!(
                "Unacceptable PBM iteration count {}",
                self.parameters.iteration_count
            )));
        }

        let mut input = Vec::with_capacity(self.secret.len() + self.parameters.salt.len());
        input.extend_from_slice(&self.secret);
        input.extend_from_slice(&self.parameters.salt);

        let mut key = input;
        for _ in 0..self.parameters.iteration_count {
            key = owf(&self.parameters.owf, &key)?;
        }
        Ok(key)
    }
}

impl std::fmt::Debug for PasswordBasedMac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordBasedMac")
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// SHA-256 with RSA signature protection.
#[derive(Clone)]
pub struct SignatureProtection {
    signing_key: SigningKey<Sha256>,
}

impl SignatureProtection {
    /// Create signature protection from an RSA private key.
    pub fn new(private_key: RsaPrivateKey) -> Self {
        Self {
            signing_key: SigningKey::<Sha256>::new(private_key),
        }
    }

    /// `sha256WithRSAEncryption` with NULL parameters.
    pub fn algorithm_identifier(&self) -> AlgorithmIdentifierOwned {
        sha256_with_rsa()
    }

    /// Sign `data`.
    pub fn protect(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signature = self
            .signing_key
            .try_sign(data)
            .map_err(|e| CmpError::request_construction(format!("RSA signing failed: {}", e)))?;
        Ok(signature.to_vec())
    }
}

/// `sha256WithRSAEncryption` algorithm identifier.
pub fn sha256_with_rsa() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: SHA_256_WITH_RSA_ENCRYPTION,
        parameters: null_parameters(),
    }
}

/// ASN.1 NULL algorithm parameters.
pub(crate) fn null_parameters() -> Option<Any> {
    Any::new(Tag::Null, Vec::<u8>::new()).ok()
}

fn owf(alg: &ObjectIdentifier, data: &[u8]) -> Result<Vec<u8>> {
    match *alg {
        ID_SHA_1 => Ok(Sha1::digest(data).to_vec()),
        ID_SHA_256 => Ok(Sha256::digest(data).to_vec()),
        other => Err(CmpError::response_integrity(format!(
            "Unsupported PBM one-way function {}",
            other
        ))),
    }
}

fn hmac(alg: &ObjectIdentifier, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let tag = match *alg {
        oids::HMAC_SHA1 | oids::HMAC_WITH_SHA1 => {
            keyed::<Hmac<Sha1>>(key)?.chain_update(data).finalize().into_bytes().to_vec()
        }
        oids::HMAC_WITH_SHA256 => {
            keyed::<Hmac<Sha256>>(key)?.chain_update(data).finalize().into_bytes().to_vec()
        }
        other => return Err(unsupported_mac(other)),
    };
    Ok(tag)
}

fn keyed<M: Mac + KeyInit>(key: &[u8]) -> Result<M> {
    <M as KeyInit>::new_from_slice(key)
        .map_err(|e| CmpError::request_construction(format!("HMAC key: {}", e)))
}

fn unsupported_mac(alg: ObjectIdentifier) -> CmpError {
    CmpError::response_integrity(format!("Unsupported PBM MAC algorithm {}", alg))
}
