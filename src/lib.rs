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

//! # usg-cmp-client
//!
//! A Rust implementation of a CMPv2 (RFC 4210/4211) certificate issuance and
//! renewal client.
//!
//! CMP carries certificate requests to a Certification Authority as
//! DER-encoded `PKIMessage`s over HTTP (RFC 6712). This library builds and
//! protects those requests, validates the CA's answer and assembles the
//! issued certificate chain.
//!
//! ## Features
//!
//! - **Async transport** using `reqwest` behind the [`CmpTransport`] trait
//! - **Initialization, certification and key update requests** (`ir`, `cr`, `kur`)
//! - **Password-based MAC and RSA signature protection**
//! - **Renewal decision**: key update when the identity is unchanged,
//!   certification request otherwise
//! - **Chain assembly** from `extraCerts` and `caPubs` with per-link path
//!   validation
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::str::FromStr;
//! use usg_cmp_client::{CaEndpoint, CmpClient, CmpClientConfig, CsrRequestData};
//! use usg_cmp_client::x509_cert::name::Name;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CmpClient::new(CmpClientConfig::default())?;
//!
//!     let ca = CaEndpoint::builder()
//!         .ca_name("ManagementCA")
//!         .url("https://ca.example.com/ejbca/publicweb/cmp/cmp")?
//!         .issuer_dn("CN=ManagementCA")?
//!         .authentication("initial-password", "reference-value")
//!         .build()?;
//!
//!     let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048)?;
//!     let csr = CsrRequestData::new(Name::from_str("CN=device.example.com")?, key, vec![])?;
//!
//!     let result = client.certification_request(&csr, &ca).await?;
//!     for pem in result.certificate_chain_pem()? {
//!         println!("{}", pem);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Renewal
//!
//! ```no_run
//! use usg_cmp_client::{CaEndpoint, CmpClient, CsrRequestData, OldCertificate};
//!
//! # async fn example(
//! #     client: CmpClient,
//! #     ca: CaEndpoint,
//! #     csr: CsrRequestData,
//! #     old: OldCertificate,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! // Sent as `kur` if subject and SANs are unchanged, as `cr` otherwise.
//! let renewed = client.update_certificate(&csr, &ca, &old).await?;
//! println!("Renewed: {:?}", renewed.leaf().map(|c| &c.tbs_certificate.subject));
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Every failure is a [`CmpError`]; [`CmpError::kind`] classifies it as a
//! client validation, transport, server protocol, response integrity or
//! certificate chain problem. Only transport errors are retryable, and the
//! library never retries on its own.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod client;
pub mod config;
pub mod error;
pub mod operations;
pub mod protection;
pub mod renewal;
pub mod tls;
pub mod transport;
pub mod types;
pub mod validation;

// Re-export main types at crate root for convenience
pub use client::CmpClient;
pub use config::{
    CaAuthentication, CaEndpoint, CaEndpointBuilder, CaMode, ClientIdentity, CmpClientConfig,
    CmpClientConfigBuilder, TrustAnchors,
};
pub use error::{CmpError, ErrorKind, Result};
pub use protection::Protection;
pub use transport::{CmpTransport, HttpTransport};
pub use types::{
    CertificationResult, CsrRequestData, OldCertificate, RequestType, RequestValidity,
};

// Re-export the certificate types used in the public API
pub use x509_cert;
pub use x509_cert::Certificate;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent string for HTTP requests.
pub const USER_AGENT: &str = concat!("usg-cmp-client/", env!("CARGO_PKG_VERSION"));
