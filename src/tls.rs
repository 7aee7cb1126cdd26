//! TLS configuration helpers for the CMP HTTP transport.
//!
//! The rustls configuration is built with an explicit `ring` crypto
//! provider, so nothing is registered process-wide.

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ClientConfig;

use crate::config::{ClientIdentity, CmpClientConfig, TrustAnchors};
use crate::error::{CmpError, Result};

// TLS 1.2 is the oldest version offered.
static PROTOCOL_VERSIONS: &[&rustls::SupportedProtocolVersion] =
    &[&rustls::version::TLS13, &rustls::version::TLS12];

/// Build a reqwest Client with the appropriate TLS configuration.
pub fn build_http_client(config: &CmpClientConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.timeout)
        .user_agent(config.user_agent.as_str());

    builder = match &config.trust_anchors {
        TrustAnchors::InsecureAcceptAny => {
            tracing::warn!("Server certificate verification is disabled");
            let mut builder = builder
                .use_rustls_tls()
                .tls_built_in_root_certs(false)
                .danger_accept_invalid_certs(true)
                .min_tls_version(reqwest::tls::Version::TLS_1_2);
            if let Some(ref identity) = config.client_identity {
                builder = builder.identity(build_reqwest_identity(identity)?);
            }
            builder
        }
        TrustAnchors::WebPki | TrustAnchors::Explicit(_) => {
            let tls_config = build_rustls_config(config)?;
            builder.use_preconfigured_tls((*tls_config).clone())
        }
    };

    let mut headers = reqwest::header::HeaderMap::new();
    for (name, value) in &config.additional_headers {
        match (
            reqwest::header::HeaderName::try_from(name.as_str()),
            reqwest::header::HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!("Skipping invalid header '{}'", name),
        }
    }
    builder = builder.default_headers(headers);

    builder
        .build()
        .map_err(|e| CmpError::client_validation(format!("Failed to build HTTP client: {}", e)))
}

/// Build a reqwest Identity from PEM-encoded certificate and key.
fn build_reqwest_identity(identity: &ClientIdentity) -> Result<reqwest::Identity> {
    let mut pem_data = identity.cert_pem.clone();
    pem_data.extend_from_slice(b"\n");
    pem_data.extend_from_slice(&identity.key_pem);

    reqwest::Identity::from_pem(&pem_data)
        .map_err(|e| CmpError::client_validation(format!("Failed to create client identity: {}", e)))
}

/// Build a rustls ClientConfig from the trust anchors and client identity.
pub fn build_rustls_config(config: &CmpClientConfig) -> Result<Arc<ClientConfig>> {
    let root_store = build_root_store(&config.trust_anchors)?;
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let builder = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(PROTOCOL_VERSIONS)
        .map_err(|e| CmpError::client_validation(format!("Unsupported TLS versions: {}", e)))?
        .with_root_certificates(root_store);

    let tls_config = if let Some(ref identity) = config.client_identity {
        let (certs, key) = parse_client_identity(identity)?;
        builder.with_client_auth_cert(certs, key).map_err(|e| {
            CmpError::client_validation(format!("Failed to configure client auth: {}", e))
        })?
    } else {
        builder.with_no_client_auth()
    };

    Ok(Arc::new(tls_config))
}

fn build_root_store(trust_anchors: &TrustAnchors) -> Result<rustls::RootCertStore> {
    let mut root_store = rustls::RootCertStore::empty();

    match trust_anchors {
        TrustAnchors::WebPki => {
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
        TrustAnchors::Explicit(ca_certs) => {
            for ca_pem in ca_certs {
                for cert in parse_pem_certificates(ca_pem)? {
                    root_store.add(cert).map_err(|e| {
                        CmpError::client_validation(format!("Failed to add CA cert: {}", e))
                    })?;
                }
            }
        }
        TrustAnchors::InsecureAcceptAny => {}
    }

    Ok(root_store)
}

/// Parse PEM-encoded certificates.
pub fn parse_pem_certificates(pem_data: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = std::io::BufReader::new(pem_data);
    let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
        .filter_map(|result| result.ok())
        .collect();

    if certs.is_empty() {
        return Err(CmpError::client_validation(
            "No certificates found in PEM data",
        ));
    }

    Ok(certs)
}

/// Parse a PEM-encoded private key (PKCS#8, PKCS#1 or SEC1).
pub fn parse_pem_private_key(pem_data: &[u8]) -> Result<PrivateKeyDer<'static>> {
    let mut reader = std::io::BufReader::new(pem_data);

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(rustls_pemfile::Item::Pkcs8Key(key))) => return Ok(PrivateKeyDer::Pkcs8(key)),
            Ok(Some(rustls_pemfile::Item::Pkcs1Key(key))) => return Ok(PrivateKeyDer::Pkcs1(key)),
            Ok(Some(rustls_pemfile::Item::Sec1Key(key))) => return Ok(PrivateKeyDer::Sec1(key)),
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => {
                return Err(CmpError::client_validation(format!(
                    "Failed to parse PEM: {}",
                    e
                )));
            }
        }
    }

    Err(CmpError::client_validation(
        "No private key found in PEM data",
    ))
}

fn parse_client_identity(
    identity: &ClientIdentity,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let certs = parse_pem_certificates(&identity.cert_pem)?;
    let key = parse_pem_private_key(&identity.key_pem)?;
    Ok((certs, key))
}
