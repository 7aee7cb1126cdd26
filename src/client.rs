//! CMP client implementation.
//!
//! This module provides the main `CmpClient` struct, which runs one
//! certificate request per call: validate inputs, build and protect the
//! request, send it, validate the response and assemble the issued chain.

use der::Encode;
use rsa::pkcs8::EncodePublicKey;
use spki::SubjectPublicKeyInfoOwned;
use tracing::{debug, info};

use crate::config::{CaEndpoint, CmpClientConfig, MAX_CA_NAME_LEN};
use crate::error::{CmpError, Result};
use crate::operations::request::{CertRequestBuilder, PreparedRequest};
use crate::operations::response::ResponseValidator;
use crate::protection::Protection;
use crate::renewal::{decide_request_type, PriorCertificateData};
use crate::transport::{CmpTransport, HttpTransport};
use crate::types::{
    CertificationResult, CsrRequestData, OldCertificate, RequestType, RequestValidity,
};
use crate::validation::ChainAssembler;

/// CMP client for certificate issuance and renewal.
///
/// Every operation is a single request/response exchange with the CA. The
/// client holds no per-request state and may be shared between tasks.
///
/// # Example
///
/// ```no_run
/// use usg_cmp_client::{CaEndpoint, CmpClient, CmpClientConfig, CsrRequestData};
///
/// # async fn example(csr: CsrRequestData) -> Result<(), Box<dyn std::error::Error>> {
/// let client = CmpClient::new(CmpClientConfig::default())?;
///
/// let ca = CaEndpoint::builder()
///     .ca_name("ManagementCA")
///     .url("http://ca.example.com/ejbca/publicweb/cmp/cmp")?
///     .issuer_dn("CN=ManagementCA")?
///     .authentication("mypassword", "mypassword")
///     .build()?;
///
/// let result = client.certification_request(&csr, &ca).await?;
/// println!("Got {} certificates", result.certificate_chain.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CmpClient<T: CmpTransport = HttpTransport> {
    transport: T,
    verification_key: Option<SubjectPublicKeyInfoOwned>,
}

impl CmpClient<HttpTransport> {
    /// Create a new CMP client over HTTP with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if TLS configuration fails.
    pub fn new(config: CmpClientConfig) -> Result<Self> {
        Ok(Self::with_transport(HttpTransport::new(&config)?))
    }
}

impl<T: CmpTransport> CmpClient<T> {
    /// Create a client over a custom transport.
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            verification_key: None,
        }
    }

    /// Trusted key for signature-protected responses: the CA's signing key,
    /// or the key that issued the signer certificate sent in `extraCerts`.
    ///
    /// Without it, only password-protected responses are accepted.
    pub fn with_verification_key(mut self, key: SubjectPublicKeyInfoOwned) -> Self {
        self.verification_key = Some(key);
        self
    }

    /// Get the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Request an initial certificate (`ir`), protected with the CA's shared secret.
    pub async fn initialization_request(
        &self,
        csr: &CsrRequestData,
        server: &CaEndpoint,
        validity: RequestValidity,
    ) -> Result<CertificationResult> {
        validate_inputs(csr, server, &validity)?;
        let builder =
            CertRequestBuilder::new(csr, server, RequestType::Initialization).validity(validity);
        self.execute(builder, server).await
    }

    /// Request a certificate (`cr`), protected with the CA's shared secret.
    pub async fn certification_request(
        &self,
        csr: &CsrRequestData,
        server: &CaEndpoint,
    ) -> Result<CertificationResult> {
        validate_inputs(csr, server, &RequestValidity::default())?;
        let builder = CertRequestBuilder::new(csr, server, RequestType::Certification);
        self.execute(builder, server).await
    }

    /// Renew `old` with a new key (`kur`), signed with the old private key.
    pub async fn key_update_request(
        &self,
        csr: &CsrRequestData,
        server: &CaEndpoint,
        old: &OldCertificate,
    ) -> Result<CertificationResult> {
        validate_inputs(csr, server, &RequestValidity::default())?;
        let builder = CertRequestBuilder::new(csr, server, RequestType::KeyUpdate)
            .old_certificate(old)
            .protection(Protection::signature(old.private_key.clone()));
        self.execute(builder, server).await
    }

    /// Renew `old`, as a key update when the identity is unchanged and as a
    /// new certification request otherwise.
    pub async fn update_certificate(
        &self,
        csr: &CsrRequestData,
        server: &CaEndpoint,
        old: &OldCertificate,
    ) -> Result<CertificationResult> {
        let prior = PriorCertificateData::from_certificate(&old.certificate)?;
        let request_type = decide_request_type(csr, &prior);
        info!("Renewing '{}' with a {} request", csr.subject, request_type);

        match request_type {
            RequestType::KeyUpdate => self.key_update_request(csr, server, old).await,
            _ => self.certification_request(csr, server).await,
        }
    }

    async fn execute(
        &self,
        builder: CertRequestBuilder<'_>,
        server: &CaEndpoint,
    ) -> Result<CertificationResult> {
        let prepared = builder.build()?;
        info!(
            "Sending {} request to CA '{}' at {}",
            prepared.request_type, server.ca_name, server.url
        );

        let response = self
            .transport
            .post(&server.url, &server.ca_name, prepared.to_der()?)
            .await?;

        let validated = self.validator(&prepared, server).validate(&response)?;
        debug!(
            "Issued certificate for '{}'",
            validated.certificate.tbs_certificate.subject
        );

        ChainAssembler::new().assemble(
            &validated.certificate,
            &validated.extra_certs,
            &validated.ca_pubs,
        )
    }

    fn validator(&self, prepared: &PreparedRequest, server: &CaEndpoint) -> ResponseValidator {
        let validator = ResponseValidator::for_request(
            prepared,
            server.authentication.iak.as_bytes().to_vec(),
        );
        match &self.verification_key {
            Some(key) => validator.with_verification_key(key.clone()),
            None => validator,
        }
    }
}

/// Reject unusable input before any message is built.
fn validate_inputs(
    csr: &CsrRequestData,
    server: &CaEndpoint,
    validity: &RequestValidity,
) -> Result<()> {
    info!(
        "Validating request for CA '{}' in mode {}",
        server.ca_name, server.ca_mode
    );

    if csr.subject.0.is_empty() {
        return Err(CmpError::client_validation("Subject DN must not be empty"));
    }
    if server.issuer_dn.0.is_empty() {
        return Err(CmpError::client_validation("Issuer DN must not be empty"));
    }
    if server.ca_name.trim().is_empty() || server.ca_name.chars().count() > MAX_CA_NAME_LEN {
        return Err(CmpError::client_validation(
            "CA name must be 1 to 128 characters",
        ));
    }
    if !matches!(server.url.scheme(), "http" | "https") {
        return Err(CmpError::client_validation(format!(
            "Unsupported URL scheme '{}'",
            server.url.scheme()
        )));
    }
    if server.authentication.iak.is_empty() {
        return Err(CmpError::client_validation(
            "Initial authentication key must not be empty",
        ));
    }
    validity.validate()?;

    let derived = csr
        .private_key
        .to_public_key()
        .to_public_key_der()
        .map_err(|e| CmpError::client_validation(format!("Invalid private key: {}", e)))?;
    let supplied = csr.public_key.to_der()?;
    if derived.as_bytes() != supplied.as_slice() {
        return Err(CmpError::client_validation(
            "Public key does not match private key",
        ));
    }

    Ok(())
}
