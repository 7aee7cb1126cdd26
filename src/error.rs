//! Error types for the CMP client.
//!
//! Every failure surfaced by the engine maps onto one of a small set of
//! kinds (see [`ErrorKind`]). The original cause is kept either as the
//! error message or, for transport failures, as the `source`.

use thiserror::Error;

/// Result type alias using [`CmpError`].
pub type Result<T> = std::result::Result<T, CmpError>;

/// Boxed error used as the source of transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during CMP client operations.
#[derive(Debug, Error)]
pub enum CmpError {
    /// Missing or contradictory caller input, detected before any network call.
    #[error("Client validation error: {0}")]
    ClientValidation(String),

    /// The request message could not be built (bad key material, encoding failure).
    #[error("Request construction error: {0}")]
    RequestConstruction(String),

    /// The CA could not be reached or the response body could not be read.
    #[error("Transport error talking to CA '{ca_name}': {source}")]
    Transport {
        /// Name of the CA the request was addressed to.
        ca_name: String,
        /// Underlying I/O or HTTP failure.
        #[source]
        source: BoxError,
    },

    /// The CA answered with an error message or a rejection status.
    ///
    /// Carries the CA's status text verbatim.
    #[error("CA returned an error: {0}")]
    ServerProtocol(String),

    /// The response could not be decoded or carried an unexpected body.
    #[error("Malformed CMP response: {0}")]
    MalformedResponse(String),

    /// Response protection is missing or does not verify.
    #[error("Response integrity error: {0}")]
    ResponseIntegrity(String),

    /// The issuer chain could not be assembled or failed path validation.
    #[error("Certificate chain error: {0}")]
    CertificateChain(String),
}

/// Coarse classification of [`CmpError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller input or client-side construction problem.
    ClientValidation,
    /// Network failure reaching the CA.
    Transport,
    /// PKI-level failure reported by (or unparseable from) the CA.
    ServerProtocol,
    /// Response protection failure.
    ResponseIntegrity,
    /// Chain assembly or path validation failure.
    CertificateChain,
}

impl CmpError {
    /// Create a client validation error with the given message.
    pub fn client_validation(msg: impl Into<String>) -> Self {
        Self::ClientValidation(msg.into())
    }

    /// Create a request construction error with the given message.
    pub fn request_construction(msg: impl Into<String>) -> Self {
        Self::RequestConstruction(msg.into())
    }

    /// Create a transport error for the named CA.
    pub fn transport(ca_name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transport {
            ca_name: ca_name.into(),
            source: source.into(),
        }
    }

    /// Create a server protocol error carrying the CA's status text.
    pub fn server_protocol(msg: impl Into<String>) -> Self {
        Self::ServerProtocol(msg.into())
    }

    /// Create a malformed response error with the given message.
    pub fn malformed_response(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Create a response integrity error with the given message.
    pub fn response_integrity(msg: impl Into<String>) -> Self {
        Self::ResponseIntegrity(msg.into())
    }

    /// Create a certificate chain error with the given message.
    pub fn certificate_chain(msg: impl Into<String>) -> Self {
        Self::CertificateChain(msg.into())
    }

    /// Returns the taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ClientValidation(_) | Self::RequestConstruction(_) => ErrorKind::ClientValidation,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::ServerProtocol(_) | Self::MalformedResponse(_) => ErrorKind::ServerProtocol,
            Self::ResponseIntegrity(_) => ErrorKind::ResponseIntegrity,
            Self::CertificateChain(_) => ErrorKind::CertificateChain,
        }
    }

    /// Returns true if the caller may reasonably retry the operation.
    ///
    /// Only transport failures qualify. The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns the CA name if this is a transport error.
    pub fn ca_name(&self) -> Option<&str> {
        match self {
            Self::Transport { ca_name, .. } => Some(ca_name),
            _ => None,
        }
    }
}

impl From<der::Error> for CmpError {
    fn from(err: der::Error) -> Self {
        Self::RequestConstruction(format!("DER encoding failed: {}", err))
    }
}
