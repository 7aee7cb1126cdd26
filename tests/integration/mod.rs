//! Integration test utilities and helpers
//!
//! This module provides common test infrastructure for CMP client integration
//! tests: a mock CA built on wiremock that answers real PKIMessages, a small
//! test PKI generated with rcgen, and fixture loading.

use std::str::FromStr;
use std::sync::Once;

use der::asn1::{Any, BitString, OctetString};
use der::{Decode, Encode};
use spki::SubjectPublicKeyInfoOwned;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use usg_cmp_client::protection::Protection;
use usg_cmp_client::types::cmp::{
    CertOrEncCert, CertRepMessage, CertResponse, CertifiedKeyPair, ErrorMsgContent,
    InfoTypeAndValue, PkiBody, PkiHeader, PkiMessage, PkiStatusInfo, PVNO_CMP2000,
};
use usg_cmp_client::types::{content_types, oids};
use usg_cmp_client::{CaEndpoint, CsrRequestData, OldCertificate};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::name::Name;
use x509_cert::Certificate;

mod errors;
mod operations;

/// CMP endpoint path on the mock CA
pub const CMP_PATH: &str = "/ejbca/publicweb/cmp/cmp";

/// Name the mock CA is configured under
pub const CA_NAME: &str = "ManagementCA";

/// Shared secret (`iak`) and reference value (`rv`) of the mock CA
pub const SHARED_SECRET: &str = "mypassword";
pub const REFERENCE_VALUE: &str = "mypassword";

/// Subject DN requested by the tests
pub const SUBJECT: &str = "CN=Node123,OU=ONAP,O=Linux-Foundation,C=US";

const CSR_KEY_PEM: &str = include_str!("../fixtures/keys/rsa2048.pem");
const OLD_KEY_PEM: &str = include_str!("../fixtures/keys/rsa2048-old.pem");
const CA_KEY_PEM: &str = include_str!("../fixtures/keys/rsa2048-ca.pem");

static TRACING: Once = Once::new();

/// Install a tracing subscriber writing to the test output
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// RSA key for new requests
pub fn csr_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs8_pem(CSR_KEY_PEM).expect("valid fixture key")
}

/// RSA key of the certificate being renewed
pub fn old_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs8_pem(OLD_KEY_PEM).expect("valid fixture key")
}

/// Public key in SubjectPublicKeyInfo form
pub fn spki(cert: &Certificate) -> SubjectPublicKeyInfoOwned {
    cert.tbs_certificate.subject_public_key_info.clone()
}

/// DNS subject alternative name
pub fn dns(name: &str) -> GeneralName {
    GeneralName::DnsName(der::asn1::Ia5String::new(name).expect("valid IA5 string"))
}

/// Request data for [`SUBJECT`] with the given DNS names
pub fn csr_data(dns_names: &[&str]) -> CsrRequestData {
    CsrRequestData::new(
        Name::from_str(SUBJECT).expect("valid DN"),
        csr_key(),
        dns_names.iter().map(|n| dns(n)).collect(),
    )
    .expect("valid request data")
}

/// Convert an rcgen certificate to an x509-cert one
pub fn x509(cert: &rcgen::Certificate) -> Certificate {
    Certificate::from_der(cert.der()).expect("valid certificate")
}

/// DER-wrap a certificate for the untrusted bags
pub fn any(cert: &Certificate) -> Any {
    Any::from_der(&cert.to_der().expect("encodable")).expect("valid DER")
}

fn ca_params(cn: &str) -> rcgen::CertificateParams {
    let mut params = rcgen::CertificateParams::new(Vec::<String>::new()).expect("params");
    params.distinguished_name.push(rcgen::DnType::CommonName, cn);
    params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    params
}

fn subject_params(dns_names: &[&str]) -> rcgen::CertificateParams {
    let names = dns_names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
    let mut params = rcgen::CertificateParams::new(names).expect("params");
    let dn = &mut params.distinguished_name;
    dn.push(rcgen::DnType::CommonName, "Node123");
    dn.push(rcgen::DnType::OrganizationalUnitName, "ONAP");
    dn.push(rcgen::DnType::OrganizationName, "Linux-Foundation");
    dn.push(rcgen::DnType::CountryName, "US");
    params
}

/// Root, issuing CA, issued leaf and an unrelated root
#[derive(Clone)]
pub struct TestPki {
    pub root: Certificate,
    pub intermediate: Certificate,
    pub intermediate_key: RsaPrivateKey,
    pub leaf: Certificate,
    pub unrelated_root: Certificate,
}

impl TestPki {
    /// Generate a fresh hierarchy: Root CA -> ManagementCA -> Node123
    pub fn new() -> Self {
        let root_key = rcgen::KeyPair::generate().expect("key");
        let root = ca_params("Root CA").self_signed(&root_key).expect("root");

        let inter_key = rcgen::KeyPair::from_pem(CA_KEY_PEM).expect("CA key");
        let intermediate = ca_params(CA_NAME)
            .signed_by(&inter_key, &root, &root_key)
            .expect("intermediate");

        let leaf_key = rcgen::KeyPair::generate().expect("key");
        let leaf = subject_params(&["node123.onap.org"])
            .signed_by(&leaf_key, &intermediate, &inter_key)
            .expect("leaf");

        let other_key = rcgen::KeyPair::generate().expect("key");
        let unrelated_root = ca_params("Other Root CA")
            .self_signed(&other_key)
            .expect("unrelated root");

        Self {
            root: x509(&root),
            intermediate: x509(&intermediate),
            intermediate_key: RsaPrivateKey::from_pkcs8_pem(CA_KEY_PEM).expect("CA key"),
            leaf: x509(&leaf),
            unrelated_root: x509(&unrelated_root),
        }
    }
}

/// Self-signed certificate named like the issuing CA, for the old key
pub fn forged_ca_certificate() -> Certificate {
    let key = rcgen::KeyPair::from_pem(OLD_KEY_PEM).expect("key");
    let cert = ca_params(CA_NAME).self_signed(&key).expect("forged CA");
    x509(&cert)
}

/// The certificate being renewed, carrying [`SUBJECT`] and the given DNS names
pub fn old_certificate(dns_names: &[&str]) -> OldCertificate {
    let key = rcgen::KeyPair::generate().expect("key");
    let cert = subject_params(dns_names).self_signed(&key).expect("old cert");
    OldCertificate::new(x509(&cert), old_key())
}

/// What the mock CA answers
#[derive(Clone, Debug)]
pub enum Outcome {
    /// Issue the leaf certificate
    Issue,
    /// Reject the request with the given status text
    Reject(String),
    /// Answer with an `error` body and optional status text
    ErrorBody(Option<String>),
    /// Protect the response with a different secret
    WrongSecret,
    /// Answer with a transaction ID the client never used
    WrongTransaction,
    /// Issue, signing the response with this key instead of the shared secret
    SignedWith(RsaPrivateKey),
}

/// wiremock responder that decodes the request and answers as a CA would
#[derive(Clone)]
pub struct CaResponder {
    pki: TestPki,
    outcome: Outcome,
    extra_certs: Vec<Certificate>,
    ca_pubs: Vec<Certificate>,
}

impl CaResponder {
    /// Issue with the intermediate in `extraCerts` and both roots in `caPubs`
    pub fn issuing(pki: &TestPki) -> Self {
        Self {
            pki: pki.clone(),
            outcome: Outcome::Issue,
            extra_certs: vec![pki.intermediate.clone()],
            ca_pubs: vec![pki.root.clone(), pki.unrelated_root.clone()],
        }
    }

    /// Answer with the given outcome
    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Override the contents of the untrusted bags
    pub fn bags(mut self, extra_certs: Vec<Certificate>, ca_pubs: Vec<Certificate>) -> Self {
        self.extra_certs = extra_certs;
        self.ca_pubs = ca_pubs;
        self
    }

    fn body(&self, request: &PkiBody) -> Option<PkiBody> {
        let (messages, wrap): (_, fn(CertRepMessage) -> PkiBody) = match request {
            PkiBody::Ir(m) => (m, PkiBody::Ip),
            PkiBody::Cr(m) => (m, PkiBody::Cp),
            PkiBody::Kur(m) => (m, PkiBody::Kup),
            _ => return None,
        };
        let cert_req_id = messages.first()?.cert_req.cert_req_id;

        let (status, certified_key_pair) = match &self.outcome {
            Outcome::ErrorBody(text) => {
                return Some(PkiBody::Error(ErrorMsgContent {
                    pki_status_info: status_info(2, text.as_deref()),
                    error_code: None,
                    error_details: None,
                }));
            }
            Outcome::Reject(text) => (status_info(2, Some(text)), None),
            _ => (
                status_info(0, None),
                Some(CertifiedKeyPair {
                    cert_or_enc_cert: CertOrEncCert::Certificate(self.pki.leaf.clone()),
                    private_key: None,
                    publication_info: None,
                }),
            ),
        };

        let ca_pubs = (!self.ca_pubs.is_empty()).then(|| self.ca_pubs.iter().map(any).collect());
        Some(wrap(CertRepMessage {
            ca_pubs,
            response: vec![CertResponse {
                cert_req_id,
                status,
                certified_key_pair,
                rsp_info: None,
            }],
        }))
    }

    fn header(&self, request: &PkiHeader, protection: &Protection) -> PkiHeader {
        let transaction_id = match self.outcome {
            Outcome::WrongTransaction => Some(OctetString::new(vec![0xee; 16]).expect("octets")),
            _ => request.transaction_id.clone(),
        };

        PkiHeader {
            pvno: PVNO_CMP2000,
            sender: GeneralName::DirectoryName(
                self.pki.intermediate.tbs_certificate.subject.clone(),
            ),
            recipient: request.sender.clone(),
            message_time: None,
            protection_alg: Some(protection.algorithm_identifier().expect("algorithm")),
            sender_kid: request.sender_kid.clone(),
            recip_kid: None,
            transaction_id,
            sender_nonce: Some(OctetString::new(vec![0x5a; 16]).expect("octets")),
            recip_nonce: request.sender_nonce.clone(),
            free_text: None,
            general_info: Some(vec![InfoTypeAndValue {
                info_type: oids::IMPLICIT_CONFIRM,
                info_value: None,
            }]),
        }
    }
}

fn status_info(status: u32, text: Option<&str>) -> PkiStatusInfo {
    PkiStatusInfo {
        status,
        status_string: text.map(|t| vec![t.to_string()]),
        fail_info: None,
    }
}

impl Respond for CaResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(message) = PkiMessage::from_der(&request.body) else {
            return ResponseTemplate::new(400).set_body_string("not a PKIMessage");
        };
        let Some(body) = self.body(&message.body) else {
            return ResponseTemplate::new(400).set_body_string("unsupported body");
        };

        let protection = match &self.outcome {
            Outcome::WrongSecret => Protection::password_based("someotherpassword"),
            Outcome::SignedWith(key) => Protection::signature(key.clone()),
            _ => Protection::password_based(SHARED_SECRET),
        };

        let mut response = PkiMessage {
            header: self.header(&message.header, &protection),
            body,
            protection: None,
            extra_certs: (!self.extra_certs.is_empty())
                .then(|| self.extra_certs.iter().map(any).collect()),
        };
        let protected_part = response.protected_part().to_der().expect("encodable");
        let value = protection.protect(&protected_part).expect("protect");
        response.protection = Some(BitString::from_bytes(&value).expect("bit string"));

        let status = match self.outcome {
            Outcome::ErrorBody(_) => 400,
            _ => 200,
        };
        ResponseTemplate::new(status)
            .insert_header("Content-Type", content_types::PKIXCMP)
            .set_body_bytes(response.to_der().expect("encodable"))
    }
}

/// Mock CMP CA for integration tests
pub struct MockCaServer {
    server: MockServer,
}

impl MockCaServer {
    /// Create a new mock CA server
    pub async fn start() -> Self {
        init_tracing();
        let server = MockServer::start().await;
        Self { server }
    }

    /// Full URL of the CMP endpoint
    pub fn url(&self) -> String {
        format!("{}{}", self.server.uri(), CMP_PATH)
    }

    /// Get a reference to the inner MockServer for custom mocking
    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    /// Endpoint configuration pointing at this server
    pub fn endpoint(&self) -> CaEndpoint {
        CaEndpoint::builder()
            .ca_name(CA_NAME)
            .url(self.url())
            .expect("valid URL")
            .issuer_dn(&format!("CN={}", CA_NAME))
            .expect("valid DN")
            .authentication(SHARED_SECRET, REFERENCE_VALUE)
            .build()
            .expect("valid endpoint")
    }

    /// Answer CMP POSTs with the given responder
    pub async fn mock_responder(&self, responder: CaResponder) {
        Mock::given(method("POST"))
            .and(path(CMP_PATH))
            .and(header("content-type", content_types::PKIXCMP))
            .respond_with(responder)
            .mount(&self.server)
            .await;
    }

    /// Answer CMP POSTs with a fixed status and body
    pub async fn mock_raw(&self, status: u16, body: &[u8]) {
        Mock::given(method("POST"))
            .and(path(CMP_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_bytes(body.to_vec()))
            .mount(&self.server)
            .await;
    }

    /// Number of requests received so far
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|r| r.len())
            .unwrap_or(0)
    }

    /// Decode the most recent request
    pub async fn last_request(&self) -> PkiMessage {
        let requests = self.server.received_requests().await.expect("recording on");
        let last = requests.last().expect("at least one request");
        PkiMessage::from_der(&last.body).expect("request is a PKIMessage")
    }
}
