//! Integration tests for signature-protected CA responses

use crate::integration::{csr_data, spki, CaResponder, MockCaServer, Outcome, TestPki};
use usg_cmp_client::{CmpClient, CmpClientConfig};

#[tokio::test]
async fn test_signer_certificate_verified_against_root_key() {
    let mock = MockCaServer::start().await;
    let pki = TestPki::new();
    mock.mock_responder(
        CaResponder::issuing(&pki).outcome(Outcome::SignedWith(pki.intermediate_key.clone())),
    )
    .await;

    let client = CmpClient::new(CmpClientConfig::default())
        .expect("Client creation failed")
        .with_verification_key(spki(&pki.root));

    let result = client
        .certification_request(&csr_data(&["node123.onap.org"]), &mock.endpoint())
        .await
        .expect("Certification request failed");
    assert_eq!(result.certificate_chain, vec![pki.leaf.clone(), pki.intermediate.clone()]);
    assert_eq!(result.trusted_certificates[0], pki.root);
}

#[tokio::test]
async fn test_signed_response_with_ca_key() {
    let mock = MockCaServer::start().await;
    let pki = TestPki::new();
    mock.mock_responder(
        CaResponder::issuing(&pki).outcome(Outcome::SignedWith(pki.intermediate_key.clone())),
    )
    .await;

    let client = CmpClient::new(CmpClientConfig::default())
        .expect("Client creation failed")
        .with_verification_key(spki(&pki.intermediate));

    let result = client
        .certification_request(&csr_data(&[]), &mock.endpoint())
        .await
        .expect("Certification request failed");
    assert_eq!(result.leaf(), Some(&pki.leaf));
}
