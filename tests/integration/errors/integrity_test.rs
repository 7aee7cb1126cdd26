//! Integration tests for response protection checks

use crate::integration::{
    csr_data, forged_ca_certificate, old_key, spki, CaResponder, MockCaServer, Outcome, TestPki,
};
use usg_cmp_client::{CmpClient, CmpClientConfig, ErrorKind};

async fn request_with(outcome: Outcome) -> usg_cmp_client::CmpError {
    let mock = MockCaServer::start().await;
    let pki = TestPki::new();
    mock.mock_responder(CaResponder::issuing(&pki).outcome(outcome))
        .await;

    CmpClient::new(CmpClientConfig::default())
        .expect("Client creation failed")
        .certification_request(&csr_data(&[]), &mock.endpoint())
        .await
        .unwrap_err()
}

#[tokio::test]
async fn test_wrong_shared_secret_rejected() {
    let err = request_with(Outcome::WrongSecret).await;
    assert_eq!(err.kind(), ErrorKind::ResponseIntegrity);
}

#[tokio::test]
async fn test_foreign_transaction_rejected() {
    let err = request_with(Outcome::WrongTransaction).await;
    assert_eq!(err.kind(), ErrorKind::ResponseIntegrity);
}

#[tokio::test]
async fn test_signed_response_without_trusted_key_rejected() {
    let pki = TestPki::new();
    let mock = MockCaServer::start().await;
    mock.mock_responder(
        CaResponder::issuing(&pki).outcome(Outcome::SignedWith(pki.intermediate_key.clone())),
    )
    .await;

    let err = CmpClient::new(CmpClientConfig::default())
        .expect("Client creation failed")
        .certification_request(&csr_data(&[]), &mock.endpoint())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResponseIntegrity);
}

#[tokio::test]
async fn test_self_signed_impostor_rejected() {
    let pki = TestPki::new();
    let mock = MockCaServer::start().await;
    // Signed by a key of its own, vouched for only by a self-signed certificate
    mock.mock_responder(
        CaResponder::issuing(&pki)
            .outcome(Outcome::SignedWith(old_key()))
            .bags(vec![forged_ca_certificate(), pki.intermediate.clone()], vec![pki.root.clone()]),
    )
    .await;

    let err = CmpClient::new(CmpClientConfig::default())
        .expect("Client creation failed")
        .with_verification_key(spki(&pki.root))
        .certification_request(&csr_data(&[]), &mock.endpoint())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResponseIntegrity);
    assert_eq!(mock.request_count().await, 1);
}
