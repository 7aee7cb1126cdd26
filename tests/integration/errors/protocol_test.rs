//! Integration tests for CA-reported failures

use crate::integration::{csr_data, CaResponder, MockCaServer, Outcome, TestPki};
use usg_cmp_client::{CmpClient, CmpClientConfig, CmpError, ErrorKind};

fn client() -> CmpClient {
    CmpClient::new(CmpClientConfig::default()).expect("Client creation failed")
}

#[tokio::test]
async fn test_error_body_text_surfaces_verbatim() {
    let mock = MockCaServer::start().await;
    let pki = TestPki::new();
    mock.mock_responder(
        CaResponder::issuing(&pki).outcome(Outcome::ErrorBody(Some(
            "Wrong Authentication: sender KID not found".to_string(),
        ))),
    )
    .await;

    let err = client()
        .certification_request(&csr_data(&[]), &mock.endpoint())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ServerProtocol);
    assert!(
        matches!(&err, CmpError::ServerProtocol(text) if text == "Wrong Authentication: sender KID not found"),
        "unexpected error: {:?}",
        err
    );
}

#[tokio::test]
async fn test_error_body_without_text() {
    let mock = MockCaServer::start().await;
    let pki = TestPki::new();
    mock.mock_responder(CaResponder::issuing(&pki).outcome(Outcome::ErrorBody(None)))
        .await;

    let err = client()
        .certification_request(&csr_data(&[]), &mock.endpoint())
        .await
        .unwrap_err();

    assert!(matches!(&err, CmpError::ServerProtocol(text) if text == "N/A"));
}

#[tokio::test]
async fn test_rejection_status_text() {
    let mock = MockCaServer::start().await;
    let pki = TestPki::new();
    mock.mock_responder(
        CaResponder::issuing(&pki).outcome(Outcome::Reject("Subject DN is not allowed".to_string())),
    )
    .await;

    let err = client()
        .certification_request(&csr_data(&[]), &mock.endpoint())
        .await
        .unwrap_err();

    assert!(
        matches!(&err, CmpError::ServerProtocol(text) if text == "Subject DN is not allowed"),
        "unexpected error: {:?}",
        err
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_non_cmp_body_is_malformed() {
    let mock = MockCaServer::start().await;
    mock.mock_raw(502, b"<html><body>Bad Gateway</body></html>")
        .await;

    let err = client()
        .certification_request(&csr_data(&[]), &mock.endpoint())
        .await
        .unwrap_err();

    assert!(matches!(err, CmpError::MalformedResponse(_)));
    assert_eq!(err.kind(), ErrorKind::ServerProtocol);
}
