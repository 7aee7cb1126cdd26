//! Integration tests for client-side input validation

use std::time::{Duration, SystemTime};

use crate::integration::{csr_data, CaResponder, MockCaServer, TestPki};
use usg_cmp_client::{CmpClient, CmpClientConfig, ErrorKind, RequestValidity};

#[tokio::test]
async fn test_inverted_validity_makes_no_request() {
    let mock = MockCaServer::start().await;
    let pki = TestPki::new();
    mock.mock_responder(CaResponder::issuing(&pki)).await;

    let now = SystemTime::now();
    let validity = RequestValidity::new(Some(now + Duration::from_secs(3600)), Some(now));

    let err = CmpClient::new(CmpClientConfig::default())
        .expect("Client creation failed")
        .initialization_request(&csr_data(&[]), &mock.endpoint(), validity)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ClientValidation);
    assert_eq!(mock.request_count().await, 0);
}

#[tokio::test]
async fn test_empty_shared_secret_makes_no_request() {
    let mock = MockCaServer::start().await;
    let pki = TestPki::new();
    mock.mock_responder(CaResponder::issuing(&pki)).await;

    let mut endpoint = mock.endpoint();
    endpoint.authentication.iak.clear();

    let err = CmpClient::new(CmpClientConfig::default())
        .expect("Client creation failed")
        .certification_request(&csr_data(&[]), &endpoint)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ClientValidation);
    assert_eq!(mock.request_count().await, 0);
}
