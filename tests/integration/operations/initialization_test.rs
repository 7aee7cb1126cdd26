//! Integration tests for initialization requests (ir/ip)

use std::time::{Duration, SystemTime};

use crate::integration::{csr_data, CaResponder, MockCaServer, TestPki};
use usg_cmp_client::types::cmp::PkiBody;
use usg_cmp_client::{CmpClient, CmpClientConfig, RequestValidity};
use x509_cert::time::Time;

#[tokio::test]
async fn test_initialization_request_with_validity() {
    let mock = MockCaServer::start().await;
    let pki = TestPki::new();
    mock.mock_responder(CaResponder::issuing(&pki)).await;

    let not_before = SystemTime::now();
    let not_after = not_before + Duration::from_secs(365 * 24 * 3600);
    let client = CmpClient::new(CmpClientConfig::default()).expect("Client creation failed");

    let result = client
        .initialization_request(
            &csr_data(&["node123.onap.org"]),
            &mock.endpoint(),
            RequestValidity::new(Some(not_before), Some(not_after)),
        )
        .await
        .expect("Initialization request failed");
    assert_eq!(result.leaf(), Some(&pki.leaf));

    let request = mock.last_request().await;
    let PkiBody::Ir(messages) = &request.body else {
        panic!("expected ir body, got {}", request.body.name());
    };
    let validity = messages[0]
        .cert_req
        .cert_template
        .validity
        .clone()
        .expect("validity in template");
    assert!(matches!(validity.not_before, Some(Time::UtcTime(_))));
    assert!(matches!(validity.not_after, Some(Time::UtcTime(_))));
}

#[tokio::test]
async fn test_initialization_request_open_ended_validity() {
    let mock = MockCaServer::start().await;
    let pki = TestPki::new();
    mock.mock_responder(CaResponder::issuing(&pki)).await;

    let client = CmpClient::new(CmpClientConfig::default()).expect("Client creation failed");
    client
        .initialization_request(
            &csr_data(&[]),
            &mock.endpoint(),
            RequestValidity::new(None, Some(SystemTime::now() + Duration::from_secs(3600))),
        )
        .await
        .expect("Initialization request failed");

    let request = mock.last_request().await;
    let PkiBody::Ir(messages) = &request.body else {
        panic!("expected ir body");
    };
    let validity = messages[0].cert_req.cert_template.validity.clone().unwrap();
    assert!(validity.not_before.is_none());
    assert!(validity.not_after.is_some());
}
