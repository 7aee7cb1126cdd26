//! Integration tests for certification requests (cr/cp)

use crate::integration::{csr_data, CaResponder, MockCaServer, TestPki, REFERENCE_VALUE};
use usg_cmp_client::types::cmp::PkiBody;
use usg_cmp_client::types::oids;
use usg_cmp_client::{CmpClient, CmpClientConfig};

fn client() -> CmpClient {
    CmpClient::new(CmpClientConfig::default()).expect("Client creation failed")
}

#[tokio::test]
async fn test_certification_request_success() {
    let mock = MockCaServer::start().await;
    let pki = TestPki::new();
    mock.mock_responder(CaResponder::issuing(&pki)).await;

    let result = client()
        .certification_request(&csr_data(&["node123.onap.org"]), &mock.endpoint())
        .await
        .expect("Certification request failed");

    assert_eq!(result.certificate_chain, vec![pki.leaf.clone(), pki.intermediate.clone()]);
    assert_eq!(result.trusted_certificates.len(), 2);
    assert_eq!(result.trusted_certificates[0], pki.root);
    assert!(result.trusted_certificates.contains(&pki.unrelated_root));
}

#[tokio::test]
async fn test_request_is_mac_protected_cr() {
    let mock = MockCaServer::start().await;
    let pki = TestPki::new();
    mock.mock_responder(CaResponder::issuing(&pki)).await;

    client()
        .certification_request(&csr_data(&[]), &mock.endpoint())
        .await
        .expect("Certification request failed");

    let request = mock.last_request().await;
    assert!(matches!(request.body, PkiBody::Cr(_)));
    assert_eq!(
        request.header.protection_alg.as_ref().map(|a| a.oid),
        Some(oids::PASSWORD_BASED_MAC)
    );
    assert_eq!(
        request.header.sender_kid.as_ref().map(|k| k.as_bytes().to_vec()),
        Some(REFERENCE_VALUE.as_bytes().to_vec())
    );
    assert!(request.header.has_general_info(&oids::IMPLICIT_CONFIRM));
    assert!(request.extra_certs.is_none());
}

#[tokio::test]
async fn test_chain_independent_of_bag_split() {
    let pki = TestPki::new();
    let splits = [
        (vec![], vec![pki.intermediate.clone(), pki.root.clone()]),
        (vec![pki.intermediate.clone(), pki.root.clone()], vec![]),
        (vec![pki.root.clone()], vec![pki.intermediate.clone()]),
    ];

    for (extra_certs, ca_pubs) in splits {
        let mock = MockCaServer::start().await;
        mock.mock_responder(CaResponder::issuing(&pki).bags(extra_certs, ca_pubs))
            .await;

        let result = client()
            .certification_request(&csr_data(&[]), &mock.endpoint())
            .await
            .expect("Certification request failed");

        assert_eq!(result.certificate_chain.len(), 2);
        assert_eq!(result.trusted_certificates, vec![pki.root.clone()]);
    }
}

#[tokio::test]
async fn test_result_pem_output() {
    let mock = MockCaServer::start().await;
    let pki = TestPki::new();
    mock.mock_responder(CaResponder::issuing(&pki)).await;

    let result = client()
        .certification_request(&csr_data(&[]), &mock.endpoint())
        .await
        .expect("Certification request failed");

    let chain = result.certificate_chain_pem().expect("PEM encoding");
    assert_eq!(chain.len(), 2);
    assert!(chain
        .iter()
        .all(|pem| pem.starts_with("-----BEGIN CERTIFICATE-----")));
    assert_eq!(result.trusted_certificates_pem().expect("PEM encoding").len(), 2);
}
