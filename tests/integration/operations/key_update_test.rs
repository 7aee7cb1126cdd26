//! Integration tests for key update requests (kur/kup)

use const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION;
use der::{Decode, Encode};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use sha2::Sha256;

use crate::integration::{csr_data, old_certificate, CaResponder, MockCaServer, TestPki};
use usg_cmp_client::types::cmp::PkiBody;
use usg_cmp_client::{Certificate, CmpClient, CmpClientConfig};

#[tokio::test]
async fn test_key_update_request_signed_with_old_key() {
    let mock = MockCaServer::start().await;
    let pki = TestPki::new();
    mock.mock_responder(CaResponder::issuing(&pki)).await;

    let old = old_certificate(&["node123.onap.org"]);
    let client = CmpClient::new(CmpClientConfig::default()).expect("Client creation failed");
    let result = client
        .key_update_request(&csr_data(&["node123.onap.org"]), &mock.endpoint(), &old)
        .await
        .expect("Key update request failed");
    assert_eq!(result.certificate_chain.len(), 2);

    let request = mock.last_request().await;
    assert!(matches!(request.body, PkiBody::Kur(_)));
    assert_eq!(
        request.header.protection_alg.as_ref().map(|a| a.oid),
        Some(SHA_256_WITH_RSA_ENCRYPTION)
    );
    assert!(request.header.sender_kid.is_none());

    // Old certificate travels in extraCerts
    let extra = request.extra_certs.as_ref().expect("extraCerts present");
    let sent = Certificate::from_der(&extra[0].to_der().unwrap()).unwrap();
    assert_eq!(sent, old.certificate);

    // Protection verifies with the old public key
    let protected = request.protected_part().to_der().unwrap();
    let signature =
        Signature::try_from(request.protection.as_ref().unwrap().raw_bytes()).unwrap();
    VerifyingKey::<Sha256>::new(old.private_key.to_public_key())
        .verify(&protected, &signature)
        .expect("protection signed with the old key");
}
