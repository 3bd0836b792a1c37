//! Webhook authentication: nothing is read or written for a delivery that
//! does not verify.

use certchain_confirmation::WebhookVerifier;
use certchain_core::CoreError;
use certchain_notify::SubscriptionScope;
use certchain_test_helpers::{mint_body, wallet, Harness};
use certchain_types::{CertificateStatus, MintActivityStatus};

async fn assert_untouched(h: &Harness, result: Result<impl std::fmt::Debug, CoreError>) {
    assert!(
        matches!(result, Err(CoreError::SignatureVerification)),
        "{result:?}"
    );
    let certificates = h.store("mit").certificates();
    assert!(certificates
        .iter()
        .all(|c| c.status == CertificateStatus::Pending));
    assert!(h
        .audit
        .mint_activity()
        .iter()
        .all(|e| e.status == MintActivityStatus::Submitted));
}

#[tokio::test]
async fn test_unverified_deliveries_write_nothing() {
    let h = Harness::new().unwrap();
    let mut events = h.notifier.subscribe(SubscriptionScope::All);
    h.issue("mit", 1, "BSc").await.unwrap();
    let body = mint_body("mint-sig-1", "asset-1", &wallet("mit", 1), 0);

    // Wrong secret.
    let forged = WebhookVerifier::new("not-the-secret").unwrap().sign(&body);
    assert_untouched(&h, h.deliver(&body, &forged).await).await;

    // Missing header.
    assert_untouched(&h, h.webhook.handle(&body, None).await).await;

    // Body altered after signing.
    let header = h.verifier.sign(&body);
    let tampered = mint_body("mint-sig-1", "asset-666", &wallet("mit", 1), 0);
    assert_untouched(&h, h.deliver(&tampered, &header).await).await;

    assert!(events.try_recv().is_none());

    // The genuine delivery still lands.
    assert!(h.deliver(&body, &header).await.is_ok());
    assert_eq!(
        h.store("mit").certificates()[0].status,
        CertificateStatus::Minted
    );
}

#[tokio::test]
async fn test_verified_but_unknown_signature_is_acknowledged_without_writes() {
    let h = Harness::new().unwrap();
    let cert = h.issue("mit", 1, "BSc").await.unwrap();
    let (body, header) = h.signed_mint("sig-from-elsewhere", "asset-9", &wallet("mit", 1), 4);

    let disposition = h.deliver(&body, &header).await.unwrap();

    assert_eq!(disposition.label(), "unmatched");
    assert_eq!(
        h.certificate("mit", cert.id).unwrap().status,
        CertificateStatus::Pending
    );
}
