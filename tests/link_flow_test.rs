use auth_link_service::error::AppError;
use auth_link_service::models::{ProviderId, LAST_METHOD_WARNING};
use auth_link_service::services::{
    ExternalIdentity, LinkProof, LinkService, MemoryStore, MockMailer, ProofVerifier,
    RegistryStore, SignupMethod,
};
use ed25519_dalek::{Signer, SigningKey};
use std::sync::Arc;
use uuid::Uuid;

struct TestHarness {
    links: LinkService,
    store: Arc<MemoryStore>,
    mailer: Arc<MockMailer>,
    verifier: Arc<ProofVerifier>,
}

fn setup() -> TestHarness {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(MockMailer::new());
    let verifier = Arc::new(ProofVerifier::new("test-gateway-secret", 300));
    let links = LinkService::new(
        store.clone(),
        mailer.clone(),
        verifier.clone(),
        "http://localhost:8080".to_string(),
    );
    TestHarness {
        links,
        store,
        mailer,
        verifier,
    }
}

async fn signup_with_lightning(h: &TestHarness) -> Uuid {
    let registry = h
        .store
        .create_account(SignupMethod::Identity(ExternalIdentity::Lightning(
            lightning_pubkey(&[1u8; 32]),
        )))
        .await
        .unwrap();
    registry.account_id
}

fn lightning_pubkey(seed: &[u8; 32]) -> String {
    hex::encode(SigningKey::from_bytes(seed).verifying_key().to_bytes())
}

/// Sign a freshly issued challenge for a signed-challenge provider.
fn signed_proof(h: &TestHarness, provider: ProviderId, seed: &[u8; 32]) -> LinkProof {
    let signing_key = SigningKey::from_bytes(seed);
    let challenge = h.links.issue_link_challenge(provider).unwrap();
    let signature = hex::encode(signing_key.sign(challenge.as_bytes()).to_bytes());
    LinkProof::SignedChallenge {
        pubkey: hex::encode(signing_key.verifying_key().to_bytes()),
        challenge,
        signature,
    }
}

fn assertion_proof(h: &TestHarness, provider: ProviderId, external_id: &str) -> LinkProof {
    LinkProof::ExternalAssertion {
        external_id: external_id.to_string(),
        assertion: h.verifier.mint_assertion(provider, external_id),
    }
}

#[tokio::test]
async fn sole_method_unlink_walks_the_confirmation_flow() {
    let h = setup();
    let account_id = signup_with_lightning(&h).await;

    // First attempt: no confirmation, a challenge is offered instead.
    let err = h
        .links
        .unlink(account_id, ProviderId::Lightning, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConfirmationRequired));

    // Wrong phrase leaves the challenge open.
    let err = h
        .links
        .unlink(account_id, ProviderId::Lightning, Some("yes I am sure"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConfirmationRequired));

    // The exact phrase redeems the challenge and executes the unlink.
    let registry = h
        .links
        .unlink(account_id, ProviderId::Lightning, Some(LAST_METHOD_WARNING))
        .await
        .unwrap();
    assert_eq!(registry.linked_count(), 0);
    assert!(!registry.is_linked(ProviderId::Lightning));
}

#[tokio::test]
async fn unlink_with_remaining_method_needs_no_confirmation() {
    let h = setup();
    let account_id = signup_with_lightning(&h).await;

    let proof = signed_proof(&h, ProviderId::Nostr, &[2u8; 32]);
    h.links
        .link(account_id, ProviderId::Nostr, &proof)
        .await
        .unwrap();

    let registry = h
        .links
        .unlink(account_id, ProviderId::Nostr, None)
        .await
        .unwrap();
    assert!(!registry.is_linked(ProviderId::Nostr));
    assert_eq!(registry.linked_count(), 1);
}

#[tokio::test]
async fn confirmation_for_one_provider_never_authorizes_another() {
    let h = setup();
    let account_id = signup_with_lightning(&h).await;

    // Open a challenge for lightning.
    let err = h
        .links
        .unlink(account_id, ProviderId::Lightning, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConfirmationRequired));

    // Link nostr, then unlink it and lightning down to one again so nostr
    // becomes the sole method.
    let proof = signed_proof(&h, ProviderId::Nostr, &[3u8; 32]);
    h.links
        .link(account_id, ProviderId::Nostr, &proof)
        .await
        .unwrap();
    h.links
        .unlink(account_id, ProviderId::Lightning, None)
        .await
        .unwrap();

    // The phrase is correct but the open challenge was bound to the
    // lightning intent; nostr must not ride on it.
    let err = h
        .links
        .unlink(account_id, ProviderId::Nostr, Some(LAST_METHOD_WARNING))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConfirmationRequired));

    // The re-offered challenge is for nostr and now redeems.
    let registry = h
        .links
        .unlink(account_id, ProviderId::Nostr, Some(LAST_METHOD_WARNING))
        .await
        .unwrap();
    assert_eq!(registry.linked_count(), 0);
}

#[tokio::test]
async fn abandoned_confirmation_executes_nothing() {
    let h = setup();
    let account_id = signup_with_lightning(&h).await;

    let err = h
        .links
        .unlink(account_id, ProviderId::Lightning, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConfirmationRequired));

    h.links.abandon_confirmation(account_id);

    let registry = h.links.current_methods(account_id).await.unwrap();
    assert!(registry.is_linked(ProviderId::Lightning));

    // A phrase after abandonment has no challenge to redeem.
    let err = h
        .links
        .unlink(account_id, ProviderId::Lightning, Some(LAST_METHOD_WARNING))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConfirmationRequired));
}

#[tokio::test]
async fn repeated_unlink_is_idempotent() {
    let h = setup();
    let account_id = signup_with_lightning(&h).await;

    let proof = assertion_proof(&h, ProviderId::Github, "42");
    h.links
        .link(account_id, ProviderId::Github, &proof)
        .await
        .unwrap();

    let first = h
        .links
        .unlink(account_id, ProviderId::Github, None)
        .await
        .unwrap();
    assert!(!first.is_linked(ProviderId::Github));

    // Double submit: same answer, no error.
    let second = h
        .links
        .unlink(account_id, ProviderId::Github, None)
        .await
        .unwrap();
    assert!(!second.is_linked(ProviderId::Github));
    assert_eq!(second.linked_count(), first.linked_count());
}

#[tokio::test]
async fn email_links_in_two_phases_via_the_mailer() {
    let h = setup();
    let account_id = signup_with_lightning(&h).await;

    let pending = h
        .links
        .request_email_link(account_id, "satoshi@example.com".to_string())
        .await
        .unwrap();
    // Pending bindings are not usable login methods.
    assert!(!pending.is_linked(ProviderId::Email));
    assert_eq!(pending.linked_count(), 1);

    let token = h
        .mailer
        .last_token_for("satoshi@example.com")
        .expect("verification mail should have been sent");

    let linked = h.links.confirm_email_link(&token).await.unwrap();
    assert!(linked.is_linked(ProviderId::Email));
    assert_eq!(linked.linked_count(), 2);

    // The callback token is single-use.
    let err = h.links.confirm_email_link(&token).await.unwrap_err();
    assert!(matches!(err, AppError::ProofInvalid(_)));
}

#[tokio::test]
async fn rerequesting_email_invalidates_the_earlier_token() {
    let h = setup();
    let account_id = signup_with_lightning(&h).await;

    h.links
        .request_email_link(account_id, "old@example.com".to_string())
        .await
        .unwrap();
    let stale = h.mailer.last_token_for("old@example.com").unwrap();

    h.links
        .request_email_link(account_id, "new@example.com".to_string())
        .await
        .unwrap();

    let err = h.links.confirm_email_link(&stale).await.unwrap_err();
    assert!(matches!(err, AppError::ProofInvalid(_)));

    let fresh = h.mailer.last_token_for("new@example.com").unwrap();
    let linked = h.links.confirm_email_link(&fresh).await.unwrap();
    assert!(linked.is_linked(ProviderId::Email));
}

#[tokio::test]
async fn api_key_is_entitlement_gated_and_exempt_from_confirmation() {
    let h = setup();
    let account_id = signup_with_lightning(&h).await;

    let err = h.links.generate_api_key(account_id).await.unwrap_err();
    assert!(matches!(err, AppError::NotEntitled));

    h.links
        .set_api_key_entitlement(account_id, true)
        .await
        .unwrap();

    let registry = h.links.generate_api_key(account_id).await.unwrap();
    let first_key = registry.api_key.clone().unwrap().key;

    // Regeneration replaces; the old material stops authenticating.
    let registry = h.links.generate_api_key(account_id).await.unwrap();
    let current = registry.api_key.clone().unwrap();
    assert_ne!(current.key, first_key);
    assert!(!current.authenticates(&first_key));

    // The key never counts as a login method, so deleting it while
    // lightning is the sole login method needs no confirmation.
    let registry = h
        .links
        .unlink(account_id, ProviderId::ApiKey, None)
        .await
        .unwrap();
    assert!(registry.api_key.is_none());
    assert_eq!(registry.linked_count(), 1);
}

#[tokio::test]
async fn proof_for_the_wrong_provider_is_rejected() {
    let h = setup();
    let account_id = signup_with_lightning(&h).await;

    // A github assertion presented as a twitter link.
    let proof = assertion_proof(&h, ProviderId::Github, "42");
    let err = h
        .links
        .link(account_id, ProviderId::Twitter, &proof)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ProofInvalid(_)));

    let registry = h.links.current_methods(account_id).await.unwrap();
    assert!(!registry.is_linked(ProviderId::Twitter));
}

#[tokio::test]
async fn identity_linked_elsewhere_is_refused() {
    let h = setup();
    let first = signup_with_lightning(&h).await;
    let second = h
        .store
        .create_account(SignupMethod::Email("other@example.com".to_string()))
        .await
        .unwrap()
        .account_id;

    let proof = assertion_proof(&h, ProviderId::Github, "42");
    h.links.link(first, ProviderId::Github, &proof).await.unwrap();

    let proof = assertion_proof(&h, ProviderId::Github, "42");
    let err = h
        .links
        .link(second, ProviderId::Github, &proof)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::LinkedElsewhere));
}

#[tokio::test]
async fn concurrent_confirmed_and_unconfirmed_unlinks_stay_safe() {
    for _ in 0..25 {
        let h = setup();
        let account_id = signup_with_lightning(&h).await;

        // Arm the challenge, then race a confirmed caller against a bare one.
        let _ = h
            .links
            .unlink(account_id, ProviderId::Lightning, None)
            .await;

        let confirmed = {
            let links = h.links.clone();
            tokio::spawn(async move {
                links
                    .unlink(account_id, ProviderId::Lightning, Some(LAST_METHOD_WARNING))
                    .await
            })
        };
        let unconfirmed = {
            let links = h.links.clone();
            tokio::spawn(async move { links.unlink(account_id, ProviderId::Lightning, None).await })
        };

        let _ = confirmed.await.unwrap();
        let _ = unconfirmed.await.unwrap();

        // Whatever the interleaving, the provider is gone only through the
        // confirmed path and the registry is consistent.
        let registry = h.links.current_methods(account_id).await.unwrap();
        if registry.linked_count() == 0 {
            assert!(!registry.is_linked(ProviderId::Lightning));
        } else {
            assert!(registry.is_linked(ProviderId::Lightning));
        }
    }
}
