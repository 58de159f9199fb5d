//! End-to-end token lifecycle tests over an in-memory database: encrypted
//! persistence, read-after-write, disconnect cleanup, and the background
//! refresh sweep against a mock provider.

mod test_utils;

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use calbridge::adapters::AdapterRegistry;
use calbridge::adapters::google::GoogleAdapter;
use calbridge::adapters::zoom::ZoomAdapter;
use calbridge::crypto::TokenTuple;
use calbridge::models::{IntegrationStatus, Provider};
use calbridge::repositories::{IntegrationRepository, SecurityEventRepository};
use calbridge::token_refresh::RefreshCoordinator;
use calbridge::token_store::TokenStore;
use test_utils::{integration_fixture, sample_tuple, setup_test_db, test_config, test_master_secret};

#[tokio::test]
async fn store_retrieve_clear_roundtrip() {
    let db = setup_test_db().await.unwrap();
    let repo = IntegrationRepository::new(Arc::clone(&db));
    let row = repo
        .create(integration_fixture(uuid::Uuid::new_v4(), Provider::Google))
        .await
        .unwrap();

    let store = TokenStore::new(repo.clone(), test_master_secret());
    let tuple = sample_tuple(Some(Utc::now() + Duration::hours(1)));

    store.store(row.id, &tuple).await.unwrap();

    let loaded = store.retrieve(row.id).await.unwrap().unwrap();
    assert_eq!(loaded, tuple);

    // Stored columns carry ciphertext, never the plaintext token bytes.
    let raw = repo.get_by_id(&row.id).await.unwrap().unwrap();
    let access_ct = raw.access_token_ciphertext.unwrap();
    assert!(!contains_subslice(&access_ct, tuple.access_token.as_bytes()));
    assert!(raw.refresh_token_ciphertext.is_some());
    assert_eq!(raw.status, "connected");

    let cleared = store
        .clear(row.id, IntegrationStatus::Disconnected)
        .await
        .unwrap();
    assert_eq!(cleared.status, "disconnected");
    assert!(cleared.access_token_ciphertext.is_none());
    assert!(cleared.refresh_token_ciphertext.is_none());
    assert!(store.retrieve(row.id).await.unwrap().is_none());
}

#[tokio::test]
async fn retrieve_after_store_observes_replacement() {
    let db = setup_test_db().await.unwrap();
    let repo = IntegrationRepository::new(Arc::clone(&db));
    let row = repo
        .create(integration_fixture(uuid::Uuid::new_v4(), Provider::Zoom))
        .await
        .unwrap();
    let store = TokenStore::new(repo, test_master_secret());

    let first = sample_tuple(None);
    store.store(row.id, &first).await.unwrap();
    assert_eq!(store.retrieve(row.id).await.unwrap().unwrap(), first);

    let second = TokenTuple {
        access_token: "access-token-2".to_string(),
        refresh_token: Some("refresh-token-2".to_string()),
        expires_at: Some(Utc::now() + Duration::hours(1)),
        scopes: vec!["meeting:read".to_string()],
    };
    store.store(row.id, &second).await.unwrap();

    // The cache entry from the first read must not shadow the new tuple.
    assert_eq!(store.retrieve(row.id).await.unwrap().unwrap(), second);
}

#[tokio::test]
async fn sweep_refreshes_due_integration() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "renewed-access",
            "refresh_token": "rotated-refresh",
            "token_type": "bearer",
            "expires_in": 3600,
            "scope": "meeting:read",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let db = setup_test_db().await.unwrap();
    let repo = IntegrationRepository::new(Arc::clone(&db));
    let security_events = SecurityEventRepository::new(Arc::clone(&db));
    let store = Arc::new(TokenStore::new(repo.clone(), test_master_secret()));

    let row = repo
        .create(integration_fixture(uuid::Uuid::new_v4(), Provider::Zoom))
        .await
        .unwrap();
    // Expires inside the refresh buffer, so the sweep must pick it up.
    store
        .store(row.id, &sample_tuple(Some(Utc::now() + Duration::seconds(60))))
        .await
        .unwrap();

    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(ZoomAdapter::with_bases(
        "client-id".to_string(),
        "client-secret".to_string(),
        server.uri(),
        server.uri(),
    )));

    let coordinator = RefreshCoordinator::new(
        Arc::new(test_config()),
        repo.clone(),
        Arc::clone(&store),
        registry,
        security_events,
    );

    let stats = coordinator.sweep().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 0);

    let refreshed = store.retrieve(row.id).await.unwrap().unwrap();
    assert_eq!(refreshed.access_token, "renewed-access");
    assert_eq!(refreshed.refresh_token.as_deref(), Some("rotated-refresh"));
    assert!(refreshed.expires_at.unwrap() > Utc::now() + Duration::minutes(50));
}

#[tokio::test]
async fn refresh_keeps_previous_token_when_provider_does_not_rotate() {
    let server = MockServer::start().await;
    // Google omits refresh_token from refresh responses.
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "renewed-access",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .mount(&server)
        .await;

    let db = setup_test_db().await.unwrap();
    let repo = IntegrationRepository::new(Arc::clone(&db));
    let security_events = SecurityEventRepository::new(Arc::clone(&db));
    let store = Arc::new(TokenStore::new(repo.clone(), test_master_secret()));

    let row = repo
        .create(integration_fixture(uuid::Uuid::new_v4(), Provider::Google))
        .await
        .unwrap();
    store
        .store(row.id, &sample_tuple(Some(Utc::now() - Duration::seconds(10))))
        .await
        .unwrap();

    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(GoogleAdapter::with_bases(
        "client-id".to_string(),
        "client-secret".to_string(),
        server.uri(),
        server.uri(),
    )));

    let coordinator = RefreshCoordinator::new(
        Arc::new(test_config()),
        repo,
        Arc::clone(&store),
        registry,
        security_events,
    );

    let stats = coordinator.sweep().await.unwrap();
    assert_eq!(stats.succeeded, 1);

    let refreshed = store.retrieve(row.id).await.unwrap().unwrap();
    assert_eq!(refreshed.access_token, "renewed-access");
    assert_eq!(refreshed.refresh_token.as_deref(), Some("refresh-token-1"));
}

#[tokio::test]
async fn invalid_grant_marks_integration_expired_and_audits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Refresh token revoked",
        })))
        .mount(&server)
        .await;

    let db = setup_test_db().await.unwrap();
    let repo = IntegrationRepository::new(Arc::clone(&db));
    let security_events = SecurityEventRepository::new(Arc::clone(&db));
    let store = Arc::new(TokenStore::new(repo.clone(), test_master_secret()));

    let row = repo
        .create(integration_fixture(uuid::Uuid::new_v4(), Provider::Zoom))
        .await
        .unwrap();
    store
        .store(row.id, &sample_tuple(Some(Utc::now() + Duration::seconds(30))))
        .await
        .unwrap();

    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(ZoomAdapter::with_bases(
        "client-id".to_string(),
        "client-secret".to_string(),
        server.uri(),
        server.uri(),
    )));

    let coordinator = RefreshCoordinator::new(
        Arc::new(test_config()),
        repo.clone(),
        Arc::clone(&store),
        registry,
        security_events.clone(),
    );

    let stats = coordinator.sweep().await.unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.succeeded, 0);

    let updated = repo.get_by_id(&row.id).await.unwrap().unwrap();
    assert_eq!(updated.status, "expired");

    let events = security_events.list_recent(None, 10).await.unwrap();
    assert!(
        events
            .iter()
            .any(|e| e.kind == "token_refresh_invalid_grant"),
        "expected an invalid_grant audit event, got {:?}",
        events.iter().map(|e| e.kind.clone()).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn sweep_skips_integrations_outside_the_buffer() {
    let db = setup_test_db().await.unwrap();
    let repo = IntegrationRepository::new(Arc::clone(&db));
    let security_events = SecurityEventRepository::new(Arc::clone(&db));
    let store = Arc::new(TokenStore::new(repo.clone(), test_master_secret()));

    let row = repo
        .create(integration_fixture(uuid::Uuid::new_v4(), Provider::Zoom))
        .await
        .unwrap();
    // Expires well beyond the 300 second buffer.
    store
        .store(row.id, &sample_tuple(Some(Utc::now() + Duration::hours(2))))
        .await
        .unwrap();

    let coordinator = RefreshCoordinator::new(
        Arc::new(test_config()),
        repo,
        store,
        AdapterRegistry::new(),
        security_events,
    );

    let stats = coordinator.sweep().await.unwrap();
    assert_eq!(stats.total, 0);
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
