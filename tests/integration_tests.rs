//! Integration tests using mock HTTP server
//!
//! Tests the full flow: config → authorization manager → executor → page walk

use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use spotify_web_core::{
    AuthError, ClientConfig, Error, Page, PageWalker, RequestExecutor, RequestSpec, ScopeSet,
    TokenState, TokenStore,
};
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct SavedTrack {
    added_at: String,
    track: Track,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Track {
    id: String,
    name: String,
}

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::from_yaml_str(&format!(
        r#"
api_base_url: "{uri}/v1"
token_url: "{uri}/api/token"
client_id: test-client
client_secret: test-secret
timeout_secs: 5
expiry_margin_secs: 0
"#,
        uri = server.uri()
    ))
    .unwrap()
}

fn library_scope() -> ScopeSet {
    ScopeSet::parse("user-library-read")
}

fn expired_token() -> TokenState {
    TokenState::expires_in("stale-token", -60)
        .with_refresh_token("refresh-1")
        .with_scopes(library_scope())
}

fn tracks_page(server: &MockServer, offset: u32, limit: u32, total: u32) -> Value {
    let end = (offset + limit).min(total);
    let items: Vec<Value> = (offset..end)
        .map(|i| {
            json!({
                "added_at": "2024-01-01T00:00:00Z",
                "track": {"id": format!("track-{i}"), "name": format!("Song {i}")}
            })
        })
        .collect();
    let next = (end < total)
        .then(|| format!("{}/v1/me/tracks?limit={limit}&offset={end}", server.uri()));

    json!({
        "href": format!("{}/v1/me/tracks?limit={limit}&offset={offset}", server.uri()),
        "items": items,
        "limit": limit,
        "offset": offset,
        "total": total,
        "next": next,
        "previous": null
    })
}

async fn mount_refresh(server: &MockServer, access_token: &str, calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "access_token": access_token,
                    "token_type": "Bearer",
                    "expires_in": 3600,
                    "scope": "user-library-read"
                }))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(calls)
        .mount(server)
        .await;
}

async fn mount_tracks(server: &MockServer, token: &str, offset: u32, limit: u32, total: u32) {
    Mock::given(method("GET"))
        .and(path("/v1/me/tracks"))
        .and(query_param("offset", offset.to_string()))
        .and(header("Authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(tracks_page(server, offset, limit, total)))
        .expect(1)
        .mount(server)
        .await;
}

// ============================================================================
// End-to-End Flow Tests
// ============================================================================

#[tokio::test]
async fn test_expired_token_refresh_then_walk_library() {
    let server = MockServer::start().await;
    mount_refresh(&server, "fresh-token", 1).await;
    mount_tracks(&server, "fresh-token", 0, 10, 25).await;
    mount_tracks(&server, "fresh-token", 10, 10, 25).await;
    mount_tracks(&server, "fresh-token", 20, 10, 25).await;

    let executor = config(&server).build_executor(Some(expired_token())).unwrap();
    let mut changes = Box::pin(executor.auth().changes());

    let first: Page<SavedTrack> = executor
        .execute_json(
            &RequestSpec::get("me/tracks")
                .query("offset", "0")
                .query("limit", "10"),
            &library_scope(),
        )
        .await
        .unwrap();

    let tracks = PageWalker::new(executor.clone(), first)
        .scopes(library_scope())
        .collect_items()
        .await
        .unwrap();

    assert_eq!(tracks.len(), 25);
    assert_eq!(tracks[0].track.id, "track-0");
    assert_eq!(tracks[24].track.name, "Song 24");

    let changed = changes.next().await.unwrap();
    assert_eq!(changed.access_token, "fresh-token");
    // Refresh response had no refresh_token; the previous one is kept
    assert_eq!(changed.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(executor.auth().refresh_count(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_refresh() {
    let server = MockServer::start().await;
    mount_refresh(&server, "fresh-token", 1).await;

    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .and(header("Authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "user-1"})))
        .expect(8)
        .mount(&server)
        .await;

    let executor = config(&server).build_executor(Some(expired_token())).unwrap();

    let calls = (0..8).map(|_| {
        let executor = executor.clone();
        tokio::spawn(async move {
            executor
                .get_json::<Value>("me", &library_scope())
                .await
                .map(|v| v["id"].as_str().map(str::to_owned))
        })
    });

    for result in futures::future::join_all(calls).await {
        assert_eq!(result.unwrap().unwrap().as_deref(), Some("user-1"));
    }
    assert_eq!(executor.auth().refresh_count(), 1);
}

#[tokio::test]
async fn test_renewed_token_persists_through_store() {
    let server = MockServer::start().await;
    mount_refresh(&server, "fresh-token", 1).await;

    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "user-1"})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = TokenStore::new(dir.path().join("token.json"));
    store.save(&expired_token()).await.unwrap();

    let executor = config(&server)
        .build_executor(store.load().await.unwrap())
        .unwrap();
    executor.get_json::<Value>("me", &ScopeSet::new()).await.unwrap();

    let snapshot = executor.auth().snapshot().await.unwrap();
    store.save(&snapshot).await.unwrap();

    let reloaded = store.load().await.unwrap().unwrap();
    assert_eq!(reloaded.access_token, "fresh-token");
    assert_eq!(reloaded.refresh_token.as_deref(), Some("refresh-1"));
    assert!(reloaded.scopes.covers(&library_scope()));
}

#[tokio::test]
async fn test_revoked_refresh_token_requires_reauthorization() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Refresh token revoked"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "user-1"})))
        .expect(0)
        .mount(&server)
        .await;

    let executor = config(&server).build_executor(Some(expired_token())).unwrap();
    let err = executor
        .get_json::<Value>("me", &ScopeSet::new())
        .await
        .unwrap_err();

    assert!(err.is_reauthorization_required());
    // State is left alone; the caller decides whether to deauthorize
    assert_eq!(
        executor.auth().snapshot().await.unwrap().access_token,
        "stale-token"
    );
}

#[tokio::test]
async fn test_deauthorize_stops_requests() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "user-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let token = TokenState::expires_in("live-token", 3600).with_refresh_token("refresh-1");
    let executor = config(&server).build_executor(Some(token)).unwrap();
    let mut deauthorizations = Box::pin(executor.auth().deauthorizations());

    executor.get_json::<Value>("me", &ScopeSet::new()).await.unwrap();
    executor.auth().deauthorize().await;

    assert_eq!(deauthorizations.next().await, Some(()));
    assert!(!executor.auth().is_authorized().await);

    let err = executor
        .get_json::<Value>("me", &ScopeSet::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::NoCredential)));
}

#[tokio::test]
async fn test_client_credentials_flow() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "app-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/browse/new-releases"))
        .and(header("Authorization", "Bearer app-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"albums": {"items": []}})))
        .expect(1)
        .mount(&server)
        .await;

    let executor: RequestExecutor = config(&server).build_executor(None).unwrap();
    executor.auth().request_initial_token().await.unwrap();

    let body: Value = executor
        .get_json("browse/new-releases", &ScopeSet::new())
        .await
        .unwrap();
    assert!(body["albums"]["items"].as_array().unwrap().is_empty());

    // User scopes cannot be satisfied by an app-only token
    let err = executor
        .get_json::<Value>("me/tracks", &library_scope())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Auth(AuthError::InsufficientScopes { .. })
    ));
}

#[tokio::test]
async fn test_rejected_token_refreshed_mid_walk() {
    let server = MockServer::start().await;
    mount_refresh(&server, "fresh-token", 1).await;

    // The server stops accepting the old token between pages
    Mock::given(method("GET"))
        .and(path("/v1/me/tracks"))
        .and(query_param("offset", "2"))
        .and(header("Authorization", "Bearer live-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"status": 401, "message": "The access token expired"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_tracks(&server, "fresh-token", 2, 2, 4).await;

    let token = TokenState::expires_in("live-token", 3600)
        .with_refresh_token("refresh-1")
        .with_scopes(library_scope());
    let executor = config(&server).build_executor(Some(token)).unwrap();
    let first: Page<SavedTrack> = serde_json::from_value(tracks_page(&server, 0, 2, 4)).unwrap();

    let pages: Vec<_> = executor
        .extend_pages(first, None, &library_scope())
        .collect()
        .await;

    assert_eq!(pages.len(), 2);
    let second = pages[1].as_ref().unwrap();
    assert_eq!(second.offset, 2);
    assert!(second.next.is_none());
}
