use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mock_server::{app, Entry, Session, LEADER, NODE};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(body.to_string())
        .unwrap()
}

async fn call(app: &Router, method: &str, uri: &str, body: &str) -> axum::response::Response {
    app.clone()
        .oneshot(request(method, uri, body))
        .await
        .unwrap()
}

async fn put(app: &Router, uri: &str, body: &str) -> bool {
    let resp = call(app, "PUT", uri, body).await;
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await
}

async fn create_session(app: &Router, body: &str) -> String {
    let resp = call(app, "PUT", "/v1/session/create", body).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let created: serde_json::Value = body_json(resp).await;
    created["ID"].as_str().unwrap().to_string()
}

fn index_of(resp: &axum::response::Response) -> u64 {
    resp.headers()["x-consul-index"].to_str().unwrap().parse().unwrap()
}

// --- read ---

#[tokio::test]
async fn missing_key_is_404_with_index() {
    let resp = call(&app(), "GET", "/v1/kv/missing", "").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(index_of(&resp), 0);
    assert!(body_bytes(resp).await.is_empty());
}

#[tokio::test]
async fn put_then_get_returns_base64_value() {
    let app = app();
    assert!(put(&app, "/v1/kv/app%2Fconfig?flags=9", "hello").await);

    let resp = call(&app, "GET", "/v1/kv/app%2Fconfig", "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(index_of(&resp), 1);
    assert_eq!(resp.headers()["x-consul-knownleader"], "true");
    let entries: Vec<Entry> = body_json(resp).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key, "app/config");
    assert_eq!(entries[0].value.as_deref(), Some("aGVsbG8="));
    assert_eq!(entries[0].flags, 9);
    assert_eq!(entries[0].create_index, 1);
}

#[tokio::test]
async fn recurse_returns_prefix_only() {
    let app = app();
    put(&app, "/v1/kv/app/a", "1").await;
    put(&app, "/v1/kv/app/b", "2").await;
    put(&app, "/v1/kv/apple", "3").await;

    let resp = call(&app, "GET", "/v1/kv/app%2F?recurse", "").await;
    let entries: Vec<Entry> = body_json(resp).await;
    let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, ["app/a", "app/b"]);
}

#[tokio::test]
async fn keys_group_by_separator() {
    let app = app();
    put(&app, "/v1/kv/svc/web/port", "80").await;
    put(&app, "/v1/kv/svc/web/host", "h").await;
    put(&app, "/v1/kv/svc/db", "d").await;

    let resp = call(&app, "GET", "/v1/kv/svc%2F?keys&separator=%2F", "").await;
    let keys: Vec<String> = body_json(resp).await;
    assert_eq!(keys, ["svc/db", "svc/web/"]);
}

#[tokio::test]
async fn root_lists_every_key() {
    let app = app();
    put(&app, "/v1/kv/a", "1").await;
    put(&app, "/v1/kv/b/c", "2").await;

    let resp = call(&app, "GET", "/v1/kv/?keys&separator=%2F", "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let keys: Vec<String> = body_json(resp).await;
    assert_eq!(keys, ["a", "b/"]);

    let resp = call(&app, "GET", "/v1/kv/?recurse", "").await;
    let entries: Vec<Entry> = body_json(resp).await;
    assert_eq!(entries.len(), 2);
}

// --- write ---

#[tokio::test]
async fn cas_rejects_stale_index() {
    let app = app();
    assert!(put(&app, "/v1/kv/k?cas=0", "a").await);
    assert!(!put(&app, "/v1/kv/k?cas=0", "b").await);
    assert!(put(&app, "/v1/kv/k?cas=1", "c").await);

    let resp = call(&app, "GET", "/v1/kv/k", "").await;
    let entries: Vec<Entry> = body_json(resp).await;
    assert_eq!(entries[0].value.as_deref(), Some("Yw=="));
    assert_eq!(entries[0].modify_index, 2);
    assert_eq!(entries[0].create_index, 1);
}

#[tokio::test]
async fn acquire_and_release_lock() {
    let app = app();
    let s1 = create_session(&app, "").await;
    let s2 = create_session(&app, "").await;

    assert!(put(&app, &format!("/v1/kv/lock?acquire={s1}"), "").await);
    assert!(!put(&app, &format!("/v1/kv/lock?acquire={s2}"), "").await);
    assert!(!put(&app, &format!("/v1/kv/lock?release={s2}"), "").await);
    assert!(put(&app, &format!("/v1/kv/lock?release={s1}"), "").await);

    let resp = call(&app, "GET", "/v1/kv/lock", "").await;
    let entries: Vec<Entry> = body_json(resp).await;
    assert_eq!(entries[0].lock_index, 1);
    assert_eq!(entries[0].session, None);
    assert_eq!(entries[0].value, None);
}

#[tokio::test]
async fn acquire_with_unknown_session_is_rejected() {
    let resp = call(&app(), "PUT", "/v1/kv/lock?acquire=nope", "").await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// --- delete ---

#[tokio::test]
async fn delete_recurse_removes_prefix() {
    let app = app();
    put(&app, "/v1/kv/tmp/a", "1").await;
    put(&app, "/v1/kv/tmp/b", "2").await;
    put(&app, "/v1/kv/keep", "3").await;

    let resp = call(&app, "DELETE", "/v1/kv/tmp?recurse", "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let deleted: bool = body_json(resp).await;
    assert!(deleted);

    let resp = call(&app, "GET", "/v1/kv/tmp?recurse", "").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = call(&app, "GET", "/v1/kv/keep", "").await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn delete_missing_key_is_ok() {
    let resp = call(&app(), "DELETE", "/v1/kv/ghost", "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(index_of(&resp), 0);
}

#[tokio::test]
async fn delete_root_recurse_wipes_the_store() {
    let app = app();
    put(&app, "/v1/kv/a", "1").await;
    put(&app, "/v1/kv/b/c", "2").await;

    let resp = call(&app, "DELETE", "/v1/kv/?recurse", "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = call(&app, "GET", "/v1/kv/?keys", "").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- session ---

#[tokio::test]
async fn session_lifecycle() {
    let app = app();
    let id = create_session(&app, r#"{"Name":"web-lock","TTL":"30s","LockDelay":"5s"}"#).await;

    let resp = call(&app, "GET", &format!("/v1/session/info/{id}"), "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let found: Vec<Session> = body_json(resp).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "web-lock");
    assert_eq!(found[0].ttl, "30s");
    assert_eq!(found[0].lock_delay, 5_000_000_000);
    assert_eq!(found[0].behavior, "release");

    let resp = call(&app, "PUT", &format!("/v1/session/renew/{id}"), "").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = call(&app, "GET", &format!("/v1/session/node/{NODE}"), "").await;
    let on_node: Vec<Session> = body_json(resp).await;
    assert_eq!(on_node.len(), 1);

    let resp = call(&app, "PUT", &format!("/v1/session/destroy/{id}"), "").await;
    let destroyed: bool = body_json(resp).await;
    assert!(destroyed);

    let resp = call(&app, "GET", "/v1/session/list", "").await;
    let all: Vec<Session> = body_json(resp).await;
    assert!(all.is_empty());

    let resp = call(&app, "PUT", &format!("/v1/session/renew/{id}"), "").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn destroying_a_session_releases_its_locks() {
    let app = app();
    let id = create_session(&app, "").await;
    assert!(put(&app, &format!("/v1/kv/lock?acquire={id}"), "held").await);

    call(&app, "PUT", &format!("/v1/session/destroy/{id}"), "").await;

    let resp = call(&app, "GET", "/v1/kv/lock", "").await;
    let entries: Vec<Entry> = body_json(resp).await;
    assert_eq!(entries[0].session, None);
    assert_eq!(entries[0].value.as_deref(), Some("aGVsZA=="));
}

#[tokio::test]
async fn invalid_behavior_is_a_bad_request() {
    let body = r#"{"Behavior":"explode"}"#;
    let resp = call(&app(), "PUT", "/v1/session/create", body).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- status ---

#[tokio::test]
async fn leader_and_peers() {
    let app = app();
    let resp = call(&app, "GET", "/v1/status/leader", "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let leader: String = body_json(resp).await;
    assert_eq!(leader, LEADER);

    let resp = call(&app, "GET", "/v1/status/peers", "").await;
    let peers: Vec<String> = body_json(resp).await;
    assert_eq!(peers, [LEADER]);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let resp = call(&app(), "GET", "/v1/agent/self", "").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
