//! In-memory emulation of the Consul KV, session and status HTTP endpoints.
//!
//! Enough of the agent API for the client to run end-to-end: blocking
//! parameters are accepted and ignored, tokens are not checked, and every
//! write bumps a single store-wide index that is reported in
//! `X-Consul-Index`.

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

pub const LEADER: &str = "127.0.0.1:8300";
pub const NODE: &str = "mock-node";

const DEFAULT_LOCK_DELAY: u64 = 15_000_000_000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Entry {
    pub create_index: u64,
    pub modify_index: u64,
    pub lock_index: u64,
    pub flags: u64,
    pub key: String,
    /// Base64 of the stored bytes; `None` for an empty value.
    pub value: Option<String>,
    pub session: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Session {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub node: String,
    pub checks: Vec<String>,
    /// Nanoseconds.
    pub lock_delay: u64,
    /// `release` or `delete`.
    pub behavior: String,
    #[serde(rename = "TTL")]
    pub ttl: String,
    pub create_index: u64,
    pub modify_index: u64,
}

/// Body of `PUT /v1/session/create`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NewSession {
    pub name: Option<String>,
    pub node: Option<String>,
    pub checks: Option<Vec<String>>,
    /// Duration text such as `15s`.
    pub lock_delay: Option<String>,
    pub behavior: Option<String>,
    #[serde(rename = "TTL")]
    pub ttl: Option<String>,
}

/// Query string of `/v1/kv/{key}`. Bare flags (`?recurse`) arrive as `Some("")`.
#[derive(Debug, Default, Deserialize)]
pub struct KvQuery {
    pub recurse: Option<String>,
    pub keys: Option<String>,
    pub separator: Option<String>,
    pub cas: Option<u64>,
    pub flags: Option<u64>,
    pub acquire: Option<String>,
    pub release: Option<String>,
}

#[derive(Debug, Default)]
pub struct Store {
    entries: BTreeMap<String, Entry>,
    sessions: BTreeMap<String, Session>,
    index: u64,
}

impl Store {
    fn next_index(&mut self) -> u64 {
        self.index += 1;
        self.index
    }

    fn prefixed<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.entries
            .range(prefix.to_string()..)
            .take_while(move |(key, _)| key.starts_with(prefix))
            .map(|(_, entry)| entry)
    }

    /// Drop a session and apply its behavior to the keys it holds.
    fn invalidate(&mut self, id: &str) -> bool {
        let Some(session) = self.sessions.remove(id) else {
            return false;
        };
        let held: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.session.as_deref() == Some(id))
            .map(|e| e.key.clone())
            .collect();
        let index = self.next_index();
        for key in held {
            if session.behavior == "delete" {
                self.entries.remove(&key);
            } else if let Some(entry) = self.entries.get_mut(&key) {
                entry.session = None;
                entry.modify_index = index;
            }
        }
        true
    }
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/v1/kv/", get(read_root).delete(delete_root))
        .route("/v1/kv/{*key}", get(read_kv).put(write_kv).delete(delete_kv))
        .route("/v1/session/create", put(create_session))
        .route("/v1/session/destroy/{id}", put(destroy_session))
        .route("/v1/session/info/{id}", get(session_info))
        .route("/v1/session/renew/{id}", put(renew_session))
        .route("/v1/session/node/{node}", get(node_sessions))
        .route("/v1/session/list", get(list_sessions))
        .route("/v1/status/leader", get(leader))
        .route("/v1/status/peers", get(peers))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn meta(index: u64) -> [(&'static str, String); 3] {
    [
        ("X-Consul-Index", index.to_string()),
        ("X-Consul-Knownleader", "true".to_string()),
        ("X-Consul-Lastcontact", "0".to_string()),
    ]
}

/// `15s` style duration to nanoseconds.
fn nanos(duration: &str) -> Option<u64> {
    let seconds: u64 = duration.strip_suffix('s')?.parse().ok()?;
    seconds.checked_mul(1_000_000_000)
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}

// --- kv ---

async fn read_root(State(db): State<Db>, Query(query): Query<KvQuery>) -> Response {
    read(&db, String::new(), query).await
}

async fn read_kv(
    State(db): State<Db>,
    Path(key): Path<String>,
    Query(query): Query<KvQuery>,
) -> Response {
    read(&db, key, query).await
}

async fn read(db: &Db, key: String, query: KvQuery) -> Response {
    let store = db.read().await;
    let headers = meta(store.index);

    if query.keys.is_some() {
        let mut keys: Vec<String> = Vec::new();
        for entry in store.prefixed(&key) {
            let rest = &entry.key[key.len()..];
            let name = match query.separator.as_deref().filter(|s| !s.is_empty()) {
                Some(sep) => match rest.find(sep) {
                    Some(at) => format!("{key}{}", &rest[..at + sep.len()]),
                    None => entry.key.clone(),
                },
                None => entry.key.clone(),
            };
            if keys.last() != Some(&name) {
                keys.push(name);
            }
        }
        if keys.is_empty() {
            return (StatusCode::NOT_FOUND, headers).into_response();
        }
        return (headers, Json(keys)).into_response();
    }

    let found: Vec<Entry> = if query.recurse.is_some() {
        store.prefixed(&key).cloned().collect()
    } else {
        store.entries.get(&key).cloned().into_iter().collect()
    };
    if found.is_empty() {
        return (StatusCode::NOT_FOUND, headers).into_response();
    }
    (headers, Json(found)).into_response()
}

async fn write_kv(
    State(db): State<Db>,
    Path(key): Path<String>,
    Query(query): Query<KvQuery>,
    body: Bytes,
) -> Response {
    let mut store = db.write().await;
    let existing = store.entries.get(&key).cloned();

    if let Some(cas) = query.cas {
        let current = existing.as_ref().map_or(0, |e| e.modify_index);
        if cas != current {
            debug!(%key, cas, current, "cas mismatch");
            return (meta(store.index), Json(false)).into_response();
        }
    }

    for id in [&query.acquire, &query.release].into_iter().flatten() {
        if !store.sessions.contains_key(id) {
            let message = format!("invalid session \"{id}\"");
            return (StatusCode::INTERNAL_SERVER_ERROR, message).into_response();
        }
    }

    let mut session = existing.as_ref().and_then(|e| e.session.clone());
    let mut lock_index = existing.as_ref().map_or(0, |e| e.lock_index);
    if let Some(acquire) = query.acquire {
        if session.as_ref().is_some_and(|held| *held != acquire) {
            return (meta(store.index), Json(false)).into_response();
        }
        if session.is_none() {
            lock_index += 1;
        }
        session = Some(acquire);
    }
    if let Some(release) = query.release {
        if session.as_deref() != Some(release.as_str()) {
            return (meta(store.index), Json(false)).into_response();
        }
        session = None;
    }

    let index = store.next_index();
    let entry = Entry {
        create_index: existing.as_ref().map_or(index, |e| e.create_index),
        modify_index: index,
        lock_index,
        flags: query.flags.or(existing.as_ref().map(|e| e.flags)).unwrap_or(0),
        key: key.clone(),
        value: (!body.is_empty()).then(|| STANDARD.encode(&body)),
        session,
    };
    debug!(%key, index, len = body.len(), "stored");
    store.entries.insert(key, entry);
    (meta(index), Json(true)).into_response()
}

async fn delete_root(State(db): State<Db>, Query(query): Query<KvQuery>) -> Response {
    delete(&db, String::new(), query).await
}

async fn delete_kv(
    State(db): State<Db>,
    Path(key): Path<String>,
    Query(query): Query<KvQuery>,
) -> Response {
    delete(&db, key, query).await
}

async fn delete(db: &Db, key: String, query: KvQuery) -> Response {
    let mut store = db.write().await;

    if let Some(cas) = query.cas {
        let current = store.entries.get(&key).map_or(0, |e| e.modify_index);
        if cas != current {
            return (meta(store.index), Json(false)).into_response();
        }
    }

    let doomed: Vec<String> = if query.recurse.is_some() {
        store.prefixed(&key).map(|e| e.key.clone()).collect()
    } else {
        store.entries.contains_key(&key).then(|| key.clone()).into_iter().collect()
    };
    if !doomed.is_empty() {
        let index = store.next_index();
        for key in &doomed {
            store.entries.remove(key);
        }
        debug!(%key, removed = doomed.len(), index, "deleted");
    }
    (meta(store.index), Json(true)).into_response()
}

// --- session ---

async fn create_session(State(db): State<Db>, body: Bytes) -> Response {
    let new: NewSession = if body.is_empty() {
        NewSession::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(new) => new,
            Err(e) => return bad_request(format!("Request decode failed: {e}")),
        }
    };
    let behavior = new.behavior.unwrap_or_else(|| "release".to_string());
    if behavior != "release" && behavior != "delete" {
        return bad_request(format!("Invalid Behavior setting '{behavior}'"));
    }
    let lock_delay = match new.lock_delay.as_deref() {
        None => DEFAULT_LOCK_DELAY,
        Some(text) => match nanos(text) {
            Some(delay) => delay,
            None => return bad_request(format!("Invalid LockDelay '{text}'")),
        },
    };

    let mut store = db.write().await;
    let index = store.next_index();
    let id = Uuid::new_v4().to_string();
    let session = Session {
        id: id.clone(),
        name: new.name.unwrap_or_default(),
        node: new.node.unwrap_or_else(|| NODE.to_string()),
        checks: new.checks.unwrap_or_default(),
        lock_delay,
        behavior,
        ttl: new.ttl.unwrap_or_default(),
        create_index: index,
        modify_index: index,
    };
    debug!(%id, index, "session created");
    store.sessions.insert(id.clone(), session);
    (meta(index), Json(serde_json::json!({ "ID": id }))).into_response()
}

async fn destroy_session(State(db): State<Db>, Path(id): Path<String>) -> Response {
    let mut store = db.write().await;
    if store.invalidate(&id) {
        debug!(%id, "session destroyed");
    }
    (meta(store.index), Json(true)).into_response()
}

async fn session_info(State(db): State<Db>, Path(id): Path<String>) -> Response {
    let store = db.read().await;
    let found: Vec<Session> = store.sessions.get(&id).cloned().into_iter().collect();
    (meta(store.index), Json(found)).into_response()
}

async fn renew_session(State(db): State<Db>, Path(id): Path<String>) -> Response {
    let store = db.read().await;
    match store.sessions.get(&id) {
        Some(session) => (meta(store.index), Json(vec![session.clone()])).into_response(),
        None => {
            let message = format!("Session id '{id}' not found");
            (StatusCode::NOT_FOUND, meta(store.index), message).into_response()
        }
    }
}

async fn node_sessions(State(db): State<Db>, Path(node): Path<String>) -> Response {
    let store = db.read().await;
    let found: Vec<Session> = store
        .sessions
        .values()
        .filter(|s| s.node == node)
        .cloned()
        .collect();
    (meta(store.index), Json(found)).into_response()
}

async fn list_sessions(State(db): State<Db>) -> Response {
    let store = db.read().await;
    let all: Vec<Session> = store.sessions.values().cloned().collect();
    (meta(store.index), Json(all)).into_response()
}

// --- status ---

async fn leader() -> impl IntoResponse {
    (meta(0), Json(LEADER))
}

async fn peers() -> impl IntoResponse {
    (meta(0), Json(vec![LEADER]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str) -> Entry {
        Entry {
            create_index: 1,
            modify_index: 1,
            lock_index: 0,
            flags: 0,
            key: key.to_string(),
            value: None,
            session: None,
        }
    }

    fn session(id: &str, behavior: &str) -> Session {
        Session {
            id: id.to_string(),
            name: String::new(),
            node: NODE.to_string(),
            checks: Vec::new(),
            lock_delay: DEFAULT_LOCK_DELAY,
            behavior: behavior.to_string(),
            ttl: String::new(),
            create_index: 1,
            modify_index: 1,
        }
    }

    #[test]
    fn entry_serializes_in_consul_casing() {
        let json = serde_json::to_value(entry("app/config")).unwrap();
        assert_eq!(json["Key"], "app/config");
        assert_eq!(json["CreateIndex"], 1);
        assert!(json["Value"].is_null());
    }

    #[test]
    fn session_serializes_id_and_ttl_upper_case() {
        let json = serde_json::to_value(session("s1", "release")).unwrap();
        assert_eq!(json["ID"], "s1");
        assert_eq!(json["TTL"], "");
        assert_eq!(json["LockDelay"], 15_000_000_000u64);
    }

    #[test]
    fn prefixed_stops_at_first_non_match() {
        let mut store = Store::default();
        for key in ["app/a", "app/b", "apple", "b"] {
            store.entries.insert(key.to_string(), entry(key));
        }
        let keys: Vec<&str> = store.prefixed("app/").map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["app/a", "app/b"]);
        assert_eq!(store.prefixed("app").count(), 3);
        assert_eq!(store.prefixed("").count(), 4);
        assert_eq!(store.prefixed("z").count(), 0);
    }

    #[test]
    fn invalidate_applies_behavior() {
        let mut store = Store::default();
        for key in ["held/release", "held/delete", "free"] {
            store.entries.insert(key.to_string(), entry(key));
        }
        store.entries.get_mut("held/release").unwrap().session = Some("r".to_string());
        store.entries.get_mut("held/delete").unwrap().session = Some("d".to_string());
        store.sessions.insert("r".to_string(), session("r", "release"));
        store.sessions.insert("d".to_string(), session("d", "delete"));

        assert!(store.invalidate("r"));
        assert!(store.invalidate("d"));
        assert!(!store.invalidate("d"));
        assert_eq!(store.entries["held/release"].session, None);
        assert!(!store.entries.contains_key("held/delete"));
        assert!(store.entries.contains_key("free"));
    }

    #[test]
    fn lock_delay_text_to_nanos() {
        assert_eq!(nanos("15s"), Some(15_000_000_000));
        assert_eq!(nanos("0s"), Some(0));
        assert_eq!(nanos("15"), None);
        assert_eq!(nanos("xs"), None);
    }

    #[test]
    fn bare_flags_parse_as_present() {
        let query: KvQuery = serde_urlencoded_like("recurse&cas=4");
        assert_eq!(query.recurse.as_deref(), Some(""));
        assert_eq!(query.cas, Some(4));
        assert!(query.keys.is_none());
    }

    fn serde_urlencoded_like(raw: &str) -> KvQuery {
        let uri: axum::http::Uri = format!("/v1/kv/k?{raw}").parse().unwrap();
        Query::<KvQuery>::try_from_uri(&uri).unwrap().0
    }
}
