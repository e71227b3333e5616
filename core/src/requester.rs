//! Single-use URI and header builder.
//!
//! # Design
//! A `Requester` collects path segments, query parameters and headers for one
//! logical call. URL construction moves through `Phase` in one direction only:
//!
//! ```text
//! Init ──path──▶ Path ──query──▶ Query ──url/get/put/delete──▶ Sealed
//!   └──────────────query───────────▲
//! ```
//!
//! - `path` after the first query parameter is ignored, so path and query
//!   text can never interleave.
//! - The first parameter is written with `?`, every later one with `&`.
//! - Reading the URL seals the builder. Any mutator called after that is a
//!   programming error and panics; the sealed URL is left untouched.
//! - Headers stay mutable after sealing until a verb entry point snapshots
//!   them for the transport.
//!
//! Mutators take `&self` and return `&Self` so calls chain. Builder state
//! sits behind a mutex so header adjustments and metadata reads may happen
//! from different threads while the call chain is being assembled.

use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::buffer::{lock, BufferPool};
use crate::codec::Codec;
use crate::http::{HttpMethod, HttpRequest};
use crate::params::Parameter;
use crate::sender::Sender;
use crate::transport::Transport;

/// URL construction phase of a `Requester`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing written yet.
    Init,
    /// At least one path segment written; more may follow.
    Path,
    /// The query string has started; the path is closed.
    Query,
    /// The URL has been computed and can no longer change.
    Sealed,
}

/// Everything a request needs after it leaves the builder.
pub(crate) struct Exchange<C> {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) codec: Arc<C>,
    pub(crate) runtime: Handle,
    pub(crate) pool: BufferPool,
    pub(crate) debug: bool,
}

impl<C> Clone for Exchange<C> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            codec: Arc::clone(&self.codec),
            runtime: self.runtime.clone(),
            pool: self.pool.clone(),
            debug: self.debug,
        }
    }
}

#[derive(Debug)]
struct Uri {
    phase: Phase,
    /// Path and query text; replaced by the full URL when sealed.
    target: String,
    params: usize,
    base: Option<String>,
    headers: Vec<(String, String)>,
    dispatched: bool,
}

impl Uri {
    fn new() -> Self {
        Self {
            phase: Phase::Init,
            target: String::new(),
            params: 0,
            base: None,
            headers: Vec::new(),
            dispatched: false,
        }
    }

    fn ensure_open(&self, operation: &str) {
        assert!(
            self.phase != Phase::Sealed,
            "`{operation}` called on a sealed requester (url: {})",
            self.target
        );
    }

    fn push_segment(&mut self, segment: &str) {
        if !self.target.ends_with('/') {
            self.target.push('/');
        }
        self.target.push_str(segment);
        self.phase = Phase::Path;
    }

    fn push_param(&mut self, key: &str, value: Option<&str>) {
        self.target.push(if self.params == 0 { '?' } else { '&' });
        self.target.push_str(key);
        if let Some(value) = value {
            self.target.push('=');
            self.target.push_str(value);
        }
        self.params += 1;
    }

    fn seal(&mut self) -> String {
        if self.phase != Phase::Sealed {
            let mut url = match &self.base {
                Some(base) => base.trim_end_matches('/').to_string(),
                None => String::new(),
            };
            if !self.target.starts_with('/') {
                url.push('/');
            }
            url.push_str(&self.target);
            self.target = url;
            self.phase = Phase::Sealed;
        }
        self.target.clone()
    }
}

/// Builds one request. Obtain one per call from `Client::requester` or a
/// `TransportFactory`; never reuse it for a second call.
pub struct Requester<C> {
    uri: Mutex<Uri>,
    exchange: Exchange<C>,
}

impl<C: Codec> Requester<C> {
    pub fn new(transport: Arc<dyn Transport>, runtime: Handle, codec: Arc<C>) -> Self {
        Self {
            uri: Mutex::new(Uri::new()),
            exchange: Exchange {
                transport,
                codec,
                runtime,
                pool: BufferPool::new(),
                debug: false,
            },
        }
    }

    /// Use `pool` for request and response buffers.
    pub fn with_pool(mut self, pool: BufferPool) -> Self {
        self.exchange.pool = pool;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.exchange.debug = debug;
        self
    }

    pub fn phase(&self) -> Phase {
        lock(&self.uri).phase
    }

    /// Set or replace the base URL. Without one the URL starts with `/`.
    pub fn base(&self, url: Option<&str>) -> &Self {
        let mut uri = lock(&self.uri);
        uri.ensure_open("base");
        uri.base = url.filter(|u| !u.is_empty()).map(str::to_string);
        self
    }

    /// Add or replace `key`. A `None` or empty value removes it. Keys are
    /// compared case-sensitively; an empty key is ignored.
    pub fn header(&self, key: &str, value: Option<&str>) -> &Self {
        if key.is_empty() {
            return self;
        }
        let mut uri = lock(&self.uri);
        assert!(
            !uri.dispatched,
            "`header` called after the request was dispatched ({key})"
        );
        match value.filter(|v| !v.is_empty()) {
            Some(value) => match uri.headers.iter_mut().find(|(k, _)| k == key) {
                Some(entry) => entry.1 = value.to_string(),
                None => uri.headers.push((key.to_string(), value.to_string())),
            },
            None => uri.headers.retain(|(k, _)| k != key),
        }
        self
    }

    /// Snapshot of the current headers in insertion order.
    pub fn headers(&self) -> Vec<(String, String)> {
        lock(&self.uri).headers.clone()
    }

    /// Append path segments. Empty segments are skipped; segments must
    /// already be percent-encoded if they may contain reserved characters.
    pub fn path<I>(&self, segments: I) -> &Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut uri = lock(&self.uri);
        uri.ensure_open("path");
        if uri.phase == Phase::Query {
            warn!(url = %uri.target, "path segments ignored after query parameters");
            return self;
        }
        for segment in segments {
            let segment = segment.as_ref();
            if !segment.is_empty() {
                uri.push_segment(segment);
            }
        }
        self
    }

    /// End the path with `/`, as collection roots like `/v1/kv/` require.
    /// Ignored after query parameters, like `path`.
    pub fn trailing_slash(&self) -> &Self {
        let mut uri = lock(&self.uri);
        uri.ensure_open("trailing_slash");
        if uri.phase == Phase::Query {
            warn!(url = %uri.target, "trailing slash ignored after query parameters");
            return self;
        }
        if !uri.target.ends_with('/') {
            uri.target.push('/');
        }
        uri.phase = Phase::Path;
        self
    }

    /// Append `key=value` for every non-empty value, or the bare `key` when
    /// `values` is empty. An empty key makes the call a no-op. The first
    /// accepted call closes the path.
    pub fn query<K, I>(&self, key: K, values: I) -> &Self
    where
        K: AsRef<str>,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let key = key.as_ref();
        let mut uri = lock(&self.uri);
        uri.ensure_open("query");
        if key.is_empty() {
            return self;
        }
        uri.phase = Phase::Query;
        let mut values = values.into_iter().peekable();
        if values.peek().is_none() {
            uri.push_param(key, None);
        }
        for value in values {
            let value = value.as_ref();
            if !value.is_empty() {
                uri.push_param(key, Some(value));
            }
        }
        self
    }

    /// Bare `key` with no value.
    pub fn flag<K: AsRef<str>>(&self, key: K) -> &Self {
        self.query(key, std::iter::empty::<&str>())
    }

    /// `query(key, values)` only when `condition` holds.
    pub fn query_if<K, I>(&self, condition: bool, key: K, values: I) -> &Self
    where
        K: AsRef<str>,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        if condition {
            self.query(key, values);
        }
        self
    }

    /// `flag(key)` only when `condition` holds.
    pub fn flag_if<K: AsRef<str>>(&self, condition: bool, key: K) -> &Self {
        if condition {
            self.flag(key);
        }
        self
    }

    /// `key=value` when a value is present; `None` is a no-op.
    pub fn query_opt<K, V>(&self, key: K, value: Option<V>) -> &Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if let Some(value) = value {
            self.query(key, [value]);
        }
        self
    }

    /// Run an arbitrary configurer against this builder.
    pub fn query_with<F: FnOnce(&Self)>(&self, setter: F) -> &Self {
        setter(self);
        self
    }

    /// Apply a reusable parameter object; `None` is a no-op.
    pub fn params<P: Parameter + ?Sized>(&self, params: Option<&P>) -> &Self {
        if let Some(params) = params {
            params.apply(self);
        }
        self
    }

    /// The final URL. The first call seals the builder; later calls return
    /// the same string.
    pub fn url(&self) -> String {
        lock(&self.uri).seal()
    }

    /// GET. `fallback` is returned as the body when the server answers 404.
    pub fn get<T>(&self, fallback: Option<T>) -> Sender<C, T> {
        self.dispatch(HttpMethod::Get, fallback)
    }

    /// PUT. `fallback` is returned as the body when the server answers 404.
    pub fn put<T>(&self, fallback: Option<T>) -> Sender<C, T> {
        self.dispatch(HttpMethod::Put, fallback)
    }

    /// DELETE. `fallback` is returned as the body when the server answers 404.
    pub fn delete<T>(&self, fallback: Option<T>) -> Sender<C, T> {
        self.dispatch(HttpMethod::Delete, fallback)
    }

    fn dispatch<T>(&self, method: HttpMethod, fallback: Option<T>) -> Sender<C, T> {
        let (url, headers) = {
            let mut uri = lock(&self.uri);
            uri.dispatched = true;
            (uri.seal(), uri.headers.clone())
        };
        debug!(%method, %url, "request sealed");
        let request = HttpRequest {
            method,
            url,
            headers,
            body: None,
        };
        Sender::new(request, self.exchange.clone(), fallback)
    }
}

impl<C> std::fmt::Debug for Requester<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requester").field("uri", &*lock(&self.uri)).finish()
    }
}
