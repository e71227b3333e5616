//! Key/value store endpoints.
//!
//! Every call is a short composition of the core primitives: a fresh
//! `Requester` with the token header and shared query parameters, a verb,
//! and a transform of the envelope into an `Info`. Reads use an empty-list
//! fallback, so a missing key resolves to `None` (or an empty list) instead
//! of an error envelope.

use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::codec::{Binary, Codec};
use crate::data::{Data, Info};
use crate::error::{CodecError, Error};
use crate::params::{encode_segment, Parameter, QueryParameter, TOKEN};
use crate::requester::Requester;
use crate::response::Response;

/// One stored entry as returned by `GET /v1/kv/<key>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KvPair<V> {
    pub create_index: u64,
    pub modify_index: u64,
    pub lock_index: Option<u64>,
    #[serde(default)]
    pub flags: u64,
    pub session: Option<String>,
    pub key: String,
    pub value: Option<V>,
}

impl KvPair<Binary> {
    /// Reinterpret the value as UTF-8 text.
    pub fn into_text(self) -> Result<KvPair<String>, Error> {
        let value = match self.value {
            Some(bytes) => Some(String::from_utf8(bytes.into_inner()).map_err(|e| {
                CodecError::Decode(format!("value of {:?} is not UTF-8: {e}", self.key))
            })?),
            None => None,
        };
        Ok(KvPair {
            create_index: self.create_index,
            modify_index: self.modify_index,
            lock_index: self.lock_index,
            flags: self.flags,
            session: self.session,
            key: self.key,
            value,
        })
    }
}

/// Write options for `put_*` and `delete`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutParameter {
    /// Opaque user flags; `0` is not sent.
    pub flags: u64,
    /// Check-and-set: only write if the modify index still matches.
    pub cas: Option<u64>,
    /// Session to lock the key with.
    pub acquire: Option<String>,
    /// Session to unlock the key with.
    pub release: Option<String>,
}

impl PutParameter {
    pub fn flags(mut self, flags: u64) -> Self {
        self.flags = flags;
        self
    }

    pub fn cas(mut self, index: u64) -> Self {
        self.cas = Some(index);
        self
    }

    pub fn acquire(mut self, session: impl Into<String>) -> Self {
        self.acquire = Some(session.into());
        self
    }

    pub fn release(mut self, session: impl Into<String>) -> Self {
        self.release = Some(session.into());
        self
    }
}

impl Parameter for PutParameter {
    fn apply<C: Codec>(&self, requester: &Requester<C>) {
        requester
            .query_opt("cas", self.cas.map(|i| i.to_string()))
            .query_if(self.flags != 0, "flags", [self.flags.to_string()])
            .query_opt("acquire", self.acquire.as_deref())
            .query_opt("release", self.release.as_deref());
    }
}

type Pairs = Vec<KvPair<Binary>>;

/// Key/value endpoints bound to a token and shared query parameters.
pub struct Kv<'a, C: Codec> {
    client: &'a Client<C>,
    token: Option<String>,
    params: Option<QueryParameter>,
}

impl<'a, C: Codec> Kv<'a, C> {
    pub(crate) fn new(
        client: &'a Client<C>,
        token: Option<String>,
        params: Option<QueryParameter>,
    ) -> Self {
        Self {
            client,
            token,
            params,
        }
    }

    /// Requester for `/v1/kv/<key>`. The key is encoded as one segment; an
    /// empty key addresses the root, `/v1/kv/`.
    fn requester(&self, key: &str) -> Requester<C> {
        let requester = self.client.requester();
        requester.header(TOKEN, self.token.as_deref());
        if key.is_empty() {
            requester.path(["v1", "kv"]).trailing_slash();
        } else {
            requester.path(["v1", "kv", encode_segment(key).as_str()]);
        }
        requester.params(self.params.as_ref());
        requester
    }

    fn read(&self, key: &str, recurse: bool) -> Response<Data<Pairs>> {
        let requester = self.requester(key);
        requester.flag_if(recurse, "recurse");
        requester.get(Some(Pairs::new())).send_empty().response()
    }

    /// Single entry with its value as text.
    pub fn text(&self, key: &str) -> Response<Info<Option<KvPair<String>>>> {
        self.read(key, false).and_then(|data| {
            Info::one(data)?.try_map(|pair| pair.map(KvPair::into_text).transpose())
        })
    }

    /// Every entry under the `key` prefix, values as text.
    pub fn text_all(&self, key: &str) -> Response<Info<Vec<KvPair<String>>>> {
        self.read(key, true).and_then(|data| {
            Info::parse_or_default(data)?
                .try_map(|pairs| pairs.into_iter().map(KvPair::into_text).collect())
        })
    }

    /// Single entry with its raw value.
    pub fn binary(&self, key: &str) -> Response<Info<Option<KvPair<Binary>>>> {
        self.read(key, false).and_then(Info::one)
    }

    /// Every entry under the `key` prefix with raw values.
    pub fn binary_all(&self, key: &str) -> Response<Info<Vec<KvPair<Binary>>>> {
        self.read(key, true).and_then(Info::parse_or_default)
    }

    /// Key names under `prefix`, optionally grouped up to `separator`.
    pub fn keys(&self, prefix: &str, separator: Option<&str>) -> Response<Info<Vec<String>>> {
        let requester = self.requester(prefix);
        requester
            .flag("keys")
            .query_opt("separator", separator.map(crate::params::encode));
        requester
            .get(Some(Vec::<String>::new()))
            .send_empty()
            .response()
            .and_then(Info::parse_or_default)
    }

    /// Store `value` as text. Resolves to whether the write happened.
    pub fn put_text(
        &self,
        key: &str,
        value: Option<&str>,
        params: Option<&PutParameter>,
    ) -> Response<Info<bool>> {
        let requester = self.requester(key);
        requester.params(params);
        requester
            .put::<bool>(None)
            .send_text(value.map(str::to_string))
            .response()
            .and_then(Info::parse_or_default)
    }

    /// Store raw bytes. Resolves to whether the write happened.
    pub fn put_binary(
        &self,
        key: &str,
        value: Option<Vec<u8>>,
        params: Option<&PutParameter>,
    ) -> Response<Info<bool>> {
        let requester = self.requester(key);
        requester.params(params);
        requester
            .put::<bool>(None)
            .send_raw(value)
            .response()
            .and_then(Info::parse_or_default)
    }

    /// Remove `key`, or everything under it with `recurse`.
    pub fn delete(
        &self,
        key: &str,
        params: Option<&PutParameter>,
        recurse: bool,
    ) -> Response<Info<()>> {
        let requester = self.requester(key);
        requester.params(params).flag_if(recurse, "recurse");
        requester
            .delete::<()>(None)
            .send_empty()
            .response()
            .and_then(|data| Ok(Info::parse(data)?.map(|_| ())))
    }
}
