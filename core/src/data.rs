//! Response envelopes.
//!
//! # Design
//! `Data` is what one request execution produced: status, headers, and
//! either a decoded body or an error description. A protocol-negative
//! outcome is a value here, not an `Err`; it only turns into
//! `Error::Response` when a caller asks for the body of an error-bearing
//! envelope (`Data::into_body`, `Info::parse`).
//!
//! `Info` pairs a value with the well-known metadata headers. Those headers
//! are parsed leniently: a missing or malformed header reads as `None`.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::Error;

/// Consistency index of the data returned.
pub const INDEX: &str = "X-Consul-Index";
/// Whether the answering server knows the cluster leader.
pub const KNOWN_LEADER: &str = "X-Consul-Knownleader";
/// Milliseconds since the answering server last contacted the leader.
pub const LAST_CONTACT: &str = "X-Consul-Lastcontact";
pub const QUERY_BACKEND: &str = "X-Consul-Query-Backend";
pub const DEFAULT_ACL_POLICY: &str = "X-Consul-Default-Acl-Policy";

/// Typed outcome of one request.
///
/// Header names are stored lowercased; repeated headers are joined with `,`.
#[derive(Debug, Clone, PartialEq)]
pub struct Data<T> {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Option<T>,
    pub error: Option<String>,
}

impl<T> Data<T> {
    pub(crate) fn success(status: u16, headers: HashMap<String, String>, body: Option<T>) -> Self {
        Self {
            status,
            headers,
            body,
            error: None,
        }
    }

    pub(crate) fn failure(status: u16, headers: HashMap<String, String>, error: String) -> Self {
        Self {
            status,
            headers,
            body: None,
            error: Some(error),
        }
    }

    /// Header value by name, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The decoded body, or `Error::Response` for an error-bearing envelope.
    pub fn into_body(self) -> Result<Option<T>, Error> {
        match self.error {
            Some(message) => Err(Error::Response {
                status: self.status,
                message,
            }),
            None => Ok(self.body),
        }
    }
}

/// Fold transport headers into the envelope representation.
pub(crate) fn join_headers(headers: &[(String, String)]) -> HashMap<String, String> {
    let mut joined: HashMap<String, String> = HashMap::with_capacity(headers.len());
    for (name, value) in headers {
        joined
            .entry(name.to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(value);
            })
            .or_insert_with(|| value.clone());
    }
    joined
}

/// A value together with response metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Info<T> {
    pub value: T,
    pub index: Option<u64>,
    pub known_leader: Option<bool>,
    pub last_contact: Option<Duration>,
    pub query_backend: Option<String>,
    pub default_acl_policy: Option<String>,
}

impl<T> Info<T> {
    /// Metadata of a successful or fallback envelope.
    ///
    /// Fails with `Error::Response` when the envelope carries an error.
    pub fn parse(data: Data<T>) -> Result<Info<Option<T>>, Error> {
        let index = data.header(INDEX).and_then(|v| v.trim().parse().ok());
        let known_leader = data.header(KNOWN_LEADER).and_then(parse_bool);
        let last_contact = data
            .header(LAST_CONTACT)
            .and_then(|v| v.trim().parse().ok())
            .map(Duration::from_millis);
        let query_backend = data.header(QUERY_BACKEND).map(str::to_string);
        let default_acl_policy = data.header(DEFAULT_ACL_POLICY).map(str::to_string);
        Ok(Info {
            value: data.into_body()?,
            index,
            known_leader,
            last_contact,
            query_backend,
            default_acl_policy,
        })
    }

    /// Like `parse`, treating a missing body as `T::default()`.
    pub fn parse_or_default(data: Data<T>) -> Result<Info<T>, Error>
    where
        T: Default,
    {
        Ok(Info::parse(data)?.map(Option::unwrap_or_default))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Info<U> {
        Info {
            value: f(self.value),
            index: self.index,
            known_leader: self.known_leader,
            last_contact: self.last_contact,
            query_backend: self.query_backend,
            default_acl_policy: self.default_acl_policy,
        }
    }

    pub fn try_map<U>(self, f: impl FnOnce(T) -> Result<U, Error>) -> Result<Info<U>, Error> {
        Ok(Info {
            value: f(self.value)?,
            index: self.index,
            known_leader: self.known_leader,
            last_contact: self.last_contact,
            query_backend: self.query_backend,
            default_acl_policy: self.default_acl_policy,
        })
    }
}

impl<T> Info<Option<T>> {
    /// Collapse a list response that should hold at most one element.
    pub fn one(data: Data<Vec<T>>) -> Result<Info<Option<T>>, Error> {
        Info::parse(data)?.try_map(|list| {
            let mut list = list.unwrap_or_default();
            match list.len() {
                0 => Ok(None),
                1 => Ok(list.pop()),
                n => Err(Error::Unexpected(format!("expected at most one value, got {n}"))),
            }
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
