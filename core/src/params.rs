//! Reusable query-parameter objects.
//!
//! A `Parameter` writes several query entries onto a `Requester` at once, so
//! endpoint code can share blocking-query and consistency settings without
//! branching at every call site.

use std::time::Duration;

use crate::codec::Codec;
use crate::requester::Requester;

/// Request header carrying the ACL token.
pub const TOKEN: &str = "X-Consul-Token";

/// Something that configures the query string of a `Requester`.
pub trait Parameter {
    fn apply<C: Codec>(&self, requester: &Requester<C>);
}

/// Form-urlencode `value` for use as a path segment or query value.
pub fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// `encode` for a single path segment: spaces become `%20` instead of `+`.
pub fn encode_segment(value: &str) -> String {
    encode(value).replace('+', "%20")
}

/// Whole seconds with an `s` suffix, the format of blocking-query waits.
pub fn seconds(duration: Duration) -> String {
    format!("{}s", duration.as_secs())
}

/// Read consistency mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Consistency {
    /// Server default; writes nothing.
    #[default]
    Default,
    Stale,
    Consistent,
}

/// Parameters shared by most read endpoints. The default value writes
/// nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParameter {
    pub datacenter: Option<String>,
    pub consistency: Consistency,
    /// Maximum blocking time; sent as whole seconds.
    pub wait: Option<Duration>,
    /// Blocking-query index from a previous `Info::index`.
    pub index: Option<u64>,
    /// Sort by round-trip time from this node (`_agent` for the local one).
    pub near: Option<String>,
}

impl QueryParameter {
    pub fn datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = Some(datacenter.into());
        self
    }

    pub fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn wait(mut self, wait: Duration) -> Self {
        self.wait = Some(wait);
        self
    }

    pub fn index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    pub fn near(mut self, near: impl Into<String>) -> Self {
        self.near = Some(near.into());
        self
    }
}

impl Parameter for QueryParameter {
    fn apply<C: Codec>(&self, requester: &Requester<C>) {
        requester
            .query_opt("dc", self.datacenter.as_deref())
            .flag_if(self.consistency == Consistency::Stale, "stale")
            .flag_if(self.consistency == Consistency::Consistent, "consistent")
            .query_opt("wait", self.wait.map(seconds))
            .query_opt("index", self.index.map(|i| i.to_string()))
            .query_opt("near", self.near.as_deref().map(encode));
    }
}
