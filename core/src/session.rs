//! Session endpoints.
//!
//! Sessions back the `acquire`/`release` lock parameters of the KV store: a
//! key locked by a session is released (or deleted, per `SessionBehavior`)
//! when the session is destroyed or expires.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::codec::Codec;
use crate::data::Info;
use crate::error::Error;
use crate::params::{encode_segment, seconds, QueryParameter, TOKEN};
use crate::requester::Requester;
use crate::response::Response;

/// What happens to held locks when a session is invalidated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBehavior {
    #[default]
    Release,
    Delete,
}

/// A session as reported by `info`, `renew`, `node` and `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Session {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub checks: Option<Vec<String>>,
    /// Nanoseconds.
    #[serde(default)]
    pub lock_delay: u64,
    #[serde(default)]
    pub behavior: SessionBehavior,
    #[serde(rename = "TTL", default)]
    pub ttl: String,
    pub create_index: u64,
    pub modify_index: u64,
}

/// Body of `create`. Unset fields take the agent's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateSession {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_delay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behavior: Option<SessionBehavior>,
    #[serde(rename = "TTL", skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

impl CreateSession {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn checks(mut self, checks: Vec<String>) -> Self {
        self.checks = Some(checks);
        self
    }

    /// Sent in whole seconds.
    pub fn lock_delay(mut self, delay: Duration) -> Self {
        self.lock_delay = Some(seconds(delay));
        self
    }

    pub fn behavior(mut self, behavior: SessionBehavior) -> Self {
        self.behavior = Some(behavior);
        self
    }

    /// Sent in whole seconds.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(seconds(ttl));
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Created {
    #[serde(rename = "ID")]
    id: String,
}

type SessionList = Vec<Session>;

/// Session endpoints bound to a token and shared query parameters.
pub struct Sessions<'a, C: Codec> {
    client: &'a Client<C>,
    token: Option<String>,
    params: Option<QueryParameter>,
}

impl<'a, C: Codec> Sessions<'a, C> {
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

    fn requester(&self, segments: &[&str]) -> Requester<C> {
        let requester = self.client.requester();
        requester
            .header(TOKEN, self.token.as_deref())
            .path(["v1", "session"])
            .path(segments)
            .params(self.params.as_ref());
        requester
    }

    /// Create a session. Resolves to its ID.
    pub fn create(&self, create: &CreateSession) -> Response<Info<String>> {
        let sender = self.requester(&["create"]).put::<Created>(None);
        match sender.send(create) {
            Ok(responder) => responder.response().and_then(|data| {
                Info::parse(data)?.try_map(|created| {
                    created.map(|c| c.id).ok_or_else(|| {
                        Error::Unexpected("session create returned no ID".to_string())
                    })
                })
            }),
            Err(err) => Response::spawn(self.client.runtime(), async move { Err(err) }),
        }
    }

    /// Invalidate a session, applying its behavior to the locks it holds.
    pub fn destroy(&self, id: &str) -> Response<Info<bool>> {
        self.requester(&["destroy", &encode_segment(id)])
            .put::<bool>(None)
            .send_empty()
            .response()
            .and_then(Info::parse_or_default)
    }

    /// A single session; `None` when it does not exist.
    pub fn info(&self, id: &str) -> Response<Info<Option<Session>>> {
        self.requester(&["info", &encode_segment(id)])
            .get(Some(SessionList::new()))
            .send_empty()
            .response()
            .and_then(Info::one)
    }

    /// Reset the TTL of a session. An unknown ID is an error.
    pub fn renew(&self, id: &str) -> Response<Info<Option<Session>>> {
        self.requester(&["renew", &encode_segment(id)])
            .put::<SessionList>(None)
            .send_empty()
            .response()
            .and_then(Info::one)
    }

    /// Sessions registered on `node`.
    pub fn node(&self, node: &str) -> Response<Info<Vec<Session>>> {
        self.requester(&["node", &encode_segment(node)])
            .get::<SessionList>(None)
            .send_empty()
            .response()
            .and_then(Info::parse_or_default)
    }

    /// Every active session.
    pub fn list(&self) -> Response<Info<Vec<Session>>> {
        self.requester(&["list"])
            .get::<SessionList>(None)
            .send_empty()
            .response()
            .and_then(Info::parse_or_default)
    }
}
