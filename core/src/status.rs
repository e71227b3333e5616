//! Cluster status endpoints.

use crate::client::Client;
use crate::codec::Codec;
use crate::data::Info;
use crate::params::{QueryParameter, TOKEN};
use crate::requester::Requester;
use crate::response::Response;

pub struct Status<'a, C: Codec> {
    client: &'a Client<C>,
    token: Option<String>,
    params: Option<QueryParameter>,
}

impl<'a, C: Codec> Status<'a, C> {
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

    fn requester(&self, endpoint: &str) -> Requester<C> {
        let requester = self.client.requester();
        requester
            .header(TOKEN, self.token.as_deref())
            .path(["v1", "status", endpoint])
            .params(self.params.as_ref());
        requester
    }

    /// Raft address of the current leader; empty when there is none.
    pub fn leader(&self) -> Response<Info<String>> {
        self.requester("leader")
            .get::<String>(None)
            .send_empty()
            .response()
            .and_then(Info::parse_or_default)
    }

    /// Raft addresses of the voting peers.
    pub fn peers(&self) -> Response<Info<Vec<String>>> {
        self.requester("peers")
            .get::<Vec<String>>(None)
            .send_empty()
            .response()
            .and_then(Info::parse_or_default)
    }
}
