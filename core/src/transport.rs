//! Transport boundary and the default `ureq` backend.
//!
//! # Design
//! The core never performs I/O itself. A `Transport` receives a finished
//! `HttpRequest` and answers with an `HttpResponse`; any status code is a
//! valid answer and only failures to complete the exchange are errors.
//! A `TransportFactory` is the host-selected entry point that produces
//! `Requester`s bound to one transport, codec and worker runtime.
//!
//! `UreqTransport` runs blocking `ureq` calls on the runtime's blocking
//! pool, so the async task that awaits it never stalls a worker thread.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tracing::debug;

use crate::codec::Codec;
use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};
use crate::requester::Requester;

/// Executes one HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Produces requesters bound to a concrete transport.
pub trait TransportFactory<C: Codec>: Send + Sync {
    fn make(&self, runtime: Handle, base_url: &str, codec: Arc<C>, debug: bool) -> Requester<C>;
}

/// Blocking HTTP/1.1 transport built on `ureq`.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    debug: bool,
}

impl UreqTransport {
    /// Status codes are returned as data rather than errors so the core can
    /// apply its own status policy.
    pub fn new(debug: bool) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self::with_agent(agent, debug)
    }

    /// Use a preconfigured agent (timeouts, proxies, TLS). The agent must
    /// have `http_status_as_error(false)`.
    pub fn with_agent(agent: ureq::Agent, debug: bool) -> Self {
        Self { agent, debug }
    }

    fn call(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        if self.debug {
            debug!(
                method = %request.method,
                url = %request.url,
                headers = ?request.headers,
                "ureq request"
            );
        }
        let mut builder = ureq::http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str());
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        let result = match &request.body {
            Some(body) => {
                let http_request = builder.body(&body[..]).map_err(invalid_request)?;
                self.agent.run(http_request)
            }
            None => {
                let http_request = builder.body(()).map_err(invalid_request)?;
                self.agent.run(http_request)
            }
        };
        let mut response = result.map_err(transport_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect::<Vec<_>>();
        let body = response.body_mut().read_to_vec().map_err(transport_error)?;
        if self.debug {
            let text = String::from_utf8_lossy(&body);
            debug!(status, headers = ?headers, body = %text, "ureq response");
        }

        Ok(HttpResponse {
            status,
            headers,
            body: body.into(),
        })
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let transport = self.clone();
        tokio::task::spawn_blocking(move || transport.call(request))
            .await
            .map_err(|_| TransportError::Interrupted)?
    }
}

fn invalid_request(err: ureq::http::Error) -> TransportError {
    TransportError::InvalidRequest(err.to_string())
}

fn transport_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::Timeout,
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            TransportError::Connect(err.to_string())
        }
        ureq::Error::BadUri(uri) => TransportError::InvalidRequest(uri),
        ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            TransportError::Connect(io.to_string())
        }
        other => TransportError::Io(other.to_string()),
    }
}

/// Factory for `UreqTransport`-backed requesters.
#[derive(Debug, Clone, Copy, Default)]
pub struct UreqTransportFactory;

impl<C: Codec> TransportFactory<C> for UreqTransportFactory {
    fn make(&self, runtime: Handle, base_url: &str, codec: Arc<C>, debug: bool) -> Requester<C> {
        let transport = Arc::new(UreqTransport::new(debug));
        let requester = Requester::new(transport, runtime, codec).with_debug(debug);
        requester.base(Some(base_url));
        requester
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;

    #[tokio::test]
    async fn factory_sets_base_url() {
        let requester = UreqTransportFactory.make(
            Handle::current(),
            "http://127.0.0.1:8500/",
            Arc::new(JsonCodec::default()),
            false,
        );
        requester.path(["v1", "status", "leader"]);
        assert_eq!(requester.url(), "http://127.0.0.1:8500/v1/status/leader");
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let transport = UreqTransport::new(false);
        let request = HttpRequest {
            method: crate::http::HttpMethod::Get,
            url: "http://127.0.0.1:9/v1/status/leader".to_string(),
            headers: Vec::new(),
            body: None,
        };
        let err = transport.execute(request).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_) | TransportError::Io(_)));
    }
}
