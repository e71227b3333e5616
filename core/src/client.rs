//! Client construction and endpoint entry points.
//!
//! # Design
//! The host process picks the codec and transport explicitly: it registers
//! candidate `CodecProvider`s and `TransportFactory`s on a `ClientBuilder`,
//! and `build` resolves the first of each. A builder with no candidate for
//! either is a configuration error at construction time, never a per-call
//! failure. The resolved codec and factory are shared by every `Requester`
//! the client hands out.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::debug;

use crate::codec::{Codec, CodecProvider, JsonCodec, JsonCodecProvider};
use crate::error::Error;
use crate::kv::Kv;
use crate::params::QueryParameter;
use crate::requester::Requester;
use crate::session::Sessions;
use crate::status::Status;
use crate::transport::{TransportFactory, UreqTransportFactory};

/// Address used when none is configured.
pub const DEFAULT_ADDRESS: &str = "http://127.0.0.1:8500";
/// Environment variable holding the agent address.
pub const ADDRESS_ENV: &str = "CONSUL_HTTP_ADDR";
/// Environment variable enabling wire-level debug logging (`1` or `true`).
pub const DEBUG_ENV: &str = "CONSUL_CLIENT_DEBUG";

/// Entry point for talking to one agent.
pub struct Client<C: Codec> {
    base_url: String,
    debug: bool,
    runtime: Handle,
    codec: Arc<C>,
    factory: Arc<dyn TransportFactory<C>>,
}

impl<C: Codec> Client<C> {
    pub fn builder() -> ClientBuilder<C> {
        ClientBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// A fresh builder for one call.
    pub fn requester(&self) -> Requester<C> {
        self.factory.make(
            self.runtime.clone(),
            &self.base_url,
            Arc::clone(&self.codec),
            self.debug,
        )
    }

    /// Key/value store endpoints.
    pub fn kv(&self, token: Option<&str>, params: Option<QueryParameter>) -> Kv<'_, C> {
        Kv::new(self, token.map(str::to_string), params)
    }

    /// Session endpoints.
    pub fn session(&self, token: Option<&str>, params: Option<QueryParameter>) -> Sessions<'_, C> {
        Sessions::new(self, token.map(str::to_string), params)
    }

    /// Cluster status endpoints.
    pub fn status(&self, token: Option<&str>, params: Option<QueryParameter>) -> Status<'_, C> {
        Status::new(self, token.map(str::to_string), params)
    }
}

impl<C: Codec> Clone for Client<C> {
    fn clone(&self) -> Self {
        Self {
            base_url: self.base_url.clone(),
            debug: self.debug,
            runtime: self.runtime.clone(),
            codec: Arc::clone(&self.codec),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<C: Codec> std::fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

/// Collects configuration and plugin candidates for a `Client`.
pub struct ClientBuilder<C: Codec> {
    base_url: String,
    debug: bool,
    runtime: Option<Handle>,
    codecs: Vec<Box<dyn CodecProvider<Codec = C>>>,
    factories: Vec<Arc<dyn TransportFactory<C>>>,
}

impl<C: Codec> ClientBuilder<C> {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_ADDRESS.to_string(),
            debug: false,
            runtime: None,
            codecs: Vec::new(),
            factories: Vec::new(),
        }
    }

    /// Seed address and debug flag from `CONSUL_HTTP_ADDR` and
    /// `CONSUL_CLIENT_DEBUG`. An address without a scheme gets `http://`.
    pub fn from_env() -> Self {
        let mut builder = Self::new();
        if let Ok(address) = std::env::var(ADDRESS_ENV) {
            let address = address.trim();
            if !address.is_empty() {
                builder.base_url = if address.contains("://") {
                    address.to_string()
                } else {
                    format!("http://{address}")
                };
            }
        }
        if let Ok(flag) = std::env::var(DEBUG_ENV) {
            builder.debug = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true");
        }
        builder
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Worker runtime for request execution. Defaults to the runtime
    /// `build` is called from.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Register a codec candidate. The first one registered wins.
    pub fn codec_provider<P>(mut self, provider: P) -> Self
    where
        P: CodecProvider<Codec = C> + 'static,
    {
        self.codecs.push(Box::new(provider));
        self
    }

    /// Register a transport candidate. The first one registered wins.
    pub fn transport_factory<F>(mut self, factory: F) -> Self
    where
        F: TransportFactory<C> + 'static,
    {
        self.factories.push(Arc::new(factory));
        self
    }

    pub fn build(self) -> Result<Client<C>, Error> {
        let base_url = self.base_url.trim().trim_end_matches('/').to_string();
        url::Url::parse(&base_url)
            .map_err(|e| Error::Configuration(format!("invalid base url {base_url:?}: {e}")))?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| {
                Error::Configuration("no tokio runtime configured or running".to_string())
            })?,
        };
        let provider = self
            .codecs
            .first()
            .ok_or_else(|| Error::Configuration("no codec provider registered".to_string()))?;
        let factory = self
            .factories
            .into_iter()
            .next()
            .ok_or_else(|| Error::Configuration("no transport factory registered".to_string()))?;

        debug!(%base_url, debug = self.debug, "client configured");
        Ok(Client {
            codec: Arc::new(provider.get(self.debug)),
            base_url,
            debug: self.debug,
            runtime,
            factory,
        })
    }
}

impl ClientBuilder<JsonCodec> {
    /// Register `JsonCodecProvider` and `UreqTransportFactory`.
    pub fn with_defaults(self) -> Self {
        self.codec_provider(JsonCodecProvider)
            .transport_factory(UreqTransportFactory)
    }
}

impl<C: Codec> Default for ClientBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}
