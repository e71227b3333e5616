//! Transport- and codec-agnostic request core for the Consul HTTP API.
//!
//! # Overview
//! A call is assembled and resolved in four steps:
//!
//! ```text
//! Requester ─get/put/delete─▶ Sender ─send*─▶ Responder ─response─▶ Response<Data<T>>
//! ```
//!
//! The `Requester` builds the URL and headers, the `Sender` attaches a body,
//! the `Responder` runs the exchange on the worker runtime and applies the
//! status policy, and the `Response` is a cancellable handle whose value can
//! be transformed with `map`/`and_then` without re-running the request.
//!
//! # Design
//! - The codec and the transport are picked by the host through
//!   `ClientBuilder`; nothing is discovered implicitly.
//! - The core never performs I/O itself. `Transport` implementations do,
//!   and `UreqTransport` is the bundled default.
//! - Encode/decode buffers come from a `BufferPool` and are leased to the
//!   codec for exactly one call, so a failing codec cannot leak them.
//! - Endpoint sets (`kv`, `session`, `status`) are thin compositions of the core and
//!   double as usage examples.

pub mod buffer;
pub mod client;
pub mod codec;
pub mod data;
pub mod error;
pub mod http;
pub mod kv;
pub mod params;
pub mod requester;
pub mod responder;
pub mod response;
pub mod sender;
pub mod session;
pub mod status;
pub mod transport;

pub use buffer::{Buffer, BufferPool, Lease};
pub use client::{Client, ClientBuilder};
pub use codec::{Binary, Codec, CodecProvider, JsonCodec, JsonCodecProvider};
pub use data::{Data, Info};
pub use error::{CodecError, Error, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use kv::{Kv, KvPair, PutParameter};
pub use params::{Consistency, Parameter, QueryParameter};
pub use requester::{Phase, Requester};
pub use responder::Responder;
pub use response::Response;
pub use sender::Sender;
pub use session::{CreateSession, Session, SessionBehavior, Sessions};
pub use status::Status;
pub use transport::{Transport, TransportFactory, UreqTransport, UreqTransportFactory};
