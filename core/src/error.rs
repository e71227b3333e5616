//! Error types for the request core.
//!
//! # Design
//! Failures are split by where they happen. `TransportError` covers the
//! network round trip and fails the pending computation. `CodecError` covers
//! turning bytes into values and back. A non-success HTTP status is *not* an
//! error at this layer: it travels inside a `Data` envelope and only becomes
//! `Error::Response` when a caller asks for the value of such an envelope.
//!
//! All payloads are owned strings so results can be shared between several
//! `Response` handles waiting on the same computation.

use thiserror::Error;

/// Errors surfaced by the core to its callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The transport could not complete the round trip.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The payload could not be encoded or decoded.
    #[error("codec failure: {0}")]
    Codec(#[from] CodecError),

    /// The value of an error-bearing envelope was requested.
    #[error("HTTP {status}: {message}")]
    Response { status: u16, message: String },

    /// The pending computation was cancelled before it produced a result.
    #[error("request cancelled")]
    Cancelled,

    /// The caller-supplied wait limit elapsed.
    #[error("timed out waiting for response")]
    Timeout,

    /// The client could not be assembled: a codec provider, transport
    /// factory or runtime is missing.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A response was well formed but did not have the expected shape.
    #[error("unexpected result: {0}")]
    Unexpected(String),
}

/// Failures of the network round trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer could not be reached.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Reading or writing the exchange failed midway.
    #[error("i/o error: {0}")]
    Io(String),

    /// The transport's own deadline expired.
    #[error("transport timeout")]
    Timeout,

    /// The request could not be expressed on the wire.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The worker running the exchange went away.
    #[error("request interrupted")]
    Interrupted,
}

/// Failures inside a `Codec`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The payload could not be turned into the expected type.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The value could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),
}
