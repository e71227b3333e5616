//! Serialization boundary between typed values and transient buffers.
//!
//! # Design
//! A `Codec` only ever sees borrowed bytes and never touches a buffer's use
//! count. `decode_buffer` and `encode_buffer` own that discipline: each leases
//! the buffer for exactly the duration of the codec call, so the count a
//! caller observes afterwards equals the count before, whether the codec
//! succeeded, returned an error, or panicked.
//!
//! Codecs are selected by the host through a `CodecProvider` handed to
//! `ClientBuilder`; the `debug` flag may make a codec chattier but never
//! changes what it produces.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::buffer::Buffer;
use crate::error::CodecError;

/// Converts typed values to and from a wire format.
pub trait Codec: Send + Sync + 'static {
    /// Media type announced for encoded request bodies.
    fn content_type(&self) -> &'static str;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;

    fn encode<T: Serialize + ?Sized>(
        &self,
        out: &mut BytesMut,
        value: &T,
    ) -> Result<(), CodecError>;
}

/// Builds the process-wide codec.
pub trait CodecProvider: Send + Sync {
    type Codec: Codec;

    fn get(&self, debug: bool) -> Self::Codec;
}

/// Decode the contents of `buffer`, holding a lease for the call only.
pub fn decode_buffer<C: Codec, T: DeserializeOwned>(
    codec: &C,
    buffer: &Buffer,
) -> Result<T, CodecError> {
    let lease = buffer.lease();
    let bytes = lease.bytes();
    codec.decode(&bytes)
}

/// Encode `value` into `buffer`, holding a lease for the call only.
///
/// On failure the partially written contents are discarded.
pub fn encode_buffer<C: Codec, T: Serialize + ?Sized>(
    codec: &C,
    buffer: &Buffer,
    value: &T,
) -> Result<(), CodecError> {
    let lease = buffer.lease();
    let mut bytes = lease.bytes();
    let result = codec.encode(&mut bytes, value);
    if result.is_err() {
        bytes.clear();
    }
    result
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Default)]
pub struct JsonCodec {
    debug: bool,
}

impl JsonCodec {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }
}

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        if self.debug {
            let payload = String::from_utf8_lossy(bytes);
            debug!(len = bytes.len(), %payload, "decoding payload");
        }
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode<T: Serialize + ?Sized>(
        &self,
        out: &mut BytesMut,
        value: &T,
    ) -> Result<(), CodecError> {
        serde_json::to_writer((&mut *out).writer(), value)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        if self.debug {
            let payload = String::from_utf8_lossy(&out[..]);
            debug!(len = out.len(), %payload, "encoded payload");
        }
        Ok(())
    }
}

/// Provides `JsonCodec`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodecProvider;

impl CodecProvider for JsonCodecProvider {
    type Codec = JsonCodec;

    fn get(&self, debug: bool) -> JsonCodec {
        JsonCodec::new(debug)
    }
}

/// Raw bytes carried through a text format as standard base64.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Binary(pub Vec<u8>);

impl Binary {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Binary {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for Binary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Binary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map(Binary)
            .map_err(serde::de::Error::custom)
    }
}
