//! Body attachment for a sealed request.

use bytes::Bytes;
use serde::Serialize;

use crate::codec::{encode_buffer, Codec};
use crate::error::Error;
use crate::http::HttpRequest;
use crate::requester::Exchange;
use crate::responder::Responder;

const CONTENT_TYPE: &str = "Content-Type";

/// A sealed request waiting for its body. `T` is the expected response type.
pub struct Sender<C, T> {
    request: HttpRequest,
    exchange: Exchange<C>,
    fallback: Option<T>,
}

impl<C: Codec, T> Sender<C, T> {
    pub(crate) fn new(request: HttpRequest, exchange: Exchange<C>, fallback: Option<T>) -> Self {
        Self {
            request,
            exchange,
            fallback,
        }
    }

    /// The request as it will be handed to the transport.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Encode `body` with the configured codec. Encoding failures are
    /// returned here, before anything is dispatched.
    pub fn send<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Responder<C, T>, Error> {
        let buffer = self.exchange.pool.acquire();
        encode_buffer(&*self.exchange.codec, &buffer, body)?;
        let content_type = self.exchange.codec.content_type();
        if self.request.header(CONTENT_TYPE).is_none() {
            self.request
                .headers
                .push((CONTENT_TYPE.to_string(), content_type.to_string()));
        }
        self.request.body = Some(buffer.to_bytes());
        Ok(self.into_responder())
    }

    /// No body.
    pub fn send_empty(self) -> Responder<C, T> {
        self.into_responder()
    }

    /// Raw bytes, passed through without encoding.
    pub fn send_raw(mut self, body: Option<Vec<u8>>) -> Responder<C, T> {
        self.request.body = body.map(Bytes::from);
        self.into_responder()
    }

    /// Raw UTF-8 text, passed through without encoding.
    pub fn send_text(self, body: Option<String>) -> Responder<C, T> {
        self.send_raw(body.map(String::into_bytes))
    }

    fn into_responder(self) -> Responder<C, T> {
        Responder::new(self.request, self.exchange, self.fallback)
    }
}
