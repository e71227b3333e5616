//! Request execution and status policy.
//!
//! # Design
//! `Responder::response` hands the request to the transport on the worker
//! runtime and turns the answer into a `Data` envelope:
//!
//! | status              | outcome                                   |
//! |---------------------|-------------------------------------------|
//! | 200, `T` is not `()` | body decoded with the codec              |
//! | 200, `T` is `()`     | metadata only                            |
//! | 404 with fallback   | fallback as body, status stays 404        |
//! | anything else       | `error` = request URL + `\n` + raw body   |
//!
//! Transport failures and decode failures fail the `Response` itself; they
//! never become an error-bearing envelope.

use std::any::TypeId;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::codec::{decode_buffer, Codec};
use crate::data::{join_headers, Data};
use crate::error::Error;
use crate::http::HttpRequest;
use crate::requester::Exchange;
use crate::response::Response;

/// A request with its body attached, ready to run.
pub struct Responder<C, T> {
    request: HttpRequest,
    exchange: Exchange<C>,
    fallback: Option<T>,
}

impl<C: Codec, T> Responder<C, T> {
    pub(crate) fn new(request: HttpRequest, exchange: Exchange<C>, fallback: Option<T>) -> Self {
        Self {
            request,
            exchange,
            fallback,
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }
}

impl<C, T> Responder<C, T>
where
    C: Codec,
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Execute on the worker runtime. Returns immediately.
    pub fn response(self) -> Response<Data<T>> {
        let runtime = self.exchange.runtime.clone();
        Response::spawn(&runtime, resolve(self.request, self.exchange, self.fallback))
    }
}

async fn resolve<C, T>(
    request: HttpRequest,
    exchange: Exchange<C>,
    fallback: Option<T>,
) -> Result<Data<T>, Error>
where
    C: Codec,
    T: DeserializeOwned + 'static,
{
    let method = request.method;
    let url = request.url.clone();
    debug!(%method, %url, "dispatching request");

    let response = match exchange.transport.execute(request).await {
        Ok(response) => response,
        Err(err) => {
            debug!(%method, %url, error = %err, "transport failed");
            return Err(err.into());
        }
    };
    let status = response.status;
    let headers = join_headers(&response.headers);
    debug!(%method, %url, status, len = response.body.len(), "response received");

    match status {
        200 if TypeId::of::<T>() == TypeId::of::<()>() => Ok(Data::success(status, headers, None)),
        200 => {
            let buffer = exchange.pool.acquire_from(&response.body);
            let body = decode_buffer(&*exchange.codec, &buffer)?;
            Ok(Data::success(status, headers, Some(body)))
        }
        404 if fallback.is_some() => Ok(Data::success(status, headers, fallback)),
        _ => {
            let text = String::from_utf8_lossy(&response.body);
            if exchange.debug {
                debug!(%method, %url, status, body = %text, "error response");
            }
            Ok(Data::failure(status, headers, format!("{url}\n{text}")))
        }
    }
}
