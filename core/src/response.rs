//! Cancellable handle to an in-flight request.
//!
//! # Design
//! The work behind a `Response` runs once, as a task on the worker runtime,
//! and publishes an untyped outcome into a `watch` channel. Every handle
//! derived from it (`clone`, `map`, `and_then`) shares that single pending
//! computation and differs only in the transform applied when a value is
//! read, so composing never re-submits the request.
//!
//! Transforms compose by function composition, which makes `map`
//! associative: `r.map(f).map(g)` reads the same value as
//! `r.map(move |x| g(f(x)))`.
//!
//! Cancelling aborts the task. A transport that awaits cooperatively stops
//! at its next suspension point; a blocking one finishes in the background
//! and its result is discarded.

use std::any::Any;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::error::Error;

type Value = Arc<dyn Any + Send + Sync>;
type Outcome = Result<Value, Error>;
type Transform<R> = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Result<R, Error> + Send + Sync>;

struct Pending {
    result: watch::Receiver<Option<Outcome>>,
    abort: AbortHandle,
    cancelled: AtomicBool,
    runtime: Handle,
}

/// Future-like handle resolving to `R`.
pub struct Response<R> {
    pending: Arc<Pending>,
    transform: Transform<R>,
}

impl<R: Clone + Send + Sync + 'static> Response<R> {
    /// Run `work` on `runtime` and return a handle to its result.
    pub fn spawn<F>(runtime: &Handle, work: F) -> Self
    where
        F: Future<Output = Result<R, Error>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let task = runtime.spawn(async move {
            let outcome = work.await.map(|value| Arc::new(value) as Value);
            tx.send_replace(Some(outcome));
        });
        let pending = Pending {
            result: rx,
            abort: task.abort_handle(),
            cancelled: AtomicBool::new(false),
            runtime: runtime.clone(),
        };
        Self {
            pending: Arc::new(pending),
            transform: Arc::new(|value: &(dyn Any + Send + Sync)| {
                value.downcast_ref::<R>().cloned().ok_or_else(|| {
                    Error::Unexpected("resolved value has an unexpected type".to_string())
                })
            }),
        }
    }
}

impl<R: 'static> Response<R> {
    /// Cancel the pending work. Returns `false` if it already completed.
    pub fn cancel(&self) -> bool {
        if self.is_cancelled() {
            return true;
        }
        if self.has_result() {
            return false;
        }
        self.pending.cancelled.store(true, Ordering::Release);
        self.pending.abort.abort();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.pending.cancelled.load(Ordering::Acquire)
    }

    /// Completed normally, with an error, or by cancellation.
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.has_result()
    }

    fn has_result(&self) -> bool {
        self.pending.result.borrow().is_some()
    }

    /// Wait for the result and apply the composed transform.
    pub async fn get(&self) -> Result<R, Error> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut result = self.pending.result.clone();
        let outcome = result.wait_for(Option::is_some).await.ok().and_then(|o| o.clone());
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match outcome {
            Some(Ok(value)) => (self.transform)(&*value),
            Some(Err(err)) => Err(err),
            None => Err(Error::Unexpected("request task ended without a result".to_string())),
        }
    }

    /// `get` bounded by `timeout`. Expiry leaves the work running.
    pub async fn get_timeout(&self, timeout: Duration) -> Result<R, Error> {
        tokio::time::timeout(timeout, self.get())
            .await
            .map_err(|_| Error::Timeout)?
    }

    /// Block the calling thread until the result is available.
    ///
    /// Must not be called from within an async context. With a
    /// current-thread runtime the runtime has to be driven elsewhere.
    pub fn wait(&self) -> Result<R, Error> {
        self.pending.runtime.block_on(self.get())
    }

    /// Blocking `get_timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<R, Error> {
        self.pending.runtime.block_on(self.get_timeout(timeout))
    }

    /// A handle that applies `f` after the current transform.
    pub fn map<U, F>(&self, f: F) -> Response<U>
    where
        U: 'static,
        F: Fn(R) -> U + Send + Sync + 'static,
    {
        let inner = Arc::clone(&self.transform);
        Response {
            pending: Arc::clone(&self.pending),
            transform: Arc::new(move |value: &(dyn Any + Send + Sync)| inner(value).map(&f)),
        }
    }

    /// Like `map` for a fallible `f`.
    pub fn and_then<U, F>(&self, f: F) -> Response<U>
    where
        U: 'static,
        F: Fn(R) -> Result<U, Error> + Send + Sync + 'static,
    {
        let inner = Arc::clone(&self.transform);
        Response {
            pending: Arc::clone(&self.pending),
            transform: Arc::new(move |value: &(dyn Any + Send + Sync)| inner(value).and_then(&f)),
        }
    }
}

impl<R> Clone for Response<R> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
            transform: Arc::clone(&self.transform),
        }
    }
}

impl<R> std::fmt::Debug for Response<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("cancelled", &self.pending.cancelled.load(Ordering::Acquire))
            .field("done", &self.pending.result.borrow().is_some())
            .finish()
    }
}

impl<R: Send + 'static> IntoFuture for Response<R> {
    type Output = Result<R, Error>;
    type IntoFuture = Pin<Box<dyn Future<Output = Result<R, Error>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.get().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn ready(value: u32) -> Response<u32> {
        Response::spawn(&Handle::current(), async move { Ok(value) })
    }

    #[tokio::test]
    async fn get_returns_resolved_value() {
        let response = ready(7);
        assert_eq!(response.get().await, Ok(7));
        assert!(response.is_done());
        assert!(!response.is_cancelled());
    }

    #[tokio::test]
    async fn failure_propagates() {
        let response: Response<u32> =
            Response::spawn(&Handle::current(), async { Err(Error::Timeout) });
        assert_eq!(response.get().await, Err(Error::Timeout));
    }

    #[tokio::test]
    async fn map_composes_without_rerunning_work() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let response = Response::spawn(&Handle::current(), async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(3u32)
        });
        let doubled = response.map(|x| x * 2);
        let text = doubled.map(|x| format!("n={x}"));

        assert_eq!(text.get().await, Ok("n=6".to_string()));
        assert_eq!(doubled.get().await, Ok(6));
        assert_eq!(response.get().await, Ok(3));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn map_is_associative() {
        let f = |x: u32| x + 1;
        let g = |x: u32| x * 10;
        let response = ready(4);
        let chained = response.map(f).map(g);
        let composed = response.map(move |x| g(f(x)));
        assert_eq!(chained.get().await, composed.get().await);
        assert_eq!(chained.get().await, Ok(50));
    }

    #[tokio::test]
    async fn and_then_can_fail() {
        let response = ready(0).and_then(|x| {
            if x == 0 {
                Err(Error::Unexpected("zero".to_string()))
            } else {
                Ok(100 / x)
            }
        });
        assert_eq!(response.get().await, Err(Error::Unexpected("zero".to_string())));
    }

    #[tokio::test]
    async fn cancel_before_completion_aborts_work() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let response = Response::spawn(&Handle::current(), async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(1u32)
        });
        let mapped = response.map(|x| x + 1);

        assert!(!response.is_done());
        assert!(response.cancel());
        assert!(response.is_cancelled());
        assert!(mapped.is_cancelled());
        assert!(response.is_done());
        assert_eq!(mapped.get().await, Err(Error::Cancelled));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_after_completion_is_a_no_op() {
        let response = ready(5);
        assert_eq!(response.get().await, Ok(5));
        assert!(!response.cancel());
        assert!(!response.is_cancelled());
        assert_eq!(response.get().await, Ok(5));
    }

    #[tokio::test]
    async fn get_timeout_expires_on_slow_work() {
        let response: Response<u32> =
            Response::spawn(&Handle::current(), std::future::pending::<Result<u32, Error>>());
        assert_eq!(
            response.get_timeout(Duration::from_millis(20)).await,
            Err(Error::Timeout)
        );
        assert!(!response.is_done());
        assert!(response.cancel());
    }

    #[tokio::test]
    async fn awaiting_the_handle_directly() {
        let value = ready(9).map(|x| x * x).await;
        assert_eq!(value, Ok(81));
    }

    #[test]
    fn wait_blocks_until_resolved() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let response = Response::spawn(runtime.handle(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok("leader".to_string())
        });
        assert_eq!(response.wait(), Ok("leader".to_string()));
        assert_eq!(
            response.map(|s| s.len()).wait_timeout(Duration::from_secs(1)),
            Ok(6)
        );
    }
}
