//! Request coalescing for remote fetches.
//!
//! Concurrent callers asking for the same logical resource (identified by a
//! string tag) share one in-flight execution and all observe its outcome.
//! Once that execution settles the tag is free and the next call starts a
//! fresh one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, error};

use crate::api::ApiError;

/// Outcome shared between all callers of one execution.
pub type FetchResult<T> = Result<T, Arc<ApiError>>;

type InFlight<T> = Shared<BoxFuture<'static, FetchResult<T>>>;

pub struct FetchCoalescer<T> {
    in_flight: Arc<Mutex<HashMap<String, InFlight<T>>>>,
}

impl<T> FetchCoalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `op` unless an execution tagged `tag` is already in flight, in
    /// which case wait for that one instead.
    ///
    /// `op` runs on its own task, so it settles and releases the tag even if
    /// every caller stops waiting.
    pub async fn coalesce<F, Fut>(&self, tag: &str, op: F) -> FetchResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let shared = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.get(tag) {
                Some(existing) => {
                    debug!(tag = tag, "Joining in-flight fetch");
                    existing.clone()
                }
                None => {
                    let shared = Self::start(Arc::clone(&self.in_flight), tag.to_string(), op());
                    in_flight.insert(tag.to_string(), shared.clone());
                    shared
                }
            }
        };
        shared.await
    }

    /// Number of tags with an execution in flight.
    pub fn pending(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn start<Fut>(
        in_flight: Arc<Mutex<HashMap<String, InFlight<T>>>>,
        tag: String,
        fut: Fut,
    ) -> InFlight<T>
    where
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let _release = Release { in_flight, tag };
            fut.await.map_err(Arc::new)
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "Coalesced fetch task failed");
                    Err(Arc::new(ApiError::InvalidResponse(format!(
                        "fetch task failed: {}",
                        e
                    ))))
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Frees a tag when its execution ends, including by panic.
struct Release<T> {
    in_flight: Arc<Mutex<HashMap<String, InFlight<T>>>>,
    tag: String,
}

impl<T> Drop for Release<T> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.tag);
    }
}

impl<T> Default for FetchCoalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
