//! De-duplicates concurrent in-flight requests for an identical key so
//! that N concurrent callers trigger at most one upstream call, per the
//! single-flight design goal.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::error::Error;

type SharedOutcome<T> = Shared<BoxFuture<'static, Result<T, Arc<Error>>>>;

pub struct SingleFlight<T: Clone + Send + Sync + 'static> {
    inflight: Mutex<HashMap<String, SharedOutcome<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        SingleFlight {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `make` for `key` unless a call for the same key is already in
    /// flight, in which case this caller awaits that call's result instead.
    ///
    /// `make` is only ever polled if it ends up being the future actually
    /// stored in `inflight`: two concurrent callers both building their own
    /// `shared` and racing to insert would otherwise let the loser await its
    /// own (unshared) future instead of the winner's, issuing a second
    /// upstream call. `entry(...).or_insert_with(...)` resolves that race
    /// under a single lock instead of a separate get-then-insert.
    pub async fn run<F>(&self, key: &str, make: F) -> Result<T, Arc<Error>>
    where
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let boxed: BoxFuture<'static, Result<T, Arc<Error>>> =
            make.map(|r| r.map_err(Arc::new)).boxed();
        let shared = boxed.shared();

        let fut = {
            let mut inflight = self.inflight.lock().unwrap();
            inflight.entry(key.to_string()).or_insert_with(|| shared).clone()
        };
        let result = fut.await;
        {
            let mut inflight = self.inflight.lock().unwrap();
            inflight.remove(key);
        }
        result
    }
}
