//! In-flight request table collapsing concurrent fetches of the same key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinError;

/// Handle every caller for one key awaits; all of them observe the same output.
pub type SharedFetch<T> = Shared<BoxFuture<'static, T>>;

type Table<T> = Arc<Mutex<HashMap<String, SharedFetch<T>>>>;

/// At most one outstanding operation per key.
///
/// The first caller for a key starts the operation on its own tokio task; callers
/// arriving before it settles receive a clone of the same shared future. The task
/// runs to completion even when every caller stops waiting, and removes its entry
/// as soon as it settles, whatever the outcome, so the next caller starts afresh.
pub struct Singleflight<T>
where
    T: Clone + Send + Sync + 'static,
{
    in_flight: Table<T>,
}

impl<T> Singleflight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Joins the operation in flight for `key`, or spawns one built by `start`.
    ///
    /// `recover` turns a cancelled task (runtime shutdown) into an output; a panic
    /// in the operation is resumed in every waiter. The returned bool is `true`
    /// when this call started the operation. Must be called within a tokio runtime.
    pub fn join_or_start<F, Fut, R>(&self, key: &str, start: F, recover: R) -> (SharedFetch<T>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        R: FnOnce(JoinError) -> T + Send + 'static,
    {
        let mut in_flight = lock(&self.in_flight);

        if let Some(existing) = in_flight.get(key) {
            return (existing.clone(), false);
        }

        let guard = SingleflightGuard {
            in_flight: Arc::clone(&self.in_flight),
            key: key.to_string(),
        };
        let operation = start();
        let task = tokio::spawn(async move {
            let _guard = guard;
            operation.await
        });
        let shared = async move {
            match task.await {
                Ok(output) => output,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => recover(e),
            }
        }
        .boxed()
        .shared();

        in_flight.insert(key.to_string(), shared.clone());
        (shared, true)
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        lock(&self.in_flight).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.in_flight).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Singleflight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Removes the table entry when the task completes, fails, panics or is cancelled.
struct SingleflightGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    in_flight: Table<T>,
    key: String,
}

impl<T> Drop for SingleflightGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.key);
    }
}

fn lock<T>(table: &Mutex<T>) -> MutexGuard<'_, T> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}
