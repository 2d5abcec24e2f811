//! Keyed single-flight: concurrent callers asking for the same key share one
//! in-flight execution.
//!
//! The first caller for a key (the leader) spawns the work onto the tokio
//! runtime and registers a shared handle; later callers for the same key
//! await that handle instead of starting their own. The spawned task removes
//! the entry as soon as the work settles, whether it succeeded or failed, so
//! the map never holds stale entries and dropping every waiter does not
//! cancel the work half-way.
//!
//! ```rust
//! use orderlink_common::sync::SingleFlight;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let flights: SingleFlight<String, u32> = SingleFlight::new();
//! let value = flights.run("conn-1".to_string(), || async { 42 }).await.unwrap();
//! assert_eq!(value, 42);
//! assert_eq!(flights.in_flight(), 0);
//! # });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

/// The shared work did not produce a value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SingleFlightError {
    /// The spawned task panicked or was cancelled by runtime shutdown.
    #[error("in-flight task aborted: {0}")]
    Aborted(String),
}

type Flight<T> = Shared<BoxFuture<'static, Result<T, SingleFlightError>>>;

struct RemoveOnDrop<K, T>
where
    K: Eq + Hash,
    T: Clone,
{
    registry: Arc<Mutex<HashMap<K, Flight<T>>>>,
    key: Option<K>,
}

impl<K, T> Drop for RemoveOnDrop<K, T>
where
    K: Eq + Hash,
    T: Clone,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.registry.lock().remove(&key);
        }
    }
}

/// Map from key to the handle of the work currently running for it.
pub struct SingleFlight<K, T>
where
    T: Clone,
{
    inflight: Arc<Mutex<HashMap<K, Flight<T>>>>,
}

impl<K, T> Default for SingleFlight<K, T>
where
    T: Clone,
{
    fn default() -> Self {
        Self { inflight: Arc::new(Mutex::new(HashMap::new())) }
    }
}

impl<K, T> std::fmt::Debug for SingleFlight<K, T>
where
    T: Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight").field("in_flight", &self.inflight.lock().len()).finish()
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty single-flight group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key`, or join the run already in flight for it.
    ///
    /// `work` is only invoked when this caller becomes the leader.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> Result<T, SingleFlightError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let flight = {
            let mut map = self.inflight.lock();
            if let Some(existing) = map.get(&key) {
                debug!(?key, "Joining in-flight execution");
                existing.clone()
            } else {
                let fut = work();
                // The entry is inserted before the lock is released, so the
                // guard's removal always observes it, even on panic.
                let guard = RemoveOnDrop {
                    registry: Arc::clone(&self.inflight),
                    key: Some(key.clone()),
                };
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    fut.await
                });
                let flight: Flight<T> = async move {
                    handle.await.map_err(|e| SingleFlightError::Aborted(e.to_string()))
                }
                .boxed()
                .shared();
                map.insert(key, flight.clone());
                flight
            }
        };
        flight.await
    }

    /// Number of keys with work currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }

    /// Whether work is currently in flight for `key`.
    #[must_use]
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.inflight.lock().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let flights: Arc<SingleFlight<String, u32>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let flights = Arc::clone(&flights);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                flights
                    .run("conn".to_string(), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        7
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn entry_cleared_after_failure_result() {
        let flights: SingleFlight<&'static str, Result<u32, String>> = SingleFlight::new();
        let first = flights.run("k", || async { Err::<u32, _>("boom".to_string()) }).await;
        assert_eq!(first, Ok(Err("boom".to_string())));
        assert!(!flights.is_in_flight(&"k"));

        let second = flights.run("k", || async { Ok::<_, String>(1) }).await;
        assert_eq!(second, Ok(Ok(1)));
    }

    #[tokio::test]
    async fn different_keys_run_independently() {
        let flights: Arc<SingleFlight<u32, u32>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicU32::new(0));
        let (a, b) = tokio::join!(
            flights.run(1, {
                let calls = Arc::clone(&calls);
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    1
                }
            }),
            flights.run(2, {
                let calls = Arc::clone(&calls);
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    2
                }
            }),
        );
        assert_eq!((a, b), (Ok(1), Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_work_reports_aborted_and_clears() {
        let flights: SingleFlight<u32, u32> = SingleFlight::new();
        let result = flights
            .run(9, || async {
                panic!("refresh exploded");
            })
            .await;
        assert!(matches!(result, Err(SingleFlightError::Aborted(_))));
        assert_eq!(flights.in_flight(), 0);
        assert_eq!(flights.run(9, || async { 3 }).await, Ok(3));
    }
}
