//! Duplicate-request suppression for async lookups.
//!
//! While an operation is in flight, later callers await the same
//! [`Shared`] future instead of starting their own. The handle is cleared as
//! soon as the operation completes, successfully or not, so the next call
//! after completion starts fresh.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::{Mutex, PoisonError};

type InFlight<T> = Shared<BoxFuture<'static, T>>;

pub struct SingleFlight<T: Clone> {
    inflight: Mutex<Option<InFlight<T>>>,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(None),
        }
    }

    /// Run `op`, or join the operation that is already in flight.
    ///
    /// `op` is only invoked when nothing is in flight.
    pub async fn run<F, Fut>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let fut = {
            let mut slot = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let shared = op().boxed().shared();
                    *slot = Some(shared.clone());
                    shared
                }
            }
        };

        let output = fut.clone().await;

        let mut slot = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&fut)) {
            *slot = None;
        }
        output
    }

    /// Forget the in-flight operation. Callers already awaiting it still get
    /// its result; new callers start a fresh one.
    pub fn reset(&self) {
        *self.inflight.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_in_flight(&self) -> bool {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_run() {
        let flight = SingleFlight::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let op = || {
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                7
            }
        };

        let (a, b, c) = tokio::join!(flight.run(op()), flight.run(op()), flight.run(op()));
        assert_eq!((a, b, c), (7, 7, 7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!flight.is_in_flight());
    }

    #[tokio::test]
    async fn test_cleared_after_completion() {
        let flight = SingleFlight::<Option<u32>>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            let out = flight
                .run(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    None
                })
                .await;
            assert_eq!(out, None);
        }
        // A failed run does not stick: the second call ran again.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reset_starts_fresh_operation() {
        let flight = Arc::new(SingleFlight::<&'static str>::new());

        let slow = {
            let flight = Arc::clone(&flight);
            tokio::spawn(async move {
                flight
                    .run(|| async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        "old"
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(flight.is_in_flight());

        flight.reset();
        let fresh = flight.run(|| async { "new" }).await;
        assert_eq!(fresh, "new");
        assert_eq!(slow.await.unwrap(), "old");
    }
}
