//! Local task spawning for background continuations.
//!
//! Natively the client is meant to run inside a `tokio::task::LocalSet`.
//! Outside one nothing is scheduled and [`spawn_local`] reports it instead
//! of panicking.

use std::future::Future;

/// Schedule `future` on the current thread. Returns `false` when no local
/// executor is available; the future is dropped.
#[cfg(target_arch = "wasm32")]
pub(crate) fn spawn_local<F>(future: F) -> bool
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
    true
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn spawn_local<F>(future: F) -> bool
where
    F: Future<Output = ()> + 'static,
{
    // tokio panics when called outside a LocalSet
    let spawned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
        tokio::task::spawn_local(future);
    }));
    if spawned.is_err() {
        tracing::warn!("No tokio LocalSet on this thread; background task dropped");
    }
    spawned.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[tokio::test]
    async fn test_spawn_inside_local_set_runs() {
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        tokio::task::LocalSet::new()
            .run_until(async move {
                assert!(spawn_local(async move { r.set(true) }));
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            })
            .await;
        assert!(ran.get());
    }

    #[tokio::test]
    async fn test_spawn_without_local_set_is_reported() {
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        assert!(!spawn_local(async move { r.set(true) }));
        assert!(!ran.get());
    }
}
