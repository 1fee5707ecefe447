//! Registration handles for event callbacks.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Handle for a registered callback.
///
/// The callback stays registered until the handle is dropped or
/// [`CallbackHandle::unregister`] is called.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle").field("id", &self.id).finish()
    }
}

/// Spawn a task feeding every event matched by `select` to `callback`.
///
/// Must be called from within a tokio runtime.
pub(crate) fn spawn_listener<E, T, S, F>(
    counter: &AtomicU64,
    mut rx: broadcast::Receiver<E>,
    select: S,
    callback: F,
) -> CallbackHandle
where
    E: Clone + Send + 'static,
    T: Send,
    S: Fn(E) -> Option<T> + Send + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    let callback_id = counter.fetch_add(1, Ordering::SeqCst);

    let handle = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(item) = select(event) {
                        callback(item);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    CallbackHandle::new(callback_id, move || {
        handle.abort();
    })
}
