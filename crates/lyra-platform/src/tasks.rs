//! Registry of cancellable background tasks.

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::ThreadPool;

/// Tracks tasks spawned on a [`ThreadPool`] so they can be cancelled as a
/// batch and drained before shutdown.
///
/// Every task receives a child of the current batch token. [`cancel_all`]
/// cancels the batch and starts a fresh one, so tasks registered afterwards
/// are unaffected. Cancellation is cooperative: a task that already started
/// runs to completion unless it checks its token.
///
/// Panics inside a task are caught at the task boundary and logged; they
/// never reach the pool thread.
///
/// [`cancel_all`]: TaskRegistry::cancel_all
#[derive(Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<RegistryState>,
    drained: Condvar,
}

#[derive(Default)]
struct RegistryState {
    in_flight: usize,
    batch: CancellationToken,
}

impl TaskRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` on `pool` and track it until it returns.
    ///
    /// A task whose token is already cancelled when a worker picks it up is
    /// skipped.
    pub fn spawn<F>(&self, pool: &ThreadPool, task: F)
    where
        F: FnOnce(&CancellationToken) + Send + 'static,
    {
        let token = {
            let mut state = self.inner.state.lock();
            state.in_flight += 1;
            state.batch.child_token()
        };
        // Dropped with the closure, so a task the pool never runs still counts down.
        let guard = InFlight {
            inner: Arc::clone(&self.inner),
        };

        pool.spawn(move || {
            let _guard = guard;
            if token.is_cancelled() {
                trace!("task cancelled before start");
                return;
            }
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task(&token))) {
                warn!(
                    panic = panic_message(payload.as_ref()),
                    "background task panicked"
                );
            }
        });
    }

    /// Number of tasks spawned and not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight
    }

    /// Cancel every task registered so far.
    pub fn cancel_all(&self) {
        let mut state = self.inner.state.lock();
        state.batch.cancel();
        state.batch = CancellationToken::new();
    }

    /// Block until every registered task has finished or been skipped.
    ///
    /// Must not be called from inside a registered task: the caller would
    /// wait for itself.
    pub fn wait_all(&self) {
        let mut state = self.inner.state.lock();
        while state.in_flight > 0 {
            self.inner.drained.wait(&mut state);
        }
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

struct InFlight {
    inner: Arc<Inner>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            self.inner.drained.notify_all();
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
