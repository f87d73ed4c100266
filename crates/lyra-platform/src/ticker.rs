//! Periodic timer thread.

use std::{
    fmt, io,
    sync::Arc,
    thread::{self, JoinHandle, ThreadId},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::tasks::panic_message;

/// Invokes a callback on a dedicated thread once per period until stopped.
///
/// The first tick fires one full period after [`Ticker::start`]. A tick that
/// runs longer than the period delays the next one; ticks never overlap.
///
/// Stopping joins the thread. Stopping from inside the callback only signals
/// the thread to exit after the current tick.
pub struct Ticker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
    period: Duration,
}

struct Shared {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl Ticker {
    /// Spawn the timer thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to create the thread.
    pub fn start<F>(name: &str, period: Duration, mut on_tick: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let period = period.max(Duration::from_millis(1));

        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                let mut stopped = thread_shared.stopped.lock();
                let mut deadline = Instant::now() + period;
                while !*stopped {
                    let result = thread_shared.wake.wait_until(&mut stopped, deadline);
                    if *stopped {
                        break;
                    }
                    if result.timed_out() {
                        trace!("tick");
                        parking_lot::MutexGuard::unlocked(&mut stopped, &mut on_tick);
                        deadline = Instant::now() + period;
                    }
                }
                trace!("ticker thread exiting");
            })?;

        debug!(name, ?period, "ticker started");
        Ok(Self {
            shared,
            thread_id: handle.thread().id(),
            handle: Some(handle),
            period,
        })
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stop ticking and wait for the thread to exit.
    pub fn stop(&mut self) {
        {
            let mut stopped = self.shared.stopped.lock();
            *stopped = true;
            self.shared.wake.notify_all();
        }
        let Some(handle) = self.handle.take() else {
            return;
        };
        if thread::current().id() == self.thread_id {
            // Called from the tick callback; the loop exits once it returns.
            return;
        }
        let name = handle.thread().name().unwrap_or("ticker").to_owned();
        if let Err(payload) = handle.join() {
            warn!(
                %name,
                panic = panic_message(payload.as_ref()),
                "ticker thread panicked"
            );
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticker")
            .field("period", &self.period)
            .field("running", &self.handle.is_some())
            .finish()
    }
}
