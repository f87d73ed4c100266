//! Shared thread pool for notification dispatch.
//!
//! Wraps [`rayon::ThreadPool`] so that every lyra component posts background
//! work the same way. Pass one pool through the configs to share it across
//! sessions.
//!
//! By default the global rayon pool is used. Create a dedicated pool with
//! [`ThreadPool::with_num_threads`] or [`ThreadPool::custom`] to control the
//! thread count and lifecycle.

use std::{fmt, sync::Arc};

/// Shared thread pool for background work.
///
/// Wraps an optional [`rayon::ThreadPool`]. When `None`, delegates to the
/// global rayon pool.
///
/// # Cloning
///
/// Cloning is cheap (Arc increment). Sessions should share the same pool to
/// avoid uncontrolled thread proliferation.
///
/// # Panics inside tasks
///
/// Rayon aborts the process when a spawned closure panics and no panic
/// handler is installed. Code that runs untrusted callbacks should go
/// through [`TaskRegistry`](crate::TaskRegistry), which catches unwinds at
/// the task boundary.
///
/// # Example
///
/// ```
/// use lyra_platform::ThreadPool;
///
/// let pool = ThreadPool::with_num_threads(2).unwrap();
/// pool.spawn(|| { /* notify subscribers */ });
/// ```
#[derive(Clone)]
pub struct ThreadPool {
    inner: Option<Arc<rayon::ThreadPool>>,
}

impl ThreadPool {
    /// Use the global rayon thread pool.
    ///
    /// The global pool is created lazily on first use with one thread per
    /// logical CPU. This is the default.
    #[must_use]
    pub fn global() -> Self {
        Self { inner: None }
    }

    /// Wrap an existing [`rayon::ThreadPool`].
    ///
    /// When the last clone is dropped and no tasks are running, the
    /// underlying pool is destroyed and its threads exit.
    #[must_use]
    pub fn custom(pool: rayon::ThreadPool) -> Self {
        Self {
            inner: Some(Arc::new(pool)),
        }
    }

    /// Create a pool with a specific number of named threads.
    ///
    /// # Errors
    ///
    /// Returns an error if the rayon pool cannot be created.
    pub fn with_num_threads(n: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|i| format!("lyra-worker-{i}"))
            .build()?;
        Ok(Self::custom(pool))
    }

    /// Spawn a closure on the pool (fire-and-forget).
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self.inner {
            Some(ref pool) => pool.spawn(f),
            None => rayon::spawn(f),
        }
    }

    /// Number of worker threads backing this pool.
    #[must_use]
    pub fn num_threads(&self) -> usize {
        match self.inner {
            Some(ref pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner {
            Some(ref pool) => f
                .debug_struct("ThreadPool")
                .field("kind", &"custom")
                .field("num_threads", &pool.current_num_threads())
                .finish(),
            None => f
                .debug_struct("ThreadPool")
                .field("kind", &"global")
                .finish(),
        }
    }
}
