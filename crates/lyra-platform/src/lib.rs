//! Threading primitives shared by the lyra crates.
//!
//! # Synchronization
//!
//! Re-exports [`parking_lot`] types directly. The bandwidth estimator relies
//! on [`ReentrantMutex`] so that a suggestion handler running on the
//! notifying thread may call back into the estimator.
//!
//! # Background work
//!
//! - [`ThreadPool`]: shared rayon pool for fire-and-forget work.
//! - [`TaskRegistry`]: tracks tasks spawned on a pool so they can be
//!   cancelled as a batch and drained before shutdown.
//! - [`Ticker`]: a dedicated thread invoking a callback at a fixed period.

#![forbid(unsafe_code)]

mod pool;
mod tasks;
mod ticker;

pub use parking_lot::{
    Condvar, Mutex, MutexGuard, ReentrantMutex, ReentrantMutexGuard, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};
pub use pool::ThreadPool;
pub use tasks::TaskRegistry;
pub use ticker::Ticker;
pub use tokio_util::sync::CancellationToken;
