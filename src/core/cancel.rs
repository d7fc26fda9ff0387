//! Cooperative cancellation for blocking waits

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Cloneable cancellation flag that sleeping waiters observe immediately
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every current and future wait until `reset` is called
    pub fn cancel(&self) {
        *self.lock() = true;
        self.inner.wakeup.notify_all();
    }

    pub fn reset(&self) {
        *self.lock() = false;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.lock()
    }

    /// Block for up to `duration`. Returns `true` if the token was cancelled
    /// before or during the wait.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.lock();
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            cancelled = match self.inner.wakeup.wait_timeout(cancelled, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        // A poisoned flag is still a valid bool
        self.inner.cancelled.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
