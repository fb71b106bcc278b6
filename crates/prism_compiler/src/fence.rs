//! One-shot completion signals.
//!
//! A [`Fence`] is written exactly once by the job that produces a value and
//! read by any number of waiters. Waiting is always an explicit, scoped call;
//! nothing in the compiler waits implicitly at enqueue time.

use parking_lot::{Condvar, Mutex};

/// Write-once cell with blocking readers.
#[derive(Debug)]
pub struct Fence<T> {
    value: Mutex<Option<T>>,
    cond: Condvar,
}

impl<T: Clone> Fence<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    /// Publish the value and wake every waiter.
    ///
    /// Returns `false` (and drops `value`) if the fence was already signaled.
    pub fn signal(&self, value: T) -> bool {
        let mut slot = self.value.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        self.cond.notify_all();
        true
    }

    /// Block until signaled.
    pub fn wait(&self) -> T {
        let mut slot = self.value.lock();
        loop {
            if let Some(value) = slot.as_ref() {
                return value.clone();
            }
            self.cond.wait(&mut slot);
        }
    }

    /// The value, if already signaled.
    #[must_use]
    pub fn try_get(&self) -> Option<T> {
        self.value.lock().clone()
    }

    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.value.lock().is_some()
    }
}

impl<T: Clone> Default for Fence<T> {
    fn default() -> Self {
        Self::new()
    }
}
