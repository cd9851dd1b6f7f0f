//! Signal: a park/unpark pair
//!
//! A latched flag guarded by May's mutex and condition variable. `notify`
//! sets the flag and wakes the waiter; `wait` parks until the flag is set
//! (or the timeout passes) and then clears it. Because the flag latches, a
//! notification sent before the waiter parks is never lost.
//!
//! May's primitives park the current coroutine when called from a coroutine
//! and fall back to thread parking otherwise, so the same Signal works for
//! tasks and for the host thread.

use may::sync::{Condvar, Mutex};
use std::fmt;
use std::sync::PoisonError;
use std::time::{Duration, Instant};

pub struct Signal {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").finish_non_exhaustive()
    }
}

impl Signal {
    pub fn new() -> Self {
        Self {
            raised: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub fn notify(&self) {
        let mut raised = self.raised.lock().unwrap_or_else(PoisonError::into_inner);
        *raised = true;
        self.cond.notify_all();
    }

    /// Returns true if a notification was consumed, false on timeout.
    ///
    /// `None`, or a timeout too large to represent, waits without limit.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut raised = self.raised.lock().unwrap_or_else(PoisonError::into_inner);
        while !*raised {
            match deadline {
                None => {
                    raised = self.cond.wait(raised).unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (guard, _) = self
                        .cond
                        .wait_timeout(raised, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    raised = guard;
                }
            }
        }
        *raised = false;
        true
    }

    /// Wait until the given instant; None waits without limit
    pub fn wait_until(&self, deadline: Option<Instant>) -> bool {
        match deadline {
            None => self.wait(None),
            Some(d) => self.wait(Some(d.saturating_duration_since(Instant::now()))),
        }
    }

    /// Clear a pending notification without waiting
    pub fn reset(&self) {
        *self.raised.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }
}
