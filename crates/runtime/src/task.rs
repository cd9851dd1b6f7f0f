//! Tasks: queued closures and their tickets
//!
//! A Task is a body waiting on the Scheduler's Task Stack. Launching it
//! turns it into a May coroutine with its own Context. The `TaskTicket`
//! returned at enqueue time follows the task through its lifecycle:
//!
//! ```text
//! Queued --launch--> Running --body returns/aborts/panics--> Completed
//! ```
//!
//! There is no join: tasks hand results back through shared
//! stacks, and the host waits for everything with `Scheduler::wait_all`.

use crate::context::Context;
use crate::error::Unacknowledged;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use ual_core::Signal;

/// Body of a task
pub type TaskBody = Box<dyn FnOnce(&Context) -> Result<(), Unacknowledged> + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Queued = 0,
    Running = 1,
    Completed = 2,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => TaskState::Queued,
            1 => TaskState::Running,
            _ => TaskState::Completed,
        }
    }
}

/// Cooperative pause switch.
///
/// A paused task parks at its next yield point (any checked context
/// operation, `checkpoint`, `take`, `select`) until resumed.
#[derive(Debug, Default)]
pub struct PauseGate {
    paused: AtomicBool,
    resumed: Signal,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.resumed.notify();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Park while paused; returns immediately otherwise
    pub fn wait_if_paused(&self) {
        while self.is_paused() {
            self.resumed.wait(None);
        }
    }
}

#[derive(Debug)]
pub(crate) struct TaskShared {
    pub(crate) id: u64,
    state: AtomicU8,
    pub(crate) pause: Arc<PauseGate>,
}

impl TaskShared {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            state: AtomicU8::new(TaskState::Queued as u8),
            pause: Arc::new(PauseGate::new()),
        }
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Handle to a queued or launched task
#[derive(Debug, Clone)]
pub struct TaskTicket {
    pub(crate) shared: Arc<TaskShared>,
}

impl TaskTicket {
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_completed(&self) -> bool {
        self.state() == TaskState::Completed
    }

    /// Ask the task to park at its next yield point
    pub fn pause(&self) {
        self.shared.pause.pause();
    }

    pub fn resume(&self) {
        self.shared.pause.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.pause.is_paused()
    }
}

/// An entry on the Task Stack
pub(crate) struct Task {
    pub(crate) shared: Arc<TaskShared>,
    pub(crate) body: TaskBody,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("id", &self.shared.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_ticket_tracks_state() {
        let ticket = TaskTicket {
            shared: Arc::new(TaskShared::new(9)),
        };
        assert_eq!(ticket.id(), 9);
        assert_eq!(ticket.state(), TaskState::Queued);
        ticket.shared.set_state(TaskState::Running);
        assert_eq!(ticket.state(), TaskState::Running);
        ticket.shared.set_state(TaskState::Completed);
        assert!(ticket.is_completed());
    }

    #[test]
    fn test_pause_gate_parks_until_resume() {
        let gate = Arc::new(PauseGate::new());
        gate.pause();
        let g = Arc::clone(&gate);
        let h = thread::spawn(move || {
            let start = Instant::now();
            g.wait_if_paused();
            start.elapsed()
        });
        thread::sleep(Duration::from_millis(40));
        gate.resume();
        assert!(h.join().unwrap() >= Duration::from_millis(30));
        // not paused: returns at once
        gate.wait_if_paused();
    }
}
