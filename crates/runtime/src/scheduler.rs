//! Scheduler - Task Management with May
//!
//! Tasks are queued on a LIFO Task Stack and started with `launch`, which
//! pops the most recent one and runs it as a May coroutine. Each launched
//! task gets a fresh Context: private operational stacks, an empty Error
//! Channel, and a copy of the launcher's named-stack registry (shared
//! handles, own name table).
//!
//! ## Non-Blocking Guarantee
//!
//! `take` and `select` park through May's primitives, so a blocked task
//! never blocks an OS worker thread.
//!
//! ## Task failure
//!
//! A task body that returns `Unacknowledged`, panics, or ends with faults
//! still on its channel does not vanish silently: the scheduler summarizes
//! it as a `FaultKind::Task` fault on its shared task-fault channel. They
//! stay there until a launcher calls `Context::absorb_task_faults`; nothing
//! moves them into a context automatically.

use crate::config::RuntimeConfig;
use crate::context::Context;
use crate::error::{Unacknowledged, format_panic_payload};
use crate::registry::Registry;
use crate::task::{Task, TaskShared, TaskState, TaskTicket};
use may::coroutine;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use ual_core::{ErrorChannel, Fault, FaultKind};

// Task lifecycle tracking
//
// - active: lock-free counter on the hot path (launch/complete)
// - shutdown_mutex/condvar: cold path only, for wait_all. The last task to
//   finish notifies while holding the mutex so the wakeup cannot be missed.
// - spawned/completed/peak: diagnostics; SPAWNED = COMPLETED + ACTIVE at rest
struct Inner {
    tasks: Mutex<Vec<Task>>,
    next_task_id: AtomicU64,
    active: AtomicUsize,
    spawned: AtomicU64,
    completed: AtomicU64,
    peak: AtomicUsize,
    shutdown_mutex: Mutex<()>,
    shutdown_condvar: Condvar,
    task_faults: ErrorChannel,
    started: Instant,
}

/// Snapshot of scheduler counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub spawned: u64,
    pub completed: u64,
    pub active: usize,
    pub peak: usize,
    /// Tasks still queued on the Task Stack
    pub pending: usize,
    pub uptime: Duration,
}

/// Cheap to clone; clones share the Task Stack and counters
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Scheduler configured from the environment
    pub fn new() -> Self {
        Self::with_config(&RuntimeConfig::from_env())
    }

    /// May settings in `config` only apply if no scheduler configured them
    /// earlier in this process
    pub fn with_config(config: &RuntimeConfig) -> Self {
        config.apply();
        Self {
            inner: Arc::new(Inner {
                tasks: Mutex::new(Vec::new()),
                next_task_id: AtomicU64::new(1),
                active: AtomicUsize::new(0),
                spawned: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                peak: AtomicUsize::new(0),
                shutdown_mutex: Mutex::new(()),
                shutdown_condvar: Condvar::new(),
                task_faults: ErrorChannel::new(),
                started: Instant::now(),
            }),
        }
    }

    /// A root context for the host, with an empty registry
    pub fn context(&self, name: impl Into<String>) -> Context {
        Context::new(
            name.into(),
            Registry::new(),
            Arc::default(),
            self.clone(),
        )
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<Task>> {
        self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push a task onto the Task Stack
    pub fn enqueue<F>(&self, body: F) -> TaskTicket
    where
        F: FnOnce(&Context) -> Result<(), Unacknowledged> + Send + 'static,
    {
        let id = self.inner.next_task_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(TaskShared::new(id));
        self.tasks().push(Task {
            shared: Arc::clone(&shared),
            body: Box::new(body),
        });
        tracing::trace!(task = id, "task queued");
        TaskTicket { shared }
    }

    /// Queued tasks not yet launched
    pub fn pending(&self) -> usize {
        self.tasks().len()
    }

    /// Drop every queued task; returns how many were discarded
    pub fn clear(&self) -> usize {
        let dropped: Vec<Task> = std::mem::take(&mut *self.tasks());
        for task in &dropped {
            task.shared.set_state(TaskState::Completed);
        }
        dropped.len()
    }

    /// Launch the most recently queued task as a coroutine
    pub fn launch(&self, parent: &Context) -> Option<TaskTicket> {
        let task = self.tasks().pop()?;
        let id = task.shared.id;
        let ticket = TaskTicket {
            shared: Arc::clone(&task.shared),
        };
        let ctx = Context::new(
            format!("{}/task-{}", parent.name(), id),
            parent.registry().snapshot(),
            Arc::clone(&task.shared.pause),
            self.clone(),
        );

        self.inner.spawned.fetch_add(1, Ordering::Relaxed);
        let new_count = self.inner.active.fetch_add(1, Ordering::AcqRel) + 1;

        // Update peak with CAS loop (lock-free high-water mark tracking)
        let mut peak = self.inner.peak.load(Ordering::Acquire);
        while new_count > peak {
            match self.inner.peak.compare_exchange_weak(
                peak,
                new_count,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => peak = current,
            }
        }

        task.shared.set_state(TaskState::Running);
        tracing::debug!(task = id, parent = %parent.name(), "task launched");

        let inner = Arc::clone(&self.inner);
        // The coroutine owns everything it touches; nothing borrowed from
        // the launcher's stack frame crosses into it.
        unsafe {
            coroutine::spawn(move || run_task(&inner, task, ctx));
        }
        Some(ticket)
    }

    /// Launch queued tasks until the Task Stack is empty
    pub fn launch_all(&self, parent: &Context) -> Vec<TaskTicket> {
        std::iter::from_fn(|| self.launch(parent)).collect()
    }

    /// Block until every launched task has completed
    ///
    /// Uses event-driven synchronization via condition variable - no polling.
    pub fn wait_all(&self) {
        let mut guard = self
            .inner
            .shutdown_mutex
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while self.inner.active.load(Ordering::Acquire) > 0 {
            guard = self
                .inner
                .shutdown_condvar
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// `wait_all` with a limit; false if tasks were still running at the end
    pub fn wait_all_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait_all();
            return true;
        };
        let mut guard = self
            .inner
            .shutdown_mutex
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while self.inner.active.load(Ordering::Acquire) > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self
                .inner
                .shutdown_condvar
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Faults summarizing failed tasks, waiting to be absorbed
    pub fn task_faults(&self) -> &ErrorChannel {
        &self.inner.task_faults
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            spawned: self.inner.spawned.load(Ordering::Relaxed),
            completed: self.inner.completed.load(Ordering::Relaxed),
            active: self.inner.active.load(Ordering::Relaxed),
            peak: self.inner.peak.load(Ordering::Relaxed),
            pending: self.pending(),
            uptime: self.inner.started.elapsed(),
        }
    }
}

fn run_task(inner: &Inner, task: Task, ctx: Context) {
    let id = task.shared.id;
    let body = task.body;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&ctx)));

    let summary = match outcome {
        Ok(Ok(())) if ctx.errors().is_empty() => None,
        Ok(Ok(())) => {
            let pending = ctx.errors().len();
            let latest = ctx.errors().peek().map(|f| f.to_string()).unwrap_or_default();
            Some(format!(
                "task {} ended with {} unacknowledged fault(s); most recent: {}",
                id, pending, latest
            ))
        }
        Ok(Err(unack)) => Some(format!("task {} aborted: {}", id, unack)),
        Err(payload) => Some(format!(
            "task {} panicked: {}",
            id,
            format_panic_payload(&payload)
        )),
    };
    if let Some(message) = summary {
        tracing::warn!(task = id, "{}", message);
        inner
            .task_faults
            .push(Fault::new(FaultKind::Task, "task", message));
    }

    task.shared.set_state(TaskState::Completed);
    tracing::debug!(task = id, "task completed");

    // Decrement active first, then count completion, so that
    // SPAWNED = COMPLETED + ACTIVE never overcounts from outside
    let prev_count = inner.active.fetch_sub(1, Ordering::AcqRel);
    inner.completed.fetch_add(1, Ordering::Release);
    if prev_count == 1 {
        // Last task: hold the mutex while notifying to prevent missed wakeups
        let _guard = inner
            .shutdown_mutex
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        inner.shutdown_condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use ual_core::{Element, ElementType, Perspective};

    #[test]
    fn test_launch_runs_task() {
        let sched = Scheduler::new();
        let ctx = sched.context("main");
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let ticket = sched.enqueue(|_| {
            COUNTER.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(ticket.state(), TaskState::Queued);
        assert!(sched.launch(&ctx).is_some());
        sched.wait_all();
        assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
        assert!(ticket.is_completed());
    }

    #[test]
    fn test_task_stack_is_lifo() {
        let sched = Scheduler::new();
        let ctx = sched.context("main");
        let first = sched.enqueue(|_| Ok(()));
        let second = sched.enqueue(|_| Ok(()));
        assert_eq!(sched.pending(), 2);

        let launched = sched.launch(&ctx).unwrap();
        assert_eq!(launched.id(), second.id());
        assert_eq!(first.state(), TaskState::Queued);
        sched.launch_all(&ctx);
        sched.wait_all();
        assert!(sched.launch(&ctx).is_none());
    }

    #[test]
    fn test_clear_discards_queued() {
        let sched = Scheduler::new();
        let ticket = sched.enqueue(|_| Ok(()));
        sched.enqueue(|_| Ok(()));
        assert_eq!(sched.clear(), 2);
        assert_eq!(sched.pending(), 0);
        assert!(ticket.is_completed());
    }

    #[test]
    fn test_wait_all_with_no_tasks_returns() {
        let sched = Scheduler::new();
        sched.wait_all();
        assert!(sched.wait_all_timeout(Duration::from_millis(10)));
        assert!(sched.wait_all_timeout(Duration::MAX));
    }

    #[test]
    fn test_lifecycle_counters() {
        let sched = Scheduler::new();
        let ctx = sched.context("main");
        for _ in 0..50 {
            sched.enqueue(|_| Ok(()));
        }
        let launched = sched.launch_all(&ctx).len();
        sched.wait_all();
        let stats = sched.stats();
        assert_eq!(launched, 50);
        assert_eq!(stats.spawned, 50);
        assert_eq!(stats.completed, 50);
        assert_eq!(stats.active, 0);
        assert!(stats.peak >= 1);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn test_child_gets_fresh_operational_stacks_and_shared_named() {
        let sched = Scheduler::new();
        let ctx = sched.context("main");
        let results = ctx
            .declare("results", Perspective::Fifo, ElementType::Int64)
            .unwrap();
        ctx.push(ctx.general(), 99).unwrap();

        sched.enqueue(|child| {
            let general_len = child.len(child.general())?;
            let results = child.stack("results")?.expect("shared stack");
            child.push(&results, general_len as i64)?;
            Ok(())
        });
        ctx.launch().unwrap();
        sched.wait_all();
        assert_eq!(results.pop().unwrap(), Some(Element::Int64(0)));
        assert_eq!(ctx.len(ctx.general()).unwrap(), 1);
    }

    #[test]
    fn test_panicking_task_reports_fault() {
        let sched = Scheduler::new();
        let ctx = sched.context("main");
        sched.enqueue(|_| panic!("task blew up"));
        ctx.launch().unwrap();
        sched.wait_all();

        let fault = sched.task_faults().pop().unwrap();
        assert_eq!(fault.kind, FaultKind::Task);
        assert!(fault.message.contains("task blew up"), "{}", fault.message);
        assert_eq!(sched.stats().completed, 1);
    }

    #[test]
    fn test_task_with_leftover_faults_reports_summary() {
        let sched = Scheduler::new();
        let ctx = sched.context("main");
        sched.enqueue(|child| {
            child.raise("left behind");
            Ok(())
        });
        ctx.launch().unwrap();
        sched.wait_all();

        assert_eq!(ctx.absorb_task_faults(), 1);
        let fault = ctx.consider().unwrap();
        assert!(fault.message.contains("left behind"), "{}", fault.message);
    }
}
