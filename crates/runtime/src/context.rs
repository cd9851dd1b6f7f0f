//! Execution context with forced error acknowledgment
//!
//! A Context is what a task body (or the host) holds while it works: its
//! private operational stacks, its Error Channel, its named-stack registry
//! and a handle to the Scheduler.
//!
//! ## Forced acknowledgment
//!
//! Stack operations issued through a Context never return stack errors.
//! Failures become `Fault`s on the context's Error Channel, and every checked
//! operation first looks at that channel:
//!
//! ```text
//! channel empty      -> the operation runs
//! channel non-empty  -> Err(Unacknowledged), context aborted for good
//! ```
//!
//! A program therefore has to `consider`, `clear_errors` or `drain_errors`
//! after anything that may have failed before it touches a stack again.
//! The acknowledgment methods themselves are never checked.
//!
//! ## Faults of launched tasks
//!
//! A failed task never touches its launcher's channel on its own. Its
//! summary waits on the Scheduler's task-fault channel, and the launcher
//! keeps running unaffected until it calls `absorb_task_faults` (or
//! `absorb`). Absorbing is opt-in: a launcher that never absorbs never sees
//! those faults, except through `Scheduler::task_faults` and diagnostics.

use crate::error::Unacknowledged;
use crate::registry::Registry;
use crate::scheduler::Scheduler;
use crate::select::{Select, Selected};
use crate::task::{PauseGate, TaskTicket};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use ual_core::{
    Element, ElementType, ErrorChannel, Fault, FaultKind, Perspective, Stack, StackError, Taken,
    View,
};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

pub struct Context {
    id: u64,
    name: String,
    general: Arc<Stack>,
    returns: Arc<Stack>,
    booleans: Arc<Stack>,
    errors: ErrorChannel,
    registry: Registry,
    pause: Arc<PauseGate>,
    scheduler: Scheduler,
    aborted: OnceLock<Unacknowledged>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("errors", &self.errors.len())
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

impl Context {
    pub(crate) fn new(
        name: String,
        registry: Registry,
        pause: Arc<PauseGate>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            name,
            general: Arc::new(Stack::new(Perspective::Lifo, ElementType::Int64)),
            returns: Arc::new(Stack::new(Perspective::Lifo, ElementType::Int64)),
            booleans: Arc::new(Stack::new(Perspective::Lifo, ElementType::Bool)),
            errors: ErrorChannel::new(),
            registry,
            pause,
            scheduler,
            aborted: OnceLock::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Private general-purpose Int64 stack
    pub fn general(&self) -> &Arc<Stack> {
        &self.general
    }

    /// Private return-address Int64 stack
    pub fn returns(&self) -> &Arc<Stack> {
        &self.returns
    }

    /// Private Bool stack for conditions
    pub fn booleans(&self) -> &Arc<Stack> {
        &self.booleans
    }

    pub fn errors(&self) -> &ErrorChannel {
        &self.errors
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.get().is_some()
    }

    /// Why the context aborted, if it did
    pub fn abort_reason(&self) -> Option<&Unacknowledged> {
        self.aborted.get()
    }

    // =========================================================================
    // Enforcement
    // =========================================================================

    /// Gate in front of every checked operation; also a pause point
    fn check(&self, operation: &str) -> Result<(), Unacknowledged> {
        if let Some(err) = self.aborted.get() {
            return Err(err.clone());
        }
        if let Some(fault) = self.errors.peek() {
            let err = Unacknowledged {
                context: self.name.clone(),
                operation: operation.to_string(),
                fault,
            };
            tracing::error!(
                context = %self.name,
                operation,
                pending = self.errors.len(),
                "{}",
                err
            );
            let _ = self.aborted.set(err.clone());
            return Err(err);
        }
        self.pause.wait_if_paused();
        Ok(())
    }

    fn record(&self, fault: Fault) {
        tracing::debug!(context = %self.name, %fault, "fault recorded");
        self.errors.push(fault);
    }

    fn settle<T>(&self, operation: &str, result: Result<T, StackError>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.record(Fault::runtime(operation, &e));
                None
            }
        }
    }

    /// An explicit yield point: checks the channel and parks while paused
    pub fn checkpoint(&self) -> Result<(), Unacknowledged> {
        self.check("checkpoint")
    }

    // =========================================================================
    // Acknowledgment (never checked)
    // =========================================================================

    /// Pop the most recent fault
    pub fn consider(&self) -> Option<Fault> {
        self.errors.pop()
    }

    pub fn clear_errors(&self) {
        self.errors.clear();
    }

    /// Every pending fault, most recent first
    pub fn drain_errors(&self) -> Vec<Fault> {
        self.errors.drain()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Push a program-raised fault
    pub fn raise(&self, message: impl Into<String>) {
        self.record(Fault::new(FaultKind::Raised, "raise", message));
    }

    /// Move every fault from `channel` onto this context's channel, keeping
    /// their order. Returns how many moved.
    pub fn absorb(&self, channel: &ErrorChannel) -> usize {
        let faults = channel.drain();
        let n = faults.len();
        for fault in faults.into_iter().rev() {
            self.errors.push(fault);
        }
        n
    }

    /// Take over faults left behind by finished tasks. Once absorbed they
    /// block this context like any other pending fault.
    pub fn absorb_task_faults(&self) -> usize {
        self.absorb(self.scheduler.task_faults())
    }

    // =========================================================================
    // Named stacks
    // =========================================================================

    pub fn declare(
        &self,
        name: &str,
        perspective: Perspective,
        element_type: ElementType,
    ) -> Result<Arc<Stack>, Unacknowledged> {
        self.check("declare")?;
        let stack = self.registry.declare(name, perspective, element_type);
        if stack.element_type() != element_type {
            let mismatch = StackError::TypeMismatch {
                expected: element_type,
                found: stack.element_type(),
            };
            self.record(Fault::runtime("declare", &mismatch));
        }
        Ok(stack)
    }

    /// Make an existing stack visible under `name`
    pub fn share(&self, name: &str, stack: Arc<Stack>) -> Result<(), Unacknowledged> {
        self.check("share")?;
        self.registry.insert(name, stack);
        Ok(())
    }

    pub fn stack(&self, name: &str) -> Result<Option<Arc<Stack>>, Unacknowledged> {
        self.check("stack")?;
        Ok(self.registry.get(name))
    }

    // =========================================================================
    // Stack operations
    // =========================================================================

    pub fn push(&self, stack: &Stack, value: impl Into<Element>) -> Result<(), Unacknowledged> {
        self.check("push")?;
        self.settle("push", stack.push(value));
        Ok(())
    }

    pub fn push_keyed(
        &self,
        stack: &Stack,
        key: impl Into<String>,
        value: impl Into<Element>,
    ) -> Result<(), Unacknowledged> {
        self.check("push_keyed")?;
        self.settle("push_keyed", stack.push_keyed(key, value));
        Ok(())
    }

    pub fn pop(&self, stack: &Stack) -> Result<Option<Element>, Unacknowledged> {
        self.check("pop")?;
        Ok(self.settle("pop", stack.pop()).flatten())
    }

    pub fn peek(&self, stack: &Stack) -> Result<Option<Element>, Unacknowledged> {
        self.check("peek")?;
        Ok(stack.peek())
    }

    /// Blocking take. A stack that refuses takes (frozen) records a fault and
    /// reads as `Taken::Closed`.
    pub fn take(&self, stack: &Stack, timeout: Option<Duration>) -> Result<Taken, Unacknowledged> {
        self.check("take")?;
        Ok(self.settle("take", stack.take(timeout)).unwrap_or(Taken::Closed))
    }

    pub fn len(&self, stack: &Stack) -> Result<usize, Unacknowledged> {
        self.check("len")?;
        Ok(stack.len())
    }

    pub fn get(&self, stack: &Stack, index: usize) -> Result<Option<Element>, Unacknowledged> {
        self.check("get")?;
        Ok(stack.get(index))
    }

    pub fn set(
        &self,
        stack: &Stack,
        index: usize,
        value: impl Into<Element>,
    ) -> Result<(), Unacknowledged> {
        self.check("set")?;
        self.settle("set", stack.set(index, value));
        Ok(())
    }

    pub fn peek_key(&self, stack: &Stack, key: &str) -> Result<Option<Element>, Unacknowledged> {
        self.check("peek_key")?;
        Ok(stack.peek_key(key))
    }

    pub fn pop_key(&self, stack: &Stack, key: &str) -> Result<Option<Element>, Unacknowledged> {
        self.check("pop_key")?;
        Ok(self.settle("pop_key", stack.pop_key(key)).flatten())
    }

    pub fn set_perspective(
        &self,
        stack: &Stack,
        perspective: Perspective,
    ) -> Result<(), Unacknowledged> {
        self.check("set_perspective")?;
        stack.set_perspective(perspective);
        Ok(())
    }

    pub fn close(&self, stack: &Stack) -> Result<(), Unacknowledged> {
        self.check("close")?;
        stack.close();
        Ok(())
    }

    pub fn freeze(&self, stack: &Stack) -> Result<(), Unacknowledged> {
        self.check("freeze")?;
        stack.freeze();
        Ok(())
    }

    pub fn clear(&self, stack: &Stack) -> Result<(), Unacknowledged> {
        self.check("clear")?;
        self.settle("clear", stack.clear());
        Ok(())
    }

    /// Converting transfer; Ok(false) when nothing moved (empty source or a
    /// recorded fault)
    pub fn bring(&self, source: &Stack, dest: &Stack) -> Result<bool, Unacknowledged> {
        self.check("bring")?;
        Ok(self.settle_bring("bring", ual_core::bring(source, dest)))
    }

    pub fn bring_keyed(
        &self,
        source: &Stack,
        dest: &Stack,
        key: impl Into<String>,
    ) -> Result<bool, Unacknowledged> {
        self.check("bring_keyed")?;
        Ok(self.settle_bring("bring_keyed", ual_core::bring_keyed(source, dest, key)))
    }

    fn settle_bring(&self, operation: &str, result: Result<bool, ual_core::BringError>) -> bool {
        match result {
            Ok(moved) => moved,
            Err(e) => {
                self.record(e.to_fault(operation));
                false
            }
        }
    }

    /// Non-consuming traversal; per-element failures land on this context's
    /// channel. Returns how many results were pushed.
    pub fn walk<F, E>(&self, source: &Stack, dest: &Stack, f: F) -> Result<usize, Unacknowledged>
    where
        F: FnMut(&Element) -> Result<Element, E>,
        E: fmt::Display,
    {
        self.check("walk")?;
        Ok(ual_core::walk(source, dest, &self.errors, f))
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub fn view_push(&self, view: &View, value: impl Into<Element>) -> Result<(), Unacknowledged> {
        self.check("view_push")?;
        self.settle("view_push", view.push(value));
        Ok(())
    }

    pub fn view_pop(&self, view: &View) -> Result<Option<Element>, Unacknowledged> {
        self.check("view_pop")?;
        Ok(self.settle("view_pop", view.pop()).flatten())
    }

    pub fn view_peek(&self, view: &View) -> Result<Option<Element>, Unacknowledged> {
        self.check("view_peek")?;
        Ok(view.peek())
    }

    pub fn view_take(
        &self,
        view: &View,
        timeout: Option<Duration>,
    ) -> Result<Taken, Unacknowledged> {
        self.check("view_take")?;
        Ok(self.settle("view_take", view.take(timeout)).unwrap_or(Taken::Closed))
    }

    // =========================================================================
    // Select and tasks
    // =========================================================================

    pub fn select(&self, select: Select<'_>) -> Result<Selected, Unacknowledged> {
        self.check("select")?;
        select.run(self)
    }

    /// Queue a task body on the scheduler's Task Stack
    pub fn spawn<F>(&self, body: F) -> Result<TaskTicket, Unacknowledged>
    where
        F: FnOnce(&Context) -> Result<(), Unacknowledged> + Send + 'static,
    {
        self.check("spawn")?;
        Ok(self.scheduler.enqueue(body))
    }

    /// Launch the most recently queued task; None if the Task Stack is empty
    pub fn launch(&self) -> Result<Option<TaskTicket>, Unacknowledged> {
        self.check("launch")?;
        Ok(self.scheduler.launch(self))
    }

    pub fn launch_all(&self) -> Result<Vec<TaskTicket>, Unacknowledged> {
        self.check("launch_all")?;
        Ok(self.scheduler.launch_all(self))
    }

    pub(crate) fn pause_gate(&self) -> &PauseGate {
        &self.pause
    }
}
