//! Select: wait on several stacks at once
//!
//! ```ignore
//! let outcome = ctx.select(
//!     Select::new()
//!         .on(&jobs, |ctx, job| ctx.push(&done, job))
//!         .on_with_timeout(&control, Duration::from_millis(500),
//!             |ctx, cmd| handle(ctx, cmd),
//!             |_| Ok(TimeoutAction::Retry))
//!         .default(|_| Ok(())),
//! )?;
//! ```
//!
//! ## Semantics
//!
//! Cases are swept in declaration order; the first stack with an element
//! gives it up (atomically, via a non-blocking take) and exactly that case's
//! handler runs.
//!
//! - With a default: one sweep only. Nothing ready means the default runs.
//! - Without: the select parks until a case stack receives a push or is
//!   closed. If every case stack is closed (or frozen) and empty the select
//!   returns `Selected::Closed` instead of waiting forever.
//! - Per-case timeouts: each case with a timeout has a wait window. When it
//!   runs out before anything was selected, its timeout handler decides:
//!   `Done` ends the select, `Retry` opens a fresh window for that case,
//!   `Restart` opens fresh windows for all cases and sweeps again.
//!
//! ## Design
//!
//! Waiting uses one `Signal` registered as a watcher on every case stack
//! before the first sweep, so a push that lands between the sweep and the
//! park is latched rather than lost. The watchers are removed on every exit
//! path by a drop guard.

use crate::context::Context;
use crate::error::Unacknowledged;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use ual_core::{Element, Signal, Stack, Taken};

type CaseHandler<'a> = Box<dyn FnMut(&Context, Element) -> Result<(), Unacknowledged> + 'a>;
type TimeoutHandler<'a> = Box<dyn FnMut(&Context) -> Result<TimeoutAction, Unacknowledged> + 'a>;
type DefaultHandler<'a> = Box<dyn FnOnce(&Context) -> Result<(), Unacknowledged> + 'a>;

/// What a timeout handler wants next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutAction {
    Done,
    Retry,
    Restart,
}

/// How a select finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selected {
    /// Index of the case whose handler ran
    Case(usize),
    Default,
    /// Index of the case whose timeout handler returned Done
    TimedOut(usize),
    /// Every case stack is closed and drained
    Closed,
}

struct Case<'a> {
    stack: &'a Stack,
    handler: CaseHandler<'a>,
    timeout: Option<(Duration, TimeoutHandler<'a>)>,
}

pub struct Select<'a> {
    cases: Vec<Case<'a>>,
    default: Option<DefaultHandler<'a>>,
}

impl fmt::Debug for Select<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Select")
            .field("cases", &self.cases.len())
            .field("default", &self.default.is_some())
            .finish()
    }
}

impl<'a> Select<'a> {
    // no Default impl: `default` is the builder for the default case
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            cases: Vec::new(),
            default: None,
        }
    }

    pub fn on<H>(mut self, stack: &'a Stack, handler: H) -> Self
    where
        H: FnMut(&Context, Element) -> Result<(), Unacknowledged> + 'a,
    {
        self.cases.push(Case {
            stack,
            handler: Box::new(handler),
            timeout: None,
        });
        self
    }

    pub fn on_with_timeout<H, T>(
        mut self,
        stack: &'a Stack,
        timeout: Duration,
        handler: H,
        on_timeout: T,
    ) -> Self
    where
        H: FnMut(&Context, Element) -> Result<(), Unacknowledged> + 'a,
        T: FnMut(&Context) -> Result<TimeoutAction, Unacknowledged> + 'a,
    {
        self.cases.push(Case {
            stack,
            handler: Box::new(handler),
            timeout: Some((timeout, Box::new(on_timeout))),
        });
        self
    }

    pub fn default<D>(mut self, handler: D) -> Self
    where
        D: FnOnce(&Context) -> Result<(), Unacknowledged> + 'a,
    {
        self.default = Some(Box::new(handler));
        self
    }

    pub(crate) fn run(mut self, ctx: &Context) -> Result<Selected, Unacknowledged> {
        if let Some(default) = self.default.take() {
            if let Some(selected) = self.sweep(ctx)?.taken {
                return Ok(selected);
            }
            default(ctx)?;
            return Ok(Selected::Default);
        }

        let signal = Arc::new(Signal::new());
        let _watch = WatchGuard::new(&self.cases, Arc::clone(&signal));
        let mut windows = self.fresh_windows();

        loop {
            ctx.pause_gate().wait_if_paused();
            let sweep = self.sweep(ctx)?;
            if let Some(selected) = sweep.taken {
                return Ok(selected);
            }
            if sweep.exhausted == self.cases.len() {
                tracing::trace!(context = %ctx.name(), "select: all cases closed");
                return Ok(Selected::Closed);
            }

            let now = Instant::now();
            let mut restart = false;
            for i in 0..self.cases.len() {
                let expired = windows[i].is_some_and(|deadline| now >= deadline);
                if !expired {
                    continue;
                }
                let Some((window, on_timeout)) = self.cases[i].timeout.as_mut() else {
                    continue;
                };
                let window = *window;
                match on_timeout(ctx)? {
                    TimeoutAction::Done => return Ok(Selected::TimedOut(i)),
                    TimeoutAction::Retry => windows[i] = Instant::now().checked_add(window),
                    TimeoutAction::Restart => {
                        restart = true;
                        break;
                    }
                }
            }
            if restart {
                windows = self.fresh_windows();
                continue;
            }

            let next_deadline = windows.iter().flatten().min().copied();
            signal.wait_until(next_deadline);
        }
    }

    /// Deadline per case; None for cases without a timeout or with one too
    /// large to represent
    fn fresh_windows(&self) -> Vec<Option<Instant>> {
        let now = Instant::now();
        self.cases
            .iter()
            .map(|c| c.timeout.as_ref().and_then(|(d, _)| now.checked_add(*d)))
            .collect()
    }

    /// One pass over the cases in declaration order
    fn sweep(&mut self, ctx: &Context) -> Result<Sweep, Unacknowledged> {
        let mut exhausted = 0;
        for (i, case) in self.cases.iter_mut().enumerate() {
            match case.stack.try_take() {
                Ok(Taken::Value(element)) => {
                    (case.handler)(ctx, element)?;
                    return Ok(Sweep {
                        taken: Some(Selected::Case(i)),
                        exhausted,
                    });
                }
                Ok(Taken::Timeout) => {}
                // closed and drained, or frozen: nothing will ever arrive
                Ok(Taken::Closed) | Err(_) => exhausted += 1,
            }
        }
        Ok(Sweep {
            taken: None,
            exhausted,
        })
    }
}

struct Sweep {
    taken: Option<Selected>,
    exhausted: usize,
}

struct WatchGuard<'a> {
    stacks: Vec<&'a Stack>,
    signal: Arc<Signal>,
}

impl<'a> WatchGuard<'a> {
    fn new(cases: &[Case<'a>], signal: Arc<Signal>) -> Self {
        let stacks: Vec<&'a Stack> = cases.iter().map(|c| c.stack).collect();
        for stack in &stacks {
            stack.watch(&signal);
        }
        Self { stacks, signal }
    }
}

impl Drop for WatchGuard<'_> {
    fn drop(&mut self) {
        for stack in &self.stacks {
            stack.unwatch(&self.signal);
        }
    }
}
