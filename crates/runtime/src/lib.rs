//! ual runtime: tasks, select and forced acknowledgment over ual-core stacks
//!
//! Key design principles:
//! - Context: every stack operation goes through one, and none runs while a
//!   fault is pending on its Error Channel
//! - Scheduler: LIFO Task Stack, tasks run as May coroutines
//! - Select: wait on several stacks, with per-case timeouts or a default
//!
//! # Modules
//!
//! - `config`: environment-driven runtime configuration
//! - `logging`: tracing subscriber setup
//! - `error`: Unacknowledged and panic payload formatting
//! - `registry`: named stacks visible to a context
//! - `context`: checked stack operations and acknowledgment
//! - `task`: task tickets, states and the pause gate
//! - `scheduler`: Task Stack, launch, lifecycle counters, wait_all
//! - `select`: the select multiplexer
//! - `diagnostics`: SIGQUIT stats dump (feature `diagnostics`)

pub mod config;
pub mod context;
#[cfg(feature = "diagnostics")]
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod registry;
pub mod scheduler;
pub mod select;
pub mod task;

pub use config::RuntimeConfig;
pub use context::Context;
pub use error::Unacknowledged;
pub use registry::Registry;
pub use scheduler::{Scheduler, SchedulerStats};
pub use select::{Select, Selected, TimeoutAction};
pub use task::{PauseGate, TaskState, TaskTicket};

// The container layer, so hosts need only one dependency
pub use ual_core::{
    BringError, Element, ElementType, ErrorChannel, Fault, FaultKind, Perspective, RawView,
    Signal, Stack, StackError, StealPool, StealViews, Taken, View,
};
