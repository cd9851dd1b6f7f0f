//! Runtime error handling
//!
//! Ordinary failures never surface as Rust errors here: they become `Fault`s
//! on the context's Error Channel. The only error a checked operation
//! returns is `Unacknowledged`, which means the context touched a stack while
//! a fault was pending and is now aborted. Task bodies propagate it with `?`.

use thiserror::Error;
use ual_core::Fault;

#[derive(Debug, Clone, Error)]
#[error("context '{context}' aborted at {operation}: unacknowledged {fault}")]
pub struct Unacknowledged {
    pub context: String,
    /// The operation that found the pending fault
    pub operation: String,
    /// The fault that was pending (most recent on the channel)
    pub fault: Fault,
}

/// Format a panic payload into an error message
pub fn format_panic_payload(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
