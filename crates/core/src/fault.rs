//! Faults and the Error Channel
//!
//! A `Fault` records a failure that the program must acknowledge before it
//! may touch any stack again. Faults accumulate on an `ErrorChannel`, a LIFO
//! stack: `consider` sees the most recent one first.
//!
//! The channel itself never blocks anything; enforcement of acknowledgment
//! lives in the runtime's execution context, which checks `is_empty` in
//! front of every stack operation.

use crate::element::Element;
use crate::error::{ConversionError, StackError};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A value could not be converted between element types
    Conversion,
    /// A stack operation could not proceed
    Runtime,
    /// A launched task ended with unacknowledged faults or panicked
    Task,
    /// Raised explicitly by program code
    Raised,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FaultKind::Conversion => "conversion",
            FaultKind::Runtime => "runtime",
            FaultKind::Task => "task",
            FaultKind::Raised => "raised",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub kind: FaultKind,
    /// Name of the operation that failed ("bring", "push", ...)
    pub operation: String,
    pub message: String,
    /// The offending value, when there was one
    pub value: Option<Element>,
}

impl Fault {
    pub fn new(kind: FaultKind, operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation: operation.into(),
            message: message.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: Element) -> Self {
        self.value = Some(value);
        self
    }

    pub fn conversion(operation: impl Into<String>, err: &ConversionError) -> Self {
        Self::new(FaultKind::Conversion, operation, err.to_string())
    }

    pub fn runtime(operation: impl Into<String>, err: &StackError) -> Self {
        Self::new(FaultKind::Runtime, operation, err.to_string())
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fault in {}: {}", self.kind, self.operation, self.message)?;
        if let Some(value) = &self.value {
            write!(f, " (value {})", value)?;
        }
        Ok(())
    }
}

/// LIFO stack of faults
#[derive(Debug, Default)]
pub struct ErrorChannel {
    faults: Mutex<Vec<Fault>>,
}

impl ErrorChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Fault>> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, fault: Fault) {
        self.lock().push(fault);
    }

    /// Pop the most recent fault
    pub fn pop(&self) -> Option<Fault> {
        self.lock().pop()
    }

    pub fn peek(&self) -> Option<Fault> {
        self.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Remove every fault, most recent first
    pub fn drain(&self) -> Vec<Fault> {
        let mut faults = std::mem::take(&mut *self.lock());
        faults.reverse();
        faults
    }
}
