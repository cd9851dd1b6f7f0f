//! Bring and Walk: moving values between stacks
//!
//! `bring` pops one element from a source stack (per the source's
//! perspective), converts it to the destination's element type and pushes
//! it, all while holding both stack locks. Either everything happens or
//! nothing does: the candidate is only removed from the source once the
//! conversion succeeded and the destination accepted it.
//!
//! Locks are always taken in ascending stack id order, so two brings in
//! opposite directions cannot deadlock.
//!
//! `walk` is the non-consuming sibling: it applies a function to every
//! element of the source in perspective order and pushes the results.

use crate::element::Element;
use crate::error::{ConversionError, StackError};
use crate::fault::{ErrorChannel, Fault, FaultKind};
use crate::stack::Stack;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BringError {
    #[error("source: {0}")]
    Source(StackError),

    #[error("destination: {0}")]
    Destination(StackError),

    #[error("{error}")]
    Conversion {
        error: ConversionError,
        value: Element,
    },
}

impl BringError {
    /// The value that failed to move, if one was selected
    pub fn value(&self) -> Option<&Element> {
        match self {
            BringError::Conversion { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn to_fault(&self, operation: &str) -> Fault {
        match self {
            BringError::Conversion { error, value } => {
                Fault::conversion(operation, error).with_value(value.clone())
            }
            other => Fault::new(FaultKind::Runtime, operation, other.to_string()),
        }
    }
}

/// Move one element; Ok(false) if the source was empty
pub fn bring(source: &Stack, dest: &Stack) -> Result<bool, BringError> {
    transfer(source, dest, None)
}

/// Move one element into a destination under `key` (required when the
/// destination is Keyed)
pub fn bring_keyed(
    source: &Stack,
    dest: &Stack,
    key: impl Into<String>,
) -> Result<bool, BringError> {
    transfer(source, dest, Some(key.into()))
}

fn transfer(source: &Stack, dest: &Stack, key: Option<String>) -> Result<bool, BringError> {
    if source.id() == dest.id() {
        return transfer_within(source, key);
    }

    let (mut src, mut dst) = if source.id() < dest.id() {
        let src = source.lock();
        (src, dest.lock())
    } else {
        let dst = dest.lock();
        (source.lock(), dst)
    };

    if src.is_frozen() {
        return Err(BringError::Source(StackError::Frozen));
    }
    let perspective = src.perspective;
    let Some(candidate) = src.peek_as(perspective) else {
        return Ok(false);
    };
    let converted = candidate
        .convert_to(dest.element_type())
        .map_err(|error| BringError::Conversion {
            error,
            value: candidate.clone(),
        })?;
    dst.check_insert(dest.element_type(), key.as_deref(), converted.element_type())
        .map_err(BringError::Destination)?;

    src.remove_as(perspective);
    dst.insert(key, converted);
    Ok(true)
}

/// Source and destination are the same stack: one lock, no conversion
fn transfer_within(stack: &Stack, key: Option<String>) -> Result<bool, BringError> {
    let mut state = stack.lock();
    if state.is_frozen() {
        return Err(BringError::Source(StackError::Frozen));
    }
    let perspective = state.perspective;
    let Some(candidate) = state.peek_as(perspective) else {
        return Ok(false);
    };
    // removal frees the slot, so a full stack can still rotate
    match state.check_insert(stack.element_type(), key.as_deref(), candidate.element_type()) {
        Ok(()) | Err(StackError::Full { .. }) => {}
        Err(e) => return Err(BringError::Destination(e)),
    }
    if let Some(element) = state.remove_as(perspective) {
        state.insert(key, element);
    }
    Ok(true)
}

/// Apply `f` to every element of `source` in perspective order, converting
/// and pushing each result onto `dest`. The source is left untouched.
///
/// Failures (from `f`, from conversion or from the push) are recorded on
/// `errors` and that element is skipped. Returns how many were pushed.
pub fn walk<F, E>(source: &Stack, dest: &Stack, errors: &ErrorChannel, mut f: F) -> usize
where
    F: FnMut(&Element) -> Result<Element, E>,
    E: fmt::Display,
{
    let mut pushed = 0;
    for element in source.snapshot() {
        let result = match f(&element) {
            Ok(r) => r,
            Err(e) => {
                let fault = Fault::new(FaultKind::Runtime, "walk", e.to_string());
                errors.push(fault.with_value(element));
                continue;
            }
        };
        let converted = match result.convert_to(dest.element_type()) {
            Ok(c) => c,
            Err(e) => {
                errors.push(Fault::conversion("walk", &e).with_value(result));
                continue;
            }
        };
        match dest.push(converted) {
            Ok(()) => pushed += 1,
            Err(e) => errors.push(Fault::runtime("walk", &e).with_value(element)),
        }
    }
    tracing::trace!(source = source.id(), dest = dest.id(), pushed, "walk complete");
    pushed
}
