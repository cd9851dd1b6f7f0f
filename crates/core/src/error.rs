//! Error types for stack operations
//!
//! Empty, Timeout and Closed outcomes of retrieval are ordinary return values
//! (`Option`, `Taken`), not errors. The types here cover operations that
//! cannot proceed at all.

use crate::element::ElementType;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    #[error("stack is frozen")]
    Frozen,

    #[error("stack is closed")]
    Closed,

    #[error("stack is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("type mismatch: stack holds {expected}, got {found}")]
    TypeMismatch {
        expected: ElementType,
        found: ElementType,
    },

    #[error("keyed stack requires a key")]
    KeyRequired,

    #[error("index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// A value could not be represented in the requested element type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert {from} to {to}: {reason}")]
pub struct ConversionError {
    pub from: ElementType,
    pub to: ElementType,
    pub reason: String,
}

impl ConversionError {
    pub fn new(from: ElementType, to: ElementType, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_error_messages() {
        assert_eq!(
            StackError::TypeMismatch {
                expected: ElementType::Int64,
                found: ElementType::Text,
            }
            .to_string(),
            "type mismatch: stack holds int64, got text"
        );
        assert_eq!(
            StackError::Full { capacity: 3 }.to_string(),
            "stack is full (capacity 3)"
        );
    }

    #[test]
    fn test_conversion_error_message() {
        let err = ConversionError::new(ElementType::Text, ElementType::Int64, "'x' is not an integer");
        assert_eq!(
            err.to_string(),
            "cannot convert text to int64: 'x' is not an integer"
        );
    }
}
