//! ual core: perspective-tagged stacks
//!
//! This crate provides the container layer shared by the runtime and by any
//! host that wants typed stacks without the task scheduler.
//!
//! Key design principles:
//! - Element: a typed value (Int64, Float64, Bool, Text, Bytes)
//! - Stack: one element type, one perspective, one lock
//! - Perspective decides access order only; storage stays in append order
//!
//! # Modules
//!
//! - `element`: Element, ElementType and the conversion matrix
//! - `error`: StackError and ConversionError
//! - `fault`: Fault records and the ErrorChannel
//! - `signal`: park/unpark pair on May primitives
//! - `stack`: Stack, Perspective, blocking take, raw views
//! - `view`: per-caller perspectives and work-stealing deques
//! - `bring`: atomic type-converting transfer, and walk

pub mod bring;
pub mod element;
pub mod error;
pub mod fault;
pub mod signal;
pub mod stack;
pub mod view;

pub use bring::{BringError, bring, bring_keyed, walk};
pub use element::{Element, ElementType};
pub use error::{ConversionError, StackError};
pub use fault::{ErrorChannel, Fault, FaultKind};
pub use signal::Signal;
pub use stack::{Perspective, RawView, Stack, Taken};
pub use view::{StealPool, StealViews, View};
