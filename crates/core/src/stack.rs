//! Stack: a typed, perspective-tagged container
//!
//! One Stack can act as a LIFO stack, a FIFO queue, an indexed array or a
//! keyed map. The perspective only decides which end operations work on;
//! storage is always kept in append order, so switching perspective never
//! moves data around (except the compaction described below).
//!
//! ## Storage
//!
//! ```text
//! elements: VecDeque<Element>       append order, front = oldest
//! keys:     VecDeque<Option<String>> parallel to elements
//! index:    HashMap<String, usize>  key -> position of the latest entry with that key
//! ```
//!
//! | Perspective | push          | pop / peek / take           |
//! |-------------|---------------|-----------------------------|
//! | Lifo        | append        | most recent                 |
//! | Fifo        | append        | oldest                      |
//! | Indexed     | append        | most recent; plus get/set   |
//! | Keyed       | key required, | most recent; plus           |
//! |             | overwrites    | peek_key/pop_key            |
//!
//! Leaving Fifo compacts the deque once so raw views see one slice.
//! Entering Keyed gives every unkeyed entry its position as key ("0", "1",
//! ...); when two entries share a key the later one wins.
//!
//! ## Blocking
//!
//! `take` parks the caller when nothing is available. Blocked callers form a
//! queue: only the front waiter may take, and it hands over to the next
//! waiter when elements remain. This serves takers in the order they blocked
//! regardless of the data perspective. Each waiter parks on its own
//! `Signal`, so the stack lock is never held while parked.
//!
//! ## Locking
//!
//! All state sits behind one May mutex, so a coroutine contending for it
//! yields its worker instead of blocking it. Every public operation takes it
//! exactly once. `bring` locks two stacks, always in ascending `id` order.

use crate::element::{Element, ElementType};
use crate::error::StackError;
use crate::signal::Signal;
use may::sync::{Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, Weak};
use std::time::{Duration, Instant};

static NEXT_STACK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Perspective {
    Lifo,
    Fifo,
    Indexed,
    Keyed,
}

impl fmt::Display for Perspective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Perspective::Lifo => "lifo",
            Perspective::Fifo => "fifo",
            Perspective::Indexed => "indexed",
            Perspective::Keyed => "keyed",
        })
    }
}

/// Outcome of a blocking retrieval
#[derive(Debug, Clone, PartialEq)]
pub enum Taken {
    Value(Element),
    Timeout,
    Closed,
}

impl Taken {
    pub fn into_value(self) -> Option<Element> {
        match self {
            Taken::Value(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Taken::Value(_))
    }
}

struct Waiter {
    signal: Signal,
}

pub(crate) struct State {
    pub(crate) perspective: Perspective,
    elements: VecDeque<Element>,
    keys: VecDeque<Option<String>>,
    index: HashMap<String, usize>,
    closed: bool,
    frozen: bool,
    capacity: usize,
    waiters: VecDeque<Arc<Waiter>>,
    watchers: Vec<Weak<Signal>>,
}

impl State {
    fn new(perspective: Perspective, capacity: usize) -> Self {
        Self {
            perspective,
            elements: VecDeque::new(),
            keys: VecDeque::new(),
            index: HashMap::new(),
            closed: false,
            frozen: false,
            capacity,
            waiters: VecDeque::new(),
            watchers: Vec::new(),
        }
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Validate an insert without performing it
    pub(crate) fn check_insert(
        &self,
        element_type: ElementType,
        key: Option<&str>,
        value_type: ElementType,
    ) -> Result<(), StackError> {
        if self.frozen {
            return Err(StackError::Frozen);
        }
        if self.closed {
            return Err(StackError::Closed);
        }
        if value_type != element_type {
            return Err(StackError::TypeMismatch {
                expected: element_type,
                found: value_type,
            });
        }
        let overwrite = match (self.perspective, key) {
            (Perspective::Keyed, None) => return Err(StackError::KeyRequired),
            (Perspective::Keyed, Some(k)) => self.index.contains_key(k),
            _ => false,
        };
        if !overwrite && self.capacity > 0 && self.elements.len() >= self.capacity {
            return Err(StackError::Full {
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Insert an already validated element and wake whoever is waiting
    pub(crate) fn insert(&mut self, key: Option<String>, element: Element) {
        match key {
            Some(k) if self.perspective == Perspective::Keyed => {
                if let Some(&pos) = self.index.get(&k) {
                    self.elements[pos] = element;
                } else {
                    self.index.insert(k.clone(), self.elements.len());
                    self.elements.push_back(element);
                    self.keys.push_back(Some(k));
                }
            }
            key => {
                if let Some(k) = &key {
                    self.index.insert(k.clone(), self.elements.len());
                }
                self.elements.push_back(element);
                self.keys.push_back(key);
            }
        }
        self.notify_front();
        self.notify_watchers();
    }

    /// Remove according to a perspective (a View may differ from the stack's own)
    pub(crate) fn remove_as(&mut self, perspective: Perspective) -> Option<Element> {
        match perspective {
            Perspective::Fifo => {
                let element = self.elements.pop_front()?;
                let key = self.keys.pop_front().flatten();
                if key.is_some() || !self.index.is_empty() {
                    self.reindex();
                }
                Some(element)
            }
            Perspective::Lifo | Perspective::Indexed | Perspective::Keyed => {
                let element = self.elements.pop_back()?;
                if let Some(k) = self.keys.pop_back().flatten() {
                    if self.perspective == Perspective::Keyed {
                        self.index.remove(&k);
                    } else {
                        // an earlier entry may carry the same key
                        self.reindex();
                    }
                }
                Some(element)
            }
        }
    }

    pub(crate) fn peek_as(&self, perspective: Perspective) -> Option<&Element> {
        match perspective {
            Perspective::Fifo => self.elements.front(),
            _ => self.elements.back(),
        }
    }

    /// Storage position `offset` steps from where `perspective` pops
    fn position(&self, perspective: Perspective, offset: usize) -> Option<usize> {
        let len = self.elements.len();
        if offset >= len {
            return None;
        }
        match perspective {
            Perspective::Fifo => Some(offset),
            Perspective::Lifo | Perspective::Indexed | Perspective::Keyed => Some(len - 1 - offset),
        }
    }

    /// Element at `offset` positions from where `perspective` would pop
    pub(crate) fn peek_at(&self, perspective: Perspective, offset: usize) -> Option<&Element> {
        self.elements.get(self.position(perspective, offset)?)
    }

    /// Remove the element at `offset` positions from where `perspective`
    /// would pop
    pub(crate) fn remove_offset(
        &mut self,
        perspective: Perspective,
        offset: usize,
    ) -> Option<Element> {
        let pos = self.position(perspective, offset)?;
        self.remove_at(pos)
    }

    fn remove_at(&mut self, index: usize) -> Option<Element> {
        let element = self.elements.remove(index)?;
        self.keys.remove(index);
        self.reindex();
        Some(element)
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (pos, key) in self.keys.iter().enumerate() {
            if let Some(k) = key {
                self.index.insert(k.clone(), pos);
            }
        }
    }

    /// Give unkeyed entries positional keys and drop shadowed duplicates
    fn build_keyed_index(&mut self) {
        for (pos, key) in self.keys.iter_mut().enumerate() {
            if key.is_none() {
                *key = Some(pos.to_string());
            }
        }
        let mut last: HashMap<String, usize> = HashMap::new();
        for (pos, key) in self.keys.iter().enumerate() {
            if let Some(k) = key {
                last.insert(k.clone(), pos);
            }
        }
        let elements = std::mem::take(&mut self.elements);
        let keys = std::mem::take(&mut self.keys);
        for (pos, (element, key)) in elements.into_iter().zip(keys).enumerate() {
            if key.as_ref().is_some_and(|k| last.get(k) == Some(&pos)) {
                self.elements.push_back(element);
                self.keys.push_back(key);
            }
        }
        self.reindex();
    }

    fn snapshot(&self) -> Vec<Element> {
        match self.perspective {
            Perspective::Lifo => self.elements.iter().rev().cloned().collect(),
            _ => self.elements.iter().cloned().collect(),
        }
    }

    fn notify_front(&self) {
        if let Some(w) = self.waiters.front() {
            w.signal.notify();
        }
    }

    fn notify_all_waiters(&self) {
        for w in &self.waiters {
            w.signal.notify();
        }
    }

    fn notify_watchers(&mut self) {
        self.watchers.retain(|w| match w.upgrade() {
            Some(signal) => {
                signal.notify();
                true
            }
            None => false,
        });
    }

    fn remove_waiter(&mut self, waiter: &Arc<Waiter>) {
        let was_front = self
            .waiters
            .front()
            .is_some_and(|w| Arc::ptr_eq(w, waiter));
        self.waiters.retain(|w| !Arc::ptr_eq(w, waiter));
        if was_front && !self.elements.is_empty() {
            self.notify_front();
        }
    }
}

pub struct Stack {
    id: u64,
    element_type: ElementType,
    state: Mutex<State>,
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Stack")
            .field("id", &self.id)
            .field("element_type", &self.element_type)
            .field("perspective", &state.perspective)
            .field("len", &state.elements.len())
            .field("closed", &state.closed)
            .field("frozen", &state.frozen)
            .finish()
    }
}

impl Stack {
    pub fn new(perspective: Perspective, element_type: ElementType) -> Self {
        Self::with_capacity(perspective, element_type, 0)
    }

    /// A bounded stack; capacity 0 means unlimited
    pub fn with_capacity(
        perspective: Perspective,
        element_type: ElementType,
        capacity: usize,
    ) -> Self {
        Self {
            id: NEXT_STACK_ID.fetch_add(1, Ordering::Relaxed),
            element_type,
            state: Mutex::new(State::new(perspective, capacity)),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Process-unique identity, also the lock order for two-stack operations
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn perspective(&self) -> Perspective {
        self.lock().perspective
    }

    pub fn set_perspective(&self, perspective: Perspective) {
        let mut state = self.lock();
        let previous = state.perspective;
        if previous == perspective {
            return;
        }
        if previous == Perspective::Fifo {
            state.elements.make_contiguous();
            state.keys.make_contiguous();
        }
        state.perspective = perspective;
        if perspective == Perspective::Keyed {
            state.build_keyed_index();
        }
    }

    pub fn push(&self, element: impl Into<Element>) -> Result<(), StackError> {
        let element = element.into();
        let mut state = self.lock();
        state.check_insert(self.element_type, None, element.element_type())?;
        state.insert(None, element);
        Ok(())
    }

    /// Push with a key. On a Keyed stack an existing key is overwritten in
    /// place; on other perspectives the key is kept alongside the element.
    pub fn push_keyed(
        &self,
        key: impl Into<String>,
        element: impl Into<Element>,
    ) -> Result<(), StackError> {
        let key = key.into();
        let element = element.into();
        let mut state = self.lock();
        state.check_insert(self.element_type, Some(&key), element.element_type())?;
        state.insert(Some(key), element);
        Ok(())
    }

    /// Non-blocking removal; Ok(None) when empty
    pub fn pop(&self) -> Result<Option<Element>, StackError> {
        let mut state = self.lock();
        if state.frozen {
            return Err(StackError::Frozen);
        }
        let p = state.perspective;
        Ok(state.remove_as(p))
    }

    pub fn peek(&self) -> Option<Element> {
        let state = self.lock();
        state.peek_as(state.perspective).cloned()
    }

    pub(crate) fn pop_as(&self, perspective: Perspective) -> Result<Option<Element>, StackError> {
        let mut state = self.lock();
        if state.frozen {
            return Err(StackError::Frozen);
        }
        Ok(state.remove_as(perspective))
    }

    /// Element `offset` positions from where `perspective` pops; offset 0
    /// is what `pop` through that perspective would return
    pub fn peek_at(&self, perspective: Perspective, offset: usize) -> Option<Element> {
        self.lock().peek_at(perspective, offset).cloned()
    }

    /// Remove the element `offset` positions from where `perspective` pops
    pub fn pop_at(
        &self,
        perspective: Perspective,
        offset: usize,
    ) -> Result<Option<Element>, StackError> {
        let mut state = self.lock();
        if state.frozen {
            return Err(StackError::Frozen);
        }
        Ok(state.remove_offset(perspective, offset))
    }

    /// Blocking removal.
    ///
    /// `None` waits without limit, `Some(Duration::ZERO)` never blocks.
    /// Returns `Taken::Closed` once the stack is closed and drained.
    pub fn take(&self, timeout: Option<Duration>) -> Result<Taken, StackError> {
        self.take_as(None, timeout)
    }

    /// `take` through an explicit perspective; None uses the stack's own,
    /// read at the moment of removal
    pub(crate) fn take_as(
        &self,
        perspective: Option<Perspective>,
        timeout: Option<Duration>,
    ) -> Result<Taken, StackError> {
        // a timeout too large to represent waits without limit
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut state = self.lock();
        if state.frozen {
            return Err(StackError::Frozen);
        }
        if state.waiters.is_empty() {
            let p = perspective.unwrap_or(state.perspective);
            if let Some(e) = state.remove_as(p) {
                return Ok(Taken::Value(e));
            }
        }
        if state.closed && state.elements.is_empty() {
            return Ok(Taken::Closed);
        }
        if timeout == Some(Duration::ZERO) {
            return Ok(Taken::Timeout);
        }

        let me = Arc::new(Waiter {
            signal: Signal::new(),
        });
        state.waiters.push_back(Arc::clone(&me));

        loop {
            drop(state);
            let woke = me.signal.wait_until(deadline);
            state = self.lock();

            if state.frozen {
                state.remove_waiter(&me);
                return Err(StackError::Frozen);
            }
            let at_front = state.waiters.front().is_some_and(|w| Arc::ptr_eq(w, &me));
            if at_front {
                let p = perspective.unwrap_or(state.perspective);
                if let Some(e) = state.remove_as(p) {
                    state.waiters.pop_front();
                    if !state.elements.is_empty() {
                        state.notify_front();
                    }
                    return Ok(Taken::Value(e));
                }
            }
            if state.closed && state.elements.is_empty() {
                state.remove_waiter(&me);
                return Ok(Taken::Closed);
            }
            let expired = deadline.is_some_and(|d| Instant::now() >= d);
            if !woke && expired {
                state.remove_waiter(&me);
                return Ok(Taken::Timeout);
            }
        }
    }

    /// `take` without blocking
    pub fn try_take(&self) -> Result<Taken, StackError> {
        self.take(Some(Duration::ZERO))
    }

    pub fn len(&self) -> usize {
        self.lock().elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().elements.is_empty()
    }

    /// Number of callers currently blocked in `take`
    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Refuse further pushes and wake every blocked taker. Idempotent.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        tracing::debug!(stack = self.id, waiters = state.waiters.len(), "stack closed");
        state.notify_all_waiters();
        state.notify_watchers();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Make the contents immutable; reads keep working
    pub fn freeze(&self) {
        let mut state = self.lock();
        state.frozen = true;
        tracing::debug!(stack = self.id, waiters = state.waiters.len(), "stack frozen");
        state.notify_all_waiters();
        state.notify_watchers();
    }

    pub fn is_frozen(&self) -> bool {
        self.lock().frozen
    }

    pub fn clear(&self) -> Result<(), StackError> {
        let mut state = self.lock();
        if state.frozen {
            return Err(StackError::Frozen);
        }
        state.elements.clear();
        state.keys.clear();
        state.index.clear();
        Ok(())
    }

    /// Element at position `index` in append order
    pub fn get(&self, index: usize) -> Option<Element> {
        self.lock().elements.get(index).cloned()
    }

    /// Replace the element at `index`; `index == len` appends
    pub fn set(&self, index: usize, element: impl Into<Element>) -> Result<(), StackError> {
        let element = element.into();
        let mut state = self.lock();
        let len = state.elements.len();
        if index > len {
            return Err(StackError::IndexOutOfBounds { index, len });
        }
        if index == len {
            state.check_insert(self.element_type, None, element.element_type())?;
            state.insert(None, element);
            return Ok(());
        }
        if state.frozen {
            return Err(StackError::Frozen);
        }
        if element.element_type() != self.element_type {
            return Err(StackError::TypeMismatch {
                expected: self.element_type,
                found: element.element_type(),
            });
        }
        state.elements[index] = element;
        Ok(())
    }

    pub fn remove(&self, index: usize) -> Result<Element, StackError> {
        let mut state = self.lock();
        if state.frozen {
            return Err(StackError::Frozen);
        }
        let len = state.elements.len();
        state
            .remove_at(index)
            .ok_or(StackError::IndexOutOfBounds { index, len })
    }

    pub fn peek_key(&self, key: &str) -> Option<Element> {
        let state = self.lock();
        let pos = *state.index.get(key)?;
        state.elements.get(pos).cloned()
    }

    pub fn pop_key(&self, key: &str) -> Result<Option<Element>, StackError> {
        let mut state = self.lock();
        if state.frozen {
            return Err(StackError::Frozen);
        }
        match state.index.get(key).copied() {
            Some(pos) => Ok(state.remove_at(pos)),
            None => Ok(None),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().index.contains_key(key)
    }

    /// Keys in append order
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys.iter().flatten().cloned().collect()
    }

    /// Clone of the contents in the order the current perspective pops them
    /// (Lifo: most recent first, otherwise append order)
    pub fn snapshot(&self) -> Vec<Element> {
        self.lock().snapshot()
    }

    /// Lock the stack for direct slot access
    pub fn raw_view(&self) -> RawView<'_> {
        let mut state = self.lock();
        state.elements.make_contiguous();
        RawView {
            element_type: self.element_type,
            state,
        }
    }

    /// Register a signal raised on every push and on close
    pub fn watch(&self, signal: &Arc<Signal>) {
        self.lock().watchers.push(Arc::downgrade(signal));
    }

    pub fn unwatch(&self, signal: &Arc<Signal>) {
        let target = Arc::downgrade(signal);
        self.lock().watchers.retain(|w| !w.ptr_eq(&target));
    }
}

/// Direct access to a locked stack's slots.
///
/// Holds the stack lock for its whole lifetime; every other operation on the
/// stack waits until the view is dropped.
pub struct RawView<'a> {
    element_type: ElementType,
    state: MutexGuard<'a, State>,
}

impl RawView<'_> {
    pub fn len(&self) -> usize {
        self.state.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.elements.is_empty()
    }

    /// All elements in append order
    pub fn as_slice(&self) -> &[Element] {
        // contiguous since raw_view(), and nothing can push meanwhile
        self.state.elements.as_slices().0
    }

    pub fn at(&self, index: usize) -> Option<&Element> {
        self.state.elements.get(index)
    }

    pub fn by_key(&self, key: &str) -> Option<&Element> {
        let pos = *self.state.index.get(key)?;
        self.state.elements.get(pos)
    }

    pub fn set_at(&mut self, index: usize, element: Element) -> Result<(), StackError> {
        self.check_write(&element)?;
        let len = self.state.elements.len();
        match self.state.elements.get_mut(index) {
            Some(slot) => {
                *slot = element;
                Ok(())
            }
            None => Err(StackError::IndexOutOfBounds { index, len }),
        }
    }

    /// Overwrite the element stored under `key`; false if the key is absent
    pub fn set_by_key(&mut self, key: &str, element: Element) -> Result<bool, StackError> {
        self.check_write(&element)?;
        match self.state.index.get(key).copied() {
            Some(pos) => {
                self.state.elements[pos] = element;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn check_write(&self, element: &Element) -> Result<(), StackError> {
        if self.state.frozen {
            return Err(StackError::Frozen);
        }
        if element.element_type() != self.element_type {
            return Err(StackError::TypeMismatch {
                expected: self.element_type,
                found: element.element_type(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn ints(stack: &Stack) -> Vec<i64> {
        let mut out = Vec::new();
        while let Some(e) = stack.pop().unwrap() {
            out.push(e.as_i64().unwrap());
        }
        out
    }

    #[test]
    fn test_lifo_and_fifo_order() {
        let lifo = Stack::new(Perspective::Lifo, ElementType::Int64);
        let fifo = Stack::new(Perspective::Fifo, ElementType::Int64);
        for i in 1..=3 {
            lifo.push(i).unwrap();
            fifo.push(i).unwrap();
        }
        assert_eq!(ints(&lifo), vec![3, 2, 1]);
        assert_eq!(ints(&fifo), vec![1, 2, 3]);
    }

    #[test]
    fn test_pop_and_peek_on_empty() {
        let s = Stack::new(Perspective::Lifo, ElementType::Int64);
        assert_eq!(s.pop().unwrap(), None);
        assert_eq!(s.peek(), None);
    }

    #[test]
    fn test_peek_is_idempotent() {
        let s = Stack::new(Perspective::Fifo, ElementType::Text);
        s.push("a").unwrap();
        s.push("b").unwrap();
        assert_eq!(s.peek(), Some(Element::Text("a".into())));
        assert_eq!(s.peek(), Some(Element::Text("a".into())));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let s = Stack::new(Perspective::Lifo, ElementType::Int64);
        assert_eq!(
            s.push(1.5),
            Err(StackError::TypeMismatch {
                expected: ElementType::Int64,
                found: ElementType::Float64,
            })
        );
        assert!(s.is_empty());
    }

    #[test]
    fn test_fifo_to_lifo_switch_keeps_unread() {
        let s = Stack::new(Perspective::Fifo, ElementType::Int64);
        for i in 1..=5 {
            s.push(i).unwrap();
        }
        assert_eq!(s.pop().unwrap(), Some(Element::Int64(1)));
        assert_eq!(s.pop().unwrap(), Some(Element::Int64(2)));
        s.set_perspective(Perspective::Lifo);
        assert_eq!(ints(&s), vec![5, 4, 3]);
    }

    #[test]
    fn test_keyed_requires_key_and_overwrites() {
        let s = Stack::new(Perspective::Keyed, ElementType::Int64);
        assert_eq!(s.push(1), Err(StackError::KeyRequired));
        s.push_keyed("a", 1).unwrap();
        s.push_keyed("b", 2).unwrap();
        s.push_keyed("a", 10).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.peek_key("a"), Some(Element::Int64(10)));
        assert_eq!(s.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(s.pop_key("a").unwrap(), Some(Element::Int64(10)));
        assert!(!s.contains_key("a"));
        assert_eq!(s.peek_key("b"), Some(Element::Int64(2)));
    }

    #[test]
    fn test_switch_to_keyed_assigns_positional_keys() {
        let s = Stack::new(Perspective::Lifo, ElementType::Text);
        s.push("zero").unwrap();
        s.push_keyed("name", "first").unwrap();
        s.push("two").unwrap();
        s.push_keyed("name", "second").unwrap();
        s.set_perspective(Perspective::Keyed);
        assert_eq!(s.peek_key("0"), Some(Element::Text("zero".into())));
        assert_eq!(s.peek_key("2"), Some(Element::Text("two".into())));
        assert_eq!(s.peek_key("name"), Some(Element::Text("second".into())));
        assert_eq!(s.len(), 3);
        assert_eq!(
            s.keys(),
            vec!["0".to_string(), "2".to_string(), "name".to_string()]
        );
    }

    #[test]
    fn test_indexed_get_set_remove() {
        let s = Stack::new(Perspective::Indexed, ElementType::Int64);
        for i in 0..3 {
            s.push(i * 10).unwrap();
        }
        assert_eq!(s.get(1), Some(Element::Int64(10)));
        s.set(1, 11).unwrap();
        s.set(3, 30).unwrap();
        assert_eq!(
            s.set(9, 1),
            Err(StackError::IndexOutOfBounds { index: 9, len: 4 })
        );
        assert_eq!(s.remove(0).unwrap(), Element::Int64(0));
        assert_eq!(s.snapshot(), vec![
            Element::Int64(11),
            Element::Int64(20),
            Element::Int64(30)
        ]);
        // keyless pop on an indexed stack takes the most recent
        assert_eq!(s.pop().unwrap(), Some(Element::Int64(30)));
    }

    #[test]
    fn test_capacity_and_frozen() {
        let s = Stack::with_capacity(Perspective::Lifo, ElementType::Int64, 2);
        s.push(1).unwrap();
        s.push(2).unwrap();
        assert_eq!(s.push(3), Err(StackError::Full { capacity: 2 }));

        s.freeze();
        assert_eq!(s.pop(), Err(StackError::Frozen));
        assert_eq!(s.clear(), Err(StackError::Frozen));
        assert_eq!(s.peek(), Some(Element::Int64(2)));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_closed_rejects_push_but_drains() {
        let s = Stack::new(Perspective::Fifo, ElementType::Int64);
        s.push(1).unwrap();
        s.close();
        assert_eq!(s.push(2), Err(StackError::Closed));
        assert_eq!(s.take(None).unwrap(), Taken::Value(Element::Int64(1)));
        assert_eq!(s.take(None).unwrap(), Taken::Closed);
    }

    #[test]
    fn test_take_zero_timeout_does_not_block() {
        let s = Stack::new(Perspective::Fifo, ElementType::Int64);
        assert_eq!(s.try_take().unwrap(), Taken::Timeout);
        s.push(5).unwrap();
        assert_eq!(s.try_take().unwrap(), Taken::Value(Element::Int64(5)));
    }

    #[test]
    fn test_take_with_unrepresentable_timeout() {
        let s = Stack::new(Perspective::Fifo, ElementType::Int64);
        s.push(3).unwrap();
        assert_eq!(
            s.take(Some(Duration::MAX)).unwrap(),
            Taken::Value(Element::Int64(3))
        );
        s.close();
        assert_eq!(s.take(Some(Duration::MAX)).unwrap(), Taken::Closed);
    }

    #[test]
    fn test_offsets_count_from_the_popping_end() {
        let s = Stack::new(Perspective::Indexed, ElementType::Int64);
        for i in 1..=4 {
            s.push(i).unwrap();
        }
        assert_eq!(s.peek_at(Perspective::Lifo, 0), s.peek());
        assert_eq!(s.peek_at(Perspective::Indexed, 1), Some(Element::Int64(3)));
        assert_eq!(s.peek_at(Perspective::Keyed, 3), Some(Element::Int64(1)));
        assert_eq!(s.peek_at(Perspective::Fifo, 1), Some(Element::Int64(2)));
        assert_eq!(s.peek_at(Perspective::Fifo, 4), None);

        assert_eq!(s.pop_at(Perspective::Lifo, 1).unwrap(), Some(Element::Int64(3)));
        assert_eq!(s.pop_at(Perspective::Fifo, 0).unwrap(), Some(Element::Int64(1)));
        assert_eq!(s.pop_at(Perspective::Fifo, 9).unwrap(), None);
        assert_eq!(s.snapshot(), vec![Element::Int64(2), Element::Int64(4)]);
        s.freeze();
        assert_eq!(s.pop_at(Perspective::Lifo, 0), Err(StackError::Frozen));
    }

    #[test]
    fn test_take_times_out() {
        let s = Stack::new(Perspective::Fifo, ElementType::Int64);
        let start = Instant::now();
        assert_eq!(
            s.take(Some(Duration::from_millis(50))).unwrap(),
            Taken::Timeout
        );
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(s.waiting(), 0);
    }

    #[test]
    fn test_take_wakes_on_push() {
        let s = Arc::new(Stack::new(Perspective::Fifo, ElementType::Int64));
        let s2 = Arc::clone(&s);
        let h = thread::spawn(move || s2.take(Some(Duration::from_secs(5))).unwrap());
        thread::sleep(Duration::from_millis(30));
        s.push(7).unwrap();
        assert_eq!(h.join().unwrap(), Taken::Value(Element::Int64(7)));
    }

    #[test]
    fn test_waiters_served_in_blocking_order() {
        let s = Arc::new(Stack::new(Perspective::Lifo, ElementType::Int64));
        let first = {
            let s = Arc::clone(&s);
            thread::spawn(move || s.take(Some(Duration::from_secs(5))).unwrap())
        };
        while s.waiting() < 1 {
            thread::sleep(Duration::from_millis(1));
        }
        let second = {
            let s = Arc::clone(&s);
            thread::spawn(move || s.take(Some(Duration::from_secs(5))).unwrap())
        };
        while s.waiting() < 2 {
            thread::sleep(Duration::from_millis(1));
        }
        s.push(1).unwrap();
        assert_eq!(first.join().unwrap(), Taken::Value(Element::Int64(1)));
        s.push(2).unwrap();
        assert_eq!(second.join().unwrap(), Taken::Value(Element::Int64(2)));
    }

    #[test]
    fn test_close_wakes_all_takers() {
        let s = Arc::new(Stack::new(Perspective::Fifo, ElementType::Int64));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let s = Arc::clone(&s);
                thread::spawn(move || s.take(None).unwrap())
            })
            .collect();
        while s.waiting() < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        s.close();
        for h in handles {
            assert_eq!(h.join().unwrap(), Taken::Closed);
        }
    }

    #[test]
    fn test_raw_view_access() {
        let s = Stack::new(Perspective::Keyed, ElementType::Float64);
        s.push_keyed("x", 1.0).unwrap();
        s.push_keyed("y", 2.0).unwrap();
        {
            let mut raw = s.raw_view();
            assert_eq!(raw.as_slice(), &[Element::Float64(1.0), Element::Float64(2.0)]);
            assert_eq!(raw.by_key("y"), Some(&Element::Float64(2.0)));
            raw.set_at(0, Element::Float64(1.5)).unwrap();
            assert!(raw.set_by_key("y", Element::Float64(2.5)).unwrap());
            assert!(raw.set_at(0, Element::Int64(1)).is_err());
        }
        assert_eq!(s.peek_key("x"), Some(Element::Float64(1.5)));
        assert_eq!(s.peek_key("y"), Some(Element::Float64(2.5)));
    }

    #[test]
    fn test_watchers_signalled_on_push() {
        let s = Stack::new(Perspective::Fifo, ElementType::Int64);
        let signal = Arc::new(Signal::new());
        s.watch(&signal);
        s.push(1).unwrap();
        assert!(signal.wait(Some(Duration::from_millis(10))));
        s.unwatch(&signal);
        s.push(2).unwrap();
        assert!(!signal.wait(Some(Duration::from_millis(10))));
    }
}
