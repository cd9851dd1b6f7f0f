//! Views: a perspective of your own over a shared Stack
//!
//! A View operates on its target through its own perspective without
//! touching the Stack's perspective field, so two Views over the same Stack
//! can disagree: one pops the newest element, the other the oldest.
//!
//! Views also carry a cursor for non-destructive iteration: `peek` reads the
//! element `cursor` positions from where this View would pop, `advance` moves
//! on. The cursor is a plain offset; concurrent pops on the target shift what
//! it points at.
//!
//! ## Work stealing
//!
//! `StealViews` pairs an owner View (Lifo) and a thief View (Fifo) over one
//! Stack: the owner works on its most recent items while thieves take the
//! oldest ones from the other end. `StealPool` groups several of these.

use crate::element::{Element, ElementType};
use crate::error::StackError;
use crate::stack::{Perspective, Stack, Taken};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug)]
pub struct View {
    stack: Arc<Stack>,
    perspective: Perspective,
    cursor: AtomicUsize,
}

impl View {
    pub fn new(stack: Arc<Stack>, perspective: Perspective) -> Self {
        Self {
            stack,
            perspective,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn stack(&self) -> &Arc<Stack> {
        &self.stack
    }

    pub fn perspective(&self) -> Perspective {
        self.perspective
    }

    pub fn push(&self, element: impl Into<Element>) -> Result<(), StackError> {
        self.stack.push(element)
    }

    pub fn push_keyed(
        &self,
        key: impl Into<String>,
        element: impl Into<Element>,
    ) -> Result<(), StackError> {
        self.stack.push_keyed(key, element)
    }

    pub fn pop(&self) -> Result<Option<Element>, StackError> {
        self.stack.pop_as(self.perspective)
    }

    /// `pop` for stealing loops: a frozen target reads as empty
    pub fn try_pop(&self) -> Option<Element> {
        self.stack.pop_as(self.perspective).ok().flatten()
    }

    pub fn take(&self, timeout: Option<Duration>) -> Result<Taken, StackError> {
        self.stack.take_as(Some(self.perspective), timeout)
    }

    /// Element under the cursor
    pub fn peek(&self) -> Option<Element> {
        self.peek_at(self.cursor.load(Ordering::Acquire))
    }

    /// Element `offset` positions from where this View pops
    pub fn peek_at(&self, offset: usize) -> Option<Element> {
        self.stack.peek_at(self.perspective, offset)
    }

    /// Remove the element `offset` positions from where this View pops
    pub fn pop_at(&self, offset: usize) -> Result<Option<Element>, StackError> {
        self.stack.pop_at(self.perspective, offset)
    }

    /// Move the cursor one step; false once it has run past the end
    pub fn advance(&self) -> bool {
        let next = self.cursor.fetch_add(1, Ordering::AcqRel) + 1;
        next < self.stack.len()
    }

    pub fn reset(&self) {
        self.cursor.store(0, Ordering::Release);
    }

    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn set_cursor(&self, position: usize) {
        self.cursor.store(position, Ordering::Release);
    }

    /// Elements between the cursor and the far end
    pub fn remaining(&self) -> usize {
        self.stack.len().saturating_sub(self.cursor())
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

/// Owner/thief pair over one deque
#[derive(Debug)]
pub struct StealViews {
    pub owner: View,
    pub thief: View,
}

impl StealViews {
    pub fn new(stack: Arc<Stack>) -> Self {
        Self {
            owner: View::new(Arc::clone(&stack), Perspective::Lifo),
            thief: View::new(stack, Perspective::Fifo),
        }
    }
}

/// A fixed set of work-stealing deques, one per worker
#[derive(Debug)]
pub struct StealPool {
    deques: Vec<StealViews>,
}

impl StealPool {
    pub fn new(workers: usize, element_type: ElementType) -> Self {
        let deques = (0..workers)
            .map(|_| StealViews::new(Arc::new(Stack::new(Perspective::Lifo, element_type))))
            .collect();
        Self { deques }
    }

    pub fn workers(&self) -> usize {
        self.deques.len()
    }

    pub fn deque(&self, worker: usize) -> Option<&StealViews> {
        self.deques.get(worker)
    }

    /// Queue work on a worker's own deque
    pub fn push(&self, worker: usize, element: impl Into<Element>) -> Result<(), StackError> {
        match self.deques.get(worker) {
            Some(d) => d.owner.push(element),
            None => Err(StackError::IndexOutOfBounds {
                index: worker,
                len: self.deques.len(),
            }),
        }
    }

    /// Next item for `worker`: its own newest item, else the oldest item of
    /// the first peer (in ring order) that has one
    pub fn next(&self, worker: usize) -> Option<Element> {
        let n = self.deques.len();
        let own = self.deques.get(worker)?;
        if let Some(e) = own.owner.try_pop() {
            return Some(e);
        }
        (1..n)
            .map(|step| &self.deques[(worker + step) % n])
            .find_map(|peer| peer.thief.try_pop())
    }

    /// Items still queued across all deques
    pub fn pending(&self) -> usize {
        self.deques.iter().map(|d| d.owner.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_views_disagree_on_order() {
        let stack = Arc::new(Stack::new(Perspective::Lifo, ElementType::Int64));
        let lifo = View::new(Arc::clone(&stack), Perspective::Lifo);
        let fifo = View::new(Arc::clone(&stack), Perspective::Fifo);
        for i in 1..=4 {
            stack.push(i).unwrap();
        }
        assert_eq!(lifo.pop().unwrap(), Some(Element::Int64(4)));
        assert_eq!(fifo.pop().unwrap(), Some(Element::Int64(1)));
        assert_eq!(stack.perspective(), Perspective::Lifo);
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_cursor_walks_in_view_order() {
        let stack = Arc::new(Stack::new(Perspective::Fifo, ElementType::Int64));
        for i in 1..=3 {
            stack.push(i).unwrap();
        }
        let view = View::new(Arc::clone(&stack), Perspective::Lifo);
        let mut seen = Vec::new();
        loop {
            seen.push(view.peek().unwrap().as_i64().unwrap());
            if !view.advance() {
                break;
            }
        }
        assert_eq!(seen, vec![3, 2, 1]);
        assert_eq!(view.remaining(), 0);
        assert_eq!(view.peek(), None);
        view.reset();
        assert_eq!(view.remaining(), 3);
        assert_eq!(view.peek(), Some(Element::Int64(3)));
        // iteration never consumed anything
        assert_eq!(stack.len(), 3);
    }

    #[test]
    fn test_peek_agrees_with_pop_for_every_perspective() {
        for (perspective, first) in [
            (Perspective::Lifo, 3),
            (Perspective::Fifo, 1),
            (Perspective::Indexed, 3),
            (Perspective::Keyed, 3),
        ] {
            let stack = Arc::new(Stack::new(Perspective::Indexed, ElementType::Int64));
            for i in 1..=3 {
                stack.push(i).unwrap();
            }
            let view = View::new(Arc::clone(&stack), perspective);
            let peeked = view.peek();
            assert_eq!(peeked, Some(Element::Int64(first)), "{}", perspective);
            assert_eq!(view.pop().unwrap(), peeked, "{}", perspective);
        }
    }

    #[test]
    fn test_offset_access_through_view() {
        let stack = Arc::new(Stack::new(Perspective::Lifo, ElementType::Int64));
        for i in 1..=5 {
            stack.push(i).unwrap();
        }
        let lifo = View::new(Arc::clone(&stack), Perspective::Lifo);
        let fifo = View::new(Arc::clone(&stack), Perspective::Fifo);
        assert_eq!(lifo.peek_at(1), Some(Element::Int64(4)));
        assert_eq!(fifo.peek_at(1), Some(Element::Int64(2)));
        assert_eq!(lifo.pop_at(2).unwrap(), Some(Element::Int64(3)));
        assert_eq!(fifo.pop_at(0).unwrap(), Some(Element::Int64(1)));
        assert_eq!(lifo.pop_at(10).unwrap(), None);
        assert_eq!(stack.snapshot(), vec![Element::Int64(5), Element::Int64(4), Element::Int64(2)]);
    }

    #[test]
    fn test_view_take_uses_view_perspective() {
        let stack = Arc::new(Stack::new(Perspective::Lifo, ElementType::Int64));
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        let fifo = View::new(Arc::clone(&stack), Perspective::Fifo);
        assert_eq!(
            fifo.take(Some(Duration::ZERO)).unwrap(),
            Taken::Value(Element::Int64(1))
        );
    }

    #[test]
    fn test_steal_views_take_opposite_ends() {
        let views = StealViews::new(Arc::new(Stack::new(Perspective::Lifo, ElementType::Int64)));
        for i in 1..=3 {
            views.owner.push(i).unwrap();
        }
        assert_eq!(views.owner.try_pop(), Some(Element::Int64(3)));
        assert_eq!(views.thief.try_pop(), Some(Element::Int64(1)));
        assert_eq!(views.owner.try_pop(), Some(Element::Int64(2)));
        assert_eq!(views.thief.try_pop(), None);
    }

    #[test]
    fn test_pool_steals_from_peers() {
        let pool = StealPool::new(3, ElementType::Int64);
        pool.push(1, 10).unwrap();
        pool.push(1, 11).unwrap();
        pool.push(2, 20).unwrap();

        // worker 0 has nothing: steals the oldest item of worker 1
        assert_eq!(pool.next(0), Some(Element::Int64(10)));
        // worker 1 prefers its own newest
        assert_eq!(pool.next(1), Some(Element::Int64(11)));
        assert_eq!(pool.next(1), Some(Element::Int64(20)));
        assert_eq!(pool.next(0), None);
        assert_eq!(pool.pending(), 0);
        assert!(pool.push(7, 1).is_err());
    }
}
