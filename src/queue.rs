//! Fixed-capacity runnable ring buffer
//!
//! Plain FIFO of runnable references, no heap. Not synchronized on its own:
//! the executor keeps it behind the global lock, which is what makes it
//! safe for many producers (threads and interrupts) and one consumer.

use crate::runnable::RunnableRef;

/// Ring buffer of `N` runnable references
pub struct RunnableQueue<const N: usize> {
    /// Ring buffer storage
    buffer: [Option<RunnableRef>; N],
    /// Next slot to read
    head: usize,
    /// Number of queued entries
    len: usize,
}

impl<const N: usize> RunnableQueue<N> {
    /// Create a new empty queue
    pub const fn new() -> Self {
        Self {
            buffer: [None; N],
            head: 0,
            len: 0,
        }
    }

    /// Append at the back.
    ///
    /// Returns the runnable back if the queue is full.
    pub fn push(&mut self, runnable: RunnableRef) -> Result<(), RunnableRef> {
        if self.len >= N {
            return Err(runnable);
        }
        let tail = (self.head + self.len) % N;
        self.buffer[tail] = Some(runnable);
        self.len += 1;
        Ok(())
    }

    /// Take from the front
    pub fn pop(&mut self) -> Option<RunnableRef> {
        if self.len == 0 {
            return None;
        }
        let runnable = self.buffer[self.head].take();
        self.head = (self.head + 1) % N;
        self.len -= 1;
        runnable
    }

    /// Number of items in the queue
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len >= N
    }

    /// Total capacity (every slot is usable)
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Drop every queued reference
    pub fn clear(&mut self) {
        while self.pop().is_some() {}
        self.head = 0;
    }
}

impl<const N: usize> Default for RunnableQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::runnable::Runnable;
    use core::ptr;

    struct Tag(#[allow(dead_code)] u32);

    impl Runnable for Tag {
        fn execute(&self) {}
    }

    static TAGS: [Tag; 8] = [Tag(0), Tag(1), Tag(2), Tag(3), Tag(4), Tag(5), Tag(6), Tag(7)];

    fn tag(i: usize) -> RunnableRef {
        &TAGS[i]
    }

    fn same(a: RunnableRef, b: RunnableRef) -> bool {
        ptr::addr_eq(a as *const dyn Runnable, b as *const dyn Runnable)
    }

    #[test]
    fn test_push_pop() {
        let mut queue = RunnableQueue::<8>::new();
        assert!(queue.is_empty());

        assert!(queue.push(tag(3)).is_ok());
        assert_eq!(queue.len(), 1);
        assert!(!queue.is_empty());

        assert!(same(queue.pop().unwrap(), tag(3)));
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_full_queue() {
        let mut queue = RunnableQueue::<4>::new();
        for i in 0..4 {
            assert!(queue.push(tag(i)).is_ok());
        }
        assert!(queue.is_full());
        let rejected = queue.push(tag(5)).unwrap_err();
        assert!(same(rejected, tag(5)));
        assert_eq!(queue.capacity(), 4);
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = RunnableQueue::<8>::new();
        for i in 0..5 {
            assert!(queue.push(tag(i)).is_ok());
        }
        for i in 0..5 {
            assert!(same(queue.pop().unwrap(), tag(i)));
        }
    }

    #[test]
    fn test_wraparound() {
        let mut queue = RunnableQueue::<3>::new();
        // Fill and drain repeatedly so head walks around the ring
        for round in 0..4 {
            for i in 0..3 {
                assert!(queue.push(tag((round + i) % 8)).is_ok());
            }
            for i in 0..3 {
                assert!(same(queue.pop().unwrap(), tag((round + i) % 8)));
            }
        }
    }

    #[test]
    fn test_clear() {
        let mut queue = RunnableQueue::<8>::new();
        assert!(queue.push(tag(1)).is_ok());
        assert!(queue.push(tag(2)).is_ok());
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }
}
