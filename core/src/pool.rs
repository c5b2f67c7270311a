//! Free-list pooling for per-frame allocations.
//!
//! Frame construction rebuilds the same structures every frame: command
//! recording vectors, the compiled frame graph, visibility lists. A
//! [`FramePool<T>`] hands out recycled values whose contents were cleared
//! but whose allocations (e.g. `Vec` capacity) survive, so steady-state
//! frames allocate nothing.
//!
//! # Example
//!
//! ```
//! use lumen_core::pool::{FramePool, Poolable};
//!
//! #[derive(Debug, Default)]
//! struct Buffer {
//!     data: Vec<u8>,
//! }
//!
//! impl Poolable for Buffer {
//!     fn new_empty() -> Self {
//!         Self::default()
//!     }
//!     fn reset(&mut self) {
//!         self.data.clear();
//!     }
//! }
//!
//! let mut pool = FramePool::<Buffer>::new();
//! let mut buf = pool.acquire();
//! buf.data.extend_from_slice(&[1, 2, 3]);
//!
//! pool.recycle(buf);
//! assert_eq!(pool.idle_count(), 1);
//!
//! let buf = pool.acquire();
//! assert!(buf.data.is_empty());
//! assert!(buf.data.capacity() >= 3);
//! ```

/// Trait for types that can be pooled and reused.
///
/// Implementors must be able to create an empty instance and clear their
/// contents while preserving allocated capacity.
pub trait Poolable {
    /// Create a new empty instance.
    fn new_empty() -> Self;

    /// Reset the value to an empty state, preserving allocated capacity.
    ///
    /// For example, call `Vec::clear()` rather than replacing with a new `Vec`.
    fn reset(&mut self);
}

impl<T> Poolable for Vec<T> {
    fn new_empty() -> Self {
        Vec::new()
    }

    fn reset(&mut self) {
        self.clear();
    }
}

/// Free list of cleared values.
#[derive(Debug)]
pub struct FramePool<T: Poolable> {
    idle: Vec<T>,
    created: usize,
}

impl<T: Poolable> FramePool<T> {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self {
            idle: Vec::new(),
            created: 0,
        }
    }

    /// Take a cleared value, reusing an idle one when available.
    pub fn acquire(&mut self) -> T {
        match self.idle.pop() {
            Some(value) => value,
            None => {
                self.created += 1;
                T::new_empty()
            }
        }
    }

    /// Reset `value` and return it to the free list.
    pub fn recycle(&mut self, mut value: T) {
        value.reset();
        self.idle.push(value);
    }

    /// Number of values waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Number of values this pool has ever had to construct.
    pub fn created_count(&self) -> usize {
        self.created
    }

    /// Drop idle values until at most `keep` remain.
    pub fn trim(&mut self, keep: usize) {
        self.idle.truncate(keep);
    }
}

impl<T: Poolable> Default for FramePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct TestBuffer {
        data: Vec<u32>,
    }

    impl Poolable for TestBuffer {
        fn new_empty() -> Self {
            Self::default()
        }
        fn reset(&mut self) {
            self.data.clear();
        }
    }

    #[test]
    fn test_new_pool_is_empty() {
        let pool = FramePool::<TestBuffer>::new();
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.created_count(), 0);
    }

    #[test]
    fn test_acquire_creates_when_empty() {
        let mut pool = FramePool::<TestBuffer>::new();
        let a = pool.acquire();
        let b = pool.acquire();
        assert!(a.data.is_empty());
        assert!(b.data.is_empty());
        assert_eq!(pool.created_count(), 2);
    }

    #[test]
    fn test_recycle_clears_and_preserves_capacity() {
        let mut pool = FramePool::<TestBuffer>::new();
        let mut buf = pool.acquire();
        buf.data.extend([1, 2, 3, 4, 5]);

        pool.recycle(buf);
        assert_eq!(pool.idle_count(), 1);

        let buf = pool.acquire();
        assert!(buf.data.is_empty());
        assert!(buf.data.capacity() >= 5);
        assert_eq!(pool.created_count(), 1);
    }

    #[test]
    fn test_steady_state_does_not_create() {
        let mut pool = FramePool::<Vec<u32>>::new();
        for frame in 0..10 {
            let mut a = pool.acquire();
            let mut b = pool.acquire();
            a.push(frame);
            b.push(frame);
            pool.recycle(a);
            pool.recycle(b);
        }
        assert_eq!(pool.created_count(), 2);
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn test_trim() {
        let mut pool = FramePool::<Vec<u8>>::new();
        for _ in 0..4 {
            pool.recycle(Vec::with_capacity(16));
        }
        pool.trim(1);
        assert_eq!(pool.idle_count(), 1);
        pool.trim(0);
        assert_eq!(pool.idle_count(), 0);
    }
}
