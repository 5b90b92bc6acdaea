//! Scoped allocations in foreign memory
//!
//! The engine has no garbage collector for memory the host allocates, so
//! every allocation made during a call must be released exactly once, on
//! every exit path. [`ForeignArena`] records each successful allocation and
//! releases all of them, newest first, when it is dropped.
//!
//! A result-buffer descriptor is recorded as plain memory until the engine
//! has initialized it. After that it is released in two steps: the engine's
//! buffer free for the payload, then the descriptor's own memory.

use super::error::{BridgeError, BridgeResult};
use super::foreign::{ForeignContext, ForeignPtr};

/// One allocation held by the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Held {
    /// Plain memory from `allocate`
    Block(ForeignPtr),
    /// An initialized result-buffer descriptor
    Buffer(ForeignPtr),
}

/// Allocations of one call, released on drop in reverse order
pub struct ForeignArena<'c, C: ForeignContext + ?Sized> {
    /// The engine the allocations live in
    ctx: &'c mut C,
    /// Allocations in acquisition order
    held: Vec<Held>,
}

impl<'c, C: ForeignContext + ?Sized> ForeignArena<'c, C> {
    /// Open an arena over an engine instance
    #[inline]
    pub fn new(ctx: &'c mut C) -> Self {
        Self {
            ctx,
            held: Vec::with_capacity(4),
        }
    }

    /// Allocate `count * size` zeroed bytes
    pub fn allocate(&mut self, count: u32, size: u32) -> BridgeResult<ForeignPtr> {
        let ptr = self.ctx.allocate(count, size)?;
        self.held.push(Held::Block(ptr));
        Ok(ptr)
    }

    /// Allocate space for `bytes` plus `padding` zero bytes and copy `bytes` in
    ///
    /// Always allocates at least one byte, so an empty input still gets a
    /// distinct address.
    pub fn allocate_bytes(&mut self, bytes: &[u8], padding: usize) -> BridgeResult<ForeignPtr> {
        let total = bytes.len().saturating_add(padding).max(1);
        let count = u32::try_from(total).map_err(|_| BridgeError::OutOfForeignMemory {
            count: u32::MAX,
            size: 1,
        })?;
        let ptr = self.allocate(count, 1)?;
        self.ctx.write(ptr, bytes)?;
        Ok(ptr)
    }

    /// Copy bytes into memory the caller already owns
    #[inline]
    pub fn write(&mut self, at: ForeignPtr, bytes: &[u8]) -> BridgeResult<()> {
        self.ctx.write(at, bytes)
    }

    /// Number of allocations currently held
    #[inline]
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// Check if the arena holds nothing
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Whether `descriptor` is an initialized buffer held by this arena
    pub(crate) fn holds_buffer(&self, descriptor: ForeignPtr) -> bool {
        self.held.contains(&Held::Buffer(descriptor))
    }

    /// Mark a held block as an initialized result buffer
    ///
    /// From here on the engine's buffer free runs before the block is
    /// released.
    pub(crate) fn mark_buffer(&mut self, descriptor: ForeignPtr) {
        if let Some(entry) = self
            .held
            .iter_mut()
            .rev()
            .find(|entry| **entry == Held::Block(descriptor))
        {
            *entry = Held::Buffer(descriptor);
        }
    }

    /// The engine behind the arena
    ///
    /// Only the buffer protocol uses this; releasing memory through it would
    /// defeat the arena.
    #[inline]
    pub(crate) fn context(&mut self) -> &mut C {
        &mut *self.ctx
    }
}

impl<C: ForeignContext + ?Sized> Drop for ForeignArena<'_, C> {
    fn drop(&mut self) {
        // A failed release must not stop the remaining ones
        while let Some(entry) = self.held.pop() {
            match entry {
                Held::Buffer(descriptor) => {
                    if let Err(_err) = self.ctx.buffer_free(descriptor) {
                        log_warn!("buffer free of {} failed: {}", descriptor, _err);
                    }
                    if let Err(_err) = self.ctx.release(descriptor) {
                        log_warn!("release of descriptor {} failed: {}", descriptor, _err);
                    }
                }
                Held::Block(ptr) => {
                    if let Err(_err) = self.ctx.release(ptr) {
                        log_warn!("release of {} failed: {}", ptr, _err);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::driver::tests::{Call, MockContext};

    #[test]
    fn test_release_in_reverse_order() {
        let mut ctx = MockContext::new();
        {
            let mut arena = ForeignArena::new(&mut ctx);
            let a = arena.allocate(4, 1).unwrap();
            let b = arena.allocate_bytes(b"abc", 1).unwrap();
            assert_ne!(a, b);
            assert_eq!(arena.len(), 2);
        }
        let frees: Vec<_> = ctx.frees().collect();
        assert_eq!(frees.len(), 2);
        assert!(frees[0] > frees[1]);
        assert!(ctx.live().is_empty());
    }

    #[test]
    fn test_buffer_released_before_its_memory() {
        let mut ctx = MockContext::new();
        {
            let mut arena = ForeignArena::new(&mut ctx);
            let desc = arena.allocate(1, 12).unwrap();
            arena.mark_buffer(desc);
            assert!(arena.holds_buffer(desc));
        }
        let calls = ctx.calls();
        let n = calls.len();
        assert!(matches!(calls[n - 2], Call::BufferFree(_)));
        assert!(matches!(calls[n - 1], Call::Free(_)));
    }

    #[test]
    fn test_failed_allocation_is_not_held() {
        let mut ctx = MockContext::new().fail_allocation(2);
        {
            let mut arena = ForeignArena::new(&mut ctx);
            arena.allocate(1, 1).unwrap();
            let err = arena.allocate(1, 1).unwrap_err();
            assert_eq!(err, BridgeError::OutOfForeignMemory { count: 1, size: 1 });
            assert_eq!(arena.len(), 1);
        }
        assert!(ctx.live().is_empty());
    }

    #[test]
    fn test_release_failure_does_not_stop_others() {
        let mut ctx = MockContext::new().fail_release();
        {
            let mut arena = ForeignArena::new(&mut ctx);
            arena.allocate(1, 1).unwrap();
            arena.allocate(1, 1).unwrap();
        }
        assert_eq!(ctx.frees().count(), 2);
    }

    #[test]
    fn test_empty_bytes_get_an_address() {
        let mut ctx = MockContext::new();
        let mut arena = ForeignArena::new(&mut ctx);
        let ptr = arena.allocate_bytes(b"", 0).unwrap();
        assert!(!ptr.is_null());
    }
}
