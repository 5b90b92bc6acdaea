//! Result buffer protocol
//!
//! The engine writes its output into a growable buffer it manages itself.
//! The host only holds the buffer's descriptor: memory of the size the
//! engine reports, initialized by the engine, queried for payload address
//! and length after the parse, and freed by the engine before the
//! descriptor's own memory is released.
//!
//! A [`ResultBuffer`] can only be used through the [`ForeignArena`] that
//! acquired it, and the arena releases it, so the payload cannot be read
//! after it has been freed.

use super::arena::ForeignArena;
use super::error::{BridgeError, BridgeResult};
use super::foreign::{ForeignContext, ForeignPtr};

/// An initialized result buffer descriptor owned by an arena
#[derive(Debug, PartialEq, Eq)]
pub struct ResultBuffer {
    descriptor: ForeignPtr,
}

impl ResultBuffer {
    /// Allocate and initialize a descriptor inside `arena`
    ///
    /// If the engine cannot initialize the buffer, the descriptor memory is
    /// still released by the arena.
    pub fn acquire<C: ForeignContext + ?Sized>(
        arena: &mut ForeignArena<'_, C>,
    ) -> BridgeResult<Self> {
        let size = arena.context().buffer_sizeof()?;
        let descriptor = arena.allocate(1, size)?;
        if !arena.context().buffer_init(descriptor)? {
            return Err(BridgeError::OutOfForeignMemory { count: 1, size });
        }
        arena.mark_buffer(descriptor);
        Ok(Self { descriptor })
    }

    /// Address of the descriptor
    #[inline]
    pub fn descriptor(&self) -> ForeignPtr {
        self.descriptor
    }

    /// Run the parse entrypoint, serializing into this buffer
    pub fn fill<C: ForeignContext + ?Sized>(
        &self,
        arena: &mut ForeignArena<'_, C>,
        source: ForeignPtr,
        length: u32,
        options: ForeignPtr,
    ) -> BridgeResult<()> {
        debug_assert!(arena.holds_buffer(self.descriptor));
        arena
            .context()
            .serialize_parse(self.descriptor, source, length, options)
    }

    /// Number of bytes currently in the buffer
    pub fn len<C: ForeignContext + ?Sized>(
        &self,
        arena: &mut ForeignArena<'_, C>,
    ) -> BridgeResult<u32> {
        debug_assert!(arena.holds_buffer(self.descriptor));
        arena.context().buffer_length(self.descriptor)
    }

    /// Copy the payload out of foreign memory
    pub fn copy_out<C: ForeignContext + ?Sized>(
        &self,
        arena: &mut ForeignArena<'_, C>,
    ) -> BridgeResult<Vec<u8>> {
        let length = self.len(arena)?;
        if length == 0 {
            return Ok(Vec::new());
        }
        let ctx = arena.context();
        let value = ctx.buffer_value(self.descriptor)?;
        ctx.read(value, length as usize)
    }
}
