//! The foreign side of the boundary
//!
//! [`ForeignContext`] is the set of calls the host can make into one engine
//! instance: its allocator, the result-buffer accessors, the parse entrypoint
//! and raw access to its linear memory. Each execution back end implements it
//! once; everything above (arena, buffer protocol, driver) is written against
//! the trait.

use std::fmt;

use super::error::{BridgeError, BridgeResult};
use super::wasi::CapturedOutput;

/// An address inside the engine's linear memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForeignPtr(u32);

impl ForeignPtr {
    /// The null address
    pub const NULL: ForeignPtr = ForeignPtr(0);

    /// Wrap a raw address
    #[inline]
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Raw address
    #[inline]
    pub const fn addr(self) -> u32 {
        self.0
    }

    /// Check for the null address
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address `bytes` past this one
    #[inline]
    pub fn offset(self, bytes: u32) -> Option<ForeignPtr> {
        self.0.checked_add(bytes).map(ForeignPtr)
    }

    /// Convert a pointer returned by a foreign call
    #[inline]
    pub fn from_wasm(raw: i32) -> Self {
        Self(raw as u32)
    }

    /// Value to pass to a foreign call
    #[inline]
    pub fn to_wasm(self) -> i32 {
        self.0 as i32
    }
}

impl fmt::Display for ForeignPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Calls into one engine instance
///
/// Every method is a synchronous call into foreign code or memory. A trap
/// surfaces as [`BridgeError::ForeignInvocationFault`]; an address outside
/// linear memory as [`BridgeError::MemoryAccess`].
pub trait ForeignContext {
    /// Allocate `count * size` zeroed bytes
    ///
    /// A null return from the foreign allocator is reported as
    /// [`BridgeError::OutOfForeignMemory`] (see [`non_null`]).
    fn allocate(&mut self, count: u32, size: u32) -> BridgeResult<ForeignPtr>;

    /// Release an allocation made by [`allocate`](Self::allocate)
    fn release(&mut self, ptr: ForeignPtr) -> BridgeResult<()>;

    /// Size of a result buffer descriptor
    fn buffer_sizeof(&mut self) -> BridgeResult<u32>;

    /// Initialize a descriptor; `false` when its payload cannot be allocated
    fn buffer_init(&mut self, descriptor: ForeignPtr) -> BridgeResult<bool>;

    /// Address of the descriptor's payload
    fn buffer_value(&mut self, descriptor: ForeignPtr) -> BridgeResult<ForeignPtr>;

    /// Number of bytes in the descriptor's payload
    fn buffer_length(&mut self, descriptor: ForeignPtr) -> BridgeResult<u32>;

    /// Free the descriptor's payload (not the descriptor itself)
    fn buffer_free(&mut self, descriptor: ForeignPtr) -> BridgeResult<()>;

    /// Parse `length` source bytes and serialize the result into `descriptor`
    fn serialize_parse(
        &mut self,
        descriptor: ForeignPtr,
        source: ForeignPtr,
        length: u32,
        options: ForeignPtr,
    ) -> BridgeResult<()>;

    /// Copy bytes into linear memory
    fn write(&mut self, at: ForeignPtr, bytes: &[u8]) -> BridgeResult<()>;

    /// Copy `length` bytes out of linear memory
    fn read(&mut self, at: ForeignPtr, length: usize) -> BridgeResult<Vec<u8>>;

    /// Current size of linear memory in bytes
    fn memory_size(&self) -> usize;

    /// Output captured by the engine's WASI context, if capturing
    fn captured_output(&self) -> Option<CapturedOutput> {
        None
    }

    /// Value of an exported `i32` global, if there is one by that name
    fn exported_global(&mut self, _name: &str) -> Option<i32> {
        None
    }
}

/// Turn a raw allocator result into a pointer, mapping null to out-of-memory
#[inline]
pub fn non_null(raw: i32, count: u32, size: u32) -> BridgeResult<ForeignPtr> {
    let ptr = ForeignPtr::from_wasm(raw);
    if ptr.is_null() {
        Err(BridgeError::OutOfForeignMemory { count, size })
    } else {
        Ok(ptr)
    }
}

/// Check that `[at, at + length)` lies within a memory of `memory_size` bytes
#[inline]
pub fn check_range(at: ForeignPtr, length: usize, memory_size: usize) -> BridgeResult<usize> {
    let start = at.addr() as usize;
    match start.checked_add(length) {
        Some(end) if end <= memory_size => Ok(start),
        _ => Err(BridgeError::MemoryAccess {
            address: at.addr(),
            length,
        }),
    }
}
