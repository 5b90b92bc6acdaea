//! Invocation driver
//!
//! One parse call as a single transaction against a [`ForeignContext`]:
//!
//! 1. copy the source (and an optional NUL terminator) into foreign memory
//! 2. copy the packed options into foreign memory
//! 3. acquire a result buffer
//! 4. call the parse entrypoint
//! 5. copy the serialized result out
//! 6. release everything from this call, newest first
//!
//! Step 6 runs on every exit path because all allocations live in a
//! [`ForeignArena`] that is dropped when the call returns.

use super::arena::ForeignArena;
use super::buffer::ResultBuffer;
use super::config::ScratchConfig;
use super::error::{BridgeError, BridgeResult};
use super::foreign::{ForeignContext, ForeignPtr};

/// Per-call behavior of the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverConfig {
    /// Write a 0 byte after the source copy
    pub nul_terminate_source: bool,
}

/// A region reserved once and reused across calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScratchRegion {
    ptr: ForeignPtr,
    capacity: u32,
}

impl ScratchRegion {
    /// The region's address when `needed` bytes fit
    #[inline]
    fn slot(&self, needed: usize) -> Option<ForeignPtr> {
        (needed <= self.capacity as usize).then_some(self.ptr)
    }
}

/// Source and options regions owned by an engine for its whole life
///
/// Inputs that fit are copied into these instead of fresh allocations.
/// Larger inputs fall back to the per-call path, so results are the same
/// either way.
#[derive(Debug, PartialEq, Eq)]
pub struct ReservedScratch {
    source: ScratchRegion,
    options: ScratchRegion,
}

impl ReservedScratch {
    /// Reserve both regions
    ///
    /// If the second reservation fails the first is released again.
    pub fn reserve<C: ForeignContext + ?Sized>(
        ctx: &mut C,
        config: &ScratchConfig,
    ) -> BridgeResult<Self> {
        let source = ctx.allocate(1, config.source_bytes)?;
        let options = match ctx.allocate(1, config.options_bytes) {
            Ok(ptr) => ptr,
            Err(err) => {
                if let Err(_release) = ctx.release(source) {
                    log_warn!("release of scratch {} failed: {}", source, _release);
                }
                return Err(err);
            }
        };

        Ok(Self {
            source: ScratchRegion {
                ptr: source,
                capacity: config.source_bytes,
            },
            options: ScratchRegion {
                ptr: options,
                capacity: config.options_bytes,
            },
        })
    }

    /// Give both regions back to the engine
    pub fn release<C: ForeignContext + ?Sized>(self, ctx: &mut C) -> BridgeResult<()> {
        let options = ctx.release(self.options.ptr);
        let source = ctx.release(self.source.ptr);
        options.and(source)
    }
}

/// Run one parse call and return the raw serialized result
pub fn serialize_parse<C: ForeignContext + ?Sized>(
    ctx: &mut C,
    scratch: Option<&ReservedScratch>,
    config: &DriverConfig,
    packed_options: &[u8],
    source: &[u8],
) -> BridgeResult<Vec<u8>> {
    let length = u32::try_from(source.len()).map_err(|_| BridgeError::OutOfForeignMemory {
        count: u32::MAX,
        size: 1,
    })?;
    let terminator = usize::from(config.nul_terminate_source);

    let mut arena = ForeignArena::new(ctx);

    let source_ptr = match scratch.and_then(|s| s.source.slot(source.len() + terminator)) {
        Some(ptr) => {
            arena.write(ptr, source)?;
            if terminator == 1 {
                // Scratch is reused, so the terminator must be rewritten
                let end = ptr.offset(length).ok_or(BridgeError::MemoryAccess {
                    address: ptr.addr(),
                    length: source.len() + 1,
                })?;
                arena.write(end, &[0])?;
            }
            ptr
        }
        None => arena.allocate_bytes(source, terminator)?,
    };

    let options_ptr = match scratch.and_then(|s| s.options.slot(packed_options.len())) {
        Some(ptr) => {
            arena.write(ptr, packed_options)?;
            ptr
        }
        None => arena.allocate_bytes(packed_options, 0)?,
    };

    let buffer = ResultBuffer::acquire(&mut arena)?;
    buffer.fill(&mut arena, source_ptr, length, options_ptr)?;
    let raw = buffer.copy_out(&mut arena)?;

    log_debug!(
        "serialize_parse: {} source bytes, {} option bytes, {} result bytes, {} allocations",
        source.len(),
        packed_options.len(),
        raw.len(),
        arena.len()
    );

    Ok(raw)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    /// A call made into the mock engine
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Call {
        Allocate(u32, u32),
        Free(ForeignPtr),
        BufferInit(ForeignPtr),
        BufferFree(ForeignPtr),
        SerializeParse(ForeignPtr, ForeignPtr, u32, ForeignPtr),
    }

    /// In-memory engine that echoes the source into the result buffer
    pub(crate) struct MockContext {
        memory: Vec<u8>,
        next: u32,
        live: BTreeMap<ForeignPtr, u32>,
        buffers: HashMap<ForeignPtr, Option<(ForeignPtr, u32)>>,
        calls: Vec<Call>,
        allocations: usize,
        fail_allocation: Option<usize>,
        fail_release: bool,
        fail_buffer_init: bool,
        trap_on_parse: bool,
        bogus_payload: bool,
    }

    impl MockContext {
        pub(crate) const HEAP_BASE: u32 = 64;
        pub(crate) const DESCRIPTOR_SIZE: u32 = 12;

        pub(crate) fn new() -> Self {
            Self {
                memory: vec![0; 64 * 1024],
                next: Self::HEAP_BASE,
                live: BTreeMap::new(),
                buffers: HashMap::new(),
                calls: Vec::new(),
                allocations: 0,
                fail_allocation: None,
                fail_release: false,
                fail_buffer_init: false,
                trap_on_parse: false,
                bogus_payload: false,
            }
        }

        /// Make the nth allocation (1-based) return null
        pub(crate) fn fail_allocation(mut self, nth: usize) -> Self {
            self.fail_allocation = Some(nth);
            self
        }

        pub(crate) fn fail_release(mut self) -> Self {
            self.fail_release = true;
            self
        }

        pub(crate) fn fail_buffer_init(mut self) -> Self {
            self.fail_buffer_init = true;
            self
        }

        pub(crate) fn trap_on_parse(mut self) -> Self {
            self.trap_on_parse = true;
            self
        }

        /// Report a payload address past the end of memory
        pub(crate) fn bogus_payload(mut self) -> Self {
            self.bogus_payload = true;
            self
        }

        pub(crate) fn calls(&self) -> &[Call] {
            &self.calls
        }

        pub(crate) fn frees(&self) -> impl Iterator<Item = ForeignPtr> + '_ {
            self.calls.iter().filter_map(|call| match call {
                Call::Free(ptr) => Some(*ptr),
                _ => None,
            })
        }

        pub(crate) fn live(&self) -> &BTreeMap<ForeignPtr, u32> {
            &self.live
        }

        pub(crate) fn peek(&self, at: ForeignPtr, len: usize) -> &[u8] {
            &self.memory[at.addr() as usize..at.addr() as usize + len]
        }

        fn range(&self, at: ForeignPtr, len: usize) -> BridgeResult<usize> {
            crate::bridge::foreign::check_range(at, len, self.memory.len())
        }
    }

    impl ForeignContext for MockContext {
        fn allocate(&mut self, count: u32, size: u32) -> BridgeResult<ForeignPtr> {
            self.calls.push(Call::Allocate(count, size));
            self.allocations += 1;
            if self.fail_allocation == Some(self.allocations) {
                return crate::bridge::foreign::non_null(0, count, size);
            }
            let bytes = match count.checked_mul(size) {
                Some(bytes) => bytes.max(1).next_multiple_of(8),
                None => return crate::bridge::foreign::non_null(0, count, size),
            };
            if self.next as usize + bytes as usize > self.memory.len() {
                return crate::bridge::foreign::non_null(0, count, size);
            }
            let ptr = ForeignPtr::new(self.next);
            self.next += bytes;
            let start = ptr.addr() as usize;
            self.memory[start..start + bytes as usize].fill(0);
            self.live.insert(ptr, bytes);
            Ok(ptr)
        }

        fn release(&mut self, ptr: ForeignPtr) -> BridgeResult<()> {
            self.calls.push(Call::Free(ptr));
            if self.fail_release {
                return Err(BridgeError::fault("free", "release refused"));
            }
            assert!(self.live.remove(&ptr).is_some(), "double free of {}", ptr);
            Ok(())
        }

        fn buffer_sizeof(&mut self) -> BridgeResult<u32> {
            Ok(Self::DESCRIPTOR_SIZE)
        }

        fn buffer_init(&mut self, descriptor: ForeignPtr) -> BridgeResult<bool> {
            self.calls.push(Call::BufferInit(descriptor));
            if self.fail_buffer_init {
                return Ok(false);
            }
            self.buffers.insert(descriptor, None);
            Ok(true)
        }

        fn buffer_value(&mut self, descriptor: ForeignPtr) -> BridgeResult<ForeignPtr> {
            if self.bogus_payload {
                return Ok(ForeignPtr::new(self.memory.len() as u32 - 2));
            }
            Ok(self.buffers[&descriptor].map_or(ForeignPtr::NULL, |(ptr, _)| ptr))
        }

        fn buffer_length(&mut self, descriptor: ForeignPtr) -> BridgeResult<u32> {
            Ok(self.buffers[&descriptor].map_or(0, |(_, len)| len))
        }

        fn buffer_free(&mut self, descriptor: ForeignPtr) -> BridgeResult<()> {
            self.calls.push(Call::BufferFree(descriptor));
            if let Some(Some((payload, _))) = self.buffers.remove(&descriptor) {
                self.live.remove(&payload);
            }
            Ok(())
        }

        fn serialize_parse(
            &mut self,
            descriptor: ForeignPtr,
            source: ForeignPtr,
            length: u32,
            options: ForeignPtr,
        ) -> BridgeResult<()> {
            self.calls
                .push(Call::SerializeParse(descriptor, source, length, options));
            if self.trap_on_parse {
                return Err(BridgeError::fault("pm_serialize_parse", "unreachable"));
            }
            let text = self.read(source, length as usize)?;
            let payload = self.allocate(1, length)?;
            self.write(payload, &text)?;
            self.buffers.insert(descriptor, Some((payload, length)));
            Ok(())
        }

        fn write(&mut self, at: ForeignPtr, bytes: &[u8]) -> BridgeResult<()> {
            let start = self.range(at, bytes.len())?;
            self.memory[start..start + bytes.len()].copy_from_slice(bytes);
            Ok(())
        }

        fn read(&mut self, at: ForeignPtr, length: usize) -> BridgeResult<Vec<u8>> {
            let start = self.range(at, length)?;
            Ok(self.memory[start..start + length].to_vec())
        }

        fn memory_size(&self) -> usize {
            self.memory.len()
        }
    }

    fn run(
        ctx: &mut MockContext,
        scratch: Option<&ReservedScratch>,
        source: &[u8],
    ) -> BridgeResult<Vec<u8>> {
        serialize_parse(ctx, scratch, &DriverConfig::default(), b"opts", source)
    }

    #[test]
    fn test_round_trip_releases_everything() {
        let mut ctx = MockContext::new();
        let raw = run(&mut ctx, None, b"1 + 1").unwrap();
        assert_eq!(raw, b"1 + 1".to_vec());
        assert!(ctx.live().is_empty());
    }

    #[test]
    fn test_release_order() {
        let mut ctx = MockContext::new();
        run(&mut ctx, None, b"x").unwrap();

        let allocated: Vec<ForeignPtr> = ctx
            .calls()
            .iter()
            .filter_map(|call| match call {
                Call::SerializeParse(desc, src, _, opts) => Some(vec![*src, *opts, *desc]),
                _ => None,
            })
            .flatten()
            .collect();
        let freed: Vec<ForeignPtr> = ctx.frees().collect();
        let mut expected = allocated.clone();
        expected.reverse();
        assert_eq!(freed, expected);

        // The payload goes back through the engine's own buffer free
        let buffer_free = ctx
            .calls()
            .iter()
            .position(|call| matches!(call, Call::BufferFree(_)))
            .unwrap();
        let descriptor_free = ctx
            .calls()
            .iter()
            .position(|call| *call == Call::Free(allocated[2]))
            .unwrap();
        assert!(buffer_free < descriptor_free);
    }

    #[test]
    fn test_allocation_failure_at_each_step() {
        // source, options, descriptor
        for nth in 1..=3 {
            let mut ctx = MockContext::new().fail_allocation(nth);
            let err = run(&mut ctx, None, b"abc").unwrap_err();
            assert!(
                matches!(err, BridgeError::OutOfForeignMemory { .. }),
                "step {}: {:?}",
                nth,
                err
            );
            assert!(ctx.live().is_empty(), "step {} leaked", nth);
        }
    }

    #[test]
    fn test_buffer_init_failure() {
        let mut ctx = MockContext::new().fail_buffer_init();
        let err = run(&mut ctx, None, b"abc").unwrap_err();
        assert!(matches!(err, BridgeError::OutOfForeignMemory { count: 1, .. }));
        assert!(ctx.live().is_empty());
    }

    #[test]
    fn test_fault_still_releases() {
        let mut ctx = MockContext::new().trap_on_parse();
        let err = run(&mut ctx, None, b"abc").unwrap_err();
        assert!(err.poisons_engine());
        assert!(ctx.live().is_empty());
        assert_eq!(ctx.frees().count(), 3);
    }

    #[test]
    fn test_out_of_bounds_payload() {
        let mut ctx = MockContext::new().bogus_payload();
        let err = run(&mut ctx, None, b"abc").unwrap_err();
        assert!(matches!(err, BridgeError::MemoryAccess { length: 3, .. }));
        assert!(ctx.live().is_empty());
    }

    #[test]
    fn test_nul_terminator() {
        let mut ctx = MockContext::new();
        let config = DriverConfig {
            nul_terminate_source: true,
        };
        serialize_parse(&mut ctx, None, &config, b"", b"ab").unwrap();
        assert!(ctx.calls().contains(&Call::Allocate(3, 1)));
    }

    #[test]
    fn test_scratch_is_reused() {
        let mut ctx = MockContext::new();
        let scratch = ReservedScratch::reserve(
            &mut ctx,
            &ScratchConfig {
                source_bytes: 16,
                options_bytes: 8,
            },
        )
        .unwrap();
        let reserved = ctx.live().len();

        let config = DriverConfig {
            nul_terminate_source: true,
        };
        let raw = serialize_parse(&mut ctx, Some(&scratch), &config, b"opts", b"short").unwrap();
        assert_eq!(raw, b"short".to_vec());
        assert_eq!(ctx.peek(scratch.source.ptr, 6), b"short\0");
        assert_eq!(ctx.peek(scratch.options.ptr, 4), b"opts");
        assert_eq!(ctx.live().len(), reserved);

        // Too large for the source region: falls back to a fresh allocation
        let long = [b'x'; 16];
        let raw = serialize_parse(&mut ctx, Some(&scratch), &config, b"opts", &long).unwrap();
        assert_eq!(raw, long.to_vec());
        assert!(ctx.calls().contains(&Call::Allocate(17, 1)));
        assert_eq!(ctx.live().len(), reserved);

        scratch.release(&mut ctx).unwrap();
        assert!(ctx.live().is_empty());
    }

    #[test]
    fn test_scratch_reserve_failure_releases_first_region() {
        let mut ctx = MockContext::new().fail_allocation(2);
        let config = ScratchConfig {
            source_bytes: 1024,
            options_bytes: 64,
        };
        let err = ReservedScratch::reserve(&mut ctx, &config).unwrap_err();
        assert_eq!(ctx.frees().count(), 1);
        assert!(matches!(err, BridgeError::OutOfForeignMemory { .. }));
        assert!(ctx.live().is_empty());
    }
}
