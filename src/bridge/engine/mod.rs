//! Execution back ends
//!
//! Both back ends run the same WebAssembly module and satisfy the same
//! [`ForeignContext`] contract; they differ only in how foreign code runs:
//! - [`EngineKind::Interpreted`] executes the module's bytecode with wasmi
//! - [`EngineKind::Compiled`] translates it to native code once with
//!   wasmtime and Cranelift
//!
//! [`EngineRuntime`] layers the shared protocol (options codec, driver,
//! scratch reuse, poisoning) over either context.
//!
//! The foreign call protocol itself is written once, in
//! `engine_context!`, and expanded in each back end against that
//! runtime's `Instance`, `Store`, `Memory` and `TypedFunc` types.

/// Look up one typed export, naming it in the load error
macro_rules! typed_export {
    ($instance:expr, $store:expr, $names:expr, $field:ident: $params:ty => $results:ty) => {
        $instance
            .get_typed_func::<$params, $results>(&mut *$store, &$names.$field)
            .map_err(|err| BridgeError::load(format!("export '{}': {}", $names.$field, err)))?
    };
}

/// Export table, initializer and [`ForeignContext`] impl for one back end
///
/// Expands where `Instance`, `Store`, `TypedFunc` and `HostState` name the
/// runtime's types. `$context` has `store`, `instance`, `memory` and
/// `exports` fields and a `wasi_output(&self)` method.
macro_rules! engine_context {
    ($context:ident) => {
        /// Typed handles to the engine's exports
        struct Exports {
            names: Entrypoints,
            allocate: TypedFunc<(i32, i32), i32>,
            release: TypedFunc<i32, ()>,
            buffer_sizeof: TypedFunc<(), i32>,
            buffer_init: TypedFunc<i32, i32>,
            buffer_value: TypedFunc<i32, i32>,
            buffer_length: TypedFunc<i32, i32>,
            buffer_free: TypedFunc<i32, ()>,
            serialize_parse: TypedFunc<(i32, i32, i32, i32), ()>,
        }

        impl Exports {
            fn resolve(
                instance: &Instance,
                store: &mut Store<HostState>,
                names: Entrypoints,
            ) -> BridgeResult<Self> {
                Ok(Self {
                    allocate: typed_export!(instance, store, names, allocate: (i32, i32) => i32),
                    release: typed_export!(instance, store, names, release: i32 => ()),
                    buffer_sizeof: typed_export!(instance, store, names, buffer_sizeof: () => i32),
                    buffer_init: typed_export!(instance, store, names, buffer_init: i32 => i32),
                    buffer_value: typed_export!(instance, store, names, buffer_value: i32 => i32),
                    buffer_length: typed_export!(instance, store, names, buffer_length: i32 => i32),
                    buffer_free: typed_export!(instance, store, names, buffer_free: i32 => ()),
                    serialize_parse: typed_export!(
                        instance, store, names, serialize_parse: (i32, i32, i32, i32) => ()
                    ),
                    names,
                })
            }
        }

        /// Run the reactor initializer when the module exports one
        fn run_initializer(
            instance: &Instance,
            store: &mut Store<HostState>,
            names: &Entrypoints,
        ) -> BridgeResult<()> {
            if let Ok(init) = instance.get_typed_func::<(), ()>(&mut *store, &names.initialize) {
                init.call(&mut *store, ()).map_err(|err| {
                    BridgeError::load(format!("initializer '{}' trapped: {}", names.initialize, err))
                })?;
            }
            Ok(())
        }

        impl ForeignContext for $context {
            fn allocate(&mut self, count: u32, size: u32) -> BridgeResult<ForeignPtr> {
                let raw = self
                    .exports
                    .allocate
                    .call(&mut self.store, (count as i32, size as i32))
                    .map_err(|err| BridgeError::fault(&self.exports.names.allocate, err))?;
                non_null(raw, count, size)
            }

            fn release(&mut self, ptr: ForeignPtr) -> BridgeResult<()> {
                self.exports
                    .release
                    .call(&mut self.store, ptr.to_wasm())
                    .map_err(|err| BridgeError::fault(&self.exports.names.release, err))
            }

            fn buffer_sizeof(&mut self) -> BridgeResult<u32> {
                self.exports
                    .buffer_sizeof
                    .call(&mut self.store, ())
                    .map(|size| size as u32)
                    .map_err(|err| BridgeError::fault(&self.exports.names.buffer_sizeof, err))
            }

            fn buffer_init(&mut self, descriptor: ForeignPtr) -> BridgeResult<bool> {
                self.exports
                    .buffer_init
                    .call(&mut self.store, descriptor.to_wasm())
                    .map(|ok| ok != 0)
                    .map_err(|err| BridgeError::fault(&self.exports.names.buffer_init, err))
            }

            fn buffer_value(&mut self, descriptor: ForeignPtr) -> BridgeResult<ForeignPtr> {
                self.exports
                    .buffer_value
                    .call(&mut self.store, descriptor.to_wasm())
                    .map(ForeignPtr::from_wasm)
                    .map_err(|err| BridgeError::fault(&self.exports.names.buffer_value, err))
            }

            fn buffer_length(&mut self, descriptor: ForeignPtr) -> BridgeResult<u32> {
                self.exports
                    .buffer_length
                    .call(&mut self.store, descriptor.to_wasm())
                    .map(|length| length as u32)
                    .map_err(|err| BridgeError::fault(&self.exports.names.buffer_length, err))
            }

            fn buffer_free(&mut self, descriptor: ForeignPtr) -> BridgeResult<()> {
                self.exports
                    .buffer_free
                    .call(&mut self.store, descriptor.to_wasm())
                    .map_err(|err| BridgeError::fault(&self.exports.names.buffer_free, err))
            }

            fn serialize_parse(
                &mut self,
                descriptor: ForeignPtr,
                source: ForeignPtr,
                length: u32,
                options: ForeignPtr,
            ) -> BridgeResult<()> {
                let params = (
                    descriptor.to_wasm(),
                    source.to_wasm(),
                    length as i32,
                    options.to_wasm(),
                );
                self.exports
                    .serialize_parse
                    .call(&mut self.store, params)
                    .map_err(|err| BridgeError::fault(&self.exports.names.serialize_parse, err))
            }

            fn write(&mut self, at: ForeignPtr, bytes: &[u8]) -> BridgeResult<()> {
                let start = check_range(at, bytes.len(), self.memory_size())?;
                self.memory
                    .write(&mut self.store, start, bytes)
                    .map_err(|_| BridgeError::MemoryAccess {
                        address: at.addr(),
                        length: bytes.len(),
                    })
            }

            fn read(&mut self, at: ForeignPtr, length: usize) -> BridgeResult<Vec<u8>> {
                let start = check_range(at, length, self.memory_size())?;
                let mut out = vec![0u8; length];
                self.memory
                    .read(&self.store, start, &mut out)
                    .map_err(|_| BridgeError::MemoryAccess {
                        address: at.addr(),
                        length,
                    })?;
                Ok(out)
            }

            fn memory_size(&self) -> usize {
                self.memory.data(&self.store).len()
            }

            fn captured_output(&self) -> Option<CapturedOutput> {
                self.wasi_output()
            }

            fn exported_global(&mut self, name: &str) -> Option<i32> {
                let global = self.instance.get_global(&mut self.store, name)?;
                global.get(&mut self.store).i32()
            }
        }
    };
}

#[cfg(feature = "compiled")]
pub mod compiled;
#[cfg(feature = "interpreter")]
pub mod interpreted;

use std::fmt;

use super::config::EngineConfig;
use super::driver::{self, DriverConfig, ReservedScratch};
use super::error::{BridgeError, BridgeResult};
use super::foreign::ForeignContext;
use super::options::{ParsingOptions, NATIVE_ENDIAN_ASSUMED};
use super::wasi::CapturedOutput;

/// Which back end runs the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Bytecode interpreter (wasmi)
    Interpreted,
    /// Native code compiled ahead of the first call (wasmtime)
    Compiled,
}

impl EngineKind {
    /// Whether this back end was compiled into the crate
    pub fn is_available(self) -> bool {
        match self {
            EngineKind::Interpreted => cfg!(feature = "interpreter"),
            EngineKind::Compiled => cfg!(feature = "compiled"),
        }
    }
}

impl Default for EngineKind {
    fn default() -> Self {
        if cfg!(feature = "compiled") {
            EngineKind::Compiled
        } else {
            EngineKind::Interpreted
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Interpreted => f.write_str("interpreted"),
            EngineKind::Compiled => f.write_str("compiled"),
        }
    }
}

/// The capability every back end offers the host
///
/// Engines are `Send` so a [`Prism`](crate::Prism) can move to a worker
/// thread or sit behind a `Mutex`; they are never shared without one.
pub trait SerializeParse: Send {
    /// Parse `source` and return the engine's raw serialized result
    fn serialize_parse(&mut self, options: &ParsingOptions, source: &[u8]) -> BridgeResult<Vec<u8>>;

    /// Current size of the engine's linear memory in bytes
    fn memory_size(&self) -> usize;

    /// Which back end this is
    fn kind(&self) -> EngineKind;

    /// Output captured by the engine's WASI context, if capturing
    fn captured_output(&self) -> Option<CapturedOutput>;

    /// Value of an exported `i32` global (allocator counters, for instance)
    fn exported_global(&mut self, name: &str) -> Option<i32>;

    /// Release engine-held scratch; later calls fail with `EngineClosed`
    fn close(&mut self);
}

/// Lifecycle of an engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Ready,
    /// A foreign call faulted; memory contents are unknown
    Poisoned,
    Closed,
}

/// The shared invocation protocol over one foreign context
pub struct EngineRuntime<C: ForeignContext> {
    ctx: C,
    kind: EngineKind,
    driver: DriverConfig,
    scratch: Option<ReservedScratch>,
    state: EngineState,
}

impl<C: ForeignContext> EngineRuntime<C> {
    /// Wrap a loaded context, reserving scratch if configured
    pub fn new(mut ctx: C, kind: EngineKind, config: &EngineConfig) -> BridgeResult<Self> {
        let scratch = match &config.reserved_scratch {
            Some(scratch) => Some(ReservedScratch::reserve(&mut ctx, scratch)?),
            None => None,
        };

        log_debug!(
            "{} engine ready: {} bytes of linear memory, scratch {}",
            kind,
            ctx.memory_size(),
            if scratch.is_some() { "reserved" } else { "off" }
        );

        Ok(Self {
            ctx,
            kind,
            driver: config.driver(),
            scratch,
            state: EngineState::Ready,
        })
    }

    /// The underlying foreign context
    pub fn context(&self) -> &C {
        &self.ctx
    }

    /// Whether an earlier call faulted
    pub fn is_poisoned(&self) -> bool {
        self.state == EngineState::Poisoned
    }
}

impl<C: ForeignContext + Send> SerializeParse for EngineRuntime<C> {
    fn serialize_parse(&mut self, options: &ParsingOptions, source: &[u8]) -> BridgeResult<Vec<u8>> {
        match self.state {
            EngineState::Ready => {}
            EngineState::Poisoned => return Err(BridgeError::EnginePoisoned),
            EngineState::Closed => return Err(BridgeError::EngineClosed),
        }

        let packed = options.encode()?;
        let result = driver::serialize_parse(
            &mut self.ctx,
            self.scratch.as_ref(),
            &self.driver,
            &packed,
            source,
        );

        if let Err(err) = &result {
            if err.poisons_engine() {
                log_warn!("{} engine poisoned: {}", self.kind, err);
                self.state = EngineState::Poisoned;
            }
        }
        result
    }

    fn memory_size(&self) -> usize {
        self.ctx.memory_size()
    }

    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn captured_output(&self) -> Option<CapturedOutput> {
        self.ctx.captured_output()
    }

    fn exported_global(&mut self, name: &str) -> Option<i32> {
        self.ctx.exported_global(name)
    }

    fn close(&mut self) {
        if self.state == EngineState::Closed {
            return;
        }
        if let Some(scratch) = self.scratch.take() {
            // A poisoned instance is discarded with its memory
            if self.state == EngineState::Ready {
                if let Err(_err) = scratch.release(&mut self.ctx) {
                    log_warn!("releasing scratch on close failed: {}", _err);
                }
            }
        }
        self.state = EngineState::Closed;
    }
}

/// Load `wasm` with the back end named in `config`
pub fn load(wasm: &[u8], config: &EngineConfig) -> BridgeResult<Box<dyn SerializeParse>> {
    if !NATIVE_ENDIAN_ASSUMED {
        return Err(BridgeError::load(
            "host byte order differs from the engine's little-endian memory",
        ));
    }

    if config.wasi.is_some() && !cfg!(feature = "wasi") {
        return Err(BridgeError::load(
            "a WASI context requires the `wasi` feature",
        ));
    }

    match config.kind {
        EngineKind::Interpreted => load_interpreted(wasm, config),
        EngineKind::Compiled => load_compiled(wasm, config),
    }
}

#[cfg(feature = "interpreter")]
fn load_interpreted(wasm: &[u8], config: &EngineConfig) -> BridgeResult<Box<dyn SerializeParse>> {
    let ctx = interpreted::InterpretedContext::load(wasm, config)?;
    Ok(Box::new(EngineRuntime::new(ctx, EngineKind::Interpreted, config)?))
}

#[cfg(not(feature = "interpreter"))]
fn load_interpreted(_wasm: &[u8], _config: &EngineConfig) -> BridgeResult<Box<dyn SerializeParse>> {
    Err(BridgeError::load(
        "the interpreted engine requires the `interpreter` feature",
    ))
}

#[cfg(feature = "compiled")]
fn load_compiled(wasm: &[u8], config: &EngineConfig) -> BridgeResult<Box<dyn SerializeParse>> {
    let ctx = compiled::CompiledContext::load(wasm, config)?;
    Ok(Box::new(EngineRuntime::new(ctx, EngineKind::Compiled, config)?))
}

#[cfg(not(feature = "compiled"))]
fn load_compiled(_wasm: &[u8], _config: &EngineConfig) -> BridgeResult<Box<dyn SerializeParse>> {
    Err(BridgeError::load(
        "the compiled engine requires the `compiled` feature",
    ))
}
