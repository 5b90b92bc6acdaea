//! Ahead-of-time back end (wasmtime + Cranelift)
//!
//! The module is compiled to native code once, when the context is loaded;
//! every later call runs the compiled code directly.

use wasmtime::{
    Config, Engine, Instance, Linker, Memory, Module, OptLevel, Store, StoreLimits,
    StoreLimitsBuilder, Strategy, TypedFunc,
};

use crate::bridge::config::{EngineConfig, Entrypoints};
use crate::bridge::error::{BridgeError, BridgeResult};
use crate::bridge::foreign::{check_range, non_null, ForeignContext, ForeignPtr};
use crate::bridge::wasi::CapturedOutput;
#[cfg(feature = "wasi")]
use crate::bridge::wasi::{WasiConfig, WasiStdio};
#[cfg(feature = "wasi")]
use wasmtime_wasi::{pipe::MemoryOutputPipe, preview1::WasiP1Ctx, WasiCtxBuilder};

/// Per-store host data
struct HostState {
    limits: StoreLimits,
    #[cfg(feature = "wasi")]
    wasi: WasiP1Ctx,
}

/// In-memory stdio pipes, shared with the store's WASI context
#[cfg(feature = "wasi")]
struct Capture {
    stdout: MemoryOutputPipe,
    stderr: MemoryOutputPipe,
}

/// One engine instance compiled to native code
pub struct CompiledContext {
    store: Store<HostState>,
    instance: Instance,
    memory: Memory,
    exports: Exports,
    #[cfg(feature = "wasi")]
    capture: Option<Capture>,
}

engine_context!(CompiledContext);

impl CompiledContext {
    /// Compile the module and instantiate it in a fresh store
    ///
    /// With a WASI context configured, preview1 imports are served by
    /// `wasmtime-wasi`. Any other import is defined as a function that traps.
    pub fn load(wasm: &[u8], config: &EngineConfig) -> BridgeResult<Self> {
        let mut compiler = Config::new();
        compiler
            .strategy(Strategy::Cranelift)
            .cranelift_opt_level(OptLevel::Speed);
        let engine = Engine::new(&compiler).map_err(BridgeError::load)?;
        let module = Module::new(&engine, wasm).map_err(BridgeError::load)?;

        let limits = match config.max_memory_bytes {
            Some(bytes) => StoreLimitsBuilder::new().memory_size(bytes).build(),
            None => StoreLimits::default(),
        };
        #[cfg(feature = "wasi")]
        let (wasi, capture) = wasi_context(config.wasi.as_ref());
        let state = HostState {
            limits,
            #[cfg(feature = "wasi")]
            wasi,
        };
        let mut store = Store::new(&engine, state);
        store.limiter(|state: &mut HostState| &mut state.limits);

        let mut linker = Linker::<HostState>::new(&engine);
        #[cfg(feature = "wasi")]
        if config.wasi.is_some() {
            wasmtime_wasi::preview1::add_to_linker_sync(&mut linker, |state: &mut HostState| {
                &mut state.wasi
            })
            .map_err(BridgeError::load)?;
        }
        linker
            .define_unknown_imports_as_traps(&module)
            .map_err(BridgeError::load)?;
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(BridgeError::load)?;

        let names = config.entrypoints.clone();
        let memory = instance
            .get_memory(&mut store, &names.memory)
            .ok_or_else(|| BridgeError::load(format!("memory export '{}' not found", names.memory)))?;

        run_initializer(&instance, &mut store, &names)?;
        let exports = Exports::resolve(&instance, &mut store, names)?;

        Ok(Self {
            store,
            instance,
            memory,
            exports,
            #[cfg(feature = "wasi")]
            capture,
        })
    }

    #[cfg(feature = "wasi")]
    fn wasi_output(&self) -> Option<CapturedOutput> {
        self.capture.as_ref().map(|capture| CapturedOutput {
            stdout: capture.stdout.contents().to_vec(),
            stderr: capture.stderr.contents().to_vec(),
        })
    }

    #[cfg(not(feature = "wasi"))]
    fn wasi_output(&self) -> Option<CapturedOutput> {
        None
    }
}

/// Build the preview1 context; writes past the capture limit fail the call
#[cfg(feature = "wasi")]
fn wasi_context(config: Option<&WasiConfig>) -> (WasiP1Ctx, Option<Capture>) {
    let mut builder = WasiCtxBuilder::new();
    let mut capture = None;
    if let Some(wasi) = config {
        for arg in &wasi.args {
            builder.arg(arg);
        }
        for (key, value) in &wasi.env {
            builder.env(key, value);
        }
        match wasi.stdio {
            WasiStdio::Null => {}
            WasiStdio::Inherit => {
                builder.inherit_stdio();
            }
            WasiStdio::Capture => {
                let pipes = Capture {
                    stdout: MemoryOutputPipe::new(wasi.capture_limit),
                    stderr: MemoryOutputPipe::new(wasi.capture_limit),
                };
                builder.stdout(pipes.stdout.clone());
                builder.stderr(pipes.stderr.clone());
                capture = Some(pipes);
            }
        }
    }
    (builder.build_p1(), capture)
}
