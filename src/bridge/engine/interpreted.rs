//! Interpreted back end (wasmi)

use wasmi::{
    Engine, ExternType, Func, Instance, Linker, Memory, Module, Store, StoreLimits,
    StoreLimitsBuilder, TypedFunc,
};

use crate::bridge::config::{EngineConfig, Entrypoints};
use crate::bridge::error::{BridgeError, BridgeResult};
use crate::bridge::foreign::{check_range, non_null, ForeignContext, ForeignPtr};
use crate::bridge::wasi::CapturedOutput;
#[cfg(feature = "wasi")]
use crate::bridge::wasi::{WasiConfig, WasiStdio, WASI_MODULE};

/// Per-store host data
struct HostState {
    limits: StoreLimits,
    #[cfg(feature = "wasi")]
    wasi: wasmi_wasi::WasiCtx,
}

/// One engine instance run by the wasmi interpreter
pub struct InterpretedContext {
    store: Store<HostState>,
    instance: Instance,
    memory: Memory,
    exports: Exports,
}

engine_context!(InterpretedContext);

impl InterpretedContext {
    /// Instantiate the module in a fresh store
    ///
    /// With a WASI context configured, preview1 imports are served by
    /// `wasmi_wasi`. Every other function import is bound to a stub that
    /// traps.
    pub fn load(wasm: &[u8], config: &EngineConfig) -> BridgeResult<Self> {
        let engine = Engine::default();
        let module = Module::new(&engine, wasm).map_err(BridgeError::load)?;

        let limits = match config.max_memory_bytes {
            Some(bytes) => StoreLimitsBuilder::new().memory_size(bytes).build(),
            None => StoreLimits::default(),
        };
        let state = HostState {
            limits,
            #[cfg(feature = "wasi")]
            wasi: wasi_context(config.wasi.as_ref())?,
        };
        let mut store = Store::new(&engine, state);
        store.limiter(|state: &mut HostState| &mut state.limits);

        let mut linker = Linker::<HostState>::new(&engine);
        #[cfg(feature = "wasi")]
        if config.wasi.is_some() {
            wasmi_wasi::add_to_linker(&mut linker, |state: &mut HostState| &mut state.wasi)
                .map_err(BridgeError::load)?;
        }

        for import in module.imports() {
            #[cfg(feature = "wasi")]
            if config.wasi.is_some() && import.module() == WASI_MODULE {
                continue;
            }

            let qualified = format!("{}::{}", import.module(), import.name());
            match import.ty() {
                ExternType::Func(ty) => {
                    let stub = Func::new(&mut store, ty.clone(), move |_caller, _params, _results| {
                        Err(wasmi::Error::new(format!(
                            "import {} is not available to the engine",
                            qualified
                        )))
                    });
                    linker
                        .define(import.module(), import.name(), stub)
                        .map_err(BridgeError::load)?;
                }
                _ => {
                    return Err(BridgeError::load(format!(
                        "unsupported non-function import {}",
                        qualified
                    )))
                }
            }
        }

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(BridgeError::load)?
            .start(&mut store)
            .map_err(BridgeError::load)?;

        let names = config.entrypoints.clone();
        let memory = instance
            .get_memory(&store, &names.memory)
            .ok_or_else(|| BridgeError::load(format!("memory export '{}' not found", names.memory)))?;

        run_initializer(&instance, &mut store, &names)?;
        let exports = Exports::resolve(&instance, &mut store, names)?;

        Ok(Self {
            store,
            instance,
            memory,
            exports,
        })
    }

    /// wasi-common streams have no in-memory sink reachable through
    /// `wasmi_wasi`; capture is a compiled-engine feature
    fn wasi_output(&self) -> Option<CapturedOutput> {
        None
    }
}

#[cfg(feature = "wasi")]
fn wasi_context(config: Option<&WasiConfig>) -> BridgeResult<wasmi_wasi::WasiCtx> {
    let mut builder = wasmi_wasi::WasiCtxBuilder::new();
    if let Some(wasi) = config {
        for arg in &wasi.args {
            builder.arg(arg).map_err(BridgeError::load)?;
        }
        for (key, value) in &wasi.env {
            builder.env(key, value).map_err(BridgeError::load)?;
        }
        match wasi.stdio {
            WasiStdio::Null => {}
            WasiStdio::Inherit => {
                builder.inherit_stdio();
            }
            WasiStdio::Capture => {
                return Err(BridgeError::load(
                    "stdio capture is only available on the compiled engine",
                ))
            }
        }
    }
    Ok(builder.build())
}
