//! Engine configuration

use super::decoder::DEFAULT_MAX_DEPTH;
use super::driver::DriverConfig;
use super::engine::EngineKind;
use super::wasi::WasiConfig;

/// Default size of the reserved source region (2 MiB)
pub const DEFAULT_SCRATCH_SOURCE_BYTES: u32 = 2 * 1024 * 1024;

/// Default size of the reserved options region (1 KiB)
pub const DEFAULT_SCRATCH_OPTIONS_BYTES: u32 = 1024;

/// Export names of the engine's entrypoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entrypoints {
    /// `calloc(count, size) -> ptr`
    pub allocate: String,
    /// `free(ptr)`
    pub release: String,
    /// `pm_buffer_sizeof() -> size`
    pub buffer_sizeof: String,
    /// `pm_buffer_init(descriptor) -> bool`
    pub buffer_init: String,
    /// `pm_buffer_value(descriptor) -> ptr`
    pub buffer_value: String,
    /// `pm_buffer_length(descriptor) -> length`
    pub buffer_length: String,
    /// `pm_buffer_free(descriptor)`
    pub buffer_free: String,
    /// `pm_serialize_parse(descriptor, source, length, options)`
    pub serialize_parse: String,
    /// Exported linear memory
    pub memory: String,
    /// Reactor initializer, called once after instantiation when exported
    pub initialize: String,
}

impl Default for Entrypoints {
    fn default() -> Self {
        Self {
            allocate: "calloc".to_string(),
            release: "free".to_string(),
            buffer_sizeof: "pm_buffer_sizeof".to_string(),
            buffer_init: "pm_buffer_init".to_string(),
            buffer_value: "pm_buffer_value".to_string(),
            buffer_length: "pm_buffer_length".to_string(),
            buffer_free: "pm_buffer_free".to_string(),
            serialize_parse: "pm_serialize_parse".to_string(),
            memory: "memory".to_string(),
            initialize: "_initialize".to_string(),
        }
    }
}

/// Sizes of the regions reserved for reuse across calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchConfig {
    /// Bytes reserved for the source (including any terminator)
    pub source_bytes: u32,
    /// Bytes reserved for packed options
    pub options_bytes: u32,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            source_bytes: DEFAULT_SCRATCH_SOURCE_BYTES,
            options_bytes: DEFAULT_SCRATCH_OPTIONS_BYTES,
        }
    }
}

/// Configuration for loading an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Execution back end
    pub kind: EngineKind,

    /// Entrypoint names
    pub entrypoints: Entrypoints,

    /// Write a 0 byte after the source copy
    pub nul_terminate_source: bool,

    /// Regions to reserve once and reuse (None = allocate per call)
    pub reserved_scratch: Option<ScratchConfig>,

    /// Cap on linear memory in bytes (None = the module's own maximum)
    pub max_memory_bytes: Option<usize>,

    /// Maximum node nesting accepted by the decoder
    pub max_nesting_depth: usize,

    /// WASI preview1 context (None = WASI imports trap like any other)
    pub wasi: Option<WasiConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::default(),
            entrypoints: Entrypoints::default(),
            nul_terminate_source: false,
            reserved_scratch: None,
            max_memory_bytes: None,
            max_nesting_depth: DEFAULT_MAX_DEPTH,
            wasi: None,
        }
    }
}

impl EngineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the execution back end
    pub fn with_kind(mut self, kind: EngineKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the entrypoint names
    pub fn with_entrypoints(mut self, entrypoints: Entrypoints) -> Self {
        self.entrypoints = entrypoints;
        self
    }

    /// Write a 0 byte after the source copy
    pub fn with_nul_terminated_source(mut self, enabled: bool) -> Self {
        self.nul_terminate_source = enabled;
        self
    }

    /// Reserve scratch regions with the given sizes
    pub fn with_reserved_scratch(mut self, scratch: ScratchConfig) -> Self {
        self.reserved_scratch = Some(scratch);
        self
    }

    /// Cap linear memory
    pub fn with_max_memory_bytes(mut self, bytes: usize) -> Self {
        self.max_memory_bytes = Some(bytes);
        self
    }

    /// Set the decoder's nesting limit
    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Link a WASI preview1 context (needs the `wasi` feature)
    pub fn with_wasi(mut self, wasi: WasiConfig) -> Self {
        self.wasi = Some(wasi);
        self
    }

    /// Driver settings derived from this config
    pub fn driver(&self) -> DriverConfig {
        DriverConfig {
            nul_terminate_source: self.nul_terminate_source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new();
        assert!(config.reserved_scratch.is_none());
        assert!(!config.nul_terminate_source);
        assert_eq!(config.max_nesting_depth, 2048);
        assert_eq!(config.entrypoints.serialize_parse, "pm_serialize_parse");
        assert!(config.wasi.is_none());
        assert_eq!(ScratchConfig::default().source_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::new()
            .with_kind(EngineKind::Interpreted)
            .with_nul_terminated_source(true)
            .with_reserved_scratch(ScratchConfig {
                source_bytes: 64,
                options_bytes: 16,
            })
            .with_max_memory_bytes(1 << 20)
            .with_max_nesting_depth(10)
            .with_wasi(WasiConfig::new().with_arg("prism"));

        assert_eq!(config.kind, EngineKind::Interpreted);
        assert!(config.driver().nul_terminate_source);
        assert_eq!(config.reserved_scratch.map(|s| s.options_bytes), Some(16));
        assert_eq!(config.max_memory_bytes, Some(1 << 20));
        assert_eq!(config.max_nesting_depth, 10);
        assert_eq!(config.wasi.map(|wasi| wasi.args), Some(vec!["prism".to_string()]));
    }
}
