//! Host facade
//!
//! [`Prism`] owns one engine instance and turns source text into a decoded
//! [`ParseResult`]. Calls take `&mut self`: one instance serves one call at a
//! time. `Prism` is `Send`, so it can move to a worker thread, and sharing it
//! across threads needs an outside lock.

use super::catalog::NodeCatalog;
use super::config::EngineConfig;
use super::decoder::Decoder;
use super::engine::{self, EngineKind, SerializeParse};
use super::error::BridgeResult;
use super::options::ParsingOptions;
use super::result::ParseResult;
use super::wasi::CapturedOutput;

/// A loaded parser engine
pub struct Prism {
    engine: Box<dyn SerializeParse>,
    catalog: NodeCatalog,
    max_depth: usize,
}

impl Prism {
    /// Load an engine module with the default configuration
    pub fn new(wasm: &[u8]) -> BridgeResult<Self> {
        Self::with_config(wasm, EngineConfig::default())
    }

    /// Load an engine module
    pub fn with_config(wasm: &[u8], config: EngineConfig) -> BridgeResult<Self> {
        let engine = engine::load(wasm, &config)?;
        Ok(Self::from_engine(engine, config.max_nesting_depth))
    }

    /// Wrap an already loaded engine
    pub fn from_engine(engine: Box<dyn SerializeParse>, max_depth: usize) -> Self {
        Self {
            engine,
            catalog: NodeCatalog::builtin().clone(),
            max_depth,
        }
    }

    /// Decode with a different node catalog
    pub fn with_catalog(mut self, catalog: NodeCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Parse `source` and decode the result
    ///
    /// Syntax errors are not failures here; they are in
    /// [`ParseResult::errors`].
    pub fn parse(
        &mut self,
        options: &ParsingOptions,
        source: impl AsRef<[u8]>,
    ) -> BridgeResult<ParseResult> {
        let source = source.as_ref();
        let raw = self.engine.serialize_parse(options, source)?;
        Decoder::new(&self.catalog)
            .with_max_depth(self.max_depth)
            .decode(&raw, source)
    }

    /// Parse `source` and return the engine's raw serialized result
    pub fn serialize(
        &mut self,
        options: &ParsingOptions,
        source: impl AsRef<[u8]>,
    ) -> BridgeResult<Vec<u8>> {
        self.engine.serialize_parse(options, source.as_ref())
    }

    /// Current size of the engine's linear memory in bytes
    pub fn memory_size(&self) -> usize {
        self.engine.memory_size()
    }

    /// Which back end runs the engine
    pub fn kind(&self) -> EngineKind {
        self.engine.kind()
    }

    /// Stdout and stderr the engine wrote through WASI, when capturing
    pub fn captured_output(&self) -> Option<CapturedOutput> {
        self.engine.captured_output()
    }

    /// Read an `i32` global the engine exports
    ///
    /// Useful for allocator counters a test or debug build of the engine
    /// chooses to export. `None` when no such global exists.
    pub fn exported_global(&mut self, name: &str) -> Option<i32> {
        self.engine.exported_global(name)
    }

    /// The catalog used for decoding
    pub fn catalog(&self) -> &NodeCatalog {
        &self.catalog
    }

    /// Release engine-held scratch; later calls fail with `EngineClosed`
    pub fn close(&mut self) {
        self.engine.close();
    }
}

impl Drop for Prism {
    fn drop(&mut self) {
        self.engine.close();
    }
}
