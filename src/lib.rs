//! prism-host - run a sandboxed WebAssembly parser and decode its output
//!
//! The parsing engine lives in an isolated WebAssembly instance with its own
//! linear memory. This crate is the host side of that boundary:
//! - Packing parser options into the engine's fixed binary layout
//! - Scoped allocation of scratch memory inside the foreign instance
//! - The result-buffer protocol and the transactional parse call
//! - Decoding the serialized tree, locations and diagnostics
//! - Two interchangeable execution back ends (interpreted and compiled)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use prism_host::{ParsingOptions, Prism};
//!
//! let wasm = std::fs::read("prism.wasm")?;
//! let mut prism = Prism::new(&wasm)?;
//!
//! let options = ParsingOptions::new().with_filepath("example.rb");
//! let result = prism.parse(&options, "1 + 1")?;
//!
//! assert!(result.is_success());
//! println!("{}", result.value);
//! ```
//!
//! ## Choosing a back end
//!
//! ```rust,ignore
//! use prism_host::{EngineConfig, EngineKind, Prism};
//!
//! let config = EngineConfig::new().with_kind(EngineKind::Interpreted);
//! let mut prism = Prism::with_config(&wasm, config)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `interpreter` - Interpreted back end via wasmi (default)
//! - `compiled` - Ahead-of-time back end via wasmtime (default)
//! - `wasi` - Link a WASI preview1 context into both back ends
//!   (`EngineConfig::with_wasi`)
//! - `logging` - Enable debug logging using the `log` crate

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all)]
#![allow(clippy::new_without_default)]

/// Logging macros - no-op when logging feature is disabled
#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

/// Logging macros - use log crate when logging feature is enabled
#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "logging")]
macro_rules! log_warn {
    ($($arg:tt)*) => { log::warn!($($arg)*) };
}

// Prelude module for convenient imports
pub mod prelude;

// Host side of the engine boundary
pub mod bridge;

/// Re-export commonly used types for convenience
pub use bridge::{
    // Decoding
    ast::{Field, FieldValue, Node, NodeKind},
    catalog::{FieldKind, FieldSpec, NodeCatalog, NodeLayout},
    decoder::{decode, DecodeError, DecodeErrorKind, Decoder},
    // Debug tools
    debug::TreePrinter,
    // Engines
    engine::{EngineKind, SerializeParse},
    // Errors
    error::{BridgeError, BridgeResult},
    // Configuration
    config::{EngineConfig, Entrypoints, ScratchConfig},
    host::Prism,
    options::{CommandLineFlags, ParsingOptions, SyntaxVersion},
    result::{Diagnostic, DiagnosticLevel, MagicComment, ParseResult},
    source_location::{LineIndex, Location},
    visitor::{walk, Visitor},
    wasi::{CapturedOutput, WasiConfig, WasiStdio},
};
