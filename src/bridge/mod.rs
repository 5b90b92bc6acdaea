//! Host side of the engine boundary
//!
//! # Module Organization
//!
//! ## Foreign Memory
//! - [`foreign`] - The calls a host can make into an engine instance
//! - [`arena`] - Scoped allocations released in reverse order
//! - [`buffer`] - Result buffer protocol
//!
//! ## Invocation
//! - [`options`] - Parser options and their packed layout
//! - [`driver`] - One parse call as a single transaction
//! - [`engine`] - Interpreted and compiled back ends
//! - [`host`] - The [`Prism`] facade
//! - [`wasi`] - Optional WASI preview1 context
//!
//! ## Decoding
//! - [`catalog`] - Node-kind table (tag to field layout)
//! - [`decoder`] - Result decoder
//! - [`ast`] - Decoded nodes
//! - [`result`] - Parse results and diagnostics
//! - [`source_location`] - Locations and line/column lookup
//!
//! ## Tools
//! - [`visitor`] - Depth-first traversal
//! - [`debug`] - Tree printer

// ============================================================================
// Module Declarations
// ============================================================================

pub mod arena;
pub mod ast;
pub mod buffer;
pub mod catalog;
pub mod config;
pub mod debug;
pub mod decoder;
pub mod driver;
pub mod engine;
pub mod error;
pub mod foreign;
pub mod host;
pub mod options;
pub mod result;
pub mod source_location;
pub mod visitor;
pub mod wasi;

// ============================================================================
// Foreign Memory
// ============================================================================

pub use arena::ForeignArena;
pub use buffer::ResultBuffer;
pub use foreign::{ForeignContext, ForeignPtr};

// ============================================================================
// Invocation
// ============================================================================

pub use config::{EngineConfig, Entrypoints, ScratchConfig};
pub use driver::{serialize_parse, DriverConfig, ReservedScratch};
pub use engine::{EngineKind, EngineRuntime, SerializeParse};
pub use host::Prism;
pub use options::{encode as encode_options, CommandLineFlags, ParsingOptions, SyntaxVersion};
pub use wasi::{CapturedOutput, WasiConfig, WasiStdio, WASI_MODULE};

// ============================================================================
// Decoding
// ============================================================================

pub use ast::{Field, FieldValue, Node, NodeKind};
pub use catalog::{FieldKind, FieldSpec, NodeCatalog, NodeLayout, BUILTIN_LAYOUTS};
pub use decoder::{decode, DecodeError, DecodeErrorKind, Decoder, DEFAULT_MAX_DEPTH};
pub use result::{Diagnostic, DiagnosticLevel, MagicComment, ParseResult};
pub use source_location::{LineColumn, LineIndex, Location};

// ============================================================================
// Error Handling
// ============================================================================

pub use error::{BridgeError, BridgeResult};

// ============================================================================
// Tools
// ============================================================================

pub use debug::TreePrinter;
pub use visitor::{walk, Visitor};
