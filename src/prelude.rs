//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types and traits from
//! prism-host. Importing this module with a wildcard import brings the core
//! types into scope:
//!
//! ```
//! use prism_host::prelude::*;
//! ```
//!
//! # Re-exported Items
//!
//! ## Core Types
//! - [`Prism`] - A loaded parser engine
//! - [`ParsingOptions`] - Configuration for one parse call
//! - [`ParseResult`] - Decoded tree, magic comments and diagnostics
//! - [`Node`] - A decoded parse-tree node
//!
//! ## Configuration
//! - [`EngineConfig`] - Engine loading options
//! - [`EngineKind`] - Interpreted or compiled back end
//!
//! ## Error Handling
//! - [`BridgeError`] - Errors of the bridge layer
//! - [`BridgeResult`] - Result alias

// ============================================================================
// Core Types
// ============================================================================

pub use crate::bridge::{
    Diagnostic, DiagnosticLevel, FieldValue, Location, Node, ParseResult, ParsingOptions, Prism,
};

// ============================================================================
// Configuration
// ============================================================================

pub use crate::bridge::{
    CommandLineFlags, EngineConfig, EngineKind, ScratchConfig, SyntaxVersion, WasiConfig, WasiStdio,
};

// ============================================================================
// Error Handling
// ============================================================================

pub use crate::bridge::{BridgeError, BridgeResult};

// ============================================================================
// Traversal
// ============================================================================

pub use crate::bridge::{walk, Visitor};
