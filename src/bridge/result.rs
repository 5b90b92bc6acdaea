//! Decoded parse results

use std::fmt;

use serde::Serialize;

use super::ast::Node;
use super::source_location::Location;

/// Severity of a parser diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    /// An error reported unconditionally
    Error,
    /// A warning emitted in verbose mode when `$VERBOSE` is not nil
    WarningVerboseNotNil,
    /// A warning emitted only when `$VERBOSE` is true
    WarningVerboseTrue,
}

impl DiagnosticLevel {
    /// Map a wire level to a diagnostic level
    pub fn from_u8(level: u8) -> Option<Self> {
        match level {
            0 => Some(DiagnosticLevel::Error),
            1 => Some(DiagnosticLevel::WarningVerboseNotNil),
            2 => Some(DiagnosticLevel::WarningVerboseTrue),
            _ => None,
        }
    }

    /// Wire value of the level
    pub fn as_u8(self) -> u8 {
        match self {
            DiagnosticLevel::Error => 0,
            DiagnosticLevel::WarningVerboseNotNil => 1,
            DiagnosticLevel::WarningVerboseTrue => 2,
        }
    }
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::WarningVerboseNotNil => "warning (verbose not nil)",
            DiagnosticLevel::WarningVerboseTrue => "warning (verbose)",
        };
        f.write_str(name)
    }
}

/// An error or warning reported by the parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Human-readable message
    pub message: String,
    /// Source range the diagnostic refers to
    pub location: Location,
    /// Severity
    pub level: DiagnosticLevel,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.level, self.location, self.message)
    }
}

/// A magic comment such as `# frozen_string_literal: true`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MagicComment {
    /// Span of the key
    pub key: Location,
    /// Span of the value
    pub value: Location,
}

/// Everything one parse call produced
///
/// A result with errors is still a successful call; check
/// [`is_success`](Self::is_success) or inspect [`errors`](Self::errors).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseResult {
    /// Root node of the tree
    pub value: Node,
    /// Magic comments in source order
    pub magic_comments: Vec<MagicComment>,
    /// Span of the data section after `__END__`, if any
    pub data_location: Option<Location>,
    /// Syntax errors
    pub errors: Vec<Diagnostic>,
    /// Warnings
    pub warnings: Vec<Diagnostic>,
}

impl ParseResult {
    /// Whether the parse reported no errors
    #[inline]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Key and value text of each magic comment
    ///
    /// `source` must be the source the result was decoded against.
    pub fn magic_comment_text<'a>(&self, source: &'a [u8]) -> Vec<(&'a [u8], &'a [u8])> {
        self.magic_comments
            .iter()
            .filter_map(|comment| Some((comment.key.slice(source)?, comment.value.slice(source)?)))
            .collect()
    }

    /// Errors and warnings together, errors first
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.errors.iter().chain(self.warnings.iter())
    }

    /// Render the result as pretty-printed JSON
    pub fn to_json(&self) -> String {
        // Serializing plain data with string keys cannot fail
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
