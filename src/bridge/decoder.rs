//! Result decoder
//!
//! Walks the raw bytes produced by the engine's serialize entrypoint and
//! rebuilds a [`ParseResult`]. Decoding is sequential and total: every read
//! is bounds checked, every location is checked against the source, and the
//! input must be consumed exactly.
//!
//! The decoder knows nothing about concrete node kinds. For each node it
//! looks the tag up in a [`NodeCatalog`] and decodes the fields the layout
//! lists, so a regenerated catalog only needs a new table.

use std::fmt;

use super::ast::{Field, FieldValue, Node, NodeKind};
use super::catalog::{FieldKind, NodeCatalog, TAG_ABSENT};
use super::error::{BridgeError, BridgeResult};
use super::result::{Diagnostic, DiagnosticLevel, MagicComment, ParseResult};
use super::source_location::Location;

/// Default limit on node nesting
pub const DEFAULT_MAX_DEPTH: usize = 2048;

/// What went wrong while decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// A read ran past the end of the input
    UnexpectedEnd {
        /// Bytes the read needed
        needed: usize,
        /// Bytes left in the input
        remaining: usize,
    },
    /// A node tag not present in the catalog
    UnknownNodeKind {
        /// The offending tag
        tag: u8,
    },
    /// The absent-node tag where a node is required
    MissingNode,
    /// A presence byte other than 0 or 1
    InvalidPresence {
        /// The offending byte
        byte: u8,
    },
    /// A diagnostic level outside the known range
    InvalidLevel {
        /// The offending level
        level: u8,
    },
    /// A diagnostic message that is not valid UTF-8
    InvalidUtf8,
    /// A location that does not fit the source
    InvalidLocation {
        /// Start offset
        start: u32,
        /// End offset
        end: u32,
        /// Length of the source
        source_len: usize,
    },
    /// Nodes nested deeper than the decoder allows
    DepthLimitExceeded {
        /// The configured limit
        limit: usize,
    },
    /// Bytes left over after the last section
    TrailingBytes {
        /// Number of undecoded bytes
        remaining: usize,
    },
}

/// Error produced while decoding a result buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// Byte offset in the raw result where the failure was detected
    pub offset: usize,
    /// Error kind
    pub kind: DecodeErrorKind,
}

impl DecodeError {
    /// Create a new decode error
    pub fn new(offset: usize, kind: DecodeErrorKind) -> Self {
        Self { offset, kind }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DecodeErrorKind::UnexpectedEnd { needed, remaining } => write!(
                f,
                "unexpected end of input at offset {}: needed {} bytes, {} remaining",
                self.offset, needed, remaining
            ),
            DecodeErrorKind::UnknownNodeKind { tag } => {
                write!(f, "unknown node tag {} at offset {}", tag, self.offset)
            }
            DecodeErrorKind::MissingNode => {
                write!(f, "required node is absent at offset {}", self.offset)
            }
            DecodeErrorKind::InvalidPresence { byte } => write!(
                f,
                "invalid presence byte {} at offset {}",
                byte, self.offset
            ),
            DecodeErrorKind::InvalidLevel { level } => write!(
                f,
                "invalid diagnostic level {} at offset {}",
                level, self.offset
            ),
            DecodeErrorKind::InvalidUtf8 => {
                write!(f, "diagnostic message at offset {} is not UTF-8", self.offset)
            }
            DecodeErrorKind::InvalidLocation {
                start,
                end,
                source_len,
            } => write!(
                f,
                "location {}..{} at offset {} does not fit a source of {} bytes",
                start, end, self.offset, source_len
            ),
            DecodeErrorKind::DepthLimitExceeded { limit } => write!(
                f,
                "nodes nested deeper than {} at offset {}",
                limit, self.offset
            ),
            DecodeErrorKind::TrailingBytes { remaining } => write!(
                f,
                "{} trailing bytes after offset {}",
                remaining, self.offset
            ),
        }
    }
}

impl std::error::Error for DecodeError {}

// ============================================================================
// Byte reader
// ============================================================================

/// Bounds-checked cursor over the raw result
struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    #[inline]
    fn error(&self, kind: DecodeErrorKind) -> DecodeError {
        DecodeError::new(self.pos, kind)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(self.error(DecodeErrorKind::UnexpectedEnd {
                needed: n,
                remaining: self.remaining(),
            }));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        self.array().map(u32::from_ne_bytes)
    }

    fn i64(&mut self) -> Result<i64, DecodeError> {
        self.array().map(i64::from_ne_bytes)
    }

    fn f64(&mut self) -> Result<f64, DecodeError> {
        self.array().map(f64::from_ne_bytes)
    }

    /// Read a u32 count and check that `count * min_size` bytes remain
    ///
    /// Keeps a corrupt count from driving a huge allocation.
    fn count(&mut self, min_size: usize) -> Result<usize, DecodeError> {
        let at = self.pos;
        let count = self.u32()? as usize;
        let needed = count.saturating_mul(min_size);
        if needed > self.remaining() {
            return Err(DecodeError::new(
                at,
                DecodeErrorKind::UnexpectedEnd {
                    needed,
                    remaining: self.remaining(),
                },
            ));
        }
        Ok(count)
    }

    fn bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn presence(&mut self) -> Result<bool, DecodeError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            byte => {
                self.pos -= 1;
                Err(self.error(DecodeErrorKind::InvalidPresence { byte }))
            }
        }
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Decoder for serialized parse results
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'c> {
    catalog: &'c NodeCatalog,
    max_depth: usize,
}

impl<'c> Decoder<'c> {
    /// Create a decoder over the given catalog
    pub fn new(catalog: &'c NodeCatalog) -> Self {
        Self {
            catalog,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Set the maximum node nesting depth
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// The catalog used for node layouts
    pub fn catalog(&self) -> &'c NodeCatalog {
        self.catalog
    }

    /// Decode a raw result against the source it was produced from
    pub fn decode(&self, raw: &[u8], source: &[u8]) -> BridgeResult<ParseResult> {
        let mut state = DecodeState {
            reader: ByteReader::new(raw),
            catalog: self.catalog,
            max_depth: self.max_depth,
            source_len: source.len(),
        };
        state.result().map_err(BridgeError::from)
    }
}

/// Decode a raw result with the builtin catalog
pub fn decode(raw: &[u8], source: &[u8]) -> BridgeResult<ParseResult> {
    Decoder::new(NodeCatalog::builtin()).decode(raw, source)
}

struct DecodeState<'a, 'c> {
    reader: ByteReader<'a>,
    catalog: &'c NodeCatalog,
    max_depth: usize,
    source_len: usize,
}

impl DecodeState<'_, '_> {
    fn result(&mut self) -> Result<ParseResult, DecodeError> {
        let root = self.node(1)?;

        // Each magic comment is two locations
        let count = self.reader.count(16)?;
        let mut magic_comments = Vec::with_capacity(count);
        for _ in 0..count {
            let key = self.location()?;
            let value = self.location()?;
            magic_comments.push(MagicComment { key, value });
        }

        let data_location = if self.reader.presence()? {
            Some(self.location()?)
        } else {
            None
        };

        let errors = self.diagnostics()?;
        let warnings = self.diagnostics()?;

        if self.reader.remaining() != 0 {
            return Err(self.reader.error(DecodeErrorKind::TrailingBytes {
                remaining: self.reader.remaining(),
            }));
        }

        Ok(ParseResult {
            value: root,
            magic_comments,
            data_location,
            errors,
            warnings,
        })
    }

    fn location(&mut self) -> Result<Location, DecodeError> {
        let at = self.reader.pos;
        let start = self.reader.u32()?;
        let end = self.reader.u32()?;
        let location = Location::new(start, end);
        if !location.fits(self.source_len) {
            return Err(DecodeError::new(
                at,
                DecodeErrorKind::InvalidLocation {
                    start,
                    end,
                    source_len: self.source_len,
                },
            ));
        }
        Ok(location)
    }

    fn node(&mut self, depth: usize) -> Result<Node, DecodeError> {
        let tag = self.reader.u8()?;
        if tag == TAG_ABSENT {
            self.reader.pos -= 1;
            return Err(self.reader.error(DecodeErrorKind::MissingNode));
        }
        self.node_with_tag(tag, depth)
    }

    fn node_with_tag(&mut self, tag: u8, depth: usize) -> Result<Node, DecodeError> {
        let at = self.reader.pos - 1;
        if depth > self.max_depth {
            return Err(DecodeError::new(
                at,
                DecodeErrorKind::DepthLimitExceeded {
                    limit: self.max_depth,
                },
            ));
        }
        let layout = *self
            .catalog
            .layout(tag)
            .ok_or_else(|| DecodeError::new(at, DecodeErrorKind::UnknownNodeKind { tag }))?;

        let location = self.location()?;
        let mut fields = Vec::with_capacity(layout.fields.len());
        for spec in layout.fields {
            let value = self.field(spec.kind, depth)?;
            fields.push(Field {
                name: spec.name,
                value,
            });
        }

        Ok(Node {
            kind: NodeKind {
                tag,
                name: layout.name,
            },
            location,
            fields,
        })
    }

    fn field(&mut self, kind: FieldKind, depth: usize) -> Result<FieldValue, DecodeError> {
        let value = match kind {
            FieldKind::Node => FieldValue::Node(Box::new(self.node(depth + 1)?)),
            FieldKind::OptionalNode => match self.reader.u8()? {
                TAG_ABSENT => FieldValue::OptionalNode(None),
                tag => FieldValue::OptionalNode(Some(Box::new(self.node_with_tag(tag, depth + 1)?))),
            },
            FieldKind::NodeList => {
                // Smallest node: tag plus location
                let count = self.reader.count(9)?;
                let mut nodes = Vec::with_capacity(count);
                for _ in 0..count {
                    nodes.push(self.node(depth + 1)?);
                }
                FieldValue::NodeList(nodes)
            }
            FieldKind::Location => FieldValue::Location(self.location()?),
            FieldKind::OptionalLocation => {
                if self.reader.presence()? {
                    FieldValue::OptionalLocation(Some(self.location()?))
                } else {
                    FieldValue::OptionalLocation(None)
                }
            }
            FieldKind::String => FieldValue::String(self.reader.bytes()?.to_vec()),
            FieldKind::StringList => {
                let count = self.reader.count(4)?;
                let mut list = Vec::with_capacity(count);
                for _ in 0..count {
                    list.push(self.reader.bytes()?.to_vec());
                }
                FieldValue::StringList(list)
            }
            FieldKind::Integer => FieldValue::Integer(self.reader.i64()?),
            FieldKind::Double => FieldValue::Double(self.reader.f64()?),
            FieldKind::UInt32 => FieldValue::UInt32(self.reader.u32()?),
            FieldKind::Flags => FieldValue::Flags(self.reader.u32()?),
        };
        Ok(value)
    }

    fn diagnostics(&mut self) -> Result<Vec<Diagnostic>, DecodeError> {
        // Message length, location and level
        let count = self.reader.count(13)?;
        let mut list = Vec::with_capacity(count);
        for _ in 0..count {
            let at = self.reader.pos;
            let message = std::str::from_utf8(self.reader.bytes()?)
                .map_err(|_| DecodeError::new(at, DecodeErrorKind::InvalidUtf8))?
                .to_string();
            let location = self.location()?;
            let level_at = self.reader.pos;
            let raw_level = self.reader.u8()?;
            let level = DiagnosticLevel::from_u8(raw_level).ok_or_else(|| {
                DecodeError::new(level_at, DecodeErrorKind::InvalidLevel { level: raw_level })
            })?;
            list.push(Diagnostic {
                message,
                location,
                level,
            });
        }
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::catalog::{FieldSpec, NodeLayout};

    /// Little writer for hand-built results
    #[derive(Default)]
    struct Raw(Vec<u8>);

    impl Raw {
        fn u8(mut self, v: u8) -> Self {
            self.0.push(v);
            self
        }
        fn u32(mut self, v: u32) -> Self {
            self.0.extend_from_slice(&v.to_ne_bytes());
            self
        }
        fn i64(mut self, v: i64) -> Self {
            self.0.extend_from_slice(&v.to_ne_bytes());
            self
        }
        fn loc(self, start: u32, end: u32) -> Self {
            self.u32(start).u32(end)
        }
        fn bytes(self, b: &[u8]) -> Self {
            let mut this = self.u32(b.len() as u32);
            this.0.extend_from_slice(b);
            this
        }
        /// No magic comments, no data, no diagnostics
        fn empty_tail(self) -> Self {
            self.u32(0).u8(0).u32(0).u32(0)
        }
    }

    /// ProgramNode(StatementsNode[IntegerNode 1])
    fn program_with_integer(source_len: u32) -> Raw {
        Raw::default()
            .u8(15)
            .loc(0, source_len)
            .u32(0)
            .u8(17)
            .loc(0, source_len)
            .u32(1)
            .u8(9)
            .loc(0, 1)
            .u32(2)
            .i64(1)
    }

    fn decode_err(raw: &[u8], source: &[u8]) -> DecodeErrorKind {
        match decode(raw, source) {
            Err(BridgeError::MalformedResult(err)) => err.kind,
            other => panic!("expected MalformedResult, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_program() {
        let raw = program_with_integer(1).empty_tail();
        let result = decode(&raw.0, b"1").unwrap();

        assert_eq!(result.value.name(), "ProgramNode");
        let statements = result.value.child_nodes();
        assert_eq!(statements.len(), 1);
        let body = statements[0].child_nodes();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].name(), "IntegerNode");
        assert_eq!(body[0].field("value").and_then(FieldValue::as_integer), Some(1));
        assert!(result.data_location.is_none());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_decode_tail_sections() {
        let source = b"# encoding: ascii\n1";
        let raw = program_with_integer(source.len() as u32)
            .u32(1)
            .loc(2, 10)
            .loc(12, 17)
            .u8(1)
            .loc(18, 19)
            .u32(1)
            .bytes(b"oops")
            .loc(0, 1)
            .u8(0)
            .u32(1)
            .bytes(b"careful")
            .loc(1, 2)
            .u8(2);
        let result = decode(&raw.0, source).unwrap();

        assert_eq!(result.magic_comments.len(), 1);
        assert_eq!(result.magic_comments[0].key, Location::new(2, 10));
        assert_eq!(result.data_location, Some(Location::new(18, 19)));
        assert_eq!(result.errors[0].message, "oops");
        assert_eq!(result.errors[0].level, DiagnosticLevel::Error);
        assert_eq!(result.warnings[0].level, DiagnosticLevel::WarningVerboseTrue);
    }

    #[test]
    fn test_optional_node_absent() {
        let source = b"()";
        let raw = Raw::default()
            .u8(15)
            .loc(0, 2)
            .u32(0)
            .u8(17)
            .loc(0, 2)
            .u32(1)
            .u8(14)
            .loc(0, 2)
            .u8(TAG_ABSENT)
            .loc(0, 1)
            .loc(1, 2)
            .empty_tail();
        let result = decode(&raw.0, source).unwrap();
        let parens = result.value.child_nodes()[0].child_nodes()[0];
        assert_eq!(parens.field("body"), Some(&FieldValue::OptionalNode(None)));
    }

    #[test]
    fn test_unknown_tag() {
        let raw = Raw::default().u8(200).loc(0, 0).empty_tail();
        assert_eq!(decode_err(&raw.0, b""), DecodeErrorKind::UnknownNodeKind { tag: 200 });
    }

    #[test]
    fn test_missing_root() {
        let raw = Raw::default().u8(TAG_ABSENT).empty_tail();
        assert_eq!(decode_err(&raw.0, b""), DecodeErrorKind::MissingNode);
    }

    #[test]
    fn test_trailing_bytes() {
        let raw = program_with_integer(1).empty_tail().u8(0xff);
        assert_eq!(
            decode_err(&raw.0, b"1"),
            DecodeErrorKind::TrailingBytes { remaining: 1 }
        );
    }

    #[test]
    fn test_location_past_source() {
        let raw = program_with_integer(5).empty_tail();
        assert!(matches!(
            decode_err(&raw.0, b"1"),
            DecodeErrorKind::InvalidLocation { end: 5, source_len: 1, .. }
        ));
    }

    #[test]
    fn test_invalid_presence() {
        let raw = program_with_integer(1).u32(0).u8(7).u32(0).u32(0);
        assert_eq!(decode_err(&raw.0, b"1"), DecodeErrorKind::InvalidPresence { byte: 7 });
    }

    #[test]
    fn test_invalid_level() {
        let raw = program_with_integer(1)
            .u32(0)
            .u8(0)
            .u32(1)
            .bytes(b"bad")
            .loc(0, 1)
            .u8(3)
            .u32(0);
        assert_eq!(decode_err(&raw.0, b"1"), DecodeErrorKind::InvalidLevel { level: 3 });
    }

    #[test]
    fn test_invalid_utf8_message() {
        let raw = program_with_integer(1)
            .u32(0)
            .u8(0)
            .u32(1)
            .bytes(&[0xff, 0xfe])
            .loc(0, 1)
            .u8(0)
            .u32(0);
        assert_eq!(decode_err(&raw.0, b"1"), DecodeErrorKind::InvalidUtf8);
    }

    #[test]
    fn test_huge_count_is_rejected() {
        let raw = Raw::default().u8(17).loc(0, 0).u32(u32::MAX);
        assert!(matches!(
            decode_err(&raw.0, b""),
            DecodeErrorKind::UnexpectedEnd { .. }
        ));
    }

    #[test]
    fn test_every_prefix_fails() {
        let raw = program_with_integer(1).empty_tail();
        for len in 0..raw.0.len() {
            assert!(
                matches!(decode(&raw.0[..len], b"1"), Err(BridgeError::MalformedResult(_))),
                "prefix of {} bytes decoded",
                len
            );
        }
    }

    #[test]
    fn test_depth_limit() {
        const WRAP: &[FieldSpec] = &[FieldSpec::new("inner", FieldKind::OptionalNode)];
        let catalog = NodeCatalog::new(&[NodeLayout::new(1, "Wrap", WRAP)]).unwrap();

        // Four nested Wrap nodes
        let mut raw = Raw::default();
        for _ in 0..4 {
            raw = raw.u8(1).loc(0, 0);
        }
        let raw = raw.u8(TAG_ABSENT).empty_tail();

        assert!(Decoder::new(&catalog).with_max_depth(4).decode(&raw.0, b"").is_ok());
        let err = Decoder::new(&catalog)
            .with_max_depth(3)
            .decode(&raw.0, b"")
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::MalformedResult(DecodeError::new(
                27,
                DecodeErrorKind::DepthLimitExceeded { limit: 3 }
            ))
        );
    }

    #[test]
    fn test_display_includes_offset() {
        let err = DecodeError::new(12, DecodeErrorKind::UnknownNodeKind { tag: 99 });
        assert_eq!(err.to_string(), "unknown node tag 99 at offset 12");
    }
}
