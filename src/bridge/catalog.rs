//! Node-kind catalog
//!
//! The catalog maps a node's wire tag to its layout: a name and the ordered
//! list of typed fields that follow the node's location. The decoder's
//! control flow never mentions a concrete node kind; it only walks layouts.
//! A catalog generated from a newer engine can therefore be swapped in with
//! [`NodeCatalog::new`] without touching the decoder.
//!
//! # Field encodings
//!
//! | Kind | Encoding |
//! |------|----------|
//! | `Node` | nested node |
//! | `OptionalNode` | u8 tag, 0 = absent, otherwise a node with that tag |
//! | `NodeList` | u32 count, then nodes |
//! | `Location` | u32 start, u32 end |
//! | `OptionalLocation` | u8 presence (0 or 1), then location |
//! | `String` | u32 length, then bytes |
//! | `StringList` | u32 count, then strings |
//! | `Integer` | i64 |
//! | `Double` | f64 |
//! | `UInt32` | u32 |
//! | `Flags` | u32 bit set |

use std::sync::OnceLock;

use hashbrown::HashMap;
use serde::Serialize;

use super::error::{BridgeError, BridgeResult};

/// Tag reserved for "no node" in optional node fields
pub const TAG_ABSENT: u8 = 0x00;

/// Wire encoding of a single node field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FieldKind {
    /// A required child node
    Node,
    /// A child node that may be absent
    OptionalNode,
    /// A list of child nodes
    NodeList,
    /// A required location
    Location,
    /// A location that may be absent
    OptionalLocation,
    /// Length-prefixed bytes
    String,
    /// A list of length-prefixed byte strings
    StringList,
    /// Signed 64-bit integer
    Integer,
    /// IEEE 754 double
    Double,
    /// Unsigned 32-bit integer
    UInt32,
    /// Node flag bits
    Flags,
}

/// A named field in a node layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name
    pub name: &'static str,
    /// Wire encoding
    pub kind: FieldKind,
}

impl FieldSpec {
    /// Create a new field spec
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// Layout of one node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLayout {
    /// Wire tag (never [`TAG_ABSENT`])
    pub tag: u8,
    /// Node kind name
    pub name: &'static str,
    /// Fields in wire order
    pub fields: &'static [FieldSpec],
}

impl NodeLayout {
    /// Create a new layout
    pub const fn new(tag: u8, name: &'static str, fields: &'static [FieldSpec]) -> Self {
        Self { tag, name, fields }
    }
}

/// Lookup table from wire tag to node layout
#[derive(Debug, Clone)]
pub struct NodeCatalog {
    /// Layouts indexed by tag
    by_tag: Vec<Option<NodeLayout>>,
    /// Tags indexed by node name
    by_name: HashMap<&'static str, u8>,
}

impl NodeCatalog {
    /// Build a catalog from a table of layouts
    ///
    /// Rejects the reserved tag 0 and duplicate tags or names.
    pub fn new(layouts: &[NodeLayout]) -> BridgeResult<Self> {
        let mut by_tag: Vec<Option<NodeLayout>> = vec![None; 256];
        let mut by_name = HashMap::with_capacity(layouts.len());

        for layout in layouts {
            if layout.tag == TAG_ABSENT {
                return Err(BridgeError::load(format!(
                    "node kind {} uses the reserved tag 0",
                    layout.name
                )));
            }
            let slot = &mut by_tag[layout.tag as usize];
            if let Some(existing) = slot {
                return Err(BridgeError::load(format!(
                    "tag {} assigned to both {} and {}",
                    layout.tag, existing.name, layout.name
                )));
            }
            if by_name.insert(layout.name, layout.tag).is_some() {
                return Err(BridgeError::load(format!(
                    "node kind {} declared twice",
                    layout.name
                )));
            }
            *slot = Some(*layout);
        }

        Ok(Self { by_tag, by_name })
    }

    /// The catalog shipped with this crate
    pub fn builtin() -> &'static NodeCatalog {
        static BUILTIN: OnceLock<NodeCatalog> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            NodeCatalog::new(BUILTIN_LAYOUTS).unwrap_or_else(|err| panic!("builtin catalog: {err}"))
        })
    }

    /// Layout for a wire tag
    #[inline]
    pub fn layout(&self, tag: u8) -> Option<&NodeLayout> {
        self.by_tag[tag as usize].as_ref()
    }

    /// Wire tag for a node name
    #[inline]
    pub fn tag_of(&self, name: &str) -> Option<u8> {
        self.by_name.get(name).copied()
    }

    /// Number of node kinds in the catalog
    #[inline]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Check if the catalog has no node kinds
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Iterate over all layouts in tag order
    pub fn layouts(&self) -> impl Iterator<Item = &NodeLayout> {
        self.by_tag.iter().filter_map(|slot| slot.as_ref())
    }
}

// ============================================================================
// Builtin table
// ============================================================================

/// Flag on `IntegerNode`: decimal literal
pub const INTEGER_BASE_DECIMAL: u32 = 1 << 1;

/// Flag on `CallNode`: the call has no receiver and no arguments
pub const CALL_VARIABLE_CALL: u32 = 1 << 2;

macro_rules! layout {
    ($tag:literal, $name:ident { $($field:ident: $kind:ident),* $(,)? }) => {
        NodeLayout {
            tag: $tag,
            name: stringify!($name),
            fields: &[$(FieldSpec { name: stringify!($field), kind: FieldKind::$kind }),*],
        }
    };
}

/// Builtin node layouts
pub const BUILTIN_LAYOUTS: &[NodeLayout] = &[
    layout!(1, ArgumentsNode { flags: Flags, arguments: NodeList }),
    layout!(2, ArrayNode {
        flags: Flags,
        elements: NodeList,
        opening_loc: OptionalLocation,
        closing_loc: OptionalLocation,
    }),
    layout!(3, CallNode {
        flags: Flags,
        receiver: OptionalNode,
        call_operator_loc: OptionalLocation,
        name: String,
        message_loc: OptionalLocation,
        opening_loc: OptionalLocation,
        arguments: OptionalNode,
        closing_loc: OptionalLocation,
        block: OptionalNode,
    }),
    layout!(4, ConstantReadNode { name: String }),
    layout!(5, ElseNode {
        else_keyword_loc: Location,
        statements: OptionalNode,
        end_keyword_loc: OptionalLocation,
    }),
    layout!(6, FalseNode {}),
    layout!(7, FloatNode { value: Double }),
    layout!(8, IfNode {
        if_keyword_loc: OptionalLocation,
        predicate: Node,
        then_keyword_loc: OptionalLocation,
        statements: OptionalNode,
        subsequent: OptionalNode,
        end_keyword_loc: OptionalLocation,
    }),
    layout!(9, IntegerNode { flags: Flags, value: Integer }),
    layout!(10, LocalVariableReadNode { name: String, depth: UInt32 }),
    layout!(11, LocalVariableWriteNode {
        name: String,
        depth: UInt32,
        name_loc: Location,
        value: Node,
        operator_loc: Location,
    }),
    layout!(12, MissingNode {}),
    layout!(13, NilNode {}),
    layout!(14, ParenthesesNode {
        body: OptionalNode,
        opening_loc: Location,
        closing_loc: Location,
    }),
    layout!(15, ProgramNode { locals: StringList, statements: Node }),
    layout!(16, SelfNode {}),
    layout!(17, StatementsNode { body: NodeList }),
    layout!(18, StringNode {
        flags: Flags,
        opening_loc: OptionalLocation,
        content_loc: Location,
        closing_loc: OptionalLocation,
        unescaped: String,
    }),
    layout!(19, SymbolNode {
        flags: Flags,
        opening_loc: OptionalLocation,
        value_loc: OptionalLocation,
        closing_loc: OptionalLocation,
        unescaped: String,
    }),
    layout!(20, TrueNode {}),
];
