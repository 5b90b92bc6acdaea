//! Decoded parse-tree nodes
//!
//! A [`Node`] is a tagged record: its kind comes from the catalog and its
//! fields are stored in wire order as [`FieldValue`]s. Nodes own their
//! children, so a decoded tree is a plain value with no ties to the engine.

use std::fmt;

use serde::{Serialize, Serializer};

use super::source_location::Location;

/// Kind of a node: its wire tag and catalog name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeKind {
    /// Wire tag
    pub tag: u8,
    /// Catalog name
    pub name: &'static str,
}

/// Value of one node field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A required child node
    Node(Box<Node>),
    /// A child node that may be absent
    OptionalNode(Option<Box<Node>>),
    /// A list of child nodes
    NodeList(Vec<Node>),
    /// A required location
    Location(Location),
    /// A location that may be absent
    OptionalLocation(Option<Location>),
    /// Raw bytes (identifier names, unescaped string contents)
    String(#[serde(serialize_with = "bytes_as_text")] Vec<u8>),
    /// A list of byte strings
    StringList(#[serde(serialize_with = "byte_list_as_text")] Vec<Vec<u8>>),
    /// Signed integer
    Integer(i64),
    /// Floating point value
    Double(f64),
    /// Unsigned integer
    UInt32(u32),
    /// Flag bits
    Flags(u32),
}

impl FieldValue {
    /// Child nodes held directly by this value
    pub fn nodes(&self) -> Vec<&Node> {
        match self {
            FieldValue::Node(node) => vec![node.as_ref()],
            FieldValue::OptionalNode(Some(node)) => vec![node.as_ref()],
            FieldValue::NodeList(nodes) => nodes.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Bytes of a string field
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::String(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Location value, if present
    pub fn as_location(&self) -> Option<Location> {
        match self {
            FieldValue::Location(loc) => Some(*loc),
            FieldValue::OptionalLocation(loc) => *loc,
            _ => None,
        }
    }

    /// Flag bits
    pub fn as_flags(&self) -> Option<u32> {
        match self {
            FieldValue::Flags(bits) => Some(*bits),
            _ => None,
        }
    }
}

/// A named field of a node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    /// Field name from the catalog layout
    pub name: &'static str,
    /// Decoded value
    pub value: FieldValue,
}

/// A decoded parse-tree node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    /// Kind from the catalog
    pub kind: NodeKind,
    /// Source range covered by the node
    pub location: Location,
    /// Fields in wire order
    pub fields: Vec<Field>,
}

impl Node {
    /// Catalog name of the node kind
    #[inline]
    pub fn name(&self) -> &'static str {
        self.kind.name
    }

    /// Wire tag of the node kind
    #[inline]
    pub fn tag(&self) -> u8 {
        self.kind.tag
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }

    /// Present child nodes, in field order
    ///
    /// Absent optional children are skipped; node lists are flattened.
    pub fn child_nodes(&self) -> Vec<&Node> {
        self.fields
            .iter()
            .flat_map(|field| field.value.nodes())
            .collect()
    }

    /// Total number of nodes in this subtree, including self
    pub fn node_count(&self) -> usize {
        1 + self
            .child_nodes()
            .iter()
            .map(|child| child.node_count())
            .sum::<usize>()
    }

    /// The source bytes covered by this node
    pub fn source_slice<'a>(&self, source: &'a [u8]) -> Option<&'a [u8]> {
        self.location.slice(source)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}", self.kind.name, self.location)?;
        for field in &self.fields {
            write!(f, ", {}: ", field.name)?;
            fmt_value(&field.value, f)?;
        }
        write!(f, ")")
    }
}

fn fmt_value(value: &FieldValue, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value {
        FieldValue::Node(node) => write!(f, "{}", node),
        FieldValue::OptionalNode(Some(node)) => write!(f, "{}", node),
        FieldValue::OptionalNode(None) => write!(f, "nil"),
        FieldValue::NodeList(nodes) => {
            write!(f, "[")?;
            for (i, node) in nodes.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", node)?;
            }
            write!(f, "]")
        }
        FieldValue::Location(loc) => write!(f, "{}", loc),
        FieldValue::OptionalLocation(Some(loc)) => write!(f, "{}", loc),
        FieldValue::OptionalLocation(None) => write!(f, "nil"),
        FieldValue::String(bytes) => write!(f, "{:?}", String::from_utf8_lossy(bytes)),
        FieldValue::StringList(list) => {
            write!(f, "[")?;
            for (i, bytes) in list.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", String::from_utf8_lossy(bytes))?;
            }
            write!(f, "]")
        }
        FieldValue::Integer(n) => write!(f, "{}", n),
        FieldValue::Double(x) => write!(f, "{:?}", x),
        FieldValue::UInt32(n) => write!(f, "{}", n),
        FieldValue::Flags(bits) => write!(f, "0x{:x}", bits),
    }
}

fn bytes_as_text<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

fn byte_list_as_text<S: Serializer>(list: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(list.iter().map(|bytes| String::from_utf8_lossy(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integer(start: u32, end: u32, value: i64) -> Node {
        Node {
            kind: NodeKind {
                tag: 9,
                name: "IntegerNode",
            },
            location: Location::new(start, end),
            fields: vec![
                Field {
                    name: "flags",
                    value: FieldValue::Flags(2),
                },
                Field {
                    name: "value",
                    value: FieldValue::Integer(value),
                },
            ],
        }
    }

    fn statements(body: Vec<Node>) -> Node {
        Node {
            kind: NodeKind {
                tag: 17,
                name: "StatementsNode",
            },
            location: Location::new(0, 5),
            fields: vec![Field {
                name: "body",
                value: FieldValue::NodeList(body),
            }],
        }
    }

    #[test]
    fn test_field_lookup() {
        let node = integer(0, 1, 7);
        assert_eq!(node.field("value").and_then(FieldValue::as_integer), Some(7));
        assert_eq!(node.field("flags").and_then(FieldValue::as_flags), Some(2));
        assert!(node.field("missing").is_none());
    }

    #[test]
    fn test_child_nodes_flatten_lists() {
        let node = statements(vec![integer(0, 1, 1), integer(4, 5, 2)]);
        let children = node.child_nodes();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].location, Location::new(4, 5));
        assert_eq!(node.node_count(), 3);
    }

    #[test]
    fn test_child_nodes_skip_absent() {
        let node = Node {
            kind: NodeKind {
                tag: 14,
                name: "ParenthesesNode",
            },
            location: Location::new(0, 2),
            fields: vec![Field {
                name: "body",
                value: FieldValue::OptionalNode(None),
            }],
        };
        assert!(node.child_nodes().is_empty());
    }

    #[test]
    fn test_display() {
        let node = statements(vec![integer(0, 1, 1)]);
        assert_eq!(
            node.to_string(),
            "StatementsNode(0..5, body: [IntegerNode(0..1, flags: 0x2, value: 1)])"
        );
    }

    #[test]
    fn test_serialize_strings_as_text() {
        let value = FieldValue::String(b"puts".to_vec());
        assert_eq!(serde_json::to_string(&value).unwrap(), "\"puts\"");
    }
}
