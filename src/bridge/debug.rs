//! Developer Experience Tools
//!
//! Indented dumps of decoded trees and results, for debugging a catalog or
//! an engine build.

use std::fmt::Write;

use super::ast::{FieldValue, Node};
use super::result::ParseResult;

/// Parse tree pretty printer
pub struct TreePrinter {
    /// Indentation string
    indent: String,
    /// Maximum depth to print
    max_depth: Option<usize>,
    /// Whether to print scalar fields
    show_fields: bool,
}

impl TreePrinter {
    /// Create a new tree printer
    pub fn new() -> Self {
        Self {
            indent: "  ".to_string(),
            max_depth: None,
            show_fields: true,
        }
    }

    /// Set the indentation string
    pub fn indent(mut self, indent: &str) -> Self {
        self.indent = indent.to_string();
        self
    }

    /// Set the maximum depth to print
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Print only node names and locations
    pub fn hide_fields(mut self) -> Self {
        self.show_fields = false;
        self
    }

    /// Print a node and its subtree
    ///
    /// When `source` is given, each node line also shows the text it covers.
    pub fn print(&self, node: &Node, source: Option<&[u8]>) -> String {
        let mut output = String::new();
        self.print_node(node, source, 0, &mut output);
        output
    }

    /// Print a whole result: the tree followed by its diagnostics
    pub fn print_result(&self, result: &ParseResult, source: Option<&[u8]>) -> String {
        let mut output = self.print(&result.value, source);
        for diagnostic in result.diagnostics() {
            writeln!(output, "{}", diagnostic).unwrap();
        }
        output
    }

    fn print_node(&self, node: &Node, source: Option<&[u8]>, depth: usize, output: &mut String) {
        let indent = self.indent.repeat(depth);

        if let Some(max) = self.max_depth {
            if depth > max {
                writeln!(output, "{}...", indent).unwrap();
                return;
            }
        }

        write!(output, "{}{} @ {}", indent, node.name(), node.location).unwrap();
        if let Some(text) = source.and_then(|src| node.source_slice(src)) {
            write!(output, " {:?}", String::from_utf8_lossy(text)).unwrap();
        }
        output.push('\n');

        for field in &node.fields {
            match &field.value {
                FieldValue::Node(child) => {
                    self.print_node(child, source, depth + 1, output);
                }
                FieldValue::OptionalNode(Some(child)) => {
                    self.print_node(child, source, depth + 1, output);
                }
                FieldValue::NodeList(children) => {
                    for child in children {
                        self.print_node(child, source, depth + 1, output);
                    }
                }
                FieldValue::OptionalNode(None) => {}
                _ if self.show_fields => {
                    writeln!(
                        output,
                        "{}{}{}: {}",
                        indent,
                        self.indent,
                        field.name,
                        scalar(&field.value)
                    )
                    .unwrap();
                }
                _ => {}
            }
        }
    }
}

impl Default for TreePrinter {
    fn default() -> Self {
        Self::new()
    }
}

fn scalar(value: &FieldValue) -> String {
    match value {
        FieldValue::Location(loc) | FieldValue::OptionalLocation(Some(loc)) => loc.to_string(),
        FieldValue::OptionalLocation(None) => "nil".to_string(),
        FieldValue::String(bytes) => format!("{:?}", String::from_utf8_lossy(bytes)),
        FieldValue::StringList(list) => {
            let items: Vec<_> = list.iter().map(|b| String::from_utf8_lossy(b)).collect();
            format!("{:?}", items)
        }
        FieldValue::Integer(n) => n.to_string(),
        FieldValue::Double(x) => format!("{:?}", x),
        FieldValue::UInt32(n) => n.to_string(),
        FieldValue::Flags(bits) => format!("0x{:x}", bits),
        FieldValue::Node(_) | FieldValue::OptionalNode(_) | FieldValue::NodeList(_) => {
            String::new()
        }
    }
}
