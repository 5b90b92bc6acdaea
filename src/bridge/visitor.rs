//! Depth-first traversal of decoded trees

use super::ast::Node;

/// Callbacks for a depth-first walk
///
/// Return `false` from [`enter`](Visitor::enter) to skip a node's children.
pub trait Visitor {
    /// Called before a node's children are visited
    fn enter(&mut self, node: &Node, depth: usize) -> bool;

    /// Called after a node's children are visited
    fn leave(&mut self, _node: &Node, _depth: usize) {}
}

/// Walk `root` and its subtree in pre-order
pub fn walk<V: Visitor + ?Sized>(visitor: &mut V, root: &Node) {
    walk_at(visitor, root, 0);
}

fn walk_at<V: Visitor + ?Sized>(visitor: &mut V, node: &Node, depth: usize) {
    if visitor.enter(node, depth) {
        for child in node.child_nodes() {
            walk_at(visitor, child, depth + 1);
        }
    }
    visitor.leave(node, depth);
}

impl<F> Visitor for F
where
    F: FnMut(&Node, usize) -> bool,
{
    fn enter(&mut self, node: &Node, depth: usize) -> bool {
        self(node, depth)
    }
}
