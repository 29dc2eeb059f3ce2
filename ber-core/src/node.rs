//! The intrusive n-ary node tree (§3.7), used bottom-up by the definite
//! rewriter (C7) and by the XML→BER builder when full buffering is
//! required (C10). A node owns either a materialized content buffer or a
//! list of children, never both; [`Node::collapse`] is the one-way step
//! from the latter to the former.

use crate::tag::{Class, Shape};
use crate::unit::Unit;

/// Either a leaf's content bytes or a constructed node's children, never
/// both at once.
#[derive(Debug, Clone)]
enum Body {
    Bytes(Vec<u8>),
    Children(Vec<Node>),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub class: Class,
    pub shape: Shape,
    pub tag: u32,
    /// Preserved for parity with a source unit that arrived indefinite;
    /// the definite rewrite always emits minimal definite headers
    /// regardless of this flag.
    pub was_indefinite: bool,
    body: Body,
}

impl Node {
    pub fn leaf(class: Class, shape: Shape, tag: u32, content: Vec<u8>) -> Node {
        Node { class, shape, tag, was_indefinite: false, body: Body::Bytes(content) }
    }

    pub fn constructed(class: Class, tag: u32, was_indefinite: bool) -> Node {
        Node {
            class,
            shape: Shape::Constructed,
            tag,
            was_indefinite,
            body: Body::Children(Vec::new()),
        }
    }

    /// Append `child` to this node. Panics if this node has already been
    /// collapsed to bytes (a programming error: the caller is expected to
    /// append children only before collapsing).
    pub fn push_child(&mut self, child: Node) {
        match &mut self.body {
            Body::Children(children) => children.push(child),
            Body::Bytes(_) => panic!("cannot push a child onto a collapsed node"),
        }
    }

    pub fn children(&self) -> Option<&[Node]> {
        match &self.body {
            Body::Children(c) => Some(c),
            Body::Bytes(_) => None,
        }
    }

    /// Mutable access to a constructed node's children list, `None` for a
    /// leaf (or already-collapsed) node.
    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match &mut self.body {
            Body::Children(c) => Some(c),
            Body::Bytes(_) => None,
        }
    }

    /// Replace a leaf node's content bytes in place. Panics on a
    /// constructed (un-collapsed) node, mirroring [`Node::push_child`]'s
    /// contract.
    pub fn set_leaf_bytes(&mut self, content: Vec<u8>) {
        match &mut self.body {
            Body::Bytes(b) => *b = content,
            Body::Children(_) => panic!("cannot set leaf bytes on a constructed node"),
        }
    }

    /// The raw content bytes if this node is a leaf (or has already been
    /// collapsed), `None` for an un-collapsed constructed node.
    pub fn leaf_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Bytes(b) => Some(b),
            Body::Children(_) => None,
        }
    }

    /// The content length if this node is a leaf, or the already-collapsed
    /// byte length if it has been collapsed.
    pub fn content_len(&self) -> usize {
        match &self.body {
            Body::Bytes(b) => b.len(),
            Body::Children(children) => children.iter().map(Node::encoded_len).sum(),
        }
    }

    /// Total encoded length of this node (TL header + content), computed
    /// bottom-up without requiring a prior collapse.
    pub fn encoded_len(&self) -> usize {
        let length = self.content_len();
        Unit::new_definite(self.class, self.shape, self.tag, length).tl_size + length
    }

    /// Collapse a constructed node's children into a single materialized
    /// byte vector (minimal definite TL headers for every descendant),
    /// turning it into a leaf. One-way: children are consumed.
    pub fn collapse(&mut self) {
        if let Body::Children(children) = &mut self.body {
            let mut buf = Vec::with_capacity(children.iter().map(Node::encoded_len).sum());
            for child in children.iter_mut() {
                child.collapse();
                child.write_definite_into(&mut buf);
            }
            self.body = Body::Bytes(buf);
        }
    }

    fn write_definite_into(&self, out: &mut Vec<u8>) {
        let content: &[u8] = match &self.body {
            Body::Bytes(b) => b,
            Body::Children(_) => panic!("write_definite_into requires a collapsed node"),
        };
        let unit = Unit::new_definite(self.class, self.shape, self.tag, content.len());
        let start = out.len();
        out.resize(start + unit.tl_size, 0);
        unit.write(&mut out[start..]).expect("buffer sized for tl_size");
        out.extend_from_slice(content);
    }

    /// Serialize this node (collapsing it first if necessary) into a
    /// freshly allocated definite-form byte vector.
    pub fn into_definite_bytes(mut self) -> Vec<u8> {
        self.collapse();
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write_definite_into(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_nested_children_bottom_up() {
        let mut root = Node::constructed(Class::Application, 1, false);
        root.push_child(Node::leaf(Class::Universal, Shape::Primitive, 4, vec![1, 2, 3]));
        let bytes = root.into_definite_bytes();
        assert_eq!(bytes, [0x61, 0x05, 0x04, 0x03, 0x01, 0x02, 0x03]);
    }
}
