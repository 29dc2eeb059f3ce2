//! BER to BER rewrites (§4.6, C7): a pure identity pass that validates
//! reader/writer symmetry, and indefinite/definite form conversions. Form
//! conversion requires seeing a whole subtree before its header can be
//! written (an indefinite frame's length isn't known until its EOC; a
//! definite frame's EOC doesn't exist at all), so both directions buffer
//! each top-level unit as a [`Node`] tree rather than streaming byte-for-byte.

use ber_core::node::Node;
use ber_core::tag::{Class, Shape};
use ber_core::{BerError, Unit};

use crate::error::{IoError, IoResult};
use crate::reader::VerticalReader;
use crate::scratchpad::{ScratchpadWriter, Sink, Source};

/// Copy every unit byte-for-byte: TL headers are re-serialized from parsed
/// fields (not memcpy'd), so this also doubles as a parser/writer
/// round-trip check. Forced non-minimal length forms are preserved because
/// [`Unit::parse`] carries `tl_size` through unchanged.
pub fn identity<S: Source, K: Sink>(source: S, sink: K) -> IoResult<K> {
    let mut reader = VerticalReader::new(source);
    let mut writer = ScratchpadWriter::new(sink);

    while let Some(event) = reader.advance()? {
        let mut header = vec![0u8; event.unit.tl_size];
        event.unit.write(&mut header)?;
        writer.write(&header)?;
        if event.unit.shape == Shape::Primitive {
            let content = reader.content()?.to_vec();
            writer.write(&content)?;
        }
    }

    if !reader.is_balanced() {
        return Err(IoError::Ber(BerError::UnexpectedEoc));
    }
    Ok(writer.finish()?)
}

/// One constructed frame under construction while the tree is read.
struct Open {
    class: Class,
    tag: u32,
    was_indefinite: bool,
    children: Vec<Node>,
}

fn attach(stack: &mut [Open], roots: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some(open) => open.children.push(node),
        None => roots.push(node),
    }
}

/// Parse the whole input into a forest of top-level [`Node`]s, preserving
/// each subtree's original indefinite/definite form on [`Node::was_indefinite`].
pub fn read_tree<S: Source>(source: S) -> IoResult<Vec<Node>> {
    let mut reader = VerticalReader::new(source);
    let mut stack: Vec<Open> = Vec::new();
    let mut roots: Vec<Node> = Vec::new();

    while let Some(event) = reader.advance()? {
        if event.unit.is_eoc() {
            let open = stack.pop().ok_or(BerError::UnexpectedEoc)?;
            let mut node = Node::constructed(open.class, open.tag, true);
            for child in open.children {
                node.push_child(child);
            }
            attach(&mut stack, &mut roots, node);
            continue;
        }

        if event.unit.shape == Shape::Constructed && (event.unit.is_indefinite || event.unit.length > 0) {
            stack.push(Open {
                class: event.unit.class,
                tag: event.unit.tag,
                was_indefinite: event.unit.is_indefinite,
                children: Vec::new(),
            });
        } else {
            let content = reader.content()?.to_vec();
            let node = Node::leaf(event.unit.class, event.unit.shape, event.unit.tag, content);
            attach(&mut stack, &mut roots, node);
        }

        // Definite frames close silently (no EOC event); the reader's
        // frame stack already popped them, so mirror that here.
        while reader.height() < stack.len() {
            let open = stack.pop().unwrap();
            let mut node = Node::constructed(open.class, open.tag, open.was_indefinite);
            for child in open.children {
                node.push_child(child);
            }
            attach(&mut stack, &mut roots, node);
        }
    }

    if !stack.is_empty() {
        return Err(IoError::Ber(BerError::UnexpectedEoc));
    }
    Ok(roots)
}

/// Rewrite every definite constructed frame into indefinite form,
/// recursively. Primitives are untouched.
fn write_indefinite_node<K: Sink>(node: &Node, writer: &mut ScratchpadWriter<K>) -> IoResult<()> {
    match node.children() {
        None => {
            let content = node.leaf_bytes().expect("non-constructed node always carries leaf bytes");
            let unit = Unit::new_definite(node.class, node.shape, node.tag, content.len());
            let mut header = vec![0u8; unit.tl_size];
            unit.write(&mut header)?;
            writer.write(&header)?;
            writer.write(content)?;
        }
        Some(children) => {
            let unit = Unit::new_indefinite(node.class, node.tag);
            let mut header = vec![0u8; unit.tl_size];
            unit.write(&mut header)?;
            writer.write(&header)?;
            for child in children {
                write_indefinite_node(child, writer)?;
            }
            writer.write(&[0x00, 0x00])?;
        }
    }
    Ok(())
}

/// Convert every definite constructed frame in `source` into indefinite
/// form and write the result to `sink`.
pub fn to_indefinite<S: Source, K: Sink>(source: S, sink: K) -> IoResult<K> {
    let roots = read_tree(source)?;
    let mut writer = ScratchpadWriter::new(sink);
    for root in &roots {
        write_indefinite_node(root, &mut writer)?;
    }
    Ok(writer.finish()?)
}

/// Convert every indefinite constructed frame in `source` into minimal
/// definite form and write the result to `sink`.
pub fn to_definite<S: Source, K: Sink>(source: S, sink: K) -> IoResult<K> {
    let roots = read_tree(source)?;
    let mut writer = ScratchpadWriter::new(sink);
    for root in roots {
        let bytes = root.into_definite_bytes();
        writer.write(&bytes)?;
    }
    Ok(writer.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scratchpad::{MemorySink, MemorySource};

    #[test]
    fn identity_reproduces_input_byte_for_byte() {
        let data = [0x61, 0x05, 0x04, 0x03, 0x01, 0x02, 0x03];
        let sink = identity(MemorySource::new(&data), MemorySink::default()).unwrap();
        assert_eq!(sink.bytes, data);
    }

    #[test]
    fn definite_round_trips_through_indefinite_and_back() {
        let data = [0x61, 0x05, 0x04, 0x03, 0x01, 0x02, 0x03];
        let indefinite = to_indefinite(MemorySource::new(&data), MemorySink::default()).unwrap();
        assert_eq!(indefinite.bytes, [0x61, 0x80, 0x04, 0x03, 0x01, 0x02, 0x03, 0x00, 0x00]);

        let back = to_definite(MemorySource::new(&indefinite.bytes), MemorySink::default()).unwrap();
        assert_eq!(back.bytes, data);
    }
}
