//! In-memory BER document tree (§4.10, C11): used when XPath-style
//! queries, validation, or edits need sibling context a streaming pass
//! cannot provide. BER → tree attaches each unit to its parent as the
//! vertical reader walks it, preserving indefinite markers
//! (reuses [`ber_io::transform::read_tree`], C7's own tree builder).
//! Tree → BER reverses the walk, computing definite lengths bottom-up by
//! reusing [`ber_core::node::Node::into_definite_bytes`], the same
//! collapse the BER→BER definite rewriter (C7) uses.

use ber_core::node::Node;
use ber_core::tag::{Class, Shape};
use ber_core::{bcd, hexesc, integer, Value};
use ber_io::scratchpad::{MemorySource, Sink, Source};
use ber_io::ScratchpadWriter;

use crate::error::{XmlError, XmlResult};
use crate::path::{Matcher, Path};
use crate::translator::{ContentType, Dereferencer, NameTranslator, Typifier};

/// Parse a whole BER byte stream into a forest of root-level nodes.
pub fn read_tree<S: Source>(source: S) -> XmlResult<Vec<Node>> {
    Ok(ber_io::transform::read_tree(source)?)
}

/// Serialize a forest of root nodes back to BER, minimal definite form.
pub fn write_tree<K: Sink>(roots: Vec<Node>, sink: K) -> XmlResult<K> {
    let mut writer = ScratchpadWriter::new(sink);
    for root in roots {
        writer.write(&root.into_definite_bytes())?;
    }
    Ok(writer.finish()?)
}

/// External XSD validation collaborator (§6.1, §6.3 `--xsd FILE`); the
/// core only needs a pass/fail boundary over the parsed tree.
pub trait SchemaValidator {
    fn validate(&self, roots: &[Node]) -> XmlResult<()>;
}

fn render_text(
    class: Class,
    tag: u32,
    content: &[u8],
    dereferencer: Option<&Dereferencer>,
    typifier: &Typifier,
) -> XmlResult<String> {
    let (tc, tt) = match dereferencer {
        Some(d) => d.resolve(class, tag),
        None => (class, tag),
    };
    Ok(match typifier.type_of(tc, tt) {
        ContentType::Int64 => integer::decode_i64(content)?.to_string(),
        ContentType::Bcd => bcd::decode_to_string(content)?,
        ContentType::OctetString | ContentType::StringT => hexesc::encode_to_string(hexesc::Style::Xml, content),
    })
}

fn encode_text(
    class: Class,
    tag: u32,
    text: &str,
    dereferencer: Option<&Dereferencer>,
    typifier: &Typifier,
) -> XmlResult<Vec<u8>> {
    let (tc, tt) = match dereferencer {
        Some(d) => d.resolve(class, tag),
        None => (class, tag),
    };
    let value = match typifier.type_of(tc, tt) {
        ContentType::Int64 => {
            let n: i64 = text.trim().parse().map_err(|_| XmlError::Syntax(format!("'{text}' is not a valid integer")))?;
            Value::I64(n)
        }
        ContentType::Bcd => Value::Bcd(text),
        ContentType::OctetString | ContentType::StringT => Value::XmlEscaped(text, hexesc::Style::Xml),
    };
    let len = value.minimally_encoded_length()?;
    let mut buf = vec![0u8; len];
    value.encode_into(&mut buf)?;
    Ok(buf)
}

fn walk_collect(
    nodes: &[Node],
    ancestry: &mut Vec<(Class, u32)>,
    addr: &mut Vec<usize>,
    matcher: &mut Matcher,
    translator: &NameTranslator,
    out: &mut Vec<Vec<usize>>,
) {
    for (i, node) in nodes.iter().enumerate() {
        addr.push(i);
        ancestry.push((node.class, node.tag));
        if matcher.check(ancestry, translator) {
            out.push(addr.clone());
        }
        if let Some(children) = node.children() {
            walk_collect(children, ancestry, addr, matcher, translator, out);
        }
        ancestry.pop();
        addr.pop();
    }
}

/// Every address (root-to-node index path) matching `path`, in document
/// order with rank counted per [`Matcher`]'s rules.
pub fn collect_addresses(roots: &[Node], path: &Path, translator: &NameTranslator) -> Vec<Vec<usize>> {
    let mut matcher = Matcher::new(path);
    let mut out = Vec::new();
    walk_collect(roots, &mut Vec::new(), &mut Vec::new(), &mut matcher, translator, &mut out);
    out
}

fn node_at_mut<'a>(roots: &'a mut Vec<Node>, addr: &[usize]) -> Option<&'a mut Node> {
    let (first, rest) = addr.split_first()?;
    let mut node = roots.get_mut(*first)?;
    for &i in rest {
        node = node.children_mut()?.get_mut(i)?;
    }
    Some(node)
}

fn siblings_at_mut<'a>(roots: &'a mut Vec<Node>, addr: &[usize]) -> Option<(&'a mut Vec<Node>, usize)> {
    let (last, parent_addr) = addr.split_last()?;
    if parent_addr.is_empty() {
        return Some((roots, *last));
    }
    let parent = node_at_mut(roots, parent_addr)?;
    Some((parent.children_mut()?, *last))
}

/// Remove every node matching `path`. Matches are removed in reverse
/// document order so an earlier match's address is never invalidated by
/// removing a later one.
pub fn remove(roots: &mut Vec<Node>, path: &Path, translator: &NameTranslator) -> usize {
    let mut addrs = collect_addresses(roots, path, translator);
    addrs.sort();
    let mut removed = 0;
    for addr in addrs.into_iter().rev() {
        if let Some((siblings, idx)) = siblings_at_mut(roots, &addr) {
            if idx < siblings.len() {
                siblings.remove(idx);
                removed += 1;
            }
        }
    }
    removed
}

/// Apply a regex substitution to the rendered text content of every
/// primitive leaf matching `path`.
pub fn replace(
    roots: &mut Vec<Node>,
    path: &Path,
    pattern: &regex::Regex,
    subst: &str,
    translator: &NameTranslator,
    dereferencer: Option<&Dereferencer>,
    typifier: &Typifier,
) -> XmlResult<usize> {
    let addrs = collect_addresses(roots, path, translator);
    let mut changed = 0;
    for addr in &addrs {
        let Some(node) = node_at_mut(roots, addr) else { continue };
        if node.children().is_some() {
            return Err(XmlError::PrimitiveWithChildren(format!(
                "node at {addr:?} is constructed, cannot replace text content"
            )));
        }
        let content = node.leaf_bytes().unwrap_or(&[]).to_vec();
        let text = render_text(node.class, node.tag, &content, dereferencer, typifier)?;
        let new_text = pattern.replace_all(&text, subst).into_owned();
        let encoded = encode_text(node.class, node.tag, &new_text, dereferencer, typifier)?;
        node.set_leaf_bytes(encoded);
        changed += 1;
    }
    Ok(changed)
}

/// Set a structural attribute (`tag`, `class`, or `indefinite`) on every
/// node matching `path`.
pub fn set_att(
    roots: &mut Vec<Node>,
    path: &Path,
    name: &str,
    value: &str,
    translator: &NameTranslator,
) -> XmlResult<usize> {
    let addrs = collect_addresses(roots, path, translator);
    let mut changed = 0;
    for addr in &addrs {
        let Some(node) = node_at_mut(roots, addr) else { continue };
        match name {
            "tag" => {
                node.tag = value.parse().map_err(|_| XmlError::Syntax(format!("bad tag value '{value}'")))?;
            }
            "class" => node.class = Class::from_name(value)?,
            "indefinite" => node.was_indefinite = value == "true",
            other => {
                return Err(XmlError::Syntax(format!("unsupported set_att attribute '{other}'")));
            }
        }
        changed += 1;
    }
    Ok(changed)
}

/// Append a new child, named `spec` (`+name` convention), carrying
/// `content` text, to every node matching `path`.
pub fn add(
    roots: &mut Vec<Node>,
    path: &Path,
    spec: &str,
    content: &str,
    translator: &NameTranslator,
    dereferencer: Option<&Dereferencer>,
    typifier: &Typifier,
) -> XmlResult<usize> {
    let name = spec
        .strip_prefix('+')
        .ok_or_else(|| XmlError::Syntax(format!("add spec '{spec}' must start with '+'")))?;
    let (shape, class, tag) =
        translator.resolve(name).ok_or_else(|| XmlError::UnknownName(name.to_string()))?;
    let addrs = collect_addresses(roots, path, translator);
    let mut added = 0;
    for addr in &addrs {
        let Some(node) = node_at_mut(roots, addr) else { continue };
        let Some(children) = node.children_mut() else {
            return Err(XmlError::PrimitiveWithChildren(format!(
                "node at {addr:?} is primitive, cannot add a child"
            )));
        };
        let new_node = match shape {
            Shape::Primitive => Node::leaf(class, Shape::Primitive, tag, encode_text(class, tag, content, dereferencer, typifier)?),
            Shape::Constructed => Node::constructed(class, tag, false),
        };
        children.push(new_node);
        added += 1;
    }
    Ok(added)
}

/// Splice a raw BER-encoded snippet relative to every node matching
/// `path`. `position`: `1` = first child, `-1` = last child, `2` = after,
/// `-2` = before.
pub fn insert(
    roots: &mut Vec<Node>,
    path: &Path,
    snippet: &[u8],
    position: i32,
    translator: &NameTranslator,
) -> XmlResult<usize> {
    let parsed = read_tree(MemorySource::new(snippet))?;
    let mut addrs = collect_addresses(roots, path, translator);
    addrs.sort();
    let mut inserted = 0;
    for addr in addrs.into_iter().rev() {
        match position {
            1 => {
                if let Some(node) = node_at_mut(roots, &addr) {
                    if let Some(children) = node.children_mut() {
                        for (i, n) in parsed.iter().cloned().enumerate() {
                            children.insert(i, n);
                        }
                        inserted += 1;
                    }
                }
            }
            -1 => {
                if let Some(node) = node_at_mut(roots, &addr) {
                    if let Some(children) = node.children_mut() {
                        children.extend(parsed.iter().cloned());
                        inserted += 1;
                    }
                }
            }
            2 => {
                if let Some((siblings, idx)) = siblings_at_mut(roots, &addr) {
                    let at = (idx + 1).min(siblings.len());
                    for (i, n) in parsed.iter().cloned().enumerate() {
                        siblings.insert(at + i, n);
                    }
                    inserted += 1;
                }
            }
            -2 => {
                if let Some((siblings, idx)) = siblings_at_mut(roots, &addr) {
                    for (i, n) in parsed.iter().cloned().enumerate() {
                        siblings.insert(idx + i, n);
                    }
                    inserted += 1;
                }
            }
            other => return Err(XmlError::Syntax(format!("unsupported insert position {other}"))),
        }
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ber_core::tag::Shape;
    use ber_io::scratchpad::MemorySink;

    fn four_cdr_batch() -> Vec<u8> {
        let mut inner = vec![0x62, 0x00];
        for b in 1u8..=4 {
            inner.extend([0x63, 0x01, b]);
        }
        let inner_len = inner.len() - 2;
        inner[1] = inner_len as u8;
        let mut data = vec![0x61, 0x00];
        data.extend(inner);
        let data_len = data.len() - 2;
        data[1] = data_len as u8;
        data
    }

    fn translator() -> NameTranslator {
        let mut t = NameTranslator::new();
        t.insert(Class::Application, Shape::Constructed, 1, "TransferBatch");
        t.insert(Class::Application, Shape::Constructed, 2, "CallEventDetailList");
        t.insert(Class::Application, Shape::Primitive, 3, "CallEventDetail");
        t
    }

    #[test]
    fn remove_deletes_third_cdr() {
        let data = four_cdr_batch();
        let mut roots = read_tree(MemorySource::new(&data)).unwrap();
        let translator = translator();
        let path = Path::parse("/TransferBatch/CallEventDetailList/*[3]").unwrap();
        let removed = remove(&mut roots, &path, &translator);
        assert_eq!(removed, 1);
        let batch = roots[0].children().unwrap();
        let list = batch[0].children().unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[2].leaf_bytes(), Some(&[4u8][..]));
    }

    #[test]
    fn replace_rewrites_bcd_digits() {
        let mut roots = vec![Node::leaf(Class::Application, Shape::Primitive, 3, vec![0x13, 0x37, 0x5f])];
        let mut typifier = Typifier::new();
        typifier.set(Class::Application, 3, ContentType::Bcd);
        let translator = translator();
        let path = Path::parse("CallEventDetail").unwrap();
        let pattern = regex::Regex::new("3375").unwrap();
        let changed = replace(&mut roots, &path, &pattern, "9999", &translator, None, &typifier).unwrap();
        assert_eq!(changed, 1);
        assert_eq!(roots[0].leaf_bytes(), Some(&[0x19, 0x99, 0x9f][..]));
    }

    #[test]
    fn replace_rewrites_multi_byte_integer_content() {
        // UNIVERSAL INTEGER, content 0xFF85 == -123, non-minimal 2-byte form.
        let mut roots = vec![Node::leaf(Class::Universal, Shape::Primitive, 2, vec![0xff, 0x85])];
        let typifier = Typifier::with_universal_defaults();
        let translator = NameTranslator::new();
        let pattern = regex::Regex::new("-123").unwrap();
        let changed = replace(&mut roots, &Path::parse("2").unwrap(), &pattern, "42", &translator, None, &typifier)
            .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(roots[0].leaf_bytes(), Some(&[42u8][..]));
    }

    #[test]
    fn set_att_overrides_tag_number() {
        let mut roots = vec![Node::leaf(Class::Universal, Shape::Primitive, 4, vec![1])];
        let translator = NameTranslator::new();
        let path = Path::parse("4").unwrap();
        let changed = set_att(&mut roots, &path, "tag", "5", &translator).unwrap();
        assert_eq!(changed, 1);
        assert_eq!(roots[0].tag, 5);
    }

    #[test]
    fn add_appends_new_leaf_child() {
        let mut roots = vec![Node::constructed(Class::Application, 1, false)];
        let mut translator = translator();
        translator.insert(Class::Application, Shape::Primitive, 3, "CallEventDetail");
        let typifier = Typifier::new();
        let path = Path::parse("TransferBatch").unwrap();
        let added = add(&mut roots, &path, "+CallEventDetail", "hello", &translator, None, &typifier).unwrap();
        assert_eq!(added, 1);
        assert_eq!(roots[0].children().unwrap().len(), 1);
    }

    #[test]
    fn insert_splices_raw_snippet_after_match() {
        let mut roots = vec![
            Node::leaf(Class::Application, Shape::Primitive, 3, vec![1]),
            Node::leaf(Class::Application, Shape::Primitive, 3, vec![2]),
        ];
        let translator = translator();
        let path = Path::parse("CallEventDetail[1]").unwrap();
        let snippet = [0x63u8, 0x01, 0x09];
        let inserted = insert(&mut roots, &path, &snippet, 2, &translator).unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(roots.len(), 3);
        assert_eq!(roots[1].leaf_bytes(), Some(&[9u8][..]));
    }
}
