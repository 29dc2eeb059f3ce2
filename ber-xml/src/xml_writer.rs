//! BER→XML writer (§4.7, C8): consumes a vertical unit stream and emits a
//! path-filtered, attribute-decorated XML projection.

use std::fmt::Write as _;

use ber_core::tag::{Class, Shape};
use ber_core::{bcd, hexesc, integer};
use ber_io::scratchpad::{Sink, Source};
use ber_io::{Event, VerticalReader};

use crate::error::{XmlError, XmlResult};
use crate::path::Matcher;
use crate::translator::{ContentType, Dereferencer, NameTranslator, Typifier};

/// Which diagnostic attributes to decorate elements with; each is opt-in
/// (§4.7 "Attribute decoration is opt-in per attribute").
#[derive(Debug, Clone, Copy, Default)]
pub struct Attributes {
    pub tag: bool,
    pub class: bool,
    pub tl: bool,
    pub t: bool,
    pub length: bool,
    pub off: bool,
    pub hex: bool,
    pub rank: bool,
}

#[derive(Default)]
pub struct WriteOptions {
    pub attributes: Attributes,
    pub stop_after_first: bool,
    pub count: Option<usize>,
}

/// Per-tag callback invoked on every emitted primitive, producing a `pp`
/// attribute string (§4.7 "Pretty-print hook").
pub type PrettyPrintHook<'a> = dyn FnMut(Class, u32, &[u8]) -> String + 'a;

struct OpenFrame {
    class: Class,
    tag: u32,
    indefinite: bool,
    emitting: bool,
    child_rank: usize,
}

pub struct XmlWriter<'a, S: Source, K: Sink> {
    reader: VerticalReader<S>,
    sink: ber_io::ScratchpadWriter<K>,
    translator: &'a NameTranslator,
    dereferencer: Option<&'a Dereferencer>,
    typifier: &'a Typifier,
    matcher: Option<Matcher<'a>>,
    options: WriteOptions,
    pp_hook: Option<&'a mut PrettyPrintHook<'a>>,
    ancestry: Vec<(Class, u32)>,
    stack: Vec<OpenFrame>,
    roots_done: usize,
}

fn fallback_name(shape: Shape, indefinite: bool) -> &'static str {
    match (shape, indefinite) {
        (Shape::Primitive, _) => "p",
        (Shape::Constructed, true) => "i",
        (Shape::Constructed, false) => "c",
    }
}

fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

impl<'a, S: Source, K: Sink> XmlWriter<'a, S, K> {
    pub fn new(
        source: S,
        sink: K,
        translator: &'a NameTranslator,
        typifier: &'a Typifier,
        options: WriteOptions,
    ) -> Self {
        Self {
            reader: VerticalReader::new(source),
            sink: ber_io::ScratchpadWriter::new(sink),
            translator,
            dereferencer: None,
            typifier,
            matcher: None,
            options,
            pp_hook: None,
            ancestry: Vec::new(),
            stack: Vec::new(),
            roots_done: 0,
        }
    }

    pub fn with_dereferencer(mut self, dereferencer: &'a Dereferencer) -> Self {
        self.dereferencer = Some(dereferencer);
        self
    }

    pub fn with_matcher(mut self, matcher: Matcher<'a>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn with_pp_hook(mut self, hook: &'a mut PrettyPrintHook<'a>) -> Self {
        self.pp_hook = Some(hook);
        self
    }

    fn element_name(&self, class: Class, tag: u32, shape: Shape, indefinite: bool) -> String {
        match self.translator.name_for(class, tag) {
            Some(name) => name.to_string(),
            None => fallback_name(shape, indefinite).to_string(),
        }
    }

    fn decorate(&self, out: &mut String, class: Class, tag: u32, unit: &ber_core::Unit, off: usize, rank: usize) {
        let a = self.options.attributes;
        if a.tag {
            let _ = write!(out, " tag='{tag}'");
        }
        if a.class {
            let _ = write!(out, " class='{}'", class.name());
        }
        if a.tl {
            let _ = write!(out, " tl='{}'", unit.tl_size);
        }
        if a.t {
            let _ = write!(out, " t='{}'", unit.t_size);
        }
        if a.length {
            let _ = write!(out, " length='{}'", unit.length);
        }
        if a.off {
            let _ = write!(out, " off='{off}'");
        }
        if a.rank {
            let _ = write!(out, " rank='{rank}'");
        }
        if unit.is_indefinite {
            out.push_str(" indefinite='true'");
        }
    }

    fn render_content(&self, class: Class, tag: u32, content: &[u8]) -> XmlResult<String> {
        let (type_class, type_tag) = match self.dereferencer {
            Some(d) => d.resolve(class, tag),
            None => (class, tag),
        };
        match self.typifier.type_of(type_class, type_tag) {
            ContentType::Int64 => {
                let v = integer::decode_i64(content)?;
                Ok(v.to_string())
            }
            ContentType::Bcd => Ok(bcd::decode_to_string(content)?),
            ContentType::StringT | ContentType::OctetString => {
                Ok(hexesc::encode_to_string(hexesc::Style::Xml, content))
            }
        }
    }

    /// §9's rank rule: 1-based counting over all siblings at this level,
    /// regardless of whether they are individually filtered out.
    fn rank_for_current(&mut self) -> usize {
        if let Some(top) = self.stack.last_mut() {
            top.child_rank += 1;
            top.child_rank
        } else {
            self.roots_done + 1
        }
    }

    fn close_top(&mut self) -> XmlResult<()> {
        let frame = self.stack.pop().expect("close_top called with an empty stack");
        self.ancestry.pop();
        if frame.emitting {
            let name = self.element_name(frame.class, frame.tag, Shape::Constructed, frame.indefinite);
            let mut out = String::new();
            let _ = write!(out, "</{name}>");
            self.sink.write(out.as_bytes())?;
        }
        if self.stack.is_empty() {
            self.roots_done += 1;
        }
        Ok(())
    }

    fn handle_eoc(&mut self) -> XmlResult<()> {
        self.close_top()
    }

    fn handle_unit(&mut self, event: Event, off: usize) -> XmlResult<()> {
        let unit = event.unit;
        self.ancestry.push((unit.class, unit.tag));
        let rank = self.rank_for_current();
        let emit = match &mut self.matcher {
            Some(m) => m.check(&self.ancestry, self.translator),
            None => true,
        };
        let could_match_below = match &self.matcher {
            Some(m) => m.could_match_below(self.ancestry.len()),
            None => true,
        };

        let pushes = unit.shape == Shape::Constructed && (unit.is_indefinite || unit.length > 0);

        if pushes && !emit && !could_match_below && !unit.is_indefinite {
            self.ancestry.pop();
            self.reader.skip()?;
            return Ok(());
        }

        if pushes {
            if emit {
                let name = self.element_name(unit.class, unit.tag, unit.shape, unit.is_indefinite);
                let mut out = String::new();
                let _ = write!(out, "<{name}");
                self.decorate(&mut out, unit.class, unit.tag, &unit, off, rank);
                out.push('>');
                self.sink.write(out.as_bytes())?;
            }
            self.stack.push(OpenFrame {
                class: unit.class,
                tag: unit.tag,
                indefinite: unit.is_indefinite,
                emitting: emit,
                child_rank: 0,
            });
            return Ok(());
        }

        // Leaf, or an empty definite constructed (no children at all).
        if emit {
            let content = if unit.shape == Shape::Primitive {
                self.reader.content()?.to_vec()
            } else {
                Vec::new()
            };
            let name = self.element_name(unit.class, unit.tag, unit.shape, unit.is_indefinite);
            let mut out = String::new();
            let _ = write!(out, "<{name}");
            self.decorate(&mut out, unit.class, unit.tag, &unit, off, rank);
            if !content.is_empty() {
                if let Some(hook) = self.pp_hook.as_deref_mut() {
                    let pp = hook(unit.class, unit.tag, &content).replace('\'', "&apos;");
                    let _ = write!(out, " pp='{pp}'");
                }
            }
            out.push('>');
            if !content.is_empty() {
                out.push_str(&self.render_content(unit.class, unit.tag, &content)?);
            }
            if self.options.attributes.hex {
                let _ = write!(out, "<!--hex:{}-->", hex_dump(&content));
            }
            let _ = write!(out, "</{name}>");
            self.sink.write(out.as_bytes())?;
        }
        self.ancestry.pop();
        if self.stack.is_empty() {
            self.roots_done += 1;
        }
        Ok(())
    }

    /// Drive the writer to completion, returning the finished sink.
    pub fn run(mut self) -> XmlResult<K> {
        loop {
            let event = match self.reader.advance()? {
                None => {
                    if !self.stack.is_empty() {
                        return Err(XmlError::Syntax(
                            "dangling constructed element at end of input".to_string(),
                        ));
                    }
                    break;
                }
                Some(e) => e,
            };
            let off = self.reader.global_pos();

            if event.unit.is_eoc() {
                self.handle_eoc()?;
            } else {
                self.handle_unit(event, off)?;
            }

            while self.reader.height() < self.stack.len() {
                self.close_top()?;
            }

            if self.stack.is_empty() && self.roots_done > 0 {
                if self.options.stop_after_first {
                    break;
                }
                if let Some(n) = self.options.count {
                    if self.roots_done >= n {
                        break;
                    }
                }
            }
        }
        Ok(self.sink.finish()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ber_io::scratchpad::{MemorySink, MemorySource};

    #[test]
    fn scenario_one_decorated_application_wrapper() {
        let data = hex_literal::hex!("61 05 04 03 01 02 03");
        let translator = NameTranslator::new();
        let typifier = Typifier::new();
        let options = WriteOptions {
            attributes: Attributes { tag: true, class: true, ..Default::default() },
            ..Default::default()
        };
        let writer = XmlWriter::new(MemorySource::new(&data), MemorySink::new(), &translator, &typifier, options);
        let out = writer.run().unwrap();
        let xml = String::from_utf8(out.into_inner()).unwrap();
        assert_eq!(
            xml,
            "<c tag='1' class='APPLICATION'><p tag='4' class='UNIVERSAL'>&#x01;&#x02;&#x03;</p></c>"
        );
    }

    #[test]
    fn path_filter_emits_only_third_cdr() {
        // APPLICATION 1 { APPLICATION 2 { APPLICATION 3 x4, each holding one byte } }
        let mut data = vec![0x61, 0x00];
        let mut inner = vec![0x62, 0x00];
        for b in 1u8..=4 {
            inner.extend([0x63, 0x01, b]);
        }
        let inner_len = inner.len() - 2;
        inner[1] = inner_len as u8;
        data.extend(inner);
        let data_len = data.len() - 2;
        data[1] = data_len as u8;

        let mut translator = NameTranslator::new();
        translator.insert(Class::Application, Shape::Constructed, 1, "TransferBatch");
        translator.insert(Class::Application, Shape::Constructed, 2, "CallEventDetailList");
        translator.insert(Class::Application, Shape::Primitive, 3, "CallEventDetail");
        let typifier = Typifier::new();
        let path = crate::path::Path::parse("/TransferBatch/CallEventDetailList/*[3]").unwrap();
        let matcher = Matcher::new(&path);
        let options = WriteOptions::default();
        let writer = XmlWriter::new(MemorySource::new(&data), MemorySink::new(), &translator, &typifier, options)
            .with_matcher(matcher);
        let out = writer.run().unwrap();
        let xml = String::from_utf8(out.into_inner()).unwrap();
        assert_eq!(xml.matches("CallEventDetail").count(), 2); // one open + one close tag
        assert!(xml.contains("&#x03;"));
        assert!(!xml.contains("&#x01;"));
    }

    #[test]
    fn int64_content_renders_multi_byte_negative_value() {
        // UNIVERSAL INTEGER, content 0xFF85 == -123, non-minimal 2-byte form.
        let data = hex_literal::hex!("02 02 FF 85");
        let translator = NameTranslator::new();
        let typifier = Typifier::with_universal_defaults();
        let options = WriteOptions::default();
        let writer = XmlWriter::new(MemorySource::new(&data), MemorySink::new(), &translator, &typifier, options);
        let out = writer.run().unwrap();
        let xml = String::from_utf8(out.into_inner()).unwrap();
        assert_eq!(xml, "<p>-123</p>");
    }

    #[test]
    fn off_attribute_reflects_each_units_own_start() {
        // Two sibling OCTET STRINGs back to back; the second starts at
        // offset 3, not at the first's stale offset of 0.
        let data = hex_literal::hex!("04 01 11 04 01 22");
        let translator = NameTranslator::new();
        let typifier = Typifier::new();
        let options =
            WriteOptions { attributes: Attributes { off: true, ..Default::default() }, ..Default::default() };
        let writer = XmlWriter::new(MemorySource::new(&data), MemorySink::new(), &translator, &typifier, options);
        let out = writer.run().unwrap();
        let xml = String::from_utf8(out.into_inner()).unwrap();
        assert_eq!(xml, "<p off='0'>&#x11;</p><p off='3'>&#x22;</p>");
    }

    #[test]
    fn pp_hook_decorates_primitive_content() {
        let data = hex_literal::hex!("04 01 2a"); // OCTET STRING 0x2a
        let translator = NameTranslator::new();
        let typifier = Typifier::new();
        let options = WriteOptions::default();
        let mut hook = |_class: Class, _tag: u32, content: &[u8]| format!("n{}", content[0]);
        let writer = XmlWriter::new(MemorySource::new(&data), MemorySink::new(), &translator, &typifier, options)
            .with_pp_hook(&mut hook);
        let out = writer.run().unwrap();
        let xml = String::from_utf8(out.into_inner()).unwrap();
        assert!(xml.contains("pp='n42'"), "expected a pp attribute, got {xml}");
    }
}
