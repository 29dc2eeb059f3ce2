//! XML→BER writer (§4.10, C10): a single streaming pass over the
//! tokenizer that decides primitive-vs-constructed without lookahead, by
//! exploiting that a `Close` token immediately following an `Open` token
//! carries the element's full text content (the tokenizer glues text to
//! the *following* tag, never the preceding one).
//!
//! Each open element starts life `Unresolved`: once a child `Open` arrives
//! it becomes `Buffered` (accumulating content bytes for a definite
//! header written on close) or, if the source decorated it
//! `indefinite='true'`, `Passthrough` (its TL already streamed, children
//! written straight through, an EOC emitted on close).

use ber_core::hexesc;
use ber_core::tag::{Class, Shape};
use ber_core::{Unit, Value};
use ber_io::scratchpad::{Sink, Source};
use ber_io::ScratchpadWriter;

use crate::error::{XmlError, XmlResult};
use crate::translator::{ContentType, Dereferencer, NameTranslator, Typifier};
use crate::xml_reader::{parse_name_and_attrs, TokenKind, XmlReader};

enum FrameTarget {
    Unresolved,
    Buffered(Vec<u8>),
    Passthrough,
}

struct PendingFrame {
    class: Class,
    tag: u32,
    indefinite: bool,
    /// Forced length-of-length width from the `l_size` attribute (§4.9).
    l_size: Option<usize>,
    /// `uint2int` attribute (§4.9): reinterpret the decoded integer via
    /// [`ber_core::integer::uint_to_int`] before encoding, for grammars
    /// that used unsigned 32-bit on the wire but want signed 64-bit text.
    uint2int: bool,
    target: FrameTarget,
}

pub struct BerWriter<'a, S: Source, K: Sink> {
    reader: XmlReader<S>,
    sink: ScratchpadWriter<K>,
    translator: &'a NameTranslator,
    dereferencer: Option<&'a Dereferencer>,
    typifier: &'a Typifier,
    stack: Vec<PendingFrame>,
}

fn resolve_identity(
    translator: &NameTranslator,
    name: &str,
    attrs: &[(String, String)],
) -> XmlResult<(Class, u32)> {
    let tag_attr = attrs.iter().find(|(k, _)| k == "tag").map(|(_, v)| v.as_str());
    let class_attr = attrs.iter().find(|(k, _)| k == "class").map(|(_, v)| v.as_str());

    if let Some(tag_str) = tag_attr {
        let tag: u32 = tag_str
            .parse()
            .map_err(|_| XmlError::Syntax(format!("bad tag attribute '{tag_str}' on '{name}'")))?;
        let class = match class_attr {
            Some(c) => Class::from_name(c)?,
            None => Class::Universal,
        };
        return Ok((class, tag));
    }

    match translator.resolve(name) {
        Some((_, class, tag)) => Ok((class, tag)),
        None => Err(XmlError::UnknownName(name.to_string())),
    }
}

/// `indefinite='true'` or the legacy `definite='false'` alias (§6.2).
fn is_indefinite_attr(attrs: &[(String, String)]) -> bool {
    attrs.iter().any(|(k, v)| {
        (k == "indefinite" && v == "true") || (k == "definite" && v == "false")
    })
}

fn l_size_attr(name: &str, attrs: &[(String, String)]) -> XmlResult<Option<usize>> {
    match attrs.iter().find(|(k, _)| k == "l_size") {
        Some((_, v)) => {
            let n: usize = v
                .parse()
                .map_err(|_| XmlError::Syntax(format!("bad l_size attribute '{v}' on '{name}'")))?;
            Ok(Some(n))
        }
        None => Ok(None),
    }
}

fn uint2int_attr(attrs: &[(String, String)]) -> bool {
    attrs.iter().any(|(k, v)| k == "uint2int" && v == "true")
}

impl<'a, S: Source, K: Sink> BerWriter<'a, S, K> {
    pub fn new(source: S, sink: K, translator: &'a NameTranslator, typifier: &'a Typifier) -> Self {
        Self {
            reader: XmlReader::new(source),
            sink: ScratchpadWriter::new(sink),
            translator,
            dereferencer: None,
            typifier,
            stack: Vec::new(),
        }
    }

    pub fn with_dereferencer(mut self, dereferencer: &'a Dereferencer) -> Self {
        self.dereferencer = Some(dereferencer);
        self
    }

    fn content_type(&self, class: Class, tag: u32) -> ContentType {
        let (tc, tt) = match self.dereferencer {
            Some(d) => d.resolve(class, tag),
            None => (class, tag),
        };
        self.typifier.type_of(tc, tt)
    }

    fn encode_primitive(&self, class: Class, tag: u32, text: &str, uint2int: bool) -> XmlResult<Vec<u8>> {
        let value = match self.content_type(class, tag) {
            ContentType::Int64 => {
                let mut n: i64 = text
                    .trim()
                    .parse()
                    .map_err(|_| XmlError::Syntax(format!("'{text}' is not a valid integer")))?;
                if uint2int {
                    n = ber_core::integer::uint_to_int(n);
                }
                Value::I64(n)
            }
            ContentType::Bcd => Value::Bcd(text),
            ContentType::OctetString | ContentType::StringT => {
                Value::XmlEscaped(text, hexesc::Style::Xml)
            }
        };
        let len = value.minimally_encoded_length()?;
        let mut buf = vec![0u8; len];
        value.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Build a definite-form unit, widening its length-of-length per
    /// `l_size` when requested (§4.9).
    fn definite_unit(class: Class, shape: Shape, tag: u32, length: usize, l_size: Option<usize>) -> XmlResult<Unit> {
        let unit = Unit::new_definite(class, shape, tag, length);
        match l_size {
            Some(size) => Ok(unit.with_l_size(size)?),
            None => Ok(unit),
        }
    }

    /// Route `bytes` to the nearest enclosing `Buffered` ancestor,
    /// skipping over `Passthrough` frames (which have already streamed
    /// their own TL and pass children straight through); falls through to
    /// the sink when no buffering ancestor remains.
    fn emit(&mut self, bytes: &[u8]) -> XmlResult<()> {
        for frame in self.stack.iter_mut().rev() {
            if let FrameTarget::Buffered(buf) = &mut frame.target {
                buf.extend_from_slice(bytes);
                return Ok(());
            }
        }
        self.sink.write(bytes)?;
        Ok(())
    }

    /// Turn an `Unresolved` top-of-stack frame into `Buffered` or
    /// `Passthrough`, called the moment a child `Open` proves it is
    /// constructed.
    fn resolve_top_as_constructed(&mut self) -> XmlResult<()> {
        let Some(top) = self.stack.last_mut() else { return Ok(()) };
        if !matches!(top.target, FrameTarget::Unresolved) {
            return Ok(());
        }
        if top.indefinite {
            let unit = Unit::new_indefinite(top.class, top.tag);
            let mut header = vec![0u8; unit.tl_size];
            unit.write(&mut header)?;
            top.target = FrameTarget::Passthrough;
            self.emit(&header)?;
        } else {
            top.target = FrameTarget::Buffered(Vec::new());
        }
        Ok(())
    }

    fn push_open(&mut self, body: &str) -> XmlResult<()> {
        let (name, attrs) = parse_name_and_attrs(body)?;
        let (class, tag) = resolve_identity(self.translator, &name, &attrs)?;
        let indefinite = is_indefinite_attr(&attrs);
        let l_size = l_size_attr(&name, &attrs)?;
        let uint2int = uint2int_attr(&attrs);
        self.stack.push(PendingFrame { class, tag, indefinite, l_size, uint2int, target: FrameTarget::Unresolved });
        Ok(())
    }

    fn close_top(&mut self, text_before: &str) -> XmlResult<()> {
        let frame = self.stack.pop().ok_or_else(|| {
            XmlError::UnbalancedClose("close tag with no matching open element".to_string())
        })?;
        match frame.target {
            FrameTarget::Unresolved => {
                let content = self.encode_primitive(frame.class, frame.tag, text_before, frame.uint2int)?;
                let unit = Self::definite_unit(frame.class, Shape::Primitive, frame.tag, content.len(), frame.l_size)?;
                let mut header = vec![0u8; unit.tl_size];
                unit.write(&mut header)?;
                self.emit(&header)?;
                self.emit(&content)?;
            }
            FrameTarget::Buffered(buf) => {
                let unit = Self::definite_unit(frame.class, Shape::Constructed, frame.tag, buf.len(), frame.l_size)?;
                let mut header = vec![0u8; unit.tl_size];
                unit.write(&mut header)?;
                self.emit(&header)?;
                self.emit(&buf)?;
            }
            FrameTarget::Passthrough => {
                self.emit(&[0x00, 0x00])?;
            }
        }
        Ok(())
    }

    fn push_empty(&mut self, body: &str) -> XmlResult<()> {
        let (name, attrs) = parse_name_and_attrs(body)?;
        let (class, tag) = resolve_identity(self.translator, &name, &attrs)?;
        let l_size = l_size_attr(&name, &attrs)?;
        let uint2int = uint2int_attr(&attrs);
        let content = self.encode_primitive(class, tag, "", uint2int)?;
        let unit = Self::definite_unit(class, Shape::Primitive, tag, content.len(), l_size)?;
        let mut header = vec![0u8; unit.tl_size];
        unit.write(&mut header)?;
        self.emit(&header)?;
        self.emit(&content)?;
        Ok(())
    }

    /// Drive the writer to completion, returning the finished sink.
    pub fn run(mut self) -> XmlResult<K> {
        while let Some(token) = self.reader.next_token()? {
            match token.kind {
                TokenKind::Open => {
                    self.resolve_top_as_constructed()?;
                    self.push_open(&token.body)?;
                }
                TokenKind::Empty => {
                    self.resolve_top_as_constructed()?;
                    self.push_empty(&token.body)?;
                }
                TokenKind::Close => {
                    self.close_top(&token.text_before)?;
                }
            }
        }
        if !self.stack.is_empty() {
            return Err(XmlError::Syntax("dangling open element at end of input".to_string()));
        }
        Ok(self.sink.finish()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ber_io::scratchpad::{MemorySink, MemorySource};

    #[test]
    fn reverses_scenario_one_decorated_wrapper() {
        let xml = "<c tag='1' class='APPLICATION'><p tag='4' class='UNIVERSAL'>&#x01;&#x02;&#x03;</p></c>";
        let translator = NameTranslator::new();
        let typifier = Typifier::new();
        let writer = BerWriter::new(MemorySource::new(xml.as_bytes()), MemorySink::default(), &translator, &typifier);
        let out = writer.run().unwrap();
        assert_eq!(out.bytes, vec![0x61, 0x05, 0x04, 0x03, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn named_elements_round_trip_through_translator() {
        let xml = "<TransferBatch><CallEventDetail>13375</CallEventDetail></TransferBatch>";
        let mut translator = NameTranslator::new();
        translator.insert(Class::Application, Shape::Constructed, 1, "TransferBatch");
        translator.insert(Class::Application, Shape::Primitive, 3, "CallEventDetail");
        let mut typifier = Typifier::new();
        typifier.set(Class::Application, 3, ContentType::Bcd);
        let writer = BerWriter::new(MemorySource::new(xml.as_bytes()), MemorySink::default(), &translator, &typifier);
        let out = writer.run().unwrap();
        assert_eq!(out.bytes, vec![0x61, 0x05, 0x63, 0x03, 0x13, 0x37, 0x5f]);
    }

    #[test]
    fn indefinite_attribute_emits_eoc_terminated_frame() {
        let xml = "<c tag='1' class='APPLICATION' indefinite='true'><p tag='4' class='UNIVERSAL'>&#x01;</p></c>";
        let translator = NameTranslator::new();
        let typifier = Typifier::new();
        let writer = BerWriter::new(MemorySource::new(xml.as_bytes()), MemorySink::default(), &translator, &typifier);
        let out = writer.run().unwrap();
        assert_eq!(out.bytes, vec![0x61, 0x80, 0x04, 0x01, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn empty_element_encodes_as_zero_length_primitive() {
        let xml = "<p tag='4' class='UNIVERSAL'/>";
        let translator = NameTranslator::new();
        let typifier = Typifier::new();
        let writer = BerWriter::new(MemorySource::new(xml.as_bytes()), MemorySink::default(), &translator, &typifier);
        let out = writer.run().unwrap();
        assert_eq!(out.bytes, vec![0x04, 0x00]);
    }

    #[test]
    fn scenario_negative_128_integer() {
        let xml = "<p tag='2' class='UNIVERSAL'>-128</p>";
        let translator = NameTranslator::new();
        let typifier = Typifier::with_universal_defaults();
        let writer = BerWriter::new(MemorySource::new(xml.as_bytes()), MemorySink::default(), &translator, &typifier);
        let out = writer.run().unwrap();
        assert_eq!(out.bytes, vec![0x02, 0x01, 0x80]);
    }

    #[test]
    fn scenario_negative_128_with_forced_l_size() {
        let xml = "<p tag='2' class='UNIVERSAL' l_size='3'>-128</p>";
        let translator = NameTranslator::new();
        let typifier = Typifier::with_universal_defaults();
        let writer = BerWriter::new(MemorySource::new(xml.as_bytes()), MemorySink::default(), &translator, &typifier);
        let out = writer.run().unwrap();
        assert_eq!(out.bytes, vec![0x02, 0x82, 0x00, 0x01, 0x80]);
    }

    #[test]
    fn definite_false_alias_behaves_like_indefinite_true() {
        let xml = "<c tag='1' class='APPLICATION' definite='false'><p tag='4' class='UNIVERSAL'>&#x01;</p></c>";
        let translator = NameTranslator::new();
        let typifier = Typifier::new();
        let writer = BerWriter::new(MemorySource::new(xml.as_bytes()), MemorySink::default(), &translator, &typifier);
        let out = writer.run().unwrap();
        assert_eq!(out.bytes, vec![0x61, 0x80, 0x04, 0x01, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn uint2int_masks_negative_value_before_encoding() {
        let xml = "<p tag='2' class='UNIVERSAL' uint2int='true'>-1</p>";
        let translator = NameTranslator::new();
        let typifier = Typifier::with_universal_defaults();
        let writer = BerWriter::new(MemorySource::new(xml.as_bytes()), MemorySink::default(), &translator, &typifier);
        let out = writer.run().unwrap();
        // uint_to_int(-1) == 0xffff_ffff, which needs a leading 0x00 to stay
        // positive in two's-complement, i.e. 5 content bytes.
        assert_eq!(out.bytes, vec![0x02, 0x05, 0x00, 0xff, 0xff, 0xff, 0xff]);
    }
}
