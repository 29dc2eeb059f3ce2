//! XML tokenizer (§4.9, C9): scans `<...>`-delimited tags out of a byte
//! stream, attaching the text run *before* a tag to that tag's token (so
//! a leaf element's text content always arrives glued to its `Close`
//! token, letting the writer decide primitive-vs-constructed without
//! lookahead). Comments and processing instructions are recognized and
//! skipped; attribute values may be single- or double-quoted.

use memchr::memchr;

use ber_io::scratchpad::Source;
use ber_io::{IoError, ScratchpadReader};

use crate::error::{XmlError, XmlResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Open,
    Close,
    /// A self-closing tag `<name .../>`, equivalent to an immediate
    /// `Open` followed by `Close` with no text content.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw tag body, e.g. `name attr='v'` for `Open`/`Empty`, `name` for
    /// `Close`. Unparsed; call [`parse_name_and_attrs`] to split it.
    pub body: String,
    /// Text between the end of the previous tag and the start of this
    /// one, unescaped-as-is (entity decoding happens in the writer since
    /// it is content-type aware).
    pub text_before: String,
}

fn find_byte(data: &[u8], from: usize, needle: u8) -> Option<usize> {
    memchr(needle, &data[from..]).map(|i| i + from)
}

fn find_window(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    haystack[from..].windows(needle.len()).position(|w| w == needle).map(|i| i + from)
}

/// Find the first `>` at or after `from` that is not inside a quoted
/// attribute value.
fn scan_unquoted_gt(data: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    let mut quote: Option<u8> = None;
    while i < data.len() {
        let b = data[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'>' => return Some(i),
                b'\'' | b'"' => quote = Some(b),
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Tokenizes an XML byte stream incrementally over a [`ScratchpadReader`],
/// re-buffering as needed so arbitrarily large documents never need to be
/// held in memory whole.
pub struct XmlReader<S: Source> {
    pad: ScratchpadReader<S>,
    done: bool,
}

impl<S: Source> XmlReader<S> {
    pub fn new(source: S) -> Self {
        Self { pad: ScratchpadReader::new(source), done: false }
    }

    /// Ensures at least `want` bytes are buffered (or EOF), returning the
    /// number actually available.
    fn ensure(&mut self, want: usize) -> XmlResult<usize> {
        self.pad.read_more(true, want).map_err(IoError::from)?;
        Ok(self.pad.available())
    }

    /// Grows the buffer in `step`-sized increments until `pred` is
    /// satisfied against the active window or EOF is reached.
    fn grow_while(&mut self, step: usize, mut pred: impl FnMut(&[u8]) -> bool) -> XmlResult<bool> {
        loop {
            let avail = self.ensure(self.pad.available() + 1)?;
            if pred(self.pad.active()) {
                return Ok(true);
            }
            let grown = self.ensure(avail + step)?;
            if grown <= avail {
                return Ok(false);
            }
        }
    }

    /// Returns the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> XmlResult<Option<Token>> {
        if self.done {
            return Ok(None);
        }
        loop {
            let avail = self.ensure(1)?;
            if avail == 0 {
                self.done = true;
                return Ok(None);
            }

            if find_byte(self.pad.active(), 0, b'<').is_none()
                && !self.grow_while(256, |d| find_byte(d, 0, b'<').is_some())?
            {
                self.done = true;
                return Ok(None);
            }
            let lt = find_byte(self.pad.active(), 0, b'<').expect("grow_while guaranteed a '<'");

            let text_before = String::from_utf8_lossy(&self.pad.active()[..lt]).into_owned();

            if self.pad.active()[lt..].starts_with(b"<!--") {
                if !self.grow_while(256, |d| find_window(d, lt, b"-->").is_some())? {
                    return Err(XmlError::Syntax("unterminated comment".to_string()));
                }
                let end = find_window(self.pad.active(), lt, b"-->").unwrap() + 3;
                self.pad.increment_head(end);
                continue;
            }

            if self.pad.active()[lt..].starts_with(b"<?") {
                if !self.grow_while(256, |d| scan_unquoted_gt(d, lt + 2).is_some())? {
                    return Err(XmlError::Syntax("unterminated declaration".to_string()));
                }
                let gt = scan_unquoted_gt(self.pad.active(), lt + 2).unwrap();
                self.pad.increment_head(gt + 1);
                continue;
            }

            if !self.grow_while(256, |d| scan_unquoted_gt(d, lt + 1).is_some())? {
                return Err(XmlError::Syntax("unterminated tag, missing '>'".to_string()));
            }
            let gt = scan_unquoted_gt(self.pad.active(), lt + 1).unwrap();
            let inner = &self.pad.active()[lt + 1..gt];

            let (kind, body_bytes) = if inner.starts_with(b"/") {
                (TokenKind::Close, inner[1..].to_vec())
            } else if inner.ends_with(b"/") {
                (TokenKind::Empty, inner[..inner.len() - 1].to_vec())
            } else {
                (TokenKind::Open, inner.to_vec())
            };
            let body = String::from_utf8_lossy(&body_bytes).trim().to_string();

            self.pad.increment_head(gt + 1);
            return Ok(Some(Token { kind, body, text_before }));
        }
    }
}

/// Splits a raw `Open`/`Empty` tag body like `name a='1' b="two"` into its
/// element name and an ordered list of `(attr, value)` pairs.
pub fn parse_name_and_attrs(body: &str) -> XmlResult<(String, Vec<(String, String)>)> {
    let body = body.trim();
    let name_end = body.find(|c: char| c.is_whitespace()).unwrap_or(body.len());
    let name = body[..name_end].to_string();
    if name.is_empty() {
        return Err(XmlError::Syntax("empty element name".to_string()));
    }

    let mut attrs = Vec::new();
    let rest = body[name_end..].trim_start();
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        let key_start = i;
        while i < bytes.len() && bytes[i] != b'=' && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let key = rest[key_start..i].to_string();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'=' {
            if key.is_empty() {
                break;
            }
            return Err(XmlError::Syntax(format!("attribute '{key}' missing '='")));
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let quote = bytes
            .get(i)
            .copied()
            .ok_or_else(|| XmlError::Syntax(format!("attribute '{key}' missing quoted value")))?;
        if quote != b'\'' && quote != b'"' {
            return Err(XmlError::Syntax(format!("attribute '{key}' value must be quoted")));
        }
        i += 1;
        let val_start = i;
        while i < bytes.len() && bytes[i] != quote {
            i += 1;
        }
        if i >= bytes.len() {
            return Err(XmlError::Syntax(format!("attribute '{key}' unterminated value")));
        }
        let value = rest[val_start..i].to_string();
        i += 1;
        attrs.push((key, value));
    }
    Ok((name, attrs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ber_io::scratchpad::MemorySource;

    fn tokens(xml: &str) -> Vec<Token> {
        let mut r = XmlReader::new(MemorySource::new(xml.as_bytes()));
        let mut out = Vec::new();
        while let Some(t) = r.next_token().unwrap() {
            out.push(t);
        }
        out
    }

    #[test]
    fn tokenizes_leaf_element_with_text() {
        let t = tokens("<p tag='4'>&#x01;&#x02;</p>");
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].kind, TokenKind::Open);
        assert_eq!(t[0].body, "p tag='4'");
        assert_eq!(t[1].kind, TokenKind::Close);
        assert_eq!(t[1].body, "p");
        assert_eq!(t[1].text_before, "&#x01;&#x02;");
    }

    #[test]
    fn skips_comments_and_declarations() {
        let t = tokens("<?xml version='1.0'?><!-- hi --><a></a>");
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].body, "a");
        assert_eq!(t[1].body, "a");
    }

    #[test]
    fn handles_self_closing_tag() {
        let t = tokens("<a><b/></a>");
        assert_eq!(t.len(), 3);
        assert_eq!(t[1].kind, TokenKind::Empty);
        assert_eq!(t[1].body, "b");
    }

    #[test]
    fn quote_aware_gt_inside_attribute() {
        let t = tokens("<a note='1 > 0'>x</a>");
        assert_eq!(t[0].body, "a note='1 > 0'");
    }

    #[test]
    fn parses_attrs_with_mixed_quotes() {
        let (name, attrs) = parse_name_and_attrs("p tag='4' class=\"UNIVERSAL\"").unwrap();
        assert_eq!(name, "p");
        assert_eq!(
            attrs,
            vec![("tag".to_string(), "4".to_string()), ("class".to_string(), "UNIVERSAL".to_string())]
        );
    }
}
