//! The typed value sum type (§3.5, C4): a closed set of variants, each
//! offering a minimal encoded length and an `encode_into`. Dispatch is an
//! exhaustive match rather than open-ended dynamic dispatch, per §9.

use crate::bcd;
use crate::error::BerResult;
use crate::hexesc::{self, Style};
use crate::integer;

/// A decoded or to-be-encoded primitive content value.
///
/// Owned variants (`Utf8`) are used when content must outlive the source
/// buffer (e.g. after an XML attribute has been unescaped into a fresh
/// `String`); range variants borrow directly from the wire or XML text
/// buffer they were read from.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    Bool(bool),
    /// An owned, already-decoded UTF-8 string.
    Utf8Owned(String),
    /// A raw byte range, encoded verbatim (OCTET STRING).
    Bytes(&'a [u8]),
    /// A UTF-8 text range borrowed from the source (STRING-typed content
    /// whose bytes are already valid UTF-8 and need no escaping).
    Chars(&'a str),
    /// Content that is hex-escaped text in the given style, still encoded;
    /// `encode_into` unescapes it on the fly.
    XmlEscaped(&'a str, Style),
    /// BCD digit text (already ASCII `[0-9a-f]`); `encode_into` packs it.
    Bcd(&'a str),
}

impl<'a> Value<'a> {
    /// The number of content bytes this value would occupy on the wire.
    pub fn minimally_encoded_length(&self) -> BerResult<usize> {
        Ok(match self {
            Value::U8(v) => integer::minimally_encoded_length_u64(*v as u64),
            Value::I8(v) => integer::minimally_encoded_length_i64(*v as i64),
            Value::U16(v) => integer::minimally_encoded_length_u64(*v as u64),
            Value::I16(v) => integer::minimally_encoded_length_i64(*v as i64),
            Value::U32(v) => integer::minimally_encoded_length_u64(*v as u64),
            Value::I32(v) => integer::minimally_encoded_length_i64(*v as i64),
            Value::U64(v) => integer::minimally_encoded_length_u64(*v),
            Value::I64(v) => integer::minimally_encoded_length_i64(*v),
            Value::Bool(_) => 1,
            Value::Utf8Owned(s) => s.len(),
            Value::Bytes(b) => b.len(),
            Value::Chars(s) => s.len(),
            Value::XmlEscaped(s, style) => hexesc::decoded_size(*style, s.as_bytes())?,
            Value::Bcd(s) => bcd::encoded_size(s.len()),
        })
    }

    /// Encode this value's content bytes into `buf`. `buf` must be at
    /// least `minimally_encoded_length()` bytes. Returns bytes written.
    pub fn encode_into(&self, buf: &mut [u8]) -> BerResult<usize> {
        match self {
            Value::U8(v) => integer::encode_u64(*v as u64, buf),
            Value::I8(v) => integer::encode_i64(*v as i64, buf),
            Value::U16(v) => integer::encode_u64(*v as u64, buf),
            Value::I16(v) => integer::encode_i64(*v as i64, buf),
            Value::U32(v) => integer::encode_u64(*v as u64, buf),
            Value::I32(v) => integer::encode_i64(*v as i64, buf),
            Value::U64(v) => integer::encode_u64(*v, buf),
            Value::I64(v) => integer::encode_i64(*v, buf),
            Value::Bool(v) => {
                buf[0] = if *v { 0xff } else { 0x00 };
                Ok(1)
            }
            Value::Utf8Owned(s) => {
                buf[..s.len()].copy_from_slice(s.as_bytes());
                Ok(s.len())
            }
            Value::Bytes(b) => {
                buf[..b.len()].copy_from_slice(b);
                Ok(b.len())
            }
            Value::Chars(s) => {
                buf[..s.len()].copy_from_slice(s.as_bytes());
                Ok(s.len())
            }
            Value::XmlEscaped(s, style) => hexesc::decode(*style, s.as_bytes(), buf),
            Value::Bcd(s) => bcd::encode(s.as_bytes(), buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_encodes_as_single_byte() {
        let v = Value::Bool(true);
        let mut buf = [0u8; 1];
        let n = v.encode_into(&mut buf).unwrap();
        assert_eq!(n, 1);
        assert_eq!(buf[0], 0xff);
    }

    #[test]
    fn xml_escaped_round_trips_through_encode() {
        let v = Value::XmlEscaped("&#x01;&#x02;", Style::Xml);
        let len = v.minimally_encoded_length().unwrap();
        let mut buf = vec![0u8; len];
        let n = v.encode_into(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x01, 0x02]);
    }
}
