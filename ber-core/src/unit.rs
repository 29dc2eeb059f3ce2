//! The TL (tag + length) header (§3.2) and its parse/serialize logic
//! (§4.3).

use crate::error::{BerError, BerResult};
use crate::tag::{self, Class, Shape};

/// A parsed TL header: everything about a BER unit except its content
/// bytes.
///
/// Field names and invariants follow §3.2 directly:
/// - `tl_size >= t_size + 1`
/// - `is_indefinite` implies `shape == Constructed`, `length == 0`, and
///   `tl_size == t_size + 1`
/// - `is_long_definite` implies `length > 127` or an explicit oversize
///   length was requested via [`Unit::write_with_l_size`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit {
    pub class: Class,
    pub shape: Shape,
    pub is_long_tag: bool,
    pub is_indefinite: bool,
    pub is_long_definite: bool,
    pub t_size: usize,
    pub tl_size: usize,
    pub tag: u32,
    pub length: usize,
}

impl Unit {
    /// The EOC sentinel: `(UNIVERSAL, PRIMITIVE, tag=0, tl_size=2, length=0)`,
    /// wire bytes `00 00`.
    pub const EOC: Unit = Unit {
        class: Class::Universal,
        shape: Shape::Primitive,
        is_long_tag: false,
        is_indefinite: false,
        is_long_definite: false,
        t_size: 1,
        tl_size: 2,
        tag: 0,
        length: 0,
    };

    pub fn is_eoc(&self) -> bool {
        self.class == Class::Universal
            && self.shape == Shape::Primitive
            && self.tag == 0
            && self.length == 0
            && self.tl_size == 2
    }

    /// Parse a TL header from the start of `data`.
    pub fn parse(data: &[u8]) -> BerResult<Unit> {
        if data.len() < 2 {
            return Err(BerError::TlTooSmall { available: data.len() });
        }

        let (class, shape, is_long_tag, tag, t_size) = tag::parse_identifier(data)?;

        let length_start = &data[t_size..];
        let Some(&len_byte) = length_start.first() else {
            return Err(BerError::TlTooSmall { available: data.len() });
        };

        if len_byte & 0x80 == 0 {
            // Short form: 0..=127.
            return Ok(Unit {
                class,
                shape,
                is_long_tag,
                is_indefinite: false,
                is_long_definite: false,
                t_size,
                tl_size: t_size + 1,
                tag,
                length: len_byte as usize,
            });
        }

        let n = len_byte & 0x7f;
        if n == 0 {
            // Indefinite form, only legal on constructed shapes.
            if shape != Shape::Constructed {
                return Err(BerError::LengthOverflow(
                    "indefinite length on a primitive tag".to_string(),
                ));
            }
            return Ok(Unit {
                class,
                shape,
                is_long_tag,
                is_indefinite: true,
                is_long_definite: false,
                t_size,
                tl_size: t_size + 1,
                tag,
                length: 0,
            });
        }

        let n = n as usize;
        if n > size_of::<usize>() {
            return Err(BerError::LengthOverflow(format!(
                "long-form length uses {n} bytes, platform usize holds {}",
                size_of::<usize>()
            )));
        }

        let len_bytes = length_start.get(1..1 + n).ok_or(BerError::TlTooSmall {
            available: data.len(),
        })?;

        let mut length: usize = 0;
        for &b in len_bytes {
            length = (length << 8) | b as usize;
        }

        Ok(Unit {
            class,
            shape,
            is_long_tag,
            is_indefinite: false,
            is_long_definite: true,
            t_size,
            tl_size: t_size + 1 + n,
            tag,
            length,
        })
    }

    /// Serialize this unit's TL header into `buf`. Fails with a buffer
    /// overflow if `tl_size > buf.len()`.
    pub fn write(&self, buf: &mut [u8]) -> BerResult<usize> {
        if buf.len() < self.tl_size {
            return Err(BerError::BufferOverflow {
                needed: self.tl_size,
                available: buf.len(),
            });
        }

        let t_written = tag::write_identifier(buf, self.class, self.shape, self.tag)?;
        debug_assert_eq!(t_written, self.t_size);

        let length_buf = &mut buf[t_written..];

        if self.is_indefinite {
            length_buf[0] = 0x80;
            return Ok(self.tl_size);
        }

        let l_size = self.tl_size - t_written - 1;
        if l_size == 0 {
            if self.length > 127 {
                return Err(BerError::LengthOverflow(
                    "short-form length byte cannot hold a value over 127".to_string(),
                ));
            }
            length_buf[0] = self.length as u8;
        } else {
            if l_size > 127 {
                return Err(BerError::LengthOverflow(
                    "long-form length-of-length exceeds 127".to_string(),
                ));
            }
            length_buf[0] = 0x80 | l_size as u8;
            let bytes = self.length.to_be_bytes();
            let body = &mut length_buf[1..1 + l_size];
            if l_size >= bytes.len() {
                // A forced, non-minimal l_size: zero-pad on the left.
                let pad = l_size - bytes.len();
                body[..pad].fill(0);
                body[pad..].copy_from_slice(&bytes);
            } else {
                body.copy_from_slice(&bytes[bytes.len() - l_size..]);
            }
        }

        Ok(self.tl_size)
    }

    /// Build a unit in minimal definite form for `(class, shape, tag,
    /// length)`, computing `t_size`/`tl_size` the way `init_tag` /
    /// `init_length` would.
    pub fn new_definite(class: Class, shape: Shape, tag: u32, length: usize) -> Unit {
        let t_size = tag::identifier_size(tag);
        let l_size = minimal_length_size(length);
        let is_long_definite = l_size > 0;
        Unit {
            class,
            shape,
            is_long_tag: t_size > 1,
            is_indefinite: false,
            is_long_definite,
            t_size,
            tl_size: t_size + 1 + l_size,
            tag,
            length,
        }
    }

    /// Build an indefinite-form constructed unit.
    pub fn new_indefinite(class: Class, tag: u32) -> Unit {
        let t_size = tag::identifier_size(tag);
        Unit {
            class,
            shape: Shape::Constructed,
            is_long_tag: t_size > 1,
            is_indefinite: true,
            is_long_definite: false,
            t_size,
            tl_size: t_size + 1,
            tag,
            length: 0,
        }
    }

    /// Force a non-minimal length-of-length width (§4.3 `init_l_size`),
    /// e.g. for the `l_size` XML attribute (§4.9). `size` must be at least
    /// the minimal width or this returns a length overflow error.
    pub fn with_l_size(mut self, size: usize) -> BerResult<Unit> {
        if self.is_indefinite {
            return Err(BerError::LengthOverflow(
                "cannot force l_size on an indefinite unit".to_string(),
            ));
        }
        let minimal = minimal_length_size(self.length);
        if size < minimal {
            return Err(BerError::LengthOverflow(format!(
                "requested l_size {size} is smaller than the minimal {minimal}"
            )));
        }
        self.is_long_definite = size > 0;
        self.tl_size = self.t_size + 1 + size;
        Ok(self)
    }
}

/// Number of long-form length bytes needed for `length`, or 0 if it fits in
/// the short form.
fn minimal_length_size(length: usize) -> usize {
    if length <= 127 {
        return 0;
    }
    let bits = usize::BITS - length.leading_zeros();
    ((bits + 7) / 8) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_definite_round_trips() {
        let unit = Unit::new_definite(Class::Application, Shape::Constructed, 1, 3);
        let mut buf = vec![0u8; unit.tl_size];
        unit.write(&mut buf).unwrap();
        assert_eq!(buf, [0x61, 0x03]);
        let parsed = Unit::parse(&buf).unwrap();
        assert_eq!(parsed, unit);
    }

    #[test]
    fn long_definite_round_trips() {
        let unit = Unit::new_definite(Class::Universal, Shape::Primitive, 4, 200);
        let mut buf = vec![0u8; unit.tl_size];
        unit.write(&mut buf).unwrap();
        assert_eq!(buf, [0x04, 0x81, 0xc8]);
        let parsed = Unit::parse(&buf).unwrap();
        assert_eq!(parsed, unit);
    }

    #[test]
    fn indefinite_round_trips() {
        let unit = Unit::new_indefinite(Class::Application, 0);
        let mut buf = vec![0u8; unit.tl_size];
        unit.write(&mut buf).unwrap();
        assert_eq!(buf, [0x60 | 0x20, 0x80]);
        let parsed = Unit::parse(&buf).unwrap();
        assert!(parsed.is_indefinite);
        assert_eq!(parsed.length, 0);
    }

    #[test]
    fn eoc_parses_as_sentinel() {
        let parsed = Unit::parse(&[0x00, 0x00]).unwrap();
        assert!(parsed.is_eoc());
    }

    #[test]
    fn forced_l_size_widens_header() {
        let unit = Unit::new_definite(Class::Universal, Shape::Primitive, 2, 1)
            .with_l_size(3)
            .unwrap();
        let mut buf = vec![0u8; unit.tl_size];
        unit.write(&mut buf).unwrap();
        assert_eq!(buf, [0x02, 0x82, 0x00, 0x01]);
    }

    #[test]
    fn length_overflow_on_too_many_length_bytes() {
        let mut data = vec![0x04u8, 0x80 | (size_of::<usize>() as u8 + 1)];
        data.extend(std::iter::repeat(0u8).take(size_of::<usize>() + 1));
        assert!(matches!(Unit::parse(&data), Err(BerError::LengthOverflow(_))));
    }
}
