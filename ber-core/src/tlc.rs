//! TLC: a [`Unit`] plus a pointer to its content bytes in the original
//! wire buffer (§3.3).

use crate::error::{BerError, BerResult};
use crate::tag::Shape;
use crate::unit::Unit;

/// A unit together with its content slice, both borrowed from the source
/// buffer that was parsed.
#[derive(Debug, Clone, Copy)]
pub struct Tlc<'a> {
    pub unit: Unit,
    /// The identifier-octet start, i.e. the full TLV span is
    /// `begin[..tl_size + length]` for definite units.
    pub begin: &'a [u8],
}

impl<'a> Tlc<'a> {
    /// Parse a unit and its content from the start of `data`. For
    /// indefinite units, `content` is empty (callers must descend via a
    /// vertical reader to get the children).
    pub fn parse(data: &'a [u8]) -> BerResult<Tlc<'a>> {
        let unit = Unit::parse(data)?;
        if data.len() < unit.tl_size {
            return Err(BerError::TlTooSmall { available: data.len() });
        }
        Ok(Tlc { unit, begin: data })
    }

    /// The full TLV span (`tl_size + length` bytes), for definite units.
    pub fn whole(&self) -> BerResult<&'a [u8]> {
        let end = self.unit.tl_size + self.unit.length;
        self.begin.get(..end).ok_or(BerError::ContentOverflow {
            needed: end,
            available: self.begin.len(),
        })
    }

    /// The content slice `begin[tl_size .. tl_size+length)`. Fails if the
    /// shape is CONSTRUCTED (constructed content must be traversed, not
    /// copied as a flat byte range) or if the buffer doesn't hold the full
    /// declared length.
    pub fn content(&self) -> BerResult<&'a [u8]> {
        if self.unit.shape == Shape::Constructed {
            return Err(BerError::MalformedContent(
                "cannot copy content of a constructed unit".to_string(),
            ));
        }
        let start = self.unit.tl_size;
        let end = start + self.unit.length;
        self.begin.get(start..end).ok_or(BerError::ContentOverflow {
            needed: end,
            available: self.begin.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_excludes_header() {
        let data = [0x04, 0x03, 0x01, 0x02, 0x03];
        let tlc = Tlc::parse(&data).unwrap();
        assert_eq!(tlc.content().unwrap(), &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn constructed_content_errors() {
        let data = [0x61, 0x00];
        let tlc = Tlc::parse(&data).unwrap();
        assert!(tlc.content().is_err());
    }
}
