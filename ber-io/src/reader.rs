//! Streaming readers over a [`Source`] (§4.4, C5): a flat reader that
//! yields units in raw document order, and a vertical reader that layers
//! the frame stack and `height` bookkeeping of §3.4 on top of it.

use ber_core::tag::Shape;
use ber_core::{BerError, Unit};

use crate::error::{IoError, IoResult};
use crate::scratchpad::{ScratchpadReader, Source};

/// Iterates TL units in document order without tracking enclosing
/// definite/indefinite frames. EOC sentinels surface as ordinary units.
/// Used for identity rewrite and raw inspection.
pub struct FlatReader<S: Source> {
    pad: ScratchpadReader<S>,
    current: Option<Unit>,
}

impl<S: Source> FlatReader<S> {
    pub fn new(source: S) -> Self {
        Self { pad: ScratchpadReader::new(source), current: None }
    }

    pub fn global_pos(&self) -> usize {
        self.pad.global_pos()
    }

    /// The most recently yielded unit.
    pub fn unit(&self) -> Unit {
        self.current.expect("unit() called before a successful advance()")
    }

    /// Content bytes of the current primitive unit, still resident in the
    /// scratchpad's active window.
    pub fn content(&self) -> ber_core::BerResult<&[u8]> {
        let unit = self.unit();
        if unit.shape == Shape::Constructed {
            return Err(BerError::MalformedContent(
                "cannot read content of a constructed unit".to_string(),
            ));
        }
        Ok(&self.pad.active()[unit.tl_size..unit.tl_size + unit.length])
    }

    /// The raw TL header bytes of the current unit.
    pub fn header_bytes(&self) -> &[u8] {
        &self.pad.active()[..self.unit().tl_size]
    }

    /// Advance to the next unit. `Ok(false)` means a clean EOF with no
    /// partial TL header pending.
    pub fn advance(&mut self) -> IoResult<bool> {
        if let Some(unit) = self.current.take() {
            let consumed = if unit.shape == Shape::Constructed {
                unit.tl_size
            } else {
                unit.tl_size + unit.length
            };
            self.pad.increment_head(consumed);
        }

        let mut want = 2usize;
        loop {
            let satisfied = self.pad.read_more(true, want)?;
            let active = self.pad.active();
            if active.is_empty() {
                return Ok(false);
            }
            match Unit::parse(active) {
                Ok(unit) => {
                    let whole = if unit.shape == Shape::Constructed {
                        unit.tl_size
                    } else {
                        unit.tl_size + unit.length
                    };
                    if active.len() < whole {
                        if !self.pad.read_more(true, whole)? {
                            return Err(IoError::UnexpectedEof { needed: whole - active.len() });
                        }
                        want = whole;
                        continue;
                    }
                    self.current = Some(unit);
                    return Ok(true);
                }
                Err(BerError::TlTooSmall { .. }) => {
                    if !satisfied {
                        return Err(IoError::UnexpectedEof { needed: 1 });
                    }
                    want += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Skip past `content_len` bytes of the current constructed unit's
    /// content without parsing any of it as units, leaving the reader
    /// positioned at the first sibling byte.
    pub(crate) fn skip_content(&mut self, content_len: usize) -> IoResult<()> {
        let unit = self.unit();
        debug_assert_eq!(unit.shape, Shape::Constructed);
        self.pad.increment_head(unit.tl_size);
        if !self.pad.read_more(true, content_len)? {
            return Err(IoError::UnexpectedEof { needed: content_len });
        }
        self.pad.increment_head(content_len);
        self.current = None;
        Ok(())
    }
}

/// One open definite or indefinite constructed frame (§3.4).
#[derive(Debug, Clone, Copy)]
struct Frame {
    length_consumed: usize,
    expected_length: usize,
    indefinite: bool,
}

/// A unit paired with its height (number of open ancestor frames) at the
/// moment it was yielded.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub unit: Unit,
    pub height: usize,
}

/// Reconstructs the implicit tree structure from a flat byte stream (§4.4):
/// maintains the frame stack, auto-pops satisfied definite frames, and
/// matches EOC sentinels to their indefinite openers.
pub struct VerticalReader<S: Source> {
    flat: FlatReader<S>,
    stack: Vec<Frame>,
    /// When set, EOC sentinels are consumed internally rather than
    /// surfaced to the caller ("clean" document order).
    skip_eoc: bool,
}

impl<S: Source> VerticalReader<S> {
    pub fn new(source: S) -> Self {
        Self { flat: FlatReader::new(source), stack: Vec::new(), skip_eoc: false }
    }

    /// Build a reader whose EOC sentinels are swallowed rather than
    /// yielded, so callers see only "real" content and opening/closing
    /// boundaries inferred from `height`.
    pub fn skipping_eoc(source: S) -> Self {
        Self { flat: FlatReader::new(source), stack: Vec::new(), skip_eoc: true }
    }

    pub fn height(&self) -> usize {
        self.stack.len()
    }

    pub fn global_pos(&self) -> usize {
        self.flat.global_pos()
    }

    pub fn content(&self) -> ber_core::BerResult<&[u8]> {
        self.flat.content()
    }

    pub fn header_bytes(&self) -> &[u8] {
        self.flat.header_bytes()
    }

    /// `true` once every opened frame has been closed; at EOF this is the
    /// check for "dangling constructed tags" (§4.7).
    pub fn is_balanced(&self) -> bool {
        self.stack.is_empty()
    }

    fn credit(&mut self, amount: usize) -> ber_core::BerResult<()> {
        if let Some(top) = self.stack.last_mut() {
            top.length_consumed += amount;
            if !top.indefinite && top.length_consumed > top.expected_length {
                return Err(BerError::LengthOverflow(
                    "definite frame exceeded by the current unit".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn cascade_pop(&mut self) -> ber_core::BerResult<()> {
        loop {
            let should_pop = matches!(
                self.stack.last(),
                Some(top) if !top.indefinite && top.length_consumed == top.expected_length
            );
            if !should_pop {
                return Ok(());
            }
            let frame = self.stack.pop().unwrap();
            self.credit(frame.expected_length)?;
        }
    }

    /// Advance to the next event. `Ok(None)` is EOF; callers should check
    /// [`Self::is_balanced`] to detect a dangling open frame.
    pub fn advance(&mut self) -> IoResult<Option<Event>> {
        loop {
            if !self.flat.advance()? {
                return Ok(None);
            }
            let unit = self.flat.unit();

            if unit.is_eoc() {
                let is_indefinite_top = matches!(self.stack.last(), Some(top) if top.indefinite);
                if !is_indefinite_top {
                    return Err(BerError::UnexpectedEoc.into());
                }
                let frame = self.stack.pop().unwrap();
                let height = self.stack.len();
                self.credit(frame.length_consumed + unit.tl_size)?;
                self.cascade_pop()?;
                if self.skip_eoc {
                    continue;
                }
                return Ok(Some(Event { unit, height }));
            }

            let height = self.stack.len();
            let pushes = unit.shape == Shape::Constructed && (unit.is_indefinite || unit.length > 0);

            if pushes {
                self.credit(unit.tl_size)?;
                self.stack.push(Frame {
                    length_consumed: 0,
                    expected_length: unit.length,
                    indefinite: unit.is_indefinite,
                });
            } else {
                self.credit(unit.tl_size + unit.length)?;
            }

            self.cascade_pop()?;
            return Ok(Some(Event { unit, height }));
        }
    }

    /// Skip a just-yielded **definite** constructed subtree without
    /// descending into it (§4.4 `skip`). Panics if the current unit did
    /// not open a definite frame.
    pub fn skip(&mut self) -> IoResult<()> {
        let frame = self.stack.pop().expect("skip: current unit has no open frame");
        assert!(!frame.indefinite, "skip requires a definite frame; use skip_children otherwise");
        self.flat.skip_content(frame.expected_length)?;
        self.credit(frame.expected_length)?;
        self.cascade_pop()?;
        Ok(())
    }

    /// Skip a just-yielded constructed subtree (definite or indefinite) by
    /// descending and re-reading until `height` returns to the opener's
    /// height (§4.4 `skip_children`).
    pub fn skip_children(&mut self) -> IoResult<()> {
        let target = self.stack.len().saturating_sub(1);
        while self.stack.len() > target {
            if self.advance()?.is_none() {
                return Err(IoError::Ber(BerError::UnexpectedEoc));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scratchpad::MemorySource;

    #[test]
    fn flat_reader_visits_eoc_as_ordinary_unit() {
        // A0 80 04 01 41 00 00 : indefinite APPLICATION[0] { OCTET STRING 'A' }
        let data = [0xa0, 0x80, 0x04, 0x01, 0x41, 0x00, 0x00];
        let mut reader = FlatReader::new(MemorySource::new(&data));
        let mut tags = vec![];
        while reader.advance().unwrap() {
            tags.push(reader.unit().tag);
        }
        assert_eq!(tags, vec![0, 4, 0]);
    }

    #[test]
    fn vertical_reader_tracks_height_and_pops_definite_frames() {
        let data = [0x61, 0x05, 0x04, 0x03, 0x01, 0x02, 0x03];
        let mut reader = VerticalReader::new(MemorySource::new(&data));

        let outer = reader.advance().unwrap().unwrap();
        assert_eq!(outer.height, 0);
        assert_eq!(outer.unit.tag, 1);

        let inner = reader.advance().unwrap().unwrap();
        assert_eq!(inner.height, 1);
        assert_eq!(inner.unit.tag, 4);
        assert_eq!(reader.content().unwrap(), &[1, 2, 3]);

        assert!(reader.advance().unwrap().is_none());
        assert!(reader.is_balanced());
    }

    #[test]
    fn vertical_reader_matches_eoc_height_to_opener() {
        let data = [0xa0, 0x80, 0x04, 0x01, 0x41, 0x00, 0x00];
        let mut reader = VerticalReader::new(MemorySource::new(&data));

        let opener = reader.advance().unwrap().unwrap();
        assert_eq!(opener.height, 0);

        let inner = reader.advance().unwrap().unwrap();
        assert_eq!(inner.height, 1);

        let eoc = reader.advance().unwrap().unwrap();
        assert!(eoc.unit.is_eoc());
        assert_eq!(eoc.height, 0);

        assert!(reader.advance().unwrap().is_none());
        assert!(reader.is_balanced());
    }

    #[test]
    fn unmatched_eoc_errors() {
        let data = [0x00, 0x00];
        let mut reader = VerticalReader::new(MemorySource::new(&data));
        let err = reader.advance().unwrap_err();
        assert!(matches!(err, IoError::Ber(BerError::UnexpectedEoc)));
    }

    #[test]
    fn skip_definite_subtree_without_descending() {
        // SEQUENCE { SEQUENCE { INTEGER 1 } INTEGER 7 }
        let data = [0x30, 0x05, 0x30, 0x03, 0x02, 0x01, 0x01, 0x02, 0x01, 0x07];
        let mut reader = VerticalReader::new(MemorySource::new(&data));
        let outer = reader.advance().unwrap().unwrap();
        assert_eq!(outer.height, 0);
        let inner = reader.advance().unwrap().unwrap();
        assert_eq!(inner.unit.tag, 16); // nested SEQUENCE
        reader.skip().unwrap();
        let sibling = reader.advance().unwrap().unwrap();
        assert_eq!(sibling.height, 1);
        assert_eq!(sibling.unit.tag, 2);
    }
}
