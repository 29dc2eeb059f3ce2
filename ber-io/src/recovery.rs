//! Optional recovery wrappers for damaged input (§4.4): `skip_zero` scans
//! forward past an `UnexpectedEoc` to the next plausible resync point,
//! and block recovery isolates each fixed-size block so a parse error in
//! one does not abort the whole file. Both operate on a fully buffered
//! slice, since resyncing requires re-seeking past the point of failure.

use ber_core::tag::Shape;
use ber_core::{BerError, Unit};

use crate::error::{IoError, IoResult};
use crate::reader::VerticalReader;
use crate::scratchpad::MemorySource;

/// An event with its content copied out, since recovery may discard and
/// restart the underlying reader at an arbitrary offset.
#[derive(Debug, Clone)]
pub struct RecoveredEvent {
    pub unit: Unit,
    pub height: usize,
    pub content: Vec<u8>,
}

fn round_up(pos: usize, boundary: usize) -> usize {
    let rem = pos % boundary;
    if rem == 0 { pos } else { pos + (boundary - rem) }
}

/// Read `data`, and on `UnexpectedEoc` resync by scanning forward to the
/// next non-zero byte (or, with `strong`, the next 1 KiB boundary) and
/// retrying from there. Never returns an error: a byte range that cannot
/// be resynced simply yields no further events.
pub fn read_with_skip_zero(data: &[u8], strong: bool) -> Vec<RecoveredEvent> {
    let mut events = Vec::new();
    let mut offset = 0usize;

    while offset < data.len() {
        let mut reader = VerticalReader::new(MemorySource::new(&data[offset..]));
        let mut failed_at = None;

        loop {
            match reader.advance() {
                Ok(Some(event)) => {
                    let content = if event.unit.shape == Shape::Primitive {
                        reader.content().unwrap_or(&[]).to_vec()
                    } else {
                        Vec::new()
                    };
                    events.push(RecoveredEvent { unit: event.unit, height: event.height, content });
                }
                Ok(None) => {
                    offset = data.len();
                    break;
                }
                Err(IoError::Ber(BerError::UnexpectedEoc)) => {
                    failed_at = Some(offset + reader.global_pos());
                    break;
                }
                Err(_) => {
                    offset = data.len();
                    break;
                }
            }
        }

        let Some(fail_pos) = failed_at else { break };
        let scan_start = if strong { round_up(fail_pos, 1024) } else { fail_pos };
        offset = match data[scan_start..].iter().position(|&b| b != 0) {
            Some(rel) => scan_start + rel,
            None => data.len(),
        };
        log::warn!("resyncing after unexpected EOC at offset {fail_pos}, resuming at {offset}");
    }

    events
}

/// Split `data` into fixed `block_size` blocks and parse each one
/// independently: a parse error in one block does not abort the rest.
pub fn read_with_block_recovery(data: &[u8], block_size: usize) -> Vec<IoResult<Vec<RecoveredEvent>>> {
    data.chunks(block_size.max(1))
        .map(|block| {
            let mut reader = VerticalReader::new(MemorySource::new(block));
            let mut events = Vec::new();
            loop {
                match reader.advance()? {
                    Some(event) => {
                        let content = if event.unit.shape == Shape::Primitive {
                            reader.content().unwrap_or(&[]).to_vec()
                        } else {
                            Vec::new()
                        };
                        events.push(RecoveredEvent { unit: event.unit, height: event.height, content });
                    }
                    None => return Ok(events),
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_zero_resyncs_past_a_run_of_padding() {
        let mut data = vec![0x02, 0x01, 0x05]; // INTEGER 5
        data.extend(std::iter::repeat(0u8).take(6)); // stray zero padding
        data.extend([0x02, 0x01, 0x07]); // INTEGER 7
        let events = read_with_skip_zero(&data, false);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].content, vec![5]);
        assert_eq!(events[1].content, vec![7]);
    }

    #[test]
    fn block_recovery_isolates_a_damaged_block() {
        let good = [0x02u8, 0x01, 0x05];
        let mut data = good.to_vec();
        data.extend([0xff, 0xff, 0xff]); // malformed block
        data.extend([0x02, 0x01, 0x07]);
        let results = read_with_block_recovery(&data, 3);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[2].is_ok());
    }
}
