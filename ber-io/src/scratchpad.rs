//! Block-oriented sliding buffer (§4.5, C6): a `[prelude..begin)` region
//! already consumed or written, and an active `[begin..end)` region.
//! Backed by a plain `Vec<u8>` whose freshly grown tail is never
//! value-initialized beyond what a backend actually fills, via
//! [`Vec::set_len`] after a raw reserve.

use std::fs::File;
use std::io::{self, Read, Write};

/// Default refill/flush granularity: a 128 KiB block, the usual convention
/// for buffered file I/O.
pub const DEFAULT_INCREMENT: usize = 128 * 1024;

/// A byte source a scratchpad reader pulls blocks from.
pub trait Source {
    /// Fill as much of `dst` as is available; returns the number of bytes
    /// written, 0 meaning EOF.
    fn fill(&mut self, dst: &mut [u8]) -> io::Result<usize>;
}

/// A byte sink a scratchpad writer pushes blocks to.
pub trait Sink {
    fn drain(&mut self, src: &[u8]) -> io::Result<usize>;
    fn flush(&mut self) -> io::Result<()>;
    /// Optional durability barrier; the default is a no-op for in-memory
    /// sinks.
    fn fsync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A `File`-backed source: reads in `increment`-sized blocks.
pub struct FileSource {
    file: File,
}

impl FileSource {
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

impl Source for FileSource {
    fn fill(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        self.file.read(dst)
    }
}

/// A `File`-backed sink.
pub struct FileSink {
    file: File,
}

impl FileSink {
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

impl Sink for FileSink {
    fn drain(&mut self, src: &[u8]) -> io::Result<usize> {
        self.file.write(src)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    fn fsync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }
}

/// An in-memory source, e.g. for content already fully loaded or for a
/// memory-mapped read-only input (§4.5 "Memory-mapped inputs are
/// read-only and may be shared by reference").
pub struct MemorySource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MemorySource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Source for MemorySource<'a> {
    fn fill(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let n = dst.len().min(self.data.len() - self.pos);
        dst[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// An in-memory growable sink.
#[derive(Default)]
pub struct MemorySink {
    pub bytes: Vec<u8>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the sink, returning its accumulated bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

impl Sink for MemorySink {
    fn drain(&mut self, src: &[u8]) -> io::Result<usize> {
        self.bytes.extend_from_slice(src);
        Ok(src.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A scratchpad reader: refills from a [`Source`] in `increment`-sized
/// blocks and exposes a position-tracked active window.
///
/// `next(want)` is the "simple reader" of §4.5: it ensures at least `want`
/// bytes are available (refilling as needed) and returns the active
/// window, or `None` if EOF is reached with fewer than `want` bytes
/// remaining. Unlike the pointer-invalidation protocol described in the
/// C-oriented original (return codes 0/1/2 for EOF/unchanged/invalidated),
/// Rust's borrow checker makes pointer invalidation statically impossible
/// to misuse: the returned slice borrows `self`, so no second call to
/// `next` can happen while a previous window is still held.
pub struct ScratchpadReader<S: Source> {
    source: S,
    buf: Vec<u8>,
    begin: usize,
    end: usize,
    global_pos: usize,
    increment: usize,
    eof: bool,
}

impl<S: Source> ScratchpadReader<S> {
    pub fn new(source: S) -> Self {
        Self::with_increment(source, DEFAULT_INCREMENT)
    }

    pub fn with_increment(source: S, increment: usize) -> Self {
        Self { source, buf: Vec::new(), begin: 0, end: 0, global_pos: 0, increment, eof: false }
    }

    /// Bytes available in the active window right now, without refilling.
    pub fn available(&self) -> usize {
        self.end - self.begin
    }

    /// The global stream offset of the first byte in the active window.
    pub fn global_pos(&self) -> usize {
        self.global_pos
    }

    /// Current active window.
    pub fn active(&self) -> &[u8] {
        &self.buf[self.begin..self.end]
    }

    /// Advance past `k` consumed bytes of the active window (reader-side
    /// `increment_head`).
    pub fn increment_head(&mut self, k: usize) {
        assert!(self.begin + k <= self.end, "increment_head past the active region");
        self.begin += k;
        self.global_pos += k;
    }

    /// Drop the already-consumed prelude, reclaiming buffer space via a
    /// single memmove.
    pub fn forget_prelude(&mut self) {
        if self.begin == 0 {
            return;
        }
        self.buf.copy_within(self.begin..self.end, 0);
        self.end -= self.begin;
        self.buf.truncate(self.end);
        self.begin = 0;
    }

    /// Ensure at least `want` bytes are available in the active window,
    /// refilling from the source in `increment`-sized blocks. Returns
    /// `true` if satisfied, `false` if EOF was reached first.
    pub fn read_more(&mut self, forget: bool, want: usize) -> io::Result<bool> {
        if forget {
            self.forget_prelude();
        }
        while self.available() < want && !self.eof {
            let grow = self.increment.max(want - self.available());
            let old_len = self.buf.len();
            self.buf.reserve(grow);
            let spare = self.buf.spare_capacity_mut();
            let spare_len = spare.len();
            // SAFETY: `fill` only ever writes into the slice it is given,
            // so the first `n` bytes of `spare` are initialized once it
            // returns; `set_len` below only claims those `n` bytes.
            let n = {
                let dst = unsafe {
                    std::slice::from_raw_parts_mut(spare.as_mut_ptr().cast::<u8>(), spare_len)
                };
                self.source.fill(dst)?
            };
            unsafe { self.buf.set_len(old_len + n) };
            self.end = self.buf.len();
            if n == 0 {
                log::debug!("scratchpad source exhausted at global_pos {}", self.global_pos);
                self.eof = true;
            }
        }
        Ok(self.available() >= want)
    }

    /// The simple-reader convenience wrapper: ensure `want` bytes are
    /// available (refilling and forgetting the prelude first) and return
    /// the active window, or `None` on EOF with insufficient bytes.
    pub fn next(&mut self, want: usize) -> io::Result<Option<&[u8]>> {
        let satisfied = self.read_more(true, want)?;
        if !satisfied {
            return Ok(None);
        }
        Ok(Some(self.active()))
    }
}

/// A scratchpad writer: buffers content and flushes to a [`Sink`] in
/// `increment`-sized blocks.
pub struct ScratchpadWriter<K: Sink> {
    sink: K,
    buf: Vec<u8>,
    increment: usize,
    global_pos: usize,
}

impl<K: Sink> ScratchpadWriter<K> {
    pub fn new(sink: K) -> Self {
        Self::with_increment(sink, DEFAULT_INCREMENT)
    }

    pub fn with_increment(sink: K, increment: usize) -> Self {
        Self { sink, buf: Vec::new(), increment, global_pos: 0 }
    }

    pub fn global_pos(&self) -> usize {
        self.global_pos
    }

    /// Buffer `bytes` for output, flushing full blocks eagerly.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(bytes);
        while self.buf.len() >= self.increment {
            self.write_some()?;
        }
        Ok(())
    }

    /// Drain one increment-sized (or smaller, for the final block) chunk
    /// to the sink.
    fn write_some(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk_len = self.buf.len().min(self.increment.max(1));
        let n = self.sink.drain(&self.buf[..chunk_len])?;
        self.buf.drain(..n);
        self.global_pos += n;
        Ok(())
    }

    /// Flush all buffered bytes to the sink and flush the sink itself.
    /// Must be called on every exit path (§5 resource scoping); dropping
    /// without calling this silently discards unflushed bytes rather than
    /// panicking, since `Drop` cannot propagate I/O errors.
    pub fn finish(mut self) -> io::Result<K> {
        while !self.buf.is_empty() {
            self.write_some()?;
        }
        self.sink.flush()?;
        Ok(self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_refills_across_blocks() {
        let data: Vec<u8> = (0u8..=255).collect();
        let mut reader = ScratchpadReader::with_increment(MemorySource::new(&data), 16);
        let window = reader.next(200).unwrap().unwrap();
        assert_eq!(window.len(), 200);
        assert_eq!(window, &data[..200]);
    }

    #[test]
    fn reader_reports_eof_with_insufficient_bytes() {
        let data = [1u8, 2, 3];
        let mut reader = ScratchpadReader::with_increment(MemorySource::new(&data), 16);
        assert!(reader.next(10).unwrap().is_none());
        assert_eq!(reader.available(), 3);
    }

    #[test]
    fn writer_round_trips_through_sink() {
        let mut writer = ScratchpadWriter::with_increment(MemorySink::default(), 8);
        writer.write(b"hello, scratchpad world").unwrap();
        let sink = writer.finish().unwrap();
        assert_eq!(sink.bytes, b"hello, scratchpad world");
    }

    #[test]
    fn forget_prelude_reclaims_space() {
        let data: Vec<u8> = (0u8..=20).collect();
        let mut reader = ScratchpadReader::with_increment(MemorySource::new(&data), 32);
        reader.read_more(false, 10).unwrap();
        reader.increment_head(5);
        reader.forget_prelude();
        assert_eq!(reader.global_pos(), 5);
        assert_eq!(reader.active()[0], 5);
    }
}
