//! Memory-mapped source/sink variants of the scratchpad backend (§4.5,
//! §5): read-only inputs may be mapped and shared by reference; a
//! writable output is mapped and owned by a single writer, truncated to
//! the actual written length on close if the file was pre-allocated.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use memmap2::{Mmap, MmapMut};

use crate::scratchpad::{Sink, Source};

/// A read-only memory-mapped input. The whole file is available from
/// offset zero, so `fill` is a single non-blocking copy followed by EOF.
pub struct MmapSource {
    map: Mmap,
    pos: usize,
}

impl MmapSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only for the lifetime of this
        // value; concurrent external modification of the file is a
        // documented hazard of `Mmap::map`, accepted here the same way
        // the CLI's other file-backed sources accept it.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { map, pos: 0 })
    }
}

impl Source for MmapSource {
    fn fill(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.map[self.pos..];
        let n = dst.len().min(remaining.len());
        dst[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// A writable memory-mapped output, pre-allocated to `capacity` bytes and
/// truncated to the number of bytes actually written when
/// [`MmapSink::finish`] is called — the pre-allocated-file case in §5's
/// resource scoping rule.
pub struct MmapSink {
    file: File,
    map: MmapMut,
    written: usize,
}

impl MmapSink {
    pub fn create(path: impl AsRef<Path>, capacity: u64) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)?;
        file.set_len(capacity)?;
        // SAFETY: `file` is exclusively owned by this sink for the
        // mapping's lifetime.
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { file, map, written: 0 })
    }

    /// Flush and truncate the backing file to the number of bytes
    /// actually written, releasing the mapping.
    pub fn finish(self) -> io::Result<()> {
        self.map.flush()?;
        drop(self.map);
        self.file.set_len(self.written as u64)?;
        Ok(())
    }
}

impl Sink for MmapSink {
    fn drain(&mut self, src: &[u8]) -> io::Result<usize> {
        let remaining = self.map.len() - self.written;
        let n = src.len().min(remaining);
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "mmap sink capacity exhausted"));
        }
        self.map[self.written..self.written + n].copy_from_slice(&src[..n]);
        self.written += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.map.flush_async()
    }

    fn fsync(&mut self) -> io::Result<()> {
        self.map.flush()
    }
}
