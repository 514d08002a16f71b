//! Memory-mapped input region with wraparound-aware addressing.
//!
//! The firmware buffer is a fixed header area followed by a circular
//! payload area spanning `[offset, size)`. Positions are absolute byte
//! indexes into the mapping, always normalized into that interval; the
//! header area is never part of the ring.

use std::fs::OpenOptions;
use std::path::Path;

use bytes::Buf;
use memmap2::{MmapMut, MmapOptions};
use tracing::debug;

use crate::CaptureError;

/// Byte offsets of the writer-maintained cursors in the fixed header area.
/// All three are little-endian u32, updated by the firmware only.
const CURSOR_DATA_LEN: usize = 4;
const CURSOR_WRITE_END: usize = 12;
const CURSOR_WRITE_START: usize = 16;

/// One coherent read of the writer's cursors. The firmware offers no lock;
/// consistency is inferred by cross-checking `end` against `start + len`.
#[derive(Debug, Clone, Copy)]
pub struct WriterCursors {
    /// Write-start offset relative to the payload area
    pub start: u32,
    /// Bytes of valid data ahead of the write start
    pub len: u32,
    /// Redundant end-of-data offset relative to the payload area
    pub end: u32,
}

pub struct InputRegion {
    map: MmapMut,
    offset: usize,
    size: usize,
}

impl InputRegion {
    /// Map `size` bytes of the firmware frame buffer read/write. The
    /// region is only ever read from this side; the writer keeps
    /// appending while we hold it.
    pub fn open(path: &Path, offset: usize, size: usize) -> Result<Self, CaptureError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| CaptureError::Open { path: path.into(), source })?;

        if size <= offset {
            return Err(CaptureError::RegionTooSmall(path.into()));
        }

        let map = unsafe { MmapOptions::new().len(size).map_mut(&file) }
            .map_err(|source| CaptureError::Map { path: path.into(), source })?;
        debug!(path = %path.display(), size = map.len(), offset, "mapped frame buffer");

        Ok(Self::from_map(map, offset))
    }

    fn from_map(map: MmapMut, offset: usize) -> Self {
        let size = map.len();
        Self { map, offset, size }
    }

    /// Anonymous region for tests standing in for the firmware buffer.
    #[cfg(test)]
    pub(crate) fn anon(size: usize, offset: usize) -> Self {
        let map = MmapMut::map_anon(size).expect("anonymous map");
        Self::from_map(map, offset)
    }

    #[cfg(test)]
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Usable bytes in the circular payload area.
    pub fn span(&self) -> usize {
        self.size - self.offset
    }

    fn read_u32(&self, at: usize) -> u32 {
        (&self.map[at..at + 4]).get_u32_le()
    }

    /// Snapshot the writer's cursors. The writer may be mid-update; the
    /// caller decides whether the snapshot is coherent.
    pub fn cursors(&self) -> WriterCursors {
        WriterCursors {
            start: self.read_u32(CURSOR_WRITE_START),
            len: self.read_u32(CURSOR_DATA_LEN),
            end: self.read_u32(CURSOR_WRITE_END),
        }
    }

    /// Translate a payload-relative offset into a ring position.
    pub fn position(&self, rel: u32) -> usize {
        self.offset + rel as usize % self.span()
    }

    /// Move a ring position by a signed delta, wrapping at either boundary.
    pub fn advance(&self, pos: usize, delta: isize) -> usize {
        debug_assert!(pos >= self.offset && pos < self.size);
        let rel = (pos - self.offset) as isize + delta;
        self.offset + rel.rem_euclid(self.span() as isize) as usize
    }

    /// Copy `dest.len()` bytes starting at `pos` into a linear buffer,
    /// stitching the two segments of a wrapped read.
    pub fn copy_to(&self, pos: usize, dest: &mut [u8]) {
        debug_assert!(pos >= self.offset && pos < self.size);
        debug_assert!(dest.len() <= self.span());
        let first = dest.len().min(self.size - pos);
        dest[..first].copy_from_slice(&self.map[pos..pos + first]);
        if first < dest.len() {
            let rest = dest.len() - first;
            dest[first..].copy_from_slice(&self.map[self.offset..self.offset + rest]);
        }
    }

    /// Compare the ring contents at `pos` against a linear needle.
    pub fn matches(&self, pos: usize, needle: &[u8]) -> bool {
        debug_assert!(pos >= self.offset && pos < self.size);
        debug_assert!(needle.len() <= self.span());
        let first = needle.len().min(self.size - pos);
        if self.map[pos..pos + first] != needle[..first] {
            return false;
        }
        let rest = needle.len() - first;
        self.map[self.offset..self.offset + rest] == needle[first..]
    }

    /// Search for `needle` inside the `span` bytes starting at `pos`,
    /// wrap included. Returns the ring position of the first match.
    pub fn find(&self, pos: usize, span: usize, needle: &[u8]) -> Option<usize> {
        debug_assert!(span <= self.span());
        if needle.is_empty() {
            return Some(pos);
        }
        if needle.len() > span {
            return None;
        }
        for i in 0..=(span - needle.len()) {
            let p = self.advance(pos, i as isize);
            if self.matches(p, needle) {
                return Some(p);
            }
        }
        None
    }
}
