//! Response body assembly.
//!
//! A [`ResponseBody`] is a queue of chunks: in-memory bytes or byte ranges of an open
//! file. Large listings are written to an anonymous spill file in the configured temp
//! directory instead of memory, and include documents can be referenced by file.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Work buffer size used when a listing spills to disk.
pub const SPILL_BUFFER_SIZE: usize = 8192;

/// Free space below which a spilling row buffer is flushed.
pub const SPILL_LOW_WATER: usize = 256;

/// One piece of a response body.
#[derive(Debug, Clone)]
pub enum BodyChunk {
    Memory(Vec<u8>),
    File { file: Arc<File>, offset: u64, len: u64 },
}

impl BodyChunk {
    pub fn len(&self) -> u64 {
        match self {
            Self::Memory(bytes) => bytes.len() as u64,
            Self::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the chunk into memory.
    pub fn read_to_vec(&self) -> io::Result<Vec<u8>> {
        match self {
            Self::Memory(bytes) => Ok(bytes.clone()),
            Self::File { file, offset, len } => {
                let mut out = Vec::with_capacity(*len as usize);
                copy_file_range(file, *offset, *len, &mut out)?;
                Ok(out)
            }
        }
    }
}

struct SpillFile {
    file: Arc<File>,
    len: u64,
}

/// Ordered body chunks with lazy spill storage.
pub struct ResponseBody {
    chunks: VecDeque<BodyChunk>,
    spill: Option<SpillFile>,
    spill_dir: PathBuf,
}

impl ResponseBody {
    pub fn new(spill_dir: impl Into<PathBuf>) -> Self {
        Self {
            chunks: VecDeque::new(),
            spill: None,
            spill_dir: spill_dir.into(),
        }
    }

    pub fn spill_dir(&self) -> &Path {
        &self.spill_dir
    }

    /// Appends bytes, extending the trailing memory chunk when there is one.
    pub fn append_mem(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if let Some(BodyChunk::Memory(tail)) = self.chunks.back_mut() {
            tail.extend_from_slice(bytes);
        } else {
            self.chunks.push_back(BodyChunk::Memory(bytes.to_vec()));
        }
    }

    /// Appends an owned buffer as its own chunk.
    pub fn append_vec(&mut self, bytes: Vec<u8>) {
        if !bytes.is_empty() {
            self.chunks.push_back(BodyChunk::Memory(bytes));
        }
    }

    /// Appends a chunk taken from another body.
    pub fn push_chunk(&mut self, chunk: BodyChunk) {
        match chunk {
            BodyChunk::Memory(bytes) => self.append_mem(&bytes),
            BodyChunk::File { file, offset, len } => self.append_file(file, offset, len),
        }
    }

    /// Appends a byte range of an open file.
    pub fn append_file(&mut self, file: Arc<File>, offset: u64, len: u64) {
        if len > 0 {
            self.chunks.push_back(BodyChunk::File { file, offset, len });
        }
    }

    /// Writes bytes to the spill file and appends the written range.
    ///
    /// If the spill file cannot be created or written, the bytes are kept in memory.
    pub fn append_to_spill(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if let Err(err) = self.try_spill(bytes) {
            log::warn!(
                "Cannot spill {} bytes to {}, keeping them in memory: {}",
                bytes.len(),
                self.spill_dir.display(),
                err
            );
            self.append_mem(bytes);
        }
    }

    fn try_spill(&mut self, bytes: &[u8]) -> io::Result<()> {
        let spill = match &mut self.spill {
            Some(spill) => spill,
            None => self.spill.insert(SpillFile {
                file: Arc::new(tempfile::tempfile_in(&self.spill_dir)?),
                len: 0,
            }),
        };
        let offset = spill.len;
        spill.file.write_all_at(bytes, offset)?;
        spill.len += bytes.len() as u64;
        let len = bytes.len() as u64;

        // Consecutive spills land back to back in the same file
        if let Some(BodyChunk::File {
            file,
            offset: tail_offset,
            len: tail_len,
        }) = self.chunks.back_mut()
            && Arc::ptr_eq(file, &spill.file)
            && *tail_offset + *tail_len == offset
        {
            *tail_len += len;
            return Ok(());
        }
        self.chunks.push_back(BodyChunk::File {
            file: Arc::clone(&spill.file),
            offset,
            len,
        });
        Ok(())
    }

    /// Total body length in bytes.
    pub fn len(&self) -> u64 {
        self.chunks.iter().map(BodyChunk::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(BodyChunk::is_empty)
    }

    pub fn chunks(&self) -> impl Iterator<Item = &BodyChunk> {
        self.chunks.iter()
    }

    /// Removes and returns all queued chunks.
    pub fn drain(&mut self) -> Vec<BodyChunk> {
        self.chunks.drain(..).collect()
    }

    /// Copies the whole body to `out`. Returns the number of bytes written.
    pub fn write_to(&self, out: &mut dyn Write) -> io::Result<u64> {
        let mut written = 0;
        for chunk in &self.chunks {
            match chunk {
                BodyChunk::Memory(bytes) => out.write_all(bytes)?,
                BodyChunk::File { file, offset, len } => copy_file_range(file, *offset, *len, out)?,
            }
            written += chunk.len();
        }
        Ok(written)
    }

    /// Reads the whole body into memory.
    pub fn to_vec(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.len() as usize);
        self.write_to(&mut out)?;
        Ok(out)
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBody")
            .field("chunks", &self.chunks.len())
            .field("len", &self.len())
            .field("spilled", &self.spill.as_ref().map_or(0, |s| s.len))
            .finish()
    }
}

fn copy_file_range(file: &File, offset: u64, len: u64, out: &mut dyn Write) -> io::Result<()> {
    let mut buf = vec![0u8; SPILL_BUFFER_SIZE.min(len as usize).max(1)];
    let mut pos = offset;
    let end = offset + len;
    while pos < end {
        let want = buf.len().min((end - pos) as usize);
        let n = file.read_at(&mut buf[..want], pos)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file shrank while being sent",
            ));
        }
        out.write_all(&buf[..n])?;
        pos += n as u64;
    }
    Ok(())
}

// ============================================================================
// Row sinks
// ============================================================================

/// Output target for rendered rows.
pub trait BoundedSink {
    fn write(&mut self, bytes: &[u8]);

    /// Bytes that still fit before the sink wants a flush.
    fn remaining_capacity(&self) -> usize;

    /// Moves buffered bytes to their destination.
    fn flush(&mut self);
}

/// Row sink over a [`ResponseBody`].
///
/// In memory mode rows are appended directly to the body. In spill mode rows collect
/// in a fixed work buffer that is written to the spill file whenever it runs low.
pub struct RowBuffer<'a> {
    body: &'a mut ResponseBody,
    work: Option<Vec<u8>>,
}

impl<'a> RowBuffer<'a> {
    pub fn in_memory(body: &'a mut ResponseBody) -> Self {
        Self { body, work: None }
    }

    pub fn spilling(body: &'a mut ResponseBody) -> Self {
        Self {
            body,
            work: Some(Vec::with_capacity(SPILL_BUFFER_SIZE)),
        }
    }

    /// Writes a row, flushing first when the work buffer is low on space.
    pub fn write_row(&mut self, row: &[u8]) {
        if self.remaining_capacity() < SPILL_LOW_WATER.max(row.len()) {
            self.flush();
        }
        self.write(row);
    }
}

impl BoundedSink for RowBuffer<'_> {
    fn write(&mut self, bytes: &[u8]) {
        match &mut self.work {
            Some(work) => work.extend_from_slice(bytes),
            None => self.body.append_mem(bytes),
        }
    }

    fn remaining_capacity(&self) -> usize {
        match &self.work {
            Some(work) => SPILL_BUFFER_SIZE.saturating_sub(work.len()),
            None => usize::MAX,
        }
    }

    fn flush(&mut self) {
        if let Some(work) = &mut self.work
            && !work.is_empty()
        {
            self.body.append_to_spill(work);
            work.clear();
        }
    }
}

impl Drop for RowBuffer<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_appends_coalesce() {
        let dir = tempfile::tempdir().unwrap();
        let mut body = ResponseBody::new(dir.path());
        body.append_mem(b"abc");
        body.append_mem(b"def");
        assert_eq!(body.chunks().count(), 1);
        assert_eq!(body.to_vec().unwrap(), b"abcdef");
    }

    #[test]
    fn test_spill_ranges_coalesce_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut body = ResponseBody::new(dir.path());
        body.append_mem(b"<head>");
        body.append_to_spill(b"row1");
        body.append_to_spill(b"row2");
        body.append_mem(b"</tail>");
        body.append_to_spill(b"row3");

        let chunks: Vec<_> = body.chunks().collect();
        assert_eq!(chunks.len(), 4);
        assert!(matches!(chunks[1], BodyChunk::File { offset: 0, len: 8, .. }));
        assert!(matches!(chunks[3], BodyChunk::File { offset: 8, len: 4, .. }));
        assert_eq!(body.to_vec().unwrap(), b"<head>row1row2</tail>row3");
        assert_eq!(body.len(), 25);
    }

    #[test]
    fn test_spill_failure_falls_back_to_memory() {
        let mut body = ResponseBody::new("/nonexistent/spill/dir");
        body.append_to_spill(b"kept");
        assert!(matches!(body.chunks().next(), Some(BodyChunk::Memory(_))));
        assert_eq!(body.to_vec().unwrap(), b"kept");
    }

    #[test]
    fn test_spilling_row_buffer_flushes_when_low() {
        let dir = tempfile::tempdir().unwrap();
        let mut body = ResponseBody::new(dir.path());
        let row = vec![b'x'; 1000];
        {
            let mut rows = RowBuffer::spilling(&mut body);
            for _ in 0..20 {
                rows.write_row(&row);
                assert!(rows.remaining_capacity() <= SPILL_BUFFER_SIZE);
            }
        }
        assert_eq!(body.len(), 20_000);
        assert!(body.chunks().all(|c| matches!(c, BodyChunk::File { .. })));
    }

    #[test]
    fn test_in_memory_row_buffer_has_no_bound() {
        let dir = tempfile::tempdir().unwrap();
        let mut body = ResponseBody::new(dir.path());
        {
            let mut rows = RowBuffer::in_memory(&mut body);
            assert_eq!(rows.remaining_capacity(), usize::MAX);
            rows.write_row(b"a");
            rows.write_row(b"b");
        }
        assert_eq!(body.to_vec().unwrap(), b"ab");
    }
}
