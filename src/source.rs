use crate::error::{DecodeError, Result};
use std::io::{self, Read, Seek, SeekFrom};

/// Anything the decoders can pull bytes from.
pub trait ByteSource: Read + Seek {}

impl<T: Read + Seek> ByteSource for T {}

/// Position-tracking cursor over a [`ByteSource`].
///
/// Every primitive read, skip and rewind goes through here, so `position()`
/// is always the absolute offset of the next unread byte.
pub struct Source<'a> {
    inner: &'a mut dyn ByteSource,
    pos: u64,
    len: Option<u64>,
    scope_end: Option<u64>,
}

impl<'a> Source<'a> {
    pub fn new(inner: &'a mut dyn ByteSource) -> Result<Self> {
        let pos = inner.stream_position()?;
        Ok(Source { inner, pos, len: None, scope_end: None })
    }

    /// Sets the total stream length, when the caller knows it.
    pub fn with_len(mut self, len: Option<u64>) -> Self {
        self.len = len;
        self
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn total_len(&self) -> Option<u64> {
        self.len
    }

    pub fn remaining(&self) -> Option<u64> {
        self.len.map(|l| l.saturating_sub(self.pos))
    }

    /// Sets the end offset of the innermost known-size scope, returning the
    /// previous one so the caller can restore it.
    pub fn set_scope_end(&mut self, end: Option<u64>) -> Option<u64> {
        std::mem::replace(&mut self.scope_end, end)
    }

    /// Bytes left in the innermost known-size scope, or in the stream
    /// outside any scope.
    pub fn remaining_in_scope(&self) -> Option<u64> {
        let end = match (self.scope_end, self.len) {
            (Some(s), Some(l)) => Some(s.min(l)),
            (s, l) => s.or(l),
        };
        end.map(|e| e.saturating_sub(self.pos))
    }

    /// Runs a byteorder-style read and tags failures with the offset it started at.
    pub(crate) fn with_offset<T>(&mut self, f: impl FnOnce(&mut Self) -> io::Result<T>) -> Result<T> {
        let start = self.pos;
        f(self).map_err(|e| DecodeError::from_io(e, start))
    }

    pub fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        self.with_offset(|s| s.read_exact(buf))
    }

    /// Reads one byte, or `None` at end of stream.
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut b = [0u8; 1];
        loop {
            match self.read(&mut b) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(b[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.pos = self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    /// Moves forward without reading. Seeking past the end is allowed; the
    /// next read reports end of stream.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let target = self
            .pos
            .checked_add(n)
            .ok_or(DecodeError::MalformedLength { offset: self.pos })?;
        self.seek_to(target)
    }

    pub fn rewind(&mut self, n: u64) -> Result<()> {
        let target = self
            .pos
            .checked_sub(n)
            .ok_or(DecodeError::MalformedLength { offset: self.pos })?;
        self.seek_to(target)
    }
}

impl Read for Source<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}
