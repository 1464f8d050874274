//! A stream bounded to a single archive entry's payload.
//!
//! Both tar and ZIP frame each entry's payload with a declared size.
//! [`EntryStream`] tracks how much of that size has passed through
//! so reads stop at the entry's end and writes can't overrun it.

use std::io::{self, Read, Write};

use crate::result::*;

/// Bounds reads and writes on `S` to the declared size of an entry.
#[derive(Debug)]
pub struct EntryStream<S> {
    inner: S,
    offset: u64,
    size: u64,
}

impl<S> EntryStream<S> {
    pub fn new(inner: S, size: u64) -> Self {
        Self {
            inner,
            offset: 0,
            size,
        }
    }

    /// Starts bounding a new entry on the same stream.
    pub fn reset(&mut self, size: u64) {
        self.offset = 0;
        self.size = size;
    }

    /// The entry's declared size
    pub fn size(&self) -> u64 {
        self.size
    }

    /// How many bytes of the entry have been transferred
    pub fn position(&self) -> u64 {
        self.offset
    }

    /// How many bytes of the entry are left
    pub fn remaining(&self) -> u64 {
        self.size - self.offset
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn clamp(&self, len: usize) -> usize {
        // If remaining() doesn't fit in a usize, len is certainly smaller.
        usize::try_from(self.remaining()).map_or(len, |left| len.min(left))
    }
}

impl<R: Read> EntryStream<R> {
    /// Reads and discards whatever is left of the entry.
    ///
    /// This goes through `read()` instead of seeking,
    /// since the underlying stream might be a pipe or a decompressor.
    pub fn skip_remaining(&mut self) -> ArchiveResult<u64> {
        Ok(io::copy(self, &mut io::sink())?)
    }
}

impl<R: Read> Read for EntryStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.clamp(buf.len());
        if len == 0 {
            return Ok(0);
        }
        let count = self.inner.read(&mut buf[..len])?;
        if count == 0 {
            return Err(
                ArchiveError::Truncated("stream ended before the entry's declared size").into_io(),
            );
        }
        self.offset += count as u64;
        Ok(count)
    }
}

impl<W: Write> Write for EntryStream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let len = self.clamp(buf.len());
        if len == 0 {
            return Err(ArchiveError::format(format!(
                "Write exceeds the entry's declared size of {} bytes",
                self.size
            ))
            .into_io());
        }
        let count = self.inner.write(&buf[..len])?;
        self.offset += count as u64;
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reads_stop_at_entry_end() {
        let data: &[u8] = b"entry-payloadNEXT-HEADER";
        let mut stream = EntryStream::new(data, 13);
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"entry-payload");
        assert_eq!(stream.remaining(), 0);
        // The next entry's bytes are untouched.
        assert_eq!(stream.into_inner(), b"NEXT-HEADER");
    }

    #[test]
    fn skip_goes_through_reads() {
        let data: &[u8] = b"0123456789";
        let mut stream = EntryStream::new(data, 6);
        let mut two = [0; 2];
        stream.read_exact(&mut two).unwrap();
        assert_eq!(stream.skip_remaining().unwrap(), 4);
        assert_eq!(stream.position(), 6);
        assert_eq!(*stream.get_ref(), b"6789");
    }

    #[test]
    fn early_end_is_truncation() {
        let data: &[u8] = b"short";
        let mut stream = EntryStream::new(data, 10);
        let mut out = Vec::new();
        let err = stream.read_to_end(&mut out).unwrap_err();
        assert!(matches!(ArchiveError::from_io(err), ArchiveError::Truncated(_)));
    }

    #[test]
    fn writes_cannot_overrun() {
        let mut stream = EntryStream::new(Vec::new(), 4);
        stream.write_all(b"abcd").unwrap();
        let err = stream.write(b"e").unwrap_err();
        assert!(matches!(ArchiveError::from_io(err), ArchiveError::Format(_)));
        assert_eq!(stream.into_inner(), b"abcd");
    }
}
