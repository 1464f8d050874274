//! Blocked I/O for tar archives.
//!
//! Tar was designed for tape drives, which read and write whole records.
//! An archive is a sequence of 512-byte blocks, grouped into records of
//! `block_factor` blocks each. Every physical read or write moves a whole
//! record, and the last record is padded out with zeros.
//!
//! From the original POSIX description:
//!
//! > A tar archive consists of a series of 512-byte blocks. Each file in the
//! > archive is represented by a header block which describes the file,
//! > followed by zero or more blocks which give the contents of the file.
//! > At the end of the archive file there are two 512-byte blocks filled
//! > with binary zeros as an end-of-file marker. A reasonable system should
//! > write such end-of-file marker at the end of an archive, but must not
//! > assume that such a block exists when reading an archive.

use std::io::{self, Read, Write};

use log::*;

use crate::result::*;

/// The size of a tar block
pub const BLOCK_SIZE: usize = 512;

/// Blocks per record, unless told otherwise (a 10 KiB record)
pub const DEFAULT_BLOCK_FACTOR: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Input,
    Output,
}

/// A block-at-a-time view of a stream, moving whole records underneath.
#[derive(Debug)]
pub struct TarBuffer<S> {
    stream: S,
    mode: Mode,
    record: Vec<u8>,
    block_factor: usize,
    /// Index of the next block in `record`
    current_block: usize,
    /// Records read or written so far
    records: u64,
    /// How many bytes of `record` actually came from the stream
    filled: usize,
}

/// True if the block marks the end of the archive (all zeros).
pub fn is_end_of_archive_block(block: &[u8]) -> bool {
    block.iter().all(|&b| b == 0)
}

fn check_block_factor(block_factor: usize) -> ArchiveResult<()> {
    if block_factor == 0 {
        return Err(ArchiveError::State("The block factor must be at least 1"));
    }
    Ok(())
}

impl<S> TarBuffer<S> {
    pub fn block_factor(&self) -> usize {
        self.block_factor
    }

    pub fn record_size(&self) -> usize {
        self.block_factor * BLOCK_SIZE
    }

    /// The block index within the current record
    pub fn current_block(&self) -> usize {
        self.current_block
    }

    /// The zero-based index of the current record
    pub fn current_record(&self) -> u64 {
        self.records.saturating_sub(1)
    }

    fn expect_mode(&self, mode: Mode) -> ArchiveResult<()> {
        match (self.mode, mode) {
            (Mode::Input, Mode::Output) => Err(ArchiveError::State(
                "Writing to a tar buffer opened for reading",
            )),
            (Mode::Output, Mode::Input) => Err(ArchiveError::State(
                "Reading from a tar buffer opened for writing",
            )),
            _ => Ok(()),
        }
    }
}

impl<R: Read> TarBuffer<R> {
    pub fn new_input(stream: R, block_factor: usize) -> ArchiveResult<Self> {
        check_block_factor(block_factor)?;
        Ok(Self {
            stream,
            mode: Mode::Input,
            record: vec![0; block_factor * BLOCK_SIZE],
            block_factor,
            // Nothing is buffered yet, so the first read pulls in a record.
            current_block: block_factor,
            records: 0,
            filled: 0,
        })
    }

    /// Reads the next record, in as many reads as it takes.
    ///
    /// A short final record is zero-filled. Returns false if the stream
    /// had nothing left at all.
    fn read_record(&mut self) -> ArchiveResult<bool> {
        let mut filled = 0;
        while filled < self.record.len() {
            match self.stream.read(&mut self.record[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled == 0 {
            return Ok(false);
        }
        if filled < self.record.len() {
            warn!(
                "Record {} is {} bytes short; zero-filling it",
                self.records,
                self.record.len() - filled
            );
            self.record[filled..].fill(0);
        }
        trace!("Read record {} ({} bytes)", self.records, filled);
        self.filled = filled;
        self.current_block = 0;
        self.records += 1;
        Ok(true)
    }

    /// Moves to the next block, reading a new record if this one's used up.
    /// Returns the block's index in `record` and how many of its bytes
    /// came from the stream (zero at the end of the stream).
    fn advance(&mut self) -> ArchiveResult<Option<(usize, usize)>> {
        self.expect_mode(Mode::Input)?;
        if self.current_block >= self.block_factor && !self.read_record()? {
            return Ok(None);
        }
        let index = self.current_block;
        self.current_block += 1;
        let real = self
            .filled
            .saturating_sub(index * BLOCK_SIZE)
            .min(BLOCK_SIZE);
        Ok(Some((index, real)))
    }

    /// Reads the next block into `block`.
    ///
    /// Returns how many of its bytes came from the stream:
    /// 512 normally, fewer in a zero-filled short record,
    /// and 0 (with `block` zeroed) once the stream is exhausted.
    pub fn read_block(&mut self, block: &mut [u8; BLOCK_SIZE]) -> ArchiveResult<usize> {
        match self.advance()? {
            Some((index, real)) => {
                let start = index * BLOCK_SIZE;
                block.copy_from_slice(&self.record[start..start + BLOCK_SIZE]);
                Ok(real)
            }
            None => {
                block.fill(0);
                Ok(0)
            }
        }
    }

    /// Skips the next block. Returns the same count as `read_block()`.
    pub fn skip_block(&mut self) -> ArchiveResult<usize> {
        Ok(self.advance()?.map_or(0, |(_, real)| real))
    }

    pub fn into_inner(self) -> R {
        self.stream
    }
}

impl<W: Write> TarBuffer<W> {
    pub fn new_output(stream: W, block_factor: usize) -> ArchiveResult<Self> {
        check_block_factor(block_factor)?;
        Ok(Self {
            stream,
            mode: Mode::Output,
            record: vec![0; block_factor * BLOCK_SIZE],
            block_factor,
            current_block: 0,
            records: 0,
            filled: 0,
        })
    }

    fn write_record(&mut self) -> ArchiveResult<()> {
        self.stream.write_all(&self.record)?;
        trace!("Wrote record {}", self.records);
        self.record.fill(0);
        self.current_block = 0;
        self.records += 1;
        Ok(())
    }

    /// Adds a block to the record, writing the record out first if it's full.
    pub fn write_block(&mut self, block: &[u8; BLOCK_SIZE]) -> ArchiveResult<()> {
        self.expect_mode(Mode::Output)?;
        if self.current_block >= self.block_factor {
            self.write_record()?;
        }
        let start = self.current_block * BLOCK_SIZE;
        self.record[start..start + BLOCK_SIZE].copy_from_slice(block);
        self.current_block += 1;
        Ok(())
    }

    /// Writes out the last record, zero-padded, and hands back the stream.
    pub fn finish(mut self) -> ArchiveResult<W> {
        self.expect_mode(Mode::Output)?;
        if self.current_block > 0 {
            // Blocks past current_block are still zero from the last write_record().
            self.write_record()?;
        }
        self.stream.flush()?;
        Ok(self.stream)
    }
}

/// Byte-level reads over a block-level buffer.
///
/// Holds on to the rest of a partly-read block so entry payloads
/// can be read a byte at a time, and drops it when the next header comes.
#[derive(Debug)]
pub struct BlockReader<R> {
    buffer: TarBuffer<R>,
    block: [u8; BLOCK_SIZE],
    /// The next unread byte in `block`
    pos: usize,
    /// How many bytes of `block` came from the stream
    len: usize,
}

impl<R: Read> BlockReader<R> {
    pub fn new(buffer: TarBuffer<R>) -> Self {
        Self {
            buffer,
            block: [0; BLOCK_SIZE],
            pos: 0,
            len: 0,
        }
    }

    /// Discards what's left of the current block (padding, at an entry's end)
    /// and reads the next whole one.
    /// Returns the count from [`TarBuffer::read_block()`](struct.TarBuffer.html#method.read_block).
    pub fn next_block(&mut self, block: &mut [u8; BLOCK_SIZE]) -> ArchiveResult<usize> {
        self.pos = 0;
        self.len = 0;
        self.buffer.read_block(block)
    }

    pub fn buffer(&self) -> &TarBuffer<R> {
        &self.buffer
    }

    pub fn into_inner(self) -> TarBuffer<R> {
        self.buffer
    }
}

impl<R: Read> Read for BlockReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos == self.len {
            let real = self
                .buffer
                .read_block(&mut self.block)
                .map_err(ArchiveError::into_io)?;
            self.pos = 0;
            self.len = real;
            if real == 0 {
                return Ok(0);
            }
        }
        let count = buf.len().min(self.len - self.pos);
        buf[..count].copy_from_slice(&self.block[self.pos..self.pos + count]);
        self.pos += count;
        Ok(count)
    }
}

/// Byte-level writes over a block-level buffer.
///
/// Collects bytes into a block, and pads the last one of an entry with zeros.
#[derive(Debug)]
pub struct BlockWriter<W> {
    buffer: TarBuffer<W>,
    block: [u8; BLOCK_SIZE],
    len: usize,
}

impl<W: Write> BlockWriter<W> {
    pub fn new(buffer: TarBuffer<W>) -> Self {
        Self {
            buffer,
            block: [0; BLOCK_SIZE],
            len: 0,
        }
    }

    /// Zero-pads and writes out a partly-filled block, if there is one.
    pub fn pad_block(&mut self) -> ArchiveResult<()> {
        if self.len > 0 {
            self.block[self.len..].fill(0);
            self.buffer.write_block(&self.block)?;
            self.len = 0;
        }
        Ok(())
    }

    /// Writes a whole block, like a header. Must be on a block boundary.
    pub fn write_block(&mut self, block: &[u8; BLOCK_SIZE]) -> ArchiveResult<()> {
        if self.len != 0 {
            return Err(ArchiveError::State(
                "Can't write a whole block in the middle of another",
            ));
        }
        self.buffer.write_block(block)
    }

    pub fn buffer(&self) -> &TarBuffer<W> {
        &self.buffer
    }

    pub fn finish(mut self) -> ArchiveResult<W> {
        self.pad_block()?;
        self.buffer.finish()
    }
}

impl<W: Write> Write for BlockWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let count = buf.len().min(BLOCK_SIZE - self.len);
        self.block[self.len..self.len + count].copy_from_slice(&buf[..count]);
        self.len += count;
        if self.len == BLOCK_SIZE {
            self.buffer
                .write_block(&self.block)
                .map_err(ArchiveError::into_io)?;
            self.len = 0;
        }
        Ok(count)
    }

    /// Records only go out whole, so there's nothing to do until `finish()`.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
