//! Readers that checksum entry payloads as they pass through
//!
//! The validating reader started out as zip-rs's:
//! <https://github.com/mvdnes/zip-rs/commit/b3c836d9c32efa120cdd5366280f940d3c3b985c>

use std::io;
use std::io::prelude::*;

use crc32fast::Hasher;

use crate::result::ArchiveError;

/// Reader that computes the CRC32 of everything passing through it
/// without knowing the expected value up front.
///
/// Used when the checksum arrives after the data (in a data descriptor).
pub struct Crc32Tally<R> {
    inner: R,
    hasher: Hasher,
    count: u64,
}

impl<R> Crc32Tally<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            count: 0,
        }
    }

    /// The checksum of the bytes read so far
    pub fn crc32(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// How many bytes have been read so far
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for Crc32Tally<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        self.hasher.update(&buf[..count]);
        self.count += count as u64;
        Ok(count)
    }
}

/// Reader that checks the CRC32 and uncompressed size
/// from an entry's header once it reaches the EOF.
pub struct Crc32Reader<R> {
    tally: Crc32Tally<R>,
    expected_crc32: u32,
    expected_size: u64,
}

impl<R> Crc32Reader<R> {
    pub fn new(inner: R, expected_crc32: u32, expected_size: u64) -> Self {
        Self {
            tally: Crc32Tally::new(inner),
            expected_crc32,
            expected_size,
        }
    }

    fn check(&self) -> io::Result<()> {
        let count = self.tally.count();
        if count != self.expected_size {
            return Err(ArchiveError::format(format!(
                "Entry decompressed to {} bytes instead of {}",
                count, self.expected_size
            ))
            .into_io());
        }
        let crc32 = self.tally.crc32();
        if crc32 != self.expected_crc32 {
            return Err(ArchiveError::format(format!(
                "Invalid checksum: expected {:#010x}, got {:#010x}",
                self.expected_crc32, crc32
            ))
            .into_io());
        }
        Ok(())
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.tally.read(buf)?;
        if count == 0 && !buf.is_empty() {
            self.check()?;
        }
        Ok(count)
    }
}
