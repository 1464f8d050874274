//! Little-endian primitives over byte slices and streams.
//!
//! Every multi-byte integer in a ZIP archive is little-endian.
//! Running out of bytes partway through one is a [`Truncated`] error,
//! never a silent zero.
//!
//! [`Truncated`]: ../result/enum.ArchiveError.html#variant.Truncated

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::result::*;

/// Reads a little-endian u16 from the front of the provided slice, shrinking it.
pub fn read_u16(input: &mut &[u8]) -> ArchiveResult<u16> {
    Ok(input.read_u16::<LittleEndian>()?)
}

/// Reads a little-endian u32 from the front of the provided slice, shrinking it.
pub fn read_u32(input: &mut &[u8]) -> ArchiveResult<u32> {
    Ok(input.read_u32::<LittleEndian>()?)
}

/// Reads a little-endian u64 from the front of the provided slice, shrinking it.
pub fn read_u64(input: &mut &[u8]) -> ArchiveResult<u64> {
    Ok(input.read_u64::<LittleEndian>()?)
}

/// Splits `len` bytes off the front of the provided slice.
pub fn read_bytes<'a>(input: &mut &'a [u8], len: usize) -> ArchiveResult<&'a [u8]> {
    if input.len() < len {
        return Err(ArchiveError::Truncated("field runs past the end of its record"));
    }
    let (bytes, rest) = input.split_at(len);
    *input = rest;
    Ok(bytes)
}

/// Little-endian reads from a byte stream
pub trait ReadLeExt: Read {
    fn read_le_u16(&mut self) -> ArchiveResult<u16> {
        Ok(self.read_u16::<LittleEndian>()?)
    }

    fn read_le_u32(&mut self) -> ArchiveResult<u32> {
        Ok(self.read_u32::<LittleEndian>()?)
    }

    fn read_le_u64(&mut self) -> ArchiveResult<u64> {
        Ok(self.read_u64::<LittleEndian>()?)
    }

    fn read_le_i16(&mut self) -> ArchiveResult<i16> {
        Ok(self.read_i16::<LittleEndian>()?)
    }

    fn read_le_i32(&mut self) -> ArchiveResult<i32> {
        Ok(self.read_i32::<LittleEndian>()?)
    }

    fn read_le_i64(&mut self) -> ArchiveResult<i64> {
        Ok(self.read_i64::<LittleEndian>()?)
    }
}

impl<R: Read + ?Sized> ReadLeExt for R {}

/// Little-endian writes to a byte stream
pub trait WriteLeExt: Write {
    fn write_le_u16(&mut self, v: u16) -> ArchiveResult<()> {
        Ok(self.write_u16::<LittleEndian>(v)?)
    }

    fn write_le_u32(&mut self, v: u32) -> ArchiveResult<()> {
        Ok(self.write_u32::<LittleEndian>(v)?)
    }

    fn write_le_u64(&mut self, v: u64) -> ArchiveResult<()> {
        Ok(self.write_u64::<LittleEndian>(v)?)
    }

    fn write_le_i16(&mut self, v: i16) -> ArchiveResult<()> {
        Ok(self.write_i16::<LittleEndian>(v)?)
    }

    fn write_le_i32(&mut self, v: i32) -> ArchiveResult<()> {
        Ok(self.write_i32::<LittleEndian>(v)?)
    }

    fn write_le_i64(&mut self, v: i64) -> ArchiveResult<()> {
        Ok(self.write_i64::<LittleEndian>(v)?)
    }
}

impl<W: Write + ?Sized> WriteLeExt for W {}
