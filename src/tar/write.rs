//! Sequential tar writing

use std::io::{self, Read, Write};

use log::*;

use super::buffer::*;
use super::header::*;
use super::pax;
use super::TarOptions;
use crate::encoding::NameEncoding;
use crate::entry_stream::EntryStream;
use crate::result::*;

/// Writes a tar archive one entry at a time.
///
/// Start an entry with [`start_entry()`](Self::start_entry), write exactly
/// the header's `size` bytes of payload to the writer, then start the next
/// entry or [`finish()`](Self::finish) the archive.
#[derive(Debug)]
pub struct TarWriter<W: Write> {
    stream: EntryStream<BlockWriter<W>>,
    encoding: NameEncoding,
    /// True while an entry's payload is being written
    open: bool,
}

/// Shortens `text` until it encodes to at most `max` bytes.
fn truncate_encoded(text: &str, encoding: NameEncoding, max: usize) -> String {
    let mut out = String::new();
    for c in text.chars() {
        out.push(c);
        if encoding.encode(&out).0.len() > max {
            out.pop();
            break;
        }
    }
    out
}

impl<W: Write> TarWriter<W> {
    pub fn new(writer: W) -> ArchiveResult<Self> {
        Self::with_options(writer, TarOptions::default())
    }

    pub fn with_options(writer: W, options: TarOptions) -> ArchiveResult<Self> {
        let buffer = TarBuffer::new_output(writer, options.block_factor)?;
        Ok(Self {
            stream: EntryStream::new(BlockWriter::new(buffer), 0),
            encoding: options.encoding,
            open: false,
        })
    }

    pub fn block_factor(&self) -> usize {
        self.stream.get_ref().buffer().block_factor()
    }

    /// Writes the header for a new entry, closing the previous one.
    ///
    /// Names too long for the header (even split across the ustar prefix)
    /// and link names over 100 bytes go out first as GNU long name records.
    pub fn start_entry(&mut self, header: &TarHeader) -> ArchiveResult<()> {
        self.close_entry()?;

        let mut header = header.clone();
        if !name_fits(&header.name, &header.magic, self.encoding) {
            debug!("Writing a long name record for {}", header.name);
            self.write_special(EntryType::GnuLongName, &header.name)?;
            header.name = truncate_encoded(&header.name, self.encoding, NAME_LEN);
        }
        if self.encoding.encode(&header.link_name).0.len() > NAME_LEN {
            debug!("Writing a long link record for {}", header.link_name);
            self.write_special(EntryType::GnuLongLink, &header.link_name)?;
            header.link_name = truncate_encoded(&header.link_name, self.encoding, NAME_LEN);
        }

        let block = header.to_block(self.encoding)?;
        self.stream.get_mut().write_block(&block)?;
        trace!("Started {} ({} bytes)", header.name, header.size);
        self.stream.reset(header.size);
        self.open = true;
        Ok(())
    }

    /// Writes a GNU long name or long link record: a pseudo-entry whose
    /// payload is the NUL-terminated name.
    fn write_special(&mut self, kind: EntryType, text: &str) -> ArchiveResult<()> {
        let bytes = self.encoding.encode_exact(text, "Name")?;
        let mut long = TarHeader::new(GNU_LONG_LINK_NAME, bytes.len() as u64 + 1);
        long.entry_type = kind;
        let out = self.stream.get_mut();
        out.write_block(&long.to_block(self.encoding)?)?;
        out.write_all(&bytes)?;
        out.write_all(&[0])?;
        out.pad_block()
    }

    /// Writes a PAX extended header that applies to the next entry.
    pub fn append_pax_extensions(&mut self, records: &[(&str, &str)]) -> ArchiveResult<()> {
        self.close_entry()?;
        let payload: String = records
            .iter()
            .map(|(key, value)| pax::format_record(key, value))
            .collect();
        let mut header = TarHeader::new("././@PaxHeader", payload.len() as u64);
        header.entry_type = EntryType::PaxExtended;
        let out = self.stream.get_mut();
        out.write_block(&header.to_block(self.encoding)?)?;
        out.write_all(payload.as_bytes())?;
        out.pad_block()
    }

    /// Writes a whole entry: its header, then everything `data` holds,
    /// which must be exactly `header.size` bytes.
    pub fn append<R: Read>(&mut self, header: &TarHeader, mut data: R) -> ArchiveResult<()> {
        self.start_entry(header)?;
        io::copy(&mut data, &mut self.stream)?;
        self.close_entry()
    }

    /// Pads out the current entry's last block.
    ///
    /// Closing an entry before all of its declared size was written
    /// is an error, since the archive would be unreadable past it.
    pub fn close_entry(&mut self) -> ArchiveResult<()> {
        if !self.open {
            return Ok(());
        }
        if self.stream.remaining() != 0 {
            return Err(ArchiveError::State(
                "Tar entry closed before its declared size was written",
            ));
        }
        self.stream.get_mut().pad_block()?;
        self.open = false;
        Ok(())
    }

    /// Closes the last entry, writes the two end-of-archive blocks,
    /// pads out the last record, and hands back the stream.
    pub fn finish(mut self) -> ArchiveResult<W> {
        self.close_entry()?;
        let mut out = self.stream.into_inner();
        let zeros = [0u8; BLOCK_SIZE];
        out.write_block(&zeros)?;
        out.write_block(&zeros)?;
        out.finish()
    }
}

impl<W: Write> Write for TarWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.open {
            return Err(ArchiveError::State("No tar entry to write to").into_io());
        }
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}
