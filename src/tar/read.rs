//! Sequential tar reading

use std::collections::BTreeMap;
use std::io::{self, Read};

use log::*;

use super::buffer::*;
use super::header::*;
use super::pax::{self, PaxParser};
use super::TarOptions;
use crate::encoding::NameEncoding;
use crate::entry_stream::EntryStream;
use crate::report::ArchiveReport;
use crate::result::*;

/// The largest long name or extended header payload we'll buffer.
/// Real ones are a few hundred bytes at most.
pub const MAX_SPECIAL_SIZE: u64 = 1024 * 1024;

/// Walks a tar archive one entry at a time.
///
/// After [`next_entry()`](Self::next_entry) returns an entry, the reader
/// itself reads that entry's payload. Whatever isn't read is skipped
/// when moving on to the next entry.
///
/// GNU long name records and PAX extended headers are folded into the entry
/// they describe; global headers, volume headers, and entries of unknown
/// type are skipped.
#[derive(Debug)]
pub struct TarReader<R> {
    stream: EntryStream<BlockReader<R>>,
    encoding: NameEncoding,
    current: Option<TarHeader>,
    finished: bool,
}

impl<R: Read> TarReader<R> {
    pub fn new(reader: R) -> ArchiveResult<Self> {
        Self::with_options(reader, TarOptions::default())
    }

    pub fn with_options(reader: R, options: TarOptions) -> ArchiveResult<Self> {
        let buffer = TarBuffer::new_input(reader, options.block_factor)?;
        Ok(Self {
            stream: EntryStream::new(BlockReader::new(buffer), 0),
            encoding: options.encoding,
            current: None,
            finished: false,
        })
    }

    /// The entry whose payload is being read, if any
    pub fn current(&self) -> Option<&TarHeader> {
        self.current.as_ref()
    }

    pub fn block_factor(&self) -> usize {
        self.stream.get_ref().buffer().block_factor()
    }

    /// Skips whatever is left of the current entry and reads the next one's header.
    ///
    /// Returns `None` at the end of the archive: an end-of-archive block,
    /// or the stream ending cleanly between entries.
    pub fn next_entry(&mut self) -> ArchiveResult<Option<TarHeader>> {
        if self.finished {
            return Ok(None);
        }
        if self.current.take().is_some() {
            self.stream.skip_remaining()?;
        }

        let mut long_name = None;
        let mut long_link = None;
        let mut extensions = BTreeMap::new();
        loop {
            let block = match self.read_header_block()? {
                Some(b) => b,
                None => {
                    if long_name.is_some() || long_link.is_some() || !extensions.is_empty() {
                        warn!("Archive ended after a long name or extended header");
                    }
                    self.finished = true;
                    return Ok(None);
                }
            };
            let mut header = TarHeader::parse(&block, self.encoding)?;

            match header.entry_type {
                EntryType::GnuLongName => {
                    long_name = Some(self.read_long_name(header.size)?);
                }
                EntryType::GnuLongLink => {
                    long_link = Some(self.read_long_name(header.size)?);
                }
                EntryType::PaxExtended => {
                    let mut parser = PaxParser::new();
                    parser.read(&self.read_special(header.size)?);
                    extensions.extend(parser.into_headers());
                }
                t if !t.is_visible() => {
                    debug!("Skipping {:?} entry {}", t, header.name);
                    self.stream.reset(header.size);
                    self.stream.skip_remaining()?;
                }
                _ => {
                    if let Some(name) = long_name {
                        header.name = name;
                    }
                    if let Some(link) = long_link {
                        header.link_name = link;
                    }
                    // PAX records outrank everything else.
                    pax::apply(&extensions, &mut header)?;
                    debug!(
                        "Entry {} ({:?}, {} bytes)",
                        header.name, header.entry_type, header.size
                    );
                    self.stream.reset(header.size);
                    self.current = Some(header.clone());
                    return Ok(Some(header));
                }
            }
        }
    }

    /// Reads the next header block, or `None` at the end of the archive.
    fn read_header_block(&mut self) -> ArchiveResult<Option<[u8; BLOCK_SIZE]>> {
        let mut block = [0u8; BLOCK_SIZE];
        let filled = self.stream.get_mut().next_block(&mut block)?;
        if filled == 0 {
            warn!("Archive ended without an end-of-archive block");
            return Ok(None);
        }
        if filled < BLOCK_SIZE {
            return Err(ArchiveError::Truncated(
                "stream ended in the middle of a header block",
            ));
        }
        if !is_end_of_archive_block(&block) {
            return Ok(Some(block));
        }

        // There should be a second zero block, but plenty of archives stop at one.
        let mut second = [0u8; BLOCK_SIZE];
        match self.stream.get_mut().next_block(&mut second) {
            Ok(0) => warn!("Archive has a single end-of-archive block"),
            Ok(_) if is_end_of_archive_block(&second) => trace!("End of archive"),
            Ok(_) => warn!("Second end-of-archive block isn't zeros"),
            Err(e) => warn!("Couldn't read a second end-of-archive block: {}", e),
        }
        Ok(None)
    }

    /// Reads the payload of a long name or extended header.
    fn read_special(&mut self, size: u64) -> ArchiveResult<Vec<u8>> {
        if size > MAX_SPECIAL_SIZE {
            return Err(ArchiveError::format(format!(
                "{}-byte long name or extended header is over the {}-byte limit",
                size, MAX_SPECIAL_SIZE
            )));
        }
        self.stream.reset(size);
        let mut data = Vec::new();
        self.stream.read_to_end(&mut data)?;
        Ok(data)
    }

    fn read_long_name(&mut self, size: u64) -> ArchiveResult<String> {
        let data = self.read_special(size)?;
        let end = memchr::memchr(0, &data).unwrap_or(data.len());
        Ok(self.encoding.decode(&data[..end])?.into_owned())
    }

    /// Reads every entry to its end, checking each payload is all there.
    pub fn verify(mut self) -> ArchiveReport {
        let mut report = ArchiveReport::default();
        loop {
            let header = match self.next_entry() {
                Ok(Some(h)) => h,
                Ok(None) => break,
                Err(e) => {
                    report.fatal = Some(e);
                    break;
                }
            };
            let result = match self.stream.skip_remaining() {
                Ok(_) => Ok(self.stream.size()),
                Err(e) => Err(e),
            };
            let truncated = matches!(result, Err(ArchiveError::Truncated(_)));
            report.record(header.name, result);
            // Nothing after a truncated payload can be found.
            if truncated {
                break;
            }
        }
        report
    }

    pub fn into_inner(self) -> R {
        self.stream.into_inner().into_inner().into_inner()
    }
}

impl<R: Read> Read for TarReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.current.is_none() {
            return Err(ArchiveError::State("No tar entry to read from").into_io());
        }
        self.stream.read(buf)
    }
}
