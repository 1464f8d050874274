//! Tools for reading a ZIP archive.
//!
//! There are two ways in:
//!
//! - [`ZipArchive`] reads the central directory at the back of a seekable
//!   stream, then jumps to whichever entries you ask for.
//!
//! - [`ZipStreamReader`] walks the local headers front to back,
//!   for when all you have is a pipe.
//!
//! [`ZipArchive`]: struct.ZipArchive.html
//! [`ZipStreamReader`]: struct.ZipStreamReader.html

use std::borrow::Cow;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::mem;

use flate2::bufread;
use flate2::read::DeflateDecoder;
use log::*;

use crate::arch::usize;
use crate::crc_reader::{Crc32Reader, Crc32Tally};
use crate::encoding::NameEncoding;
use crate::entry_stream::EntryStream;
use crate::report::ArchiveReport;
use crate::result::*;
use crate::zip::entry::*;
use crate::zip::extra::ZIP64_TAG;
use crate::zip::spec;

/// Settings for reading ZIP archives
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipReadOptions {
    /// How to decode names and comments that aren't flagged as UTF-8
    pub encoding: NameEncoding,
}

impl ZipReadOptions {
    pub fn encoding(mut self, encoding: NameEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

/// A ZIP archive to be read
pub struct ZipArchive<R> {
    reader: R,
    /// How many bytes of something else come before the archive
    archive_offset: u64,
    /// A list of entries from the ZIP's central directory
    entries: Vec<ZipEntry>,
    comment: Vec<u8>,
    options: ZipReadOptions,
}

impl<R: Read + Seek> ZipArchive<R> {
    /// Reads a ZIP archive's central directory.
    ///
    /// ```no_run
    /// # use std::fs::File;
    /// # use std::io;
    /// # use ziptar::zip::*;
    /// let mut archive = ZipArchive::new(File::open("foo.zip")?)?;
    /// for index in 0..archive.len() {
    ///     let name = archive.entries()[index].name.clone();
    ///     let mut reader = archive.read(index)?;
    ///     io::copy(&mut reader, &mut File::create(name)?)?;
    /// }
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(reader: R) -> ArchiveResult<Self> {
        Self::with_options(reader, ZipReadOptions::default())
    }

    pub fn with_options(reader: R, options: ZipReadOptions) -> ArchiveResult<Self> {
        let (new_archive, archive_offset) = Self::with_prepended_data(reader, options)?;
        if archive_offset != 0 {
            return Err(ArchiveError::PrependedWithUnknownBytes(archive_offset));
        }
        Ok(new_archive)
    }

    /// Like `ZipArchive::with_options()`, but allows arbitrary data to prepend the archive.
    /// Returns the ZipArchive and the number of bytes prepended to the archive.
    ///
    /// Since a ZIP archive's metadata sits at the back of the file,
    /// many formats consist of ZIP archives prepended with some other data.
    /// For example, a self-extracting archive is one with an executable in the front.
    pub fn with_prepended_data(mut reader: R, options: ZipReadOptions) -> ArchiveResult<(Self, u64)> {
        let (eocdr_posit, eocdr_bytes) = spec::find_end_of_central_directory(&mut reader)?;
        let eocdr = spec::EndOfCentralDirectory::parse(&eocdr_bytes)?;
        trace!("{:?}", eocdr);

        if eocdr.disk_number != eocdr.disk_with_central_directory {
            return Err(ArchiveError::Unsupported(format!(
                "No support for multi-disk archives: disk ({}) != disk with central directory ({})",
                eocdr.disk_number, eocdr.disk_with_central_directory
            )));
        }
        if eocdr.entries != eocdr.entries_on_this_disk {
            return Err(ArchiveError::Unsupported(format!(
                "No support for multi-disk archives: entries ({}) != entries this disk ({})",
                eocdr.entries, eocdr.entries_on_this_disk
            )));
        }

        let nominal_central_directory_offset: u64;
        let central_directory_size: u64;
        let entry_count: u64;

        // Zip files can be prepended by arbitrary junk,
        // so all the given positions might be off.
        // Calculate the offset.
        let archive_offset;

        let locator = match eocdr_posit.checked_sub(spec::ZIP64_EOCD_LOCATOR_SIZE as u64) {
            Some(locator_posit) => {
                let mut bytes = [0u8; spec::ZIP64_EOCD_LOCATOR_SIZE];
                reader.seek(SeekFrom::Start(locator_posit))?;
                reader.read_exact(&mut bytes)?;
                spec::Zip64EndOfCentralDirectoryLocator::parse(&bytes)?
            }
            None => None,
        };

        if let Some(zip64_eocdr_locator) = locator {
            trace!("{:?}", zip64_eocdr_locator);

            if eocdr.disk_number as u32 != zip64_eocdr_locator.disk_with_central_directory {
                return Err(ArchiveError::Unsupported(format!(
                    "No support for multi-disk archives: disk ({}) != disk with zip64 central directory ({})",
                    eocdr.disk_number, zip64_eocdr_locator.disk_with_central_directory
                )));
            }
            if zip64_eocdr_locator.disks != 1 {
                return Err(ArchiveError::Unsupported(format!(
                    "No support for multi-disk archives: Zip64 EOCDR locator reports {} disks",
                    zip64_eocdr_locator.disks
                )));
            }

            let zip64_eocdr_posit =
                find_zip64_eocdr(&mut reader, eocdr_posit, zip64_eocdr_locator.zip64_eocdr_offset)?;
            let mut bytes = [0u8; spec::ZIP64_EOCD_SIZE];
            reader.seek(SeekFrom::Start(zip64_eocdr_posit))?;
            reader.read_exact(&mut bytes)?;
            let zip64_eocdr = spec::Zip64EndOfCentralDirectory::parse(&bytes)?;
            trace!("{:?}", zip64_eocdr);

            archive_offset = zip64_eocdr_posit
                .checked_sub(zip64_eocdr_locator.zip64_eocdr_offset)
                .ok_or_else(|| {
                    ArchiveError::format("Zip64 End Of Central Directory Record is before its stated offset")
                })?;
            nominal_central_directory_offset = zip64_eocdr.central_directory_offset;
            central_directory_size = zip64_eocdr.central_directory_size;
            entry_count = zip64_eocdr.entries;
        } else {
            if eocdr.has_zip64_sentinels() {
                warn!("End Of Central Directory Record has Zip64 sentinels but no Zip64 locator");
            }
            // The offset is the actual position versus the stored one.
            central_directory_size = eocdr.central_directory_size as u64;
            nominal_central_directory_offset = eocdr.central_directory_offset as u64;
            archive_offset = eocdr_posit
                .checked_sub(central_directory_size)
                .and_then(|actual| actual.checked_sub(nominal_central_directory_offset))
                .ok_or_else(|| ArchiveError::format("Invalid central directory size or offset"))?;
            entry_count = eocdr.entries as u64;
        }

        trace!(
            "{} entries at nominal offset {} (archive starts at {})",
            entry_count,
            nominal_central_directory_offset,
            archive_offset
        );

        let mut directory_bytes = vec![0; usize(central_directory_size)?];
        reader.seek(SeekFrom::Start(archive_offset + nominal_central_directory_offset))?;
        reader.read_exact(&mut directory_bytes)?;
        let mut central_directory = &directory_bytes[..];

        // Don't trust the count for the allocation; each header is at least 46 bytes.
        let plausible = directory_bytes.len() / spec::CENTRAL_DIRECTORY_HEADER_SIZE;
        let mut entries = Vec::with_capacity(usize(entry_count)?.min(plausible));

        for _ in 0..entry_count {
            let dir_entry = spec::CentralDirectoryEntry::parse_and_consume(&mut central_directory)?;
            trace!("{:?}", dir_entry);

            let metadata = ZipEntry::from_cde(&dir_entry, options.encoding)?;
            debug!("{:?}", metadata);
            entries.push(metadata);
        }

        if central_directory.starts_with(&spec::DIGITAL_SIGNATURE_SIGNATURE.to_le_bytes()) {
            let signature = spec::DigitalSignature::parse_and_consume(&mut central_directory)?;
            debug!(
                "Skipping {}-byte central directory signature",
                signature.data.len()
            );
        }

        Ok((
            ZipArchive {
                reader,
                archive_offset,
                entries,
                comment: eocdr.file_comment.to_vec(),
                options,
            },
            archive_offset,
        ))
    }

    /// Returns the entries found in the ZIP archive's central directory.
    ///
    /// No effort is made to deduplicate or otherwise validate these entries.
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds the first entry with the given name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// The raw archive comment
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    pub fn comment_text(&self) -> ArchiveResult<Cow<'_, str>> {
        self.options.encoding.decode(&self.comment)
    }

    /// Reads the entry at `index` in the central directory.
    ///
    /// The returned reader checks the CRC-32 when it reaches the end.
    pub fn read(&mut self, index: usize) -> ArchiveResult<Box<dyn Read + '_>> {
        let metadata = self
            .entries
            .get(index)
            .ok_or(ArchiveError::State("No entry at that index"))?;

        if metadata.is_encrypted() {
            return Err(ArchiveError::Unsupported(format!(
                "Can't read encrypted file {}",
                metadata.name
            )));
        }

        self.reader
            .seek(SeekFrom::Start(self.archive_offset + metadata.header_offset))?;
        let header = spec::read_local_header(&mut self.reader)?;
        let local_header = spec::LocalFileHeader::parse_and_consume(&mut &header[..])?;
        trace!("{:?}", local_header);
        let local_metadata =
            ZipEntry::from_local_header(&local_header, metadata.header_offset, self.options.encoding)?;
        debug!("Reading {:?}", local_metadata);
        if cfg!(feature = "check-local-metadata") {
            check_local_metadata(metadata, &local_metadata)?;
        }

        make_reader(
            metadata,
            EntryStream::new(&mut self.reader, metadata.compressed_size),
        )
    }

    /// Reads the first entry with the given name.
    pub fn read_by_name(&mut self, name: &str) -> ArchiveResult<Box<dyn Read + '_>> {
        let index = self
            .index_of(name)
            .ok_or_else(|| ArchiveError::format(format!("No entry named {}", name)))?;
        self.read(index)
    }

    /// Reads back every entry, checking CRCs and sizes.
    pub fn verify(&mut self) -> ArchiveReport {
        let mut report = ArchiveReport::default();
        for index in 0..self.entries.len() {
            let name = self.entries[index].name.clone();
            let expected = self.entries[index].size;
            let result = self
                .read(index)
                .and_then(|mut reader| Ok(io::copy(&mut reader, &mut io::sink())?))
                .and_then(|size| {
                    if size == expected {
                        Ok(size)
                    } else {
                        Err(ArchiveError::format(format!(
                            "Read {} bytes, but the central directory says {}",
                            size, expected
                        )))
                    }
                });
            if let Err(e) = &result {
                warn!("{} failed verification: {}", name, e);
            }
            report.record(name, result);
        }
        report
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Finds the Zip64 end of central directory record.
///
/// It should sit right before its locator, which sits right before the EOCD.
/// If it isn't there, try the locator's nominal offset,
/// which is where it'd be if there's no prepended data but there is
/// an extensible data sector.
fn find_zip64_eocdr<R: Read + Seek>(
    reader: &mut R,
    eocdr_posit: u64,
    nominal_offset: u64,
) -> ArchiveResult<u64> {
    let expected = (eocdr_posit - spec::ZIP64_EOCD_LOCATOR_SIZE as u64)
        .checked_sub(spec::ZIP64_EOCD_SIZE as u64)
        .ok_or_else(|| ArchiveError::format("Too small for Zip64 End Of Central Directory Record"))?;

    for candidate in [expected, nominal_offset] {
        reader.seek(SeekFrom::Start(candidate))?;
        let mut signature = [0u8; 4];
        if reader.read_exact(&mut signature).is_ok()
            && u32::from_le_bytes(signature) == spec::ZIP64_EOCD_SIGNATURE
        {
            return Ok(candidate);
        }
    }
    Err(ArchiveError::format(
        "Couldn't find zip64 End Of Central Directory Record",
    ))
}

/// Compares what the local header says with the central directory.
///
/// With a data descriptor, the local header's CRC and sizes are zeros,
/// so those are only compared when it doesn't have one.
fn check_local_metadata(central: &ZipEntry, local: &ZipEntry) -> ArchiveResult<()> {
    let mut matches = central.raw_name == local.raw_name
        && central.compression_method == local.compression_method
        && central.flags == local.flags;
    if !local.has_data_descriptor() {
        matches &= central.crc32 == local.crc32
            && central.size == local.size
            && central.compressed_size == local.compressed_size;
    }
    if !matches {
        return Err(ArchiveError::format(format!(
            "Central directory entry for {} doesn't match local file header",
            central.name
        )));
    }
    Ok(())
}

/// Returns a boxed read trait for an entry's payload
/// that checks its CRC and size at the end.
fn make_reader<'a, R: Read + 'a>(
    entry: &ZipEntry,
    reader: R,
) -> ArchiveResult<Box<dyn Read + 'a>> {
    match entry.compression_method {
        CompressionMethod::Stored => {
            Ok(Box::new(Crc32Reader::new(reader, entry.crc32, entry.size)))
        }
        CompressionMethod::Deflated => {
            let deflate_reader = DeflateDecoder::new(reader);
            Ok(Box::new(Crc32Reader::new(
                deflate_reader,
                entry.crc32,
                entry.size,
            )))
        }
        other => Err(ArchiveError::Unsupported(format!(
            "Compression method {:?} not supported",
            other
        ))),
    }
}

/// The payload of the entry a [`ZipStreamReader`] is on
enum Body<R> {
    /// Between entries
    Idle(BufReader<R>),
    Stored(Crc32Tally<EntryStream<BufReader<R>>>),
    Deflated(Crc32Tally<DeflateDecoder<EntryStream<BufReader<R>>>>),
    /// No sizes up front: the Deflate stream's own end marks the payload's end.
    DeflatedToEnd(Crc32Tally<bufread::DeflateDecoder<BufReader<R>>>),
    /// Can be skipped but not read (encrypted or an unsupported method)
    Opaque(EntryStream<BufReader<R>>),
    /// An error interrupted a transition between the above
    Poisoned,
}

/// Reads a ZIP archive front to back from a stream that can't seek.
///
/// Entries are read from their local headers, so some metadata only
/// found in the central directory (comments, attributes) is missing.
/// Entries whose sizes follow in a data descriptor need a compression
/// method that marks its own end, i.e. Deflate.
///
/// ```no_run
/// # use std::io::{self, Read};
/// # use ziptar::zip::*;
/// let mut zip = ZipStreamReader::new(io::stdin());
/// while let Some(entry) = zip.next_entry()? {
///     let mut contents = Vec::new();
///     zip.read_to_end(&mut contents)?;
///     println!("{}: {} bytes", entry.name, contents.len());
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ZipStreamReader<R> {
    body: Body<R>,
    options: ZipReadOptions,
    current: Option<ZipEntry>,
    /// Offset of the next unread byte in the archive
    position: u64,
    finished: bool,
}

impl<R: Read> ZipStreamReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, ZipReadOptions::default())
    }

    pub fn with_options(reader: R, options: ZipReadOptions) -> Self {
        Self {
            body: Body::Idle(BufReader::new(reader)),
            options,
            current: None,
            position: 0,
            finished: false,
        }
    }

    /// The entry being read, with its CRC and sizes filled in from its
    /// data descriptor once the payload has been read through.
    pub fn current(&self) -> Option<&ZipEntry> {
        self.current.as_ref()
    }

    /// Skips the rest of the current entry and moves to the next one.
    ///
    /// Returns `None` once the central directory is reached.
    pub fn next_entry(&mut self) -> ArchiveResult<Option<ZipEntry>> {
        if self.finished {
            return Ok(None);
        }
        self.skip_body()?;
        self.current = None;

        let reader = match &mut self.body {
            Body::Idle(r) => r,
            _ => return Err(ArchiveError::State("Previous entry wasn't finished")),
        };

        if reader.fill_buf()?.is_empty() {
            warn!("Archive ended without a central directory");
            self.finished = true;
            return Ok(None);
        }
        let mut record = vec![0; spec::LOCAL_FILE_HEADER_SIZE];
        reader.read_exact(&mut record[..4])?;
        match u32::from_le_bytes([record[0], record[1], record[2], record[3]]) {
            spec::LOCAL_FILE_HEADER_SIGNATURE => {}
            spec::CENTRAL_DIRECTORY_SIGNATURE
            | spec::DIGITAL_SIGNATURE_SIGNATURE
            | spec::ZIP64_EOCD_SIGNATURE
            | spec::EOCD_SIGNATURE => {
                debug!("Reached the central directory at offset {}", self.position);
                self.finished = true;
                return Ok(None);
            }
            other => {
                return Err(ArchiveError::format(format!(
                    "Unexpected signature {:#010x} at offset {}",
                    other, self.position
                )));
            }
        }
        reader.read_exact(&mut record[4..])?;
        let header = spec::read_local_header_variable_part(reader, record)?;
        let local_header = spec::LocalFileHeader::parse_and_consume(&mut &header[..])?;
        trace!("{:?}", local_header);
        let entry = ZipEntry::from_local_header(&local_header, self.position, self.options.encoding)?;
        debug!("{:?}", entry);
        self.position += header.len() as u64;

        let reader = match mem::replace(&mut self.body, Body::Poisoned) {
            Body::Idle(r) => r,
            _ => return Err(ArchiveError::State("Previous entry wasn't finished")),
        };
        let readable = entry.compression_method.is_supported() && !entry.is_encrypted();
        let deferred = entry.has_data_descriptor() && entry.compressed_size == 0;

        self.body = if deferred {
            if readable && entry.compression_method == CompressionMethod::Deflated {
                Body::DeflatedToEnd(Crc32Tally::new(bufread::DeflateDecoder::new(reader)))
            } else {
                // There's no telling where the payload ends.
                self.body = Body::Idle(reader);
                self.finished = true;
                return Err(ArchiveError::Unsupported(format!(
                    "{} ({:?}) has its sizes in a data descriptor, so it can't be read sequentially",
                    entry.name, entry.compression_method
                )));
            }
        } else {
            let stream = EntryStream::new(reader, entry.compressed_size);
            match entry.compression_method {
                _ if !readable => Body::Opaque(stream),
                CompressionMethod::Deflated => {
                    Body::Deflated(Crc32Tally::new(DeflateDecoder::new(stream)))
                }
                _ => Body::Stored(Crc32Tally::new(stream)),
            }
        };

        self.current = Some(entry.clone());
        Ok(Some(entry))
    }

    /// Reads through whatever's left of the current entry.
    fn skip_body(&mut self) -> ArchiveResult<()> {
        match self.body {
            Body::Idle(_) => Ok(()),
            Body::Opaque(_) => self.close_body(),
            _ => {
                io::copy(self, &mut io::sink())?;
                Ok(())
            }
        }
    }

    /// Called once the payload is exhausted: reads the data descriptor
    /// (if any) and checks the CRC and sizes.
    fn close_body(&mut self) -> ArchiveResult<()> {
        let (reader, crc32, size, compressed_size) =
            match mem::replace(&mut self.body, Body::Poisoned) {
                Body::Idle(r) => {
                    self.body = Body::Idle(r);
                    return Ok(());
                }
                Body::Poisoned => {
                    return Err(ArchiveError::State(
                        "An earlier error left the archive stream unusable",
                    ))
                }
                Body::Stored(tally) => {
                    let (crc32, size) = (tally.crc32(), tally.count());
                    (tally.into_inner().into_inner(), Some(crc32), size, size)
                }
                Body::Deflated(tally) => {
                    let (crc32, size) = (tally.crc32(), tally.count());
                    let mut stream = tally.into_inner().into_inner();
                    // Junk after the end of the Deflate stream still counts.
                    stream.skip_remaining()?;
                    let compressed_size = stream.size();
                    (stream.into_inner(), Some(crc32), size, compressed_size)
                }
                Body::DeflatedToEnd(tally) => {
                    let (crc32, size) = (tally.crc32(), tally.count());
                    let decoder = tally.into_inner();
                    let compressed_size = decoder.total_in();
                    (decoder.into_inner(), Some(crc32), size, compressed_size)
                }
                Body::Opaque(mut stream) => {
                    stream.skip_remaining()?;
                    let compressed_size = stream.size();
                    (stream.into_inner(), None, 0, compressed_size)
                }
            };
        self.body = Body::Idle(reader);
        self.position += compressed_size;

        let entry = self
            .current
            .as_mut()
            .ok_or(ArchiveError::State("No entry is open"))?;

        if entry.has_data_descriptor() {
            let zip64 = entry.extra_field.contains(ZIP64_TAG);
            let reader = match &mut self.body {
                Body::Idle(r) => r,
                _ => return Err(ArchiveError::State("Previous entry wasn't finished")),
            };
            let (descriptor, len) = spec::read_data_descriptor(reader, zip64)?;
            trace!("{:?}", descriptor);
            self.position += len;
            entry.crc32 = descriptor.crc32;
            entry.compressed_size = descriptor.compressed_size;
            entry.size = descriptor.size;
        }

        if compressed_size != entry.compressed_size {
            return Err(ArchiveError::format(format!(
                "{} has {} compressed bytes, but its header says {}",
                entry.name, compressed_size, entry.compressed_size
            )));
        }
        if let Some(crc32) = crc32 {
            if crc32 != entry.crc32 {
                return Err(ArchiveError::format(format!(
                    "Invalid checksum for {}: expected {:#010x}, got {:#010x}",
                    entry.name, entry.crc32, crc32
                )));
            }
            if size != entry.size {
                return Err(ArchiveError::format(format!(
                    "{} decompressed to {} bytes, but its header says {}",
                    entry.name, size, entry.size
                )));
            }
        }
        Ok(())
    }

    /// Reads every entry through to the end, checking CRCs and sizes.
    pub fn verify(mut self) -> ArchiveReport {
        let mut report = ArchiveReport::default();
        loop {
            match self.next_entry() {
                Ok(Some(entry)) => {
                    let result = io::copy(&mut self, &mut io::sink()).map_err(ArchiveError::from);
                    if let Err(e) = &result {
                        warn!("{} failed verification: {}", entry.name, e);
                    }
                    report.record(entry.name, result);
                }
                Ok(None) => break,
                Err(e) => {
                    report.fatal = Some(e);
                    break;
                }
            }
        }
        report
    }
}

impl<R: Read> Read for ZipStreamReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = match &mut self.body {
            Body::Idle(_) => return Ok(0),
            Body::Stored(r) => r.read(buf)?,
            Body::Deflated(r) => r.read(buf)?,
            Body::DeflatedToEnd(r) => r.read(buf)?,
            Body::Opaque(_) => {
                let name = self.current.as_ref().map_or("entry", |e| e.name.as_str());
                return Err(ArchiveError::Unsupported(format!("Can't read {}", name)).into_io());
            }
            Body::Poisoned => {
                return Err(ArchiveError::State(
                    "An earlier error left the archive stream unusable",
                )
                .into_io())
            }
        };
        if count == 0 && !buf.is_empty() {
            self.close_body().map_err(ArchiveError::into_io)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::{Cursor, Write};

    use crate::zip::write::*;

    fn sample_archive<S: ZipSink>(mut zip: ZipWriter<S>) -> S::Inner {
        zip.start_entry("stored.txt", EntryOptions::default().compression_method(CompressionMethod::Stored))
            .unwrap();
        zip.write_all(b"hi").unwrap();
        zip.start_entry("deflated.txt", EntryOptions::default())
            .unwrap();
        zip.write_all(&b"squeeze me ".repeat(100)).unwrap();
        zip.add_directory("empty", EntryOptions::default()).unwrap();
        zip.finish().unwrap()
    }

    fn read_all<R: Read + Seek>(archive: &mut ZipArchive<R>, index: usize) -> Vec<u8> {
        let mut out = Vec::new();
        archive.read(index).unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn seekable_round_trip() {
        let bytes = sample_archive(ZipWriter::new(Cursor::new(Vec::new())).unwrap()).into_inner();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 3);
        assert_eq!(read_all(&mut archive, 0), b"hi");
        assert_eq!(read_all(&mut archive, 1), b"squeeze me ".repeat(100));
        assert!(archive.entries()[2].is_dir());
        assert!(archive.verify().is_ok());
    }

    #[test]
    fn streamed_archive_reads_both_ways() {
        let bytes = sample_archive(ZipWriter::new_streaming(Vec::new()));

        let mut archive = ZipArchive::new(Cursor::new(bytes.clone())).unwrap();
        assert_eq!(read_all(&mut archive, 1), b"squeeze me ".repeat(100));

        // The stored entry has deferred sizes, which the sequential reader can't frame.
        let mut stream = ZipStreamReader::new(&bytes[..]);
        assert!(matches!(
            stream.next_entry(),
            Err(ArchiveError::Unsupported(_))
        ));
    }

    #[test]
    fn stream_reader_walks_entries() {
        let mut zip = ZipWriter::new_streaming(Vec::new());
        zip.start_entry("one", EntryOptions::default()).unwrap();
        zip.write_all(b"first payload").unwrap();
        zip.start_entry(
            "two",
            EntryOptions::default()
                .compression_method(CompressionMethod::Stored)
                .known_payload(crc32fast::hash(b"second"), 6),
        )
        .unwrap();
        zip.write_all(b"second").unwrap();
        let bytes = zip.finish().unwrap();

        let mut stream = ZipStreamReader::new(&bytes[..]);
        let first = stream.next_entry().unwrap().unwrap();
        assert_eq!(first.name, "one");
        assert!(first.has_data_descriptor());
        let mut contents = String::new();
        stream.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "first payload");
        // The descriptor filled these in.
        assert_eq!(stream.current().unwrap().size, 13);

        // Skipped without reading.
        let second = stream.next_entry().unwrap().unwrap();
        assert_eq!(second.name, "two");
        assert_eq!(second.size, 6);
        assert!(stream.next_entry().unwrap().is_none());
    }

    #[test]
    fn prepended_data_is_detected() {
        let mut bytes = b"#!/bin/sh\necho self-extracting stub\n".to_vec();
        let stub_len = bytes.len() as u64;
        let archive = sample_archive(ZipWriter::new_streaming(Vec::new()));
        bytes.extend_from_slice(&archive);

        assert!(matches!(
            ZipArchive::new(Cursor::new(bytes.clone())),
            Err(ArchiveError::PrependedWithUnknownBytes(n)) if n == stub_len
        ));
        let (mut archive, offset) =
            ZipArchive::with_prepended_data(Cursor::new(bytes), ZipReadOptions::default())
                .unwrap();
        assert_eq!(offset, stub_len);
        assert_eq!(read_all(&mut archive, 0), b"hi");
    }

    #[test]
    fn corrupt_payload_fails_crc() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new())).unwrap();
        zip.start_entry("a.txt", EntryOptions::default().compression_method(CompressionMethod::Stored))
            .unwrap();
        zip.write_all(b"hi").unwrap();
        let mut bytes = zip.finish().unwrap().into_inner();
        // Payload follows the 30-byte header and 5-byte name.
        bytes[35] = b'H';

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut out = Vec::new();
        let err = archive.read(0).unwrap().read_to_end(&mut out).unwrap_err();
        assert!(matches!(ArchiveError::from_io(err), ArchiveError::Format(_)));

        let report = archive.verify();
        assert!(!report.is_ok());
        assert_eq!(report.failures().count(), 1);
    }

    #[cfg(feature = "check-local-metadata")]
    #[test]
    fn local_header_mismatch_is_caught() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new())).unwrap();
        zip.start_entry("a.txt", EntryOptions::default().compression_method(CompressionMethod::Stored))
            .unwrap();
        zip.write_all(b"hi").unwrap();
        let mut bytes = zip.finish().unwrap().into_inner();
        // Rename the entry in its local header only.
        bytes[30] = b'b';

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(archive.read(0), Err(ArchiveError::Format(_))));
    }

    #[test]
    fn encrypted_entries_are_listed_but_unreadable() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new())).unwrap();
        zip.start_entry("secret", EntryOptions::default().compression_method(CompressionMethod::Stored))
            .unwrap();
        zip.write_all(b"xx").unwrap();
        zip.start_entry("public", EntryOptions::default().compression_method(CompressionMethod::Stored))
            .unwrap();
        zip.write_all(b"ok").unwrap();
        let mut bytes = zip.finish().unwrap().into_inner();
        // Set the encryption bit in the local and central headers.
        bytes[6] |= 1;
        let cd = spec::find_end_of_central_directory(&mut Cursor::new(&bytes)).unwrap();
        let eocd = spec::EndOfCentralDirectory::parse(&cd.1).unwrap();
        bytes[eocd.central_directory_offset as usize + 8] |= 1;

        let mut archive = ZipArchive::new(Cursor::new(bytes.clone())).unwrap();
        assert!(archive.entries()[0].is_encrypted());
        assert!(matches!(archive.read(0), Err(ArchiveError::Unsupported(_))));
        assert_eq!(read_all(&mut archive, 1), b"ok");

        let mut stream = ZipStreamReader::new(&bytes[..]);
        stream.next_entry().unwrap();
        let mut out = Vec::new();
        assert!(stream.read_to_end(&mut out).is_err());
        assert_eq!(stream.next_entry().unwrap().unwrap().name, "public");
    }

    #[test]
    fn archive_comment() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()))
            .unwrap()
            .with_options(ZipWriteOptions::default().comment("made by a test"));
        zip.add_directory("d", EntryOptions::default()).unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.comment(), b"made by a test");
        assert_eq!(archive.comment_text().unwrap(), "made by a test");
    }
}
