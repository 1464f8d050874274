//! Tools for writing ZIP archives
//!
//! A [`ZipWriter`] streams entries out one after another:
//! open an entry with [`start_entry()`], write its contents through
//! [`Write`], and call [`finish()`] once everything is in to write
//! the central directory.
//!
//! The CRC and sizes of an entry are usually unknown until its contents
//! have gone by. If the output can seek, we go back and fill them in.
//! If it can't, they follow the contents in a data descriptor.
//!
//! [`start_entry()`]: struct.ZipWriter.html#method.start_entry
//! [`finish()`]: struct.ZipWriter.html#method.finish
//! [`Write`]: https://doc.rust-lang.org/std/io/trait.Write.html

use std::io::{self, Read, Seek, Write};

use chrono::NaiveDateTime;
use crc32fast::Hasher;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use log::*;

use crate::encoding::NameEncoding;
use crate::result::*;
use crate::time;
use crate::zip::entry::*;
use crate::zip::extra::ExtraField;
use crate::zip::spec;

/// When to use the Zip64 extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zip64Mode {
    /// Never. Anything too big for the legacy fields is an error.
    Never,
    /// Where needed. The central directory and end records are promoted
    /// automatically. Entries get a Zip64 local header if their declared size
    /// needs one, if they're flagged with
    /// [`EntryOptions::large_file`](struct.EntryOptions.html#method.large_file),
    /// or if no size was declared, since they might grow past 4 GiB.
    #[default]
    Dynamic,
    /// Every local header gets a Zip64 extra field.
    Always,
}

/// Archive-wide settings for a [`ZipWriter`](struct.ZipWriter.html)
#[derive(Debug, Clone, Default)]
pub struct ZipWriteOptions {
    pub zip64: Zip64Mode,
    /// How to encode names and comments. Text the encoding can't represent
    /// is written as UTF-8 and flagged as such.
    pub encoding: NameEncoding,
    /// The archive comment. Nothing can flag it as UTF-8, so under
    /// code page 437 it has to be representable there.
    pub comment: String,
}

impl ZipWriteOptions {
    pub fn zip64(mut self, mode: Zip64Mode) -> Self {
        self.zip64 = mode;
        self
    }

    pub fn encoding(mut self, encoding: NameEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comment = comment.into();
        self
    }
}

/// The CRC and size of an entry's contents, if they're known before writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownPayload {
    pub crc32: u32,
    pub size: u64,
}

/// Per-entry settings for [`ZipWriter::start_entry()`](struct.ZipWriter.html#method.start_entry)
#[derive(Debug, Clone)]
pub struct EntryOptions {
    pub compression_method: CompressionMethod,
    /// Deflate level from 0 to 9. Defaults to 6.
    pub compression_level: Option<u32>,
    pub last_modified: NaiveDateTime,
    /// Unix mode bits. If set, the entry is marked as made on Unix.
    pub unix_permissions: Option<u32>,
    pub comment: String,
    /// Extra field records to store with the entry.
    /// Zip64 records are managed by the writer and are replaced.
    pub extra_field: ExtraField,
    pub known_payload: Option<KnownPayload>,
    /// Reserve room for sizes past 4 GiB in the local header
    pub large_file: bool,
}

impl Default for EntryOptions {
    fn default() -> Self {
        Self {
            compression_method: CompressionMethod::Deflated,
            compression_level: None,
            last_modified: time::dos_epoch(),
            unix_permissions: None,
            comment: String::new(),
            extra_field: ExtraField::new(),
            known_payload: None,
            large_file: false,
        }
    }
}

impl EntryOptions {
    pub fn compression_method(mut self, method: CompressionMethod) -> Self {
        self.compression_method = method;
        self
    }

    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = Some(level);
        self
    }

    pub fn last_modified(mut self, when: NaiveDateTime) -> Self {
        self.last_modified = when;
        self
    }

    pub fn unix_permissions(mut self, mode: u32) -> Self {
        self.unix_permissions = Some(mode);
        self
    }

    pub fn comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn extra_field(mut self, extra: ExtraField) -> Self {
        self.extra_field = extra;
        self
    }

    /// Declares the contents' CRC and size up front.
    ///
    /// Stored entries declared this way get a complete local header and
    /// no data descriptor. Either way, the declaration is checked
    /// against what was actually written when the entry is closed.
    pub fn known_payload(mut self, crc32: u32, size: u64) -> Self {
        self.known_payload = Some(KnownPayload { crc32, size });
        self
    }

    pub fn large_file(mut self, large: bool) -> Self {
        self.large_file = large;
        self
    }
}

/// The stream a [`ZipWriter`](struct.ZipWriter.html) writes to.
///
/// Whether local headers can be fixed up after the fact is decided by
/// the sink, once, instead of by probing the stream.
pub trait ZipSink: Write {
    type Inner;

    /// True if [`patch_local_header()`](#tymethod.patch_local_header) works
    fn can_patch(&self) -> bool;

    /// Fills in a local header's CRC and sizes once its payload is written.
    /// `header_offset` counts from where the archive started.
    fn patch_local_header(
        &mut self,
        header_offset: u64,
        patch: &EntryPatchData,
        data: &DescriptorData,
    ) -> ArchiveResult<()>;

    fn into_inner(self) -> Self::Inner;
}

/// A seekable output. Local headers get patched in place.
#[derive(Debug)]
pub struct Seekable<W> {
    inner: W,
    /// Where the archive starts in `inner`
    base: u64,
}

impl<W: Write + Seek> Seekable<W> {
    pub fn new(mut inner: W) -> ArchiveResult<Self> {
        let base = inner.stream_position()?;
        Ok(Self { inner, base })
    }
}

impl<W: Write> Write for Seekable<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Seek> ZipSink for Seekable<W> {
    type Inner = W;

    fn can_patch(&self) -> bool {
        true
    }

    fn patch_local_header(
        &mut self,
        header_offset: u64,
        patch: &EntryPatchData,
        data: &DescriptorData,
    ) -> ArchiveResult<()> {
        spec::patch_local_header(&mut self.inner, self.base + header_offset, patch, data)
    }

    fn into_inner(self) -> W {
        self.inner
    }
}

/// A forward-only output. Entries of unknown size get data descriptors.
#[derive(Debug)]
pub struct Streaming<W>(W);

impl<W: Write> Write for Streaming<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<W: Write> ZipSink for Streaming<W> {
    type Inner = W;

    fn can_patch(&self) -> bool {
        false
    }

    fn patch_local_header(
        &mut self,
        _header_offset: u64,
        _patch: &EntryPatchData,
        _data: &DescriptorData,
    ) -> ArchiveResult<()> {
        Err(ArchiveError::State(
            "Can't patch a local header in a stream that can't seek",
        ))
    }

    fn into_inner(self) -> W {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// The local header was written with the real CRC and sizes.
    HeaderComplete,
    /// Go back and fill in the local header.
    PatchHeader,
    /// Follow the payload with a data descriptor.
    DataDescriptor,
}

struct OpenEntry {
    entry: ZipEntry,
    patch: EntryPatchData,
    framing: Framing,
    known: Option<KnownPayload>,
    hasher: Hasher,
    size: u64,
    compressed_size: u64,
    encoder: Option<DeflateEncoder<Vec<u8>>>,
}

/// Writes a ZIP archive to a [`ZipSink`](trait.ZipSink.html).
///
/// ```
/// # use std::io::{Cursor, Write};
/// # use ziptar::zip::*;
/// let mut zip = ZipWriter::new(Cursor::new(Vec::new()))?;
/// zip.start_entry("hello.txt", EntryOptions::default())?;
/// zip.write_all(b"Hello, world!")?;
/// let archive = zip.finish()?.into_inner();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// Dropping a writer without calling `finish()` leaves the archive
/// without a central directory.
pub struct ZipWriter<S> {
    sink: S,
    /// Bytes written since the archive started
    position: u64,
    options: ZipWriteOptions,
    entries: Vec<ZipEntry>,
    current: Option<OpenEntry>,
}

impl<W: Write + Seek> ZipWriter<Seekable<W>> {
    /// Writes an archive starting at the stream's current position.
    pub fn new(w: W) -> ArchiveResult<Self> {
        Ok(Self::with_sink(Seekable::new(w)?, ZipWriteOptions::default()))
    }
}

impl<W: Write> ZipWriter<Streaming<W>> {
    /// Writes an archive to a stream that can't seek.
    pub fn new_streaming(w: W) -> Self {
        Self::with_sink(Streaming(w), ZipWriteOptions::default())
    }
}

/// Writes to the sink, keeping track of where we are in the archive.
fn emit<S: Write>(sink: &mut S, position: &mut u64, bytes: &[u8]) -> io::Result<()> {
    sink.write_all(bytes)?;
    *position += bytes.len() as u64;
    Ok(())
}

/// Encodes an entry's name and comment.
///
/// They share the UTF-8 flag, so if either needs UTF-8, both get it.
fn encode_text(encoding: NameEncoding, name: &str, comment: &str) -> (Vec<u8>, Vec<u8>, bool) {
    let (raw_name, name_utf8) = encoding.encode(name);
    let (raw_comment, comment_utf8) = encoding.encode(comment);
    if name_utf8 || comment_utf8 {
        (name.as_bytes().to_vec(), comment.as_bytes().to_vec(), true)
    } else {
        (raw_name.into_owned(), raw_comment.into_owned(), false)
    }
}

impl<S: ZipSink> ZipWriter<S> {
    pub fn with_sink(sink: S, options: ZipWriteOptions) -> Self {
        Self {
            sink,
            position: 0,
            options,
            entries: Vec::new(),
            current: None,
        }
    }

    pub fn with_options(mut self, options: ZipWriteOptions) -> Self {
        self.options = options;
        self
    }

    /// Entries written (and closed) so far
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Closes any open entry and starts a new one named `name`.
    ///
    /// Names ending in `/` are directories.
    pub fn start_entry(&mut self, name: &str, options: EntryOptions) -> ArchiveResult<()> {
        self.close_entry()?;

        let method = options.compression_method;
        if !method.is_supported() {
            return Err(ArchiveError::Unsupported(format!(
                "Can't write {:?} entries",
                method
            )));
        }
        let is_dir = name.ends_with('/');
        let known = options.known_payload;
        let known_large = known.map_or(false, |k| k.size >= ZIP64_SIZE_THRESHOLD);

        let zip64 = match self.options.zip64 {
            Zip64Mode::Never if options.large_file || known_large => {
                return Err(ArchiveError::State(
                    "Large entries need Zip64, which is turned off",
                ));
            }
            Zip64Mode::Never => false,
            // Nothing stops an entry of unknown size from outgrowing 32 bits.
            Zip64Mode::Dynamic => options.large_file || known.is_none() || known_large,
            Zip64Mode::Always => true,
        };

        let (raw_name, raw_comment, utf8) =
            encode_text(self.options.encoding, name, &options.comment);
        let mut flags = if utf8 { flags::UTF8 } else { 0 };

        // Deflated sizes aren't known until the compressor is done.
        let sizes_known = known.is_some() && method == CompressionMethod::Stored;
        let framing = if sizes_known {
            Framing::HeaderComplete
        } else if self.sink.can_patch() {
            Framing::PatchHeader
        } else {
            flags |= flags::DATA_DESCRIPTOR;
            Framing::DataDescriptor
        };

        let host = if options.unix_permissions.is_some() {
            HostSystem::Unix
        } else {
            HostSystem::Dos
        };
        let mut external_attributes = if is_dir { DOS_DIRECTORY_ATTRIBUTE } else { 0 };
        if let Some(mode) = options.unix_permissions {
            let file_type = if is_dir { 0o040000 } else { 0o100000 };
            external_attributes |= ((mode & 0o7777) | file_type) << 16;
        }

        let entry = ZipEntry {
            raw_name,
            name: name.to_owned(),
            version_made_by: ((host.to_u8() as u16) << 8) | VERSION_MADE_BY,
            version_needed: version_needed(method, zip64, is_dir),
            flags,
            compression_method: method,
            last_modified: options.last_modified,
            crc32: known.map_or(0, |k| k.crc32),
            compressed_size: if sizes_known { known.map_or(0, |k| k.size) } else { 0 },
            size: known.map_or(0, |k| k.size),
            header_offset: self.position,
            disk_start: 0,
            internal_attributes: 0,
            external_attributes,
            extra_field: options.extra_field,
            comment: raw_comment,
        };

        let mut header = Vec::new();
        let patch = spec::write_local_header(&mut header, &entry, sizes_known, zip64)?;
        emit(&mut self.sink, &mut self.position, &header)?;
        debug!(
            "Started {} at offset {} ({:?}, {:?})",
            entry.name, entry.header_offset, method, framing
        );

        let encoder = match method {
            CompressionMethod::Deflated => Some(DeflateEncoder::new(
                Vec::new(),
                Compression::new(options.compression_level.unwrap_or(6).min(9)),
            )),
            _ => None,
        };

        self.current = Some(OpenEntry {
            entry,
            patch,
            framing,
            known,
            hasher: Hasher::new(),
            size: 0,
            compressed_size: 0,
            encoder,
        });
        Ok(())
    }

    /// Adds an empty directory entry. A trailing `/` is added if missing.
    pub fn add_directory(&mut self, name: &str, options: EntryOptions) -> ArchiveResult<()> {
        let name = if name.ends_with('/') {
            name.to_owned()
        } else {
            format!("{}/", name)
        };
        let options = options
            .compression_method(CompressionMethod::Stored)
            .known_payload(0, 0);
        self.start_entry(&name, options)?;
        self.close_entry()
    }

    /// Starts an entry and copies all of `contents` into it.
    pub fn add_entry<R: Read>(
        &mut self,
        name: &str,
        options: EntryOptions,
        contents: &mut R,
    ) -> ArchiveResult<u64> {
        self.start_entry(name, options)?;
        let copied = io::copy(contents, self)?;
        self.close_entry()?;
        Ok(copied)
    }

    /// Finishes the open entry, if any.
    ///
    /// Its CRC and sizes are patched into the local header or written
    /// in a data descriptor, depending on how the entry was started.
    pub fn close_entry(&mut self) -> ArchiveResult<()> {
        let OpenEntry {
            mut entry,
            patch,
            framing,
            known,
            hasher,
            size,
            mut compressed_size,
            encoder,
        } = match self.current.take() {
            Some(c) => c,
            None => return Ok(()),
        };

        if let Some(encoder) = encoder {
            let rest = encoder.finish()?;
            emit(&mut self.sink, &mut self.position, &rest)?;
            compressed_size += rest.len() as u64;
        }

        let data = DescriptorData {
            crc32: hasher.finalize(),
            compressed_size,
            size,
        };

        if let Some(known) = known {
            if known.crc32 != data.crc32 || known.size != data.size {
                return Err(ArchiveError::format(format!(
                    "{} was declared with CRC {:#010x} and size {}, but {:#010x} and {} were written",
                    entry.name, known.crc32, known.size, data.crc32, data.size
                )));
            }
        }
        if !patch.zip64
            && (data.size >= ZIP64_SIZE_THRESHOLD || data.compressed_size >= ZIP64_SIZE_THRESHOLD)
        {
            return Err(ArchiveError::format(format!(
                "{} grew past 4 GiB without a Zip64 local header",
                entry.name
            )));
        }

        entry.crc32 = data.crc32;
        entry.compressed_size = data.compressed_size;
        entry.size = data.size;

        match framing {
            Framing::HeaderComplete => {}
            Framing::PatchHeader => {
                self.sink
                    .patch_local_header(entry.header_offset, &patch, &data)?;
            }
            Framing::DataDescriptor => {
                let mut descriptor = Vec::new();
                spec::write_data_descriptor(&mut descriptor, &data, patch.zip64)?;
                emit(&mut self.sink, &mut self.position, &descriptor)?;
            }
        }
        trace!("Closed {:?}", entry);
        self.entries.push(entry);
        Ok(())
    }

    /// Closes any open entry, writes the central directory,
    /// and hands back the underlying stream.
    pub fn finish(mut self) -> ArchiveResult<S::Inner> {
        self.close_entry()?;

        // Nothing goes out until the whole tail is known to be writable.
        let central_directory_offset = self.position;
        let mut directory = Vec::new();
        for entry in &self.entries {
            spec::write_central_directory_header(&mut directory, entry)?;
        }
        let central_directory_size = directory.len() as u64;

        if self.options.zip64 == Zip64Mode::Never
            && (self.entries.len() >= 0xffff
                || central_directory_size >= ZIP64_SIZE_THRESHOLD
                || central_directory_offset >= ZIP64_SIZE_THRESHOLD
                || self.entries.iter().any(ZipEntry::needs_zip64))
        {
            return Err(ArchiveError::State(
                "The archive needs Zip64, which is turned off",
            ));
        }

        let comment = self
            .options
            .encoding
            .encode_exact(&self.options.comment, "Archive comment")?;
        let mut tail = Vec::new();
        spec::write_end_of_central_directory(
            &mut tail,
            self.entries.len() as u64,
            central_directory_size,
            central_directory_offset,
            &comment,
        )?;
        emit(&mut self.sink, &mut self.position, &directory)?;
        emit(&mut self.sink, &mut self.position, &tail)?;
        self.sink.flush()?;
        debug!(
            "Finished archive: {} entries, {} bytes",
            self.entries.len(),
            self.position
        );
        Ok(self.sink.into_inner())
    }
}

impl<S: ZipSink> Write for ZipWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let current = self
            .current
            .as_mut()
            .ok_or_else(|| ArchiveError::State("No entry is open for writing").into_io())?;

        current.hasher.update(buf);
        current.size += buf.len() as u64;
        match &mut current.encoder {
            None => {
                emit(&mut self.sink, &mut self.position, buf)?;
                current.compressed_size += buf.len() as u64;
            }
            Some(encoder) => {
                encoder.write_all(buf)?;
                let compressed = encoder.get_mut();
                if !compressed.is_empty() {
                    emit(&mut self.sink, &mut self.position, compressed)?;
                    current.compressed_size += compressed.len() as u64;
                    compressed.clear();
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}
