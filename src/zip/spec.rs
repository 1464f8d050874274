//! Code specific to the ZIP file format specification.
//!
//! We try to keep the nitty gritty here,
//! and higher-level stuff in the [`read`] and [`write`] modules.
//!
//! Most comments quote the ZIP spec, [`APPNOTE.TXT`].
//!
//! [_Zip Files: History, Explanation and Implementation_]
//! is also a fantastic resource and a great read.
//!
//! [`read`]: ../read/index.html
//! [`write`]: ../write/index.html
//! [`APPNOTE.TXT`]: https://pkware.cachefly.net/webdocs/APPNOTE/APPNOTE-6.3.6.TXT
//! [_Zip Files: History, Explanation and Implementation_]: https://www.hanshq.net/zip.html

use std::io::{Read, Seek, SeekFrom, Write};

use log::*;
use memchr::memmem;

use crate::arch::{u16_len, usize};
use crate::byte_order::*;
use crate::encoding::NameEncoding;
use crate::result::*;
use crate::time;
use crate::zip::entry::*;
use crate::zip::extra::*;

// Magic numbers denoting various sections of a ZIP archive

/// Local file header magic number
pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;
/// Data descriptor magic number
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;
/// Central directory magic number
pub const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;
/// Central directory digital signature magic number
pub const DIGITAL_SIGNATURE_SIGNATURE: u32 = 0x05054b50;
/// End of central directory magic number
pub const EOCD_SIGNATURE: u32 = 0x06054b50;
/// Zip64 end of central directory magic number
pub const ZIP64_EOCD_SIGNATURE: u32 = 0x06064b50;
/// Zip64 end of central directory locator magic number
pub const ZIP64_EOCD_LOCATOR_SIGNATURE: u32 = 0x07064b50;

pub const LOCAL_FILE_HEADER_SIZE: usize = 30;
pub const CENTRAL_DIRECTORY_HEADER_SIZE: usize = 46;
pub const EOCD_SIZE: usize = 22;
pub const ZIP64_EOCD_SIZE: usize = 56;
pub const ZIP64_EOCD_LOCATOR_SIZE: usize = 20;

/// The longest comment an EOCD can carry, and so the farthest
/// the EOCD can sit from the end of the archive.
pub const MAX_COMMENT_LEN: u64 = 0xffff;

const SENTINEL_16: u16 = 0xffff;
const SENTINEL_32: u32 = 0xffff_ffff;

/// 4.3.14.1 The value stored into the "size of zip64 end of central
/// directory record" SHOULD be the size of the remaining
/// record and SHOULD NOT include the leading 12 bytes.
const ZIP64_EOCD_RECORD_SIZE: u64 = ZIP64_EOCD_SIZE as u64 - 12;

fn expect_signature(input: &mut &[u8], signature: u32, what: &str) -> ArchiveResult<()> {
    let found = read_u32(input)?;
    if found != signature {
        return Err(ArchiveError::format(format!(
            "Invalid {} signature: expected {:#010x}, found {:#010x}",
            what, signature, found
        )));
    }
    Ok(())
}

/// Clamps a 64-bit value into a 32-bit field, writing the Zip64 sentinel
/// if it doesn't fit.
fn u32_or_sentinel(v: u64) -> u32 {
    if v >= ZIP64_SIZE_THRESHOLD {
        SENTINEL_32
    } else {
        v as u32
    }
}

/// Data from the End of central directory record
///
/// Found at the back of the ZIP archive and provides offsets for finding
/// its central directory, along with lots of stuff that stopped being relevant
/// when we stopped breaking ZIP archives onto multiple floppies.
#[derive(Debug)]
pub struct EndOfCentralDirectory<'a> {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub entries_on_this_disk: u16,
    pub entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub file_comment: &'a [u8],
}

impl<'a> EndOfCentralDirectory<'a> {
    pub fn parse(mut eocdr: &'a [u8]) -> ArchiveResult<Self> {
        // 4.3.16  End of central directory record:
        //
        // end of central dir signature    4 bytes  (0x06054b50)
        // number of this disk             2 bytes
        // number of the disk with the
        // start of the central directory  2 bytes
        // total number of entries in
        // the central dir on this disk    2 bytes
        // total number of entries in
        // the central dir                 2 bytes
        // size of the central directory   4 bytes
        // offset of start of central
        // directory with respect to
        // the starting disk number        4 bytes
        // zipfile comment length          2 bytes
        // .ZIP file comment       (variable size)
        expect_signature(&mut eocdr, EOCD_SIGNATURE, "end of central directory")?;
        let disk_number = read_u16(&mut eocdr)?;
        let disk_with_central_directory = read_u16(&mut eocdr)?;
        let entries_on_this_disk = read_u16(&mut eocdr)?;
        let entries = read_u16(&mut eocdr)?;
        let central_directory_size = read_u32(&mut eocdr)?;
        let central_directory_offset = read_u32(&mut eocdr)?;
        let comment_length = read_u16(&mut eocdr)?;
        let file_comment = read_bytes(&mut eocdr, usize(comment_length)?)?;
        if !eocdr.is_empty() {
            debug!(
                "Ignoring {} bytes after the archive comment",
                eocdr.len()
            );
        }

        Ok(Self {
            disk_number,
            disk_with_central_directory,
            entries_on_this_disk,
            entries,
            central_directory_size,
            central_directory_offset,
            file_comment,
        })
    }

    /// True if any field holds a sentinel telling us to go find the Zip64 record.
    pub fn has_zip64_sentinels(&self) -> bool {
        self.entries == SENTINEL_16
            || self.entries_on_this_disk == SENTINEL_16
            || self.central_directory_size == SENTINEL_32
            || self.central_directory_offset == SENTINEL_32
    }
}

/// Writes the end of central directory.
///
/// Each of the entry count, the directory size, and the directory offset
/// is checked on its own. If any of them is past what its legacy field holds,
/// a Zip64 end of central directory record and locator go out first
/// and the overflowing legacy fields get sentinels.
/// The Zip64 record is placed right after the central directory,
/// so `central_directory_offset + central_directory_size` must be
/// where the writer currently is.
pub fn write_end_of_central_directory<W: Write>(
    w: &mut W,
    entries: u64,
    central_directory_size: u64,
    central_directory_offset: u64,
    comment: &[u8],
) -> ArchiveResult<()> {
    let comment_length = u16_len(comment.len(), "Archive comment")?;

    let needs_zip64 = entries >= SENTINEL_16 as u64
        || central_directory_size >= ZIP64_SIZE_THRESHOLD
        || central_directory_offset >= ZIP64_SIZE_THRESHOLD;

    if needs_zip64 {
        let zip64_eocd_offset = central_directory_offset + central_directory_size;
        Zip64EndOfCentralDirectory {
            source_version: VERSION_MADE_BY,
            minimum_extract_version: VERSION_ZIP64,
            disk_number: 0,
            disk_with_central_directory: 0,
            entries_on_this_disk: entries,
            entries,
            central_directory_size,
            central_directory_offset,
        }
        .write(w)?;
        Zip64EndOfCentralDirectoryLocator {
            disk_with_central_directory: 0,
            zip64_eocdr_offset: zip64_eocd_offset,
            disks: 1,
        }
        .write(w)?;
    }

    let entries16 = if entries >= SENTINEL_16 as u64 {
        SENTINEL_16
    } else {
        entries as u16
    };

    w.write_le_u32(EOCD_SIGNATURE)?;
    w.write_le_u16(0)?; // this disk
    w.write_le_u16(0)?; // disk with the central directory
    w.write_le_u16(entries16)?;
    w.write_le_u16(entries16)?;
    w.write_le_u32(u32_or_sentinel(central_directory_size))?;
    w.write_le_u32(u32_or_sentinel(central_directory_offset))?;
    w.write_le_u16(comment_length)?;
    w.write_all(comment)?;
    Ok(())
}

/// Searches backward from `end_location` for `signature`.
///
/// Records like the end of central directory have a fixed part
/// (`minimum_block_size` bytes, signature included) followed by up to
/// `maximum_variable_data` bytes of variable data,
/// so the signature must start somewhere in
/// `[end - min - max_variable, end - min]`.
/// That window is read into memory once and scanned from its back.
///
/// Returns the position right after the signature (and leaves the reader there),
/// or `None` if the window doesn't hold it.
pub fn locate_block_with_signature<R: Read + Seek>(
    reader: &mut R,
    signature: u32,
    end_location: u64,
    minimum_block_size: u64,
    maximum_variable_data: u64,
) -> ArchiveResult<Option<u64>> {
    let minimum_block_size = minimum_block_size.max(4);
    if end_location < minimum_block_size {
        return Ok(None);
    }
    let last_candidate = end_location - minimum_block_size;
    let first_candidate = last_candidate.saturating_sub(maximum_variable_data);

    let mut window = vec![0; usize(last_candidate - first_candidate + 4)?];
    reader.seek(SeekFrom::Start(first_candidate))?;
    reader.read_exact(&mut window)?;

    match memmem::rfind(&window, &signature.to_le_bytes()) {
        Some(found) => {
            let after = first_candidate + found as u64 + 4;
            reader.seek(SeekFrom::Start(after))?;
            Ok(Some(after))
        }
        None => Ok(None),
    }
}

/// Searches backward through `reader` to find the
/// End of central directory record.
///
/// It should be right at the end of the file,
/// but its variable size means we can't jump to a known offset.
/// Worse, the archive comment can hold anything, including the EOCD magic.
/// So each candidate is only accepted if its comment length
/// reaches exactly to the end of the stream.
/// If none does (say there's junk after the archive),
/// we settle for the candidate closest to the end
/// whose central directory actually sits right before it.
///
/// Returns the record's position and its bytes, comment included.
pub fn find_end_of_central_directory<R: Read + Seek>(
    reader: &mut R,
) -> ArchiveResult<(u64, Vec<u8>)> {
    let end = reader.seek(SeekFrom::End(0))?;
    let floor = end.saturating_sub(EOCD_SIZE as u64 + MAX_COMMENT_LEN);

    let mut search_end = end;
    let mut closest = None;
    while search_end >= floor + EOCD_SIZE as u64 {
        let max_variable = (search_end - EOCD_SIZE as u64) - floor;
        let after = match locate_block_with_signature(
            reader,
            EOCD_SIGNATURE,
            search_end,
            EOCD_SIZE as u64,
            max_variable,
        )? {
            Some(a) => a,
            None => break,
        };
        let start = after - 4;

        let mut fixed = [0u8; EOCD_SIZE];
        reader.seek(SeekFrom::Start(start))?;
        reader.read_exact(&mut fixed)?;
        let comment_length = u16::from_le_bytes([fixed[20], fixed[21]]) as u64;
        if start + EOCD_SIZE as u64 + comment_length == end {
            return Ok((start, read_range(reader, start, end)?));
        }
        debug!(
            "Rejecting EOCD candidate at {}: its {}-byte comment doesn't end the archive",
            start, comment_length
        );
        if closest.is_none() && is_plausible_end_record(reader, start, &fixed, end)? {
            closest = Some(start);
        }

        if start == 0 {
            break;
        }
        // Look again, ending just before this candidate.
        search_end = start - 1 + EOCD_SIZE as u64;
    }

    match closest {
        Some(start) => {
            warn!(
                "No EOCD candidate's comment reaches the end of the archive; using the one at {}",
                start
            );
            Ok((start, read_range(reader, start, end)?))
        }
        None => Err(ArchiveError::format(
            "Couldn't find End Of Central Directory Record",
        )),
    }
}

/// Checks an EOCD candidate against what surrounds it:
/// its comment has to fit in the stream,
/// and its central directory has to end where the candidate starts.
fn is_plausible_end_record<R: Read + Seek>(
    reader: &mut R,
    start: u64,
    fixed: &[u8; EOCD_SIZE],
    end: u64,
) -> ArchiveResult<bool> {
    let mut fields = &fixed[10..];
    let entries = fields.read_le_u16()?;
    let size = fields.read_le_u32()?;
    let offset = fields.read_le_u32()?;
    let comment_length = fields.read_le_u16()? as u64;

    if start + EOCD_SIZE as u64 + comment_length > end {
        return Ok(false);
    }
    if entries == 0xffff || size == SENTINEL_32 || offset == SENTINEL_32 {
        // The real values are in the Zip64 record; its locator comes right before this one.
        return match start.checked_sub(ZIP64_EOCD_LOCATOR_SIZE as u64) {
            Some(locator) => has_signature_at(reader, locator, ZIP64_EOCD_LOCATOR_SIGNATURE),
            None => Ok(false),
        };
    }
    let (size, offset) = (size as u64, offset as u64);
    if offset + size > start {
        return Ok(false);
    }
    if entries == 0 {
        return Ok(size == 0);
    }
    // Prepended bytes shift the stated offset, but not the directory's size.
    has_signature_at(reader, start - size, CENTRAL_DIRECTORY_SIGNATURE)
}

fn has_signature_at<R: Read + Seek>(
    reader: &mut R,
    position: u64,
    signature: u32,
) -> ArchiveResult<bool> {
    reader.seek(SeekFrom::Start(position))?;
    Ok(reader.read_le_u32()? == signature)
}

fn read_range<R: Read + Seek>(reader: &mut R, start: u64, end: u64) -> ArchiveResult<Vec<u8>> {
    let mut bytes = vec![0; usize(end - start)?];
    reader.seek(SeekFrom::Start(start))?;
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// Data from the Zip64 end of central directory locator
///
/// This should immediately precede the End of central directory record
/// on Zip64 files and tell us where to find the Zip64 end of central directory record.
#[derive(Debug, PartialEq, Eq)]
pub struct Zip64EndOfCentralDirectoryLocator {
    pub disk_with_central_directory: u32,
    pub zip64_eocdr_offset: u64,
    pub disks: u32,
}

impl Zip64EndOfCentralDirectoryLocator {
    /// Returns `None` if `mapping` doesn't start with the locator's signature.
    pub fn parse(mut mapping: &[u8]) -> ArchiveResult<Option<Self>> {
        // 4.3.15 Zip64 end of central directory locator
        //
        // zip64 end of central dir locator
        // signature                       4 bytes  (0x07064b50)
        // number of the disk with the
        // start of the zip64 end of
        // central directory               4 bytes
        // relative offset of the zip64
        // end of central directory record 8 bytes
        // total number of disks           4 bytes
        if read_u32(&mut mapping)? != ZIP64_EOCD_LOCATOR_SIGNATURE {
            return Ok(None);
        }
        let disk_with_central_directory = read_u32(&mut mapping)?;
        let zip64_eocdr_offset = read_u64(&mut mapping)?;
        let disks = read_u32(&mut mapping)?;

        Ok(Some(Self {
            disk_with_central_directory,
            zip64_eocdr_offset,
            disks,
        }))
    }

    pub fn write<W: Write>(&self, w: &mut W) -> ArchiveResult<()> {
        w.write_le_u32(ZIP64_EOCD_LOCATOR_SIGNATURE)?;
        w.write_le_u32(self.disk_with_central_directory)?;
        w.write_le_u64(self.zip64_eocdr_offset)?;
        w.write_le_u32(self.disks)?;
        Ok(())
    }
}

/// Data from the Zip64 end of central directory record
#[derive(Debug, PartialEq, Eq)]
pub struct Zip64EndOfCentralDirectory {
    pub source_version: u16,
    pub minimum_extract_version: u16,
    pub disk_number: u32,
    pub disk_with_central_directory: u32,
    pub entries_on_this_disk: u64,
    pub entries: u64,
    pub central_directory_size: u64,
    pub central_directory_offset: u64,
}

impl Zip64EndOfCentralDirectory {
    pub fn parse(mut eocdr: &[u8]) -> ArchiveResult<Self> {
        // 4.3.14  Zip64 end of central directory record
        //
        // zip64 end of central dir
        // signature                       4 bytes  (0x06064b50)
        // size of zip64 end of central
        // directory record                8 bytes
        // version made by                 2 bytes
        // version needed to extract       2 bytes
        // number of this disk             4 bytes
        // number of the disk with the
        // start of the central directory  4 bytes
        // total number of entries in the
        // central directory on this disk  8 bytes
        // total number of entries in the
        // central directory               8 bytes
        // size of the central directory   8 bytes
        // offset of start of central
        // directory with respect to
        // the starting disk number        8 bytes
        // zip64 extensible data sector    (variable size)
        expect_signature(&mut eocdr, ZIP64_EOCD_SIGNATURE, "Zip64 end of central directory")?;
        let eocdr_size = read_u64(&mut eocdr)?;
        if eocdr_size < ZIP64_EOCD_RECORD_SIZE {
            return Err(ArchiveError::format(format!(
                "Zip64 End Of Central Directory Record claims to be {} bytes, less than its fixed fields",
                eocdr_size
            )));
        }
        if eocdr_size > ZIP64_EOCD_RECORD_SIZE {
            return Err(ArchiveError::Unsupported(format!(
                "Zip64 End Of Central Directory Record has {} bytes of extensible data",
                eocdr_size - ZIP64_EOCD_RECORD_SIZE
            )));
        }
        let source_version = read_u16(&mut eocdr)?;
        let minimum_extract_version = read_u16(&mut eocdr)?;
        let disk_number = read_u32(&mut eocdr)?;
        let disk_with_central_directory = read_u32(&mut eocdr)?;
        let entries_on_this_disk = read_u64(&mut eocdr)?;
        let entries = read_u64(&mut eocdr)?;
        let central_directory_size = read_u64(&mut eocdr)?;
        let central_directory_offset = read_u64(&mut eocdr)?;

        Ok(Self {
            source_version,
            minimum_extract_version,
            disk_number,
            disk_with_central_directory,
            entries_on_this_disk,
            entries,
            central_directory_size,
            central_directory_offset,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> ArchiveResult<()> {
        w.write_le_u32(ZIP64_EOCD_SIGNATURE)?;
        w.write_le_u64(ZIP64_EOCD_RECORD_SIZE)?;
        w.write_le_u16(self.source_version)?;
        w.write_le_u16(self.minimum_extract_version)?;
        w.write_le_u32(self.disk_number)?;
        w.write_le_u32(self.disk_with_central_directory)?;
        w.write_le_u64(self.entries_on_this_disk)?;
        w.write_le_u64(self.entries)?;
        w.write_le_u64(self.central_directory_size)?;
        w.write_le_u64(self.central_directory_offset)?;
        Ok(())
    }
}

/// Data from a central directory entry
///
/// Each of these records contains information about a file or folder
/// stored in the ZIP archive.
#[derive(Debug)]
pub struct CentralDirectoryEntry<'a> {
    pub source_version: u16,
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number: u16,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub header_offset: u32,
    pub path: &'a [u8],
    pub extra_field: &'a [u8],
    pub file_comment: &'a [u8],
}

impl<'a> CentralDirectoryEntry<'a> {
    pub fn parse_and_consume(entry: &mut &'a [u8]) -> ArchiveResult<Self> {
        // 4.3.12  Central directory structure:
        //
        // [central directory header 1]
        // .
        // .
        // .
        // [central directory header n]
        // [digital signature]
        //
        // File header:
        //
        //   central file header signature   4 bytes  (0x02014b50)
        //   version made by                 2 bytes
        //   version needed to extract       2 bytes
        //   general purpose bit flag        2 bytes
        //   compression method              2 bytes
        //   last mod file time              2 bytes
        //   last mod file date              2 bytes
        //   crc-32                          4 bytes
        //   compressed size                 4 bytes
        //   uncompressed size               4 bytes
        //   file name length                2 bytes
        //   extra field length              2 bytes
        //   file comment length             2 bytes
        //   disk number start               2 bytes
        //   internal file attributes        2 bytes
        //   external file attributes        4 bytes
        //   relative offset of local header 4 bytes
        //
        //   file name (variable size)
        //   extra field (variable size)
        //   file comment (variable size)
        expect_signature(entry, CENTRAL_DIRECTORY_SIGNATURE, "central directory header")?;
        let source_version = read_u16(entry)?;
        let minimum_extract_version = read_u16(entry)?;
        let flags = read_u16(entry)?;
        let compression_method = read_u16(entry)?;
        let last_modified_time = read_u16(entry)?;
        let last_modified_date = read_u16(entry)?;
        let crc32 = read_u32(entry)?;
        let compressed_size = read_u32(entry)?;
        let uncompressed_size = read_u32(entry)?;
        let path_length = usize(read_u16(entry)?)?;
        let extra_field_length = usize(read_u16(entry)?)?;
        let file_comment_length = usize(read_u16(entry)?)?;
        let disk_number = read_u16(entry)?;
        let internal_file_attributes = read_u16(entry)?;
        let external_file_attributes = read_u32(entry)?;
        let header_offset = read_u32(entry)?;
        let path = read_bytes(entry, path_length)?;
        let extra_field = read_bytes(entry, extra_field_length)?;
        let file_comment = read_bytes(entry, file_comment_length)?;

        Ok(Self {
            source_version,
            minimum_extract_version,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number,
            internal_file_attributes,
            external_file_attributes,
            header_offset,
            path,
            extra_field,
            file_comment,
        })
    }
}

/// The Zip64 extra field for a header, followed by every other record
/// the entry carries. Any Zip64 record the caller left in there is dropped.
fn extra_with_zip64(
    zip64: Option<Zip64ExtendedInfo>,
    others: &ExtraField,
) -> ArchiveResult<ExtraField> {
    let mut extra = ExtraField::new();
    if let Some(info) = zip64 {
        info.to_builder().commit(ZIP64_TAG, &mut extra)?;
    }
    for record in others.records().filter(|r| r.tag != ZIP64_TAG) {
        extra.push(record.tag, record.payload)?;
    }
    Ok(extra)
}

/// Writes a central directory header for `entry`.
///
/// Sizes and the header offset are each promoted to the Zip64 extra field
/// if they don't fit in 32 bits, with sentinels left in their legacy fields.
pub fn write_central_directory_header<W: Write>(
    w: &mut W,
    entry: &ZipEntry,
) -> ArchiveResult<()> {
    let promoted = Zip64Fields {
        size: entry.size >= ZIP64_SIZE_THRESHOLD,
        compressed_size: entry.compressed_size >= ZIP64_SIZE_THRESHOLD,
        header_offset: entry.header_offset >= ZIP64_SIZE_THRESHOLD,
        disk_start: false,
    };
    let zip64 = promoted.any().then(|| Zip64ExtendedInfo {
        size: promoted.size.then_some(entry.size),
        compressed_size: promoted.compressed_size.then_some(entry.compressed_size),
        header_offset: promoted.header_offset.then_some(entry.header_offset),
        disk_start: None,
    });
    let extra = extra_with_zip64(zip64, &entry.extra_field)?;

    let name_length = u16_len(entry.raw_name.len(), "Entry name")?;
    let extra_length = u16_len(extra.len(), "Extra field")?;
    let comment_length = u16_len(entry.comment.len(), "Entry comment")?;
    let version_needed = if promoted.any() {
        entry.version_needed.max(VERSION_ZIP64)
    } else {
        entry.version_needed
    };
    let (time, date) = time::to_msdos(&entry.last_modified);

    w.write_le_u32(CENTRAL_DIRECTORY_SIGNATURE)?;
    w.write_le_u16(entry.version_made_by)?;
    w.write_le_u16(version_needed)?;
    w.write_le_u16(entry.flags)?;
    w.write_le_u16(entry.compression_method.to_u16())?;
    w.write_le_u16(time)?;
    w.write_le_u16(date)?;
    w.write_le_u32(entry.crc32)?;
    w.write_le_u32(u32_or_sentinel(entry.compressed_size))?;
    w.write_le_u32(u32_or_sentinel(entry.size))?;
    w.write_le_u16(name_length)?;
    w.write_le_u16(extra_length)?;
    w.write_le_u16(comment_length)?;
    w.write_le_u16(0)?; // disk number start
    w.write_le_u16(entry.internal_attributes)?;
    w.write_le_u32(entry.external_attributes)?;
    w.write_le_u32(u32_or_sentinel(entry.header_offset))?;
    w.write_all(&entry.raw_name)?;
    w.write_all(extra.as_bytes())?;
    w.write_all(&entry.comment)?;
    Ok(())
}

/// Data from the optional digital signature
/// that can follow the central directory headers
#[derive(Debug)]
pub struct DigitalSignature<'a> {
    pub data: &'a [u8],
}

impl<'a> DigitalSignature<'a> {
    pub fn parse_and_consume(input: &mut &'a [u8]) -> ArchiveResult<Self> {
        // 4.3.13 Digital signature:
        //
        //   header signature                4 bytes  (0x05054b50)
        //   size of data                    2 bytes
        //   signature data (variable size)
        expect_signature(input, DIGITAL_SIGNATURE_SIGNATURE, "digital signature")?;
        let len = usize(read_u16(input)?)?;
        let data = read_bytes(input, len)?;
        Ok(Self { data })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> ArchiveResult<()> {
        w.write_le_u32(DIGITAL_SIGNATURE_SIGNATURE)?;
        w.write_le_u16(u16_len(self.data.len(), "Digital signature")?)?;
        w.write_all(self.data)?;
        Ok(())
    }
}

impl ZipEntry {
    /// Extracts a `ZipEntry` from a central directory entry
    pub(crate) fn from_cde(
        cde: &CentralDirectoryEntry<'_>,
        encoding: NameEncoding,
    ) -> ArchiveResult<Self> {
        let encoding = effective_encoding(cde.flags, encoding);
        let mut entry = Self {
            raw_name: cde.path.to_vec(),
            name: encoding.decode(cde.path)?.into_owned(),
            version_made_by: cde.source_version,
            version_needed: cde.minimum_extract_version,
            flags: cde.flags,
            compression_method: CompressionMethod::from_u16(cde.compression_method),
            last_modified: time::parse_msdos(cde.last_modified_time, cde.last_modified_date),
            crc32: cde.crc32,
            compressed_size: cde.compressed_size as u64,
            size: cde.uncompressed_size as u64,
            header_offset: cde.header_offset as u64,
            disk_start: cde.disk_number as u32,
            internal_attributes: cde.internal_file_attributes,
            external_attributes: cde.external_file_attributes,
            extra_field: ExtraField::from_bytes(cde.extra_field)?,
            comment: cde.file_comment.to_vec(),
        };

        entry.resolve_zip64(Zip64Fields {
            size: cde.uncompressed_size == SENTINEL_32,
            compressed_size: cde.compressed_size == SENTINEL_32,
            header_offset: cde.header_offset == SENTINEL_32,
            disk_start: cde.disk_number == SENTINEL_16,
        });

        if entry.disk_start != 0 {
            return Err(ArchiveError::Unsupported(format!(
                "No support for multi-disk archives: file {} claims to be on disk {}",
                entry.name, entry.disk_start,
            )));
        }
        Ok(entry)
    }

    /// Extract metadata from a local file header.
    ///
    /// Since the local header doesn't contain the offset
    /// (we're at it already if we're reading the thing),
    /// take the offset as an argument.
    pub(crate) fn from_local_header(
        local: &LocalFileHeader<'_>,
        header_offset: u64,
        encoding: NameEncoding,
    ) -> ArchiveResult<Self> {
        let encoding = effective_encoding(local.flags, encoding);
        let mut entry = Self {
            raw_name: local.path.to_vec(),
            name: encoding.decode(local.path)?.into_owned(),
            version_made_by: 0,
            version_needed: local.minimum_extract_version,
            flags: local.flags,
            compression_method: CompressionMethod::from_u16(local.compression_method),
            last_modified: time::parse_msdos(local.last_modified_time, local.last_modified_date),
            crc32: local.crc32,
            compressed_size: local.compressed_size as u64,
            size: local.uncompressed_size as u64,
            header_offset,
            disk_start: 0,
            internal_attributes: 0,
            external_attributes: 0,
            extra_field: ExtraField::from_bytes(local.extra_field)?,
            comment: Vec::new(),
        };

        entry.resolve_zip64(Zip64Fields {
            size: local.uncompressed_size == SENTINEL_32,
            compressed_size: local.compressed_size == SENTINEL_32,
            ..Default::default()
        });
        Ok(entry)
    }

    /// Swaps sentinel values for their counterparts in the Zip64 extra field.
    ///
    /// Only fields whose legacy value was a sentinel are read from it,
    /// in the order the format lays them out.
    fn resolve_zip64(&mut self, wanted: Zip64Fields) {
        if !wanted.any() {
            return;
        }
        let info = match self.extra_field.zip64(wanted) {
            Some(i) => i,
            None => {
                warn!(
                    "{} has Zip64 sentinels but no Zip64 extra field; keeping them as-is",
                    self.name
                );
                return;
            }
        };
        if let Some(size) = info.size {
            self.size = size;
        }
        if let Some(compressed_size) = info.compressed_size {
            self.compressed_size = compressed_size;
        }
        if let Some(header_offset) = info.header_offset {
            self.header_offset = header_offset;
        }
        if let Some(disk_start) = info.disk_start {
            self.disk_start = disk_start;
        }
    }
}

/// Data from a local file header
///
/// Each files' actual contents is preceded by this header.
/// These headers allow for "streaming" decompression without
/// the use of the central directory.
#[derive(Debug)]
pub struct LocalFileHeader<'a> {
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub path: &'a [u8],
    pub extra_field: &'a [u8],
}

impl<'a> LocalFileHeader<'a> {
    pub fn parse_and_consume(header: &mut &'a [u8]) -> ArchiveResult<Self> {
        // 4.3.7  Local file header:
        //
        // local file header signature     4 bytes  (0x04034b50)
        // version needed to extract       2 bytes
        // general purpose bit flag        2 bytes
        // compression method              2 bytes
        // last mod file time              2 bytes
        // last mod file date              2 bytes
        // crc-32                          4 bytes
        // compressed size                 4 bytes
        // uncompressed size               4 bytes
        // file name length                2 bytes
        // extra field length              2 bytes
        //
        // file name (variable size)
        // extra field (variable size)
        expect_signature(header, LOCAL_FILE_HEADER_SIGNATURE, "local file header")?;
        let minimum_extract_version = read_u16(header)?;
        let flags = read_u16(header)?;
        let compression_method = read_u16(header)?;
        let last_modified_time = read_u16(header)?;
        let last_modified_date = read_u16(header)?;
        let crc32 = read_u32(header)?;
        let compressed_size = read_u32(header)?;
        let uncompressed_size = read_u32(header)?;
        let path_length = usize(read_u16(header)?)?;
        let extra_field_length = usize(read_u16(header)?)?;
        let path = read_bytes(header, path_length)?;
        let extra_field = read_bytes(header, extra_field_length)?;

        Ok(Self {
            minimum_extract_version,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            path,
            extra_field,
        })
    }
}

/// Reads a whole local file header (name and extra field included) from a stream.
pub fn read_local_header<R: Read>(reader: &mut R) -> ArchiveResult<Vec<u8>> {
    let mut record = vec![0; LOCAL_FILE_HEADER_SIZE];
    reader.read_exact(&mut record)?;
    let signature = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
    if signature != LOCAL_FILE_HEADER_SIGNATURE {
        return Err(ArchiveError::format(format!(
            "Invalid local file header signature {:#010x}",
            signature
        )));
    }
    read_local_header_variable_part(reader, record)
}

/// Finishes reading a local file header whose fixed part is already in `record`.
pub fn read_local_header_variable_part<R: Read>(
    reader: &mut R,
    mut record: Vec<u8>,
) -> ArchiveResult<Vec<u8>> {
    debug_assert_eq!(record.len(), LOCAL_FILE_HEADER_SIZE);
    let path_length = u16::from_le_bytes([record[26], record[27]]) as usize;
    let extra_field_length = u16::from_le_bytes([record[28], record[29]]) as usize;
    record.resize(LOCAL_FILE_HEADER_SIZE + path_length + extra_field_length, 0);
    reader.read_exact(&mut record[LOCAL_FILE_HEADER_SIZE..])?;
    Ok(record)
}

/// Writes a local file header for `entry`.
///
/// If `sizes_known` is false, the CRC and sizes go out as zeros to be
/// patched in or written to a data descriptor later.
/// If `zip64` is set, the legacy size fields get sentinels and the sizes go in
/// a Zip64 extra field placed first in the extra data.
///
/// Returns where the CRC and sizes landed, relative to the start of the header.
pub fn write_local_header<W: Write>(
    w: &mut W,
    entry: &ZipEntry,
    sizes_known: bool,
    zip64: bool,
) -> ArchiveResult<EntryPatchData> {
    let (crc32, size, compressed_size) = if sizes_known {
        (entry.crc32, entry.size, entry.compressed_size)
    } else {
        (0, 0, 0)
    };

    let (legacy_compressed, legacy_size) = if zip64 {
        (SENTINEL_32, SENTINEL_32)
    } else if size >= ZIP64_SIZE_THRESHOLD || compressed_size >= ZIP64_SIZE_THRESHOLD {
        return Err(ArchiveError::format(format!(
            "{} is too large for a local header without Zip64",
            entry.name
        )));
    } else {
        (compressed_size as u32, size as u32)
    };

    // 4.5.3: The order of the fields in the zip64 extended
    // information record is fixed, but the fields MUST
    // only appear if the corresponding Local or Central
    // directory record field is set to 0xFFFF or 0xFFFFFFFF.
    let zip64_info = zip64.then_some(Zip64ExtendedInfo {
        size: Some(size),
        compressed_size: Some(compressed_size),
        ..Default::default()
    });
    let extra = extra_with_zip64(zip64_info, &entry.extra_field)?;

    let name_length = u16_len(entry.raw_name.len(), "Entry name")?;
    let extra_length = u16_len(extra.len(), "Extra field")?;
    let (time, date) = time::to_msdos(&entry.last_modified);

    w.write_le_u32(LOCAL_FILE_HEADER_SIGNATURE)?;
    w.write_le_u16(entry.version_needed)?;
    w.write_le_u16(entry.flags)?;
    w.write_le_u16(entry.compression_method.to_u16())?;
    w.write_le_u16(time)?;
    w.write_le_u16(date)?;
    w.write_le_u32(crc32)?;
    w.write_le_u32(legacy_compressed)?;
    w.write_le_u32(legacy_size)?;
    w.write_le_u16(name_length)?;
    w.write_le_u16(extra_length)?;
    w.write_all(&entry.raw_name)?;
    w.write_all(extra.as_bytes())?;

    let name_end = (LOCAL_FILE_HEADER_SIZE + entry.raw_name.len()) as u64;
    Ok(EntryPatchData {
        crc_offset: 14,
        // The Zip64 payload starts after its own tag and length.
        size_offset: if zip64 { name_end + 4 } else { 18 },
        zip64,
        header_len: name_end + extra.len() as u64,
    })
}

/// Fills in the CRC and sizes of a local header written with `sizes_known` unset.
///
/// The writer is returned to where it was afterwards.
pub fn patch_local_header<W: Write + Seek>(
    w: &mut W,
    header_offset: u64,
    patch: &EntryPatchData,
    data: &DescriptorData,
) -> ArchiveResult<()> {
    if !patch.zip64
        && (data.size >= ZIP64_SIZE_THRESHOLD || data.compressed_size >= ZIP64_SIZE_THRESHOLD)
    {
        return Err(ArchiveError::format(
            "Entry grew too large for its local header, which has no room for Zip64 sizes",
        ));
    }
    let resume = w.stream_position()?;

    w.seek(SeekFrom::Start(header_offset + patch.crc_offset))?;
    w.write_le_u32(data.crc32)?;

    w.seek(SeekFrom::Start(header_offset + patch.size_offset))?;
    if patch.zip64 {
        w.write_le_u64(data.size)?;
        w.write_le_u64(data.compressed_size)?;
    } else {
        w.write_le_u32(data.compressed_size as u32)?;
        w.write_le_u32(data.size as u32)?;
    }

    w.seek(SeekFrom::Start(resume))?;
    Ok(())
}

/// Writes a data descriptor, signature included. Returns its length.
///
/// 4.3.9.1 This descriptor MUST exist if bit 3 of the general
/// purpose bit flag is set (see below).  It is byte aligned
/// and immediately follows the last byte of compressed data.
/// [...] For ZIP64(tm) format archives, the compressed
/// and uncompressed sizes are 8 bytes each.
pub fn write_data_descriptor<W: Write>(
    w: &mut W,
    data: &DescriptorData,
    zip64: bool,
) -> ArchiveResult<u64> {
    w.write_le_u32(DATA_DESCRIPTOR_SIGNATURE)?;
    w.write_le_u32(data.crc32)?;
    if zip64 {
        w.write_le_u64(data.compressed_size)?;
        w.write_le_u64(data.size)?;
        Ok(24)
    } else {
        if data.size >= ZIP64_SIZE_THRESHOLD || data.compressed_size >= ZIP64_SIZE_THRESHOLD {
            return Err(ArchiveError::format(
                "Entry is too large for a data descriptor without Zip64",
            ));
        }
        w.write_le_u32(data.compressed_size as u32)?;
        w.write_le_u32(data.size as u32)?;
        Ok(16)
    }
}

/// Reads a data descriptor. Returns it and its length.
///
/// 4.3.9.3 Although not originally assigned a signature, the value
/// 0x08074b50 has commonly been adopted as a signature value
/// for the data descriptor record.
///
/// Without the signature we'd have to guess whether we're looking at a
/// CRC or a signature, so we insist on it.
pub fn read_data_descriptor<R: Read>(
    reader: &mut R,
    zip64: bool,
) -> ArchiveResult<(DescriptorData, u64)> {
    let signature = reader.read_le_u32()?;
    if signature != DATA_DESCRIPTOR_SIGNATURE {
        return Err(ArchiveError::format(format!(
            "Data descriptor is missing its signature (found {:#010x})",
            signature
        )));
    }
    let crc32 = reader.read_le_u32()?;
    let (compressed_size, size, len) = if zip64 {
        (reader.read_le_u64()?, reader.read_le_u64()?, 24)
    } else {
        (
            reader.read_le_u32()? as u64,
            reader.read_le_u32()? as u64,
            16,
        )
    };
    Ok((
        DescriptorData {
            crc32,
            compressed_size,
            size,
        },
        len,
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn sample_entry(name: &str) -> ZipEntry {
        ZipEntry {
            raw_name: name.as_bytes().to_vec(),
            name: name.to_owned(),
            version_made_by: VERSION_MADE_BY,
            version_needed: VERSION_DEFAULT,
            flags: 0,
            compression_method: CompressionMethod::Stored,
            last_modified: time::dos_epoch(),
            crc32: 0xd882_0481,
            compressed_size: 2,
            size: 2,
            header_offset: 0,
            disk_start: 0,
            internal_attributes: 0,
            external_attributes: 0,
            extra_field: ExtraField::new(),
            comment: Vec::new(),
        }
    }

    fn eocd_bytes(entries: u64, size: u64, offset: u64) -> Vec<u8> {
        let mut out = Vec::new();
        write_end_of_central_directory(&mut out, entries, size, offset, b"").unwrap();
        out
    }

    #[test]
    fn eocd_promotion_is_per_field() {
        // Nothing overflows: a plain EOCD.
        assert_eq!(eocd_bytes(3, 100, 200).len(), EOCD_SIZE);

        // Any one overflowing field is enough for Zip64 records.
        for (entries, size, offset) in [
            (0xffff, 100, 200),
            (3, 0xffff_ffff, 200),
            (3, 100, 0xffff_ffff),
        ] {
            let bytes = eocd_bytes(entries, size, offset);
            assert_eq!(
                bytes.len(),
                ZIP64_EOCD_SIZE + ZIP64_EOCD_LOCATOR_SIZE + EOCD_SIZE
            );
            let zip64 = Zip64EndOfCentralDirectory::parse(&bytes[..ZIP64_EOCD_SIZE]).unwrap();
            assert_eq!(zip64.entries, entries);
            assert_eq!(zip64.central_directory_size, size);
            assert_eq!(zip64.central_directory_offset, offset);

            let locator = Zip64EndOfCentralDirectoryLocator::parse(
                &bytes[ZIP64_EOCD_SIZE..ZIP64_EOCD_SIZE + ZIP64_EOCD_LOCATOR_SIZE],
            )
            .unwrap()
            .unwrap();
            assert_eq!(locator.disk_with_central_directory, 0);
            assert_eq!(locator.zip64_eocdr_offset, offset + size);
            assert_eq!(locator.disks, 1);

            let eocd =
                EndOfCentralDirectory::parse(&bytes[ZIP64_EOCD_SIZE + ZIP64_EOCD_LOCATOR_SIZE..])
                    .unwrap();
            assert!(eocd.has_zip64_sentinels());
        }
    }

    #[test]
    fn just_under_the_limit_stays_legacy() {
        let bytes = eocd_bytes(0xfffe, 0xffff_fffe, 0xffff_fffe);
        let eocd = EndOfCentralDirectory::parse(&bytes).unwrap();
        assert_eq!(eocd.entries, 0xfffe);
        assert_eq!(eocd.central_directory_size, 0xffff_fffe);
        assert!(!eocd.has_zip64_sentinels());
    }

    #[test]
    fn extensible_data_is_unsupported() {
        let mut bytes = Vec::new();
        Zip64EndOfCentralDirectory {
            source_version: VERSION_MADE_BY,
            minimum_extract_version: VERSION_ZIP64,
            disk_number: 0,
            disk_with_central_directory: 0,
            entries_on_this_disk: 1,
            entries: 1,
            central_directory_size: 1,
            central_directory_offset: 1,
        }
        .write(&mut bytes)
        .unwrap();
        bytes[4] = 50;
        assert!(matches!(
            Zip64EndOfCentralDirectory::parse(&bytes),
            Err(ArchiveError::Unsupported(_))
        ));
    }

    #[test]
    fn locate_finds_last_signature() {
        let mut data = vec![0u8; 64];
        data[10..14].copy_from_slice(&EOCD_SIGNATURE.to_le_bytes());
        data[30..34].copy_from_slice(&EOCD_SIGNATURE.to_le_bytes());
        let mut cursor = Cursor::new(data);
        let found = locate_block_with_signature(&mut cursor, EOCD_SIGNATURE, 64, 22, 0xffff)
            .unwrap();
        assert_eq!(found, Some(34));
        assert_eq!(cursor.position(), 34);

        // A window that ends before the second copy only sees the first.
        let found = locate_block_with_signature(&mut cursor, EOCD_SIGNATURE, 40, 22, 0xffff)
            .unwrap();
        assert_eq!(found, Some(14));

        let found =
            locate_block_with_signature(&mut cursor, ZIP64_EOCD_SIGNATURE, 64, 22, 0xffff)
                .unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn eocd_signature_in_comment_is_skipped() {
        let mut comment = b"decoy: ".to_vec();
        comment.extend_from_slice(&EOCD_SIGNATURE.to_le_bytes());
        comment.extend_from_slice(b" more comment text after the fake magic");

        let mut archive = b"not really a central directory".to_vec();
        write_end_of_central_directory(&mut archive, 0, 0, 0, &comment).unwrap();
        let real_start = 30;

        let (start, record) = find_end_of_central_directory(&mut Cursor::new(archive)).unwrap();
        assert_eq!(start, real_start);
        let eocd = EndOfCentralDirectory::parse(&record).unwrap();
        assert_eq!(eocd.file_comment, &comment[..]);
    }

    #[test]
    fn trailing_junk_skips_decoys_in_the_comment() {
        // A directory with one (fake) header, then an EOCD whose comment
        // holds a second EOCD pointing at nonsense.
        let mut archive = b"local data".to_vec();
        let directory_start = archive.len() as u64;
        archive.extend_from_slice(&CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        archive.extend_from_slice(&[0u8; CENTRAL_DIRECTORY_HEADER_SIZE - 4]);
        let real_start = archive.len() as u64;

        let mut decoy = Vec::new();
        write_end_of_central_directory(&mut decoy, 1, 46, 3, b"").unwrap();
        let mut comment = b"decoy: ".to_vec();
        comment.extend_from_slice(&decoy);
        write_end_of_central_directory(
            &mut archive,
            1,
            CENTRAL_DIRECTORY_HEADER_SIZE as u64,
            directory_start,
            &comment,
        )
        .unwrap();
        archive.extend_from_slice(b"junk after the archive");

        let (start, record) = find_end_of_central_directory(&mut Cursor::new(archive)).unwrap();
        assert_eq!(start, real_start);
        let eocd = EndOfCentralDirectory::parse(&record).unwrap();
        assert_eq!(u64::from(eocd.central_directory_offset), directory_start);
        assert_eq!(eocd.file_comment, &comment[..]);
    }

    #[test]
    fn implausible_candidates_are_not_used() {
        // Claims a directory that would overlap the record itself.
        let mut archive = vec![0u8; 10];
        write_end_of_central_directory(&mut archive, 1, 46, 0, b"").unwrap();
        archive.extend_from_slice(b"junk");
        assert!(matches!(
            find_end_of_central_directory(&mut Cursor::new(archive)),
            Err(ArchiveError::Format(_))
        ));
    }

    #[test]
    fn missing_eocd_is_a_format_error() {
        let mut cursor = Cursor::new(vec![0u8; 100]);
        assert!(matches!(
            find_end_of_central_directory(&mut cursor),
            Err(ArchiveError::Format(_))
        ));
    }

    #[test]
    fn local_header_round_trip() {
        let entry = sample_entry("a.txt");
        let mut out = Vec::new();
        let patch = write_local_header(&mut out, &entry, true, false).unwrap();
        assert_eq!(patch.header_len, out.len() as u64);

        let mut slice = &out[..];
        let local = LocalFileHeader::parse_and_consume(&mut slice).unwrap();
        assert!(slice.is_empty());
        let parsed = ZipEntry::from_local_header(&local, 0, NameEncoding::Cp437).unwrap();
        assert_eq!(parsed.name, "a.txt");
        assert_eq!(parsed.crc32, 0xd882_0481);
        assert_eq!(parsed.size, 2);
        assert_eq!(parsed.compressed_size, 2);
        assert_eq!(parsed.compression_method, CompressionMethod::Stored);
    }

    #[test]
    fn patching_fills_in_deferred_values() {
        let entry = sample_entry("deferred");
        let data = DescriptorData {
            crc32: 0x1234_5678,
            compressed_size: 10,
            size: 20,
        };
        for zip64 in [false, true] {
            let mut cursor = Cursor::new(b"prefix".to_vec());
            cursor.seek(SeekFrom::End(0)).unwrap();
            let patch = write_local_header(&mut cursor, &entry, false, zip64).unwrap();
            cursor.write_all(b"payload").unwrap();
            patch_local_header(&mut cursor, 6, &patch, &data).unwrap();
            // The writer is back where it left off.
            assert_eq!(cursor.position(), cursor.get_ref().len() as u64);

            let bytes = cursor.into_inner();
            let mut slice = &bytes[6..];
            let local = LocalFileHeader::parse_and_consume(&mut slice).unwrap();
            assert_eq!(slice, b"payload");
            let parsed = ZipEntry::from_local_header(&local, 6, NameEncoding::Cp437).unwrap();
            assert_eq!(parsed.crc32, data.crc32);
            assert_eq!(parsed.size, data.size);
            assert_eq!(parsed.compressed_size, data.compressed_size);
            assert_eq!(local.extra_field.is_empty(), !zip64);
        }
    }

    #[test]
    fn central_header_promotes_only_what_overflows() {
        let mut entry = sample_entry("big");
        entry.size = 1 << 33;
        entry.header_offset = 5;
        let mut out = Vec::new();
        write_central_directory_header(&mut out, &entry).unwrap();

        let mut slice = &out[..];
        let cde = CentralDirectoryEntry::parse_and_consume(&mut slice).unwrap();
        assert_eq!(cde.uncompressed_size, 0xffff_ffff);
        assert_eq!(cde.compressed_size, 2);
        assert_eq!(cde.header_offset, 5);
        assert_eq!(cde.minimum_extract_version, VERSION_ZIP64);
        // Only the size is in the extra field.
        assert_eq!(cde.extra_field, &[1, 0, 8, 0, 0, 0, 0, 0, 2, 0, 0, 0]);

        let parsed = ZipEntry::from_cde(&cde, NameEncoding::Cp437).unwrap();
        assert_eq!(parsed.size, 1 << 33);
        assert_eq!(parsed.compressed_size, 2);
        assert_eq!(parsed.header_offset, 5);
    }

    #[test]
    fn multi_disk_entries_are_unsupported() {
        let entry = sample_entry("disk");
        let mut out = Vec::new();
        write_central_directory_header(&mut out, &entry).unwrap();
        out[34] = 2; // disk number start
        let cde = CentralDirectoryEntry::parse_and_consume(&mut &out[..]).unwrap();
        assert!(matches!(
            ZipEntry::from_cde(&cde, NameEncoding::Cp437),
            Err(ArchiveError::Unsupported(_))
        ));
    }

    #[test]
    fn descriptor_needs_its_signature() {
        let data = DescriptorData {
            crc32: 7,
            compressed_size: 8,
            size: 9,
        };
        for zip64 in [false, true] {
            let mut out = Vec::new();
            let len = write_data_descriptor(&mut out, &data, zip64).unwrap();
            assert_eq!(len, out.len() as u64);
            let (read, read_len) = read_data_descriptor(&mut &out[..], zip64).unwrap();
            assert_eq!(read, data);
            assert_eq!(read_len, len);

            assert!(matches!(
                read_data_descriptor(&mut &out[4..], zip64),
                Err(ArchiveError::Format(_))
            ));
        }
    }

    #[test]
    fn digital_signature_round_trip() {
        let mut out = Vec::new();
        DigitalSignature { data: b"sig" }.write(&mut out).unwrap();
        let mut slice = &out[..];
        let parsed = DigitalSignature::parse_and_consume(&mut slice).unwrap();
        assert_eq!(parsed.data, b"sig");
        assert!(slice.is_empty());
    }

    #[test]
    fn truncated_records_are_errors() {
        let mut out = Vec::new();
        write_central_directory_header(&mut out, &sample_entry("cut")).unwrap();
        out.truncate(out.len() - 1);
        assert!(matches!(
            CentralDirectoryEntry::parse_and_consume(&mut &out[..]),
            Err(ArchiveError::Truncated(_))
        ));
    }
}
