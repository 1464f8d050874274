//! The ZIP "extra field": tagged sub-blocks attached to local
//! and central directory headers.
//!
//! 4.5.1 In order to allow different programs and different types
//! of information to be stored in the 'extra' field in .ZIP
//! files, the following structure MUST be used for all
//! programs storing data in this field:
//!
//! ```text
//! header1+data1 + header2+data2 . . .
//! ```
//!
//! Each header MUST consist of:
//!
//! ```text
//! Header ID - 2 bytes
//! Data Size - 2 bytes
//! ```
//!
//! Tags this module doesn't understand are carried around byte-for-byte.

use chrono::NaiveDateTime;
use log::*;

use crate::arch::u16_len;
use crate::byte_order::*;
use crate::result::*;
use crate::time;

/// Zip64 extended information
pub const ZIP64_TAG: u16 = 0x0001;
/// NTFS timestamps
pub const NTFS_TAG: u16 = 0x000a;
/// Info-ZIP extended timestamp (Unix times)
pub const EXTENDED_TIMESTAMP_TAG: u16 = 0x5455;
/// WinZip AES encryption
pub const AES_TAG: u16 = 0x9901;

/// One tagged sub-block of an extra field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtraRecord<'a> {
    pub tag: u16,
    pub payload: &'a [u8],
}

/// Lazily walks the sub-blocks of an extra field.
///
/// Cloning the iterator restarts from wherever it currently is.
/// A sub-block whose declared length runs past the end of the buffer
/// yields an error, after which the iterator is done.
#[derive(Debug, Clone)]
pub struct ExtraFieldIter<'a> {
    rest: &'a [u8],
}

/// Parses `bytes` as a sequence of extra field sub-blocks.
pub fn parse(bytes: &[u8]) -> ExtraFieldIter<'_> {
    ExtraFieldIter { rest: bytes }
}

impl<'a> Iterator for ExtraFieldIter<'a> {
    type Item = ArchiveResult<ExtraRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        // Trailing padding shorter than a header is ignored.
        if self.rest.len() < 4 {
            return None;
        }
        let mut cursor = self.rest;
        let parsed = read_u16(&mut cursor).and_then(|tag| {
            let len = read_u16(&mut cursor)? as usize;
            if len > cursor.len() {
                return Err(ArchiveError::format(format!(
                    "Extra field {tag:#06x} claims {len} bytes, but only {} remain",
                    cursor.len()
                )));
            }
            let (payload, rest) = cursor.split_at(len);
            cursor = rest;
            Ok(ExtraRecord { tag, payload })
        });
        self.rest = if parsed.is_ok() { cursor } else { &[] };
        Some(parsed)
    }
}

/// An owned, validated extra field block.
///
/// Every sub-block is known to fit inside the buffer,
/// and the whole block fits the 16-bit length ZIP headers give it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraField {
    data: Vec<u8>,
}

impl ExtraField {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `bytes` as an extra field.
    pub fn from_bytes<B: Into<Vec<u8>>>(bytes: B) -> ArchiveResult<Self> {
        let data = bytes.into();
        u16_len(data.len(), "Extra field")?;
        for record in parse(&data) {
            record?;
        }
        Ok(Self { data })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterates over the sub-blocks.
    pub fn records(&self) -> impl Iterator<Item = ExtraRecord<'_>> + Clone + '_ {
        // Validated on the way in
        parse(&self.data).filter_map(Result::ok)
    }

    /// Returns the payload of the first sub-block with the given tag.
    pub fn find(&self, tag: u16) -> Option<&[u8]> {
        self.records().find(|r| r.tag == tag).map(|r| r.payload)
    }

    pub fn contains(&self, tag: u16) -> bool {
        self.find(tag).is_some()
    }

    /// Removes every sub-block with the given tag,
    /// returning how many there were.
    pub fn delete(&mut self, tag: u16) -> usize {
        let mut kept = Vec::with_capacity(self.data.len());
        let mut removed = 0;
        for record in self.records() {
            if record.tag == tag {
                removed += 1;
            } else {
                push_record(&mut kept, record.tag, record.payload);
            }
        }
        self.data = kept;
        removed
    }

    /// Appends a sub-block.
    pub fn push(&mut self, tag: u16, payload: &[u8]) -> ArchiveResult<()> {
        u16_len(payload.len(), "Extra field record")?;
        u16_len(self.data.len() + 4 + payload.len(), "Extra field")?;
        push_record(&mut self.data, tag, payload);
        Ok(())
    }

    /// Replaces all sub-blocks with the given tag with a single new one.
    pub fn replace(&mut self, tag: u16, payload: &[u8]) -> ArchiveResult<()> {
        let backup = self.data.clone();
        self.delete(tag);
        self.push(tag, payload).map_err(|e| {
            self.data = backup;
            e
        })
    }

    /// Reads the Zip64 extended information, if present.
    ///
    /// `wanted` names the header fields that held a sentinel,
    /// since only those appear in the sub-block.
    pub fn zip64(&self, wanted: Zip64Fields) -> Option<Zip64ExtendedInfo> {
        self.find(ZIP64_TAG)
            .map(|payload| Zip64ExtendedInfo::parse(payload, wanted))
    }

    pub fn ntfs_times(&self) -> ArchiveResult<Option<NtfsTimes>> {
        self.find(NTFS_TAG).map(NtfsTimes::parse).transpose()
    }

    pub fn extended_timestamp(&self) -> Option<ExtendedTimestamp> {
        self.find(EXTENDED_TIMESTAMP_TAG)
            .map(ExtendedTimestamp::parse)
    }

    pub fn aes(&self) -> ArchiveResult<Option<AesExtra>> {
        self.find(AES_TAG).map(AesExtra::parse).transpose()
    }

    /// Decodes every sub-block into its typed form.
    pub fn decode_all(&self) -> impl Iterator<Item = ArchiveResult<ExtraData<'_>>> + '_ {
        self.records().map(decode)
    }
}

fn push_record(data: &mut Vec<u8>, tag: u16, payload: &[u8]) {
    data.extend_from_slice(&tag.to_le_bytes());
    data.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    data.extend_from_slice(payload);
}

/// Builds the payload of one new sub-block.
///
/// Build a fresh one for each record; [`commit()`](Self::commit)
/// consumes it into the target field.
#[derive(Debug, Default)]
pub struct ExtraRecordBuilder {
    payload: Vec<u8>,
}

impl ExtraRecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_u8(mut self, v: u8) -> Self {
        self.payload.push(v);
        self
    }

    pub fn add_u16(mut self, v: u16) -> Self {
        self.payload.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn add_u32(mut self, v: u32) -> Self {
        self.payload.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn add_u64(mut self, v: u64) -> Self {
        self.payload.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn add_bytes(mut self, bytes: &[u8]) -> Self {
        self.payload.extend_from_slice(bytes);
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Appends the record to `field` under the given tag.
    pub fn commit(self, tag: u16, field: &mut ExtraField) -> ArchiveResult<()> {
        field.push(tag, &self.payload)
    }

    /// Like `commit()`, but replaces any existing records with the same tag.
    pub fn commit_replacing(self, tag: u16, field: &mut ExtraField) -> ArchiveResult<()> {
        field.replace(tag, &self.payload)
    }
}

/// Which header fields held a Zip64 sentinel,
/// and so should be looked for in the Zip64 extra field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64Fields {
    pub size: bool,
    pub compressed_size: bool,
    pub header_offset: bool,
    pub disk_start: bool,
}

impl Zip64Fields {
    pub fn all() -> Self {
        Self {
            size: true,
            compressed_size: true,
            header_offset: true,
            disk_start: true,
        }
    }

    pub fn any(&self) -> bool {
        self.size || self.compressed_size || self.header_offset || self.disk_start
    }
}

/// Values from the Zip64 extended information extra field.
///
/// `None` means the field wasn't wanted or wasn't there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64ExtendedInfo {
    pub size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub header_offset: Option<u64>,
    pub disk_start: Option<u32>,
}

impl Zip64ExtendedInfo {
    /// Parses the wanted fields, in order, for as long as the payload lasts.
    ///
    /// 4.5.3 -Zip64 Extended Information Extra Field (0x0001):
    ///
    ///   Original Size  8 bytes  Original uncompressed file size
    ///   Compressed Size 8 bytes Size of compressed data
    ///   Relative Header Offset 8 bytes Offset of local header record
    ///   Disk Start Number 4 bytes Number of the disk on which this file starts
    ///
    /// Some archivers write a shorter sub-block than the header's sentinels
    /// call for. Those trailing fields come back as `None` with a warning
    /// rather than failing the whole entry.
    pub fn parse(mut payload: &[u8], wanted: Zip64Fields) -> Self {
        let mut info = Self::default();
        let mut truncated = false;

        if wanted.size {
            info.size = read_u64(&mut payload).ok();
            truncated |= info.size.is_none();
        }
        if wanted.compressed_size && !truncated {
            info.compressed_size = read_u64(&mut payload).ok();
            truncated |= info.compressed_size.is_none();
        }
        if wanted.header_offset && !truncated {
            info.header_offset = read_u64(&mut payload).ok();
            truncated |= info.header_offset.is_none();
        }
        if wanted.disk_start && !truncated {
            info.disk_start = read_u32(&mut payload).ok();
            truncated |= info.disk_start.is_none();
        }
        if truncated {
            warn!(
                "Zip64 extra field is shorter than its header calls for; parsed {:?}",
                info
            );
        }
        info
    }

    /// Serializes the fields that are present, in order.
    pub fn to_builder(&self) -> ExtraRecordBuilder {
        let mut builder = ExtraRecordBuilder::new();
        if let Some(size) = self.size {
            builder = builder.add_u64(size);
        }
        if let Some(compressed_size) = self.compressed_size {
            builder = builder.add_u64(compressed_size);
        }
        if let Some(header_offset) = self.header_offset {
            builder = builder.add_u64(header_offset);
        }
        if let Some(disk_start) = self.disk_start {
            builder = builder.add_u32(disk_start);
        }
        builder
    }
}

/// Times from the NTFS extra field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtfsTimes {
    pub modified: NaiveDateTime,
    pub accessed: NaiveDateTime,
    pub created: NaiveDateTime,
}

impl NtfsTimes {
    /// 4.5.5 -NTFS Extra Field (0x000a):
    ///
    ///   Reserved      4 bytes    Reserved for future use
    ///   Tag1          2 bytes    NTFS attribute tag value #1
    ///   Size1         2 bytes    Size of attribute #1, in bytes
    ///   (var)         Size1      Attribute #1 data
    ///
    /// Attribute tag 1 holds the modification, access, and creation times.
    /// Returns `Ok(None)` if there's no such attribute.
    pub fn parse_attributes(mut payload: &[u8]) -> ArchiveResult<Option<Self>> {
        let _reserved = read_u32(&mut payload)?;
        while payload.len() >= 4 {
            let tag = read_u16(&mut payload)?;
            let len = read_u16(&mut payload)? as usize;
            let mut attribute = read_bytes(&mut payload, len).map_err(|_| {
                ArchiveError::format("NTFS extra field attribute runs past its sub-block")
            })?;
            if tag == 1 && len >= 24 {
                return Ok(Some(Self {
                    modified: time::from_filetime(read_u64(&mut attribute)?),
                    accessed: time::from_filetime(read_u64(&mut attribute)?),
                    created: time::from_filetime(read_u64(&mut attribute)?),
                }));
            }
        }
        Ok(None)
    }

    fn parse(payload: &[u8]) -> ArchiveResult<Self> {
        Self::parse_attributes(payload)?
            .ok_or_else(|| ArchiveError::format("NTFS extra field has no timestamp attribute"))
    }

    pub fn to_builder(&self) -> ExtraRecordBuilder {
        ExtraRecordBuilder::new()
            .add_u32(0)
            .add_u16(1)
            .add_u16(24)
            .add_u64(time::to_filetime(&self.modified))
            .add_u64(time::to_filetime(&self.accessed))
            .add_u64(time::to_filetime(&self.created))
    }
}

/// Times from the Info-ZIP extended timestamp extra field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtendedTimestamp {
    pub modified: Option<NaiveDateTime>,
    pub accessed: Option<NaiveDateTime>,
    pub created: Option<NaiveDateTime>,
}

impl ExtendedTimestamp {
    const MODIFIED: u8 = 0x01;
    const ACCESSED: u8 = 0x02;
    const CREATED: u8 = 0x04;

    /// Flags byte, then a 32-bit Unix time for each flag bit set.
    ///
    /// Central directory copies set the same flags as the local header
    /// but only carry the modification time, so a time is only read
    /// if there are bytes left for it.
    pub fn parse(mut payload: &[u8]) -> Self {
        let mut times = Self::default();
        let Ok(flags) = read_bytes(&mut payload, 1).map(|b| b[0]) else {
            return times;
        };
        let mut next_time = |flag: u8| -> Option<NaiveDateTime> {
            if flags & flag == 0 {
                return None;
            }
            let seconds = read_u32(&mut payload).ok()? as i32;
            time::from_unix(seconds as i64)
        };
        times.modified = next_time(Self::MODIFIED);
        times.accessed = next_time(Self::ACCESSED);
        times.created = next_time(Self::CREATED);
        times
    }

    pub fn to_builder(&self) -> ExtraRecordBuilder {
        let mut flags = 0;
        let mut seconds = Vec::new();
        for (flag, when) in [
            (Self::MODIFIED, self.modified),
            (Self::ACCESSED, self.accessed),
            (Self::CREATED, self.created),
        ] {
            if let Some(when) = when {
                flags |= flag;
                seconds.push(time::to_unix(&when) as i32 as u32);
            }
        }
        seconds
            .into_iter()
            .fold(ExtraRecordBuilder::new().add_u8(flags), |b, s| b.add_u32(s))
    }
}

/// The WinZip AES extra field, which records the real compression method
/// of an AES-encrypted entry (whose header says method 99).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesExtra {
    /// 1 for AE-1, 2 for AE-2
    pub vendor_version: u16,
    /// Always "AE"
    pub vendor_id: [u8; 2],
    /// 1, 2, or 3 for 128, 192, or 256-bit keys
    pub strength: u8,
    pub compression_method: u16,
}

impl AesExtra {
    pub fn parse(mut payload: &[u8]) -> ArchiveResult<Self> {
        if payload.len() < 7 {
            return Err(ArchiveError::format(format!(
                "AES extra field is {} bytes, expected 7",
                payload.len()
            )));
        }
        let vendor_version = read_u16(&mut payload)?;
        let id = read_bytes(&mut payload, 2)?;
        let strength = read_bytes(&mut payload, 1)?[0];
        let compression_method = read_u16(&mut payload)?;
        Ok(Self {
            vendor_version,
            vendor_id: [id[0], id[1]],
            strength,
            compression_method,
        })
    }

    /// AES key length in bits
    pub fn key_bits(&self) -> Option<u32> {
        match self.strength {
            1 => Some(128),
            2 => Some(192),
            3 => Some(256),
            _ => None,
        }
    }

    pub fn to_builder(&self) -> ExtraRecordBuilder {
        ExtraRecordBuilder::new()
            .add_u16(self.vendor_version)
            .add_bytes(&self.vendor_id)
            .add_u8(self.strength)
            .add_u16(self.compression_method)
    }
}

/// A sub-block decoded according to its tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraData<'a> {
    /// Parsed by length alone, since there's no header to say which fields are present
    Zip64(Zip64ExtendedInfo),
    Ntfs(NtfsTimes),
    ExtendedTimestamp(ExtendedTimestamp),
    Aes(AesExtra),
    /// Anything we don't interpret, kept as-is
    Opaque(ExtraRecord<'a>),
}

type Decoder = fn(&[u8]) -> ArchiveResult<ExtraData<'_>>;

fn decode_zip64(payload: &[u8]) -> ArchiveResult<ExtraData<'_>> {
    let wanted = Zip64Fields {
        size: !payload.is_empty(),
        compressed_size: payload.len() >= 16,
        header_offset: payload.len() >= 24,
        disk_start: payload.len() >= 28,
    };
    Ok(ExtraData::Zip64(Zip64ExtendedInfo::parse(payload, wanted)))
}

fn decode_ntfs(payload: &[u8]) -> ArchiveResult<ExtraData<'_>> {
    NtfsTimes::parse(payload).map(ExtraData::Ntfs)
}

fn decode_extended_timestamp(payload: &[u8]) -> ArchiveResult<ExtraData<'_>> {
    Ok(ExtraData::ExtendedTimestamp(ExtendedTimestamp::parse(payload)))
}

fn decode_aes(payload: &[u8]) -> ArchiveResult<ExtraData<'_>> {
    AesExtra::parse(payload).map(ExtraData::Aes)
}

const DECODERS: &[(u16, Decoder)] = &[
    (ZIP64_TAG, decode_zip64),
    (NTFS_TAG, decode_ntfs),
    (EXTENDED_TIMESTAMP_TAG, decode_extended_timestamp),
    (AES_TAG, decode_aes),
];

/// Decodes a sub-block with the handler for its tag,
/// or passes it through as opaque bytes.
pub fn decode(record: ExtraRecord<'_>) -> ArchiveResult<ExtraData<'_>> {
    match DECODERS.iter().find(|(tag, _)| *tag == record.tag) {
        Some((_, decoder)) => decoder(record.payload),
        None => Ok(ExtraData::Opaque(record)),
    }
}
