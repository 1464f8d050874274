//! Metadata for a member of a ZIP archive.

use std::borrow::Cow;

use camino::Utf8Path;
use chrono::NaiveDateTime;

use crate::encoding::NameEncoding;
use crate::result::*;
use crate::zip::extra::ExtraField;

/// General purpose bit flags we care about
pub mod flags {
    /// Bit 0: If set, indicates that the file is encrypted
    pub const ENCRYPTED: u16 = 1 << 0;
    /// Bit 3: CRC-32 and sizes are zero in the local header
    /// and follow the data in a data descriptor.
    pub const DATA_DESCRIPTOR: u16 = 1 << 3;
    /// Bit 11: Language encoding flag (EFS). If this bit is set,
    /// the filename and comment fields for this file
    /// MUST be encoded using UTF-8.
    pub const UTF8: u16 = 1 << 11;
}

/// Values at or past this don't fit in 32-bit size and offset fields.
pub const ZIP64_SIZE_THRESHOLD: u64 = 0xffff_ffff;

/// The compression method used to store a file
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    /// The file is uncompressed
    Stored,
    /// The file is [DEFLATE](https://en.wikipedia.org/wiki/DEFLATE)d.
    /// This is the most common format used by ZIP archives.
    Deflated,
    /// Deflate with a 64K window
    Deflate64,
    BZip2,
    /// WinZip AES encryption wrapping some other method,
    /// found in the AES extra field.
    Aes,
    /// The file is compressed with a yet-unsupported format.
    /// (The u16 indicates the internal format code.)
    Unsupported(u16),
}

impl CompressionMethod {
    pub fn from_u16(u: u16) -> Self {
        match u {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflated,
            9 => CompressionMethod::Deflate64,
            12 => CompressionMethod::BZip2,
            99 => CompressionMethod::Aes,
            v => CompressionMethod::Unsupported(v),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflated => 8,
            CompressionMethod::Deflate64 => 9,
            CompressionMethod::BZip2 => 12,
            CompressionMethod::Aes => 99,
            CompressionMethod::Unsupported(v) => v,
        }
    }

    /// True if we can compress and decompress this method
    pub fn is_supported(self) -> bool {
        matches!(self, CompressionMethod::Stored | CompressionMethod::Deflated)
    }
}

/// The OS a file in the archive was compressed with.
/// Used to decode additional metadata like permissions
///
/// 4.4.2.2 The current mappings are:
///
///  0 - MS-DOS and OS/2 (FAT / VFAT / FAT32 file systems)
///  1 - Amiga                     2 - OpenVMS
///  3 - UNIX                      4 - VM/CMS
///  5 - Atari ST                  6 - OS/2 H.P.F.S.
///  7 - Macintosh                 8 - Z-System
///  9 - CP/M                     10 - Windows NTFS
/// 11 - MVS (OS/390 - Z/OS)      12 - VSE
/// 13 - Acorn Risc               14 - VFAT
/// 15 - alternate MVS            16 - BeOS
/// 17 - Tandem                   18 - OS/400
/// 19 - OS X (Darwin)            20 thru 255 - unused
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostSystem {
    Dos,
    Amiga,
    OpenVms,
    Unix,
    VmCms,
    AtariSt,
    Os2Hpfs,
    Macintosh,
    ZSystem,
    CpM,
    WindowsNtfs,
    Mvs,
    Vse,
    AcornRisc,
    Vfat,
    AlternateMvs,
    BeOs,
    Tandem,
    Os400,
    Darwin,
    Unknown(u8),
}

const HOST_SYSTEMS: [HostSystem; 20] = [
    HostSystem::Dos,
    HostSystem::Amiga,
    HostSystem::OpenVms,
    HostSystem::Unix,
    HostSystem::VmCms,
    HostSystem::AtariSt,
    HostSystem::Os2Hpfs,
    HostSystem::Macintosh,
    HostSystem::ZSystem,
    HostSystem::CpM,
    HostSystem::WindowsNtfs,
    HostSystem::Mvs,
    HostSystem::Vse,
    HostSystem::AcornRisc,
    HostSystem::Vfat,
    HostSystem::AlternateMvs,
    HostSystem::BeOs,
    HostSystem::Tandem,
    HostSystem::Os400,
    HostSystem::Darwin,
];

impl HostSystem {
    pub fn from_u8(v: u8) -> Self {
        HOST_SYSTEMS
            .get(v as usize)
            .copied()
            .unwrap_or(HostSystem::Unknown(v))
    }

    pub fn to_u8(self) -> u8 {
        match self {
            HostSystem::Unknown(v) => v,
            known => HOST_SYSTEMS.iter().position(|h| *h == known).unwrap_or(0) as u8,
        }
    }
}

/// A "version made by" or "version needed to extract" field
///
/// 4.4.2.1 The upper byte indicates the compatibility of the file
/// attribute information. [...]
/// 4.4.2.3 The lower byte indicates the ZIP specification version
/// (the version of this document) supported by the software
/// used to encode the file.  The value/10 indicates the major
/// version number, and the value mod 10 is the minor version number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZipVersion {
    pub host: HostSystem,
    pub major: u8,
    pub minor: u8,
}

impl ZipVersion {
    pub fn from_u16(v: u16) -> Self {
        let spec = (v & 0xff) as u8;
        Self {
            host: HostSystem::from_u8((v >> 8) as u8),
            major: spec / 10,
            minor: spec % 10,
        }
    }

    pub fn to_u16(self) -> u16 {
        ((self.host.to_u8() as u16) << 8) | (self.major as u16 * 10 + self.minor as u16)
    }
}

/// The spec version we claim to be made by (5.1)
pub const VERSION_MADE_BY: u16 = 51;
pub const VERSION_DEFAULT: u16 = 10;
pub const VERSION_DEFLATE: u16 = 20;
pub const VERSION_DEFLATE64: u16 = 21;
pub const VERSION_ZIP64: u16 = 45;
pub const VERSION_BZIP2: u16 = 46;
pub const VERSION_AES: u16 = 51;

/// Works out the minimum "version needed to extract" for an entry.
pub fn version_needed(method: CompressionMethod, zip64: bool, is_dir: bool) -> u16 {
    let method_version = match method {
        CompressionMethod::Aes => VERSION_AES,
        CompressionMethod::BZip2 => VERSION_BZIP2,
        CompressionMethod::Deflate64 => VERSION_DEFLATE64,
        CompressionMethod::Deflated => VERSION_DEFLATE,
        _ if is_dir => VERSION_DEFLATE,
        _ => VERSION_DEFAULT,
    };
    if zip64 {
        method_version.max(VERSION_ZIP64)
    } else {
        method_version
    }
}

/// MS-DOS directory attribute
pub const DOS_DIRECTORY_ATTRIBUTE: u32 = 0x10;

/// Metadata for a file or directory in the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// The name as it's stored in the archive
    pub raw_name: Vec<u8>,

    /// The name, decoded per the UTF-8 flag or the archive's legacy encoding
    pub name: String,

    pub version_made_by: u16,

    pub version_needed: u16,

    /// General purpose bit flags; see [`flags`](flags/index.html).
    pub flags: u16,

    /// Compression algorithm used to store the file
    pub compression_method: CompressionMethod,

    /// When the file was last modified, at DOS' 2-second precision
    pub last_modified: NaiveDateTime,

    /// The CRC-32 of the decompressed file
    pub crc32: u32,

    /// Compressed size of the file in bytes
    pub compressed_size: u64,

    /// Uncompressed size of the file in bytes
    pub size: u64,

    /// The offset to the local file header in the archive
    pub header_offset: u64,

    /// Which disk the entry starts on. Always zero for the archives we handle.
    pub disk_start: u32,

    pub internal_attributes: u16,

    pub external_attributes: u32,

    pub extra_field: ExtraField,

    /// The raw entry comment (central directory only)
    pub comment: Vec<u8>,
}

impl ZipEntry {
    /// Returns true if the given entry is a directory
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Returns true if the given entry is a file
    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & flags::ENCRYPTED != 0
    }

    /// True if the CRC and sizes follow the payload in a data descriptor
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & flags::DATA_DESCRIPTOR != 0
    }

    pub fn is_utf8(&self) -> bool {
        self.flags & flags::UTF8 != 0
    }

    pub fn path(&self) -> &Utf8Path {
        Utf8Path::new(&self.name)
    }

    pub fn made_by(&self) -> ZipVersion {
        ZipVersion::from_u16(self.version_made_by)
    }

    /// Unix mode bits, if the file was archived in a Unix OS.
    ///
    /// This library does _not_ try to convert DOS permission bits into
    /// roughly-equivalent Unix mode bits, or do other cross-OS handwaving.
    pub fn unix_mode(&self) -> Option<u32> {
        match self.made_by().host {
            HostSystem::Unix | HostSystem::Darwin => Some(self.external_attributes >> 16),
            _ => None,
        }
    }

    /// Decodes the entry comment, honoring the UTF-8 flag.
    pub fn comment_text(&self, encoding: NameEncoding) -> ArchiveResult<Cow<'_, str>> {
        effective_encoding(self.flags, encoding).decode(&self.comment)
    }

    /// True if any of the sizes or the offset needs Zip64 in a central directory header
    pub fn needs_zip64(&self) -> bool {
        self.size >= ZIP64_SIZE_THRESHOLD
            || self.compressed_size >= ZIP64_SIZE_THRESHOLD
            || self.header_offset >= ZIP64_SIZE_THRESHOLD
    }
}

/// The encoding to decode names with, given an entry's flags
pub fn effective_encoding(flags: u16, legacy: NameEncoding) -> NameEncoding {
    if flags & flags::UTF8 != 0 {
        NameEncoding::Utf8
    } else {
        legacy
    }
}

/// CRC and sizes of an entry, known only once its payload has been streamed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorData {
    pub crc32: u32,
    pub compressed_size: u64,
    pub size: u64,
}

/// Where in a local header the CRC and sizes live,
/// so they can be filled in once the payload has been written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryPatchData {
    /// Offset of the CRC-32 from the start of the local header
    pub crc_offset: u64,
    /// Offset of the sizes from the start of the local header.
    /// For Zip64 headers this points into the Zip64 extra field,
    /// where the uncompressed size comes first.
    pub size_offset: u64,
    /// True if the sizes are 64-bit values in the Zip64 extra field
    pub zip64: bool,
    /// Total length of the header, name and extra field included
    pub header_len: u64,
}
