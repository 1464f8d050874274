//! The tar header block: field layout, numeric encodings, and checksums.
//!
//! POSIX ustar layout (offsets in bytes):
//!
//! ```text
//!   0  name      100     257  magic      6
//! 100  mode        8     263  version    2
//! 108  uid         8     265  uname     32
//! 116  gid         8     297  gname     32
//! 124  size       12     329  devmajor   8
//! 136  mtime      12     337  devminor   8
//! 148  chksum      8     345  prefix   155
//! 156  typeflag    1     500  (padding) 12
//! 157  linkname  100
//! ```
//!
//! Numbers are octal text, NUL- or space-terminated.
//! GNU tar stores values too big for that in base-256:
//! the first byte's high bit is set and the rest is a big-endian integer.

use std::ops::Range;

use chrono::NaiveDateTime;
use log::*;

use super::buffer::BLOCK_SIZE;
use crate::encoding::NameEncoding;
use crate::result::*;
use crate::time;

const NAME: Range<usize> = 0..100;
const MODE: Range<usize> = 100..108;
const UID: Range<usize> = 108..116;
const GID: Range<usize> = 116..124;
const SIZE: Range<usize> = 124..136;
const MTIME: Range<usize> = 136..148;
const CHECKSUM: Range<usize> = 148..156;
const TYPE_FLAG: usize = 156;
const LINK_NAME: Range<usize> = 157..257;
const MAGIC: Range<usize> = 257..263;
const VERSION: Range<usize> = 263..265;
const USER_NAME: Range<usize> = 265..297;
const GROUP_NAME: Range<usize> = 297..329;
const DEV_MAJOR: Range<usize> = 329..337;
const DEV_MINOR: Range<usize> = 337..345;
const PREFIX: Range<usize> = 345..500;

pub const NAME_LEN: usize = 100;
pub const PREFIX_LEN: usize = 155;

/// POSIX ustar magic and version
pub const USTAR_MAGIC: &[u8; 6] = b"ustar\0";
pub const USTAR_VERSION: &[u8; 2] = b"00";
/// What GNU tar writes instead
pub const GNU_MAGIC: &[u8; 6] = b"ustar ";
pub const GNU_VERSION: &[u8; 2] = b" \0";

/// The name GNU tar gives the pseudo-entries carrying long names
pub const GNU_LONG_LINK_NAME: &str = "././@LongLink";

/// The kind of thing an entry is, from the header's type flag.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntryType {
    Regular,
    /// A regular file from a pre-POSIX archive, flagged with a NUL
    OldRegular,
    HardLink,
    Symlink,
    CharDevice,
    BlockDevice,
    Directory,
    Fifo,
    Contiguous,
    /// PAX extended header for the next entry
    PaxExtended,
    /// PAX extended header for all following entries
    PaxGlobal,
    /// GNU long name for the next entry
    GnuLongName,
    /// GNU long link target for the next entry
    GnuLongLink,
    GnuVolumeHeader,
    GnuMultiVolume,
    GnuSparse,
    /// A flag this crate doesn't know, kept as-is
    Other(u8),
}

const ENTRY_TYPES: &[(u8, EntryType)] = &[
    (b'0', EntryType::Regular),
    (b'\0', EntryType::OldRegular),
    (b'1', EntryType::HardLink),
    (b'2', EntryType::Symlink),
    (b'3', EntryType::CharDevice),
    (b'4', EntryType::BlockDevice),
    (b'5', EntryType::Directory),
    (b'6', EntryType::Fifo),
    (b'7', EntryType::Contiguous),
    (b'x', EntryType::PaxExtended),
    (b'g', EntryType::PaxGlobal),
    (b'L', EntryType::GnuLongName),
    (b'K', EntryType::GnuLongLink),
    (b'V', EntryType::GnuVolumeHeader),
    (b'M', EntryType::GnuMultiVolume),
    (b'S', EntryType::GnuSparse),
];

impl EntryType {
    pub fn from_byte(flag: u8) -> Self {
        ENTRY_TYPES
            .iter()
            .find(|(b, _)| *b == flag)
            .map_or(EntryType::Other(flag), |(_, t)| *t)
    }

    pub fn to_byte(self) -> u8 {
        match self {
            EntryType::Other(flag) => flag,
            known => ENTRY_TYPES
                .iter()
                .find(|(_, t)| *t == known)
                .map_or(b'0', |(b, _)| *b),
        }
    }

    /// True for entries the reader hands to callers,
    /// as opposed to metadata for other entries or things it skips.
    pub fn is_visible(self) -> bool {
        matches!(
            self,
            EntryType::Regular
                | EntryType::OldRegular
                | EntryType::HardLink
                | EntryType::Symlink
                | EntryType::CharDevice
                | EntryType::BlockDevice
                | EntryType::Directory
                | EntryType::Fifo
                | EntryType::Contiguous
        )
    }
}

/// A decoded tar header.
///
/// `name` is the full path: the reader joins the ustar prefix onto it and
/// swaps in long names from GNU or PAX records, and the writer splits it
/// back up (or emits a long name record) as needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarHeader {
    pub name: String,
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    pub size: u64,
    /// Seconds since the Unix epoch
    pub mtime: u64,
    /// The checksum as stored; recomputed when writing
    pub checksum: u32,
    pub entry_type: EntryType,
    pub link_name: String,
    pub magic: [u8; 6],
    pub version: [u8; 2],
    pub user_name: String,
    pub group_name: String,
    pub dev_major: u32,
    pub dev_minor: u32,
}

impl TarHeader {
    /// A ustar header for a regular file
    pub fn new<S: Into<String>>(name: S, size: u64) -> Self {
        Self {
            name: name.into(),
            mode: 0o644,
            uid: 0,
            gid: 0,
            size,
            mtime: 0,
            checksum: 0,
            entry_type: EntryType::Regular,
            link_name: String::new(),
            magic: *USTAR_MAGIC,
            version: *USTAR_VERSION,
            user_name: String::new(),
            group_name: String::new(),
            dev_major: 0,
            dev_minor: 0,
        }
    }

    /// A ustar header for a directory. Adds the trailing slash if missing.
    pub fn new_directory<S: Into<String>>(name: S) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        Self {
            mode: 0o755,
            entry_type: EntryType::Directory,
            ..Self::new(name, 0)
        }
    }

    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Directory || self.name.ends_with('/')
    }

    pub fn is_file(&self) -> bool {
        matches!(
            self.entry_type,
            EntryType::Regular | EntryType::OldRegular | EntryType::Contiguous
        ) && !self.name.ends_with('/')
    }

    pub fn is_ustar(&self) -> bool {
        &self.magic == USTAR_MAGIC
    }

    pub fn modified(&self) -> Option<NaiveDateTime> {
        i64::try_from(self.mtime).ok().and_then(time::from_unix)
    }

    /// Sets the modification time, clamping anything before 1970 to the epoch.
    pub fn set_modified(&mut self, when: &NaiveDateTime) {
        self.mtime = u64::try_from(time::to_unix(when)).unwrap_or(0);
    }

    /// Decodes a header block, validating its checksum.
    pub fn parse(block: &[u8; BLOCK_SIZE], encoding: NameEncoding) -> ArchiveResult<Self> {
        let stored = parse_number(&block[CHECKSUM], "checksum")?;
        let (unsigned, signed) = checksums(block);
        if stored != u64::from(unsigned) {
            // Some old archivers summed the header as signed bytes.
            if i64::try_from(stored).ok() != Some(i64::from(signed)) {
                return Err(ArchiveError::format(format!(
                    "Header checksum is invalid (stored {:o}, computed {:o})",
                    stored, unsigned
                )));
            }
            warn!("Header checksum matches only as signed bytes");
        }

        let magic = field_array::<6>(block, MAGIC);
        let version = field_array::<2>(block, VERSION);

        let mut name = parse_text(&block[NAME], encoding)?;
        if &magic == USTAR_MAGIC {
            let prefix = parse_text(&block[PREFIX], encoding)?;
            if !prefix.is_empty() {
                name = format!("{}/{}", prefix, name);
            }
        }

        let header = Self {
            name,
            mode: narrow(parse_number(&block[MODE], "mode")?, "mode")?,
            uid: parse_number(&block[UID], "uid")?,
            gid: parse_number(&block[GID], "gid")?,
            size: parse_number(&block[SIZE], "size")?,
            mtime: parse_number(&block[MTIME], "mtime")?,
            // The stored value was < 8^7 to match either sum.
            checksum: stored as u32,
            entry_type: EntryType::from_byte(block[TYPE_FLAG]),
            link_name: parse_text(&block[LINK_NAME], encoding)?,
            magic,
            version,
            user_name: parse_text(&block[USER_NAME], encoding)?,
            group_name: parse_text(&block[GROUP_NAME], encoding)?,
            dev_major: narrow(parse_number(&block[DEV_MAJOR], "devmajor")?, "devmajor")?,
            dev_minor: narrow(parse_number(&block[DEV_MINOR], "devminor")?, "devminor")?,
        };
        trace!("{:?}", header);
        Ok(header)
    }

    /// Encodes the header into a block with a fresh checksum.
    ///
    /// A name too long for the name field is split across the ustar prefix
    /// at a `/` if it can be; otherwise this fails and the caller should
    /// emit a long name record first.
    pub fn to_block(&self, encoding: NameEncoding) -> ArchiveResult<[u8; BLOCK_SIZE]> {
        let mut block = [0u8; BLOCK_SIZE];

        let name = encoding.encode_exact(&self.name, "Name")?;
        match split_name(&name, &self.magic) {
            Some((prefix, rest)) => {
                block[PREFIX][..prefix.len()].copy_from_slice(prefix);
                block[NAME][..rest.len()].copy_from_slice(rest);
            }
            None => {
                return Err(ArchiveError::format(format!(
                    "Name {} doesn't fit in a tar header",
                    self.name
                )))
            }
        }

        write_number(&mut block[MODE], u64::from(self.mode));
        write_number(&mut block[UID], self.uid);
        write_number(&mut block[GID], self.gid);
        write_number(&mut block[SIZE], self.size);
        write_number(&mut block[MTIME], self.mtime);
        block[TYPE_FLAG] = self.entry_type.to_byte();
        write_text(&mut block[LINK_NAME], &self.link_name, "link name", encoding)?;
        block[MAGIC].copy_from_slice(&self.magic);
        block[VERSION].copy_from_slice(&self.version);
        write_text(&mut block[USER_NAME], &self.user_name, "user name", encoding)?;
        write_text(&mut block[GROUP_NAME], &self.group_name, "group name", encoding)?;
        write_number(&mut block[DEV_MAJOR], u64::from(self.dev_major));
        write_number(&mut block[DEV_MINOR], u64::from(self.dev_minor));

        // The checksum is computed with its own field as spaces,
        // then stored as six octal digits, a NUL, and a space.
        block[CHECKSUM].fill(b' ');
        let (sum, _) = checksums(&block);
        let digits = format!("{:06o}", sum);
        block[CHECKSUM.start..CHECKSUM.start + 6].copy_from_slice(digits.as_bytes());
        block[CHECKSUM.start + 6] = 0;
        Ok(block)
    }
}

/// Sums the header bytes as unsigned and as signed values,
/// counting the checksum field as eight spaces.
pub fn checksums(block: &[u8; BLOCK_SIZE]) -> (u32, i32) {
    let mut unsigned = 0u32;
    let mut signed = 0i32;
    for (i, &b) in block.iter().enumerate() {
        let b = if CHECKSUM.contains(&i) { b' ' } else { b };
        unsigned += u32::from(b);
        signed += i32::from(b as i8);
    }
    (unsigned, signed)
}

/// True if `name` fits in a header with the given magic,
/// by itself or split across the prefix.
pub fn name_fits(name: &str, magic: &[u8; 6], encoding: NameEncoding) -> bool {
    let (bytes, _) = encoding.encode(name);
    split_name(&bytes, magic).is_some()
}

/// Splits an encoded name into (prefix, name) fields.
/// Only POSIX ustar headers have a prefix.
fn split_name<'a>(name: &'a [u8], magic: &[u8; 6]) -> Option<(&'a [u8], &'a [u8])> {
    if name.len() <= NAME_LEN {
        return Some((&[], name));
    }
    if magic != USTAR_MAGIC || name.len() > PREFIX_LEN + 1 + NAME_LEN {
        return None;
    }
    // Take the longest prefix that fits, leaving a non-empty name.
    let last = name.len().min(PREFIX_LEN + 1);
    (1..last)
        .rev()
        .filter(|&i| name[i] == b'/')
        .map(|i| (&name[..i], &name[i + 1..]))
        .find(|(_, rest)| !rest.is_empty() && rest.len() <= NAME_LEN)
}

/// Parses a numeric field: octal text, or GNU base-256.
///
/// Leading spaces and trailing NULs or spaces are tolerated,
/// and an empty field is zero.
pub fn parse_number(field: &[u8], what: &str) -> ArchiveResult<u64> {
    if let Some(&first) = field.first() {
        if first & 0x80 != 0 {
            return parse_base256(field, what);
        }
    }
    let digits = field
        .iter()
        .skip_while(|&&b| b == b' ')
        .take_while(|&&b| b != 0 && b != b' ');
    let mut value = 0u64;
    for &b in digits {
        if !(b'0'..=b'7').contains(&b) {
            return Err(ArchiveError::format(format!(
                "Invalid octal digit {:?} in {} field",
                char::from(b),
                what
            )));
        }
        value = value
            .checked_mul(8)
            .map(|v| v + u64::from(b - b'0'))
            .ok_or_else(|| ArchiveError::format(format!("{} field overflows", what)))?;
    }
    Ok(value)
}

fn parse_base256(field: &[u8], what: &str) -> ArchiveResult<u64> {
    // 0xff leads a negative number, which no field here can hold.
    if field[0] & 0x40 != 0 {
        return Err(ArchiveError::format(format!(
            "Negative base-256 value in {} field",
            what
        )));
    }
    let mut value = u64::from(field[0] & 0x3f);
    for &b in &field[1..] {
        if value >> 56 != 0 {
            return Err(ArchiveError::format(format!("{} field overflows", what)));
        }
        value = (value << 8) | u64::from(b);
    }
    Ok(value)
}

/// Writes a numeric field as `len - 1` octal digits and a NUL,
/// or in base-256 if it needs more digits than that.
pub fn write_number(field: &mut [u8], value: u64) {
    let digits = field.len() - 1;
    let octal_limit = 1u64.checked_shl(3 * digits as u32).unwrap_or(u64::MAX);
    if value < octal_limit {
        let text = format!("{:0width$o}", value, width = digits);
        field[..digits].copy_from_slice(text.as_bytes());
        field[digits] = 0;
    } else {
        field.fill(0);
        let bytes = value.to_be_bytes();
        let len = field.len();
        // Every field is at least 8 bytes, so the low 7 bytes always fit.
        let take = bytes.len().min(len - 1);
        field[len - take..].copy_from_slice(&bytes[bytes.len() - take..]);
        field[0] |= 0x80;
    }
}

fn narrow(value: u64, what: &str) -> ArchiveResult<u32> {
    u32::try_from(value).map_err(|_| ArchiveError::format(format!("{} field overflows", what)))
}

fn field_array<const N: usize>(block: &[u8; BLOCK_SIZE], range: Range<usize>) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&block[range]);
    out
}

/// Decodes a NUL-terminated (or full-width) text field.
fn parse_text(field: &[u8], encoding: NameEncoding) -> ArchiveResult<String> {
    let end = memchr::memchr(0, field).unwrap_or(field.len());
    Ok(encoding.decode(&field[..end])?.into_owned())
}

fn write_text(
    field: &mut [u8],
    text: &str,
    what: &str,
    encoding: NameEncoding,
) -> ArchiveResult<()> {
    let bytes = encoding.encode_exact(text, what)?;
    if bytes.len() > field.len() {
        return Err(ArchiveError::format(format!(
            "{} {} doesn't fit in a tar header",
            what, text
        )));
    }
    field[..bytes.len()].copy_from_slice(&bytes);
    Ok(())
}
