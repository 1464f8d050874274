//! Text encodings for entry names and comments.
//!
//! Archives predating UTF-8 stored names in whatever code page the archiver
//! ran under, which for ZIP is almost always IBM code page 437.
//! Rather than consult some process-wide default, every decode and encode
//! takes the encoding explicitly.

use std::borrow::Cow;

use codepage_437::*;

use crate::result::*;

/// How to interpret name and comment bytes that aren't flagged as UTF-8.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum NameEncoding {
    /// IBM PC code page 437, the ZIP format's historical default
    #[default]
    Cp437,
    /// UTF-8, which is what tar archives and modern ZIP tools use
    Utf8,
}

impl NameEncoding {
    /// Decodes `bytes` as text.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> ArchiveResult<Cow<'a, str>> {
        match self {
            NameEncoding::Utf8 => Ok(Cow::Borrowed(std::str::from_utf8(bytes)?)),
            NameEncoding::Cp437 => Ok(Cow::borrow_from_cp437(bytes, &CP437_CONTROL)),
        }
    }

    /// Encodes `text`, returning its bytes and whether they had to be UTF-8.
    ///
    /// ASCII is the same in every supported encoding, so it is never
    /// reported as UTF-8. CP437 falls back to UTF-8 for characters it
    /// can't represent.
    pub fn encode<'a>(&self, text: &'a str) -> (Cow<'a, [u8]>, bool) {
        if text.is_ascii() {
            return (Cow::Borrowed(text.as_bytes()), false);
        }
        match self {
            NameEncoding::Utf8 => (Cow::Borrowed(text.as_bytes()), true),
            NameEncoding::Cp437 => match encode_cp437(text) {
                Some(bytes) => (bytes, false),
                None => (Cow::Borrowed(text.as_bytes()), true),
            },
        }
    }

    /// Encodes `text` in exactly this encoding,
    /// for fields that have no flag to mark a UTF-8 fallback.
    pub fn encode_exact<'a>(&self, text: &'a str, what: &str) -> ArchiveResult<Cow<'a, [u8]>> {
        match self.encode(text) {
            (_, true) if *self == NameEncoding::Cp437 => Err(ArchiveError::format(format!(
                "{} {:?} can't be represented in code page 437",
                what, text
            ))),
            (bytes, _) => Ok(bytes),
        }
    }
}

fn encode_cp437(text: &str) -> Option<Cow<'_, [u8]>> {
    text.to_cp437(&CP437_CONTROL).ok()
}
