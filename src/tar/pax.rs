//! PAX extended headers.
//!
//! A PAX header's payload is a list of records, each formatted as
//! `"<length> <key>=<value>\n"`, where the length counts the whole record,
//! its own digits included. Keys and values are UTF-8.

use std::collections::BTreeMap;
use std::mem;

use log::*;

use super::header::TarHeader;
use crate::result::*;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    Length,
    Key,
    Value,
}

impl State {
    /// The byte that ends the current field
    fn terminator(self) -> u8 {
        match self {
            State::Length => b' ',
            State::Key => b'=',
            State::Value => b'\n',
        }
    }
}

/// Incrementally parses PAX records.
///
/// Input can be fed in arbitrary chunks, even ones that split a multi-byte
/// character: bytes are collected until a field ends, then decoded whole.
#[derive(Debug)]
pub struct PaxParser {
    state: State,
    field: Vec<u8>,
    key: String,
    headers: BTreeMap<String, String>,
    /// Fields that weren't valid UTF-8
    invalid_fields: usize,
}

impl Default for PaxParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PaxParser {
    pub fn new() -> Self {
        Self {
            state: State::Length,
            field: Vec::new(),
            key: String::new(),
            headers: BTreeMap::new(),
            invalid_fields: 0,
        }
    }

    /// Feeds more of the payload in.
    pub fn read(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if b != self.state.terminator() {
                self.field.push(b);
                continue;
            }
            let text = match String::from_utf8(mem::take(&mut self.field)) {
                Ok(text) => text,
                Err(e) => {
                    let text = String::from_utf8_lossy(e.as_bytes()).into_owned();
                    warn!("PAX record field {:?} isn't valid UTF-8", text);
                    self.invalid_fields += 1;
                    text
                }
            };
            self.state = match self.state {
                // The stated length is redundant with the newline.
                State::Length => State::Key,
                State::Key => {
                    self.key = text;
                    State::Value
                }
                State::Value => {
                    trace!("PAX {} = {}", self.key, text);
                    self.headers.insert(mem::take(&mut self.key), text);
                    State::Length
                }
            };
        }
    }

    /// The records parsed so far. Later duplicates replace earlier ones.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// How many fields had invalid UTF-8 replaced with U+FFFD
    pub fn invalid_fields(&self) -> usize {
        self.invalid_fields
    }

    pub fn into_headers(self) -> BTreeMap<String, String> {
        if self.state != State::Length || !self.field.is_empty() {
            warn!("PAX header ended in the middle of a record");
        }
        self.headers
    }
}

/// Formats a single record, working out its self-inclusive length.
pub fn format_record(key: &str, value: &str) -> String {
    // " key=value\n"
    let body = key.len() + value.len() + 3;
    let mut len = body + 1;
    while len != body + len.to_string().len() {
        len = body + len.to_string().len();
    }
    format!("{} {}={}\n", len, key, value)
}

fn parse_field<T: std::str::FromStr>(key: &str, value: &str) -> ArchiveResult<T> {
    value
        .parse()
        .map_err(|_| ArchiveError::format(format!("Invalid PAX {} value {:?}", key, value)))
}

/// Applies the records this crate understands to the header they precede.
///
/// `path`, `linkpath`, `size`, `mtime`, `uid`, `gid`, `uname`, and `gname`
/// override their header fields; anything else is ignored.
pub fn apply(headers: &BTreeMap<String, String>, header: &mut TarHeader) -> ArchiveResult<()> {
    for (key, value) in headers {
        match key.as_str() {
            "path" => header.name = value.clone(),
            "linkpath" => header.link_name = value.clone(),
            "size" => header.size = parse_field(key, value)?,
            "uid" => header.uid = parse_field(key, value)?,
            "gid" => header.gid = parse_field(key, value)?,
            "uname" => header.user_name = value.clone(),
            "gname" => header.group_name = value.clone(),
            "mtime" => {
                // Fractional seconds are allowed; keep the whole part.
                let whole = value.split('.').next().unwrap_or_default();
                header.mtime = parse_field(key, whole)?;
            }
            other => debug!("Ignoring PAX record {}", other),
        }
    }
    Ok(())
}
