//! ziptar reads and writes the records underneath ZIP and tar archives.
//!
//! On the ZIP side, [`ZipWriter`](zip::ZipWriter) writes to seekable outputs
//! (patching each local header once its sizes are known) or to pipes
//! (following each entry with a data descriptor):
//!
//! ```no_run
//! # use std::fs::File;
//! # use ziptar::zip::*;
//! let mut writer = ZipWriter::new(File::create("foo.zip")?)?;
//! writer.add_entry("hello.txt", EntryOptions::default(), &mut &b"Hello!"[..])?;
//! writer.add_directory("empty/", EntryOptions::default())?;
//! writer.finish()?;
//!
//! // Or to something that can't seek:
//! let mut writer = ZipWriter::new_streaming(std::io::stdout());
//! writer.add_entry("hello.txt", EntryOptions::default(), &mut &b"Hello!"[..])?;
//! writer.finish()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! [`ZipArchive`](zip::ZipArchive) finds the central directory from the end
//! of a seekable input, while [`ZipStreamReader`](zip::ZipStreamReader)
//! walks local headers from the front of one that can't seek:
//!
//! ```no_run
//! # use std::fs::File;
//! # use std::io;
//! # use ziptar::zip::*;
//! let mut archive = ZipArchive::new(File::open("foo.zip")?)?;
//! for entry in archive.entries() {
//!     println!("{} ({} bytes)", entry.name, entry.size);
//! }
//! // The reader checks the CRC-32 once it reaches the end of the entry.
//! io::copy(&mut archive.read_by_name("hello.txt")?, &mut io::stdout())?;
//!
//! let mut stream = ZipStreamReader::new(io::stdin());
//! while let Some(entry) = stream.next_entry()? {
//!     println!("{}", entry.name);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Tar archives are written and read one entry at a time,
//! through a buffer that moves whole records of 512-byte blocks:
//!
//! ```no_run
//! # use std::fs::File;
//! # use std::io::{self, Read};
//! # use ziptar::tar::*;
//! let mut writer = TarWriter::new(File::create("foo.tar")?)?;
//! writer.append(&TarHeader::new("hello.txt", 6), &b"Hello!"[..])?;
//! writer.finish()?;
//!
//! let mut reader = TarReader::new(File::open("foo.tar")?)?;
//! while let Some(entry) = reader.next_entry()? {
//!     let mut contents = Vec::new();
//!     reader.read_to_end(&mut contents)?;
//!     println!("{}: {} bytes", entry.name, contents.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Compression is left to [flate2](https://docs.rs/flate2),
//! so only stored and deflated ZIP entries can be read or written.
//! Other methods, along with encrypted entries, show up in listings
//! but return [`ArchiveError::Unsupported`](result::ArchiveError::Unsupported)
//! when read.
//!
//! Nothing here consults process-wide settings: the encoding of names
//! and comments, the tar block factor, and the ZIP64 policy
//! are all passed in through option structs.

pub mod byte_order;
pub mod encoding;
pub mod entry_stream;
pub mod report;
pub mod result;
pub mod tar;
pub mod time;
pub mod zip;

mod arch;
mod crc_reader;

pub use encoding::NameEncoding;
pub use report::ArchiveReport;
pub use result::{ArchiveError, ArchiveResult};
