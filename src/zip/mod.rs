//! ZIP archives: reading from a central directory or a stream,
//! and writing to seekable or forward-only outputs.

pub mod entry;
pub mod extra;
pub mod read;
pub mod spec;
pub mod write;

pub use entry::{CompressionMethod, HostSystem, ZipEntry, ZipVersion};
pub use extra::ExtraField;
pub use read::{ZipArchive, ZipReadOptions, ZipStreamReader};
pub use write::{EntryOptions, Seekable, Streaming, Zip64Mode, ZipSink, ZipWriteOptions, ZipWriter};
