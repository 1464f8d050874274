//! Tar archives: blocked records, headers, and sequential reading and writing.

pub mod buffer;
pub mod header;
pub mod pax;
pub mod read;
pub mod write;

pub use buffer::{TarBuffer, BLOCK_SIZE, DEFAULT_BLOCK_FACTOR};
pub use header::{EntryType, TarHeader};
pub use read::TarReader;
pub use write::TarWriter;

use crate::encoding::NameEncoding;

/// Settings shared by [`TarReader`] and [`TarWriter`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TarOptions {
    /// Blocks per physical record
    pub block_factor: usize,
    /// How names are stored. Tar has no flag for it; UTF-8 is the norm.
    pub encoding: NameEncoding,
}

impl Default for TarOptions {
    fn default() -> Self {
        Self {
            block_factor: DEFAULT_BLOCK_FACTOR,
            encoding: NameEncoding::Utf8,
        }
    }
}

impl TarOptions {
    pub fn block_factor(mut self, block_factor: usize) -> Self {
        self.block_factor = block_factor;
        self
    }

    pub fn encoding(mut self, encoding: NameEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}
