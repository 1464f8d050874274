//! Error types and the related `Result<T>`

use std::io;

use thiserror::Error;

pub type ArchiveResult<T> = Result<T, ArchiveError>;

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// An error from underlying I/O
    #[error("I/O Error")]
    Io(#[source] io::Error),

    /// The archive contained data that violates its format:
    /// a bad checksum, a missing mandatory signature, a length running past
    /// the end of its buffer, or a field too wide for the format when writing.
    #[error("Invalid archive: {0}")]
    Format(String),

    /// The stream ended in the middle of a header or block.
    #[error("Truncated archive: {0}")]
    Truncated(&'static str),

    /// The archive uses a feature this crate doesn't handle
    /// (multi-disk archives, unknown compression methods, encryption, ...)
    #[error("Unsupported archive: {0}")]
    Unsupported(String),

    /// An operation was performed out of order,
    /// like writing payload before starting an entry.
    #[error("Invalid state: {0}")]
    State(&'static str),

    /// Decoding a UTF-8 name or comment failed
    #[error("Invalid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    /// A cast from a 64-bit int to a usize failed,
    /// probably on a 32-bit system.
    #[error("Archive too large for address space")]
    InsufficientAddressSpace,

    /// A ZIP archive was prepended with unknown bytes.
    /// [`ZipArchive::with_prepended_data()`] accepts these.
    ///
    /// [`ZipArchive::with_prepended_data()`]: ../zip/struct.ZipArchive.html#method.with_prepended_data
    #[error("Archive prepended with {0} unknown bytes")]
    PrependedWithUnknownBytes(u64),
}

impl ArchiveError {
    pub(crate) fn format<S: Into<String>>(msg: S) -> Self {
        ArchiveError::Format(msg.into())
    }

    /// Wraps the error for `Read` and `Write` impls, which can only return `io::Error`.
    ///
    /// I/O errors pass through untouched.
    pub fn into_io(self) -> io::Error {
        match self {
            ArchiveError::Io(e) => e,
            ArchiveError::Truncated(_) => io::Error::new(io::ErrorKind::UnexpectedEof, self),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }

    /// Recovers an `ArchiveError` that went through [`into_io()`](Self::into_io).
    pub fn from_io(e: io::Error) -> Self {
        let kind = e.kind();
        if e.get_ref().map_or(false, |inner| inner.is::<ArchiveError>()) {
            if let Some(Ok(archive_error)) = e
                .into_inner()
                .map(|inner| inner.downcast::<ArchiveError>())
            {
                return *archive_error;
            }
            return ArchiveError::Io(io::Error::from(kind));
        }
        if kind == io::ErrorKind::UnexpectedEof {
            return ArchiveError::Truncated("unexpected end of stream");
        }
        ArchiveError::Io(e)
    }
}

impl From<io::Error> for ArchiveError {
    fn from(e: io::Error) -> Self {
        ArchiveError::from_io(e)
    }
}
