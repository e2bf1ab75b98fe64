//! Errors surfaced to callers.
//!
//! Compression never fails under correct usage: a codec failure while
//! compressing into a correctly sized buffer is a bug and panics instead of
//! showing up here. Decompression and the stream endpoints report through
//! [`Error`].

use std::io;

use thiserror::Error;

use crate::zstd::ErrorCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The compressed input is corrupt, truncated inside a block, or needs a
    /// different dictionary.
    #[error("decompression error: {0}")]
    Decompress(ErrorCode),

    /// The input does not start with a valid frame header.
    #[error("cannot decompress invalid src")]
    InvalidSource,

    /// The upstream ended in the middle of a frame.
    #[error("unexpected end of compressed stream")]
    Truncated,

    /// The decoded size announced by a frame does not fit in memory.
    #[error("frame content size {0} does not fit in memory")]
    ContentTooLarge(u64),

    #[error("dictionary cannot be empty")]
    EmptyDictionary,

    #[error("cannot initialize codec context: {0}")]
    InitContext(ErrorCode),

    #[error("cannot set compression parameter: {0}")]
    Parameter(ErrorCode),

    /// The reader or source feeding compressed/plain data failed.
    #[error("cannot read data from the underlying reader: {0}")]
    Read(#[source] io::Error),

    /// The writer receiving compressed/plain data failed.
    #[error("cannot flush internal buffer to the underlying writer: {0}")]
    Write(#[source] io::Error),

    #[error("the writer is closed")]
    Closed,
}

impl Error {
    /// The frame was produced with a different (or no) dictionary.
    pub fn is_dictionary_mismatch(&self) -> bool {
        matches!(self, Error::Decompress(code) if code.is_dictionary_mismatch())
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::Read(inner) | Error::Write(inner) => inner.kind(),
            Error::Decompress(_) | Error::InvalidSource | Error::ContentTooLarge(_) => {
                io::ErrorKind::InvalidData
            }
            Error::Truncated => io::ErrorKind::UnexpectedEof,
            Error::EmptyDictionary | Error::Parameter(_) => io::ErrorKind::InvalidInput,
            Error::InitContext(_) | Error::Closed => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
