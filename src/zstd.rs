//! Thin binding of the native `zstd` codec.
//!
//! Everything that touches `zstd_safe` directly lives here, so the rest of the
//! crate only sees [`ErrorCode`], the block traits and the stream steps.

use std::fmt;

pub use zstd::compression_level_range;
pub use zstd::zstd_safe::compress_bound;
use zstd::zstd_safe::{self, CCtx, CDict, DCtx, DDict, InBuffer, OutBuffer, ResetDirective};

/// The level used when the caller does not pick one, `ZSTD_CLEVEL_DEFAULT`.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// The minimum value of the window log parameter.
pub const WINDOW_LOG_MIN: u32 = 10;
/// The maximum value of the window log parameter on 32-bit targets.
pub const WINDOW_LOG_MAX_32: u32 = 30;
/// The maximum value of the window log parameter on 64-bit targets.
pub const WINDOW_LOG_MAX_64: u32 = 31;
/// Lets the codec pick the window log.
pub const DEFAULT_WINDOW_LOG: u32 = 0;

/// Recommended size of the compression stream input buffer.
pub fn cstream_in_size() -> usize {
    CCtx::in_size()
}

/// Recommended size of the compression stream output buffer.
pub fn cstream_out_size() -> usize {
    CCtx::out_size()
}

/// Recommended size of the decompression stream input buffer.
pub fn dstream_in_size() -> usize {
    DCtx::in_size()
}

/// Recommended size of the decompression stream output buffer.
pub fn dstream_out_size() -> usize {
    DCtx::out_size()
}

/// A failure code reported by the native codec.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(usize);

impl ErrorCode {
    // `ZSTD_ErrorCode` values, stable across releases.
    const DICTIONARY_WRONG: usize = 32;
    const DST_SIZE_TOO_SMALL: usize = 70;

    pub(crate) fn new(code: usize) -> Self {
        Self(code)
    }

    #[cfg(test)]
    pub(crate) fn from_kind(kind: usize) -> Self {
        Self(kind.wrapping_neg())
    }

    fn kind(self) -> usize {
        self.0.wrapping_neg()
    }

    /// Human readable description of the failure.
    pub fn name(self) -> &'static str {
        zstd_safe::get_error_name(self.0)
    }

    /// The destination buffer could not hold the output.
    pub fn is_dst_size_too_small(self) -> bool {
        self.kind() == Self::DST_SIZE_TOO_SMALL
    }

    /// The frame was produced with a different (or no) dictionary.
    pub fn is_dictionary_mismatch(self) -> bool {
        self.kind() == Self::DICTIONARY_WRONG
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorCode({}: {:?})", self.kind(), self.name())
    }
}

/// The decompressed size announced by a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSize {
    Known(u64),
    /// The frame was written without a content size (e.g. by a stream).
    Unknown,
    /// The input does not start with a valid frame header.
    Invalid,
}

pub fn content_size(src: &[u8]) -> ContentSize {
    match zstd_safe::get_frame_content_size(src) {
        Ok(Some(size)) => ContentSize::Known(size),
        Ok(None) => ContentSize::Unknown,
        Err(_) => ContentSize::Invalid,
    }
}

/// Exposes the spare capacity of a `Vec` to the codec.
///
/// Bytes the codec writes are appended after the existing contents, the
/// vector is never reallocated.
pub struct SpareCapacityWriteBuf<'b> {
    buf: &'b mut Vec<u8>,
    start: usize,
}

impl<'b> SpareCapacityWriteBuf<'b> {
    pub fn new(buf: &'b mut Vec<u8>) -> Self {
        let start = buf.len();
        Self { buf, start }
    }
}

unsafe impl zstd_safe::WriteBuf for SpareCapacityWriteBuf<'_> {
    fn as_slice(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    fn capacity(&self) -> usize {
        self.buf.capacity() - self.start
    }

    fn as_mut_ptr(&mut self) -> *mut u8 {
        unsafe { self.buf.as_mut_ptr().add(self.start) }
    }

    unsafe fn filled_until(&mut self, n: usize) {
        self.buf.set_len(n + self.start)
    }
}

/// One-shot compression into the spare capacity of `dst`.
///
/// On success the output is appended to `dst` and its size returned. An
/// implementation must never grow `dst` itself.
pub trait BlockCompress {
    fn compress_block(&mut self, dst: &mut Vec<u8>, src: &[u8]) -> Result<usize, ErrorCode>;
}

/// One-shot decompression into the spare capacity of `dst`.
pub trait BlockDecompress {
    fn decompress_block(&mut self, dst: &mut Vec<u8>, src: &[u8]) -> Result<usize, ErrorCode>;
}

/// Compresses with an explicit level.
pub(crate) struct LevelCompress<'c> {
    pub cctx: &'c mut CCtx<'static>,
    pub level: i32,
}

impl BlockCompress for LevelCompress<'_> {
    fn compress_block(&mut self, dst: &mut Vec<u8>, src: &[u8]) -> Result<usize, ErrorCode> {
        let mut destination = SpareCapacityWriteBuf::new(dst);
        self.cctx
            .compress(&mut destination, src, self.level)
            .map_err(ErrorCode)
    }
}

/// Compresses with the parameters already set on the context.
pub(crate) struct ParamsCompress<'c> {
    pub cctx: &'c mut CCtx<'static>,
}

impl BlockCompress for ParamsCompress<'_> {
    fn compress_block(&mut self, dst: &mut Vec<u8>, src: &[u8]) -> Result<usize, ErrorCode> {
        let mut destination = SpareCapacityWriteBuf::new(dst);
        self.cctx.compress2(&mut destination, src).map_err(ErrorCode)
    }
}

pub(crate) struct DictCompress<'c, 'd> {
    pub cctx: &'c mut CCtx<'static>,
    pub cdict: &'c CDict<'d>,
}

impl BlockCompress for DictCompress<'_, '_> {
    fn compress_block(&mut self, dst: &mut Vec<u8>, src: &[u8]) -> Result<usize, ErrorCode> {
        let mut destination = SpareCapacityWriteBuf::new(dst);
        self.cctx
            .compress_using_cdict(&mut destination, src, self.cdict)
            .map_err(ErrorCode)
    }
}

pub(crate) struct PlainDecompress<'c> {
    pub dctx: &'c mut DCtx<'static>,
}

impl BlockDecompress for PlainDecompress<'_> {
    fn decompress_block(&mut self, dst: &mut Vec<u8>, src: &[u8]) -> Result<usize, ErrorCode> {
        let mut destination = SpareCapacityWriteBuf::new(dst);
        self.dctx.decompress(&mut destination, src).map_err(ErrorCode)
    }
}

pub(crate) struct DictDecompress<'c, 'd> {
    pub dctx: &'c mut DCtx<'static>,
    pub ddict: &'c DDict<'d>,
}

impl BlockDecompress for DictDecompress<'_, '_> {
    fn decompress_block(&mut self, dst: &mut Vec<u8>, src: &[u8]) -> Result<usize, ErrorCode> {
        let mut destination = SpareCapacityWriteBuf::new(dst);
        self.dctx
            .decompress_using_ddict(&mut destination, src, self.ddict)
            .map_err(ErrorCode)
    }
}

/// What a streaming compression step should do after consuming its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndDirective {
    Continue,
    Flush,
    End,
}

/// Outcome of a single streaming step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Progress {
    pub consumed: usize,
    pub produced: usize,
    /// Zero once the codec holds no more pending output (or the frame is done).
    pub remaining: usize,
}

pub(crate) fn compress_step(
    cctx: &mut CCtx<'_>,
    output: &mut [u8],
    input: &[u8],
    directive: EndDirective,
) -> Result<Progress, ErrorCode> {
    debug_assert!(directive == EndDirective::Continue || input.is_empty());

    let mut output = OutBuffer::around(output);
    let mut input = InBuffer::around(input);
    let remaining = match directive {
        EndDirective::Continue => cctx.compress_stream(&mut output, &mut input),
        EndDirective::Flush => cctx.flush_stream(&mut output),
        EndDirective::End => cctx.end_stream(&mut output),
    }
    .map_err(ErrorCode)?;

    Ok(Progress {
        consumed: input.pos(),
        produced: output.pos(),
        remaining,
    })
}

pub(crate) fn decompress_step(
    dctx: &mut DCtx<'_>,
    output: &mut [u8],
    input: &[u8],
) -> Result<Progress, ErrorCode> {
    let mut output = OutBuffer::around(output);
    let mut input = InBuffer::around(input);
    let remaining = dctx
        .decompress_stream(&mut output, &mut input)
        .map_err(ErrorCode)?;

    Ok(Progress {
        consumed: input.pos(),
        produced: output.pos(),
        remaining,
    })
}

/// Like [`decompress_step`], but appends to the spare capacity of `dst`.
pub(crate) fn decompress_step_into(
    dctx: &mut DCtx<'_>,
    dst: &mut Vec<u8>,
    input: &[u8],
) -> Result<Progress, ErrorCode> {
    let mut destination = SpareCapacityWriteBuf::new(dst);
    let mut output = OutBuffer::around(&mut destination);
    let mut input = InBuffer::around(input);
    let remaining = dctx
        .decompress_stream(&mut output, &mut input)
        .map_err(ErrorCode)?;

    Ok(Progress {
        consumed: input.pos(),
        produced: output.pos(),
        remaining,
    })
}

pub(crate) fn reset_cctx(cctx: &mut CCtx<'_>, directive: ResetDirective) -> Result<(), ErrorCode> {
    cctx.reset(directive).map(drop).map_err(ErrorCode)
}

pub(crate) fn reset_dctx(dctx: &mut DCtx<'_>, directive: ResetDirective) -> Result<(), ErrorCode> {
    dctx.reset(directive).map(drop).map_err(ErrorCode)
}

/// Prepares a streaming decompression context, optionally bound to `ddict`.
pub(crate) fn init_dctx<'d>(dctx: &mut DCtx<'d>, ddict: Option<&DDict<'d>>) -> Result<(), ErrorCode> {
    reset_dctx(dctx, ResetDirective::SessionAndParameters)?;
    if let Some(ddict) = ddict {
        dctx.ref_ddict(ddict).map_err(ErrorCode)?;
    }
    Ok(())
}
