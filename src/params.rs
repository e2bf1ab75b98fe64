//! Compression parameters.
//!
//! Values are handed to the codec as-is; the codec validates and clamps them.

use zstd::zstd_safe::{self, CCtx};

use crate::dict::CompressionDict;
use crate::zstd::{reset_cctx, ErrorCode, DEFAULT_WINDOW_LOG};

/// Match finder strategies, from fastest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Fast,
    DFast,
    Greedy,
    Lazy,
    Lazy2,
    BtLazy2,
    BtOpt,
    BtUltra,
    BtUltra2,
}

impl From<Strategy> for zstd_safe::Strategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Fast => zstd_safe::Strategy::ZSTD_fast,
            Strategy::DFast => zstd_safe::Strategy::ZSTD_dfast,
            Strategy::Greedy => zstd_safe::Strategy::ZSTD_greedy,
            Strategy::Lazy => zstd_safe::Strategy::ZSTD_lazy,
            Strategy::Lazy2 => zstd_safe::Strategy::ZSTD_lazy2,
            Strategy::BtLazy2 => zstd_safe::Strategy::ZSTD_btlazy2,
            Strategy::BtOpt => zstd_safe::Strategy::ZSTD_btopt,
            Strategy::BtUltra => zstd_safe::Strategy::ZSTD_btultra,
            Strategy::BtUltra2 => zstd_safe::Strategy::ZSTD_btultra2,
        }
    }
}

/// A single knob applied to a compression context.
///
/// Log parameters are powers of two; `0` asks the codec for its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CParameter {
    /// `0` means the default level; out of range levels are clamped.
    CompressionLevel(i32),
    WindowLog(u32),
    HashLog(u32),
    ChainLog(u32),
    SearchLog(u32),
    MinMatch(u32),
    TargetLength(u32),
    Strategy(Strategy),
    EnableLongDistanceMatching(bool),
    LdmHashLog(u32),
    LdmMinMatch(u32),
    LdmBucketSizeLog(u32),
    LdmHashRateLog(u32),
    /// Write the content size into the frame header when known (default on).
    ContentSizeFlag(bool),
    /// Append a 32-bit checksum of the content to the frame (default off).
    ChecksumFlag(bool),
    /// Write the dictionary id into the frame header (default on).
    DictIdFlag(bool),
    /// Number of background compression threads, `0` is single-threaded.
    ///
    /// Requires libzstd built with multi-threading, the codec reports an
    /// error otherwise.
    Workers(u32),
    JobSize(u32),
    OverlapLog(u32),
}

impl From<CParameter> for zstd_safe::CParameter {
    fn from(param: CParameter) -> Self {
        use zstd_safe::CParameter as P;
        match param {
            CParameter::CompressionLevel(v) => P::CompressionLevel(v),
            CParameter::WindowLog(v) => P::WindowLog(v),
            CParameter::HashLog(v) => P::HashLog(v),
            CParameter::ChainLog(v) => P::ChainLog(v),
            CParameter::SearchLog(v) => P::SearchLog(v),
            CParameter::MinMatch(v) => P::MinMatch(v),
            CParameter::TargetLength(v) => P::TargetLength(v),
            CParameter::Strategy(v) => P::Strategy(v.into()),
            CParameter::EnableLongDistanceMatching(v) => P::EnableLongDistanceMatching(v),
            CParameter::LdmHashLog(v) => P::LdmHashLog(v),
            CParameter::LdmMinMatch(v) => P::LdmMinMatch(v),
            CParameter::LdmBucketSizeLog(v) => P::LdmBucketSizeLog(v),
            CParameter::LdmHashRateLog(v) => P::LdmHashRateLog(v),
            CParameter::ContentSizeFlag(v) => P::ContentSizeFlag(v),
            CParameter::ChecksumFlag(v) => P::ChecksumFlag(v),
            CParameter::DictIdFlag(v) => P::DictIdFlag(v),
            CParameter::Workers(v) => P::NbWorkers(v),
            CParameter::JobSize(v) => P::JobSize(v),
            CParameter::OverlapLog(v) => P::OverlapSizeLog(v),
        }
    }
}

/// How much of a context [`CompressionContext::reset`](crate::CompressionContext::reset) discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetDirective {
    /// Abort the current frame, keep the parameters.
    SessionOnly,
    /// Restore default parameters; only valid between frames.
    Parameters,
    SessionAndParameters,
}

impl From<ResetDirective> for zstd_safe::ResetDirective {
    fn from(directive: ResetDirective) -> Self {
        match directive {
            ResetDirective::SessionOnly => zstd_safe::ResetDirective::SessionOnly,
            ResetDirective::Parameters => zstd_safe::ResetDirective::Parameters,
            ResetDirective::SessionAndParameters => {
                zstd_safe::ResetDirective::SessionAndParameters
            }
        }
    }
}

/// Parameters of a streaming [`Writer`](crate::Writer).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterParams {
    /// `0` means the default level. Ignored when a dictionary is used, the
    /// dictionary carries its own level.
    pub compression_level: i32,

    /// Must lie within [`WINDOW_LOG_MIN`](crate::WINDOW_LOG_MIN) and
    /// [`WINDOW_LOG_MAX_64`](crate::WINDOW_LOG_MAX_64) (or the 32-bit max);
    /// `0` lets the codec decide.
    ///
    /// Values above 27 require the decoder to allow large windows.
    pub window_log: u32,

    /// Background compression threads, `0` compresses on the caller's thread.
    pub workers: u32,
}

impl WriterParams {
    pub fn new() -> Self {
        Self {
            compression_level: 0,
            window_log: DEFAULT_WINDOW_LOG,
            workers: 0,
        }
    }

    pub fn level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn window_log(mut self, window_log: u32) -> Self {
        self.window_log = window_log;
        self
    }

    pub fn workers(mut self, workers: u32) -> Self {
        self.workers = workers;
        self
    }

    /// Resets `cctx` and applies these parameters for a new stream.
    pub(crate) fn apply<'d>(
        &self,
        cctx: &mut CCtx<'d>,
        dict: Option<&'d CompressionDict<'d>>,
    ) -> Result<(), ErrorCode> {
        reset_cctx(cctx, zstd_safe::ResetDirective::SessionAndParameters)?;

        match dict {
            Some(dict) => {
                cctx.ref_cdict(dict.as_cdict()).map_err(ErrorCode::new)?;
            }
            None => set(cctx, CParameter::CompressionLevel(self.compression_level))?,
        }
        set(cctx, CParameter::WindowLog(self.window_log))?;
        if self.workers > 0 {
            set(cctx, CParameter::Workers(self.workers))?;
        }
        Ok(())
    }
}

pub(crate) fn set(cctx: &mut CCtx<'_>, param: CParameter) -> Result<(), ErrorCode> {
    cctx.set_parameter(param.into())
        .map(drop)
        .map_err(ErrorCode::new)
}
