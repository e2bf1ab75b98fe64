//! One-shot compression and decompression appending to a caller's `Vec`.
//!
//! Output goes straight into the destination's spare capacity. Only when that
//! is too small does the destination grow, so a buffer that is cleared and
//! reused settles on a capacity and stops allocating.

use zstd::zstd_safe::{CCtx, DCtx};

use crate::dict::{CompressionDict, DecompressionDict};
use crate::error::{Error, Result};
use crate::params::{set, CParameter, ResetDirective};
use crate::pool::{compress_contexts, decompress_contexts, ContextKind, PooledContext};
use crate::zstd::{
    compress_bound, content_size, dstream_out_size, init_dctx, reset_cctx, BlockCompress,
    BlockDecompress, ContentSize, DictCompress, DictDecompress, ErrorCode, LevelCompress,
    ParamsCompress, PlainDecompress, DEFAULT_COMPRESSION_LEVEL,
};
use crate::{limiter, reader};

/// Compresses `src` at the default level.
pub fn compress(src: &[u8]) -> Vec<u8> {
    Compressor::new().compress(src)
}

/// Compresses `src` at `level`; out of range levels are clamped.
pub fn compress_level(src: &[u8], level: i32) -> Vec<u8> {
    Compressor::new().level(level).compress(src)
}

/// Decompresses all frames in `src`.
pub fn decompress(src: &[u8]) -> Result<Vec<u8>> {
    Decompressor::new().decompress(src)
}

/// One-shot compression settings.
#[derive(Debug, Clone, Copy)]
pub struct Compressor<'d> {
    level: i32,
    dict: Option<&'d CompressionDict<'d>>,
}

impl<'d> Compressor<'d> {
    pub fn new() -> Self {
        Self {
            level: DEFAULT_COMPRESSION_LEVEL,
            dict: None,
        }
    }

    /// Ignored when a dictionary is set, which carries its own level.
    pub fn level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn dict(mut self, dict: &'d CompressionDict<'d>) -> Self {
        self.dict = Some(dict);
        self
    }

    pub fn compress(&self, src: &[u8]) -> Vec<u8> {
        let mut dst = Vec::new();
        self.compress_into(&mut dst, src);
        dst
    }

    /// Appends the compressed `src` to `dst`, keeping its existing contents.
    ///
    /// An empty `src` leaves `dst` untouched.
    pub fn compress_into(&self, dst: &mut Vec<u8>, src: &[u8]) {
        if src.is_empty() {
            return;
        }

        let _permit = limiter::global().acquire();
        let result = match self.dict {
            Some(dict) => {
                let mut cctx = compress_contexts(ContextKind::Dict).acquire();
                let mut codec = DictCompress {
                    cctx: &mut cctx,
                    cdict: dict.as_cdict(),
                };
                compress_block_into(&mut codec, dst, src)
            }
            None => {
                let mut cctx = compress_contexts(ContextKind::Plain).acquire();
                let mut codec = LevelCompress {
                    cctx: &mut cctx,
                    level: self.level,
                };
                compress_block_into(&mut codec, dst, src)
            }
        };

        if let Err(code) = result {
            panic!(
                "BUG: unexpected error during compression with dict={}: {code}",
                self.dict.is_some()
            );
        }
    }
}

impl Default for Compressor<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot decompression settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decompressor<'d> {
    dict: Option<&'d DecompressionDict<'d>>,
}

impl<'d> Decompressor<'d> {
    pub fn new() -> Self {
        Self { dict: None }
    }

    /// Decompresses with `dict`.
    ///
    /// Frames without a recorded content size, and concatenated frames, are
    /// decoded by a streaming context created for the call, since pooled
    /// contexts cannot hold a borrowed dictionary.
    pub fn dict(mut self, dict: &'d DecompressionDict<'d>) -> Self {
        self.dict = Some(dict);
        self
    }

    pub fn decompress(&self, src: &[u8]) -> Result<Vec<u8>> {
        let mut dst = Vec::new();
        self.decompress_into(&mut dst, src)?;
        Ok(dst)
    }

    /// Appends the decompressed `src` to `dst`.
    ///
    /// On error `dst` keeps its previous contents, though its capacity may
    /// have grown.
    pub fn decompress_into(&self, dst: &mut Vec<u8>, src: &[u8]) -> Result<()> {
        if src.is_empty() {
            return Ok(());
        }

        let _permit = limiter::global().acquire();
        match self.dict {
            Some(dict) => {
                let mut dctx = decompress_contexts(ContextKind::Dict).acquire();
                let mut codec = DictDecompress {
                    dctx: &mut dctx,
                    ddict: dict.as_ddict(),
                };
                decompress_block_into(&mut codec, dst, src, |dst, src| {
                    let mut dctx = DCtx::create();
                    init_dctx(&mut dctx, Some(dict.as_ddict())).map_err(Error::InitContext)?;
                    decompress_frames(&mut dctx, dst, src)
                })
            }
            None => {
                let mut dctx = decompress_contexts(ContextKind::Plain).acquire();
                let mut codec = PlainDecompress { dctx: &mut dctx };
                decompress_block_into(&mut codec, dst, src, |dst, src| {
                    let mut dctx = decompress_contexts(ContextKind::Plain).acquire();
                    decompress_frames(&mut dctx, dst, src)
                })
            }
        }
    }
}

/// Appends the compressed `src` to `dst`, growing `dst` only if needed.
pub(crate) fn compress_block_into<C: BlockCompress>(
    codec: &mut C,
    dst: &mut Vec<u8>,
    src: &[u8],
) -> Result<(), ErrorCode> {
    if src.is_empty() {
        return Ok(());
    }

    if dst.capacity() > dst.len() {
        match codec.compress_block(dst, src) {
            Ok(_) => return Ok(()),
            Err(code) if code.is_dst_size_too_small() => {}
            Err(code) => return Err(code),
        }
    }

    let bound = compress_bound(src.len()) + 1;
    tracing::debug!(src_len = src.len(), bound, "growing destination for compression");
    dst.reserve(bound);
    codec.compress_block(dst, src).map(drop)
}

/// Appends the decompressed `src` to `dst`.
///
/// Frames without a recorded content size are handed to `stream_fallback`.
pub(crate) fn decompress_block_into<D, F>(
    codec: &mut D,
    dst: &mut Vec<u8>,
    src: &[u8],
    stream_fallback: F,
) -> Result<()>
where
    D: BlockDecompress,
    F: FnOnce(&mut Vec<u8>, &[u8]) -> Result<()>,
{
    if src.is_empty() {
        return Ok(());
    }

    if dst.capacity() - dst.len() >= src.len() {
        match codec.decompress_block(dst, src) {
            Ok(_) => return Ok(()),
            Err(code) if code.is_dst_size_too_small() => {}
            Err(code) => return Err(Error::Decompress(code)),
        }
    }

    let size = match content_size(src) {
        ContentSize::Known(size) => size,
        ContentSize::Unknown => {
            tracing::debug!(src_len = src.len(), "content size unknown, decompressing as stream");
            return stream_fallback(dst, src);
        }
        ContentSize::Invalid => return Err(Error::InvalidSource),
    };
    let reserve = usize::try_from(size)
        .ok()
        .and_then(|size| size.checked_add(1))
        .ok_or(Error::ContentTooLarge(size))?;

    tracing::debug!(src_len = src.len(), size, "growing destination for decompression");
    dst.try_reserve(reserve)
        .map_err(|_| Error::ContentTooLarge(size))?;
    match codec.decompress_block(dst, src) {
        Ok(_) => Ok(()),
        // only the first frame's size is known, more frames follow
        Err(code) if code.is_dst_size_too_small() => stream_fallback(dst, src),
        Err(code) => Err(Error::Decompress(code)),
    }
}

/// Streams every frame in `src` through `dctx`, appending to `dst`.
///
/// `dctx` must be freshly initialized. `dst` keeps its contents on error.
pub(crate) fn decompress_frames(dctx: &mut DCtx<'_>, dst: &mut Vec<u8>, src: &[u8]) -> Result<()> {
    let start = dst.len();
    let result = reader::decompress_slice(dctx, dst, src, dstream_out_size());
    if result.is_err() {
        dst.truncate(start);
    }
    result
}

/// A pooled compression context with caller controlled parameters.
///
/// Parameters stick across [`compress`](Self::compress) calls until
/// [`reset`](Self::reset). The context returns to the pool on drop, with its
/// parameters cleared.
pub struct CompressionContext {
    cctx: PooledContext<'static, CCtx<'static>>,
}

impl CompressionContext {
    pub fn new() -> Self {
        Self {
            cctx: compress_contexts(ContextKind::Plain).acquire(),
        }
    }

    pub fn set_parameter(&mut self, param: CParameter) -> Result<()> {
        set(&mut self.cctx, param).map_err(Error::Parameter)
    }

    pub fn reset(&mut self, directive: ResetDirective) -> Result<()> {
        reset_cctx(&mut self.cctx, directive.into()).map_err(Error::Parameter)
    }

    /// Appends the compressed `src` to `dst` using the context's parameters.
    ///
    /// Unlike [`Compressor`], failures are reported, since parameter
    /// combinations can be invalid.
    pub fn compress(&mut self, dst: &mut Vec<u8>, src: &[u8]) -> Result<()> {
        let _permit = limiter::global().acquire();
        let mut codec = ParamsCompress {
            cctx: &mut self.cctx,
        };
        compress_block_into(&mut codec, dst, src).map_err(Error::Parameter)
    }
}

impl Default for CompressionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompressionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionContext").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use proptest::prelude::*;
    use rand::Rng;

    use super::*;
    use crate::dict::build_dict;

    pub(crate) fn test_string(size: usize, randomness: u8) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        (0..size).map(|_| rng.gen_range(0..randomness)).collect()
    }

    /// Stores `src` verbatim behind a 4-byte length, like a codec without
    /// any entropy to exploit.
    #[derive(Default)]
    struct FakeCodec {
        calls: usize,
        fail_with: Option<ErrorCode>,
    }

    impl BlockCompress for FakeCodec {
        fn compress_block(&mut self, dst: &mut Vec<u8>, src: &[u8]) -> Result<usize, ErrorCode> {
            self.calls += 1;
            if let Some(code) = self.fail_with.take() {
                return Err(code);
            }
            let needed = src.len() + 4;
            if dst.capacity() - dst.len() < needed {
                return Err(ErrorCode::from_kind(70));
            }
            let ptr = dst.as_ptr();
            dst.extend_from_slice(&(src.len() as u32).to_le_bytes());
            dst.extend_from_slice(src);
            assert_eq!(ptr, dst.as_ptr(), "codec must not reallocate");
            Ok(needed)
        }
    }

    impl BlockDecompress for FakeCodec {
        fn decompress_block(&mut self, dst: &mut Vec<u8>, src: &[u8]) -> Result<usize, ErrorCode> {
            self.calls += 1;
            if let Some(code) = self.fail_with.take() {
                return Err(code);
            }
            let body = &src[4..];
            if dst.capacity() - dst.len() < body.len() {
                return Err(ErrorCode::from_kind(70));
            }
            dst.extend_from_slice(body);
            Ok(body.len())
        }
    }

    #[test]
    fn test_fast_path_does_not_grow() {
        let mut codec = FakeCodec::default();
        let mut dst = Vec::with_capacity(64);
        let ptr = dst.as_ptr();

        compress_block_into(&mut codec, &mut dst, b"foo").unwrap();
        assert_eq!(codec.calls, 1);
        assert_eq!(dst.as_ptr(), ptr);
        assert_eq!(&dst[4..], b"foo");
    }

    #[test]
    fn test_slow_path_grows_once() {
        let mut codec = FakeCodec::default();
        let mut dst = Vec::with_capacity(2);
        dst.extend_from_slice(b"ab");

        compress_block_into(&mut codec, &mut dst, b"foo bar baz").unwrap();
        // the fast path is skipped without spare capacity
        assert_eq!(codec.calls, 1);
        assert_eq!(&dst[..2], b"ab");
        assert_eq!(&dst[6..], b"foo bar baz");

        let mut dst = Vec::with_capacity(3);
        compress_block_into(&mut codec, &mut dst, b"foo bar baz").unwrap();
        assert_eq!(codec.calls, 3);
    }

    #[test]
    fn test_compress_error_is_reported() {
        let mut codec = FakeCodec {
            fail_with: Some(ErrorCode::from_kind(1)),
            ..Default::default()
        };
        let mut dst = Vec::with_capacity(64);
        assert!(compress_block_into(&mut codec, &mut dst, b"foo").is_err());
        assert!(dst.is_empty());
    }

    #[test]
    fn test_decompress_error_is_returned() {
        let mut codec = FakeCodec {
            fail_with: Some(ErrorCode::from_kind(32)),
            ..Default::default()
        };
        let mut dst = Vec::with_capacity(64);
        let err = decompress_block_into(&mut codec, &mut dst, b"\0\0\0\0foo", |_, _| {
            panic!("no fallback expected")
        })
        .unwrap_err();
        assert!(err.is_dictionary_mismatch());
    }

    #[test]
    fn test_decompress_invalid_header() {
        let mut codec = FakeCodec::default();
        let mut dst = Vec::new();
        let err = decompress_block_into(&mut codec, &mut dst, b"invalid compressed data", |_, _| {
            panic!("no fallback expected")
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidSource));
        assert_eq!(codec.calls, 0);
    }

    #[test]
    fn test_unknown_size_uses_stream_fallback() {
        let mut streamed = Vec::new();
        crate::stream::stream_compress(&mut streamed, &b"foo bar baz"[..]).unwrap();

        let mut codec = FakeCodec::default();
        let mut dst = Vec::new();
        let mut fallback_called = false;
        decompress_block_into(&mut codec, &mut dst, &streamed, |dst, _| {
            fallback_called = true;
            dst.extend_from_slice(b"streamed");
            Ok(())
        })
        .unwrap();
        assert!(fallback_called);
        assert_eq!(dst, b"streamed");
    }

    #[test]
    fn test_compress_decompress() {
        for s in [&b""[..], b"a", b"foo bar", b"foo bar baz"] {
            let compressed = compress(s);
            assert_eq!(decompress(&compressed).unwrap(), s);
        }

        let mut size = 1;
        while size <= 1_000_000 {
            let s = test_string(size, 20);
            let compressed = compress(&s);
            assert_eq!(decompress(&compressed).unwrap(), s);
            size *= 10;
        }
    }

    #[test]
    fn test_foo_bar_baz() {
        let compressed = compress(b"foo bar baz");
        assert_eq!(decompress(&compressed).unwrap(), b"foo bar baz");
    }

    #[test]
    fn test_empty_is_noop() {
        let mut dst = b"prefix".to_vec();
        Compressor::new().compress_into(&mut dst, b"");
        Decompressor::new().decompress_into(&mut dst, b"").unwrap();
        assert_eq!(dst, b"prefix");
        assert!(compress(b"").is_empty());
    }

    #[test]
    fn test_compress_level() {
        let src = b"foobar baz";
        for level in (1..22).chain([-123, 234324]) {
            let compressed = compress_level(src, level);
            assert_eq!(decompress(&compressed).unwrap(), src);
        }
    }

    #[test]
    fn test_prefix_preservation() {
        let s = test_string(10_000, 20);
        let plain = compress(&s);

        let mut prefixed = b"foobaraaa".to_vec();
        Compressor::new().compress_into(&mut prefixed, &s);
        assert_eq!(&prefixed[..9], b"foobaraaa");
        assert_eq!(&prefixed[9..], &plain[..]);

        let mut prefixed = b"foobaraaa".to_vec();
        Decompressor::new().decompress_into(&mut prefixed, &plain).unwrap();
        assert_eq!(&prefixed[..9], b"foobaraaa");
        assert_eq!(&prefixed[9..], &s[..]);
    }

    #[test]
    fn test_buffer_reuse_settles() {
        let s = test_string(64 * 1024, 20);
        let expected = compress(&s);

        let mut compressed = Vec::new();
        let mut decompressed = Vec::new();
        Compressor::new().compress_into(&mut compressed, &s);
        Decompressor::new().decompress_into(&mut decompressed, &compressed).unwrap();
        let (c_ptr, d_ptr) = (compressed.as_ptr(), decompressed.as_ptr());

        for _ in 0..10 {
            compressed.clear();
            decompressed.clear();
            Compressor::new().compress_into(&mut compressed, &s);
            Decompressor::new().decompress_into(&mut decompressed, &compressed).unwrap();

            assert_eq!(compressed, expected);
            assert_eq!(decompressed, s);
            assert_eq!(compressed.as_ptr(), c_ptr);
            assert_eq!(decompressed.as_ptr(), d_ptr);
        }
    }

    #[test]
    fn test_decompress_invalid_data() {
        let src = b"invalid compressed data";
        assert!(decompress(src).is_err());
        let mut buf = Vec::with_capacity(src.len());
        assert!(Decompressor::new().decompress_into(&mut buf, src).is_err());

        let s = test_string(64 * 1024, 15);
        let mut compressed = compress(&s);
        let last = compressed.len() - 1;
        compressed[last] = compressed[last].wrapping_add(1);

        assert!(decompress(&compressed).is_err());
        let mut buf = Vec::with_capacity(src.len());
        assert!(Decompressor::new().decompress_into(&mut buf, &compressed).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_big_data() {
        let mut data = Vec::new();
        while data.len() < 3 * 128 * 1024 {
            write!(data, "compress/decompress big data {}, ", data.len()).unwrap();
        }
        let compressed = compress(&data);
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_streamed_frame_one_shot() {
        let data = test_string(300 * 1024, 10);
        let mut streamed = Vec::new();
        crate::stream::stream_compress(&mut streamed, &data[..]).unwrap();

        let mut dst = b"head".to_vec();
        Decompressor::new().decompress_into(&mut dst, &streamed).unwrap();
        assert_eq!(&dst[..4], b"head");
        assert_eq!(&dst[4..], &data[..]);
    }

    #[test]
    fn test_concatenated_frames() {
        let mut both = compress(b"first frame, ");
        both.extend_from_slice(&compress(b"second frame"));
        assert_eq!(decompress(&both).unwrap(), b"first frame, second frame");
    }

    fn dicts(seed: usize) -> (CompressionDict<'static>, DecompressionDict<'static>) {
        let samples: Vec<_> = (0..1000)
            .map(|j| format!("this is {j},{seed} sample").into_bytes())
            .collect();
        let dict = build_dict(&samples, 4 * 1024);
        (
            CompressionDict::new(&dict).unwrap(),
            DecompressionDict::new(&dict).unwrap(),
        )
    }

    #[test]
    fn test_dict_scenario() {
        let samples: Vec<_> = (0..1000)
            .map(|i| format!("sample {i}").into_bytes())
            .collect();
        let dict = build_dict(&samples, 8192);
        let cd = CompressionDict::new(&dict).unwrap();
        let dd = DecompressionDict::new(&dict).unwrap();

        let plain = b"this is line 0 for dict compression";
        let compressed = Compressor::new().dict(&cd).compress(plain);
        let decompressed = Decompressor::new().dict(&dd).decompress(&compressed).unwrap();
        assert_eq!(decompressed, plain);
    }

    #[test]
    fn test_dict_mismatch() {
        let (cd, dd) = dicts(0);
        for i in 0..30 {
            let mut src = Vec::new();
            for j in 0..100 {
                writeln!(src, "line {j} is this {}", i + j).unwrap();
            }
            let compressed = Compressor::new().dict(&cd).compress(&src);
            let plain = Decompressor::new().dict(&dd).decompress(&compressed).unwrap();
            assert_eq!(plain, src);

            let err = decompress(&compressed).unwrap_err();
            assert!(err.is_dictionary_mismatch(), "{err}");
            assert!(err.to_string().contains("Dictionary mismatch"));
        }
    }

    #[test]
    fn test_dict_stream_fallback() {
        let (cd, dd) = dicts(7);
        let first = b"this is 1,7 sample, this is 2,7 sample".to_vec();
        let second = test_string(300 * 1024, 4);

        // streamed frames carry no content size
        let mut frames = Vec::new();
        crate::stream::stream_compress_dict(&mut frames, &first[..], &cd).unwrap();
        crate::stream::stream_compress_dict(&mut frames, &second[..], &cd).unwrap();
        assert_eq!(content_size(&frames), ContentSize::Unknown);

        let mut dst = b"prefix".to_vec();
        Decompressor::new()
            .dict(&dd)
            .decompress_into(&mut dst, &frames)
            .unwrap();
        assert_eq!(&dst[..6], b"prefix");
        assert_eq!(&dst[6..6 + first.len()], &first[..]);
        assert_eq!(&dst[6 + first.len()..], &second[..]);

        let mut dst = b"prefix".to_vec();
        let err = Decompressor::new().decompress_into(&mut dst, &frames).unwrap_err();
        assert!(err.is_dictionary_mismatch(), "{err}");
        assert_eq!(dst, b"prefix");
    }

    #[test]
    fn test_concurrent_dicts() {
        let pairs: Vec<_> = (0..4).map(dicts).collect();
        let mut data = Vec::new();
        let mut i = 0;
        while data.len() < 10_000 {
            write!(data, "{} sample line this is {i}", data.len()).unwrap();
            i += 1;
        }

        std::thread::scope(|s| {
            for (cd, dd) in &pairs {
                for _ in 0..2 {
                    let data = &data;
                    s.spawn(move || {
                        let payload: Vec<u8> = data.iter().chain(&test_string(512, 200)).copied().collect();
                        let mut compressed = Vec::new();
                        let mut plain = Vec::new();
                        for _ in 0..10 {
                            compressed.clear();
                            plain.clear();
                            Compressor::new().dict(cd).compress_into(&mut compressed, &payload);
                            Decompressor::new()
                                .dict(dd)
                                .decompress_into(&mut plain, &compressed)
                                .unwrap();
                            assert_eq!(plain, payload);
                        }
                    });
                }
            }
        });
    }

    #[test]
    fn test_by_ref_dict() {
        let samples: Vec<_> = (0..1000)
            .map(|i| format!("{i} this is line {i}").into_bytes())
            .collect();
        let dict = build_dict(&samples, 16 * 1024);
        let cd = CompressionDict::by_ref(&dict).unwrap();
        let dd = DecompressionDict::by_ref(&dict).unwrap();

        let src = b"42 this is line 42, 43 this is line 43";
        let compressed = Compressor::new().dict(&cd).compress(src);
        assert_eq!(Decompressor::new().dict(&dd).decompress(&compressed).unwrap(), src);
    }

    #[test]
    fn test_compression_context() {
        let src = test_string(32 * 1024, 20);

        let mut ctx = CompressionContext::new();
        ctx.set_parameter(CParameter::CompressionLevel(5)).unwrap();
        ctx.set_parameter(CParameter::ChecksumFlag(true)).unwrap();

        let mut dst = b"x".to_vec();
        ctx.compress(&mut dst, &src).unwrap();
        assert_eq!(dst[0], b'x');
        assert_eq!(decompress(&dst[1..]).unwrap(), src);

        ctx.reset(ResetDirective::SessionAndParameters).unwrap();
        assert!(ctx.set_parameter(CParameter::WindowLog(99)).is_err());
    }

    proptest! {
        #[test]
        fn test_roundtrip(
            input in prop::collection::vec(any::<u8>(), 0..4096),
            prefix in prop::collection::vec(any::<u8>(), 0..16),
            spare in 0..512usize,
        ) {
            let mut dst = Vec::with_capacity(prefix.len() + spare);
            dst.extend_from_slice(&prefix);
            Compressor::new().compress_into(&mut dst, &input);
            prop_assert_eq!(&dst[..prefix.len()], &prefix[..]);

            let mut out = Vec::with_capacity(prefix.len() + spare);
            out.extend_from_slice(&prefix);
            Decompressor::new().decompress_into(&mut out, &dst[prefix.len()..]).unwrap();
            prop_assert_eq!(&out[..prefix.len()], &prefix[..]);
            prop_assert_eq!(&out[prefix.len()..], &input[..]);
        }
    }
}
