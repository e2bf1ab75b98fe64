//! Pull-style streaming decompression.

use std::io::{self, Read, Write};

use zstd::zstd_safe::DCtx;

use crate::dict::DecompressionDict;
use crate::error::{Error, Result};
use crate::pool::{BufferRole, PooledBuf};
use crate::zstd::{decompress_step, decompress_step_into, init_dctx};

/// Decompresses the frames read from an upstream [`Read`].
///
/// Reaching the end of the upstream between frames is the end of the
/// stream. Reaching it in the middle of a frame is reported as
/// [`Error::Truncated`].
pub struct Reader<'d, R> {
    inner: R,
    dctx: DCtx<'d>,
    dict: Option<&'d DecompressionDict<'d>>,

    in_buf: PooledBuf,
    in_pos: usize,
    in_end: usize,

    out_buf: PooledBuf,
    out_pos: usize,
    out_end: usize,

    /// The last step left a frame unfinished.
    frame_in_progress: bool,
    exhausted: bool,
}

impl<'d, R: Read> Reader<'d, R> {
    /// A reader without a dictionary.
    ///
    /// A later [`reset`](Self::reset) may still attach one that lives for `'d`.
    pub fn new(inner: R) -> Result<Self> {
        Reader::init(inner, None)
    }

    pub fn with_dict(inner: R, dict: &'d DecompressionDict<'d>) -> Result<Self> {
        Reader::init(inner, Some(dict))
    }

    fn init(inner: R, dict: Option<&'d DecompressionDict<'d>>) -> Result<Self> {
        let mut dctx = DCtx::create();
        init_dctx(&mut dctx, dict.map(DecompressionDict::as_ddict)).map_err(Error::InitContext)?;

        Ok(Self {
            inner,
            dctx,
            dict,
            in_buf: BufferRole::DecompressIn.pool().acquire_filled(),
            in_pos: 0,
            in_end: 0,
            out_buf: BufferRole::DecompressOut.pool().acquire_filled(),
            out_pos: 0,
            out_end: 0,
            frame_in_progress: false,
            exhausted: false,
        })
    }

    /// Starts over on a new upstream, returning the previous one.
    ///
    /// The buffers are kept. On error the reader stays on its previous
    /// upstream, in an exhausted state.
    pub fn reset(&mut self, inner: R, dict: Option<&'d DecompressionDict<'d>>) -> Result<R> {
        self.in_pos = 0;
        self.in_end = 0;
        self.out_pos = 0;
        self.out_end = 0;
        self.frame_in_progress = false;
        self.exhausted = true;

        init_dctx(&mut self.dctx, dict.map(DecompressionDict::as_ddict))
            .map_err(Error::InitContext)?;
        self.dict = dict;
        self.exhausted = false;
        Ok(std::mem::replace(&mut self.inner, inner))
    }

    /// Decompresses everything that is left into `sink`.
    ///
    /// Returns the number of decompressed bytes written.
    pub fn write_to<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<u64> {
        let mut written = 0;
        loop {
            if self.out_pos < self.out_end {
                sink.write_all(&self.out_buf[self.out_pos..self.out_end])
                    .map_err(Error::Write)?;
                written += (self.out_end - self.out_pos) as u64;
                self.out_pos = self.out_end;
            }
            if !self.fill_out_buf()? {
                return Ok(written);
            }
        }
    }

    pub fn dict(&self) -> Option<&'d DecompressionDict<'d>> {
        self.dict
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Returns the buffers to their pools and gives back the upstream.
    pub fn release(self) -> R {
        self.inner
    }

    /// Produces the next chunk of output, `false` at the end of the stream.
    fn fill_out_buf(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }

        // A full output buffer means the codec may still hold decoded data,
        // so only read more when it came back short.
        if self.in_pos == self.in_end && self.out_end < self.out_buf.len() && !self.fill_in_buf()? {
            return self.finish();
        }

        loop {
            let prev_in_pos = self.in_pos;
            let progress = decompress_step(
                &mut self.dctx,
                &mut self.out_buf,
                &self.in_buf[self.in_pos..self.in_end],
            )
            .map_err(Error::Decompress)?;

            self.in_pos += progress.consumed;
            self.out_pos = 0;
            self.out_end = progress.produced;
            // An idle step right after a frame ended reports the next
            // header size, which says nothing about the frame state.
            if progress.consumed > 0 || progress.produced > 0 {
                self.frame_in_progress = progress.remaining != 0;
            }

            if progress.produced > 0 {
                return Ok(true);
            }

            // Consumed into internal state only, keep going on what is left.
            if self.in_pos != prev_in_pos && self.in_pos < self.in_end {
                continue;
            }

            if !self.fill_in_buf()? {
                return self.finish();
            }
        }
    }

    /// Moves unconsumed input to the front and reads more behind it.
    ///
    /// Returns `false` once the upstream is at its end.
    fn fill_in_buf(&mut self) -> Result<bool> {
        self.in_buf.copy_within(self.in_pos..self.in_end, 0);
        self.in_end -= self.in_pos;
        self.in_pos = 0;

        loop {
            match self.inner.read(&mut self.in_buf[self.in_end..]) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.in_end += n;
                    return Ok(true);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(Error::Read(err)),
            }
        }
    }

    fn finish(&mut self) -> Result<bool> {
        if self.frame_in_progress || self.in_pos < self.in_end {
            tracing::debug!(
                buffered = self.in_end - self.in_pos,
                "compressed stream ended inside a frame"
            );
            return Err(Error::Truncated);
        }
        self.exhausted = true;
        Ok(false)
    }
}

impl<R: Read> Read for Reader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.out_pos == self.out_end && !self.fill_out_buf()? {
            return Ok(0);
        }

        let available = &self.out_buf[self.out_pos..self.out_end];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.out_pos += n;
        Ok(n)
    }
}

impl<R> std::fmt::Debug for Reader<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("dict", &self.dict)
            .field("buffered_in", &(self.in_end - self.in_pos))
            .field("buffered_out", &(self.out_end - self.out_pos))
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

/// Decompresses every frame of an in-memory `src`, appending to `dst`.
///
/// `dst` grows by at least `chunk` bytes at a time.
pub(crate) fn decompress_slice(
    dctx: &mut DCtx<'_>,
    dst: &mut Vec<u8>,
    src: &[u8],
    chunk: usize,
) -> Result<()> {
    let mut pos = 0;
    let mut frame_in_progress = false;

    while pos < src.len() || frame_in_progress {
        dst.reserve(chunk);
        let progress = decompress_step_into(dctx, dst, &src[pos..]).map_err(Error::Decompress)?;
        pos += progress.consumed;
        frame_in_progress = progress.remaining != 0;

        if progress.consumed == 0 && progress.produced == 0 {
            return Err(Error::Truncated);
        }
    }
    Ok(())
}
