//! Push-style streaming compression.

use std::io::{self, Read, Write};

use zstd::zstd_safe::CCtx;

use crate::dict::CompressionDict;
use crate::error::{Error, Result};
use crate::params::WriterParams;
use crate::pool::{BufferRole, PooledBuf};
use crate::zstd::{compress_step, EndDirective, Progress};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Accepting data, some of which may only be buffered.
    Open,
    /// Everything written so far has reached the downstream writer.
    Flushed,
    /// The frame is finished. Only a reset makes the writer usable again.
    Closed,
}

/// Compresses everything written to it into a single frame on an
/// underlying [`Write`].
///
/// Data is buffered until [`flush`](Write::flush) or [`close`](Self::close).
/// Dropping or [releasing](Self::release) the writer without closing it
/// leaves an unfinished frame behind.
pub struct Writer<'d, W> {
    inner: W,
    cctx: CCtx<'d>,
    params: WriterParams,
    dict: Option<&'d CompressionDict<'d>>,

    in_buf: PooledBuf,
    in_end: usize,

    out_buf: PooledBuf,
    out_end: usize,

    state: State,
}

impl<'d, W: Write> Writer<'d, W> {
    /// A writer at the default level, without a dictionary.
    ///
    /// A later [`reset`](Self::reset) may still attach one that lives for `'d`.
    pub fn new(inner: W) -> Self {
        Self::with_level(inner, 0)
    }

    /// `level` 0 is the default level, out of range levels are clamped.
    pub fn with_level(inner: W, level: i32) -> Self {
        match Writer::with_params(inner, WriterParams::new().level(level), None) {
            Ok(writer) => writer,
            Err(err) => panic!("BUG: cannot initialize compression stream: {err}"),
        }
    }

    /// Compresses with `dict`, at the level the dictionary was prepared for.
    pub fn with_dict(inner: W, dict: &'d CompressionDict<'d>) -> Self {
        match Writer::with_params(inner, WriterParams::new(), Some(dict)) {
            Ok(writer) => writer,
            Err(err) => panic!("BUG: cannot initialize compression stream with dict: {err}"),
        }
    }

    /// Fails with [`Error::Parameter`] if the codec rejects `params`.
    pub fn with_params(
        inner: W,
        params: WriterParams,
        dict: Option<&'d CompressionDict<'d>>,
    ) -> Result<Self> {
        let mut cctx = CCtx::create();
        params.apply(&mut cctx, dict).map_err(Error::Parameter)?;

        Ok(Self {
            inner,
            cctx,
            params,
            dict,
            in_buf: BufferRole::CompressIn.pool().acquire_filled(),
            in_end: 0,
            out_buf: BufferRole::CompressOut.pool().acquire_filled(),
            out_end: 0,
            state: State::Open,
        })
    }

    /// Starts a new frame on `inner` with a new dictionary and level,
    /// returning the previous downstream writer.
    ///
    /// The window log and worker count are kept, as are the buffers.
    /// Anything not yet flushed is discarded.
    pub fn reset(&mut self, inner: W, dict: Option<&'d CompressionDict<'d>>, level: i32) -> W {
        let params = self.params.level(level);
        match self.reset_params(inner, params, dict) {
            Ok(previous) => previous,
            Err(err) => panic!("BUG: cannot reinitialize compression stream: {err}"),
        }
    }

    /// Like [`reset`](Self::reset), replacing all parameters.
    ///
    /// If the codec rejects `params`, the writer keeps its previous
    /// downstream and stays closed.
    pub fn reset_params(
        &mut self,
        inner: W,
        params: WriterParams,
        dict: Option<&'d CompressionDict<'d>>,
    ) -> Result<W> {
        self.in_end = 0;
        self.out_end = 0;
        self.state = State::Closed;

        params.apply(&mut self.cctx, dict).map_err(Error::Parameter)?;
        self.params = params;
        self.dict = dict;
        self.state = State::Open;
        Ok(std::mem::replace(&mut self.inner, inner))
    }

    /// Compresses everything `source` yields until its end.
    ///
    /// Returns the number of bytes read. Bytes read before a failure stay
    /// buffered and are part of the frame.
    pub fn read_from<R: Read + ?Sized>(&mut self, source: &mut R) -> Result<u64> {
        self.ensure_open()?;

        let mut total = 0;
        loop {
            while self.in_end < self.in_buf.len() {
                match source.read(&mut self.in_buf[self.in_end..]) {
                    Ok(0) => return Ok(total),
                    Ok(n) => {
                        self.in_end += n;
                        self.state = State::Open;
                        total += n as u64;
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(Error::Read(err)),
                }
            }
            self.flush_in_buf()?;
        }
    }

    /// Finishes the frame and writes it out completely.
    ///
    /// The downstream writer itself is neither flushed nor closed. Closing
    /// twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            State::Closed => return Ok(()),
            State::Open => self.flush_stream()?,
            State::Flushed => {}
        }

        loop {
            let progress = self.step(EndDirective::End);
            self.flush_out_buf()?;
            if progress.remaining == 0 {
                break;
            }
        }
        self.state = State::Closed;
        Ok(())
    }

    pub fn params(&self) -> WriterParams {
        self.params
    }

    pub fn dict(&self) -> Option<&'d CompressionDict<'d>> {
        self.dict
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Returns the buffers to their pools and gives back the downstream
    /// writer. Nothing is flushed, call [`close`](Self::close) first.
    pub fn release(self) -> W {
        self.inner
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            State::Closed => Err(Error::Closed),
            State::Open | State::Flushed => Ok(()),
        }
    }

    /// Runs one codec step, appending to the output buffer.
    ///
    /// Only a `Continue` step consumes the input buffer.
    fn step(&mut self, directive: EndDirective) -> Progress {
        let input: &[u8] = match directive {
            EndDirective::Continue => &self.in_buf[..self.in_end],
            EndDirective::Flush | EndDirective::End => &[],
        };
        match compress_step(&mut self.cctx, &mut self.out_buf[self.out_end..], input, directive) {
            Ok(progress) => {
                self.out_end += progress.produced;
                progress
            }
            Err(code) => panic!("BUG: unexpected error in compression step {directive:?}: {code}"),
        }
    }

    /// Feeds the input buffer to the codec, spilling the output buffer once it
    /// is half full or the codec stalls.
    fn flush_in_buf(&mut self) -> Result<()> {
        let progress = self.step(EndDirective::Continue);

        self.in_buf.copy_within(progress.consumed..self.in_end, 0);
        self.in_end -= progress.consumed;

        let free = self.out_buf.len() - self.out_end;
        if free > self.out_end && progress.consumed > 0 {
            return Ok(());
        }
        self.flush_out_buf()
    }

    fn flush_out_buf(&mut self) -> Result<()> {
        if self.out_end == 0 {
            return Ok(());
        }

        let result = self.inner.write_all(&self.out_buf[..self.out_end]);
        self.out_end = 0;
        result.map_err(Error::Write)
    }

    /// Pushes all buffered input through the codec and everything the codec
    /// holds to the downstream writer.
    fn flush_stream(&mut self) -> Result<()> {
        while self.in_end > 0 {
            self.flush_in_buf()?;
        }

        loop {
            let progress = self.step(EndDirective::Flush);
            self.flush_out_buf()?;
            if progress.remaining == 0 {
                break;
            }
        }
        self.state = State::Flushed;
        Ok(())
    }
}

impl<W: Write> Write for Writer<'_, W> {
    /// Always takes all of `buf`, unless writing to the downstream fails.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        self.state = State::Open;

        let mut rest = buf;
        loop {
            let n = rest.len().min(self.in_buf.len() - self.in_end);
            self.in_buf[self.in_end..self.in_end + n].copy_from_slice(&rest[..n]);
            self.in_end += n;
            rest = &rest[n..];
            if rest.is_empty() {
                return Ok(buf.len());
            }
            self.flush_in_buf()?;
        }
    }

    /// Emits everything written so far and flushes the downstream writer.
    fn flush(&mut self) -> io::Result<()> {
        if self.state == State::Open {
            self.flush_stream()?;
        }
        self.inner.flush()
    }
}

impl<W> std::fmt::Debug for Writer<'_, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("params", &self.params)
            .field("dict", &self.dict)
            .field("state", &self.state)
            .field("buffered_in", &self.in_end)
            .field("buffered_out", &self.out_end)
            .finish_non_exhaustive()
    }
}
