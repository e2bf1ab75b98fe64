//! Copying whole streams through a [`Writer`] or [`Reader`].

use std::io::{Read, Write};

use crate::dict::{CompressionDict, DecompressionDict};
use crate::error::Result;
use crate::params::WriterParams;
use crate::reader::Reader;
use crate::writer::Writer;

/// Compresses all of `src` into a single frame on `dst`, at the default level.
pub fn stream_compress<W: Write, R: Read>(dst: W, src: R) -> Result<()> {
    stream_compress_params(dst, src, &WriterParams::new(), None)
}

pub fn stream_compress_level<W: Write, R: Read>(dst: W, src: R, level: i32) -> Result<()> {
    stream_compress_params(dst, src, &WriterParams::new().level(level), None)
}

pub fn stream_compress_dict<W: Write, R: Read>(
    dst: W,
    src: R,
    dict: &CompressionDict<'_>,
) -> Result<()> {
    stream_compress_params(dst, src, &WriterParams::new(), Some(dict))
}

/// Compresses all of `src` into a single frame on `dst`.
///
/// `dst` is not flushed.
pub fn stream_compress_params<'d, W: Write, R: Read>(
    dst: W,
    mut src: R,
    params: &WriterParams,
    dict: Option<&'d CompressionDict<'d>>,
) -> Result<()> {
    let mut writer = Writer::with_params(dst, *params, dict)?;
    writer.read_from(&mut src)?;
    writer.close()
}

/// Decompresses every frame in `src` onto `dst`.
pub fn stream_decompress<W: Write, R: Read>(mut dst: W, src: R) -> Result<()> {
    let mut reader = Reader::new(src)?;
    reader.write_to(&mut dst)?;
    Ok(())
}

pub fn stream_decompress_dict<W: Write, R: Read>(
    mut dst: W,
    src: R,
    dict: &DecompressionDict<'_>,
) -> Result<()> {
    let mut reader = Reader::with_dict(src, dict)?;
    reader.write_to(&mut dst)?;
    Ok(())
}
