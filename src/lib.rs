//! Buffered `zstd` compression for workloads made of many small operations.
//!
//! One-shot [`compress`]/[`decompress`] append to a caller supplied `Vec`,
//! writing straight into its spare capacity, so a reused buffer stops
//! allocating once it is large enough. The codec contexts behind them are
//! pooled and the number of concurrent codec calls is bounded by the number
//! of CPUs.
//!
//! [`Writer`] and [`Reader`] are the streaming counterparts, built on
//! [`std::io::Write`] and [`std::io::Read`]. Their internal buffers come from
//! process wide pools and survive a [`Writer::reset`] or [`Reader::reset`].
//!
//! ```
//! let compressed = zbuf::compress(b"foo bar baz");
//! assert_eq!(zbuf::decompress(&compressed).unwrap(), b"foo bar baz");
//! ```

mod bulk;
mod dict;
mod error;
pub mod limiter;
mod params;
pub mod pool;
mod reader;
mod stream;
mod writer;
mod zstd;

pub use bulk::{compress, compress_level, decompress, CompressionContext, Compressor, Decompressor};
pub use dict::{build_dict, CompressionDict, DecompressionDict};
pub use error::{Error, Result};
pub use params::{CParameter, ResetDirective, Strategy, WriterParams};
pub use reader::Reader;
pub use stream::{
    stream_compress, stream_compress_dict, stream_compress_level, stream_compress_params,
    stream_decompress, stream_decompress_dict,
};
pub use writer::Writer;
pub use crate::zstd::{
    compress_bound, compression_level_range, content_size, cstream_in_size, cstream_out_size,
    dstream_in_size, dstream_out_size, ContentSize, ErrorCode, DEFAULT_COMPRESSION_LEVEL,
    DEFAULT_WINDOW_LOG, WINDOW_LOG_MAX_32, WINDOW_LOG_MAX_64, WINDOW_LOG_MIN,
};
