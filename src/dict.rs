//! Prepared dictionaries.
//!
//! A dictionary is digested once into a codec-ready form, separately for
//! compression and decompression. Both forms are immutable and can be shared
//! by any number of concurrent operations. The native encoding is freed when
//! the handle is dropped, so it is released exactly once.

use std::fmt;

use zstd::dict::{DecoderDictionary, EncoderDictionary};
use zstd::zstd_safe::{CDict, DDict};

use crate::error::{Error, Result};
use crate::zstd::DEFAULT_COMPRESSION_LEVEL;

/// A dictionary prepared for compression.
///
/// [`new`](Self::new) copies the dictionary bytes into the native encoding.
/// [`by_ref`](Self::by_ref) keeps referring to the caller's bytes, which then
/// have to outlive the handle.
pub struct CompressionDict<'a> {
    inner: EncoderDictionary<'a>,
    level: i32,
    len: usize,
}

impl CompressionDict<'static> {
    pub fn new(dict: &[u8]) -> Result<Self> {
        Self::with_level(dict, DEFAULT_COMPRESSION_LEVEL)
    }

    pub fn with_level(dict: &[u8], level: i32) -> Result<Self> {
        check_not_empty(dict)?;
        tracing::debug!(len = dict.len(), level, "preparing compression dictionary");
        Ok(Self {
            inner: EncoderDictionary::copy(dict, level),
            level,
            len: dict.len(),
        })
    }
}

impl<'a> CompressionDict<'a> {
    pub fn by_ref(dict: &'a [u8]) -> Result<Self> {
        Self::by_ref_with_level(dict, DEFAULT_COMPRESSION_LEVEL)
    }

    pub fn by_ref_with_level(dict: &'a [u8], level: i32) -> Result<Self> {
        check_not_empty(dict)?;
        tracing::debug!(len = dict.len(), level, "referencing compression dictionary");
        Ok(Self {
            inner: EncoderDictionary::new(dict, level),
            level,
            len: dict.len(),
        })
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    /// Size of the raw dictionary this was built from.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn as_cdict(&self) -> &CDict<'a> {
        self.inner.as_cdict()
    }
}

impl fmt::Debug for CompressionDict<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionDict")
            .field("level", &self.level)
            .field("len", &self.len)
            .finish()
    }
}

/// A dictionary prepared for decompression.
pub struct DecompressionDict<'a> {
    inner: DecoderDictionary<'a>,
    len: usize,
}

impl DecompressionDict<'static> {
    pub fn new(dict: &[u8]) -> Result<Self> {
        check_not_empty(dict)?;
        tracing::debug!(len = dict.len(), "preparing decompression dictionary");
        Ok(Self {
            inner: DecoderDictionary::copy(dict),
            len: dict.len(),
        })
    }
}

impl<'a> DecompressionDict<'a> {
    pub fn by_ref(dict: &'a [u8]) -> Result<Self> {
        check_not_empty(dict)?;
        tracing::debug!(len = dict.len(), "referencing decompression dictionary");
        Ok(Self {
            inner: DecoderDictionary::new(dict),
            len: dict.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn as_ddict(&self) -> &DDict<'a> {
        self.inner.as_ddict()
    }
}

impl fmt::Debug for DecompressionDict<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecompressionDict")
            .field("len", &self.len)
            .finish()
    }
}

fn check_not_empty(dict: &[u8]) -> Result<()> {
    if dict.is_empty() {
        return Err(Error::EmptyDictionary);
    }
    Ok(())
}

/// Trains a dictionary of at most `desired_len` bytes on `samples`.
///
/// Empty samples are skipped. When the trainer rejects the input (too few or
/// too small samples) the returned dictionary is empty, which
/// [`CompressionDict::new`] and [`DecompressionDict::new`] refuse.
pub fn build_dict<S: AsRef<[u8]>>(samples: &[S], desired_len: usize) -> Vec<u8> {
    let samples: Vec<&[u8]> = samples
        .iter()
        .map(AsRef::as_ref)
        .filter(|sample| !sample.is_empty())
        .collect();

    match zstd::dict::from_samples(&samples, desired_len) {
        Ok(dict) => {
            tracing::debug!(
                samples = samples.len(),
                desired_len,
                len = dict.len(),
                "trained dictionary"
            );
            dict
        }
        Err(err) => {
            tracing::warn!(samples = samples.len(), desired_len, %err, "cannot train dictionary");
            Vec::new()
        }
    }
}
