//! zlib-compressed tree blob, as carried by the `ADMIN:TREE` field.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};
use tracing::debug;

use crate::codec;
use crate::error::{Result, TreeError};
use crate::tree::ConfigTree;

/// Default ceiling for an inflated tree.
pub const DEFAULT_MAX_INFLATED: usize = 64 * 1024;

/// Limits applied when inflating a received blob.
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Largest structural encoding accepted after decompression.
    pub max_inflated_size: usize,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            max_inflated_size: DEFAULT_MAX_INFLATED,
        }
    }
}

/// zlib-compress a structural encoding.
pub fn compress(plain: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(plain)
        .map_err(|err| TreeError::EncodeFailed(err.to_string()))?;
    encoder
        .finish()
        .map_err(|err| TreeError::EncodeFailed(err.to_string()))
}

/// Inflate a blob, refusing output larger than `max` bytes.
pub fn decompress(blob: &[u8], max: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(blob)
        .take(max as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|err| TreeError::DecompressionFailure(err.to_string()))?;
    if out.len() > max {
        return Err(TreeError::TreeTooLarge { max });
    }
    Ok(out)
}

/// CRC32 (IEEE) of a blob, as advertised by `ADMIN:CRC32`.
pub fn checksum(blob: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(blob);
    crc.sum()
}

impl ConfigTree {
    /// Structural encoding of this tree, compressed.
    pub fn to_blob(&self) -> Result<Vec<u8>> {
        compress(&codec::encode(&self.to_def())?)
    }

    /// Inflate, decode and build a tree from a received blob.
    ///
    /// The caller's current tree is untouched whatever the outcome; swapping
    /// the result in is the caller's decision.
    pub fn from_blob(blob: &[u8], config: &BlobConfig) -> Result<Self> {
        let plain = decompress(blob, config.max_inflated_size)?;
        let def = codec::decode(&plain)?;
        let tree = Self::build(&def)?;
        debug!(
            blob_len = blob.len(),
            inflated_len = plain.len(),
            nodes = tree.len(),
            addresses = tree.address_map().len(),
            "inflated tree blob"
        );
        Ok(tree)
    }
}
