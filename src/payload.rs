//! Optional compression of note payloads before encryption
//!
//! Compression is zlib-framed deflate. It is best-effort: if the
//! compressor reports an error the payload is stored as-is, and the
//! returned [`Prepared`] records which path was taken.

use miniz_oxide::DataFormat;
use miniz_oxide::deflate::core::{CompressorOxide, TDEFLFlush, TDEFLStatus, compress};
use miniz_oxide::inflate::{TINFLStatus, decompress_to_vec_zlib_with_limit};
use tracing::warn;

use crate::error::{ErrorCategory, ErrorKind, NotecryptError, Result};

/// zlib's default level, which is also what the deflate crates default to.
const COMPRESSION_LEVEL: u8 = 6;

/// A payload ready for sealing, tagged with how it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prepared {
    Compressed(Vec<u8>),
    Uncompressed(Vec<u8>),
}

impl Prepared {
    pub fn is_compressed(&self) -> bool {
        matches!(self, Prepared::Compressed(_))
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Prepared::Compressed(b) | Prepared::Uncompressed(b) => b,
        }
    }
}

/// Prepare plaintext for encryption, compressing it if requested.
pub fn prepare(plaintext: &[u8], compress: bool) -> Prepared {
    prepare_with(plaintext, compress, zlib_compress)
}

fn prepare_with(
    plaintext: &[u8],
    compress: bool,
    compressor: impl FnOnce(&[u8]) -> Result<Vec<u8>>,
) -> Prepared {
    if !compress {
        return Prepared::Uncompressed(plaintext.to_vec());
    }

    match compressor(plaintext) {
        Ok(compressed) => Prepared::Compressed(compressed),
        Err(e) => {
            warn!(error = %e, "compression failed, storing payload uncompressed");
            Prepared::Uncompressed(plaintext.to_vec())
        }
    }
}

/// Invert [`prepare`].
///
/// `max_len` bounds the size of the decompressed output.
pub fn restore(bytes: &[u8], was_compressed: bool, max_len: usize) -> Result<Vec<u8>> {
    if !was_compressed {
        if bytes.len() > max_len {
            return Err(too_large(max_len));
        }
        return Ok(bytes.to_vec());
    }

    decompress_to_vec_zlib_with_limit(bytes, max_len).map_err(|e| match e.status {
        TINFLStatus::HasMoreOutput => too_large(max_len),
        status => NotecryptError::malformed(format!("compressed payload is corrupt: {:?}", status)),
    })
}

fn too_large(max_len: usize) -> NotecryptError {
    NotecryptError::invalid_parameter(format!(
        "decrypted note exceeds the size limit of {} bytes",
        max_len
    ))
}

fn zlib_compress(mut input: &[u8]) -> Result<Vec<u8>> {
    let mut compressor = Box::<CompressorOxide>::default();
    compressor.set_format_and_level(DataFormat::Zlib, COMPRESSION_LEVEL);

    let mut output = vec![0u8; std::cmp::max(input.len() / 2, 64)];
    let mut out_pos = 0;
    loop {
        let (status, bytes_in, bytes_out) = compress(
            &mut compressor,
            input,
            &mut output[out_pos..],
            TDEFLFlush::Finish,
        );
        out_pos += bytes_out;

        match status {
            TDEFLStatus::Done => {
                output.truncate(out_pos);
                return Ok(output);
            }
            TDEFLStatus::Okay if bytes_in <= input.len() => {
                input = &input[bytes_in..];
                if output.len().saturating_sub(out_pos) < 30 {
                    output.resize(output.len() * 2, 0);
                }
            }
            status => {
                return Err(NotecryptError::with_kind(
                    ErrorCategory::Internal,
                    ErrorKind::CompressionFailure,
                    format!("deflate returned {:?}", status),
                ));
            }
        }
    }
}
