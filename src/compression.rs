//! C2 — Compression Codec (spec §4.2).
//!
//! Brotli is the concrete codec (the reference's own choice; its quality
//! knob is natively `0..=11`, matching spec's parameter range exactly). Any
//! codec satisfying the round-trip and sizing contract would do — this one
//! is what the example pack reaches for when it needs a real in-process
//! compressor rather than an HTTP transport feature.

use std::io::{Read, Write};

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

const LG_WINDOW_SIZE: u32 = 22;
const BUFFER_SIZE: usize = 4096;

/// Below this plaintext size, and below 10% savings, compression is not
/// `recommended` by `analyze` (spec §4.2).
const RECOMMEND_MIN_BYTES: usize = 500;
const RECOMMEND_MIN_PERCENT_SAVED: f64 = 10.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressResult {
    pub compressed: Vec<u8>,
    pub original_size: usize,
    pub compressed_size: usize,
    pub ratio: f64,
    pub percent_saved: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressBase64Result {
    pub compressed_base64: String,
    pub original_size: usize,
    pub compressed_size: usize,
    pub ratio: f64,
    pub percent_saved: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResult {
    pub uncompressed: usize,
    pub compressed: usize,
    pub ratio: f64,
    pub percent_saved: f64,
    pub recommended: bool,
}

fn ratio_and_saved(original: usize, compressed: usize) -> (f64, f64) {
    if original == 0 {
        return (1.0, 0.0);
    }
    let ratio = compressed as f64 / original as f64;
    let percent_saved = (1.0 - ratio) * 100.0;
    (ratio, percent_saved)
}

/// Stateless compression codec. Cheap to construct; held as a single
/// process-wide instance by convention, not because it carries any state.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompressionCodec;

impl CompressionCodec {
    pub fn new() -> Self {
        Self
    }

    pub fn compress(&self, plaintext: &[u8], quality: Option<u32>) -> Result<CompressResult> {
        let quality = crate::config::Config::clamp_quality(quality);
        let mut compressed = Vec::new();
        {
            let mut writer =
                brotli::CompressorWriter::new(&mut compressed, BUFFER_SIZE, quality, LG_WINDOW_SIZE);
            writer
                .write_all(plaintext)
                .map_err(|e| CacheError::internal(format!("brotli compress failed: {e}")))?;
        }
        let (ratio, percent_saved) = ratio_and_saved(plaintext.len(), compressed.len());
        Ok(CompressResult {
            original_size: plaintext.len(),
            compressed_size: compressed.len(),
            compressed,
            ratio,
            percent_saved,
        })
    }

    pub fn compress_to_base64(
        &self,
        plaintext: &[u8],
        quality: Option<u32>,
    ) -> Result<CompressBase64Result> {
        let result = self.compress(plaintext, quality)?;
        Ok(CompressBase64Result {
            compressed_base64: base64::engine::general_purpose::STANDARD.encode(&result.compressed),
            original_size: result.original_size,
            compressed_size: result.compressed_size,
            ratio: result.ratio,
            percent_saved: result.percent_saved,
        })
    }

    pub fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut decompressor = brotli::Decompressor::new(compressed, BUFFER_SIZE);
        decompressor
            .read_to_end(&mut out)
            .map_err(|e| CacheError::internal(format!("brotli decompress failed: {e}")))?;
        Ok(out)
    }

    pub fn decompress_from_base64(&self, base64_str: &str) -> Result<Vec<u8>> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(base64_str)
            .map_err(|e| CacheError::invalid_argument(format!("invalid base64: {e}")))?;
        self.decompress(&raw)
    }

    /// Whether compressing `plaintext` would be worth admitting into the
    /// cache, per the `recommended` rule in spec §4.2.
    pub fn analyze(&self, plaintext: &[u8]) -> Result<AnalyzeResult> {
        let result = self.compress(plaintext, None)?;
        let recommended =
            result.percent_saved >= RECOMMEND_MIN_PERCENT_SAVED && plaintext.len() >= RECOMMEND_MIN_BYTES;
        Ok(AnalyzeResult {
            uncompressed: result.original_size,
            compressed: result.compressed_size,
            ratio: result.ratio,
            percent_saved: result.percent_saved,
            recommended,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_byte_exact() {
        let codec = CompressionCodec::new();
        let input = b"the quick brown fox jumps over the lazy dog".repeat(50);
        let compressed = codec.compress(&input, None).unwrap();
        let decompressed = codec.decompress(&compressed.compressed).unwrap();
        assert_eq!(decompressed, input);
    }

    #[test]
    fn base64_round_trip_is_byte_exact() {
        let codec = CompressionCodec::new();
        let input = b"a".repeat(10_000);
        let compressed = codec.compress_to_base64(&input, Some(7)).unwrap();
        let decompressed = codec
            .decompress_from_base64(&compressed.compressed_base64)
            .unwrap();
        assert_eq!(decompressed, input);
    }

    #[test]
    fn highly_repetitive_text_compresses_well() {
        let codec = CompressionCodec::new();
        let input = "a".repeat(10_000);
        let analysis = codec.analyze(input.as_bytes()).unwrap();
        assert!(analysis.percent_saved > 50.0);
        assert!(analysis.recommended);
    }

    #[test]
    fn tiny_input_is_not_recommended() {
        let codec = CompressionCodec::new();
        let analysis = codec.analyze(b"foo").unwrap();
        assert!(!analysis.recommended);
    }

    #[test]
    fn quality_out_of_range_clamps_instead_of_failing() {
        let codec = CompressionCodec::new();
        let input = b"hello world".repeat(100);
        let result = codec.compress(&input, Some(999));
        assert!(result.is_ok());
    }
}
