// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema-block compressor contract and built-in implementations.
//!
//! The engine treats the compressor as an external collaborator behind a
//! two-method contract. Implementations must be pure and deterministic with
//! `decompress(compress(x)) == x` for any input including empty, and two
//! instances of the same concrete kind must compare equal (the kind is a
//! cache key and rides on the wire so the decoder can verify a match).
//!
//! # Algorithms
//!
//! - **Deflate** (always available via flate2): better ratio, slower
//! - **LZ4** (feature `lz4`): fast, good for latency-sensitive paths
//! - **Identity**: pass-through for payloads that do not benefit

use crate::error::{Error, Result};

/// Concrete compressor kind; rides on the wire in the schema-block flags so
/// both ends can detect a configuration mismatch early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressorKind {
    Identity = 0,
    #[default]
    Deflate = 1,
    #[cfg(feature = "lz4")]
    Lz4 = 2,
}

impl CompressorKind {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Identity),
            1 => Ok(Self::Deflate),
            #[cfg(feature = "lz4")]
            2 => Ok(Self::Lz4),
            other => Err(Error::Compression(format!(
                "unknown compressor kind {}",
                other
            ))),
        }
    }
}

/// Byte transform applied to schema blocks. Pure, deterministic, synchronous;
/// calls block the caller with no built-in timeout or cancellation.
pub trait SchemaCompressor: Send + Sync {
    fn kind(&self) -> CompressorKind;

    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>>;

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>>;
}

impl PartialEq for dyn SchemaCompressor {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
    }
}

/// Pass-through compressor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Identity;

impl SchemaCompressor for Identity {
    fn kind(&self) -> CompressorKind {
        CompressorKind::Identity
    }

    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// Deflate via flate2, fixed level so output stays deterministic.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Deflate;

impl Deflate {
    const LEVEL: u32 = 6;
}

impl SchemaCompressor for Deflate {
    fn kind(&self) -> CompressorKind {
        CompressorKind::Deflate
    }

    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        use flate2::write::DeflateEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(Self::LEVEL));
        encoder
            .write_all(bytes)
            .map_err(|e| Error::Compression(e.to_string()))?;
        encoder.finish().map_err(|e| Error::Compression(e.to_string()))
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        use flate2::read::DeflateDecoder;
        use std::io::Read;

        let mut decoder = DeflateDecoder::new(bytes);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::Compression(e.to_string()))?;
        Ok(out)
    }
}

/// LZ4 via lz4_flex (feature `lz4`), size-prepended framing.
#[cfg(feature = "lz4")]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Lz4;

#[cfg(feature = "lz4")]
impl SchemaCompressor for Lz4 {
    fn kind(&self) -> CompressorKind {
        CompressorKind::Lz4
    }

    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(bytes))
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        lz4_flex::decompress_size_prepended(bytes)
            .map_err(|e| Error::Compression(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(compressor: &dyn SchemaCompressor, payload: &[u8]) {
        let packed = compressor.compress(payload).expect("compress");
        let unpacked = compressor.decompress(&packed).expect("decompress");
        assert_eq!(unpacked, payload);
    }

    #[test]
    fn test_deflate_roundtrip() {
        roundtrip(&Deflate, b"a repetitive payload payload payload payload");
        roundtrip(&Deflate, b"");
        roundtrip(&Deflate, &[0u8; 1024]);
    }

    #[test]
    fn test_identity_roundtrip() {
        roundtrip(&Identity, b"anything");
        roundtrip(&Identity, b"");
    }

    #[test]
    fn test_deflate_is_deterministic() {
        let payload = b"same input, same output, every time";
        let a = Deflate.compress(payload).expect("first");
        let b = Deflate.compress(payload).expect("second");
        assert_eq!(a, b);
    }

    #[test]
    fn test_same_kind_compares_equal() {
        let a: &dyn SchemaCompressor = &Deflate;
        let b: &dyn SchemaCompressor = &Deflate;
        let c: &dyn SchemaCompressor = &Identity;
        assert!(a == b);
        assert!(a != c);
    }

    #[test]
    fn test_kind_byte_roundtrip() {
        assert_eq!(
            CompressorKind::from_u8(CompressorKind::Deflate.to_u8()).expect("deflate"),
            CompressorKind::Deflate
        );
        assert!(CompressorKind::from_u8(0x7F).is_err());
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn test_lz4_roundtrip() {
        roundtrip(&Lz4, b"lz4 payload lz4 payload lz4 payload");
        roundtrip(&Lz4, b"");
    }
}
