//! Compressed block framing
//!
//! Zipped assets are stored as a small big-endian preamble followed by a
//! zlib stream:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x00   | 4    | Magic `0xA1B2C3D4` (BE) |
//! | 0x04   | 4    | Decompressed length (BE) |
//! | 0x08   | ..   | zlib-wrapped deflate stream |
//!
//! The preamble is big-endian even though every container field is
//! little-endian. The declared length must match the inflated output exactly.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};

use crate::error::{Pack2Error, Pack2Result};

/// Compressed block magic
pub const BLOCK_MAGIC: u32 = 0xA1B2_C3D4;

/// Size of the magic and length preamble
pub const BLOCK_PREAMBLE_SIZE: usize = 8;

/// Default cap on a declared decompressed length (1 GiB)
pub const MAX_DECOMPRESSION_SIZE: usize = 1024 * 1024 * 1024;

/// Output growth step while inflating
pub const INFLATE_CHUNK: usize = 64 * 1024;

/// Owned zlib deflate/inflate handle
///
/// All compression stream state lives here. The inflater is reset before every
/// use, so a codec can be reused but must not be shared between concurrent
/// calls; readers create one per asset.
pub struct ZlibCodec {
    level: Compression,
    inflater: Decompress,
}

impl ZlibCodec {
    /// Create a codec deflating at `level` (0-9)
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
            inflater: Decompress::new(true),
        }
    }

    /// Deflate `data`, appending the zlib stream to `out`
    pub fn deflate_into(&self, data: &[u8], out: Vec<u8>) -> Pack2Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(out, self.level);
        encoder
            .write_all(data)
            .map_err(|e| Pack2Error::CompressionFailed(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| Pack2Error::CompressionFailed(e.to_string()))
    }

    /// Inflate a zlib stream that must produce exactly `expected_len` bytes
    ///
    /// The output grows in [`INFLATE_CHUNK`] steps as the stream produces
    /// data, so a declared length alone never sizes the allocation.
    pub fn inflate(&mut self, compressed: &[u8], expected_len: usize) -> Pack2Result<Vec<u8>> {
        self.reset();

        // One spare byte so an over-long stream shows up as extra output
        let limit = expected_len.saturating_add(1);
        let mut out = Vec::with_capacity(limit.min(INFLATE_CHUNK));
        let start_in = self.inflater.total_in();
        let status = loop {
            let consumed = (self.inflater.total_in() - start_in) as usize;
            let produced = out.len();
            let status = self
                .inflater
                .decompress_vec(&compressed[consumed..], &mut out, FlushDecompress::Finish)
                .map_err(|e| Pack2Error::DecompressionFailed(e.to_string()))?;

            if status == Status::StreamEnd || out.len() > expected_len {
                break status;
            }
            if out.len() == out.capacity() {
                out.reserve_exact(INFLATE_CHUNK.min(limit - out.len()));
                continue;
            }
            if out.len() == produced && (self.inflater.total_in() - start_in) as usize == consumed {
                break status;
            }
        };

        match status {
            Status::StreamEnd if out.len() == expected_len => Ok(out),
            Status::StreamEnd => Err(Pack2Error::DecompressionFailed(format!(
                "declared {expected_len} bytes, stream produced {}",
                out.len()
            ))),
            Status::Ok | Status::BufError if out.len() > expected_len => {
                Err(Pack2Error::DecompressionFailed(format!(
                    "stream exceeds declared length of {expected_len} bytes"
                )))
            }
            Status::Ok | Status::BufError => Err(Pack2Error::DecompressionFailed(format!(
                "stream ended early after {} of {expected_len} bytes",
                out.len()
            ))),
        }
    }

    /// Reset inflate state
    pub fn reset(&mut self) {
        self.inflater.reset(true);
    }
}

impl Default for ZlibCodec {
    fn default() -> Self {
        Self::new(Compression::default().level())
    }
}

/// Frame `data` as a compressed block
pub fn frame(data: &[u8], codec: &ZlibCodec) -> Pack2Result<Vec<u8>> {
    let declared =
        u32::try_from(data.len()).map_err(|_| Pack2Error::AssetTooLarge(data.len() as u64))?;

    let mut out = Vec::with_capacity(BLOCK_PREAMBLE_SIZE + data.len() / 2 + 16);
    out.extend_from_slice(&BLOCK_MAGIC.to_be_bytes());
    out.extend_from_slice(&declared.to_be_bytes());
    codec.deflate_into(data, out)
}

/// Validate a block preamble and return the declared decompressed length
pub fn declared_length(preamble: &[u8]) -> Pack2Result<u32> {
    if preamble.len() < BLOCK_PREAMBLE_SIZE {
        return Err(Pack2Error::BufferTooSmall {
            needed: BLOCK_PREAMBLE_SIZE,
            actual: preamble.len(),
        });
    }

    let magic = u32::from_be_bytes([preamble[0], preamble[1], preamble[2], preamble[3]]);
    if magic != BLOCK_MAGIC {
        return Err(Pack2Error::CorruptCompressedBlock(magic));
    }

    Ok(u32::from_be_bytes([
        preamble[4],
        preamble[5],
        preamble[6],
        preamble[7],
    ]))
}

/// Unframe a stored compressed block
///
/// Declared lengths above `max_len` are rejected before allocating.
pub fn unframe(stored: &[u8], codec: &mut ZlibCodec, max_len: usize) -> Pack2Result<Vec<u8>> {
    if stored.len() < BLOCK_PREAMBLE_SIZE {
        return Err(Pack2Error::DecompressionFailed(format!(
            "stored block of {} bytes is shorter than its preamble",
            stored.len()
        )));
    }
    let declared = declared_length(stored)? as usize;
    if declared > max_len {
        tracing::warn!(declared, max_len, "compressed block exceeds size limit");
        return Err(Pack2Error::DecompressionFailed(format!(
            "declared length {declared} exceeds limit of {max_len} bytes"
        )));
    }

    codec.inflate(&stored[BLOCK_PREAMBLE_SIZE..], declared)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_preamble() {
        let framed = frame(b"Hello, PACK2!", &ZlibCodec::default()).unwrap();
        assert_eq!(&framed[0..4], &[0xA1, 0xB2, 0xC3, 0xD4]);
        assert_eq!(&framed[4..8], &13u32.to_be_bytes());
        // zlib header
        assert_eq!(framed[8], 0x78);
        assert_eq!(declared_length(&framed).unwrap(), 13);
    }

    #[test]
    fn test_round_trip_empty() {
        let mut codec = ZlibCodec::default();
        let framed = frame(b"", &codec).unwrap();
        assert_eq!(declared_length(&framed).unwrap(), 0);
        assert!(
            unframe(&framed, &mut codec, MAX_DECOMPRESSION_SIZE)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_codec_reuse() {
        let mut codec = ZlibCodec::new(9);
        let first = frame(&[7u8; 4096], &codec).unwrap();
        let second = frame(b"second payload", &codec).unwrap();

        assert_eq!(
            unframe(&first, &mut codec, MAX_DECOMPRESSION_SIZE).unwrap(),
            vec![7u8; 4096]
        );
        assert_eq!(
            unframe(&second, &mut codec, MAX_DECOMPRESSION_SIZE).unwrap(),
            b"second payload"
        );
    }

    #[test]
    fn test_corrupt_magic() {
        let mut codec = ZlibCodec::default();
        let mut framed = frame(b"payload", &codec).unwrap();
        framed[0] ^= 0xFF;

        let err = unframe(&framed, &mut codec, MAX_DECOMPRESSION_SIZE).unwrap_err();
        assert!(matches!(err, Pack2Error::CorruptCompressedBlock(0x5EB2_C3D4)));
    }

    #[test]
    fn test_length_mismatch() {
        let mut codec = ZlibCodec::default();
        let data = b"the quick brown fox jumps over the lazy dog";

        let mut short = frame(data, &codec).unwrap();
        short[4..8].copy_from_slice(&10u32.to_be_bytes());
        assert!(matches!(
            unframe(&short, &mut codec, MAX_DECOMPRESSION_SIZE),
            Err(Pack2Error::DecompressionFailed(_))
        ));

        let mut long = frame(data, &codec).unwrap();
        long[4..8].copy_from_slice(&100u32.to_be_bytes());
        assert!(matches!(
            unframe(&long, &mut codec, MAX_DECOMPRESSION_SIZE),
            Err(Pack2Error::DecompressionFailed(_))
        ));
    }

    #[test]
    fn test_truncated_stream() {
        let mut codec = ZlibCodec::default();
        let data: Vec<u8> = (0..2048u32).map(|i| (i * 31 % 251) as u8).collect();
        let framed = frame(&data, &codec).unwrap();

        let truncated = &framed[..framed.len() / 2];
        assert!(matches!(
            unframe(truncated, &mut codec, MAX_DECOMPRESSION_SIZE),
            Err(Pack2Error::DecompressionFailed(_))
        ));
    }

    #[test]
    fn test_size_limit() {
        let mut codec = ZlibCodec::default();
        let framed = frame(&[0u8; 64], &codec).unwrap();
        assert!(matches!(
            unframe(&framed, &mut codec, 63),
            Err(Pack2Error::DecompressionFailed(_))
        ));
    }

    #[test]
    fn test_short_block() {
        let mut codec = ZlibCodec::default();
        let err = unframe(&[0xA1, 0xB2, 0xC3, 0xD4], &mut codec, MAX_DECOMPRESSION_SIZE)
            .unwrap_err();
        assert!(matches!(err, Pack2Error::DecompressionFailed(_)));
        assert!(err.is_per_asset());
    }

    #[test]
    fn test_declared_length_does_not_size_allocation() {
        let mut codec = ZlibCodec::default();
        let mut framed = frame(b"tiny", &codec).unwrap();
        framed[4..8].copy_from_slice(&(512u32 * 1024 * 1024).to_be_bytes());

        let compressed = framed[BLOCK_PREAMBLE_SIZE..].to_vec();
        assert!(matches!(
            codec.inflate(&compressed, 512 * 1024 * 1024),
            Err(Pack2Error::DecompressionFailed(_))
        ));
        assert!(matches!(
            unframe(&framed, &mut codec, MAX_DECOMPRESSION_SIZE),
            Err(Pack2Error::DecompressionFailed(_))
        ));
    }

    #[test]
    fn test_round_trip_spans_chunks() {
        let mut codec = ZlibCodec::default();
        let data: Vec<u8> = (0..(3 * INFLATE_CHUNK + 17) as u32)
            .map(|i| (i * 7 % 253) as u8)
            .collect();
        let framed = frame(&data, &codec).unwrap();
        assert_eq!(unframe(&framed, &mut codec, MAX_DECOMPRESSION_SIZE).unwrap(), data);

        let exact = data[..INFLATE_CHUNK].to_vec();
        let framed = frame(&exact, &codec).unwrap();
        assert_eq!(unframe(&framed, &mut codec, MAX_DECOMPRESSION_SIZE).unwrap(), exact);
    }

    #[test]
    fn test_short_preamble() {
        assert!(matches!(
            declared_length(&[0xA1, 0xB2, 0xC3]),
            Err(Pack2Error::BufferTooSmall { needed: 8, actual: 3 })
        ));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;
        use proptest::test_runner::TestCaseError;

        proptest! {
            #[test]
            fn frame_round_trip(data in prop::collection::vec(any::<u8>(), 0..8192), level in 0u32..=9) {
                let mut codec = ZlibCodec::new(level);
                let framed = frame(&data, &codec).map_err(|e| TestCaseError::fail(e.to_string()))?;
                let unframed = unframe(&framed, &mut codec, MAX_DECOMPRESSION_SIZE)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(unframed, data);
            }

            #[test]
            fn bad_magic_always_rejected(
                magic in any::<u32>().prop_filter("not block magic", |m| *m != BLOCK_MAGIC),
                data in prop::collection::vec(any::<u8>(), 0..256),
            ) {
                let mut codec = ZlibCodec::default();
                let mut framed = frame(&data, &codec).map_err(|e| TestCaseError::fail(e.to_string()))?;
                framed[0..4].copy_from_slice(&magic.to_be_bytes());
                let is_corrupt = matches!(
                    unframe(&framed, &mut codec, MAX_DECOMPRESSION_SIZE),
                    Err(Pack2Error::CorruptCompressedBlock(m)) if m == magic
                );
                prop_assert!(is_corrupt);
            }
        }
    }
}
