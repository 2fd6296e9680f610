//! PACK2 header and index entry layout
//!
//! All container fields are little-endian. The archive starts with a fixed
//! 160-byte header; the index ("asset map") is a contiguous array of 32-byte
//! entries at `asset_map_offset`.
//!
//! Header (160 bytes):
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x00   | 3    | Magic `PAK` |
//! | 0x03   | 1    | Version (1) |
//! | 0x04   | 4    | Asset count |
//! | 0x08   | 8    | Archive length |
//! | 0x10   | 8    | Asset map offset |
//! | 0x18   | 8    | Unknown (256) |
//! | 0x20   | 128  | Checksum (opaque) |
//!
//! Index entry (32 bytes):
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x00   | 8    | Name hash |
//! | 0x08   | 8    | Data offset |
//! | 0x10   | 8    | Stored data size |
//! | 0x18   | 4    | Zip status |
//! | 0x1C   | 4    | Data hash (CRC-32 of decompressed bytes) |
//!
//! Decoding never checks magic or version; that is left to
//! [`Header::validate`] so the codec can be exercised on arbitrary bytes.

use std::io::Cursor;

use binrw::io::{Read, Seek, Write};
use binrw::{BinRead, BinResult, BinWrite, Endian};
use thiserror::Error;

use crate::error::{Pack2Error, Pack2Result};

/// Header magic bytes
pub const PACK2_MAGIC: [u8; 3] = *b"PAK";

/// The only supported format version
pub const PACK2_VERSION: u8 = 1;

/// Size of the encoded header
pub const HEADER_SIZE: usize = 0xA0; // 160 bytes

/// Size of one encoded index entry
pub const ASSET_HEADER_SIZE: usize = 0x20; // 32 bytes

/// Conventional value of the reserved `unknown` header field
pub const HEADER_UNKNOWN: u64 = 256;

/// Size of the opaque header checksum
pub const CHECKSUM_SIZE: usize = 128;

/// Compression tag of a stored asset
///
/// The alternate forms are legacy aliases: they read and write exactly like
/// their primary counterpart and only differ in their wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZipStatus {
    /// Stored bytes are the asset bytes (wire 0x00, alternate 0x10)
    Unzipped {
        /// Written as the legacy alias
        alternate: bool,
    },
    /// Stored bytes are a compressed block (wire 0x01, alternate 0x11)
    Zipped {
        /// Written as the legacy alias
        alternate: bool,
    },
}

impl ZipStatus {
    /// Uncompressed, primary wire value
    pub const UNZIPPED: Self = Self::Unzipped { alternate: false };
    /// Compressed, primary wire value
    pub const ZIPPED: Self = Self::Zipped { alternate: false };

    /// Parse from the on-disk value
    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            0x00 => Some(Self::Unzipped { alternate: false }),
            0x01 => Some(Self::Zipped { alternate: false }),
            0x10 => Some(Self::Unzipped { alternate: true }),
            0x11 => Some(Self::Zipped { alternate: true }),
            _ => None,
        }
    }

    /// On-disk value
    pub fn to_wire(self) -> u32 {
        match self {
            Self::Unzipped { alternate: false } => 0x00,
            Self::Zipped { alternate: false } => 0x01,
            Self::Unzipped { alternate: true } => 0x10,
            Self::Zipped { alternate: true } => 0x11,
        }
    }

    /// Whether stored bytes are a compressed block
    pub fn is_zipped(self) -> bool {
        matches!(self, Self::Zipped { .. })
    }

    /// Whether this is one of the legacy alias values
    pub fn is_alternate(self) -> bool {
        match self {
            Self::Unzipped { alternate } | Self::Zipped { alternate } => alternate,
        }
    }
}

/// Raised by the binary reader for zip status values outside the known set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown zip status: 0x{0:02X}")]
pub struct UnknownZipStatus(pub u32);

impl BinRead for ZipStatus {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        (): Self::Args<'_>,
    ) -> BinResult<Self> {
        let pos = reader.stream_position()?;
        let raw = u32::read_options(reader, endian, ())?;

        Self::from_wire(raw).ok_or_else(|| binrw::Error::Custom {
            pos,
            err: Box::new(UnknownZipStatus(raw)),
        })
    }
}

impl BinWrite for ZipStatus {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        (): Self::Args<'_>,
    ) -> BinResult<()> {
        self.to_wire().write_options(writer, endian, ())
    }
}

/// PACK2 archive header
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct Header {
    /// Magic bytes (`PAK` in valid archives)
    pub magic: [u8; 3],
    /// Format version (1 in valid archives)
    pub version: u8,
    /// Number of index entries
    pub asset_count: u32,
    /// Total archive size
    pub length: u64,
    /// Byte offset of the index
    pub asset_map_offset: u64,
    /// Reserved, conventionally 256
    pub unknown: u64,
    /// Opaque checksum; never verified, written as zeros
    pub checksum: [u8; CHECKSUM_SIZE],
}

impl Header {
    /// Create a version 1 header with the conventional reserved fields
    pub fn new(asset_count: u32, length: u64, asset_map_offset: u64) -> Self {
        Self {
            magic: PACK2_MAGIC,
            version: PACK2_VERSION,
            asset_count,
            length,
            asset_map_offset,
            unknown: HEADER_UNKNOWN,
            checksum: [0u8; CHECKSUM_SIZE],
        }
    }

    /// Decode from the first [`HEADER_SIZE`] bytes of `buf`
    pub fn decode(buf: &[u8]) -> Pack2Result<Self> {
        ensure_len(buf.len(), HEADER_SIZE)?;
        Ok(Self::read_le(&mut Cursor::new(&buf[..HEADER_SIZE]))?)
    }

    /// Encode into the first [`HEADER_SIZE`] bytes of `buf`
    pub fn encode(&self, buf: &mut [u8]) -> Pack2Result<usize> {
        ensure_len(buf.len(), HEADER_SIZE)?;
        self.write_le(&mut Cursor::new(&mut buf[..HEADER_SIZE]))?;
        Ok(HEADER_SIZE)
    }

    /// Encode into a fresh array
    pub fn to_bytes(&self) -> Pack2Result<[u8; HEADER_SIZE]> {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Byte length of the index described by this header
    pub fn asset_map_size(&self) -> u64 {
        u64::from(self.asset_count) * ASSET_HEADER_SIZE as u64
    }

    /// Check magic, version and that the index fits in `source_len` bytes
    pub fn validate(&self, source_len: u64) -> Pack2Result<()> {
        if self.magic != PACK2_MAGIC {
            return Err(Pack2Error::UnrecognisedFormat(self.magic));
        }

        if self.version != PACK2_VERSION {
            return Err(Pack2Error::UnsupportedVersion(self.version));
        }

        let required = self
            .asset_map_offset
            .checked_add(self.asset_map_size())
            .unwrap_or(u64::MAX);
        if required > source_len {
            return Err(Pack2Error::TruncatedArchive {
                required,
                actual: source_len,
            });
        }

        Ok(())
    }
}

/// One index entry describing a stored asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct AssetHeader {
    /// Name hash, the asset's only stored identity
    pub name_hash: u64,
    /// Absolute offset of the stored payload
    pub data_offset: u64,
    /// Length of the stored (possibly compressed) payload
    pub data_size: u64,
    /// Compression tag
    pub zip_status: ZipStatus,
    /// Caller-supplied CRC-32 of the decompressed bytes
    pub data_hash: u32,
}

impl AssetHeader {
    /// Decode from the first [`ASSET_HEADER_SIZE`] bytes of `buf`
    pub fn decode(buf: &[u8]) -> Pack2Result<Self> {
        ensure_len(buf.len(), ASSET_HEADER_SIZE)?;
        Ok(Self::read_le(&mut Cursor::new(&buf[..ASSET_HEADER_SIZE]))?)
    }

    /// Encode into the first [`ASSET_HEADER_SIZE`] bytes of `buf`
    pub fn encode(&self, buf: &mut [u8]) -> Pack2Result<usize> {
        ensure_len(buf.len(), ASSET_HEADER_SIZE)?;
        self.write_le(&mut Cursor::new(&mut buf[..ASSET_HEADER_SIZE]))?;
        Ok(ASSET_HEADER_SIZE)
    }

    /// Offset one past the end of the stored payload
    pub fn data_end(&self) -> Option<u64> {
        self.data_offset.checked_add(self.data_size)
    }
}

/// Decode `count` consecutive entries, preserving their order
pub fn decode_entries(buf: &[u8], count: usize) -> Pack2Result<Vec<AssetHeader>> {
    let needed = count
        .checked_mul(ASSET_HEADER_SIZE)
        .ok_or(Pack2Error::BufferTooSmall {
            needed: usize::MAX,
            actual: buf.len(),
        })?;
    ensure_len(buf.len(), needed)?;

    buf[..needed]
        .chunks_exact(ASSET_HEADER_SIZE)
        .map(AssetHeader::decode)
        .collect()
}

/// Encode entries as one contiguous index
pub fn encode_entries(entries: &[AssetHeader]) -> Pack2Result<Vec<u8>> {
    let mut buf = vec![0u8; entries.len() * ASSET_HEADER_SIZE];
    for (entry, chunk) in entries.iter().zip(buf.chunks_exact_mut(ASSET_HEADER_SIZE)) {
        entry.encode(chunk)?;
    }
    Ok(buf)
}

fn ensure_len(actual: usize, needed: usize) -> Pack2Result<()> {
    if actual < needed {
        return Err(Pack2Error::BufferTooSmall { needed, actual });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_header_layout() {
        let header = Header::new(3, 0x1234, 0x300);
        let bytes = header.to_bytes().expect("encode header");

        assert_eq!(&bytes[0..3], b"PAK");
        assert_eq!(bytes[3], 1);
        assert_eq!(&bytes[4..8], &3u32.to_le_bytes());
        assert_eq!(&bytes[8..16], &0x1234u64.to_le_bytes());
        assert_eq!(&bytes[16..24], &0x300u64.to_le_bytes());
        assert_eq!(&bytes[24..32], &256u64.to_le_bytes());
        assert!(bytes[32..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_asset_header_layout() {
        let entry = AssetHeader {
            name_hash: 0x4137_CC65_BD97_FD30,
            data_offset: 0x200,
            data_size: 45,
            zip_status: ZipStatus::Zipped { alternate: true },
            data_hash: 0xDEAD_BEEF,
        };
        let mut buf = [0u8; ASSET_HEADER_SIZE];
        assert_eq!(entry.encode(&mut buf).unwrap(), ASSET_HEADER_SIZE);

        assert_eq!(&buf[0..8], &0x4137_CC65_BD97_FD30u64.to_le_bytes());
        assert_eq!(&buf[8..16], &0x200u64.to_le_bytes());
        assert_eq!(&buf[16..24], &45u64.to_le_bytes());
        assert_eq!(&buf[24..28], &0x11u32.to_le_bytes());
        assert_eq!(&buf[28..32], &0xDEAD_BEEFu32.to_le_bytes());

        assert_eq!(AssetHeader::decode(&buf).unwrap(), entry);
    }

    #[test]
    fn test_decode_ignores_magic_and_version() {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..3].copy_from_slice(b"XYZ");
        bytes[3] = 7;
        let header = Header::decode(&bytes).expect("decode does not validate");
        assert_eq!(header.magic, *b"XYZ");
        assert_eq!(header.version, 7);
    }

    #[test]
    fn test_buffer_too_small() {
        let err = Header::decode(&[0u8; HEADER_SIZE - 1]).unwrap_err();
        assert!(matches!(
            err,
            Pack2Error::BufferTooSmall {
                needed: HEADER_SIZE,
                actual: 159
            }
        ));

        let mut short = [0u8; 16];
        let err = AssetHeader {
            name_hash: 0,
            data_offset: 0,
            data_size: 0,
            zip_status: ZipStatus::UNZIPPED,
            data_hash: 0,
        }
        .encode(&mut short)
        .unwrap_err();
        assert!(matches!(err, Pack2Error::BufferTooSmall { .. }));
    }

    #[test]
    fn test_unknown_zip_status() {
        let mut buf = [0u8; ASSET_HEADER_SIZE];
        buf[24..28].copy_from_slice(&2u32.to_le_bytes());
        let err = AssetHeader::decode(&buf).unwrap_err();
        assert!(matches!(err, Pack2Error::UnknownZipStatus(2)));
    }

    #[test]
    fn test_zip_status_wire_values() {
        for wire in [0x00, 0x01, 0x10, 0x11] {
            let status = ZipStatus::from_wire(wire).unwrap();
            assert_eq!(status.to_wire(), wire);
            assert_eq!(status.is_zipped(), wire & 1 == 1);
            assert_eq!(status.is_alternate(), wire & 0x10 == 0x10);
        }
        assert_eq!(ZipStatus::from_wire(0x02), None);
    }

    #[test]
    fn test_validate() {
        let header = Header::new(2, 0x240, 0x200);
        assert!(header.validate(0x240).is_ok());
        assert!(matches!(
            header.validate(0x23F),
            Err(Pack2Error::TruncatedArchive {
                required: 0x240,
                actual: 0x23F
            })
        ));

        let mut bad = header.clone();
        bad.magic = *b"PAC";
        assert!(matches!(
            bad.validate(0x240),
            Err(Pack2Error::UnrecognisedFormat(m)) if m == *b"PAC"
        ));

        let mut bad = header;
        bad.version = 2;
        assert!(matches!(
            bad.validate(0x240),
            Err(Pack2Error::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn test_validate_offset_overflow() {
        let header = Header::new(u32::MAX, 0, u64::MAX - 8);
        assert!(matches!(
            header.validate(u64::MAX - 1),
            Err(Pack2Error::TruncatedArchive { .. })
        ));
    }

    #[test]
    fn test_entries_preserve_order() {
        let entries: Vec<AssetHeader> = [9u64, 3, 7]
            .iter()
            .enumerate()
            .map(|(i, &hash)| AssetHeader {
                name_hash: hash,
                data_offset: 0x200 + i as u64 * 16,
                data_size: 16,
                zip_status: ZipStatus::UNZIPPED,
                data_hash: 0,
            })
            .collect();

        let bytes = encode_entries(&entries).unwrap();
        assert_eq!(bytes.len(), 3 * ASSET_HEADER_SIZE);
        assert_eq!(decode_entries(&bytes, 3).unwrap(), entries);
        assert!(decode_entries(&bytes, 4).is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;
        use proptest::test_runner::TestCaseError;

        fn zip_status() -> impl Strategy<Value = ZipStatus> {
            prop_oneof![
                Just(ZipStatus::Unzipped { alternate: false }),
                Just(ZipStatus::Unzipped { alternate: true }),
                Just(ZipStatus::Zipped { alternate: false }),
                Just(ZipStatus::Zipped { alternate: true }),
            ]
        }

        fn asset_header() -> impl Strategy<Value = AssetHeader> {
            (any::<u64>(), any::<u64>(), any::<u64>(), zip_status(), any::<u32>()).prop_map(
                |(name_hash, data_offset, data_size, zip_status, data_hash)| AssetHeader {
                    name_hash,
                    data_offset,
                    data_size,
                    zip_status,
                    data_hash,
                },
            )
        }

        proptest! {
            #[test]
            fn header_round_trip(
                magic in prop::array::uniform3(any::<u8>()),
                version in any::<u8>(),
                asset_count in any::<u32>(),
                length in any::<u64>(),
                asset_map_offset in any::<u64>(),
                unknown in any::<u64>(),
                checksum in prop::collection::vec(any::<u8>(), CHECKSUM_SIZE),
            ) {
                let mut header = Header::new(asset_count, length, asset_map_offset);
                header.magic = magic;
                header.version = version;
                header.unknown = unknown;
                header.checksum.copy_from_slice(&checksum);

                let bytes = header.to_bytes().map_err(|e| TestCaseError::fail(e.to_string()))?;
                let decoded = Header::decode(&bytes).map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(decoded, header);
            }

            #[test]
            fn asset_header_round_trip(entry in asset_header()) {
                let mut buf = [0u8; ASSET_HEADER_SIZE];
                entry.encode(&mut buf).map_err(|e| TestCaseError::fail(e.to_string()))?;
                let decoded = AssetHeader::decode(&buf).map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(decoded, entry);
            }
        }
    }
}
