//! Asset name hashing
//!
//! PACK2 stores no names, only a 64-bit hash of the upper-cased name. The
//! hash is CRC-64 with the Jones polynomial in reflected form
//! (`0x95AC9329AC4BC9B5`), an all-ones initial value and an all-ones final
//! XOR. Upper-casing is ASCII-only and applied byte by byte.

/// Reflected Jones polynomial
const POLY: u64 = 0x95AC_9329_AC4B_C9B5;

const TABLE: [u64; 256] = build_table();

const fn build_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u64;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Name of the embedded namelist asset
pub const NAMELIST_NAME: &str = "{NAMELIST}";

/// `hash_name("{NAMELIST}")`
pub const NAMELIST_HASH: u64 = 0x4137_CC65_BD97_FD30;

/// Hash an asset name
///
/// Names are case-insensitive: `hash_name("Foo.dds") == hash_name("FOO.DDS")`.
///
/// # Examples
///
/// ```
/// use pack2::hash::{NAMELIST_HASH, hash_name};
///
/// assert_eq!(hash_name("{NAMELIST}"), NAMELIST_HASH);
/// ```
pub fn hash_name(name: &str) -> u64 {
    let mut crc = u64::MAX;
    for &byte in name.as_bytes() {
        let index = (crc ^ u64::from(byte.to_ascii_uppercase())) & 0xFF;
        crc = TABLE[index as usize] ^ (crc >> 8);
    }
    !crc
}

/// CRC-32 of decompressed asset bytes, the value PACK2 stores as DataHash
///
/// Writers never compute this themselves; callers that want a populated
/// DataHash pass the result to `write_asset`.
pub fn data_hash(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namelist_hash() {
        assert_eq!(hash_name(NAMELIST_NAME), NAMELIST_HASH);
    }

    #[test]
    fn test_known_vectors() {
        assert_eq!(hash_name(""), 0);
        assert_eq!(hash_name("FOO.DDS"), 0x90C6_0222_420B_FF61);
        assert_eq!(hash_name("Test.txt"), 0xD836_0656_5600_4425);
        assert_eq!(hash_name("ui_splash.dds"), 0x57F9_A279_0668_410D);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(hash_name("Foo.dds"), hash_name("FOO.DDS"));
        assert_eq!(hash_name("foo.dds"), hash_name("fOo.DdS"));
        assert_ne!(hash_name("foo.dds"), hash_name("foo.dd"));
    }

    #[test]
    fn test_table_entries() {
        assert_eq!(TABLE[0], 0);
        assert_eq!(TABLE[1], 0x7AD8_70C8_3035_8979);
    }

    #[test]
    fn test_data_hash() {
        assert_eq!(data_hash(b"hello world"), 0x0D4A_1185);
        assert_eq!(data_hash(b""), 0);
    }
}
