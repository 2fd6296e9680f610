//! PACK2 archive readers
//!
//! [`Pack2Reader`] works over a blocking [`ReadAt`] source and
//! [`AsyncPack2Reader`] over an [`AsyncReadAt`](crate::io::AsyncReadAt) one.
//! Both validate the header once, on first use, and then serve the index and
//! asset bytes with positional reads. Nothing beyond the validated flag is
//! cached; every call goes back to the source.
//!
//! ```rust
//! use pack2::{Pack2Reader, Pack2Writer, ZipStatus, hash_name};
//!
//! # fn example() -> Result<(), pack2::Pack2Error> {
//! let mut writer = Pack2Writer::new(Vec::new());
//! writer.write_asset(hash_name("readme.txt"), b"hello", ZipStatus::ZIPPED, None)?;
//! writer.close()?;
//!
//! let reader = Pack2Reader::open(writer.into_inner()?)?;
//! let entry = reader.find_asset(hash_name("README.TXT"))?.expect("asset present");
//! assert_eq!(reader.read_asset_data(&entry, false)?, b"hello");
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod nonblocking;

pub use nonblocking::AsyncPack2Reader;

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace};

use crate::block::{self, BLOCK_PREAMBLE_SIZE, ZlibCodec};
use crate::config::ReaderOptions;
use crate::error::{Pack2Error, Pack2Result};
use crate::hash::{NAMELIST_HASH, data_hash};
use crate::io::ReadAt;
use crate::layout::{AssetHeader, HEADER_SIZE, Header, decode_entries};
use crate::namelist::Namelist;

/// Blocking PACK2 reader
///
/// Reads take `&self` and build their own decompression state, so a reader
/// can be shared between threads when its source can.
pub struct Pack2Reader<S: ReadAt> {
    source: S,
    options: ReaderOptions,
    validated: AtomicBool,
    closed: bool,
}

impl<S: ReadAt> Pack2Reader<S> {
    /// Create a reader with default options; validation happens on first use
    pub fn new(source: S) -> Self {
        Self::with_options(source, ReaderOptions::default())
    }

    /// Create a reader with explicit options
    pub fn with_options(source: S, options: ReaderOptions) -> Self {
        Self {
            source,
            options,
            validated: AtomicBool::new(false),
            closed: false,
        }
    }

    /// Create a reader and validate the archive immediately
    pub fn open(source: S) -> Pack2Result<Self> {
        let reader = Self::new(source);
        reader.validate()?;
        Ok(reader)
    }

    /// Options in effect
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Check the header and that the index lies within the source
    ///
    /// Runs once; later calls return immediately.
    pub fn validate(&self) -> Pack2Result<()> {
        self.ensure_open()?;
        if self.validated.load(Ordering::Acquire) {
            return Ok(());
        }

        let source_len = self.source.length()?;
        check_header_fits(source_len)?;

        let mut buf = [0u8; HEADER_SIZE];
        self.source.read_exact_at(&mut buf, 0)?;
        let header = Header::decode(&buf)?;
        header.validate(source_len)?;

        debug!(
            asset_count = header.asset_count,
            asset_map_offset = header.asset_map_offset,
            source_len,
            "validated PACK2 archive"
        );
        self.validated.store(true, Ordering::Release);
        Ok(())
    }

    /// Read and decode the archive header
    pub fn read_header(&self) -> Pack2Result<Header> {
        self.validate()?;

        let mut buf = [0u8; HEADER_SIZE];
        self.source.read_exact_at(&mut buf, 0)?;
        Header::decode(&buf)
    }

    /// Read the whole index, in stored order
    pub fn read_asset_headers(&self) -> Pack2Result<Vec<AssetHeader>> {
        let header = self.read_header()?;
        let (count, size) = asset_map_extent(&header)?;

        let mut buf = vec![0u8; size];
        self.source.read_exact_at(&mut buf, header.asset_map_offset)?;
        decode_entries(&buf, count)
    }

    /// First index entry carrying `name_hash`
    pub fn find_asset(&self, name_hash: u64) -> Pack2Result<Option<AssetHeader>> {
        Ok(self
            .read_asset_headers()?
            .into_iter()
            .find(|entry| entry.name_hash == name_hash))
    }

    /// Decompressed length of an asset
    ///
    /// Unzipped assets need no I/O. Zipped assets read only the 8-byte block
    /// preamble.
    pub fn get_asset_length(&self, entry: &AssetHeader) -> Pack2Result<u32> {
        self.validate()?;
        if !entry.zip_status.is_zipped() {
            return unzipped_length(entry);
        }

        let mut preamble = [0u8; BLOCK_PREAMBLE_SIZE];
        self.source.read_exact_at(&mut preamble, entry.data_offset)?;
        block::declared_length(&preamble)
    }

    /// Read an asset's bytes
    ///
    /// With `raw` set, or for unzipped assets, the stored bytes are returned
    /// unchanged; otherwise the compressed block is unframed.
    pub fn read_asset_data(&self, entry: &AssetHeader, raw: bool) -> Pack2Result<Vec<u8>> {
        self.validate()?;
        let stored_len = check_stored_extent(entry, self.source.length()?)?;

        let mut stored = vec![0u8; stored_len];
        self.source.read_exact_at(&mut stored, entry.data_offset)?;
        trace!(
            name_hash = entry.name_hash,
            data_offset = entry.data_offset,
            data_size = entry.data_size,
            "read asset"
        );

        decode_asset(entry, stored, raw, &self.options)
    }

    /// Read an asset into `buf`, returning the number of bytes written
    ///
    /// Fails with `OutOfRange` before reading the payload if `buf` is too
    /// small.
    pub fn read_asset_data_into(
        &self,
        entry: &AssetHeader,
        buf: &mut [u8],
        raw: bool,
    ) -> Pack2Result<usize> {
        self.validate()?;
        let needed = if raw {
            stored_len(entry)?
        } else {
            self.get_asset_length(entry)? as usize
        };
        check_output_len(needed, buf.len())?;

        let data = self.read_asset_data(entry, raw)?;
        copy_out(&data, buf)
    }

    /// Load the embedded `{NAMELIST}` asset, if the archive carries one
    pub fn read_namelist(&self) -> Pack2Result<Option<Namelist>> {
        match self.find_asset(NAMELIST_HASH)? {
            Some(entry) => {
                let data = self.read_asset_data(&entry, false)?;
                Namelist::from_bytes(&data).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Mark the reader closed; later operations fail with `ObjectDisposed`
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Check if `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Return the underlying source
    pub fn into_inner(self) -> S {
        self.source
    }

    fn ensure_open(&self) -> Pack2Result<()> {
        if self.closed {
            return Err(Pack2Error::ObjectDisposed);
        }
        Ok(())
    }
}

fn check_header_fits(source_len: u64) -> Pack2Result<()> {
    if source_len < HEADER_SIZE as u64 {
        return Err(Pack2Error::TruncatedArchive {
            required: HEADER_SIZE as u64,
            actual: source_len,
        });
    }
    Ok(())
}

/// Entry count and byte size of the index
fn asset_map_extent(header: &Header) -> Pack2Result<(usize, usize)> {
    let size = usize::try_from(header.asset_map_size())
        .map_err(|_| Pack2Error::AssetTooLarge(header.asset_map_size()))?;
    Ok((header.asset_count as usize, size))
}

fn stored_len(entry: &AssetHeader) -> Pack2Result<usize> {
    usize::try_from(entry.data_size).map_err(|_| Pack2Error::AssetTooLarge(entry.data_size))
}

/// Stored length of `entry`, checked against the source before allocating
fn check_stored_extent(entry: &AssetHeader, source_len: u64) -> Pack2Result<usize> {
    let end = entry.data_end().unwrap_or(u64::MAX);
    if end > source_len {
        return Err(Pack2Error::TruncatedArchive {
            required: end,
            actual: source_len,
        });
    }
    stored_len(entry)
}

fn unzipped_length(entry: &AssetHeader) -> Pack2Result<u32> {
    u32::try_from(entry.data_size).map_err(|_| Pack2Error::AssetTooLarge(entry.data_size))
}

fn check_output_len(needed: usize, available: usize) -> Pack2Result<()> {
    if available < needed {
        return Err(Pack2Error::OutOfRange { needed, available });
    }
    Ok(())
}

fn copy_out(data: &[u8], buf: &mut [u8]) -> Pack2Result<usize> {
    check_output_len(data.len(), buf.len())?;
    buf[..data.len()].copy_from_slice(data);
    Ok(data.len())
}

/// Turn stored bytes into the bytes handed to the caller
fn decode_asset(
    entry: &AssetHeader,
    stored: Vec<u8>,
    raw: bool,
    options: &ReaderOptions,
) -> Pack2Result<Vec<u8>> {
    if raw {
        return Ok(stored);
    }

    let data = if entry.zip_status.is_zipped() {
        let mut codec = ZlibCodec::default();
        block::unframe(&stored, &mut codec, options.max_decompressed_size)?
    } else {
        stored
    };

    if options.verify_data_hash {
        let actual = data_hash(&data);
        if actual != entry.data_hash {
            return Err(Pack2Error::DataHashMismatch {
                expected: entry.data_hash,
                actual,
            });
        }
    }

    Ok(data)
}
