//! Async PACK2 reader

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace};

use super::{
    asset_map_extent, check_header_fits, check_output_len, check_stored_extent, copy_out,
    decode_asset, stored_len, unzipped_length,
};
use crate::block::{self, BLOCK_PREAMBLE_SIZE};
use crate::cancel::CancellationFlag;
use crate::config::ReaderOptions;
use crate::error::{Pack2Error, Pack2Result};
use crate::hash::NAMELIST_HASH;
use crate::io::AsyncReadAt;
use crate::layout::{AssetHeader, HEADER_SIZE, Header, decode_entries};
use crate::namelist::Namelist;

/// Async PACK2 reader
///
/// Mirrors [`Pack2Reader`](super::Pack2Reader): each operation suspends only
/// on source reads and checks the cancellation flag between steps.
pub struct AsyncPack2Reader<S: AsyncReadAt> {
    source: S,
    options: ReaderOptions,
    cancellation: CancellationFlag,
    validated: AtomicBool,
    closed: bool,
}

impl<S: AsyncReadAt> AsyncPack2Reader<S> {
    /// Create a reader with default options; validation happens on first use
    pub fn new(source: S) -> Self {
        Self::with_options(source, ReaderOptions::default())
    }

    /// Create a reader with explicit options
    pub fn with_options(source: S, options: ReaderOptions) -> Self {
        Self {
            source,
            options,
            cancellation: CancellationFlag::new(),
            validated: AtomicBool::new(false),
            closed: false,
        }
    }

    /// Observe `flag` between steps of every operation
    #[must_use]
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = flag;
        self
    }

    /// Create a reader and validate the archive immediately
    pub async fn open(source: S) -> Pack2Result<Self> {
        let reader = Self::new(source);
        reader.validate().await?;
        Ok(reader)
    }

    /// Options in effect
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Check the header and that the index lies within the source
    pub async fn validate(&self) -> Pack2Result<()> {
        self.ensure_open()?;
        if self.validated.load(Ordering::Acquire) {
            return Ok(());
        }
        self.cancellation.check()?;

        let source_len = self.source.length().await?;
        check_header_fits(source_len)?;

        self.cancellation.check()?;
        let mut buf = [0u8; HEADER_SIZE];
        self.source.read_exact_at(&mut buf, 0).await?;
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
    pub async fn read_header(&self) -> Pack2Result<Header> {
        self.validate().await?;
        self.cancellation.check()?;

        let mut buf = [0u8; HEADER_SIZE];
        self.source.read_exact_at(&mut buf, 0).await?;
        Header::decode(&buf)
    }

    /// Read the whole index, in stored order
    pub async fn read_asset_headers(&self) -> Pack2Result<Vec<AssetHeader>> {
        let header = self.read_header().await?;
        let (count, size) = asset_map_extent(&header)?;
        self.cancellation.check()?;

        let mut buf = vec![0u8; size];
        self.source
            .read_exact_at(&mut buf, header.asset_map_offset)
            .await?;
        decode_entries(&buf, count)
    }

    /// First index entry carrying `name_hash`
    pub async fn find_asset(&self, name_hash: u64) -> Pack2Result<Option<AssetHeader>> {
        Ok(self
            .read_asset_headers()
            .await?
            .into_iter()
            .find(|entry| entry.name_hash == name_hash))
    }

    /// Decompressed length of an asset, reading at most the block preamble
    pub async fn get_asset_length(&self, entry: &AssetHeader) -> Pack2Result<u32> {
        self.validate().await?;
        if !entry.zip_status.is_zipped() {
            return unzipped_length(entry);
        }
        self.cancellation.check()?;

        let mut preamble = [0u8; BLOCK_PREAMBLE_SIZE];
        self.source
            .read_exact_at(&mut preamble, entry.data_offset)
            .await?;
        block::declared_length(&preamble)
    }

    /// Read an asset's bytes, unframing zipped assets unless `raw` is set
    pub async fn read_asset_data(&self, entry: &AssetHeader, raw: bool) -> Pack2Result<Vec<u8>> {
        self.validate().await?;
        self.cancellation.check()?;
        let stored_len = check_stored_extent(entry, self.source.length().await?)?;

        self.cancellation.check()?;
        let mut stored = vec![0u8; stored_len];
        self.source
            .read_exact_at(&mut stored, entry.data_offset)
            .await?;
        trace!(
            name_hash = entry.name_hash,
            data_offset = entry.data_offset,
            data_size = entry.data_size,
            "read asset"
        );

        self.cancellation.check()?;
        decode_asset(entry, stored, raw, &self.options)
    }

    /// Read an asset into `buf`, returning the number of bytes written
    pub async fn read_asset_data_into(
        &self,
        entry: &AssetHeader,
        buf: &mut [u8],
        raw: bool,
    ) -> Pack2Result<usize> {
        self.validate().await?;
        let needed = if raw {
            stored_len(entry)?
        } else {
            self.get_asset_length(entry).await? as usize
        };
        check_output_len(needed, buf.len())?;

        let data = self.read_asset_data(entry, raw).await?;
        copy_out(&data, buf)
    }

    /// Load the embedded `{NAMELIST}` asset, if the archive carries one
    pub async fn read_namelist(&self) -> Pack2Result<Option<Namelist>> {
        match self.find_asset(NAMELIST_HASH).await? {
            Some(entry) => {
                let data = self.read_asset_data(&entry, false).await?;
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
