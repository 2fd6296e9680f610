//! Async PACK2 writer

use tracing::{debug, trace};

use super::{FinalLayout, HEADER_RESERVE, entry_for, stage_asset};
use crate::block::ZlibCodec;
use crate::cancel::CancellationFlag;
use crate::config::WriterOptions;
use crate::error::{Pack2Error, Pack2Result};
use crate::hash::{NAMELIST_HASH, data_hash, hash_name};
use crate::io::AsyncWriteAt;
use crate::layout::{AssetHeader, ZipStatus};
use crate::namelist::Namelist;

/// Async PACK2 writer
///
/// Same layout and state machine as [`Pack2Writer`](super::Pack2Writer).
/// Cancellation is checked before each sink write. A cancelled
/// `write_asset` leaves the index untouched; bytes already handed to the sink
/// are not rolled back.
pub struct AsyncPack2Writer<W: AsyncWriteAt> {
    sink: W,
    codec: ZlibCodec,
    options: WriterOptions,
    cancellation: CancellationFlag,
    position: u64,
    entries: Vec<AssetHeader>,
    closed: bool,
}

impl<W: AsyncWriteAt> AsyncPack2Writer<W> {
    /// Create a writer with default options
    pub fn new(sink: W) -> Self {
        Self::with_options(sink, WriterOptions::default())
    }

    /// Create a writer with explicit options
    pub fn with_options(sink: W, options: WriterOptions) -> Self {
        Self {
            sink,
            codec: ZlibCodec::new(options.compression_level),
            options,
            cancellation: CancellationFlag::new(),
            position: HEADER_RESERVE,
            entries: Vec::new(),
            closed: false,
        }
    }

    /// Observe `flag` between steps of every operation
    #[must_use]
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = flag;
        self
    }

    /// Options in effect
    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Append an asset; see [`Pack2Writer::write_asset`](super::Pack2Writer::write_asset)
    pub async fn write_asset(
        &mut self,
        name_hash: u64,
        data: &[u8],
        zip_status: ZipStatus,
        data_hash: Option<u32>,
    ) -> Pack2Result<AssetHeader> {
        self.ensure_open()?;
        self.cancellation.check()?;

        let stored = stage_asset(&self.codec, data, zip_status)?;
        self.cancellation.check()?;
        self.sink.write_all_at(&stored, self.position).await?;

        let entry = entry_for(name_hash, self.position, &stored, zip_status, data_hash);
        trace!(
            name_hash = entry.name_hash,
            data_offset = entry.data_offset,
            data_size = entry.data_size,
            "wrote asset"
        );
        self.position += entry.data_size;
        self.entries.push(entry);
        Ok(entry)
    }

    /// Hash `name` and append the asset under it
    pub async fn write_named_asset(
        &mut self,
        name: &str,
        data: &[u8],
        zip_status: ZipStatus,
        data_hash: Option<u32>,
    ) -> Pack2Result<AssetHeader> {
        self.write_asset(hash_name(name), data, zip_status, data_hash)
            .await
    }

    /// Embed `namelist` as the zipped `{NAMELIST}` asset
    pub async fn write_namelist(&mut self, namelist: &Namelist) -> Pack2Result<AssetHeader> {
        let text = namelist.to_text();
        let hash = data_hash(text.as_bytes());
        self.write_asset(NAMELIST_HASH, text.as_bytes(), ZipStatus::ZIPPED, Some(hash))
            .await
    }

    /// Write the index and header; calling again does nothing
    pub async fn close(&mut self) -> Pack2Result<()> {
        if self.closed {
            return Ok(());
        }
        self.cancellation.check()?;

        let layout = FinalLayout::new(self.position, &self.entries)?;
        if !layout.padding.is_empty() {
            self.sink
                .write_all_at(&layout.padding, self.position)
                .await?;
        }

        self.cancellation.check()?;
        self.sink
            .write_all_at(&layout.index, layout.asset_map_offset)
            .await?;

        self.cancellation.check()?;
        self.sink.write_all_at(&layout.header_region, 0).await?;
        self.sink.flush().await?;

        debug!(
            asset_count = self.entries.len(),
            asset_map_offset = layout.asset_map_offset,
            length = layout.length,
            "closed PACK2 archive"
        );
        self.position = layout.length;
        self.closed = true;
        Ok(())
    }

    /// Close and return the sink with the entries that were written
    pub async fn finish(mut self) -> Pack2Result<(W, Vec<AssetHeader>)> {
        self.close().await?;
        Ok((self.sink, self.entries))
    }

    /// Close and return the sink
    pub async fn into_inner(self) -> Pack2Result<W> {
        self.finish().await.map(|(sink, _)| sink)
    }

    /// Entries written so far, in index order
    pub fn entries(&self) -> &[AssetHeader] {
        &self.entries
    }

    /// Number of assets written
    pub fn asset_count(&self) -> usize {
        self.entries.len()
    }

    /// Offset the next asset will be written at (archive length once closed)
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Check if `close` has completed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Pack2Result<()> {
        if self.closed {
            return Err(Pack2Error::WriterClosed);
        }
        Ok(())
    }
}
