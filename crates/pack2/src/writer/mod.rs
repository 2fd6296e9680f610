//! PACK2 archive writers
//!
//! Writers append asset payloads after a reserved 512-byte header region and
//! keep the index in memory. Closing pads the payload region to a 256-byte
//! boundary, writes the index there, and finally writes the header at
//! offset 0:
//!
//! ```text
//! [header + zero padding : 0x200][payload 0][payload 1]...[pad to 0x100][index]
//! ```
//!
//! The index starts at the payload end rounded up to 0x100; an end that is
//! already aligned is used as is. A 256-byte payload therefore puts the index
//! at 0x300, one boundary earlier than writers that always move to the next
//! boundary, and an empty archive is exactly 0x200 bytes. Readers locate the
//! index through the header, so both layouts read back identically.
//!
//! Index order is write order. The header checksum field is written as
//! zeros; readers never inspect it.
//! A failure part-way through `close` leaves the sink inconsistent; nothing
//! is rolled back.

mod nonblocking;

pub use nonblocking::AsyncPack2Writer;

use std::borrow::Cow;

use tracing::{debug, trace};

use crate::block::{self, ZlibCodec};
use crate::config::WriterOptions;
use crate::error::{Pack2Error, Pack2Result};
use crate::hash::{NAMELIST_HASH, data_hash, hash_name};
use crate::io::WriteAt;
use crate::layout::{AssetHeader, HEADER_SIZE, Header, ZipStatus, encode_entries};
use crate::namelist::Namelist;

/// Bytes reserved at the start of the archive for the header
pub const HEADER_RESERVE: u64 = 0x200;

/// Alignment of the index
pub const ASSET_MAP_ALIGNMENT: u64 = 0x100;

/// Blocking PACK2 writer
///
/// Not internally synchronised: `write_asset` and `close` take `&mut self`.
pub struct Pack2Writer<W: WriteAt> {
    sink: W,
    codec: ZlibCodec,
    options: WriterOptions,
    position: u64,
    entries: Vec<AssetHeader>,
    closed: bool,
}

impl<W: WriteAt> Pack2Writer<W> {
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
            position: HEADER_RESERVE,
            entries: Vec::new(),
            closed: false,
        }
    }

    /// Options in effect
    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Append an asset
    ///
    /// Zipped assets are framed as a compressed block first. `data_hash` is
    /// stored as given (0 when `None`); it is never computed here.
    pub fn write_asset(
        &mut self,
        name_hash: u64,
        data: &[u8],
        zip_status: ZipStatus,
        data_hash: Option<u32>,
    ) -> Pack2Result<AssetHeader> {
        self.ensure_open()?;

        let stored = stage_asset(&self.codec, data, zip_status)?;
        self.sink.write_all_at(&stored, self.position)?;

        let entry = entry_for(name_hash, self.position, &stored, zip_status, data_hash);
        self.commit(entry);
        Ok(entry)
    }

    /// Hash `name` and append the asset under it
    pub fn write_named_asset(
        &mut self,
        name: &str,
        data: &[u8],
        zip_status: ZipStatus,
        data_hash: Option<u32>,
    ) -> Pack2Result<AssetHeader> {
        self.write_asset(hash_name(name), data, zip_status, data_hash)
    }

    /// Embed `namelist` as the zipped `{NAMELIST}` asset
    pub fn write_namelist(&mut self, namelist: &Namelist) -> Pack2Result<AssetHeader> {
        let text = namelist.to_text();
        self.write_asset(
            NAMELIST_HASH,
            text.as_bytes(),
            ZipStatus::ZIPPED,
            Some(data_hash(text.as_bytes())),
        )
    }

    /// Write the index and header; further writes fail with `WriterClosed`
    ///
    /// Calling `close` again does nothing.
    pub fn close(&mut self) -> Pack2Result<()> {
        if self.closed {
            return Ok(());
        }

        let layout = FinalLayout::new(self.position, &self.entries)?;
        if !layout.padding.is_empty() {
            self.sink.write_all_at(&layout.padding, self.position)?;
        }
        self.sink
            .write_all_at(&layout.index, layout.asset_map_offset)?;
        self.sink.write_all_at(&layout.header_region, 0)?;
        self.sink.flush()?;

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
    pub fn finish(mut self) -> Pack2Result<(W, Vec<AssetHeader>)> {
        self.close()?;
        Ok((self.sink, self.entries))
    }

    /// Close and return the sink
    pub fn into_inner(self) -> Pack2Result<W> {
        self.finish().map(|(sink, _)| sink)
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

    fn commit(&mut self, entry: AssetHeader) {
        trace!(
            name_hash = entry.name_hash,
            data_offset = entry.data_offset,
            data_size = entry.data_size,
            "wrote asset"
        );
        self.position += entry.data_size;
        self.entries.push(entry);
    }
}

/// Bytes to store for an asset: framed when zipped, borrowed otherwise
fn stage_asset<'a>(
    codec: &ZlibCodec,
    data: &'a [u8],
    zip_status: ZipStatus,
) -> Pack2Result<Cow<'a, [u8]>> {
    if zip_status.is_zipped() {
        Ok(Cow::Owned(block::frame(data, codec)?))
    } else {
        Ok(Cow::Borrowed(data))
    }
}

fn entry_for(
    name_hash: u64,
    data_offset: u64,
    stored: &[u8],
    zip_status: ZipStatus,
    data_hash: Option<u32>,
) -> AssetHeader {
    AssetHeader {
        name_hash,
        data_offset,
        data_size: stored.len() as u64,
        zip_status,
        data_hash: data_hash.unwrap_or(0),
    }
}

/// Round `position` up to the index alignment
pub fn align_asset_map(position: u64) -> u64 {
    position.div_ceil(ASSET_MAP_ALIGNMENT) * ASSET_MAP_ALIGNMENT
}

/// Everything `close` writes, computed up front
struct FinalLayout {
    asset_map_offset: u64,
    length: u64,
    padding: Vec<u8>,
    index: Vec<u8>,
    header_region: Vec<u8>,
}

impl FinalLayout {
    fn new(position: u64, entries: &[AssetHeader]) -> Pack2Result<Self> {
        let asset_count = u32::try_from(entries.len()).map_err(|_| {
            Pack2Error::Layout(format!("{} assets exceed the format limit", entries.len()))
        })?;

        let asset_map_offset = align_asset_map(position);
        let index = encode_entries(entries)?;
        let length = asset_map_offset + index.len() as u64;

        let header = Header::new(asset_count, length, asset_map_offset);
        let mut header_region = vec![0u8; HEADER_RESERVE as usize];
        header.encode(&mut header_region[..HEADER_SIZE])?;

        Ok(Self {
            asset_map_offset,
            length,
            padding: vec![0u8; (asset_map_offset - position) as usize],
            index,
            header_region,
        })
    }
}
