//! Reader and writer for PACK2 asset archives
//!
#![allow(clippy::cast_possible_truncation)] // Wire fields are narrower than usize/u64
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::doc_markdown)] // Format terms like NAMELIST need no backticks
#![allow(clippy::missing_errors_doc)] // Every fallible call returns Pack2Error
#![allow(clippy::return_self_not_must_use)] // Builder patterns
//! PACK2 is a flat, hash-indexed archive of game assets. A fixed header at
//! offset 0 points at an index of 32-byte asset headers, each locating one
//! payload by its 64-bit name hash. Payloads are stored as-is or wrapped in a
//! zlib block carrying their decompressed length.
//!
//! # Layout
//!
//! ```text
//! 0x000  Header (160 bytes, zero padded to 0x200)
//! 0x200  payloads, back to back
//! ...    zero padding to a 256-byte boundary
//! ...    index: asset_count * 32-byte asset headers
//! ```
//!
//! # Components
//!
//! - [`layout`]: header, asset header and zip status codecs
//! - [`hash`]: CRC-64 name hashing and CRC-32 data hashing
//! - [`block`]: the compressed block framing used by zipped assets
//! - [`namelist`]: hash to name recovery, including the embedded `{NAMELIST}`
//! - [`reader`]: blocking and async readers over positional sources
//! - [`writer`]: blocking and async writers over positional sinks
//! - [`io`]: the positional I/O traits both sides are generic over
//!
//! # Example
//!
//! ```rust
//! use pack2::{Namelist, Pack2Reader, Pack2Writer, ZipStatus};
//!
//! # fn example() -> Result<(), pack2::Pack2Error> {
//! let mut writer = Pack2Writer::new(Vec::new());
//! writer.write_named_asset("ui/splash.dds", b"DDS ...", ZipStatus::ZIPPED, None)?;
//! writer.write_namelist(&["ui/splash.dds"].into_iter().collect::<Namelist>())?;
//! let archive = writer.into_inner()?;
//!
//! let reader = Pack2Reader::open(archive)?;
//! let names = reader.read_namelist()?.unwrap_or_default();
//! for entry in reader.read_asset_headers()? {
//!     let name = names.try_get(entry.name_hash).unwrap_or("<unknown>");
//!     let data = reader.read_asset_data(&entry, false)?;
//!     println!("{name}: {} bytes", data.len());
//! }
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

#![warn(missing_docs)]

pub mod block;
pub mod cancel;
pub mod config;
pub mod error;
pub mod hash;
pub mod io;
pub mod layout;
pub mod namelist;
pub mod reader;
pub mod writer;

pub use cancel::CancellationFlag;
pub use config::{ReaderOptions, WriterOptions};
pub use error::{ErrorCategory, Pack2Error, Pack2Result};
pub use hash::{NAMELIST_HASH, data_hash, hash_name};
pub use io::{AsyncFile, AsyncReadAt, AsyncWriteAt, ReadAt, WriteAt};
pub use layout::{AssetHeader, Header, ZipStatus};
pub use namelist::Namelist;
pub use reader::{AsyncPack2Reader, Pack2Reader};
pub use writer::{AsyncPack2Writer, Pack2Writer};
