//! Error types for PACK2 operations

use thiserror::Error;

use crate::layout::UnknownZipStatus;

/// Result type for PACK2 operations
pub type Pack2Result<T> = Result<T, Pack2Error>;

/// Broad grouping of [`Pack2Error`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The archive itself is unusable (bad magic, version, truncation)
    Format,
    /// A single asset failed to decode; other assets remain readable
    Decompression,
    /// A closed or disposed instance was reused, or a caller buffer was invalid
    Resource,
    /// Propagated unmodified from the underlying source or sink
    Io,
}

/// Errors produced while reading or writing PACK2 archives
#[derive(Debug, Error)]
pub enum Pack2Error {
    /// A record was decoded from or encoded into a buffer that is too short
    #[error("buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall {
        /// Bytes required by the record
        needed: usize,
        /// Bytes available in the buffer
        actual: usize,
    },

    /// Header magic is not `PAK`
    #[error("unrecognised format: expected magic [50 41 4B], got {0:02X?}")]
    UnrecognisedFormat([u8; 3]),

    /// Header version is not 1
    #[error("unsupported PACK2 version: {0}")]
    UnsupportedVersion(u8),

    /// The source is shorter than the header or index claims
    #[error("truncated archive: need {required} bytes, source has {actual}")]
    TruncatedArchive {
        /// Bytes required by the header or index
        required: u64,
        /// Actual source length
        actual: u64,
    },

    /// Index entry carries a zip status outside the four known values
    #[error("unknown zip status: 0x{0:02X}")]
    UnknownZipStatus(u32),

    /// Compressed block does not start with the block magic
    #[error("corrupt compressed block: expected magic 0xA1B2C3D4, got 0x{0:08X}")]
    CorruptCompressedBlock(u32),

    /// Inflating a compressed block failed or produced the wrong length
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    /// Deflating asset data failed
    #[error("compression failed: {0}")]
    CompressionFailed(String),

    /// Decoded asset bytes do not match the stored CRC-32
    #[error("data hash mismatch: expected 0x{expected:08X}, got 0x{actual:08X}")]
    DataHashMismatch {
        /// DataHash stored in the index entry
        expected: u32,
        /// CRC-32 of the decoded bytes
        actual: u32,
    },

    /// Asset size cannot be represented by the format or the platform
    #[error("asset too large: {0} bytes")]
    AssetTooLarge(u64),

    /// Reader was used after `close`
    #[error("reader has been closed")]
    ObjectDisposed,

    /// Writer was used after `close`
    #[error("writer has been closed")]
    WriterClosed,

    /// Caller supplied an output buffer that cannot hold the asset
    #[error("output buffer too small: need {needed} bytes, got {available}")]
    OutOfRange {
        /// Bytes the asset occupies
        needed: usize,
        /// Length of the supplied buffer
        available: usize,
    },

    /// Embedded namelist payload is not valid text
    #[error("invalid namelist: {0}")]
    InvalidNamelist(String),

    /// Operation observed a cancellation request
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error from the source or sink
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other binary layout failure
    #[error("binary layout error: {0}")]
    Layout(String),
}

impl Pack2Error {
    /// Category of this error per the PACK2 error taxonomy
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::BufferTooSmall { .. }
            | Self::UnrecognisedFormat(_)
            | Self::UnsupportedVersion(_)
            | Self::TruncatedArchive { .. }
            | Self::UnknownZipStatus(_)
            | Self::Layout(_) => ErrorCategory::Format,
            Self::CorruptCompressedBlock(_)
            | Self::DecompressionFailed(_)
            | Self::CompressionFailed(_)
            | Self::DataHashMismatch { .. }
            | Self::AssetTooLarge(_)
            | Self::InvalidNamelist(_) => ErrorCategory::Decompression,
            Self::ObjectDisposed | Self::WriterClosed | Self::OutOfRange { .. } | Self::Cancelled => {
                ErrorCategory::Resource
            }
            Self::Io(_) => ErrorCategory::Io,
        }
    }

    /// Check if the whole archive should be rejected
    pub fn is_format_error(&self) -> bool {
        self.category() == ErrorCategory::Format
    }

    /// Check if the failure is confined to a single asset
    pub fn is_per_asset(&self) -> bool {
        self.category() == ErrorCategory::Decompression
    }
}

impl From<binrw::Error> for Pack2Error {
    fn from(err: binrw::Error) -> Self {
        if let Some(unknown) = err.custom_err::<UnknownZipStatus>() {
            return Self::UnknownZipStatus(unknown.0);
        }
        match err {
            binrw::Error::Io(e) => Self::Io(e),
            other => Self::Layout(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert!(Pack2Error::UnsupportedVersion(2).is_format_error());
        assert!(Pack2Error::CorruptCompressedBlock(0).is_per_asset());
        assert_eq!(Pack2Error::WriterClosed.category(), ErrorCategory::Resource);
        assert_eq!(
            Pack2Error::Io(std::io::Error::other("boom")).category(),
            ErrorCategory::Io
        );
    }

    #[test]
    fn test_binrw_io_error_is_unwrapped() {
        let err = binrw::Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "eof",
        ));
        assert!(matches!(Pack2Error::from(err), Pack2Error::Io(_)));
    }

    #[test]
    fn test_display() {
        let err = Pack2Error::UnrecognisedFormat(*b"ZIP");
        assert_eq!(
            err.to_string(),
            "unrecognised format: expected magic [50 41 4B], got [5A, 49, 50]"
        );
    }
}
