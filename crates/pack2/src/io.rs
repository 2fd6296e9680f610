//! Positional byte-range I/O
//!
//! Readers and writers address their source or sink by absolute offset only;
//! there is no shared cursor, so separate readers over one source never
//! interfere with each other.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

/// Blocking positional read source
pub trait ReadAt {
    /// Fill `buf` with the bytes starting at `offset`
    ///
    /// Fails with `UnexpectedEof` if the range extends past the end.
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;

    /// Total length of the source in bytes
    fn length(&self) -> io::Result<u64>;
}

/// Blocking positional write sink
pub trait WriteAt {
    /// Write all of `buf` starting at `offset`, extending the sink if needed
    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()>;

    /// Flush buffered data
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Async positional read source
#[async_trait]
pub trait AsyncReadAt: Send + Sync {
    /// Fill `buf` with the bytes starting at `offset`
    async fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;

    /// Total length of the source in bytes
    async fn length(&self) -> io::Result<u64>;
}

/// Async positional write sink
#[async_trait]
pub trait AsyncWriteAt: Send {
    /// Write all of `buf` starting at `offset`, extending the sink if needed
    async fn write_all_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()>;

    /// Flush buffered data
    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn out_of_bounds(offset: u64, len: usize, source_len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("read of {len} bytes at offset {offset} exceeds source length {source_len}"),
    )
}

fn read_slice_at(source: &[u8], buf: &mut [u8], offset: u64) -> io::Result<()> {
    let range = usize::try_from(offset).ok().and_then(|start| {
        let end = start.checked_add(buf.len())?;
        (end <= source.len()).then_some(start..end)
    });

    match range {
        Some(range) => {
            buf.copy_from_slice(&source[range]);
            Ok(())
        }
        None => Err(out_of_bounds(offset, buf.len(), source.len())),
    }
}

fn write_vec_at(sink: &mut Vec<u8>, buf: &[u8], offset: u64) -> io::Result<()> {
    let start = usize::try_from(offset)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset exceeds address space"))?;
    let end = start
        .checked_add(buf.len())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "write overflows"))?;

    if sink.len() < end {
        sink.resize(end, 0);
    }
    sink[start..end].copy_from_slice(buf);
    Ok(())
}

impl ReadAt for [u8] {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        read_slice_at(self, buf, offset)
    }

    fn length(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl ReadAt for Vec<u8> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        read_slice_at(self, buf, offset)
    }

    fn length(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl<T: ReadAt + ?Sized> ReadAt for &T {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        (**self).read_exact_at(buf, offset)
    }

    fn length(&self) -> io::Result<u64> {
        (**self).length()
    }
}

impl ReadAt for File {
    #[cfg(unix)]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        std::os::unix::fs::FileExt::read_exact_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        use std::os::windows::fs::FileExt;

        while !buf.is_empty() {
            match self.seek_read(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "failed to fill whole buffer",
                    ));
                }
                Ok(n) => {
                    let tmp = buf;
                    buf = &mut tmp[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn length(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl WriteAt for Vec<u8> {
    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()> {
        write_vec_at(self, buf, offset)
    }
}

impl<T: WriteAt + ?Sized> WriteAt for &mut T {
    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()> {
        (**self).write_all_at(buf, offset)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

impl WriteAt for File {
    #[cfg(unix)]
    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()> {
        std::os::unix::fs::FileExt::write_all_at(&*self, buf, offset)
    }

    #[cfg(windows)]
    fn write_all_at(&mut self, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
        use std::os::windows::fs::FileExt;

        while !buf.is_empty() {
            match self.seek_write(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole buffer",
                    ));
                }
                Ok(n) => {
                    buf = &buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(self)
    }
}

#[async_trait]
impl AsyncReadAt for Vec<u8> {
    async fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        read_slice_at(self, buf, offset)
    }

    async fn length(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

#[async_trait]
impl AsyncReadAt for Bytes {
    async fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        read_slice_at(self, buf, offset)
    }

    async fn length(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

#[async_trait]
impl<T: AsyncReadAt + ?Sized> AsyncReadAt for &T {
    async fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        (**self).read_exact_at(buf, offset).await
    }

    async fn length(&self) -> io::Result<u64> {
        (**self).length().await
    }
}

#[async_trait]
impl AsyncWriteAt for Vec<u8> {
    async fn write_all_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()> {
        write_vec_at(self, buf, offset)
    }
}

#[async_trait]
impl<T: AsyncWriteAt + ?Sized> AsyncWriteAt for &mut T {
    async fn write_all_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()> {
        (**self).write_all_at(buf, offset).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        (**self).flush().await
    }
}

/// File driven from the blocking pool with positional reads and writes
///
/// Cloning shares the underlying handle. Requires a Tokio runtime.
#[derive(Debug, Clone)]
pub struct AsyncFile {
    file: Arc<File>,
}

impl AsyncFile {
    /// Wrap an open file
    pub fn new(file: File) -> Self {
        Self {
            file: Arc::new(file),
        }
    }

    /// Open an existing file for reading
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::task::spawn_blocking(move || File::open(path))
            .await
            .map_err(io::Error::other)??;
        Ok(Self::new(file))
    }

    /// Create (or truncate) a file for writing
    pub async fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::task::spawn_blocking(move || {
            std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
        })
        .await
        .map_err(io::Error::other)??;
        Ok(Self::new(file))
    }
}

#[async_trait]
impl AsyncReadAt for AsyncFile {
    async fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let file = Arc::clone(&self.file);
        let len = buf.len();
        let data = tokio::task::spawn_blocking(move || {
            let mut data = vec![0u8; len];
            ReadAt::read_exact_at(&*file, &mut data, offset).map(|()| data)
        })
        .await
        .map_err(io::Error::other)??;

        buf.copy_from_slice(&data);
        Ok(())
    }

    async fn length(&self) -> io::Result<u64> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || ReadAt::length(&*file))
            .await
            .map_err(io::Error::other)?
    }
}

#[async_trait]
impl AsyncWriteAt for AsyncFile {
    async fn write_all_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()> {
        let file = Arc::clone(&self.file);
        let data = buf.to_vec();
        tokio::task::spawn_blocking(move || write_file_at(&file, &data, offset))
            .await
            .map_err(io::Error::other)?
    }

    async fn flush(&mut self) -> io::Result<()> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || file.sync_data())
            .await
            .map_err(io::Error::other)?
    }
}

#[cfg(unix)]
fn write_file_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    std::os::unix::fs::FileExt::write_all_at(file, buf, offset)
}

#[cfg(windows)]
fn write_file_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ));
            }
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
