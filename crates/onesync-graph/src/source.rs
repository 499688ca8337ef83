//! Upload sources
//!
//! A chunk may be sent several times when the retry loop kicks in. An
//! [`UploadSource`] therefore never hands out a shared cursor: every call to
//! [`UploadSource::view`] produces an independent body over a fixed byte
//! window, so a retried attempt starts from the first byte of its chunk.
//!
//! File reads run on the blocking pool via `spawn_blocking`; async worker
//! threads never wait on disk I/O.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Body;

/// Random-access content to upload
#[async_trait]
pub trait UploadSource: Send + Sync {
    /// Total size in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a fresh body over `[offset, offset + len)`.
    ///
    /// # Errors
    /// `InvalidInput` if the window extends past the end of the source, or
    /// the underlying read error.
    async fn view(&self, offset: u64, len: u64) -> io::Result<Body>;
}

fn check_window(offset: u64, len: u64, total: u64) -> io::Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= total => Ok(()),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("window {offset}+{len} exceeds source length {total}"),
        )),
    }
}

/// In-memory content; views are zero-copy slices of the shared buffer
#[async_trait]
impl UploadSource for Bytes {
    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }

    async fn view(&self, offset: u64, len: u64) -> io::Result<Body> {
        check_window(offset, len, UploadSource::len(self))?;
        let start = offset as usize;
        let end = start + len as usize;
        Ok(Body::from(self.slice(start..end)))
    }
}

/// A read-only file read with positional reads, so concurrent or repeated
/// views never disturb each other
#[derive(Debug)]
pub struct FileSource {
    file: Arc<File>,
    len: u64,
}

impl FileSource {
    /// Opens `path` and records its current length
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::from_file(File::open(path)?)
    }

    pub fn from_file(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            len,
        })
    }
}

#[async_trait]
impl UploadSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    async fn view(&self, offset: u64, len: u64) -> io::Result<Body> {
        check_window(offset, len, self.len)?;
        let size = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "window too large"))?;

        let file = Arc::clone(&self.file);
        let buf = tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; size];
            read_exact_at(&file, &mut buf, offset).map(|()| buf)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("file read task failed: {e}")))??;

        Ok(Body::from(buf))
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
