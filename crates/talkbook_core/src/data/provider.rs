//! Single data provider and its scoped stream guards.
//!
//! # Invariants
//! - At most one `ProviderWriter` exists per provider.
//! - Readers and the writer never coexist.
//! - Dropping a guard always releases its stream slot.

use super::{DataError, DataResult};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub(crate) struct StreamState {
    readers: AtomicUsize,
    writer: AtomicBool,
}

impl StreamState {
    pub(crate) fn readers(&self) -> usize {
        self.readers.load(Ordering::SeqCst)
    }

    pub(crate) fn has_writer(&self) -> bool {
        self.writer.load(Ordering::SeqCst)
    }
}

/// One uid-keyed binary blob backed by a file in the data directory.
#[derive(Debug)]
pub struct DataProvider {
    uid: String,
    mime_type: String,
    file_name: String,
    path: PathBuf,
    state: Arc<StreamState>,
}

impl DataProvider {
    pub(crate) fn new(uid: String, mime_type: String, file_name: String, data_dir: &Path) -> Self {
        let path = data_dir.join(&file_name);
        Self {
            uid,
            mime_type,
            file_name,
            path,
            state: Arc::new(StreamState::default()),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// File name relative to the owning manager's data directory.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Absolute path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of currently open read streams.
    pub fn open_readers(&self) -> usize {
        self.state.readers()
    }

    /// Whether the write stream is currently open.
    pub fn has_open_writer(&self) -> bool {
        self.state.has_writer()
    }

    /// Whether no stream is open.
    pub fn is_closed(&self) -> bool {
        self.open_readers() == 0 && !self.has_open_writer()
    }

    pub(crate) fn open_read(&self) -> DataResult<ProviderReader> {
        if self.state.has_writer() {
            return Err(DataError::WriterOpen(self.uid.clone()));
        }
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(DataError::MissingFile {
                    uid: self.uid.clone(),
                    path: self.path.clone(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        self.state.readers.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderReader {
            inner: BufReader::new(file),
            state: Arc::clone(&self.state),
        })
    }

    pub(crate) fn open_write(&self, append: bool) -> DataResult<ProviderWriter> {
        if self.state.has_writer() {
            return Err(DataError::WriterAlreadyOpen(self.uid.clone()));
        }
        let readers = self.state.readers();
        if readers > 0 {
            return Err(DataError::ReadersOpen {
                uid: self.uid.clone(),
                readers,
            });
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&self.path)?;
        if self
            .state
            .writer
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DataError::WriterAlreadyOpen(self.uid.clone()));
        }
        Ok(ProviderWriter {
            inner: BufWriter::new(file),
            state: Arc::clone(&self.state),
        })
    }

    pub(crate) fn ensure_closed(&self) -> DataResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        Err(DataError::StreamsOpen {
            uid: self.uid.clone(),
            readers: self.open_readers(),
            writer: self.has_open_writer(),
        })
    }
}

/// Scoped read stream over one provider.
#[derive(Debug)]
pub struct ProviderReader {
    inner: BufReader<File>,
    state: Arc<StreamState>,
}

impl ProviderReader {
    /// Total length of the backing file in bytes.
    pub fn len(&self) -> DataResult<u64> {
        Ok(self.inner.get_ref().metadata()?.len())
    }

    pub fn is_empty(&self) -> DataResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl Read for ProviderReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for ProviderReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl Drop for ProviderReader {
    fn drop(&mut self) {
        self.state.readers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scoped write stream over one provider.
///
/// Call [`ProviderWriter::finish`] to observe flush errors; a plain drop
/// flushes best-effort and still releases the writer slot.
#[derive(Debug)]
pub struct ProviderWriter {
    inner: BufWriter<File>,
    state: Arc<StreamState>,
}

impl ProviderWriter {
    /// Flushes buffered bytes to disk and closes the stream.
    pub fn finish(mut self) -> DataResult<()> {
        self.inner.flush()?;
        self.inner.get_ref().sync_data()?;
        Ok(())
    }
}

impl Write for ProviderWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl Drop for ProviderWriter {
    fn drop(&mut self) {
        let _ = self.inner.flush();
        self.state.writer.store(false, Ordering::SeqCst);
    }
}
