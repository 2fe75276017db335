//! Shared file handle and dataset handles
//!
//! The container and every lazy field built from it read through one
//! `SharedFile`. Closing the container releases the file; handles that were
//! never materialized then fail with `Closed`, while values already read stay
//! valid because they own their bytes.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::error::{Result, StashError};
use crate::value::{Array, Attrs, Value, ValueKind, Window};

use super::record::body_crc;

/// Byte range inside the container file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub offset: u64,
    pub len: u64,
}

/// Where a dataset's attrs and value live
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DatasetLocation {
    pub kind: ValueKind,
    pub attrs: Span,
    pub data: Span,
    pub data_crc: u32,
}

/// Read counters, for tests and diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Bytes read from dataset bodies and blobs
    pub bytes_read: u64,
    /// Whole-value reads
    pub full_reads: u64,
    /// Windowed (slice) reads
    pub window_reads: u64,
}

#[derive(Debug, Default)]
struct Counters {
    bytes_read: AtomicU64,
    full_reads: AtomicU64,
    window_reads: AtomicU64,
}

/// File handle shared between a container and its lazy fields
#[derive(Debug)]
pub(crate) struct SharedFile {
    path: PathBuf,
    file: Mutex<Option<File>>,
    counters: Counters,
}

impl SharedFile {
    pub fn new(path: &Path, file: File) -> Self {
        Self {
            path: path.to_path_buf(),
            file: Mutex::new(Some(file)),
            counters: Counters::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the open file, or fail with `Closed`
    pub fn with_file<R>(&self, f: impl FnOnce(&mut File) -> Result<R>) -> Result<R> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(StashError::Closed)?;
        f(file)
    }

    /// Read exactly `span` bytes
    pub fn read_span(&self, span: Span) -> Result<Bytes> {
        let buf = self.with_file(|file| {
            file.seek(SeekFrom::Start(span.offset))?;
            let mut buf = vec![0u8; span.len as usize];
            file.read_exact(&mut buf)?;
            Ok(buf)
        })?;
        self.counters.bytes_read.fetch_add(span.len, Ordering::Relaxed);
        Ok(Bytes::from(buf))
    }

    /// Read the runs of a window, relative to `base`, into one buffer
    fn read_window(&self, base: u64, window: &Window) -> Result<Bytes> {
        let out = self.with_file(|file| {
            let mut out = BytesMut::with_capacity(window.nbytes());
            let mut chunk = Vec::new();
            for run in window.runs() {
                file.seek(SeekFrom::Start(base + run.offset))?;
                chunk.resize(run.len, 0);
                file.read_exact(&mut chunk)?;
                out.extend_from_slice(&chunk);
            }
            Ok(out)
        })?;
        self.counters
            .bytes_read
            .fetch_add(out.len() as u64, Ordering::Relaxed);
        self.counters.window_reads.fetch_add(1, Ordering::Relaxed);
        Ok(out.freeze())
    }

    /// Write all parts at `offset`
    pub fn write_at(&self, offset: u64, parts: &[&[u8]]) -> Result<()> {
        self.with_file(|file| {
            file.seek(SeekFrom::Start(offset))?;
            for part in parts {
                file.write_all(part)?;
            }
            Ok(())
        })
    }

    pub fn sync(&self) -> Result<()> {
        self.with_file(|file| {
            file.flush()?;
            file.sync_all()?;
            Ok(())
        })
    }

    /// Release the file; later reads fail with `Closed`
    pub fn release(&self) -> Option<File> {
        self.file.lock().take()
    }

    pub fn is_open(&self) -> bool {
        self.file.lock().is_some()
    }

    fn record_full_read(&self) {
        self.counters.full_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> ReadStats {
        ReadStats {
            bytes_read: self.counters.bytes_read.load(Ordering::Relaxed),
            full_reads: self.counters.full_reads.load(Ordering::Relaxed),
            window_reads: self.counters.window_reads.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Dataset Handle
// =============================================================================

/// Live handle to one stored dataset
#[derive(Debug, Clone)]
pub struct DatasetHandle {
    file: Arc<SharedFile>,
    name: String,
    location: DatasetLocation,
}

impl DatasetHandle {
    pub(crate) fn new(file: Arc<SharedFile>, name: String, location: DatasetLocation) -> Self {
        Self {
            file,
            name,
            location,
        }
    }

    /// Dataset (field) name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ValueKind {
        &self.location.kind
    }

    /// Shape from the stored descriptor, without reading the body
    pub fn shape(&self) -> Vec<usize> {
        self.location.kind.shape()
    }

    /// Stored size of the value in bytes
    pub fn nbytes(&self) -> u64 {
        self.location.data.len
    }

    /// Read and checksum the whole value
    pub fn read_value(&self) -> Result<Value> {
        let data = self.file.read_span(self.location.data)?;
        self.file.record_full_read();

        if body_crc(&[&data]) != self.location.data_crc {
            return Err(StashError::Corruption(format!(
                "checksum mismatch in dataset '{}' of {}",
                self.name,
                self.file.path().display()
            )));
        }
        Value::decode(&self.location.kind, data)
    }

    /// Read the dataset's attributes
    pub fn read_attrs(&self) -> Result<Attrs> {
        if self.location.attrs.len == 0 {
            return Ok(Attrs::new());
        }
        let raw = self.file.read_span(self.location.attrs)?;
        Ok(bincode::deserialize(&raw)?)
    }

    /// Read only the requested window of an array dataset
    pub fn read_window(&self, ranges: &[Range<usize>]) -> Result<Array> {
        let dtype = match &self.location.kind {
            ValueKind::Array { dtype, .. } => *dtype,
            other => {
                return Err(StashError::TypeMismatch {
                    expected: "array".to_string(),
                    found: other.name(),
                })
            }
        };

        let shape = self.location.kind.shape();
        let window = Window::plan(&shape, ranges, dtype.size())?;
        let data = self.file.read_window(self.location.data.offset, &window)?;
        Array::from_raw(dtype, window.shape().to_vec(), data)
    }

    /// Whether the backing container is still open
    pub fn is_open(&self) -> bool {
        self.file.is_open()
    }
}

/// Snapshot of a stored group: its attributes and dataset handles in
/// insertion order
#[derive(Debug, Clone)]
pub struct GroupHandle {
    pub(crate) address: String,
    pub(crate) attrs: Attrs,
    pub(crate) datasets: Vec<DatasetHandle>,
}

impl GroupHandle {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn datasets(&self) -> &[DatasetHandle] {
        &self.datasets
    }

    /// The logical key recorded on the group, if any
    pub fn recorded_key(&self) -> Option<&str> {
        self.attrs.get(super::KEY_ATTR).and_then(Value::as_text)
    }

    pub fn into_datasets(self) -> Vec<DatasetHandle> {
        self.datasets
    }
}
