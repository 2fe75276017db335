//! Container Module
//!
//! Single-file backing store for addressed groups and reserved blobs.
//!
//! ## Responsibilities
//! - Create/open the container file per [`OpenMode`]
//! - Append group, dataset, unlink and blob records
//! - Rebuild the directory on open, cutting off torn tails
//! - Hand out live dataset handles for lazy reads
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (8 bytes)                                        │
//! │   Magic: "HXST" (4) | Version: u16 (2) | Reserved (2)   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Frames (appended)                                       │
//! │   [CRC: u32][MetaLen: u32][BodyLen: u64][Meta][Body]    │
//! │   Meta = bincode(Record)                                │
//! │   ... repeated for each mutation ...                    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Space held by unlinked groups and superseded blobs is not reclaimed.

mod handle;
mod record;
mod scan;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;

use crate::config::OpenMode;
use crate::error::{Result, StashError};
use crate::value::{Attrs, Value};

pub use handle::{DatasetHandle, GroupHandle, ReadStats};
pub use scan::ScanReport;

use handle::SharedFile;
use record::{body_crc, FrameHeader, Record, FRAME_HEADER_SIZE};
use scan::Directory;

// =============================================================================
// Format Constants
// =============================================================================

/// Magic bytes identifying a hexstash container file
pub(crate) const MAGIC: &[u8; 4] = b"HXST";

/// Current container format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + Reserved (2) = 8 bytes
pub(crate) const HEADER_SIZE: u64 = 8;

/// Group attribute holding the logical key
pub const KEY_ATTR: &str = "key";

/// Single-file container of addressed groups
pub struct Container {
    path: PathBuf,
    mode: OpenMode,
    file: Arc<SharedFile>,
    directory: Directory,
    /// Append position (end of the last valid frame)
    end: u64,
    report: ScanReport,
}

impl Container {
    /// Open or create a container
    ///
    /// On open:
    /// 1. Open the file per `mode`
    /// 2. Write (new file) or validate (existing file) the header
    /// 3. Replay frames into the directory
    /// 4. Truncate a torn tail when writable
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        let mut file = Self::open_file(path, mode)?;

        let len = file.metadata()?.len();
        if len == 0 && mode.is_writable() {
            let mut header = [0u8; HEADER_SIZE as usize];
            header[0..4].copy_from_slice(MAGIC);
            header[4..6].copy_from_slice(&VERSION.to_le_bytes());
            file.write_all(&header)?;
            file.sync_all()?;
        } else {
            Self::validate_header(&mut file, path)?;
        }

        let (directory, mut report) = scan::replay(&mut file, HEADER_SIZE)?;

        if report.bytes_discarded > 0 && mode.is_writable() {
            file.set_len(report.valid_len)?;
            file.sync_all()?;
            report.was_truncated = true;
        }

        Ok(Self {
            path: path.to_path_buf(),
            mode,
            end: report.valid_len,
            file: Arc::new(SharedFile::new(path, file)),
            directory,
            report,
        })
    }

    fn open_file(path: &Path, mode: OpenMode) -> Result<File> {
        let mut options = OpenOptions::new();
        options.read(true);
        match mode {
            OpenMode::Read => {}
            OpenMode::ReadWrite => {
                options.write(true);
            }
            OpenMode::Write => {
                options.write(true).create(true).truncate(true);
            }
            OpenMode::Create => {
                options.write(true).create_new(true);
            }
            OpenMode::Append => {
                options.write(true).create(true);
            }
        }
        Ok(options.open(path)?)
    }

    fn validate_header(file: &mut File, path: &Path) -> Result<()> {
        let mut header = [0u8; HEADER_SIZE as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header).map_err(|_| {
            StashError::Corruption(format!("{} has no container header", path.display()))
        })?;

        if &header[0..4] != MAGIC {
            return Err(StashError::Corruption(format!(
                "Invalid container magic: expected HXST, got {:?}",
                &header[0..4]
            )));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(StashError::Corruption(format!(
                "Unsupported container version: {}",
                version
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Groups
    // =========================================================================

    /// Whether a group exists at `address`
    pub fn contains(&self, address: &str) -> bool {
        self.directory.groups.contains_key(address)
    }

    /// All occupied addresses, sorted
    pub fn addresses(&self) -> impl Iterator<Item = &str> + '_ {
        self.directory.groups.keys().map(String::as_str)
    }

    /// Number of live groups
    pub fn group_count(&self) -> usize {
        self.directory.groups.len()
    }

    /// Handle to the group at `address`
    pub fn group(&self, address: &str) -> Option<GroupHandle> {
        let entry = self.directory.groups.get(address)?;
        let datasets = entry
            .datasets
            .iter()
            .map(|(name, location)| {
                DatasetHandle::new(Arc::clone(&self.file), name.clone(), location.clone())
            })
            .collect();

        Some(GroupHandle {
            address: address.to_string(),
            attrs: entry.attrs.clone(),
            datasets,
        })
    }

    /// Create an empty group; fails if the address is taken
    pub fn create_group(&mut self, address: &str, attrs: Attrs) -> Result<()> {
        self.ensure_writable()?;
        if self.contains(address) {
            return Err(StashError::AlreadyExists(address.to_string()));
        }
        self.append(
            Record::Group {
                address: address.to_string(),
                attrs,
            },
            &[],
        )
    }

    /// Write one dataset into an existing group
    pub fn write_dataset(&mut self, address: &str, name: &str, value: &Value, attrs: &Attrs) -> Result<()> {
        self.ensure_writable()?;
        if !self.contains(address) {
            return Err(StashError::NotFound(address.to_string()));
        }

        let attr_bytes = if attrs.is_empty() {
            Vec::new()
        } else {
            bincode::serialize(attrs)?
        };
        let data = value.encode();

        self.append(
            Record::Dataset {
                address: address.to_string(),
                name: name.to_string(),
                kind: value.kind(),
                attrs_len: attr_bytes.len() as u64,
                data_crc: body_crc(&[&data]),
            },
            &[&attr_bytes, &data],
        )
    }

    /// Delete the group at `address`
    pub fn unlink(&mut self, address: &str) -> Result<()> {
        self.ensure_writable()?;
        if !self.contains(address) {
            return Err(StashError::NotFound(address.to_string()));
        }
        self.append(
            Record::Unlink {
                address: address.to_string(),
            },
            &[],
        )
    }

    // =========================================================================
    // Blobs
    // =========================================================================

    /// Store a reserved named blob, replacing any previous one
    pub fn put_blob(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        self.append(
            Record::Blob {
                name: name.to_string(),
                data_crc: body_crc(&[data]),
            },
            &[data],
        )
    }

    /// Read a reserved blob, if present
    pub fn blob(&self, name: &str) -> Result<Option<Bytes>> {
        let entry = match self.directory.blobs.get(name) {
            Some(entry) => *entry,
            None => return Ok(None),
        };

        let data = self.file.read_span(entry.data)?;
        if body_crc(&[&data]) != entry.data_crc {
            return Err(StashError::Corruption(format!(
                "checksum mismatch in blob '{}'",
                name
            )));
        }
        Ok(Some(data))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// fsync everything written so far
    pub fn sync(&self) -> Result<()> {
        if !self.mode.is_writable() {
            return Ok(());
        }
        self.file.sync()
    }

    /// Sync (when writable) and release the file handle; idempotent
    pub fn close(&mut self) -> Result<()> {
        if !self.file.is_open() {
            return Ok(());
        }
        let synced = self.sync();
        self.file.release();
        synced
    }

    pub fn is_closed(&self) -> bool {
        !self.file.is_open()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// What the open-time replay found
    pub fn scan_report(&self) -> &ScanReport {
        &self.report
    }

    /// Read counters across the container and all its handles
    pub fn stats(&self) -> ReadStats {
        self.file.stats()
    }

    /// Current file length (end of the last frame)
    pub fn len_bytes(&self) -> u64 {
        self.end
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_writable(&self) -> Result<()> {
        if !self.mode.is_writable() {
            return Err(StashError::ReadOnly);
        }
        if !self.file.is_open() {
            return Err(StashError::Closed);
        }
        Ok(())
    }

    /// Append one frame and apply it to the directory
    fn append(&mut self, record: Record, body: &[&[u8]]) -> Result<()> {
        let meta = bincode::serialize(&record)?;
        let body_len: u64 = body.iter().map(|part| part.len() as u64).sum();
        let header = FrameHeader::new(&meta, body_len);
        let frame_len = header.frame_len().ok_or_else(|| {
            StashError::Corruption(format!("frame of {} body bytes overflows the file", body_len))
        })?;

        let mut parts: Vec<&[u8]> = Vec::with_capacity(body.len() + 2);
        let encoded = header.encode();
        parts.push(&encoded);
        parts.push(&meta);
        parts.extend_from_slice(body);
        self.file.write_at(self.end, &parts)?;

        let body_offset = self.end + FRAME_HEADER_SIZE + meta.len() as u64;
        self.directory.apply(record, body_offset, body_len)?;
        self.end += frame_len;
        Ok(())
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(path = %self.path.display(), "failed to close container: {}", e);
        }
    }
}
