//! Container records
//!
//! Every mutation of the container is one appended frame:
//!
//! ```text
//! ┌─────────┬──────────────┬───────────────┬──────────────┬────────────┐
//! │ CRC (4) │ MetaLen (4)  │ BodyLen (8)   │ Meta         │ Body       │
//! └─────────┴──────────────┴───────────────┴──────────────┴────────────┘
//! ```
//!
//! The CRC covers the two lengths and the meta bytes. Bodies carry their own
//! checksum inside the meta so the open-time scan never has to read them.

use serde::{Deserialize, Serialize};

use crate::value::{Attrs, ValueKind};

/// Size of the fixed frame header: CRC (4) + MetaLen (4) + BodyLen (8)
pub(crate) const FRAME_HEADER_SIZE: u64 = 16;

/// Upper bound on a meta block; larger lengths mean a torn or garbage frame
pub(crate) const MAX_META_SIZE: u32 = 16 * 1024 * 1024;

/// A logged container mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Record {
    /// Create (or re-create) the group at `address`
    Group { address: String, attrs: Attrs },

    /// Add a dataset to a group. Body: encoded attrs (`attrs_len` bytes)
    /// followed by the encoded value.
    Dataset {
        address: String,
        name: String,
        kind: ValueKind,
        attrs_len: u64,
        data_crc: u32,
    },

    /// Remove the group at `address`
    Unlink { address: String },

    /// Reserved named entry; the body is the blob. Last write wins.
    Blob { name: String, data_crc: u32 },
}

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    pub crc: u32,
    pub meta_len: u32,
    pub body_len: u64,
}

impl FrameHeader {
    /// Build the header for a meta block and body length
    pub fn new(meta: &[u8], body_len: u64) -> Self {
        let meta_len = meta.len() as u32;
        Self {
            crc: frame_crc(meta_len, body_len, meta),
            meta_len,
            body_len,
        }
    }

    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE as usize] {
        let mut buf = [0u8; FRAME_HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&self.crc.to_le_bytes());
        buf[4..8].copy_from_slice(&self.meta_len.to_le_bytes());
        buf[8..16].copy_from_slice(&self.body_len.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; FRAME_HEADER_SIZE as usize]) -> Self {
        let mut crc = [0u8; 4];
        let mut meta_len = [0u8; 4];
        let mut body_len = [0u8; 8];
        crc.copy_from_slice(&buf[0..4]);
        meta_len.copy_from_slice(&buf[4..8]);
        body_len.copy_from_slice(&buf[8..16]);
        Self {
            crc: u32::from_le_bytes(crc),
            meta_len: u32::from_le_bytes(meta_len),
            body_len: u64::from_le_bytes(body_len),
        }
    }

    /// Check the header CRC against the meta bytes read after it
    pub fn verify(&self, meta: &[u8]) -> bool {
        frame_crc(self.meta_len, self.body_len, meta) == self.crc
    }

    /// Total frame size on disk; `None` when a garbage `body_len` overflows
    pub fn frame_len(&self) -> Option<u64> {
        (FRAME_HEADER_SIZE + self.meta_len as u64).checked_add(self.body_len)
    }
}

fn frame_crc(meta_len: u32, body_len: u64, meta: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&meta_len.to_le_bytes());
    hasher.update(&body_len.to_le_bytes());
    hasher.update(meta);
    hasher.finalize()
}

/// CRC over body parts, in order
pub(crate) fn body_crc(parts: &[&[u8]]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}
