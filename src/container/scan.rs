//! Open-time replay
//!
//! Rebuilds the in-memory directory by walking frame headers and metas,
//! seeking past bodies. The first frame that is short, oversized or fails its
//! header checksum marks a torn tail; everything from there on is discarded.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use crate::error::{Result, StashError};
use crate::value::Attrs;

use super::handle::{DatasetLocation, Span};
use super::record::{FrameHeader, Record, FRAME_HEADER_SIZE, MAX_META_SIZE};

/// Result of replaying a container file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Number of frames applied to the directory
    pub frames_replayed: u64,

    /// Bytes after the last valid frame
    pub bytes_discarded: u64,

    /// Whether the torn tail was cut off the file
    pub was_truncated: bool,

    /// Offset just past the last valid frame
    pub valid_len: u64,
}

/// One stored group
#[derive(Debug, Clone, Default)]
pub(crate) struct GroupEntry {
    pub attrs: Attrs,
    /// Datasets in insertion order
    pub datasets: Vec<(String, DatasetLocation)>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BlobEntry {
    pub data: Span,
    pub data_crc: u32,
}

/// In-memory view of everything live in the container
#[derive(Debug, Default)]
pub(crate) struct Directory {
    pub groups: BTreeMap<String, GroupEntry>,
    pub blobs: HashMap<String, BlobEntry>,
}

impl Directory {
    /// Apply one record whose body starts at `body_offset`
    pub fn apply(&mut self, record: Record, body_offset: u64, body_len: u64) -> Result<()> {
        match record {
            Record::Group { address, attrs } => {
                self.groups.insert(
                    address,
                    GroupEntry {
                        attrs,
                        datasets: Vec::new(),
                    },
                );
            }
            Record::Dataset {
                address,
                name,
                kind,
                attrs_len,
                data_crc,
            } => {
                if attrs_len > body_len {
                    return Err(StashError::Corruption(format!(
                        "dataset '{}' at {} claims {} attr bytes in a {} byte body",
                        name, address, attrs_len, body_len
                    )));
                }
                let group = self.groups.get_mut(&address).ok_or_else(|| {
                    StashError::Corruption(format!(
                        "dataset '{}' written to missing group {}",
                        name, address
                    ))
                })?;

                let location = DatasetLocation {
                    kind,
                    attrs: Span {
                        offset: body_offset,
                        len: attrs_len,
                    },
                    data: Span {
                        offset: body_offset + attrs_len,
                        len: body_len - attrs_len,
                    },
                    data_crc,
                };
                match group.datasets.iter_mut().find(|(n, _)| *n == name) {
                    Some(slot) => slot.1 = location,
                    None => group.datasets.push((name, location)),
                }
            }
            Record::Unlink { address } => {
                self.groups.remove(&address);
            }
            Record::Blob { name, data_crc } => {
                self.blobs.insert(
                    name,
                    BlobEntry {
                        data: Span {
                            offset: body_offset,
                            len: body_len,
                        },
                        data_crc,
                    },
                );
            }
        }
        Ok(())
    }
}

/// Replay all frames after the file header
///
/// Returns the rebuilt directory and a report; does not modify the file.
pub(crate) fn replay(file: &mut File, header_size: u64) -> Result<(Directory, ScanReport)> {
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(header_size))?;

    let mut directory = Directory::default();
    let mut report = ScanReport::default();
    let mut pos = header_size;

    while pos < file_len {
        if pos + FRAME_HEADER_SIZE > file_len {
            break;
        }

        let mut raw = [0u8; FRAME_HEADER_SIZE as usize];
        reader.read_exact(&mut raw)?;
        let header = FrameHeader::decode(&raw);

        if header.meta_len > MAX_META_SIZE {
            break;
        }
        let frame_end = match header.frame_len().and_then(|len| pos.checked_add(len)) {
            Some(end) if end <= file_len => end,
            _ => break,
        };

        let mut meta = vec![0u8; header.meta_len as usize];
        reader.read_exact(&mut meta)?;
        if !header.verify(&meta) {
            break;
        }

        // The header checksum matched, so an undecodable meta is real damage
        let record: Record = bincode::deserialize(&meta).map_err(|e| {
            StashError::Corruption(format!("undecodable record at offset {}: {}", pos, e))
        })?;

        let body_offset = pos + FRAME_HEADER_SIZE + header.meta_len as u64;
        directory.apply(record, body_offset, header.body_len)?;
        reader.seek_relative(header.body_len as i64)?;

        report.frames_replayed += 1;
        pos = frame_end;
    }

    report.valid_len = pos;
    report.bytes_discarded = file_len - pos;
    Ok((directory, report))
}
