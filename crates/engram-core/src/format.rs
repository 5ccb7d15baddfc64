//! .engram Binary File Format
//!
//! # File Structure
//!
//! ```text
//! Offset   Size    Type        Description
//! ─────────────────────────────────────────────
//! 0x00     4       [u8; 4]     Magic: "ENGR"
//! 0x04     4       u32 LE      Version (1 or 2)
//! 0x08     4       u32 LE      D: Dimensions
//! 0x0C     8       u64 LE      N: Number of vectors
//! 0x14     N*D*4   [f32]       Vector data, row-major (Little Endian)
//! end      4       u32 LE      CRC-32 of all preceding bytes (version 2 only)
//! ```
//!
//! Row `i` of the data section is the vector with id `i`.
//!
//! Files are never written in place: [`write_index_atomic`] writes a sibling
//! `.tmp` file, syncs it and renames it over the destination.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use thiserror::Error;

use crate::error::Result;

/// Magic bytes identifying an .engram file
pub const MAGIC: [u8; 4] = *b"ENGR";

/// Plain layout: header followed by vector data.
pub const VERSION_PLAIN: u32 = 1;

/// Plain layout plus a trailing CRC-32.
pub const VERSION_CHECKSUM: u32 = 2;

/// Header size in bytes: 4 (magic) + 4 (version) + 4 (dims) + 8 (count) = 20
pub const HEADER_SIZE: usize = 20;

const CHECKSUM_SIZE: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FormatError {
    #[error("invalid magic bytes: expected ENGR")]
    InvalidMagic,

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),

    #[error("stored dimension is zero")]
    ZeroDimension,

    #[error("file truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: u64, actual: u64 },

    #[error("declared count does not match data: expected {expected} bytes, got {actual}")]
    TrailingData { expected: u64, actual: u64 },

    #[error("declared size overflows: {count} vectors of dimension {dimensions}")]
    SizeOverflow { count: u64, dimensions: u32 },

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
}

/// Parsed .engram file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub version: u32,
    pub dimensions: u32,
    pub count: u64,
}

impl IndexHeader {
    /// Parse and validate the first [`HEADER_SIZE`] bytes of a file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::Truncated {
                expected: HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        if bytes[0..4] != MAGIC {
            return Err(FormatError::InvalidMagic);
        }

        let version = read_u32(&bytes[4..8]);
        if version != VERSION_PLAIN && version != VERSION_CHECKSUM {
            return Err(FormatError::UnsupportedVersion(version));
        }

        let dimensions = read_u32(&bytes[8..12]);
        if dimensions == 0 {
            return Err(FormatError::ZeroDimension);
        }

        let count = u64::from_le_bytes([
            bytes[12], bytes[13], bytes[14], bytes[15], bytes[16], bytes[17], bytes[18], bytes[19],
        ]);

        Ok(Self {
            version,
            dimensions,
            count,
        })
    }

    /// Write header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.dimensions.to_le_bytes());
        buf[12..20].copy_from_slice(&self.count.to_le_bytes());
        buf
    }

    pub fn has_checksum(&self) -> bool {
        self.version == VERSION_CHECKSUM
    }

    /// Size of the vector data section in bytes.
    pub fn data_size(&self) -> Result<u64, FormatError> {
        self.count
            .checked_mul(self.dimensions as u64)
            .and_then(|n| n.checked_mul(std::mem::size_of::<f32>() as u64))
            .ok_or(FormatError::SizeOverflow {
                count: self.count,
                dimensions: self.dimensions,
            })
    }

    /// Exact size of a well-formed file with this header.
    pub fn file_size(&self) -> Result<u64, FormatError> {
        let trailer = if self.has_checksum() { CHECKSUM_SIZE } else { 0 };
        self.data_size()?
            .checked_add((HEADER_SIZE + trailer) as u64)
            .ok_or(FormatError::SizeOverflow {
                count: self.count,
                dimensions: self.dimensions,
            })
    }
}

#[inline]
fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Validate a complete file image against its header and decode the vector
/// data section.
pub fn decode_vectors(bytes: &[u8], header: &IndexHeader) -> Result<Vec<f32>, FormatError> {
    let expected = header.file_size()?;
    let actual = bytes.len() as u64;
    if actual < expected {
        return Err(FormatError::Truncated { expected, actual });
    }
    if actual > expected {
        return Err(FormatError::TrailingData { expected, actual });
    }

    // file_size() fit in u64 and equals bytes.len(), so it also fits in usize.
    let data_end = HEADER_SIZE + header.data_size()? as usize;

    if header.has_checksum() {
        let stored = read_u32(&bytes[data_end..data_end + CHECKSUM_SIZE]);
        let computed = crc32fast::hash(&bytes[..data_end]);
        if stored != computed {
            return Err(FormatError::ChecksumMismatch { stored, computed });
        }
    }

    Ok(floats_from_le_bytes(&bytes[HEADER_SIZE..data_end]))
}

fn floats_from_le_bytes(bytes: &[u8]) -> Vec<f32> {
    // Mapped files are page aligned and the header is a multiple of 4 bytes,
    // so the cast normally succeeds; unaligned buffers take the copy path.
    #[cfg(target_endian = "little")]
    {
        if let Ok(floats) = bytemuck::try_cast_slice::<u8, f32>(bytes) {
            return floats.to_vec();
        }
    }

    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Serialize a row-major vector buffer in .engram layout.
///
/// `data.len()` must equal `count * dimensions`.
pub fn write_index<W: Write>(
    writer: &mut W,
    dimensions: u32,
    data: &[f32],
    checksum: bool,
) -> io::Result<()> {
    let count = (data.len() / dimensions as usize) as u64;
    let header = IndexHeader {
        version: if checksum {
            VERSION_CHECKSUM
        } else {
            VERSION_PLAIN
        },
        dimensions,
        count,
    };

    let mut hasher = crc32fast::Hasher::new();
    let header_bytes = header.to_bytes();
    writer.write_all(&header_bytes)?;
    hasher.update(&header_bytes);

    write_floats_le(writer, &mut hasher, data)?;

    if checksum {
        writer.write_all(&hasher.finalize().to_le_bytes())?;
    }
    Ok(())
}

#[cfg(target_endian = "little")]
fn write_floats_le<W: Write>(
    writer: &mut W,
    hasher: &mut crc32fast::Hasher,
    data: &[f32],
) -> io::Result<()> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    writer.write_all(bytes)?;
    hasher.update(bytes);
    Ok(())
}

#[cfg(target_endian = "big")]
fn write_floats_le<W: Write>(
    writer: &mut W,
    hasher: &mut crc32fast::Hasher,
    data: &[f32],
) -> io::Result<()> {
    for &val in data {
        let bytes = val.to_le_bytes();
        writer.write_all(&bytes)?;
        hasher.update(&bytes);
    }
    Ok(())
}

/// Temporary sibling used while writing `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write an index file so that `path` holds either its previous contents or
/// the complete new file, never a partial one.
pub fn write_index_atomic(
    path: &Path,
    dimensions: u32,
    data: &[f32],
    checksum: bool,
) -> io::Result<()> {
    let tmp_path = temp_path(path);
    let result = write_and_rename(&tmp_path, path, dimensions, data, checksum);
    if result.is_err() {
        if let Err(e) = fs::remove_file(&tmp_path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("failed to remove temporary index file {:?}: {}", tmp_path, e);
            }
        }
    }
    result
}

fn write_and_rename(
    tmp_path: &Path,
    path: &Path,
    dimensions: u32,
    data: &[f32],
    checksum: bool,
) -> io::Result<()> {
    let file = File::create(tmp_path)?;
    let mut writer = BufWriter::new(file);
    write_index(&mut writer, dimensions, data, checksum)?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);

    fs::rename(tmp_path, path)?;
    sync_parent_dir(path)
}

fn sync_parent_dir(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            File::open(parent)?.sync_all()?;
        }
    }
    Ok(())
}

/// A memory-mapped .engram file with a validated header.
///
/// The vector data is only checked and copied out by
/// [`MappedIndex::decode_vectors`], so a caller can inspect the header (for
/// example to reject a dimension mismatch) without reading the body.
pub struct MappedIndex {
    mmap: Mmap,
    header: IndexHeader,
}

impl MappedIndex {
    /// Map `path` and parse its header.
    ///
    /// # Safety
    ///
    /// Memory mapping is inherently unsafe: if the file is truncated by
    /// another process while mapped, reads may fault. Index files are only
    /// ever replaced by rename, which leaves an open mapping intact.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Err(FormatError::Truncated {
                expected: HEADER_SIZE as u64,
                actual: 0,
            }
            .into());
        }

        let mmap = unsafe { Mmap::map(&file)? };
        let header = IndexHeader::from_bytes(&mmap)?;
        Ok(Self { mmap, header })
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    /// Total length of the mapped file in bytes.
    pub fn file_len(&self) -> usize {
        self.mmap.len()
    }

    pub fn decode_vectors(&self) -> Result<Vec<f32>, FormatError> {
        decode_vectors(&self.mmap, &self.header)
    }
}
