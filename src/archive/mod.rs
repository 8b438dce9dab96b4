//! Zip-variant archive reader: end-of-central-directory location, central
//! directory parsing, archive identity hashing, and streaming subfile reads.
//!
//! Follows a reader/writer split with a "trust the structured index, fall
//! back to a raw forward scan" two-tier pattern — here the structured index
//! is the central directory and the fallback is [`scan`].

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;

const EOCD_MAGIC: u32 = 0x0605_4b50;
const CENTRAL_DIR_MAGIC: u32 = 0x0201_4b50;
const LOCAL_HEADER_MAGIC: u32 = 0x0403_4b50;
const EOCD_MIN_SIZE: u64 = 22;
const EOCD_SEARCH_WINDOW: u64 = 64 * 1024 + EOCD_MIN_SIZE;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATE: u16 = 8;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("end-of-central-directory record not found")]
    NoEocd,
    #[error("archive spans multiple volumes, which is not supported")]
    Spanned,
    #[error("malformed central directory entry at byte {offset}: {reason}")]
    Malformed { offset: u64, reason: &'static str },
    #[error("unsupported compression method {0}")]
    UnsupportedMethod(u16),
    #[error("subfile {0:?} not found in central directory")]
    NoSuchSubfile(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One central-directory entry, with the local-header offset already
/// corrected for any self-extractor prefix.
#[derive(Debug, Clone)]
pub struct CentralDirEntry {
    pub name: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub compression_method: u16,
    pub crc32: u32,
    pub local_header_offset: u64,
    pub is_directory: bool,
}

/// A parsed archive: its path, central-directory entries, and identity hash.
pub struct ArchiveReader {
    path: std::path::PathBuf,
    entries: Vec<CentralDirEntry>,
    /// Central-directory entries have offsets relative to the archive's
    /// start on disk; a self-extractor prefix shifts every local header by
    /// this many bytes.
    prefix_correction: u64,
    identity_hash: u32,
    truncated: bool,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let mut file = File::open(path)?;
        let file_len = file.seek(SeekFrom::End(0))?;

        let (eocd_offset, cd_offset_raw, cd_size, cd_count) = locate_eocd(&mut file, file_len)?;

        // A self-extractor prefix shifts every absolute offset the central
        // directory records by a constant amount: the real start of the zip
        // data is `eocd_offset - cd_size - cd_offset_raw` bytes into the file.
        let expected_cd_start = eocd_offset
            .checked_sub(cd_size)
            .ok_or(ArchiveError::Malformed { offset: eocd_offset, reason: "central directory size exceeds EOCD offset" })?;
        let prefix_correction = expected_cd_start.saturating_sub(cd_offset_raw);

        file.seek(SeekFrom::Start(expected_cd_start))?;
        let mut entries = Vec::with_capacity(cd_count as usize);
        let mut crcs_for_hash = Vec::with_capacity(cd_count as usize);
        let mut truncated = false;

        for _ in 0..cd_count {
            match read_central_dir_entry(&mut file, prefix_correction) {
                Ok(entry) => {
                    if !entry.is_directory {
                        crcs_for_hash.push(entry.crc32);
                    }
                    entries.push(entry);
                }
                Err(ArchiveError::Malformed { offset, reason }) => {
                    tracing::warn!(%offset, reason, path = %path.display(), "skipping malformed central directory entry");
                    truncated = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let identity_hash = block_checksum_of_crcs(&crcs_for_hash);

        Ok(Self { path: path.to_path_buf(), entries, prefix_correction, identity_hash, truncated })
    }

    /// `true` if the central-directory scan stopped early on a malformed
    /// entry rather than consuming every entry EOCD claimed. A truncated
    /// archive's identity hash only covers the subfiles seen before the
    /// break, so callers should not treat it as a stable/complete identity.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn entries(&self) -> &[CentralDirEntry] {
        &self.entries
    }

    /// 32-bit archive identity: CRC32 over the little-endian-concatenated
    /// CRC32 of every non-directory subfile, in central-directory order.
    /// Two archives with byte-identical subfile-CRC sequences share this
    /// hash regardless of filename or any self-extractor prefix, since only
    /// subfile CRCs feed the checksum.
    pub fn identity_hash(&self) -> u32 {
        self.identity_hash
    }

    pub fn find(&self, name: &str) -> Option<&CentralDirEntry> {
        self.entries.iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Open a streaming reader over one subfile's decompressed bytes.
    pub fn open_subfile(&self, entry: &CentralDirEntry) -> Result<SubfileStream, ArchiveError> {
        let mut file = File::open(&self.path)?;
        let data_offset = locate_subfile_data(&mut file, entry, self.prefix_correction)?;
        SubfileStream::new(file, data_offset, entry.compressed_size, entry.uncompressed_size, entry.compression_method)
    }

    /// Re-derive the central directory by scanning forward for local file
    /// headers instead of trusting EOCD/central-directory bytes. Used when
    /// the structured path above fails but the archive may still be
    /// partially recoverable.
    pub fn scan(path: &Path) -> Result<Vec<CentralDirEntry>, ArchiveError> {
        let mut file = File::open(path)?;
        let file_len = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        let mut entries = Vec::new();
        let mut pos: u64 = 0;
        while pos + 4 <= file_len {
            file.seek(SeekFrom::Start(pos))?;
            let magic = match file.read_u32::<LittleEndian>() {
                Ok(m) => m,
                Err(_) => break,
            };
            if magic != LOCAL_HEADER_MAGIC {
                pos += 1;
                continue;
            }
            match read_local_header_at(&mut file, pos) {
                Ok((entry, next_pos)) => {
                    pos = next_pos;
                    entries.push(entry);
                }
                Err(_) => {
                    pos += 4;
                }
            }
        }
        Ok(entries)
    }
}

fn locate_eocd(file: &mut File, file_len: u64) -> Result<(u64, u64, u64, u16), ArchiveError> {
    let window = EOCD_SEARCH_WINDOW.min(file_len);
    let start = file_len - window;
    file.seek(SeekFrom::Start(start))?;
    let mut buf = vec![0u8; window as usize];
    file.read_exact(&mut buf)?;

    // Search backward for the EOCD magic so a trailing comment containing
    // the same 4 bytes by coincidence doesn't win over the real record.
    for i in (0..buf.len().saturating_sub(3)).rev() {
        let magic = u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        if magic == EOCD_MAGIC {
            if i + EOCD_MIN_SIZE as usize > buf.len() {
                continue;
            }
            let mut cursor = io::Cursor::new(&buf[i + 4..]);
            let disk_number = cursor.read_u16::<LittleEndian>()?;
            let cd_start_disk = cursor.read_u16::<LittleEndian>()?;
            let _entries_this_disk = cursor.read_u16::<LittleEndian>()?;
            let total_entries = cursor.read_u16::<LittleEndian>()?;
            let cd_size = cursor.read_u32::<LittleEndian>()? as u64;
            let cd_offset = cursor.read_u32::<LittleEndian>()? as u64;

            if disk_number != 0 || cd_start_disk != 0 {
                return Err(ArchiveError::Spanned);
            }
            let eocd_offset = start + i as u64;
            return Ok((eocd_offset, cd_offset, cd_size, total_entries));
        }
    }
    Err(ArchiveError::NoEocd)
}

fn read_central_dir_entry(file: &mut File, prefix_correction: u64) -> Result<CentralDirEntry, ArchiveError> {
    let entry_offset = file.stream_position()?;
    let magic = file.read_u32::<LittleEndian>()?;
    if magic != CENTRAL_DIR_MAGIC {
        return Err(ArchiveError::Malformed { offset: entry_offset, reason: "bad central directory signature" });
    }
    let _version_made_by = file.read_u16::<LittleEndian>()?;
    let _version_needed = file.read_u16::<LittleEndian>()?;
    let _flags = file.read_u16::<LittleEndian>()?;
    let compression_method = file.read_u16::<LittleEndian>()?;
    let _mod_time = file.read_u16::<LittleEndian>()?;
    let _mod_date = file.read_u16::<LittleEndian>()?;
    let crc32 = file.read_u32::<LittleEndian>()?;
    let compressed_size = file.read_u32::<LittleEndian>()? as u64;
    let uncompressed_size = file.read_u32::<LittleEndian>()? as u64;
    let name_len = file.read_u16::<LittleEndian>()? as usize;
    let extra_len = file.read_u16::<LittleEndian>()? as usize;
    let comment_len = file.read_u16::<LittleEndian>()? as usize;
    let _disk_start = file.read_u16::<LittleEndian>()?;
    let _internal_attrs = file.read_u16::<LittleEndian>()?;
    let _external_attrs = file.read_u32::<LittleEndian>()?;
    let local_header_offset = file.read_u32::<LittleEndian>()? as u64 + prefix_correction;

    let mut name_buf = vec![0u8; name_len];
    file.read_exact(&mut name_buf)?;
    let name = String::from_utf8_lossy(&name_buf).into_owned();

    file.seek(SeekFrom::Current((extra_len + comment_len) as i64))?;

    if compression_method != METHOD_STORED && compression_method != METHOD_DEFLATE {
        return Err(ArchiveError::Malformed { offset: entry_offset, reason: "unsupported compression method" });
    }

    let is_directory = name.ends_with('/') || name.ends_with('\\');

    Ok(CentralDirEntry {
        name,
        compressed_size,
        uncompressed_size,
        compression_method,
        crc32,
        local_header_offset,
        is_directory,
    })
}

fn read_local_header_at(file: &mut File, magic_offset: u64) -> Result<(CentralDirEntry, u64), ArchiveError> {
    file.seek(SeekFrom::Start(magic_offset + 4))?;
    let _version_needed = file.read_u16::<LittleEndian>()?;
    let _flags = file.read_u16::<LittleEndian>()?;
    let compression_method = file.read_u16::<LittleEndian>()?;
    let _mod_time = file.read_u16::<LittleEndian>()?;
    let _mod_date = file.read_u16::<LittleEndian>()?;
    let crc32 = file.read_u32::<LittleEndian>()?;
    let compressed_size = file.read_u32::<LittleEndian>()? as u64;
    let uncompressed_size = file.read_u32::<LittleEndian>()? as u64;
    let name_len = file.read_u16::<LittleEndian>()? as usize;
    let extra_len = file.read_u16::<LittleEndian>()? as usize;

    let mut name_buf = vec![0u8; name_len];
    file.read_exact(&mut name_buf)?;
    let name = String::from_utf8_lossy(&name_buf).into_owned();
    file.seek(SeekFrom::Current(extra_len as i64))?;

    let data_start = magic_offset + 30 + name_len as u64 + extra_len as u64;
    let next_pos = data_start + compressed_size;
    let is_directory = name.ends_with('/') || name.ends_with('\\');

    Ok((
        CentralDirEntry {
            name,
            compressed_size,
            uncompressed_size,
            compression_method,
            crc32,
            local_header_offset: magic_offset,
            is_directory,
        },
        next_pos.max(magic_offset + 4),
    ))
}

/// Seek past a subfile's local header (re-reading the name/extra lengths,
/// since they may legitimately differ from the central directory's copy)
/// and return the absolute offset of its compressed data.
fn locate_subfile_data(file: &mut File, entry: &CentralDirEntry, prefix_correction: u64) -> Result<u64, ArchiveError> {
    let header_offset = entry.local_header_offset;
    file.seek(SeekFrom::Start(header_offset))?;
    let magic = file.read_u32::<LittleEndian>()?;
    if magic != LOCAL_HEADER_MAGIC {
        return Err(ArchiveError::Malformed { offset: header_offset, reason: "bad local file header signature" });
    }
    file.seek(SeekFrom::Current(22))?; // version, flags, method, time, date, crc32, sizes
    let name_len = file.read_u16::<LittleEndian>()? as i64;
    let extra_len = file.read_u16::<LittleEndian>()? as i64;
    file.seek(SeekFrom::Current(name_len + extra_len))?;
    let _ = prefix_correction;
    file.stream_position().map_err(ArchiveError::from)
}

/// The block checksum primitive shared by archive identity and pure
/// validation: CRC32 over the little-endian byte representation of each
/// input word, concatenated in order.
pub fn block_checksum_of_crcs(crcs: &[u32]) -> u32 {
    let mut bytes = Vec::with_capacity(crcs.len() * 4);
    for crc in crcs {
        bytes.extend_from_slice(&crc.to_le_bytes());
    }
    crc32fast::hash(&bytes)
}

/// Streaming decompressed reader over one subfile's bytes.
pub enum SubfileStream {
    Stored { file: File, remaining: u64 },
    Deflate { inflater: flate2::read::DeflateDecoder<io::Take<File>> },
}

impl SubfileStream {
    fn new(mut file: File, data_offset: u64, compressed_size: u64, _uncompressed_size: u64, method: u16) -> Result<Self, ArchiveError> {
        file.seek(SeekFrom::Start(data_offset))?;
        match method {
            METHOD_STORED => Ok(SubfileStream::Stored { file, remaining: compressed_size }),
            METHOD_DEFLATE => {
                let taken = file.take(compressed_size);
                Ok(SubfileStream::Deflate { inflater: flate2::read::DeflateDecoder::new(taken) })
            }
            other => Err(ArchiveError::UnsupportedMethod(other)),
        }
    }
}

impl Read for SubfileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SubfileStream::Stored { file, remaining } => {
                let cap = (*remaining).min(buf.len() as u64) as usize;
                let n = file.read(&mut buf[..cap])?;
                *remaining -= n as u64;
                Ok(n)
            }
            SubfileStream::Deflate { inflater } => inflater.read(buf),
        }
    }
}
