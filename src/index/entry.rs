//! Index entry record: the loose-file / archive-subfile sum type.
//!
//! The original dispatches on a `sourcetype` field (`fsc_direct_is_file_active`,
//! `fsc_get_sourcetype` switching over `FSC_SOURCETYPE_DIRECT`/
//! `FSC_SOURCETYPE_PK3`) rather than using two separate struct shapes. This
//! crate keeps that single-record, tag-dispatched shape — `FileEntry` is one
//! fixed-size [`ArenaRecord`] covering both loose files and archive
//! subfiles, with `kind` selecting which fields are meaningful, and
//! `is_active`/`mod_dir`/`extract_into` as the operations the sum type
//! exposes regardless of kind.

use crate::arena::{Arena, ArenaError, ArenaRecord, Chained, Offset};
use crate::arena::strpool::InternedStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    LooseFile = 0,
    ArchiveSubfile = 1,
    /// The archive itself, so its identity hash and central-directory span
    /// can be looked up by offset the same way a regular entry would be.
    ArchiveContainer = 2,
}

impl EntryKind {
    fn from_tag(tag: u8) -> Result<Self, ArenaError> {
        match tag {
            0 => Ok(EntryKind::LooseFile),
            1 => Ok(EntryKind::ArchiveSubfile),
            2 => Ok(EntryKind::ArchiveContainer),
            _ => Err(ArenaError::InvalidOffset(tag as u32)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModDirRank(pub u8);

impl ModDirRank {
    pub const CURRENT_MOD: ModDirRank = ModDirRank(3);
    pub const BASEMOD_OVERLAY: ModDirRank = ModDirRank(2);
    pub const BASEGAME: ModDirRank = ModDirRank(1);
    pub const INACTIVE_MOD: ModDirRank = ModDirRank(0);
}

/// One indexed entity: a loose file, a file inside an archive, or an
/// archive container record.
#[derive(Debug, Clone, Copy)]
pub struct FileEntry {
    pub kind: EntryKind,
    pub generation: u32,
    pub source_dir_id: u16,
    pub mod_dir: Offset<InternedStr>,
    pub dir_path: Offset<InternedStr>,
    pub name: Offset<InternedStr>,
    pub ext: Offset<InternedStr>,
    pub size: u64,
    pub mtime: i64,
    /// For `ArchiveSubfile`: the owning `ArchiveContainer` entry. Null
    /// otherwise.
    pub archive_owner: Offset<FileEntry>,
    pub local_header_offset: u64,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub compression_method: u16,
    pub crc32: u32,
    /// Set when this entry (or its owning archive, for subfiles) came from
    /// a `.pk3dir`-suffixed directory bundle.
    pub bundle_name: Offset<InternedStr>,
    pub os_path: Offset<InternedStr>,
    next: Offset<FileEntry>,
}

impl FileEntry {
    /// Active iff its generation matches the index's current generation —
    /// the index never deletes on rescan, it only advances the generation
    /// counter and reactivates entries a new scan still observes.
    pub fn is_active(&self, current_generation: u32) -> bool {
        self.generation == current_generation
    }

    pub fn mod_dir<'a>(&self, arena: &'a Arena, pool: &crate::arena::strpool::StringPool) -> Result<String, ArenaError> {
        pool.resolve(arena, self.mod_dir)
    }

    /// Read this entry's full bytes, inflating an archive subfile or reading
    /// a loose file straight off disk. Returns `Ok(vec![])` on a
    /// decompression failure, per §7 ("extract returns failure, callers
    /// surface null/empty data").
    pub fn extract_into(&self, archive: Option<&crate::archive::ArchiveReader>) -> std::io::Result<Vec<u8>> {
        use std::io::Read;
        match self.kind {
            EntryKind::LooseFile | EntryKind::ArchiveContainer => {
                // Loose-file bytes are read by the caller via `os_path`; this
                // entry alone does not carry a filesystem handle.
                Ok(Vec::new())
            }
            EntryKind::ArchiveSubfile => {
                let archive = match archive {
                    Some(a) => a,
                    None => return Ok(Vec::new()),
                };
                let entry = crate::archive::CentralDirEntry {
                    name: String::new(),
                    compressed_size: self.compressed_size,
                    uncompressed_size: self.uncompressed_size,
                    compression_method: self.compression_method,
                    crc32: self.crc32,
                    local_header_offset: self.local_header_offset,
                    is_directory: false,
                };
                match archive.open_subfile(&entry) {
                    Ok(mut stream) => {
                        let mut out = Vec::with_capacity(self.uncompressed_size as usize);
                        match stream.read_to_end(&mut out) {
                            Ok(_) => Ok(out),
                            Err(_) => Ok(Vec::new()),
                        }
                    }
                    Err(_) => Ok(Vec::new()),
                }
            }
        }
    }
}

impl ArenaRecord for FileEntry {
    const SIZE: usize = 85;

    fn encode(&self, out: &mut [u8]) {
        out[0] = self.kind as u8;
        out[1..5].copy_from_slice(&self.generation.to_le_bytes());
        out[5..7].copy_from_slice(&self.source_dir_id.to_le_bytes());
        out[7..11].copy_from_slice(&self.mod_dir.raw().0.to_le_bytes());
        out[11..15].copy_from_slice(&self.dir_path.raw().0.to_le_bytes());
        out[15..19].copy_from_slice(&self.name.raw().0.to_le_bytes());
        out[19..23].copy_from_slice(&self.ext.raw().0.to_le_bytes());
        out[23..31].copy_from_slice(&self.size.to_le_bytes());
        out[31..39].copy_from_slice(&self.mtime.to_le_bytes());
        out[39..43].copy_from_slice(&self.archive_owner.raw().0.to_le_bytes());
        out[43..51].copy_from_slice(&self.local_header_offset.to_le_bytes());
        out[51..59].copy_from_slice(&self.compressed_size.to_le_bytes());
        out[59..67].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        out[67..69].copy_from_slice(&self.compression_method.to_le_bytes());
        out[69..73].copy_from_slice(&self.crc32.to_le_bytes());
        out[73..77].copy_from_slice(&self.bundle_name.raw().0.to_le_bytes());
        out[77..81].copy_from_slice(&self.os_path.raw().0.to_le_bytes());
        out[81..85].copy_from_slice(&self.next.raw().0.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self, ArenaError> {
        use crate::arena::RawOffset;
        let off = |b: &[u8]| Offset::from_raw(RawOffset(u32::from_le_bytes(b.try_into().unwrap())));
        Ok(Self {
            kind: EntryKind::from_tag(bytes[0])?,
            generation: u32::from_le_bytes(bytes[1..5].try_into().unwrap()),
            source_dir_id: u16::from_le_bytes(bytes[5..7].try_into().unwrap()),
            mod_dir: off(&bytes[7..11]),
            dir_path: off(&bytes[11..15]),
            name: off(&bytes[15..19]),
            ext: off(&bytes[19..23]),
            size: u64::from_le_bytes(bytes[23..31].try_into().unwrap()),
            mtime: i64::from_le_bytes(bytes[31..39].try_into().unwrap()),
            archive_owner: off(&bytes[39..43]),
            local_header_offset: u64::from_le_bytes(bytes[43..51].try_into().unwrap()),
            compressed_size: u64::from_le_bytes(bytes[51..59].try_into().unwrap()),
            uncompressed_size: u64::from_le_bytes(bytes[59..67].try_into().unwrap()),
            compression_method: u16::from_le_bytes(bytes[67..69].try_into().unwrap()),
            crc32: u32::from_le_bytes(bytes[69..73].try_into().unwrap()),
            bundle_name: off(&bytes[73..77]),
            os_path: off(&bytes[77..81]),
            next: off(&bytes[81..85]),
        })
    }
}

impl Chained for FileEntry {
    fn next(&self) -> Offset<FileEntry> {
        self.next
    }
    fn set_next(&mut self, next: Offset<FileEntry>) {
        self.next = next;
    }
}

/// `case_insensitive_hash(basename) ^ case_insensitive_hash(dirname)`, the
/// hash formula for `files_by_name`.
pub fn files_by_name_hash(dirname: &str, basename: &str) -> u32 {
    case_insensitive_hash(dirname) ^ case_insensitive_hash(basename)
}

pub fn case_insensitive_hash(s: &str) -> u32 {
    let mut hash: u32 = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b.to_ascii_lowercase() as u32);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_case_insensitive() {
        assert_eq!(case_insensitive_hash("Pak0.PK3"), case_insensitive_hash("pak0.pk3"));
    }

    #[test]
    fn record_roundtrips_through_arena() {
        let mut arena = Arena::new();
        let entry = FileEntry {
            kind: EntryKind::LooseFile,
            generation: 7,
            source_dir_id: 2,
            mod_dir: Offset::NULL,
            dir_path: Offset::NULL,
            name: Offset::NULL,
            ext: Offset::NULL,
            size: 1234,
            mtime: 9999,
            archive_owner: Offset::NULL,
            local_header_offset: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            compression_method: 0,
            crc32: 0,
            bundle_name: Offset::NULL,
            os_path: Offset::NULL,
            next: Offset::NULL,
        };
        let off = arena.store(&entry).unwrap();
        let back = arena.resolve(off).unwrap();
        assert_eq!(back.generation, 7);
        assert_eq!(back.size, 1234);
        assert!(back.is_active(7));
        assert!(!back.is_active(8));
    }
}
