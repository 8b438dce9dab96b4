//! Index cache file format: a relocatable arena blob, not a document format.
//!
//! The cache is the arena plus every hash table's bucket array, each
//! serialized through its own `export`/`import` (byteorder LE), prefixed by
//! a magic and version tag. `serde_json` is deliberately not used here:
//! this is the entire relocatable memory image and needs the same
//! bucket/offset shape on disk as in memory, not a document format suited
//! to a small manifest serialized once.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::arena::Arena;
use crate::hashtable::HashTable;
use crate::index::entry::FileEntry;

pub const CACHE_MAGIC: [u8; 4] = *b"MVFC";
/// Bumped whenever the arena/table layout changes in a way that makes an
/// older cache file unreadable.
pub const CACHE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache file version mismatch (found {found}, expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("cache file is structurally corrupt: {0}")]
    Corrupt(#[from] crate::arena::ArenaError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct CacheTables {
    pub arena: Arena,
    pub files_by_name: HashTable<FileEntry>,
    pub directories: HashTable<FileEntry>,
    pub shaders: HashTable<FileEntry>,
    pub archives_by_hash: HashTable<FileEntry>,
}

/// Write the cache file. Returns `Ok(None)` on a version mismatch read
/// attempt is not applicable here (export never fails this way); kept
/// for symmetry with [`import`]'s signature shape.
pub fn export<W: Write>(tables: &CacheTables, mut w: W) -> Result<(), CacheError> {
    w.write_all(&CACHE_MAGIC)?;
    w.write_u32::<LittleEndian>(CACHE_VERSION)?;
    tables.arena.export(&mut w)?;
    tables.files_by_name.export(&mut w)?;
    tables.directories.export(&mut w)?;
    tables.shaders.export(&mut w)?;
    tables.archives_by_hash.export(&mut w)?;
    Ok(())
}

/// Read the cache file. A version mismatch is not an error: it returns
/// `Ok(None)` so the caller discards the cache and performs a full rescan,
/// logging at `info!` rather than treating it as fatal. A structural
/// mismatch within a matching version (corrupt bucket fill, truncated
/// stream) is `Err(CacheError::Corrupt)`, which is fatal per §7.
pub fn import<R: Read>(mut r: R) -> Result<Option<CacheTables>, CacheError> {
    let mut magic = [0u8; 4];
    if r.read_exact(&mut magic).is_err() {
        return Ok(None);
    }
    if magic != CACHE_MAGIC {
        tracing::info!("index cache: bad magic, discarding cache");
        return Ok(None);
    }
    let version = r.read_u32::<LittleEndian>()?;
    if version != CACHE_VERSION {
        tracing::info!(found = version, expected = CACHE_VERSION, "index cache: version mismatch, discarding cache");
        return Ok(None);
    }

    let arena = Arena::import(&mut r)?;
    let files_by_name = HashTable::import(&mut r)?;
    let directories = HashTable::import(&mut r)?;
    let shaders = HashTable::import(&mut r)?;
    let archives_by_hash = HashTable::import(&mut r)?;

    Ok(Some(CacheTables { arena, files_by_name, directories, shaders, archives_by_hash }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_magic_without_erroring() {
        let buf = vec![0u8; 16];
        let result = import(std::io::Cursor::new(buf)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn rejects_version_mismatch_without_erroring() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&CACHE_MAGIC);
        buf.extend_from_slice(&999u32.to_le_bytes());
        let result = import(std::io::Cursor::new(buf)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn roundtrips_real_tables() {
        let tables = CacheTables {
            arena: Arena::new(),
            files_by_name: HashTable::new(4),
            directories: HashTable::new(4),
            shaders: HashTable::new(4),
            archives_by_hash: HashTable::new(4),
        };
        let mut buf = Vec::new();
        export(&tables, &mut buf).unwrap();
        let restored = import(std::io::Cursor::new(&buf)).unwrap();
        assert!(restored.is_some());
    }
}
