//! Handle layer: a fixed-slot table of open file handles, one per active
//! read or write, tagged with the subsystem (`Owner`) that opened it so a
//! module can force-close everything it leaked on shutdown.
//!
//! `HandleTable` is a fixed-slot registry (`Vec<Option<Handle>>` plus a free
//! list) rather than an ever-growing `Vec` of handles, so a leaked handle
//! shows up as a stale slot instead of silent unbounded growth.

use std::fs::File;

use thiserror::Error;

use crate::archive::{ArchiveError, ArchiveReader, CentralDirEntry, SubfileStream};
use crate::cache::FileIdentity;
use crate::index::entry::{EntryKind, FileEntry};

#[derive(Error, Debug)]
pub enum HandleError {
    #[error("handle table is full")]
    TableFull,
    #[error("invalid handle id {0}")]
    InvalidId(u32),
    #[error("entry has no backing archive to read from")]
    NoArchive,
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    System,
    CGame,
    Ui,
    ServerGame,
}

pub enum HandleKind {
    CacheRead { identity: FileIdentity },
    DirectRead { file: File },
    ArchiveRead { stream: SubfileStream },
    Write { file: File, sync_each_write: bool },
}

pub struct Handle {
    pub owner: Owner,
    pub kind: HandleKind,
    pub display_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleId(u32);

pub struct HandleTable {
    slots: Vec<Option<Handle>>,
    free_list: Vec<u32>,
}

impl HandleTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            free_list: (0..capacity as u32).rev().collect(),
        }
    }

    /// Open a read handle for `entry`. Prefers `CacheRead` when the file
    /// fits the cache's per-file budget, else `DirectRead` for loose files,
    /// else `ArchiveRead` for archive subfiles that exceed the budget.
    pub fn open_read(
        &mut self,
        entry: &FileEntry,
        owner: Owner,
        display_path: &str,
        os_path: Option<&std::path::Path>,
        archive: Option<&ArchiveReader>,
        cache_budget: usize,
    ) -> Result<HandleId, HandleError> {
        let fits_cache = entry.size as usize <= cache_budget;

        let kind = if fits_cache {
            HandleKind::CacheRead {
                identity: FileIdentity { ptr_key: entry.local_header_offset, size: entry.size, mtime: entry.mtime },
            }
        } else {
            match entry.kind {
                EntryKind::LooseFile | EntryKind::ArchiveContainer => {
                    let path = os_path.ok_or(HandleError::NoArchive)?;
                    HandleKind::DirectRead { file: File::open(path)? }
                }
                EntryKind::ArchiveSubfile => {
                    let archive = archive.ok_or(HandleError::NoArchive)?;
                    let cd_entry = CentralDirEntry {
                        name: display_path.to_string(),
                        compressed_size: entry.compressed_size,
                        uncompressed_size: entry.uncompressed_size,
                        compression_method: entry.compression_method,
                        crc32: entry.crc32,
                        local_header_offset: entry.local_header_offset,
                        is_directory: false,
                    };
                    HandleKind::ArchiveRead { stream: archive.open_subfile(&cd_entry)? }
                }
            }
        };

        self.insert(Handle { owner, kind, display_path: display_path.to_string() })
    }

    pub fn open_write(&mut self, path: &std::path::Path, owner: Owner, sync_each_write: bool) -> Result<HandleId, HandleError> {
        let file = File::create(path)?;
        self.insert(Handle {
            owner,
            kind: HandleKind::Write { file, sync_each_write },
            display_path: path.to_string_lossy().into_owned(),
        })
    }

    fn insert(&mut self, handle: Handle) -> Result<HandleId, HandleError> {
        let slot = self.free_list.pop().ok_or(HandleError::TableFull)?;
        self.slots[slot as usize] = Some(handle);
        Ok(HandleId(slot))
    }

    pub fn get(&self, id: HandleId) -> Result<&Handle, HandleError> {
        self.slots.get(id.0 as usize).and_then(|s| s.as_ref()).ok_or(HandleError::InvalidId(id.0))
    }

    pub fn get_mut(&mut self, id: HandleId) -> Result<&mut Handle, HandleError> {
        self.slots.get_mut(id.0 as usize).and_then(|s| s.as_mut()).ok_or(HandleError::InvalidId(id.0))
    }

    /// Closing is mandatory: a handle left open past its owner's lifetime is
    /// a leak that `close_all_owned_by` must clean up at shutdown.
    pub fn close(&mut self, id: HandleId) -> Result<(), HandleError> {
        let slot = self.slots.get_mut(id.0 as usize).ok_or(HandleError::InvalidId(id.0))?;
        if slot.take().is_none() {
            return Err(HandleError::InvalidId(id.0));
        }
        self.free_list.push(id.0);
        Ok(())
    }

    /// Force-close every handle owned by `owner`, logging a warning per
    /// leaked handle. Returns the count closed.
    pub fn close_all_owned_by(&mut self, owner: Owner) -> usize {
        let mut closed = 0;
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if let Some(handle) = slot {
                if handle.owner == owner {
                    tracing::warn!(path = %handle.display_path, ?owner, "force-closing leaked handle");
                    *slot = None;
                    self.free_list.push(idx as u32);
                    closed += 1;
                }
            }
        }
        closed
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_frees_the_slot_for_reuse() {
        let mut table = HandleTable::new(2);
        let id = table.open_write(&std::env::temp_dir().join("modvfs_test_handle_a"), Owner::System, false).unwrap();
        assert_eq!(table.open_count(), 1);
        table.close(id).unwrap();
        assert_eq!(table.open_count(), 0);
    }

    #[test]
    fn double_close_is_an_error() {
        let mut table = HandleTable::new(2);
        let id = table.open_write(&std::env::temp_dir().join("modvfs_test_handle_b"), Owner::System, false).unwrap();
        table.close(id).unwrap();
        assert!(table.close(id).is_err());
    }

    #[test]
    fn force_close_only_affects_matching_owner() {
        let mut table = HandleTable::new(4);
        let a = table.open_write(&std::env::temp_dir().join("modvfs_test_handle_c"), Owner::CGame, false).unwrap();
        let b = table.open_write(&std::env::temp_dir().join("modvfs_test_handle_d"), Owner::Ui, false).unwrap();
        let closed = table.close_all_owned_by(Owner::CGame);
        assert_eq!(closed, 1);
        assert!(table.get(a).is_err());
        assert!(table.get(b).is_ok());
    }

    #[test]
    fn table_full_errors_instead_of_growing() {
        let mut table = HandleTable::new(1);
        let _a = table.open_write(&std::env::temp_dir().join("modvfs_test_handle_e"), Owner::System, false).unwrap();
        let result = table.open_write(&std::env::temp_dir().join("modvfs_test_handle_f"), Owner::System, false);
        assert!(matches!(result, Err(HandleError::TableFull)));
    }
}
