//! Generic chained hash table over arena-stored records.
//!
//! Mirrors the intrusive chaining used throughout the index (`files_by_name`,
//! `archives_by_hash`, the shader and directory tables): each bucket holds
//! the offset of the first entry in its chain, and every entry carries its
//! own `next` link via [`Chained`] rather than relying on a shared struct
//! prefix the way a C implementation would.
//!
//! The table itself does not grow its bucket count — callers size it up
//! front (`HashTable::new(bucket_count)`), matching the original's
//! fixed-size hash tables sized from expected file counts at startup.

use crate::arena::{Arena, ArenaError, Chained, Offset};

/// A fixed-bucket-count chained hash table of `Offset<T>` entries.
pub struct HashTable<T> {
    buckets: Vec<Offset<T>>,
}

impl<T: Chained> HashTable<T> {
    pub fn new(bucket_count: usize) -> Self {
        let bucket_count = bucket_count.max(1);
        Self { buckets: vec![Offset::NULL; bucket_count] }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn bucket_index(&self, hash: u32) -> usize {
        (hash as usize) % self.buckets.len()
    }

    /// Insert `entry` (already stored in the arena at `offset`) at the head
    /// of the bucket for `hash`. The caller is responsible for setting
    /// `entry`'s `next` link before storing it, or for calling this before
    /// the record is written so `set_next` below applies; here we rewrite
    /// the record's `next` field in place via an arena update, keeping
    /// insertion a single operation from the caller's perspective.
    pub fn insert(&mut self, arena: &mut Arena, hash: u32, offset: Offset<T>) -> Result<(), ArenaError> {
        let idx = self.bucket_index(hash);
        let head = self.buckets[idx];
        let mut entry = arena.resolve(offset)?;
        entry.set_next(head);
        arena.update(offset, &entry)?;
        self.buckets[idx] = offset;
        Ok(())
    }

    /// Return the head offset of the chain for `hash`, or a null offset if
    /// the bucket is empty.
    pub fn chain_head(&self, hash: u32) -> Offset<T> {
        self.buckets[self.bucket_index(hash)]
    }

    /// Iterate every entry in the bucket for `hash`, in most-recently-inserted
    /// order (matching the reactivation scan's preference for newer entries).
    pub fn iter_chain<'a>(&self, arena: &'a Arena, hash: u32) -> ChainIter<'a, T> {
        ChainIter { arena, current: self.chain_head(hash) }
    }

    /// Iterate every entry across every bucket. Used by full-table scans
    /// (cache export diagnostics, `list_files`).
    pub fn iter_all<'a>(&'a self, arena: &'a Arena) -> impl Iterator<Item = (Offset<T>, T)> + 'a {
        self.buckets.iter().flat_map(move |&head| ChainOffsets { arena, current: head })
            .filter_map(move |off| arena.resolve(off).ok().map(|v| (off, v)))
    }

    /// Like [`Self::iter_chain`] but also yields each entry's own arena
    /// offset, for callers that need a stable per-candidate identity beyond
    /// the decoded fields (the precedence engine's last-resort tiebreak).
    pub fn iter_chain_with_offsets<'a>(&self, arena: &'a Arena, hash: u32) -> impl Iterator<Item = (Offset<T>, T)> + 'a {
        ChainOffsets { arena, current: self.chain_head(hash) }
            .filter_map(move |off| arena.resolve(off).ok().map(|v| (off, v)))
    }

    /// Serialize bucket heads: `bucket_count: u32` then that many `u32` raw
    /// offsets. Entry bodies live in the arena itself and are exported there.
    pub fn export<W: std::io::Write>(&self, mut w: W) -> std::io::Result<()> {
        use byteorder::{LittleEndian, WriteBytesExt};
        w.write_u32::<LittleEndian>(self.buckets.len() as u32)?;
        for b in &self.buckets {
            w.write_u32::<LittleEndian>(b.raw().0)?;
        }
        Ok(())
    }

    pub fn import<R: std::io::Read>(mut r: R) -> Result<Self, ArenaError> {
        use byteorder::{LittleEndian, ReadBytesExt};
        let bucket_count = r.read_u32::<LittleEndian>()? as usize;
        let mut buckets = Vec::with_capacity(bucket_count);
        for _ in 0..bucket_count {
            let raw = r.read_u32::<LittleEndian>()?;
            buckets.push(Offset::from_raw(crate::arena::RawOffset(raw)));
        }
        if buckets.is_empty() {
            return Err(ArenaError::CorruptStream);
        }
        Ok(Self { buckets })
    }
}

/// Iterator over decoded entries in one chain.
pub struct ChainIter<'a, T> {
    arena: &'a Arena,
    current: Offset<T>,
}

impl<'a, T: Chained> Iterator for ChainIter<'a, T> {
    type Item = T;
    fn next(&mut self) -> Option<T> {
        if self.current.is_null() {
            return None;
        }
        let entry = self.arena.resolve(self.current).ok()?;
        self.current = entry.next();
        Some(entry)
    }
}

struct ChainOffsets<'a, T> {
    arena: &'a Arena,
    current: Offset<T>,
}

impl<'a, T: Chained> Iterator for ChainOffsets<'a, T> {
    type Item = Offset<T>;
    fn next(&mut self) -> Option<Offset<T>> {
        if self.current.is_null() {
            return None;
        }
        let this = self.current;
        let entry = self.arena.resolve(this).ok()?;
        self.current = entry.next();
        Some(this)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaRecord;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Entry {
        value: u32,
        next: Offset<Entry>,
    }
    impl ArenaRecord for Entry {
        const SIZE: usize = 8;
        fn encode(&self, out: &mut [u8]) {
            out[0..4].copy_from_slice(&self.value.to_le_bytes());
            out[4..8].copy_from_slice(&self.next.raw().0.to_le_bytes());
        }
        fn decode(bytes: &[u8]) -> Result<Self, ArenaError> {
            Ok(Self {
                value: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
                next: Offset::from_raw(crate::arena::RawOffset(u32::from_le_bytes(
                    bytes[4..8].try_into().unwrap(),
                ))),
            })
        }
    }
    impl Chained for Entry {
        fn next(&self) -> Offset<Entry> {
            self.next
        }
        fn set_next(&mut self, next: Offset<Entry>) {
            self.next = next;
        }
    }

    #[test]
    fn insert_and_iterate_chain() {
        let mut arena = Arena::new();
        let mut table: HashTable<Entry> = HashTable::new(4);

        let a = arena.store(&Entry { value: 1, next: Offset::NULL }).unwrap();
        table.insert(&mut arena, 0, a).unwrap();
        let b = arena.store(&Entry { value: 2, next: Offset::NULL }).unwrap();
        table.insert(&mut arena, 4, b).unwrap(); // same bucket (4 % 4 == 0)

        let values: Vec<u32> = table.iter_chain(&arena, 0).map(|e| e.value).collect();
        assert_eq!(values, vec![2, 1]); // most recent first
    }

    #[test]
    fn different_buckets_stay_independent() {
        let mut arena = Arena::new();
        let mut table: HashTable<Entry> = HashTable::new(4);
        let a = arena.store(&Entry { value: 1, next: Offset::NULL }).unwrap();
        table.insert(&mut arena, 0, a).unwrap();
        let b = arena.store(&Entry { value: 2, next: Offset::NULL }).unwrap();
        table.insert(&mut arena, 1, b).unwrap();

        assert_eq!(table.iter_chain(&arena, 0).count(), 1);
        assert_eq!(table.iter_chain(&arena, 1).count(), 1);
    }

    #[test]
    fn export_import_preserves_heads() {
        let mut arena = Arena::new();
        let mut table: HashTable<Entry> = HashTable::new(4);
        let a = arena.store(&Entry { value: 1, next: Offset::NULL }).unwrap();
        table.insert(&mut arena, 2, a).unwrap();

        let mut buf = Vec::new();
        table.export(&mut buf).unwrap();
        let restored: HashTable<Entry> = HashTable::import(std::io::Cursor::new(&buf)).unwrap();
        assert_eq!(restored.iter_chain(&arena, 2).count(), 1);
    }
}
