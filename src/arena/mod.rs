//! Append-only memory arena with offset-addressable, type-erased storage.
//!
//! # Design
//! Every entity that lives in the index — files, directory nodes, shaders,
//! interned strings, hash table buckets — lives in one `Arena`. Cross-entity
//! references are 32-bit [`Offset<T>`] handles, never raw pointers, so the
//! whole arena is one relocatable blob: [`Arena::export`] followed by
//! [`Arena::import`] on another process reproduces every offset unchanged.
//!
//! # Layout
//! The arena is a growable array of fixed-capacity buckets (`BUCKET_CAPACITY`
//! bytes each). An offset packs `bucket_id << POSITION_BITS | intra_bucket_offset`.
//! Offset 0 is reserved as the null sentinel and is never handed out by
//! [`Arena::allocate_raw`] — bucket 0 starts with a small zeroed pad for this.
//!
//! # Records
//! Entities don't live as native Rust structs inside the arena; they are
//! encoded to and decoded from fixed-size byte records via [`ArenaRecord`],
//! hand-packing little-endian fields rather than transmuting a struct layout.
//! This keeps the arena free of alignment/transmute hazards while still
//! giving every record a stable on-disk shape.

pub mod strpool;

use std::io::{self, Read, Write};
use std::marker::PhantomData;
use thiserror::Error;

/// Bytes per bucket (~1 MiB). Chosen so a handful of buckets cover a typical
/// mod directory without forcing single huge allocations.
pub const BUCKET_CAPACITY: usize = 1 << 20;
/// Bits of an offset dedicated to the intra-bucket position.
pub const POSITION_BITS: u32 = 20;
const POSITION_MASK: u32 = (1 << POSITION_BITS) - 1;
/// Bytes reserved at the front of bucket 0 so raw offset 0 never resolves to
/// real data and can serve as the null sentinel.
const NULL_PAD: usize = 4;

#[derive(Error, Debug)]
pub enum ArenaError {
    #[error("arena exhausted: requested {requested} bytes exceeds bucket capacity {capacity}")]
    Exhausted { requested: usize, capacity: usize },
    #[error("invalid arena offset {0:#010x}")]
    InvalidOffset(u32),
    #[error("dereferenced null offset where a value was required")]
    NullOffset,
    #[error("arena import: bucket fill {fill} exceeds capacity {capacity}")]
    CorruptBucket { fill: usize, capacity: usize },
    #[error("arena import: unexpected bucket count or truncated stream")]
    CorruptStream,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A raw, untyped arena offset. `0` is the null sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawOffset(pub u32);

impl RawOffset {
    pub const NULL: RawOffset = RawOffset(0);
    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
    #[inline]
    fn bucket_id(self) -> usize {
        (self.0 >> POSITION_BITS) as usize
    }
    #[inline]
    fn position(self) -> usize {
        (self.0 & POSITION_MASK) as usize
    }
}

/// A typed handle into the arena. Carries no lifetime and no pointer — just
/// a `RawOffset` plus a zero-sized type tag, so handles are `Copy` and can be
/// stored inside other arena records.
pub struct Offset<T> {
    raw: RawOffset,
    _marker: PhantomData<fn() -> T>,
}

// Manual impls: `#[derive]` would wrongly require `T: Copy`/`T: Eq` etc.
impl<T> Clone for Offset<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Offset<T> {}
impl<T> PartialEq for Offset<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}
impl<T> Eq for Offset<T> {}
impl<T> std::hash::Hash for Offset<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state)
    }
}
impl<T> std::fmt::Debug for Offset<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Offset({:#010x})", self.raw.0)
    }
}

impl<T> Offset<T> {
    pub const NULL: Offset<T> = Offset { raw: RawOffset::NULL, _marker: PhantomData };

    pub fn from_raw(raw: RawOffset) -> Self {
        Self { raw, _marker: PhantomData }
    }
    pub fn raw(self) -> RawOffset {
        self.raw
    }
    #[inline]
    pub fn is_null(self) -> bool {
        self.raw.is_null()
    }
}

/// A fixed-size, little-endian-encodable record stored in the arena.
///
/// `SIZE` must be the exact encoded length; [`Arena::store`]/[`Arena::update`]
/// allocate and overwrite exactly that many bytes.
pub trait ArenaRecord: Sized {
    const SIZE: usize;
    fn encode(&self, out: &mut [u8]);
    fn decode(bytes: &[u8]) -> Result<Self, ArenaError>;
}

/// Any record participating in a chained hash table bucket exposes its own
/// `next` link, replacing the C idiom of "every struct starts with the same
/// field" with an explicit accessor.
pub trait Chained: ArenaRecord {
    fn next(&self) -> Offset<Self>;
    fn set_next(&mut self, next: Offset<Self>);
}

struct Bucket {
    data: Vec<u8>,
    fill: usize,
}

impl Bucket {
    fn new() -> Self {
        Self { data: vec![0u8; BUCKET_CAPACITY], fill: 0 }
    }
}

/// The append-only, offset-addressed memory arena.
pub struct Arena {
    buckets: Vec<Bucket>,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena {
    pub fn new() -> Self {
        let mut first = Bucket::new();
        first.fill = NULL_PAD;
        Self { buckets: vec![first] }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Fraction of allocated arena bytes in use, for diagnostics.
    pub fn utilization(&self) -> f64 {
        let total = self.buckets.len() * BUCKET_CAPACITY;
        if total == 0 {
            return 0.0;
        }
        let used: usize = self.buckets.iter().map(|b| b.fill).sum();
        used as f64 / total as f64
    }

    fn align4(n: usize) -> usize {
        (n + 3) & !3
    }

    /// Allocate `size` zeroed, 4-byte-aligned bytes and return their offset.
    pub fn allocate_raw(&mut self, size: usize) -> Result<RawOffset, ArenaError> {
        if size > BUCKET_CAPACITY {
            return Err(ArenaError::Exhausted { requested: size, capacity: BUCKET_CAPACITY });
        }
        // Try the most recent bucket first; append a new one if it doesn't fit.
        let last = self.buckets.len() - 1;
        let aligned_fill = Self::align4(self.buckets[last].fill);
        if aligned_fill + size > BUCKET_CAPACITY {
            self.buckets.push(Bucket::new());
        }
        let bucket_id = self.buckets.len() - 1;
        let bucket = &mut self.buckets[bucket_id];
        let start = Self::align4(bucket.fill);
        bucket.fill = start + size;
        let raw = ((bucket_id as u32) << POSITION_BITS) | (start as u32 & POSITION_MASK);
        Ok(RawOffset(raw))
    }

    pub fn read_raw(&self, offset: RawOffset, len: usize) -> Result<&[u8], ArenaError> {
        if offset.is_null() {
            return Err(ArenaError::NullOffset);
        }
        let bucket = self.buckets.get(offset.bucket_id()).ok_or(ArenaError::InvalidOffset(offset.0))?;
        let start = offset.position();
        let end = start.checked_add(len).ok_or(ArenaError::InvalidOffset(offset.0))?;
        if end > bucket.fill {
            return Err(ArenaError::InvalidOffset(offset.0));
        }
        Ok(&bucket.data[start..end])
    }

    pub fn write_raw(&mut self, offset: RawOffset, data: &[u8]) -> Result<(), ArenaError> {
        if offset.is_null() {
            return Err(ArenaError::NullOffset);
        }
        let bucket = self.buckets.get_mut(offset.bucket_id()).ok_or(ArenaError::InvalidOffset(offset.0))?;
        let start = offset.position();
        let end = start.checked_add(data.len()).ok_or(ArenaError::InvalidOffset(offset.0))?;
        if end > bucket.fill {
            return Err(ArenaError::InvalidOffset(offset.0));
        }
        bucket.data[start..end].copy_from_slice(data);
        Ok(())
    }

    /// Resolve a typed offset to an owned, decoded value. Fails with
    /// [`ArenaError::NullOffset`] on offset 0; use [`Self::resolve_nullable`]
    /// when a null offset is a legitimate "absent" value rather than a bug.
    pub fn resolve<T: ArenaRecord>(&self, offset: Offset<T>) -> Result<T, ArenaError> {
        if offset.is_null() {
            return Err(ArenaError::NullOffset);
        }
        let bytes = self.read_raw(offset.raw, T::SIZE)?;
        T::decode(bytes)
    }

    /// Resolve an offset that may legitimately be null: `Ok(None)` for a
    /// null offset, `Ok(Some(value))` otherwise. Satisfies invariant 4 —
    /// null offsets resolve iff the caller opted into allowing null.
    pub fn resolve_nullable<T: ArenaRecord>(&self, offset: Offset<T>) -> Result<Option<T>, ArenaError> {
        if offset.is_null() {
            return Ok(None);
        }
        self.resolve(offset).map(Some)
    }

    /// Store a new record, returning its offset.
    pub fn store<T: ArenaRecord>(&mut self, value: &T) -> Result<Offset<T>, ArenaError> {
        let raw = self.allocate_raw(T::SIZE)?;
        let mut buf = vec![0u8; T::SIZE];
        value.encode(&mut buf);
        self.write_raw(raw, &buf)?;
        Ok(Offset::from_raw(raw))
    }

    /// Overwrite an existing record in place (same size, same offset).
    pub fn update<T: ArenaRecord>(&mut self, offset: Offset<T>, value: &T) -> Result<(), ArenaError> {
        let mut buf = vec![0u8; T::SIZE];
        value.encode(&mut buf);
        self.write_raw(offset.raw, &buf)
    }

    /// Serialize every bucket: `bucket_count: u32`, then per bucket
    /// `fill: u32` followed by `fill` bytes.
    pub fn export<W: Write>(&self, mut w: W) -> io::Result<()> {
        use byteorder::{LittleEndian, WriteBytesExt};
        w.write_u32::<LittleEndian>(self.buckets.len() as u32)?;
        for bucket in &self.buckets {
            w.write_u32::<LittleEndian>(bucket.fill as u32)?;
            w.write_all(&bucket.data[..bucket.fill])?;
        }
        Ok(())
    }

    /// Inverse of [`Arena::export`]. Validates each bucket's fill against
    /// capacity; any mismatch is treated as structural corruption.
    pub fn import<R: Read>(mut r: R) -> Result<Self, ArenaError> {
        use byteorder::{LittleEndian, ReadBytesExt};
        let bucket_count = r.read_u32::<LittleEndian>()? as usize;
        let mut buckets = Vec::with_capacity(bucket_count);
        for _ in 0..bucket_count {
            let fill = r.read_u32::<LittleEndian>()? as usize;
            if fill > BUCKET_CAPACITY {
                return Err(ArenaError::CorruptBucket { fill, capacity: BUCKET_CAPACITY });
            }
            let mut data = vec![0u8; BUCKET_CAPACITY];
            r.read_exact(&mut data[..fill])?;
            buckets.push(Bucket { data, fill });
        }
        if buckets.is_empty() {
            return Err(ArenaError::CorruptStream);
        }
        Ok(Self { buckets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Pair {
        a: u32,
        b: u32,
    }
    impl ArenaRecord for Pair {
        const SIZE: usize = 8;
        fn encode(&self, out: &mut [u8]) {
            out[0..4].copy_from_slice(&self.a.to_le_bytes());
            out[4..8].copy_from_slice(&self.b.to_le_bytes());
        }
        fn decode(bytes: &[u8]) -> Result<Self, ArenaError> {
            Ok(Self {
                a: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
                b: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            })
        }
    }

    #[test]
    fn store_and_resolve_roundtrip() {
        let mut arena = Arena::new();
        let off = arena.store(&Pair { a: 1, b: 2 }).unwrap();
        assert!(!off.is_null());
        let got = arena.resolve(off).unwrap();
        assert_eq!(got, Pair { a: 1, b: 2 });
    }

    #[test]
    fn null_offset_rejected() {
        let arena = Arena::new();
        let off: Offset<Pair> = Offset::NULL;
        assert!(matches!(arena.resolve(off), Err(ArenaError::NullOffset)));
    }

    #[test]
    fn update_overwrites_in_place() {
        let mut arena = Arena::new();
        let off = arena.store(&Pair { a: 1, b: 2 }).unwrap();
        arena.update(off, &Pair { a: 9, b: 9 }).unwrap();
        assert_eq!(arena.resolve(off).unwrap(), Pair { a: 9, b: 9 });
    }

    #[test]
    fn export_import_roundtrip() {
        let mut arena = Arena::new();
        let off1 = arena.store(&Pair { a: 10, b: 20 }).unwrap();
        let off2 = arena.store(&Pair { a: 30, b: 40 }).unwrap();

        let mut buf = Vec::new();
        arena.export(&mut buf).unwrap();
        let restored = Arena::import(std::io::Cursor::new(&buf)).unwrap();

        assert_eq!(restored.resolve(off1).unwrap(), Pair { a: 10, b: 20 });
        assert_eq!(restored.resolve(off2).unwrap(), Pair { a: 30, b: 40 });
    }

    #[test]
    fn bucket_rollover_allocates_new_bucket() {
        let mut arena = Arena::new();
        // Force enough allocations to roll into a second bucket.
        let per_bucket = BUCKET_CAPACITY / Pair::SIZE;
        for _ in 0..per_bucket + 10 {
            arena.store(&Pair { a: 0, b: 0 }).unwrap();
        }
        assert!(arena.bucket_count() >= 2);
    }

    #[test]
    fn oversized_allocation_is_exhausted() {
        let mut arena = Arena::new();
        let err = arena.allocate_raw(BUCKET_CAPACITY + 1).unwrap_err();
        assert!(matches!(err, ArenaError::Exhausted { .. }));
    }
}
