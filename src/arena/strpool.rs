//! Case-insensitive interned string pool backed by the arena's raw byte path.
//!
//! Unlike [`super::ArenaRecord`] types, interned strings are variable-length,
//! so they bypass the fixed-size record path and are written directly via
//! [`super::Arena::allocate_raw`]/[`super::Arena::write_raw`]. The pool keeps
//! its own `HashMap` from a case-folded key to the offset of the first match,
//! collapsing duplicate case-insensitive names to one arena allocation — file
//! and directory names routinely repeat across archives (`readme.txt` in
//! every mod pk3), so this keeps the arena from ballooning on large installs.
//!
//! Encoded shape: `len: u32 LE` followed by `len` raw (non-nul-terminated)
//! bytes, original case preserved for display.

use std::collections::HashMap;

use super::{Arena, ArenaError, Offset, RawOffset};

/// Marker type for an interned string's arena offset.
pub struct InternedStr;

/// Case-insensitive string interner over an [`Arena`].
///
/// The pool does not own the arena; callers pass `&mut Arena` to
/// [`StringPool::intern`] so the pool can live alongside other arena users
/// (hash tables, index records) without a borrow-splitting wrapper type.
#[derive(Default)]
pub struct StringPool {
    by_folded: HashMap<String, Offset<InternedStr>>,
}

impl StringPool {
    pub fn new() -> Self {
        Self { by_folded: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.by_folded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_folded.is_empty()
    }

    /// Intern `s`, allocating a new arena entry only if no case-insensitive
    /// match already exists. Returns the offset of the (possibly pre-existing)
    /// entry together with whether a fresh allocation was made.
    pub fn intern(&mut self, arena: &mut Arena, s: &str) -> Result<(Offset<InternedStr>, bool), ArenaError> {
        let folded = s.to_ascii_lowercase();
        if let Some(&off) = self.by_folded.get(&folded) {
            return Ok((off, false));
        }
        let off = Self::store_raw(arena, s)?;
        self.by_folded.insert(folded, off);
        Ok((off, true))
    }

    /// Look up an already-interned string without allocating.
    pub fn find(&self, s: &str) -> Option<Offset<InternedStr>> {
        self.by_folded.get(&s.to_ascii_lowercase()).copied()
    }

    /// Resolve an interned string's offset back to owned text.
    pub fn resolve(&self, arena: &Arena, off: Offset<InternedStr>) -> Result<String, ArenaError> {
        if off.is_null() {
            return Err(ArenaError::NullOffset);
        }
        let len_bytes = arena.read_raw(off.raw(), 4)?;
        let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
        let body_off = RawOffset(off.raw().0 + 4);
        let body = arena.read_raw(body_off, len)?;
        String::from_utf8(body.to_vec()).map_err(|_| ArenaError::InvalidOffset(off.raw().0))
    }

    fn store_raw(arena: &mut Arena, s: &str) -> Result<Offset<InternedStr>, ArenaError> {
        let bytes = s.as_bytes();
        let total = 4 + bytes.len();
        let raw = arena.allocate_raw(total)?;
        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(bytes);
        arena.write_raw(raw, &buf)?;
        Ok(Offset::from_raw(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_dedups_case_insensitively() {
        let mut arena = Arena::new();
        let mut pool = StringPool::new();

        let (off1, fresh1) = pool.intern(&mut arena, "Readme.txt").unwrap();
        let (off2, fresh2) = pool.intern(&mut arena, "README.TXT").unwrap();

        assert!(fresh1);
        assert!(!fresh2);
        assert_eq!(off1, off2);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn resolve_preserves_original_case() {
        let mut arena = Arena::new();
        let mut pool = StringPool::new();
        let (off, _) = pool.intern(&mut arena, "Textures/Wall.Tga").unwrap();
        assert_eq!(pool.resolve(&arena, off).unwrap(), "Textures/Wall.Tga");
    }

    #[test]
    fn distinct_strings_get_distinct_offsets() {
        let mut arena = Arena::new();
        let mut pool = StringPool::new();
        let (a, _) = pool.intern(&mut arena, "a.pk3").unwrap();
        let (b, _) = pool.intern(&mut arena, "b.pk3").unwrap();
        assert_ne!(a, b);
    }
}
