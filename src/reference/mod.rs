//! Reference/manifest engine: turns download/pure manifest strings into
//! ordered archive sets, and validates client pure-checksum strings.
//!
//! Pure-checksum results are memoized in an LRU keyed by the archive hash
//! and checksum feed, the same way a content-addressed checksum cache keys
//! on the bytes being hashed.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use lru::LruCache;
use thiserror::Error;

use crate::archive::block_checksum_of_crcs;
use crate::index::entry::ModDirRank;

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("manifest token {0:?} is not a recognized selector")]
    UnknownToken(String),
    #[error("explicit selector {0:?} is missing a mod/name separator")]
    MalformedSelector(String),
}

/// One entry in a materialized archive set, carrying everything the sort
/// key and download/pure serialization need.
#[derive(Debug, Clone)]
pub struct ArchiveRef {
    pub archive_hash: u32,
    pub mod_dir: String,
    pub archive_name: String,
    pub cluster: i32,
    pub overlay_mod_type: u8,
    pub system_pak_rank: u8,
    pub mod_type: u8,
    pub name_match: bool,
}

impl ArchiveRef {
    fn sort_key(&self) -> (i32, u8, u8, u8, &str, &str, bool) {
        (self.cluster, self.overlay_mod_type, self.system_pak_rank, self.mod_type, &self.mod_dir, &self.archive_name, self.name_match)
    }
}

impl PartialEq for ArchiveRef {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}
impl Eq for ArchiveRef {}

impl PartialOrd for ArchiveRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Higher-priority entries sort greater, so the highest-priority candidate
/// for a given hash is the one that survives a collision.
impl Ord for ArchiveRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Context the manifest parser needs to resolve wildcard selectors without
/// reaching into the index itself — kept as a flat snapshot so the parser
/// stays free of index/arena lifetimes.
pub struct ManifestContext<'a> {
    pub mod_paks: &'a [ArchiveRef],
    pub base_paks: &'a [ArchiveRef],
    pub inactive_mod_paks: &'a [ArchiveRef],
    pub referenced_paks: &'a [ArchiveRef],
    pub current_map_pak: Option<&'a ArchiveRef>,
    pub cgame_pak: Option<&'a ArchiveRef>,
    pub ui_pak: Option<&'a ArchiveRef>,
}

pub struct ManifestParser {
    cluster: i32,
    exclude: bool,
    exclude_set: HashSet<u32>,
    output: HashMap<u32, ArchiveRef>,
}

impl ManifestParser {
    pub fn new() -> Self {
        Self { cluster: 0, exclude: false, exclude_set: HashSet::new(), output: HashMap::new() }
    }

    /// Parse the full manifest string and return the materialized,
    /// collision-resolved archive set.
    pub fn build(manifest: &str, ctx: &ManifestContext) -> Result<Vec<ArchiveRef>, ReferenceError> {
        let mut parser = Self::new();
        for token in manifest.split_whitespace() {
            parser.apply_token(token, ctx)?;
            // `&exclude` applies to exactly the one selector that follows it;
            // every other token clears the mode once it's been processed.
            if !token.eq_ignore_ascii_case("&exclude") {
                parser.exclude = false;
            }
        }
        let mut refs: Vec<ArchiveRef> = parser.output.into_values().filter(|r| !parser.exclude_set.contains(&r.archive_hash)).collect();
        refs.sort_by(|a, b| b.cmp(a));
        Ok(refs)
    }

    fn apply_token(&mut self, token: &str, ctx: &ManifestContext) -> Result<(), ReferenceError> {
        match token {
            "-" => {
                self.cluster += 1;
                Ok(())
            }
            "&exclude" => {
                self.exclude = true;
                Ok(())
            }
            "&exclude_reset" => {
                self.exclude_set.clear();
                Ok(())
            }
            "*mod_paks" => self.emit_all(ctx.mod_paks),
            "*base_paks" => self.emit_all(ctx.base_paks),
            "*inactivemod_paks" => self.emit_all(ctx.inactive_mod_paks),
            "*referenced_paks" => self.emit_all(ctx.referenced_paks),
            "*currentmap_pak" => self.emit_one(ctx.current_map_pak),
            "*cgame_pak" => self.emit_one(ctx.cgame_pak),
            "*ui_pak" => self.emit_one(ctx.ui_pak),
            explicit => self.apply_explicit(explicit, ctx),
        }
    }

    fn emit_all(&mut self, refs: &[ArchiveRef]) -> Result<(), ReferenceError> {
        for r in refs {
            self.emit(r.clone());
        }
        Ok(())
    }

    fn emit_one(&mut self, r: Option<&ArchiveRef>) -> Result<(), ReferenceError> {
        if let Some(r) = r {
            self.emit(r.clone());
        }
        Ok(())
    }

    fn apply_explicit(&mut self, token: &str, ctx: &ManifestContext) -> Result<(), ReferenceError> {
        let (selector, explicit_hash) = match token.split_once(':') {
            Some((sel, hash)) => (sel, hash.parse::<u32>().ok()),
            None => (token, None),
        };
        if !selector.contains('/') {
            return Err(ReferenceError::MalformedSelector(token.to_string()));
        }
        let all: Vec<&ArchiveRef> = ctx
            .mod_paks
            .iter()
            .chain(ctx.base_paks)
            .chain(ctx.inactive_mod_paks)
            .chain(ctx.referenced_paks)
            .filter(|r| {
                let full = format!("{}/{}", r.mod_dir, r.archive_name);
                full.eq_ignore_ascii_case(selector) && explicit_hash.map(|h| h == r.archive_hash).unwrap_or(true)
            })
            .collect();
        for r in all {
            self.emit(r.clone());
        }
        Ok(())
    }

    fn emit(&mut self, mut r: ArchiveRef) {
        r.cluster = self.cluster;
        if self.exclude {
            self.exclude_set.insert(r.archive_hash);
            return;
        }
        match self.output.get(&r.archive_hash) {
            Some(existing) if *existing >= r => {}
            _ => {
                self.output.insert(r.archive_hash, r);
            }
        }
    }
}

impl Default for ManifestParser {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DownloadList {
    pub hash_list: String,
    pub name_list: String,
}

impl DownloadList {
    /// Build the download list, stripping any reference whose hash is a
    /// known stock-game pak so clients never attempt to "download" a file
    /// they're guaranteed to already have.
    pub fn build(ordered_refs: &[ArchiveRef], stock_game_hashes: &HashSet<u32>) -> Self {
        let mut hashes = Vec::new();
        let mut names = Vec::new();
        for r in ordered_refs {
            if stock_game_hashes.contains(&r.archive_hash) {
                continue;
            }
            hashes.push(r.archive_hash.to_string());
            names.push(format!("{}/{}", r.mod_dir, r.archive_name));
        }
        Self { hash_list: hashes.join(" "), name_list: names.join(" ") }
    }
}

/// The ordered set of archive hashes a server requires clients to have,
/// preserving 1-based insertion position.
#[derive(Debug, Default)]
pub struct PureList {
    hashes: Vec<u32>,
}

impl PureList {
    pub fn new() -> Self {
        Self { hashes: Vec::new() }
    }

    pub fn push(&mut self, hash: u32) {
        self.hashes.push(hash);
    }

    pub fn hashes(&self) -> &[u32] {
        &self.hashes
    }

    /// 1-based position of `hash`, or `None` if it's not in the list.
    pub fn position_of(&self, hash: u32) -> Option<u32> {
        self.hashes.iter().position(|&h| h == hash).map(|i| i as u32 + 1)
    }
}

/// `block_checksum(checksum_feed_bytes || crc_bytes)` — the same primitive
/// [`crate::archive::block_checksum_of_crcs`] uses for archive identity,
/// reused here for consistency between the two checksum domains.
pub fn pure_checksum(archive_crcs: &[u32], checksum_feed: u32) -> u32 {
    let mut words = Vec::with_capacity(archive_crcs.len() + 1);
    words.push(checksum_feed);
    words.extend_from_slice(archive_crcs);
    block_checksum_of_crcs(&words)
}

/// Memoizes `pure_checksum` per `(archive_hash, checksum_feed)`, since the
/// feed changes every map but the archive's CRC list does not.
pub struct PureChecksumCache {
    cache: LruCache<(u32, u32), u32>,
}

impl PureChecksumCache {
    pub fn new(capacity: usize) -> Self {
        Self { cache: LruCache::new(std::num::NonZeroUsize::new(capacity.max(1)).unwrap()) }
    }

    pub fn get_or_compute(&mut self, archive_hash: u32, archive_crcs: &[u32], checksum_feed: u32) -> u32 {
        let key = (archive_hash, checksum_feed);
        if let Some(&cached) = self.cache.get(&key) {
            return cached;
        }
        let computed = pure_checksum(archive_crcs, checksum_feed);
        self.cache.put(key, computed);
        computed
    }
}

/// Build the client's pure-validation string.
///
/// Full mode: `"<cgame-pure> <ui-pure> @ <ref1-pure> … <final>"` where
/// `final = checksum_feed XOR (xor of ref pures) XOR ref_count`.
/// Abbreviated mode (full validation off and the server isn't semi-pure):
/// `"<cgame-pure> <ui-pure> @ <cgame-pure> <checksum_feed XOR cgame-pure XOR 1>"`.
pub fn validate_pure_string(cgame_pure: u32, ui_pure: u32, ref_pures: &[u32], checksum_feed: u32, full_pure_validation: bool) -> String {
    if full_pure_validation {
        let xor_all = ref_pures.iter().fold(0u32, |acc, &p| acc ^ p);
        let final_word = checksum_feed ^ xor_all ^ ref_pures.len() as u32;
        let refs: Vec<String> = ref_pures.iter().map(|p| p.to_string()).collect();
        format!("{cgame_pure} {ui_pure} @ {} {final_word}", refs.join(" "))
    } else {
        let final_word = checksum_feed ^ cgame_pure ^ 1;
        format!("{cgame_pure} {ui_pure} @ {cgame_pure} {final_word}")
    }
}

pub fn mod_type_rank(rank: ModDirRank) -> u8 {
    rank.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ref(hash: u32, mod_dir: &str, name: &str) -> ArchiveRef {
        ArchiveRef { archive_hash: hash, mod_dir: mod_dir.to_string(), archive_name: name.to_string(), cluster: 0, overlay_mod_type: 0, system_pak_rank: 0, mod_type: 0, name_match: false }
    }

    #[test]
    fn wildcard_emits_all_base_paks() {
        let base = vec![make_ref(1, "baseq3", "pak0.pk3"), make_ref(2, "baseq3", "pak1.pk3")];
        let ctx = ManifestContext { mod_paks: &[], base_paks: &base, inactive_mod_paks: &[], referenced_paks: &[], current_map_pak: None, cgame_pak: None, ui_pak: None };
        let refs = ManifestParser::build("*base_paks", &ctx).unwrap();
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn exclude_removes_emitted_entry() {
        let base = vec![make_ref(1, "baseq3", "pak0.pk3")];
        let ctx = ManifestContext { mod_paks: &[], base_paks: &base, inactive_mod_paks: &[], referenced_paks: &[], current_map_pak: None, cgame_pak: None, ui_pak: None };
        let refs = ManifestParser::build("*base_paks &exclude *base_paks", &ctx).unwrap();
        assert!(refs.is_empty());
    }

    #[test]
    fn exclude_is_one_shot_not_sticky() {
        // "&exclude" only applies to the selector immediately after it;
        // pak1 here must survive even though it's emitted later in the
        // same manifest, with no intervening "&exclude_reset".
        let base = vec![make_ref(1, "baseq3", "pak0.pk3"), make_ref(2, "baseq3", "pak1.pk3")];
        let ctx = ManifestContext { mod_paks: &[], base_paks: &base, inactive_mod_paks: &[], referenced_paks: &[], current_map_pak: None, cgame_pak: None, ui_pak: None };
        let refs = ManifestParser::build("&exclude baseq3/pak0.pk3 *base_paks", &ctx).unwrap();
        let hashes: Vec<u32> = refs.iter().map(|r| r.archive_hash).collect();
        assert!(hashes.contains(&2));
        assert!(!hashes.contains(&1));
    }

    #[test]
    fn cluster_bumps_on_dash() {
        let base = vec![make_ref(1, "baseq3", "pak0.pk3")];
        let ctx = ManifestContext { mod_paks: &[], base_paks: &base, inactive_mod_paks: &[], referenced_paks: &[], current_map_pak: None, cgame_pak: None, ui_pak: None };
        let refs = ManifestParser::build("- *base_paks", &ctx).unwrap();
        assert_eq!(refs[0].cluster, 1);
    }

    #[test]
    fn pure_checksum_cache_memoizes() {
        let mut cache = PureChecksumCache::new(8);
        let a = cache.get_or_compute(1, &[10, 20], 99);
        let b = cache.get_or_compute(1, &[10, 20], 99);
        assert_eq!(a, b);
    }

    #[test]
    fn abbreviated_pure_string_has_expected_shape() {
        let s = validate_pure_string(111, 222, &[333, 444], 55, false);
        assert!(s.starts_with("111 222 @ 111 "));
    }

    #[test]
    fn download_list_strips_stock_hashes() {
        let refs = vec![make_ref(1, "baseq3", "pak0.pk3"), make_ref(2, "mymod", "extra.pk3")];
        let mut stock = HashSet::new();
        stock.insert(1);
        let list = DownloadList::build(&refs, &stock);
        assert_eq!(list.hash_list, "2");
    }
}
