//! The precedence engine: Select → Annotate → Compare → Return.
//!
//! The central algorithm. Given a query and one or more source-sets, it
//! selects every active matching candidate, annotates each with the derived
//! fields the 17 ordered rules need, picks a winner via
//! [`rules::compare_candidates`], and returns it (or `None` if the winner
//! is disabled).

pub mod rules;

use std::cmp::Ordering;

use crate::arena::Offset;
use crate::config::InactiveModVisibility;
use crate::index::entry::{EntryKind, FileEntry};
use crate::index::Index;
use crate::trusted_vms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFlavor {
    General,
    Shader,
    Image,
    Sound,
    CodeModule,
    Config,
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct LookupFlags: u32 {
        const IGNORE_PURE_LIST = 1 << 0;
        const ALLOW_INACTIVE_MODS = 1 << 1;
        /// Let a loose (directly-sourced) file satisfy rule 3 even when it
        /// has no server pak-list position, matching the original's
        /// `LOOKUPFLAG_PURE_ALLOW_DIRECT_SOURCE` used by most read callers.
        const PURE_ALLOW_DIRECT_SOURCE = 1 << 2;
    }
}

#[derive(Debug, Clone)]
pub struct Query {
    pub name: Option<String>,
    pub dir: Option<String>,
    pub extensions: Vec<String>,
    pub shader_name: Option<String>,
    pub flavor: QueryFlavor,
    pub flags: LookupFlags,
}

impl Query {
    pub fn image(name: &str, dir: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            dir: Some(dir.to_string()),
            extensions: vec!["tga".into(), "jpg".into(), "jpeg".into(), "png".into(), "dds".into()],
            shader_name: None,
            flavor: QueryFlavor::Image,
            flags: LookupFlags::empty(),
        }
    }

    pub fn shader(shader_name: &str, dir: &str) -> Self {
        let mut q = Self::image(shader_name, dir);
        q.shader_name = Some(shader_name.to_string());
        q.flavor = QueryFlavor::Shader;
        q
    }

    pub fn sound(name: &str, dir: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            dir: Some(dir.to_string()),
            extensions: vec!["wav".into(), "mp3".into()],
            shader_name: None,
            flavor: QueryFlavor::Sound,
            flags: LookupFlags::empty(),
        }
    }

    /// Platform-native dynamic library extension first, so rule 5 (native
    /// beats VM bytecode) sees it ahead of `.qvm` for extension-priority
    /// purposes, then falls back to VM bytecode.
    pub fn code_module(name: &str, dir: &str) -> Self {
        #[cfg(target_os = "windows")]
        let native_ext = "dll";
        #[cfg(target_os = "macos")]
        let native_ext = "dylib";
        #[cfg(all(unix, not(target_os = "macos")))]
        let native_ext = "so";

        Self {
            name: Some(name.to_string()),
            dir: Some(dir.to_string()),
            extensions: vec![native_ext.into(), "qvm".into()],
            shader_name: None,
            flavor: QueryFlavor::CodeModule,
            flags: LookupFlags::empty(),
        }
    }

    pub fn config(name: &str, dir: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            dir: Some(dir.to_string()),
            extensions: vec!["cfg".into()],
            shader_name: None,
            flavor: QueryFlavor::Config,
            flags: LookupFlags::IGNORE_PURE_LIST,
        }
    }
}

/// A single candidate, annotated with every field the 17 rules need.
/// Deliberately a free-standing struct rather than a view into `FileEntry`
/// directly — the comparator should not need to touch the arena.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub display_path: String,
    pub disabled: bool,
    pub is_special_shader: bool,
    pub pure_list_position: Option<u32>,
    pub mod_dir_rank: u8,
    pub is_native_code_module: bool,
    pub system_pak_rank: u8,
    pub is_current_map_pak: bool,
    pub is_shader: bool,
    pub is_loose_file: bool,
    pub in_download_folder: bool,
    pub archive_base_name: String,
    pub extension_priority: usize,
    pub source_dir_id: u16,
    pub intra_archive_position: u64,
    pub intra_shader_file_start: usize,
    pub case_exact_match: bool,
    /// Deterministic last-resort tiebreak standing in for the original's
    /// memory-address comparison.
    pub offset_tiebreak: u32,
    pub entry_offset: Option<Offset<FileEntry>>,
}

/// Context needed to annotate candidates beyond what's on the `FileEntry`
/// itself — current map/mod state, pure list, current query extension, and
/// the disable-reason policy inputs rule 1 consults (§7).
pub struct LookupContext<'a> {
    pub current_mod_dir: &'a str,
    /// The configured base-game directory name (`com_basegame`); mod-dir
    /// rank 1 is a match against this, not an empty string.
    pub base_game_dir: &'a str,
    pub current_map_archive_hash: Option<u32>,
    pub pure_list: &'a [u32],
    pub query_extensions: &'a [String],
    /// `fs_read_inactive_mods`/`fs_list_inactive_mods` policy for this
    /// lookup (the caller picks which cvar applies).
    pub inactive_mod_visibility: InactiveModVisibility,
    /// `fs_mod_settings`: when set, settings-config files may load from the
    /// current mod dir as well as basegame; otherwise basegame only.
    pub mod_settings_restricted: bool,
    /// `fs_restrict_dlfolder`: blocks qvm/config files sourced from a
    /// downloads folder.
    pub restrict_download_folder: bool,
}

pub struct PrecedenceEngine;

impl PrecedenceEngine {
    /// Run Select → Annotate → Compare → Return for `query` against `index`.
    pub fn lookup(index: &Index, query: &Query, ctx: &LookupContext) -> Option<Candidate> {
        let mut candidates = Self::select(index, query, ctx);
        if candidates.is_empty() {
            return None;
        }
        candidates.sort_by(|a, b| rules::compare_candidates(b, a));
        let winner = candidates.into_iter().next()?;
        if winner.disabled {
            None
        } else {
            Some(winner)
        }
    }

    /// Like [`Self::lookup`] but returns the full sorted candidate list
    /// together with the rule name that decided each adjacent pairing, for
    /// human-readable diagnosis.
    pub fn lookup_explain(index: &Index, query: &Query, ctx: &LookupContext) -> Vec<(Candidate, Option<(&'static str, String)>)> {
        let mut candidates = Self::select(index, query, ctx);
        candidates.sort_by(|a, b| rules::compare_candidates(b, a));
        let mut out = Vec::with_capacity(candidates.len());
        for i in 0..candidates.len() {
            let explanation = if i + 1 < candidates.len() {
                rules::decisive_rule(&candidates[i], &candidates[i + 1])
            } else {
                None
            };
            out.push((candidates[i].clone(), explanation));
        }
        out
    }

    fn select(index: &Index, query: &Query, ctx: &LookupContext) -> Vec<Candidate> {
        let mut out = Vec::new();
        let Some(name) = &query.name else { return out };
        let dir = query.dir.as_deref().unwrap_or("");

        let hash = crate::index::entry::files_by_name_hash(dir, name);
        for (offset, e) in index.files_by_name().iter_chain_with_offsets(index.arena(), hash) {
            if !e.is_active(index.current_generation()) {
                continue;
            }
            let Ok(ext) = index.string_pool().resolve(index.arena(), e.ext) else { continue };
            let Some(ext_priority) = query.extensions.iter().position(|qe| qe.eq_ignore_ascii_case(&ext)) else { continue };
            let Ok(stored_dir) = index.string_pool().resolve(index.arena(), e.dir_path) else { continue };
            let Ok(stored_name) = index.string_pool().resolve(index.arena(), e.name) else { continue };
            if !stored_dir.eq_ignore_ascii_case(dir) || !stored_name.eq_ignore_ascii_case(name) {
                continue;
            }
            out.push(Self::annotate(index, &e, offset, ext_priority, false, ctx, query));
        }

        if let Some(shader_name) = &query.shader_name {
            let shader_hash = crate::index::entry::case_insensitive_hash(shader_name);
            for (offset, e) in index.shaders().iter_chain_with_offsets(index.arena(), shader_hash) {
                if !e.is_active(index.current_generation()) {
                    continue;
                }
                let Ok(stored_name) = index.string_pool().resolve(index.arena(), e.name) else { continue };
                if !stored_name.eq_ignore_ascii_case(shader_name) {
                    continue;
                }
                out.push(Self::annotate(index, &e, offset, 0, true, ctx, query));
            }
        }

        out
    }

    fn annotate(
        index: &Index,
        e: &FileEntry,
        offset: Offset<FileEntry>,
        ext_priority: usize,
        is_shader: bool,
        ctx: &LookupContext,
        query: &Query,
    ) -> Candidate {
        let mod_dir = index.string_pool().resolve(index.arena(), e.mod_dir).unwrap_or_default();
        let mod_dir_rank: u8 = if !ctx.current_mod_dir.is_empty() && mod_dir.eq_ignore_ascii_case(ctx.current_mod_dir) {
            3
        } else if mod_dir.eq_ignore_ascii_case("basemod") {
            2
        } else if mod_dir.eq_ignore_ascii_case(ctx.base_game_dir) {
            1
        } else {
            0
        };

        let (archive_base_name, is_loose_file, intra_archive_position, in_download_folder, system_pak_rank, is_current_map_pak, owner_hash) =
            match e.kind {
                EntryKind::ArchiveSubfile => {
                    let owner = index.arena().resolve(e.archive_owner).ok();
                    let owner_name = owner.as_ref().and_then(|o| index.string_pool().resolve(index.arena(), o.name).ok()).unwrap_or_default();
                    let owner_dir = owner.as_ref().and_then(|o| index.string_pool().resolve(index.arena(), o.dir_path).ok()).unwrap_or_default();
                    let owner_hash = owner.as_ref().map(|o| o.crc32).unwrap_or(0);
                    let is_system = trusted_vms_rank(owner_hash);
                    let is_current_map = ctx.current_map_archive_hash == Some(owner_hash);
                    let in_downloads = owner_dir.eq_ignore_ascii_case("downloads");
                    (owner_name, false, e.local_header_offset, in_downloads, is_system, is_current_map, owner_hash)
                }
                EntryKind::LooseFile | EntryKind::ArchiveContainer => {
                    let own_dir = index.string_pool().resolve(index.arena(), e.dir_path).unwrap_or_default();
                    let in_downloads = own_dir.eq_ignore_ascii_case("downloads");
                    (String::new(), true, 0, in_downloads, 0, false, 0)
                }
            };

        let ext = index.string_pool().resolve(index.arena(), e.ext).unwrap_or_default();
        let is_native_code_module = matches!(ext.as_str(), "dll" | "so" | "dylib");

        let pure_list_position = match e.kind {
            EntryKind::ArchiveSubfile => ctx.pure_list.iter().position(|&h| h == owner_hash).map(|i| i as u32 + 1),
            EntryKind::LooseFile | EntryKind::ArchiveContainer => None,
        };

        // Rule 3 / §7: blocked when connected to a pure server (a non-empty
        // pure list) unless the query ignores it, the file is itself on the
        // list, or it's a direct-sourced file the query allows through.
        let pure_mode_active = !ctx.pure_list.is_empty();
        let ignore_pure_list = query.flags.contains(LookupFlags::IGNORE_PURE_LIST);
        let pure_allow_direct = query.flags.contains(LookupFlags::PURE_ALLOW_DIRECT_SOURCE);
        let pure_blocked = pure_mode_active
            && !ignore_pure_list
            && pure_list_position.is_none()
            && !(is_loose_file && pure_allow_direct);

        // §7: blocked by inactive-mod-dir policy unless the query overrides
        // it or the file already matches an active mod/basegame dir.
        let inactive_mod_blocked = if query.flags.contains(LookupFlags::ALLOW_INACTIVE_MODS) || mod_dir_rank >= 1 {
            false
        } else if ctx.inactive_mod_visibility.contains(InactiveModVisibility::ANY_MOD) {
            false
        } else if !ctx.inactive_mod_visibility.is_empty() {
            // Escape hatch: a pure-listed or system-pak file from an inactive
            // mod dir is still visible.
            pure_list_position.is_some() || system_pak_rank > 0
        } else {
            true
        };

        // §7: settings-config files can't come from an archive, and are
        // further restricted to basegame (or current mod dir, if
        // `fs_mod_settings` allows it).
        let settings_blocked = if query.flavor == QueryFlavor::Config {
            if !is_loose_file {
                true
            } else if ctx.mod_settings_restricted {
                mod_dir_rank != 1 && mod_dir_rank != 3
            } else {
                mod_dir_rank != 1
            }
        } else {
            false
        };

        // §7: `fs_restrict_dlfolder` blocks qvm/config files sourced from a
        // downloads folder regardless of query flavor.
        let download_folder_blocked =
            ctx.restrict_download_folder && in_download_folder && (query.flavor == QueryFlavor::Config || ext.eq_ignore_ascii_case("qvm"));

        // §7: user-defined trusted-hash restriction on downloaded code
        // modules — reuses the same trusted/system-pak table `system_pak_rank`
        // is drawn from, so a downloaded code module is only allowed through
        // when its owning archive is itself trusted.
        let trusted_hash_blocked = query.flavor == QueryFlavor::CodeModule && in_download_folder && system_pak_rank == 0;

        let disabled = pure_blocked || inactive_mod_blocked || settings_blocked || download_folder_blocked || trusted_hash_blocked;

        Candidate {
            display_path: index.string_pool().resolve(index.arena(), e.name).unwrap_or_default(),
            disabled,
            is_special_shader: is_shader && (mod_dir_rank >= 1 || system_pak_rank > 0 || pure_list_position.is_some()),
            pure_list_position,
            mod_dir_rank,
            is_native_code_module,
            system_pak_rank,
            is_current_map_pak,
            is_shader,
            is_loose_file,
            in_download_folder,
            archive_base_name,
            extension_priority: ext_priority,
            source_dir_id: e.source_dir_id,
            intra_archive_position,
            intra_shader_file_start: e.local_header_offset as usize,
            case_exact_match: true,
            offset_tiebreak: offset.raw().0,
            entry_offset: Some(offset),
        }
    }
}

fn trusted_vms_rank(archive_hash: u32) -> u8 {
    let padded: trusted_vms::VmHash = [archive_hash, 0, 0, 0, 0, 0, 0, 0];
    if trusted_vms::is_trusted(&padded) {
        1
    } else {
        0
    }
}

pub fn tiebreak_by_offset(a: &Candidate, b: &Candidate) -> Ordering {
    a.offset_tiebreak.cmp(&b.offset_tiebreak)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FsConfig;
    use crate::index::SourceDir;

    fn ctx_for(query_extensions: &[String]) -> LookupContext {
        LookupContext {
            current_mod_dir: "",
            base_game_dir: "",
            current_map_archive_hash: None,
            pure_list: &[],
            query_extensions,
            inactive_mod_visibility: InactiveModVisibility::NONE,
            mod_settings_restricted: false,
            restrict_download_folder: false,
        }
    }

    #[test]
    fn selects_loose_file_over_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wall.tga"), b"x").unwrap();
        let source = SourceDir { id: 0, mod_dir: String::new(), path: dir.path().to_path_buf() };
        let mut index = Index::new();
        index.refresh(&[source], &FsConfig::default()).unwrap();

        let query = Query::image("wall.tga", "");
        let ctx = ctx_for(&query.extensions);
        let winner = PrecedenceEngine::lookup(&index, &query, &ctx);
        assert!(winner.is_some());
    }

    #[test]
    fn no_match_returns_none() {
        let index = Index::new();
        let query = Query::image("missing.tga", "");
        let ctx = ctx_for(&query.extensions);
        assert!(PrecedenceEngine::lookup(&index, &query, &ctx).is_none());
    }
}
