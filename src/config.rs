//! Owned snapshot of the recognized configuration variables.
//!
//! The cvar store itself lives outside this crate; callers populate
//! [`FsConfig`] from their own cvar system and pass it explicitly into
//! [`crate::index::Index::refresh`], the precedence engine, and the manifest
//! engine, rather than this crate reading global state — keeping the core
//! free of hidden singletons, the caller owns and passes explicit state
//! rather than the crate holding it implicitly.

/// One entry of `fs_dirs`: an ordered source-directory selector. A `*`
/// prefix marks a directory as a candidate for write-dir selection; that's
/// captured here as `writable_candidate`.
#[derive(Debug, Clone)]
pub struct SourceDirSpec {
    pub path: std::path::PathBuf,
    pub writable_candidate: bool,
}

bitflags::bitflags! {
    /// Bitmask controlling inactive-mod visibility, shared by lookup and
    /// listing per §6's `fs_read_inactive_mods`/`fs_list_inactive_mods`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct InactiveModVisibility: u32 {
        const NONE           = 0;
        const CURRENT_BASE   = 1 << 0;
        const ANY_BASE       = 1 << 1;
        const ANY_MOD        = 1 << 2;
    }
}

bitflags::bitflags! {
    /// Policy flags for `fs_download_mode` (UDP vs HTTP download selection).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DownloadMode: u32 {
        const UDP  = 1 << 0;
        const HTTP = 1 << 1;
    }
}

bitflags::bitflags! {
    /// Per-subsystem verbose logging toggles (`fs_debug_*`). Each bit gates
    /// an additional `tracing::debug!`/`trace!` call site rather than
    /// changing behavior.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct DebugFlags: u32 {
        const LOOKUP    = 1 << 0;
        const REFRESH   = 1 << 1;
        const ARCHIVE   = 1 << 2;
        const REFERENCE = 1 << 3;
    }
}

/// Owned, explicit configuration snapshot — one field per row of the
/// external-interfaces cvar table.
#[derive(Debug, Clone)]
pub struct FsConfig {
    pub dirs: Vec<SourceDirSpec>,
    pub mod_dir: Option<String>,
    /// The configured base-game directory name (`com_basegame`), e.g.
    /// `"baseq3"`. Mod-dir rank 1 in the precedence engine is a match
    /// against this, not an empty string.
    pub base_game_dir: String,
    pub mod_settings: bool,
    pub index_cache_enabled: bool,
    pub read_inactive_mods: InactiveModVisibility,
    pub list_inactive_mods: InactiveModVisibility,
    pub download_manifest: String,
    pub pure_manifest: String,
    pub redownload_across_mods: bool,
    pub full_pure_validation: bool,
    pub download_mode: DownloadMode,
    /// `fs_restrict_dlfolder`: blocks qvm/config files sourced from a
    /// downloads-folder archive in the precedence engine (§7).
    pub restrict_download_folder: bool,
    pub debug: DebugFlags,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            dirs: Vec::new(),
            mod_dir: None,
            base_game_dir: String::new(),
            mod_settings: false,
            index_cache_enabled: true,
            read_inactive_mods: InactiveModVisibility::NONE,
            list_inactive_mods: InactiveModVisibility::NONE,
            download_manifest: String::new(),
            pure_manifest: String::new(),
            redownload_across_mods: false,
            full_pure_validation: false,
            download_mode: DownloadMode::HTTP,
            restrict_download_folder: false,
            debug: DebugFlags::empty(),
        }
    }
}

impl FsConfig {
    pub fn is_basegame(&self) -> bool {
        self.mod_dir.as_deref().map(str::is_empty).unwrap_or(true)
    }

    /// Build the precedence engine's context from this config plus the
    /// per-query runtime state (current map archive, server pure list,
    /// query extension array) the config itself doesn't carry.
    pub fn lookup_context<'a>(
        &'a self,
        current_map_archive_hash: Option<u32>,
        pure_list: &'a [u32],
        query_extensions: &'a [String],
    ) -> crate::precedence::LookupContext<'a> {
        crate::precedence::LookupContext {
            current_mod_dir: self.mod_dir.as_deref().unwrap_or(""),
            base_game_dir: &self.base_game_dir,
            current_map_archive_hash,
            pure_list,
            query_extensions,
            inactive_mod_visibility: self.read_inactive_mods,
            mod_settings_restricted: self.mod_settings,
            restrict_download_folder: self.restrict_download_folder,
        }
    }
}
