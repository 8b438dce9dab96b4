//! File-list query: enumerate every active match under a directory prefix,
//! without precedence resolution — every candidate is returned, not just
//! the winner.
//!
//! Shares the precedence engine's extension-filter logic but walks the
//! whole `files_by_name` table rather than one hash bucket, since there is
//! no single (dir, name) key to look up.

use bitflags::bitflags;

use crate::index::entry::ModDirRank;
use crate::index::Index;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct ListFlags: u32 {
        const LIST_INACTIVE_MODS = 1 << 0;
    }
}

#[derive(Debug, Clone)]
pub struct FileListEntry {
    pub dir_path: String,
    pub name: String,
    pub mod_dir: String,
}

/// Walk every active entry whose directory is `dir_prefix` or a descendant
/// of it, filtering by extension and by whether inactive-mod entries
/// should be surfaced.
pub fn list_files(index: &Index, dir_prefix: &str, extensions: &[&str], mod_rank_lookup: impl Fn(&str) -> ModDirRank, flags: ListFlags) -> Vec<FileListEntry> {
    let mut out = Vec::new();
    let prefix_lower = dir_prefix.to_ascii_lowercase();

    for (_, entry) in index.files_by_name().iter_all(index.arena()) {
        if !entry.is_active(index.current_generation()) {
            continue;
        }
        let Ok(dir_path) = index.string_pool().resolve(index.arena(), entry.dir_path) else { continue };
        if !dir_path.to_ascii_lowercase().starts_with(&prefix_lower) {
            continue;
        }
        let Ok(ext) = index.string_pool().resolve(index.arena(), entry.ext) else { continue };
        if !extensions.is_empty() && !extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
            continue;
        }
        let Ok(mod_dir) = index.string_pool().resolve(index.arena(), entry.mod_dir) else { continue };
        if mod_rank_lookup(&mod_dir) == ModDirRank::INACTIVE_MOD && !flags.contains(ListFlags::LIST_INACTIVE_MODS) {
            continue;
        }
        let Ok(name) = index.string_pool().resolve(index.arena(), entry.name) else { continue };
        out.push(FileListEntry { dir_path, name, mod_dir });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FsConfig;
    use crate::index::SourceDir;

    #[test]
    fn lists_files_under_prefix_with_extension_filter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("textures/walls")).unwrap();
        std::fs::write(dir.path().join("textures/walls/brick.tga"), b"x").unwrap();
        std::fs::write(dir.path().join("textures/walls/readme.txt"), b"x").unwrap();

        let source = SourceDir { id: 0, mod_dir: String::new(), path: dir.path().to_path_buf() };
        let mut index = Index::new();
        index.refresh(&[source], &FsConfig::default()).unwrap();

        let results = list_files(&index, "textures", &["tga"], |_| ModDirRank::BASEGAME, ListFlags::empty());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "brick.tga");
    }

    #[test]
    fn inactive_mod_entries_hidden_without_flag() {
        let index = Index::new();
        let results = list_files(&index, "", &[], |_| ModDirRank::INACTIVE_MOD, ListFlags::empty());
        assert!(results.is_empty());
    }
}
