//! Recursive source-directory scanner built on `walkdir`.
//!
//! Grounded on the broader pack's use of `walkdir` for content-addressed
//! directory scanning (`ngdp-cache`, `tvix-castore`). Junctions/reparse
//! points are never followed (`.follow_links(false)`), matching the
//! filesystem's "refresh only at discrete sync points, no live watching"
//! model — a followed symlink loop could otherwise make a single refresh
//! never terminate.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use walkdir::WalkDir;

/// Files larger than this are skipped entirely rather than indexed, since
/// the archive/index formats use 32-bit sizes throughout.
pub const MAX_FILE_SIZE: u64 = 4 * 1024 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("walk error at {path}: {source}")]
    Walk { path: PathBuf, #[source] source: walkdir::Error },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub source_dir_id: u16,
    pub relative_path: String,
    /// Set when a `.pk3dir`-suffixed path segment was spliced out of
    /// `relative_path`; names the bundle directory (without the suffix).
    pub bundle_name: Option<String>,
    pub size: u64,
    pub mtime: SystemTime,
    pub absolute_path: PathBuf,
}

/// Recursively scan `root`, yielding one [`ScannedFile`] per regular file.
/// `.app`-suffixed segments are left in place (they are not mod boundaries);
/// `.pk3dir`-suffixed segments are spliced out into `bundle_name`.
pub fn scan_source_dir(root: &Path, source_dir_id: u16) -> impl Iterator<Item = Result<ScannedFile, ScanError>> + '_ {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(move |entry| {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    return Some(Err(ScanError::Walk { path, source: e }));
                }
            };
            if !entry.file_type().is_file() {
                return None;
            }
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => return Some(Err(ScanError::Walk { path: entry.path().to_path_buf(), source: e })),
            };
            let size = metadata.len();
            if size > MAX_FILE_SIZE {
                tracing::warn!(path = %entry.path().display(), size, "skipping file larger than the 4 GiB index limit");
                return None;
            }
            let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

            let rel = match entry.path().strip_prefix(root) {
                Ok(r) => r,
                Err(_) => return None,
            };
            let (relative_path, bundle_name) = splice_bundle(rel);

            Some(Ok(ScannedFile {
                source_dir_id,
                relative_path,
                bundle_name,
                size,
                mtime,
                absolute_path: entry.path().to_path_buf(),
            }))
        })
}

/// If any path component ends in `.pk3dir`, remove that component from the
/// logical path and return its stem as the bundle name (the bundle behaves
/// as if it were a loose-file archive named `stem.pk3` for indexing
/// purposes). `.app` components are left untouched.
fn splice_bundle(rel: &Path) -> (String, Option<String>) {
    let mut bundle = None;
    let mut kept = Vec::new();
    for component in rel.components() {
        let s = component.as_os_str().to_string_lossy();
        if let Some(stem) = s.strip_suffix(".pk3dir") {
            bundle = Some(stem.to_string());
            continue;
        }
        kept.push(s.into_owned());
    }
    (kept.join("/"), bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scans_nested_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("textures")).unwrap();
        fs::write(dir.path().join("textures/wall.tga"), b"x").unwrap();
        fs::write(dir.path().join("pak0.pk3"), b"x").unwrap();

        let files: Vec<_> = scan_source_dir(dir.path(), 0).collect::<Result<_, _>>().unwrap();
        let mut names: Vec<_> = files.iter().map(|f| f.relative_path.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["pak0.pk3".to_string(), "textures/wall.tga".to_string()]);
    }

    #[test]
    fn splices_pk3dir_bundle_segment() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("mymap.pk3dir/maps")).unwrap();
        fs::write(dir.path().join("mymap.pk3dir/maps/mymap.bsp"), b"x").unwrap();

        let files: Vec<_> = scan_source_dir(dir.path(), 0).collect::<Result<_, _>>().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].bundle_name.as_deref(), Some("mymap"));
        assert_eq!(files[0].relative_path, "maps/mymap.bsp");
    }

    #[test]
    fn app_suffix_is_not_a_bundle_boundary() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Quake3.app/baseq3")).unwrap();
        fs::write(dir.path().join("Quake3.app/baseq3/pak0.pk3"), b"x").unwrap();

        let files: Vec<_> = scan_source_dir(dir.path(), 0).collect::<Result<_, _>>().unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].bundle_name.is_none());
        assert_eq!(files[0].relative_path, "Quake3.app/baseq3/pak0.pk3");
    }
}
