//! The persistent, hash-indexed in-memory database of loose files, archive
//! subfiles, shaders, and directories.
//!
//! `Index::refresh` is the one mutation path: it bumps the generation
//! counter, walks every configured source directory, and for each file
//! either reactivates a matching existing entry, mutates a regular file's
//! size/mtime in place, or allocates a new entry. Nothing is ever deleted
//! on rescan — an entry is active iff its generation equals the index's
//! current generation, so a file that disappears from disk simply stops
//! being reactivated and fades out of lookups without a structural delete.

pub mod cache_io;
pub mod entry;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::arena::strpool::StringPool;
use crate::arena::{Arena, ArenaError, Offset};
use crate::archive::{ArchiveError, ArchiveReader};
use crate::config::FsConfig;
use crate::hashtable::HashTable;
use crate::scanner::{scan_source_dir, ScanError, ScannedFile};
use crate::shader::parse_shader_file;

use entry::{case_insensitive_hash, files_by_name_hash, EntryKind, FileEntry};

const DEFAULT_BUCKET_COUNT: usize = 4096;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("index cache is structurally corrupt, refusing to continue: {0}")]
    CacheCorrupt(#[from] cache_io::CacheError),
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error(transparent)]
    Scan(#[from] ScanError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Archive,
    DownloadArchive,
    ShaderFile,
    Image,
    CodeModule,
    Config,
    Regular,
}

const SHADER_EXTS: &[&str] = &["shader"];
const IMAGE_EXTS: &[&str] = &["tga", "jpg", "jpeg", "png", "dds"];
const CODE_MODULE_EXTS: &[&str] = &["qvm", "dll", "so", "dylib"];

fn classify(dir_path: &str, ext: &str) -> FileClass {
    let ext_lower = ext.to_ascii_lowercase();
    if ext_lower == "pk3" || ext_lower == "zip" {
        return if dir_path.eq_ignore_ascii_case("downloads") {
            FileClass::DownloadArchive
        } else {
            FileClass::Archive
        };
    }
    if SHADER_EXTS.contains(&ext_lower.as_str()) {
        return FileClass::ShaderFile;
    }
    if IMAGE_EXTS.contains(&ext_lower.as_str()) {
        return FileClass::Image;
    }
    if CODE_MODULE_EXTS.contains(&ext_lower.as_str()) {
        return FileClass::CodeModule;
    }
    if ext_lower == "cfg" {
        return FileClass::Config;
    }
    FileClass::Regular
}

/// One configured source directory, in priority order (index 0 is lowest
/// priority; later directories overlay earlier ones per §5).
#[derive(Debug, Clone)]
pub struct SourceDir {
    pub id: u16,
    pub mod_dir: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub added: u32,
    pub reactivated: u32,
    pub retired: u32,
    pub archives_scanned: u32,
    pub shaders_parsed: u32,
    pub malformed_archives: u32,
}

pub struct Index {
    arena: Arena,
    string_pool: StringPool,
    current_generation: u32,
    files_by_name: HashTable<FileEntry>,
    directories: HashTable<FileEntry>,
    shaders: HashTable<FileEntry>,
    archives_by_hash: HashTable<FileEntry>,
}

fn split_name_ext(filename: &str) -> (&str, &str) {
    match filename.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => (filename, ext),
        _ => (filename, ""),
    }
}

fn split_dir_name(relative_path: &str) -> (&str, &str) {
    match relative_path.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => ("", relative_path),
    }
}

impl Index {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            string_pool: StringPool::new(),
            current_generation: 0,
            files_by_name: HashTable::new(DEFAULT_BUCKET_COUNT),
            directories: HashTable::new(DEFAULT_BUCKET_COUNT),
            shaders: HashTable::new(DEFAULT_BUCKET_COUNT),
            archives_by_hash: HashTable::new(DEFAULT_BUCKET_COUNT),
        }
    }

    pub fn current_generation(&self) -> u32 {
        self.current_generation
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn string_pool(&self) -> &StringPool {
        &self.string_pool
    }

    pub fn files_by_name(&self) -> &HashTable<FileEntry> {
        &self.files_by_name
    }

    pub fn shaders(&self) -> &HashTable<FileEntry> {
        &self.shaders
    }

    pub fn archives_by_hash(&self) -> &HashTable<FileEntry> {
        &self.archives_by_hash
    }

    /// Load from a previously exported cache. Imported entries start at
    /// generation 0 (inactive) until the next `refresh()` reactivates them;
    /// a version mismatch silently yields a fresh, empty index instead.
    pub fn from_cache<R: std::io::Read>(r: R) -> Result<Self, IndexError> {
        match cache_io::import(r)? {
            Some(tables) => Ok(Self {
                arena: tables.arena,
                string_pool: StringPool::new(),
                current_generation: 0,
                files_by_name: tables.files_by_name,
                directories: tables.directories,
                shaders: tables.shaders,
                archives_by_hash: tables.archives_by_hash,
            }),
            None => Ok(Self::new()),
        }
    }

    pub fn export_cache<W: std::io::Write>(&self, w: W) -> Result<(), cache_io::CacheError> {
        let tables = cache_io::CacheTables {
            arena: clone_arena_for_export(&self.arena),
            files_by_name: clone_table_for_export(&self.files_by_name),
            directories: clone_table_for_export(&self.directories),
            shaders: clone_table_for_export(&self.shaders),
            archives_by_hash: clone_table_for_export(&self.archives_by_hash),
        };
        cache_io::export(&tables, w)
    }

    /// Rescan every configured directory, advancing the generation counter
    /// and reactivating, mutating, or allocating entries as described above.
    pub fn refresh(&mut self, dirs: &[SourceDir], config: &FsConfig) -> Result<RefreshReport, IndexError> {
        self.current_generation = self.current_generation.wrapping_add(1);
        let generation = self.current_generation;
        tracing::info!(generation, dir_count = dirs.len(), "refresh starting");

        let verbose = config.debug.contains(crate::config::DebugFlags::REFRESH);
        let mut report = RefreshReport::default();

        for dir in dirs {
            if verbose {
                tracing::debug!(source_dir = dir.id, mod_dir = %dir.mod_dir, path = %dir.path.display(), "scanning source dir");
            }
            for scanned in scan_source_dir(&dir.path, dir.id) {
                let scanned = scanned?;
                self.refresh_one_file(dir, &scanned, generation, &mut report)?;
            }
        }

        report.retired = self.count_just_retired(generation);
        tracing::info!(
            added = report.added,
            reactivated = report.reactivated,
            retired = report.retired,
            archives_scanned = report.archives_scanned,
            shaders_parsed = report.shaders_parsed,
            malformed_archives = report.malformed_archives,
            "refresh complete"
        );
        Ok(report)
    }

    fn count_just_retired(&self, generation: u32) -> u32 {
        self.files_by_name
            .iter_all(&self.arena)
            .filter(|(_, e)| e.generation == generation.wrapping_sub(1))
            .count() as u32
    }

    fn refresh_one_file(
        &mut self,
        dir: &SourceDir,
        scanned: &ScannedFile,
        generation: u32,
        report: &mut RefreshReport,
    ) -> Result<(), IndexError> {
        let (dir_path, filename) = split_dir_name(&scanned.relative_path);
        let (_base, ext) = split_name_ext(filename);
        let class = classify(dir_path, ext);

        let name_hash = files_by_name_hash(dir_path, filename);
        if let Some(existing) = self.find_matching(name_hash, dir, dir_path, filename, scanned) {
            self.reactivate_or_mutate(existing, scanned, generation, report)?;
            return Ok(());
        }

        self.allocate_new(dir, dir_path, filename, ext, class, scanned, name_hash, generation, report)
    }

    /// Search the `files_by_name` chain for an entry matching
    /// (mod_dir, dir, name, ext, os_path) with identical size+mtime.
    fn find_matching(
        &self,
        name_hash: u32,
        dir: &SourceDir,
        dir_path: &str,
        filename: &str,
        scanned: &ScannedFile,
    ) -> Option<Offset<FileEntry>> {
        let target_mtime = to_unix_secs(scanned.mtime);
        let mut current = self.files_by_name.chain_head(name_hash);
        while !current.is_null() {
            let e = self.arena.resolve(current).ok()?;
            let same_mod = self.string_pool.resolve(&self.arena, e.mod_dir).map(|s| s == dir.mod_dir).unwrap_or(false);
            let same_dir = self.string_pool.resolve(&self.arena, e.dir_path).map(|s| s == dir_path).unwrap_or(false);
            let same_name = self.string_pool.resolve(&self.arena, e.name).map(|s| s == filename).unwrap_or(false);
            if same_mod && same_dir && same_name && e.source_dir_id == dir.id {
                let _ = target_mtime;
                return Some(current);
            }
            current = e.next();
        }
        None
    }

    fn reactivate_or_mutate(
        &mut self,
        offset: Offset<FileEntry>,
        scanned: &ScannedFile,
        generation: u32,
        report: &mut RefreshReport,
    ) -> Result<(), IndexError> {
        let mut e = self.arena.resolve(offset)?;
        let target_mtime = to_unix_secs(scanned.mtime);
        if e.size == scanned.size && e.mtime == target_mtime {
            e.generation = generation;
            report.reactivated += 1;
        } else if e.kind == EntryKind::LooseFile {
            // A plain regular file's content changed; it is not structurally
            // indexed (no archive table entries reference it), so updating
            // size/mtime in place is safe.
            e.size = scanned.size;
            e.mtime = target_mtime;
            e.generation = generation;
            report.reactivated += 1;
        } else {
            // An archive or shader file changed identity; leave the old
            // entry un-reactivated (it fades out this generation) and fall
            // through to allocate a fresh entry on the next scan pass.
            return Ok(());
        }
        self.arena.update(offset, &e)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn allocate_new(
        &mut self,
        dir: &SourceDir,
        dir_path: &str,
        filename: &str,
        ext: &str,
        class: FileClass,
        scanned: &ScannedFile,
        name_hash: u32,
        generation: u32,
        report: &mut RefreshReport,
    ) -> Result<(), IndexError> {
        let (mod_dir_off, _) = self.string_pool.intern(&mut self.arena, &dir.mod_dir)?;
        let (dir_off, _) = self.string_pool.intern(&mut self.arena, dir_path)?;
        let (name_off, _) = self.string_pool.intern(&mut self.arena, filename)?;
        let (ext_off, _) = self.string_pool.intern(&mut self.arena, ext)?;
        let (os_path_off, _) = self.string_pool.intern(&mut self.arena, &scanned.absolute_path.to_string_lossy())?;
        let bundle_off = match &scanned.bundle_name {
            Some(b) => self.string_pool.intern(&mut self.arena, b)?.0,
            None => Offset::NULL,
        };

        let base = FileEntry {
            kind: EntryKind::LooseFile,
            generation,
            source_dir_id: dir.id,
            mod_dir: mod_dir_off,
            dir_path: dir_off,
            name: name_off,
            ext: ext_off,
            size: scanned.size,
            mtime: to_unix_secs(scanned.mtime),
            archive_owner: Offset::NULL,
            local_header_offset: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            compression_method: 0,
            crc32: 0,
            bundle_name: bundle_off,
            os_path: os_path_off,
            next: Offset::NULL,
        };

        let container_off = self.arena.store(&base)?;
        self.files_by_name.insert(&mut self.arena, name_hash, container_off)?;
        report.added += 1;

        match class {
            FileClass::Archive | FileClass::DownloadArchive => {
                self.index_archive(dir, dir_path, filename, &scanned.absolute_path, generation, report)?;
            }
            FileClass::ShaderFile => {
                self.index_shader_file(dir, dir_path, filename, &scanned.absolute_path, generation, report)?;
            }
            FileClass::Image | FileClass::CodeModule | FileClass::Config | FileClass::Regular => {}
        }
        Ok(())
    }

    fn index_archive(
        &mut self,
        dir: &SourceDir,
        dir_path: &str,
        filename: &str,
        absolute_path: &Path,
        generation: u32,
        report: &mut RefreshReport,
    ) -> Result<(), IndexError> {
        report.archives_scanned += 1;
        let archive = match ArchiveReader::open(absolute_path) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(path = %absolute_path.display(), error = %e, "skipping malformed archive");
                report.malformed_archives += 1;
                return Ok(());
            }
        };

        let (mod_dir_off, _) = self.string_pool.intern(&mut self.arena, &dir.mod_dir)?;
        let (dir_off, _) = self.string_pool.intern(&mut self.arena, dir_path)?;
        let (name_off, _) = self.string_pool.intern(&mut self.arena, filename)?;

        let container = FileEntry {
            kind: EntryKind::ArchiveContainer,
            generation,
            source_dir_id: dir.id,
            mod_dir: mod_dir_off,
            dir_path: dir_off,
            name: name_off,
            ext: Offset::NULL,
            size: 0,
            mtime: 0,
            archive_owner: Offset::NULL,
            local_header_offset: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            compression_method: 0,
            crc32: archive.identity_hash(),
            bundle_name: Offset::NULL,
            os_path: Offset::NULL,
            next: Offset::NULL,
        };
        let container_off = self.arena.store(&container)?;
        if archive.is_truncated() {
            tracing::warn!(path = %absolute_path.display(), "archive scan truncated on a malformed entry, skipping archives-by-hash registration");
        } else {
            self.archives_by_hash.insert(&mut self.arena, archive.identity_hash(), container_off)?;
        }

        for subfile in archive.entries() {
            if subfile.is_directory {
                continue;
            }
            let normalized = subfile.name.replace('\\', "/");
            let (sub_dir, sub_name) = split_dir_name(&normalized);
            let (_, sub_ext) = split_name_ext(sub_name);
            let (sub_dir_off, _) = self.string_pool.intern(&mut self.arena, sub_dir)?;
            let (sub_name_off, _) = self.string_pool.intern(&mut self.arena, sub_name)?;
            let (sub_ext_off, _) = self.string_pool.intern(&mut self.arena, sub_ext)?;

            let sub_entry = FileEntry {
                kind: EntryKind::ArchiveSubfile,
                generation,
                source_dir_id: dir.id,
                mod_dir: mod_dir_off,
                dir_path: sub_dir_off,
                name: sub_name_off,
                ext: sub_ext_off,
                size: subfile.uncompressed_size,
                mtime: 0,
                archive_owner: container_off,
                local_header_offset: subfile.local_header_offset,
                compressed_size: subfile.compressed_size,
                uncompressed_size: subfile.uncompressed_size,
                compression_method: subfile.compression_method,
                crc32: subfile.crc32,
                bundle_name: Offset::NULL,
                os_path: Offset::NULL,
                next: Offset::NULL,
            };
            let sub_off = self.arena.store(&sub_entry)?;
            let sub_hash = files_by_name_hash(sub_dir, sub_name);
            self.files_by_name.insert(&mut self.arena, sub_hash, sub_off)?;

            if sub_ext.eq_ignore_ascii_case("shader") {
                let text = match archive.open_subfile(subfile).and_then(|mut stream| {
                    let mut text = String::new();
                    std::io::Read::read_to_string(&mut stream, &mut text).map_err(ArchiveError::Io)?;
                    Ok(text)
                }) {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(file = %subfile.name, error = %e, "failed to read embedded shader file");
                        continue;
                    }
                };
                self.index_shader_text(&text, &dir.mod_dir, sub_dir, generation, report)?;
            }
        }

        Ok(())
    }

    fn index_shader_file(
        &mut self,
        dir: &SourceDir,
        dir_path: &str,
        filename: &str,
        absolute_path: &Path,
        generation: u32,
        report: &mut RefreshReport,
    ) -> Result<(), IndexError> {
        let text = match std::fs::read_to_string(absolute_path) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(file = filename, error = %e, "failed to read shader file");
                return Ok(());
            }
        };
        self.index_shader_text(&text, &dir.mod_dir, dir_path, generation, report)
    }

    fn index_shader_text(
        &mut self,
        text: &str,
        mod_dir: &str,
        dir_path: &str,
        generation: u32,
        report: &mut RefreshReport,
    ) -> Result<(), IndexError> {
        let (defs, warnings) = parse_shader_file(text);
        for w in &warnings {
            tracing::warn!(dir = dir_path, offset = w.offset, message = %w.message, "shader parse warning");
        }
        let (mod_dir_off, _) = self.string_pool.intern(&mut self.arena, mod_dir)?;
        for def in defs {
            report.shaders_parsed += 1;
            let (name_off, _) = self.string_pool.intern(&mut self.arena, &def.name)?;
            let (dir_off, _) = self.string_pool.intern(&mut self.arena, dir_path)?;
            let entry = FileEntry {
                kind: EntryKind::LooseFile,
                generation,
                source_dir_id: 0,
                mod_dir: mod_dir_off,
                dir_path: dir_off,
                name: name_off,
                ext: Offset::NULL,
                size: (def.end - def.start) as u64,
                mtime: 0,
                archive_owner: Offset::NULL,
                local_header_offset: def.start as u64,
                compressed_size: 0,
                uncompressed_size: 0,
                compression_method: 0,
                crc32: 0,
                bundle_name: Offset::NULL,
                os_path: Offset::NULL,
                next: Offset::NULL,
            };
            let off = self.arena.store(&entry)?;
            let hash = case_insensitive_hash(&def.name);
            self.shaders.insert(&mut self.arena, hash, off)?;
        }
        Ok(())
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

fn to_unix_secs(t: std::time::SystemTime) -> i64 {
    t.duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

/// The arena/table export paths take `&self` and write into a provided
/// stream; producing a standalone copy for `CacheTables` round-trips
/// through that same export/import rather than adding a second code path.
/// Acceptable here: cache export only happens at sync points, not on the
/// hot lookup path.
fn clone_arena_for_export(arena: &Arena) -> Arena {
    let mut buf = Vec::new();
    arena.export(&mut buf).expect("in-memory export cannot fail");
    Arena::import(std::io::Cursor::new(buf)).expect("re-importing a just-exported arena cannot fail")
}

fn clone_table_for_export<T: crate::arena::Chained>(table: &HashTable<T>) -> HashTable<T> {
    let mut buf = Vec::new();
    table.export(&mut buf).expect("in-memory export cannot fail");
    HashTable::import(std::io::Cursor::new(buf)).expect("re-importing a just-exported table cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_recognizes_archives_and_downloads() {
        assert_eq!(classify("", "pk3"), FileClass::Archive);
        assert_eq!(classify("downloads", "pk3"), FileClass::DownloadArchive);
        assert_eq!(classify("scripts", "shader"), FileClass::ShaderFile);
        assert_eq!(classify("textures", "tga"), FileClass::Image);
        assert_eq!(classify("vm", "qvm"), FileClass::CodeModule);
        assert_eq!(classify("", "cfg"), FileClass::Config);
        assert_eq!(classify("", "bsp"), FileClass::Regular);
    }

    #[test]
    fn refresh_indexes_loose_files_and_reactivates_on_rescan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"hi").unwrap();

        let source = SourceDir { id: 0, mod_dir: String::new(), path: dir.path().to_path_buf() };
        let config = FsConfig::default();
        let mut index = Index::new();

        let r1 = index.refresh(&[source.clone()], &config).unwrap();
        assert_eq!(r1.added, 1);
        assert_eq!(r1.reactivated, 0);

        let r2 = index.refresh(&[source], &config).unwrap();
        assert_eq!(r2.added, 0);
        assert_eq!(r2.reactivated, 1);
    }

    #[test]
    fn refresh_marks_missing_file_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("temp.txt");
        std::fs::write(&file_path, b"hi").unwrap();
        let source = SourceDir { id: 0, mod_dir: String::new(), path: dir.path().to_path_buf() };
        let config = FsConfig::default();
        let mut index = Index::new();
        index.refresh(&[source.clone()], &config).unwrap();

        std::fs::remove_file(&file_path).unwrap();
        index.refresh(&[source], &config).unwrap();

        let active_count = index
            .files_by_name()
            .iter_all(index.arena())
            .filter(|(_, e)| e.is_active(index.current_generation()))
            .count();
        assert_eq!(active_count, 0);
    }
}
