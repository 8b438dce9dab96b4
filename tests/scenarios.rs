use std::io::Write;

use modvfs::cache::{FileIdentity, ReadThroughCache};
use modvfs::config::{FsConfig, InactiveModVisibility};
use modvfs::index::{Index, SourceDir};
use modvfs::precedence::{LookupContext, LookupFlags, PrecedenceEngine, Query};

fn base_ctx<'a>(query_extensions: &'a [String]) -> LookupContext<'a> {
    LookupContext {
        current_mod_dir: "",
        base_game_dir: "baseq3",
        current_map_archive_hash: None,
        pure_list: &[],
        query_extensions,
        inactive_mod_visibility: InactiveModVisibility::NONE,
        mod_settings_restricted: false,
        restrict_download_folder: false,
    }
}

fn write_stored_pk3(path: &std::path::Path, entries: &[(&str, &[u8])]) {
    const LOCAL_HEADER_MAGIC: u32 = 0x0403_4b50;
    const CENTRAL_DIR_MAGIC: u32 = 0x0201_4b50;
    const EOCD_MAGIC: u32 = 0x0605_4b50;
    const METHOD_STORED: u16 = 0;

    let mut buf = Vec::new();
    let mut central = Vec::new();

    for (name, data) in entries {
        let crc = crc32fast::hash(data);
        let local_header_offset = buf.len() as u32;

        buf.extend_from_slice(&LOCAL_HEADER_MAGIC.to_le_bytes());
        buf.extend_from_slice(&20u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&METHOD_STORED.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&crc.to_le_bytes());
        buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(data);

        central.extend_from_slice(&CENTRAL_DIR_MAGIC.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&METHOD_STORED.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&crc.to_le_bytes());
        central.extend_from_slice(&(data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u32.to_le_bytes());
        central.extend_from_slice(&local_header_offset.to_le_bytes());
        central.extend_from_slice(name.as_bytes());
    }

    let cd_offset = buf.len() as u32;
    buf.extend_from_slice(&central);
    let cd_size = buf.len() as u32 - cd_offset;

    buf.extend_from_slice(&EOCD_MAGIC.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    buf.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    buf.extend_from_slice(&cd_size.to_le_bytes());
    buf.extend_from_slice(&cd_offset.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());

    std::fs::File::create(path).unwrap().write_all(&buf).unwrap();
}

/// E1 — overlay precedence: a material defined in both a base pak and a
/// current-mod pak resolves to the current-mod definition.
#[test]
fn overlay_precedence_prefers_current_mod_shader() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("base")).unwrap();
    std::fs::create_dir_all(root.path().join("mymod")).unwrap();

    write_stored_pk3(&root.path().join("base/pak0.pk3"), &[("scripts/common.shader", b"common/white\n{\n}\n")]);
    write_stored_pk3(&root.path().join("mymod/zz.pk3"), &[("scripts/common.shader", b"common/white\n{\n}\n")]);

    let mut config = FsConfig::default();
    config.base_game_dir = "baseq3".to_string();
    let mut index = Index::new();
    let sources = vec![
        SourceDir { id: 0, mod_dir: "baseq3".to_string(), path: root.path().join("base") },
        SourceDir { id: 1, mod_dir: "mymod".to_string(), path: root.path().join("mymod") },
    ];
    index.refresh(&sources, &config).unwrap();

    let query = Query::shader("common/white", "");
    let mut ctx = base_ctx(&query.extensions);
    ctx.current_mod_dir = "mymod";
    let winner = PrecedenceEngine::lookup(&index, &query, &ctx).expect("a shader candidate must exist");
    assert_eq!(winner.mod_dir_rank, 3);
}

/// E3 — a shader definition beats a loose image file of the same logical
/// name (rule 8).
#[test]
fn shader_beats_loose_image_with_same_name() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("base/gfx/2d")).unwrap();
    std::fs::write(root.path().join("base/gfx/2d/logo.tga"), b"pixels").unwrap();
    write_stored_pk3(&root.path().join("base/pak0.pk3"), &[("scripts/ui.shader", b"gfx/2d/logo\n{\n}\n")]);

    let config = FsConfig::default();
    let mut index = Index::new();
    let source = SourceDir { id: 0, mod_dir: String::new(), path: root.path().join("base") };
    index.refresh(&[source], &config).unwrap();

    let query = Query::shader("gfx/2d/logo", "gfx/2d");
    let ctx = base_ctx(&query.extensions);
    let winner = PrecedenceEngine::lookup(&index, &query, &ctx).expect("a candidate must exist");
    assert!(winner.is_shader);
}

/// E2 — pure-list enforcement: a loose file not present in the server's
/// pure pak list is hidden from a normal lookup, but visible to a caller
/// that explicitly allows direct-sourced files through.
#[test]
fn pure_list_hides_unlisted_loose_file_unless_direct_source_allowed() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("mymod/models")).unwrap();
    std::fs::write(root.path().join("mymod/models/player.md3"), b"model bytes").unwrap();

    let config = FsConfig::default();
    let mut index = Index::new();
    let source = SourceDir { id: 0, mod_dir: "mymod".to_string(), path: root.path().join("mymod") };
    index.refresh(&[source], &config).unwrap();

    let mut query = Query::image("player.md3", "models");
    query.extensions = vec!["md3".to_string()];
    let mut ctx = base_ctx(&query.extensions);
    ctx.current_mod_dir = "mymod";
    ctx.pure_list = &[1566731103];

    assert!(PrecedenceEngine::lookup(&index, &query, &ctx).is_none());

    query.flags |= LookupFlags::PURE_ALLOW_DIRECT_SOURCE;
    let winner = PrecedenceEngine::lookup(&index, &query, &ctx).expect("direct-sourced loose file must be allowed through");
    assert!(winner.is_loose_file);
}

/// E4 — `fs_restrict_dlfolder` blocks a code module sourced from the
/// downloads folder even when an identically named module is present in a
/// non-downloaded pak; the non-downloaded copy wins instead of nothing.
#[test]
fn restrict_dlfolder_blocks_downloaded_code_module_in_favor_of_trusted_pak() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("base/downloads")).unwrap();

    write_stored_pk3(&root.path().join("base/downloads/evil.pk3"), &[("vm/cgame.qvm", b"evil bytecode")]);
    write_stored_pk3(&root.path().join("base/pak0.pk3"), &[("vm/cgame.qvm", b"trusted bytecode")]);

    let mut config = FsConfig::default();
    config.restrict_download_folder = true;
    let mut index = Index::new();
    let source = SourceDir { id: 0, mod_dir: String::new(), path: root.path().join("base") };
    index.refresh(&[source], &config).unwrap();

    let query = Query::code_module("cgame", "vm");
    let mut ctx = base_ctx(&query.extensions);
    ctx.restrict_download_folder = true;
    let winner = PrecedenceEngine::lookup(&index, &query, &ctx).expect("a non-downloaded candidate must win");
    assert!(!winner.in_download_folder);
    assert_eq!(winner.archive_base_name, "pak0.pk3");
}

/// E5 — prepending arbitrary bytes to an archive (simulating a
/// self-extractor prefix) does not change its identity hash.
#[test]
fn archive_hash_is_stable_under_self_extractor_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("pak0.pk3");
    let prefixed = dir.path().join("pak0_prefixed.pk3");
    write_stored_pk3(&plain, &[("textures/wall.tga", b"some texture bytes")]);

    let original = std::fs::read(&plain).unwrap();
    let mut with_prefix = vec![0u8; 512];
    with_prefix.extend_from_slice(&original);
    std::fs::write(&prefixed, &with_prefix).unwrap();

    let a = modvfs::archive::ArchiveReader::open(&plain).unwrap();
    let b = modvfs::archive::ArchiveReader::open(&prefixed).unwrap();
    assert_eq!(a.identity_hash(), b.identity_hash());
}

/// Invariant 1 — idempotent refresh: two consecutive refreshes with no
/// source-dir mutation yield the same active-entry count.
#[test]
fn idempotent_refresh_yields_same_active_count() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"one").unwrap();
    std::fs::write(dir.path().join("b.txt"), b"two").unwrap();

    let source = SourceDir { id: 0, mod_dir: String::new(), path: dir.path().to_path_buf() };
    let config = FsConfig::default();
    let mut index = Index::new();

    index.refresh(&[source.clone()], &config).unwrap();
    let count_1 = active_count(&index);
    index.refresh(&[source], &config).unwrap();
    let count_2 = active_count(&index);

    assert_eq!(count_1, count_2);
}

fn active_count(index: &Index) -> usize {
    index.files_by_name().iter_all(index.arena()).filter(|(_, e)| e.is_active(index.current_generation())).count()
}

/// E6 — opening the same read-cache-sized payload twice resolves from the
/// cache on the second call, not from a fresh allocation.
#[test]
fn read_cache_hit_avoids_realloc() {
    let mut cache = ReadThroughCache::new(4096);
    let identity = FileIdentity { ptr_key: 1, size: 5, mtime: 0 };
    let handle = cache.allocate(5, identity).unwrap();
    cache.write(&handle, b"hello");

    let first = cache.get(identity).map(|b| b.to_vec());
    let second = cache.get(identity).map(|b| b.to_vec());
    assert_eq!(first, second);
    assert_eq!(first.unwrap(), b"hello");
}
