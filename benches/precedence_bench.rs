use criterion::{black_box, criterion_group, criterion_main, Criterion};

use modvfs::config::FsConfig;
use modvfs::index::{Index, SourceDir};
use modvfs::precedence::{LookupContext, PrecedenceEngine, Query};

fn build_index(file_count: usize) -> (tempfile::TempDir, Index) {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..file_count {
        std::fs::write(dir.path().join(format!("texture_{i}.tga")), b"x").unwrap();
    }
    let source = SourceDir { id: 0, mod_dir: String::new(), path: dir.path().to_path_buf() };
    let mut index = Index::new();
    index.refresh(&[source], &FsConfig::default()).unwrap();
    (dir, index)
}

fn bench_refresh(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..2000 {
        std::fs::write(dir.path().join(format!("file_{i}.tga")), b"x").unwrap();
    }
    let source = SourceDir { id: 0, mod_dir: String::new(), path: dir.path().to_path_buf() };
    c.bench_function("index_refresh_2000_files", |b| {
        b.iter(|| {
            let mut index = Index::new();
            index.refresh(black_box(&[source.clone()]), &FsConfig::default()).unwrap();
        })
    });
}

fn bench_lookup(c: &mut Criterion) {
    let (_dir, index) = build_index(2000);
    let query = Query::image("texture_1000.tga", "");
    let ctx = LookupContext {
        current_mod_dir: "",
        base_game_dir: "",
        current_map_archive_hash: None,
        pure_list: &[],
        query_extensions: &query.extensions,
        inactive_mod_visibility: modvfs::config::InactiveModVisibility::NONE,
        mod_settings_restricted: false,
        restrict_download_folder: false,
    };
    c.bench_function("precedence_lookup_2000_files", |b| {
        b.iter(|| PrecedenceEngine::lookup(black_box(&index), black_box(&query), black_box(&ctx)))
    });
}

criterion_group!(benches, bench_refresh, bench_lookup);
criterion_main!(benches);
