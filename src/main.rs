use clap::{Parser, Subcommand};
use std::path::PathBuf;

use modvfs::archive::ArchiveReader;
use modvfs::config::FsConfig;
use modvfs::filelist::{list_files, ListFlags};
use modvfs::index::entry::ModDirRank;
use modvfs::index::{Index, SourceDir};
use modvfs::precedence::{PrecedenceEngine, Query};
use modvfs::reference::{pure_checksum, validate_pure_string};

#[derive(Parser)]
#[command(name = "modvfs", version = "1.0.0", about = "Inspection CLI for the modvfs virtual filesystem core")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every active file under a directory prefix
    List {
        dir: PathBuf,
        #[arg(short, long)]
        prefix: Option<String>,
        #[arg(short, long, value_delimiter = ',')]
        ext: Vec<String>,
    },
    /// Show index statistics for a scanned directory
    Info { dir: PathBuf },
    /// Re-derive an archive's central directory by forward scan, ignoring EOCD/central dir
    Scan { input: PathBuf },
    /// Resolve a query through the precedence engine
    Lookup {
        dir: PathBuf,
        name: String,
        #[arg(short, long, value_delimiter = ',', default_value = "tga,jpg,png")]
        ext: Vec<String>,
    },
    /// Like lookup, but print the full candidate ranking with deciding rules
    Explain {
        dir: PathBuf,
        name: String,
        #[arg(short, long, value_delimiter = ',', default_value = "tga,jpg,png")]
        ext: Vec<String>,
    },
    /// Compute a pure-validation string for a fixed set of reference CRCs
    PureCheck {
        #[arg(long)]
        cgame_crcs: Vec<u32>,
        #[arg(long)]
        ui_crcs: Vec<u32>,
        #[arg(long)]
        feed: u32,
        #[arg(long)]
        full: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Commands::List { dir, prefix, ext } => {
            let index = build_index(&dir)?;
            let extensions: Vec<&str> = ext.iter().map(String::as_str).collect();
            let results = list_files(&index, prefix.as_deref().unwrap_or(""), &extensions, |_| ModDirRank::BASEGAME, ListFlags::empty());
            println!("{:<40} {:<24} {}", "Directory", "Name", "Mod dir");
            for entry in &results {
                println!("{:<40} {:<24} {}", entry.dir_path, entry.name, if entry.mod_dir.is_empty() { "(basegame)" } else { &entry.mod_dir });
            }
            println!("{} file(s)", results.len());
        }

        Commands::Info { dir } => {
            let index = build_index(&dir)?;
            println!("── modvfs index ─────────────────────────────────────────");
            println!("  Source dir       {}", dir.display());
            println!("  Arena buckets    {}", index.arena().bucket_count());
            println!("  Arena usage      {:.1}%", index.arena().utilization() * 100.0);
            println!("  Generation       {}", index.current_generation());
        }

        Commands::Scan { input } => {
            let entries = ArchiveReader::scan(&input)?;
            println!("Forward scan recovered {} entr(y/ies):", entries.len());
            for e in &entries {
                println!("  {:<40} {:>10} B -> {:>10} B  crc={:08x}", e.name, e.compressed_size, e.uncompressed_size, e.crc32);
            }
        }

        Commands::Lookup { dir, name, ext } => {
            let index = build_index(&dir)?;
            let query = Query { name: Some(name.clone()), dir: Some(String::new()), extensions: ext, shader_name: None, flavor: modvfs::precedence::QueryFlavor::General, flags: modvfs::precedence::LookupFlags::empty() };
            let config = FsConfig::default();
            let ctx = config.lookup_context(None, &[], &query.extensions);
            match PrecedenceEngine::lookup(&index, &query, &ctx) {
                Some(winner) => println!("winner: {} (mod_dir_rank={})", winner.display_path, winner.mod_dir_rank),
                None => println!("no match for {name:?}"),
            }
        }

        Commands::Explain { dir, name, ext } => {
            let index = build_index(&dir)?;
            let query = Query { name: Some(name.clone()), dir: Some(String::new()), extensions: ext, shader_name: None, flavor: modvfs::precedence::QueryFlavor::General, flags: modvfs::precedence::LookupFlags::empty() };
            let config = FsConfig::default();
            let ctx = config.lookup_context(None, &[], &query.extensions);
            let ranked = PrecedenceEngine::lookup_explain(&index, &query, &ctx);
            if ranked.is_empty() {
                println!("no candidates for {name:?}");
            }
            for (i, (candidate, explanation)) in ranked.iter().enumerate() {
                println!("  [{i}] {}", candidate.display_path);
                if let Some((rule, msg)) = explanation {
                    println!("        decided by {rule:?}: {msg}");
                }
            }
        }

        Commands::PureCheck { cgame_crcs, ui_crcs, feed, full } => {
            let cgame_pure = pure_checksum(&cgame_crcs, feed);
            let ui_pure = pure_checksum(&ui_crcs, feed);
            let string = validate_pure_string(cgame_pure, ui_pure, &[], feed, full);
            println!("{string}");
        }
    }

    Ok(())
}

fn build_index(dir: &PathBuf) -> Result<Index, Box<dyn std::error::Error>> {
    let source = SourceDir { id: 0, mod_dir: String::new(), path: dir.clone() };
    let mut index = Index::new();
    index.refresh(&[source], &FsConfig::default())?;
    Ok(index)
}
