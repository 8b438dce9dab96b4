//! # modvfs — virtual filesystem core for a mod-stacked game engine
//!
//! Format/behavior guarantees:
//! - Every indexed entity (loose file, archive subfile, archive container)
//!   lives in one offset-addressed `Arena`; handles into it are typed
//!   (`Offset<T>`) so a caller can never resolve a `FileEntry` offset as a
//!   `StringPool` entry by accident.
//! - Nothing is ever deleted on rescan: an entry is active iff its
//!   generation equals the index's current generation.
//! - Archive identity is a 32-bit CRC32 over concatenated subfile CRCs —
//!   stable across a renamed file or an added self-extractor prefix.
//! - Precedence is a fixed, ordered 17-rule comparator; no rule is ever
//!   skipped and no external state changes rule order.

pub mod arena;
pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod filelist;
pub mod handle;
pub mod hashtable;
pub mod index;
pub mod precedence;
pub mod reference;
pub mod sanitize;
pub mod scanner;
pub mod shader;
pub mod trusted_vms;

pub use arena::{Arena, ArenaError, Offset};
pub use archive::{ArchiveError, ArchiveReader, CentralDirEntry};
pub use cache::{FileIdentity, ReadThroughCache};
pub use config::FsConfig;
pub use error::FsError;
pub use handle::{Handle, HandleError, HandleId, HandleTable, Owner};
pub use index::entry::{EntryKind, FileEntry, ModDirRank};
pub use index::{FileClass, Index, RefreshReport, SourceDir};
pub use precedence::{Candidate, LookupContext, LookupFlags, PrecedenceEngine, Query, QueryFlavor};
pub use reference::{ArchiveRef, DownloadList, ManifestParser, PureChecksumCache, PureList, ReferenceError};
