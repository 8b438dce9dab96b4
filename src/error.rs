//! Top-level error type aggregating every subsystem's own `thiserror` enum.
//!
//! Each subsystem keeps its own `thiserror` enum; this type aggregates them
//! at the API seam rather than duplicating every subsystem's variants in one
//! flat enum.

use thiserror::Error;

use crate::arena::ArenaError;
use crate::archive::ArchiveError;
use crate::handle::HandleError;
use crate::index::IndexError;
use crate::reference::ReferenceError;
use crate::scanner::ScanError;

#[derive(Error, Debug)]
pub enum FsError {
    /// Fatal: the arena invariant is broken and the process cannot
    /// continue safely. Deliberately not `#[from]`-wrapped transparently —
    /// callers are expected to recognize this variant and abort the
    /// refresh rather than attempt recovery, per §7's classification.
    #[error("fatal arena corruption: {0}")]
    ArenaCorruption(ArenaError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Handle(#[from] HandleError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
