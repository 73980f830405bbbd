//! Error types for the blockterm-journal crate.

use crate::diff::PatchError;
use crate::entry::EntryId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplyError {
    /// The target file changed since the entry was last applied or undone.
    #[error(
        "entry {id}: {} was modified externally (expected {}, found {})",
        .path.display(),
        .expected.as_deref().unwrap_or("no file"),
        .actual.as_deref().unwrap_or("no file")
    )]
    Conflict {
        id: EntryId,
        path: PathBuf,
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("no journal entry {0}")]
    NotFound(EntryId),

    #[error("entry {0} is already applied")]
    AlreadyApplied(EntryId),

    #[error("entry {0} is not applied")]
    NotApplied(EntryId),

    #[error("operation cancelled")]
    Cancelled,

    #[error("cannot patch {}: {source}", .path.display())]
    Patch {
        path: PathBuf,
        #[source]
        source: PatchError,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading or appending the journal file failed.
    #[error("journal {}: {source}", .path.display())]
    Journal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("journal {} line {line} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode journal record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ApplyError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ApplyError::Io {
            path: path.into(),
            source,
        }
    }
}
