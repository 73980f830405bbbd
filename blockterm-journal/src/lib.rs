//! Undoable file edits for blockterm.
//!
//! Every file operation is recorded in an append-only journal together with
//! its inverse and the content hashes on either side of it. Undo and redo
//! refuse to run when the file was changed outside the journal.

pub mod applier;
pub mod diff;
pub mod entry;
pub mod error;
pub mod store;

pub use applier::{CancelToken, FileApplier};
pub use diff::{PatchError, REPLACE_MARKER, apply_unified_diff};
pub use entry::{
    ActionKind, EntryId, ForwardPayload, InversePayload, JournalEntry, JournalRecord, content_hash,
};
pub use error::ApplyError;
pub use store::JournalStore;
