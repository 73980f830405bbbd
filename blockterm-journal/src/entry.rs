//! Journal entries and the records they are persisted as.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// Journal entry id. Monotonically increasing, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Whole-file replacement.
    FileWrite,
    /// Unified diff against the current content.
    FilePatch,
}

/// What an apply does to the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ForwardPayload {
    Replace(String),
    UnifiedDiff(String),
}

impl ForwardPayload {
    pub fn kind(&self) -> ActionKind {
        match self {
            ForwardPayload::Replace(_) => ActionKind::FileWrite,
            ForwardPayload::UnifiedDiff(_) => ActionKind::FilePatch,
        }
    }
}

/// What an undo puts back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InversePayload {
    /// The file's content before the apply.
    Content(String),
    /// The file did not exist; undo removes it.
    Absent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: EntryId,
    pub kind: ActionKind,
    pub path: PathBuf,
    pub forward: ForwardPayload,
    pub inverse: InversePayload,
    /// Hash of the content before the apply; `None` if the file did not exist.
    pub before_hash: Option<String>,
    /// Hash of the content the apply wrote.
    pub after_hash: String,
    pub created_at: DateTime<Utc>,
    pub applied: bool,
}

/// One line of the journal file.
///
/// An apply is written as `Pending` before the file is touched, then
/// `Committed` once the write landed or `Aborted` if it did not. Only
/// committed entries are visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum JournalRecord {
    Pending(JournalEntry),
    Committed {
        id: EntryId,
        at: DateTime<Utc>,
    },
    Aborted {
        id: EntryId,
        at: DateTime<Utc>,
    },
    /// An undo (`applied = false`) or redo (`applied = true`) of an earlier entry.
    Applied {
        id: EntryId,
        applied: bool,
        at: DateTime<Utc>,
    },
}

/// SHA-256 of `content` as lowercase hex.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(content_hash("a"), content_hash("b"));
    }

    #[test]
    fn test_records_are_tagged_json() {
        let record = JournalRecord::Applied {
            id: EntryId(7),
            applied: false,
            at: Utc::now(),
        };
        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains(r#""record":"applied""#));
        assert!(line.contains(r#""id":7"#));
        assert_eq!(serde_json::from_str::<JournalRecord>(&line).unwrap(), record);
    }

    #[test]
    fn test_payload_kind() {
        assert_eq!(
            ForwardPayload::Replace(String::new()).kind(),
            ActionKind::FileWrite
        );
        assert_eq!(
            ForwardPayload::UnifiedDiff(String::new()).kind(),
            ActionKind::FilePatch
        );
    }
}
