//! Append-only JSON-lines journal store.

use crate::entry::{EntryId, JournalEntry, JournalRecord, content_hash};
use crate::error::ApplyError;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

struct Log {
    entries: BTreeMap<EntryId, JournalEntry>,
    /// Written to the log, file write not yet confirmed.
    pending: BTreeMap<EntryId, JournalEntry>,
    /// Hash of what the journal last left at each path (`None`: no file).
    last_written: HashMap<PathBuf, Option<String>>,
    next_id: u64,
    /// The file ends in a partial line; the next record starts on a new one.
    needs_newline: bool,
}

impl Log {
    fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            pending: BTreeMap::new(),
            last_written: HashMap::new(),
            next_id: 1,
            needs_newline: false,
        }
    }

    fn commit(&mut self, id: EntryId) -> Option<JournalEntry> {
        let entry = self.pending.remove(&id)?;
        self.last_written
            .insert(entry.path.clone(), Some(entry.after_hash.clone()));
        self.entries.insert(id, entry.clone());
        Some(entry)
    }

    fn set_applied(&mut self, id: EntryId, applied: bool) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        entry.applied = applied;
        let hash = if applied {
            Some(entry.after_hash.clone())
        } else {
            entry.before_hash.clone()
        };
        self.last_written.insert(entry.path.clone(), hash);
        true
    }

    fn replay(&mut self, record: JournalRecord) {
        match record {
            JournalRecord::Pending(entry) => {
                self.next_id = self.next_id.max(entry.id.0 + 1);
                self.pending.insert(entry.id, entry);
            }
            JournalRecord::Committed { id, .. } => {
                if self.commit(id).is_none() {
                    log::warn!("Commit record for unknown entry {} ignored", id);
                }
            }
            JournalRecord::Aborted { id, .. } => {
                self.pending.remove(&id);
            }
            JournalRecord::Applied { id, applied, .. } => {
                if !self.set_applied(id, applied) {
                    log::warn!("Journal record for unknown entry {} ignored", id);
                }
            }
        }
    }
}

/// Journal entries, kept in memory and (optionally) appended to a file.
///
/// Entries are never removed; the only change after creation is the
/// `applied` flag, recorded as a separate line.
pub struct JournalStore {
    path: Option<PathBuf>,
    log: Mutex<Log>,
}

impl std::fmt::Debug for JournalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalStore")
            .field("path", &self.path)
            .field("entries", &self.len())
            .finish()
    }
}

impl JournalStore {
    /// A store that is not backed by a file.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            log: Mutex::new(Log::new()),
        }
    }

    /// Open (or create) the journal at `path` and replay its records.
    ///
    /// Entries left pending by a crash are settled against the file they
    /// target: committed if it holds what the entry wrote, dropped otherwise.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ApplyError> {
        let path = path.as_ref().to_path_buf();
        let journal_err = |source| ApplyError::Journal {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(journal_err)?;
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(journal_err(e)),
        };

        // Records are appended whole, so only the text after the last newline
        // can be a torn write.
        let (body, tail) = match content.rfind('\n') {
            Some(pos) => content.split_at(pos + 1),
            None => ("", content.as_str()),
        };

        let mut log = Log::new();
        for (idx, line) in body.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalRecord>(line) {
                Ok(record) => log.replay(record),
                Err(source) => {
                    return Err(ApplyError::Corrupt {
                        path: path.clone(),
                        line: idx + 1,
                        source,
                    });
                }
            }
        }

        if !tail.trim().is_empty() {
            match serde_json::from_str::<JournalRecord>(tail) {
                Ok(record) => {
                    log.replay(record);
                    log.needs_newline = true;
                }
                Err(e) => {
                    log::warn!(
                        "Discarding incomplete last record in journal {}: {}",
                        path.display(),
                        e
                    );
                    OpenOptions::new()
                        .write(true)
                        .open(&path)
                        .and_then(|file| file.set_len(body.len() as u64))
                        .map_err(journal_err)?;
                }
            }
        }
        if let Some(max_id) = log.entries.keys().next_back() {
            log.next_id = log.next_id.max(max_id.0 + 1);
        }

        log::info!(
            "Opened journal {} with {} entries",
            path.display(),
            log.entries.len()
        );

        let store = Self {
            log: Mutex::new(log),
            path: Some(path),
        };
        store.settle_pending()?;
        Ok(store)
    }

    fn settle_pending(&self) -> Result<(), ApplyError> {
        let mut log = self.log.lock();
        let pending: Vec<JournalEntry> = log.pending.values().cloned().collect();
        for entry in pending {
            let current = match fs::read_to_string(&entry.path) {
                Ok(content) => Some(content_hash(&content)),
                Err(_) => None,
            };
            if current.as_deref() == Some(entry.after_hash.as_str()) {
                log::warn!(
                    "Committing interrupted journal entry {} on {}",
                    entry.id,
                    entry.path.display()
                );
                let record = JournalRecord::Committed {
                    id: entry.id,
                    at: Utc::now(),
                };
                self.write_record(&mut log, &record)?;
                log.commit(entry.id);
            } else {
                log::warn!(
                    "Dropping interrupted journal entry {} on {}",
                    entry.id,
                    entry.path.display()
                );
                let record = JournalRecord::Aborted {
                    id: entry.id,
                    at: Utc::now(),
                };
                self.write_record(&mut log, &record)?;
                log.pending.remove(&entry.id);
            }
        }
        Ok(())
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Log a new entry built from the next id, ahead of the file write it
    /// describes. It stays invisible until [`commit_entry`](Self::commit_entry).
    /// The id is consumed even if the append fails.
    pub(crate) fn begin_entry(
        &self,
        build: impl FnOnce(EntryId) -> JournalEntry,
    ) -> Result<JournalEntry, ApplyError> {
        let mut log = self.log.lock();
        let id = EntryId(log.next_id);
        log.next_id += 1;

        let entry = build(id);
        self.write_record(&mut log, &JournalRecord::Pending(entry.clone()))?;
        log.pending.insert(id, entry.clone());
        Ok(entry)
    }

    /// Confirm that the write for a pending entry landed.
    pub(crate) fn commit_entry(&self, id: EntryId) -> Result<JournalEntry, ApplyError> {
        let mut log = self.log.lock();
        if !log.pending.contains_key(&id) {
            return Err(ApplyError::NotFound(id));
        }
        let record = JournalRecord::Committed { id, at: Utc::now() };
        self.write_record(&mut log, &record)?;
        log.commit(id).ok_or(ApplyError::NotFound(id))
    }

    /// Drop a pending entry whose write failed. The entry is gone from
    /// memory even if the abort record cannot be written; reopening the
    /// journal settles it against the file.
    pub(crate) fn abort_entry(&self, id: EntryId) -> Result<(), ApplyError> {
        let mut log = self.log.lock();
        if log.pending.remove(&id).is_none() {
            return Err(ApplyError::NotFound(id));
        }
        let record = JournalRecord::Aborted { id, at: Utc::now() };
        self.write_record(&mut log, &record)
    }

    /// Record an undo (`false`) or redo (`true`) of `id`.
    pub(crate) fn set_applied(&self, id: EntryId, applied: bool) -> Result<(), ApplyError> {
        let mut log = self.log.lock();
        if !log.entries.contains_key(&id) {
            return Err(ApplyError::NotFound(id));
        }
        let record = JournalRecord::Applied {
            id,
            applied,
            at: Utc::now(),
        };
        self.write_record(&mut log, &record)?;
        log.set_applied(id, applied);
        Ok(())
    }

    /// Hash of the content the journal last left at `path`: `Some(None)` if
    /// it last removed the file, `None` if it never touched it.
    pub(crate) fn last_written(&self, path: &Path) -> Option<Option<String>> {
        self.log.lock().last_written.get(path).cloned()
    }

    fn write_record(&self, log: &mut Log, record: &JournalRecord) -> Result<(), ApplyError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut line = String::new();
        if log.needs_newline {
            line.push('\n');
        }
        line.push_str(&serde_json::to_string(record)?);
        line.push('\n');

        let journal_err = |source| ApplyError::Journal {
            path: path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(journal_err)?;
        file.write_all(line.as_bytes()).map_err(journal_err)?;
        file.sync_data().map_err(journal_err)?;
        log.needs_newline = false;
        Ok(())
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.log.lock().entries.values().cloned().collect()
    }

    pub fn entry(&self, id: EntryId) -> Option<JournalEntry> {
        self.log.lock().entries.get(&id).cloned()
    }

    /// Entries targeting `path`, oldest first.
    pub fn entries_for(&self, path: &Path) -> Vec<JournalEntry> {
        let path = resolve_target(path).unwrap_or_else(|_| path.to_path_buf());
        self.log
            .lock()
            .entries
            .values()
            .filter(|e| e.path == path)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.log.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The path entries are recorded and locked under: absolute, with the
/// deepest existing ancestor directory canonicalized so `..` and symlinked
/// directories name one file one way.
pub(crate) fn resolve_target(path: &Path) -> io::Result<PathBuf> {
    let path = std::path::absolute(path)?;
    for ancestor in path.ancestors().skip(1) {
        if let Ok(dir) = fs::canonicalize(ancestor)
            && let Ok(rest) = path.strip_prefix(ancestor)
        {
            return Ok(dir.join(rest));
        }
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{ActionKind, ForwardPayload, InversePayload};

    fn entry(id: EntryId, path: &str) -> JournalEntry {
        JournalEntry {
            id,
            kind: ActionKind::FileWrite,
            path: PathBuf::from(path),
            forward: ForwardPayload::Replace("new".to_string()),
            inverse: InversePayload::Absent,
            before_hash: None,
            after_hash: content_hash("new"),
            created_at: Utc::now(),
            applied: true,
        }
    }

    fn append(store: &JournalStore, path: &str) -> JournalEntry {
        let pending = store.begin_entry(|id| entry(id, path)).unwrap();
        store.commit_entry(pending.id).unwrap()
    }

    #[test]
    fn test_ids_increase_from_one() {
        let store = JournalStore::in_memory();
        let a = append(&store, "/a");
        let b = append(&store, "/b");
        assert_eq!(a.id, EntryId(1));
        assert_eq!(b.id, EntryId(2));
        assert_eq!(store.entries_for(Path::new("/a")).len(), 1);
    }

    #[test]
    fn test_pending_entries_are_hidden_until_committed() {
        let store = JournalStore::in_memory();
        let pending = store.begin_entry(|id| entry(id, "/a")).unwrap();
        assert!(store.is_empty());
        assert!(store.entry(pending.id).is_none());
        assert_eq!(store.last_written(Path::new("/a")), None);

        store.commit_entry(pending.id).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.last_written(Path::new("/a")),
            Some(Some(content_hash("new")))
        );

        let aborted = store.begin_entry(|id| entry(id, "/b")).unwrap();
        store.abort_entry(aborted.id).unwrap();
        assert!(store.entry(aborted.id).is_none());
        assert!(matches!(
            store.commit_entry(aborted.id),
            Err(ApplyError::NotFound(_))
        ));
    }

    #[test]
    fn test_replays_entries_and_applied_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("journal.jsonl");
        {
            let store = JournalStore::open(&path).unwrap();
            append(&store, "/a");
            append(&store, "/b");
            store.set_applied(EntryId(1), false).unwrap();
            let aborted = store.begin_entry(|id| entry(id, "/c")).unwrap();
            store.abort_entry(aborted.id).unwrap();
        }

        let store = JournalStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert!(!store.entry(EntryId(1)).unwrap().applied);
        assert!(store.entry(EntryId(2)).unwrap().applied);
        assert_eq!(store.last_written(Path::new("/a")), Some(None));

        // Aborted ids are not reused.
        let next = append(&store, "/c");
        assert_eq!(next.id, EntryId(4));
    }

    #[test]
    fn test_interrupted_entries_settle_against_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let journal = dir.path().join("journal.jsonl");
        let landed = dir.path().join("landed.txt");
        let lost = dir.path().join("lost.txt");
        let landed_str = landed.to_str().unwrap().to_string();
        let lost_str = lost.to_str().unwrap().to_string();
        {
            let store = JournalStore::open(&journal).unwrap();
            store.begin_entry(|id| entry(id, &landed_str)).unwrap();
            store.begin_entry(|id| entry(id, &lost_str)).unwrap();
        }
        // Only the first write happened before the crash.
        fs::write(&landed, "new").unwrap();

        let store = JournalStore::open(&journal).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.entries()[0].path, landed);

        let reopened = JournalStore::open(&journal).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(append(&reopened, "/x").id, EntryId(3));
    }

    #[test]
    fn test_tolerates_a_torn_last_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        {
            let store = JournalStore::open(&path).unwrap();
            append(&store, "/a");
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"record":"pending","id":2,"#).unwrap();
        drop(file);

        let store = JournalStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        append(&store, "/b");

        let reopened = JournalStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn test_corrupt_middle_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        fs::write(&path, "not json\n{}\n").unwrap();
        assert!(matches!(
            JournalStore::open(&path),
            Err(ApplyError::Corrupt { line: 1, .. })
        ));
    }

    #[test]
    fn test_set_applied_on_unknown_entry() {
        let store = JournalStore::in_memory();
        assert!(matches!(
            store.set_applied(EntryId(9), false),
            Err(ApplyError::NotFound(EntryId(9)))
        ));
    }

    #[test]
    fn test_resolve_target_folds_parent_references() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let direct = resolve_target(&dir.path().join("f.txt")).unwrap();
        let indirect = resolve_target(&dir.path().join("sub").join("..").join("f.txt")).unwrap();
        assert_eq!(direct, indirect);

        // Directories that do not exist yet are kept as written.
        let fresh = resolve_target(&dir.path().join("new").join("f.txt")).unwrap();
        assert!(fresh.ends_with("new/f.txt"));
    }
}
