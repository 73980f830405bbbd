//! Applies journaled file operations, and undoes and redoes them.

use crate::diff;
use crate::entry::{EntryId, ForwardPayload, InversePayload, JournalEntry, content_hash};
use crate::error::ApplyError;
use crate::store::{JournalStore, resolve_target};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag, checked before a file is touched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), ApplyError> {
        if self.is_cancelled() {
            Err(ApplyError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Applies file operations and records them in a [`JournalStore`].
///
/// Operations on the same path are serialized; different paths proceed
/// independently. A failed or cancelled operation leaves neither the file
/// nor the journal changed.
#[derive(Debug)]
pub struct FileApplier {
    store: JournalStore,
    path_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl FileApplier {
    pub fn new(store: JournalStore) -> Self {
        Self {
            store,
            path_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &JournalStore {
        &self.store
    }

    fn path_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.path_locks.lock();
        // Nobody else holds a lock whose only reference is the map's.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    fn abort(&self, id: EntryId) {
        if let Err(e) = self.store.abort_entry(id) {
            log::warn!("Could not record abort of journal entry {}: {}", id, e);
        }
    }

    pub fn apply(&self, path: impl AsRef<Path>, forward: ForwardPayload) -> Result<EntryId, ApplyError> {
        self.apply_with(path, forward, &CancelToken::new())
    }

    /// Journal `forward` for `path`, then write it. The entry is logged
    /// before the file changes and only becomes visible once the write
    /// landed.
    pub fn apply_with(
        &self,
        path: impl AsRef<Path>,
        forward: ForwardPayload,
        cancel: &CancelToken,
    ) -> Result<EntryId, ApplyError> {
        let path = path.as_ref();
        let path = resolve_target(path).map_err(|e| ApplyError::io(path, e))?;
        let lock = self.path_lock(&path);
        let _guard = lock.lock();

        let before = read_optional(&path)?;
        let after = diff::resolve(&forward, before.as_deref()).map_err(|source| ApplyError::Patch {
            path: path.clone(),
            source,
        })?;
        cancel.check()?;

        let before_hash = before.as_deref().map(content_hash);
        let inverse = match before {
            Some(content) => InversePayload::Content(content),
            None => InversePayload::Absent,
        };
        let pending = self.store.begin_entry(|id| JournalEntry {
            id,
            kind: forward.kind(),
            path: path.clone(),
            forward,
            inverse,
            before_hash,
            after_hash: content_hash(&after),
            created_at: Utc::now(),
            applied: true,
        })?;

        if let Err(e) = write_atomic(&path, &after) {
            self.abort(pending.id);
            return Err(e);
        }

        match self.store.commit_entry(pending.id) {
            Ok(entry) => {
                log::info!(
                    "Applied journal entry {} ({:?}) to {}",
                    entry.id,
                    entry.kind,
                    path.display()
                );
                Ok(entry.id)
            }
            Err(e) => {
                log::error!("Journal commit failed, restoring {}: {}", path.display(), e);
                restore(&path, &pending.inverse);
                self.abort(pending.id);
                Err(e)
            }
        }
    }

    pub fn undo(&self, id: EntryId) -> Result<(), ApplyError> {
        self.undo_with(id, &CancelToken::new())
    }

    /// Put back the content `id` replaced.
    ///
    /// Entries may be undone in any order. Fails with
    /// [`ApplyError::Conflict`] if the file no longer holds what the journal
    /// last left there, i.e. it was changed outside the journal.
    pub fn undo_with(&self, id: EntryId, cancel: &CancelToken) -> Result<(), ApplyError> {
        let path = self.store.entry(id).ok_or(ApplyError::NotFound(id))?.path;
        let lock = self.path_lock(&path);
        let _guard = lock.lock();

        // Re-read under the path lock: a concurrent undo may have won.
        let entry = self.store.entry(id).ok_or(ApplyError::NotFound(id))?;
        if !entry.applied {
            return Err(ApplyError::NotApplied(id));
        }

        let expected = self
            .store
            .last_written(&path)
            .unwrap_or_else(|| Some(entry.after_hash.clone()));
        let current = read_optional(&path)?;
        let actual = current.as_deref().map(content_hash);
        if actual != expected {
            return Err(ApplyError::Conflict {
                id,
                path,
                expected,
                actual,
            });
        }
        cancel.check()?;

        restore_checked(&path, &entry.inverse)?;
        if let Err(e) = self.store.set_applied(id, false) {
            log::error!("Journal append failed, re-applying {}: {}", path.display(), e);
            if let Some(content) = &current {
                restore(&path, &InversePayload::Content(content.clone()));
            }
            return Err(e);
        }
        log::info!("Undid journal entry {} on {}", id, path.display());
        Ok(())
    }

    pub fn redo(&self, id: EntryId) -> Result<(), ApplyError> {
        self.redo_with(id, &CancelToken::new())
    }

    /// Re-apply an undone entry. Fails with [`ApplyError::Conflict`] if the
    /// file was changed outside the journal since it last touched it.
    pub fn redo_with(&self, id: EntryId, cancel: &CancelToken) -> Result<(), ApplyError> {
        let path = self.store.entry(id).ok_or(ApplyError::NotFound(id))?.path;
        let lock = self.path_lock(&path);
        let _guard = lock.lock();

        let entry = self.store.entry(id).ok_or(ApplyError::NotFound(id))?;
        if entry.applied {
            return Err(ApplyError::AlreadyApplied(id));
        }

        let expected = self
            .store
            .last_written(&path)
            .unwrap_or_else(|| entry.before_hash.clone());
        let current = read_optional(&path)?;
        let actual = current.as_deref().map(content_hash);
        if actual != expected {
            return Err(ApplyError::Conflict {
                id,
                path,
                expected,
                actual,
            });
        }
        let after = diff::resolve(&entry.forward, current.as_deref()).map_err(|source| {
            ApplyError::Patch {
                path: path.clone(),
                source,
            }
        })?;
        cancel.check()?;

        write_atomic(&path, &after)?;
        if let Err(e) = self.store.set_applied(id, true) {
            log::error!("Journal append failed, restoring {}: {}", path.display(), e);
            restore(&path, &entry.inverse);
            return Err(e);
        }
        log::info!("Redid journal entry {} on {}", id, path.display());
        Ok(())
    }
}

/// File content, or `None` if the file does not exist.
fn read_optional(path: &Path) -> Result<Option<String>, ApplyError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ApplyError::io(path, e)),
    }
}

/// Write through a sibling temp file and rename it into place, keeping the
/// permissions of the file being replaced.
fn write_atomic(path: &Path, content: &str) -> Result<(), ApplyError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ApplyError::io(parent, e))?;
    }

    let temp_path = temp_path_for(path);

    let written = fs::File::create(&temp_path).and_then(|mut file| {
        file.write_all(content.as_bytes())?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(ApplyError::io(&temp_path, e));
    }

    if let Ok(metadata) = fs::metadata(path)
        && let Err(e) = fs::set_permissions(&temp_path, metadata.permissions())
    {
        log::debug!("Could not copy permissions to {}: {}", temp_path.display(), e);
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        ApplyError::io(path, e)
    })
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()))
}

fn restore_checked(path: &Path, inverse: &InversePayload) -> Result<(), ApplyError> {
    match inverse {
        InversePayload::Content(content) => write_atomic(path, content),
        InversePayload::Absent => match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApplyError::io(path, e)),
        },
    }
}

/// Best-effort rollback after a failed journal commit.
fn restore(path: &Path, inverse: &InversePayload) {
    if let Err(e) = restore_checked(path, inverse) {
        log::error!("Failed to roll back {}: {}", path.display(), e);
    }
}
