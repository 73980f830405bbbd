use blockterm_journal::{
    ActionKind, ApplyError, FileApplier, ForwardPayload, InversePayload, JournalStore, content_hash,
};
use std::fs;
use std::sync::Arc;

#[test]
fn test_undo_round_trip_restores_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    fs::write(&path, "line one\nline two\n").unwrap();

    let applier = FileApplier::new(JournalStore::in_memory());
    let id = applier
        .apply(
            &path,
            ForwardPayload::UnifiedDiff(
                "--- a/notes.txt\n+++ b/notes.txt\n@@ -1,2 +1,2 @@\n line one\n-line two\n+line 2\n"
                    .to_string(),
            ),
        )
        .unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "line one\nline 2\n");
    assert_eq!(applier.store().entry(id).unwrap().kind, ActionKind::FilePatch);

    applier.undo(id).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "line one\nline two\n");
    assert!(!applier.store().entry(id).unwrap().applied);
}

#[test]
fn test_undo_conflict_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "A").unwrap();

    let applier = FileApplier::new(JournalStore::in_memory());
    let id = applier
        .apply(&path, ForwardPayload::Replace("B".to_string()))
        .unwrap();

    // Modified outside the journal.
    fs::write(&path, "C").unwrap();

    let err = applier.undo(id).unwrap_err();
    assert!(matches!(err, ApplyError::Conflict { id: conflict_id, .. } if conflict_id == id));
    assert_eq!(fs::read_to_string(&path).unwrap(), "C");
    assert!(applier.store().entry(id).unwrap().applied);
}

#[test]
fn test_stacked_edits_undo_in_reverse_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f.txt");

    let applier = FileApplier::new(JournalStore::in_memory());
    let first = applier
        .apply(&path, ForwardPayload::Replace("1".to_string()))
        .unwrap();
    let second = applier
        .apply(&path, ForwardPayload::Replace("2".to_string()))
        .unwrap();
    assert!(second > first);

    applier.undo(second).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "1");
    applier.undo(first).unwrap();
    assert!(!path.exists());

    assert_eq!(applier.store().entries_for(&path).len(), 2);
}

#[test]
fn test_older_entry_can_be_undone_while_newer_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f.txt");

    let applier = FileApplier::new(JournalStore::in_memory());
    let first = applier
        .apply(&path, ForwardPayload::Replace("1".to_string()))
        .unwrap();
    let second = applier
        .apply(&path, ForwardPayload::Replace("2".to_string()))
        .unwrap();

    // Undoing out of order puts back what the older entry replaced.
    applier.undo(first).unwrap();
    assert!(!path.exists());
    assert!(!applier.store().entry(first).unwrap().applied);
    assert!(applier.store().entry(second).unwrap().applied);

    applier.redo(first).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "1");

    // Changes made outside the journal still block undo.
    fs::write(&path, "Z").unwrap();
    assert!(matches!(
        applier.undo(second),
        Err(ApplyError::Conflict { id, .. }) if id == second
    ));
    assert_eq!(fs::read_to_string(&path).unwrap(), "Z");
}

#[test]
fn test_journal_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("journal.jsonl");
    let path = dir.path().join("doc.md");
    fs::write(&path, "# draft\n").unwrap();

    let id = {
        let applier = FileApplier::new(JournalStore::open(&journal).unwrap());
        applier
            .apply(&path, ForwardPayload::Replace("# final\n".to_string()))
            .unwrap()
    };

    let applier = FileApplier::new(JournalStore::open(&journal).unwrap());
    let entry = applier.store().entry(id).unwrap();
    assert_eq!(entry.inverse, InversePayload::Content("# draft\n".to_string()));
    applier.undo(id).unwrap();
    drop(applier);

    let applier = FileApplier::new(JournalStore::open(&journal).unwrap());
    assert!(!applier.store().entry(id).unwrap().applied);
    applier.redo(id).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "# final\n");
}

#[cfg(unix)]
#[test]
fn test_unwritable_journal_leaves_the_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("journal.jsonl");
    let path = dir.path().join("target.txt");
    fs::write(&path, "original").unwrap();

    let applier = FileApplier::new(JournalStore::open(&journal).unwrap());
    // The entry cannot be logged: the journal path is a directory.
    let _ = fs::remove_file(&journal);
    fs::create_dir(&journal).unwrap();

    let err = applier
        .apply(&path, ForwardPayload::Replace("changed".to_string()))
        .unwrap_err();
    assert!(matches!(err, ApplyError::Journal { .. }));
    assert_eq!(fs::read_to_string(&path).unwrap(), "original");
    assert!(applier.store().is_empty());
}

#[test]
fn test_different_paths_apply_concurrently() {
    let dir = tempfile::tempdir().unwrap();
    let applier = Arc::new(FileApplier::new(JournalStore::in_memory()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let applier = Arc::clone(&applier);
            let path = dir.path().join(format!("file-{i}.txt"));
            std::thread::spawn(move || {
                for n in 0..10 {
                    applier
                        .apply(&path, ForwardPayload::Replace(format!("{i}:{n}")))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let entries = applier.store().entries();
    assert_eq!(entries.len(), 80);
    let mut ids: Vec<_> = entries.iter().map(|e| e.id).collect();
    ids.dedup();
    assert_eq!(ids.len(), 80);
    for i in 0..8 {
        let path = dir.path().join(format!("file-{i}.txt"));
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{i}:9"));
    }
}

#[test]
fn test_same_path_applies_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.txt");
    fs::write(&path, "").unwrap();
    let applier = Arc::new(FileApplier::new(JournalStore::in_memory()));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let applier = Arc::clone(&applier);
            let path = path.clone();
            std::thread::spawn(move || {
                for n in 0..5 {
                    applier
                        .apply(&path, ForwardPayload::Replace(format!("{i}-{n}")))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Ids follow application order, so each entry starts from what the
    // previous one wrote.
    let entries = applier.store().entries_for(&path);
    assert_eq!(entries.len(), 20);
    assert_eq!(entries[0].before_hash, Some(content_hash("")));
    for pair in entries.windows(2) {
        assert_eq!(pair[1].before_hash.as_deref(), Some(pair[0].after_hash.as_str()));
    }
    let last = entries.last().unwrap();
    assert_eq!(content_hash(&fs::read_to_string(&path).unwrap()), last.after_hash);
}
