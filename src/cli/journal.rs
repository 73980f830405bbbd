//! `blockterm journal` subcommands

use super::JournalCommand;
use anyhow::{Context, Result};
use blockterm_config::Config;
use blockterm_journal::{
    CancelToken, EntryId, FileApplier, ForwardPayload, InversePayload, JournalEntry, JournalStore,
};
use std::sync::Arc;

pub async fn run(config: &Config, action: JournalCommand) -> Result<i32> {
    let path = config.effective_journal_path();
    let store = JournalStore::open(&path)
        .with_context(|| format!("Failed to open journal {:?}", path))?;
    let applier = Arc::new(FileApplier::new(store));

    match action {
        JournalCommand::List => {
            let entries = applier.store().entries();
            if entries.is_empty() {
                println!("Journal {} is empty.", path.display());
            }
            for entry in &entries {
                println!("{}", describe(entry));
            }
            Ok(0)
        }
        JournalCommand::Apply {
            path: target,
            content,
            diff,
        } => {
            let payload = std::fs::read_to_string(&content)
                .with_context(|| format!("Failed to read {:?}", content))?;
            let forward = if diff {
                ForwardPayload::UnifiedDiff(payload)
            } else {
                ForwardPayload::Replace(payload)
            };
            let id = cancellable(&applier, move |applier, cancel| {
                applier.apply_with(&target, forward, cancel)
            })
            .await?;
            println!("Applied entry {id}");
            Ok(0)
        }
        JournalCommand::Undo { id } => {
            let id = EntryId(id);
            cancellable(&applier, move |applier, cancel| applier.undo_with(id, cancel)).await?;
            println!("Undid entry {id}");
            Ok(0)
        }
        JournalCommand::Redo { id } => {
            let id = EntryId(id);
            cancellable(&applier, move |applier, cancel| applier.redo_with(id, cancel)).await?;
            println!("Redid entry {id}");
            Ok(0)
        }
    }
}

/// Run a journal operation on the blocking pool; Ctrl-C cancels it before it
/// writes anything.
async fn cancellable<T, F>(applier: &Arc<FileApplier>, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&FileApplier, &CancelToken) -> Result<T, blockterm_journal::ApplyError>
        + Send
        + 'static,
{
    let cancel = CancelToken::new();
    let task = {
        let applier = Arc::clone(applier);
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || op(&applier, &cancel))
    };
    tokio::pin!(task);

    let result = tokio::select! {
        result = &mut task => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, cancelling journal operation");
            cancel.cancel();
            task.await
        }
    };
    Ok(result.context("Journal operation panicked")??)
}

fn describe(entry: &JournalEntry) -> String {
    let before = match &entry.inverse {
        InversePayload::Absent => "created".to_string(),
        InversePayload::Content(content) => format!("{} bytes before", content.len()),
    };
    format!(
        "{:>4}  {:<8}  {:<10}  {}  {}  ({})",
        entry.id.0,
        if entry.applied { "applied" } else { "undone" },
        format!("{:?}", entry.kind),
        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
        entry.path.display(),
        before
    )
}
