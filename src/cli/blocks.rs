//! `blockterm blocks -c <command>`: run one command the way an integrated
//! shell would (prompt, command line, output, exit code markers) and print
//! the blocks the parser found.

use crate::registry::SessionRegistry;
use anyhow::{Context, Result};
use blockterm_config::Config;
use blockterm_terminal::{Block, PtySession, SessionEvent, SpawnOptions};

/// Emits OSC 133 markers around `$BLOCKTERM_COMMAND`.
const MARKED_SCRIPT: &str = r#"printf '\033]133;A\007$ '
printf '\033]133;B\007%s\n' "$BLOCKTERM_COMMAND"
printf '\033]133;C\007'
eval "$BLOCKTERM_COMMAND"
printf '\033]133;D;%s\007' "$?"
"#;

pub async fn run(config: &Config, shell: &str, command: &str) -> Result<i32> {
    let registry = SessionRegistry::from_config(config)?;
    let options = SpawnOptions::new(shell)
        .args(["-c", MARKED_SCRIPT])
        .env("BLOCKTERM_COMMAND", command)
        .size(config.cols, config.rows)
        .scrollback_bytes(config.scrollback_bytes)
        .max_blocks(config.max_blocks);
    let id = registry
        .spawn(options)
        .with_context(|| format!("Failed to start {shell}"))?;

    while let Some(event) = registry.next_event().await {
        if let SessionEvent::SessionExited { session, reason } = event
            && session == id
        {
            log::debug!("Block runner exited: {:?}", reason);
            break;
        }
    }

    let session = registry
        .session(id)
        .context("Session disappeared before its blocks were read")?;
    let blocks = session.blocks();
    if blocks.is_empty() {
        println!("No blocks were recorded.");
    }
    for block in &blocks {
        print_block(&session, block);
    }

    Ok(blocks.last().and_then(|b| b.exit_code).unwrap_or(0))
}

fn print_block(session: &PtySession, block: &Block) {
    let command = session.block_command_text(block.id).unwrap_or_default();
    println!("block {}: {}", block.id, command.trim());
    match block.exit_code {
        Some(code) => println!("  exit code: {code}"),
        None => println!("  exit code: unknown"),
    }
    if let Some(reason) = block.close_reason {
        println!("  closed: {:?}", reason);
    }
    println!(
        "  offsets: {}..{}",
        block.start_offset,
        block
            .end_offset
            .map_or_else(|| "open".to_string(), |end| end.to_string())
    );

    let Some(content) = session.block_content(block.id) else {
        return;
    };
    if content.truncated {
        println!("  (start evicted from scrollback)");
    }
    for line in String::from_utf8_lossy(&content.bytes).lines() {
        println!("  | {}", line.trim_end_matches('\r'));
    }
}
