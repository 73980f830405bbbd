//! `blockterm run`: one attached shell driven from stdin.
//!
//! Stdin lines are written to the attached session, its display output goes
//! to stdout and block lifecycle notices to stderr. The saved session is
//! restored on start and written back on exit (both per config).

use crate::cli::RunArgs;
use crate::registry::{PaneSpec, RegistryOptions, SessionRegistry, TabLayout};
use crate::session::storage::{load_session_from, save_session_to};
use anyhow::{Context, Result};
use blockterm_config::Config;
use blockterm_terminal::{ExitReason, SessionEvent, SessionId};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Ctrl-D, sent when stdin closes so the shell sees end of input.
const EOT: u8 = 0x04;

pub async fn run(config: Config, args: RunArgs) -> Result<i32> {
    let mut options = RegistryOptions::from_config(&config)?;
    if let Some(shell) = &args.shell {
        options.shell = shell.clone();
        options.shell_args.clear();
    }
    let registry = Arc::new(SessionRegistry::new(options));
    let session_path = config.effective_session_path();

    // An explicit shell or directory asks for a fresh session.
    let wants_restore =
        config.restore_session && !args.no_restore && args.shell.is_none() && args.cwd.is_none();
    let restored = if wants_restore {
        restore_saved(&registry, &session_path)
    } else {
        None
    };

    let attached = match restored {
        Some(id) => id,
        None => {
            let pane = PaneSpec {
                cwd: args.cwd.clone(),
                ..PaneSpec::default()
            };
            let tab = registry.create_tab(None, TabLayout::single(pane))?;
            registry
                .tab_sessions(tab)
                .first()
                .copied()
                .context("New tab has no session")?
        }
    };
    log::info!("Attached to {}", attached);

    let exit_code = attach(&registry, attached).await?;

    if config.skip_session_save || args.no_save {
        log::info!("Skipping session save");
    } else if let Err(e) = save_session_to(&registry.snapshot(), &session_path) {
        log::error!("Failed to save session: {e:#}");
        eprintln!("blockterm: failed to save session: {e:#}");
    }

    Ok(exit_code)
}

/// Restore the saved session and return the session to attach to: the
/// active pane of the active tab, if it came back alive.
fn restore_saved(registry: &SessionRegistry, path: &std::path::Path) -> Option<SessionId> {
    let state = match load_session_from(path) {
        Ok(Some(state)) => state,
        Ok(None) => return None,
        Err(e) => {
            log::warn!("Ignoring saved session: {e:#}");
            eprintln!("blockterm: ignoring saved session: {e:#}");
            return None;
        }
    };

    let report = registry.restore(state);
    for warning in &report.warnings {
        eprintln!("blockterm: {warning}");
    }

    registry
        .active_tab()
        .and_then(|tab| registry.tab(tab))
        .and_then(|tab| registry.pane(tab.active_pane))
        .and_then(|pane| pane.state.session)
        .filter(|id| registry.is_alive(*id))
}

/// Pump stdin and events until the attached session exits.
async fn attach(registry: &Arc<SessionRegistry>, attached: SessionId) -> Result<i32> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if let Err(e) = registry.write(attached, format!("{line}\n").as_bytes()) {
                        log::warn!("Write to {} failed: {}", attached, e);
                    }
                }
                Ok(None) => {
                    stdin_open = false;
                    if let Err(e) = registry.write(attached, &[EOT]) {
                        log::warn!("Write to {} failed: {}", attached, e);
                    }
                }
                Err(e) => {
                    log::warn!("Reading stdin failed: {}", e);
                    stdin_open = false;
                }
            },
            event = registry.next_event() => {
                let Some(event) = event else {
                    return Ok(0);
                };
                if event.session() != attached {
                    continue;
                }
                match event {
                    SessionEvent::Output { bytes, .. } => {
                        stdout.write_all(&bytes).await?;
                        stdout.flush().await?;
                    }
                    SessionEvent::BlockOpened { block_id, .. } => {
                        eprintln!("[block {block_id} started]");
                    }
                    SessionEvent::BlockClosed { block_id, exit_code, reason, .. } => {
                        let code = exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string());
                        eprintln!("[block {block_id} finished: exit {code}, {reason:?}]");
                    }
                    SessionEvent::CwdChanged { cwd, .. } => {
                        eprintln!("[cwd {cwd}]");
                    }
                    SessionEvent::SessionExited { reason, .. } => {
                        return Ok(exit_code_of(&reason));
                    }
                    SessionEvent::PromptStarted { .. } | SessionEvent::CommandExecuted { .. } => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, killing {}", attached);
                let registry = Arc::clone(registry);
                // Kill blocks for up to the grace period; the exit event
                // ends the loop.
                tokio::task::spawn_blocking(move || registry.kill(attached));
            }
        }
    }
}

fn exit_code_of(reason: &ExitReason) -> i32 {
    match reason {
        ExitReason::Exited(Some(code)) => i32::try_from(*code).unwrap_or(1),
        ExitReason::Exited(None) => 0,
        ExitReason::Killed => 130,
        ExitReason::ReadError(_) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_of(&ExitReason::Exited(Some(3))), 3);
        assert_eq!(exit_code_of(&ExitReason::Exited(None)), 0);
        assert_eq!(exit_code_of(&ExitReason::Killed), 130);
        assert_eq!(exit_code_of(&ExitReason::ReadError("EIO".into())), 1);
    }
}
