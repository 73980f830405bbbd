//! PTY sessions: one child shell, its reader thread and its block log.

mod core;
mod reader;
mod spawn;
mod terminate;

pub use self::core::SearchMatch;
pub use spawn::{
    DEFAULT_KILL_GRACE, DEFAULT_MAX_BLOCKS, DEFAULT_SCROLLBACK_BYTES, SpawnOptions,
    build_shell_env, resolve_shell, validate_working_dir,
};

use self::core::SessionCore;
use crate::block::{Block, BlockContent, BlockId};
use crate::error::SpawnError;
use crate::events::{EventSender, ExitReason, SessionId};
use parking_lot::Mutex;
use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use regex::bytes::Regex;
use std::io::Write;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How long `kill` waits for the reader thread after the child is gone.
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Writer and master side of the PTY. One lock, so writes and resizes for a
/// session are applied in call order.
struct SessionIo {
    master: Option<Box<dyn MasterPty + Send>>,
    writer: Option<Box<dyn Write + Send>>,
    cols: u16,
    rows: u16,
}

/// A live (or exited) shell running under a pseudo-terminal.
pub struct PtySession {
    core: Arc<SessionCore>,
    io: Mutex<SessionIo>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    reader_thread: Mutex<Option<JoinHandle<()>>>,
    pid: Option<u32>,
    shell: String,
    kill_grace: Duration,
}

impl std::fmt::Debug for PtySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtySession")
            .field("id", &self.id())
            .field("pid", &self.pid)
            .field("shell", &self.shell)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl PtySession {
    /// Start `options.shell` under a new PTY. Events are reported on `events`.
    ///
    /// Either a fully running session is returned (child spawned, reader
    /// thread started) or nothing is left behind.
    pub fn spawn(options: SpawnOptions, events: EventSender) -> Result<Self, SpawnError> {
        let shell_path = resolve_shell(&options.shell)?;
        if let Some(dir) = &options.working_dir {
            validate_working_dir(dir)?;
        }
        let cols = options.cols.max(1);
        let rows = options.rows.max(1);

        log::info!(
            "Spawning {} {:?} in {:?} ({}x{}, scrollback {} bytes)",
            shell_path.display(),
            options.args,
            options.working_dir,
            cols,
            rows,
            options.scrollback_bytes
        );

        let pair = native_pty_system()
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SpawnError::PtyAllocation(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&shell_path);
        cmd.args(&options.args);
        if let Some(dir) = &options.working_dir {
            cmd.cwd(dir);
        }
        for (key, value) in build_shell_env(&options.env) {
            cmd.env(key, value);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SpawnError::Spawn {
                shell: shell_path.display().to_string(),
                message: e.to_string(),
            })?;
        // The child holds its own slave descriptor; dropping ours lets the
        // reader see EOF once the child side closes.
        drop(pair.slave);

        let pid = child.process_id();
        let mut killer = child.clone_killer();

        let io_handles = pair
            .master
            .try_clone_reader()
            .and_then(|reader| Ok((reader, pair.master.take_writer()?)));
        let (reader, writer) = match io_handles {
            Ok(handles) => handles,
            Err(e) => {
                abandon_child(child.as_mut());
                return Err(SpawnError::Io(e.to_string()));
            }
        };

        let id = SessionId::next();
        let cwd = options
            .working_dir
            .as_ref()
            .map(|d| d.display().to_string());
        let core = Arc::new(SessionCore::new(
            id,
            events,
            options.scrollback_bytes,
            options.max_blocks,
            &options.history,
            cwd,
        ));

        let reader_thread = match reader::start(Arc::clone(&core), reader, child) {
            Ok(handle) => handle,
            Err(e) => {
                // The child moved into the failed thread closure; kill it by handle.
                if let Err(kill_err) = killer.kill() {
                    log::warn!("Failed to kill half-spawned child: {}", kill_err);
                }
                terminate::reap(pid);
                return Err(SpawnError::Io(e.to_string()));
            }
        };

        log::info!("Session {} started (pid {:?})", id, pid);

        Ok(Self {
            core,
            io: Mutex::new(SessionIo {
                master: Some(pair.master),
                writer: Some(writer),
                cols,
                rows,
            }),
            killer: Mutex::new(killer),
            reader_thread: Mutex::new(Some(reader_thread)),
            pid,
            shell: shell_path.display().to_string(),
            kill_grace: options.kill_grace,
        })
    }

    pub fn id(&self) -> SessionId {
        self.core.id()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    pub fn is_alive(&self) -> bool {
        self.core.is_alive()
    }

    /// Send input to the child. Writes to an exited session are dropped,
    /// including those racing the reader's exit bookkeeping.
    pub fn write(&self, data: &[u8]) -> std::io::Result<()> {
        if data.is_empty() || !self.is_alive() {
            return Ok(());
        }
        let mut io = self.io.lock();
        let Some(writer) = io.writer.as_mut() else {
            return Ok(());
        };
        log::debug!("Writing {} bytes to session {}", data.len(), self.id());
        match writer.write_all(data).and_then(|()| writer.flush()) {
            Err(e) if is_hangup(&e) => {
                log::debug!(
                    "Session {} hung up, dropped {} bytes: {}",
                    self.id(),
                    data.len(),
                    e
                );
                Ok(())
            }
            result => result,
        }
    }

    /// Change the PTY window size; the kernel signals the child.
    pub fn resize(&self, cols: u16, rows: u16) -> std::io::Result<()> {
        let cols = cols.max(1);
        let rows = rows.max(1);
        let mut io = self.io.lock();
        if (io.cols, io.rows) == (cols, rows) {
            return Ok(());
        }
        let Some(master) = io.master.as_ref() else {
            return Ok(());
        };
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        log::debug!("Session {} resized to {}x{}", self.id(), cols, rows);
        io.cols = cols;
        io.rows = rows;
        Ok(())
    }

    /// `(cols, rows)`
    pub fn dimensions(&self) -> (u16, u16) {
        let io = self.io.lock();
        (io.cols, io.rows)
    }

    /// Terminate the child: hangup, wait up to the grace period, then force.
    /// Blocks until the child is gone and the reader thread has stopped (each
    /// step bounded). Safe to call more than once.
    pub fn kill(&self) {
        if self.core.mark_killed() {
            return;
        }
        log::info!("Killing session {} (pid {:?})", self.id(), self.pid);

        if self.is_alive() {
            let foreground = self.foreground_process_group();
            terminate::terminate(
                &self.core,
                self.pid,
                foreground,
                &mut **self.killer.lock(),
                self.kill_grace,
            );
        }

        {
            let mut io = self.io.lock();
            io.writer = None;
            io.master = None;
        }

        let handle = self.reader_thread.lock().take();
        if let Some(handle) = handle
            && !terminate::join_with_timeout(handle, READER_JOIN_TIMEOUT)
        {
            log::warn!(
                "Reader thread of session {} did not stop; another process still holds the PTY",
                self.id()
            );
            terminate::reap(self.pid);
        }

        // No-op if the reader already reported the exit.
        self.core.finish(ExitReason::Killed);
    }

    #[cfg(unix)]
    fn foreground_process_group(&self) -> Option<i32> {
        self.io
            .lock()
            .master
            .as_ref()
            .and_then(|m| m.process_group_leader())
    }

    #[cfg(not(unix))]
    fn foreground_process_group(&self) -> Option<i32> {
        None
    }

    /// Copy of the retained scrollback.
    pub fn scrollback_snapshot(&self) -> Vec<u8> {
        self.core.scrollback_snapshot()
    }

    /// `(start, end)` absolute offsets of the retained scrollback.
    pub fn scrollback_offsets(&self) -> (u64, u64) {
        self.core.scrollback_offsets()
    }

    /// Last reported (or initial) working directory.
    pub fn cwd(&self) -> Option<String> {
        self.core.cwd()
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.core.blocks()
    }

    pub fn block(&self, id: BlockId) -> Option<Block> {
        self.core.block(id)
    }

    /// The open block, if a command is running.
    pub fn current_block(&self) -> Option<Block> {
        self.core.current_block()
    }

    pub fn block_content(&self, id: BlockId) -> Option<BlockContent> {
        self.core.block_content(id)
    }

    pub fn block_command_text(&self, id: BlockId) -> Option<String> {
        self.core.block_command_text(id)
    }

    /// Find `pattern` in the retained scrollback.
    pub fn search(&self, pattern: &Regex) -> Vec<SearchMatch> {
        self.core.search(pattern)
    }

    /// Find a literal string in the retained scrollback.
    pub fn search_text(&self, needle: &str) -> Vec<SearchMatch> {
        if needle.is_empty() {
            return Vec::new();
        }
        match Regex::new(&regex::escape(needle)) {
            Ok(pattern) => self.core.search(&pattern),
            Err(e) => {
                log::warn!("Failed to build search pattern for {:?}: {}", needle, e);
                Vec::new()
            }
        }
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        if self.is_alive() || !self.core.is_finished() {
            log::info!("Killing session {} during drop", self.id());
            self.kill();
        }
    }
}

/// Kill and reap a child whose session could not be completed.
fn abandon_child(child: &mut (dyn Child + Send + Sync)) {
    if let Err(e) = child.kill() {
        log::warn!("Failed to kill half-spawned child: {}", e);
    }
    if let Err(e) = child.wait() {
        log::warn!("Failed to reap half-spawned child: {}", e);
    }
}

/// The child side of the PTY is gone: every process holding it exited.
fn is_hangup(error: &std::io::Error) -> bool {
    if error.kind() == std::io::ErrorKind::BrokenPipe {
        return true;
    }
    #[cfg(unix)]
    if error.raw_os_error() == Some(nix::errno::Errno::EIO as i32) {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_hangup_errors_are_recognized() {
        assert!(is_hangup(&Error::from(ErrorKind::BrokenPipe)));
        #[cfg(unix)]
        assert!(is_hangup(&Error::from_raw_os_error(
            nix::errno::Errno::EIO as i32
        )));
        assert!(!is_hangup(&Error::from(ErrorKind::PermissionDenied)));
        assert!(!is_hangup(&Error::other("disk full")));
    }
}
