//! The per-session reader thread.

use super::core::SessionCore;
use crate::events::ExitReason;
use portable_pty::Child;
use std::io::Read;
use std::sync::Arc;
use std::thread::JoinHandle;

const READ_BUFFER_SIZE: usize = 8192;

/// Start the blocking read loop. The thread owns the child and reaps it once
/// the PTY reaches end of file.
pub(super) fn start(
    core: Arc<SessionCore>,
    reader: Box<dyn Read + Send>,
    child: Box<dyn Child + Send + Sync>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("pty-reader-{}", core.id().as_u64()))
        .spawn(move || run(core, reader, child))
}

fn run(core: Arc<SessionCore>, mut reader: Box<dyn Read + Send>, mut child: Box<dyn Child + Send + Sync>) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let read_error = loop {
        match reader.read(&mut buf) {
            Ok(0) => break None,
            Ok(n) => {
                if !core.ingest(&buf[..n]) {
                    break None;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) if is_end_of_pty(&e) => break None,
            Err(e) => {
                log::warn!("Read error on session {}: {}", core.id(), e);
                break Some(e.to_string());
            }
        }
    };

    log::debug!("Reader for session {} reached end of stream", core.id());

    let status = match child.wait() {
        Ok(status) => Some(status.exit_code()),
        Err(e) => {
            log::debug!("Could not collect exit status of session {}: {}", core.id(), e);
            None
        }
    };

    core.finish(match read_error {
        Some(message) => ExitReason::ReadError(message),
        None => ExitReason::Exited(status),
    });
}

/// Linux reports a closed slave side as `EIO` rather than a zero-length read.
#[cfg(unix)]
fn is_end_of_pty(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(nix::errno::Errno::EIO as i32)
}

#[cfg(not(unix))]
fn is_end_of_pty(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::BrokenPipe
}
