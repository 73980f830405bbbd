//! Graceful-then-forced termination of a session's process tree.

use super::core::SessionCore;
use portable_pty::ChildKiller;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Upper bound on waiting for the reader to notice a forced kill.
const FORCED_EXIT_WAIT: Duration = Duration::from_millis(500);

/// Hang up the child's process group (and the foreground job, if it is a
/// different group), give it `grace` to exit, then kill it.
pub(super) fn terminate(
    core: &SessionCore,
    pid: Option<u32>,
    foreground: Option<i32>,
    killer: &mut (dyn ChildKiller + Send + Sync),
    grace: Duration,
) {
    #[cfg(unix)]
    if let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) {
        use nix::sys::signal::Signal;

        signal_groups(pid, foreground, Signal::SIGHUP);
        if wait_for_exit(core, grace) {
            return;
        }
        log::debug!(
            "Session {} ignored SIGHUP for {:?}; sending SIGKILL",
            core.id(),
            grace
        );
        signal_groups(pid, foreground, Signal::SIGKILL);
        if !wait_for_exit(core, FORCED_EXIT_WAIT) {
            log::debug!("Session {} still has readers on its PTY", core.id());
        }
        return;
    }

    let _ = foreground;
    if let Err(e) = killer.kill() {
        log::warn!("Failed to kill session {}: {}", core.id(), e);
    }
    if !wait_for_exit(core, grace.max(FORCED_EXIT_WAIT)) {
        log::debug!("Session {} did not report exit after kill", core.id());
    }
}

#[cfg(unix)]
fn signal_groups(pid: i32, foreground: Option<i32>, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::{kill, killpg};
    use nix::unistd::Pid;

    // The shell leads its own session, so its pid is also its group id.
    if let Err(e) = killpg(Pid::from_raw(pid), signal) {
        log::trace!("killpg({}, {:?}) failed: {}; signalling pid", pid, signal, e);
        let _ = kill(Pid::from_raw(pid), signal);
    }
    if let Some(group) = foreground.filter(|g| *g > 0 && *g != pid)
        && let Err(e) = killpg(Pid::from_raw(group), signal)
    {
        log::trace!("killpg({}, {:?}) failed: {}", group, signal, e);
    }
}

/// Poll until the reader has reported the exit or `timeout` passes.
fn wait_for_exit(core: &SessionCore, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while core.is_alive() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    true
}

/// Join `handle`, giving up after `timeout`. Returns `false` if the thread is
/// still running; it is then detached.
pub(super) fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    if handle.join().is_err() {
        log::error!("PTY reader thread panicked");
    }
    true
}

/// Collect the exit status of `pid` if it is a zombie, without blocking.
#[cfg(unix)]
pub(super) fn reap(pid: Option<u32>) {
    use nix::sys::wait::{WaitPidFlag, waitpid};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    match waitpid(Pid::from_raw(pid), Some(WaitPidFlag::WNOHANG)) {
        Ok(status) => log::debug!("Reaped pid {}: {:?}", pid, status),
        Err(e) => log::trace!("waitpid({}) failed: {}", pid, e),
    }
}

#[cfg(not(unix))]
pub(super) fn reap(_pid: Option<u32>) {}
