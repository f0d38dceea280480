//! Child process launched as the leader of its own process group, so that
//! the child and everything it spawned can be signalled together

use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, warn};

/// Signal strength for [`ProcessGroup`] delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    /// Ask politely (SIGTERM)
    Terminate,
    /// Cannot be caught or ignored (SIGKILL)
    Kill,
}

/// Handle to a spawned child that leads its own group.
///
/// Dropping a handle whose child was never reaped kills the whole group,
/// which covers panics and cancelled futures in the caller.
pub struct ProcessGroup {
    child: Child,
    pgid: Option<u32>,
    reaped: bool,
}

impl ProcessGroup {
    /// Spawn `command` in a fresh process group
    pub fn spawn(mut command: std::process::Command) -> io::Result<Self> {
        platform::isolate(&mut command);

        let mut command = Command::from(command);
        command.kill_on_drop(true);

        let child = command.spawn()?;
        let pgid = child.id();
        debug!(pgid = ?pgid, "process group started");

        Ok(Self {
            child,
            pgid,
            reaped: false,
        })
    }

    /// Group id, equal to the leader's pid
    pub fn id(&self) -> Option<u32> {
        self.pgid
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Wait for the group leader to exit
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait().await?;
        self.reaped = true;
        Ok(status)
    }

    /// Deliver `signal` to every process still in the group.
    /// A group with no members left is not an error.
    pub fn signal(&self, signal: GroupSignal) {
        let Some(pgid) = self.pgid else {
            return;
        };
        if let Err(e) = platform::signal(pgid, signal) {
            warn!(pgid, ?signal, "could not signal process group: {}", e);
        }
    }

    /// Forcefully kill whatever is left in the group
    pub fn kill(&self) {
        self.signal(GroupSignal::Kill);
    }

    /// Terminate the group: a graceful signal, then after `grace` a forceful
    /// kill of anything still alive, then reap the leader
    pub async fn terminate(&mut self, grace: Duration) -> io::Result<ExitStatus> {
        self.signal(GroupSignal::Terminate);

        if !self.reaped {
            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(status) => {
                    status?;
                    self.reaped = true;
                }
                Err(_) => debug!(pgid = ?self.pgid, "group outlived grace period, killing"),
            }
        }

        // Sweep descendants even when the leader went down on the first signal
        self.kill();
        self.wait().await
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if !self.reaped {
            self.kill();
        }
    }
}

#[cfg(unix)]
mod platform {
    use super::GroupSignal;
    use std::io;
    use std::os::unix::process::CommandExt;

    pub fn isolate(command: &mut std::process::Command) {
        command.process_group(0);
    }

    pub fn signal(pgid: u32, signal: GroupSignal) -> io::Result<()> {
        let signo = match signal {
            GroupSignal::Terminate => libc::SIGTERM,
            GroupSignal::Kill => libc::SIGKILL,
        };
        let pgid = libc::pid_t::try_from(pgid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pgid out of range"))?;

        // SAFETY: killpg has no memory-safety preconditions
        let rc = unsafe { libc::killpg(pgid, signo) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            Ok(())
        } else {
            Err(err)
        }
    }
}

#[cfg(windows)]
mod platform {
    use super::GroupSignal;
    use std::io;
    use std::os::windows::process::CommandExt;
    use std::process::Stdio;

    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

    pub fn isolate(command: &mut std::process::Command) {
        command.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }

    /// Console programs have no portable graceful stop, so both strengths
    /// force-kill the tree rooted at the leader
    pub fn signal(pid: u32, _signal: GroupSignal) -> io::Result<()> {
        std::process::Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|_| ())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sleeper(seconds: &str) -> std::process::Command {
        let mut command = std::process::Command::new("sleep");
        command.arg(seconds);
        command
    }

    #[tokio::test]
    async fn child_leads_its_own_group() {
        let mut group = ProcessGroup::spawn(sleeper("5")).unwrap();
        let pid = group.id().unwrap() as libc::pid_t;

        // SAFETY: getpgid only reads process table state
        let pgid = unsafe { libc::getpgid(pid) };
        assert_eq!(pgid, pid);

        group.terminate(Duration::from_millis(100)).await.unwrap();
    }

    #[tokio::test]
    async fn terminate_returns_promptly() {
        let mut group = ProcessGroup::spawn(sleeper("30")).unwrap();
        let started = Instant::now();
        let status = group.terminate(Duration::from_millis(200)).await.unwrap();
        assert!(!status.success());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn signalling_an_empty_group_is_quiet() {
        let mut group = ProcessGroup::spawn(sleeper("0")).unwrap();
        group.wait().await.unwrap();
        group.kill();
        group.kill();
    }
}
