//! Termination of a child process together with every process it spawned.
//!
//! On Unix, children are started as leaders of their own process group so the whole group can
//! be signalled at once. On Windows, `taskkill /T` walks the process tree.

use std::io;

use tokio::process::Command;

/// Configures `cmd` so that the spawned process, and all of its descendants, can later be
/// terminated with [terminate_tree].
pub fn isolate_process_group(cmd: &mut Command) {
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }
    #[cfg(not(unix))]
    {
        let _ = cmd;
    }
}

/// Sends a termination signal to the process tree rooted at `pid`.
///
/// A tree that is already gone is not an error.
#[cfg(unix)]
pub fn terminate_tree(pid: u32) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

    match killpg(Pid::from_raw(pgid), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(errno.into()),
    }
}

#[cfg(windows)]
pub fn terminate_tree(pid: u32) -> io::Result<()> {
    let status = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()?;
    // 128: no such process.
    match status.code() {
        Some(0) | Some(128) => Ok(()),
        _ => Err(io::Error::new(
            io::ErrorKind::Other,
            format!("taskkill exited with {status}"),
        )),
    }
}
