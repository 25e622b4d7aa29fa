//! The shell command a run configuration asks to run before its tests.

use std::io;
use std::path::Path;
use std::process::Stdio;

use jtr_utils::exit::ChildExit;
use jtr_utils::process_tree;
use tokio::process::{Child, Command};

/// A running pre-launch command.
pub(crate) struct PreLaunchTask {
    child: Child,
    pid: Option<u32>,
}

impl PreLaunchTask {
    /// Starts `command` under the platform shell, in `working_directory` if given.
    pub fn spawn(command: &str, working_directory: Option<&Path>) -> io::Result<Self> {
        let mut cmd = shell(command);
        if let Some(dir) = working_directory {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        process_tree::isolate_process_group(&mut cmd);

        let child = cmd.spawn()?;
        let pid = child.id();
        tracing::info!(command, ?pid, "started pre-launch task");
        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Waits for the command to finish. Its output is only logged.
    pub async fn wait(self) -> io::Result<ChildExit> {
        let std::process::Output {
            status,
            stdout,
            stderr,
        } = self.child.wait_with_output().await?;

        let exit = ChildExit::from(status);
        tracing::debug!(
            ?exit,
            stdout = %String::from_utf8_lossy(&stdout),
            stderr = %String::from_utf8_lossy(&stderr),
            "pre-launch task finished"
        );
        Ok(exit)
    }
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
