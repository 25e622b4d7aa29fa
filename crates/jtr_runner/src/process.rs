//! Process mode: we spawn the runner and decode its standard output.

use std::process::Stdio;
use std::time::Duration;

use futures::FutureExt;
use jtr_protocol::Decoder;
use jtr_utils::exit::ChildExit;
use jtr_utils::net::LOCALHOST;
use jtr_utils::process_tree;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::watch;

use crate::errors::SessionError;
use crate::external::AttachRequest;
use crate::launch::LaunchPlan;
use crate::{cancelled, Outcome, SessionEnv, SessionHandle};

/// How long to give a suspended JVM to open its debug port before asking the debugger to
/// attach. There is no readiness signal from the runner to wait on instead.
pub const ATTACH_DELAY: Duration = Duration::from_millis(500);

const READ_BUFFER_SIZE: usize = 8 * 1024;

pub(crate) async fn run(
    plan: &LaunchPlan,
    mut decoder: Box<dyn Decoder>,
    env: &SessionEnv,
    handle: &SessionHandle,
    mut cancel: watch::Receiver<bool>,
) -> Result<Outcome, SessionError> {
    if *cancel.borrow() {
        return Ok(Outcome::cancelled(decoder));
    }

    let mut cmd = Command::new(&plan.java);
    cmd.args(plan.command_args());
    // Our environment is inherited; the configuration's entries take precedence.
    cmd.envs(&plan.env);
    if let Some(dir) = &plan.working_directory {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    process_tree::isolate_process_group(&mut cmd);

    let mut child = cmd.spawn().map_err(SessionError::Spawn)?;
    let pid = child.id();
    handle.set_pid(pid);
    tracing::info!(?pid, java = %plan.java.display(), "launched test runner");

    let mut stdout = child.stdout.take().expect("stdout is piped");
    let mut stderr = child.stderr.take().expect("stderr is piped");

    let attach = plan.debug_port.map(|port| {
        let debugger = env.debugger.clone();
        let request = AttachRequest {
            name: plan.name.clone(),
            host: LOCALHOST,
            port,
            project_name: plan.project_name.clone(),
        };
        tokio::spawn(async move {
            tokio::time::sleep(ATTACH_DELAY).await;
            tracing::debug!(port = request.port, "attaching debugger");
            if let Err(error) = debugger.attach(request).await {
                tracing::warn!(%error, "debugger failed to attach to test runner");
            }
        })
    });

    let mut out_buf = vec![0; READ_BUFFER_SIZE];
    let mut err_buf = vec![0; READ_BUFFER_SIZE];
    let mut stdout_open = true;
    let mut stderr_open = true;

    let mut was_cancelled = false;
    while stdout_open || stderr_open {
        tokio::select! {
            read = stdout.read(&mut out_buf), if stdout_open => match read {
                Ok(0) => stdout_open = false,
                Ok(n) => decoder.feed(&out_buf[..n]),
                Err(error) => {
                    tracing::warn!(%error, "failed reading runner stdout");
                    stdout_open = false;
                }
            },
            read = stderr.read(&mut err_buf), if stderr_open => match read {
                Ok(0) => stderr_open = false,
                Ok(n) => decoder.feed_error(&err_buf[..n]),
                Err(error) => {
                    tracing::warn!(%error, "failed reading runner stderr");
                    stderr_open = false;
                }
            },
            _ = cancelled(&mut cancel) => {
                was_cancelled = true;
                break;
            }
        }
    }

    let status = if was_cancelled {
        None
    } else {
        tokio::select! {
            status = child.wait() => Some(status?),
            _ = cancelled(&mut cancel) => None,
        }
    };

    if let Some(attach) = attach {
        attach.abort();
    }

    let Some(status) = status else {
        tracing::info!(?pid, "cancelling test runner");
        if let Some(pid) = pid {
            if let Err(error) = process_tree::terminate_tree(pid) {
                tracing::warn!(pid, %error, "failed to terminate runner process tree");
            }
        }
        let _ = child.kill().await;
        drain_ready(&mut stdout, decoder.as_mut(), &mut out_buf);
        return Ok(Outcome::cancelled(decoder));
    };

    let exit = ChildExit::from(status);
    tracing::info!(?exit, "test runner exited");
    let results = decoder.finalize(false);
    match exit.failure_code() {
        Some(code) => Err(SessionError::RunnerExit { code, results }),
        None => Ok(Outcome {
            results,
            cancelled: false,
        }),
    }
}

/// Feeds whatever output is already available without waiting for more.
fn drain_ready<R: AsyncRead + Unpin>(reader: &mut R, decoder: &mut dyn Decoder, buf: &mut [u8]) {
    while let Some(Ok(n)) = reader.read(buf).now_or_never() {
        if n == 0 {
            break;
        }
        decoder.feed(&buf[..n]);
    }
}
