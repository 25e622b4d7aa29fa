//! Socket mode: the debugger launches the runner, which connects back to a listener of ours.
//!
//! The session ends when the debugger reports the launched session terminated. At that point the
//! runner is gone, so its connection (accepted late if need be) is read to EOF before finalizing.
//! A cancelled session only decodes what is already readable.

use std::io;
use std::time::Duration;

use jtr_protocol::Decoder;
use jtr_utils::net::LOCALHOST;
use jtr_utils::process_tree;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::errors::SessionError;
use crate::external::{LaunchRequest, LaunchedSession};
use crate::launch::{set_port_arg, LaunchPlan};
use crate::{cancelled, Outcome, SessionEnv, SessionHandle};

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// How long a terminated runner's connection may take to show up.
const LATE_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
/// Upper bound on reading a terminated runner's remaining output.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

enum End {
    Terminated,
    Cancelled,
}

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

    let listener = TcpListener::bind((LOCALHOST, 0)).await?;
    let port = listener.local_addr()?.port();

    let mut args = plan.runner_args.clone();
    set_port_arg(&mut args, port);
    let request = LaunchRequest {
        name: plan.name.clone(),
        project_name: plan.project_name.clone(),
        java: plan.java.clone(),
        vm_args: plan.vm_args.clone(),
        main_class: plan.main_class.clone(),
        args,
        working_directory: plan.working_directory.clone(),
        env: plan.env.clone(),
        no_debug: !plan.is_debug,
    };

    let LaunchedSession {
        name,
        pid,
        mut terminated,
    } = match env.debugger.launch(request).await {
        Ok(launched) => launched,
        Err(error) => {
            tracing::error!(%error, "debugger failed to launch the test runner");
            return Ok(Outcome {
                results: decoder.finalize(false),
                cancelled: false,
            });
        }
    };
    if pid.is_some() {
        handle.set_pid(pid);
    }
    tracing::info!(session = %name, ?pid, port, "launched test runner through the debugger");

    let mut stream: Option<TcpStream> = None;
    let mut stream_open = true;
    let mut accepting = true;
    let mut buf = vec![0; READ_BUFFER_SIZE];

    let end = loop {
        tokio::select! {
            accepted = listener.accept(), if accepting && stream.is_none() => match accepted {
                Ok((conn, peer)) => {
                    tracing::debug!(%peer, "test runner connected");
                    stream = Some(conn);
                }
                Err(error) => {
                    tracing::warn!(%error, "failed to accept the test runner connection");
                    accepting = false;
                }
            },
            read = read_some(&mut stream, &mut buf), if stream_open && stream.is_some() => {
                match read {
                    Ok(0) => stream_open = false,
                    Ok(n) => decoder.feed(&buf[..n]),
                    Err(error) => {
                        tracing::warn!(%error, "failed reading from the test runner connection");
                        stream_open = false;
                    }
                }
            }
            _ = &mut terminated => break End::Terminated,
            _ = cancelled(&mut cancel) => break End::Cancelled,
        }
    };

    match end {
        End::Terminated => {
            if stream.is_none() && accepting {
                stream = accept_late(&listener).await;
                stream_open = stream.is_some();
            }
            if let (Some(conn), true) = (stream.as_mut(), stream_open) {
                read_to_eof(conn, decoder.as_mut(), &mut buf).await;
            }
        }
        End::Cancelled => {
            tracing::info!(session = %name, "cancelling test runner");
            if let Some(pid) = pid {
                if let Err(error) = process_tree::terminate_tree(pid) {
                    tracing::warn!(pid, %error, "failed to terminate runner process tree");
                }
            }
            if let (Some(conn), true) = (&stream, stream_open) {
                drain_ready(conn, decoder.as_mut(), &mut buf);
            }
        }
    }
    drop(stream);
    drop(listener);

    Ok(match end {
        End::Terminated => Outcome {
            results: decoder.finalize(false),
            cancelled: false,
        },
        End::Cancelled => Outcome::cancelled(decoder),
    })
}

async fn read_some(stream: &mut Option<TcpStream>, buf: &mut [u8]) -> io::Result<usize> {
    match stream {
        Some(stream) => stream.read(buf).await,
        None => futures::future::pending().await,
    }
}

/// The connection of a runner that terminated before we got around to accepting it.
async fn accept_late(listener: &TcpListener) -> Option<TcpStream> {
    match tokio::time::timeout(LATE_CONNECT_TIMEOUT, listener.accept()).await {
        Ok(Ok((conn, peer))) => {
            tracing::debug!(%peer, "terminated test runner connected");
            Some(conn)
        }
        Ok(Err(error)) => {
            tracing::warn!(%error, "failed to accept the test runner connection");
            None
        }
        Err(_) => {
            tracing::debug!("test runner terminated without connecting");
            None
        }
    }
}

/// Feeds everything the runner sent until it closed its end.
async fn read_to_eof(stream: &mut TcpStream, decoder: &mut dyn Decoder, buf: &mut [u8]) {
    let drain = async {
        loop {
            match stream.read(buf).await {
                Ok(0) => break,
                Ok(n) => decoder.feed(&buf[..n]),
                Err(error) => {
                    tracing::warn!(%error, "failed draining the test runner connection");
                    break;
                }
            }
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        tracing::warn!("test runner connection still open after termination; finalizing anyway");
    }
}

/// Feeds whatever bytes are already readable without waiting for more.
fn drain_ready(stream: &TcpStream, decoder: &mut dyn Decoder, buf: &mut [u8]) {
    loop {
        match stream.try_read(buf) {
            Ok(0) => break,
            Ok(n) => decoder.feed(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(error) => {
                tracing::warn!(%error, "failed draining the test runner connection");
                break;
            }
        }
    }
}
