//! Host-side implementations of what a session needs from its surroundings.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use jtr_protocol::TestItem;
use jtr_runner::{
    AttachRequest, BoxError, ClasspathResolver, Debugger, LaunchRequest, LaunchedSession, Notifier,
};
use jtr_utils::{net, process_tree, terminate_notify};
use tokio::process::Command;

/// Classpaths listed in the configuration file.
pub struct ConfiguredClasspath {
    pub default: Vec<PathBuf>,
    pub projects: BTreeMap<String, Vec<PathBuf>>,
}

#[async_trait]
impl ClasspathResolver for ConfiguredClasspath {
    async fn resolve(&self, project: &str, _tests: &[TestItem]) -> Result<Vec<PathBuf>, BoxError> {
        let classpath = self.projects.get(project).unwrap_or(&self.default);
        if classpath.is_empty() {
            return Err(format!("no classpath configured for project {project:?}").into());
        }
        Ok(classpath.clone())
    }
}

pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn info(&self, message: &str) {
        eprintln!("{message}");
    }

    fn warn(&self, message: &str) {
        eprintln!("warning: {message}");
    }
}

/// Stands in for an IDE debugger: launches runners as local processes, and tells the user where
/// to attach when a runner waits for one.
pub struct LocalDebugger;

#[async_trait]
impl Debugger for LocalDebugger {
    async fn attach(&self, request: AttachRequest) -> Result<(), BoxError> {
        eprintln!(
            "{} is waiting for a debugger on {}:{}",
            request.name, request.host, request.port
        );
        Ok(())
    }

    async fn launch(&self, request: LaunchRequest) -> Result<LaunchedSession, BoxError> {
        let mut args = vec![];
        if !request.no_debug {
            let port = net::ephemeral_port()?;
            args.push(format!(
                "-agentlib:jdwp=transport=dt_socket,server=y,suspend=y,address=127.0.0.1:{port}"
            ));
            eprintln!(
                "{} is waiting for a debugger on 127.0.0.1:{port}",
                request.name
            );
        }
        args.extend(request.command_args());

        let mut command = Command::new(&request.java);
        command
            .args(&args)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &request.working_directory {
            command.current_dir(dir);
        }
        process_tree::isolate_process_group(&mut command);

        let mut child = command.spawn()?;
        let pid = child.id();
        tracing::debug!(?pid, name = %request.name, "launched test runner");

        let (tx, terminated) = terminate_notify::make_pair();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::debug!(%status, "launched test runner exited"),
                Err(error) => tracing::warn!(%error, "failed to wait for launched test runner"),
            }
            tx.notify();
        });

        Ok(LaunchedSession {
            name: request.name,
            pid,
            terminated,
        })
    }
}
