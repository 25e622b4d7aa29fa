//! Collaborators a session relies on but does not implement: classpath resolution, the
//! debugger, port allocation and user notification.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;

use async_trait::async_trait;
use jtr_protocol::TestItem;
use jtr_utils::terminate_notify::TerminateRx;

use crate::config::RunConfig;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[async_trait]
pub trait ClasspathResolver: Send + Sync {
    /// The runtime classpath needed to run `tests` of `project`.
    async fn resolve(&self, project: &str, tests: &[TestItem]) -> Result<Vec<PathBuf>, BoxError>;
}

/// Asks a debugger to attach to a JVM waiting on `port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachRequest {
    pub name: String,
    pub host: IpAddr,
    pub port: u16,
    pub project_name: String,
}

/// Asks a debugger to start a JVM itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub name: String,
    pub project_name: String,
    pub java: PathBuf,
    pub vm_args: Vec<String>,
    pub main_class: String,
    pub args: Vec<String>,
    pub working_directory: Option<PathBuf>,
    /// Overlaid onto the debugger's own environment.
    pub env: BTreeMap<String, String>,
    pub no_debug: bool,
}

impl LaunchRequest {
    /// The full argument list for `java`.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.vm_args.clone();
        args.push(self.main_class.clone());
        args.extend(self.args.iter().cloned());
        args
    }
}

/// A debug session started by [Debugger::launch].
pub struct LaunchedSession {
    pub name: String,
    /// Root of the launched process tree, when the debugger exposes it.
    pub pid: Option<u32>,
    /// Resolves once the debug session terminates.
    pub terminated: TerminateRx,
}

impl fmt::Debug for LaunchedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchedSession")
            .field("name", &self.name)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Debugger: Send + Sync {
    async fn attach(&self, request: AttachRequest) -> Result<(), BoxError>;
    async fn launch(&self, request: LaunchRequest) -> Result<LaunchedSession, BoxError>;
}

/// A debugger that can do neither. Runs that need one fail to launch, and debug attaches are
/// dropped with a warning.
#[derive(Debug, Default)]
pub struct NoDebugger;

#[async_trait]
impl Debugger for NoDebugger {
    async fn attach(&self, request: AttachRequest) -> Result<(), BoxError> {
        tracing::warn!(port = request.port, "no debugger available to attach");
        Ok(())
    }

    async fn launch(&self, _request: LaunchRequest) -> Result<LaunchedSession, BoxError> {
        Err("no debugger available to launch the test runner".into())
    }
}

pub trait PortAllocator: Send + Sync {
    fn allocate(&self) -> io::Result<u16>;
}

/// Binds, and immediately releases, a port on the loopback interface.
#[derive(Debug, Default)]
pub struct EphemeralPorts;

impl PortAllocator for EphemeralPorts {
    fn allocate(&self) -> io::Result<u16> {
        jtr_utils::net::ephemeral_port()
    }
}

/// Messages meant for the user rather than the logs.
pub trait Notifier: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
}

#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }
}

/// Picks the run configuration for a group of tests.
#[async_trait]
pub trait RunConfigResolver: Send + Sync {
    async fn resolve(&self, project: &str, tests: &[TestItem]) -> Result<RunConfig, BoxError>;
}
