//! Turning a group of tests and a run configuration into a concrete runner command line.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use jtr_protocol::{expected_identities, TestIdentity, TestItem};
use jtr_utils::time::millis_since_epoch;

use crate::binding::{RunnerBinding, Transport};
use crate::config::RunConfig;
use crate::errors::SetupError;
use crate::SessionEnv;

pub const ARGFILE_NAME: &str = "classpath.args";

#[cfg(windows)]
const CLASSPATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const CLASSPATH_SEPARATOR: &str = ":";

/// Everything needed to start one runner.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub name: String,
    /// Project the tests belong to.
    pub project: String,
    /// Project name handed to the debugger.
    pub project_name: String,
    pub java: PathBuf,
    /// JVM options, including the debug agent and the classpath argfile.
    pub vm_args: Vec<String>,
    pub main_class: String,
    /// Arguments to the runner's main class.
    pub runner_args: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub is_debug: bool,
    /// Port the JVM's debug agent listens on, in process mode.
    pub debug_port: Option<u16>,
    pub storage_dir: PathBuf,
    pub requested: Vec<TestIdentity>,
    pub encoding: &'static Encoding,
}

impl LaunchPlan {
    /// The full argument list for `java`.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.vm_args.clone();
        args.push(self.main_class.clone());
        args.extend(self.runner_args.iter().cloned());
        args
    }
}

pub(crate) async fn prepare(
    binding: &RunnerBinding,
    env: &SessionEnv,
    tests: &[TestItem],
    is_debug: bool,
    config: &RunConfig,
) -> Result<LaunchPlan, SetupError> {
    if !tokio::fs::try_exists(&env.runner_jar).await.unwrap_or(false) {
        return Err(SetupError::MissingRunnerArtifact(env.runner_jar.clone()));
    }

    let project = tests
        .first()
        .map(|item| item.identity.project.clone())
        .unwrap_or_default();

    let debug_port = if is_debug && binding.transport == Transport::Stdout {
        Some(env.ports.allocate().map_err(SetupError::DebugPort)?)
    } else {
        None
    };

    let mut classpath = env
        .classpath
        .resolve(&project, tests)
        .await
        .map_err(|source| SetupError::Classpath {
            project: project.clone(),
            source,
        })?;
    classpath.push(env.runner_jar.clone());

    let storage_dir = create_storage_dir(&env.storage_root)
        .await
        .map_err(|source| SetupError::Storage {
            path: env.storage_root.clone(),
            source,
        })?;
    let argfile = storage_dir.join(ARGFILE_NAME);
    if let Err(source) = tokio::fs::write(&argfile, classpath_argfile(&classpath)).await {
        let _ = tokio::fs::remove_dir_all(&storage_dir).await;
        return Err(SetupError::Storage {
            path: argfile,
            source,
        });
    }

    let mut vm_args = config.vm_args.clone();
    if let Some(port) = debug_port {
        vm_args.push(format!(
            "-agentlib:jdwp=transport=dt_socket,server=y,suspend=y,address={port}"
        ));
    }
    vm_args.push(format!("@{}", argfile.display()));

    let mut runner_args = vec![binding.selector.to_owned()];
    runner_args.extend(tests.iter().map(|item| item.identity.full_name()));
    runner_args.extend(config.args.iter().cloned());

    let name = if config.name.is_empty() {
        binding.debug_session_name()
    } else {
        config.name.clone()
    };

    let plan = LaunchPlan {
        name,
        project_name: config
            .project_name
            .clone()
            .unwrap_or_else(|| project.clone()),
        project,
        java: env.java_home.join("bin").join("java"),
        vm_args,
        main_class: env.runner_main_class.clone(),
        runner_args,
        working_directory: config.working_directory.clone(),
        env: config.env.clone(),
        is_debug,
        debug_port,
        storage_dir,
        requested: expected_identities(tests),
        encoding: config.output_encoding(),
    };
    tracing::debug!(args = ?plan.command_args(), "prepared runner launch");
    Ok(plan)
}

/// Creates a fresh `<root>/<millis since epoch>` directory.
async fn create_storage_dir(root: &Path) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(root).await?;
    let mut stamp = millis_since_epoch();
    loop {
        let dir = root.join(stamp.to_string());
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => return Ok(dir),
            // Another session claimed this millisecond.
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => stamp += 1,
            Err(e) => return Err(e),
        }
    }
}

/// A `java @argfile` holding the classpath. Quoted, since paths may contain spaces.
fn classpath_argfile(classpath: &[PathBuf]) -> String {
    let joined = classpath
        .iter()
        .map(|entry| entry.display().to_string())
        .collect::<Vec<_>>()
        .join(CLASSPATH_SEPARATOR);
    let escaped = joined.replace('\\', "\\\\").replace('"', "\\\"");
    format!("-cp\n\"{escaped}\"\n")
}

/// Points the runner at `port`: the value after the last `-port` is replaced, or `-port <port>`
/// is appended when there is none.
pub(crate) fn set_port_arg(args: &mut Vec<String>, port: u16) {
    match args.iter().rposition(|arg| arg == "-port") {
        Some(i) if i + 1 < args.len() => args[i + 1] = port.to_string(),
        _ => {
            args.push("-port".to_owned());
            args.push(port.to_string());
        }
    }
}
