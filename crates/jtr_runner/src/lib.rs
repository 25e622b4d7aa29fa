//! Running one batch of tests through an out-of-process test runner.
//!
//! A [RunSession] prepares a runner launch for a group of tests of one kind, starts the runner
//! (either as a child process whose stdout we decode, or through a [Debugger] that launches it
//! and has it connect back to us), and finalizes the runner's reports into one result per
//! requested test. Sessions can be cancelled and cleaned up through a [SessionHandle] from any
//! task.

pub mod binding;
pub mod config;
pub mod errors;
pub mod external;
pub mod launch;
pub mod process;
mod socket;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;

use jtr_protocol::{Decoder, DecoderOptions, ProgressSender, TestItem, TestResult};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::instrument;

pub use binding::{LaunchMode, RunnerBinding, Transport};
pub use config::RunConfig;
pub use errors::{CleanupError, SessionError, SetupError};
pub use external::{
    AttachRequest, BoxError, ClasspathResolver, Debugger, EphemeralPorts, LaunchRequest,
    LaunchedSession, NoDebugger, Notifier, PortAllocator, RunConfigResolver, TracingNotifier,
};
pub use launch::LaunchPlan;
pub use state::SessionState;

/// Main class of the bundled test runner.
pub const DEFAULT_RUNNER_MAIN_CLASS: &str = "com.microsoft.java.test.runner.Launcher";

/// Host facilities shared by every session.
#[derive(Clone)]
pub struct SessionEnv {
    pub java_home: PathBuf,
    /// The runner artifact; appended to every classpath.
    pub runner_jar: PathBuf,
    pub runner_main_class: String,
    /// Sessions keep their scratch files in fresh subdirectories of this.
    pub storage_root: PathBuf,
    pub classpath: Arc<dyn ClasspathResolver>,
    pub debugger: Arc<dyn Debugger>,
    pub ports: Arc<dyn PortAllocator>,
    pub progress: Option<ProgressSender>,
}

impl SessionEnv {
    pub fn new(
        java_home: impl Into<PathBuf>,
        runner_jar: impl Into<PathBuf>,
        storage_root: impl Into<PathBuf>,
        classpath: Arc<dyn ClasspathResolver>,
    ) -> Self {
        Self {
            java_home: java_home.into(),
            runner_jar: runner_jar.into(),
            runner_main_class: DEFAULT_RUNNER_MAIN_CLASS.to_owned(),
            storage_root: storage_root.into(),
            classpath,
            debugger: Arc::new(NoDebugger),
            ports: Arc::new(EphemeralPorts),
            progress: None,
        }
    }

    pub fn with_debugger(mut self, debugger: Arc<dyn Debugger>) -> Self {
        self.debugger = debugger;
        self
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }
}

pub(crate) struct Outcome {
    pub results: Vec<TestResult>,
    pub cancelled: bool,
}

impl Outcome {
    pub fn cancelled(decoder: Box<dyn Decoder>) -> Self {
        Self {
            results: decoder.finalize(true),
            cancelled: true,
        }
    }
}

/// Resolves once cancellation has been requested.
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        // Nobody can cancel us any more.
        futures::future::pending::<()>().await;
    }
}

struct Shared {
    state: Mutex<SessionState>,
    pid: Mutex<Option<u32>>,
    storage_dir: Mutex<Option<PathBuf>>,
    cancel: watch::Sender<bool>,
}

/// Controls a [RunSession] from outside the task running it.
#[derive(Clone)]
pub struct SessionHandle(Arc<Shared>);

impl SessionHandle {
    fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self(Arc::new(Shared {
            state: Mutex::new(SessionState::Created),
            pid: Mutex::new(None),
            storage_dir: Mutex::new(None),
            cancel,
        }))
    }

    pub fn state(&self) -> SessionState {
        *self.0.state.lock()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.cancel.borrow()
    }

    /// Stops the session's runner, killing its whole process tree. Results reported so far are
    /// still finalized by the running session. Idempotent.
    pub fn cancel(&self) {
        let already_cancelled = self.0.cancel.send_replace(true);
        if already_cancelled {
            return;
        }
        let pid = *self.0.pid.lock();
        if let Some(pid) = pid {
            tracing::debug!(pid, "terminating runner process tree");
            if let Err(error) = jtr_utils::process_tree::terminate_tree(pid) {
                tracing::warn!(pid, %error, "failed to terminate runner process tree");
            }
        }
    }

    /// Releases everything the session holds: its process tree and its storage directory.
    /// Failures are logged and otherwise ignored. Idempotent.
    pub async fn clean_up(&self) {
        {
            let mut state = self.0.state.lock();
            if *state == SessionState::CleanedUp {
                return;
            }
            *state = SessionState::CleanedUp;
        }
        self.0.cancel.send_replace(true);

        let pid = self.0.pid.lock().take();
        if let Some(pid) = pid {
            if let Err(source) = jtr_utils::process_tree::terminate_tree(pid) {
                log_cleanup_error(CleanupError::Terminate { pid, source });
            }
        }

        let storage_dir = self.0.storage_dir.lock().take();
        if let Some(path) = storage_dir {
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "removed session storage"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => log_cleanup_error(CleanupError::RemoveStorage { path, source }),
            }
        }
    }

    fn transition(&self, to: SessionState) -> Result<(), SessionError> {
        self.0.state.lock().transition(to)
    }

    pub(crate) fn set_pid(&self, pid: Option<u32>) {
        *self.0.pid.lock() = pid;
    }

    fn set_storage_dir(&self, dir: PathBuf) {
        *self.0.storage_dir.lock() = Some(dir);
    }

    fn cancel_receiver(&self) -> watch::Receiver<bool> {
        self.0.cancel.subscribe()
    }
}

fn log_cleanup_error(error: CleanupError) {
    tracing::warn!(%error, "session clean up failed");
}

/// One execution of one runner for one group of tests.
pub struct RunSession {
    binding: RunnerBinding,
    env: SessionEnv,
    handle: SessionHandle,
    plan: Option<LaunchPlan>,
}

impl RunSession {
    pub fn new(binding: RunnerBinding, env: SessionEnv) -> Self {
        Self {
            binding,
            env,
            handle: SessionHandle::new(),
            plan: None,
        }
    }

    pub fn binding(&self) -> &RunnerBinding {
        &self.binding
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    /// Resolves the classpath, prepares the session's storage and builds the runner command.
    #[instrument(level = "debug", skip_all, fields(kind = %self.binding.kind, tests = tests.len()))]
    pub async fn setup(
        &mut self,
        tests: &[TestItem],
        is_debug: bool,
        config: &RunConfig,
    ) -> Result<&LaunchPlan, SessionError> {
        self.handle.transition(SessionState::SettingUp)?;
        match launch::prepare(&self.binding, &self.env, tests, is_debug, config).await {
            Ok(plan) => {
                self.handle.set_storage_dir(plan.storage_dir.clone());
                self.handle.transition(SessionState::Ready)?;
                Ok(self.plan.insert(plan))
            }
            Err(error) => {
                let _ = self.handle.transition(SessionState::Failed);
                Err(error.into())
            }
        }
    }

    /// Runs the prepared runner to completion, or until cancelled.
    ///
    /// A cancelled run still returns what the runner reported before it was stopped.
    #[instrument(level = "debug", skip_all, fields(kind = %self.binding.kind))]
    pub async fn run(&mut self) -> Result<Vec<TestResult>, SessionError> {
        let Some(plan) = self.plan.clone() else {
            return Err(SessionError::IllegalState {
                from: self.state(),
                to: SessionState::Running,
            });
        };
        self.handle.transition(SessionState::Running)?;

        let mut options = DecoderOptions::new(plan.project.clone(), plan.requested.clone())
            .with_encoding(plan.encoding);
        if let Some(progress) = &self.env.progress {
            options = options.with_progress(progress.clone());
        }
        let decoder = self.binding.dialect.decoder(options);
        let cancel = self.handle.cancel_receiver();

        let outcome = match self.binding.transport {
            Transport::Stdout => {
                process::run(&plan, decoder, &self.env, &self.handle, cancel).await
            }
            Transport::Socket => socket::run(&plan, decoder, &self.env, &self.handle, cancel).await,
        };

        match outcome {
            Ok(Outcome { results, cancelled }) => {
                jtr_utils::log_assert!(
                    results.iter().all(|result| result.detail.status.is_terminal()),
                    kind = %self.binding.kind,
                    "finalized results still contain running tests"
                );
                let next = if cancelled {
                    SessionState::Cancelled
                } else {
                    SessionState::Completed
                };
                self.handle.transition(next)?;
                tracing::info!(results = results.len(), cancelled, "test runner finished");
                Ok(results)
            }
            Err(error) => {
                let _ = self.handle.transition(SessionState::Failed);
                Err(error)
            }
        }
    }

    pub fn cancel(&self) {
        self.handle.cancel()
    }

    pub async fn clean_up(&self) {
        self.handle.clean_up().await
    }
}
