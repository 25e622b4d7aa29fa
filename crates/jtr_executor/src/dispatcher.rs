//! Running requested tests group by group, one run at a time.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jtr_protocol::{TestItem, TestKind, TestResult};
use jtr_runner::{
    BoxError, Notifier, RunConfig, RunConfigResolver, RunSession, RunnerBinding, SessionEnv,
    SessionError, SessionHandle, TracingNotifier,
};
use jtr_utils::exit::ChildExit;
use jtr_utils::process_tree;
use parking_lot::Mutex;
use tracing::instrument;

use crate::pre_launch::PreLaunchTask;
use crate::store::ResultStore;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to start pre-launch task {command:?}")]
    PreLaunchSpawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("pre-launch task {command:?} {}", describe_exit(.code))]
    PreLaunchTask { command: String, code: Option<i32> },
    #[error("failed to resolve a run configuration for project {project}")]
    Config {
        project: String,
        #[source]
        source: BoxError,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {code}"),
        None => "was terminated by a signal".to_owned(),
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Every group ran, or the run was cancelled; holds whatever results were reported.
    Completed(Vec<TestResult>),
    /// Another run was already in progress, so nothing was done.
    Rejected,
}

/// Tests of one project and kind, run by a single session.
#[derive(Debug)]
pub(crate) struct Group {
    pub project: String,
    pub kind: TestKind,
    pub tests: Vec<TestItem>,
}

/// Partitions `tests` by project and kind, in the order each pair is first seen.
pub(crate) fn group_tests(tests: &[TestItem]) -> Vec<Group> {
    let mut groups: Vec<Group> = vec![];
    for test in tests {
        let project = &test.identity.project;
        match groups
            .iter_mut()
            .find(|group| &group.project == project && group.kind == test.kind)
        {
            Some(group) => group.tests.push(test.clone()),
            None => groups.push(Group {
                project: project.clone(),
                kind: test.kind,
                tests: vec![test.clone()],
            }),
        }
    }
    groups
}

/// Held while a run is in progress. Dropping it lets the next run start.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(running: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(running))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What the current run has started, so it can be cancelled and cleaned up.
#[derive(Default)]
struct ActiveRun {
    cancelled: bool,
    pre_launch: Option<u32>,
    sessions: Vec<SessionHandle>,
}

/// Runs tests through the runner matching their kind, storing the results.
///
/// Only one run may be in progress at a time; a run requested meanwhile is rejected rather than
/// queued.
pub struct Dispatcher {
    env: SessionEnv,
    store: ResultStore,
    notifier: Arc<dyn Notifier>,
    configs: Option<Arc<dyn RunConfigResolver>>,
    running: AtomicBool,
    active: Mutex<ActiveRun>,
}

impl Dispatcher {
    pub fn new(env: SessionEnv, store: ResultStore) -> Self {
        Self {
            env,
            store,
            notifier: Arc::new(TracingNotifier),
            configs: None,
            running: AtomicBool::new(false),
            active: Mutex::new(ActiveRun::default()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Resolves a configuration for every group of a run that isn't given one explicitly.
    pub fn with_config_resolver(mut self, resolver: Arc<dyn RunConfigResolver>) -> Self {
        self.configs = Some(resolver);
        self
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs `tests`, one session per project and kind, in order.
    ///
    /// Each group's results are stored as soon as its session finishes, including the partial
    /// results of a runner that exited with an error. An error stops the groups after it. Every
    /// session is cleaned up before this returns, whatever the outcome.
    #[instrument(level = "debug", skip_all, fields(tests = tests.len(), is_debug = is_debug))]
    pub async fn run(
        &self,
        tests: &[TestItem],
        is_debug: bool,
        config: Option<&RunConfig>,
    ) -> Result<RunOutcome, DispatchError> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            self.notifier
                .info("A test session is currently running. Please wait until it finishes.");
            return Ok(RunOutcome::Rejected);
        };
        *self.active.lock() = ActiveRun::default();

        let mut results = vec![];
        let dispatched = self.dispatch(tests, is_debug, config, &mut results).await;
        self.clean_up().await;

        if let Err(error) = &dispatched {
            tracing::error!(%error, "test run failed");
        }
        dispatched.map(|()| RunOutcome::Completed(results))
    }

    /// Stops the pre-launch task and the active session, and skips the groups not yet started.
    pub fn cancel(&self) {
        let (pre_launch, sessions) = {
            let mut active = self.active.lock();
            active.cancelled = true;
            (active.pre_launch, active.sessions.clone())
        };
        if !self.is_running() {
            tracing::debug!("no run to cancel");
            return;
        }
        tracing::info!("cancelling test run");
        if let Some(pid) = pre_launch {
            terminate_pre_launch(pid);
        }
        for session in sessions {
            session.cancel();
        }
    }

    async fn dispatch(
        &self,
        tests: &[TestItem],
        is_debug: bool,
        explicit_config: Option<&RunConfig>,
        results: &mut Vec<TestResult>,
    ) -> Result<(), DispatchError> {
        for group in group_tests(tests) {
            if self.is_cancelled() {
                tracing::debug!("run cancelled; skipping remaining groups");
                break;
            }

            let config = self.config_for(&group, explicit_config).await?;
            let Some(binding) = RunnerBinding::for_kind(group.kind, config.launch_mode) else {
                self.notifier.warn(&format!(
                    "Cannot find matched runner to run the test: {}",
                    group.kind
                ));
                continue;
            };
            tracing::info!(
                project = %group.project,
                kind = %group.kind,
                tests = group.tests.len(),
                "running test group"
            );

            if let Some(command) = config
                .pre_launch_task
                .as_deref()
                .filter(|command| !command.trim().is_empty())
            {
                if !self.pre_launch(command, &config).await? {
                    break;
                }
            }

            let mut session = RunSession::new(binding, self.env.clone());
            if !self.register(session.handle()) {
                break;
            }
            session.setup(&group.tests, is_debug, &config).await?;
            match session.run().await {
                Ok(group_results) => {
                    self.store.store(&group_results);
                    results.extend(group_results);
                }
                Err(error) => {
                    if let Some(partial) = error.partial_results() {
                        self.store.store(partial);
                        results.extend_from_slice(partial);
                    }
                    return Err(error.into());
                }
            }
        }
        Ok(())
    }

    async fn config_for(
        &self,
        group: &Group,
        explicit: Option<&RunConfig>,
    ) -> Result<RunConfig, DispatchError> {
        if let Some(config) = explicit {
            return Ok(config.clone());
        }
        match &self.configs {
            Some(resolver) => resolver
                .resolve(&group.project, &group.tests)
                .await
                .map_err(|source| DispatchError::Config {
                    project: group.project.clone(),
                    source,
                }),
            None => Ok(RunConfig::default()),
        }
    }

    /// Runs the pre-launch task to completion. Returns `false` if the run was cancelled meanwhile.
    async fn pre_launch(&self, command: &str, config: &RunConfig) -> Result<bool, DispatchError> {
        let task = PreLaunchTask::spawn(command, config.working_directory.as_deref()).map_err(
            |source| DispatchError::PreLaunchSpawn {
                command: command.to_owned(),
                source,
            },
        )?;
        let cancelled = {
            let mut active = self.active.lock();
            active.pre_launch = task.pid();
            active.cancelled
        };
        if let (true, Some(pid)) = (cancelled, task.pid()) {
            terminate_pre_launch(pid);
        }

        let exit = task.wait().await;
        self.active.lock().pre_launch = None;
        if self.is_cancelled() {
            return Ok(false);
        }

        let exit = exit.map_err(|source| DispatchError::PreLaunchSpawn {
            command: command.to_owned(),
            source,
        })?;
        match exit {
            ChildExit::Code(code) if code.is_success() => Ok(true),
            ChildExit::Code(code) => Err(DispatchError::PreLaunchTask {
                command: command.to_owned(),
                code: Some(code.get()),
            }),
            ChildExit::Signaled => Err(DispatchError::PreLaunchTask {
                command: command.to_owned(),
                code: None,
            }),
        }
    }

    /// Tracks `session` for cancellation and clean up, unless the run was already cancelled.
    fn register(&self, session: SessionHandle) -> bool {
        let mut active = self.active.lock();
        if active.cancelled {
            return false;
        }
        active.sessions.push(session);
        true
    }

    fn is_cancelled(&self) -> bool {
        self.active.lock().cancelled
    }

    async fn clean_up(&self) {
        let ActiveRun {
            pre_launch,
            sessions,
            ..
        } = std::mem::take(&mut *self.active.lock());
        if let Some(pid) = pre_launch {
            terminate_pre_launch(pid);
        }
        for session in sessions {
            session.clean_up().await;
        }
    }
}

fn terminate_pre_launch(pid: u32) {
    if let Err(error) = process_tree::terminate_tree(pid) {
        tracing::warn!(pid, %error, "failed to terminate pre-launch task");
    }
}
