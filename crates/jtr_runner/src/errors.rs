use std::io;
use std::path::PathBuf;

use jtr_protocol::TestResult;
use thiserror::Error;

use crate::external::BoxError;
use crate::state::SessionState;

/// Failures preparing a runner launch. Fatal for the group being set up.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("test runner artifact not found at {}", .0.display())]
    MissingRunnerArtifact(PathBuf),
    #[error("failed to prepare session storage at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to resolve the classpath of project {project}: {source}")]
    Classpath {
        project: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to allocate a debug port: {0}")]
    DebugPort(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("failed to start the test runner: {0}")]
    Spawn(#[source] io::Error),
    #[error("runner I/O failed: {0}")]
    Io(#[from] io::Error),
    /// The runner exited unsuccessfully. Whatever it reported before exiting is kept.
    #[error("test runner exited with code {code}")]
    RunnerExit { code: i32, results: Vec<TestResult> },
    #[error("session cannot go from {from:?} to {to:?}")]
    IllegalState { from: SessionState, to: SessionState },
}

impl SessionError {
    /// Results that were finalized before the error, if any.
    pub fn partial_results(&self) -> Option<&[TestResult]> {
        match self {
            SessionError::RunnerExit { results, .. } => Some(results),
            _ => None,
        }
    }
}

/// Failures releasing session resources. Only ever logged.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("failed to terminate process tree {pid}: {source}")]
    Terminate {
        pid: u32,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove session storage {}: {source}", .path.display())]
    RemoveStorage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
