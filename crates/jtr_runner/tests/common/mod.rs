#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jtr_protocol::{TestIdentity, TestItem, TestKind};
use jtr_runner::{BoxError, ClasspathResolver, SessionEnv};
use tempfile::TempDir;

pub struct StaticClasspath(pub Vec<PathBuf>);

#[async_trait]
impl ClasspathResolver for StaticClasspath {
    async fn resolve(&self, _project: &str, _tests: &[TestItem]) -> Result<Vec<PathBuf>, BoxError> {
        Ok(self.0.clone())
    }
}

pub struct FailingClasspath;

#[async_trait]
impl ClasspathResolver for FailingClasspath {
    async fn resolve(&self, project: &str, _tests: &[TestItem]) -> Result<Vec<PathBuf>, BoxError> {
        Err(format!("project {project} is not imported").into())
    }
}

/// A java home running `script`, a runner jar, and a storage root, all in temp dirs.
pub struct Fixture {
    pub java_home: TempDir,
    pub scratch: TempDir,
    pub env: SessionEnv,
}

impl Fixture {
    pub fn new(script: &str) -> Self {
        let java_home = jtr_test_utils::fake_java_home(script).unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let jar = jtr_test_utils::runner_jar(scratch.path()).unwrap();
        let env = SessionEnv::new(
            java_home.path(),
            jar,
            scratch.path().join("storage"),
            Arc::new(StaticClasspath(vec![PathBuf::from("/project/classes")])),
        );
        Self {
            java_home,
            scratch,
            env,
        }
    }

    pub fn home(&self) -> &Path {
        self.java_home.path()
    }

    pub fn storage_root(&self) -> PathBuf {
        self.scratch.path().join("storage")
    }
}

pub fn method(kind: TestKind, class: &str, method: &str) -> TestItem {
    TestItem::method(TestIdentity::new("demo", class, method), kind)
}

/// Polls until `path` has a complete line in it, and returns that line.
pub async fn wait_for_file(path: &Path) -> String {
    loop {
        if let Ok(contents) = std::fs::read_to_string(path) {
            if let Some((line, _)) = contents.split_once('\n') {
                return line.to_owned();
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Whether `pid` is a live (not zombie) process.
#[cfg(unix)]
pub fn process_alive(pid: &str) -> bool {
    let pid = pid.trim();
    let proc_stat = Path::new("/proc").join(pid).join("stat");
    if Path::new("/proc/self").exists() {
        return match std::fs::read_to_string(proc_stat) {
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next())
                .map_or(false, |state| state != 'Z' && state != 'X'),
            Err(_) => false,
        };
    }
    std::process::Command::new("kill")
        .args(["-0", pid])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Waits until `pid` is gone, allowing time for it to be reaped.
#[cfg(unix)]
pub async fn wait_for_exit(pid: &str) {
    while process_alive(pid) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
