//! Test identities, result statuses, and the finalized result records handed to callers.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde_derive::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Stable key of one runnable test unit.
///
/// Two identities are equal iff their project, container and method match; `source_uri` only
/// says where the test lives and is carried along for reporting.
#[derive(Serialize, Deserialize, Debug, Clone, Eq)]
pub struct TestIdentity {
    pub project: String,
    /// The class or suite.
    pub container: String,
    /// Empty for container-level identities.
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub source_uri: String,
}

impl TestIdentity {
    pub fn new(
        project: impl Into<String>,
        container: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            container: container.into(),
            method: method.into(),
            source_uri: String::new(),
        }
    }

    pub fn with_source_uri(mut self, source_uri: impl Into<String>) -> Self {
        self.source_uri = source_uri.into();
        self
    }

    /// Parses a `container#method` (or bare `container`) name reported by a runner.
    pub fn from_full_name(project: impl Into<String>, full_name: &str) -> Self {
        match full_name.split_once('#') {
            Some((container, method)) => Self::new(project, container, method),
            None => Self::new(project, full_name, ""),
        }
    }

    /// Parses a `project@container#method` key.
    pub fn from_qualified(qualified: &str) -> Option<Self> {
        let (project, full_name) = qualified.split_once('@')?;
        Some(Self::from_full_name(project, full_name))
    }

    pub fn is_container(&self) -> bool {
        self.method.is_empty()
    }

    /// `container#method`, or `container` for container-level identities.
    ///
    /// This is also the form runners accept on their command line.
    pub fn full_name(&self) -> String {
        if self.is_container() {
            self.container.clone()
        } else {
            format!("{}#{}", self.container, self.method)
        }
    }

    /// `project@container#method`.
    pub fn qualified_name(&self) -> String {
        format!("{}@{}", self.project, self.full_name())
    }
}

impl PartialEq for TestIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.project == other.project
            && self.container == other.container
            && self.method == other.method
    }
}

impl Hash for TestIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.project.hash(state);
        self.container.hash(state);
        self.method.hash(state);
    }
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

/// The test framework a discovered test belongs to. Runners are bound per kind.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    #[default]
    None,
    JUnit,
    JUnit5,
    TestNG,
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestKind::None => "none",
            TestKind::JUnit => "junit",
            TestKind::JUnit5 => "junit5",
            TestKind::TestNG => "testng",
        };
        f.write_str(name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TestLevel {
    Class,
    #[default]
    Method,
}

/// A test as handed over by discovery.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TestItem {
    #[serde(flatten)]
    pub identity: TestIdentity,
    #[serde(default)]
    pub kind: TestKind,
    #[serde(default)]
    pub level: TestLevel,
    /// Methods of a class-level item, when discovery resolved them.
    #[serde(default)]
    pub children: Vec<TestItem>,
}

impl TestItem {
    pub fn method(identity: TestIdentity, kind: TestKind) -> Self {
        Self {
            identity,
            kind,
            level: TestLevel::Method,
            children: vec![],
        }
    }

    pub fn class(identity: TestIdentity, kind: TestKind, children: Vec<TestItem>) -> Self {
        Self {
            identity,
            kind,
            level: TestLevel::Class,
            children,
        }
    }

    /// The identities a run of this item is expected to report on.
    pub fn expected_identities(&self) -> Box<dyn Iterator<Item = &TestIdentity> + '_> {
        if self.level == TestLevel::Class && !self.children.is_empty() {
            Box::new(self.children.iter().flat_map(|c| c.expected_identities()))
        } else {
            Box::new(std::iter::once(&self.identity))
        }
    }
}

/// Flattens the expected identities of `items`, keeping the first occurrence of duplicates.
pub fn expected_identities(items: &[TestItem]) -> Vec<TestIdentity> {
    let mut seen = std::collections::HashSet::new();
    items
        .iter()
        .flat_map(|item| item.expected_identities())
        .filter(|identity| seen.insert(*identity))
        .cloned()
        .collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResultStatus {
    /// Transient; never present in a finalized result set.
    #[default]
    Running,
    Pass,
    Fail,
    Skipped,
}

impl ResultStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResultStatus::Running)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultDetail {
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ResultDetail {
    pub fn with_status(status: ResultStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }
}

/// One finalized result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub identity: TestIdentity,
    pub detail: ResultDetail,
}

/// Live updates emitted while a runner is still reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started(TestIdentity),
    Finished(TestIdentity, ResultStatus),
    Failure {
        identity: TestIdentity,
        message: String,
        /// Where the failing test lives, when known.
        location: Option<String>,
    },
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
