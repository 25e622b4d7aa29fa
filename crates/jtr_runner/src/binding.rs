use jtr_protocol::{Dialect, TestKind};
use serde_derive::{Deserialize, Serialize};

/// How a runner is started.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// We spawn the JVM ourselves and read its standard output.
    #[default]
    Process,
    /// The debugger launches the JVM, which connects back to us over a socket.
    Launch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Stdout,
    Socket,
}

/// The runner selector, wire dialect and transport used for one kind of test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunnerBinding {
    pub kind: TestKind,
    /// First argument to the runner's main class; picks the framework adapter.
    pub selector: &'static str,
    pub dialect: Dialect,
    pub transport: Transport,
}

impl RunnerBinding {
    /// The runner for `kind` in `mode`, if there is one.
    pub fn for_kind(kind: TestKind, mode: LaunchMode) -> Option<Self> {
        use LaunchMode::*;
        let (selector, dialect, transport) = match (kind, mode) {
            (TestKind::JUnit, Process) => ("junit", Dialect::Tagged, Transport::Stdout),
            (TestKind::JUnit5, Process) => ("junit5", Dialect::TaggedJUnit5, Transport::Stdout),
            (TestKind::TestNG, Process) => ("testng", Dialect::Legacy, Transport::Stdout),
            (TestKind::JUnit, Launch) => ("junit", Dialect::LinePrefix, Transport::Socket),
            (TestKind::JUnit5, Launch) => ("junit5", Dialect::LinePrefix, Transport::Socket),
            (TestKind::TestNG, Launch) | (TestKind::None, _) => return None,
        };
        Some(Self {
            kind,
            selector,
            dialect,
            transport,
        })
    }

    /// Name given to debug sessions of this runner.
    pub fn debug_session_name(&self) -> String {
        match self.kind {
            TestKind::JUnit => "Debug (JUnit Test)".to_owned(),
            TestKind::JUnit5 => "Debug (JUnit 5 Test)".to_owned(),
            TestKind::TestNG => "Debug (TestNG Test)".to_owned(),
            TestKind::None => "Debug (Test)".to_owned(),
        }
    }
}

#[cfg(test)]
mod test {
    use jtr_protocol::{Dialect, TestKind};

    use super::{LaunchMode, RunnerBinding, Transport};

    #[test]
    fn bindings() {
        let b = |kind, mode| {
            RunnerBinding::for_kind(kind, mode).map(|b| (b.selector, b.dialect, b.transport))
        };
        use LaunchMode::*;
        assert_eq!(
            b(TestKind::JUnit, Process),
            Some(("junit", Dialect::Tagged, Transport::Stdout))
        );
        assert_eq!(
            b(TestKind::JUnit5, Process),
            Some(("junit5", Dialect::TaggedJUnit5, Transport::Stdout))
        );
        assert_eq!(
            b(TestKind::TestNG, Process),
            Some(("testng", Dialect::Legacy, Transport::Stdout))
        );
        assert_eq!(
            b(TestKind::JUnit, Launch),
            Some(("junit", Dialect::LinePrefix, Transport::Socket))
        );
        assert_eq!(
            b(TestKind::JUnit5, Launch),
            Some(("junit5", Dialect::LinePrefix, Transport::Socket))
        );
        assert_eq!(b(TestKind::TestNG, Launch), None);
        assert_eq!(b(TestKind::None, Process), None);
        assert_eq!(b(TestKind::None, Launch), None);
    }
}
