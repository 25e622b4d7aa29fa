/// Exit code to issue if jtr itself fails.
pub const CODE_ERROR: i32 = 101;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
    pub const JTR_ERROR: ExitCode = ExitCode(CODE_ERROR);

    pub const fn get(&self) -> i32 {
        self.0
    }

    pub const fn new(code: i32) -> Self {
        Self(code)
    }

    pub const fn is_success(&self) -> bool {
        self.0 == 0
    }
}

/// How a child process finished, from the point of view of a test session.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ChildExit {
    /// The process exited with a code.
    Code(ExitCode),
    /// The process was terminated by a signal and has no exit code. This is what a cancelled
    /// runner looks like, so it is not treated as a runner failure.
    Signaled,
}

impl ChildExit {
    /// The exit code, if the process exited on its own with a non-zero code.
    pub fn failure_code(&self) -> Option<i32> {
        match self {
            ChildExit::Code(code) if !code.is_success() => Some(code.get()),
            _ => None,
        }
    }
}

impl From<std::process::ExitStatus> for ChildExit {
    fn from(es: std::process::ExitStatus) -> Self {
        match es.code() {
            Some(code) => ChildExit::Code(ExitCode::new(code)),
            None => ChildExit::Signaled,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{ChildExit, ExitCode};

    #[test]
    fn failure_code_only_for_nonzero_codes() {
        assert_eq!(ChildExit::Code(ExitCode::SUCCESS).failure_code(), None);
        assert_eq!(ChildExit::Code(ExitCode::FAILURE).failure_code(), Some(1));
        assert_eq!(ChildExit::Signaled.failure_code(), None);
    }
}
