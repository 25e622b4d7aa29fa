use crate::errors::SessionError;

/// Lifecycle of a [RunSession](crate::RunSession).
///
/// ```text
/// Created -> SettingUp -> Running -> Completed | Cancelled | Failed -> CleanedUp
/// ```
///
/// `CleanedUp` can be entered from any state, and is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Created,
    SettingUp,
    /// Set up, but the runner has not been started yet.
    Ready,
    Running,
    Completed,
    Cancelled,
    Failed,
    CleanedUp,
}

impl SessionState {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }

    fn allows(self, to: SessionState) -> bool {
        use SessionState::*;
        match (self, to) {
            (CleanedUp, _) => false,
            (_, CleanedUp) => true,
            (Created, SettingUp)
            | (SettingUp, Ready)
            | (SettingUp, Failed)
            | (Ready, Running)
            | (Running, Completed)
            | (Running, Failed) => true,
            // A cancel may land anywhere before the session finishes.
            (Created | SettingUp | Ready | Running, Cancelled) => true,
            _ => false,
        }
    }

    /// Moves `self` to `to`, if the transition is legal.
    pub fn transition(&mut self, to: SessionState) -> Result<(), SessionError> {
        if !self.allows(to) {
            return Err(SessionError::IllegalState { from: *self, to });
        }
        tracing::trace!(from = ?*self, ?to, "session state");
        *self = to;
        Ok(())
    }
}
