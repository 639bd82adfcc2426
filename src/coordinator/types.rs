//! Public types for the memo engine coordinator.

/// Engine lifecycle state.
///
/// Use [`super::MemoEngine::state()`] to check the current state or
/// [`super::MemoEngine::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Built, background tasks not yet spawned
    Created,
    /// Health monitor, reload scheduler and metrics exporter running
    Running,
    /// Shutdown signalled, waiting for background tasks
    ShuttingDown,
    /// Every background task has exited
    Stopped,
}

impl EngineState {
    pub(crate) fn as_gauge(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Running => 1,
            Self::ShuttingDown => 2,
            Self::Stopped => 3,
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_gauge() {
        assert_eq!(EngineState::Running.to_string(), "Running");
        assert_eq!(EngineState::Stopped.as_gauge(), 3);
        assert!(EngineState::Created.as_gauge() < EngineState::Running.as_gauge());
    }
}
