use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    StepFailure,
    UnsupportedRollback,
    NoExecutor,
    InvalidInput,
    ProcessFailure,
    Timeout,
    Internal,
}

impl CoreErrorKind {
    /// Kinds that signal a broken caller invariant rather than a failed step.
    pub fn is_fatal(self) -> bool {
        matches!(self, CoreErrorKind::NoExecutor | CoreErrorKind::Internal)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub task: Option<String>,
    pub host: Option<String>,
    pub kind: CoreErrorKind,
    pub message: String,
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            task: None,
            host: None,
            kind,
            message: message.into(),
        }
    }

    pub fn step_failure(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::StepFailure, message)
    }

    pub fn unsupported_rollback(task: impl Into<String>) -> Self {
        let task = task.into();
        Self {
            message: format!("unsupported rollback for '{task}'"),
            task: Some(task),
            host: None,
            kind: CoreErrorKind::UnsupportedRollback,
        }
    }

    pub fn no_executor(host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            message: format!("no executor registered for host '{host}'"),
            task: None,
            host: Some(host),
            kind: CoreErrorKind::NoExecutor,
        }
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}
