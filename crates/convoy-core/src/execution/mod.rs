pub mod local;

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

use crate::models::{CoreError, CoreErrorKind};

pub use local::LocalExecutor;

pub type ExecutionResult<T> = Result<T, CoreError>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    pub fn validate(&self) -> ExecutionResult<()> {
        if self.program.as_os_str().is_empty() {
            return Err(invalid_input("command program path must not be empty"));
        }

        // Empty arguments are allowed.
        if self.args.iter().any(|arg| arg.contains('\0')) {
            return Err(invalid_input("command args must not contain NUL bytes"));
        }

        if self
            .env
            .iter()
            .any(|(key, value)| key.is_empty() || key.contains('\0') || value.contains('\0'))
        {
            return Err(invalid_input(
                "environment keys must be non-empty and keys and values must not contain NUL bytes",
            ));
        }

        Ok(())
    }
}

impl Display for CommandSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitStatus {
    ExitCode(i32),
    Terminated,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == ExitStatus::ExitCode(0)
    }
}

/// Ability to run commands on one host. Implementations are registered per
/// host in the [`Context`](crate::context::Context) and shared by every task
/// that acts on that host, possibly from several threads at once.
pub trait Executor: Send + Sync {
    fn execute(
        &self,
        command: &CommandSpec,
        timeout: Option<Duration>,
    ) -> ExecutionResult<CommandOutput>;
}

pub fn execute_validated(
    executor: &dyn Executor,
    command: &CommandSpec,
    timeout: Option<Duration>,
) -> ExecutionResult<CommandOutput> {
    command.validate()?;
    if let Some(timeout) = timeout
        && timeout.is_zero()
    {
        return Err(invalid_input(
            "timeout must be greater than zero when provided",
        ));
    }
    executor.execute(command, timeout)
}

fn invalid_input(message: &str) -> CoreError {
    CoreError::new(CoreErrorKind::InvalidInput, message)
}
