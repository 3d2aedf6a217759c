use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::context::Context;
use crate::execution::{CommandSpec, Executor, execute_validated};
use crate::models::CoreError;
use crate::task::{Task, TaskResult};

type Action = Box<dyn Fn(&Context) -> TaskResult<()> + Send + Sync>;

/// Leaf backed by closures.
///
/// Rollback only acts after a successful execute that has not been undone
/// yet; otherwise it is a no-op. An applied step without a rollback closure
/// undoes as a no-op unless it was marked [`Func::irreversible`].
pub struct Func {
    name: String,
    execute: Action,
    rollback: Option<Action>,
    irreversible: bool,
    applied: AtomicBool,
}

impl Func {
    pub fn new(
        name: impl Into<String>,
        execute: impl Fn(&Context) -> TaskResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            execute: Box::new(execute),
            rollback: None,
            irreversible: false,
            applied: AtomicBool::new(false),
        }
    }

    pub fn with_rollback(
        mut self,
        rollback: impl Fn(&Context) -> TaskResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.rollback = Some(Box::new(rollback));
        self
    }

    pub fn irreversible(mut self) -> Self {
        self.irreversible = true;
        self
    }
}

impl Task for Func {
    fn execute(&self, ctx: &Context) -> TaskResult<()> {
        (self.execute)(ctx)?;
        self.applied.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self, ctx: &Context) -> TaskResult<()> {
        if !self.applied.load(Ordering::SeqCst) {
            return Ok(());
        }

        match &self.rollback {
            Some(rollback) => rollback(ctx)?,
            None if self.irreversible => {
                return Err(CoreError::unsupported_rollback(&self.name));
            }
            None => {}
        }
        self.applied.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Display for Func {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Func: {}", self.name)
    }
}

/// Makes `host` reachable for later steps. Usually the first step per host.
pub struct RegisterExecutor {
    host: String,
    executor: Arc<dyn Executor>,
}

impl RegisterExecutor {
    pub fn new(host: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        Self {
            host: host.into(),
            executor,
        }
    }
}

impl Task for RegisterExecutor {
    fn execute(&self, ctx: &Context) -> TaskResult<()> {
        ctx.set_executor(self.host.clone(), Arc::clone(&self.executor));
        Ok(())
    }

    fn rollback(&self, _ctx: &Context) -> TaskResult<()> {
        Ok(())
    }
}

impl Display for RegisterExecutor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RegisterExecutor: host={}", self.host)
    }
}

/// Runs a command on a host through its registered executor and keeps the
/// captured output in the context. A command that ran successfully cannot be
/// undone.
pub struct Shell {
    host: String,
    command: CommandSpec,
    timeout: Option<Duration>,
    applied: AtomicBool,
}

impl Shell {
    pub fn new(host: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            host: host.into(),
            command,
            timeout: None,
            applied: AtomicBool::new(false),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Task for Shell {
    fn execute(&self, ctx: &Context) -> TaskResult<()> {
        let executor = ctx.executor(&self.host)?;
        let output = execute_validated(executor.as_ref(), &self.command, self.timeout)
            .map_err(|error| error.with_host(&self.host).with_task(self.to_string()))?;

        let success = output.success();
        let status = output.status;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        ctx.set_outputs(self.host.clone(), output.stdout, output.stderr);

        if !success {
            return Err(CoreError::step_failure(format!(
                "'{}' exited with {status:?}: {stderr}",
                self.command
            ))
            .with_host(&self.host)
            .with_task(self.to_string()));
        }

        self.applied.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self, _ctx: &Context) -> TaskResult<()> {
        if !self.applied.load(Ordering::SeqCst) {
            return Ok(());
        }
        Err(CoreError::unsupported_rollback(self.to_string()).with_host(&self.host))
    }
}

impl Display for Shell {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Shell: host={}, command={}", self.host, self.command)
    }
}
