use std::sync::Arc;

use crate::context::Context;
use crate::execution::{CommandSpec, Executor};
use crate::task::{Func, Parallel, RegisterExecutor, Serial, Shell, StepDisplay, Task, TaskResult};

/// Fluent assembly of a serial task list.
///
/// ```
/// use convoy_core::task::{Builder, Task};
/// use convoy_core::context::Context;
///
/// let tree = Builder::new()
///     .func("prepare", |_| Ok(()))
///     .parallel(vec![
///         Builder::new().func("node a", |_| Ok(())).boxed(),
///         Builder::new().func("node b", |_| Ok(())).boxed(),
///     ])
///     .build();
/// tree.execute(&Context::new()).unwrap();
/// ```
#[derive(Default)]
pub struct Builder {
    entries: Vec<Entry>,
    hide_detail_display: bool,
}

/// Nested groups stay unassembled until [`Builder::build`] so they pick up
/// the final hide-detail setting regardless of call order.
enum Entry {
    Task(Box<dyn Task>),
    Serial(Vec<Box<dyn Task>>),
    Parallel(Vec<Box<dyn Task>>),
}

impl Entry {
    fn assemble(self, hide: bool) -> Box<dyn Task> {
        match self {
            Self::Task(task) => task,
            Self::Serial(tasks) => Box::new(Serial::new(tasks).hide_detail_display(hide)),
            Self::Parallel(tasks) => Box::new(Parallel::new(tasks).hide_detail_display(hide)),
        }
    }
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(mut self, task: impl Task + 'static) -> Self {
        self.entries.push(Entry::Task(Box::new(task)));
        self
    }

    pub fn func(
        self,
        name: impl Into<String>,
        execute: impl Fn(&Context) -> TaskResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.task(Func::new(name, execute))
    }

    pub fn register_executor(self, host: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        self.task(RegisterExecutor::new(host, executor))
    }

    pub fn shell(self, host: impl Into<String>, command: CommandSpec) -> Self {
        self.task(Shell::new(host, command))
    }

    pub fn serial(mut self, tasks: Vec<Box<dyn Task>>) -> Self {
        self.entries.push(Entry::Serial(tasks));
        self
    }

    pub fn parallel(mut self, tasks: Vec<Box<dyn Task>>) -> Self {
        self.entries.push(Entry::Parallel(tasks));
        self
    }

    /// Suppresses "about to run" lines for tasks scheduled by the built tree
    /// and by groups added through [`Builder::serial`] and
    /// [`Builder::parallel`], wherever in the chain it is called.
    pub fn hide_detail(mut self, hide: bool) -> Self {
        self.hide_detail_display = hide;
        self
    }

    pub fn build(self) -> Serial {
        let hide = self.hide_detail_display;
        let tasks = self
            .entries
            .into_iter()
            .map(|entry| entry.assemble(hide))
            .collect();
        Serial::new(tasks).hide_detail_display(hide)
    }

    pub fn build_step(self, prefix: impl AsRef<str>) -> StepDisplay {
        StepDisplay::new(prefix, self.build())
    }

    pub fn boxed(self) -> Box<dyn Task> {
        Box::new(self.build())
    }
}
