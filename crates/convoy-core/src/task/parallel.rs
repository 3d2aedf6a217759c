use std::fmt::{Display, Formatter};
use std::sync::{Mutex, PoisonError};
use std::thread;

use crate::context::Context;
use crate::events::ScopeId;
use crate::models::{CoreError, CoreErrorKind};
use crate::task::{Composite, Task, TaskResult, TaskRole, describe_children, dispatch};

/// Runs every child on its own thread against the same context.
///
/// A failing child does not stop its siblings. After all children return,
/// the error of the lowest-indexed failing child is reported and any other
/// errors are dropped. Children must not depend on one another; nest a
/// [`Serial`](crate::task::Serial) for ordered work.
pub struct Parallel {
    scope: ScopeId,
    hide_detail_display: bool,
    inner: Vec<Box<dyn Task>>,
}

impl Parallel {
    pub fn new(inner: Vec<Box<dyn Task>>) -> Self {
        Self {
            scope: ScopeId::next(),
            hide_detail_display: false,
            inner,
        }
    }

    /// Scope under which this composite publishes its children's events.
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn hide_detail_display(mut self, hide: bool) -> Self {
        self.hide_detail_display = hide;
        self
    }

    pub fn push(&mut self, task: impl Task + 'static) {
        self.inner.push(Box::new(task));
    }

    pub fn children(&self) -> impl Iterator<Item = &dyn Task> {
        self.inner.iter().map(|task| task.as_ref())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn fan_out(
        &self,
        operation: &'static str,
        run: impl Fn(&dyn Task) -> TaskResult<()> + Sync,
    ) -> TaskResult<()> {
        let first_error = FirstError::default();

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.inner.len());
            for (index, task) in self.inner.iter().enumerate() {
                let task = task.as_ref();
                let run = &run;
                let first_error = &first_error;
                let spawned = thread::Builder::new()
                    .name(format!("convoy-{operation}-{index}"))
                    .spawn_scoped(scope, move || {
                        if let Err(error) = run(task) {
                            first_error.record(index, error);
                        }
                    });

                match spawned {
                    Ok(handle) => handles.push((index, handle)),
                    Err(error) => first_error.record(
                        index,
                        internal(format!("failed to spawn {operation} thread: {error}")),
                    ),
                }
            }

            for (index, handle) in handles {
                if handle.join().is_err() {
                    first_error.record(
                        index,
                        internal(format!("parallel step {index} panicked during {operation}")),
                    );
                }
            }
        });

        tracing::debug!(children = self.inner.len(), operation, "parallel fan-in complete");
        first_error.into_result()
    }
}

impl Default for Parallel {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Task for Parallel {
    fn execute(&self, ctx: &Context) -> TaskResult<()> {
        let (scope, hide) = (self.scope, self.hide_detail_display);
        self.fan_out("execute", |task| {
            dispatch(ctx, scope, task, Composite::Parallel, hide)
        })
    }

    fn rollback(&self, ctx: &Context) -> TaskResult<()> {
        self.fan_out("rollback", |task| task.rollback(ctx))
    }

    fn role(&self) -> TaskRole {
        TaskRole::Structural
    }
}

impl Display for Parallel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        describe_children(f, &self.inner)
    }
}

/// Keeps the error of the lowest child index seen so far.
#[derive(Default)]
struct FirstError {
    slot: Mutex<Option<(usize, CoreError)>>,
}

impl FirstError {
    fn record(&self, index: usize, error: CoreError) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some((existing, _)) if *existing <= index => {
                tracing::debug!(index, error = %error, "dropping later parallel error");
            }
            _ => *slot = Some((index, error)),
        }
    }

    fn into_result(self) -> TaskResult<()> {
        match self.slot.into_inner().unwrap_or_else(PoisonError::into_inner) {
            Some((_, error)) => Err(error),
            None => Ok(()),
        }
    }
}

fn internal(message: String) -> CoreError {
    CoreError::new(CoreErrorKind::Internal, message)
}
