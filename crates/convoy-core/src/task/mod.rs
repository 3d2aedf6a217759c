//! Units of work and the composites that schedule them.
//!
//! A [`Task`] executes against a shared [`Context`], can be rolled back
//! against it, and describes itself through [`Display`]. [`Serial`] and
//! [`Parallel`] build trees out of tasks; [`StepDisplay`] and
//! [`ParallelStepDisplay`] wrap trees with progress reporting.

pub mod builder;
pub mod display;
pub mod leaf;
pub mod parallel;
pub mod serial;

use std::fmt::Display;

use crate::context::Context;
use crate::events::ScopeId;
use crate::models::CoreResult;

pub use builder::Builder;
pub use display::{ParallelStepDisplay, StepDisplay, StepProgress, StepStatus};
pub use leaf::{Func, RegisterExecutor, Shell};
pub use parallel::Parallel;
pub use serial::Serial;

pub type TaskResult<T> = CoreResult<T>;

/// Whether a task is real work or only arranges other tasks.
///
/// Composites print an "about to run" line for leaf children only; structural
/// children announce their own children instead.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TaskRole {
    Leaf,
    Structural,
}

pub trait Task: Display + Send + Sync {
    fn execute(&self, ctx: &Context) -> TaskResult<()>;

    /// Undoes the effects of [`Task::execute`]. Must succeed without doing
    /// anything when there is nothing to undo, including when `execute` was
    /// never called.
    fn rollback(&self, ctx: &Context) -> TaskResult<()>;

    /// New structural wrappers must override this; leaves keep the default.
    fn role(&self) -> TaskRole {
        TaskRole::Leaf
    }
}

pub fn is_structural(task: &dyn Task) -> bool {
    task.role() == TaskRole::Structural
}

/// The composite kinds that dispatch children.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Composite {
    Serial,
    Parallel,
}

impl Composite {
    fn name(self) -> &'static str {
        match self {
            Self::Serial => "Serial",
            Self::Parallel => "Parallel",
        }
    }

    /// Bracketed label for announcement lines; both labels are ten columns
    /// wide so serial and parallel lines align.
    fn label(self) -> &'static str {
        match self {
            Self::Serial => "[ Serial ]",
            Self::Parallel => "[Parallel]",
        }
    }
}

/// Runs one child on behalf of a composite: optional announcement, Begin
/// event, execute, Finish event.
pub(crate) fn dispatch(
    ctx: &Context,
    scope: ScopeId,
    child: &dyn Task,
    composite: Composite,
    hide_detail: bool,
) -> TaskResult<()> {
    if !is_structural(child) && !hide_detail {
        tracing::info!(
            composite = composite.name(),
            step = %child,
            "+ {} - {child}",
            composite.label()
        );
    }

    let dispatched = ctx.events().publish_task_begin(scope, child);
    let result = child.execute(ctx);
    ctx.events()
        .publish_task_finish(scope, dispatched, child, result.as_ref().err());
    result
}

pub(crate) fn describe_children(
    f: &mut std::fmt::Formatter<'_>,
    children: &[Box<dyn Task>],
) -> std::fmt::Result {
    for (index, child) in children.iter().enumerate() {
        if index > 0 {
            f.write_str("\n")?;
        }
        write!(f, "{child}")?;
    }
    Ok(())
}
