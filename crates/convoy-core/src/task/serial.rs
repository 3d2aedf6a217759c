use std::fmt::{Display, Formatter};

use crate::context::Context;
use crate::events::ScopeId;
use crate::task::{Composite, Task, TaskResult, TaskRole, describe_children, dispatch};

/// Runs children one at a time in order, stopping at the first failure.
pub struct Serial {
    scope: ScopeId,
    hide_detail_display: bool,
    inner: Vec<Box<dyn Task>>,
}

impl Serial {
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
}

impl Default for Serial {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Task for Serial {
    fn execute(&self, ctx: &Context) -> TaskResult<()> {
        for task in &self.inner {
            dispatch(
                ctx,
                self.scope,
                task.as_ref(),
                Composite::Serial,
                self.hide_detail_display,
            )?;
        }
        Ok(())
    }

    fn rollback(&self, ctx: &Context) -> TaskResult<()> {
        for task in self.inner.iter().rev() {
            tracing::debug!(step = %task, "rolling back serial step");
            task.rollback(ctx)?;
        }
        Ok(())
    }

    fn role(&self) -> TaskRole {
        TaskRole::Structural
    }
}

impl Display for Serial {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        describe_children(f, &self.inner)
    }
}
