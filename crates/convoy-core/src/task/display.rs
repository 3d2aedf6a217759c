use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

use crate::context::Context;
use crate::events::TaskEvent;
use crate::task::{Parallel, Serial, Task, TaskResult, TaskRole};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Failed(String),
}

#[derive(Debug)]
struct ProgressState {
    status: StepStatus,
    current: Option<String>,
}

/// Shared view of a [`StepDisplay`]'s progress, for renderers that poll.
#[derive(Clone, Debug)]
pub struct StepProgress {
    prefix: Arc<str>,
    state: Arc<Mutex<ProgressState>>,
}

impl StepProgress {
    fn new(prefix: &str) -> Self {
        Self {
            prefix: Arc::from(prefix),
            state: Arc::new(Mutex::new(ProgressState {
                status: StepStatus::Pending,
                current: None,
            })),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn status(&self) -> StepStatus {
        self.lock().status.clone()
    }

    /// Description of the child most recently started.
    pub fn current(&self) -> Option<String> {
        self.lock().current.clone()
    }

    fn set_status(&self, status: StepStatus) {
        self.lock().status = status;
    }

    fn set_current(&self, current: &str) {
        self.lock().current = Some(current.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs a serial group of steps under one progress line.
pub struct StepDisplay {
    inner: Serial,
    progress: StepProgress,
}

impl StepDisplay {
    pub fn new(prefix: impl AsRef<str>, inner: Serial) -> Self {
        Self {
            inner: inner.hide_detail_display(true),
            progress: StepProgress::new(prefix.as_ref()),
        }
    }

    pub fn prefix(&self) -> &str {
        self.progress.prefix()
    }

    pub fn progress(&self) -> StepProgress {
        self.progress.clone()
    }
}

impl Task for StepDisplay {
    fn execute(&self, ctx: &Context) -> TaskResult<()> {
        tracing::info!(step = self.prefix(), "+ {}", self.prefix());
        self.progress.set_status(StepStatus::Running);

        let scope = self.inner.scope();
        let progress = self.progress.clone();
        let subscription = ctx.events().subscribe(move |event: &TaskEvent| {
            if event.is_begin() && event.scope == scope {
                progress.set_current(&event.task);
            }
        });

        let result = self.inner.execute(ctx);
        ctx.events().unsubscribe(subscription);

        match &result {
            Ok(()) => {
                tracing::info!(step = self.prefix(), "  - {} ... Done", self.prefix());
                self.progress.set_status(StepStatus::Done);
            }
            Err(error) => {
                tracing::warn!(
                    step = self.prefix(),
                    kind = ?error.kind,
                    message = %error.message,
                    "  - {} ... Error",
                    self.prefix()
                );
                self.progress
                    .set_status(StepStatus::Failed(error.message.clone()));
            }
        }
        result
    }

    fn rollback(&self, ctx: &Context) -> TaskResult<()> {
        self.inner.rollback(ctx)
    }

    fn role(&self) -> TaskRole {
        TaskRole::Structural
    }
}

impl Display for StepDisplay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

/// Runs several [`StepDisplay`]s at once under a shared heading.
pub struct ParallelStepDisplay {
    prefix: String,
    progress: Vec<StepProgress>,
    inner: Parallel,
}

impl ParallelStepDisplay {
    pub fn new(prefix: impl Into<String>, steps: Vec<StepDisplay>) -> Self {
        let progress = steps.iter().map(StepDisplay::progress).collect();
        let inner = Parallel::new(
            steps
                .into_iter()
                .map(|step| Box::new(step) as Box<dyn Task>)
                .collect(),
        )
        .hide_detail_display(true);

        Self {
            prefix: prefix.into(),
            progress,
            inner,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn progress(&self) -> &[StepProgress] {
        &self.progress
    }
}

impl Task for ParallelStepDisplay {
    fn execute(&self, ctx: &Context) -> TaskResult<()> {
        tracing::info!(step = %self.prefix, "+ {}", self.prefix);
        let result = self.inner.execute(ctx);
        if let Err(error) = &result {
            tracing::warn!(
                step = %self.prefix,
                kind = ?error.kind,
                message = %error.message,
                "+ {} ... Error",
                self.prefix
            );
        }
        result
    }

    fn rollback(&self, ctx: &Context) -> TaskResult<()> {
        self.inner.rollback(ctx)
    }

    fn role(&self) -> TaskRole {
        TaskRole::Structural
    }
}

impl Display for ParallelStepDisplay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::{Display, Formatter};
    use std::thread;
    use std::time::Duration;

    use super::{ParallelStepDisplay, StepDisplay, StepStatus};
    use crate::context::Context;
    use crate::models::CoreError;
    use crate::task::{Serial, Task, TaskResult, TaskRole, is_structural};

    struct Step(&'static str, bool);

    impl Display for Step {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    impl Task for Step {
        fn execute(&self, _ctx: &Context) -> TaskResult<()> {
            if self.1 {
                Err(CoreError::step_failure(format!("{} failed", self.0)))
            } else {
                Ok(())
            }
        }

        fn rollback(&self, _ctx: &Context) -> TaskResult<()> {
            Ok(())
        }
    }

    fn step(prefix: &str, children: Vec<Step>) -> StepDisplay {
        StepDisplay::new(
            prefix,
            Serial::new(
                children
                    .into_iter()
                    .map(|child| Box::new(child) as Box<dyn Task>)
                    .collect(),
            ),
        )
    }

    #[test]
    fn tracks_current_child_and_completion() {
        let ctx = Context::new();
        let display = step("Copy files", vec![Step("mkdir", false), Step("scp", false)]);
        let progress = display.progress();
        assert_eq!(progress.status(), StepStatus::Pending);

        display.execute(&ctx).expect("step should succeed");

        assert_eq!(progress.status(), StepStatus::Done);
        assert_eq!(progress.current().as_deref(), Some("scp"));
        assert_eq!(ctx.events().subscriber_count(), 0);
    }

    #[test]
    fn failure_is_recorded_and_subscription_released() {
        let ctx = Context::new();
        let display = step("Start node", vec![Step("start", true), Step("check", false)]);

        let error = display.execute(&ctx).unwrap_err();

        assert_eq!(error.message, "start failed");
        assert_eq!(
            display.progress().status(),
            StepStatus::Failed("start failed".to_string())
        );
        assert_eq!(display.progress().current().as_deref(), Some("start"));
        assert_eq!(ctx.events().subscriber_count(), 0);
    }

    #[test]
    fn concurrent_steps_only_track_their_own_children() {
        let ctx = Context::new();
        let group = ParallelStepDisplay::new(
            "Deploy",
            vec![
                step("host a", vec![Step("a-1", false), Step("a-2", false)]),
                step("host b", vec![Step("b-1", false)]),
            ],
        );

        group.execute(&ctx).expect("group should succeed");

        let progress = group.progress();
        assert_eq!(progress.len(), 2);
        assert_eq!(progress[0].current().as_deref(), Some("a-2"));
        assert_eq!(progress[1].current().as_deref(), Some("b-1"));
        assert!(progress.iter().all(|p| p.status() == StepStatus::Done));
    }

    struct SlowA;
    struct QuickB;

    impl Display for SlowA {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            f.write_str("slow-a")
        }
    }

    impl Display for QuickB {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            f.write_str("quick-b")
        }
    }

    impl Task for SlowA {
        fn execute(&self, _ctx: &Context) -> TaskResult<()> {
            thread::sleep(Duration::from_millis(100));
            Ok(())
        }

        fn rollback(&self, _ctx: &Context) -> TaskResult<()> {
            Ok(())
        }
    }

    impl Task for QuickB {
        fn execute(&self, _ctx: &Context) -> TaskResult<()> {
            thread::sleep(Duration::from_millis(200));
            Ok(())
        }

        fn rollback(&self, _ctx: &Context) -> TaskResult<()> {
            Ok(())
        }
    }

    #[test]
    fn zero_sized_children_stay_with_their_own_step() {
        // Boxed unit structs share one address, so tracking must not rely on it.
        let ctx = Context::new();
        let group = ParallelStepDisplay::new(
            "Start",
            vec![
                StepDisplay::new("a", Serial::new(vec![Box::new(SlowA)])),
                StepDisplay::new("b", Serial::new(vec![Box::new(QuickB)])),
            ],
        );

        group.execute(&ctx).expect("group should succeed");

        let progress = group.progress();
        assert_eq!(progress[0].current().as_deref(), Some("slow-a"));
        assert_eq!(progress[1].current().as_deref(), Some("quick-b"));
    }

    #[test]
    fn wrappers_are_structural_and_describe_their_children() {
        let display = step("Init", vec![Step("one", false), Step("two", false)]);
        assert!(is_structural(&display));
        assert_eq!(display.to_string(), "one\ntwo");
        assert_eq!(display.prefix(), "Init");

        let group = ParallelStepDisplay::new("All", vec![display]);
        assert_eq!(group.role(), TaskRole::Structural);
        assert_eq!(group.to_string(), "one\ntwo");
    }
}
