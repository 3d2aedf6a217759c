//! In-process progress notifications for dispatched tasks.
//!
//! Composites publish a [`TaskPhase::Begin`] event before running each direct
//! child and a [`TaskPhase::Finish`] event after it returns. Subscribers are
//! called synchronously on the publishing thread; with parallel composites that
//! means several threads may call the same subscriber at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, PoisonError, RwLock};

use crate::models::CoreError;
use crate::task::Task;

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(0);

/// Identity of a composite instance. Every child a composite dispatches is
/// published under the composite's scope, so a subscriber can pick out the
/// direct children of one composite even when sibling trees run the same
/// task types concurrently.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Allocates a scope no other composite in this process shares.
    pub fn next() -> Self {
        Self(NEXT_SCOPE.fetch_add(1, Ordering::Relaxed))
    }
}

/// Pairs the Begin and Finish events of one dispatch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct DispatchId(u64);

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TaskPhase {
    Begin,
    Finish(Option<CoreError>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskEvent {
    pub scope: ScopeId,
    pub dispatch: DispatchId,
    pub task: String,
    pub phase: TaskPhase,
}

impl TaskEvent {
    pub fn is_begin(&self) -> bool {
        self.phase == TaskPhase::Begin
    }

    pub fn error(&self) -> Option<&CoreError> {
        match &self.phase {
            TaskPhase::Finish(error) => error.as_ref(),
            TaskPhase::Begin => None,
        }
    }
}

pub trait TaskEventSubscriber: Send + Sync {
    fn on_event(&self, event: &TaskEvent);
}

impl<F> TaskEventSubscriber for F
where
    F: Fn(&TaskEvent) + Send + Sync,
{
    fn on_event(&self, event: &TaskEvent) {
        self(event)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusState>,
}

#[derive(Default)]
struct BusState {
    next_id: AtomicU64,
    next_dispatch: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionId, Arc<dyn TaskEventSubscriber>)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: impl TaskEventSubscriber + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let subscriber: Arc<dyn TaskEventSubscriber> = Arc::new(subscriber);
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, subscriber));
        tracing::debug!(subscription = id.0, "event subscriber registered");
        id
    }

    /// Subscribes a channel sender. Events are dropped silently once the
    /// receiver goes away; call [`EventBus::unsubscribe`] to stop delivery.
    pub fn subscribe_channel(&self) -> (SubscriptionId, Receiver<TaskEvent>) {
        let (sender, receiver) = mpsc::channel();
        let id = self.subscribe(move |event: &TaskEvent| {
            let _ = sender.send(event.clone());
        });
        (id, receiver)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        let removed = subscribers.len() != before;
        if removed {
            tracing::debug!(subscription = id.0, "event subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Announces that `task` is about to run as a direct child of `scope`.
    /// The returned id must be handed to the matching
    /// [`EventBus::publish_task_finish`].
    pub fn publish_task_begin(&self, scope: ScopeId, task: &dyn Task) -> DispatchId {
        let dispatch = DispatchId(self.inner.next_dispatch.fetch_add(1, Ordering::Relaxed));
        self.publish(TaskEvent {
            scope,
            dispatch,
            task: task.to_string(),
            phase: TaskPhase::Begin,
        });
        dispatch
    }

    pub fn publish_task_finish(
        &self,
        scope: ScopeId,
        dispatch: DispatchId,
        task: &dyn Task,
        error: Option<&CoreError>,
    ) {
        self.publish(TaskEvent {
            scope,
            dispatch,
            task: task.to_string(),
            phase: TaskPhase::Finish(error.cloned()),
        });
    }

    fn publish(&self, event: TaskEvent) {
        // Snapshot so subscribers run without the list lock held; a subscriber
        // may itself subscribe or unsubscribe.
        let subscribers: Vec<Arc<dyn TaskEventSubscriber>> = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, subscriber)| Arc::clone(subscriber))
            .collect();

        for subscriber in subscribers {
            subscriber.on_event(&event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
