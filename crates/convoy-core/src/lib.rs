//! Task execution core for multi-host cluster operations.
//!
//! Operations are trees of [`task::Task`]s: leaves do the work, [`task::Serial`]
//! and [`task::Parallel`] arrange them. One [`context::Context`] is shared by
//! the whole tree and progress is published on its [`events::EventBus`].

pub mod context;
pub mod events;
pub mod execution;
pub mod logging;
pub mod models;
pub mod task;
