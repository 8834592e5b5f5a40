//! In-process periodic task scheduling.
//!
//! `tickwork` runs recurring jobs inside a single process: health checks,
//! polling, periodic reporting and the like. A task is registered with a start
//! time, an optional lifetime and a repeat interval; the scheduler runs it once
//! at the start time and then on every tick of the interval until the lifetime
//! elapses or the task is stopped.
//!
//! The crate is executor agnostic. Task loops run on a built-in thread pool by
//! default, or on any executor implementing `futures::task::Spawn`.
//!
//! Features include:
//! - A [`Scheduler`] that registers, finds and stops live tasks
//! - A [`Task`] handle with a per-task [`Context`] that persists across runs
//! - [`Job`]s as plain closures, synchronous or asynchronous
//! - One-shot [`Cancellation`] signals and executor agnostic [`timing`] primitives

pub mod cancellation;
pub mod config;
pub mod context;
pub mod error;
pub mod job;
mod periodic;
pub mod scheduler;
pub mod task;
pub mod timing;

pub use cancellation::Cancellation;
pub use config::{PanicPolicy, SchedulerConfig};
pub use context::Context;
pub use error::{Result, SchedulerError};
pub use job::Job;
pub use scheduler::Scheduler;
pub use task::{Task, TaskBuilder, TaskExit, TaskId, TaskInfo};
