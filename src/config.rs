//! Runtime configuration for a [`Scheduler`](crate::Scheduler).
//!
//! The configuration derives `Deserialize` with field defaults, so a host can
//! load it from whatever format it already uses for its settings and only
//! specify the fields it cares about.

use std::thread;

use serde::{Deserialize, Serialize};

/// What happens when a job panics during one of its invocations.
///
/// In both cases the task is removed from the scheduler, the panic is logged and
/// [`Task::exit_status`](crate::Task::exit_status) reports
/// [`TaskExit::Panicked`](crate::TaskExit::Panicked). The executor thread that
/// ran the job is never unwound, so other tasks keep running whatever the
/// policy and whatever the executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanicPolicy {
    /// Log the panic and terminate only the failing task.
    #[default]
    Terminate,

    /// Terminate the task, then resume the panic in callers of
    /// [`Task::wait`](crate::Task::wait).
    Propagate,
}

/// Settings used when building a [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of worker threads of the built-in executor. Ignored when a custom
    /// spawner is supplied.
    pub pool_size: usize,

    /// Prefix for the names of the executor and timer threads.
    pub thread_name_prefix: String,

    /// Failure policy applied to panicking jobs.
    pub on_panic: PanicPolicy,
}

impl SchedulerConfig {
    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn on_panic(mut self, policy: PanicPolicy) -> Self {
        self.on_panic = policy;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let pool_size = thread::available_parallelism().map_or(4, |n| n.get());
        Self {
            pool_size,
            thread_name_prefix: "tickwork-".to_string(),
            on_panic: PanicPolicy::default(),
        }
    }
}
