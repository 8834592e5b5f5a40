//! Provides the `Scheduler` for running tasks periodically.
//!
//! The scheduler keeps a registry of live tasks and drives one execution loop
//! per task on an executor. By default the loops run on a `futures` thread
//! pool owned by the scheduler, but any executor implementing
//! [`Spawn`](futures::task::Spawn) can be used instead.
//!
//! All registry accesses, whether from callers or from terminating loops, go
//! through a single mutex, and no lock is held while a loop waits for time to
//! pass or for a job to finish.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures::{
    executor::ThreadPoolBuilder,
    task::{FutureObj, Spawn},
};
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    SchedulerConfig, SchedulerError, Task, TaskBuilder, TaskId,
    error::Result,
    job::Job,
    periodic::{ExecutionLoop, Schedule},
    timing::Timer,
};

/// Shared collection of live tasks, in registration order.
#[derive(Clone, Default)]
pub(crate) struct Registry {
    tasks: Arc<Mutex<Vec<Task>>>,
}

impl Registry {
    fn insert(&self, task: Task) -> Result<()> {
        let mut tasks = self.tasks.lock();
        if tasks.iter().any(|t| t.id() == task.id()) {
            return Err(SchedulerError::DuplicateId {
                id: task.id().clone(),
            });
        }
        tasks.push(task);
        Ok(())
    }

    /// Removes `task`, returning `false` if it was not registered.
    pub(crate) fn remove(&self, task: &Task) -> bool {
        let mut tasks = self.tasks.lock();
        match tasks.iter().position(|t| t.same(task)) {
            Some(index) => {
                tasks.remove(index);
                true
            }
            None => false,
        }
    }

    fn find(&self, predicate: impl Fn(&Task) -> bool) -> Option<Task> {
        self.tasks.lock().iter().find(|t| predicate(t)).cloned()
    }

    fn snapshot(&self) -> Vec<Task> {
        self.tasks.lock().clone()
    }

    fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    fn drain(&self) -> Vec<Task> {
        std::mem::take(&mut *self.tasks.lock())
    }
}

/// Runs tasks periodically and keeps track of the live ones.
///
/// All methods take `&self`; share a scheduler between threads by wrapping it
/// in an `Arc`. Dropping the scheduler stops every live task.
///
/// # Example
/// ```
/// # use std::time::Duration;
/// # use tickwork::{Scheduler, job};
/// let scheduler = Scheduler::new();
/// let task = scheduler
///     .schedule_task(
///         "heartbeat",
///         None,
///         Some(Duration::from_millis(30)),
///         Duration::from_millis(10),
///         job::from_fn(|task| println!("{} is alive", task.name())),
///     )
///     .unwrap();
///
/// futures::executor::block_on(task.wait());
/// assert!(scheduler.find_task_by_id(task.id()).is_none());
/// ```
pub struct Scheduler {
    registry: Registry,
    spawner: Box<dyn Spawn + Send + Sync>,
    timer: Timer,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Creates a scheduler with the default configuration.
    ///
    /// # Panics
    /// Panics if the worker or timer threads cannot be started. Use
    /// [`Scheduler::with_config`] to handle that error instead.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default()).expect("Scheduler runtime creation failed")
    }

    /// Creates a scheduler that runs task loops on its own thread pool.
    pub fn with_config(config: SchedulerConfig) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .pool_size(config.pool_size.max(1))
            .name_prefix(config.thread_name_prefix.clone())
            .create()?;
        Self::with_spawner(pool, config)
    }

    /// Creates a scheduler that runs task loops on `spawner`.
    ///
    /// The loops only need a `Waker`-driven executor, they do not depend on any
    /// particular runtime.
    pub fn with_spawner(
        spawner: impl Spawn + Send + Sync + 'static,
        config: SchedulerConfig,
    ) -> Result<Self> {
        let timer = Timer::new(format!("{}timer", config.thread_name_prefix))?;
        Ok(Self {
            registry: Registry::default(),
            spawner: Box::new(spawner),
            timer,
            config,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Builds the task described by `builder`, registers it and starts its
    /// execution loop.
    ///
    /// Returns as soon as the loop is spawned; the first run happens
    /// asynchronously once the start time is reached.
    ///
    /// Fails with [`SchedulerError::InvalidConfiguration`] if the interval is
    /// zero and with [`SchedulerError::DuplicateId`] if a live task already has
    /// the requested id.
    pub fn schedule(&self, builder: TaskBuilder, job: impl Job) -> Result<Task> {
        let task = builder.build()?;
        task.set_panic_policy(self.config.on_panic);
        let schedule = Schedule::resolve(&task);
        self.registry.insert(task.clone())?;

        let execution = ExecutionLoop::new(
            task.clone(),
            job,
            schedule,
            self.timer.clone(),
            self.registry.clone(),
        );
        if let Err(e) = self
            .spawner
            .spawn_obj(FutureObj::new(Box::new(execution.run())))
        {
            self.registry.remove(&task);
            return Err(e.into());
        }

        debug!(
            id = %task.id(),
            name = task.name(),
            start = %task.start(),
            duration = ?task.duration(),
            interval = ?task.interval(),
            "task scheduled"
        );
        Ok(task)
    }

    /// Schedules `job` to run every `interval`, starting at `start` (now if
    /// `None`) and living for `duration` (until stopped if `None`).
    ///
    /// Arguments for the job are bound by capturing them in the closure.
    pub fn schedule_task(
        &self,
        name: impl Into<String>,
        start: Option<DateTime<Utc>>,
        duration: Option<Duration>,
        interval: Duration,
        job: impl Job,
    ) -> Result<Task> {
        let mut builder = Task::builder(name, interval);
        if let Some(start) = start {
            builder = builder.start(start);
        }
        if let Some(duration) = duration {
            builder = builder.duration(duration);
        }
        self.schedule(builder, job)
    }

    /// Returns the live task with the given id.
    pub fn find_task_by_id(&self, id: &TaskId) -> Option<Task> {
        self.registry.find(|t| t.id() == id)
    }

    /// Returns the first live task, in registration order, with the given name.
    pub fn find_task_by_name(&self, name: &str) -> Option<Task> {
        self.registry.find(|t| t.name() == name)
    }

    /// Snapshot of the live tasks in registration order.
    pub fn tasks(&self) -> Vec<Task> {
        self.registry.snapshot()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops a live task.
    ///
    /// The task is removed from the scheduler before this returns and its loop
    /// terminates at its next suspension point, dropping any job invocation in
    /// progress. Fails with [`SchedulerError::NotFound`] if the task is not
    /// live, for instance because it was already stopped or has expired.
    pub fn stop_task(&self, task: &Task) -> Result<()> {
        if !self.registry.remove(task) {
            debug!(id = %task.id(), "stop requested for a task that is not live");
            return Err(SchedulerError::NotFound {
                id: task.id().clone(),
            });
        }
        task.cancellation().cancel();
        debug!(id = %task.id(), name = task.name(), "task stopped");
        Ok(())
    }

    /// Stops the live task with the given id.
    pub fn stop_task_by_id(&self, id: &TaskId) -> Result<()> {
        match self.find_task_by_id(id) {
            Some(task) => self.stop_task(&task),
            None => Err(SchedulerError::NotFound { id: id.clone() }),
        }
    }

    /// Stops every live task.
    pub fn shutdown(&self) {
        let tasks = self.registry.drain();
        if !tasks.is_empty() {
            debug!(count = tasks.len(), "stopping all tasks");
        }
        for task in tasks {
            task.cancellation().cancel();
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
        self.timer.shutdown();
    }
}
