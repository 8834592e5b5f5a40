//! Defines the `Task` handle and related types.
//!
//! A `Task` describes one unit of recurring work: its identity, when it starts,
//! how long it lives and how often it runs. It also carries a cancellation
//! signal and a private [`Context`] that keeps state between executions.
//!
//! Tasks are normally created by [`Scheduler::schedule`](crate::Scheduler::schedule),
//! which also starts their execution loop. A task built directly with
//! [`TaskBuilder`] is inert until it is handed to a scheduler.
use std::{
    fmt, panic,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures::{
    FutureExt,
    channel::oneshot,
    future::Shared,
};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    Cancellation, Context, PanicPolicy, SchedulerError, context::ContextValue, error::Result,
};

/// Identifier of a task, unique among the tasks of a process unless a caller
/// supplies its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<Uuid> for TaskId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

/// How the execution loop of a task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskExit {
    /// The task lived for its whole duration.
    Expired,

    /// The task was stopped through its cancellation signal.
    Stopped,

    /// An invocation of the job panicked, carrying the panic message.
    Panicked(String),
}

/// Serializable snapshot of the descriptive fields of a [`Task`].
///
/// Durations serialize as `{ "secs": .., "nanos": .. }`, the start as an
/// RFC 3339 timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
    pub start: DateTime<Utc>,
    pub duration: Option<Duration>,
    pub interval: Duration,
}

type ExitReceiver = Shared<oneshot::Receiver<TaskExit>>;

struct Inner {
    id: TaskId,
    name: String,
    start: DateTime<Utc>,
    // Set when the caller picked the start time instead of taking "now".
    explicit_start: bool,
    duration: Option<Duration>,
    interval: Duration,
    cancellation: Cancellation,
    context: Mutex<Context>,
    exit: Mutex<Option<TaskExit>>,
    exit_tx: Mutex<Option<oneshot::Sender<TaskExit>>>,
    exit_rx: ExitReceiver,
    propagate_panics: AtomicBool,
}

/// Handle to a task.
///
/// Handles are cheap to clone and all clones refer to the same task. Two
/// handles compare equal only if they refer to the same task.
#[derive(Clone)]
pub struct Task {
    inner: Arc<Inner>,
}

impl Task {
    /// Starts building a task that runs every `interval`.
    pub fn builder(name: impl Into<String>, interval: Duration) -> TaskBuilder {
        TaskBuilder {
            id: None,
            name: name.into(),
            start: None,
            duration: None,
            interval,
            cancellation: None,
            context: None,
        }
    }

    /// Creates a task with a generated id, starting now, living until stopped.
    ///
    /// Fails with [`SchedulerError::InvalidConfiguration`] if `interval` is zero.
    pub fn new(name: impl Into<String>, interval: Duration) -> Result<Self> {
        Self::builder(name, interval).build()
    }

    pub fn id(&self) -> &TaskId {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Time after which the first execution may happen. Defaults to the time
    /// the task was built.
    pub fn start(&self) -> DateTime<Utc> {
        self.inner.start
    }

    /// Total lifetime measured from [`start`](Task::start), `None` if the task
    /// lives until stopped.
    pub fn duration(&self) -> Option<Duration> {
        self.inner.duration
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Last instant at which an execution may begin, if the task has a duration.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        let duration = chrono::Duration::from_std(self.inner.duration?).ok()?;
        self.inner.start.checked_add_signed(duration)
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.inner.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancellation.is_cancelled()
    }

    /// Returns a clone of the context value under `key`.
    ///
    /// Returns `None` if the key is absent or holds a value of another type.
    pub fn get_context<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.inner.context.lock().get::<T>(key).cloned()
    }

    /// Inserts or overwrites the context value under `key`.
    pub fn set_context<T: ContextValue>(&self, key: impl Into<String>, value: T) {
        self.inner.context.lock().insert(key, value);
    }

    /// Removes the context value under `key`. Does nothing if it is absent.
    pub fn remove_context(&self, key: &str) {
        self.inner.context.lock().remove(key);
    }

    pub fn contains_context(&self, key: &str) -> bool {
        self.inner.context.lock().contains_key(key)
    }

    /// Gives exclusive access to the whole context for read-modify-write updates.
    ///
    /// The context stays locked while `f` runs, so `f` must not call other
    /// context methods of this task.
    ///
    /// # Example
    /// ```
    /// # use std::time::Duration;
    /// # use tickwork::Task;
    /// let task = Task::new("counter", Duration::from_secs(1)).unwrap();
    /// let next = task.with_context(|ctx| {
    ///     let counter = ctx.get_mut::<u64>("counter");
    ///     match counter {
    ///         Some(counter) => {
    ///             *counter += 1;
    ///             *counter
    ///         }
    ///         None => {
    ///             ctx.insert("counter", 0u64);
    ///             0
    ///         }
    ///     }
    /// });
    /// assert_eq!(next, 0);
    /// ```
    pub fn with_context<R>(&self, f: impl FnOnce(&mut Context) -> R) -> R {
        f(&mut self.inner.context.lock())
    }

    /// Returns the identity and timing of the task, ready to be serialized.
    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.inner.id.clone(),
            name: self.inner.name.clone(),
            start: self.inner.start,
            duration: self.inner.duration,
            interval: self.inner.interval,
        }
    }

    /// Human readable summary of the task, meant for diagnostics.
    pub fn describe(&self) -> String {
        self.to_string()
    }

    /// Waits until the execution loop of this task terminates.
    ///
    /// Never completes for a task that was built but not scheduled.
    ///
    /// # Panics
    /// If the task was scheduled with [`PanicPolicy::Propagate`] and its job
    /// panicked, the panic is resumed in every caller of `wait`, carrying the
    /// panic message as a `String` payload.
    pub async fn wait(&self) -> TaskExit {
        let exit = self
            .inner
            .exit_rx
            .clone()
            .await
            .unwrap_or(TaskExit::Stopped);
        match exit {
            TaskExit::Panicked(message) if self.inner.propagate_panics.load(Ordering::Acquire) => {
                panic::resume_unwind(Box::new(message))
            }
            exit => exit,
        }
    }

    /// Returns how the task ended, or `None` if it is still live or never ran.
    pub fn exit_status(&self) -> Option<TaskExit> {
        self.inner.exit.lock().clone()
    }

    /// Records how the loop ended and wakes waiters. Only the first call counts.
    pub(crate) fn finish(&self, exit: TaskExit) {
        let mut status = self.inner.exit.lock();
        if status.is_some() {
            return;
        }
        *status = Some(exit.clone());
        drop(status);
        if let Some(tx) = self.inner.exit_tx.lock().take() {
            let _ = tx.send(exit);
        }
    }

    pub(crate) fn set_panic_policy(&self, policy: PanicPolicy) {
        self.inner
            .propagate_panics
            .store(policy == PanicPolicy::Propagate, Ordering::Release);
    }

    pub(crate) fn has_explicit_start(&self) -> bool {
        self.inner.explicit_start
    }

    pub(crate) fn same(&self, other: &Task) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for Task {}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ID: {}", self.inner.id)?;
        writeln!(f, "Name: {}", self.inner.name)?;
        writeln!(f, "Start: {}", self.inner.start)?;
        match self.inner.duration {
            Some(duration) => writeln!(f, "Duration: {duration:?}")?,
            None => writeln!(f, "Duration: none")?,
        }
        writeln!(f, "Interval: {:?}", self.inner.interval)?;
        let context = self.inner.context.lock();
        write!(f, "Context: {:?}", *context)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("start", &self.inner.start)
            .field("duration", &self.inner.duration)
            .field("interval", &self.inner.interval)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Task`], obtained from [`Task::builder`].
///
/// Every optional field falls back to a default: a generated id, the current
/// time as start, no duration, a fresh cancellation signal and an empty context.
#[must_use]
pub struct TaskBuilder {
    id: Option<TaskId>,
    name: String,
    start: Option<DateTime<Utc>>,
    duration: Option<Duration>,
    interval: Duration,
    cancellation: Option<Cancellation>,
    context: Option<Context>,
}

impl TaskBuilder {
    pub fn id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Time after which the first execution may happen. A time in the past
    /// makes the first execution happen right away.
    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Total lifetime of the task, measured from its start.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Initial context, visible to the first execution.
    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Builds the task.
    ///
    /// Fails with [`SchedulerError::InvalidConfiguration`] if the interval is zero.
    pub fn build(self) -> Result<Task> {
        if self.interval.is_zero() {
            return Err(SchedulerError::InvalidConfiguration(format!(
                "interval of task '{}' must be greater than zero",
                self.name
            )));
        }
        let (exit_tx, exit_rx) = oneshot::channel();
        Ok(Task {
            inner: Arc::new(Inner {
                id: self.id.unwrap_or_else(TaskId::generate),
                name: self.name,
                explicit_start: self.start.is_some(),
                start: self.start.unwrap_or_else(Utc::now),
                duration: self.duration,
                interval: self.interval,
                cancellation: self.cancellation.unwrap_or_default(),
                context: Mutex::new(self.context.unwrap_or_default()),
                exit: Mutex::new(None),
                exit_tx: Mutex::new(Some(exit_tx)),
                exit_rx: exit_rx.shared(),
                propagate_panics: AtomicBool::new(false),
            }),
        })
    }
}
