//! Execution loop of a scheduled task.
//!
//! Every scheduled task gets one `ExecutionLoop`, spawned on the scheduler's
//! executor. The loop moves through three states:
//!
//! - waiting for start: sleeps until the start time, a cancellation arriving
//!   first ends the loop without ever running the job;
//! - running: runs the job once, then once per tick of the interval until a
//!   tick lands strictly after the end of the task's lifetime or the task is
//!   cancelled;
//! - terminated: removes the task from the scheduler and reports the exit to
//!   waiters. This happens exactly once, whichever way the loop ended.
//!
//! A tick that lands exactly on the end of the lifetime still runs the job, so
//! a task with duration `D` and interval `I` runs `1 + D / I` times.

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    thread,
    time::{Duration, Instant},
};

use chrono::Utc;
use futures::FutureExt;
use tracing::{Instrument, debug, error, trace};

use crate::{
    Cancellation, Task, TaskExit,
    job::Job,
    scheduler::Registry,
    timing::{FAR_FUTURE, Timer, deadline_after},
};

type PanicPayload = Box<dyn Any + Send>;

/// Start and end of a task's lifetime on the monotonic clock.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Schedule {
    first_run: Instant,
    end: Option<Instant>,
}

impl Schedule {
    /// Maps the wall-clock start and duration of `task` onto `Instant`s.
    ///
    /// A start in the past runs right away, but the end of the lifetime is
    /// still measured from the requested start.
    pub(crate) fn resolve(task: &Task) -> Self {
        let now = Instant::now();
        let (delay, lag) = if task.has_explicit_start() {
            let offset = task.start().signed_duration_since(Utc::now());
            match offset.to_std() {
                Ok(ahead) => (ahead.min(FAR_FUTURE), Duration::ZERO),
                Err(_) => (Duration::ZERO, (-offset).to_std().unwrap_or_default()),
            }
        } else {
            (Duration::ZERO, Duration::ZERO)
        };
        let first_run = deadline_after(now, delay);
        // A lifetime that is already over leaves room for the first run only.
        let end = task.duration().map(|duration| match duration.checked_sub(lag) {
            Some(left) => deadline_after(first_run, left),
            None => first_run,
        });
        Self { first_run, end }
    }

    fn is_past_end(&self, tick: Instant) -> bool {
        self.end.is_some_and(|end| tick > end)
    }
}

pub(crate) struct ExecutionLoop<J> {
    task: Task,
    job: J,
    schedule: Schedule,
    timer: Timer,
    registry: Registry,
}

impl<J: Job> ExecutionLoop<J> {
    pub(crate) fn new(
        task: Task,
        job: J,
        schedule: Schedule,
        timer: Timer,
        registry: Registry,
    ) -> Self {
        Self {
            task,
            job,
            schedule,
            timer,
            registry,
        }
    }

    pub(crate) async fn run(self) {
        let span = tracing::debug_span!("task", id = %self.task.id(), name = self.task.name());
        self.drive().instrument(span).await;
    }

    async fn drive(mut self) {
        let termination = Termination {
            task: self.task.clone(),
            registry: self.registry.clone(),
        };
        // Panics outside the job are caught as well, the executor thread
        // must survive them.
        let outcome = AssertUnwindSafe(self.execute())
            .catch_unwind()
            .await
            .and_then(|exit| exit);
        match outcome {
            Ok(exit) => {
                debug!(?exit, "task terminated");
                termination.complete(exit);
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(%message, "task panicked, terminating task");
                termination.complete(TaskExit::Panicked(message));
            }
        }
    }

    async fn execute(&mut self) -> Result<TaskExit, PanicPayload> {
        let cancellation = self.task.cancellation().clone();

        let start = self.timer.sleep_until(self.schedule.first_run);
        if cancellation.run_until_cancelled(start).await.is_none() {
            return Ok(TaskExit::Stopped);
        }

        if !self.invoke(&cancellation).await? {
            return Ok(TaskExit::Stopped);
        }

        let interval = self.task.interval();
        let mut ticker = self
            .timer
            .ticker(deadline_after(self.schedule.first_run, interval), interval);
        loop {
            let Some(tick) = cancellation.run_until_cancelled(ticker.tick()).await else {
                return Ok(TaskExit::Stopped);
            };
            if self.schedule.is_past_end(tick) {
                return Ok(TaskExit::Expired);
            }
            if !self.invoke(&cancellation).await? {
                return Ok(TaskExit::Stopped);
            }
        }
    }

    // Returns `Ok(false)` if the task was cancelled while the job was running,
    // the job future is dropped in that case.
    async fn invoke(&mut self, cancellation: &Cancellation) -> Result<bool, PanicPayload> {
        trace!("running job");
        let task = self.task.clone();
        let job = &mut self.job;
        let run = AssertUnwindSafe(async move { job.run(task).await }).catch_unwind();
        match cancellation.run_until_cancelled(run).await {
            Some(result) => result.map(|()| true),
            None => Ok(false),
        }
    }
}

// Deregisters the task when the loop ends, including when the loop future is
// dropped by its executor before finishing.
struct Termination {
    task: Task,
    registry: Registry,
}

impl Termination {
    fn complete(self, exit: TaskExit) {
        self.registry.remove(&self.task);
        self.task.finish(exit);
    }
}

impl Drop for Termination {
    fn drop(&mut self) {
        self.registry.remove(&self.task);
        let exit = if thread::panicking() {
            TaskExit::Panicked("execution loop unwound".to_string())
        } else {
            TaskExit::Stopped
        };
        self.task.finish(exit);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
