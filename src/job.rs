//! The unit of work invoked on every execution of a task.

use futures::future::{self, BoxFuture, FutureExt};

use crate::Task;

/// Work executed by a scheduled task.
///
/// The scheduler calls [`run`](Job::run) once per execution, passing a handle to
/// the task being executed. Invocations of the same job never overlap: the next
/// one starts only after the returned future completed.
///
/// Any `FnMut(Task) -> impl Future<Output = ()>` closure is a `Job`, so extra
/// arguments are simply captured by the closure. Synchronous closures can be
/// wrapped with [`from_fn`].
pub trait Job: Send + 'static {
    fn run(&mut self, task: Task) -> BoxFuture<'static, ()>;
}

impl<G, F> Job for G
where
    G: FnMut(Task) -> F + Send + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    fn run(&mut self, task: Task) -> BoxFuture<'static, ()> {
        self(task).boxed()
    }
}

/// A [`Job`] backed by a synchronous closure, see [`from_fn`].
pub struct FnJob<G> {
    f: G,
}

impl<G> Job for FnJob<G>
where
    G: FnMut(&Task) + Send + 'static,
{
    fn run(&mut self, task: Task) -> BoxFuture<'static, ()> {
        (self.f)(&task);
        future::ready(()).boxed()
    }
}

/// Wraps a synchronous closure into a [`Job`].
///
/// The closure runs to completion on the executor thread that drives the task,
/// so it should not block for longer than the task interval.
///
/// # Example
/// ```
/// # use tickwork::job;
/// let job = job::from_fn(|task| {
///     let runs = task.get_context::<u32>("runs").unwrap_or(0);
///     task.set_context("runs", runs + 1);
/// });
/// # let _ = job;
/// ```
pub fn from_fn<G>(f: G) -> FnJob<G>
where
    G: FnMut(&Task) + Send + 'static,
{
    FnJob { f }
}
