//! One-shot cancellation signal for task execution loops.
//!
//! A [`Cancellation`] can be triggered any number of times but only the first
//! call has an effect. The owning execution loop observes it either by polling
//! [`Cancellation::is_cancelled`] or by awaiting [`Cancellation::cancelled`].

use std::{
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
};

use futures::task::AtomicWaker;
use pin_project_lite::pin_project;

#[derive(Default)]
struct Signal {
    cancelled: AtomicBool,
    waker: AtomicWaker,
}

/// Cancellation token shared between a task handle and its execution loop.
///
/// Cloning yields another handle to the same signal.
#[derive(Clone, Default)]
pub struct Cancellation {
    signal: Arc<Signal>,
}

impl Cancellation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        if !self.signal.cancelled.swap(true, Ordering::AcqRel) {
            self.signal.waker.wake();
        }
    }

    /// Returns `true` if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.signal.cancelled.load(Ordering::Acquire)
    }

    /// Returns a future that completes once cancellation is requested.
    ///
    /// Only one waiter is woken reliably at a time: the signal is meant to be
    /// awaited by the single loop that owns the task.
    pub fn cancelled(&self) -> Cancelled {
        Cancelled {
            signal: Arc::clone(&self.signal),
        }
    }

    /// Runs `future` until it completes or cancellation is requested, whichever
    /// comes first.
    pub fn run_until_cancelled<F: Future>(&self, future: F) -> Cancellable<F> {
        Cancellable {
            future,
            cancelled: self.cancelled(),
        }
    }
}

impl std::fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cancellation")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Future returned by [`Cancellation::cancelled`].
#[must_use = "futures do nothing unless polled or .awaited"]
pub struct Cancelled {
    signal: Arc<Signal>,
}

impl Future for Cancelled {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.signal.cancelled.load(Ordering::Acquire) {
            return Poll::Ready(());
        }
        self.signal.waker.register(cx.waker());
        // Check again, `cancel` may have run before the waker was registered.
        if self.signal.cancelled.load(Ordering::Acquire) {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

pin_project! {
    /// A future that races another future against a cancellation signal.
    ///
    /// Resolves to `Some(output)` if the inner future finished first and to
    /// `None` if cancellation was requested. Cancellation is checked before the
    /// inner future on every poll, so an already cancelled signal never lets
    /// the inner future make progress.
    #[must_use = "futures do nothing unless polled or .awaited"]
    pub struct Cancellable<F> {
        #[pin]
        future: F,
        cancelled: Cancelled,
    }
}

impl<F> Cancellable<F> {
    /// Consumes the `Cancellable` and returns the inner future.
    pub fn inner(self) -> F {
        self.future
    }
}

impl<F: Future> Future for Cancellable<F> {
    type Output = Option<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if Pin::new(this.cancelled).poll(cx).is_ready() {
            return Poll::Ready(None);
        }
        this.future.poll(cx).map(Some)
    }
}
