//! Executor agnostic timing primitives.
//!
//! A [`Timer`] owns one background thread that keeps every pending deadline in
//! a min-heap and wakes the matching task when its deadline passes. Futures
//! built on it ([`Sleep`], [`Ticker::tick`]) work on any executor because they
//! only rely on `Waker`s.

use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
    thread,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};

/// Upper bound for how far ahead a deadline is kept. `Instant` cannot
/// represent arbitrary points in the future, later deadlines are clamped.
pub(crate) const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `instant + duration`, clamped to [`FAR_FUTURE`] instead of overflowing.
pub(crate) fn deadline_after(instant: Instant, duration: Duration) -> Instant {
    instant
        .checked_add(duration.min(FAR_FUTURE))
        .unwrap_or(instant)
}

struct Entry {
    deadline: Instant,
    seq: u64,
    waker: Waker,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

#[derive(Default)]
struct State {
    entries: BinaryHeap<Reverse<Entry>>,
    seq: u64,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    condvar: Condvar,
}

/// Handle to a background timer driver.
///
/// Clones share the same driver thread. The thread runs until
/// [`Timer::shutdown`] is called.
#[derive(Clone)]
pub struct Timer {
    shared: Arc<Shared>,
}

impl Timer {
    /// Starts a new timer driver thread named `name`.
    pub fn new(name: impl Into<String>) -> io::Result<Self> {
        let shared = Arc::new(Shared::default());
        let driver = Arc::clone(&shared);
        thread::Builder::new()
            .name(name.into())
            .spawn(move || drive(&driver))?;
        Ok(Self { shared })
    }

    /// Returns a future that completes at `deadline`.
    pub fn sleep_until(&self, deadline: Instant) -> Sleep {
        Sleep {
            timer: self.clone(),
            deadline,
            registered: None,
        }
    }

    /// Returns a future that completes after `duration` has elapsed.
    pub fn sleep(&self, duration: Duration) -> Sleep {
        self.sleep_until(deadline_after(Instant::now(), duration))
    }

    /// Returns a ticker whose first tick is due at `first`, then every `period`.
    pub fn ticker(&self, first: Instant, period: Duration) -> Ticker {
        Ticker {
            timer: self.clone(),
            next: first,
            period,
        }
    }

    /// Stops the driver thread. Pending sleeps are never woken afterwards.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        state.shutdown = true;
        state.entries.clear();
        drop(state);
        self.shared.condvar.notify_one();
    }

    /// Number of deadlines the driver is still waiting for.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    fn register(&self, deadline: Instant, waker: Waker) -> u64 {
        let mut state = self.shared.state.lock();
        let seq = state.seq;
        if state.shutdown {
            return seq;
        }
        state.seq = state.seq.wrapping_add(1);
        state.entries.push(Reverse(Entry {
            deadline,
            seq,
            waker,
        }));
        drop(state);
        self.shared.condvar.notify_one();
        seq
    }

    fn deregister(&self, seq: u64) {
        self.shared
            .state
            .lock()
            .entries
            .retain(|Reverse(e)| e.seq != seq);
    }
}

fn drive(shared: &Shared) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            return;
        }
        let now = Instant::now();
        let mut due = Vec::new();
        while state
            .entries
            .peek()
            .is_some_and(|Reverse(e)| e.deadline <= now)
        {
            if let Some(Reverse(entry)) = state.entries.pop() {
                due.push(entry.waker);
            }
        }
        if !due.is_empty() {
            // Wake outside the lock, woken tasks may register right away.
            MutexGuard::unlocked(&mut state, || due.into_iter().for_each(Waker::wake));
            continue;
        }
        match state.entries.peek().map(|Reverse(e)| e.deadline) {
            Some(deadline) => {
                shared.condvar.wait_until(&mut state, deadline);
            }
            None => shared.condvar.wait(&mut state),
        }
    }
}

/// Future returned by [`Timer::sleep_until`] and [`Timer::sleep`].
///
/// Dropping a pending `Sleep` withdraws its deadline from the driver.
#[must_use = "futures do nothing unless polled or .awaited"]
pub struct Sleep {
    timer: Timer,
    deadline: Instant,
    registered: Option<(u64, Waker)>,
}

impl Sleep {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if Instant::now() >= self.deadline {
            return Poll::Ready(());
        }
        // Register once per waker, a new waker replaces the previous entry.
        if !self
            .registered
            .as_ref()
            .is_some_and(|(_, w)| w.will_wake(cx.waker()))
        {
            if let Some((seq, _)) = self.registered.take() {
                self.timer.deregister(seq);
            }
            let waker = cx.waker().clone();
            let seq = self.timer.register(self.deadline, waker.clone());
            self.registered = Some((seq, waker));
        }
        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some((seq, _)) = self.registered.take() {
            self.timer.deregister(seq);
        }
    }
}

/// Produces tick timestamps at a fixed period.
///
/// Ticks are stamped with their nominal due time, so the sequence does not
/// drift with wake-up latency. If the consumer falls behind (the previous tick
/// was handled past the next due time), the next tick fires immediately,
/// stamped with the actual time, and the missed ticks are folded into it. The
/// ticker then realigns to its original phase.
pub struct Ticker {
    timer: Timer,
    next: Instant,
    period: Duration,
}

impl Ticker {
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Waits for the next tick and returns its timestamp.
    pub async fn tick(&mut self) -> Instant {
        let due = self.next;
        let entered = Instant::now();
        let fired = if due <= entered {
            entered
        } else {
            self.timer.sleep_until(due).await;
            due
        };
        self.next = deadline_after(due, self.period);
        let now = Instant::now();
        if self.next <= now {
            let period = self.period.as_nanos().max(1);
            let missed = (now - self.next).as_nanos() / period + 1;
            let skip = u64::try_from(missed.saturating_mul(period)).unwrap_or(u64::MAX);
            self.next = self
                .next
                .checked_add(Duration::from_nanos(skip))
                .unwrap_or_else(|| deadline_after(now, self.period));
        }
        fired
    }
}
