use std::time::{Duration, Instant};

use tickwork::timing::Timer;

#[tokio::test(flavor = "multi_thread")]
async fn timer_sleep() {
    let timer = Timer::new("sleep-timer").unwrap();
    let started = Instant::now();
    timer.sleep(Duration::from_millis(50)).await;
    assert!(
        started.elapsed() >= Duration::from_millis(50),
        "Sleep should last at least its duration"
    );

    let past = timer.sleep_until(started);
    assert_eq!(past.deadline(), started);
    past.await;
    timer.shutdown();
}

#[test]
fn timer_concurrent_sleeps() {
    let timer = Timer::new("order-timer").unwrap();
    let started = Instant::now();
    let order = futures::executor::block_on(async {
        let mut order = Vec::new();
        let slow = async {
            timer.sleep(Duration::from_millis(60)).await;
            "slow"
        };
        let fast = async {
            timer.sleep(Duration::from_millis(20)).await;
            "fast"
        };
        let (a, b) = futures::join!(slow, fast);
        order.push(a);
        order.push(b);
        order
    });
    assert_eq!(order, vec!["slow", "fast"]);
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "Sleeps should run concurrently"
    );
}

#[test]
fn ticker_nominal_timestamps() {
    let timer = Timer::new("tick-timer").unwrap();
    let period = Duration::from_millis(20);
    let first = Instant::now() + period;
    let mut ticker = timer.ticker(first, period);
    assert_eq!(ticker.period(), period);

    let ticks: Vec<Instant> = futures::executor::block_on(async {
        let mut ticks = Vec::new();
        for _ in 0..3 {
            ticks.push(ticker.tick().await);
        }
        ticks
    });
    assert_eq!(ticks, vec![first, first + period, first + period * 2]);
}

#[test]
fn ticker_fires_late_without_bursting() {
    let timer = Timer::new("late-timer").unwrap();
    let period = Duration::from_millis(20);
    let first = Instant::now() + period;
    let mut ticker = timer.ticker(first, period);

    futures::executor::block_on(async {
        assert_eq!(ticker.tick().await, first);

        // Fall behind by several periods.
        std::thread::sleep(period * 4);
        let late = ticker.tick().await;
        assert!(late > first + period, "Late tick should carry the actual time");

        // Missed ticks are folded into the late one; the next tick keeps the
        // original phase and lies in the future.
        let before_next = Instant::now();
        let next = ticker.tick().await;
        assert!(next >= before_next);
        assert_eq!((next - first).as_nanos() % period.as_nanos(), 0);
    });
}

#[test]
fn dropped_sleep_withdraws_deadline() {
    let timer = Timer::new("drop-timer").unwrap();
    let mut far = timer.sleep(Duration::from_secs(3600));
    let mut forever = timer.sleep(Duration::MAX);

    futures::executor::block_on(async {
        assert!(futures::poll!(&mut far).is_pending());
        assert!(futures::poll!(&mut forever).is_pending());
    });
    assert_eq!(timer.pending(), 2);

    drop(far);
    assert_eq!(timer.pending(), 1, "Dropped sleep should leave the timer");
    drop(forever);
    assert_eq!(timer.pending(), 0);
}

#[test]
fn ticker_with_huge_period() {
    let timer = Timer::new("huge-timer").unwrap();
    let first = Instant::now();
    let mut ticker = timer.ticker(first, Duration::MAX);

    let tick = futures::executor::block_on(ticker.tick());
    assert!(tick >= first);

    // The following tick is clamped far into the future.
    let next = futures::executor::block_on(async { futures::poll!(Box::pin(ticker.tick())) });
    assert!(next.is_pending());
    assert_eq!(timer.pending(), 0);
}
