//! Schedules a task that greets every second for ten seconds.

use std::time::Duration;

use tickwork::{Scheduler, job};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let scheduler = Scheduler::new();
    let task = scheduler
        .schedule_task(
            "Demo Task",
            None,
            Some(Duration::from_secs(10)),
            Duration::from_secs(1),
            job::from_fn(|_| println!("Hello, World!")),
        )
        .expect("Failed to schedule task");

    let exit = futures::executor::block_on(task.wait());

    println!();
    println!("{task}");
    println!("Exit: {exit:?}");
}
