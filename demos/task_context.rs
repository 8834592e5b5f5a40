//! Keeps a counter in the task context across executions.

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
            job::from_fn(|task| {
                let counter = task.with_context(|ctx| {
                    let counter = ctx.get_mut::<u32>("counter");
                    match counter {
                        Some(counter) => {
                            *counter += 1;
                            *counter
                        }
                        None => {
                            ctx.insert("counter", 0u32);
                            0
                        }
                    }
                });
                println!("[{counter}] Hello, World!");
            }),
        )
        .expect("Failed to schedule task");

    futures::executor::block_on(task.wait());

    println!();
    println!("{task}");
}
