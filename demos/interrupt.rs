//! Stops a task before its lifetime is over.

use std::{thread, time::Duration};

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
                let counter = task.get_context::<u32>("counter").unwrap_or(0);
                println!("{counter}");
                task.set_context("counter", counter + 1);
            }),
        )
        .expect("Failed to schedule task");

    thread::sleep(Duration::from_secs(5));

    if let Err(e) = scheduler.stop_task(&task) {
        eprintln!("{e}");
        return;
    }
    let exit = futures::executor::block_on(task.wait());

    println!();
    println!("{task}");
    println!("Exit: {exit:?}");
}
