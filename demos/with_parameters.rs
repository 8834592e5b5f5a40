//! Binds extra arguments to the scheduled job by capturing them.

use std::{env, time::Duration};

use tickwork::{Scheduler, Task};
use tracing_subscriber::EnvFilter;

async fn greet(task: Task, name: String) {
    println!("[{}] Hello, {name}!", task.name());
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let user = env::var("USER").unwrap_or_else(|_| "stranger".to_string());

    let scheduler = Scheduler::new();
    let task = scheduler
        .schedule_task(
            "Demo Task",
            None,
            Some(Duration::from_secs(10)),
            Duration::from_secs(1),
            move |task: Task| greet(task, user.clone()),
        )
        .expect("Failed to schedule task");

    futures::executor::block_on(task.wait());

    println!();
    println!("{task}");
}
